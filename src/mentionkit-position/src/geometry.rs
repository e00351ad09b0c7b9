//! Geometry primitives in viewport pixel coordinates.
//!
//! All values are `f64` because hosts report fractional client rectangles.

use serde::{Deserialize, Serialize};

/// A caret (or any client) rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CaretGeometry {
    /// Left edge.
    pub left: f64,
    /// Top edge.
    pub top: f64,
    /// Right edge.
    pub right: f64,
    /// Bottom edge.
    pub bottom: f64,
    /// Width (`right - left`).
    pub width: f64,
    /// Height (`bottom - top`).
    pub height: f64,
}

impl CaretGeometry {
    /// Creates a rectangle from its origin and size.
    #[inline]
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top + height,
            width,
            height,
        }
    }

    /// Creates a zero-width caret of the given line height.
    #[inline]
    pub fn line(left: f64, top: f64, line_height: f64) -> Self {
        Self::new(left, top, 0.0, line_height)
    }

    /// Returns whether the rectangle has no horizontal extent.
    #[inline]
    pub fn is_zero_width(&self) -> bool {
        self.width == 0.0
    }
}

/// A width/height pair, used for both viewports and popup boxes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl Size {
    /// Creates a new size.
    #[inline]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Screen position of the popup's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PopupPlacement {
    /// Left edge of the popup.
    pub left: f64,
    /// Top edge of the popup.
    pub top: f64,
}

impl PopupPlacement {
    /// The viewport origin, used when no caret could be measured.
    pub const ORIGIN: Self = Self {
        left: 0.0,
        top: 0.0,
    };

    /// Creates a new placement.
    #[inline]
    pub const fn new(left: f64, top: f64) -> Self {
        Self { left, top }
    }
}
