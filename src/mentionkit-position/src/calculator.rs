//! Two-phase popup placement relative to a caret.
//!
//! The popup normally sits just right of and level with the caret. When it would
//! run off the right edge it flips to the caret's left; when it would run off the
//! bottom it moves above the caret, unless the viewport is too short to ever fit
//! it there, in which case it stays below and is clamped.
//!
//! `estimate` runs before the popup exists and uses placeholder dimensions.
//! `refine` runs after each paint with the real box size and may flip either way.

use tracing::trace;

use crate::error::{PlacementError, PlacementResult};
use crate::geometry::{CaretGeometry, PopupPlacement, Size};

// ============================================================
// CONSTANTS
// ============================================================

/// Horizontal gap between caret and popup.
pub const PADDING_LEFT: f64 = 10.0;

/// Vertical offset of the popup from the caret top when placed below.
pub const PADDING_TOP: f64 = 0.0;

/// Additional gap kept between the popup bottom and the caret when above.
pub const EXTRA_PADDING_ABOVE: f64 = 5.0;

/// Smallest distance from the viewport top for a popup placed above.
pub const MIN_TOP_MARGIN: f64 = 10.0;

/// Placeholder popup size used by the estimate pass.
pub const ESTIMATED_BOX: Size = Size::new(300.0, 300.0);

/// Line height assumed when a caret rectangle has to be synthesized.
pub const ASSUMED_LINE_HEIGHT: f64 = 16.0;

/// Slack added to the box height when deciding the viewport is too short.
const SHORT_VIEWPORT_SLACK: f64 = 20.0;

// ============================================================
// POSITION CALCULATOR
// ============================================================

/// Computes on-screen popup positions anchored at a caret.
///
/// Keeps the caret from the last successful [`estimate`](Self::estimate) and the
/// side the popup ended up on, so [`refine`](Self::refine) can prefer the same
/// side. `refine` only ever updates the two orientation flags, so repeated calls
/// with the same inputs yield the same placement.
#[derive(Debug, Clone, Default)]
pub struct PositionCalculator {
    caret: Option<CaretGeometry>,
    placed_above: bool,
    placed_left: bool,
}

impl PositionCalculator {
    /// Creates a calculator with no stored caret.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the caret recorded by the last successful estimate.
    pub fn caret(&self) -> Option<CaretGeometry> {
        self.caret
    }

    /// Returns whether the popup is currently placed above the caret.
    pub fn is_placed_above(&self) -> bool {
        self.placed_above
    }

    /// Returns whether the popup is currently placed left of the caret.
    pub fn is_placed_left(&self) -> bool {
        self.placed_left
    }

    /// Computes the initial placement before the popup has been rendered.
    ///
    /// Fails with [`PlacementError::NoCaret`] when `caret` is `None`; the stored
    /// state is left untouched in that case.
    pub fn estimate(
        &mut self,
        caret: Option<CaretGeometry>,
        viewport: Size,
        placeholder: Size,
    ) -> PlacementResult<PopupPlacement> {
        let caret = caret.ok_or(PlacementError::NoCaret)?;

        self.caret = Some(caret);
        self.placed_above = false;
        self.placed_left = false;

        let mut left = caret.left + PADDING_LEFT;
        if left + placeholder.width > viewport.width {
            left = left_of_caret(&caret, placeholder.width);
            self.placed_left = true;
        }

        let mut top = below_caret(&caret);
        if top + placeholder.height > viewport.height {
            let (flipped_top, above) = overflowing_top(&caret, placeholder.height, viewport.height);
            top = flipped_top;
            self.placed_above = above;
        }

        trace!(
            left,
            top,
            above = self.placed_above,
            left_side = self.placed_left,
            "estimated popup placement"
        );
        Ok(PopupPlacement::new(left, top))
    }

    /// Recomputes the placement with the popup's real rendered size.
    ///
    /// Fails with [`PlacementError::NotEstimated`] if no estimate succeeded yet.
    pub fn refine(&mut self, actual: Size, viewport: Size) -> PlacementResult<PopupPlacement> {
        let caret = self.caret.ok_or(PlacementError::NotEstimated)?;

        let left = if self.placed_left {
            left_of_caret(&caret, actual.width)
        } else {
            let normal = caret.left + PADDING_LEFT;
            if normal + actual.width > viewport.width {
                self.placed_left = true;
                left_of_caret(&caret, actual.width)
            } else {
                normal
            }
        };

        let normal_top = below_caret(&caret);
        let top = if self.placed_above || normal_top + actual.height > viewport.height {
            let (top, above) = overflowing_top(&caret, actual.height, viewport.height);
            self.placed_above = above;
            top
        } else {
            normal_top
        };

        trace!(
            left,
            top,
            width = actual.width,
            height = actual.height,
            above = self.placed_above,
            "refined popup placement"
        );
        Ok(PopupPlacement::new(left, top))
    }
}

// ============================================================
// HELPERS
// ============================================================

fn below_caret(caret: &CaretGeometry) -> f64 {
    caret.top + PADDING_TOP
}

fn left_of_caret(caret: &CaretGeometry, box_width: f64) -> f64 {
    (caret.left - box_width - PADDING_LEFT).max(0.0)
}

/// Top edge and `placed_above` flag for a box that does not (or should not) sit
/// below the caret.
fn overflowing_top(caret: &CaretGeometry, box_height: f64, viewport_height: f64) -> (f64, bool) {
    let ideal_above = caret.top - box_height - PADDING_TOP - EXTRA_PADDING_ABOVE;

    if ideal_above >= MIN_TOP_MARGIN {
        return (ideal_above, true);
    }

    let needed = box_height + EXTRA_PADDING_ABOVE + PADDING_TOP + SHORT_VIEWPORT_SLACK;
    if viewport_height < needed {
        (below_caret(caret).min(viewport_height - box_height), false)
    } else {
        (MIN_TOP_MARGIN.max(ideal_above), true)
    }
}

// ============================================================
// TESTS
// ============================================================
