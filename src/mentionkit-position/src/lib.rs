#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::uninlined_format_args
)]
//! Mentionkit Position - places a floating popup next to a text caret.
//!
//! This crate contains the geometry half of the mention autocomplete:
//!
//! - [`PositionCalculator`]: two-phase placement (`estimate` before the popup
//!   exists, `refine` once its real size is known) that keeps the popup on
//!   screen by flipping left/right and above/below the caret
//! - [`caret`]: caret rectangle acquisition for rich-text surfaces that expose a
//!   live selection
//! - [`mirror`]: caret synthesis for plain text controls through an off-screen
//!   mirror element
//! - [`MonospaceMirror`]: a mirror host for character-cell editors
//!
//! # Example
//!
//! ```
//! use mentionkit_position::{CaretGeometry, PositionCalculator, Size, ESTIMATED_BOX};
//!
//! let mut calc = PositionCalculator::new();
//! let caret = CaretGeometry::new(100.0, 40.0, 2.0, 16.0);
//! let viewport = Size::new(1280.0, 800.0);
//!
//! let first = calc.estimate(Some(caret), viewport, ESTIMATED_BOX).unwrap();
//! assert_eq!(first.left, 110.0);
//!
//! // after the popup has been painted
//! let refined = calc.refine(Size::new(240.0, 180.0), viewport).unwrap();
//! assert_eq!(refined.top, 40.0);
//! ```

pub mod calculator;
pub mod caret;
mod error;
mod geometry;
pub mod mirror;
mod monospace;

pub use calculator::{
    ASSUMED_LINE_HEIGHT, ESTIMATED_BOX, EXTRA_PADDING_ABOVE, MIN_TOP_MARGIN, PADDING_LEFT,
    PADDING_TOP, PositionCalculator,
};
pub use caret::{CollapsedContainer, SelectionProbe, rich_text_caret};
pub use error::{MeasureError, PlacementError, PlacementResult};
pub use geometry::{CaretGeometry, PopupPlacement, Size};
pub use mirror::{ControlKind, ControlStyle, MirrorHost, MirrorSpec, TextControl, plain_text_caret};
pub use monospace::MonospaceMirror;
