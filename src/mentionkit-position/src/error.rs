//! Error types for popup placement and caret measurement.

use thiserror::Error;

/// Result type alias for placement operations.
pub type PlacementResult<T> = std::result::Result<T, PlacementError>;

/// Errors returned by [`PositionCalculator`](crate::PositionCalculator).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementError {
    /// No caret rectangle could be obtained from the editor surface.
    #[error("caret geometry is unavailable")]
    NoCaret,

    /// `refine` was called before a successful `estimate`.
    #[error("placement has not been estimated yet")]
    NotEstimated,
}

/// Errors raised while synthesizing a caret rectangle for a plain text control.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeasureError {
    /// The control is not attached to a document view.
    #[error("control is not attached to a view")]
    Detached,

    /// Computed style could not be read from the control.
    #[error("failed to read computed style: {0}")]
    Style(String),

    /// The mirror element could not be laid out.
    #[error("mirror layout failed: {0}")]
    Layout(String),
}
