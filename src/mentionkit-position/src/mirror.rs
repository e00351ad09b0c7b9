//! Caret synthesis for plain text controls.
//!
//! Single- and multi-line text inputs do not take part in the document
//! selection, so their caret has no client rect. Instead an invisible mirror
//! element is laid over the control with the same box and typography metrics,
//! filled with the text before the caret followed by a zero-width marker, and
//! scrolled like the control. The marker's rectangle is the caret.
//!
//! This module builds the mirror description ([`MirrorSpec`]); a [`MirrorHost`]
//! owns the actual node, measures the marker, and removes the node again.

use tracing::{debug, trace};

use crate::calculator::ASSUMED_LINE_HEIGHT;
use crate::error::MeasureError;
use crate::geometry::CaretGeometry;

/// Zero-width space appended after the pre-caret text.
pub const MARKER: char = '\u{200b}';

/// Kind of plain text control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// A single-line input; text never wraps.
    SingleLine,
    /// A multi-line text area; text wraps at the content width.
    MultiLine,
}

/// CSS `box-sizing` of the control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxSizing {
    /// Width and height cover the content box only.
    #[default]
    ContentBox,
    /// Width and height include padding and borders.
    BorderBox,
}

/// Per-side lengths in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Edges {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Edges {
    /// Same length on every side.
    pub const fn uniform(value: f64) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    /// Sum of the left and right lengths.
    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }
}

/// Computed style properties of a control that affect text layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlStyle {
    pub box_sizing: BoxSizing,
    pub border: Edges,
    pub padding: Edges,
    pub font_family: String,
    pub font_size: f64,
    pub font_weight: String,
    pub font_style: String,
    pub letter_spacing: f64,
    pub text_transform: String,
    pub text_indent: f64,
    /// Line height in pixels; `0.0` means "normal".
    pub line_height: f64,
    pub tab_size: u32,
    /// Computed width as reported for the control's `box_sizing`.
    pub width: f64,
    /// Computed height as reported for the control's `box_sizing`.
    pub height: f64,
}

impl Default for ControlStyle {
    fn default() -> Self {
        Self {
            box_sizing: BoxSizing::default(),
            border: Edges::default(),
            padding: Edges::default(),
            font_family: "monospace".to_string(),
            font_size: 13.0,
            font_weight: "400".to_string(),
            font_style: "normal".to_string(),
            letter_spacing: 0.0,
            text_transform: "none".to_string(),
            text_indent: 0.0,
            line_height: 0.0,
            tab_size: 8,
            width: 0.0,
            height: 0.0,
        }
    }
}

impl ControlStyle {
    /// Width of the content box, whatever the box sizing.
    pub fn content_width(&self) -> f64 {
        match self.box_sizing {
            BoxSizing::ContentBox => self.width,
            BoxSizing::BorderBox => {
                (self.width - self.border.horizontal() - self.padding.horizontal()).max(0.0)
            }
        }
    }
}

/// CSS `white-space` mode of the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    /// Preserve whitespace, never wrap.
    Pre,
    /// Preserve whitespace, wrap at the content edge.
    PreWrap,
}

/// Scroll position of a control.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollOffset {
    pub top: f64,
    pub left: f64,
}

/// A plain text control whose caret has to be synthesized.
pub trait TextControl {
    /// Whether the control wraps lines.
    fn kind(&self) -> ControlKind;

    /// Border-box rectangle of the control in viewport coordinates.
    fn bounding_rect(&self) -> CaretGeometry;

    /// Current text value.
    fn value(&self) -> String;

    /// Caret position as a character index, if the control reports one.
    fn selection_start(&self) -> Option<usize>;

    /// Computed layout style.
    fn computed_style(&self) -> Result<ControlStyle, MeasureError>;

    /// Current scroll position.
    fn scroll_offset(&self) -> ScrollOffset;
}

/// Description of the hidden mirror element.
///
/// Hosts render it with fixed positioning at `origin`, hidden and ignoring
/// pointer events, `overflow: auto`, a solid transparent border of the
/// control's widths, and `style`'s metrics; then append the pre-caret text and a
/// span holding [`MARKER`], apply `scroll`, and measure the span.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorSpec {
    /// Top-left corner of the control's border box.
    pub origin: CaretGeometry,
    pub style: ControlStyle,
    pub white_space: WhiteSpace,
    /// Whether long words may break (`word-wrap: break-word`).
    pub break_words: bool,
    /// Text of the control up to the caret.
    pub text_before_caret: String,
    pub marker: char,
    pub scroll: ScrollOffset,
}

impl MirrorSpec {
    /// Builds the mirror description for a control.
    pub fn for_control<C: TextControl + ?Sized>(control: &C) -> Result<Self, MeasureError> {
        let style = control.computed_style()?;
        let value = control.value();
        let caret = control.selection_start().unwrap_or(0);
        let text_before_caret: String = value.chars().take(caret).collect();

        let white_space = match control.kind() {
            ControlKind::SingleLine => WhiteSpace::Pre,
            ControlKind::MultiLine => WhiteSpace::PreWrap,
        };

        Ok(Self {
            origin: control.bounding_rect(),
            style,
            white_space,
            break_words: white_space == WhiteSpace::PreWrap,
            text_before_caret,
            marker: MARKER,
            scroll: control.scroll_offset(),
        })
    }
}

/// Creates, measures, and removes mirror elements.
pub trait MirrorHost {
    /// Returns the marker's bounding rectangle in viewport coordinates.
    ///
    /// Implementations must remove the mirror before returning, on success and
    /// on error alike.
    fn measure_marker(&self, spec: &MirrorSpec) -> Result<CaretGeometry, MeasureError>;
}

/// Returns the caret rectangle of a plain text control.
///
/// Never fails: when the mirror cannot be built or measured, the control's own
/// top-left corner with a single assumed line is used.
pub fn plain_text_caret<C, H>(control: &C, host: &H) -> CaretGeometry
where
    C: TextControl + ?Sized,
    H: MirrorHost + ?Sized,
{
    let measured = MirrorSpec::for_control(control).and_then(|spec| host.measure_marker(&spec));

    match measured {
        Ok(rect) => {
            trace!(left = rect.left, top = rect.top, "measured mirror caret");
            rect
        }
        Err(err) => {
            debug!(error = %err, "mirror measurement failed, using control origin");
            let rect = control.bounding_rect();
            CaretGeometry::line(rect.left, rect.top, ASSUMED_LINE_HEIGHT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    struct FakeControl {
        kind: ControlKind,
        value: String,
        caret: Option<usize>,
        style: Result<ControlStyle, MeasureError>,
    }

    impl FakeControl {
        fn textarea(value: &str, caret: usize) -> Self {
            Self {
                kind: ControlKind::MultiLine,
                value: value.to_string(),
                caret: Some(caret),
                style: Ok(ControlStyle {
                    width: 200.0,
                    height: 80.0,
                    ..Default::default()
                }),
            }
        }
    }

    impl TextControl for FakeControl {
        fn kind(&self) -> ControlKind {
            self.kind
        }

        fn bounding_rect(&self) -> CaretGeometry {
            CaretGeometry::new(50.0, 70.0, 200.0, 80.0)
        }

        fn value(&self) -> String {
            self.value.clone()
        }

        fn selection_start(&self) -> Option<usize> {
            self.caret
        }

        fn computed_style(&self) -> Result<ControlStyle, MeasureError> {
            self.style.clone()
        }

        fn scroll_offset(&self) -> ScrollOffset {
            ScrollOffset {
                top: 12.0,
                left: 0.0,
            }
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        seen: RefCell<Option<MirrorSpec>>,
        fail: bool,
    }

    impl MirrorHost for RecordingHost {
        fn measure_marker(&self, spec: &MirrorSpec) -> Result<CaretGeometry, MeasureError> {
            *self.seen.borrow_mut() = Some(spec.clone());
            if self.fail {
                return Err(MeasureError::Layout("no body".to_string()));
            }
            Ok(CaretGeometry::new(77.0, 88.0, 0.0, 15.0))
        }
    }

    #[test]
    fn test_spec_uses_text_before_caret() {
        let control = FakeControl::textarea("héllo wörld", 5);
        let spec = MirrorSpec::for_control(&control).unwrap();
        assert_eq!(spec.text_before_caret, "héllo");
        assert_eq!(spec.white_space, WhiteSpace::PreWrap);
        assert!(spec.break_words);
        assert_eq!(spec.marker, MARKER);
        assert_eq!(spec.scroll.top, 12.0);
        assert_eq!(spec.origin.left, 50.0);
    }

    #[test]
    fn test_single_line_does_not_wrap() {
        let mut control = FakeControl::textarea("abc", 3);
        control.kind = ControlKind::SingleLine;
        let spec = MirrorSpec::for_control(&control).unwrap();
        assert_eq!(spec.white_space, WhiteSpace::Pre);
        assert!(!spec.break_words);
    }

    #[test]
    fn test_missing_selection_start_means_start() {
        let mut control = FakeControl::textarea("abc", 0);
        control.caret = None;
        let spec = MirrorSpec::for_control(&control).unwrap();
        assert_eq!(spec.text_before_caret, "");
    }

    #[test]
    fn test_measured_rect_is_returned() {
        let control = FakeControl::textarea("abc", 2);
        let host = RecordingHost::default();
        let caret = plain_text_caret(&control, &host);
        assert_eq!(caret, CaretGeometry::new(77.0, 88.0, 0.0, 15.0));
        assert!(host.seen.borrow().is_some());
    }

    #[test]
    fn test_measure_failure_falls_back_to_origin() {
        let control = FakeControl::textarea("abc", 2);
        let host = RecordingHost {
            fail: true,
            ..Default::default()
        };
        let caret = plain_text_caret(&control, &host);
        assert_eq!(caret, CaretGeometry::line(50.0, 70.0, ASSUMED_LINE_HEIGHT));
    }

    #[test]
    fn test_style_failure_skips_host() {
        let mut control = FakeControl::textarea("abc", 2);
        control.style = Err(MeasureError::Detached);
        let host = RecordingHost::default();
        let caret = plain_text_caret(&control, &host);
        assert_eq!(caret.top, 70.0);
        assert!(host.seen.borrow().is_none());
    }

    #[test]
    fn test_border_box_content_width() {
        let style = ControlStyle {
            box_sizing: BoxSizing::BorderBox,
            border: Edges::uniform(1.0),
            padding: Edges::uniform(4.0),
            width: 110.0,
            ..Default::default()
        };
        assert_eq!(style.content_width(), 100.0);
    }
}
