//! Mirror host for character-cell editors.

use unicode_width::UnicodeWidthChar;

use crate::error::MeasureError;
use crate::geometry::CaretGeometry;
use crate::mirror::{MirrorHost, MirrorSpec, WhiteSpace};

/// Lays mirror text out on a fixed grid of cells.
///
/// Used by hosts where every glyph occupies a whole number of equally sized
/// cells (terminal editors, fixed-pitch canvases). Wide characters take two
/// cells, tabs advance to the next multiple of the tab size, and wrapping mirrors
/// break at the last cell that fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonospaceMirror {
    cell_width: f64,
    cell_height: f64,
}

impl MonospaceMirror {
    /// Creates a measurer for the given cell size in pixels.
    pub fn new(cell_width: f64, cell_height: f64) -> Self {
        Self {
            cell_width,
            cell_height,
        }
    }

    /// A measurer where one cell is one unit, for terminal coordinates.
    pub fn cells() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl MirrorHost for MonospaceMirror {
    fn measure_marker(&self, spec: &MirrorSpec) -> Result<CaretGeometry, MeasureError> {
        if self.cell_width <= 0.0 || self.cell_height <= 0.0 {
            return Err(MeasureError::Layout(format!(
                "invalid cell size {}x{}",
                self.cell_width, self.cell_height
            )));
        }

        let style = &spec.style;
        let advance = self.cell_width + style.letter_spacing;
        let line_height = if style.line_height > 0.0 {
            style.line_height
        } else {
            self.cell_height
        };

        let columns = match spec.white_space {
            WhiteSpace::Pre => usize::MAX,
            WhiteSpace::PreWrap => ((style.content_width() / advance).floor() as usize).max(1),
        };
        let tab = style.tab_size.max(1) as usize;

        let mut row = 0usize;
        let mut col = 0usize;
        for ch in spec.text_before_caret.chars() {
            match ch {
                '\n' => {
                    row += 1;
                    col = 0;
                }
                '\t' => {
                    col = (col / tab + 1) * tab;
                    if col > columns {
                        row += 1;
                        col = tab.min(columns);
                    }
                }
                _ => {
                    let width = ch.width().unwrap_or(0);
                    if col > 0 && col + width > columns {
                        row += 1;
                        col = 0;
                    }
                    col += width;
                }
            }
        }

        let indent = if row == 0 { style.text_indent } else { 0.0 };
        let content_left = spec.origin.left + style.border.left + style.padding.left;
        let content_top = spec.origin.top + style.border.top + style.padding.top;

        let left = content_left + indent + col as f64 * advance - spec.scroll.left;
        let top = content_top + row as f64 * line_height - spec.scroll.top;

        Ok(CaretGeometry::line(left, top, line_height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{ControlStyle, Edges, MARKER, ScrollOffset};
    use pretty_assertions::assert_eq;

    fn spec(text: &str, white_space: WhiteSpace, width: f64) -> MirrorSpec {
        MirrorSpec {
            origin: CaretGeometry::new(0.0, 0.0, width, 100.0),
            style: ControlStyle {
                width,
                tab_size: 4,
                ..Default::default()
            },
            white_space,
            break_words: white_space == WhiteSpace::PreWrap,
            text_before_caret: text.to_string(),
            marker: MARKER,
            scroll: ScrollOffset::default(),
        }
    }

    #[test]
    fn test_plain_column() {
        let caret = MonospaceMirror::cells()
            .measure_marker(&spec("hello", WhiteSpace::Pre, 80.0))
            .unwrap();
        assert_eq!((caret.left, caret.top), (5.0, 0.0));
    }

    #[test]
    fn test_newlines_and_tabs() {
        let caret = MonospaceMirror::cells()
            .measure_marker(&spec("ab\n\tx", WhiteSpace::Pre, 80.0))
            .unwrap();
        assert_eq!((caret.left, caret.top), (5.0, 1.0));
    }

    #[test]
    fn test_wide_characters() {
        let caret = MonospaceMirror::cells()
            .measure_marker(&spec("日本", WhiteSpace::Pre, 80.0))
            .unwrap();
        assert_eq!(caret.left, 4.0);
    }

    #[test]
    fn test_soft_wrap() {
        let caret = MonospaceMirror::cells()
            .measure_marker(&spec("abcdefghij", WhiteSpace::PreWrap, 4.0))
            .unwrap();
        assert_eq!((caret.left, caret.top), (2.0, 2.0));
    }

    #[test]
    fn test_pre_never_wraps() {
        let caret = MonospaceMirror::cells()
            .measure_marker(&spec("abcdefghij", WhiteSpace::Pre, 4.0))
            .unwrap();
        assert_eq!((caret.left, caret.top), (10.0, 0.0));
    }

    #[test]
    fn test_pixels_with_padding_and_scroll() {
        let mut mirror = spec("ab\ncd", WhiteSpace::PreWrap, 200.0);
        mirror.origin = CaretGeometry::new(100.0, 50.0, 200.0, 100.0);
        mirror.style.padding = Edges::uniform(4.0);
        mirror.style.border = Edges::uniform(1.0);
        mirror.style.line_height = 18.0;
        mirror.scroll = ScrollOffset {
            top: 6.0,
            left: 0.0,
        };

        let caret = MonospaceMirror::new(8.0, 16.0).measure_marker(&mirror).unwrap();
        assert_eq!(caret.left, 100.0 + 5.0 + 16.0);
        assert_eq!(caret.top, 50.0 + 5.0 + 18.0 - 6.0);
        assert_eq!(caret.height, 18.0);
    }

    #[test]
    fn test_invalid_cell_size() {
        let err = MonospaceMirror::new(0.0, 16.0)
            .measure_marker(&spec("a", WhiteSpace::Pre, 10.0))
            .unwrap_err();
        assert!(matches!(err, MeasureError::Layout(_)));
    }
}
