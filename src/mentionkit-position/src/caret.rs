//! Caret rectangle acquisition for rich-text (contenteditable) surfaces.
//!
//! Hosts implement [`SelectionProbe`] on top of their live selection. The
//! collapsed range often reports no client rects at line starts and ends, and a
//! zero-width rect when the caret sits on a box edge; [`rich_text_caret`] works
//! around both.

use tracing::trace;

use crate::calculator::ASSUMED_LINE_HEIGHT;
use crate::geometry::CaretGeometry;

/// Kind of node the collapsed selection point sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapsedContainer {
    /// A text node, with the caret's character offset inside it.
    Text {
        /// Character offset of the caret within the text node.
        offset: usize,
    },
    /// Any non-text node.
    Element,
}

/// Read-only view of a surface's live selection.
pub trait SelectionProbe {
    /// Client rects of the first selection range collapsed to its end.
    ///
    /// Returns `None` when the surface has no selection at all.
    fn collapsed_rects(&self) -> Option<Vec<CaretGeometry>>;

    /// Node the collapsed point sits in, if any.
    fn collapsed_container(&self) -> Option<CollapsedContainer>;

    /// Client rects of a range spanning the single character before the caret.
    fn preceding_character_rects(&self) -> Vec<CaretGeometry>;

    /// Client rects of a range selecting the whole start container.
    fn container_contents_rects(&self) -> Vec<CaretGeometry>;

    /// Bounding rect of the nearest element ancestor of the start container.
    fn nearest_element_rect(&self) -> Option<CaretGeometry>;
}

/// Returns the caret rectangle of a rich-text surface, or `None` if the
/// selection cannot be measured.
pub fn rich_text_caret<P: SelectionProbe + ?Sized>(probe: &P) -> Option<CaretGeometry> {
    let mut rects = probe.collapsed_rects()?;
    if rects.is_empty() {
        rects = fallback_rects(probe);
    }

    let rect = *rects.first()?;
    if rect.is_zero_width() {
        return Some(fix_zero_width(rect, probe));
    }
    Some(rect)
}

fn fallback_rects<P: SelectionProbe + ?Sized>(probe: &P) -> Vec<CaretGeometry> {
    match probe.collapsed_container() {
        Some(CollapsedContainer::Text { offset }) if offset > 0 => {
            probe.preceding_character_rects()
        }
        Some(CollapsedContainer::Text { .. } | CollapsedContainer::Element) => {
            probe.container_contents_rects()
        }
        None => Vec::new(),
    }
}

/// Moves a zero-width caret to the left edge of its element, keeping the
/// vertical position and assuming a single line of text.
fn fix_zero_width<P: SelectionProbe + ?Sized>(rect: CaretGeometry, probe: &P) -> CaretGeometry {
    match probe.nearest_element_rect() {
        Some(parent) => {
            trace!(parent_left = parent.left, "zero-width caret moved to element edge");
            CaretGeometry::line(parent.left, rect.top, ASSUMED_LINE_HEIGHT)
        }
        None => rect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct FakeSelection {
        collapsed: Option<Vec<CaretGeometry>>,
        container: Option<CollapsedContainer>,
        preceding: Vec<CaretGeometry>,
        contents: Vec<CaretGeometry>,
        element: Option<CaretGeometry>,
    }

    impl SelectionProbe for FakeSelection {
        fn collapsed_rects(&self) -> Option<Vec<CaretGeometry>> {
            self.collapsed.clone()
        }

        fn collapsed_container(&self) -> Option<CollapsedContainer> {
            self.container
        }

        fn preceding_character_rects(&self) -> Vec<CaretGeometry> {
            self.preceding.clone()
        }

        fn container_contents_rects(&self) -> Vec<CaretGeometry> {
            self.contents.clone()
        }

        fn nearest_element_rect(&self) -> Option<CaretGeometry> {
            self.element
        }
    }

    #[test]
    fn test_no_selection() {
        let probe = FakeSelection::default();
        assert_eq!(rich_text_caret(&probe), None);
    }

    #[test]
    fn test_direct_rect() {
        let rect = CaretGeometry::new(40.0, 12.0, 1.0, 18.0);
        let probe = FakeSelection {
            collapsed: Some(vec![rect, CaretGeometry::new(0.0, 0.0, 5.0, 5.0)]),
            ..Default::default()
        };
        assert_eq!(rich_text_caret(&probe), Some(rect));
    }

    #[test]
    fn test_falls_back_to_preceding_character() {
        let prev = CaretGeometry::new(30.0, 12.0, 7.0, 18.0);
        let probe = FakeSelection {
            collapsed: Some(Vec::new()),
            container: Some(CollapsedContainer::Text { offset: 3 }),
            preceding: vec![prev],
            contents: vec![CaretGeometry::new(0.0, 0.0, 100.0, 18.0)],
            ..Default::default()
        };
        assert_eq!(rich_text_caret(&probe), Some(prev));
    }

    #[test]
    fn test_preceding_character_without_rects_gives_up() {
        let probe = FakeSelection {
            collapsed: Some(Vec::new()),
            container: Some(CollapsedContainer::Text { offset: 3 }),
            contents: vec![CaretGeometry::new(0.0, 0.0, 100.0, 18.0)],
            ..Default::default()
        };
        assert_eq!(rich_text_caret(&probe), None);
    }

    #[test]
    fn test_line_start_selects_container() {
        let contents = CaretGeometry::new(8.0, 64.0, 200.0, 18.0);
        for container in [
            CollapsedContainer::Text { offset: 0 },
            CollapsedContainer::Element,
        ] {
            let probe = FakeSelection {
                collapsed: Some(Vec::new()),
                container: Some(container),
                contents: vec![contents],
                ..Default::default()
            };
            assert_eq!(rich_text_caret(&probe), Some(contents));
        }
    }

    #[test]
    fn test_zero_width_uses_element_edge() {
        let probe = FakeSelection {
            collapsed: Some(vec![CaretGeometry::new(0.0, 90.0, 0.0, 0.0)]),
            element: Some(CaretGeometry::new(24.0, 80.0, 400.0, 120.0)),
            ..Default::default()
        };
        let caret = rich_text_caret(&probe).unwrap();
        assert_eq!(caret.left, 24.0);
        assert_eq!(caret.top, 90.0);
        assert_eq!(caret.bottom, 106.0);
        assert_eq!(caret.height, ASSUMED_LINE_HEIGHT);
    }

    #[test]
    fn test_zero_width_without_element() {
        let rect = CaretGeometry::new(5.0, 90.0, 0.0, 14.0);
        let probe = FakeSelection {
            collapsed: Some(vec![rect]),
            ..Default::default()
        };
        assert_eq!(rich_text_caret(&probe), Some(rect));
    }
}
