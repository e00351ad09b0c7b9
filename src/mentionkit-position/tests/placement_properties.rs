//! Property tests for popup placement.
//!
//! - refining twice with the same inputs never drifts
//! - a box no larger than the viewport stays inside it for any caret inside it

use mentionkit_position::{CaretGeometry, ESTIMATED_BOX, PositionCalculator, Size};
use proptest::prelude::*;

fn scenario() -> impl Strategy<Value = (Size, CaretGeometry, Size)> {
    (200.0f64..2000.0, 200.0f64..1400.0).prop_flat_map(|(vw, vh)| {
        (
            Just(Size::new(vw, vh)),
            (0.0..vw, 0.0..vh).prop_map(|(x, y)| CaretGeometry::new(x, y, 1.0, 16.0)),
            (1.0..=vw, 1.0..=vh).prop_map(|(w, h)| Size::new(w, h)),
        )
    })
}

proptest! {
    #[test]
    fn refine_is_idempotent((viewport, caret, actual) in scenario()) {
        let mut calc = PositionCalculator::new();
        calc.estimate(Some(caret), viewport, ESTIMATED_BOX).unwrap();

        let first = calc.refine(actual, viewport).unwrap();
        let second = calc.refine(actual, viewport).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn refined_box_stays_in_viewport((viewport, caret, actual) in scenario()) {
        let mut calc = PositionCalculator::new();
        calc.estimate(Some(caret), viewport, ESTIMATED_BOX).unwrap();
        let placement = calc.refine(actual, viewport).unwrap();

        prop_assert!(placement.left >= 0.0);
        prop_assert!(placement.left + actual.width <= viewport.width + 1e-9);
        prop_assert!(placement.top >= 0.0);
        prop_assert!(placement.top + actual.height <= viewport.height + 1e-9);
    }

    #[test]
    fn estimated_placeholder_stays_in_large_viewport(
        (viewport, caret, _) in scenario().prop_filter(
            "viewport must hold the placeholder",
            |(v, _, _)| v.width >= ESTIMATED_BOX.width && v.height >= ESTIMATED_BOX.height,
        )
    ) {
        let mut calc = PositionCalculator::new();
        let placement = calc.estimate(Some(caret), viewport, ESTIMATED_BOX).unwrap();

        prop_assert!(placement.left >= 0.0);
        prop_assert!(placement.left + ESTIMATED_BOX.width <= viewport.width + 1e-9);
        prop_assert!(placement.top >= 0.0);
        prop_assert!(placement.top + ESTIMATED_BOX.height <= viewport.height + 1e-9);
    }
}
