//! Property-based tests for the adjustment pipeline.
//!
//! Output coordinates are rounded to three decimals, so geometric checks
//! allow a matching tolerance.

mod common;

use proptest::prelude::*;

use patternforge_core::{apply_rules, BlockFamily, ErrorKind, Landmark, Operation, Piece, RawRule};

use common::{anchors, base, extent, hem_y};

const TOLERANCE: f64 = 1e-3;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOLERANCE
}

fn any_family() -> impl Strategy<Value = BlockFamily> {
    prop::sample::select(BlockFamily::ALL.to_vec())
}

fn long_bodied_family() -> impl Strategy<Value = BlockFamily> {
    prop_oneof![Just(BlockFamily::Tshirt), Just(BlockFamily::LongSleeve)]
}

/// Rule sequences built from operations that stay well inside the base blocks.
fn safe_rules() -> impl Strategy<Value = Vec<RawRule>> {
    let rule = prop_oneof![
        (0.0f64..=10.0).prop_map(|v| RawRule::new("crop_hem", v)),
        (0.0f64..=6.0).prop_map(|v| RawRule::new("lower_neckline", v)),
        (0.0f64..=10.0).prop_map(|v| RawRule::new("widen_sleeve", v)),
        (0.0f64..=10.0).prop_map(|v| RawRule::new("add_ease_body", v)),
        (0.0f64..=10.0).prop_map(|v| RawRule::new("shorten_sleeve", v)),
    ];
    prop::collection::vec(rule, 1..6)
}

proptest! {
    #[test]
    fn crop_hem_moves_hem_by_value(value in 0.0f64..=25.0) {
        let out = apply_rules(BlockFamily::Tshirt, &base(BlockFamily::Tshirt), &[RawRule::new("crop_hem", value)]).unwrap();
        let front = &out.documents[&Piece::Front];

        let (top, bottom) = extent(front, Landmark::HemLine);
        prop_assert!(close(top, 100.0 - value));
        prop_assert!(close(bottom, 100.0 - value));

        // the side seam still ends on the hem
        let (_, hem_end) = anchors(front, Landmark::HemLine);
        let (seam_start, seam_end) = anchors(front, Landmark::SideSeam);
        prop_assert!(close(seam_start.y, 30.0));
        prop_assert!(seam_end.distance(hem_end) <= TOLERANCE);
    }

    #[test]
    fn body_length_is_signed(family in long_bodied_family(), value in -30.0f64..=30.0) {
        let out = apply_rules(family, &base(family), &[RawRule::new("adjust_body_length", value)]).unwrap();
        let (top, _) = extent(&out.documents[&Piece::Back], Landmark::HemLine);
        prop_assert!(close(top, hem_y(family) + value));
    }

    #[test]
    fn widen_sleeve_grows_width_by_value(value in 0.0f64..=15.0) {
        let out = apply_rules(BlockFamily::CropTop, &base(BlockFamily::CropTop), &[RawRule::new("widen_sleeve", value)]).unwrap();
        let sleeve = &out.documents[&Piece::Sleeve];

        let (left, right) = anchors(sleeve, Landmark::SleeveWidthLine);
        prop_assert!(close(right.x - left.x, 44.0 + value));

        // the cap follows the width line at both ends
        let (cap_left, cap_right) = anchors(sleeve, Landmark::ArmholeCurve);
        prop_assert!(cap_left.distance(left) <= TOLERANCE);
        prop_assert!(cap_right.distance(right) <= TOLERANCE);
    }

    #[test]
    fn application_is_deterministic(rules in safe_rules()) {
        let pieces = base(BlockFamily::Tshirt);
        let a = apply_rules(BlockFamily::Tshirt, &pieces, &rules).map_err(|e| e.envelope());
        let b = apply_rules(BlockFamily::Tshirt, &pieces, &rules).map_err(|e| e.envelope());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn values_past_the_range_are_rejected(value in 30.001f64..1.0e6) {
        let err = apply_rules(BlockFamily::Tshirt, &base(BlockFamily::Tshirt), &[RawRule::new("crop_hem", value)]).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn zero_value_never_changes_markup(family in any_family(), op in prop::sample::select(Operation::ALL.to_vec())) {
        let pieces = base(family);
        let out = apply_rules(family, &pieces, &[RawRule::new(op.as_str(), 0.0)]).unwrap();
        prop_assert_eq!(out.documents, pieces);
    }

    #[test]
    fn disjoint_rules_compose(family in long_bodied_family(), crop in 0.0f64..=20.0, lower in 0.0f64..=12.0) {
        let pieces = base(family);
        let crop = RawRule::new("crop_hem", crop);
        let lower = RawRule::new("lower_neckline", lower);

        let both = apply_rules(family, &pieces, &[crop.clone(), lower.clone()]).unwrap();
        let first = apply_rules(family, &pieces, &[crop]).unwrap();
        let second = apply_rules(family, &first.documents, &[lower]).unwrap();
        prop_assert_eq!(second.documents, both.documents);
    }
}
