//! Property-based tests for coverage arithmetic.
//!
//! Coverages are generated over a fixed space/time target, either as exact
//! footprints (full coverage restricted to a random box) or as scalar-only
//! proportions.

use knowledge_resolver::coverage::Span;
use knowledge_resolver::{Coverage, CoverageThresholds, DimensionType, Extent, LogicalConnector};
use proptest::prelude::*;

const EPS: f64 = 1e-9;

fn target() -> Extent {
    Extent::space(0.0, 100.0).with(DimensionType::Time, Span::new(0.0, 10.0))
}

fn interval(max: f64) -> impl Strategy<Value = (f64, f64)> {
    (0.0..max, 0.0..max).prop_map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
}

fn footprint() -> impl Strategy<Value = Coverage> {
    (interval(100.0), interval(10.0)).prop_map(|((s0, s1), (t0, t1))| {
        let window = Extent::space(s0, s1).with(DimensionType::Time, Span::new(t0, t1));
        Coverage::create(target(), 1.0, CoverageThresholds::default()).within(&window)
    })
}

fn scalar() -> impl Strategy<Value = Coverage> {
    (0.0f64..=1.0).prop_map(|p| Coverage::create(target(), p, CoverageThresholds::default()))
}

fn coverage() -> impl Strategy<Value = Coverage> {
    prop_oneof![footprint(), scalar()]
}

fn thresholds() -> impl Strategy<Value = CoverageThresholds> {
    (0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0).prop_map(|(a, b, c)| {
        let mut v = [a, b, c];
        v.sort_by(f64::total_cmp);
        CoverageThresholds { empty: v[0], relevant: v[1], complete: v[2] }
    })
}

// =============================================================================
// Threshold Laws
// =============================================================================

proptest! {
    /// complete implies relevant implies not empty
    #[test]
    fn prop_threshold_laws(t in thresholds(), p in 0.0f64..=1.0) {
        let c = Coverage::create(target(), p, t);
        if c.is_complete() {
            prop_assert!(c.is_relevant());
        }
        if c.is_relevant() {
            prop_assert!(!c.is_empty());
        }
    }

    #[test]
    fn prop_proportion_in_unit_range(c in coverage()) {
        prop_assert!((0.0..=1.0).contains(&c.proportion()));
    }
}

// =============================================================================
// Union
// =============================================================================

proptest! {
    /// max(a, b) <= a ∪ b <= min(1, a + b)
    #[test]
    fn prop_union_bounds(a in coverage(), b in coverage()) {
        let united = a.merge(&b, LogicalConnector::Union).unwrap();
        let (pa, pb) = (a.proportion(), b.proportion());
        prop_assert!(united.proportion() >= pa.max(pb) - EPS);
        prop_assert!(united.proportion() <= (pa + pb).min(1.0) + EPS);
    }

    #[test]
    fn prop_union_gain_is_the_increase(a in coverage(), b in coverage()) {
        let united = a.merge(&b, LogicalConnector::Union).unwrap();
        prop_assert!(united.gain() >= -EPS);
        prop_assert!((united.gain() - (united.proportion() - a.proportion())).abs() < EPS);
    }

    #[test]
    fn prop_union_idempotent(a in coverage()) {
        let united = a.merge(&a, LogicalConnector::Union).unwrap();
        prop_assert!((united.proportion() - a.proportion()).abs() < EPS);
        prop_assert!(united.gain().abs() < EPS);
    }

    #[test]
    fn prop_union_leaves_operands_alone(a in coverage(), b in coverage()) {
        let (a0, b0) = (a.clone(), b.clone());
        let _ = a.merge(&b, LogicalConnector::Union).unwrap();
        prop_assert_eq!(a, a0);
        prop_assert_eq!(b, b0);
    }
}

// =============================================================================
// Intersection
// =============================================================================

proptest! {
    /// a ∩ b <= min(a, b)
    #[test]
    fn prop_intersection_bounded(a in coverage(), b in coverage()) {
        let common = a.merge(&b, LogicalConnector::Intersection).unwrap();
        prop_assert!(common.proportion() <= a.proportion().min(b.proportion()) + EPS);
        prop_assert!(common.gain() <= EPS);
        prop_assert!(common.gain() >= -1.0);
    }

    #[test]
    fn prop_intersection_with_empty_is_empty(a in coverage()) {
        let nothing = Coverage::create(target(), 0.0, CoverageThresholds::default());
        let common = a.merge(&nothing, LogicalConnector::Intersection).unwrap();
        prop_assert_eq!(common.proportion(), 0.0);
    }

    #[test]
    fn prop_exclusion_always_rejected(a in coverage(), b in coverage()) {
        prop_assert!(a.merge(&b, LogicalConnector::Exclusion).is_err());
    }
}

// =============================================================================
// Restriction
// =============================================================================

proptest! {
    #[test]
    fn prop_within_never_grows(a in coverage(), (s0, s1) in interval(100.0)) {
        let restricted = a.within(&Extent::space(s0, s1));
        prop_assert!(restricted.proportion() <= a.proportion() + EPS);
    }
}
