//! Coverage
//!
//! A coverage records how much of a target extent has been satisfied by the
//! knowledge accepted so far. It starts at 0 (an abstract request) or 1 (an
//! existing artifact) and only changes by merging: UNION adds alternative
//! resolutions, INTERSECTION narrows by dependencies. Every merge returns a new
//! value and reports the gain relative to what was there before.
//!
//! When both sides know their footprint as interval spans, overlaps are
//! computed exactly. Otherwise a union falls back to `min(1, a + b)`, a
//! conservative approximation that counts overlapping contributions twice.
//! Source ids keep that approximation from counting the same contribution
//! twice.

pub mod extent;

pub use extent::{DimensionType, Extent, ExtentConstraint, Interval, Span};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::config::CoverageThresholds;
use crate::error::{ResolutionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalConnector {
    Union,
    Intersection,
    /// Referenced by the vocabulary but never implemented; merging with it fails.
    Exclusion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spans", rename_all = "snake_case")]
enum Footprint {
    /// Covered part of each target dimension. The covered set is the product
    /// of the spans.
    Spans(BTreeMap<DimensionType, Span>),
    /// Only the scalar proportion is known.
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    target: Extent,
    footprint: Footprint,
    proportion: f64,
    per_dimension: BTreeMap<DimensionType, f64>,
    constraints: Vec<ExtentConstraint>,
    gain: f64,
    sources: BTreeSet<Uuid>,
    thresholds: CoverageThresholds,
}

impl Coverage {
    /// Coverage of `target` at an initial proportion. 0 and 1 produce exact
    /// footprints; anything in between is scalar only.
    pub fn create(target: Extent, initial: f64, thresholds: CoverageThresholds) -> Self {
        let initial = if initial.is_nan() { 0.0 } else { initial.clamp(0.0, 1.0) };
        let footprint = if initial == 0.0 {
            Footprint::Spans(target.dimensions().map(|(d, _)| (d, Span::empty())).collect())
        } else if initial == 1.0 {
            Footprint::Spans(target.dimensions().map(|(d, s)| (d, s.clone())).collect())
        } else {
            Footprint::Opaque
        };

        Self::assemble(
            target,
            footprint,
            initial,
            Vec::new(),
            BTreeSet::from([Uuid::new_v4()]),
            thresholds,
        )
    }

    /// Covers everything; merging it in changes nothing that matters.
    pub fn universal(thresholds: CoverageThresholds) -> Self {
        Self::create(Extent::universal(), 1.0, thresholds)
    }

    pub fn empty(thresholds: CoverageThresholds) -> Self {
        Self::create(Extent::universal(), 0.0, thresholds)
    }

    fn assemble(
        target: Extent,
        footprint: Footprint,
        scalar: f64,
        constraints: Vec<ExtentConstraint>,
        sources: BTreeSet<Uuid>,
        thresholds: CoverageThresholds,
    ) -> Self {
        let mut per_dimension = BTreeMap::new();
        let mut proportion = scalar;

        if let Footprint::Spans(spans) = &footprint {
            if !target.is_universal() {
                proportion = 1.0;
                for (dim, target_span) in target.dimensions() {
                    let fraction = spans.get(&dim).map(|s| s.fraction_of(target_span)).unwrap_or(0.0);
                    per_dimension.insert(dim, fraction);
                    proportion *= fraction;
                }
            }
        }

        Self {
            target,
            footprint,
            proportion: proportion.clamp(0.0, 1.0),
            per_dimension,
            constraints,
            gain: 0.0,
            sources,
            thresholds,
        }
    }

    fn derive(&self, footprint: Footprint, scalar: f64, other: Option<&Coverage>, previous: f64) -> Self {
        let mut constraints = self.constraints.clone();
        let mut sources = self.sources.clone();
        if let Some(other) = other {
            for c in &other.constraints {
                if !constraints.contains(c) {
                    constraints.push(c.clone());
                }
            }
            sources.extend(other.sources.iter().copied());
        }

        let mut ret = Self::assemble(self.target.clone(), footprint, scalar, constraints, sources, self.thresholds);
        ret.gain = (ret.proportion - previous).clamp(-1.0, 1.0);
        ret
    }

    pub fn with_constraint(mut self, constraint: ExtentConstraint) -> Self {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
        self
    }

    pub fn with_thresholds(mut self, thresholds: CoverageThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Merge another coverage into a new value. Neither operand changes.
    pub fn merge(&self, other: &Coverage, how: LogicalConnector) -> Result<Coverage> {
        match how {
            LogicalConnector::Union => Ok(self.union(other)),
            LogicalConnector::Intersection => Ok(self.intersection(other)),
            LogicalConnector::Exclusion => Err(ResolutionError::UnsupportedMergeKind(how)),
        }
    }

    /// The part of `other` inside our target along every target dimension, or
    /// None if `other` has no usable footprint. A dimension `other` does not
    /// constrain counts as fully covered unless `other` is empty.
    fn projected(&self, other: &Coverage) -> Option<BTreeMap<DimensionType, Span>> {
        let Footprint::Spans(spans) = &other.footprint else {
            return None;
        };
        if self.target.is_universal() {
            return None;
        }
        Some(
            self.target
                .dimensions()
                .map(|(dim, target_span)| {
                    let span = match spans.get(&dim) {
                        Some(span) => span.intersection(target_span),
                        None if other.proportion > 0.0 => target_span.clone(),
                        None => Span::empty(),
                    };
                    (dim, span)
                })
                .collect(),
        )
    }

    fn product_fraction(&self, spans: &BTreeMap<DimensionType, Span>) -> f64 {
        self.target
            .dimensions()
            .map(|(dim, target_span)| spans.get(&dim).map(|s| s.fraction_of(target_span)).unwrap_or(0.0))
            .product()
    }

    fn union(&self, other: &Coverage) -> Coverage {
        let a = self.proportion;

        if let (Footprint::Spans(mine), Some(theirs)) = (&self.footprint, self.projected(other)) {
            let differing = self
                .target
                .dimension_types()
                .filter(|d| mine.get(d).map(Span::intervals) != theirs.get(d).map(Span::intervals))
                .count();

            // Products that agree on all but one dimension unite into a product.
            if differing <= 1 {
                let spans = self
                    .target
                    .dimension_types()
                    .map(|d| {
                        let m = mine.get(&d).cloned().unwrap_or_default();
                        let t = theirs.get(&d).cloned().unwrap_or_default();
                        (d, m.union(&t))
                    })
                    .collect();
                return self.derive(Footprint::Spans(spans), 0.0, Some(other), a);
            }

            // Otherwise inclusion-exclusion on the two products is still exact,
            // but the result is no longer a product.
            let b = self.product_fraction(&theirs);
            let overlap: BTreeMap<DimensionType, Span> = self
                .target
                .dimension_types()
                .map(|d| {
                    let m = mine.get(&d).cloned().unwrap_or_default();
                    let t = theirs.get(&d).cloned().unwrap_or_default();
                    (d, m.intersection(&t))
                })
                .collect();
            let united = (a + b - self.product_fraction(&overlap)).clamp(a.max(b), (a + b).min(1.0));
            return self.derive(Footprint::Opaque, united, Some(other), a);
        }

        let b = other.proportion;
        let united = if other.sources.is_subset(&self.sources) || self.sources.is_subset(&other.sources) {
            a.max(b)
        } else {
            (a + b).min(1.0)
        };
        self.derive(Footprint::Opaque, united, Some(other), a)
    }

    fn intersection(&self, other: &Coverage) -> Coverage {
        let (a, b) = (self.proportion, other.proportion);
        let previous = a.min(b);

        if a == 0.0 || b == 0.0 {
            let empty = self.target.dimension_types().map(|d| (d, Span::empty())).collect();
            return self.derive(Footprint::Spans(empty), 0.0, Some(other), previous);
        }

        if let (Footprint::Spans(mine), Some(theirs)) = (&self.footprint, self.projected(other)) {
            let spans = self
                .target
                .dimension_types()
                .map(|d| {
                    let m = mine.get(&d).cloned().unwrap_or_default();
                    let t = theirs.get(&d).cloned().unwrap_or_default();
                    (d, m.intersection(&t))
                })
                .collect();
            return self.derive(Footprint::Spans(spans), 0.0, Some(other), previous);
        }

        self.derive(Footprint::Opaque, a * b, Some(other), previous)
    }

    /// Restrict to the part of the target inside `extent`.
    pub fn within(&self, extent: &Extent) -> Coverage {
        let previous = self.proportion;
        match &self.footprint {
            Footprint::Spans(spans) if !self.target.is_universal() => {
                let restricted = spans
                    .iter()
                    .map(|(d, s)| {
                        let span = match extent.dimension(*d) {
                            Some(limit) => s.intersection(limit),
                            None => s.clone(),
                        };
                        (*d, span)
                    })
                    .collect();
                self.derive(Footprint::Spans(restricted), 0.0, None, previous)
            }
            _ => {
                let factor: f64 = extent
                    .dimensions()
                    .filter_map(|(d, span)| self.target.dimension(d).map(|t| span.fraction_of(t)))
                    .product();
                self.derive(Footprint::Opaque, self.proportion * factor, None, previous)
            }
        }
    }

    /// Overall proportion covered, in [0, 1].
    pub fn proportion(&self) -> f64 {
        self.proportion
    }

    /// Proportion covered along one dimension, when per-dimension data exists.
    pub fn get_coverage(&self, dimension: DimensionType) -> Option<f64> {
        self.per_dimension.get(&dimension).copied()
    }

    pub fn per_dimension(&self) -> &BTreeMap<DimensionType, f64> {
        &self.per_dimension
    }

    /// Change produced by the merge that created this value, in [-1, 1].
    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn target(&self) -> &Extent {
        &self.target
    }

    pub fn constraints(&self) -> &[ExtentConstraint] {
        &self.constraints
    }

    pub fn thresholds(&self) -> CoverageThresholds {
        self.thresholds
    }

    /// True iff every stored constraint holds for the candidate extent.
    pub fn check_constraints(&self, candidate: &Extent) -> bool {
        self.constraints.iter().all(|c| c.is_satisfied_by(candidate))
    }

    pub fn is_empty(&self) -> bool {
        self.proportion < self.thresholds.empty
    }

    pub fn is_relevant(&self) -> bool {
        self.proportion >= self.thresholds.relevant
    }

    pub fn is_complete(&self) -> bool {
        self.proportion >= self.thresholds.complete
    }

    pub fn is_universal(&self) -> bool {
        self.target.is_universal() && self.proportion >= 1.0
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.proportion * 100.0)?;
        if self.gain != 0.0 {
            write!(f, " ({:+.1}%)", self.gain * 100.0)?;
        }
        Ok(())
    }
}
