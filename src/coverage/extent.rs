//! Extents
//!
//! The resolver treats geometry as opaque except for one thing: it needs to
//! know how much of a target a candidate covers. Each dimension is therefore
//! reduced to a set of intervals on one axis, which is enough to compute
//! exact overlaps for unions and intersections.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Topological dimension of an extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionType {
    Space,
    Time,
    Numeric,
}

impl fmt::Display for DimensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionType::Space => write!(f, "space"),
            DimensionType::Time => write!(f, "time"),
            DimensionType::Numeric => write!(f, "numeric"),
        }
    }
}

/// Closed-open interval on one axis. Zero-length intervals stand for points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_point(&self) -> bool {
        self.start == self.end
    }
}

/// A normalized set of disjoint intervals along one dimension, sorted by start,
/// with an optional grain (the resolution of the underlying representation).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Span {
    intervals: Vec<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grain: Option<f64>,
}

impl Span {
    pub fn new(start: f64, end: f64) -> Self {
        Self::from_intervals([Interval::new(start, end)])
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let mut sorted: Vec<Interval> = intervals
            .into_iter()
            .filter(|i| i.start.is_finite() && i.end.is_finite())
            .collect();
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
        for interval in sorted {
            match merged.last_mut() {
                Some(last) if interval.start <= last.end => {
                    if interval.end > last.end {
                        last.end = interval.end;
                    }
                }
                _ => merged.push(interval),
            }
        }

        Self { intervals: merged, grain: None }
    }

    pub fn with_grain(mut self, grain: f64) -> Self {
        self.grain = Some(grain);
        self
    }

    pub fn grain(&self) -> Option<f64> {
        self.grain
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Total length covered, saturating at `f64::MAX`.
    pub fn size(&self) -> f64 {
        self.intervals.iter().map(Interval::len).sum::<f64>().min(f64::MAX)
    }

    /// Half the total length. Finite for any finite endpoints.
    fn half_size(&self) -> f64 {
        self.intervals.iter().map(|i| i.end * 0.5 - i.start * 0.5).sum()
    }

    pub fn union(&self, other: &Span) -> Span {
        let mut ret = Span::from_intervals(self.intervals.iter().chain(other.intervals.iter()).copied());
        ret.grain = finer(self.grain, other.grain);
        ret
    }

    pub fn intersection(&self, other: &Span) -> Span {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.intervals.len() && j < other.intervals.len() {
            let a = self.intervals[i];
            let b = other.intervals[j];
            let start = a.start.max(b.start);
            let end = a.end.min(b.end);
            if start < end || (start == end && (a.is_point() || b.is_point())) {
                out.push(Interval { start, end });
            }
            if a.end < b.end {
                i += 1;
            } else {
                j += 1;
            }
        }
        let mut ret = Span::from_intervals(out);
        ret.grain = finer(self.grain, other.grain);
        ret
    }

    /// True if `other` lies entirely inside this span.
    pub fn contains(&self, other: &Span) -> bool {
        other.intervals.iter().all(|o| {
            self.intervals
                .iter()
                .any(|s| s.start <= o.start && o.end <= s.end)
        })
    }

    /// Fraction of `target` covered by this span. A zero-size target counts as
    /// covered if anything at all intersects it.
    pub fn fraction_of(&self, target: &Span) -> f64 {
        let target_size = target.half_size();
        let covered = self.intersection(target);
        if target_size <= 0.0 {
            return if covered.is_empty() { 0.0 } else { 1.0 };
        }
        (covered.half_size() / target_size).clamp(0.0, 1.0)
    }
}

fn finer(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// A multi-dimensional extent. An extent with no dimensions is universal:
/// it constrains nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Extent {
    dimensions: BTreeMap<DimensionType, Span>,
}

impl Extent {
    pub fn universal() -> Self {
        Self::default()
    }

    pub fn with(mut self, dimension: DimensionType, span: Span) -> Self {
        self.dimensions.insert(dimension, span);
        self
    }

    pub fn space(start: f64, end: f64) -> Self {
        Self::universal().with(DimensionType::Space, Span::new(start, end))
    }

    pub fn time(start: f64, end: f64) -> Self {
        Self::universal().with(DimensionType::Time, Span::new(start, end))
    }

    pub fn dimension(&self, dimension: DimensionType) -> Option<&Span> {
        self.dimensions.get(&dimension)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = (DimensionType, &Span)> {
        self.dimensions.iter().map(|(d, s)| (*d, s))
    }

    pub fn dimension_types(&self) -> impl Iterator<Item = DimensionType> + '_ {
        self.dimensions.keys().copied()
    }

    pub fn is_universal(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Size along one dimension, None if the extent does not specify it.
    pub fn size(&self, dimension: DimensionType) -> Option<f64> {
        self.dimensions.get(&dimension).map(Span::size)
    }

    /// Intersect dimension by dimension. A dimension that only one side
    /// specifies is taken from that side.
    pub fn intersection(&self, other: &Extent) -> Extent {
        let mut dimensions = self.dimensions.clone();
        for (dim, span) in &other.dimensions {
            let merged = match dimensions.get(dim) {
                Some(mine) => mine.intersection(span),
                None => span.clone(),
            };
            dimensions.insert(*dim, merged);
        }
        Extent { dimensions }
    }

    /// True if some specified dimension has been intersected away.
    pub fn is_empty(&self) -> bool {
        self.dimensions.values().any(Span::is_empty)
    }
}

/// Usage constraint carried by a coverage, checked against a candidate extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtentConstraint {
    /// The candidate must specify this dimension.
    RequiresDimension { dimension: DimensionType },
    /// The candidate's grain along the dimension must be within [min, max].
    GrainRange { dimension: DimensionType, min: f64, max: f64 },
    /// The candidate must lie inside the span.
    Within { dimension: DimensionType, span: Span },
}

impl ExtentConstraint {
    pub fn is_satisfied_by(&self, extent: &Extent) -> bool {
        match self {
            ExtentConstraint::RequiresDimension { dimension } => extent.dimension(*dimension).is_some(),
            ExtentConstraint::GrainRange { dimension, min, max } => extent
                .dimension(*dimension)
                .and_then(Span::grain)
                .map(|g| *min <= g && g <= *max)
                .unwrap_or(false),
            ExtentConstraint::Within { dimension, span } => extent
                .dimension(*dimension)
                .map(|s| span.contains(s))
                .unwrap_or(false),
        }
    }
}
