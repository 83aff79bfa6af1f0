//! Observation strategies, as inferred by the reasoner.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Observable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObservationStrategy {
    /// Look for models that produce the observable.
    Direct,
    /// Observe `deferred` first (usually the instances the observable is
    /// inherent to), then observe the observable within each of them.
    Deferral { deferred: Observable },
    /// Already available in the context.
    Resolved,
    /// Observe directly, then apply models of `filter` to the result.
    Filtering { filter: Observable },
}

impl ObservationStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ObservationStrategy::Direct => "direct",
            ObservationStrategy::Deferral { .. } => "deferral",
            ObservationStrategy::Resolved => "resolved",
            ObservationStrategy::Filtering { .. } => "filtering",
        }
    }
}

impl fmt::Display for ObservationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationStrategy::Deferral { deferred } => write!(f, "deferral to {deferred}"),
            ObservationStrategy::Filtering { filter } => write!(f, "filtering by {filter}"),
            other => write!(f, "{}", other.name()),
        }
    }
}
