//! Knowledge Resolver
//!
//! Coverage-weighted resolution of observation requests:
//! - Coverage arithmetic over target extents
//! - Resolution graph with memoized, copy-on-write catalogs
//! - Recursive resolver over pluggable reasoner and resources services
//! - Constraint steering and multi-criteria candidate ranking
//! - Asynchronous resolution tasks

pub mod config;
pub mod constraints;
pub mod coverage;
pub mod error;
pub mod graph;
pub mod knowledge;
pub mod prioritizer;
pub mod resolver;
pub mod scope;
pub mod service;
pub mod telemetry;

// Re-exports for convenience
pub use config::{CoverageThresholds, ResolverConfig};
pub use constraints::{ConstraintKind, ConstraintSet, ResolutionConstraint};
pub use coverage::{Coverage, DimensionType, Extent, LogicalConnector, Span};
pub use error::{ResolutionError, Result};
pub use graph::{EdgeType, NodeId, ResolutionGraph};
pub use knowledge::{Concept, ConceptType, DescriptionType, Instance, Knowledge, Model, ObservationStrategy, Observable};
pub use prioritizer::{Prioritizer, RankingStrategy};
pub use resolver::{Outcome, Reasoner, Resolution, Resolver, ResourcesService};
pub use scope::ContextScope;
pub use service::{CancellationToken, ObservationTask, ResolutionTask, ResolverService};
