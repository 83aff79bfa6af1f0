//! Resolution errors
//!
//! Only contract violations and infrastructure failures are errors. A request
//! that simply cannot be satisfied is expressed as an empty or partial
//! [`Coverage`](crate::coverage::Coverage), never as one of these.

use thiserror::Error;

use crate::coverage::LogicalConnector;
use crate::knowledge::KnowledgeKind;

/// Crate result type
pub type Result<T> = std::result::Result<T, ResolutionError>;

#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The knowledge kind cannot be turned into an observable.
    #[error("{kind:?} '{urn}' is not resolvable")]
    NotResolvable { kind: KnowledgeKind, urn: String },

    /// `accept()` called on a node that is not a complete root.
    #[error("illegal acceptance of node {node}: {reason}")]
    IllegalAcceptance { node: usize, reason: String },

    #[error("coverage merge with {0:?} is not supported")]
    UnsupportedMergeKind(LogicalConnector),

    /// A reasoner or resources call failed. Never retried by the resolver.
    #[error("{service} unavailable: {source}")]
    CollaboratorUnavailable {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot merge {left} constraint with {right} constraint")]
    ConstraintMismatch { left: String, right: String },

    #[error("resolution of '{0}' was cancelled")]
    Cancelled(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The worker running a task panicked or was aborted.
    #[error("task {id} failed: {reason}")]
    TaskFailed { id: String, reason: String },
}

impl ResolutionError {
    /// Contract violations abort a pass and are reported as internal errors,
    /// as opposed to "could not resolve".
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ResolutionError::NotResolvable { .. }
                | ResolutionError::IllegalAcceptance { .. }
                | ResolutionError::UnsupportedMergeKind(_)
                | ResolutionError::ConstraintMismatch { .. }
        )
    }

    pub(crate) fn collaborator(service: &'static str, source: anyhow::Error) -> Self {
        ResolutionError::CollaboratorUnavailable { service, source }
    }
}
