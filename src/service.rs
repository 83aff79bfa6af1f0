//! Resolution tasks
//!
//! Each submitted pass runs on the tokio runtime; the caller gets a handle
//! back immediately. A semaphore bounds how many passes run at once.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::constraints::ResolutionConstraint;
use crate::error::{ResolutionError, Result};
use crate::knowledge::{Instance, Knowledge};
use crate::resolver::{Outcome, Resolution, Resolver};
use crate::scope::ContextScope;

/// Cooperative cancellation flag, checked by the resolver between
/// candidates and between dependencies.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handle to a running pass.
#[derive(Debug)]
pub struct Task<T> {
    id: String,
    handle: JoinHandle<Result<T>>,
    cancel: CancellationToken,
}

pub type ResolutionTask = Task<Resolution>;
pub type ObservationTask = Task<ResolvedObservation>;

impl<T: Send + 'static> Task<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel(&self) {
        debug!("Cancelling task {}", self.id);
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the result.
    pub async fn get(self) -> Result<T> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ResolutionError::Cancelled(self.id)),
            Err(e) => Err(ResolutionError::TaskFailed {
                id: self.id,
                reason: e.to_string(),
            }),
        }
    }

    /// Wait for the result and return it only if it is a `U`.
    pub async fn get_as<U: 'static>(self) -> Result<Option<U>> {
        let value: Box<dyn Any> = Box::new(self.get().await?);
        Ok(value.downcast::<U>().ok().map(|v| *v))
    }
}

/// An observation after resolution of its observable.
#[derive(Debug, Clone)]
pub struct ResolvedObservation {
    pub observation: Instance,
    pub resolution: Resolution,
}

impl ResolvedObservation {
    pub fn is_resolved(&self) -> bool {
        self.resolution.outcome() == Outcome::Resolved
    }
}

pub struct ResolverService {
    resolver: Arc<Resolver>,
    permits: Arc<Semaphore>,
}

impl ResolverService {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        let workers = resolver.config().max_concurrent_resolutions.max(1);
        Self {
            resolver,
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Start resolving `knowledge`. The task id is the observation id for
    /// instances and a fresh id otherwise.
    pub fn submit(&self, knowledge: Knowledge, scope: ContextScope) -> ResolutionTask {
        let id = match &knowledge {
            Knowledge::Instance(instance) => instance.id.clone(),
            _ => Uuid::new_v4().to_string(),
        };
        let cancel = CancellationToken::new();

        let resolver = Arc::clone(&self.resolver);
        let permits = Arc::clone(&self.permits);
        let token = cancel.clone();
        let task_id = id.clone();

        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ResolutionError::Cancelled(task_id.clone()))?;
            if token.is_cancelled() {
                return Err(ResolutionError::Cancelled(task_id));
            }
            info!("Task {} started", task_id);
            resolver.resolve_with_cancel(knowledge, &scope, &token).await
        });

        Task { id, handle, cancel }
    }

    /// Resolve the observable of an observation within the observation's
    /// own extent.
    pub fn observe(&self, observation: Instance, scope: ContextScope) -> ObservationTask {
        let id = observation.id.clone();
        let cancel = CancellationToken::new();

        let resolver = Arc::clone(&self.resolver);
        let permits = Arc::clone(&self.permits);
        let token = cancel.clone();
        let task_id = id.clone();

        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ResolutionError::Cancelled(task_id.clone()))?;
            if token.is_cancelled() {
                return Err(ResolutionError::Cancelled(task_id));
            }

            let scope = if observation.extent.is_universal() {
                scope
            } else {
                let extent = scope.geometry().intersection(&observation.extent);
                scope.with_resolution_constraints([ResolutionConstraint::geometry(extent)])?
            };
            info!("Observation {} started", task_id);

            let resolution = resolver
                .resolve_with_cancel(Knowledge::Observable(observation.observable.clone()), &scope, &token)
                .await?;
            Ok(ResolvedObservation { observation, resolution })
        });

        Task { id, handle, cancel }
    }
}
