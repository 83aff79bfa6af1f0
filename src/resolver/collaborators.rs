//! Services the resolver depends on
//!
//! Both are read-only from the resolver's point of view and may be remote.
//! Their errors surface as `CollaboratorUnavailable`; retrying is up to the
//! client implementations.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::knowledge::{Model, ObservationStrategy, Observable};
use crate::scope::ContextScope;

/// Classifies observables and decides how they can be observed.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Applicable strategies, best first.
    async fn infer_strategies(&self, observable: &Observable, scope: &ContextScope) -> Result<Vec<ObservationStrategy>>;
}

/// Catalog of model definitions.
#[async_trait]
pub trait ResourcesService: Send + Sync {
    async fn query_models(&self, observable: &Observable, scope: &ContextScope) -> Result<ResourceSet>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// A candidate as returned by a catalog query. The definition may be missing
/// when the catalog only knows the model by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub urn: String,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub definition: Option<Model>,
}

impl ModelDescriptor {
    pub fn new(model: Model) -> Self {
        Self {
            urn: model.urn.clone(),
            server: model.server.clone(),
            definition: Some(model),
        }
    }

    /// The model, tagged with the serving server when the catalog reports one.
    pub fn load(&self) -> Option<Arc<Model>> {
        let mut model = self.definition.clone()?;
        if model.server.is_none() {
            model.server = self.server.clone();
        }
        Some(Arc::new(model))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub results: Vec<ModelDescriptor>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl ResourceSet {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Reasoner that only ever proposes direct observation.
#[derive(Debug, Clone, Default)]
pub struct DirectReasoner;

#[async_trait]
impl Reasoner for DirectReasoner {
    async fn infer_strategies(&self, _observable: &Observable, _scope: &ContextScope) -> Result<Vec<ObservationStrategy>> {
        Ok(vec![ObservationStrategy::Direct])
    }
}

/// In-process model catalog. Matches on the urn of any output.
#[derive(Debug, Default)]
pub struct InMemoryResources {
    models: RwLock<Vec<Model>>,
}

impl InMemoryResources {
    pub fn new(models: impl IntoIterator<Item = Model>) -> Self {
        Self { models: RwLock::new(models.into_iter().collect()) }
    }

    pub async fn register(&self, model: Model) {
        self.models.write().await.push(model);
    }
}

#[async_trait]
impl ResourcesService for InMemoryResources {
    async fn query_models(&self, observable: &Observable, _scope: &ContextScope) -> Result<ResourceSet> {
        let models = self.models.read().await;
        let results = models
            .iter()
            .filter(|m| m.outputs.iter().any(|o| o.urn == observable.urn))
            .cloned()
            .map(ModelDescriptor::new)
            .collect();
        Ok(ResourceSet { results, notifications: Vec::new() })
    }
}
