#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use knowledge_resolver::resolver::{ModelDescriptor, ResourceSet};
use knowledge_resolver::telemetry;
use knowledge_resolver::{
    ContextScope, Extent, Model, ObservationStrategy, Observable, Reasoner, Resolver, ResolverConfig, ResourcesService,
};

/// Reasoner returning scripted strategies per observable urn, DIRECT
/// otherwise. Counts calls per urn.
#[derive(Default)]
pub struct ScriptedReasoner {
    strategies: HashMap<String, Vec<ObservationStrategy>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, urn: &str, strategies: Vec<ObservationStrategy>) -> Self {
        self.strategies.insert(urn.to_string(), strategies);
        self
    }

    pub async fn calls(&self, urn: &str) -> usize {
        self.calls.lock().await.get(urn).copied().unwrap_or(0)
    }

    pub async fn total_calls(&self) -> usize {
        self.calls.lock().await.values().sum()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn infer_strategies(&self, observable: &Observable, _scope: &ContextScope) -> Result<Vec<ObservationStrategy>> {
        *self.calls.lock().await.entry(observable.urn.clone()).or_default() += 1;
        Ok(self
            .strategies
            .get(&observable.urn)
            .cloned()
            .unwrap_or_else(|| vec![ObservationStrategy::Direct]))
    }
}

/// Catalog returning models in registration order. Counts queries per urn.
#[derive(Default)]
pub struct CountingResources {
    models: Vec<Model>,
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingResources {
    pub fn new(models: Vec<Model>) -> Self {
        Self { models, calls: Mutex::new(HashMap::new()) }
    }

    pub async fn calls(&self, urn: &str) -> usize {
        self.calls.lock().await.get(urn).copied().unwrap_or(0)
    }

    pub async fn total_calls(&self) -> usize {
        self.calls.lock().await.values().sum()
    }
}

#[async_trait]
impl ResourcesService for CountingResources {
    async fn query_models(&self, observable: &Observable, _scope: &ContextScope) -> Result<ResourceSet> {
        *self.calls.lock().await.entry(observable.urn.clone()).or_default() += 1;
        let results = self
            .models
            .iter()
            .filter(|m| m.outputs.iter().any(|o| o.urn == observable.urn))
            .cloned()
            .map(ModelDescriptor::new)
            .collect();
        Ok(ResourceSet { results, notifications: Vec::new() })
    }
}

/// Catalog that is always down.
pub struct UnreachableResources;

#[async_trait]
impl ResourcesService for UnreachableResources {
    async fn query_models(&self, _observable: &Observable, _scope: &ContextScope) -> Result<ResourceSet> {
        Err(anyhow!("connection refused"))
    }
}

pub struct Fixture {
    pub reasoner: Arc<ScriptedReasoner>,
    pub resources: Arc<CountingResources>,
    pub resolver: Resolver,
}

pub fn fixture(reasoner: ScriptedReasoner, models: Vec<Model>) -> Fixture {
    fixture_with_config(reasoner, models, ResolverConfig::default())
}

pub fn fixture_with_config(reasoner: ScriptedReasoner, models: Vec<Model>, config: ResolverConfig) -> Fixture {
    telemetry::init_tracing(telemetry::DEFAULT_DIRECTIVE);
    let reasoner = Arc::new(reasoner);
    let resources = Arc::new(CountingResources::new(models));
    let resolver = Resolver::new(reasoner.clone(), resources.clone(), config).unwrap();
    Fixture { reasoner, resources, resolver }
}

/// Scope over 100 units of space.
pub fn scope() -> ContextScope {
    ContextScope::new(Extent::space(0.0, 100.0))
}

pub fn quality(urn: &str) -> Observable {
    Observable::quality(urn)
}

/// Model of `output` covering [start, end) in space.
pub fn model(urn: &str, output: &str, start: f64, end: f64) -> Model {
    Model::new(urn, quality(output)).with_extent(Extent::space(start, end))
}

/// Model of `output` with no spatial limitation.
pub fn global_model(urn: &str, output: &str) -> Model {
    Model::new(urn, quality(output))
}
