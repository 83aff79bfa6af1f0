//! Knowledge
//!
//! The closed set of things a resolution can be asked for. Every request is
//! promoted to an [`Observable`] before the resolver does anything with it;
//! only resources cannot be promoted.

pub mod strategy;

pub use strategy::ObservationStrategy;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::coverage::Extent;
use crate::error::{ResolutionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeKind {
    Concept,
    Observable,
    Model,
    Instance,
    Resource,
}

/// How an observable is described: what kind of observation produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionType {
    Quantification,
    Categorization,
    Classification,
    /// Acknowledges an existing subject; needs no model to be grounded.
    Acknowledgement,
    Instantiation,
    Detection,
    Simulation,
}

impl fmt::Display for DescriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DescriptionType::Quantification => "quantification",
            DescriptionType::Categorization => "categorization",
            DescriptionType::Classification => "classification",
            DescriptionType::Acknowledgement => "acknowledgement",
            DescriptionType::Instantiation => "instantiation",
            DescriptionType::Detection => "detection",
            DescriptionType::Simulation => "simulation",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptType {
    Quality,
    Trait,
    Subject,
    Agent,
    Event,
    Relationship,
    Process,
    Configuration,
}

impl ConceptType {
    /// Description type of the bare observable of a concept of this type.
    pub fn description(&self) -> DescriptionType {
        match self {
            ConceptType::Quality => DescriptionType::Quantification,
            ConceptType::Trait => DescriptionType::Classification,
            ConceptType::Subject | ConceptType::Agent | ConceptType::Event | ConceptType::Relationship => {
                DescriptionType::Instantiation
            }
            ConceptType::Process => DescriptionType::Simulation,
            ConceptType::Configuration => DescriptionType::Detection,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub urn: String,
    pub concept_type: ConceptType,
}

impl Concept {
    pub fn new(urn: impl Into<String>, concept_type: ConceptType) -> Self {
        Self { urn: urn.into(), concept_type }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observable {
    pub urn: String,
    pub description: DescriptionType,
    #[serde(default)]
    pub optional: bool,
    /// Predicates qualifying the observable. Abstract ones may be replaced
    /// through a concrete-predicates constraint.
    #[serde(default)]
    pub traits: Vec<String>,
    /// Context the observable is inherent to, if any.
    #[serde(default)]
    pub inherent: Option<String>,
    /// Name under which a model refers to this observable.
    #[serde(default)]
    pub name: Option<String>,
}

impl Observable {
    pub fn new(urn: impl Into<String>, description: DescriptionType) -> Self {
        Self {
            urn: urn.into(),
            description,
            optional: false,
            traits: Vec::new(),
            inherent: None,
            name: None,
        }
    }

    pub fn quality(urn: impl Into<String>) -> Self {
        Self::new(urn, DescriptionType::Quantification)
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_trait(mut self, predicate: impl Into<String>) -> Self {
        self.traits.push(predicate.into());
        self
    }

    pub fn with_inherent(mut self, context: impl Into<String>) -> Self {
        self.inherent = Some(context.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Catalog key. Optionality and local naming do not change what is
    /// observed, so they are left out.
    pub fn key(&self) -> String {
        let mut traits: Vec<&str> = self.traits.iter().map(String::as_str).collect();
        traits.sort_unstable();

        let mut key = format!("{}:{}", self.description, self.urn);
        if !traits.is_empty() {
            key.push_str(&format!("[{}]", traits.join(",")));
        }
        if let Some(context) = &self.inherent {
            key.push_str(&format!(" of {context}"));
        }
        key
    }

    pub fn is_acknowledgement(&self) -> bool {
        self.description == DescriptionType::Acknowledgement
    }

    /// The declared name, or the last segment of the urn.
    pub fn local_name(&self) -> &str {
        if let Some(name) = &self.name {
            return name;
        }
        self.urn.rsplit(|c| c == ':' || c == '.').next().unwrap_or(&self.urn)
    }
}

impl fmt::Display for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())?;
        if self.optional {
            write!(f, " (optional)")?;
        }
        Ok(())
    }
}

/// A computational unit. Immutable once loaded; shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub urn: String,
    pub namespace: String,
    pub project: String,
    #[serde(default)]
    pub scenario: Option<String>,
    /// Primary output first.
    pub outputs: Vec<Observable>,
    #[serde(default)]
    pub dependencies: Vec<Observable>,
    #[serde(default)]
    pub extent: Extent,
    /// Produces its output from stored data rather than computation.
    #[serde(default)]
    pub resolved_data: bool,
    /// Remote service serving the model; `None` when local.
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub metadata: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub parameters: IndexMap<String, serde_json::Value>,
}

impl Model {
    pub fn new(urn: impl Into<String>, output: Observable) -> Self {
        let urn = urn.into();
        let namespace = urn.rsplit_once('.').map(|(ns, _)| ns.to_string()).unwrap_or_default();
        Self {
            urn,
            namespace,
            project: String::new(),
            scenario: None,
            outputs: vec![output],
            dependencies: Vec::new(),
            extent: Extent::universal(),
            resolved_data: false,
            server: None,
            metadata: IndexMap::new(),
            parameters: IndexMap::new(),
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>, project: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self.project = project.into();
        self
    }

    pub fn in_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn with_output(mut self, output: Observable) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_dependency(mut self, dependency: Observable) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = extent;
        self
    }

    pub fn with_resolved_data(mut self) -> Self {
        self.resolved_data = true;
        self
    }

    pub fn on_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn primary_output(&self) -> Option<&Observable> {
        self.outputs.first()
    }

    pub fn secondary_outputs(&self) -> &[Observable] {
        self.outputs.get(1..).unwrap_or(&[])
    }

    /// Last segment of the urn.
    pub fn name(&self) -> &str {
        self.urn.rsplit('.').next().unwrap_or(&self.urn)
    }

    pub fn is_local(&self) -> bool {
        self.server.is_none()
    }
}

/// An already-materialized observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub observable: Observable,
    #[serde(default)]
    pub extent: Extent,
}

impl Instance {
    pub fn new(id: impl Into<String>, observable: Observable) -> Self {
        Self { id: id.into(), observable, extent: Extent::universal() }
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = extent;
        self
    }
}

/// Stored data or code. Never resolvable on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub urn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Knowledge {
    Concept(Concept),
    Observable(Observable),
    Model(Arc<Model>),
    Instance(Instance),
    Resource(Resource),
}

/// The observable a knowledge item normalizes to, and how much of it is
/// already known.
#[derive(Debug, Clone, PartialEq)]
pub enum Promotion {
    /// Needs candidates.
    Open(Observable),
    /// Already an artifact; starts fully covered.
    Satisfied { observable: Observable, instance: Instance },
    /// Resolved by the given model; only its dependencies remain.
    ResolvedBy { observable: Observable, model: Arc<Model> },
}

impl Promotion {
    pub fn observable(&self) -> &Observable {
        match self {
            Promotion::Open(observable) => observable,
            Promotion::Satisfied { observable, .. } => observable,
            Promotion::ResolvedBy { observable, .. } => observable,
        }
    }
}

impl Knowledge {
    pub fn kind(&self) -> KnowledgeKind {
        match self {
            Knowledge::Concept(_) => KnowledgeKind::Concept,
            Knowledge::Observable(_) => KnowledgeKind::Observable,
            Knowledge::Model(_) => KnowledgeKind::Model,
            Knowledge::Instance(_) => KnowledgeKind::Instance,
            Knowledge::Resource(_) => KnowledgeKind::Resource,
        }
    }

    pub fn urn(&self) -> &str {
        match self {
            Knowledge::Concept(c) => &c.urn,
            Knowledge::Observable(o) => &o.urn,
            Knowledge::Model(m) => &m.urn,
            Knowledge::Instance(i) => &i.id,
            Knowledge::Resource(r) => &r.urn,
        }
    }

    pub fn promote(&self) -> Result<Promotion> {
        match self {
            Knowledge::Concept(concept) => Ok(Promotion::Open(Observable::new(
                concept.urn.clone(),
                concept.concept_type.description(),
            ))),
            Knowledge::Observable(observable) => Ok(Promotion::Open(observable.clone())),
            Knowledge::Instance(instance) => Ok(Promotion::Satisfied {
                observable: instance.observable.clone().with_optional(false),
                instance: instance.clone(),
            }),
            Knowledge::Model(model) => match model.primary_output() {
                Some(output) => Ok(Promotion::ResolvedBy {
                    observable: output.clone().with_optional(false),
                    model: Arc::clone(model),
                }),
                None => Err(ResolutionError::NotResolvable {
                    kind: KnowledgeKind::Model,
                    urn: model.urn.clone(),
                }),
            },
            Knowledge::Resource(resource) => Err(ResolutionError::NotResolvable {
                kind: KnowledgeKind::Resource,
                urn: resource.urn.clone(),
            }),
        }
    }
}

impl From<Observable> for Knowledge {
    fn from(observable: Observable) -> Self {
        Knowledge::Observable(observable)
    }
}

impl From<Concept> for Knowledge {
    fn from(concept: Concept) -> Self {
        Knowledge::Concept(concept)
    }
}

impl From<Model> for Knowledge {
    fn from(model: Model) -> Self {
        Knowledge::Model(Arc::new(model))
    }
}

impl From<Arc<Model>> for Knowledge {
    fn from(model: Arc<Model>) -> Self {
        Knowledge::Model(model)
    }
}

impl From<Instance> for Knowledge {
    fn from(instance: Instance) -> Self {
        Knowledge::Instance(instance)
    }
}

impl From<Resource> for Knowledge {
    fn from(resource: Resource) -> Self {
        Knowledge::Resource(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concepts_promote_to_bare_observables() {
        let promoted = Knowledge::from(Concept::new("geography:Elevation", ConceptType::Quality))
            .promote()
            .unwrap();
        assert!(matches!(promoted, Promotion::Open(_)));
        assert_eq!(promoted.observable().description, DescriptionType::Quantification);
    }

    #[test]
    fn test_instances_promote_as_satisfied() {
        let instance = Instance::new("obs-1", Observable::quality("geography:Elevation").with_optional(true));
        let promoted = Knowledge::from(instance).promote().unwrap();
        match promoted {
            Promotion::Satisfied { observable, instance } => {
                assert!(!observable.optional);
                assert_eq!(instance.id, "obs-1");
            }
            other => panic!("unexpected promotion {other:?}"),
        }
    }

    #[test]
    fn test_models_promote_to_primary_output() {
        let model = Model::new("hydrology.models.runoff", Observable::quality("hydrology:Runoff"))
            .with_output(Observable::quality("hydrology:Infiltration"));
        let promoted = Knowledge::from(model).promote().unwrap();
        assert_eq!(promoted.observable().urn, "hydrology:Runoff");
        assert!(matches!(promoted, Promotion::ResolvedBy { .. }));
    }

    #[test]
    fn test_resources_are_not_resolvable() {
        let err = Knowledge::from(Resource { urn: "im:data:dem".into() }).promote().unwrap_err();
        assert!(matches!(err, ResolutionError::NotResolvable { kind: KnowledgeKind::Resource, .. }));
    }

    #[test]
    fn test_key_ignores_optionality_and_trait_order() {
        let a = Observable::quality("q").with_trait("t2").with_trait("t1");
        let b = Observable::quality("q").with_trait("t1").with_trait("t2").with_optional(true);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), Observable::quality("q").with_inherent("ctx").key());
    }

    #[test]
    fn test_model_naming() {
        let model = Model::new("hydrology.models.runoff", Observable::quality("hydrology:Runoff"));
        assert_eq!(model.name(), "runoff");
        assert_eq!(model.namespace, "hydrology.models");
        assert!(model.is_local());
        assert_eq!(Observable::quality("hydrology:Runoff").local_name(), "Runoff");
    }
}
