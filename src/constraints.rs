//! Resolution constraints
//!
//! Steering data attached to a scope before a resolution starts: which
//! models may or must be used, active scenarios, predicate substitutions,
//! parameter values. The resolver only reads them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coverage::Extent;
use crate::error::{ResolutionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Scenarios,
    Geometry,
    ResolutionNamespace,
    ResolutionProject,
    UsingModel,
    ConcretePredicates,
    Whitelist,
    Blacklist,
    Parameters,
}

impl ConstraintKind {
    /// Incremental kinds accumulate when merged; the others are replaced.
    pub fn is_incremental(&self) -> bool {
        matches!(
            self,
            ConstraintKind::Scenarios | ConstraintKind::ConcretePredicates | ConstraintKind::Parameters
        )
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateSubstitution {
    pub abstract_predicate: String,
    pub concrete: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name, or `model_name.parameter` to target one model.
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConstraintValue {
    Text(String),
    Extent(Extent),
    Predicate(PredicateSubstitution),
    Parameter(Parameter),
}

/// Typed view of a payload entry.
pub trait FromConstraintValue: Sized {
    fn from_value(value: &ConstraintValue) -> Option<Self>;
}

impl FromConstraintValue for String {
    fn from_value(value: &ConstraintValue) -> Option<Self> {
        match value {
            ConstraintValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromConstraintValue for Extent {
    fn from_value(value: &ConstraintValue) -> Option<Self> {
        match value {
            ConstraintValue::Extent(e) => Some(e.clone()),
            _ => None,
        }
    }
}

impl FromConstraintValue for PredicateSubstitution {
    fn from_value(value: &ConstraintValue) -> Option<Self> {
        match value {
            ConstraintValue::Predicate(p) => Some(p.clone()),
            _ => None,
        }
    }
}

impl FromConstraintValue for Parameter {
    fn from_value(value: &ConstraintValue) -> Option<Self> {
        match value {
            ConstraintValue::Parameter(p) => Some(p.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionConstraint {
    kind: ConstraintKind,
    payload: Vec<ConstraintValue>,
}

impl ResolutionConstraint {
    pub fn new(kind: ConstraintKind, payload: Vec<ConstraintValue>) -> Self {
        Self { kind, payload }
    }

    fn texts<S: Into<String>>(kind: ConstraintKind, items: impl IntoIterator<Item = S>) -> Self {
        Self::new(kind, items.into_iter().map(|s| ConstraintValue::Text(s.into())).collect())
    }

    pub fn scenarios<S: Into<String>>(scenarios: impl IntoIterator<Item = S>) -> Self {
        Self::texts(ConstraintKind::Scenarios, scenarios)
    }

    pub fn geometry(extent: Extent) -> Self {
        Self::new(ConstraintKind::Geometry, vec![ConstraintValue::Extent(extent)])
    }

    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self::texts(ConstraintKind::ResolutionNamespace, [namespace])
    }

    pub fn project(project: impl Into<String>) -> Self {
        Self::texts(ConstraintKind::ResolutionProject, [project])
    }

    pub fn using_model(urn: impl Into<String>) -> Self {
        Self::texts(ConstraintKind::UsingModel, [urn])
    }

    pub fn whitelist<S: Into<String>>(patterns: impl IntoIterator<Item = S>) -> Self {
        Self::texts(ConstraintKind::Whitelist, patterns)
    }

    pub fn blacklist<S: Into<String>>(patterns: impl IntoIterator<Item = S>) -> Self {
        Self::texts(ConstraintKind::Blacklist, patterns)
    }

    pub fn concrete_predicates<A: Into<String>, C: Into<String>>(pairs: impl IntoIterator<Item = (A, C)>) -> Self {
        Self::new(
            ConstraintKind::ConcretePredicates,
            pairs
                .into_iter()
                .map(|(a, c)| {
                    ConstraintValue::Predicate(PredicateSubstitution {
                        abstract_predicate: a.into(),
                        concrete: c.into(),
                    })
                })
                .collect(),
        )
    }

    pub fn parameters<S: Into<String>>(values: impl IntoIterator<Item = (S, serde_json::Value)>) -> Self {
        Self::new(
            ConstraintKind::Parameters,
            values
                .into_iter()
                .map(|(name, value)| ConstraintValue::Parameter(Parameter { name: name.into(), value }))
                .collect(),
        )
    }

    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    pub fn is_incremental(&self) -> bool {
        self.kind.is_incremental()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn values(&self) -> &[ConstraintValue] {
        &self.payload
    }

    /// Entries of type `T`; entries of other types are skipped.
    pub fn payload<T: FromConstraintValue>(&self) -> Vec<T> {
        self.payload.iter().filter_map(T::from_value).collect()
    }

    /// Combine with a later constraint of the same kind.
    pub fn merge(&self, other: &ResolutionConstraint) -> Result<ResolutionConstraint> {
        if self.kind != other.kind {
            return Err(ResolutionError::ConstraintMismatch {
                left: self.kind.to_string(),
                right: other.kind.to_string(),
            });
        }
        if !self.is_incremental() {
            return Ok(other.clone());
        }

        let mut payload = self.payload.clone();
        for value in &other.payload {
            match value {
                // a later value for the same parameter wins
                ConstraintValue::Parameter(p) => {
                    let existing = payload
                        .iter()
                        .position(|v| matches!(v, ConstraintValue::Parameter(q) if q.name == p.name));
                    match existing {
                        Some(i) => payload[i] = value.clone(),
                        None => payload.push(value.clone()),
                    }
                }
                _ if payload.contains(value) => {}
                _ => payload.push(value.clone()),
            }
        }
        Ok(ResolutionConstraint { kind: self.kind, payload })
    }
}

/// True if `pattern` names the model urn itself or one of its enclosing
/// namespaces.
pub fn matches_urn(pattern: &str, urn: &str) -> bool {
    urn == pattern || (urn.starts_with(pattern) && urn[pattern.len()..].starts_with('.'))
}

/// One merged constraint per kind, in the order kinds were first added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    constraints: IndexMap<ConstraintKind, ResolutionConstraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, constraint: ResolutionConstraint) -> Result<()> {
        let merged = match self.constraints.get(&constraint.kind) {
            Some(existing) => existing.merge(&constraint)?,
            None => constraint,
        };
        self.constraints.insert(merged.kind, merged);
        Ok(())
    }

    pub fn with(mut self, constraint: ResolutionConstraint) -> Result<Self> {
        self.add(constraint)?;
        Ok(self)
    }

    pub fn merge(&self, other: &ConstraintSet) -> Result<ConstraintSet> {
        let mut ret = self.clone();
        for constraint in other.constraints.values() {
            ret.add(constraint.clone())?;
        }
        Ok(ret)
    }

    pub fn get(&self, kind: ConstraintKind) -> Option<&ResolutionConstraint> {
        self.constraints.get(&kind)
    }

    /// Typed payload of a kind; empty when absent.
    pub fn payload<T: FromConstraintValue>(&self, kind: ConstraintKind) -> Vec<T> {
        self.get(kind).map(|c| c.payload()).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolutionConstraint> {
        self.constraints.values()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_incremental_kinds_accumulate() {
        let a = ResolutionConstraint::scenarios(["s1", "s2"]);
        let b = ResolutionConstraint::scenarios(["s2", "s3"]);
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.payload::<String>(), vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_non_incremental_kinds_replace() {
        let a = ResolutionConstraint::whitelist(["ns.a"]);
        let b = ResolutionConstraint::whitelist(["ns.b"]);
        assert_eq!(a.merge(&b).unwrap().payload::<String>(), vec!["ns.b"]);
    }

    #[test]
    fn test_parameters_override_by_name() {
        let a = ResolutionConstraint::parameters([("rate", json!(1)), ("k", json!(2))]);
        let b = ResolutionConstraint::parameters([("rate", json!(5))]);
        let merged = a.merge(&b).unwrap().payload::<Parameter>();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].value, json!(5));
    }

    #[test]
    fn test_mismatched_kinds_fail() {
        let err = ResolutionConstraint::whitelist(["a"])
            .merge(&ResolutionConstraint::blacklist(["a"]))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::ConstraintMismatch { .. }));
    }

    #[test]
    fn test_typed_payload_skips_other_types() {
        let geometry = ResolutionConstraint::geometry(Extent::space(0.0, 1.0));
        assert!(geometry.payload::<String>().is_empty());
        assert_eq!(geometry.payload::<Extent>().len(), 1);
    }

    #[test]
    fn test_set_keeps_one_per_kind() {
        let set = ConstraintSet::new()
            .with(ResolutionConstraint::scenarios(["s1"]))
            .unwrap()
            .with(ResolutionConstraint::blacklist(["ns.bad"]))
            .unwrap()
            .with(ResolutionConstraint::scenarios(["s2"]))
            .unwrap();
        assert_eq!(set.iter().count(), 2);
        assert_eq!(set.payload::<String>(ConstraintKind::Scenarios), vec!["s1", "s2"]);
        assert!(set.payload::<String>(ConstraintKind::Whitelist).is_empty());
    }

    #[test]
    fn test_urn_patterns() {
        assert!(matches_urn("hydrology", "hydrology.models.runoff"));
        assert!(matches_urn("hydrology.models.runoff", "hydrology.models.runoff"));
        assert!(!matches_urn("hydro", "hydrology.models.runoff"));
    }
}
