//! Context scope: the boundary a resolution happens in.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constraints::{ConstraintKind, ConstraintSet, ResolutionConstraint};
use crate::coverage::Extent;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextScope {
    pub id: String,
    scale: Extent,
    #[serde(default)]
    scenarios: Vec<String>,
    #[serde(default)]
    constraints: ConstraintSet,
}

impl ContextScope {
    pub fn new(scale: Extent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scale,
            scenarios: Vec::new(),
            constraints: ConstraintSet::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        let scenario = scenario.into();
        if !self.scenarios.contains(&scenario) {
            self.scenarios.push(scenario);
        }
        self
    }

    pub fn with_constraint(mut self, constraint: ResolutionConstraint) -> Result<Self> {
        self.constraints.add(constraint)?;
        Ok(self)
    }

    /// A derived scope carrying additional constraints. `self` is unchanged.
    pub fn with_resolution_constraints(
        &self,
        constraints: impl IntoIterator<Item = ResolutionConstraint>,
    ) -> Result<ContextScope> {
        let mut derived = self.clone();
        for constraint in constraints {
            derived.constraints.add(constraint)?;
        }
        Ok(derived)
    }

    /// Declared scale, before any geometry constraint.
    pub fn scale(&self) -> &Extent {
        &self.scale
    }

    /// Target extent: a geometry constraint overrides the declared scale.
    pub fn geometry(&self) -> Extent {
        self.constraints
            .payload::<Extent>(ConstraintKind::Geometry)
            .into_iter()
            .next()
            .unwrap_or_else(|| self.scale.clone())
    }

    /// Scenarios set on the scope plus those added through constraints.
    pub fn scenarios(&self) -> Vec<String> {
        let mut ret = self.scenarios.clone();
        for s in self.constraints.payload::<String>(ConstraintKind::Scenarios) {
            if !ret.contains(&s) {
                ret.push(s);
            }
        }
        ret
    }

    pub fn resolution_constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn resolution_namespace(&self) -> Option<String> {
        self.constraints
            .payload::<String>(ConstraintKind::ResolutionNamespace)
            .into_iter()
            .next()
    }

    pub fn resolution_project(&self) -> Option<String> {
        self.constraints
            .payload::<String>(ConstraintKind::ResolutionProject)
            .into_iter()
            .next()
    }
}
