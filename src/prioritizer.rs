//! Candidate ranking
//!
//! Each candidate model gets a score in [0, 100] per criterion. Candidates
//! are compared criterion by criterion in the configured order and the first
//! difference decides; fully tied candidates keep their discovery order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::coverage::{DimensionType, Extent, Span};
use crate::error::{ResolutionError, Result};
use crate::knowledge::{Model, Observable};
use crate::scope::ContextScope;

/// `im:<criterion> <weight>` pairs. Lower weight ranks first, 0 disables.
pub const DEFAULT_RANKING_STRATEGY: &str = "im:lexical-scope 1 im:semantic-concordance 2 \
     im:trait-concordance 3 im:evidence 4 im:time-specificity 5 im:time-coverage 6 \
     im:space-specificity 7 im:space-coverage 8 im:subjective-concordance 9 im:inherency 10 \
     im:scale-coherency 11 im:network-remoteness 12 im:reliability 100";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Criterion {
    LexicalScope,
    SemanticConcordance,
    TraitConcordance,
    Evidence,
    TimeSpecificity,
    TimeCoverage,
    SpaceSpecificity,
    SpaceCoverage,
    SubjectiveConcordance,
    Inherency,
    ScaleCoherency,
    NetworkRemoteness,
    Reliability,
}

impl Criterion {
    pub const ALL: [Criterion; 13] = [
        Criterion::LexicalScope,
        Criterion::SemanticConcordance,
        Criterion::TraitConcordance,
        Criterion::Evidence,
        Criterion::TimeSpecificity,
        Criterion::TimeCoverage,
        Criterion::SpaceSpecificity,
        Criterion::SpaceCoverage,
        Criterion::SubjectiveConcordance,
        Criterion::Inherency,
        Criterion::ScaleCoherency,
        Criterion::NetworkRemoteness,
        Criterion::Reliability,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Criterion::LexicalScope => "im:lexical-scope",
            Criterion::SemanticConcordance => "im:semantic-concordance",
            Criterion::TraitConcordance => "im:trait-concordance",
            Criterion::Evidence => "im:evidence",
            Criterion::TimeSpecificity => "im:time-specificity",
            Criterion::TimeCoverage => "im:time-coverage",
            Criterion::SpaceSpecificity => "im:space-specificity",
            Criterion::SpaceCoverage => "im:space-coverage",
            Criterion::SubjectiveConcordance => "im:subjective-concordance",
            Criterion::Inherency => "im:inherency",
            Criterion::ScaleCoherency => "im:scale-coherency",
            Criterion::NetworkRemoteness => "im:network-remoteness",
            Criterion::Reliability => "im:reliability",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Criterion {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self> {
        Criterion::ALL
            .iter()
            .find(|c| c.name() == s)
            .copied()
            .ok_or_else(|| ResolutionError::Config(format!("unknown ranking criterion '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingStrategy {
    order: Vec<Criterion>,
}

impl RankingStrategy {
    pub fn parse(definition: &str) -> Result<Self> {
        let tokens: Vec<&str> = definition.split_whitespace().collect();
        if tokens.len() % 2 != 0 {
            return Err(ResolutionError::Config(format!(
                "ranking strategy must be '<criterion> <weight>' pairs: '{definition}'"
            )));
        }

        let mut weighted: Vec<(u32, Criterion)> = Vec::new();
        for pair in tokens.chunks(2) {
            let criterion: Criterion = pair[0].parse()?;
            let weight: u32 = pair[1]
                .parse()
                .map_err(|_| ResolutionError::Config(format!("bad weight '{}' for {criterion}", pair[1])))?;
            if weighted.iter().any(|(_, c)| *c == criterion) {
                return Err(ResolutionError::Config(format!("{criterion} listed twice")));
            }
            if weight > 0 {
                weighted.push((weight, criterion));
            }
        }
        weighted.sort_by_key(|(w, _)| *w);

        Ok(Self { order: weighted.into_iter().map(|(_, c)| c).collect() })
    }

    /// Criteria in priority order.
    pub fn criteria(&self) -> &[Criterion] {
        &self.order
    }
}

impl Default for RankingStrategy {
    fn default() -> Self {
        Self { order: Criterion::ALL.to_vec() }
    }
}

pub type Ranks = IndexMap<Criterion, f64>;

/// Ranks the candidates for one observable within one scope.
pub struct Prioritizer {
    observable: Observable,
    scope: ContextScope,
    strategy: RankingStrategy,
    /// Keyed by the whole definition: urns are not unique across catalogs.
    ranks: Vec<(Model, Ranks)>,
}

impl Prioritizer {
    pub fn new(observable: Observable, scope: ContextScope, strategy: RankingStrategy) -> Self {
        Self {
            observable,
            scope,
            strategy,
            ranks: Vec::new(),
        }
    }

    /// Score of `model` for every configured criterion, in priority order.
    pub fn compute_criteria(&self, model: &Model) -> Ranks {
        self.strategy
            .criteria()
            .iter()
            .map(|c| (*c, self.score(*c, model).clamp(0.0, 100.0)))
            .collect()
    }

    /// Cached ranks, computed on first request.
    pub fn ranks(&mut self, model: &Model) -> &Ranks {
        let index = match self.ranks.iter().position(|(cached, _)| cached == model) {
            Some(index) => index,
            None => {
                let computed = self.compute_criteria(model);
                self.ranks.push((model.clone(), computed));
                self.ranks.len() - 1
            }
        };
        &self.ranks[index].1
    }

    /// `Less` when `a` should be tried before `b`.
    pub fn compare(&mut self, a: &Model, b: &Model) -> Ordering {
        let ra = self.ranks(a).clone();
        let rb = self.ranks(b);
        compare_ranks(&ra, rb)
    }

    /// Best first. Stable: tied candidates keep their input order.
    pub fn sort(&mut self, candidates: Vec<Arc<Model>>) -> Vec<Arc<Model>> {
        let mut ranked: Vec<(Ranks, Arc<Model>)> = candidates
            .into_iter()
            .map(|m| (self.ranks(&m).clone(), m))
            .collect();
        ranked.sort_by(|(a, _), (b, _)| compare_ranks(a, b));
        ranked.into_iter().map(|(_, m)| m).collect()
    }

    fn score(&self, criterion: Criterion, model: &Model) -> f64 {
        let target = self.scope.geometry();
        match criterion {
            Criterion::LexicalScope => {
                let in_scenario = model
                    .scenario
                    .as_ref()
                    .is_some_and(|s| self.scope.scenarios().contains(s));
                if in_scenario {
                    100.0
                } else if self.scope.resolution_namespace().as_deref() == Some(model.namespace.as_str()) {
                    50.0
                } else if !model.project.is_empty()
                    && self.scope.resolution_project().as_deref() == Some(model.project.as_str())
                {
                    25.0
                } else {
                    0.0
                }
            }
            Criterion::Evidence => {
                if model.resolved_data {
                    100.0
                } else if model.dependencies.is_empty() {
                    50.0
                } else {
                    0.0
                }
            }
            Criterion::SemanticConcordance => model
                .outputs
                .iter()
                .filter(|o| o.urn == self.observable.urn)
                .map(|o| 50.0 + 50.0 * jaccard(&o.traits, &self.observable.traits))
                .fold(0.0, f64::max),
            Criterion::TraitConcordance => {
                if self.observable.traits.is_empty() {
                    return 100.0;
                }
                model
                    .outputs
                    .iter()
                    .map(|o| {
                        let shared = self.observable.traits.iter().filter(|t| o.traits.contains(t)).count();
                        100.0 * shared as f64 / self.observable.traits.len() as f64
                    })
                    .fold(0.0, f64::max)
            }
            Criterion::TimeSpecificity => specificity(&model.extent, &target, DimensionType::Time),
            Criterion::SpaceSpecificity => specificity(&model.extent, &target, DimensionType::Space),
            Criterion::TimeCoverage => dimension_coverage(&model.extent, &target, DimensionType::Time),
            Criterion::SpaceCoverage => dimension_coverage(&model.extent, &target, DimensionType::Space),
            Criterion::SubjectiveConcordance | Criterion::Reliability => model
                .metadata
                .get(criterion.name())
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(50.0),
            Criterion::Inherency => self.inherency(model),
            Criterion::ScaleCoherency => {
                if target.is_universal() {
                    return 100.0;
                }
                let dims = target.dimension_types().count();
                let shared = target
                    .dimension_types()
                    .filter(|d| model.extent.dimension(*d).is_some())
                    .count();
                100.0 * shared as f64 / dims as f64
            }
            Criterion::NetworkRemoteness => {
                if model.is_local() {
                    100.0
                } else {
                    0.0
                }
            }
        }
    }

    fn inherency(&self, model: &Model) -> f64 {
        let Some(output) = model.outputs.iter().find(|o| o.urn == self.observable.urn) else {
            // only obtainable as a by-product
            return 0.0;
        };
        match (&self.observable.inherent, &output.inherent) {
            (a, b) if a == b => 100.0,
            (Some(_), None) => 66.0,
            (None, Some(_)) => 33.0,
            _ => 0.0,
        }
    }
}

fn compare_ranks(a: &Ranks, b: &Ranks) -> Ordering {
    for (criterion, score) in a {
        let other = b.get(criterion).copied().unwrap_or(0.0);
        match other.total_cmp(score) {
            Ordering::Equal => continue,
            decided => return decided,
        }
    }
    Ordering::Equal
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.iter().filter(|t| b.contains(t)).count() as f64;
    let total = (a.len() + b.len()) as f64 - shared;
    shared / total
}

/// How much of the model's own extent falls inside the target.
fn specificity(model: &Extent, target: &Extent, dimension: DimensionType) -> f64 {
    let Some(own) = model.dimension(dimension) else {
        return 0.0;
    };
    match target.dimension(dimension) {
        Some(t) => 100.0 * fraction_inside(own, t),
        None => 50.0,
    }
}

fn fraction_inside(own: &Span, target: &Span) -> f64 {
    if own.size() <= 0.0 {
        return if target.contains(own) { 1.0 } else { 0.0 };
    }
    own.intersection(target).size() / own.size()
}

/// How much of the target the model covers.
fn dimension_coverage(model: &Extent, target: &Extent, dimension: DimensionType) -> f64 {
    match (model.dimension(dimension), target.dimension(dimension)) {
        (Some(own), Some(t)) => 100.0 * own.fraction_of(t),
        _ => 0.0,
    }
}
