//! Resolver
//!
//! Expands a knowledge request into the models that can observe it, resolves
//! their dependencies recursively and accumulates the result in a
//! [`ResolutionGraph`]. A pass is a sequential recursion in a single task:
//! the order in which candidates are accepted matters, so nothing inside a
//! pass runs in parallel. Separate passes share nothing but the read-only
//! collaborators.
//!
//! Only contract violations and collaborator failures are errors. Anything
//! that simply cannot be resolved ends up as empty or partial coverage.

pub mod collaborators;
pub mod resolution;

pub use collaborators::{
    DirectReasoner, InMemoryResources, ModelDescriptor, Notification, NotificationLevel, Reasoner, ResourceSet,
    ResourcesService,
};
pub use resolution::{Outcome, Resolution};

use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::ResolverConfig;
use crate::constraints::{matches_urn, ConstraintKind, Parameter, PredicateSubstitution, ResolutionConstraint};
use crate::coverage::LogicalConnector;
use crate::error::{ResolutionError, Result};
use crate::graph::{EdgeType, NodeId, ResolutionGraph};
use crate::knowledge::{Knowledge, KnowledgeKind, Model, ObservationStrategy, Observable};
use crate::prioritizer::{Prioritizer, RankingStrategy};
use crate::scope::ContextScope;
use crate::service::CancellationToken;

pub struct Resolver {
    reasoner: Arc<dyn Reasoner>,
    resources: Arc<dyn ResourcesService>,
    config: ResolverConfig,
    ranking: RankingStrategy,
}

impl Resolver {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        resources: Arc<dyn ResourcesService>,
        config: ResolverConfig,
    ) -> Result<Self> {
        config.validate()?;
        let ranking = config.ranking()?;
        Ok(Self {
            reasoner,
            resources,
            config,
            ranking,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub async fn resolve(&self, knowledge: Knowledge, scope: &ContextScope) -> Result<Resolution> {
        self.resolve_with_cancel(knowledge, scope, &CancellationToken::new()).await
    }

    /// Resolve, stopping at the next candidate or dependency once `cancel`
    /// is triggered.
    #[instrument(skip(self, knowledge, scope, cancel), fields(urn = %knowledge.urn(), scope = %scope.id))]
    pub async fn resolve_with_cancel(
        &self,
        knowledge: Knowledge,
        scope: &ContextScope,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        let target = scope.geometry();
        let merge_strategy = match knowledge.kind() {
            KnowledgeKind::Model => LogicalConnector::Intersection,
            _ => LogicalConnector::Union,
        };

        info!("Resolving {:?} {}", knowledge.kind(), knowledge.urn());

        let mut graph = ResolutionGraph::new(target.clone(), self.config.thresholds);
        let root = graph.new_node(&knowledge, target, None, merge_strategy)?;

        let mut pass = Pass {
            resolver: self,
            cancel,
            graph,
            stack: Vec::new(),
        };
        pass.expand(root, scope.clone(), 0).await?;

        if pass.graph.is_complete(root) {
            pass.graph.accept(root)?;
        }

        let resolution = Resolution::new(pass.graph, root, knowledge);
        info!(
            "Resolution of {} finished: {:?}, coverage {}",
            resolution.resolved_knowledge().urn(),
            resolution.outcome(),
            resolution.coverage()
        );
        Ok(resolution)
    }
}

/// State of one resolution pass.
struct Pass<'r> {
    resolver: &'r Resolver,
    cancel: &'r CancellationToken,
    graph: ResolutionGraph,
    /// Keys of the observables being resolved in the current branch.
    stack: Vec<String>,
}

impl<'r> Pass<'r> {
    fn expand<'s>(&'s mut self, node: NodeId, scope: ContextScope, depth: usize) -> BoxFuture<'s, Result<()>> {
        async move {
            let Some(current) = self.graph.node(node) else {
                return Ok(());
            };
            if current.satisfied {
                return Ok(());
            }
            match current.model.clone() {
                Some(model) => self.resolve_dependencies(node, model, &scope, depth, None).await,
                None => self.expand_observable(node, &scope, depth).await,
            }
        }
        .boxed()
    }

    async fn expand_observable(&mut self, node: NodeId, scope: &ContextScope, depth: usize) -> Result<()> {
        let Some(observable) = self.graph.node(node).map(|n| n.observable.clone()) else {
            return Ok(());
        };
        let key = observable.key();

        if self.stack.contains(&key) {
            warn!("Circular dependency on {}; resolving it as empty", observable);
            return Ok(());
        }
        if depth > self.resolver.config.max_depth {
            warn!("Depth {} exceeded resolving {}; resolving it as empty", depth, observable);
            return Ok(());
        }

        let strategies = self
            .resolver
            .reasoner
            .infer_strategies(&observable, scope)
            .await
            .map_err(|e| ResolutionError::collaborator("reasoner", e))?;
        debug!("{} strategies for {}", strategies.len(), observable);

        self.stack.push(key);
        for strategy in strategies {
            self.check_cancelled(&observable)?;
            // filters still apply to a complete node
            let filtering = matches!(strategy, ObservationStrategy::Filtering { .. });
            if self.graph.is_complete(node) && !filtering {
                continue;
            }
            match strategy {
                ObservationStrategy::Direct => self.observe_direct(node, &observable, scope, depth).await?,
                ObservationStrategy::Resolved => {
                    debug!("{} is available in context", observable);
                    self.graph.mark_satisfied(node);
                }
                ObservationStrategy::Deferral { deferred } => {
                    let child = self.sub_resolve(node, &deferred, scope, depth).await?;
                    if self.graph.resolve_deferred(node, child, deferred.clone())? {
                        debug!("{} deferred to {}", observable, deferred);
                    }
                }
                ObservationStrategy::Filtering { filter } => {
                    self.apply_filters(node, &observable, &filter, scope, depth).await?
                }
            }
        }
        self.stack.pop();
        Ok(())
    }

    /// Resolve `observable` as a child of `parent`, reusing an existing
    /// resolution when the parent's catalog already has one.
    async fn sub_resolve(
        &mut self,
        parent: NodeId,
        observable: &Observable,
        scope: &ContextScope,
        depth: usize,
    ) -> Result<NodeId> {
        if let Some(existing) = self.graph.get_resolution(parent, observable) {
            debug!("Reusing resolution of {}", observable);
            return Ok(existing);
        }
        let child = self.graph.new_node(
            &Knowledge::Observable(observable.clone()),
            scope.geometry(),
            Some(parent),
            LogicalConnector::Union,
        )?;
        self.expand(child, scope.clone(), depth + 1).await?;
        Ok(child)
    }

    async fn observe_direct(
        &mut self,
        node: NodeId,
        observable: &Observable,
        scope: &ContextScope,
        depth: usize,
    ) -> Result<()> {
        let ranked = self.candidates(observable, scope).await?;

        for model in ranked {
            self.check_cancelled(observable)?;
            if self.graph.is_complete(node) {
                break;
            }

            let candidate = self.graph.new_candidate(observable.clone(), Arc::clone(&model), scope.geometry(), Some(node));
            self.bind_parameters(candidate, &model, scope);
            self.resolve_dependencies(candidate, Arc::clone(&model), scope, depth, None).await?;

            if !self.graph.is_relevant(candidate) {
                debug!("Dropping {}: not relevant", model.urn);
                continue;
            }
            let (Some(current), Some(offered)) = (self.graph.node(node), self.graph.node(candidate)) else {
                continue;
            };
            let gain = current.coverage.merge(&offered.coverage, LogicalConnector::Union)?.gain();
            if gain <= self.resolver.config.min_gain {
                debug!("Dropping {}: gain {:.3} too small", model.urn, gain);
                continue;
            }

            self.graph.resolve(node, candidate, EdgeType::Direct)?;
            info!("Accepted {} for {} (gain {:.3})", model.urn, observable, gain);
        }
        Ok(())
    }

    /// Query, filter by constraints and rank the models for `observable`.
    async fn candidates(&self, observable: &Observable, scope: &ContextScope) -> Result<Vec<Arc<Model>>> {
        let query = concretize(observable, scope);
        let set = self
            .resolver
            .resources
            .query_models(&query, scope)
            .await
            .map_err(|e| ResolutionError::collaborator("resources", e))?;

        for notification in &set.notifications {
            match notification.level {
                NotificationLevel::Info => debug!("resources: {}", notification.message),
                _ => warn!("resources: {}", notification.message),
            }
        }

        let loaded: Vec<Arc<Model>> = set
            .results
            .iter()
            .filter_map(|descriptor| {
                let model = descriptor.load();
                if model.is_none() {
                    warn!("Candidate {} has no definition; skipping", descriptor.urn);
                }
                model
            })
            .collect();

        let filtered = filter_candidates(loaded, scope);
        let mut prioritizer = Prioritizer::new(query, scope.clone(), self.resolver.ranking.clone());
        Ok(prioritizer.sort(filtered))
    }

    /// Resolve every dependency of the model at `candidate` in a scope
    /// narrowed to the model's own extent. A mandatory dependency that cannot
    /// be resolved empties the candidate. `skip` names an observable the
    /// caller provides itself.
    async fn resolve_dependencies(
        &mut self,
        candidate: NodeId,
        model: Arc<Model>,
        scope: &ContextScope,
        depth: usize,
        skip: Option<&str>,
    ) -> Result<()> {
        if model.dependencies.is_empty() {
            return Ok(());
        }

        let mut narrowing = vec![
            ResolutionConstraint::geometry(scope.geometry().intersection(&model.extent)),
            ResolutionConstraint::namespace(model.namespace.clone()),
        ];
        if !model.project.is_empty() {
            narrowing.push(ResolutionConstraint::project(model.project.clone()));
        }
        let child_scope = scope.with_resolution_constraints(narrowing)?;

        for dependency in &model.dependencies {
            self.check_cancelled(dependency)?;
            if skip == Some(dependency.key().as_str()) {
                continue;
            }

            let child = self.sub_resolve(candidate, dependency, &child_scope, depth).await?;
            if self.graph.is_empty(child) {
                if dependency.optional {
                    debug!("Optional dependency {} of {} unresolved", dependency, model.urn);
                    continue;
                }
                debug!("Mandatory dependency {} of {} unresolved", dependency, model.urn);
                self.graph.mark_empty(candidate);
                return Ok(());
            }

            self.graph.resolve(candidate, child, EdgeType::Direct)?;
            if self.graph.node(candidate).is_some_and(|n| n.coverage.is_empty()) {
                debug!("{} has no usable extent left after {}", model.urn, dependency);
                return Ok(());
            }
        }
        Ok(())
    }

    /// Attach models of `filter` to a node that already has content.
    async fn apply_filters(
        &mut self,
        node: NodeId,
        observable: &Observable,
        filter: &Observable,
        scope: &ContextScope,
        depth: usize,
    ) -> Result<()> {
        if self.graph.is_empty(node) {
            debug!("Nothing to filter for {}", observable);
            return Ok(());
        }

        let filtered_key = observable.key();
        for model in self.candidates(filter, scope).await? {
            self.check_cancelled(filter)?;

            let candidate = self.graph.new_candidate(filter.clone(), Arc::clone(&model), scope.geometry(), Some(node));
            self.bind_parameters(candidate, &model, scope);
            self.resolve_dependencies(candidate, Arc::clone(&model), scope, depth, Some(&filtered_key))
                .await?;

            if self.graph.is_empty(candidate) {
                debug!("Dropping filter {}: empty", model.urn);
                continue;
            }
            if self.graph.resolve(node, candidate, EdgeType::Filtering)? {
                info!("Filtering {} through {}", observable, model.urn);
            }
        }
        Ok(())
    }

    /// Model defaults overridden by `Parameters` constraints, either by plain
    /// name (declared parameters only) or as `<model>.<name>`.
    fn bind_parameters(&mut self, candidate: NodeId, model: &Model, scope: &ContextScope) {
        let mut bound: IndexMap<String, serde_json::Value> = model.parameters.clone();
        let overrides = scope
            .resolution_constraints()
            .payload::<Parameter>(ConstraintKind::Parameters);

        for parameter in overrides {
            match parameter.name.rsplit_once('.') {
                Some((target, name)) if target == model.urn || target == model.name() => {
                    bound.insert(name.to_string(), parameter.value);
                }
                Some(_) => {}
                None if bound.contains_key(&parameter.name) => {
                    bound.insert(parameter.name, parameter.value);
                }
                None => {}
            }
        }

        if !bound.is_empty() {
            self.graph.bind_parameters(candidate, bound);
        }
    }

    fn check_cancelled(&self, observable: &Observable) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!("Resolution cancelled at {}", observable);
            return Err(ResolutionError::Cancelled(observable.to_string()));
        }
        Ok(())
    }
}

/// Replace abstract predicates with the concrete ones the scope asks for.
fn concretize(observable: &Observable, scope: &ContextScope) -> Observable {
    let substitutions = scope
        .resolution_constraints()
        .payload::<PredicateSubstitution>(ConstraintKind::ConcretePredicates);
    if substitutions.is_empty() {
        return observable.clone();
    }

    let concrete = |predicate: &str| {
        substitutions
            .iter()
            .find(|s| s.abstract_predicate == predicate)
            .map(|s| s.concrete.clone())
    };

    let mut ret = observable.clone();
    if let Some(urn) = concrete(&ret.urn) {
        ret.urn = urn;
    }
    for predicate in ret.traits.iter_mut() {
        if let Some(replacement) = concrete(predicate.as_str()) {
            *predicate = replacement;
        }
    }
    ret
}

/// Apply blacklist, whitelist, scenario and forced-model constraints.
/// Constraints with no payload never remove anything.
fn filter_candidates(mut candidates: Vec<Arc<Model>>, scope: &ContextScope) -> Vec<Arc<Model>> {
    let constraints = scope.resolution_constraints();
    let blacklist = constraints.payload::<String>(ConstraintKind::Blacklist);
    let whitelist = constraints.payload::<String>(ConstraintKind::Whitelist);
    let scenarios = scope.scenarios();

    candidates.retain(|m| !blacklist.iter().any(|p| matches_urn(p, &m.urn)));
    if !whitelist.is_empty() {
        candidates.retain(|m| whitelist.iter().any(|p| matches_urn(p, &m.urn)));
    }
    candidates.retain(|m| m.scenario.as_ref().map_or(true, |s| scenarios.contains(s)));

    if let Some(forced) = constraints.payload::<String>(ConstraintKind::UsingModel).first() {
        match candidates.iter().find(|m| &m.urn == forced) {
            Some(model) => return vec![Arc::clone(model)],
            None => debug!("Model {} is not a candidate here; ignoring", forced),
        }
    }
    candidates
}
