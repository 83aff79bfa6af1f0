mod common;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use std::sync::Arc;

use common::*;
use knowledge_resolver::resolver::ResourceSet;
use knowledge_resolver::{
    CancellationToken, ContextScope, Coverage, CoverageThresholds, DescriptionType, EdgeType, Extent, Instance,
    Knowledge, LogicalConnector, Model, ObservationStrategy, Observable, Outcome, ResolutionConstraint,
    ResolutionError, Resolver, ResolverConfig, ResourcesService,
};

fn urns(knowledge: &[Knowledge]) -> Vec<String> {
    knowledge.iter().map(|k| k.urn().to_string()).collect()
}

fn scenario_a_models() -> Vec<Model> {
    // discovery order is deliberately the reverse of priority order
    vec![model("ns.m2", "O", 30.0, 80.0), model("ns.m1", "O", 0.0, 60.0)]
}

#[tokio::test]
async fn test_overlapping_candidates_are_not_double_counted() {
    let f = fixture(ScriptedReasoner::new(), scenario_a_models());

    let resolution = f.resolver.resolve(quality("O").into(), &scope()).await.unwrap();

    let coverage = resolution.coverage();
    assert!((coverage.proportion() - 0.8).abs() < 1e-9);
    assert!(coverage.is_relevant());
    assert!(!coverage.is_complete());
    assert_eq!(resolution.outcome(), Outcome::Resolved);
    assert!(!resolution.is_accepted());

    let resolving = resolution.resolving(&quality("O").into(), EdgeType::Direct);
    assert_eq!(urns(&resolving), vec!["ns.m1", "ns.m2"]);
}

#[tokio::test]
async fn test_empty_mandatory_dependency_empties_the_model() {
    let m = global_model("ns.m", "O").with_dependency(quality("D"));
    let f = fixture(ScriptedReasoner::new(), vec![m]);

    let resolution = f.resolver.resolve(quality("O").into(), &scope()).await.unwrap();

    assert!(resolution.is_empty());
    assert_eq!(resolution.outcome(), Outcome::Unresolved);
    assert!(!resolution.is_accepted());
    assert_eq!(resolution.graph().coverage().proportion(), 0.0);
    assert!(resolution.resolving(&quality("O").into(), EdgeType::Direct).is_empty());
    assert_eq!(f.resources.calls("D").await, 1);
}

#[tokio::test]
async fn test_empty_optional_dependency_is_skipped() {
    let m = global_model("ns.m", "O").with_dependency(quality("X").with_optional(true));
    let f = fixture(ScriptedReasoner::new(), vec![m]);

    let resolution = f.resolver.resolve(quality("O").into(), &scope()).await.unwrap();

    assert!(resolution.coverage().is_complete());
    assert!(resolution.is_accepted());
}

#[tokio::test]
async fn test_instances_are_accepted_without_collaborators() {
    let f = fixture(ScriptedReasoner::new(), scenario_a_models());
    let instance = Instance::new("obs-42", quality("O"));

    let resolution = f.resolver.resolve(instance.into(), &scope()).await.unwrap();

    assert_eq!(resolution.coverage().proportion(), 1.0);
    assert!(resolution.is_accepted());
    assert_eq!(resolution.graph().coverage().proportion(), 1.0);
    assert_eq!(f.resources.total_calls().await, 0);
    assert_eq!(f.reasoner.total_calls().await, 0);
}

#[test]
fn test_exclusion_merge_fails_and_leaves_operands_alone() {
    let thresholds = CoverageThresholds::default();
    let a = Coverage::create(Extent::space(0.0, 100.0), 1.0, thresholds).within(&Extent::space(0.0, 40.0));
    let b = Coverage::create(Extent::space(0.0, 100.0), 0.0, thresholds);
    let (a_before, b_before) = (a.clone(), b.clone());

    let err = a.merge(&b, LogicalConnector::Exclusion).unwrap_err();

    assert!(matches!(err, ResolutionError::UnsupportedMergeKind(LogicalConnector::Exclusion)));
    assert!(err.is_contract_violation());
    assert_eq!(a, a_before);
    assert_eq!(b, b_before);
}

#[tokio::test]
async fn test_secondary_outputs_of_dependency_free_models_are_reused() {
    let models = vec![
        global_model("ns.mx", "X")
            .with_dependency(quality("O"))
            .with_dependency(quality("S")),
        global_model("ns.mo", "O").with_output(quality("S")),
    ];
    let f = fixture(ScriptedReasoner::new(), models);

    let resolution = f.resolver.resolve(quality("X").into(), &scope()).await.unwrap();

    assert!(resolution.coverage().is_complete());
    assert_eq!(f.resources.calls("S").await, 0);
    assert_eq!(f.reasoner.calls("S").await, 0);
    let mo_nodes = resolution
        .graph()
        .nodes()
        .filter(|n| n.model.as_ref().is_some_and(|m| m.urn == "ns.mo"))
        .count();
    assert_eq!(mo_nodes, 1);
}

#[tokio::test]
async fn test_dropped_candidates_do_not_share_their_resolutions() {
    // the scenario model ranks first but covers too little to be kept
    let models = vec![
        model("ns.small", "O", 0.0, 10.0)
            .in_scenario("s1")
            .with_dependency(quality("D")),
        global_model("ns.big", "O").with_dependency(quality("D")),
        global_model("ns.md", "D"),
    ];
    let f = fixture(ScriptedReasoner::new(), models);
    let scope = scope().with_scenario("s1");

    let resolution = f.resolver.resolve(quality("O").into(), &scope).await.unwrap();

    assert!(resolution.coverage().is_complete());
    assert_eq!(urns(&resolution.resolving(&quality("O").into(), EdgeType::Direct)), vec!["ns.big"]);
    assert_eq!(f.resources.calls("D").await, 2);
    assert_eq!(f.reasoner.calls("D").await, 2);
}

#[tokio::test]
async fn test_shared_dependency_is_resolved_once() {
    let models = vec![
        global_model("ns.mo", "O")
            .with_dependency(quality("A"))
            .with_dependency(quality("B")),
        global_model("ns.ma", "A").with_dependency(quality("D")),
        global_model("ns.mb", "B").with_dependency(quality("D")),
        global_model("ns.md", "D"),
    ];
    let f = fixture(ScriptedReasoner::new(), models);

    let resolution = f.resolver.resolve(quality("O").into(), &scope()).await.unwrap();

    assert!(resolution.coverage().is_complete());
    assert_eq!(f.resources.calls("D").await, 1);
    assert_eq!(f.reasoner.calls("D").await, 1);

    let d_nodes = resolution.graph().nodes().filter(|n| n.observable.urn == "D" && n.model.is_none()).count();
    assert_eq!(d_nodes, 1);
}

#[tokio::test]
async fn test_candidates_are_accepted_in_priority_order() {
    let models = vec![
        model("other.p3", "O", 60.0, 90.0),
        model("elsewhere.p1", "O", 0.0, 30.0).in_scenario("s1"),
        model("local.p2", "O", 30.0, 60.0),
    ];
    let f = fixture(ScriptedReasoner::new(), models);
    let scope = scope()
        .with_scenario("s1")
        .with_constraint(ResolutionConstraint::namespace("local"))
        .unwrap();

    let resolution = f.resolver.resolve(quality("O").into(), &scope).await.unwrap();

    let resolving = resolution.resolving(&quality("O").into(), EdgeType::Direct);
    assert_eq!(urns(&resolving), vec!["elsewhere.p1", "local.p2", "other.p3"]);
    assert!((resolution.coverage().proportion() - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn test_blacklist_whitelist_and_forced_model() {
    let blacklisted = fixture(ScriptedReasoner::new(), scenario_a_models());
    let scope_b = scope().with_constraint(ResolutionConstraint::blacklist(["ns.m1"])).unwrap();
    let r = blacklisted.resolver.resolve(quality("O").into(), &scope_b).await.unwrap();
    assert!((r.coverage().proportion() - 0.5).abs() < 1e-9);

    let whitelisted = fixture(ScriptedReasoner::new(), scenario_a_models());
    let scope_w = scope().with_constraint(ResolutionConstraint::whitelist(["ns.m1"])).unwrap();
    let r = whitelisted.resolver.resolve(quality("O").into(), &scope_w).await.unwrap();
    assert!((r.coverage().proportion() - 0.6).abs() < 1e-9);

    let forced = fixture(ScriptedReasoner::new(), scenario_a_models());
    let scope_u = scope().with_constraint(ResolutionConstraint::using_model("ns.m2")).unwrap();
    let r = forced.resolver.resolve(quality("O").into(), &scope_u).await.unwrap();
    assert_eq!(urns(&r.resolving(&quality("O").into(), EdgeType::Direct)), vec!["ns.m2"]);
}

#[tokio::test]
async fn test_geometry_constraint_sets_the_target() {
    let f = fixture(ScriptedReasoner::new(), scenario_a_models());
    let narrowed = scope()
        .with_constraint(ResolutionConstraint::geometry(Extent::space(0.0, 30.0)))
        .unwrap();

    let resolution = f.resolver.resolve(quality("O").into(), &narrowed).await.unwrap();

    assert!(resolution.coverage().is_complete());
    assert_eq!(urns(&resolution.resolving(&quality("O").into(), EdgeType::Direct)), vec!["ns.m1"]);
}

#[tokio::test]
async fn test_deferral_links_the_deferred_observable() {
    let subjects = Observable::new("Subjects", DescriptionType::Instantiation);
    let reasoner = ScriptedReasoner::new().with(
        "O",
        vec![ObservationStrategy::Deferral { deferred: subjects.clone() }],
    );
    let f = fixture(reasoner, vec![Model::new("ns.subjects", subjects.clone())]);

    let resolution = f.resolver.resolve(quality("O").into(), &scope()).await.unwrap();

    assert!(resolution.is_accepted());
    let deferred = resolution.resolving(&quality("O").into(), EdgeType::Deferral);
    assert_eq!(deferred, vec![Knowledge::Observable(subjects.clone())]);

    let (_, _, edge) = resolution
        .graph()
        .edges()
        .find(|(_, _, e)| e.edge_type == EdgeType::Deferral)
        .unwrap();
    assert_eq!(edge.deferred_observable.as_ref(), Some(&subjects));
}

#[tokio::test]
async fn test_filters_attach_without_adding_coverage() {
    let reasoner = ScriptedReasoner::new().with(
        "O",
        vec![ObservationStrategy::Direct, ObservationStrategy::Filtering { filter: quality("F") }],
    );
    let models = vec![
        model("ns.mo", "O", 0.0, 100.0),
        global_model("ns.mf", "F").with_dependency(quality("O")),
    ];
    let f = fixture(reasoner, models);

    let resolution = f.resolver.resolve(quality("O").into(), &scope()).await.unwrap();

    assert_eq!(resolution.coverage().proportion(), 1.0);
    assert_eq!(urns(&resolution.resolving(&quality("O").into(), EdgeType::Filtering)), vec!["ns.mf"]);
    assert_eq!(f.resources.calls("O").await, 1);
}

#[tokio::test]
async fn test_observables_resolved_in_context_need_no_models() {
    let reasoner = ScriptedReasoner::new().with("O", vec![ObservationStrategy::Resolved]);
    let f = fixture(reasoner, scenario_a_models());

    let resolution = f.resolver.resolve(quality("O").into(), &scope()).await.unwrap();

    assert!(resolution.is_accepted());
    assert_eq!(f.resources.total_calls().await, 0);
}

#[tokio::test]
async fn test_models_resolve_only_their_dependencies() {
    let mo = Arc::new(global_model("ns.mo", "O").with_dependency(quality("D")));
    let f = fixture(ScriptedReasoner::new(), vec![global_model("ns.md", "D")]);

    let resolution = f.resolver.resolve(Knowledge::Model(mo.clone()), &scope()).await.unwrap();

    assert!(resolution.is_accepted());
    assert_eq!(f.resources.calls("O").await, 0);
    let resolving = resolution.resolving(&Knowledge::Model(mo), EdgeType::Direct);
    assert_eq!(resolving, vec![Knowledge::Observable(quality("D"))]);
}

#[tokio::test]
async fn test_resources_are_not_resolvable() {
    let f = fixture(ScriptedReasoner::new(), Vec::new());
    let resource = knowledge_resolver::knowledge::Resource { urn: "im:data:dem".into() };

    let err = f.resolver.resolve(resource.into(), &scope()).await.unwrap_err();

    assert!(matches!(err, ResolutionError::NotResolvable { .. }));
    assert!(err.is_contract_violation());
}

#[tokio::test]
async fn test_collaborator_failures_are_not_soft_outcomes() {
    let resolver = Resolver::new(
        Arc::new(ScriptedReasoner::new()),
        Arc::new(UnreachableResources),
        ResolverConfig::default(),
    )
    .unwrap();

    let err = resolver.resolve(quality("O").into(), &scope()).await.unwrap_err();

    assert!(matches!(err, ResolutionError::CollaboratorUnavailable { service: "resources", .. }));
    assert!(!err.is_contract_violation());
}

#[tokio::test]
async fn test_circular_dependencies_resolve_empty() {
    let models = vec![
        global_model("ns.mo", "O").with_dependency(quality("P")),
        global_model("ns.mp", "P").with_dependency(quality("O")),
    ];
    let f = fixture(ScriptedReasoner::new(), models);

    let resolution = f.resolver.resolve(quality("O").into(), &scope()).await.unwrap();

    assert_eq!(resolution.outcome(), Outcome::Unresolved);
}

#[tokio::test]
async fn test_depth_limit_resolves_empty() {
    let chain = || {
        vec![
            global_model("ns.mo", "O").with_dependency(quality("A")),
            global_model("ns.ma", "A").with_dependency(quality("B")),
            global_model("ns.mb", "B"),
        ]
    };

    let shallow = fixture_with_config(ScriptedReasoner::new(), chain(), ResolverConfig { max_depth: 1, ..Default::default() });
    let r = shallow.resolver.resolve(quality("O").into(), &scope()).await.unwrap();
    assert_eq!(r.outcome(), Outcome::Unresolved);
    assert_eq!(shallow.resources.calls("B").await, 0);

    let deep = fixture(ScriptedReasoner::new(), chain());
    let r = deep.resolver.resolve(quality("O").into(), &scope()).await.unwrap();
    assert_eq!(r.outcome(), Outcome::Resolved);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let f = fixture(ScriptedReasoner::new(), scenario_a_models());
    let token = CancellationToken::new();
    token.cancel();

    let err = f
        .resolver
        .resolve_with_cancel(quality("O").into(), &scope(), &token)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolutionError::Cancelled(_)));
    assert_eq!(f.resources.total_calls().await, 0);
}

/// Cancels the pass while answering the query.
struct CancellingResources {
    token: CancellationToken,
    inner: CountingResources,
}

#[async_trait]
impl ResourcesService for CancellingResources {
    async fn query_models(&self, observable: &Observable, scope: &ContextScope) -> AnyResult<ResourceSet> {
        self.token.cancel();
        self.inner.query_models(observable, scope).await
    }
}

#[tokio::test]
async fn test_cancelled_between_candidates() {
    let token = CancellationToken::new();
    let resources = Arc::new(CancellingResources {
        token: token.clone(),
        inner: CountingResources::new(scenario_a_models()),
    });
    let resolver = Resolver::new(Arc::new(ScriptedReasoner::new()), resources, ResolverConfig::default()).unwrap();

    let err = resolver
        .resolve_with_cancel(quality("O").into(), &scope(), &token)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolutionError::Cancelled(_)));
}

#[tokio::test]
async fn test_min_gain_drops_marginal_candidates() {
    let config = ResolverConfig::default().with_min_gain(0.3);
    let f = fixture_with_config(ScriptedReasoner::new(), scenario_a_models(), config);

    let resolution = f.resolver.resolve(quality("O").into(), &scope()).await.unwrap();

    // M2 only adds 0.2 on top of M1
    assert!((resolution.coverage().proportion() - 0.6).abs() < 1e-9);
    assert_eq!(urns(&resolution.resolving(&quality("O").into(), EdgeType::Direct)), vec!["ns.m1"]);
}

#[tokio::test]
async fn test_unresolved_results_keep_the_graph_for_diagnostics() {
    let f = fixture(ScriptedReasoner::new(), vec![model("ns.tiny", "O", 0.0, 10.0)]);

    let resolution = f.resolver.resolve(quality("O").into(), &scope()).await.unwrap();

    assert_eq!(resolution.outcome(), Outcome::Unresolved);
    let described = resolution.describe();
    assert_eq!(described["outcome"], "unresolved");
    assert_eq!(described["graph"]["nodes"].as_array().map(Vec::len), Some(2));
}
