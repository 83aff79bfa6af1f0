//! Resolution Graph
//!
//! The acceptance graph built during one resolution pass. Nodes pair an
//! observable with the model (if any) that resolves it and carry their own
//! coverage. An edge runs from a resolving node to the node it resolves.
//!
//! Each node holds a copy-on-write catalog of what has been resolved so far,
//! snapshotted from its parent and the global catalog when the node is
//! created. Candidates are explored best first, so what an earlier branch
//! resolved is visible to every later branch and gets reused there.

pub mod digraph;

pub use digraph::{DiGraph, EdgeIndex, VertexIndex};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::CoverageThresholds;
use crate::coverage::{Coverage, Extent, LogicalConnector};
use crate::error::{ResolutionError, Result};
use crate::knowledge::{Knowledge, Model, Observable, Promotion};

pub type NodeId = VertexIndex;

/// Observable key -> node resolving it.
pub type Catalog = Arc<IndexMap<String, NodeId>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// The source observes the target directly.
    Direct,
    /// The source observes instances; the target is then observed in each.
    Deferral,
    /// The source modifies the target's values without adding extent.
    Filtering,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeType::Direct => write!(f, "direct"),
            EdgeType::Deferral => write!(f, "deferral"),
            EdgeType::Filtering => write!(f, "filtering"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionEdge {
    /// The resolving observable, as the target refers to it.
    pub observable: Observable,
    pub edge_type: EdgeType,
    pub deferred_observable: Option<Observable>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub observable: Observable,
    pub model: Option<Arc<Model>>,
    pub coverage: Coverage,
    pub merge_strategy: LogicalConnector,
    pub parent: Option<NodeId>,
    /// Already available: an instance, or an observable resolved in context.
    pub satisfied: bool,
    /// Parameter values bound to the model of this node.
    pub parameters: IndexMap<String, serde_json::Value>,
    accepted: Catalog,
    was_accepted: bool,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.accepted
    }

    pub fn was_accepted(&self) -> bool {
        self.was_accepted
    }
}

#[derive(Debug, Clone)]
pub struct ResolutionGraph {
    graph: DiGraph<Node, ResolutionEdge>,
    roots: Vec<NodeId>,
    catalog: Catalog,
    coverage: Coverage,
    thresholds: CoverageThresholds,
    accepted_roots: usize,
}

impl ResolutionGraph {
    pub fn new(target: Extent, thresholds: CoverageThresholds) -> Self {
        Self {
            graph: DiGraph::new(),
            roots: Vec::new(),
            catalog: Arc::new(IndexMap::new()),
            coverage: Coverage::create(target, 0.0, thresholds),
            thresholds,
            accepted_roots: 0,
        }
    }

    /// Create a node for a knowledge item. The coverage starts at 0, or at 1
    /// within its own extent for instances and models.
    pub fn new_node(
        &mut self,
        knowledge: &Knowledge,
        target: Extent,
        parent: Option<NodeId>,
        merge_strategy: LogicalConnector,
    ) -> Result<NodeId> {
        let id = match knowledge.promote()? {
            Promotion::Open(observable) => {
                let coverage = Coverage::create(target, 0.0, self.thresholds);
                self.insert(observable, None, coverage, merge_strategy, parent, false)
            }
            Promotion::Satisfied { observable, instance } => {
                let coverage = Coverage::create(target, 1.0, self.thresholds).within(&instance.extent);
                self.insert(observable, None, coverage, merge_strategy, parent, true)
            }
            Promotion::ResolvedBy { observable, model } => {
                let coverage = Coverage::create(target, 1.0, self.thresholds).within(&model.extent);
                self.insert(observable, Some(model), coverage, merge_strategy, parent, false)
            }
        };
        Ok(id)
    }

    /// Node for a candidate model resolving `observable`, which need not be
    /// the model's primary output. Dependencies merge by intersection.
    pub fn new_candidate(
        &mut self,
        observable: Observable,
        model: Arc<Model>,
        target: Extent,
        parent: Option<NodeId>,
    ) -> NodeId {
        let coverage = Coverage::create(target, 1.0, self.thresholds).within(&model.extent);
        self.insert(observable, Some(model), coverage, LogicalConnector::Intersection, parent, false)
    }

    fn insert(
        &mut self,
        observable: Observable,
        model: Option<Arc<Model>>,
        coverage: Coverage,
        merge_strategy: LogicalConnector,
        parent: Option<NodeId>,
        satisfied: bool,
    ) -> NodeId {
        let mut accepted = parent
            .and_then(|p| self.graph.vertex(p))
            .map(|p| Arc::clone(&p.accepted))
            .unwrap_or_default();
        if !self.catalog.is_empty() {
            let snapshot = Arc::make_mut(&mut accepted);
            for (key, id) in self.catalog.iter() {
                snapshot.entry(key.clone()).or_insert(*id);
            }
        }

        let id = VertexIndex(self.graph.vertex_count());

        // secondary outputs are available wherever this node is accepted
        let own_key = observable.key();
        let secondary: Vec<String> = model
            .as_ref()
            .map(|m| m.secondary_outputs().iter().map(Observable::key).collect())
            .unwrap_or_default();
        for key in secondary.into_iter().filter(|k| *k != own_key) {
            Arc::make_mut(&mut accepted).insert(key, id);
        }
        let vertex = self.graph.add_vertex(Node {
            id,
            observable,
            model,
            coverage,
            merge_strategy,
            parent,
            satisfied,
            parameters: IndexMap::new(),
            accepted,
            was_accepted: false,
        });
        if parent.is_none() {
            self.roots.push(vertex);
        }
        vertex
    }

    /// Mark a node as available in context: full coverage, no model needed.
    pub fn mark_satisfied(&mut self, id: NodeId) {
        if let Some(node) = self.graph.vertex_mut(id) {
            node.satisfied = true;
            node.coverage = Coverage::create(node.coverage.target().clone(), 1.0, node.coverage.thresholds());
        }
    }

    /// Force a node's coverage to empty, e.g. when a mandatory dependency
    /// cannot be resolved.
    pub fn mark_empty(&mut self, id: NodeId) {
        if let Some(node) = self.graph.vertex_mut(id) {
            node.coverage = Coverage::create(node.coverage.target().clone(), 0.0, node.coverage.thresholds());
        }
    }

    pub fn bind_parameters(&mut self, id: NodeId, parameters: IndexMap<String, serde_json::Value>) {
        if let Some(node) = self.graph.vertex_mut(id) {
            node.parameters = parameters;
        }
    }

    pub fn resolve(&mut self, node: NodeId, child: NodeId, edge_type: EdgeType) -> Result<bool> {
        self.link(node, child, edge_type, None)
    }

    pub fn resolve_deferred(&mut self, node: NodeId, child: NodeId, deferred: Observable) -> Result<bool> {
        self.link(node, child, EdgeType::Deferral, Some(deferred))
    }

    /// Merge `child` into `node` and record the edge if it contributes.
    /// Returns whether the edge was recorded.
    fn link(
        &mut self,
        node_id: NodeId,
        child_id: NodeId,
        edge_type: EdgeType,
        deferred: Option<Observable>,
    ) -> Result<bool> {
        let node = self.require(node_id)?;
        let child = self.require(child_id)?;

        let merged = match edge_type {
            EdgeType::Filtering => node.coverage.clone(),
            _ => node.coverage.merge(&child.coverage, node.merge_strategy)?,
        };
        let grounded = self.is_grounded(node_id) || self.is_grounded(child_id);
        let record = !merged.is_empty() && grounded;

        let child_observable = child.observable.clone();
        let child_catalog = Arc::clone(&child.accepted);
        let node_key = node.observable.key();
        let is_root = node.is_root();

        if record {
            let edge = ResolutionEdge {
                observable: child_observable.clone(),
                edge_type,
                deferred_observable: deferred,
            };
            self.graph.add_edge(child_id, node_id, edge);
        }

        let node = self.require_mut(node_id)?;
        node.coverage = merged;
        if !record {
            return Ok(false);
        }

        let catalog = Arc::make_mut(&mut node.accepted);
        for (key, id) in child_catalog.iter() {
            catalog.entry(key.clone()).or_insert(*id);
        }
        let child_key = child_observable.key();
        if child_key != node_key {
            catalog.insert(child_key, child_id);
        }

        debug!(
            "{} edge {} -> {} recorded, coverage now {}",
            edge_type, child_observable, node.observable, node.coverage
        );

        if is_root && self.is_complete(node_id) {
            self.accept(node_id)?;
        }
        Ok(true)
    }

    /// Publish a complete root into the global catalog and fold its coverage
    /// into the overall coverage.
    pub fn accept(&mut self, id: NodeId) -> Result<()> {
        let node = self.require(id)?;
        if !node.is_root() {
            return Err(ResolutionError::IllegalAcceptance {
                node: id.0,
                reason: "not a root node".into(),
            });
        }
        if !self.is_complete(id) {
            return Err(ResolutionError::IllegalAcceptance {
                node: id.0,
                reason: format!("coverage {} is not complete", node.coverage),
            });
        }
        if node.was_accepted {
            return Ok(());
        }

        let key = node.observable.key();
        let node_catalog = Arc::clone(&node.accepted);
        let coverage = if self.accepted_roots == 0 {
            node.coverage.clone()
        } else {
            self.coverage.merge(&node.coverage, node.merge_strategy)?
        };
        info!("Accepted {} with coverage {}", node.observable, node.coverage);

        let global = Arc::make_mut(&mut self.catalog);
        for (k, v) in node_catalog.iter() {
            global.insert(k.clone(), *v);
        }
        global.insert(key, id);

        self.coverage = coverage;
        self.accepted_roots += 1;
        self.require_mut(id)?.was_accepted = true;
        Ok(())
    }

    /// Memoized lookup. Consult before starting any sub-resolution.
    pub fn get_resolution(&self, node: NodeId, observable: &Observable) -> Option<NodeId> {
        let key = observable.key();
        self.graph
            .vertex(node)
            .and_then(|n| n.accepted.get(&key).copied())
            .or_else(|| self.catalog.get(&key).copied())
    }

    /// A node counts only if something grounds it in data or computation.
    pub fn is_grounded(&self, id: NodeId) -> bool {
        self.graph.vertex(id).is_some_and(|n| {
            n.model.is_some() || n.observable.is_acknowledgement() || n.satisfied || self.graph.in_degree(id) > 0
        })
    }

    pub fn is_complete(&self, id: NodeId) -> bool {
        self.is_grounded(id) && self.graph.vertex(id).is_some_and(|n| n.coverage.is_complete())
    }

    pub fn is_relevant(&self, id: NodeId) -> bool {
        self.is_grounded(id) && self.graph.vertex(id).is_some_and(|n| n.coverage.is_relevant())
    }

    pub fn is_empty(&self, id: NodeId) -> bool {
        !(self.is_grounded(id) && self.graph.vertex(id).is_some_and(|n| !n.coverage.is_empty()))
    }

    /// Nodes resolving `id` through edges of the given type, in the order
    /// they were accepted.
    pub fn resolving(&self, id: NodeId, edge_type: EdgeType) -> Vec<NodeId> {
        self.graph
            .incoming(id)
            .filter(|(_, e)| e.edge_type == edge_type)
            .filter_map(|(index, _)| self.graph.endpoints(index).map(|(source, _)| source))
            .collect()
    }

    pub fn incoming_edges(&self, id: NodeId) -> impl Iterator<Item = &ResolutionEdge> {
        self.graph.incoming(id).map(|(_, e)| e)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.vertex(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.vertices().map(|(_, n)| n)
    }

    /// (source, target, edge) in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, &ResolutionEdge)> {
        self.graph.edges().map(|(_, s, t, e)| (s, t, e))
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn node_count(&self) -> usize {
        self.graph.vertex_count()
    }

    pub fn thresholds(&self) -> CoverageThresholds {
        self.thresholds
    }

    fn require(&self, id: NodeId) -> Result<&Node> {
        self.graph.vertex(id).ok_or_else(|| ResolutionError::IllegalAcceptance {
            node: id.0,
            reason: "no such node in this graph".into(),
        })
    }

    fn require_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.graph.vertex_mut(id).ok_or_else(|| ResolutionError::IllegalAcceptance {
            node: id.0,
            reason: "no such node in this graph".into(),
        })
    }

    /// Diagnostic dump, kept with unresolved results.
    pub fn describe(&self) -> serde_json::Value {
        let nodes: Vec<serde_json::Value> = self
            .nodes()
            .map(|n| {
                json!({
                    "id": n.id.0,
                    "observable": n.observable.key(),
                    "model": n.model.as_ref().map(|m| m.urn.clone()),
                    "coverage": n.coverage.proportion(),
                    "merge_strategy": n.merge_strategy,
                    "root": n.is_root(),
                    "accepted": n.was_accepted,
                    "parameters": n.parameters,
                })
            })
            .collect();
        let edges: Vec<serde_json::Value> = self
            .edges()
            .map(|(s, t, e)| {
                json!({
                    "from": s.0,
                    "to": t.0,
                    "type": e.edge_type,
                    "observable": e.observable.local_name(),
                    "deferred": e.deferred_observable.as_ref().map(Observable::key),
                })
            })
            .collect();

        json!({
            "coverage": self.coverage.proportion(),
            "roots": self.roots.iter().map(|r| r.0).collect::<Vec<_>>(),
            "nodes": nodes,
            "edges": edges,
        })
    }
}
