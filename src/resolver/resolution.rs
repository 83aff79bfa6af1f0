//! Result of one resolution pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::coverage::Coverage;
use crate::graph::{EdgeType, Node, NodeId, ResolutionGraph};
use crate::knowledge::{Knowledge, Promotion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Root coverage is at least relevant.
    Resolved,
    /// Could not resolve; the graph is kept for diagnostics.
    Unresolved,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    graph: ResolutionGraph,
    root: NodeId,
    knowledge: Knowledge,
    created_at: DateTime<Utc>,
}

impl Resolution {
    pub(crate) fn new(graph: ResolutionGraph, root: NodeId, knowledge: Knowledge) -> Self {
        Self {
            graph,
            root,
            knowledge,
            created_at: Utc::now(),
        }
    }

    /// Coverage of the root observable.
    pub fn coverage(&self) -> &Coverage {
        match self.graph.node(self.root) {
            Some(node) => &node.coverage,
            None => self.graph.coverage(),
        }
    }

    pub fn resolved_knowledge(&self) -> &Knowledge {
        &self.knowledge
    }

    /// Knowledge resolving `target` through edges of the given type, highest
    /// priority first.
    pub fn resolving(&self, target: &Knowledge, edge_type: EdgeType) -> Vec<Knowledge> {
        let Some(node) = self.find(target) else {
            return Vec::new();
        };
        self.resolving_node(node, edge_type)
            .into_iter()
            .filter_map(|id| self.graph.node(id))
            .map(node_knowledge)
            .collect()
    }

    pub fn resolving_node(&self, node: NodeId, edge_type: EdgeType) -> Vec<NodeId> {
        self.graph.resolving(node, edge_type)
    }

    fn find(&self, target: &Knowledge) -> Option<NodeId> {
        if let Knowledge::Model(model) = target {
            return self
                .graph
                .nodes()
                .find(|n| n.model.as_ref().is_some_and(|m| m.urn == model.urn))
                .map(|n| n.id);
        }

        let key = target.promote().ok().map(|p: Promotion| p.observable().key())?;
        let mut matching = self.graph.nodes().filter(|n| n.observable.key() == key);
        let first = matching.next()?;
        if first.model.is_none() {
            return Some(first.id);
        }
        matching.find(|n| n.model.is_none()).map(|n| n.id).or(Some(first.id))
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty(self.root)
    }

    pub fn outcome(&self) -> Outcome {
        if self.graph.is_relevant(self.root) {
            Outcome::Resolved
        } else {
            Outcome::Unresolved
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.graph.node(self.root).is_some_and(Node::was_accepted)
    }

    pub fn graph(&self) -> &ResolutionGraph {
        &self.graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn describe(&self) -> serde_json::Value {
        json!({
            "knowledge": self.knowledge.urn(),
            "kind": self.knowledge.kind(),
            "outcome": self.outcome(),
            "coverage": self.coverage().proportion(),
            "created_at": self.created_at.to_rfc3339(),
            "graph": self.graph.describe(),
        })
    }
}

fn node_knowledge(node: &Node) -> Knowledge {
    match &node.model {
        Some(model) => Knowledge::Model(model.clone()),
        None => Knowledge::Observable(node.observable.clone()),
    }
}
