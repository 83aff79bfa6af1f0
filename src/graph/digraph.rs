//! Directed graph storage
//!
//! Vertices and edges are kept in arenas and addressed by index. Iteration
//! over vertices, edges and each vertex's incoming/outgoing lists follows
//! insertion order.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexIndex(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeIndex(pub usize);

#[derive(Debug, Clone)]
struct EdgeEntry<E> {
    source: VertexIndex,
    target: VertexIndex,
    weight: E,
}

#[derive(Debug, Clone)]
pub struct DiGraph<N, E> {
    vertices: Vec<N>,
    edges: Vec<EdgeEntry<E>>,
    incoming: Vec<Vec<EdgeIndex>>,
    outgoing: Vec<Vec<EdgeIndex>>,
}

impl<N, E> Default for DiGraph<N, E> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }
    }
}

impl<N, E> DiGraph<N, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, vertex: N) -> VertexIndex {
        let index = VertexIndex(self.vertices.len());
        self.vertices.push(vertex);
        self.incoming.push(Vec::new());
        self.outgoing.push(Vec::new());
        index
    }

    /// Add an edge. Returns None if either endpoint does not exist.
    pub fn add_edge(&mut self, source: VertexIndex, target: VertexIndex, weight: E) -> Option<EdgeIndex> {
        if source.0 >= self.vertices.len() || target.0 >= self.vertices.len() {
            return None;
        }
        let index = EdgeIndex(self.edges.len());
        self.edges.push(EdgeEntry { source, target, weight });
        self.outgoing[source.0].push(index);
        self.incoming[target.0].push(index);
        Some(index)
    }

    pub fn vertex(&self, index: VertexIndex) -> Option<&N> {
        self.vertices.get(index.0)
    }

    pub fn vertex_mut(&mut self, index: VertexIndex) -> Option<&mut N> {
        self.vertices.get_mut(index.0)
    }

    pub fn edge(&self, index: EdgeIndex) -> Option<&E> {
        self.edges.get(index.0).map(|e| &e.weight)
    }

    pub fn endpoints(&self, index: EdgeIndex) -> Option<(VertexIndex, VertexIndex)> {
        self.edges.get(index.0).map(|e| (e.source, e.target))
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexIndex, &N)> {
        self.vertices.iter().enumerate().map(|(i, v)| (VertexIndex(i), v))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeIndex, VertexIndex, VertexIndex, &E)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (EdgeIndex(i), e.source, e.target, &e.weight))
    }

    /// Edges ending at `target`, oldest first.
    pub fn incoming(&self, target: VertexIndex) -> impl Iterator<Item = (EdgeIndex, &E)> {
        self.incoming
            .get(target.0)
            .into_iter()
            .flatten()
            .map(move |i| (*i, &self.edges[i.0].weight))
    }

    /// Edges starting at `source`, oldest first.
    pub fn outgoing(&self, source: VertexIndex) -> impl Iterator<Item = (EdgeIndex, &E)> {
        self.outgoing
            .get(source.0)
            .into_iter()
            .flatten()
            .map(move |i| (*i, &self.edges[i.0].weight))
    }

    pub fn in_degree(&self, target: VertexIndex) -> usize {
        self.incoming.get(target.0).map(Vec::len).unwrap_or(0)
    }

    pub fn out_degree(&self, source: VertexIndex) -> usize {
        self.outgoing.get(source.0).map(Vec::len).unwrap_or(0)
    }
}
