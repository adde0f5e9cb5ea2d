//! Bonded assemblies of particles.
//!
//! A topology references its particles by store index. The graph itself never
//! enforces connectivity: after any edge or vertex removal the owner
//! ([`crate::state::StateModel`]) recomputes components and splits.

pub mod graph;
pub mod registry;

pub use graph::TopologyGraph;
pub use registry::TopologyRegistry;

use crate::error::{Result, SimError};
use kinetia_data::TopologyTypeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slot of a topology in the state model's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopologyId(pub usize);

impl fmt::Display for TopologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Topology {
    type_id: TopologyTypeId,
    graph: TopologyGraph,
}

impl Topology {
    pub fn new(type_id: TopologyTypeId, graph: TopologyGraph) -> Self {
        Self { type_id, graph }
    }

    pub fn type_id(&self) -> TopologyTypeId {
        self.type_id
    }

    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut TopologyGraph {
        &mut self.graph
    }

    pub fn into_graph(self) -> TopologyGraph {
        self.graph
    }

    /// Store indices of the members, in vertex order.
    pub fn particles(&self) -> Vec<usize> {
        self.graph.particles()
    }

    pub fn len(&self) -> usize {
        self.graph.n_vertices()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.n_vertices() == 0
    }

    pub fn contains(&self, particle: usize) -> bool {
        self.graph.contains(particle)
    }

    /// Adds an edge between the `i`-th and `j`-th member in vertex order.
    pub fn add_edge_between_local(&mut self, i: usize, j: usize) -> Result<()> {
        let particles = self.graph.particles();
        let (a, b) = match (particles.get(i), particles.get(j)) {
            (Some(&a), Some(&b)) => (a, b),
            _ => {
                return Err(SimError::malformed(format!(
                    "local edge {i}-{j} outside a topology of {} particles",
                    particles.len()
                )))
            }
        };
        self.graph.add_edge(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_edges_use_vertex_order() {
        let graph = TopologyGraph::from_parts(&[7, 3, 9], &[]).unwrap();
        let mut top = Topology::new(0, graph);
        top.add_edge_between_local(0, 2).unwrap();
        assert!(top.graph().has_edge(7, 9));
        assert!(top.add_edge_between_local(1, 3).is_err());
        assert_eq!(top.len(), 3);
    }
}
