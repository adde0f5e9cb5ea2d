use crate::error::{Result, SimError};
use kinetia_data::BondKind;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::{Bfs, EdgeRef};
use std::collections::HashMap;

/// Undirected bond graph over store indices.
///
/// Vertices carry the store index of their particle, edges carry the bond kind.
/// Membership is mirrored in a hash map so lookups by store index are O(1).
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    graph: UnGraph<usize, BondKind>,
    nodes: HashMap<usize, NodeIndex>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from particles and edges given as store indices.
    pub fn from_parts(particles: &[usize], edges: &[(usize, usize)]) -> Result<Self> {
        let mut graph = Self::new();
        for &p in particles {
            graph.add_vertex(p)?;
        }
        for &(a, b) in edges {
            graph.add_edge(a, b)?;
        }
        Ok(graph)
    }

    pub fn add_vertex(&mut self, particle: usize) -> Result<()> {
        if self.nodes.contains_key(&particle) {
            return Err(SimError::malformed(format!(
                "particle {particle} is already a vertex of this topology"
            )));
        }
        let node = self.graph.add_node(particle);
        self.nodes.insert(particle, node);
        Ok(())
    }

    pub fn contains(&self, particle: usize) -> bool {
        self.nodes.contains_key(&particle)
    }

    pub fn add_edge(&mut self, a: usize, b: usize) -> Result<()> {
        self.add_edge_tagged(a, b, BondKind::Harmonic)
    }

    pub fn add_edge_tagged(&mut self, a: usize, b: usize, kind: BondKind) -> Result<()> {
        if a == b {
            return Err(SimError::malformed(format!("self edge on particle {a}")));
        }
        let (na, nb) = (self.node(a)?, self.node(b)?);
        if self.graph.find_edge(na, nb).is_some() {
            return Err(SimError::malformed(format!("duplicate edge {a}-{b}")));
        }
        self.graph.add_edge(na, nb, kind);
        Ok(())
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        match (self.nodes.get(&a), self.nodes.get(&b)) {
            (Some(&na), Some(&nb)) => self.graph.find_edge(na, nb).is_some(),
            _ => false,
        }
    }

    pub fn remove_edge(&mut self, a: usize, b: usize) -> Result<()> {
        let (na, nb) = (self.node(a)?, self.node(b)?);
        let edge = self
            .graph
            .find_edge(na, nb)
            .ok_or_else(|| SimError::malformed(format!("no edge {a}-{b} to remove")))?;
        self.graph.remove_edge(edge);
        Ok(())
    }

    /// Removes a vertex and all of its edges.
    pub fn remove_vertex(&mut self, particle: usize) -> Result<()> {
        let node = self.node(particle)?;
        let last = NodeIndex::new(self.graph.node_count() - 1);
        self.graph.remove_node(node);
        self.nodes.remove(&particle);
        // petgraph moves the last node into the freed slot
        if node != last {
            if let Some(&moved) = self.graph.node_weight(node) {
                self.nodes.insert(moved, node);
            }
        }
        Ok(())
    }

    /// Points the vertex of `old` at a different store index, keeping its edges.
    pub fn replace_particle(&mut self, old: usize, new: usize) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if self.nodes.contains_key(&new) {
            return Err(SimError::malformed(format!(
                "particle {new} is already a vertex of this topology"
            )));
        }
        let node = self.node(old)?;
        self.graph[node] = new;
        self.nodes.remove(&old);
        self.nodes.insert(new, node);
        Ok(())
    }

    /// Store indices in vertex order.
    pub fn particles(&self) -> Vec<usize> {
        self.graph.node_indices().map(|n| self.graph[n]).collect()
    }

    pub fn edges(&self) -> Vec<(usize, usize, BondKind)> {
        self.graph
            .edge_references()
            .map(|e| (self.graph[e.source()], self.graph[e.target()], *e.weight()))
            .collect()
    }

    pub fn neighbors(&self, particle: usize) -> Vec<usize> {
        match self.nodes.get(&particle) {
            Some(&n) => self.graph.neighbors(n).map(|m| self.graph[m]).collect(),
            None => Vec::new(),
        }
    }

    pub fn n_vertices(&self) -> usize {
        self.graph.node_count()
    }

    pub fn n_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// Connected components as lists of store indices, each in vertex order.
    /// Components are ordered by their first vertex.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut component_of = vec![usize::MAX; self.graph.node_count()];
        let mut components: Vec<Vec<NodeIndex>> = Vec::new();
        for start in self.graph.node_indices() {
            if component_of[start.index()] != usize::MAX {
                continue;
            }
            let label = components.len();
            let mut members = Vec::new();
            let mut bfs = Bfs::new(&self.graph, start);
            while let Some(node) = bfs.next(&self.graph) {
                component_of[node.index()] = label;
                members.push(node);
            }
            members.sort_unstable();
            components.push(members);
        }
        components
            .into_iter()
            .map(|c| c.into_iter().map(|n| self.graph[n]).collect())
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.connected_components().len() <= 1
    }

    /// Subgraph induced by `particles`, with vertices in the given order.
    pub fn induced(&self, particles: &[usize]) -> Result<TopologyGraph> {
        let mut sub = TopologyGraph::new();
        for &p in particles {
            self.node(p)?;
            sub.add_vertex(p)?;
        }
        for (a, b, kind) in self.edges() {
            if sub.contains(a) && sub.contains(b) {
                sub.add_edge_tagged(a, b, kind)?;
            }
        }
        Ok(sub)
    }

    /// Moves every vertex and edge of `other` into this graph.
    pub fn merge(&mut self, other: TopologyGraph) -> Result<()> {
        for p in other.particles() {
            self.add_vertex(p)?;
        }
        for (a, b, kind) in other.edges() {
            self.add_edge_tagged(a, b, kind)?;
        }
        Ok(())
    }

    /// Rewrites every vertex through `map`. A vertex without an image is an error.
    pub fn relabel<F: Fn(usize) -> Option<usize>>(&mut self, map: F) -> Result<()> {
        let mut nodes = HashMap::with_capacity(self.nodes.len());
        for node in self.graph.node_indices() {
            let old = self.graph[node];
            let new = map(old).ok_or_else(|| {
                SimError::malformed(format!("topology vertex {old} has no remapped index"))
            })?;
            self.graph[node] = new;
            nodes.insert(new, node);
        }
        self.nodes = nodes;
        Ok(())
    }

    /// Paths `i - j - k` with `i < k`, one per angle.
    pub fn angles(&self) -> Vec<[usize; 3]> {
        let mut out = Vec::new();
        for j in self.graph.node_indices() {
            let around: Vec<usize> = self.graph.neighbors(j).map(|n| self.graph[n]).collect();
            for (a, &i) in around.iter().enumerate() {
                for &k in &around[a + 1..] {
                    let (i, k) = if i < k { (i, k) } else { (k, i) };
                    out.push([i, self.graph[j], k]);
                }
            }
        }
        out
    }

    /// Paths `i - j - k - l` around every edge `j - k`, one per dihedral.
    pub fn dihedrals(&self) -> Vec<[usize; 4]> {
        let mut out = Vec::new();
        for e in self.graph.edge_references() {
            let (nj, nk) = (e.source(), e.target());
            for ni in self.graph.neighbors(nj) {
                if ni == nk {
                    continue;
                }
                for nl in self.graph.neighbors(nk) {
                    if nl == nj || nl == ni {
                        continue;
                    }
                    out.push([self.graph[ni], self.graph[nj], self.graph[nk], self.graph[nl]]);
                }
            }
        }
        out
    }

    fn node(&self, particle: usize) -> Result<NodeIndex> {
        self.nodes.get(&particle).copied().ok_or_else(|| {
            SimError::malformed(format!("particle {particle} is not part of this topology"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> TopologyGraph {
        let particles: Vec<usize> = (0..n).collect();
        let edges: Vec<(usize, usize)> = (1..n).map(|i| (i - 1, i)).collect();
        TopologyGraph::from_parts(&particles, &edges).unwrap()
    }

    #[test]
    fn test_edge_validation() {
        let mut g = chain(3);
        assert!(g.add_edge(0, 0).is_err());
        assert!(g.add_edge(1, 0).is_err());
        assert!(g.add_edge(0, 7).is_err());
        assert!(g.remove_edge(0, 2).is_err());
        assert!(g.add_vertex(1).is_err());
    }

    #[test]
    fn test_remove_edge_splits_components() {
        let mut g = chain(4);
        g.remove_edge(1, 2).unwrap();
        assert_eq!(g.connected_components(), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_remove_vertex_keeps_lookup_consistent() {
        let mut g = chain(4);
        g.remove_vertex(0).unwrap();
        // vertex 3 was moved into slot 0 and must still be addressable
        assert!(g.has_edge(2, 3));
        g.remove_edge(2, 3).unwrap();
        assert_eq!(g.n_vertices(), 3);
        let mut comps = g.connected_components();
        comps.sort();
        assert_eq!(comps, vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_merge_and_relabel() {
        let mut g = chain(2);
        let other = TopologyGraph::from_parts(&[10, 11], &[(10, 11)]).unwrap();
        g.merge(other).unwrap();
        g.add_edge(1, 10).unwrap();
        assert!(g.is_connected());

        g.relabel(|p| Some(p + 100)).unwrap();
        assert!(g.has_edge(101, 110));
        assert!(g.relabel(|p| if p == 100 { None } else { Some(p) }).is_err());
    }

    #[test]
    fn test_angles_and_dihedrals_of_chain() {
        let g = chain(4);
        let mut angles = g.angles();
        angles.sort();
        assert_eq!(angles, vec![[0, 1, 2], [1, 2, 3]]);
        let dihedrals = g.dihedrals();
        assert_eq!(dihedrals.len(), 1);
        let d = dihedrals[0];
        assert!(d == [0, 1, 2, 3] || d == [3, 2, 1, 0]);
    }

    #[test]
    fn test_replace_particle_keeps_edges() {
        let mut g = chain(3);
        g.replace_particle(1, 42).unwrap();
        assert!(g.has_edge(0, 42));
        assert!(g.has_edge(42, 2));
        assert!(!g.contains(1));
    }

    #[test]
    fn test_induced_subgraph() {
        let g = chain(4);
        let sub = g.induced(&[2, 1]).unwrap();
        assert_eq!(sub.particles(), vec![2, 1]);
        assert_eq!(sub.n_edges(), 1);
    }
}
