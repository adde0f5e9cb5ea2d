//! Mutable simulation state shared by every kernel action.
//!
//! The state model owns the particle store, the topology arena and the neighbor
//! list, and keeps particle membership (`Entry::topology`) in sync with the
//! topology graphs through every mutation.

use crate::error::{Result, SimError};
use crate::neighbor_list::NeighborList;
use crate::store::{IndexRemap, ParticleStore};
use crate::topology::{Topology, TopologyGraph, TopologyId};
use kinetia_data::{Particle, ParticleTypeId, Placement, ReactionId, TopologyTypeId};

#[derive(Clone, Default)]
pub struct StateModel {
    store: ParticleStore,
    topologies: Vec<Option<Topology>>,
    free_topologies: Vec<usize>,
    neighbor_list: NeighborList,
    energy: f64,
    reaction_counts: Vec<u64>,
}

impl StateModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ParticleStore {
        &mut self.store
    }

    pub fn neighbor_list(&self) -> &NeighborList {
        &self.neighbor_list
    }

    pub fn neighbor_list_mut(&mut self) -> &mut NeighborList {
        &mut self.neighbor_list
    }

    /// Split borrow for rebuilding the neighbor list from the store.
    pub fn store_and_neighbor_list(&mut self) -> (&ParticleStore, &mut NeighborList) {
        (&self.store, &mut self.neighbor_list)
    }

    /// Total potential energy of the last force evaluation.
    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn set_energy(&mut self, energy: f64) {
        self.energy = energy;
    }

    pub fn reaction_counts(&self) -> &[u64] {
        &self.reaction_counts
    }

    pub fn record_reaction(&mut self, reaction: ReactionId) {
        if self.reaction_counts.len() <= reaction {
            self.reaction_counts.resize(reaction + 1, 0);
        }
        self.reaction_counts[reaction] += 1;
    }

    pub fn reset_reaction_counts(&mut self) {
        self.reaction_counts.iter_mut().for_each(|c| *c = 0);
    }

    pub fn add_particle(&mut self, placement: Placement) -> usize {
        self.store.insert(placement)
    }

    pub fn add_particles(&mut self, placements: &[Placement]) -> Vec<usize> {
        placements.iter().map(|p| self.store.insert(*p)).collect()
    }

    pub fn particles(&self) -> Vec<Particle> {
        self.store.particles()
    }

    pub fn count_by_type(&self, n_types: usize) -> Vec<usize> {
        let mut counts = vec![0; n_types];
        for (_, e) in self.store.iter_active() {
            if let Some(c) = counts.get_mut(e.type_id as usize) {
                *c += 1;
            }
        }
        counts
    }

    /// Inserts particles and links them into a new topology. `edges` use positions
    /// in `placements`. More than one particle requires a connected edge set.
    pub fn add_topology(
        &mut self,
        type_id: TopologyTypeId,
        placements: &[Placement],
        edges: &[(usize, usize)],
    ) -> Result<TopologyId> {
        if placements.is_empty() {
            return Err(SimError::malformed("a topology needs at least one particle"));
        }
        for &(a, b) in edges {
            if a >= placements.len() || b >= placements.len() {
                return Err(SimError::malformed(format!(
                    "edge {a}-{b} outside a topology of {} particles",
                    placements.len()
                )));
            }
        }
        // Validate on a scratch graph before touching the store.
        let local: Vec<usize> = (0..placements.len()).collect();
        let scratch = TopologyGraph::from_parts(&local, edges)?;
        if !scratch.is_connected() {
            return Err(SimError::malformed("topology edges do not connect all particles"));
        }

        let indices = self.add_particles(placements);
        let edges: Vec<(usize, usize)> = edges.iter().map(|&(a, b)| (indices[a], indices[b])).collect();
        let graph = TopologyGraph::from_parts(&indices, &edges)?;
        Ok(self.insert_topology(Topology::new(type_id, graph)))
    }

    pub fn topology(&self, id: TopologyId) -> Option<&Topology> {
        self.topologies.get(id.0).and_then(Option::as_ref)
    }

    fn topology_mut(&mut self, id: TopologyId) -> Result<&mut Topology> {
        self.topologies
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| SimError::malformed(format!("topology {id} does not exist")))
    }

    pub fn topologies(&self) -> impl Iterator<Item = (TopologyId, &Topology)> {
        self.topologies
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|t| (TopologyId(i), t)))
    }

    pub fn topology_ids(&self) -> Vec<TopologyId> {
        self.topologies().map(|(id, _)| id).collect()
    }

    pub fn n_topologies(&self) -> usize {
        self.topologies.len() - self.free_topologies.len()
    }

    pub fn topology_of(&self, index: usize) -> Option<TopologyId> {
        self.store.entry(index).ok().and_then(|e| e.topology)
    }

    fn insert_topology(&mut self, topology: Topology) -> TopologyId {
        let members = topology.particles();
        let id = match self.free_topologies.pop() {
            Some(slot) => {
                self.topologies[slot] = Some(topology);
                TopologyId(slot)
            }
            None => {
                self.topologies.push(Some(topology));
                TopologyId(self.topologies.len() - 1)
            }
        };
        self.assign_members(&members, Some(id));
        id
    }

    fn take_topology(&mut self, id: TopologyId) -> Result<Topology> {
        let topology = self
            .topologies
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or_else(|| SimError::malformed(format!("topology {id} does not exist")))?;
        self.free_topologies.push(id.0);
        Ok(topology)
    }

    fn assign_members(&mut self, members: &[usize], id: Option<TopologyId>) {
        let entries = self.store.entries_mut();
        for &p in members {
            if let Some(e) = entries.get_mut(p) {
                if !e.deactivated {
                    e.topology = id;
                }
            }
        }
    }

    /// Adds a bond between two particles, merging their topologies if needed.
    /// A free particle joins the topology of its partner.
    pub fn connect(&mut self, a: usize, b: usize) -> Result<TopologyId> {
        if a == b {
            return Err(SimError::malformed(format!("self edge on particle {a}")));
        }
        let ta = self.store.entry(a)?.topology;
        let tb = self.store.entry(b)?.topology;
        let target = match (ta, tb) {
            (Some(x), Some(y)) if x == y => x,
            (Some(x), Some(y)) => {
                self.merge_topologies(x, y)?;
                x
            }
            (Some(x), None) => {
                self.topology_mut(x)?.graph_mut().add_vertex(b)?;
                self.assign_members(&[b], Some(x));
                x
            }
            (None, Some(y)) => {
                self.topology_mut(y)?.graph_mut().add_vertex(a)?;
                self.assign_members(&[a], Some(y));
                y
            }
            (None, None) => {
                return Err(SimError::malformed(format!(
                    "neither particle {a} nor {b} belongs to a topology"
                )))
            }
        };
        self.topology_mut(target)?.graph_mut().add_edge(a, b)?;
        Ok(target)
    }

    /// Removes a bond and splits the topology if it fell apart.
    pub fn disconnect(&mut self, a: usize, b: usize) -> Result<Vec<TopologyId>> {
        let id = self
            .store
            .entry(a)?
            .topology
            .ok_or_else(|| SimError::malformed(format!("particle {a} is not in a topology")))?;
        self.topology_mut(id)?.graph_mut().remove_edge(a, b)?;
        self.reconcile_topology(id)
    }

    /// Removes several bonds of one topology, then splits it once.
    pub fn remove_edges(&mut self, id: TopologyId, edges: &[(usize, usize)]) -> Result<Vec<TopologyId>> {
        let graph = self.topology_mut(id)?.graph_mut();
        for &(a, b) in edges {
            graph.remove_edge(a, b)?;
        }
        self.reconcile_topology(id)
    }

    fn merge_topologies(&mut self, into: TopologyId, from: TopologyId) -> Result<()> {
        let absorbed = self.take_topology(from)?;
        let members = absorbed.particles();
        self.topology_mut(into)?.graph_mut().merge(absorbed.into_graph())?;
        self.assign_members(&members, Some(into));
        Ok(())
    }

    /// Recomputes connected components of a topology after edge or vertex removal.
    ///
    /// Each component with two or more particles becomes its own topology of the same
    /// type (the first keeps `id`); single particles are released as free particles.
    /// Returns the ids of the surviving topologies.
    pub fn reconcile_topology(&mut self, id: TopologyId) -> Result<Vec<TopologyId>> {
        let components = match self.topology(id) {
            Some(t) => t.graph().connected_components(),
            None => return Err(SimError::malformed(format!("topology {id} does not exist"))),
        };
        if components.len() == 1 && components[0].len() >= 2 {
            return Ok(vec![id]);
        }

        let topology = self.take_topology(id)?;
        let type_id = topology.type_id();
        let mut survivors = Vec::new();
        for component in components {
            if component.len() < 2 {
                self.assign_members(&component, None);
                continue;
            }
            let graph = topology.graph().induced(&component)?;
            survivors.push(self.insert_topology(Topology::new(type_id, graph)));
        }
        if survivors.len() > 1 || survivors.is_empty() {
            tracing::debug!(topology = %id, parts = survivors.len(), "Topology split");
        }
        Ok(survivors)
    }

    /// Deactivates a particle. Topology members leave their graph, which may split.
    pub fn remove_particle(&mut self, index: usize) -> Result<()> {
        match self.store.entry(index)?.topology {
            Some(id) => {
                self.topology_mut(id)?.graph_mut().remove_vertex(index)?;
                self.store.deactivate(index)?;
                self.reconcile_topology(id)?;
            }
            None => self.store.deactivate(index)?,
        }
        Ok(())
    }

    /// Hands the graph vertex of `old` (if any) over to `new`.
    pub fn transfer_membership(&mut self, old: usize, new: usize) -> Result<()> {
        if let Some(id) = self.store.entry(old)?.topology {
            self.store.entry(new)?;
            self.topology_mut(id)?.graph_mut().replace_particle(old, new)?;
            self.assign_members(&[new], Some(id));
            self.store.entry_at(old)?.topology = None;
        }
        Ok(())
    }

    /// Merges the vertex of `absorbed` into `keep`: `keep` inherits every bond of
    /// `absorbed`, whose vertex disappears. Topologies are merged first if needed.
    pub fn fuse_vertices(&mut self, keep: usize, absorbed: usize) -> Result<()> {
        let tk = self.store.entry(keep)?.topology;
        let ta = self.store.entry(absorbed)?.topology;
        let target = match (tk, ta) {
            (_, None) => return Ok(()),
            (None, Some(_)) => return self.transfer_membership(absorbed, keep),
            (Some(k), Some(a)) => {
                if k != a {
                    self.merge_topologies(k, a)?;
                }
                k
            }
        };
        let graph = self.topology_mut(target)?.graph_mut();
        for n in graph.neighbors(absorbed) {
            if n != keep && !graph.has_edge(keep, n) {
                graph.add_edge(keep, n)?;
            }
        }
        graph.remove_vertex(absorbed)?;
        self.store.entry_at(absorbed)?.topology = None;
        Ok(())
    }

    pub fn set_particle_type(&mut self, index: usize, type_id: ParticleTypeId) -> Result<()> {
        self.store.entry_at(index)?.type_id = type_id;
        Ok(())
    }

    /// Defragments the store and remaps every topology onto the new indices.
    pub fn compact(&mut self) -> Result<IndexRemap> {
        let remap = self.store.compact();
        for topology in self.topologies.iter_mut().flatten() {
            topology.graph_mut().relabel(|old| remap.get(old))?;
        }
        self.neighbor_list.invalidate();
        Ok(remap)
    }

    /// Cross-checks store membership against the topology graphs.
    pub fn check_consistency(&self) -> Result<()> {
        for (id, topology) in self.topologies() {
            if topology.len() < 2 {
                continue;
            }
            if !topology.graph().is_connected() {
                return Err(SimError::malformed(format!("topology {id} is disconnected")));
            }
            for p in topology.particles() {
                let entry = self.store.entry(p)?;
                if entry.topology != Some(id) {
                    return Err(SimError::malformed(format!(
                        "particle {p} is a vertex of {id} but records {:?}",
                        entry.topology
                    )));
                }
            }
        }
        for (i, e) in self.store.iter_active() {
            if let Some(id) = e.topology {
                if !self.topology(id).is_some_and(|t| t.contains(i)) {
                    return Err(SimError::malformed(format!(
                        "particle {i} points at {id} which does not contain it"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(state: &mut StateModel, n: usize) -> TopologyId {
        let placements: Vec<Placement> = (0..n)
            .map(|i| Placement::new(0, [i as f64, 0.0, 0.0]))
            .collect();
        let edges: Vec<(usize, usize)> = (1..n).map(|i| (i - 1, i)).collect();
        state.add_topology(0, &placements, &edges).unwrap()
    }

    #[test]
    fn test_add_topology_requires_connected_edges() {
        let mut state = StateModel::new();
        let p = [Placement::new(0, [0.0; 3]), Placement::new(0, [1.0, 0.0, 0.0])];
        assert!(state.add_topology(0, &p, &[]).is_err());
        assert!(state.add_topology(0, &p, &[(0, 2)]).is_err());
        assert_eq!(state.store().n_active(), 0);
        let id = state.add_topology(0, &p, &[(0, 1)]).unwrap();
        assert_eq!(state.topology(id).unwrap().len(), 2);
        state.check_consistency().unwrap();
    }

    #[test]
    fn test_disconnect_splits_and_frees_singletons() {
        let mut state = StateModel::new();
        let id = chain(&mut state, 3);
        let members = state.topology(id).unwrap().particles();

        let survivors = state.disconnect(members[1], members[2]).unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(state.n_topologies(), 1);
        assert_eq!(state.topology_of(members[2]), None);
        state.check_consistency().unwrap();

        let survivors = state.disconnect(members[0], members[1]).unwrap();
        assert!(survivors.is_empty());
        assert_eq!(state.n_topologies(), 0);
        state.check_consistency().unwrap();
    }

    #[test]
    fn test_remove_middle_particle_splits_chain() {
        let mut state = StateModel::new();
        let id = chain(&mut state, 5);
        let members = state.topology(id).unwrap().particles();
        state.remove_particle(members[2]).unwrap();
        assert_eq!(state.n_topologies(), 2);
        let mut sizes: Vec<usize> = state.topologies().map(|(_, t)| t.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![2, 2]);
        state.check_consistency().unwrap();
    }

    #[test]
    fn test_connect_merges_topologies_and_adopts_free_particles() {
        let mut state = StateModel::new();
        let a = chain(&mut state, 2);
        let b = chain(&mut state, 2);
        let free = state.add_particle(Placement::new(0, [9.0, 0.0, 0.0]));
        let pa = state.topology(a).unwrap().particles();
        let pb = state.topology(b).unwrap().particles();

        let merged = state.connect(pa[1], pb[0]).unwrap();
        assert_eq!(state.n_topologies(), 1);
        assert_eq!(state.topology(merged).unwrap().len(), 4);

        state.connect(free, pb[1]).unwrap();
        assert_eq!(state.topology(merged).unwrap().len(), 5);
        assert!(state.connect(pa[0], pa[1]).is_err());
        state.check_consistency().unwrap();
    }

    #[test]
    fn test_fuse_vertices_contracts_bonds() {
        let mut state = StateModel::new();
        let id = chain(&mut state, 4);
        let m = state.topology(id).unwrap().particles();
        // fuse the two middle particles: 0 - (1+2) - 3
        state.fuse_vertices(m[1], m[2]).unwrap();
        state.store_mut().deactivate(m[2]).unwrap();
        let topology = state.topology(id).unwrap();
        assert_eq!(topology.len(), 3);
        assert!(topology.graph().has_edge(m[1], m[3]));
        assert!(topology.graph().has_edge(m[0], m[1]));
        state.check_consistency().unwrap();
    }

    #[test]
    fn test_compact_remaps_topologies() {
        let mut state = StateModel::new();
        let loose = state.add_particle(Placement::new(1, [0.0; 3]));
        let id = chain(&mut state, 3);
        state.remove_particle(loose).unwrap();
        let remap = state.compact().unwrap();
        assert_eq!(remap.get(loose), None);
        let members = state.topology(id).unwrap().particles();
        assert_eq!(members, vec![0, 1, 2]);
        state.check_consistency().unwrap();
    }
}
