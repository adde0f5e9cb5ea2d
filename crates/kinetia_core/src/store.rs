//! Dense particle storage with O(1) deactivation and slot reuse.

use crate::error::{Result, SimError};
use crate::topology::TopologyId;
use kinetia_data::{Particle, ParticleId, ParticleTypeId, Placement, Vec3};

/// One store slot. Deactivated slots keep their last state until reused.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: ParticleId,
    pub type_id: ParticleTypeId,
    pub pos: Vec3,
    pub force: Vec3,
    pub topology: Option<TopologyId>,
    pub deactivated: bool,
}

impl Entry {
    pub fn particle(&self) -> Particle {
        Particle {
            id: self.id,
            type_id: self.type_id,
            pos: self.pos,
        }
    }
}

/// Old index to new index mapping produced by [`ParticleStore::compact`].
#[derive(Debug, Clone, Default)]
pub struct IndexRemap {
    map: Vec<Option<usize>>,
}

impl IndexRemap {
    pub fn get(&self, old: usize) -> Option<usize> {
        self.map.get(old).copied().flatten()
    }

    pub fn is_identity(&self) -> bool {
        self.map
            .iter()
            .enumerate()
            .all(|(i, m)| m.map_or(true, |n| n == i))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParticleStore {
    entries: Vec<Entry>,
    blanks: Vec<usize>,
    next_id: u64,
    revision: u64,
}

impl ParticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a particle, reusing the most recently freed slot if there is one.
    pub fn insert(&mut self, placement: Placement) -> usize {
        let entry = Entry {
            id: ParticleId(self.next_id),
            type_id: placement.type_id,
            pos: placement.pos,
            force: Vec3::ZERO,
            topology: None,
            deactivated: false,
        };
        self.next_id += 1;
        self.revision += 1;
        match self.blanks.pop() {
            Some(index) => {
                self.entries[index] = entry;
                index
            }
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        }
    }

    pub fn deactivate(&mut self, index: usize) -> Result<()> {
        let entry = self.entry_at(index)?;
        entry.deactivated = true;
        entry.force = Vec3::ZERO;
        entry.topology = None;
        self.blanks.push(index);
        Ok(())
    }

    #[inline]
    pub fn is_active(&self, index: usize) -> bool {
        self.entries.get(index).is_some_and(|e| !e.deactivated)
    }

    pub fn entry(&self, index: usize) -> Result<&Entry> {
        match self.entries.get(index) {
            Some(e) if !e.deactivated => Ok(e),
            _ => Err(SimError::invalid_reference(index)),
        }
    }

    /// Mutable access to an active slot. Marks the store as modified.
    pub fn entry_at(&mut self, index: usize) -> Result<&mut Entry> {
        self.revision += 1;
        match self.entries.get_mut(index) {
            Some(e) if !e.deactivated => Ok(e),
            _ => Err(SimError::invalid_reference(index)),
        }
    }

    /// All slots, active or not, indexed by store index.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [Entry] {
        self.revision += 1;
        &mut self.entries
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (usize, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.deactivated)
    }

    pub fn for_each_active<F: FnMut(usize, &Entry)>(&self, mut f: F) {
        for (i, e) in self.iter_active() {
            f(i, e);
        }
    }

    pub fn active_indices(&self) -> Vec<usize> {
        self.iter_active().map(|(i, _)| i).collect()
    }

    pub fn n_active(&self) -> usize {
        self.entries.len() - self.blanks.len()
    }

    /// Number of slots, including deactivated ones.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn clear_forces(&mut self) {
        for e in &mut self.entries {
            e.force = Vec3::ZERO;
        }
    }

    /// Overwrites force accumulators slot by slot. Positions are untouched, so the
    /// revision does not change.
    pub fn store_forces(&mut self, forces: &[Vec3]) {
        for (entry, force) in self.entries.iter_mut().zip(forces) {
            entry.force = if entry.deactivated { Vec3::ZERO } else { *force };
        }
    }

    /// Monotone counter bumped by every mutation; used to detect stale neighbor lists.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn particles(&self) -> Vec<Particle> {
        self.iter_active().map(|(_, e)| e.particle()).collect()
    }

    pub fn index_of(&self, id: ParticleId) -> Option<usize> {
        self.iter_active().find(|(_, e)| e.id == id).map(|(i, _)| i)
    }

    /// Moves every active entry to the front, preserving relative order.
    ///
    /// Invalidates all store indices held elsewhere; callers must remap topologies
    /// and rebuild neighbor lists with the returned mapping.
    pub fn compact(&mut self) -> IndexRemap {
        let mut map = vec![None; self.entries.len()];
        let mut kept = Vec::with_capacity(self.n_active());
        for (old, entry) in self.entries.drain(..).enumerate() {
            if !entry.deactivated {
                map[old] = Some(kept.len());
                kept.push(entry);
            }
        }
        self.entries = kept;
        self.blanks.clear();
        self.revision += 1;
        IndexRemap { map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(t: ParticleTypeId, x: f64) -> Placement {
        Placement::new(t, [x, 0.0, 0.0])
    }

    #[test]
    fn test_insert_reuses_slots_but_not_ids() {
        let mut store = ParticleStore::new();
        let a = store.insert(placement(0, 0.0));
        let b = store.insert(placement(0, 1.0));
        let id_a = store.entry(a).unwrap().id;
        store.deactivate(a).unwrap();
        assert_eq!(store.n_active(), 1);

        let c = store.insert(placement(1, 2.0));
        assert_eq!(c, a);
        assert_ne!(store.entry(c).unwrap().id, id_a);
        assert_ne!(store.entry(c).unwrap().id, store.entry(b).unwrap().id);
    }

    #[test]
    fn test_inactive_access_is_an_error() {
        let mut store = ParticleStore::new();
        let a = store.insert(placement(0, 0.0));
        store.deactivate(a).unwrap();
        assert!(matches!(
            store.entry_at(a),
            Err(SimError::InvalidParticleReference { index }) if index == a
        ));
        assert!(store.entry(42).is_err());
        assert!(store.deactivate(a).is_err());
    }

    #[test]
    fn test_deactivation_clears_force() {
        let mut store = ParticleStore::new();
        let a = store.insert(placement(0, 0.0));
        store.entry_at(a).unwrap().force = Vec3::new(1.0, 2.0, 3.0);
        store.deactivate(a).unwrap();
        assert_eq!(store.entries()[a].force, Vec3::ZERO);
    }

    #[test]
    fn test_compact_remaps_in_order() {
        let mut store = ParticleStore::new();
        let idx: Vec<usize> = (0..5).map(|i| store.insert(placement(0, i as f64))).collect();
        store.deactivate(idx[1]).unwrap();
        store.deactivate(idx[3]).unwrap();

        let remap = store.compact();
        assert_eq!(remap.get(0), Some(0));
        assert_eq!(remap.get(1), None);
        assert_eq!(remap.get(2), Some(1));
        assert_eq!(remap.get(4), Some(2));
        assert_eq!(store.capacity(), 3);
        assert_eq!(store.entry(2).unwrap().pos.x, 4.0);
    }

    #[test]
    fn test_revision_tracks_mutation() {
        let mut store = ParticleStore::new();
        let r0 = store.revision();
        let a = store.insert(placement(0, 0.0));
        assert!(store.revision() > r0);
        let r1 = store.revision();
        let _ = store.entry(a).unwrap();
        assert_eq!(store.revision(), r1);
        store.entry_at(a).unwrap().pos.x = 3.0;
        assert!(store.revision() > r1);
    }
}
