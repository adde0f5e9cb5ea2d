//! Force-driven bond breaking.
//!
//! Each topology draws from its own random stream (derived from one master seed
//! and the topology id), so the decision pass can run topologies concurrently and
//! still give the same outcome as a serial run.

use crate::context::Context;
use crate::error::{Result, SimError};
use crate::execution::{derive_seed, Execution};
use crate::state::StateModel;
use crate::topology::{Topology, TopologyId};
use kinetia_data::ParticleTypeId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

type P = ParticleTypeId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakablePair {
    /// Minimum extension beyond the bond length before breaking is attempted.
    pub threshold: f64,
    pub rate: f64,
}

/// Breakable bonds keyed by the unordered particle type pair of their endpoints.
#[derive(Debug, Clone, Default)]
pub struct BreakConfig {
    pairs: HashMap<(P, P), BreakablePair>,
}

impl BreakConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, a: P, b: P, threshold: f64, rate: f64) -> Result<()> {
        if threshold.is_nan() || threshold < 0.0 {
            return Err(SimError::NegativeThreshold(threshold));
        }
        if rate.is_nan() || rate < 0.0 {
            return Err(SimError::NegativeRate {
                name: format!("break {a}-{b}"),
                rate,
            });
        }
        self.pairs.insert((a.min(b), a.max(b)), BreakablePair { threshold, rate });
        Ok(())
    }

    pub fn get(&self, a: P, b: P) -> Option<&BreakablePair> {
        self.pairs.get(&(a.min(b), a.max(b)))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn edges_to_break(
    ctx: &Context,
    state: &StateModel,
    id: TopologyId,
    topology: &Topology,
    dt: f64,
    config: &BreakConfig,
    master_seed: u64,
) -> Vec<(usize, usize)> {
    let store = state.store();
    let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(master_seed, id.0 as u64));
    let mut doomed = Vec::new();
    for (a, b, _) in topology.graph().edges() {
        let (Ok(ea), Ok(eb)) = (store.entry(a), store.entry(b)) else {
            continue;
        };
        let Some(rule) = config.get(ea.type_id, eb.type_id) else {
            continue;
        };
        let Some(bond) = ctx.topologies.bond(ea.type_id, eb.type_id) else {
            continue;
        };
        let extension = ctx.shortest_difference(&ea.pos, &eb.pos).norm() - bond.length;
        if extension > rule.threshold && rng.gen::<f64>() < 1.0 - (-rule.rate * dt).exp() {
            doomed.push((a, b));
        }
    }
    doomed
}

/// Removes overstretched bonds and splits the affected topologies. Returns the
/// number of removed bonds.
pub fn break_bonds(
    ctx: &Context,
    state: &mut StateModel,
    dt: f64,
    config: &BreakConfig,
    master_seed: u64,
    exec: Execution<'_>,
) -> Result<usize> {
    if config.is_empty() {
        return Ok(0);
    }
    let decisions: Vec<(TopologyId, Vec<(usize, usize)>)> = {
        let snapshot = &*state;
        let topologies: Vec<(TopologyId, &Topology)> = snapshot.topologies().collect();
        exec.map_slice(&topologies, |&(id, topology)| {
            (
                id,
                edges_to_break(ctx, snapshot, id, topology, dt, config, master_seed),
            )
        })
    };

    let mut removed = 0;
    for (id, edges) in decisions {
        if edges.is_empty() {
            continue;
        }
        removed += edges.len();
        let parts = state
            .remove_edges(id, &edges)
            .map_err(|e| e.with_context(format!("breaking bonds of topology {id}")))?;
        tracing::debug!(topology = %id, bonds = edges.len(), parts = parts.len(), "Bonds broken");
    }
    Ok(removed)
}
