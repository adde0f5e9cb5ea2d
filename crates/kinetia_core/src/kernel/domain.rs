//! Spatial decomposition backend.
//!
//! The box is cut into equal slabs along x. Each rank owns the particles inside its
//! slab and sees, as ghosts, every other particle within the pair cutoff of the
//! slab (through the periodic boundary if x is periodic). Ranks build their own
//! neighbor index and evaluate pair forces for owned particles only; the
//! synchronization step writes the owned results back into one force buffer.
//! Bonded terms, integration and bond breaking reuse the shared-memory passes, and
//! reactions are serialized on the coordinating thread.

use super::{build_pool, Backend, Kernel, KernelCore};
use crate::breaking::BreakConfig;
use crate::context::Context;
use crate::error::{Result, SimError};
use crate::execution::Execution;
use crate::forces;
use crate::geometry::BoxGeometry;
use crate::neighbor_list::{NeighborList, NeighborListOp};
use crate::reactions::{ReactionReport, SchedulerPolicy};
use crate::state::StateModel;
use crate::store::ParticleStore;
use kinetia_data::Vec3;
use rayon::ThreadPool;

/// Particles one rank works on.
#[derive(Debug, Clone, Default)]
pub struct Rank {
    /// Store indices of the particles inside the slab.
    pub owned: Vec<usize>,
    /// Owned and ghost particles with their positions.
    pub points: Vec<(usize, Vec3)>,
}

impl Rank {
    pub fn n_ghosts(&self) -> usize {
        self.points.len() - self.owned.len()
    }
}

/// Distance along x from `x` to the slab `[lo, hi)`, over periodic images if any.
fn slab_gap(x: f64, lo: f64, hi: f64, edge: f64, periodic: bool) -> f64 {
    let gap = |x: f64| (lo - x).max(x - hi).max(0.0);
    if periodic {
        gap(x).min(gap(x - edge)).min(gap(x + edge))
    } else {
        gap(x)
    }
}

/// Splits the active particles of `store` into `domains` slabs with a ghost halo of
/// width `halo`.
pub fn decompose(geometry: &BoxGeometry, store: &ParticleStore, domains: usize, halo: f64) -> Vec<Rank> {
    let domains = domains.max(1);
    let edge = geometry.size().x;
    let lower = geometry.lower().x;
    let periodic = geometry.periodic()[0];
    let width = edge / domains as f64;

    let mut ranks = vec![Rank::default(); domains];
    for (index, entry) in store.iter_active() {
        let x = entry.pos.x;
        let owner = (((x - lower) / width).floor().max(0.0) as usize).min(domains - 1);
        ranks[owner].owned.push(index);
        ranks[owner].points.push((index, entry.pos));
        for (r, rank) in ranks.iter_mut().enumerate() {
            if r == owner {
                continue;
            }
            let lo = lower + r as f64 * width;
            if slab_gap(x, lo, lo + width, edge, periodic) <= halo {
                rank.points.push((index, entry.pos));
            }
        }
    }
    ranks
}

/// Pair forces of the owned particles of one rank, from a rank-local index.
fn rank_forces(ctx: &Context, store: &ParticleStore, rank: &Rank, cutoff: f64) -> Vec<(usize, Vec3, f64)> {
    let mut local = NeighborList::new();
    local.rebuild_from(&ctx.geometry, cutoff, &rank.points, Execution::Serial);
    rank.owned
        .iter()
        .map(|&i| {
            let (f, e) = forces::gather_pair_from(ctx, store, &local, i);
            (i, f, e)
        })
        .collect()
}

pub struct DomainKernel {
    core: KernelCore,
    pool: ThreadPool,
    domains: usize,
}

impl DomainKernel {
    pub fn new(ctx: Context, state: StateModel, seed: u64, threads: Option<usize>, domains: usize) -> Result<Self> {
        Self::from_core(KernelCore::new(ctx, state, seed)?, threads, domains)
    }

    pub(crate) fn from_core(core: KernelCore, threads: Option<usize>, domains: usize) -> Result<Self> {
        if domains == 0 {
            return Err(SimError::config("domain backend needs at least one domain"));
        }
        Ok(Self {
            core,
            pool: build_pool(threads)?,
            domains,
        })
    }

    pub fn domains(&self) -> usize {
        self.domains
    }

    fn decomposed_forces(&mut self) -> Result<f64> {
        let exec = Execution::Parallel(&self.pool);
        let ctx = &self.core.ctx;
        let store = self.core.state.store();
        let (mut forces, mut energy) = forces::external_forces(ctx, store);

        let cutoff = ctx.potentials.max_cutoff();
        if ctx.potentials.has_pair_potentials() && cutoff > 0.0 {
            let ranks = decompose(&ctx.geometry, store, self.domains, cutoff);
            tracing::trace!(
                ranks = ranks.len(),
                ghosts = ranks.iter().map(Rank::n_ghosts).sum::<usize>(),
                "Domain decomposition"
            );
            let results = exec.map_slice(&ranks, |rank| rank_forces(ctx, store, rank, cutoff));
            // synchronization: every active particle has exactly one owner
            for (i, f, e) in results.into_iter().flatten() {
                forces[i] += f;
                energy += e;
            }
        }
        forces::commit_with_bonded(&self.core.ctx, &mut self.core.state, exec, forces, energy)
    }
}

impl Kernel for DomainKernel {
    fn backend(&self) -> Backend {
        Backend::Domain
    }

    fn context(&self) -> &Context {
        &self.core.ctx
    }

    fn state(&self) -> &StateModel {
        &self.core.state
    }

    fn state_mut(&mut self) -> &mut StateModel {
        &mut self.core.state
    }

    /// Keeps the global list current; reactions run against it on the coordinator.
    fn update_neighbor_list(&mut self, op: NeighborListOp) {
        self.core.update_neighbor_list(op, Execution::Parallel(&self.pool))
    }

    fn calculate_forces(&mut self) -> Result<f64> {
        self.decomposed_forces()
    }

    fn euler_bd_integrator(&mut self, dt: f64) -> Result<()> {
        self.core.euler_bd_integrator(dt, Execution::Parallel(&self.pool))
    }

    fn react(&mut self, policy: SchedulerPolicy, dt: f64) -> Result<ReactionReport> {
        self.core.react(policy, dt, Execution::Serial)
    }

    fn break_bonds(&mut self, dt: f64, config: &BreakConfig) -> Result<usize> {
        self.core.break_bonds(dt, config, Execution::Parallel(&self.pool))
    }
}
