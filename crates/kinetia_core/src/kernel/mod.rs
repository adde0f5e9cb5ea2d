//! Kernel execution contract and its backends.
//!
//! A kernel owns one [`Context`] and one [`StateModel`] and exposes the per-step
//! actions. Backends differ only in how an action spreads its work; every action
//! that draws random numbers keys its streams by particle or topology id, so the
//! backends produce the same trajectory for the same seed.

pub mod cpu;
pub mod domain;
pub mod single_cpu;

pub use cpu::CpuKernel;
pub use domain::DomainKernel;
pub use single_cpu::SingleCpuKernel;

use crate::breaking::{self, BreakConfig};
use crate::context::Context;
use crate::error::{Result, SimError};
use crate::execution::Execution;
use crate::forces;
use crate::integrator;
use crate::neighbor_list::NeighborListOp;
use crate::reactions::{gillespie, uncontrolled, DetailedBalance, ReactionReport, SchedulerPolicy};
use crate::state::StateModel;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Serial reference implementation.
    #[default]
    SingleCpu,
    /// Rayon thread pool.
    Cpu,
    /// Slab decomposition along x with ghost particles.
    Domain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelOptions {
    /// Worker threads; `None` lets rayon pick.
    pub threads: Option<usize>,
    /// Number of slabs for [`Backend::Domain`].
    pub domains: usize,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            threads: None,
            domains: 4,
        }
    }
}

/// The action set every backend implements.
pub trait Kernel: Send {
    fn backend(&self) -> Backend;

    fn context(&self) -> &Context;

    fn state(&self) -> &StateModel;

    fn state_mut(&mut self) -> &mut StateModel;

    /// `Init` always rebuilds; `Update` only when the store changed since the last build.
    fn update_neighbor_list(&mut self, op: NeighborListOp);

    /// Evaluates forces and energy. Returns the total potential energy.
    fn calculate_forces(&mut self) -> Result<f64>;

    fn euler_bd_integrator(&mut self, dt: f64) -> Result<()>;

    fn react(&mut self, policy: SchedulerPolicy, dt: f64) -> Result<ReactionReport>;

    /// Returns the number of removed bonds.
    fn break_bonds(&mut self, dt: f64, config: &BreakConfig) -> Result<usize>;
}

/// Builds the kernel selected by `backend` around an initial state.
pub fn create_kernel(
    backend: Backend,
    ctx: Context,
    state: StateModel,
    seed: u64,
    options: &KernelOptions,
) -> Result<Box<dyn Kernel>> {
    let core = KernelCore::new(ctx, state, seed)?;
    tracing::info!(?backend, seed, threads = ?options.threads, "Creating kernel");
    Ok(match backend {
        Backend::SingleCpu => Box::new(SingleCpuKernel::from_core(core)),
        Backend::Cpu => Box::new(CpuKernel::from_core(core, options.threads)?),
        Backend::Domain => Box::new(DomainKernel::from_core(core, options.threads, options.domains)?),
    })
}

pub(crate) fn build_pool(threads: Option<usize>) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.unwrap_or(0))
        .build()
        .map_err(|e| SimError::config(format!("thread pool: {e}")))
}

fn check_timestep(dt: f64) -> Result<()> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        Err(SimError::config(format!("time step must be positive, got {dt}")))
    }
}

/// State shared by all backends. Each action takes the backend's [`Execution`].
pub(crate) struct KernelCore {
    pub(crate) ctx: Context,
    pub(crate) state: StateModel,
    rng: ChaCha8Rng,
    balance: DetailedBalance,
}

impl KernelCore {
    pub(crate) fn new(ctx: Context, state: StateModel, seed: u64) -> Result<Self> {
        ctx.validate()?;
        state.check_consistency()?;
        // reversible pairs are rejected up front, whichever scheduler runs later
        let balance = DetailedBalance::new(&ctx).map_err(|e| e.with_context("reversible reactions"))?;
        Ok(Self {
            ctx,
            state,
            rng: ChaCha8Rng::seed_from_u64(seed),
            balance,
        })
    }

    pub(crate) fn update_neighbor_list(&mut self, op: NeighborListOp, exec: Execution<'_>) {
        let (store, list) = self.state.store_and_neighbor_list();
        if op == NeighborListOp::Update && !list.is_dirty(store) {
            return;
        }
        list.rebuild(store, &self.ctx.geometry, self.ctx.cutoff(), exec);
        tracing::trace!(pairs = list.pairs().len(), "Neighbor list rebuilt");
    }

    pub(crate) fn calculate_forces(&mut self, exec: Execution<'_>) -> Result<f64> {
        self.update_neighbor_list(NeighborListOp::Update, exec);
        forces::calculate_forces(&self.ctx, &mut self.state, exec)
    }

    pub(crate) fn euler_bd_integrator(&mut self, dt: f64, exec: Execution<'_>) -> Result<()> {
        check_timestep(dt)?;
        let master = self.rng.gen::<u64>();
        integrator::euler_bd(&self.ctx, &mut self.state, dt, master, exec);
        Ok(())
    }

    pub(crate) fn react(
        &mut self,
        policy: SchedulerPolicy,
        dt: f64,
        exec: Execution<'_>,
    ) -> Result<ReactionReport> {
        check_timestep(dt)?;
        if self.ctx.reactions.is_empty() {
            return Ok(ReactionReport::default());
        }
        self.update_neighbor_list(NeighborListOp::Update, exec);
        let report = match policy {
            SchedulerPolicy::UncontrolledApproximation => {
                uncontrolled::react(&self.ctx, &mut self.state, dt, &mut self.rng)?
            }
            SchedulerPolicy::Gillespie => gillespie::react(&self.ctx, &mut self.state, dt, &mut self.rng)?,
            SchedulerPolicy::DetailedBalance => {
                self.balance.react(&self.ctx, &mut self.state, dt, &mut self.rng)?
            }
        };
        if report.changed() {
            self.state.neighbor_list_mut().invalidate();
        }
        Ok(report)
    }

    pub(crate) fn break_bonds(&mut self, dt: f64, config: &BreakConfig, exec: Execution<'_>) -> Result<usize> {
        check_timestep(dt)?;
        let master = self.rng.gen::<u64>();
        let removed = breaking::break_bonds(&self.ctx, &mut self.state, dt, config, master, exec)?;
        Ok(removed)
    }
}
