use super::{build_pool, Backend, Kernel, KernelCore};
use crate::breaking::BreakConfig;
use crate::context::Context;
use crate::error::Result;
use crate::execution::Execution;
use crate::neighbor_list::NeighborListOp;
use crate::reactions::{ReactionReport, SchedulerPolicy};
use crate::state::StateModel;
use rayon::ThreadPool;

/// Shared-memory backend on a dedicated rayon pool.
///
/// Neighbor cell assignment, per-particle force gathering, integration and the
/// per-topology passes (bonded terms, bond breaking) run on the pool. Reactions are
/// scheduled serially.
pub struct CpuKernel {
    core: KernelCore,
    pool: ThreadPool,
}

impl CpuKernel {
    pub fn new(ctx: Context, state: StateModel, seed: u64, threads: Option<usize>) -> Result<Self> {
        Self::from_core(KernelCore::new(ctx, state, seed)?, threads)
    }

    pub(crate) fn from_core(core: KernelCore, threads: Option<usize>) -> Result<Self> {
        Ok(Self {
            core,
            pool: build_pool(threads)?,
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Kernel for CpuKernel {
    fn backend(&self) -> Backend {
        Backend::Cpu
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

    fn update_neighbor_list(&mut self, op: NeighborListOp) {
        self.core.update_neighbor_list(op, Execution::Parallel(&self.pool))
    }

    fn calculate_forces(&mut self) -> Result<f64> {
        self.core.calculate_forces(Execution::Parallel(&self.pool))
    }

    fn euler_bd_integrator(&mut self, dt: f64) -> Result<()> {
        self.core.euler_bd_integrator(dt, Execution::Parallel(&self.pool))
    }

    fn react(&mut self, policy: SchedulerPolicy, dt: f64) -> Result<ReactionReport> {
        self.core.react(policy, dt, Execution::Parallel(&self.pool))
    }

    fn break_bonds(&mut self, dt: f64, config: &BreakConfig) -> Result<usize> {
        self.core.break_bonds(dt, config, Execution::Parallel(&self.pool))
    }
}
