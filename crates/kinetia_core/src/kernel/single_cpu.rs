use super::{Backend, Kernel, KernelCore};
use crate::breaking::BreakConfig;
use crate::context::Context;
use crate::error::Result;
use crate::execution::Execution;
use crate::neighbor_list::NeighborListOp;
use crate::reactions::{ReactionReport, SchedulerPolicy};
use crate::state::StateModel;

/// Serial reference backend.
pub struct SingleCpuKernel {
    core: KernelCore,
}

impl SingleCpuKernel {
    pub fn new(ctx: Context, state: StateModel, seed: u64) -> Result<Self> {
        Ok(Self::from_core(KernelCore::new(ctx, state, seed)?))
    }

    pub(crate) fn from_core(core: KernelCore) -> Self {
        Self { core }
    }
}

impl Kernel for SingleCpuKernel {
    fn backend(&self) -> Backend {
        Backend::SingleCpu
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
        self.core.update_neighbor_list(op, Execution::Serial)
    }

    fn calculate_forces(&mut self) -> Result<f64> {
        self.core.calculate_forces(Execution::Serial)
    }

    fn euler_bd_integrator(&mut self, dt: f64) -> Result<()> {
        self.core.euler_bd_integrator(dt, Execution::Serial)
    }

    fn react(&mut self, policy: SchedulerPolicy, dt: f64) -> Result<ReactionReport> {
        self.core.react(policy, dt, Execution::Serial)
    }

    fn break_bonds(&mut self, dt: f64, config: &BreakConfig) -> Result<usize> {
        self.core.break_bonds(dt, config, Execution::Serial)
    }
}
