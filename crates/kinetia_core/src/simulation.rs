//! Step loop over a kernel: integrate, react, break bonds, evaluate forces, observe.

use crate::breaking::BreakConfig;
use crate::config::SimConfig;
use crate::error::Result;
use crate::execution::Execution;
use crate::kernel::{create_kernel, Kernel};
use crate::metrics::Metrics;
use crate::neighbor_list::NeighborListOp;
use crate::observables::{ObservableRecord, RadialDistribution};
use crate::reactions::{ReactionReport, SchedulerPolicy};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub reactions: ReactionReport,
    pub broken_bonds: usize,
    pub energy: f64,
}

pub struct Simulation {
    kernel: Box<dyn Kernel>,
    policy: SchedulerPolicy,
    breaking: BreakConfig,
    rdf: Option<RadialDistribution>,
    dt: f64,
    stride: u64,
    step: u64,
    initialized: bool,
    metrics: Metrics,
}

impl Simulation {
    pub fn new(kernel: Box<dyn Kernel>, policy: SchedulerPolicy, dt: f64) -> Self {
        Self {
            kernel,
            policy,
            breaking: BreakConfig::new(),
            rdf: None,
            dt,
            stride: 1,
            step: 0,
            initialized: false,
            metrics: Metrics::default(),
        }
    }

    /// Builds context, initial state and kernel from a validated configuration.
    /// Returns the simulation and the seed it was created with.
    pub fn from_config(config: &SimConfig) -> anyhow::Result<(Self, u64)> {
        config.validate()?;
        let seed = config.world.seed.unwrap_or_else(rand::random);
        tracing::info!(fingerprint = %config.fingerprint(), seed, "Loading configuration");

        let ctx = config.build_context()?;
        let breaking = config.break_config(&ctx)?;
        let rdf = config.radial_distribution(&ctx)?;
        let state = config.build_state(&ctx, seed)?;
        let kernel = create_kernel(config.backend(), ctx, state, seed, &config.kernel_options())?;

        let mut sim = Self::new(kernel, config.scheduler(), config.world.timestep)
            .with_breaking(breaking)
            .with_observables(config.observables.stride, rdf);
        sim.metrics = Metrics::new(config.observables.log_every);
        Ok((sim, seed))
    }

    #[must_use]
    pub fn with_breaking(mut self, breaking: BreakConfig) -> Self {
        self.breaking = breaking;
        self
    }

    #[must_use]
    pub fn with_observables(mut self, stride: u64, rdf: Option<RadialDistribution>) -> Self {
        self.stride = stride.max(1);
        self.rdf = rdf;
        self
    }

    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    pub fn kernel_mut(&mut self) -> &mut dyn Kernel {
        self.kernel.as_mut()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn time(&self) -> f64 {
        self.step as f64 * self.dt
    }

    /// Builds the neighbor list and the initial forces. Called by the first step.
    pub fn initialize(&mut self) -> Result<()> {
        self.kernel.update_neighbor_list(NeighborListOp::Init);
        self.kernel.calculate_forces()?;
        self.initialized = true;
        Ok(())
    }

    pub fn step(&mut self) -> Result<StepReport> {
        if !self.initialized {
            self.initialize()?;
        }
        let started = Instant::now();
        self.kernel.euler_bd_integrator(self.dt)?;
        self.kernel.update_neighbor_list(NeighborListOp::Update);
        let reactions = self.kernel.react(self.policy, self.dt)?;
        let broken_bonds = self.kernel.break_bonds(self.dt, &self.breaking)?;
        self.kernel.update_neighbor_list(NeighborListOp::Update);
        let energy = self.kernel.calculate_forces()?;
        self.step += 1;

        let particles = self.kernel.state().store().n_active();
        self.metrics
            .record_step(started.elapsed(), particles, reactions, broken_bonds);
        Ok(StepReport {
            reactions,
            broken_bonds,
            energy,
        })
    }

    /// Samples observables and clears the per-reaction counters.
    pub fn observe(&mut self) -> ObservableRecord {
        let record = ObservableRecord::sample(
            self.kernel.context(),
            self.kernel.state(),
            self.step,
            self.time(),
            self.rdf.as_ref(),
            Execution::Serial,
        );
        for (name, &n) in &record.reaction_counts {
            self.metrics.add_to_counter(name, n);
        }
        self.kernel.state_mut().reset_reaction_counts();
        record
    }

    /// Runs `steps` steps, handing a record to `sink` at the start and after every
    /// `stride` steps.
    pub fn run<F: FnMut(ObservableRecord)>(&mut self, steps: u64, mut sink: F) -> Result<()> {
        if !self.initialized {
            self.initialize()?;
        }
        sink(self.observe());
        for _ in 0..steps {
            self.step()?;
            if self.step.is_multiple_of(self.stride) {
                sink(self.observe());
            }
        }
        tracing::info!(
            steps = self.step,
            reactions = self.metrics.reaction_events(),
            broken_bonds = self.metrics.broken_bonds(),
            elapsed_ms = self.metrics.elapsed().as_millis() as u64,
            "Run finished"
        );
        Ok(())
    }
}
