use anyhow::Context as _;
use kinetia_core::config::SimConfig;
use kinetia_core::kernel::Backend;
use kinetia_core::observables::ObservableRecord;
use kinetia_core::reactions::SchedulerPolicy;
use kinetia_core::simulation::Simulation;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub steps: Option<u64>,
    pub seed: Option<u64>,
    pub backend: Option<Backend>,
    pub scheduler: Option<SchedulerPolicy>,
    pub threads: Option<usize>,
}

impl RunOverrides {
    pub fn apply(&self, config: &mut SimConfig) {
        if let Some(steps) = self.steps {
            config.world.steps = steps;
        }
        if let Some(seed) = self.seed {
            config.world.seed = Some(seed);
        }
        if let Some(backend) = self.backend {
            config.kernel.backend = backend;
        }
        if let Some(scheduler) = self.scheduler {
            config.kernel.scheduler = scheduler;
        }
        if self.threads.is_some() {
            config.kernel.threads = self.threads;
        }
    }
}

/// Closing line of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub fingerprint: String,
    pub seed: u64,
    pub steps: u64,
    pub records: usize,
    pub particles: usize,
    pub reactions: u64,
    pub broken_bonds: u64,
}

pub fn load_config(path: &Path) -> anyhow::Result<SimConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    SimConfig::from_toml(&content).with_context(|| format!("Invalid config {}", path.display()))
}

fn write_record<W: Write>(out: &mut W, record: &ObservableRecord) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    writeln!(out)?;
    Ok(())
}

/// Runs `config.world.steps` steps, writing one JSON line per observable record.
pub fn run<W: Write>(config: &SimConfig, out: &mut W) -> anyhow::Result<RunSummary> {
    let (mut sim, seed) = Simulation::from_config(config)?;
    let mut records = 0;
    let mut write_error = None;
    sim.run(config.world.steps, |record| {
        if write_error.is_some() {
            return;
        }
        match write_record(&mut *out, &record) {
            Ok(()) => records += 1,
            Err(e) => write_error = Some(e),
        }
    })?;
    if let Some(e) = write_error {
        return Err(e.context("Failed to write observable record"));
    }
    out.flush()?;

    let metrics = sim.metrics();
    Ok(RunSummary {
        fingerprint: config.fingerprint(),
        seed,
        steps: sim.current_step(),
        records,
        particles: sim.kernel().state().store().n_active(),
        reactions: metrics.reaction_events(),
        broken_bonds: metrics.broken_bonds(),
    })
}
