//! Run statistics and logging setup.
//!
//! Counters are atomics so observers may read them while a run is in progress.

use crate::reactions::ReactionReport;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Collector for per-step simulation statistics.
pub struct Metrics {
    step_count: AtomicU64,
    particle_count: AtomicU64,
    reaction_events: AtomicU64,
    broken_bonds: AtomicU64,
    pub counters: Mutex<HashMap<String, AtomicU64>>,
    log_every: u64,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Metrics {
    /// Creates a collector that logs a summary every `log_every` steps.
    #[must_use]
    pub fn new(log_every: u64) -> Self {
        Self {
            step_count: AtomicU64::new(0),
            particle_count: AtomicU64::new(0),
            reaction_events: AtomicU64::new(0),
            broken_bonds: AtomicU64::new(0),
            counters: Mutex::new(HashMap::new()),
            log_every: log_every.max(1),
            start_time: Instant::now(),
        }
    }

    /// Records a completed step with its duration.
    pub fn record_step(&self, duration: Duration, particles: usize, reactions: ReactionReport, broken: usize) {
        self.step_count.fetch_add(1, Ordering::Relaxed);
        self.particle_count.store(particles as u64, Ordering::Relaxed);
        self.reaction_events
            .fetch_add(reactions.accepted as u64, Ordering::Relaxed);
        self.broken_bonds.fetch_add(broken as u64, Ordering::Relaxed);

        let step = self.step_count.load(Ordering::Relaxed);
        if step.is_multiple_of(self.log_every) {
            tracing::info!(
                step = step,
                particles = particles,
                reactions = self.reaction_events(),
                broken_bonds = self.broken_bonds(),
                duration_us = duration.as_micros() as u64,
                "Simulation step"
            );
        }
    }

    /// Adds `amount` to a named counter, e.g. the firings of one reaction.
    pub fn add_to_counter(&self, name: &str, amount: u64) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(amount, Ordering::Relaxed);
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .get(name)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn particle_count(&self) -> u64 {
        self.particle_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn reaction_events(&self) -> u64 {
        self.reaction_events.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn broken_bonds(&self) -> u64 {
        self.broken_bonds.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` overrides `default_filter`.
/// Output goes to stderr so stdout stays free for records.
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new(10);
        assert_eq!(metrics.step_count(), 0);
        assert_eq!(metrics.counter("missing"), 0);
    }

    #[test]
    fn test_record_step() {
        let metrics = Metrics::new(2);
        let report = ReactionReport {
            proposed: 4,
            accepted: 3,
        };
        metrics.record_step(Duration::from_micros(50), 100, report, 1);
        metrics.record_step(Duration::from_micros(50), 98, report, 0);
        assert_eq!(metrics.step_count(), 2);
        assert_eq!(metrics.particle_count(), 98);
        assert_eq!(metrics.reaction_events(), 6);
        assert_eq!(metrics.broken_bonds(), 1);
    }

    #[test]
    fn test_named_counters_accumulate() {
        let metrics = Metrics::default();
        metrics.add_to_counter("bind", 2);
        metrics.add_to_counter("bind", 5);
        assert_eq!(metrics.counter("bind"), 7);
    }
}
