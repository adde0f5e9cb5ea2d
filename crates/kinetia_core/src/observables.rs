//! Sampled quantities of a running system.

use crate::context::Context;
use crate::error::{Result, SimError};
use crate::execution::Execution;
use crate::state::StateModel;
use kinetia_data::ParticleTypeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Histogram of pair distances between two type sets, normalized to a radial
/// distribution function.
#[derive(Debug, Clone)]
pub struct RadialDistribution {
    bin_borders: Vec<f64>,
    from: Vec<ParticleTypeId>,
    to: Vec<ParticleTypeId>,
    particle_to_density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RdfRecord {
    pub bin_centers: Vec<f64>,
    pub values: Vec<f64>,
}

impl RadialDistribution {
    /// `particle_to_density` converts a particle count into the number density of
    /// the `to` set, usually `1 / volume`.
    pub fn new(
        bin_borders: Vec<f64>,
        from: Vec<ParticleTypeId>,
        to: Vec<ParticleTypeId>,
        particle_to_density: f64,
    ) -> Result<Self> {
        if bin_borders.len() < 2 {
            return Err(SimError::config("radial distribution needs at least two bin borders"));
        }
        if bin_borders.windows(2).any(|w| !(w[1] > w[0])) || bin_borders[0] < 0.0 {
            return Err(SimError::config("bin borders must be non-negative and increasing"));
        }
        if !(particle_to_density.is_finite() && particle_to_density > 0.0) {
            return Err(SimError::config(format!(
                "particle to density factor must be positive, got {particle_to_density}"
            )));
        }
        Ok(Self {
            bin_borders,
            from,
            to,
            particle_to_density,
        })
    }

    pub fn bin_borders(&self) -> &[f64] {
        &self.bin_borders
    }

    pub fn bin_centers(&self) -> Vec<f64> {
        self.bin_borders.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Raw pair counts per bin. Every `from` particle is histogrammed against every
    /// other `to` particle under the minimum image convention.
    pub fn counts(&self, ctx: &Context, state: &StateModel, exec: Execution<'_>) -> Vec<u64> {
        let store = state.store();
        let pick = |types: &[ParticleTypeId]| -> Vec<(usize, kinetia_data::Vec3)> {
            store
                .iter_active()
                .filter(|(_, e)| types.contains(&e.type_id))
                .map(|(i, e)| (i, e.pos))
                .collect()
        };
        let from = pick(&self.from);
        let to = pick(&self.to);
        let n_bins = self.bin_borders.len() - 1;
        let (lo, hi) = (self.bin_borders[0], self.bin_borders[n_bins]);

        let partial = exec.map_slice(&from, |&(i, pi)| {
            let mut hist = vec![0u64; n_bins];
            for &(j, pj) in &to {
                if i == j {
                    continue;
                }
                let r = ctx.shortest_difference(&pi, &pj).norm();
                if r < lo || r >= hi {
                    continue;
                }
                // first border strictly greater than r closes the bin
                let bin = self.bin_borders.partition_point(|&b| b <= r) - 1;
                hist[bin] += 1;
            }
            hist
        });
        partial.into_iter().fold(vec![0u64; n_bins], |mut acc, hist| {
            for (a, h) in acc.iter_mut().zip(hist) {
                *a += h;
            }
            acc
        })
    }

    /// Counts divided by shell volume, `from` particle count and density.
    pub fn evaluate(&self, ctx: &Context, state: &StateModel, exec: Execution<'_>) -> RdfRecord {
        let counts = self.counts(ctx, state, exec);
        let n_from = state
            .store()
            .iter_active()
            .filter(|(_, e)| self.from.contains(&e.type_id))
            .count();
        let values = if n_from == 0 {
            vec![0.0; counts.len()]
        } else {
            counts
                .iter()
                .zip(self.bin_borders.windows(2))
                .map(|(&c, w)| {
                    let shell = 4.0 / 3.0 * PI * (w[1].powi(3) - w[0].powi(3));
                    c as f64 / (shell * n_from as f64 * self.particle_to_density)
                })
                .collect()
        };
        RdfRecord {
            bin_centers: self.bin_centers(),
            values,
        }
    }
}

/// One sample of the observed quantities, serialized as a JSON line by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableRecord {
    pub step: u64,
    pub time: f64,
    pub particle_counts: BTreeMap<String, usize>,
    /// Firings per reaction since the previous record.
    pub reaction_counts: BTreeMap<String, u64>,
    pub energy: f64,
    pub n_topologies: usize,
    pub topology_sizes: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdf: Option<RdfRecord>,
}

impl ObservableRecord {
    pub fn sample(
        ctx: &Context,
        state: &StateModel,
        step: u64,
        time: f64,
        rdf: Option<&RadialDistribution>,
        exec: Execution<'_>,
    ) -> Self {
        let counts = state.count_by_type(ctx.particle_types.len());
        let particle_counts = ctx
            .particle_types
            .iter()
            .zip(counts)
            .map(|(t, n)| (t.name.clone(), n))
            .collect();
        let reaction_counts = ctx
            .reactions
            .iter()
            .map(|r| (r.name.clone(), state.reaction_counts().get(r.id).copied().unwrap_or(0)))
            .collect();
        let mut topology_sizes: Vec<usize> = state.topologies().map(|(_, t)| t.len()).collect();
        topology_sizes.sort_unstable_by(|a, b| b.cmp(a));
        Self {
            step,
            time,
            particle_counts,
            reaction_counts,
            energy: state.energy(),
            n_topologies: topology_sizes.len(),
            topology_sizes,
            rdf: rdf.map(|r| r.evaluate(ctx, state, exec)),
        }
    }
}
