//! Order-1 (external) and order-2 (pair) potentials and their registry.

use crate::error::{Result, SimError};
use kinetia_data::{BoxPotential, HarmonicRepulsion, LennardJones, ParticleTypeId, Vec3};
use std::collections::HashMap;
use std::f64::consts::PI;

/// Pair potential between two particle types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairPotential {
    HarmonicRepulsion(HarmonicRepulsion),
    LennardJones(LennardJones),
}

impl PairPotential {
    pub fn cutoff(&self) -> f64 {
        match self {
            PairPotential::HarmonicRepulsion(p) => p.interaction_distance,
            PairPotential::LennardJones(p) => p.cutoff,
        }
    }

    pub fn energy(&self, distance_squared: f64) -> f64 {
        let cutoff = self.cutoff();
        if distance_squared >= cutoff * cutoff {
            return 0.0;
        }
        match self {
            PairPotential::HarmonicRepulsion(p) => {
                let r = distance_squared.sqrt();
                0.5 * p.force_constant * (r - p.interaction_distance).powi(2)
            }
            PairPotential::LennardJones(p) => {
                if distance_squared <= 0.0 {
                    return f64::INFINITY;
                }
                let s6 = (p.sigma * p.sigma / distance_squared).powi(3);
                4.0 * p.epsilon * (s6 * s6 - s6)
            }
        }
    }

    /// Force acting on the second particle for displacement `d = x_j - x_i`.
    /// The first particle receives the negation.
    pub fn force(&self, d: &Vec3) -> Vec3 {
        let r2 = d.norm_squared();
        let cutoff = self.cutoff();
        if r2 >= cutoff * cutoff || r2 <= 0.0 {
            return Vec3::ZERO;
        }
        let r = r2.sqrt();
        let magnitude = match self {
            PairPotential::HarmonicRepulsion(p) => p.force_constant * (p.interaction_distance - r),
            PairPotential::LennardJones(p) => {
                let s6 = (p.sigma * p.sigma / r2).powi(3);
                24.0 * p.epsilon * (2.0 * s6 * s6 - s6) / r
            }
        };
        *d * (magnitude / r)
    }
}

/// Potential acting on single particles of one type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExternalPotential {
    Box(BoxPotential),
}

impl ExternalPotential {
    pub fn energy(&self, pos: &Vec3) -> f64 {
        match self {
            ExternalPotential::Box(b) => {
                let mut e = 0.0;
                for axis in 0..3 {
                    let excess = box_excess(b, pos, axis);
                    e += 0.5 * b.force_constant * excess * excess;
                }
                e
            }
        }
    }

    pub fn force(&self, pos: &Vec3) -> Vec3 {
        match self {
            ExternalPotential::Box(b) => {
                let mut f = Vec3::ZERO;
                for axis in 0..3 {
                    f[axis] = -b.force_constant * box_excess(b, pos, axis);
                }
                f
            }
        }
    }
}

fn box_excess(b: &BoxPotential, pos: &Vec3, axis: usize) -> f64 {
    let lo = b.origin[axis];
    let hi = lo + b.extent[axis];
    if pos[axis] < lo {
        pos[axis] - lo
    } else if pos[axis] > hi {
        pos[axis] - hi
    } else {
        0.0
    }
}

fn pair_key(a: ParticleTypeId, b: ParticleTypeId) -> (ParticleTypeId, ParticleTypeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PotentialRegistry {
    order1: HashMap<ParticleTypeId, Vec<ExternalPotential>>,
    order2: HashMap<(ParticleTypeId, ParticleTypeId), Vec<PairPotential>>,
}

impl PotentialRegistry {
    pub fn add_external(&mut self, type_id: ParticleTypeId, potential: ExternalPotential) -> Result<()> {
        let ExternalPotential::Box(b) = &potential;
        if b.force_constant < 0.0 || (0..3).any(|a| b.extent[a] < 0.0) {
            return Err(SimError::config("box potential needs non-negative extent and force constant"));
        }
        self.order1.entry(type_id).or_default().push(potential);
        Ok(())
    }

    pub fn add_pair(&mut self, a: ParticleTypeId, b: ParticleTypeId, potential: PairPotential) -> Result<()> {
        if !(potential.cutoff().is_finite() && potential.cutoff() > 0.0) {
            return Err(SimError::config(format!(
                "pair potential cutoff must be positive, got {}",
                potential.cutoff()
            )));
        }
        self.order2.entry(pair_key(a, b)).or_default().push(potential);
        Ok(())
    }

    pub fn external_for(&self, type_id: ParticleTypeId) -> &[ExternalPotential] {
        self.order1.get(&type_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pair_for(&self, a: ParticleTypeId, b: ParticleTypeId) -> &[PairPotential] {
        self.order2.get(&pair_key(a, b)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn max_cutoff(&self) -> f64 {
        self.order2
            .values()
            .flatten()
            .map(PairPotential::cutoff)
            .fold(0.0, f64::max)
    }

    pub fn has_pair_potentials(&self) -> bool {
        !self.order2.is_empty()
    }

    pub fn pair_energy(&self, a: ParticleTypeId, b: ParticleTypeId, distance_squared: f64) -> f64 {
        self.pair_for(a, b)
            .iter()
            .map(|p| p.energy(distance_squared))
            .sum()
    }

    pub fn external_energy(&self, type_id: ParticleTypeId, pos: &Vec3) -> f64 {
        self.external_for(type_id).iter().map(|p| p.energy(pos)).sum()
    }
}

/// `∫_0^radius 4πr² exp(-U(r)/kT) dr` for the pair potentials between `a` and `b`,
/// by composite Simpson's rule.
pub fn effective_volume(
    registry: &PotentialRegistry,
    a: ParticleTypeId,
    b: ParticleTypeId,
    radius: f64,
    kbt: f64,
) -> f64 {
    const INTERVALS: usize = 10_000;
    if radius <= 0.0 {
        return 0.0;
    }
    let h = radius / INTERVALS as f64;
    let integrand = |r: f64| {
        let u = registry.pair_energy(a, b, r * r);
        4.0 * PI * r * r * (-u / kbt).exp()
    };
    let mut sum = integrand(0.0) + integrand(radius);
    for i in 1..INTERVALS {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * integrand(i as f64 * h);
    }
    sum * h / 3.0
}

pub fn sphere_volume(radius: f64) -> f64 {
    4.0 / 3.0 * PI * radius.powi(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repulsion(k: f64, d: f64) -> PairPotential {
        PairPotential::HarmonicRepulsion(HarmonicRepulsion {
            force_constant: k,
            interaction_distance: d,
        })
    }

    #[test]
    fn test_harmonic_repulsion_pushes_apart() {
        let p = repulsion(2.0, 3.0);
        let f = p.force(&Vec3::new(1.0, 0.0, 0.0));
        assert!((f.x - 4.0).abs() < 1e-12);
        assert_eq!(p.force(&Vec3::new(3.5, 0.0, 0.0)), Vec3::ZERO);
        assert!((p.energy(1.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_force_is_negative_energy_gradient() {
        let lj = PairPotential::LennardJones(LennardJones {
            epsilon: 1.0,
            sigma: 1.0,
            cutoff: 2.5,
        });
        for pot in [repulsion(5.0, 2.0), lj] {
            let r = 1.3;
            let h = 1e-6;
            let numeric = -(pot.energy((r + h) * (r + h)) - pot.energy((r - h) * (r - h))) / (2.0 * h);
            let analytic = pot.force(&Vec3::new(0.0, 0.0, r)).z;
            assert!((numeric - analytic).abs() < 1e-5, "{numeric} vs {analytic}");
        }
    }

    #[test]
    fn test_box_potential_confines() {
        let b = ExternalPotential::Box(BoxPotential {
            origin: Vec3::new(-1.0, -1.0, -1.0),
            extent: Vec3::new(2.0, 2.0, 2.0),
            force_constant: 3.0,
        });
        assert_eq!(b.force(&Vec3::ZERO), Vec3::ZERO);
        let f = b.force(&Vec3::new(2.0, 0.0, -1.5));
        assert!((f.x - -3.0).abs() < 1e-12);
        assert!((f.z - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_effective_volume_without_potential_is_sphere() {
        let registry = PotentialRegistry::default();
        let v = effective_volume(&registry, 0, 1, 5.0, 1.0);
        assert!((v - sphere_volume(5.0)).abs() < 1e-6);
    }

    #[test]
    fn test_pair_lookup_is_symmetric() {
        let mut registry = PotentialRegistry::default();
        registry.add_pair(2, 1, repulsion(1.0, 1.5)).unwrap();
        assert_eq!(registry.pair_for(1, 2).len(), 1);
        assert_eq!(registry.max_cutoff(), 1.5);
        assert!(registry.add_pair(0, 0, repulsion(1.0, 0.0)).is_err());
    }
}
