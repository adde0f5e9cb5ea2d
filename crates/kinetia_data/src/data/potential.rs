use super::vector::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondKind {
    #[default]
    Harmonic,
}

/// Bond between two topology particles. Energy is `k * (r - length)^2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BondConfig {
    pub force_constant: f64,
    pub length: f64,
    #[serde(default)]
    pub kind: BondKind,
}

impl BondConfig {
    pub fn harmonic(force_constant: f64, length: f64) -> Self {
        Self {
            force_constant,
            length,
            kind: BondKind::Harmonic,
        }
    }
}

/// Harmonic angle over a path `i - j - k`. Energy is `k * (theta - theta_0)^2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleConfig {
    pub force_constant: f64,
    pub equilibrium_angle: f64,
}

/// Cosine dihedral over a path `i - j - k - l`. Energy is `k * (1 + cos(n * phi - phi_0))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DihedralConfig {
    pub force_constant: f64,
    pub multiplicity: u32,
    pub phi_0: f64,
}

/// Soft repulsion, active below `interaction_distance`: `0.5 * k * (r - d)^2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicRepulsion {
    pub force_constant: f64,
    pub interaction_distance: f64,
}

/// Truncated 12-6 Lennard-Jones interaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LennardJones {
    pub epsilon: f64,
    pub sigma: f64,
    pub cutoff: f64,
}

/// Harmonic confinement into the axis-aligned box `[origin, origin + extent]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxPotential {
    pub origin: Vec3,
    pub extent: Vec3,
    pub force_constant: f64,
}
