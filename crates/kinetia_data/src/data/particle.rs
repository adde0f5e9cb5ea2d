use super::vector::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index into the particle type registry.
pub type ParticleTypeId = u16;

/// Index into the topology type registry.
pub type TopologyTypeId = u16;

/// Lifetime-unique particle identity. Never reused, even when a store slot is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ParticleId(pub u64);

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Snapshot of one active particle as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: ParticleId,
    pub type_id: ParticleTypeId,
    pub pos: Vec3,
}

/// A particle that has not been inserted yet: type and position only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub type_id: ParticleTypeId,
    pub pos: Vec3,
}

impl Placement {
    pub fn new(type_id: ParticleTypeId, pos: impl Into<Vec3>) -> Self {
        Self {
            type_id,
            pos: pos.into(),
        }
    }
}

impl From<Particle> for Placement {
    fn from(p: Particle) -> Self {
        Self {
            type_id: p.type_id,
            pos: p.pos,
        }
    }
}
