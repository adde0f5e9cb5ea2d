//! # Kinetia Data
//!
//! Plain, serializable data types shared by every crate of the workspace:
//! vectors, particles, potential parameters and reaction descriptors.
//!
//! Behaviour lives in `kinetia_core`; this crate only describes state.

pub mod data;

pub use data::particle::{Particle, ParticleId, ParticleTypeId, Placement, TopologyTypeId};
pub use data::potential::{
    AngleConfig, BondConfig, BondKind, BoxPotential, DihedralConfig, HarmonicRepulsion,
    LennardJones,
};
pub use data::reaction::{Reaction, ReactionId, ReactionKind};
pub use data::vector::Vec3;
