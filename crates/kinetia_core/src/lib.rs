//! # Kinetia Core
//!
//! Particle-based reaction-diffusion engine: overdamped Brownian dynamics of point
//! particles in a (partially) periodic box, coupled to stochastic reactions and to
//! bonded topologies that split when their bonds break.
//!
//! ## Architecture
//!
//! - **State**: a slot-reusing [`store::ParticleStore`], a cell-list
//!   [`neighbor_list::NeighborList`] and the topology arena, bundled in
//!   [`state::StateModel`].
//! - **Kernels**: every per-step action behind the [`kernel::Kernel`] trait, with a
//!   serial reference, a rayon backend and a slab-decomposed backend.
//! - **Reactions**: three schedulers (uncontrolled approximation, Gillespie,
//!   detailed balance) over one registry of five reaction kinds.
//! - **Determinism**: one seeded `ChaCha8Rng` per kernel; parallel passes draw from
//!   streams keyed by particle or topology id.
//!
//! ## Example
//!
//! ```
//! use kinetia_core::context::Context;
//! use kinetia_core::geometry::BoxGeometry;
//! use kinetia_core::kernel::{create_kernel, Backend, KernelOptions};
//! use kinetia_core::neighbor_list::NeighborListOp;
//! use kinetia_core::reactions::SchedulerPolicy;
//! use kinetia_core::state::StateModel;
//! use kinetia_data::Placement;
//!
//! let mut ctx = Context::new(BoxGeometry::cube(10.0, true).unwrap(), 1.0).unwrap();
//! ctx.add_particle_type("A", 1.0).unwrap();
//! ctx.add_particle_type("B", 1.0).unwrap();
//! ctx.add_reaction("conv: A -> B", 1e9).unwrap();
//!
//! let mut state = StateModel::new();
//! state.add_particle(Placement::new(0, [0.0, 0.0, 0.0]));
//!
//! let mut kernel =
//!     create_kernel(Backend::SingleCpu, ctx, state, 42, &KernelOptions::default()).unwrap();
//! kernel.update_neighbor_list(NeighborListOp::Init);
//! kernel.react(SchedulerPolicy::Gillespie, 0.1).unwrap();
//! assert_eq!(kernel.state().count_by_type(2), vec![0, 1]);
//! ```

/// Force-driven bond breaking
pub mod breaking;
/// TOML run configuration
pub mod config;
/// Particle types, potentials, topology parameters and reactions of one system
pub mod context;
/// Error types
pub mod error;
/// Serial and pooled execution of independent work items
pub mod execution;
/// External, pair and bonded forces
pub mod forces;
/// Box geometry and minimum image convention
pub mod geometry;
/// Brownian dynamics integrator
pub mod integrator;
/// Kernel contract and backends
pub mod kernel;
/// Run statistics and logging setup
pub mod metrics;
/// Cell-list neighbor index
pub mod neighbor_list;
/// Sampled observables
pub mod observables;
/// Potentials and their registry
pub mod potentials;
/// Reaction registry, evaluators and schedulers
pub mod reactions;
/// Step loop driver
pub mod simulation;
/// Particle store plus topologies, energy and reaction counters
pub mod state;
/// Slot-reusing particle store
pub mod store;
/// Topology graphs and bonded parameter registry
pub mod topology;
