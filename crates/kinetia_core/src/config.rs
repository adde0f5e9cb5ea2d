//! Run configuration loaded from TOML.
//!
//! Names (particle types, topology types) stay strings here and are resolved when
//! the [`Context`] is built, so a configuration can be validated and fingerprinted
//! without touching the registries.
//!
//! ## Example `kinetia.toml`
//!
//! ```toml
//! [world]
//! box_size = [20.0, 20.0, 20.0]
//! kbt = 1.0
//! timestep = 0.01
//! steps = 1000
//! seed = 42
//!
//! [kernel]
//! backend = "cpu"
//! scheduler = "gillespie"
//!
//! [[particle_types]]
//! name = "A"
//! diffusion_constant = 1.0
//!
//! [[particle_types]]
//! name = "B"
//! diffusion_constant = 0.5
//!
//! [[reactions]]
//! descriptor = "conv: A -> B"
//! rate = 0.1
//!
//! [[particles]]
//! particle_type = "A"
//! random_count = 100
//! ```

use crate::breaking::BreakConfig;
use crate::context::Context;
use crate::execution::derive_seed;
use crate::geometry::BoxGeometry;
use crate::kernel::{Backend, KernelOptions};
use crate::observables::RadialDistribution;
use crate::reactions::{DetailedBalance, SchedulerPolicy};
use crate::state::StateModel;
use anyhow::Context as _;
use kinetia_data::{Placement, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Stream key for random initial placements.
const PLACEMENT_STREAM: u64 = 0x706C_6163_65;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Box edge lengths; the box is centred at the origin.
    pub box_size: [f64; 3],
    pub periodic: [bool; 3],
    pub kbt: f64,
    pub timestep: f64,
    pub steps: u64,
    /// `None` draws a fresh seed per run.
    pub seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            box_size: [10.0, 10.0, 10.0],
            periodic: [true, true, true],
            kbt: 1.0,
            timestep: 0.01,
            steps: 100,
            seed: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub backend: Backend,
    pub threads: Option<usize>,
    pub domains: Option<usize>,
    pub scheduler: SchedulerPolicy,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParticleTypeConfig {
    pub name: String,
    pub diffusion_constant: f64,
    #[serde(default = "default_radius")]
    pub radius: f64,
}

fn default_radius() -> f64 {
    1.0
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PotentialConfig {
    HarmonicRepulsion {
        types: [String; 2],
        force_constant: f64,
        interaction_distance: f64,
    },
    LennardJones {
        types: [String; 2],
        epsilon: f64,
        sigma: f64,
        cutoff: f64,
    },
    Box {
        particle_type: String,
        origin: [f64; 3],
        extent: [f64; 3],
        force_constant: f64,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BondEntry {
    pub types: [String; 2],
    pub force_constant: f64,
    pub length: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AngleEntry {
    pub types: [String; 3],
    pub force_constant: f64,
    pub equilibrium_angle: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DihedralEntry {
    pub types: [String; 4],
    pub force_constant: f64,
    pub multiplicity: u32,
    pub phi_0: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct TopologyConfig {
    pub types: Vec<String>,
    pub bonds: Vec<BondEntry>,
    pub angles: Vec<AngleEntry>,
    pub dihedrals: Vec<DihedralEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReactionConfig {
    /// e.g. `"bind: A +(2) B -> C"`
    pub descriptor: String,
    pub rate: f64,
    #[serde(default)]
    pub weights: Option<[f64; 2]>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BreakableConfig {
    pub types: [String; 2],
    pub threshold: f64,
    pub rate: f64,
}

/// Free particles of one type, at explicit positions and/or uniformly at random.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParticlesConfig {
    pub particle_type: String,
    #[serde(default)]
    pub positions: Vec<[f64; 3]>,
    #[serde(default)]
    pub random_count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TopologyParticle {
    pub particle_type: String,
    pub position: [f64; 3],
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TopologyInstance {
    pub topology_type: String,
    pub particles: Vec<TopologyParticle>,
    /// Pairs of positions in `particles`.
    #[serde(default)]
    pub edges: Vec<[usize; 2]>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RdfConfig {
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub bin_borders: Vec<f64>,
    /// Defaults to `1 / box volume`.
    #[serde(default)]
    pub particle_to_density: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ObservablesConfig {
    /// Steps between two records.
    pub stride: u64,
    /// Steps between two summary log lines.
    pub log_every: u64,
    pub rdf: Option<RdfConfig>,
}

impl Default for ObservablesConfig {
    fn default() -> Self {
        Self {
            stride: 10,
            log_every: 1000,
            rdf: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub world: WorldConfig,
    pub kernel: KernelConfig,
    pub particle_types: Vec<ParticleTypeConfig>,
    pub potentials: Vec<PotentialConfig>,
    pub topology: TopologyConfig,
    pub reactions: Vec<ReactionConfig>,
    pub breakable: Vec<BreakableConfig>,
    pub particles: Vec<ParticlesConfig>,
    pub topologies: Vec<TopologyInstance>,
    pub observables: ObservablesConfig,
}

impl SimConfig {
    /// Validates value ranges. Name resolution happens in [`SimConfig::build_context`].
    pub fn validate(&self) -> anyhow::Result<()> {
        let world = &self.world;
        anyhow::ensure!(
            world.box_size.iter().all(|&e| e.is_finite() && e > 0.0),
            "Box edges must be positive"
        );
        anyhow::ensure!(world.kbt > 0.0, "kbt must be positive");
        anyhow::ensure!(world.timestep > 0.0, "Time step must be positive");
        anyhow::ensure!(self.kernel.threads != Some(0), "Thread count must be positive");
        anyhow::ensure!(self.kernel.domains != Some(0), "Domain count must be positive");

        anyhow::ensure!(!self.particle_types.is_empty(), "At least one particle type is required");
        for (i, t) in self.particle_types.iter().enumerate() {
            anyhow::ensure!(!t.name.is_empty(), "Particle type {i} has an empty name");
            anyhow::ensure!(
                t.diffusion_constant >= 0.0,
                "Diffusion constant of {} must not be negative",
                t.name
            );
            anyhow::ensure!(t.radius > 0.0, "Radius of {} must be positive", t.name);
            anyhow::ensure!(
                !self.particle_types[..i].iter().any(|o| o.name == t.name),
                "Duplicate particle type {}",
                t.name
            );
        }

        for r in &self.reactions {
            anyhow::ensure!(r.rate >= 0.0, "Rate of {} must not be negative", r.descriptor);
            if let Some([a, b]) = r.weights {
                anyhow::ensure!(
                    (a + b - 1.0).abs() < 1e-9 && a >= 0.0 && b >= 0.0,
                    "Weights of {} must be non-negative and sum to 1",
                    r.descriptor
                );
            }
        }
        for b in &self.breakable {
            anyhow::ensure!(b.threshold >= 0.0, "Breaking threshold must not be negative");
            anyhow::ensure!(b.rate >= 0.0, "Breaking rate must not be negative");
        }
        for t in &self.topologies {
            anyhow::ensure!(!t.particles.is_empty(), "Topology instances need particles");
        }

        let obs = &self.observables;
        anyhow::ensure!(obs.stride > 0, "Observable stride must be positive");
        anyhow::ensure!(obs.log_every > 0, "Log interval must be positive");
        if let Some(rdf) = &obs.rdf {
            anyhow::ensure!(rdf.bin_borders.len() >= 2, "RDF needs at least two bin borders");
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config = toml::from_str::<Self>(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Identifies the physical setup of a run. The seed and kernel choice are
    /// left out, so runs that should agree statistically share a fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.world.box_size).as_bytes());
        hasher.update(format!("{:?}", self.world.periodic).as_bytes());
        hasher.update(format!("{:?}", self.world.kbt).as_bytes());
        hasher.update(format!("{:?}", self.world.timestep).as_bytes());
        hasher.update(format!("{:?}", self.particle_types).as_bytes());
        hasher.update(format!("{:?}", self.potentials).as_bytes());
        hasher.update(format!("{:?}", self.topology).as_bytes());
        hasher.update(format!("{:?}", self.reactions).as_bytes());
        hasher.update(format!("{:?}", self.breakable).as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn kernel_options(&self) -> KernelOptions {
        let defaults = KernelOptions::default();
        KernelOptions {
            threads: self.kernel.threads,
            domains: self.kernel.domains.unwrap_or(defaults.domains),
        }
    }

    /// Resolves every name into registry ids.
    pub fn build_context(&self) -> anyhow::Result<Context> {
        let world = &self.world;
        let geometry = BoxGeometry::new(Vec3::from(world.box_size), world.periodic)?;
        let mut ctx = Context::new(geometry, world.kbt)?;

        for t in &self.particle_types {
            ctx.add_particle_type_with_radius(&t.name, t.diffusion_constant, t.radius)?;
        }
        for p in &self.potentials {
            match p {
                PotentialConfig::HarmonicRepulsion {
                    types: [a, b],
                    force_constant,
                    interaction_distance,
                } => ctx.add_harmonic_repulsion(a, b, *force_constant, *interaction_distance)?,
                PotentialConfig::LennardJones {
                    types: [a, b],
                    epsilon,
                    sigma,
                    cutoff,
                } => ctx.add_lennard_jones(a, b, *epsilon, *sigma, *cutoff)?,
                PotentialConfig::Box {
                    particle_type,
                    origin,
                    extent,
                    force_constant,
                } => ctx.add_box_potential(
                    particle_type,
                    Vec3::from(*origin),
                    Vec3::from(*extent),
                    *force_constant,
                )?,
            }
        }

        let topology = &self.topology;
        for name in &topology.types {
            ctx.add_topology_type(name)?;
        }
        for b in &topology.bonds {
            ctx.configure_bond(&b.types[0], &b.types[1], b.force_constant, b.length)?;
        }
        for a in &topology.angles {
            let [i, j, k] = &a.types;
            let types = [i.as_str(), j.as_str(), k.as_str()];
            ctx.configure_angle(types, a.force_constant, a.equilibrium_angle)?;
        }
        for d in &topology.dihedrals {
            let [i, j, k, l] = &d.types;
            let types = [i.as_str(), j.as_str(), k.as_str(), l.as_str()];
            ctx.configure_dihedral(types, d.force_constant, d.multiplicity, d.phi_0)?;
        }

        for r in &self.reactions {
            ctx.add_reaction_weighted(&r.descriptor, r.rate, r.weights)
                .with_context(|| format!("reaction `{}`", r.descriptor))?;
        }
        ctx.validate()?;
        DetailedBalance::new(&ctx).context("Invalid reversible reaction pair")?;
        Ok(ctx)
    }

    pub fn break_config(&self, ctx: &Context) -> anyhow::Result<BreakConfig> {
        let mut config = BreakConfig::new();
        for b in &self.breakable {
            let (a, c) = (ctx.type_id(&b.types[0])?, ctx.type_id(&b.types[1])?);
            config.add(a, c, b.threshold, b.rate)?;
        }
        Ok(config)
    }

    pub fn radial_distribution(&self, ctx: &Context) -> anyhow::Result<Option<RadialDistribution>> {
        let Some(rdf) = &self.observables.rdf else {
            return Ok(None);
        };
        let resolve = |names: &[String]| -> anyhow::Result<Vec<_>> {
            names.iter().map(|n| Ok(ctx.type_id(n)?)).collect()
        };
        let density = rdf
            .particle_to_density
            .unwrap_or_else(|| 1.0 / ctx.geometry.volume());
        let distribution =
            RadialDistribution::new(rdf.bin_borders.clone(), resolve(&rdf.from)?, resolve(&rdf.to)?, density)?;
        Ok(Some(distribution))
    }

    /// Initial particles and topologies. Random placements draw from a stream
    /// derived from `seed`.
    pub fn build_state(&self, ctx: &Context, seed: u64) -> anyhow::Result<StateModel> {
        let mut state = StateModel::new();
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(seed, PLACEMENT_STREAM));
        let lower = ctx.geometry.lower();
        let size = ctx.geometry.size();

        for group in &self.particles {
            let type_id = ctx.type_id(&group.particle_type)?;
            for &p in &group.positions {
                state.add_particle(Placement::new(type_id, p));
            }
            for _ in 0..group.random_count {
                let pos = Vec3::new(
                    lower.x + rng.gen::<f64>() * size.x,
                    lower.y + rng.gen::<f64>() * size.y,
                    lower.z + rng.gen::<f64>() * size.z,
                );
                state.add_particle(Placement::new(type_id, pos));
            }
        }

        for (n, instance) in self.topologies.iter().enumerate() {
            let topology_type = ctx.topologies.type_id(&instance.topology_type)?;
            let placements = instance
                .particles
                .iter()
                .map(|p| Ok(Placement::new(ctx.type_id(&p.particle_type)?, p.position)))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let edges: Vec<(usize, usize)> = instance.edges.iter().map(|&[a, b]| (a, b)).collect();
            state
                .add_topology(topology_type, &placements, &edges)
                .with_context(|| format!("topology instance {n}"))?;
        }
        Ok(state)
    }

    pub fn scheduler(&self) -> SchedulerPolicy {
        self.kernel.scheduler
    }

    pub fn backend(&self) -> Backend {
        self.kernel.backend
    }
}
