pub mod macros;

use kinetia_core::context::Context;
use kinetia_core::geometry::BoxGeometry;
use kinetia_core::kernel::{create_kernel, Backend, Kernel, KernelOptions};
use kinetia_core::neighbor_list::NeighborListOp;
use kinetia_core::state::StateModel;
use kinetia_data::Placement;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

type ContextMod = Box<dyn FnOnce(&mut Context)>;

/// Free particles or a topology, resolved by type name at build time.
enum Spawn {
    Particle(String, [f64; 3]),
    Random(String, usize),
    Topology(String, Vec<(String, [f64; 3])>, Vec<(usize, usize)>),
}

#[allow(dead_code)]
pub struct SystemBuilder {
    geometry: BoxGeometry,
    kbt: f64,
    types: Vec<(String, f64)>,
    context_mods: Vec<ContextMod>,
    spawns: Vec<Spawn>,
    seed: u64,
    backend: Backend,
    options: KernelOptions,
}

#[allow(dead_code)]
impl SystemBuilder {
    /// Periodic cube of edge `edge` at kT = 1.
    pub fn new(edge: f64) -> Self {
        Self {
            geometry: BoxGeometry::cube(edge, true).expect("valid box"),
            kbt: 1.0,
            types: Vec::new(),
            context_mods: Vec::new(),
            spawns: Vec::new(),
            seed: 0,
            backend: Backend::SingleCpu,
            options: KernelOptions::default(),
        }
    }

    pub fn with_geometry(mut self, geometry: BoxGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.options.threads = Some(threads);
        self
    }

    pub fn with_domains(mut self, domains: usize) -> Self {
        self.options.domains = domains;
        self
    }

    pub fn with_type(mut self, name: &str, diffusion_constant: f64) -> Self {
        self.types.push((name.to_string(), diffusion_constant));
        self
    }

    /// Registers potentials, bonds or reactions once all types exist.
    pub fn with_context<F>(mut self, modifier: F) -> Self
    where
        F: FnOnce(&mut Context) + 'static,
    {
        self.context_mods.push(Box::new(modifier));
        self
    }

    pub fn with_reaction(self, descriptor: &str, rate: f64) -> Self {
        let descriptor = descriptor.to_string();
        self.with_context(move |ctx| {
            ctx.add_reaction(&descriptor, rate).expect("valid reaction");
        })
    }

    pub fn with_particle(mut self, type_name: &str, pos: [f64; 3]) -> Self {
        self.spawns.push(Spawn::Particle(type_name.to_string(), pos));
        self
    }

    /// `count` particles placed uniformly in the box from a stream seeded by the
    /// builder seed.
    pub fn with_random(mut self, type_name: &str, count: usize) -> Self {
        self.spawns.push(Spawn::Random(type_name.to_string(), count));
        self
    }

    pub fn with_topology(mut self, topology_type: &str, particles: &[(&str, [f64; 3])], edges: &[(usize, usize)]) -> Self {
        let particles = particles.iter().map(|(t, p)| (t.to_string(), *p)).collect();
        self.spawns
            .push(Spawn::Topology(topology_type.to_string(), particles, edges.to_vec()));
        self
    }

    pub fn build_parts(self) -> (Context, StateModel) {
        let mut ctx = Context::new(self.geometry, self.kbt).expect("valid context");
        for (name, d) in &self.types {
            ctx.add_particle_type(name, *d).expect("unique type");
        }
        for modifier in self.context_mods {
            modifier(&mut ctx);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ 0x5EED);
        let lower = ctx.geometry.lower();
        let size = ctx.geometry.size();
        let mut state = StateModel::new();
        for spawn in self.spawns {
            match spawn {
                Spawn::Particle(t, pos) => {
                    let t = ctx.type_id(&t).expect("known type");
                    state.add_particle(Placement::new(t, pos));
                }
                Spawn::Random(t, count) => {
                    let t = ctx.type_id(&t).expect("known type");
                    for _ in 0..count {
                        let pos = [
                            lower.x + rng.gen::<f64>() * size.x,
                            lower.y + rng.gen::<f64>() * size.y,
                            lower.z + rng.gen::<f64>() * size.z,
                        ];
                        state.add_particle(Placement::new(t, pos));
                    }
                }
                Spawn::Topology(topology_type, particles, edges) => {
                    let tt = match ctx.topologies.type_id(&topology_type) {
                        Ok(id) => id,
                        Err(_) => ctx.add_topology_type(&topology_type).expect("topology type"),
                    };
                    let placements: Vec<Placement> = particles
                        .iter()
                        .map(|(t, p)| Placement::new(ctx.type_id(t).expect("known type"), *p))
                        .collect();
                    state.add_topology(tt, &placements, &edges).expect("valid topology");
                }
            }
        }
        (ctx, state)
    }

    /// Builds the kernel with an initialized neighbor list.
    pub fn build(self) -> Box<dyn Kernel> {
        let (seed, backend, options) = (self.seed, self.backend, self.options);
        let (ctx, state) = self.build_parts();
        let mut kernel = create_kernel(backend, ctx, state, seed, &options).expect("kernel");
        kernel.update_neighbor_list(NeighborListOp::Init);
        kernel
    }
}

/// Particle counts by type name order of the context.
#[allow(dead_code)]
pub fn counts(kernel: &dyn Kernel) -> Vec<usize> {
    kernel
        .state()
        .count_by_type(kernel.context().particle_types.len())
}
