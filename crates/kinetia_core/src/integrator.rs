use crate::context::Context;
use crate::execution::{derive_seed, Execution};
use crate::state::StateModel;
use kinetia_data::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Euler-Maruyama step of overdamped Langevin dynamics:
/// `x += D/kT * F * dt + sqrt(2 D dt) * ξ`, then wrapped into the box.
///
/// Every particle draws its noise from a stream keyed by its id, so the result is
/// independent of the backend and of how the store is laid out.
pub fn euler_bd(ctx: &Context, state: &mut StateModel, dt: f64, master_seed: u64, exec: Execution<'_>) {
    let kbt = ctx.kbt;
    let geometry = ctx.geometry;
    let types = &ctx.particle_types;
    exec.for_each_mut(state.store_mut().entries_mut(), |_, entry| {
        if entry.deactivated {
            return;
        }
        let d = types.diffusion_constant(entry.type_id);
        if d <= 0.0 {
            return;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(master_seed, entry.id.0));
        let noise = Vec3::new(
            StandardNormal.sample(&mut rng),
            StandardNormal.sample(&mut rng),
            StandardNormal.sample(&mut rng),
        );
        let mut pos = entry.pos + entry.force * (d / kbt * dt) + noise * (2.0 * d * dt).sqrt();
        geometry.fix_position(&mut pos);
        entry.pos = pos;
    });
}
