//! Force and energy evaluation: external potentials, pair potentials over the
//! neighbor list, and bonded terms (bonds, angles, cosine dihedrals) per topology.

use crate::context::Context;
use crate::error::Result;
use crate::execution::Execution;
use crate::neighbor_list::NeighborList;
use crate::state::StateModel;
use crate::store::ParticleStore;
use crate::topology::Topology;
use kinetia_data::{AngleConfig, BondConfig, DihedralConfig, Vec3};

/// Accumulated bonded contributions of one topology.
#[derive(Debug, Default)]
pub struct BondedTerms {
    pub forces: Vec<(usize, Vec3)>,
    pub energy: f64,
}

/// Harmonic bond `k (r - l)^2`. Returns the energy and the force on the second
/// particle for `d = x_b - x_a`.
pub fn bond_term(bond: &BondConfig, d: &Vec3) -> (f64, Vec3) {
    let r = d.norm();
    let stretch = r - bond.length;
    let energy = bond.force_constant * stretch * stretch;
    if r <= 0.0 {
        return (energy, Vec3::ZERO);
    }
    (energy, *d * (-2.0 * bond.force_constant * stretch / r))
}

/// Harmonic angle `k (θ - θ0)^2` at vertex `j`, with `a = x_i - x_j` and
/// `b = x_k - x_j`. Returns the energy and the forces on `i`, `j`, `k`.
pub fn angle_term(angle: &AngleConfig, a: &Vec3, b: &Vec3) -> (f64, [Vec3; 3]) {
    let (ra, rb) = (a.norm(), b.norm());
    if ra <= 0.0 || rb <= 0.0 {
        return (0.0, [Vec3::ZERO; 3]);
    }
    let cos = (a.dot(b) / (ra * rb)).clamp(-1.0, 1.0);
    let theta = cos.acos();
    let delta = theta - angle.equilibrium_angle;
    let energy = angle.force_constant * delta * delta;
    let sin = (1.0 - cos * cos).sqrt().max(1e-8);
    let pre = 2.0 * angle.force_constant * delta / sin;
    let fi = (*b / (ra * rb) - *a * (cos / (ra * ra))) * pre;
    let fk = (*a / (ra * rb) - *b * (cos / (rb * rb))) * pre;
    (energy, [fi, -(fi + fk), fk])
}

/// Cosine dihedral `k (1 + cos(nφ - φ0))` over the chain `i-j-k-l`, given
/// `f = x_i - x_j`, `g = x_j - x_k` and `h = x_l - x_k`.
pub fn dihedral_term(dihedral: &DihedralConfig, f: &Vec3, g: &Vec3, h: &Vec3) -> (f64, [Vec3; 4]) {
    let a = f.cross(g);
    let b = h.cross(g);
    let (a2, b2) = (a.norm_squared(), b.norm_squared());
    let gn = g.norm();
    if a2 < 1e-12 || b2 < 1e-12 || gn <= 0.0 {
        return (0.0, [Vec3::ZERO; 4]);
    }
    // b1 = -f, b2 = -g, b3 = h
    let n1 = f.cross(g);
    let n2 = (-*g).cross(h);
    let phi = (gn * (-*f).dot(&n2)).atan2(n1.dot(&n2));

    let n = f64::from(dihedral.multiplicity);
    let arg = n * phi - dihedral.phi_0;
    let energy = dihedral.force_constant * (1.0 + arg.cos());
    let de_dphi = -dihedral.force_constant * n * arg.sin();

    let fg = f.dot(g);
    let hg = h.dot(g);
    let grad_i = a * (-gn / a2);
    let grad_l = b * (gn / b2);
    let grad_j = a * (gn / a2) + a * (fg / (a2 * gn)) - b * (hg / (b2 * gn));
    let grad_k = b * (hg / (b2 * gn)) - a * (fg / (a2 * gn)) - b * (gn / b2);
    let s = -de_dphi;
    (energy, [grad_i * s, grad_j * s, grad_k * s, grad_l * s])
}

/// Bonded forces of one topology. Terms without a configured parameter set
/// contribute nothing.
pub fn bonded_terms(ctx: &Context, store: &ParticleStore, topology: &Topology) -> BondedTerms {
    let mut out = BondedTerms::default();
    let graph = topology.graph();
    let entry = |p: usize| store.entry(p).ok().map(|e| (e.type_id, e.pos));

    for (a, b, _) in graph.edges() {
        let (Some((ta, pa)), Some((tb, pb))) = (entry(a), entry(b)) else {
            continue;
        };
        let Some(bond) = ctx.topologies.bond(ta, tb) else {
            continue;
        };
        let (e, f) = bond_term(bond, &ctx.shortest_difference(&pa, &pb));
        out.energy += e;
        out.forces.push((b, f));
        out.forces.push((a, -f));
    }

    if ctx.topologies.has_angles() {
        for [i, j, k] in graph.angles() {
            let (Some((ti, pi)), Some((tj, pj)), Some((tk, pk))) = (entry(i), entry(j), entry(k)) else {
                continue;
            };
            let Some(angle) = ctx.topologies.angle(ti, tj, tk) else {
                continue;
            };
            let a = ctx.shortest_difference(&pj, &pi);
            let b = ctx.shortest_difference(&pj, &pk);
            let (e, [fi, fj, fk]) = angle_term(angle, &a, &b);
            out.energy += e;
            out.forces.extend([(i, fi), (j, fj), (k, fk)]);
        }
    }

    if ctx.topologies.has_dihedrals() {
        for [i, j, k, l] in graph.dihedrals() {
            let quad = (entry(i), entry(j), entry(k), entry(l));
            let (Some((ti, pi)), Some((tj, pj)), Some((tk, pk)), Some((tl, pl))) = quad else {
                continue;
            };
            let Some(dihedral) = ctx.topologies.dihedral(ti, tj, tk, tl) else {
                continue;
            };
            let f = ctx.shortest_difference(&pj, &pi);
            let g = ctx.shortest_difference(&pk, &pj);
            let h = ctx.shortest_difference(&pk, &pl);
            let (e, [fi, fj, fk, fl]) = dihedral_term(dihedral, &f, &g, &h);
            out.energy += e;
            out.forces.extend([(i, fi), (j, fj), (k, fk), (l, fl)]);
        }
    }
    out
}

/// Pair force and energy on particle `index` gathered from its neighbor list
/// entries. Each pair contributes half its energy to either partner.
fn gather_pair(ctx: &Context, state: &StateModel, index: usize) -> (Vec3, f64) {
    gather_pair_from(ctx, state.store(), state.neighbor_list(), index)
}

/// Same as [`gather_pair`] over an arbitrary list, e.g. a rank-local one.
pub(crate) fn gather_pair_from(
    ctx: &Context,
    store: &ParticleStore,
    list: &NeighborList,
    index: usize,
) -> (Vec3, f64) {
    let Ok(entry) = store.entry(index) else {
        return (Vec3::ZERO, 0.0);
    };
    let mut force = Vec3::ZERO;
    let mut energy = 0.0;
    for (partner, d) in list.neighbors_of(index) {
        let Ok(other) = store.entry(partner) else {
            continue;
        };
        for potential in ctx.potentials.pair_for(entry.type_id, other.type_id) {
            force -= potential.force(&d);
            energy += 0.5 * potential.energy(d.norm_squared());
        }
    }
    (force, energy)
}

/// Order-1 contributions, indexed by store slot.
pub fn external_forces(ctx: &Context, store: &ParticleStore) -> (Vec<Vec3>, f64) {
    let mut forces = vec![Vec3::ZERO; store.capacity()];
    let mut energy = 0.0;
    for (i, e) in store.iter_active() {
        for potential in ctx.potentials.external_for(e.type_id) {
            forces[i] += potential.force(&e.pos);
            energy += potential.energy(&e.pos);
        }
    }
    (forces, energy)
}

/// External and pair contributions. Serial execution walks each pair once; the
/// parallel path gathers per particle so no two workers write the same slot.
pub fn nonbonded_forces(ctx: &Context, state: &StateModel, exec: Execution<'_>) -> (Vec<Vec3>, f64) {
    let store = state.store();
    let (mut forces, mut energy) = external_forces(ctx, store);
    if !ctx.potentials.has_pair_potentials() {
        return (forces, energy);
    }

    if exec.is_parallel() {
        let gathered = exec.map_range(store.capacity(), |i| gather_pair(ctx, state, i));
        for (i, (f, e)) in gathered.into_iter().enumerate() {
            forces[i] += f;
            energy += e;
        }
    } else {
        for pair in state.neighbor_list().pairs() {
            let (Ok(ei), Ok(ej)) = (store.entry(pair.i), store.entry(pair.j)) else {
                continue;
            };
            for potential in ctx.potentials.pair_for(ei.type_id, ej.type_id) {
                let f = potential.force(&pair.displacement);
                forces[pair.j] += f;
                forces[pair.i] -= f;
                energy += potential.energy(pair.distance_squared);
            }
        }
    }
    (forces, energy)
}

/// Evaluates all forces into the store and the total energy into the state.
/// Requires a fresh neighbor list.
pub fn calculate_forces(ctx: &Context, state: &mut StateModel, exec: Execution<'_>) -> Result<f64> {
    let (forces, energy) = nonbonded_forces(ctx, state, exec);
    commit_with_bonded(ctx, state, exec, forces, energy)
}

/// Adds bonded terms to precomputed non-bonded `forces` and stores the result.
pub fn commit_with_bonded(
    ctx: &Context,
    state: &mut StateModel,
    exec: Execution<'_>,
    mut forces: Vec<Vec3>,
    mut energy: f64,
) -> Result<f64> {
    let topologies: Vec<&Topology> = state.topologies().map(|(_, t)| t).collect();
    let bonded = exec.map_slice(&topologies, |t| bonded_terms(ctx, state.store(), t));
    for terms in bonded {
        energy += terms.energy;
        for (p, f) in terms.forces {
            if let Some(slot) = forces.get_mut(p) {
                *slot += f;
            }
        }
    }
    state.store_mut().store_forces(&forces);
    state.set_energy(energy);
    Ok(energy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoxGeometry;
    use kinetia_data::Placement;

    fn numeric_gradient(energy: impl Fn(&[Vec3]) -> f64, x: &[Vec3], p: usize) -> Vec3 {
        let h = 1e-6;
        let mut g = Vec3::ZERO;
        for axis in 0..3 {
            let mut plus = x.to_vec();
            let mut minus = x.to_vec();
            plus[p][axis] += h;
            minus[p][axis] -= h;
            g[axis] = (energy(&plus) - energy(&minus)) / (2.0 * h);
        }
        g
    }

    #[test]
    fn test_bond_force_points_towards_rest_length() {
        let bond = BondConfig::harmonic(1.0, 1.0);
        let (e, f) = bond_term(&bond, &Vec3::new(0.0, 0.0, 2.0));
        assert!((e - 1.0).abs() < 1e-12);
        assert!((f.z - -2.0).abs() < 1e-12);
    }

    #[test]
    fn test_angle_forces_match_numeric_gradient() {
        let angle = AngleConfig {
            force_constant: 3.0,
            equilibrium_angle: 2.0,
        };
        let x = [
            Vec3::new(1.0, 0.2, 0.0),
            Vec3::new(0.0, 0.0, 0.1),
            Vec3::new(-0.3, 1.1, 0.4),
        ];
        let energy = |x: &[Vec3]| angle_term(&angle, &(x[0] - x[1]), &(x[2] - x[1])).0;
        let (_, forces) = angle_term(&angle, &(x[0] - x[1]), &(x[2] - x[1]));
        for p in 0..3 {
            let g = numeric_gradient(energy, &x, p);
            assert!((forces[p] + g).norm() < 1e-5, "particle {p}");
        }
    }

    #[test]
    fn test_dihedral_forces_match_numeric_gradient() {
        let dihedral = DihedralConfig {
            force_constant: 1.5,
            multiplicity: 3,
            phi_0: 0.4,
        };
        let x = [
            Vec3::new(1.0, 0.3, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.1, 1.2, 0.2),
            Vec3::new(0.8, 1.5, 1.0),
        ];
        let terms = |x: &[Vec3]| dihedral_term(&dihedral, &(x[0] - x[1]), &(x[1] - x[2]), &(x[3] - x[2]));
        let (_, forces) = terms(&x);
        for p in 0..4 {
            let g = numeric_gradient(|x| terms(x).0, &x, p);
            assert!((forces[p] + g).norm() < 1e-5, "particle {p}");
        }
        let total = forces.iter().fold(Vec3::ZERO, |acc, f| acc + *f);
        assert!(total.norm() < 1e-10);
    }

    #[test]
    fn test_repulsion_forces_are_antisymmetric() {
        let mut ctx = Context::new(BoxGeometry::cube(10.0, true).unwrap(), 1.0).unwrap();
        ctx.add_particle_type("A", 1.0).unwrap();
        ctx.add_harmonic_repulsion("A", "A", 10.0, 1.0).unwrap();
        let mut state = StateModel::new();
        let a = state.add_particle(Placement::new(0, [4.8, 0.0, 0.0]));
        let b = state.add_particle(Placement::new(0, [-4.7, 0.0, 0.0]));
        let (store, list) = state.store_and_neighbor_list();
        list.rebuild(store, &ctx.geometry, ctx.cutoff(), Execution::Serial);

        let energy = calculate_forces(&ctx, &mut state, Execution::Serial).unwrap();
        // separation 0.5 across the periodic boundary
        assert!((energy - 0.5 * 10.0 * 0.25).abs() < 1e-9);
        let fa = state.store().entry(a).unwrap().force;
        let fb = state.store().entry(b).unwrap().force;
        assert!((fa.x - -5.0).abs() < 1e-9);
        assert!((fa + fb).norm() < 1e-12);
    }

    #[test]
    fn test_parallel_gather_matches_serial() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();
        let mut ctx = Context::new(BoxGeometry::cube(6.0, true).unwrap(), 1.0).unwrap();
        ctx.add_particle_type("A", 1.0).unwrap();
        ctx.add_harmonic_repulsion("A", "A", 5.0, 1.5).unwrap();
        let mut state = StateModel::new();
        for i in 0..60 {
            let t = i as f64;
            state.add_particle(Placement::new(
                0,
                [(t * 0.77).sin() * 2.9, (t * 1.31).cos() * 2.9, (t * 0.53).sin() * 2.9],
            ));
        }
        let (store, list) = state.store_and_neighbor_list();
        list.rebuild(store, &ctx.geometry, ctx.cutoff(), Execution::Serial);

        let (serial, es) = nonbonded_forces(&ctx, &state, Execution::Serial);
        let (parallel, ep) = nonbonded_forces(&ctx, &state, Execution::Parallel(&pool));
        assert!((es - ep).abs() < 1e-9);
        for (s, p) in serial.iter().zip(&parallel) {
            assert!((*s - *p).norm() < 1e-9);
        }
    }
}
