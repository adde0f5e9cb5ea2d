mod common;

use common::{counts, SystemBuilder};
use kinetia_core::context::Context;
use kinetia_core::geometry::BoxGeometry;
use kinetia_core::kernel::{create_kernel, Backend, KernelOptions};
use kinetia_core::neighbor_list::NeighborListOp;
use kinetia_core::reactions::{DetailedBalance, ReversibleKind, SchedulerPolicy};
use kinetia_data::Vec3;

fn fusion_fission_context() -> Context {
    let edge = 10_000f64.cbrt();
    let mut ctx = Context::new(BoxGeometry::cube(edge, true).unwrap(), 1.0).unwrap();
    for name in ["A", "B", "C"] {
        ctx.add_particle_type(name, 1.0).unwrap();
    }
    ctx.add_harmonic_repulsion("A", "B", 2.0, 3.0).unwrap();
    ctx.add_reaction("fusion: A +(5) B -> C", 1.0).unwrap();
    ctx.add_reaction("fission: C -> A +(5) B", 2.0).unwrap();
    ctx
}

#[test]
fn test_fusion_fission_constants() {
    let ctx = fusion_fission_context();
    let balance = DetailedBalance::new(&ctx).unwrap();
    assert_eq!(balance.configs().len(), 1);
    let config = &balance.configs()[0];

    assert_eq!(config.kind, ReversibleKind::FusionFission);
    assert_eq!((config.forward, config.backward), (0, 1));
    assert_rel_close!(config.total_volume, 10_000.0, 1e-9);
    assert_close!(config.lhs_interaction_radius, 3.0, 1e-12);
    assert_close!(config.lhs_interaction_volume, 113.097_335_529_232_54, 1e-7);
    assert_close!(config.effective_lhs_interaction_volume, 68.099_109_181, 1e-5);
    assert_close!(config.effective_lhs_reaction_volume, 478.600_55, 1e-4);
    assert_rel_close!(config.equilibrium_constant, 41.600_46, 1e-5);
    assert_close!(config.macro_backward_rate, 2.0, 1e-12);
    assert_rel_close!(config.macro_forward_rate, 480.763_9, 1e-5);
}

#[test]
fn test_both_directions_map_to_the_same_pair() {
    let ctx = fusion_fission_context();
    let balance = DetailedBalance::new(&ctx).unwrap();
    let forward = balance.config_for(0).unwrap();
    let backward = balance.config_for(1).unwrap();
    assert_eq!(forward, backward);
}

#[test]
fn test_mismatched_pair_is_rejected_before_the_first_step() {
    let (ctx, state) = SystemBuilder::new(12.0)
        .with_type("A", 1.0)
        .with_type("B", 1.0)
        .with_type("C", 1.0)
        .with_reaction("fusion: A +(2) B -> C", 1.0)
        .with_reaction("fission: C -> A +(3) B", 1.0)
        .with_particle("C", [0.0, 0.0, 0.0])
        .build_parts();
    for backend in [Backend::SingleCpu, Backend::Cpu, Backend::Domain] {
        let result = create_kernel(backend, ctx.clone(), state.clone(), 1, &KernelOptions::default());
        let err = result.err().expect("kernel creation must fail");
        assert!(
            err.to_string().contains("fission distance exceeds the fusion radius"),
            "{backend:?}: {err}"
        );
    }
}

fn binding_system(seed: u64) -> SystemBuilder {
    SystemBuilder::new(12.0)
        .with_seed(seed)
        .with_type("A", 1.0)
        .with_type("B", 1.0)
        .with_type("C", 0.5)
        .with_context(|ctx| {
            ctx.add_harmonic_repulsion("A", "B", 2.0, 3.0).unwrap();
        })
        .with_reaction("fusion: A +(2) B -> C", 1.0)
        .with_reaction("fission: C -> A +(2) B", 2.0)
        .with_random("A", 15)
        .with_random("B", 15)
}

fn assert_conserved_under(policy: SchedulerPolicy, seed: u64) {
    let mut kernel = binding_system(seed).build();
    let mut accepted = 0;
    for _ in 0..50 {
        kernel.calculate_forces().unwrap();
        kernel.euler_bd_integrator(0.05).unwrap();
        kernel.update_neighbor_list(NeighborListOp::Update);
        accepted += kernel.react(policy, 0.05).unwrap().accepted;

        let n = counts(kernel.as_ref());
        assert_eq!(n[0] + n[2], 15, "A + C changed under {policy:?}");
        assert_eq!(n[1] + n[2], 15, "B + C changed under {policy:?}");
        kernel.state().check_consistency().unwrap();
    }
    assert!(accepted > 0, "no reaction fired under {policy:?}");
}

#[test]
fn test_detailed_balance_conserves_species() {
    for seed in 0..4 {
        assert_conserved_under(SchedulerPolicy::DetailedBalance, seed);
    }
}

#[test]
fn test_gillespie_conserves_species() {
    for seed in 0..4 {
        assert_conserved_under(SchedulerPolicy::Gillespie, seed);
    }
}

#[test]
fn test_energetically_impossible_fusion_is_never_accepted() {
    // C is confined far away from where the product would appear
    let mut kernel = SystemBuilder::new(12.0)
        .with_type("A", 1.0)
        .with_type("B", 1.0)
        .with_type("C", 1.0)
        .with_context(|ctx| {
            ctx.add_box_potential("C", Vec3::new(4.0, 4.0, 4.0), Vec3::new(1.0, 1.0, 1.0), 1e3)
                .unwrap();
        })
        .with_reaction("fusion: A +(2) B -> C", 1e10)
        .with_reaction("fission: C -> A +(2) B", 1.0)
        .with_particle("A", [0.0, 0.0, 0.0])
        .with_particle("B", [1.0, 0.0, 0.0])
        .build();

    let report = kernel.react(SchedulerPolicy::DetailedBalance, 1.0).unwrap();
    assert_eq!(report.accepted, 0);
    assert_eq!(counts(kernel.as_ref()), vec![1, 1, 0]);
}

#[test]
fn test_energetically_impossible_fission_is_proposed_and_rejected() {
    let far = Vec3::new(4.0, 4.0, 4.0);
    let unit = Vec3::new(1.0, 1.0, 1.0);
    let mut kernel = SystemBuilder::new(12.0)
        .with_seed(8)
        .with_type("A", 1.0)
        .with_type("B", 1.0)
        .with_type("C", 1.0)
        .with_context(move |ctx| {
            ctx.add_box_potential("A", far, unit, 1e3).unwrap();
            ctx.add_box_potential("B", far, unit, 1e3).unwrap();
        })
        .with_reaction("fusion: A +(2) B -> C", 1.0)
        .with_reaction("fission: C -> A +(2) B", 100.0)
        .with_particle("C", [0.0, 0.0, 0.0])
        .build();

    let report = kernel.react(SchedulerPolicy::DetailedBalance, 1.0).unwrap();
    assert!(report.proposed > 0);
    assert_eq!(report.accepted, 0);
    assert_eq!(counts(kernel.as_ref()), vec![0, 0, 1]);
}

#[test]
fn test_unpaired_reactions_fire_unchanged() {
    let mut kernel = SystemBuilder::new(10.0)
        .with_type("A", 1.0)
        .with_type("B", 1.0)
        .with_reaction("conv: A -> B", 1e9)
        .with_particle("A", [0.0, 0.0, 0.0])
        .with_particle("A", [2.0, 0.0, 0.0])
        .build();

    let report = kernel.react(SchedulerPolicy::DetailedBalance, 0.1).unwrap();
    assert_eq!(report.accepted, 2);
    assert_eq!(counts(kernel.as_ref()), vec![0, 2]);
}
