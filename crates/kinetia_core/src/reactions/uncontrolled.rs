use crate::context::Context;
use crate::error::Result;
use crate::reactions::apply::{apply_event, Staleness};
use crate::reactions::events::gather_events;
use crate::reactions::perform::ReactionLogic;
use crate::reactions::{trace_phase, ReactionReport, SchedulerPhase, SchedulerPolicy};
use crate::state::StateModel;
use rand::seq::SliceRandom;
use rand::Rng;

const POLICY: SchedulerPolicy = SchedulerPolicy::UncontrolledApproximation;

/// Fires every candidate independently with `p = 1 - exp(-rate * dt)` and applies
/// the fired events in random order. Conflicting events are not resolved: an educt
/// shared by two fired events feeds both of them.
pub fn react<R: Rng + ?Sized>(
    ctx: &Context,
    state: &mut StateModel,
    dt: f64,
    rng: &mut R,
) -> Result<ReactionReport> {
    trace_phase(POLICY, SchedulerPhase::Idle, 0);
    let events = gather_events(ctx, state);
    trace_phase(POLICY, SchedulerPhase::CandidatesGathered, events.len());

    let mut fired: Vec<_> = events
        .into_iter()
        .filter(|e| rng.gen::<f64>() < 1.0 - (-e.propensity * dt).exp())
        .map(|mut e| {
            e.accepted = true;
            e
        })
        .collect();
    fired.shuffle(rng);
    trace_phase(POLICY, SchedulerPhase::EventsResolved, fired.len());

    for event in &fired {
        let reaction = ctx.reactions.get(event.reaction)?;
        let products = reaction.perform(&event.educts(), rng)?;
        apply_event(ctx, state, event, products, Staleness::Tolerate)?;
    }
    trace_phase(POLICY, SchedulerPhase::Applied, fired.len());
    Ok(ReactionReport {
        proposed: fired.len(),
        accepted: fired.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Execution;
    use crate::geometry::BoxGeometry;
    use kinetia_data::Placement;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_zero_rate_never_fires() {
        let mut ctx = Context::new(BoxGeometry::cube(10.0, true).unwrap(), 1.0).unwrap();
        ctx.add_particle_type("A", 1.0).unwrap();
        ctx.add_particle_type("B", 1.0).unwrap();
        ctx.add_reaction("conv: A -> B", 0.0).unwrap();
        let mut state = StateModel::new();
        state.add_particle(Placement::new(0, [0.0; 3]));
        let (store, list) = state.store_and_neighbor_list();
        list.rebuild(store, &ctx.geometry, ctx.cutoff(), Execution::Serial);

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let report = react(&ctx, &mut state, 1e6, &mut rng).unwrap();
        assert_eq!(report.accepted, 0);
        assert_eq!(state.count_by_type(2), vec![1, 0]);
    }

    #[test]
    fn test_huge_rate_always_fires() {
        let mut ctx = Context::new(BoxGeometry::cube(10.0, true).unwrap(), 1.0).unwrap();
        ctx.add_particle_type("A", 1.0).unwrap();
        ctx.add_particle_type("B", 1.0).unwrap();
        ctx.add_reaction("conv: A -> B", 1e12).unwrap();
        let mut state = StateModel::new();
        for i in 0..10 {
            state.add_particle(Placement::new(0, [i as f64 - 4.5, 0.0, 0.0]));
        }
        let (store, list) = state.store_and_neighbor_list();
        list.rebuild(store, &ctx.geometry, ctx.cutoff(), Execution::Serial);

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let report = react(&ctx, &mut state, 1.0, &mut rng).unwrap();
        assert_eq!(report.accepted, 10);
        assert_eq!(state.count_by_type(2), vec![0, 10]);
        assert_eq!(state.reaction_counts(), &[10]);
    }
}
