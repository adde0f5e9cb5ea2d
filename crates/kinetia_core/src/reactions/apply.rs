//! Commits a reaction event to the particle store and topology graphs.

use crate::context::Context;
use crate::error::{Result, SimError};
use crate::reactions::events::ReactionEvent;
use crate::reactions::perform::Products;
use crate::state::StateModel;
use kinetia_data::{Placement, ReactionKind};

/// What to do with an educt that is no longer the particle the event was gathered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Exact schedulers never see stale educts; finding one is a defect.
    Reject,
    /// Uncontrolled approximation: products are still created, consumed educts are
    /// not consumed a second time.
    Tolerate,
}

/// Particles touched by one committed event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    pub removed: Vec<usize>,
    pub inserted: Vec<usize>,
}

fn live(state: &StateModel, event: &ReactionEvent, k: usize) -> bool {
    state
        .store()
        .entry(event.indices[k])
        .is_ok_and(|e| e.id == event.ids[k])
}

fn insert(ctx: &Context, state: &mut StateModel, placement: Placement, applied: &mut Applied) -> usize {
    let mut p = placement;
    ctx.fix_position(&mut p.pos);
    let index = state.add_particle(p);
    applied.inserted.push(index);
    index
}

fn consume(state: &mut StateModel, index: usize, applied: &mut Applied) -> Result<()> {
    state.remove_particle(index)?;
    applied.removed.push(index);
    Ok(())
}

/// Applies `products` of `event`. Educts are replaced by freshly inserted particles
/// (new ids), and graph vertices move from educt to product:
///
/// - conversion and enzymatic targets keep their bonds,
/// - a fission educt hands its vertex to the first product, the second is free,
/// - fusion contracts both educt vertices into the product, merging topologies,
/// - enzymatic products are bonded to the catalyst if either is in a topology,
/// - decay removes the vertex, which may split the topology.
pub fn apply_event(
    ctx: &Context,
    state: &mut StateModel,
    event: &ReactionEvent,
    products: Products,
    staleness: Staleness,
) -> Result<Applied> {
    let reaction = ctx.reactions.get(event.reaction)?;
    let alive: Vec<bool> = (0..event.n_educts).map(|k| live(state, event, k)).collect();
    if staleness == Staleness::Reject {
        if let Some(k) = alive.iter().position(|a| !a) {
            return Err(SimError::invalid_reference(event.indices[k]));
        }
    }

    let mut applied = Applied::default();
    match (&reaction.kind, products) {
        (ReactionKind::Decay { .. }, Products::None) => {
            if alive[0] {
                consume(state, event.indices[0], &mut applied)?;
            }
        }
        (ReactionKind::Conversion { .. }, Products::One(p)) => {
            let new = insert(ctx, state, p, &mut applied);
            if alive[0] {
                state.transfer_membership(event.indices[0], new)?;
                consume(state, event.indices[0], &mut applied)?;
            }
        }
        (ReactionKind::Fission { .. }, Products::Two([p1, p2])) => {
            let first = insert(ctx, state, p1, &mut applied);
            insert(ctx, state, p2, &mut applied);
            if alive[0] {
                state.transfer_membership(event.indices[0], first)?;
                consume(state, event.indices[0], &mut applied)?;
            }
        }
        (ReactionKind::Fusion { .. }, Products::One(p)) => {
            let product = insert(ctx, state, p, &mut applied);
            let [e1, e2] = event.indices;
            if alive[0] {
                state.transfer_membership(e1, product)?;
            }
            if alive[1] {
                state.fuse_vertices(product, e2)?;
            }
            for (k, &index) in [e1, e2].iter().enumerate() {
                if alive[k] {
                    consume(state, index, &mut applied)?;
                }
            }
            if let Some(id) = state.topology_of(product) {
                state.reconcile_topology(id)?;
            }
        }
        (ReactionKind::Enzymatic { .. }, Products::Two([_, target])) => {
            let [catalyst, educt] = event.indices;
            if target.type_id == event.educts[1].type_id {
                // outside the catalytic radius: perform left the educts untouched
                return Ok(applied);
            }
            let new = insert(ctx, state, target, &mut applied);
            if alive[1] {
                state.transfer_membership(educt, new)?;
                consume(state, educt, &mut applied)?;
            }
            let linked = alive[0]
                && (state.topology_of(catalyst).is_some() || state.topology_of(new).is_some());
            if linked {
                let already = match (state.topology_of(catalyst), state.topology_of(new)) {
                    (Some(a), Some(b)) if a == b => state
                        .topology(a)
                        .is_some_and(|t| t.graph().has_edge(catalyst, new)),
                    _ => false,
                };
                if !already {
                    state.connect(catalyst, new)?;
                }
            }
        }
        (_, products) => {
            return Err(SimError::config(format!(
                "reaction {} cannot produce {} particle(s)",
                reaction.name,
                products.len()
            )))
        }
    }
    state.record_reaction(event.reaction);
    tracing::trace!(
        reaction = %reaction.name,
        removed = applied.removed.len(),
        inserted = applied.inserted.len(),
        "Applied reaction event"
    );
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Execution;
    use crate::geometry::BoxGeometry;
    use crate::reactions::events::gather_events;
    use crate::reactions::perform::ReactionLogic;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn context() -> Context {
        let mut ctx = Context::new(BoxGeometry::cube(20.0, true).unwrap(), 1.0).unwrap();
        for name in ["A", "B", "C"] {
            ctx.add_particle_type(name, 1.0).unwrap();
        }
        ctx.configure_bond("A", "A", 1.0, 1.0).unwrap();
        ctx.configure_bond("A", "C", 1.0, 1.0).unwrap();
        ctx
    }

    fn fire(ctx: &Context, state: &mut StateModel, reaction: &str) -> Applied {
        let (store, list) = state.store_and_neighbor_list();
        list.rebuild(store, &ctx.geometry, ctx.cutoff(), Execution::Serial);
        let rid = ctx.reactions.by_name(reaction).unwrap().id;
        let event = gather_events(ctx, state)
            .into_iter()
            .find(|e| e.reaction == rid)
            .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let products = ctx
            .reactions
            .get(rid)
            .unwrap()
            .perform(&event.educts(), &mut rng)
            .unwrap();
        apply_event(ctx, state, &event, products, Staleness::Reject).unwrap()
    }

    #[test]
    fn test_conversion_of_topology_particle_keeps_bonds() {
        let mut ctx = context();
        ctx.add_reaction("conv: A -> C", 1.0).unwrap();
        let mut state = StateModel::new();
        let id = state
            .add_topology(
                0,
                &[Placement::new(2, [0.0; 3]), Placement::new(0, [1.0, 0.0, 0.0])],
                &[(0, 1)],
            )
            .unwrap();
        let applied = fire(&ctx, &mut state, "conv");
        assert_eq!(applied.removed.len(), 1);
        let new = applied.inserted[0];
        assert_eq!(state.store().entry(new).unwrap().type_id, 2);
        assert_eq!(state.topology_of(new), Some(id));
        assert_eq!(state.topology(id).unwrap().graph().n_edges(), 1);
        assert_eq!(state.reaction_counts(), &[1]);
        state.check_consistency().unwrap();
    }

    #[test]
    fn test_fusion_merges_two_topologies() {
        let mut ctx = context();
        ctx.add_reaction("bind: A +(1.5) A -> A", 1.0).unwrap();
        let mut state = StateModel::new();
        // two dimers whose inner ends touch
        state
            .add_topology(
                0,
                &[Placement::new(0, [-2.0, 0.0, 0.0]), Placement::new(0, [-0.5, 0.0, 0.0])],
                &[(0, 1)],
            )
            .unwrap();
        state
            .add_topology(
                0,
                &[Placement::new(0, [0.5, 0.0, 0.0]), Placement::new(0, [2.0, 0.0, 0.0])],
                &[(0, 1)],
            )
            .unwrap();
        let applied = fire(&ctx, &mut state, "bind");
        assert_eq!(applied.removed.len(), 2);
        assert_eq!(state.n_topologies(), 1);
        let (_, topology) = state.topologies().next().unwrap();
        assert_eq!(topology.len(), 3);
        assert_eq!(topology.graph().n_edges(), 2);
        state.check_consistency().unwrap();
    }

    #[test]
    fn test_fusion_of_dimer_frees_product() {
        let mut ctx = context();
        ctx.add_reaction("bind: A +(1.5) A -> A", 1.0).unwrap();
        let mut state = StateModel::new();
        state
            .add_topology(
                0,
                &[Placement::new(0, [0.0; 3]), Placement::new(0, [1.0, 0.0, 0.0])],
                &[(0, 1)],
            )
            .unwrap();
        let applied = fire(&ctx, &mut state, "bind");
        assert_eq!(state.n_topologies(), 0);
        assert_eq!(state.topology_of(applied.inserted[0]), None);
        assert_eq!(state.store().n_active(), 1);
    }

    #[test]
    fn test_fission_frees_second_product() {
        let mut ctx = context();
        ctx.add_reaction("split: A -> A +(1) B", 1.0).unwrap();
        let mut state = StateModel::new();
        let id = state
            .add_topology(
                0,
                &[Placement::new(2, [0.0; 3]), Placement::new(0, [1.0, 0.0, 0.0])],
                &[(0, 1)],
            )
            .unwrap();
        let applied = fire(&ctx, &mut state, "split");
        assert_eq!(applied.inserted.len(), 2);
        assert_eq!(state.topology_of(applied.inserted[0]), Some(id));
        assert_eq!(state.topology_of(applied.inserted[1]), None);
        state.check_consistency().unwrap();
    }

    #[test]
    fn test_decay_splits_chain() {
        let mut ctx = context();
        ctx.add_reaction("decay: C ->", 1.0).unwrap();
        let mut state = StateModel::new();
        state
            .add_topology(
                0,
                &[
                    Placement::new(0, [-2.0, 0.0, 0.0]),
                    Placement::new(0, [-1.0, 0.0, 0.0]),
                    Placement::new(2, [0.0, 0.0, 0.0]),
                    Placement::new(0, [1.0, 0.0, 0.0]),
                    Placement::new(0, [2.0, 0.0, 0.0]),
                ],
                &[(0, 1), (1, 2), (2, 3), (3, 4)],
            )
            .unwrap();
        fire(&ctx, &mut state, "decay");
        assert_eq!(state.n_topologies(), 2);
        state.check_consistency().unwrap();
    }

    #[test]
    fn test_enzymatic_links_product_to_topological_catalyst() {
        let mut ctx = context();
        ctx.add_reaction("enz: B +(1) C -> A + C", 1.0).unwrap();
        let mut state = StateModel::new();
        let id = state
            .add_topology(
                0,
                &[Placement::new(2, [0.0; 3]), Placement::new(0, [-1.0, 0.0, 0.0])],
                &[(0, 1)],
            )
            .unwrap();
        state.add_particle(Placement::new(1, [0.5, 0.0, 0.0]));
        let applied = fire(&ctx, &mut state, "enz");
        let new = applied.inserted[0];
        assert_eq!(state.store().entry(new).unwrap().type_id, 0);
        assert_eq!(state.topology_of(new), Some(id));
        assert_eq!(state.topology(id).unwrap().len(), 3);
        state.check_consistency().unwrap();
    }
}
