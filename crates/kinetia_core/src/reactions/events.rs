use crate::context::Context;
use crate::reactions::perform::Educts;
use crate::store::ParticleStore;
use crate::state::StateModel;
use kinetia_data::{ParticleId, Placement, ReactionId, Vec3};

/// One candidate (or committed) reaction firing.
///
/// Educts are recorded in the reaction's own educt order together with the ids
/// they had when the event was gathered, so later staleness can be detected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionEvent {
    pub reaction: ReactionId,
    pub n_educts: usize,
    pub indices: [usize; 2],
    pub ids: [ParticleId; 2],
    pub educts: [Placement; 2],
    /// From the first educt to the second (minimum image).
    pub displacement: Vec3,
    pub propensity: f64,
    pub accepted: bool,
}

impl ReactionEvent {
    pub fn involves(&self, index: usize) -> bool {
        self.indices[..self.n_educts].contains(&index)
    }

    pub fn educts(&self) -> Educts {
        if self.n_educts == 1 {
            Educts::One(self.educts[0])
        } else {
            Educts::Two {
                first: self.educts[0],
                second: self.educts[1],
                displacement: self.displacement,
            }
        }
    }
}

/// Order-1 events of one particle.
pub fn single_events(ctx: &Context, store: &ParticleStore, index: usize, out: &mut Vec<ReactionEvent>) {
    let Ok(entry) = store.entry(index) else {
        return;
    };
    for &rid in ctx.reactions.order1_for(entry.type_id) {
        let Ok(reaction) = ctx.reactions.get(rid) else {
            continue;
        };
        if reaction.rate <= 0.0 {
            continue;
        }
        let placement = Placement::new(entry.type_id, entry.pos);
        out.push(ReactionEvent {
            reaction: rid,
            n_educts: 1,
            indices: [index, index],
            ids: [entry.id, entry.id],
            educts: [placement, placement],
            displacement: Vec3::ZERO,
            propensity: reaction.rate,
            accepted: false,
        });
    }
}

/// Order-2 events of the pair `(i, j)`; `d` points from `i` to `j`.
pub fn pair_events(
    ctx: &Context,
    store: &ParticleStore,
    i: usize,
    j: usize,
    d: Vec3,
    out: &mut Vec<ReactionEvent>,
) {
    let (Ok(ei), Ok(ej)) = (store.entry(i), store.entry(j)) else {
        return;
    };
    let r2 = d.norm_squared();
    for &rid in ctx.reactions.order2_for(ei.type_id, ej.type_id) {
        let Ok(reaction) = ctx.reactions.get(rid) else {
            continue;
        };
        let reach = reaction.educt_distance();
        if reaction.rate <= 0.0 || r2 >= reach * reach {
            continue;
        }
        let first_type = reaction.educt_types()[0];
        let (a, b, ea, eb, disp) = if ei.type_id == first_type {
            (i, j, ei, ej, d)
        } else {
            (j, i, ej, ei, -d)
        };
        out.push(ReactionEvent {
            reaction: rid,
            n_educts: 2,
            indices: [a, b],
            ids: [ea.id, eb.id],
            educts: [
                Placement::new(ea.type_id, ea.pos),
                Placement::new(eb.type_id, eb.pos),
            ],
            displacement: disp,
            propensity: reaction.rate,
            accepted: false,
        });
    }
}

/// Every reaction instance: order-1 per active particle, order-2 per neighbor pair
/// within the reaction's educt distance. Requires a fresh neighbor list.
pub fn gather_events(ctx: &Context, state: &StateModel) -> Vec<ReactionEvent> {
    let store = state.store();
    let mut events = Vec::new();
    for (i, _) in store.iter_active() {
        single_events(ctx, store, i, &mut events);
    }
    if ctx.reactions.has_order2() {
        for pair in state.neighbor_list().pairs() {
            pair_events(ctx, store, pair.i, pair.j, pair.displacement, &mut events);
        }
    }
    events
}
