//! Exact event scheduling.
//!
//! Events live in an [`EventPool`]: a slot vector mirrored by a [`PropensityTree`]
//! plus a particle-to-slot index. After each firing only the events of removed and
//! inserted particles are touched, so a step costs O(k log n) for k firings.

use crate::context::Context;
use crate::error::{Result, SimError};
use crate::reactions::apply::{apply_event, Staleness};
use crate::reactions::events::{gather_events, pair_events, single_events, ReactionEvent};
use crate::reactions::perform::ReactionLogic;
use crate::reactions::propensity::PropensityTree;
use crate::reactions::{trace_phase, ReactionReport, SchedulerPhase, SchedulerPolicy};
use crate::state::StateModel;
use crate::store::ParticleStore;
use kinetia_data::ParticleId;
use rand::Rng;
use rand_distr::{Distribution, Exp};
use std::collections::HashMap;

const POLICY: SchedulerPolicy = SchedulerPolicy::Gillespie;

#[derive(Debug, Default)]
pub struct EventPool {
    events: Vec<Option<ReactionEvent>>,
    tree: PropensityTree,
    by_particle: HashMap<usize, Vec<usize>>,
    free: Vec<usize>,
}

impl EventPool {
    pub fn new(events: Vec<ReactionEvent>) -> Self {
        let values: Vec<f64> = events.iter().map(|e| e.propensity).collect();
        let mut by_particle: HashMap<usize, Vec<usize>> = HashMap::new();
        for (slot, e) in events.iter().enumerate() {
            for &p in unique_indices(e) {
                by_particle.entry(p).or_default().push(slot);
            }
        }
        Self {
            events: events.into_iter().map(Some).collect(),
            tree: PropensityTree::from_values(&values),
            by_particle,
            free: Vec::new(),
        }
    }

    pub fn total(&self) -> f64 {
        self.tree.total()
    }

    pub fn len(&self) -> usize {
        self.events.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, event: ReactionEvent) {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.events[slot] = Some(event);
                slot
            }
            None => {
                self.events.push(Some(event));
                self.events.len() - 1
            }
        };
        self.tree.set(slot, event.propensity);
        for &p in unique_indices(&event) {
            self.by_particle.entry(p).or_default().push(slot);
        }
    }

    /// Removes and returns the event whose cumulative propensity range holds `target`.
    pub fn take(&mut self, target: f64) -> Result<ReactionEvent> {
        let slot = self.tree.find(target);
        let event = self
            .events
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or_else(|| SimError::config(format!("propensity slot {slot} is empty")))?;
        self.release(slot);
        Ok(event)
    }

    /// Drops every event that involves `index`.
    pub fn remove_involving(&mut self, index: usize) {
        let Some(slots) = self.by_particle.remove(&index) else {
            return;
        };
        for slot in slots {
            if self.events[slot].is_some_and(|e| e.involves(index)) {
                self.events[slot] = None;
                self.release(slot);
            }
        }
    }

    fn release(&mut self, slot: usize) {
        self.tree.set(slot, 0.0);
        self.free.push(slot);
    }
}

fn unique_indices(e: &ReactionEvent) -> &[usize] {
    if e.n_educts == 2 && e.indices[0] != e.indices[1] {
        &e.indices[..2]
    } else {
        &e.indices[..1]
    }
}

/// Identities of the particles the neighbor list was built over. Reactions never
/// move surviving particles, so an indexed label whose id still matches may be
/// paired using its indexed position.
pub(crate) fn indexed_ids(store: &ParticleStore) -> Vec<Option<ParticleId>> {
    store
        .entries()
        .iter()
        .map(|e| (!e.deactivated).then_some(e.id))
        .collect()
}

/// Order-1 and order-2 events of a freshly inserted particle. Partners come from the
/// neighbor list (if still the indexed particle) and from `fresh`, the particles
/// inserted earlier in this pass.
pub(crate) fn events_of_new_particle(
    ctx: &Context,
    state: &StateModel,
    indexed: &[Option<ParticleId>],
    fresh: &[(usize, ParticleId)],
    index: usize,
    out: &mut Vec<ReactionEvent>,
) -> Result<()> {
    let store = state.store();
    single_events(ctx, store, index, out);
    if !ctx.reactions.has_order2() {
        return Ok(());
    }
    let entry = store.entry(index)?;
    let (pos, id) = (entry.pos, entry.id);
    let radius = ctx.reactions.max_educt_distance();
    let still_indexed = |label: usize| {
        label != index
            && store
                .entry(label)
                .is_ok_and(|e| Some(e.id) == indexed.get(label).copied().flatten())
    };
    state
        .neighbor_list()
        .for_each_near(&pos, radius, |label, d, _| {
            if still_indexed(label) {
                pair_events(ctx, store, index, label, d, out);
            }
        });
    for &(other, other_id) in fresh {
        if other == index || other_id == id {
            continue;
        }
        let Ok(e) = store.entry(other) else { continue };
        if e.id != other_id {
            continue;
        }
        let d = ctx.shortest_difference(&pos, &e.pos);
        if d.norm_squared() < radius * radius {
            pair_events(ctx, store, index, other, d, out);
        }
    }
    Ok(())
}

/// Samples waiting times `τ ~ Exp(Λ)` and fires one event at a time until the
/// step is used up. Requires a fresh neighbor list.
pub fn react<R: Rng + ?Sized>(
    ctx: &Context,
    state: &mut StateModel,
    dt: f64,
    rng: &mut R,
) -> Result<ReactionReport> {
    trace_phase(POLICY, SchedulerPhase::Idle, 0);
    let indexed = indexed_ids(state.store());
    let mut pool = EventPool::new(gather_events(ctx, state));
    trace_phase(POLICY, SchedulerPhase::CandidatesGathered, pool.len());

    let mut fresh: Vec<(usize, ParticleId)> = Vec::new();
    let mut report = ReactionReport::default();
    let mut t = 0.0;
    loop {
        let total = pool.total();
        // Λ ≈ 0: no further event this step
        if total.is_nan() || total <= f64::EPSILON {
            break;
        }
        let tau = Exp::new(total)
            .map_err(|e| SimError::config(format!("propensity {total}: {e}")))?
            .sample(rng);
        if t + tau > dt {
            break;
        }
        t += tau;

        let mut event = pool.take(rng.gen::<f64>() * total)?;
        event.accepted = true;
        let products = ctx.reactions.get(event.reaction)?.perform(&event.educts(), rng)?;
        let applied = apply_event(ctx, state, &event, products, Staleness::Reject)?;
        report.proposed += 1;
        report.accepted += 1;

        for &r in &applied.removed {
            pool.remove_involving(r);
        }
        let mut added = Vec::new();
        for &new in &applied.inserted {
            events_of_new_particle(ctx, state, &indexed, &fresh, new, &mut added)?;
            fresh.push((new, state.store().entry(new)?.id));
        }
        for e in added {
            pool.push(e);
        }
    }
    trace_phase(POLICY, SchedulerPhase::EventsResolved, report.accepted);
    trace_phase(POLICY, SchedulerPhase::Applied, report.accepted);
    Ok(report)
}
