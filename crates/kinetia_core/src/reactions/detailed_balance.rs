//! Reversible reaction pairs scheduled so that their stationary distribution
//! satisfies detailed balance.
//!
//! Every proposal is a Metropolis move layered on top of the kinetic proposal
//! rate. Moves whose products are deterministic (fusion, conversion, enzymatic)
//! have their acceptance evaluated up front and enter the event pool thinned, with
//! weight `rate * acceptance`. Fission trials are random: they are proposed with
//! their full rate and accepted or rejected when they fire, consuming their time
//! slice either way.

use crate::context::Context;
use crate::error::{Result, SimError};
use crate::execution::Execution;
use crate::potentials::{effective_volume, sphere_volume};
use crate::reactions::apply::{apply_event, Staleness};
use crate::reactions::events::{gather_events, ReactionEvent};
use crate::reactions::perform::{random_direction, ReactionLogic, Products};
use crate::reactions::propensity::PropensityTree;
use crate::reactions::{trace_phase, ReactionReport, SchedulerPhase, SchedulerPolicy};
use crate::state::StateModel;
use kinetia_data::{ParticleTypeId, Placement, Reaction, ReactionId, ReactionKind, Vec3};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use std::collections::HashMap;

const POLICY: SchedulerPolicy = SchedulerPolicy::DetailedBalance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversibleKind {
    /// `A + B -> C` forward, `C -> A + B` backward.
    FusionFission,
    /// `A -> B` forward, `B -> A` backward.
    ConversionConversion,
    /// `C + A -> C + B` forward, `C + B -> C + A` backward.
    EnzymaticEnzymatic,
}

/// Precomputed constants of one reversible pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ReversibleReactionConfig {
    pub kind: ReversibleKind,
    pub forward: ReactionId,
    pub backward: ReactionId,
    pub lhs_types: Vec<ParticleTypeId>,
    pub rhs_types: Vec<ParticleTypeId>,
    pub kbt: f64,
    pub reaction_radius: f64,
    pub total_volume: f64,
    pub lhs_interaction_radius: f64,
    pub lhs_interaction_volume: f64,
    pub effective_lhs_interaction_volume: f64,
    pub effective_lhs_reaction_volume: f64,
    pub equilibrium_constant: f64,
    pub macro_backward_rate: f64,
    pub macro_forward_rate: f64,
    /// Fusion weights in lhs order; fission trials reuse them.
    pub weights: [f64; 2],
}

fn unsatisfiable(forward: &Reaction, backward: &Reaction, why: &str) -> SimError {
    SimError::unsatisfiable(format!("{} / {}: {why}", forward.name, backward.name))
}

fn same_pair(a: [ParticleTypeId; 2], b: [ParticleTypeId; 2]) -> bool {
    a == b || a == [b[1], b[0]]
}

impl ReversibleReactionConfig {
    /// Pairs `forward` with `backward`. Fails if the two reactions are not each
    /// other's reverse, or if their geometry cannot be balanced.
    pub fn new(ctx: &Context, forward: ReactionId, backward: ReactionId) -> Result<Self> {
        let f = ctx.reactions.get(forward)?;
        let b = ctx.reactions.get(backward)?;
        let total_volume = ctx.geometry.volume();
        let base = |kind: ReversibleKind, lhs_types: Vec<ParticleTypeId>, rhs_types: Vec<ParticleTypeId>| Self {
            kind,
            forward,
            backward,
            lhs_types,
            rhs_types,
            kbt: ctx.kbt,
            reaction_radius: 0.0,
            total_volume,
            lhs_interaction_radius: 0.0,
            lhs_interaction_volume: 0.0,
            effective_lhs_interaction_volume: 0.0,
            effective_lhs_reaction_volume: 0.0,
            equilibrium_constant: 0.0,
            macro_backward_rate: b.rate,
            macro_forward_rate: 0.0,
            weights: [0.5, 0.5],
        };
        if !(f.rate > 0.0 && b.rate > 0.0) {
            return Err(unsatisfiable(f, b, "both rates must be positive"));
        }

        let mut config = match (&f.kind, &b.kind) {
            (
                ReactionKind::Fusion {
                    educts,
                    product,
                    educt_distance,
                    weights,
                },
                ReactionKind::Fission {
                    educt,
                    products,
                    product_distance,
                    weights: fission_weights,
                },
            ) => {
                if educt != product || !same_pair(*educts, *products) {
                    return Err(unsatisfiable(f, b, "species do not match"));
                }
                if product_distance > educt_distance {
                    return Err(unsatisfiable(f, b, "fission distance exceeds the fusion radius"));
                }
                let expected = if *products == *educts {
                    *weights
                } else {
                    [weights[1], weights[0]]
                };
                if (expected[0] - fission_weights[0]).abs() > 1e-9 {
                    return Err(unsatisfiable(f, b, "weights differ"));
                }
                let radius = *educt_distance;
                if radius <= 0.0 {
                    return Err(SimError::config(format!("{}: zero reaction volume", f.name)));
                }
                let [a, c] = *educts;
                let interaction_radius = ctx
                    .potentials
                    .pair_for(a, c)
                    .iter()
                    .map(|p| p.cutoff())
                    .fold(0.0, f64::max);
                let interaction_volume = sphere_volume(interaction_radius);
                let effective_interaction =
                    effective_volume(&ctx.potentials, a, c, interaction_radius, ctx.kbt);
                let effective_reaction = if interaction_radius < radius {
                    effective_interaction + sphere_volume(radius) - interaction_volume
                } else {
                    effective_volume(&ctx.potentials, a, c, radius, ctx.kbt)
                };
                if effective_reaction <= 0.0 {
                    return Err(SimError::config(format!("{}: zero reaction volume", f.name)));
                }
                // accessible volume of an unbound pair
                let effective_total = total_volume - interaction_volume + effective_interaction;
                let k = b.rate * effective_total / (f.rate * effective_reaction);
                Self {
                    reaction_radius: radius,
                    lhs_interaction_radius: interaction_radius,
                    lhs_interaction_volume: interaction_volume,
                    effective_lhs_interaction_volume: effective_interaction,
                    effective_lhs_reaction_volume: effective_reaction,
                    equilibrium_constant: k,
                    weights: *weights,
                    ..base(ReversibleKind::FusionFission, educts.to_vec(), vec![*product])
                }
            }
            (ReactionKind::Conversion { from, to }, ReactionKind::Conversion { from: bf, to: bt }) => {
                if from != bt || to != bf {
                    return Err(unsatisfiable(f, b, "species do not match"));
                }
                Self {
                    equilibrium_constant: b.rate / f.rate,
                    ..base(ReversibleKind::ConversionConversion, vec![*from], vec![*to])
                }
            }
            (
                ReactionKind::Enzymatic {
                    catalyst,
                    from,
                    to,
                    educt_distance,
                },
                ReactionKind::Enzymatic {
                    catalyst: bc,
                    from: bf,
                    to: bt,
                    educt_distance: bd,
                },
            ) => {
                if catalyst != bc || from != bt || to != bf {
                    return Err(unsatisfiable(f, b, "species or catalyst do not match"));
                }
                if (educt_distance - bd).abs() > 1e-12 {
                    return Err(unsatisfiable(f, b, "catalytic radii differ"));
                }
                Self {
                    reaction_radius: *educt_distance,
                    equilibrium_constant: b.rate / f.rate,
                    ..base(
                        ReversibleKind::EnzymaticEnzymatic,
                        vec![*catalyst, *from],
                        vec![*catalyst, *to],
                    )
                }
            }
            _ => return Err(unsatisfiable(f, b, "not a reversible pair")),
        };
        config.macro_forward_rate = match config.kind {
            ReversibleKind::FusionFission => {
                config.macro_backward_rate / config.equilibrium_constant * config.total_volume
            }
            _ => config.macro_backward_rate / config.equilibrium_constant,
        };
        Ok(config)
    }

    /// Metropolis prefactor of the forward move; the backward move uses its inverse.
    pub fn acceptance_prefactor(&self) -> f64 {
        match self.kind {
            ReversibleKind::FusionFission => {
                self.effective_lhs_reaction_volume / sphere_volume(self.reaction_radius)
            }
            _ => 1.0,
        }
    }
}

/// Finds the reversible counterpart of `reaction`, if the registry contains one.
fn reverse_of(ctx: &Context, reaction: &Reaction) -> Option<ReactionId> {
    let mirrored = |other: &Reaction| match (&reaction.kind, &other.kind) {
        (
            ReactionKind::Fusion { educts, product, .. },
            ReactionKind::Fission { educt, products, .. },
        ) => product == educt && same_pair(*educts, *products),
        (ReactionKind::Conversion { from, to }, ReactionKind::Conversion { from: of, to: ot }) => {
            from == ot && to == of
        }
        (
            ReactionKind::Enzymatic { catalyst, from, to, .. },
            ReactionKind::Enzymatic {
                catalyst: oc,
                from: of,
                to: ot,
                ..
            },
        ) => catalyst == oc && from == ot && to == of,
        _ => false,
    };
    ctx.reactions
        .iter()
        .find(|other| other.id != reaction.id && mirrored(other))
        .map(|other| other.id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

enum Plan {
    /// Not part of a reversible pair: always accepted.
    Direct,
    /// Deterministic products with acceptance already folded into the weight.
    Cached(Products),
    /// Random fission trial, accepted when it fires.
    FissionTrial(usize),
}

struct Candidate {
    event: ReactionEvent,
    plan: Plan,
}

/// Scheduler state: the reversible pairs found in the registry.
#[derive(Debug, Clone, Default)]
pub struct DetailedBalance {
    configs: Vec<ReversibleReactionConfig>,
    by_reaction: HashMap<ReactionId, (usize, Direction)>,
}

impl DetailedBalance {
    /// Discovers reversible pairs. Fusion, conversion and the lower enzymatic id are
    /// taken as the forward direction.
    pub fn new(ctx: &Context) -> Result<Self> {
        let mut balance = Self::default();
        for reaction in ctx.reactions.iter() {
            if balance.by_reaction.contains_key(&reaction.id) {
                continue;
            }
            let forward_kind = matches!(
                reaction.kind,
                ReactionKind::Fusion { .. } | ReactionKind::Conversion { .. } | ReactionKind::Enzymatic { .. }
            );
            if !forward_kind {
                continue;
            }
            let Some(backward) = reverse_of(ctx, reaction) else {
                continue;
            };
            if balance.by_reaction.contains_key(&backward) {
                continue;
            }
            let config = ReversibleReactionConfig::new(ctx, reaction.id, backward)?;
            tracing::info!(
                forward = %reaction.name,
                backward = backward,
                kind = ?config.kind,
                equilibrium_constant = config.equilibrium_constant,
                macro_forward_rate = config.macro_forward_rate,
                "Reversible reaction pair"
            );
            let index = balance.configs.len();
            balance.by_reaction.insert(reaction.id, (index, Direction::Forward));
            balance.by_reaction.insert(backward, (index, Direction::Backward));
            balance.configs.push(config);
        }
        Ok(balance)
    }

    pub fn configs(&self) -> &[ReversibleReactionConfig] {
        &self.configs
    }

    pub fn config_for(&self, reaction: ReactionId) -> Option<&ReversibleReactionConfig> {
        self.by_reaction.get(&reaction).map(|&(i, _)| &self.configs[i])
    }

    /// Runs reactions for one time step. Requires a fresh neighbor list; the list is
    /// rebuilt after every accepted event.
    pub fn react<R: Rng + ?Sized>(
        &self,
        ctx: &Context,
        state: &mut StateModel,
        dt: f64,
        rng: &mut R,
    ) -> Result<ReactionReport> {
        trace_phase(POLICY, SchedulerPhase::Idle, 0);
        let mut report = ReactionReport::default();
        let mut t = 0.0;
        let mut candidates = self.candidates(ctx, state, rng)?;
        let mut tree = PropensityTree::from_values(&candidates.iter().map(|c| c.1).collect::<Vec<_>>());
        trace_phase(POLICY, SchedulerPhase::CandidatesGathered, candidates.len());

        loop {
            let total = tree.total();
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

            let slot = tree.find(rng.gen::<f64>() * total);
            let Some((candidate, _)) = candidates.get(slot) else {
                break;
            };
            report.proposed += 1;
            let event = candidate.event;
            let products = match &candidate.plan {
                Plan::Direct => ctx.reactions.get(event.reaction)?.perform(&event.educts(), rng)?,
                Plan::Cached(products) => *products,
                Plan::FissionTrial(index) => {
                    let config = &self.configs[*index];
                    let trial = fission_trial(ctx, config, &event, rng)?;
                    let a = self.acceptance(ctx, state, &event, &trial)?;
                    if rng.gen::<f64>() >= a {
                        tracing::trace!(reaction = event.reaction, acceptance = a, "Fission rejected");
                        continue;
                    }
                    trial
                }
            };
            let mut event = event;
            event.accepted = true;
            apply_event(ctx, state, &event, products, Staleness::Reject)?;
            report.accepted += 1;

            let (store, list) = state.store_and_neighbor_list();
            list.rebuild(store, &ctx.geometry, ctx.cutoff(), Execution::Serial);
            candidates = self.candidates(ctx, state, rng)?;
            tree = PropensityTree::from_values(&candidates.iter().map(|c| c.1).collect::<Vec<_>>());
        }
        trace_phase(POLICY, SchedulerPhase::EventsResolved, report.proposed);
        trace_phase(POLICY, SchedulerPhase::Applied, report.accepted);
        Ok(report)
    }

    fn candidates<R: Rng + ?Sized>(
        &self,
        ctx: &Context,
        state: &StateModel,
        rng: &mut R,
    ) -> Result<Vec<(Candidate, f64)>> {
        let mut out = Vec::new();
        for event in gather_events(ctx, state) {
            let Some(&(index, direction)) = self.by_reaction.get(&event.reaction) else {
                out.push((Candidate { event, plan: Plan::Direct }, event.propensity));
                continue;
            };
            let config = &self.configs[index];
            if config.kind == ReversibleKind::FusionFission && direction == Direction::Backward {
                out.push((
                    Candidate {
                        event,
                        plan: Plan::FissionTrial(index),
                    },
                    event.propensity,
                ));
                continue;
            }
            // fusion, conversion and enzymatic products do not draw from `rng`
            let products = ctx
                .reactions
                .get(event.reaction)?
                .perform(&event.educts(), rng)?;
            let a = self.acceptance(ctx, state, &event, &products)?;
            out.push((
                Candidate {
                    event,
                    plan: Plan::Cached(products),
                },
                event.propensity * a,
            ));
        }
        Ok(out)
    }

    /// `min(1, exp(-ΔE / kT) * prefactor)` for replacing the educts of `event` by
    /// `products`. ΔE covers external and pair potentials, bonded terms are left out.
    fn acceptance(
        &self,
        ctx: &Context,
        state: &StateModel,
        event: &ReactionEvent,
        products: &Products,
    ) -> Result<f64> {
        let Some(&(index, direction)) = self.by_reaction.get(&event.reaction) else {
            return Ok(1.0);
        };
        let config = &self.configs[index];
        let prefactor = match direction {
            Direction::Forward => config.acceptance_prefactor(),
            Direction::Backward => 1.0 / config.acceptance_prefactor(),
        };

        let educts: Vec<Placement> = event.educts[..event.n_educts].to_vec();
        let exclude = &event.indices[..event.n_educts];
        let placed: Vec<Placement> = match products {
            Products::None => Vec::new(),
            Products::One(p) => vec![*p],
            Products::Two(ps) => ps.to_vec(),
        }
        .into_iter()
        .map(|mut p| {
            ctx.fix_position(&mut p.pos);
            p
        })
        .collect();

        let before = group_energy(ctx, state, &educts, exclude);
        let after = group_energy(ctx, state, &placed, exclude);
        let delta = after - before;
        if !delta.is_finite() {
            return Ok(if delta < 0.0 { 1.0 } else { 0.0 });
        }
        Ok(((-delta / ctx.kbt).exp() * prefactor).min(1.0))
    }
}

/// External and pair energy of a particle group against its surroundings (without
/// the `exclude`d particles) plus the pair energy within the group.
fn group_energy(ctx: &Context, state: &StateModel, group: &[Placement], exclude: &[usize]) -> f64 {
    let store = state.store();
    let list = state.neighbor_list();
    let radius = ctx.potentials.max_cutoff();
    let mut energy = 0.0;
    for (k, p) in group.iter().enumerate() {
        energy += ctx.potentials.external_energy(p.type_id, &p.pos);
        if radius <= 0.0 {
            continue;
        }
        list.for_each_near(&p.pos, radius, |label, _, r2| {
            if exclude.contains(&label) {
                return;
            }
            if let Ok(e) = store.entry(label) {
                energy += ctx.potentials.pair_energy(p.type_id, e.type_id, r2);
            }
        });
        for q in &group[k + 1..] {
            let r2 = ctx.geometry.distance_squared(&p.pos, &q.pos);
            energy += ctx.potentials.pair_energy(p.type_id, q.type_id, r2);
        }
    }
    energy
}

/// Fission trial products: uniform in the ball of the reaction radius, centred so
/// that the fusion weights recover the educt position.
fn fission_trial<R: Rng + ?Sized>(
    ctx: &Context,
    config: &ReversibleReactionConfig,
    event: &ReactionEvent,
    rng: &mut R,
) -> Result<Products> {
    let reaction = ctx.reactions.get(event.reaction)?;
    let ReactionKind::Fission { products, .. } = reaction.kind else {
        return Err(SimError::config(format!("{} is not a fission", reaction.name)));
    };
    let x = event.educts[0].pos;
    let r = config.reaction_radius * rng.gen::<f64>().cbrt();
    let n: Vec3 = random_direction(rng) * r;
    let [wa, wb] = config.weights;
    let lhs = [config.lhs_types[0], config.lhs_types[1]];
    let pos_a = x + n * wb;
    let pos_b = x - n * wa;
    let placed = if products == lhs {
        [Placement::new(products[0], pos_a), Placement::new(products[1], pos_b)]
    } else {
        [Placement::new(products[0], pos_b), Placement::new(products[1], pos_a)]
    };
    Ok(Products::Two(placed))
}
