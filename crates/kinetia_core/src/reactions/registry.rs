use crate::error::{Result, SimError};
use kinetia_data::{ParticleTypeId, Reaction, ReactionId, ReactionKind};
use std::collections::HashMap;

type P = ParticleTypeId;

fn pair_key(a: P, b: P) -> (P, P) {
    (a.min(b), a.max(b))
}

fn check_weights(name: &str, weights: &[f64; 2]) -> Result<()> {
    let in_range = weights.iter().all(|w| (0.0..=1.0).contains(w));
    if !in_range || (weights[0] + weights[1] - 1.0).abs() > 1e-9 {
        return Err(SimError::config(format!(
            "reaction {name}: weights {weights:?} must lie in [0, 1] and sum to 1"
        )));
    }
    Ok(())
}

fn check_distance(name: &str, what: &str, d: f64, strictly_positive: bool) -> Result<()> {
    let ok = d.is_finite() && if strictly_positive { d > 0.0 } else { d >= 0.0 };
    if !ok {
        return Err(SimError::config(format!("reaction {name}: invalid {what} {d}")));
    }
    Ok(())
}

/// All reactions, indexed by name, by educt type and by educt type pair.
#[derive(Debug, Clone, Default)]
pub struct ReactionRegistry {
    reactions: Vec<Reaction>,
    by_name: HashMap<String, ReactionId>,
    order1: HashMap<P, Vec<ReactionId>>,
    order2: HashMap<(P, P), Vec<ReactionId>>,
}

impl ReactionRegistry {
    /// Validates and registers a reaction. Particle type ids are checked by the caller.
    pub fn register(&mut self, name: &str, rate: f64, kind: ReactionKind) -> Result<ReactionId> {
        if rate.is_nan() || rate < 0.0 {
            return Err(SimError::NegativeRate {
                name: name.to_string(),
                rate,
            });
        }
        if name.is_empty() {
            return Err(SimError::config("reaction name must not be empty"));
        }
        if self.by_name.contains_key(name) {
            return Err(SimError::config(format!("reaction {name} registered twice")));
        }
        match &kind {
            ReactionKind::Fission {
                product_distance,
                weights,
                ..
            } => {
                check_distance(name, "product distance", *product_distance, false)?;
                check_weights(name, weights)?;
            }
            ReactionKind::Fusion {
                educt_distance,
                weights,
                ..
            } => {
                check_distance(name, "educt distance", *educt_distance, true)?;
                check_weights(name, weights)?;
            }
            ReactionKind::Enzymatic { educt_distance, .. } => {
                check_distance(name, "educt distance", *educt_distance, true)?;
            }
            ReactionKind::Conversion { .. } | ReactionKind::Decay { .. } => {}
        }

        let id = self.reactions.len();
        let reaction = Reaction {
            id,
            name: name.to_string(),
            rate,
            kind,
        };
        match reaction.educt_types().as_slice() {
            [t] => self.order1.entry(*t).or_default().push(id),
            [a, b] => self.order2.entry(pair_key(*a, *b)).or_default().push(id),
            _ => {}
        }
        self.by_name.insert(reaction.name.clone(), id);
        self.reactions.push(reaction);
        Ok(id)
    }

    pub fn get(&self, id: ReactionId) -> Result<&Reaction> {
        self.reactions
            .get(id)
            .ok_or_else(|| SimError::UnknownReaction(format!("#{id}")))
    }

    pub fn by_name(&self, name: &str) -> Result<&Reaction> {
        self.by_name
            .get(name)
            .map(|&id| &self.reactions[id])
            .ok_or_else(|| SimError::UnknownReaction(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reaction> {
        self.reactions.iter()
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    pub fn order1_for(&self, type_id: P) -> &[ReactionId] {
        self.order1.get(&type_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Order-2 reactions whose educt pair is `{a, b}` in either order.
    pub fn order2_for(&self, a: P, b: P) -> &[ReactionId] {
        self.order2.get(&pair_key(a, b)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_order2(&self) -> bool {
        !self.order2.is_empty()
    }

    pub fn max_educt_distance(&self) -> f64 {
        self.reactions
            .iter()
            .map(Reaction::educt_distance)
            .fold(0.0, f64::max)
    }
}
