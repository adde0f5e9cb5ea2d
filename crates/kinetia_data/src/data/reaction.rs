use super::particle::ParticleTypeId;
use serde::{Deserialize, Serialize};

/// Index into the reaction registry.
pub type ReactionId = usize;

/// The five reaction kinds and their geometric parameters.
///
/// Two-educt kinds store their educts in a fixed order; events always present
/// educts in that order (`[catalyst, from]` for enzymatic reactions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReactionKind {
    Conversion {
        from: ParticleTypeId,
        to: ParticleTypeId,
    },
    Decay {
        educt: ParticleTypeId,
    },
    Fission {
        educt: ParticleTypeId,
        products: [ParticleTypeId; 2],
        product_distance: f64,
        weights: [f64; 2],
    },
    Fusion {
        educts: [ParticleTypeId; 2],
        product: ParticleTypeId,
        educt_distance: f64,
        weights: [f64; 2],
    },
    Enzymatic {
        catalyst: ParticleTypeId,
        from: ParticleTypeId,
        to: ParticleTypeId,
        educt_distance: f64,
    },
}

/// A registered reaction. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: ReactionId,
    pub name: String,
    pub rate: f64,
    pub kind: ReactionKind,
}

impl Reaction {
    /// Number of educts consumed or inspected by one firing.
    pub fn order(&self) -> usize {
        match self.kind {
            ReactionKind::Conversion { .. }
            | ReactionKind::Decay { .. }
            | ReactionKind::Fission { .. } => 1,
            ReactionKind::Fusion { .. } | ReactionKind::Enzymatic { .. } => 2,
        }
    }

    pub fn educt_types(&self) -> Vec<ParticleTypeId> {
        match &self.kind {
            ReactionKind::Conversion { from, .. } => vec![*from],
            ReactionKind::Decay { educt } => vec![*educt],
            ReactionKind::Fission { educt, .. } => vec![*educt],
            ReactionKind::Fusion { educts, .. } => educts.to_vec(),
            ReactionKind::Enzymatic { catalyst, from, .. } => vec![*catalyst, *from],
        }
    }

    pub fn product_types(&self) -> Vec<ParticleTypeId> {
        match &self.kind {
            ReactionKind::Conversion { to, .. } => vec![*to],
            ReactionKind::Decay { .. } => Vec::new(),
            ReactionKind::Fission { products, .. } => products.to_vec(),
            ReactionKind::Fusion { product, .. } => vec![*product],
            ReactionKind::Enzymatic { catalyst, to, .. } => vec![*catalyst, *to],
        }
    }

    /// Maximum educt separation for order-2 reactions, zero otherwise.
    pub fn educt_distance(&self) -> f64 {
        match self.kind {
            ReactionKind::Fusion { educt_distance, .. }
            | ReactionKind::Enzymatic { educt_distance, .. } => educt_distance,
            _ => 0.0,
        }
    }
}
