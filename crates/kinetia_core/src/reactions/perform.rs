use crate::error::{Result, SimError};
use kinetia_data::{Placement, Reaction, ReactionKind, Vec3};
use rand::Rng;
use rand_distr::StandardNormal;

/// Inputs of one firing. For two educts the displacement points from the first to
/// the second (minimum image) and the educts follow the reaction's educt order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Educts {
    One(Placement),
    Two {
        first: Placement,
        second: Placement,
        displacement: Vec3,
    },
}

/// Outputs of one firing. Positions are not wrapped into the box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Products {
    None,
    One(Placement),
    Two([Placement; 2]),
}

impl Products {
    pub fn len(&self) -> usize {
        match self {
            Products::None => 0,
            Products::One(_) => 1,
            Products::Two(_) => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Products::None)
    }
}

/// Geometric transformation performed by a reaction.
///
/// Implementations depend only on the educts and the random stream handed in, so a
/// fixed seed replays the same products.
pub trait ReactionLogic {
    fn perform<R: Rng + ?Sized>(&self, educts: &Educts, rng: &mut R) -> Result<Products>;
}

/// Uniformly distributed unit vector from one 3D normal draw.
pub fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.sample(StandardNormal),
            rng.sample(StandardNormal),
            rng.sample(StandardNormal),
        );
        let n = v.norm();
        if n > 1e-12 {
            return v / n;
        }
    }
}

impl ReactionLogic for Reaction {
    fn perform<R: Rng + ?Sized>(&self, educts: &Educts, rng: &mut R) -> Result<Products> {
        match (&self.kind, educts) {
            (ReactionKind::Conversion { to, .. }, Educts::One(e)) => {
                Ok(Products::One(Placement::new(*to, e.pos)))
            }
            (ReactionKind::Decay { .. }, Educts::One(_)) => Ok(Products::None),
            (
                ReactionKind::Fission {
                    products,
                    product_distance,
                    weights,
                    ..
                },
                Educts::One(e),
            ) => {
                let n = random_direction(rng) * *product_distance;
                Ok(Products::Two([
                    Placement::new(products[0], e.pos + n * weights[1]),
                    Placement::new(products[1], e.pos - n * weights[0]),
                ]))
            }
            (
                ReactionKind::Fusion {
                    product, weights, ..
                },
                Educts::Two {
                    first, displacement, ..
                },
            ) => Ok(Products::One(Placement::new(
                *product,
                first.pos + *displacement * weights[1],
            ))),
            (
                ReactionKind::Enzymatic {
                    to, educt_distance, ..
                },
                Educts::Two {
                    first,
                    second,
                    displacement,
                },
            ) => {
                if displacement.norm_squared() > educt_distance * educt_distance {
                    return Ok(Products::Two([*first, *second]));
                }
                Ok(Products::Two([*first, Placement::new(*to, second.pos)]))
            }
            _ => Err(SimError::config(format!(
                "reaction {} expects {} educt(s)",
                self.name,
                self.order()
            ))),
        }
    }
}
