//! Textual reaction descriptors.
//!
//! `label: LHS -> RHS`, where the reaction kind follows from the shape:
//!
//! - `conv: A -> B` conversion
//! - `decay: A ->` decay
//! - `split: C -> A +(5) B` fission with product distance 5
//! - `bind: A +(5) B -> C` fusion with educt distance 5
//! - `enz: A +(2) C -> B + C` enzymatic, `C` is the catalyst (repeated on both sides)

use crate::error::{Result, SimError};

#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorShape {
    Conversion {
        from: String,
        to: String,
    },
    Decay {
        educt: String,
    },
    Fission {
        educt: String,
        products: [String; 2],
        product_distance: f64,
    },
    Fusion {
        educts: [String; 2],
        product: String,
        educt_distance: f64,
    },
    Enzymatic {
        catalyst: String,
        from: String,
        to: String,
        educt_distance: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionDescriptor {
    pub name: String,
    pub shape: DescriptorShape,
}

#[derive(Debug, PartialEq)]
enum Side {
    Empty,
    One(String),
    Spaced(String, f64, String),
    Plain(String, String),
}

fn bad(text: &str, why: &str) -> SimError {
    SimError::config(format!("cannot parse reaction \"{text}\": {why}"))
}

fn species(text: &str, raw: &str) -> Result<String> {
    let name = raw.trim();
    let reserved = |c: char| c.is_whitespace() || matches!(c, '+' | '(' | ')');
    if name.is_empty() || name.contains(reserved) {
        return Err(bad(text, &format!("invalid species \"{name}\"")));
    }
    Ok(name.to_string())
}

fn parse_side(text: &str, side: &str) -> Result<Side> {
    let side = side.trim();
    if side.is_empty() {
        return Ok(Side::Empty);
    }
    if let Some(at) = side.find("+(") {
        let rest = &side[at + 2..];
        let close = rest.find(')').ok_or_else(|| bad(text, "unclosed distance"))?;
        let distance: f64 = rest[..close]
            .trim()
            .parse()
            .map_err(|_| bad(text, "distance is not a number"))?;
        return Ok(Side::Spaced(
            species(text, &side[..at])?,
            distance,
            species(text, &rest[close + 1..])?,
        ));
    }
    match side.split_once('+') {
        Some((a, b)) => Ok(Side::Plain(species(text, a)?, species(text, b)?)),
        None => Ok(Side::One(species(text, side)?)),
    }
}

pub fn parse_descriptor(text: &str) -> Result<ReactionDescriptor> {
    let (name, body) = text
        .split_once(':')
        .ok_or_else(|| bad(text, "missing \"label:\" prefix"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(bad(text, "empty label"));
    }
    let (lhs, rhs) = body
        .split_once("->")
        .ok_or_else(|| bad(text, "missing \"->\""))?;
    let shape = match (parse_side(text, lhs)?, parse_side(text, rhs)?) {
        (Side::One(educt), Side::Empty) => DescriptorShape::Decay { educt },
        (Side::One(from), Side::One(to)) => DescriptorShape::Conversion { from, to },
        (Side::One(educt), Side::Spaced(a, d, b)) => DescriptorShape::Fission {
            educt,
            products: [a, b],
            product_distance: d,
        },
        (Side::Spaced(a, d, b), Side::One(product)) => DescriptorShape::Fusion {
            educts: [a, b],
            product,
            educt_distance: d,
        },
        (Side::Spaced(a, d, b), Side::Plain(x, y)) => {
            if b == y {
                DescriptorShape::Enzymatic {
                    catalyst: b,
                    from: a,
                    to: x,
                    educt_distance: d,
                }
            } else if a == x {
                DescriptorShape::Enzymatic {
                    catalyst: a,
                    from: b,
                    to: y,
                    educt_distance: d,
                }
            } else {
                return Err(bad(text, "enzymatic reaction needs the catalyst on both sides"));
            }
        }
        _ => return Err(bad(text, "unsupported reaction shape")),
    };
    Ok(ReactionDescriptor {
        name: name.to_string(),
        shape,
    })
}
