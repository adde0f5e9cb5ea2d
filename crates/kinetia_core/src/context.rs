//! Static description of a simulation: box, particle types, potentials,
//! topology parameters and reactions.
//!
//! Everything is registered up front and immutable while the simulation runs.
//! Name-based helpers resolve species names into registry ids.

use crate::error::{Result, SimError};
use crate::geometry::BoxGeometry;
use crate::potentials::{ExternalPotential, PairPotential, PotentialRegistry};
use crate::reactions::parser::{parse_descriptor, DescriptorShape};
use crate::reactions::ReactionRegistry;
use crate::topology::TopologyRegistry;
use kinetia_data::{
    AngleConfig, BondConfig, BoxPotential, DihedralConfig, HarmonicRepulsion, LennardJones,
    ParticleTypeId, ReactionId, ReactionKind, TopologyTypeId, Vec3,
};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleType {
    pub id: ParticleTypeId,
    pub name: String,
    pub diffusion_constant: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ParticleTypeRegistry {
    types: Vec<ParticleType>,
    by_name: HashMap<String, ParticleTypeId>,
}

impl ParticleTypeRegistry {
    pub fn add(&mut self, name: &str, diffusion_constant: f64, radius: f64) -> Result<ParticleTypeId> {
        if name.is_empty() || self.by_name.contains_key(name) {
            return Err(SimError::config(format!(
                "particle type \"{name}\" is empty or registered twice"
            )));
        }
        if !(diffusion_constant.is_finite() && diffusion_constant >= 0.0) {
            return Err(SimError::config(format!(
                "particle type {name}: diffusion constant must be non-negative"
            )));
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(SimError::config(format!("particle type {name}: radius must be positive")));
        }
        let id = ParticleTypeId::try_from(self.types.len())
            .map_err(|_| SimError::config("too many particle types"))?;
        self.types.push(ParticleType {
            id,
            name: name.to_string(),
            diffusion_constant,
            radius,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn id_of(&self, name: &str) -> Result<ParticleTypeId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownParticleType(name.to_string()))
    }

    pub fn get(&self, id: ParticleTypeId) -> Option<&ParticleType> {
        self.types.get(id as usize)
    }

    pub fn name(&self, id: ParticleTypeId) -> &str {
        self.get(id).map_or("?", |t| t.name.as_str())
    }

    pub fn diffusion_constant(&self, id: ParticleTypeId) -> f64 {
        self.get(id).map_or(0.0, |t| t.diffusion_constant)
    }

    pub fn contains(&self, id: ParticleTypeId) -> bool {
        (id as usize) < self.types.len()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticleType> {
        self.types.iter()
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    pub geometry: BoxGeometry,
    pub kbt: f64,
    pub particle_types: ParticleTypeRegistry,
    pub potentials: PotentialRegistry,
    pub topologies: TopologyRegistry,
    pub reactions: ReactionRegistry,
}

impl Context {
    pub fn new(geometry: BoxGeometry, kbt: f64) -> Result<Self> {
        if !(kbt.is_finite() && kbt > 0.0) {
            return Err(SimError::config(format!("kbt must be positive, got {kbt}")));
        }
        Ok(Self {
            geometry,
            kbt,
            particle_types: ParticleTypeRegistry::default(),
            potentials: PotentialRegistry::default(),
            topologies: TopologyRegistry::default(),
            reactions: ReactionRegistry::default(),
        })
    }

    #[inline]
    pub fn shortest_difference(&self, a: &Vec3, b: &Vec3) -> Vec3 {
        self.geometry.shortest_difference(a, b)
    }

    #[inline]
    pub fn fix_position(&self, pos: &mut Vec3) {
        self.geometry.fix_position(pos)
    }

    pub fn type_id(&self, name: &str) -> Result<ParticleTypeId> {
        self.particle_types.id_of(name)
    }

    pub fn add_particle_type(&mut self, name: &str, diffusion_constant: f64) -> Result<ParticleTypeId> {
        self.particle_types.add(name, diffusion_constant, 1.0)
    }

    pub fn add_particle_type_with_radius(
        &mut self,
        name: &str,
        diffusion_constant: f64,
        radius: f64,
    ) -> Result<ParticleTypeId> {
        self.particle_types.add(name, diffusion_constant, radius)
    }

    pub fn add_harmonic_repulsion(&mut self, a: &str, b: &str, force_constant: f64, distance: f64) -> Result<()> {
        let (a, b) = (self.type_id(a)?, self.type_id(b)?);
        self.potentials.add_pair(
            a,
            b,
            PairPotential::HarmonicRepulsion(HarmonicRepulsion {
                force_constant,
                interaction_distance: distance,
            }),
        )
    }

    pub fn add_lennard_jones(&mut self, a: &str, b: &str, epsilon: f64, sigma: f64, cutoff: f64) -> Result<()> {
        let (a, b) = (self.type_id(a)?, self.type_id(b)?);
        self.potentials.add_pair(
            a,
            b,
            PairPotential::LennardJones(LennardJones {
                epsilon,
                sigma,
                cutoff,
            }),
        )
    }

    pub fn add_box_potential(&mut self, t: &str, origin: Vec3, extent: Vec3, force_constant: f64) -> Result<()> {
        let t = self.type_id(t)?;
        self.potentials.add_external(
            t,
            ExternalPotential::Box(BoxPotential {
                origin,
                extent,
                force_constant,
            }),
        )
    }

    pub fn add_topology_type(&mut self, name: &str) -> Result<TopologyTypeId> {
        self.topologies.add_type(name)
    }

    pub fn configure_bond(&mut self, a: &str, b: &str, force_constant: f64, length: f64) -> Result<()> {
        let (a, b) = (self.type_id(a)?, self.type_id(b)?);
        self.topologies
            .configure_bond(a, b, BondConfig::harmonic(force_constant, length))
    }

    pub fn configure_angle(&mut self, types: [&str; 3], force_constant: f64, equilibrium_angle: f64) -> Result<()> {
        let [i, j, k] = [self.type_id(types[0])?, self.type_id(types[1])?, self.type_id(types[2])?];
        self.topologies.configure_angle(
            i,
            j,
            k,
            AngleConfig {
                force_constant,
                equilibrium_angle,
            },
        )
    }

    pub fn configure_dihedral(
        &mut self,
        types: [&str; 4],
        force_constant: f64,
        multiplicity: u32,
        phi_0: f64,
    ) -> Result<()> {
        let ids = [
            self.type_id(types[0])?,
            self.type_id(types[1])?,
            self.type_id(types[2])?,
            self.type_id(types[3])?,
        ];
        self.topologies.configure_dihedral(
            ids[0],
            ids[1],
            ids[2],
            ids[3],
            DihedralConfig {
                force_constant,
                multiplicity,
                phi_0,
            },
        )
    }

    /// Registers a reaction after checking that all of its species exist.
    pub fn register_reaction(&mut self, name: &str, rate: f64, kind: ReactionKind) -> Result<ReactionId> {
        let draft = kinetia_data::Reaction {
            id: 0,
            name: name.to_string(),
            rate,
            kind: kind.clone(),
        };
        for t in draft.educt_types().into_iter().chain(draft.product_types()) {
            if !self.particle_types.contains(t) {
                return Err(SimError::UnknownParticleType(format!("#{t} in reaction {name}")));
            }
        }
        let id = self.reactions.register(name, rate, kind)?;
        tracing::debug!(reaction = name, rate, "Registered reaction");
        Ok(id)
    }

    pub fn add_conversion(&mut self, name: &str, from: &str, to: &str, rate: f64) -> Result<ReactionId> {
        let kind = ReactionKind::Conversion {
            from: self.type_id(from)?,
            to: self.type_id(to)?,
        };
        self.register_reaction(name, rate, kind)
    }

    pub fn add_decay(&mut self, name: &str, educt: &str, rate: f64) -> Result<ReactionId> {
        let kind = ReactionKind::Decay {
            educt: self.type_id(educt)?,
        };
        self.register_reaction(name, rate, kind)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_fission(
        &mut self,
        name: &str,
        educt: &str,
        products: [&str; 2],
        rate: f64,
        product_distance: f64,
        weights: [f64; 2],
    ) -> Result<ReactionId> {
        let kind = ReactionKind::Fission {
            educt: self.type_id(educt)?,
            products: [self.type_id(products[0])?, self.type_id(products[1])?],
            product_distance,
            weights,
        };
        self.register_reaction(name, rate, kind)
    }

    pub fn add_fusion(
        &mut self,
        name: &str,
        educts: [&str; 2],
        product: &str,
        rate: f64,
        educt_distance: f64,
        weights: [f64; 2],
    ) -> Result<ReactionId> {
        let kind = ReactionKind::Fusion {
            educts: [self.type_id(educts[0])?, self.type_id(educts[1])?],
            product: self.type_id(product)?,
            educt_distance,
            weights,
        };
        self.register_reaction(name, rate, kind)
    }

    pub fn add_enzymatic(
        &mut self,
        name: &str,
        catalyst: &str,
        from: &str,
        to: &str,
        rate: f64,
        educt_distance: f64,
    ) -> Result<ReactionId> {
        let kind = ReactionKind::Enzymatic {
            catalyst: self.type_id(catalyst)?,
            from: self.type_id(from)?,
            to: self.type_id(to)?,
            educt_distance,
        };
        self.register_reaction(name, rate, kind)
    }

    /// Registers a reaction from a descriptor such as `"bind: A +(2) B -> C"`.
    pub fn add_reaction(&mut self, descriptor: &str, rate: f64) -> Result<ReactionId> {
        self.add_reaction_weighted(descriptor, rate, None)
    }

    pub fn add_reaction_weighted(
        &mut self,
        descriptor: &str,
        rate: f64,
        weights: Option<[f64; 2]>,
    ) -> Result<ReactionId> {
        let parsed = parse_descriptor(descriptor)?;
        let weights = weights.unwrap_or([0.5, 0.5]);
        let name = parsed.name.as_str();
        match &parsed.shape {
            DescriptorShape::Conversion { from, to } => self.add_conversion(name, from, to, rate),
            DescriptorShape::Decay { educt } => self.add_decay(name, educt, rate),
            DescriptorShape::Fission {
                educt,
                products,
                product_distance,
            } => self.add_fission(
                name,
                educt,
                [&products[0], &products[1]],
                rate,
                *product_distance,
                weights,
            ),
            DescriptorShape::Fusion {
                educts,
                product,
                educt_distance,
            } => self.add_fusion(
                name,
                [&educts[0], &educts[1]],
                product,
                rate,
                *educt_distance,
                weights,
            ),
            DescriptorShape::Enzymatic {
                catalyst,
                from,
                to,
                educt_distance,
            } => self.add_enzymatic(name, catalyst, from, to, rate, *educt_distance),
        }
    }

    /// Largest interaction range: pair potential cutoffs and order-2 educt distances.
    pub fn cutoff(&self) -> f64 {
        self.potentials
            .max_cutoff()
            .max(self.reactions.max_educt_distance())
    }

    /// Checks cross-registry consistency. The minimum image convention needs every
    /// interaction range to fit into half a periodic box edge.
    pub fn validate(&self) -> Result<()> {
        let cutoff = self.cutoff();
        let size = self.geometry.size();
        for axis in 0..3 {
            if self.geometry.periodic()[axis] && 2.0 * cutoff > size[axis] {
                return Err(SimError::config(format!(
                    "cutoff {cutoff} exceeds half the periodic box edge {}",
                    size[axis]
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        let mut ctx = Context::new(BoxGeometry::cube(20.0, true).unwrap(), 1.0).unwrap();
        for name in ["A", "B", "C"] {
            ctx.add_particle_type(name, 1.0).unwrap();
        }
        ctx
    }

    #[test]
    fn test_descriptors_resolve_names() {
        let mut ctx = context();
        let id = ctx.add_reaction("bind: A +(2) B -> C", 1.0).unwrap();
        let reaction = ctx.reactions.get(id).unwrap();
        assert_eq!(reaction.name, "bind");
        assert!(matches!(
            reaction.kind,
            ReactionKind::Fusion { educts: [0, 1], product: 2, .. }
        ));
        assert!(matches!(
            ctx.add_reaction("bad: A -> Z", 1.0),
            Err(SimError::UnknownParticleType(_))
        ));
    }

    #[test]
    fn test_cutoff_covers_reactions_and_potentials() {
        let mut ctx = context();
        ctx.add_harmonic_repulsion("A", "B", 1.0, 1.5).unwrap();
        assert_eq!(ctx.cutoff(), 1.5);
        ctx.add_reaction("bind: A +(3) B -> C", 1.0).unwrap();
        assert_eq!(ctx.cutoff(), 3.0);
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_cutoff() {
        let mut ctx = context();
        ctx.add_reaction("bind: A +(11) B -> C", 1.0).unwrap();
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_kbt() {
        assert!(Context::new(BoxGeometry::cube(1.0, true).unwrap(), 0.0).is_err());
    }
}
