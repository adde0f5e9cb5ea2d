use crate::error::{Result, SimError};
use kinetia_data::{AngleConfig, BondConfig, DihedralConfig, ParticleTypeId, TopologyTypeId};
use std::collections::HashMap;

type P = ParticleTypeId;

/// Topology types plus bonded parameters keyed by particle types.
///
/// Keys are canonical so lookups are order-independent: bonds by the sorted pair,
/// angles by `(min(i, k), j, max(i, k))` and dihedrals by the smaller of the
/// forward and reversed quadruple.
#[derive(Debug, Clone, Default)]
pub struct TopologyRegistry {
    names: Vec<String>,
    by_name: HashMap<String, TopologyTypeId>,
    bonds: HashMap<(P, P), BondConfig>,
    angles: HashMap<(P, P, P), AngleConfig>,
    dihedrals: HashMap<(P, P, P, P), DihedralConfig>,
}

fn bond_key(a: P, b: P) -> (P, P) {
    (a.min(b), a.max(b))
}

fn angle_key(i: P, j: P, k: P) -> (P, P, P) {
    (i.min(k), j, i.max(k))
}

fn dihedral_key(i: P, j: P, k: P, l: P) -> (P, P, P, P) {
    let forward = (i, j, k, l);
    let reverse = (l, k, j, i);
    forward.min(reverse)
}

impl TopologyRegistry {
    pub fn add_type(&mut self, name: &str) -> Result<TopologyTypeId> {
        if self.by_name.contains_key(name) {
            return Err(SimError::config(format!("topology type {name} registered twice")));
        }
        let id = TopologyTypeId::try_from(self.names.len())
            .map_err(|_| SimError::config("too many topology types"))?;
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn type_id(&self, name: &str) -> Result<TopologyTypeId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownTopologyType(name.to_string()))
    }

    pub fn type_name(&self, id: TopologyTypeId) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn n_types(&self) -> usize {
        self.names.len()
    }

    pub fn configure_bond(&mut self, a: P, b: P, config: BondConfig) -> Result<()> {
        if config.force_constant < 0.0 || config.length < 0.0 {
            return Err(SimError::config(format!(
                "bond {a}-{b} needs non-negative force constant and length"
            )));
        }
        self.bonds.insert(bond_key(a, b), config);
        Ok(())
    }

    pub fn bond(&self, a: P, b: P) -> Option<&BondConfig> {
        self.bonds.get(&bond_key(a, b))
    }

    pub fn configure_angle(&mut self, i: P, j: P, k: P, config: AngleConfig) -> Result<()> {
        if config.force_constant < 0.0 {
            return Err(SimError::config("angle force constant must be non-negative"));
        }
        self.angles.insert(angle_key(i, j, k), config);
        Ok(())
    }

    pub fn angle(&self, i: P, j: P, k: P) -> Option<&AngleConfig> {
        self.angles.get(&angle_key(i, j, k))
    }

    pub fn configure_dihedral(&mut self, i: P, j: P, k: P, l: P, config: DihedralConfig) -> Result<()> {
        if config.force_constant < 0.0 {
            return Err(SimError::config("dihedral force constant must be non-negative"));
        }
        self.dihedrals.insert(dihedral_key(i, j, k, l), config);
        Ok(())
    }

    pub fn dihedral(&self, i: P, j: P, k: P, l: P) -> Option<&DihedralConfig> {
        self.dihedrals.get(&dihedral_key(i, j, k, l))
    }

    pub fn has_angles(&self) -> bool {
        !self.angles.is_empty()
    }

    pub fn has_dihedrals(&self) -> bool {
        !self.dihedrals.is_empty()
    }
}
