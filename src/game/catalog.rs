//! Unit Catalog
//!
//! Factions, their unit types and the upgrades each type may carry. The
//! catalog is static for the lifetime of the server; it is loaded from a JSON
//! document or taken from [`Catalog::builtin`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use crate::game::stats::UnitStats;

/// Errors raised while loading a catalog or a map.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Document is not valid JSON for the expected shape.
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
    /// Document parsed but violates a structural rule.
    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// Broad movement class of a unit type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitClass {
    /// Foot soldiers. Only infantry may entrench.
    Infantry,
    /// Wheeled and tracked units.
    Motorized,
    /// Aircraft. No hardness, no ground movement, immune to ground fire.
    Air,
}

/// An optional improvement bought together with a unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Upgrade {
    /// Identifier, unique within its unit type.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Additional point cost.
    pub price: u32,
    /// A unit can carry at most one upgrade per slot.
    pub slot: u32,
    /// Stat delta added to the unit's base stats.
    #[serde(default)]
    pub stats: UnitStats,
}

/// A purchasable unit type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitType {
    /// Identifier, unique within its faction.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Point cost without upgrades.
    pub price: u32,
    /// Maximum number of this type per army.
    #[serde(default)]
    pub limit: Option<u32>,
    /// Movement class.
    pub class: UnitClass,
    /// Fraction of armour in `[0, 1]`. Air units have none.
    #[serde(default)]
    pub hardness: Option<f64>,
    /// Base stats.
    pub stats: UnitStats,
    /// Upgrades this type may take.
    #[serde(default)]
    pub upgrades: Vec<Upgrade>,
}

impl UnitType {
    /// Look up an upgrade by id.
    pub fn upgrade(&self, id: u32) -> Option<&Upgrade> {
        self.upgrades.iter().find(|u| u.id == id)
    }
}

/// A playable faction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Faction {
    /// Identifier.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Unit types available to this faction.
    pub units: Vec<UnitType>,
}

impl Faction {
    /// Look up a unit type by id.
    pub fn unit_type(&self, id: u32) -> Option<&UnitType> {
        self.units.iter().find(|u| u.id == id)
    }
}

/// All factions known to the server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    factions: BTreeMap<u32, Faction>,
}

#[derive(Deserialize)]
struct CatalogDocument {
    factions: Vec<Faction>,
}

impl Catalog {
    /// Build a catalog from a list of factions, checking structural rules.
    pub fn new(factions: Vec<Faction>) -> Result<Self, CatalogError> {
        let mut map = BTreeMap::new();
        for faction in factions {
            validate_faction(&faction)?;
            let id = faction.id;
            if map.insert(id, faction).is_some() {
                return Err(CatalogError::Invalid(format!("duplicate faction id {}", id)));
            }
        }
        Ok(Self { factions: map })
    }

    /// Parse a catalog from its JSON form: `{ "factions": [...] }`.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Self::new(doc.factions)
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Look up a faction.
    pub fn faction(&self, id: u32) -> Option<&Faction> {
        self.factions.get(&id)
    }

    /// Look up a unit type of a faction.
    pub fn unit_type(&self, faction: u32, unit_type: u32) -> Option<&UnitType> {
        self.faction(faction)?.unit_type(unit_type)
    }

    /// Iterate factions in id order.
    pub fn factions(&self) -> impl Iterator<Item = &Faction> {
        self.factions.values()
    }

    /// Two-faction catalog used when no catalog file is configured.
    pub fn builtin() -> Self {
        let factions = vec![
            Faction {
                id: 1,
                name: "Wehrmacht".to_string(),
                description: "Combined arms with heavy armour".to_string(),
                units: standard_units(0),
            },
            Faction {
                id: 2,
                name: "Red Army".to_string(),
                description: "Numerous infantry and artillery".to_string(),
                units: standard_units(-1),
            },
        ];
        let factions = factions.into_iter().map(|f| (f.id, f)).collect();
        Self { factions }
    }
}

fn validate_faction(faction: &Faction) -> Result<(), CatalogError> {
    let mut type_ids = BTreeSet::new();
    for unit in &faction.units {
        if !type_ids.insert(unit.id) {
            return Err(CatalogError::Invalid(format!(
                "faction {} has duplicate unit type id {}",
                faction.id, unit.id
            )));
        }
        match (unit.class, unit.hardness) {
            (UnitClass::Air, None) => {}
            (UnitClass::Air, Some(_)) => {
                return Err(CatalogError::Invalid(format!("air unit {} has a hardness", unit.name)));
            }
            (_, Some(h)) if (0.0..=1.0).contains(&h) => {}
            (_, _) => {
                return Err(CatalogError::Invalid(format!(
                    "ground unit {} needs a hardness in [0, 1]",
                    unit.name
                )));
            }
        }
        let mut upgrade_ids = BTreeSet::new();
        for upgrade in &unit.upgrades {
            if !upgrade_ids.insert(upgrade.id) {
                return Err(CatalogError::Invalid(format!(
                    "unit {} has duplicate upgrade id {}",
                    unit.name, upgrade.id
                )));
            }
        }
    }
    Ok(())
}

fn standard_units(armour_delta: i32) -> Vec<UnitType> {
    vec![
        UnitType {
            id: 1,
            name: "Infantry".to_string(),
            description: "Line infantry".to_string(),
            price: 20,
            limit: None,
            class: UnitClass::Infantry,
            hardness: Some(0.0),
            stats: UnitStats {
                soft_attack: Some(4),
                hard_attack: Some(3),
                soft_defence: Some(4),
                hard_defence: Some(3),
                air_defence: Some(1),
                bombardment_defence: Some(3),
                movement: Some(3),
                ..Default::default()
            },
            upgrades: vec![Upgrade {
                id: 1,
                name: "Anti-tank rifles".to_string(),
                price: 5,
                slot: 0,
                stats: UnitStats {
                    hard_attack: Some(1),
                    hard_defence: Some(1),
                    ..Default::default()
                },
            }],
        },
        UnitType {
            id: 2,
            name: "Medium tank".to_string(),
            description: "Main battle tank".to_string(),
            price: 45,
            limit: None,
            class: UnitClass::Motorized,
            hardness: Some(0.8),
            stats: UnitStats {
                soft_attack: Some(5),
                hard_attack: Some(6 + armour_delta),
                soft_defence: Some(5),
                hard_defence: Some(5 + armour_delta),
                air_defence: Some(2),
                bombardment_defence: Some(4),
                movement: Some(5),
                ..Default::default()
            },
            upgrades: vec![
                Upgrade {
                    id: 1,
                    name: "Long barrel".to_string(),
                    price: 10,
                    slot: 0,
                    stats: UnitStats {
                        hard_attack: Some(2),
                        ..Default::default()
                    },
                },
                Upgrade {
                    id: 2,
                    name: "Skirts".to_string(),
                    price: 5,
                    slot: 1,
                    stats: UnitStats {
                        hard_defence: Some(1),
                        ..Default::default()
                    },
                },
            ],
        },
        UnitType {
            id: 3,
            name: "Field artillery".to_string(),
            description: "Indirect fire support".to_string(),
            price: 35,
            limit: Some(2),
            class: UnitClass::Motorized,
            hardness: Some(0.2),
            stats: UnitStats {
                soft_attack: Some(6),
                hard_attack: Some(3),
                soft_defence: Some(2),
                hard_defence: Some(1),
                air_defence: Some(1),
                bombardment_defence: Some(2),
                movement: Some(2),
                range: Some(3),
                ..Default::default()
            },
            upgrades: Vec::new(),
        },
        UnitType {
            id: 4,
            name: "Flak".to_string(),
            description: "Anti-air gun".to_string(),
            price: 30,
            limit: Some(2),
            class: UnitClass::Motorized,
            hardness: Some(0.3),
            stats: UnitStats {
                soft_attack: Some(2),
                hard_attack: Some(3),
                air_attack: Some(6),
                soft_defence: Some(2),
                hard_defence: Some(2),
                air_defence: Some(5),
                bombardment_defence: Some(2),
                movement: Some(3),
                anti_air_range: Some(2),
                ..Default::default()
            },
            upgrades: Vec::new(),
        },
        UnitType {
            id: 5,
            name: "Dive bomber".to_string(),
            description: "Close air support".to_string(),
            price: 50,
            limit: Some(1),
            class: UnitClass::Air,
            hardness: None,
            stats: UnitStats {
                soft_attack: Some(6),
                hard_attack: Some(6),
                anti_air_defence: Some(3),
                ..Default::default()
            },
            upgrades: Vec::new(),
        },
    ]
}
