//! Army composition and validation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::game::catalog::{Catalog, UnitType, Upgrade};
use crate::game::state::UnitId;

/// Share of unspent army points carried over as reinforcement points.
pub const UNSPENT_POINTS_FACTOR: f64 = 0.5;

/// Share of the army budget always granted as reinforcement points.
pub const BASE_REINFORCEMENT_RATIO: f64 = 0.2;

/// One unit as chosen by a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitConfiguration {
    /// Filled in by the server once the unit exists.
    pub unit_id: Option<UnitId>,
    /// Faction of the unit type.
    pub faction_id: u32,
    /// Unit type within the faction.
    pub unit_type_id: u32,
    /// Chosen upgrades.
    pub upgrade_ids: Vec<u32>,
}

impl UnitConfiguration {
    /// A configuration without upgrades.
    pub fn new(faction_id: u32, unit_type_id: u32) -> Self {
        Self {
            unit_id: None,
            faction_id,
            unit_type_id,
            upgrade_ids: Vec::new(),
        }
    }

    /// Add an upgrade.
    pub fn with_upgrade(mut self, upgrade_id: u32) -> Self {
        self.upgrade_ids.push(upgrade_id);
        self
    }
}

/// The army a player brings to a game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseArmy {
    /// Faction all units belong to.
    pub faction_id: u32,
    /// Units in purchase order.
    pub units: Vec<UnitConfiguration>,
}

/// Reasons an army is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArmyError {
    /// No units at all.
    #[error("army is empty")]
    Empty,
    /// Faction id not in the catalog.
    #[error("unknown faction {0}")]
    UnknownFaction(u32),
    /// A unit of another faction was included.
    #[error("unit of faction {found} in an army of faction {expected}")]
    MixedFactions {
        /// Army faction.
        expected: u32,
        /// Offending unit's faction.
        found: u32,
    },
    /// Unit type id not in the faction.
    #[error("faction {faction} has no unit type {unit_type}")]
    UnknownUnitType {
        /// Faction searched.
        faction: u32,
        /// Requested type.
        unit_type: u32,
    },
    /// Upgrade id not offered by the unit type.
    #[error("unit type {unit_type} has no upgrade {upgrade}")]
    UnknownUpgrade {
        /// Unit type.
        unit_type: u32,
        /// Requested upgrade.
        upgrade: u32,
    },
    /// Two upgrades occupy the same slot.
    #[error("upgrade slot {0} used twice")]
    SlotConflict(u32),
    /// More units of a type than its limit allows.
    #[error("unit type {unit_type} is limited to {limit} per army")]
    LimitExceeded {
        /// Unit type.
        unit_type: u32,
        /// Allowed count.
        limit: u32,
    },
    /// Total price above the game's points.
    #[error("army costs {spent} points but only {available} are available")]
    Overspent {
        /// Total cost.
        spent: u32,
        /// Points available.
        available: u32,
    },
}

/// Resolve a single unit configuration against the catalog.
pub fn resolve_unit<'a>(
    catalog: &'a Catalog,
    faction_id: u32,
    config: &UnitConfiguration,
) -> Result<(&'a UnitType, Vec<&'a Upgrade>), ArmyError> {
    if config.faction_id != faction_id {
        return Err(ArmyError::MixedFactions {
            expected: faction_id,
            found: config.faction_id,
        });
    }
    let faction = catalog
        .faction(faction_id)
        .ok_or(ArmyError::UnknownFaction(faction_id))?;
    let unit_type = faction
        .unit_type(config.unit_type_id)
        .ok_or(ArmyError::UnknownUnitType {
            faction: faction_id,
            unit_type: config.unit_type_id,
        })?;

    let mut slots = BTreeSet::new();
    let mut upgrades = Vec::with_capacity(config.upgrade_ids.len());
    for &upgrade_id in &config.upgrade_ids {
        let upgrade = unit_type.upgrade(upgrade_id).ok_or(ArmyError::UnknownUpgrade {
            unit_type: unit_type.id,
            upgrade: upgrade_id,
        })?;
        if !slots.insert(upgrade.slot) {
            return Err(ArmyError::SlotConflict(upgrade.slot));
        }
        upgrades.push(upgrade);
    }
    Ok((unit_type, upgrades))
}

/// Price of a unit configuration.
pub fn unit_price(unit_type: &UnitType, upgrades: &[&Upgrade]) -> u32 {
    unit_type.price + upgrades.iter().map(|u| u.price).sum::<u32>()
}

/// Check an army against the catalog and a points budget. Returns points spent.
pub fn validate_army(catalog: &Catalog, army: &BaseArmy, points: u32) -> Result<u32, ArmyError> {
    if army.units.is_empty() {
        return Err(ArmyError::Empty);
    }
    if catalog.faction(army.faction_id).is_none() {
        return Err(ArmyError::UnknownFaction(army.faction_id));
    }

    let mut spent = 0u32;
    let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
    for config in &army.units {
        let (unit_type, upgrades) = resolve_unit(catalog, army.faction_id, config)?;
        let count = counts.entry(unit_type.id).or_insert(0);
        *count += 1;
        if let Some(limit) = unit_type.limit {
            if *count > limit {
                return Err(ArmyError::LimitExceeded {
                    unit_type: unit_type.id,
                    limit,
                });
            }
        }
        spent = spent.saturating_add(unit_price(unit_type, &upgrades));
    }

    if spent > points {
        return Err(ArmyError::Overspent {
            spent,
            available: points,
        });
    }
    Ok(spent)
}

/// Reinforcement points granted at game start.
pub fn reinforcement_points(available: u32, spent: u32) -> u32 {
    let unspent = available.saturating_sub(spent) as f64;
    (UNSPENT_POINTS_FACTOR * unspent + BASE_REINFORCEMENT_RATIO * available as f64).floor() as u32
}
