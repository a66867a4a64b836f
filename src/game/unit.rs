//! Units in play.
//!
//! A unit's type and upgrades are fixed at creation. Its hex is only changed
//! through [`Map::place`](crate::game::map::Map::place) and
//! [`Map::vacate`](crate::game::map::Map::vacate), which keep the hex's
//! occupant in step with the unit's position.

use serde::{Deserialize, Serialize};

use crate::core::hex::Position;
use crate::game::army::UnitConfiguration;
use crate::game::catalog::{UnitClass, UnitType, Upgrade};
use crate::game::map::Terrain;
use crate::game::state::{Side, UnitId};
use crate::game::stats::UnitStats;

/// Lowest possible strength. A unit at the floor is destroyed.
pub const STRENGTH_FLOOR: f64 = 0.0;

/// Full strength.
pub const STRENGTH_MAX: f64 = 1.0;

/// Strengths within this distance of the floor snap to the floor.
pub const STRENGTH_EPSILON: f64 = 1e-9;

/// A unit owned by one side of a game.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Unit {
    id: UnitId,
    side: Side,
    faction_id: u32,
    unit_type_id: u32,
    upgrade_ids: Vec<u32>,
    class: UnitClass,
    hardness: Option<f64>,
    price: u32,
    /// Type stats plus upgrades.
    base_stats: UnitStats,
    /// Base stats plus terrain and entrenchment.
    stats: UnitStats,
    strength: f64,
    pub(in crate::game) position: Option<Position>,
    movement_points: u32,
    can_act: bool,
    has_moved: bool,
    entrenched: bool,
    out_of_supply: u32,
}

impl Unit {
    /// Create an undeployed unit at full strength.
    pub fn new(id: UnitId, side: Side, faction_id: u32, unit_type: &UnitType, upgrades: &[&Upgrade]) -> Self {
        let base_stats = upgrades
            .iter()
            .fold(unit_type.stats, |stats, upgrade| stats + upgrade.stats);
        let price = unit_type.price + upgrades.iter().map(|u| u.price).sum::<u32>();

        Self {
            id,
            side,
            faction_id,
            unit_type_id: unit_type.id,
            upgrade_ids: upgrades.iter().map(|u| u.id).collect(),
            class: unit_type.class,
            hardness: unit_type.hardness,
            price,
            base_stats,
            stats: base_stats,
            strength: STRENGTH_MAX,
            position: None,
            movement_points: 0,
            can_act: false,
            has_moved: false,
            entrenched: false,
            out_of_supply: 0,
        }
    }

    /// Unit id.
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Owning side.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Movement class.
    pub fn class(&self) -> UnitClass {
        self.class
    }

    /// Armour fraction; `None` for air units.
    pub fn hardness(&self) -> Option<f64> {
        self.hardness
    }

    /// Whether this is an aircraft.
    pub fn is_air(&self) -> bool {
        self.class == UnitClass::Air
    }

    /// Point cost including upgrades.
    pub fn price(&self) -> u32 {
        self.price
    }

    /// Current derived stats.
    pub fn stats(&self) -> &UnitStats {
        &self.stats
    }

    /// Current strength in `[STRENGTH_FLOOR, STRENGTH_MAX]`.
    pub fn strength(&self) -> f64 {
        self.strength
    }

    /// Occupied hex, if deployed and alive.
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Whether the unit currently sits on the map.
    pub fn is_deployed(&self) -> bool {
        self.position.is_some()
    }

    /// Whether the unit is still in play.
    pub fn is_alive(&self) -> bool {
        self.strength > STRENGTH_FLOOR
    }

    /// Movement points left this turn.
    pub fn movement_points(&self) -> u32 {
        self.movement_points
    }

    /// Whether the unit may still attack, entrench or be reinforced this turn.
    pub fn can_act(&self) -> bool {
        self.can_act
    }

    /// Whether the unit moved this turn.
    pub fn has_moved(&self) -> bool {
        self.has_moved
    }

    /// Whether the unit is dug in.
    pub fn is_entrenched(&self) -> bool {
        self.entrenched
    }

    /// Consecutive turns started out of supply.
    pub fn out_of_supply_turns(&self) -> u32 {
        self.out_of_supply
    }

    /// The configuration this unit was bought with.
    pub fn configuration(&self) -> UnitConfiguration {
        UnitConfiguration {
            unit_id: Some(self.id),
            faction_id: self.faction_id,
            unit_type_id: self.unit_type_id,
            upgrade_ids: self.upgrade_ids.clone(),
        }
    }

    /// Recompute derived stats for the given terrain.
    pub(in crate::game) fn refresh_stats(&mut self, terrain: Option<Terrain>) {
        let mut stats = self.base_stats;
        if !self.is_air() {
            if let Some(terrain) = terrain {
                stats = stats.modify(&terrain.bonus());
            }
        }
        if self.entrenched {
            stats = stats.modify(&UnitStats::ENTRENCHMENT);
        }
        self.stats = stats;
    }

    /// Restore movement and action at the start of the owner's turn.
    pub(in crate::game) fn start_turn(&mut self) {
        self.movement_points = self.stats.movement_points();
        self.can_act = true;
        self.has_moved = false;
    }

    /// Spend all movement and the action for this turn.
    pub(in crate::game) fn exhaust(&mut self) {
        self.movement_points = 0;
        self.can_act = false;
    }

    pub(in crate::game) fn set_moved(&mut self, remaining: u32) {
        self.movement_points = remaining;
        self.has_moved = true;
    }

    pub(in crate::game) fn consume_action(&mut self) {
        self.can_act = false;
    }

    pub(in crate::game) fn set_entrenched(&mut self, entrenched: bool) {
        self.entrenched = entrenched;
    }

    /// Subtract strength, clamped to the floor. Returns the new strength.
    pub(in crate::game) fn apply_loss(&mut self, loss: f64) -> f64 {
        let strength = (self.strength - loss.max(0.0)).clamp(STRENGTH_FLOOR, STRENGTH_MAX);
        self.strength = if strength - STRENGTH_FLOOR < STRENGTH_EPSILON {
            STRENGTH_FLOOR
        } else {
            strength
        };
        self.strength
    }

    pub(in crate::game) fn restore_strength(&mut self) {
        self.strength = STRENGTH_MAX;
    }

    /// Update the supply counter. Returns the new count.
    pub(in crate::game) fn track_supply(&mut self, supplied: bool) -> u32 {
        if supplied {
            self.out_of_supply = 0;
        } else {
            self.out_of_supply += 1;
        }
        self.out_of_supply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::Catalog;

    fn infantry(catalog: &Catalog) -> Unit {
        let t = catalog.unit_type(1, 1).unwrap();
        Unit::new(UnitId(1), Side::Side1, 1, t, &[])
    }

    #[test]
    fn test_new_unit_with_upgrade() {
        let catalog = Catalog::builtin();
        let t = catalog.unit_type(1, 1).unwrap();
        let upgrade = t.upgrade(1).unwrap();
        let unit = Unit::new(UnitId(4), Side::Side2, 1, t, &[upgrade]);

        assert_eq!(unit.price(), t.price + upgrade.price);
        assert_eq!(unit.stats().hard_attack, Some(4));
        assert_eq!(unit.strength(), STRENGTH_MAX);
        assert!(!unit.is_deployed());
        assert_eq!(unit.configuration().upgrade_ids, vec![1]);
    }

    #[test]
    fn test_refresh_stats_terrain_and_entrenchment() {
        let catalog = Catalog::builtin();
        let mut unit = infantry(&catalog);

        unit.refresh_stats(Some(Terrain::Forest));
        assert_eq!(unit.stats().soft_defence, Some(5));

        unit.set_entrenched(true);
        unit.refresh_stats(Some(Terrain::Forest));
        assert_eq!(unit.stats().soft_defence, Some(6));
        assert_eq!(unit.stats().bombardment_defence, Some(4));

        unit.set_entrenched(false);
        unit.refresh_stats(Some(Terrain::Clear));
        assert_eq!(unit.stats().soft_defence, Some(4));
    }

    #[test]
    fn test_air_ignores_terrain() {
        let catalog = Catalog::builtin();
        let t = catalog.unit_type(1, 5).unwrap();
        let mut plane = Unit::new(UnitId(2), Side::Side1, 1, t, &[]);
        plane.refresh_stats(Some(Terrain::Swamp));
        assert_eq!(plane.stats().soft_attack, Some(6));
    }

    #[test]
    fn test_strength_clamped() {
        let catalog = Catalog::builtin();
        let mut unit = infantry(&catalog);
        assert_eq!(unit.apply_loss(0.25), 0.75);
        assert_eq!(unit.apply_loss(-3.0), 0.75);
        assert_eq!(unit.apply_loss(5.0), STRENGTH_FLOOR);
        assert!(!unit.is_alive());
    }

    #[test]
    fn test_repeated_losses_reach_floor() {
        use crate::game::turn::{INFANTRY_ATTRITION, MOTORIZED_ATTRITION};

        let catalog = Catalog::builtin();
        let mut unit = infantry(&catalog);
        for _ in 0..9 {
            unit.apply_loss(INFANTRY_ATTRITION);
        }
        assert!(unit.is_alive());
        assert_eq!(unit.apply_loss(INFANTRY_ATTRITION), STRENGTH_FLOOR);
        assert!(!unit.is_alive());

        let mut unit = infantry(&catalog);
        for _ in 0..5 {
            unit.apply_loss(MOTORIZED_ATTRITION);
        }
        assert_eq!(unit.strength(), STRENGTH_FLOOR);
        assert!(!unit.is_alive());
    }

    #[test]
    fn test_supply_counter() {
        let catalog = Catalog::builtin();
        let mut unit = infantry(&catalog);
        assert_eq!(unit.track_supply(false), 1);
        assert_eq!(unit.track_supply(false), 2);
        assert_eq!(unit.track_supply(true), 0);
    }

    #[test]
    fn test_turn_reset() {
        let catalog = Catalog::builtin();
        let mut unit = infantry(&catalog);
        unit.start_turn();
        assert_eq!(unit.movement_points(), 3);
        assert!(unit.can_act());
        unit.exhaust();
        assert_eq!(unit.movement_points(), 0);
        assert!(!unit.can_act());
    }
}
