//! Combat resolution.
//!
//! An attack is a single simultaneous exchange. Both sides' damage is
//! computed from pre-combat stats and strengths, then scaled into strength
//! losses:
//!
//! ```text
//! damage  = soft * (1 - hardness) + hard * hardness
//! loss    = damage * source_strength * COMBAT_LOSS_SCALE
//! ```
//!
//! Anti-air interception scales an air attacker's attack inputs before the
//! exchange and inflicts nothing on its own.

use thiserror::Error;

use crate::game::unit::Unit;

/// Strength lost per point of damage from a full-strength source.
pub const COMBAT_LOSS_SCALE: f64 = 0.1;

/// Counter-damage bonus when defending across a river edge.
pub const RIVER_DEFENCE_BONUS: f64 = 1.0;

/// Reasons an attack cannot take place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombatError {
    /// Target is outside the attacker's range.
    #[error("target at distance {distance} is beyond range {range}")]
    OutOfRange {
        /// Hex distance to the target.
        distance: u32,
        /// Attacker's range.
        range: u32,
    },
    /// Only units with an air attack may engage aircraft.
    #[error("attacker cannot engage air units")]
    CannotEngageAir,
    /// One of the units is not on the map.
    #[error("unit is not deployed")]
    NotDeployed,
}

/// Damage each side deals in one exchange.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Exchange {
    /// Damage dealt to the defender.
    pub to_defender: f64,
    /// Damage dealt back to the attacker.
    pub to_attacker: f64,
}

/// Strength losses resulting from an exchange.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Losses {
    /// Loss applied to the attacker.
    pub attacker: f64,
    /// Loss applied to the defender.
    pub defender: f64,
}

/// Blend soft and hard values by the target's hardness.
#[inline]
pub fn blend(soft: f64, hard: f64, hardness: f64) -> f64 {
    soft * (1.0 - hardness) + hard * hardness
}

#[inline]
fn stat(value: Option<i32>) -> f64 {
    value.unwrap_or(0) as f64
}

/// Factor applied to an air attacker's attack values under anti-air fire.
///
/// `pressure` is the sum of `air_attack * strength` over every enemy anti-air
/// unit covering the target.
pub fn interception_factor(anti_air_defence: Option<i32>, pressure: f64) -> f64 {
    if pressure <= 0.0 {
        return 1.0;
    }
    let defence = stat(anti_air_defence).max(1.0);
    defence / (defence + pressure)
}

/// Check range and targeting rules for `attacker` engaging `defender`.
pub fn check_attack(attacker: &Unit, defender: &Unit) -> Result<(), CombatError> {
    let (Some(from), Some(to)) = (attacker.position(), defender.position()) else {
        return Err(CombatError::NotDeployed);
    };
    if defender.is_air() && attacker.stats().air_attack.is_none() {
        return Err(CombatError::CannotEngageAir);
    }
    if attacker.is_air() {
        return Ok(());
    }
    let range = if defender.is_air() {
        attacker.stats().anti_air_range.unwrap_or(1).max(0) as u32
    } else {
        attacker.stats().attack_range()
    };
    let distance = from.distance(to);
    if distance > range {
        return Err(CombatError::OutOfRange { distance, range });
    }
    Ok(())
}

/// Damage exchanged between two units.
///
/// `interception` is the attack factor from [`interception_factor`] (1.0 for
/// ground attackers). `river` is true when the two units are adjacent across
/// a river edge.
pub fn exchange(attacker: &Unit, defender: &Unit, interception: f64, river: bool) -> Exchange {
    let a = attacker.stats();
    let d = defender.stats();

    let (to_defender, to_attacker) = if defender.is_air() {
        (stat(a.air_attack) * interception, stat(d.anti_air_defence))
    } else {
        let hardness = defender.hardness().unwrap_or(0.0);
        let dealt = blend(stat(a.soft_attack), stat(a.hard_attack), hardness) * interception;
        let counter = if attacker.is_air() {
            stat(d.air_defence)
        } else {
            let attacker_hardness = attacker.hardness().unwrap_or(0.0);
            let bonus = if river { RIVER_DEFENCE_BONUS } else { 0.0 };
            blend(stat(d.soft_defence), stat(d.hard_defence), attacker_hardness) + bonus
        };
        (dealt, counter)
    };

    Exchange {
        to_defender: to_defender.max(0.0),
        to_attacker: to_attacker.max(0.0),
    }
}

/// Convert an exchange into strength losses using pre-combat strengths.
pub fn losses(exchange: Exchange, attacker_strength: f64, defender_strength: f64) -> Losses {
    Losses {
        attacker: exchange.to_attacker * defender_strength * COMBAT_LOSS_SCALE,
        defender: exchange.to_defender * attacker_strength * COMBAT_LOSS_SCALE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hex::Position;
    use crate::game::catalog::{Catalog, UnitClass, UnitType};
    use crate::game::map::{Map, Terrain};
    use crate::game::state::{Side, UnitId};
    use crate::game::stats::UnitStats;

    fn custom(class: UnitClass, hardness: Option<f64>, stats: UnitStats) -> UnitType {
        UnitType {
            id: 99,
            name: "custom".to_string(),
            description: String::new(),
            price: 10,
            limit: None,
            class,
            hardness,
            stats,
            upgrades: Vec::new(),
        }
    }

    fn placed(map: &mut Map, id: u32, side: Side, t: &UnitType, at: Position) -> Unit {
        let mut unit = Unit::new(UnitId(id), side, 1, t, &[]);
        map.place(&mut unit, at).unwrap();
        unit
    }

    #[test]
    fn test_blend_known_value() {
        assert!((blend(4.0, 3.0, 0.25) - 3.75).abs() < 1e-9);
    }

    #[test]
    fn test_ground_exchange() {
        let mut map = Map::hexagon("test", 3, Terrain::Clear);
        let attacker_type = custom(
            UnitClass::Motorized,
            Some(0.5),
            UnitStats { soft_attack: Some(4), hard_attack: Some(3), ..Default::default() },
        );
        let defender_type = custom(
            UnitClass::Infantry,
            Some(0.25),
            UnitStats { soft_defence: Some(2), hard_defence: Some(4), ..Default::default() },
        );
        let a = placed(&mut map, 1, Side::Side1, &attacker_type, Position::new(0, 0));
        let d = placed(&mut map, 2, Side::Side2, &defender_type, Position::new(1, 0));

        check_attack(&a, &d).unwrap();
        let ex = exchange(&a, &d, 1.0, false);
        assert!((ex.to_defender - 3.75).abs() < 1e-9);
        assert!((ex.to_attacker - 3.0).abs() < 1e-9);

        let river = exchange(&a, &d, 1.0, true);
        assert!((river.to_attacker - 4.0).abs() < 1e-9);

        let l = losses(ex, 1.0, 0.5);
        assert!((l.defender - 0.375).abs() < 1e-9);
        assert!((l.attacker - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_range_check() {
        let catalog = Catalog::builtin();
        let mut map = Map::hexagon("test", 4, Terrain::Clear);
        let infantry = catalog.unit_type(1, 1).unwrap();
        let artillery = catalog.unit_type(1, 3).unwrap();
        let a = placed(&mut map, 1, Side::Side1, infantry, Position::new(0, 0));
        let gun = placed(&mut map, 2, Side::Side1, artillery, Position::new(0, 1));
        let d = placed(&mut map, 3, Side::Side2, infantry, Position::new(2, 0));

        assert_eq!(check_attack(&a, &d), Err(CombatError::OutOfRange { distance: 2, range: 1 }));
        assert!(check_attack(&gun, &d).is_ok());
    }

    #[test]
    fn test_air_targets() {
        let catalog = Catalog::builtin();
        let mut map = Map::hexagon("test", 4, Terrain::Clear);
        let infantry = catalog.unit_type(1, 1).unwrap();
        let flak = catalog.unit_type(1, 4).unwrap();
        let bomber = catalog.unit_type(1, 5).unwrap();

        let rifles = placed(&mut map, 1, Side::Side1, infantry, Position::new(0, 0));
        let gun = placed(&mut map, 2, Side::Side1, flak, Position::new(-1, 0));
        let plane = placed(&mut map, 3, Side::Side2, bomber, Position::new(1, 0));

        assert_eq!(check_attack(&rifles, &plane), Err(CombatError::CannotEngageAir));
        assert!(check_attack(&gun, &plane).is_ok());

        let ex = exchange(&gun, &plane, 1.0, false);
        assert_eq!(ex.to_defender, 6.0);
        assert_eq!(ex.to_attacker, 3.0);

        // Air attacker ignores range and receives the target's air defence
        assert!(check_attack(&plane, &rifles).is_ok());
        let ex = exchange(&plane, &rifles, 1.0, false);
        assert_eq!(ex.to_defender, 6.0);
        assert_eq!(ex.to_attacker, 1.0);
    }

    #[test]
    fn test_interception_scales_attack() {
        assert_eq!(interception_factor(Some(3), 0.0), 1.0);
        assert!((interception_factor(Some(3), 6.0) - 1.0 / 3.0).abs() < 1e-9);
        assert!((interception_factor(None, 1.0) - 0.5).abs() < 1e-9);

        let catalog = Catalog::builtin();
        let mut map = Map::hexagon("test", 4, Terrain::Clear);
        let bomber = catalog.unit_type(1, 5).unwrap();
        let infantry = catalog.unit_type(1, 1).unwrap();
        let plane = placed(&mut map, 1, Side::Side1, bomber, Position::new(0, 0));
        let rifles = placed(&mut map, 2, Side::Side2, infantry, Position::new(3, 0));

        let ex = exchange(&plane, &rifles, 0.5, false);
        assert_eq!(ex.to_defender, 3.0);
    }
}
