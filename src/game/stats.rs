//! Unit Stats
//!
//! Every stat is optional: air units carry no ground defence and no movement,
//! only anti-air units carry an air attack. Two combination rules exist:
//!
//! - [`UnitStats::combine`] merges a type's base stats with an upgrade. A
//!   field present on either side survives and present values add.
//! - [`UnitStats::modify`] applies a situational modifier (terrain,
//!   entrenchment). It only touches fields the unit already has.

use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Stat block shared by unit types, upgrades and situational modifiers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitStats {
    /// Attack against unarmoured targets.
    pub soft_attack: Option<i32>,
    /// Attack against armoured targets.
    pub hard_attack: Option<i32>,
    /// Attack against air units.
    pub air_attack: Option<i32>,
    /// Defence against unarmoured attackers.
    pub soft_defence: Option<i32>,
    /// Defence against armoured attackers.
    pub hard_defence: Option<i32>,
    /// Defence against air attackers.
    pub air_defence: Option<i32>,
    /// Defence of an air unit against anti-air fire.
    pub anti_air_defence: Option<i32>,
    /// Defence against bombardment.
    pub bombardment_defence: Option<i32>,
    /// Movement points per turn.
    pub movement: Option<i32>,
    /// Ground attack range in hexes.
    pub range: Option<i32>,
    /// Anti-air attack range in hexes.
    pub anti_air_range: Option<i32>,
}

#[inline]
fn union_add(a: Option<i32>, b: Option<i32>) -> Option<i32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (a, None) => a,
        (None, b) => b,
    }
}

#[inline]
fn present_add(base: Option<i32>, delta: Option<i32>) -> Option<i32> {
    base.map(|value| value + delta.unwrap_or(0))
}

impl UnitStats {
    /// Fortified position bonus.
    pub const ENTRENCHMENT: UnitStats = UnitStats {
        soft_attack: None,
        hard_attack: None,
        air_attack: None,
        soft_defence: Some(1),
        hard_defence: Some(1),
        air_defence: None,
        anti_air_defence: None,
        bombardment_defence: Some(1),
        movement: None,
        range: None,
        anti_air_range: None,
    };

    /// Union-add two stat blocks.
    pub fn combine(&self, other: &UnitStats) -> UnitStats {
        UnitStats {
            soft_attack: union_add(self.soft_attack, other.soft_attack),
            hard_attack: union_add(self.hard_attack, other.hard_attack),
            air_attack: union_add(self.air_attack, other.air_attack),
            soft_defence: union_add(self.soft_defence, other.soft_defence),
            hard_defence: union_add(self.hard_defence, other.hard_defence),
            air_defence: union_add(self.air_defence, other.air_defence),
            anti_air_defence: union_add(self.anti_air_defence, other.anti_air_defence),
            bombardment_defence: union_add(self.bombardment_defence, other.bombardment_defence),
            movement: union_add(self.movement, other.movement),
            range: union_add(self.range, other.range),
            anti_air_range: union_add(self.anti_air_range, other.anti_air_range),
        }
    }

    /// Apply a modifier to the fields this block already has.
    pub fn modify(&self, modifier: &UnitStats) -> UnitStats {
        UnitStats {
            soft_attack: present_add(self.soft_attack, modifier.soft_attack),
            hard_attack: present_add(self.hard_attack, modifier.hard_attack),
            air_attack: present_add(self.air_attack, modifier.air_attack),
            soft_defence: present_add(self.soft_defence, modifier.soft_defence),
            hard_defence: present_add(self.hard_defence, modifier.hard_defence),
            air_defence: present_add(self.air_defence, modifier.air_defence),
            anti_air_defence: present_add(self.anti_air_defence, modifier.anti_air_defence),
            bombardment_defence: present_add(self.bombardment_defence, modifier.bombardment_defence),
            movement: present_add(self.movement, modifier.movement),
            range: present_add(self.range, modifier.range),
            anti_air_range: present_add(self.anti_air_range, modifier.anti_air_range),
        }
    }

    /// Movement points, zero for units without movement.
    #[inline]
    pub fn movement_points(&self) -> u32 {
        self.movement.unwrap_or(0).max(0) as u32
    }

    /// Ground attack range; units without a range stat fight adjacent hexes.
    #[inline]
    pub fn attack_range(&self) -> u32 {
        self.range.unwrap_or(1).max(0) as u32
    }

    /// Whether this block describes an anti-air capable unit.
    #[inline]
    pub fn is_anti_air(&self) -> bool {
        self.air_attack.is_some() && self.anti_air_range.is_some()
    }
}

impl Add for UnitStats {
    type Output = UnitStats;

    fn add(self, rhs: UnitStats) -> UnitStats {
        self.combine(&rhs)
    }
}
