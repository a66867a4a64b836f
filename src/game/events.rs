//! Game Events
//!
//! Everything observable that happens inside a game. The game queues events
//! as it mutates; the network layer drains them after each message and turns
//! them into per-player messages.

use serde::{Deserialize, Serialize};

use crate::core::hex::Position;
use crate::game::army::UnitConfiguration;
use crate::game::state::{Side, UnitId};

/// A unit and the hex it stands on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPosition {
    /// Unit id.
    pub unit_id: UnitId,
    /// Hex.
    pub position: Position,
}

/// Strength change of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitCasualties {
    /// Unit id.
    pub unit_id: UnitId,
    /// Strength after the change.
    pub new_strength: f64,
    /// Set on attrition casualties; exhausted units cannot act this turn.
    pub exhausted: Option<bool>,
}

/// How a game ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOutcome {
    /// Turn limit reached; winner controls more hexes.
    Domination,
    /// One side lost all its units.
    Annihilation,
    /// Both sides lost all their units at once.
    MutualAnnihilation,
    /// Loser gave up.
    Surrender,
    /// Loser disconnected.
    Desertion,
    /// Turn limit reached with equal control.
    Draw,
}

/// Reinforcement point balance of a side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinforcementState {
    /// Side whose balance this is.
    pub side: Side,
    /// Points left.
    pub points_remaining: u32,
}

/// Something that happened in a game.
#[derive(Clone, Debug, PartialEq)]
pub enum GameEvent {
    /// Both sides submitted their initial deployment.
    DeploymentComplete {
        /// Units placed by side 1.
        side1: Vec<UnitPosition>,
        /// Units placed by side 2.
        side2: Vec<UnitPosition>,
    },
    /// A side's turn began.
    NewTurn {
        /// Side now acting.
        active: Side,
        /// Units that suffered attrition.
        attrition: Vec<UnitCasualties>,
    },
    /// A unit moved.
    UnitMoved {
        /// Unit id.
        unit_id: UnitId,
        /// Destination.
        position: Position,
        /// Movement points left.
        remaining: u32,
        /// Hexes whose ownership changed.
        captures: Vec<Position>,
    },
    /// An infantry unit dug in.
    UnitEntrenched {
        /// Unit id.
        unit_id: UnitId,
    },
    /// Two units fought.
    UnitAttacked {
        /// Attacker after combat.
        attacker: UnitCasualties,
        /// Defender after combat.
        defender: UnitCasualties,
    },
    /// A unit was removed from play.
    UnitDestroyed {
        /// Unit id.
        unit_id: UnitId,
        /// Its owner.
        side: Side,
    },
    /// A reserve unit entered the map.
    UnitDeployed(UnitPosition),
    /// A unit was restored to full strength.
    UnitReinforced {
        /// Paying side's new balance.
        reinforcement: ReinforcementState,
        /// Unit id.
        unit_id: UnitId,
        /// Strength after reinforcement.
        new_strength: f64,
    },
    /// A new unit joined a side's reserve.
    UnitPurchased {
        /// Paying side's new balance.
        reinforcement: ReinforcementState,
        /// The new unit.
        unit: UnitConfiguration,
    },
    /// The game is over.
    GameEnded {
        /// How it ended.
        outcome: GameOutcome,
        /// Winning side, `None` on a draw or mutual annihilation.
        winner: Option<Side>,
    },
}

impl GameEvent {
    /// Whether this event concludes the game.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GameEvent::GameEnded { .. })
    }
}
