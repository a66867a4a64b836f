//! Game State
//!
//! A single match between two sides: the battlefield, every unit ever
//! bought, reinforcement balances and the turn cursor. Turn actions live in
//! [`crate::game::turn`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::core::hex::Position;
use crate::core::rng::DeterministicRng;
use crate::game::army::{reinforcement_points, resolve_unit, validate_army, ArmyError, BaseArmy};
use crate::game::catalog::Catalog;
use crate::game::combat::CombatError;
use crate::game::events::{GameEvent, GameOutcome};
use crate::game::map::{Map, MapError};
use crate::game::unit::Unit;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// One of the two participants of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The player who created the game.
    Side1,
    /// The player who joined it.
    Side2,
}

impl Side {
    /// Both sides in order.
    pub const BOTH: [Side; 2] = [Side::Side1, Side::Side2];

    /// The other side.
    #[inline]
    pub fn opponent(self) -> Side {
        match self {
            Side::Side1 => Side::Side2,
            Side::Side2 => Side::Side1,
        }
    }

    /// Array index of this side.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Side::Side1 => 0,
            Side::Side2 => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Side1 => f.write_str("side 1"),
            Side::Side2 => f.write_str("side 2"),
        }
    }
}

/// Unit identifier, unique within a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// CONFIGURATION & ERRORS
// =============================================================================

/// Settings fixed when a game is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfiguration {
    /// Map name.
    pub map: String,
    /// Army points per side.
    pub points: u32,
    /// Number of full rounds before the game is decided by control.
    pub turn_limit: u32,
    /// Advisory seconds for initial deployment.
    pub deployment_time: u32,
    /// Advisory seconds per turn.
    pub turn_time: u32,
}

/// Lifecycle of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Waiting for both initial deployments.
    Deployment,
    /// Alternating turns.
    Playing,
    /// Decided.
    Ended,
}

/// Illegal requests. Every variant is a client fault.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    /// Army rejected.
    #[error(transparent)]
    Army(#[from] ArmyError),
    /// Placement rejected.
    #[error(transparent)]
    Map(#[from] MapError),
    /// Attack rejected.
    #[error(transparent)]
    Combat(#[from] CombatError),
    /// Unknown map name.
    #[error("no map named {0:?}")]
    UnknownMap(String),
    /// Request does not fit the game's phase.
    #[error("request not valid in phase {0:?}")]
    WrongPhase(GamePhase),
    /// Acting outside of one's turn.
    #[error("not your turn")]
    NotYourTurn,
    /// Initial deployment sent twice.
    #[error("deployment already submitted")]
    AlreadySubmitted,
    /// Unknown unit id.
    #[error("no unit {0}")]
    NoSuchUnit(UnitId),
    /// Commanding an enemy unit.
    #[error("unit {0} is not yours")]
    NotYourUnit(UnitId),
    /// Attacking a friendly unit.
    #[error("unit {0} is friendly")]
    FriendlyTarget(UnitId),
    /// Unit has been destroyed.
    #[error("unit {0} is destroyed")]
    Destroyed(UnitId),
    /// Unit is still in reserve.
    #[error("unit {0} is not deployed")]
    NotDeployed(UnitId),
    /// Unit is already on the map.
    #[error("unit {0} is already deployed")]
    AlreadyDeployed(UnitId),
    /// Unit listed twice in one deployment.
    #[error("unit {0} listed twice")]
    DuplicateUnit(UnitId),
    /// Unit has used its action this turn.
    #[error("unit {0} has no action left")]
    NoAction(UnitId),
    /// Destination not in the movement map.
    #[error("cannot reach {0}")]
    Unreachable(Position),
    /// Initial placement outside the deployment zone.
    #[error("{0} is outside the deployment zone")]
    OutsideDeploymentZone(Position),
    /// In-turn deployment outside the reinforcement zone.
    #[error("{0} is outside the reinforcement zone")]
    OutsideReinforcementZone(Position),
    /// Only fresh infantry can entrench.
    #[error("unit {0} cannot entrench")]
    CannotEntrench(UnitId),
    /// Reinforcing a unit at full strength.
    #[error("unit {0} is at full strength")]
    NotDamaged(UnitId),
    /// Not enough reinforcement points.
    #[error("costs {cost} points but only {available} remain")]
    InsufficientPoints {
        /// Price.
        cost: u32,
        /// Balance.
        available: u32,
    },
}

// =============================================================================
// GAME
// =============================================================================

#[derive(Clone, Debug)]
struct SideState {
    faction_id: u32,
    reinforcement_points: u32,
    /// First-turn request, set once the initial deployment is in.
    deployment: Option<bool>,
}

/// A running game.
#[derive(Debug)]
pub struct Game {
    pub(in crate::game) config: GameConfiguration,
    pub(in crate::game) catalog: Arc<Catalog>,
    pub(in crate::game) map: Map,
    pub(in crate::game) units: BTreeMap<UnitId, Unit>,
    pub(in crate::game) next_unit_id: u32,
    sides: [SideState; 2],
    pub(in crate::game) phase: GamePhase,
    pub(in crate::game) active: Side,
    pub(in crate::game) first: Side,
    pub(in crate::game) turn: u32,
    outcome: Option<(GameOutcome, Option<Side>)>,
    pub(in crate::game) rng: DeterministicRng,
    events: Vec<GameEvent>,
}

impl Game {
    /// Create a game from two validated armies.
    ///
    /// Unit ids are handed out in army order, side 1 first.
    pub fn new(
        config: GameConfiguration,
        map: Map,
        catalog: Arc<Catalog>,
        armies: [&BaseArmy; 2],
        rng: DeterministicRng,
    ) -> Result<Self, GameError> {
        let mut units = BTreeMap::new();
        let mut next_unit_id = 0u32;

        let mut enlist = |side: Side, army: &BaseArmy| -> Result<SideState, GameError> {
            let spent = validate_army(&catalog, army, config.points)?;
            for unit_config in &army.units {
                let (unit_type, upgrades) = resolve_unit(&catalog, army.faction_id, unit_config)?;
                let id = UnitId(next_unit_id);
                next_unit_id += 1;
                units.insert(id, Unit::new(id, side, army.faction_id, unit_type, &upgrades));
            }
            Ok(SideState {
                faction_id: army.faction_id,
                reinforcement_points: reinforcement_points(config.points, spent),
                deployment: None,
            })
        };
        let sides = [enlist(Side::Side1, armies[0])?, enlist(Side::Side2, armies[1])?];

        Ok(Self {
            config,
            catalog,
            map,
            units,
            next_unit_id,
            sides,
            phase: GamePhase::Deployment,
            active: Side::Side1,
            first: Side::Side1,
            turn: 0,
            outcome: None,
            rng,
            events: Vec::new(),
        })
    }

    /// Game settings.
    pub fn config(&self) -> &GameConfiguration {
        &self.config
    }

    /// The battlefield.
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Side whose turn it is. Meaningless outside [`GamePhase::Playing`].
    pub fn active_side(&self) -> Side {
        self.active
    }

    /// Side that moved first.
    pub fn first_side(&self) -> Side {
        self.first
    }

    /// Current round, starting at 1 once play begins.
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Outcome and winner once ended.
    pub fn outcome(&self) -> Option<(GameOutcome, Option<Side>)> {
        self.outcome
    }

    /// Whether the game has been decided.
    pub fn is_over(&self) -> bool {
        self.phase == GamePhase::Ended
    }

    /// Look up a unit.
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// All units of one side, in id order.
    pub fn units_of(&self, side: Side) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.side() == side)
    }

    /// Reinforcement point balance.
    pub fn reinforcement_points(&self, side: Side) -> u32 {
        self.sides[side.index()].reinforcement_points
    }

    pub(in crate::game) fn reinforcement_points_mut(&mut self, side: Side) -> &mut u32 {
        &mut self.sides[side.index()].reinforcement_points
    }

    /// Faction of a side.
    pub fn faction(&self, side: Side) -> u32 {
        self.sides[side.index()].faction_id
    }

    /// Whether a side has submitted its initial deployment.
    pub fn has_deployed(&self, side: Side) -> bool {
        self.sides[side.index()].deployment.is_some()
    }

    pub(in crate::game) fn first_turn_request(&self, side: Side) -> Option<bool> {
        self.sides[side.index()].deployment
    }

    pub(in crate::game) fn set_first_turn_request(&mut self, side: Side, requested: bool) {
        self.sides[side.index()].deployment = Some(requested);
    }

    /// A side's army with server-assigned unit ids.
    pub fn army(&self, side: Side) -> BaseArmy {
        BaseArmy {
            faction_id: self.faction(side),
            units: self.units_of(side).map(Unit::configuration).collect(),
        }
    }

    /// Queue an event for the network layer.
    pub(in crate::game) fn push_event(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Drain queued events in the order they happened.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Close the game with an outcome. Later calls are ignored.
    pub(in crate::game) fn finish(&mut self, outcome: GameOutcome, winner: Option<Side>) {
        if self.phase == GamePhase::Ended {
            return;
        }
        self.phase = GamePhase::Ended;
        self.outcome = Some((outcome, winner));
        self.push_event(GameEvent::GameEnded { outcome, winner });
    }

    /// `side` gives up; the opponent wins.
    pub fn surrender(&mut self, side: Side) {
        self.finish(GameOutcome::Surrender, Some(side.opponent()));
    }

    /// `side` left the game; the opponent wins.
    pub fn forfeit(&mut self, side: Side) {
        self.finish(GameOutcome::Desertion, Some(side.opponent()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::army::UnitConfiguration;

    fn army(types: &[u32]) -> BaseArmy {
        BaseArmy {
            faction_id: 1,
            units: types.iter().map(|&t| UnitConfiguration::new(1, t)).collect(),
        }
    }

    fn config(points: u32) -> GameConfiguration {
        GameConfiguration {
            map: "skirmish".to_string(),
            points,
            turn_limit: 10,
            deployment_time: 120,
            turn_time: 60,
        }
    }

    #[test]
    fn test_side_opponent() {
        assert_eq!(Side::Side1.opponent(), Side::Side2);
        assert_eq!(Side::Side2.opponent().index(), 0);
    }

    #[test]
    fn test_new_game_assigns_ids_in_order() {
        let game = Game::new(
            config(100),
            Map::skirmish(),
            Arc::new(Catalog::builtin()),
            [&army(&[1, 1]), &army(&[2])],
            DeterministicRng::new(1),
        )
        .unwrap();

        let side1: Vec<UnitId> = game.units_of(Side::Side1).map(|u| u.id()).collect();
        let side2: Vec<UnitId> = game.units_of(Side::Side2).map(|u| u.id()).collect();
        assert_eq!(side1, vec![UnitId(0), UnitId(1)]);
        assert_eq!(side2, vec![UnitId(2)]);
        assert_eq!(game.phase(), GamePhase::Deployment);
        // 0.5 * 60 + 20
        assert_eq!(game.reinforcement_points(Side::Side1), 50);
        assert_eq!(game.army(Side::Side2).units[0].unit_id, Some(UnitId(2)));
    }

    #[test]
    fn test_new_game_rejects_overspend() {
        let result = Game::new(
            config(40),
            Map::skirmish(),
            Arc::new(Catalog::builtin()),
            [&army(&[1]), &army(&[2])],
            DeterministicRng::new(1),
        );
        assert!(matches!(result, Err(GameError::Army(ArmyError::Overspent { .. }))));
    }

    #[test]
    fn test_surrender_ends_once() {
        let mut game = Game::new(
            config(100),
            Map::skirmish(),
            Arc::new(Catalog::builtin()),
            [&army(&[1]), &army(&[1])],
            DeterministicRng::new(1),
        )
        .unwrap();
        game.surrender(Side::Side2);
        game.forfeit(Side::Side1);
        assert_eq!(game.outcome(), Some((GameOutcome::Surrender, Some(Side::Side1))));
        let events = game.take_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
    }
}
