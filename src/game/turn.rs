//! Turn sequencing.
//!
//! Initial deployment, the alternating turn loop, every in-turn action and
//! the end-of-game checks that follow them. Every method either applies its
//! change completely and queues the matching events, or rejects the request
//! with a [`GameError`] and leaves the game untouched.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::core::hex::Position;
use crate::game::army::{resolve_unit, unit_price, ArmyError, UnitConfiguration};
use crate::game::catalog::UnitClass;
use crate::game::combat::{check_attack, exchange, interception_factor, losses};
use crate::game::events::{GameEvent, GameOutcome, ReinforcementState, UnitCasualties, UnitPosition};
use crate::game::map::MapError;
use crate::game::state::{Game, GameError, GamePhase, Side, UnitId};
use crate::game::unit::{Unit, STRENGTH_MAX};

/// Strength lost per turn by infantry cut off from supply.
pub const INFANTRY_ATTRITION: f64 = 0.1;

/// Strength lost per turn by motorized units cut off from supply.
pub const MOTORIZED_ATTRITION: f64 = 0.2;

/// Turns out of supply a unit tolerates before attrition starts.
pub const SUPPLY_GRACE_TURNS: u32 = 1;

impl Game {
    // =========================================================================
    // LOOKUPS
    // =========================================================================

    fn ensure_turn(&self, side: Side) -> Result<(), GameError> {
        if self.phase != GamePhase::Playing {
            return Err(GameError::WrongPhase(self.phase));
        }
        if self.active != side {
            return Err(GameError::NotYourTurn);
        }
        Ok(())
    }

    fn own_unit(&self, side: Side, id: UnitId) -> Result<&Unit, GameError> {
        let unit = self.units.get(&id).ok_or(GameError::NoSuchUnit(id))?;
        if unit.side() != side {
            return Err(GameError::NotYourUnit(id));
        }
        if !unit.is_alive() {
            return Err(GameError::Destroyed(id));
        }
        Ok(unit)
    }

    fn own_deployed_unit(&self, side: Side, id: UnitId) -> Result<&Unit, GameError> {
        let unit = self.own_unit(side, id)?;
        if !unit.is_deployed() {
            return Err(GameError::NotDeployed(id));
        }
        Ok(unit)
    }

    fn unit_mut(&mut self, id: UnitId) -> Result<&mut Unit, GameError> {
        self.units.get_mut(&id).ok_or(GameError::NoSuchUnit(id))
    }

    // =========================================================================
    // DEPLOYMENT
    // =========================================================================

    /// Place `side`'s opening units and record its first-turn request.
    ///
    /// Units not listed stay in reserve. Once both sides are in, play starts.
    pub fn submit_deployment(
        &mut self,
        side: Side,
        requested_first_turn: bool,
        placements: &[UnitPosition],
    ) -> Result<(), GameError> {
        if self.phase != GamePhase::Deployment {
            return Err(GameError::WrongPhase(self.phase));
        }
        if self.has_deployed(side) {
            return Err(GameError::AlreadySubmitted);
        }

        let mut seen_units = BTreeSet::new();
        let mut seen_hexes = BTreeSet::new();
        for placement in placements {
            let unit = self.own_unit(side, placement.unit_id)?;
            if unit.is_deployed() {
                return Err(GameError::AlreadyDeployed(placement.unit_id));
            }
            if !seen_units.insert(placement.unit_id) {
                return Err(GameError::DuplicateUnit(placement.unit_id));
            }
            if !self.map.in_deployment_zone(placement.position, side) {
                return Err(GameError::OutsideDeploymentZone(placement.position));
            }
            let occupied = self
                .map
                .hex(placement.position)
                .is_some_and(|h| h.occupant().is_some());
            if occupied || !seen_hexes.insert(placement.position) {
                return Err(MapError::Occupied(placement.position).into());
            }
        }

        for placement in placements {
            let unit = self
                .units
                .get_mut(&placement.unit_id)
                .ok_or(GameError::NoSuchUnit(placement.unit_id))?;
            self.map.place(unit, placement.position)?;
        }
        self.set_first_turn_request(side, requested_first_turn);
        debug!(%side, units = placements.len(), "initial deployment submitted");

        if Side::BOTH.iter().all(|s| self.has_deployed(*s)) {
            self.start_play();
        }
        Ok(())
    }

    fn deployed_positions(&self, side: Side) -> Vec<UnitPosition> {
        self.units_of(side)
            .filter_map(|u| {
                u.position().map(|position| UnitPosition {
                    unit_id: u.id(),
                    position,
                })
            })
            .collect()
    }

    fn start_play(&mut self) {
        let side1 = self.deployed_positions(Side::Side1);
        let side2 = self.deployed_positions(Side::Side2);
        self.push_event(GameEvent::DeploymentComplete { side1, side2 });

        let first = match (
            self.first_turn_request(Side::Side1),
            self.first_turn_request(Side::Side2),
        ) {
            (Some(true), Some(false)) => Side::Side1,
            (Some(false), Some(true)) => Side::Side2,
            _ => {
                if self.rng.coin_flip() {
                    Side::Side1
                } else {
                    Side::Side2
                }
            }
        };

        self.phase = GamePhase::Playing;
        self.first = first;
        self.turn = 1;
        self.begin_turn(first);
    }

    // =========================================================================
    // TURN LOOP
    // =========================================================================

    fn begin_turn(&mut self, side: Side) {
        self.active = side;

        let ids: Vec<UnitId> = self
            .units_of(side)
            .filter(|u| u.is_alive())
            .map(|u| u.id())
            .collect();

        let mut attrition = Vec::new();
        let mut destroyed = Vec::new();
        for id in ids {
            let supplied = self
                .units
                .get(&id)
                .and_then(|u| u.position())
                .map(|position| self.map.is_supplied(position, side));
            let Some(unit) = self.units.get_mut(&id) else {
                continue;
            };
            unit.start_turn();

            let Some(supplied) = supplied else {
                continue;
            };
            let loss = match unit.class() {
                UnitClass::Infantry => INFANTRY_ATTRITION,
                UnitClass::Motorized => MOTORIZED_ATTRITION,
                UnitClass::Air => continue,
            };
            if unit.track_supply(supplied) > SUPPLY_GRACE_TURNS {
                let strength = unit.apply_loss(loss);
                unit.exhaust();
                attrition.push(UnitCasualties {
                    unit_id: id,
                    new_strength: strength,
                    exhausted: Some(true),
                });
                if !unit.is_alive() {
                    destroyed.push(id);
                }
            }
        }

        debug!(%side, turn = self.turn, attrition = attrition.len(), "turn started");
        self.push_event(GameEvent::NewTurn { active: side, attrition });
        for id in destroyed {
            self.destroy(id);
        }
        self.check_annihilation();
    }

    /// Hand the turn to the opponent.
    ///
    /// When the side that moved first is up again a new round starts; past
    /// the turn limit the game is decided by hex control.
    pub fn end_turn(&mut self, side: Side) -> Result<(), GameError> {
        self.ensure_turn(side)?;
        let next = side.opponent();
        if next == self.first {
            self.turn += 1;
            if self.turn > self.config.turn_limit {
                self.decide_by_control();
                return Ok(());
            }
        }
        self.begin_turn(next);
        Ok(())
    }

    fn decide_by_control(&mut self) {
        let side1 = self.map.owned_by(Side::Side1);
        let side2 = self.map.owned_by(Side::Side2);
        match side1.cmp(&side2) {
            std::cmp::Ordering::Greater => self.finish(GameOutcome::Domination, Some(Side::Side1)),
            std::cmp::Ordering::Less => self.finish(GameOutcome::Domination, Some(Side::Side2)),
            std::cmp::Ordering::Equal => self.finish(GameOutcome::Draw, None),
        }
    }

    fn destroy(&mut self, id: UnitId) {
        if let Some(unit) = self.units.get_mut(&id) {
            let side = unit.side();
            self.map.vacate(unit);
            self.push_event(GameEvent::UnitDestroyed { unit_id: id, side });
        }
    }

    fn check_annihilation(&mut self) {
        if self.phase != GamePhase::Playing {
            return;
        }
        let alive = |game: &Game, side: Side| game.units_of(side).any(|u| u.is_alive());
        match (alive(self, Side::Side1), alive(self, Side::Side2)) {
            (true, true) => {}
            (false, false) => self.finish(GameOutcome::MutualAnnihilation, None),
            (true, false) => self.finish(GameOutcome::Annihilation, Some(Side::Side1)),
            (false, true) => self.finish(GameOutcome::Annihilation, Some(Side::Side2)),
        }
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Move a unit along the cheapest path to `destination`.
    pub fn move_unit(&mut self, side: Side, id: UnitId, destination: Position) -> Result<(), GameError> {
        self.ensure_turn(side)?;
        let unit = self.own_deployed_unit(side, id)?;
        let remaining = *self
            .map
            .movement_map(unit)
            .get(&destination)
            .ok_or(GameError::Unreachable(destination))?;

        let unit = self.units.get_mut(&id).ok_or(GameError::NoSuchUnit(id))?;
        unit.set_entrenched(false);
        self.map.place(unit, destination)?;
        unit.set_moved(remaining);

        let mut captures = Vec::new();
        if self.map.capture(destination, side) {
            captures.push(destination);
        }
        self.push_event(GameEvent::UnitMoved {
            unit_id: id,
            position: destination,
            remaining,
            captures,
        });
        Ok(())
    }

    /// Dig in an infantry unit that has neither moved nor acted this turn.
    pub fn entrench_unit(&mut self, side: Side, id: UnitId) -> Result<(), GameError> {
        self.ensure_turn(side)?;
        let unit = self.own_deployed_unit(side, id)?;
        if unit.class() != UnitClass::Infantry || unit.has_moved() || unit.is_entrenched() {
            return Err(GameError::CannotEntrench(id));
        }
        if !unit.can_act() {
            return Err(GameError::NoAction(id));
        }

        let unit = self.units.get_mut(&id).ok_or(GameError::NoSuchUnit(id))?;
        unit.set_entrenched(true);
        unit.exhaust();
        self.map.refresh_stats(unit);
        self.push_event(GameEvent::UnitEntrenched { unit_id: id });
        Ok(())
    }

    /// Resolve an attack of `attacker_id` on `defender_id`.
    pub fn attack_unit(&mut self, side: Side, attacker_id: UnitId, defender_id: UnitId) -> Result<(), GameError> {
        self.ensure_turn(side)?;
        let attacker = self.own_deployed_unit(side, attacker_id)?;
        if !attacker.can_act() {
            return Err(GameError::NoAction(attacker_id));
        }
        let defender = self
            .units
            .get(&defender_id)
            .ok_or(GameError::NoSuchUnit(defender_id))?;
        if defender.side() == side {
            return Err(GameError::FriendlyTarget(defender_id));
        }
        if !defender.is_alive() {
            return Err(GameError::Destroyed(defender_id));
        }
        if !defender.is_deployed() {
            return Err(GameError::NotDeployed(defender_id));
        }
        check_attack(attacker, defender)?;

        let interception = if attacker.is_air() {
            interception_factor(attacker.stats().anti_air_defence, self.anti_air_pressure(defender))
        } else {
            1.0
        };
        let river = match (attacker.position(), defender.position()) {
            (Some(a), Some(d)) if !attacker.is_air() => self.map.river_between(a, d),
            _ => false,
        };
        let result = exchange(attacker, defender, interception, river);
        let loss = losses(result, attacker.strength(), defender.strength());

        let attacker = self
            .units
            .get_mut(&attacker_id)
            .ok_or(GameError::NoSuchUnit(attacker_id))?;
        let attacker_strength = attacker.apply_loss(loss.attacker);
        attacker.consume_action();
        attacker.set_entrenched(false);
        self.map.refresh_stats(attacker);
        let attacker_alive = attacker.is_alive();

        let defender = self.unit_mut(defender_id)?;
        let defender_strength = defender.apply_loss(loss.defender);
        let defender_alive = defender.is_alive();

        debug!(
            attacker = %attacker_id,
            defender = %defender_id,
            attacker_strength,
            defender_strength,
            "combat resolved"
        );
        self.push_event(GameEvent::UnitAttacked {
            attacker: UnitCasualties {
                unit_id: attacker_id,
                new_strength: attacker_strength,
                exhausted: None,
            },
            defender: UnitCasualties {
                unit_id: defender_id,
                new_strength: defender_strength,
                exhausted: None,
            },
        });
        if !attacker_alive {
            self.destroy(attacker_id);
        }
        if !defender_alive {
            self.destroy(defender_id);
        }
        self.check_annihilation();
        Ok(())
    }

    /// Sum of `air_attack * strength` over the target side's anti-air units
    /// covering `target`.
    fn anti_air_pressure(&self, target: &Unit) -> f64 {
        let Some(at) = target.position() else {
            return 0.0;
        };
        self.units_of(target.side())
            .filter(|u| u.is_alive() && u.stats().is_anti_air())
            .filter_map(|u| {
                let position = u.position()?;
                let range = u.stats().anti_air_range.unwrap_or(0).max(0) as u32;
                (position.distance(at) <= range)
                    .then(|| u.stats().air_attack.unwrap_or(0) as f64 * u.strength())
            })
            .sum()
    }

    /// Bring a reserve unit onto the map inside the reinforcement zone.
    pub fn deploy_unit(&mut self, side: Side, id: UnitId, position: Position) -> Result<(), GameError> {
        self.ensure_turn(side)?;
        let unit = self.own_unit(side, id)?;
        if unit.is_deployed() {
            return Err(GameError::AlreadyDeployed(id));
        }
        if !self.map.in_reinforcement_zone(position, side) {
            return Err(GameError::OutsideReinforcementZone(position));
        }

        let unit = self.units.get_mut(&id).ok_or(GameError::NoSuchUnit(id))?;
        self.map.place(unit, position)?;
        unit.exhaust();
        self.push_event(GameEvent::UnitDeployed(UnitPosition { unit_id: id, position }));
        Ok(())
    }

    /// Restore a damaged unit to full strength for reinforcement points.
    pub fn reinforce_unit(&mut self, side: Side, id: UnitId) -> Result<(), GameError> {
        self.ensure_turn(side)?;
        let unit = self.own_deployed_unit(side, id)?;
        if !unit.can_act() {
            return Err(GameError::NoAction(id));
        }
        if unit.strength() >= STRENGTH_MAX {
            return Err(GameError::NotDamaged(id));
        }
        let cost = (unit.price() as f64 * (1.0 - unit.strength())).ceil() as u32;
        let available = self.reinforcement_points(side);
        if cost > available {
            return Err(GameError::InsufficientPoints { cost, available });
        }

        *self.reinforcement_points_mut(side) = available - cost;
        let unit = self.unit_mut(id)?;
        unit.restore_strength();
        unit.consume_action();
        let new_strength = unit.strength();
        self.push_event(GameEvent::UnitReinforced {
            reinforcement: ReinforcementState {
                side,
                points_remaining: available - cost,
            },
            unit_id: id,
            new_strength,
        });
        Ok(())
    }

    /// Buy a new unit into `side`'s reserve.
    pub fn purchase_unit(&mut self, side: Side, config: &UnitConfiguration) -> Result<UnitId, GameError> {
        self.ensure_turn(side)?;
        let catalog = Arc::clone(&self.catalog);
        let faction_id = self.faction(side);
        let (unit_type, upgrades) = resolve_unit(&catalog, faction_id, config)?;

        if let Some(limit) = unit_type.limit {
            let owned = self
                .units_of(side)
                .filter(|u| u.configuration().unit_type_id == unit_type.id)
                .count() as u32;
            if owned >= limit {
                return Err(ArmyError::LimitExceeded {
                    unit_type: unit_type.id,
                    limit,
                }
                .into());
            }
        }
        let cost = unit_price(unit_type, &upgrades);
        let available = self.reinforcement_points(side);
        if cost > available {
            return Err(GameError::InsufficientPoints { cost, available });
        }

        *self.reinforcement_points_mut(side) = available - cost;
        let id = UnitId(self.next_unit_id);
        self.next_unit_id += 1;
        let unit = Unit::new(id, side, faction_id, unit_type, &upgrades);
        let configuration = unit.configuration();
        self.units.insert(id, unit);
        self.push_event(GameEvent::UnitPurchased {
            reinforcement: ReinforcementState {
                side,
                points_remaining: available - cost,
            },
            unit: configuration,
        });
        Ok(id)
    }
}
