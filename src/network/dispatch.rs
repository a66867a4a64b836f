//! Message Dispatch
//!
//! Turns one inbound frame into directory calls and game events into
//! per-player messages. Runs with the directory lock held.

use tracing::{debug, warn};

use crate::game::events::GameEvent;
use crate::game::state::Side;
use crate::network::directory::{ClientFault, Directory};
use crate::network::protocol::{peek_kind, ClientMessage, ServerMessage};
use crate::network::session::SessionId;

/// What the connection should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep reading.
    Continue,
    /// Stop reading; the session is finished.
    Close,
}

impl Directory {
    /// Handle one frame payload from `id`.
    ///
    /// Kinds the session does not expect in its current state are dropped
    /// without decoding. Unknown kinds, malformed bodies and rejected requests
    /// get a single error report before the close.
    pub fn handle_frame(&mut self, id: SessionId, payload: &[u8]) -> Disposition {
        let Some(state) = self.session(id).map(|s| s.state) else {
            return Disposition::Close;
        };

        let kind = match peek_kind(payload) {
            Ok(kind) => kind,
            Err(e) => {
                warn!("Session {}: {}", id, e);
                self.fail(id, e.to_string());
                return Disposition::Close;
            }
        };
        if !state.expects(kind) {
            debug!("Session {} dropped {:?} while {:?}", id, kind, state);
            return Disposition::Continue;
        }

        let message = match ClientMessage::from_bytes(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Session {}: {}", id, e);
                self.fail(id, e.to_string());
                return Disposition::Close;
            }
        };

        match self.handle_message(id, message) {
            Ok(disposition) => disposition,
            Err(fault) => {
                warn!("Session {} rejected: {}", id, fault);
                self.fail(id, fault.to_string());
                Disposition::Close
            }
        }
    }

    fn handle_message(&mut self, id: SessionId, message: ClientMessage) -> Result<Disposition, ClientFault> {
        let reply = match message {
            ClientMessage::Error { message } => {
                self.client_error(id, &message);
                return Ok(Disposition::Close);
            }
            ClientMessage::Login {
                name,
                key_hash,
                client_version,
            } => {
                let outcome = self.login(id, &name, key_hash.as_deref(), client_version);
                Some(ServerMessage::LoginReply {
                    outcome,
                    server_version: self.config().protocol_version,
                })
            }
            ClientMessage::RequestSalt => Some(ServerMessage::SaltReply {
                salt: self.config().salt.clone(),
            }),
            ClientMessage::Register { name, key_hash } => {
                let outcome = self.register(&name, &key_hash)?;
                Some(ServerMessage::RegistrationReply { outcome })
            }
            ClientMessage::CreateGame {
                army,
                is_private,
                settings,
            } => {
                let private_key = self.create_game(id, army, is_private, &settings)?;
                Some(ServerMessage::CreateGameReply { private_key })
            }
            ClientMessage::ViewPublicGames => Some(ServerMessage::ViewPublicGamesReply {
                games: self.public_games(),
            }),
            ClientMessage::JoinGame { army, target } => {
                if self.join_game(id, army, &target)? {
                    None
                } else {
                    Some(ServerMessage::NoSuchGame)
                }
            }
            ClientMessage::CancelGame => {
                self.cancel_game(id);
                Some(ServerMessage::CancelGameConfirmation)
            }
            ClientMessage::InitialDeployment {
                requested_first_turn,
                units,
            } => {
                self.play(id, |game, side| {
                    game.submit_deployment(side, requested_first_turn, &units)
                })?;
                None
            }
            ClientMessage::MoveUnit { unit_id, position } => {
                self.play(id, |game, side| game.move_unit(side, unit_id, position))?;
                None
            }
            ClientMessage::EntrenchUnit { unit_id } => {
                self.play(id, |game, side| game.entrench_unit(side, unit_id))?;
                None
            }
            ClientMessage::AttackUnit { attacker, defender } => {
                self.play(id, |game, side| game.attack_unit(side, attacker, defender))?;
                None
            }
            ClientMessage::DeployUnit { unit_id, position } => {
                self.play(id, |game, side| game.deploy_unit(side, unit_id, position))?;
                None
            }
            ClientMessage::ReinforceUnit { unit_id } => {
                self.play(id, |game, side| game.reinforce_unit(side, unit_id))?;
                None
            }
            ClientMessage::PurchaseUnit { unit } => {
                self.play(id, |game, side| game.purchase_unit(side, &unit).map(|_| ()))?;
                None
            }
            ClientMessage::EndTurn => {
                self.play(id, |game, side| game.end_turn(side))?;
                None
            }
            ClientMessage::Surrender => {
                self.play(id, |game, side| {
                    game.surrender(side);
                    Ok(())
                })?;
                None
            }
        };

        if let Some(reply) = reply {
            self.send(id, reply);
        }
        Ok(Disposition::Continue)
    }
}

/// The message `recipient` receives for a game event.
pub fn event_message(event: &GameEvent, recipient: Side) -> ServerMessage {
    match event {
        GameEvent::DeploymentComplete { side1, side2 } => {
            let (my_units, enemy_units) = match recipient {
                Side::Side1 => (side1.clone(), side2.clone()),
                Side::Side2 => (side2.clone(), side1.clone()),
            };
            ServerMessage::InitialDeployment {
                my_units,
                enemy_units,
            }
        }
        GameEvent::NewTurn { active, attrition } => ServerMessage::NewTurn {
            active: *active,
            attrition: attrition.clone(),
        },
        GameEvent::UnitMoved {
            unit_id,
            position,
            remaining,
            captures,
        } => ServerMessage::UnitMove {
            unit_id: *unit_id,
            position: *position,
            remaining_movement: *remaining,
            captures: captures.clone(),
        },
        GameEvent::UnitEntrenched { unit_id } => ServerMessage::UnitEntrenched { unit_id: *unit_id },
        GameEvent::UnitAttacked { attacker, defender } => ServerMessage::UnitAttack {
            attacker: *attacker,
            defender: *defender,
        },
        GameEvent::UnitDestroyed { unit_id, side } => ServerMessage::UnitDestroyed {
            unit_id: *unit_id,
            side: *side,
        },
        GameEvent::UnitDeployed(placement) => ServerMessage::UnitDeployed {
            unit_id: placement.unit_id,
            position: placement.position,
        },
        GameEvent::UnitReinforced {
            reinforcement,
            unit_id,
            new_strength,
        } => ServerMessage::UnitReinforced {
            reinforcement: *reinforcement,
            unit_id: *unit_id,
            new_strength: *new_strength,
        },
        GameEvent::UnitPurchased { reinforcement, unit } => ServerMessage::UnitPurchased {
            reinforcement: *reinforcement,
            unit: unit.clone(),
        },
        GameEvent::GameEnded { outcome, winner } => ServerMessage::GameEnd {
            outcome: *outcome,
            winner: *winner,
        },
    }
}
