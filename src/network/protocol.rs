//! Protocol Messages
//!
//! The two envelope types exchanged with clients, bincode-encoded inside
//! length-prefixed frames. bincode writes an enum's variant index as a
//! little-endian `u32` first, so the first four bytes of every client payload
//! are its [`ClientMessageKind`]. The session peeks at that before decoding
//! the body.
//!
//! Variant order is part of the wire format. Append, never reorder.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::hex::Position;
use crate::game::army::{BaseArmy, UnitConfiguration};
use crate::game::events::{GameOutcome, ReinforcementState, UnitCasualties, UnitPosition};
use crate::game::state::{GameConfiguration, Side, UnitId};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Settings requested when offering a game. Unset values use server defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    /// Map name.
    pub map: String,
    /// Army points per side.
    pub points: Option<u32>,
    /// Turn limit.
    pub turn_limit: Option<u32>,
    /// Advisory deployment seconds.
    pub deployment_time: Option<u32>,
    /// Advisory seconds per turn.
    pub turn_time: Option<u32>,
}

impl GameSettings {
    /// Settings for `map` with every other value defaulted.
    pub fn for_map(map: impl Into<String>) -> Self {
        Self {
            map: map.into(),
            points: None,
            turn_limit: None,
            deployment_time: None,
            turn_time: None,
        }
    }
}

/// Which open game to join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinTarget {
    /// Public game, identified by its owner's name.
    Public {
        /// Owner name.
        owner: String,
    },
    /// Private game, identified by the key handed to its owner.
    Private {
        /// Hex join key.
        key: String,
    },
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// The client hit a fatal error and is leaving.
    Error {
        /// Description.
        message: String,
    },
    /// Log in as a guest (no key hash) or as a registered player.
    Login {
        /// Player name.
        name: String,
        /// `SHA-512(salt || password)` for registered players.
        key_hash: Option<Vec<u8>>,
        /// Client protocol revision.
        client_version: u32,
    },
    /// Create an account. The connection stays logged out.
    Register {
        /// Account name.
        name: String,
        /// `SHA-512(salt || password)`.
        key_hash: Vec<u8>,
    },
    /// Offer a game.
    CreateGame {
        /// Creator's army.
        army: BaseArmy,
        /// Hide from the public list and hand out a join key instead.
        is_private: bool,
        /// Requested settings.
        settings: GameSettings,
    },
    /// List open public games.
    ViewPublicGames,
    /// Accept an open game.
    JoinGame {
        /// Joiner's army.
        army: BaseArmy,
        /// Game to join.
        target: JoinTarget,
    },
    /// Withdraw one's own offer.
    CancelGame,
    /// Opening placement.
    InitialDeployment {
        /// Whether this player wants to move first.
        requested_first_turn: bool,
        /// Units to place; the rest stay in reserve.
        units: Vec<UnitPosition>,
    },
    /// Move a unit.
    MoveUnit {
        /// Unit id.
        unit_id: UnitId,
        /// Destination hex.
        position: Position,
    },
    /// Dig in an infantry unit.
    EntrenchUnit {
        /// Unit id.
        unit_id: UnitId,
    },
    /// Attack an enemy unit.
    AttackUnit {
        /// Own unit.
        attacker: UnitId,
        /// Enemy unit.
        defender: UnitId,
    },
    /// Bring a reserve unit onto the map.
    DeployUnit {
        /// Unit id.
        unit_id: UnitId,
        /// Reinforcement zone hex.
        position: Position,
    },
    /// Restore a damaged unit with reinforcement points.
    ReinforceUnit {
        /// Unit id.
        unit_id: UnitId,
    },
    /// Buy a new reserve unit with reinforcement points.
    PurchaseUnit {
        /// Unit to buy.
        unit: UnitConfiguration,
    },
    /// Pass the turn.
    EndTurn,
    /// Give up.
    Surrender,
    /// Ask for the salt to hash passwords with before logging in or registering.
    RequestSalt,
}

/// Discriminant of a [`ClientMessage`], equal to its bincode variant index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum ClientMessageKind {
    /// [`ClientMessage::Error`]
    Error = 0,
    /// [`ClientMessage::Login`]
    Login,
    /// [`ClientMessage::Register`]
    Register,
    /// [`ClientMessage::CreateGame`]
    CreateGame,
    /// [`ClientMessage::ViewPublicGames`]
    ViewPublicGames,
    /// [`ClientMessage::JoinGame`]
    JoinGame,
    /// [`ClientMessage::CancelGame`]
    CancelGame,
    /// [`ClientMessage::InitialDeployment`]
    InitialDeployment,
    /// [`ClientMessage::MoveUnit`]
    MoveUnit,
    /// [`ClientMessage::EntrenchUnit`]
    EntrenchUnit,
    /// [`ClientMessage::AttackUnit`]
    AttackUnit,
    /// [`ClientMessage::DeployUnit`]
    DeployUnit,
    /// [`ClientMessage::ReinforceUnit`]
    ReinforceUnit,
    /// [`ClientMessage::PurchaseUnit`]
    PurchaseUnit,
    /// [`ClientMessage::EndTurn`]
    EndTurn,
    /// [`ClientMessage::Surrender`]
    Surrender,
    /// [`ClientMessage::RequestSalt`]
    RequestSalt,
}

impl ClientMessageKind {
    /// Every kind in wire order.
    pub const ALL: [ClientMessageKind; 17] = [
        ClientMessageKind::Error,
        ClientMessageKind::Login,
        ClientMessageKind::Register,
        ClientMessageKind::CreateGame,
        ClientMessageKind::ViewPublicGames,
        ClientMessageKind::JoinGame,
        ClientMessageKind::CancelGame,
        ClientMessageKind::InitialDeployment,
        ClientMessageKind::MoveUnit,
        ClientMessageKind::EntrenchUnit,
        ClientMessageKind::AttackUnit,
        ClientMessageKind::DeployUnit,
        ClientMessageKind::ReinforceUnit,
        ClientMessageKind::PurchaseUnit,
        ClientMessageKind::EndTurn,
        ClientMessageKind::Surrender,
        ClientMessageKind::RequestSalt,
    ];

    /// Kind for a wire discriminant.
    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }
}

impl ClientMessage {
    /// Kind of this message.
    pub fn kind(&self) -> ClientMessageKind {
        match self {
            ClientMessage::Error { .. } => ClientMessageKind::Error,
            ClientMessage::Login { .. } => ClientMessageKind::Login,
            ClientMessage::Register { .. } => ClientMessageKind::Register,
            ClientMessage::CreateGame { .. } => ClientMessageKind::CreateGame,
            ClientMessage::ViewPublicGames => ClientMessageKind::ViewPublicGames,
            ClientMessage::JoinGame { .. } => ClientMessageKind::JoinGame,
            ClientMessage::CancelGame => ClientMessageKind::CancelGame,
            ClientMessage::InitialDeployment { .. } => ClientMessageKind::InitialDeployment,
            ClientMessage::MoveUnit { .. } => ClientMessageKind::MoveUnit,
            ClientMessage::EntrenchUnit { .. } => ClientMessageKind::EntrenchUnit,
            ClientMessage::AttackUnit { .. } => ClientMessageKind::AttackUnit,
            ClientMessage::DeployUnit { .. } => ClientMessageKind::DeployUnit,
            ClientMessage::ReinforceUnit { .. } => ClientMessageKind::ReinforceUnit,
            ClientMessage::PurchaseUnit { .. } => ClientMessageKind::PurchaseUnit,
            ClientMessage::EndTurn => ClientMessageKind::EndTurn,
            ClientMessage::Surrender => ClientMessageKind::Surrender,
            ClientMessage::RequestSalt => ClientMessageKind::RequestSalt,
        }
    }

    /// Serialize to a frame payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize a frame payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let kind = peek_kind(data)?;
        bincode::deserialize(data).map_err(|source| DecodeError::Malformed { kind, source })
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Login result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginOutcome {
    /// Logged in.
    Success,
    /// Guest name over the configured maximum.
    NameTooLong,
    /// Guest name taken by an account or a connected player.
    NameInUse,
    /// Guest login turned off.
    GuestLoginDisabled,
    /// No account with that name.
    NotFound,
    /// Account already in use by another connection.
    AlreadyLoggedIn,
    /// Key hash mismatch.
    InvalidPassword,
    /// Client protocol revision differs from the server's.
    IncompatibleVersion,
}

/// Registration result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationOutcome {
    /// Account created.
    Success,
    /// Registration turned off.
    Disabled,
    /// Name taken by an account or a connected player.
    NameTaken,
    /// Key hash is not 64 bytes.
    InvalidKeyHashSize,
    /// Name longer than the server allows.
    NameTooLong,
}

/// An open public game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicGame {
    /// Name of the player waiting.
    pub owner: String,
    /// Resolved settings.
    pub config: GameConfiguration,
}

/// Everything a player needs when a match begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStart {
    /// Resolved settings.
    pub config: GameConfiguration,
    /// The recipient's side.
    pub side: Side,
    /// The recipient's army with unit ids.
    pub my_army: BaseArmy,
    /// The opponent's army with unit ids.
    pub enemy_army: BaseArmy,
    /// Opponent name.
    pub opponent: String,
    /// The recipient's reinforcement balance.
    pub reinforcement_points: u32,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// The connection is about to be closed because of a client fault.
    Error {
        /// Description.
        message: String,
    },
    /// Reply to [`ClientMessage::Login`].
    LoginReply {
        /// Result.
        outcome: LoginOutcome,
        /// Server protocol revision.
        server_version: u32,
    },
    /// Reply to [`ClientMessage::Register`].
    RegistrationReply {
        /// Result.
        outcome: RegistrationOutcome,
    },
    /// The offer is open.
    CreateGameReply {
        /// Join key for private games.
        private_key: Option<String>,
    },
    /// Reply to [`ClientMessage::ViewPublicGames`].
    ViewPublicGamesReply {
        /// Open public games.
        games: Vec<PublicGame>,
    },
    /// A match began. Sent to both players.
    GameStart(GameStart),
    /// The requested game is gone.
    NoSuchGame,
    /// The offer was withdrawn.
    CancelGameConfirmation,
    /// Both opening placements, revealed once both are in.
    InitialDeployment {
        /// The recipient's placed units.
        my_units: Vec<UnitPosition>,
        /// The opponent's placed units.
        enemy_units: Vec<UnitPosition>,
    },
    /// A turn began.
    NewTurn {
        /// Side now acting.
        active: Side,
        /// Attrition suffered by the active side.
        attrition: Vec<UnitCasualties>,
    },
    /// A unit moved.
    UnitMove {
        /// Unit id.
        unit_id: UnitId,
        /// Destination.
        position: Position,
        /// Movement points left.
        remaining_movement: u32,
        /// Hexes that changed owner.
        captures: Vec<Position>,
    },
    /// A unit dug in.
    UnitEntrenched {
        /// Unit id.
        unit_id: UnitId,
    },
    /// Two units fought.
    UnitAttack {
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
    UnitDeployed {
        /// Unit id.
        unit_id: UnitId,
        /// Hex.
        position: Position,
    },
    /// A unit was restored.
    UnitReinforced {
        /// Paying side's balance.
        reinforcement: ReinforcementState,
        /// Unit id.
        unit_id: UnitId,
        /// Strength afterwards.
        new_strength: f64,
    },
    /// A unit was bought.
    UnitPurchased {
        /// Paying side's balance.
        reinforcement: ReinforcementState,
        /// The new unit, with its id.
        unit: UnitConfiguration,
    },
    /// The game is over.
    GameEnd {
        /// How it ended.
        outcome: GameOutcome,
        /// Winner, `None` on a draw or mutual annihilation.
        winner: Option<Side>,
    },
    /// Reply to [`ClientMessage::RequestSalt`].
    SaltReply {
        /// Bytes to prefix the password with before hashing.
        salt: Vec<u8>,
    },
}

impl ServerMessage {
    /// Fatal error report.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serialize to a frame payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize a frame payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// DECODING
// =============================================================================

/// Client payload decoding failures.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Fewer than four bytes: no kind to read.
    #[error("payload of {0} bytes has no message kind")]
    Truncated(usize),
    /// Kind outside the protocol.
    #[error("unknown message kind {0}")]
    UnknownKind(u32),
    /// Known kind with an unreadable body.
    #[error("malformed {kind:?} message: {source}")]
    Malformed {
        /// Kind from the header.
        kind: ClientMessageKind,
        /// bincode failure.
        source: bincode::Error,
    },
}

/// Classify a client payload without decoding its body.
pub fn peek_kind(data: &[u8]) -> Result<ClientMessageKind, DecodeError> {
    let header: [u8; 4] = data
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(DecodeError::Truncated(data.len()))?;
    let raw = u32::from_le_bytes(header);
    ClientMessageKind::from_u32(raw).ok_or(DecodeError::UnknownKind(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_of_each() -> Vec<ClientMessage> {
        let army = BaseArmy {
            faction_id: 1,
            units: vec![UnitConfiguration::new(1, 1).with_upgrade(1)],
        };
        vec![
            ClientMessage::Error { message: "bye".into() },
            ClientMessage::Login {
                name: "Alice".into(),
                key_hash: Some(vec![1; 64]),
                client_version: 1,
            },
            ClientMessage::Register {
                name: "Alice".into(),
                key_hash: vec![1; 64],
            },
            ClientMessage::CreateGame {
                army: army.clone(),
                is_private: true,
                settings: GameSettings::for_map("skirmish"),
            },
            ClientMessage::ViewPublicGames,
            ClientMessage::JoinGame {
                army,
                target: JoinTarget::Private { key: "ab12".into() },
            },
            ClientMessage::CancelGame,
            ClientMessage::InitialDeployment {
                requested_first_turn: true,
                units: vec![UnitPosition {
                    unit_id: UnitId(0),
                    position: Position::new(-4, 1),
                }],
            },
            ClientMessage::MoveUnit {
                unit_id: UnitId(3),
                position: Position::new(1, -1),
            },
            ClientMessage::EntrenchUnit { unit_id: UnitId(3) },
            ClientMessage::AttackUnit {
                attacker: UnitId(0),
                defender: UnitId(5),
            },
            ClientMessage::DeployUnit {
                unit_id: UnitId(2),
                position: Position::new(-6, 2),
            },
            ClientMessage::ReinforceUnit { unit_id: UnitId(2) },
            ClientMessage::PurchaseUnit {
                unit: UnitConfiguration::new(1, 3),
            },
            ClientMessage::EndTurn,
            ClientMessage::Surrender,
            ClientMessage::RequestSalt,
        ]
    }

    #[test]
    fn test_kind_matches_wire_discriminant() {
        let messages = one_of_each();
        assert_eq!(messages.len(), ClientMessageKind::ALL.len());

        for (index, message) in messages.iter().enumerate() {
            let bytes = message.to_bytes().unwrap();
            let kind = peek_kind(&bytes).unwrap();
            assert_eq!(kind, message.kind());
            assert_eq!(kind as u32, index as u32);
            assert_eq!(&ClientMessage::from_bytes(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn test_unknown_and_truncated_kinds() {
        assert!(matches!(peek_kind(&[1, 0]), Err(DecodeError::Truncated(2))));
        assert!(matches!(
            peek_kind(&99u32.to_le_bytes()),
            Err(DecodeError::UnknownKind(99))
        ));
        assert!(ClientMessageKind::from_u32(17).is_none());
        assert_eq!(ClientMessageKind::from_u32(15), Some(ClientMessageKind::Surrender));
        assert_eq!(ClientMessageKind::from_u32(16), Some(ClientMessageKind::RequestSalt));
    }

    #[test]
    fn test_malformed_body_keeps_kind() {
        // MoveUnit header followed by half a unit id.
        let mut bytes = (ClientMessageKind::MoveUnit as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&[7, 0]);

        match ClientMessage::from_bytes(&bytes) {
            Err(DecodeError::Malformed { kind, .. }) => assert_eq!(kind, ClientMessageKind::MoveUnit),
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_server_message_binary() {
        let msg = ServerMessage::LoginReply {
            outcome: LoginOutcome::IncompatibleVersion,
            server_version: 1,
        };
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(&bytes[..4], &1u32.to_le_bytes());
        assert_eq!(ServerMessage::from_bytes(&bytes).unwrap(), msg);
    }
}
