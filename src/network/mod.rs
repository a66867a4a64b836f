//! Network Layer
//!
//! TCP server, session state machine, lobby and wire format. Game rules live
//! in `game/`; this layer decides who may ask for what and delivers the
//! results.

pub mod auth;
pub mod directory;
pub mod dispatch;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod session;

pub use auth::{hash_key, AccountStore, Identity, MemoryAccountStore, PlayerId, StoreError, KEY_HASH_SIZE};
pub use directory::{ClientFault, Directory, GameId};
pub use dispatch::Disposition;
pub use framing::{FrameError, FrameLimits};
pub use protocol::{ClientMessage, ClientMessageKind, DecodeError, LoginOutcome, RegistrationOutcome, ServerMessage};
pub use server::{GameServer, GameServerError, Handshake, PlainTcp};
pub use session::{ClientState, InGameState, Session, SessionId};
