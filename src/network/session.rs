//! Client Sessions
//!
//! One [`Session`] per connection. It records who the client is, which
//! protocol state it is in and which game it belongs to, and owns the sending
//! half of the connection's outbound queue. The queue is drained by the
//! connection's writer task, so enqueueing never blocks the directory lock.

use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::debug;

use crate::game::state::Side;
use crate::network::auth::Identity;
use crate::network::directory::GameId;
use crate::network::protocol::{ClientMessageKind, ServerMessage};

/// Connection identifier, unique for the lifetime of the server.
pub type SessionId = u64;

/// Item on a connection's outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Frame to write.
    Message(ServerMessage),
    /// Flush what came before, then shut the connection.
    Close,
}

/// Sub-state while a game is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InGameState {
    /// Initial deployment not yet submitted.
    Deployment,
    /// Waiting for the opponent's deployment.
    DeploymentSubmitted,
    /// This player acts.
    MyTurn,
    /// The opponent acts.
    OpponentTurn,
}

/// Protocol state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not logged in.
    Connected,
    /// Logged in, no game.
    LoggedIn,
    /// Owns an open game offer.
    WaitingForOpponent,
    /// Playing.
    InGame(InGameState),
}

impl ClientState {
    /// Message kinds handled in this state, [`ClientMessageKind::Error`]
    /// included.
    pub fn expected_kinds(self) -> &'static [ClientMessageKind] {
        use ClientMessageKind as K;
        match self {
            ClientState::Connected => &[K::Error, K::Login, K::Register, K::RequestSalt],
            ClientState::LoggedIn => &[K::Error, K::CreateGame, K::ViewPublicGames, K::JoinGame],
            ClientState::WaitingForOpponent => &[K::Error, K::CancelGame],
            ClientState::InGame(InGameState::Deployment) => {
                &[K::Error, K::InitialDeployment, K::Surrender]
            }
            ClientState::InGame(InGameState::DeploymentSubmitted) => &[K::Error, K::Surrender],
            ClientState::InGame(InGameState::MyTurn) => &[
                K::Error,
                K::MoveUnit,
                K::AttackUnit,
                K::DeployUnit,
                K::EntrenchUnit,
                K::ReinforceUnit,
                K::PurchaseUnit,
                K::EndTurn,
                K::Surrender,
            ],
            ClientState::InGame(InGameState::OpponentTurn) => &[K::Error, K::Surrender],
        }
    }

    /// Whether a message of `kind` is handled in this state.
    pub fn expects(self, kind: ClientMessageKind) -> bool {
        self.expected_kinds().contains(&kind)
    }
}

/// A connected client.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    addr: SocketAddr,
    /// Set once logged in.
    pub identity: Option<Identity>,
    /// Protocol state.
    pub state: ClientState,
    /// Open offer or running game.
    pub game: Option<GameId>,
    /// Side in the running game.
    pub side: Option<Side>,
    /// Opponent in the running game.
    pub opponent: Option<SessionId>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Session {
    /// A freshly accepted connection.
    pub fn new(id: SessionId, addr: SocketAddr, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            addr,
            identity: None,
            state: ClientState::Connected,
            game: None,
            side: None,
            opponent: None,
            outbound,
        }
    }

    /// Connection id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Peer address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Player name, if logged in.
    pub fn name(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.name.as_str())
    }

    /// Queue a message. A connection whose writer is gone drops it.
    pub fn send(&self, message: ServerMessage) {
        if self.outbound.send(Outbound::Message(message)).is_err() {
            debug!("Session {} writer gone, dropping message", self.id);
        }
    }

    /// Queue a close after everything already queued.
    pub fn close(&self) {
        if self.outbound.send(Outbound::Close).is_err() {
            debug!("Session {} writer gone, already closed", self.id);
        }
    }

    /// Join a running game.
    pub fn enter_game(&mut self, game: GameId, side: Side, opponent: SessionId) {
        self.game = Some(game);
        self.side = Some(side);
        self.opponent = Some(opponent);
        self.state = ClientState::InGame(InGameState::Deployment);
    }

    /// Drop any game or offer and return to the lobby.
    pub fn leave_game(&mut self) {
        self.game = None;
        self.side = None;
        self.opponent = None;
        self.state = ClientState::LoggedIn;
    }
}
