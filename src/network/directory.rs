//! Session Directory
//!
//! Process-wide registry behind the server's single mutex: connected
//! sessions, the account store, open game offers and running matches. Every
//! inbound message is handled by exactly one call into the directory with the
//! lock held, so nothing here awaits.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::core::rng::DeterministicRng;
use crate::game::army::{validate_army, BaseArmy};
use crate::game::catalog::Catalog;
use crate::game::map::Map;
use crate::game::state::{Game, GameConfiguration, GameError, GamePhase, Side};
use crate::network::auth::{
    Account, AccountStore, CredentialCheck, Identity, MemoryAccountStore, PlayerId, StoreError,
    KEY_HASH_SIZE,
};
use crate::network::dispatch::event_message;
use crate::network::protocol::{
    GameSettings, GameStart, JoinTarget, LoginOutcome, PublicGame, RegistrationOutcome,
    ServerMessage,
};
use crate::network::session::{ClientState, InGameState, Outbound, Session, SessionId};

/// Identifier shared by an offer and the match it turns into.
pub type GameId = Uuid;

/// Bytes of randomness in a private join key.
const PRIVATE_KEY_BYTES: usize = 8;

/// Faults caused by a client request. Each one ends the connection.
#[derive(Debug, Error)]
pub enum ClientFault {
    /// Rejected by the game rules.
    #[error(transparent)]
    Game(#[from] GameError),
    /// Account store refused the write.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Game request from a session without a game.
    #[error("not in a game")]
    NotInGame,
}

/// An open game waiting for a second player.
#[derive(Debug)]
struct Offer {
    owner: SessionId,
    army: BaseArmy,
    config: GameConfiguration,
    private_key: Option<String>,
}

/// A running game and its two players, indexed by side.
#[derive(Debug)]
struct Match {
    game: Game,
    players: [SessionId; 2],
}

/// Registry of everything shared between connections.
pub struct Directory {
    config: ServerConfig,
    catalog: Arc<Catalog>,
    maps: BTreeMap<String, Map>,
    accounts: Box<dyn AccountStore>,
    sessions: BTreeMap<SessionId, Session>,
    offers: BTreeMap<GameId, Offer>,
    matches: BTreeMap<GameId, Match>,
    rng: DeterministicRng,
    next_session_id: SessionId,
}

impl Directory {
    /// Create a directory over the given catalog, maps and account store.
    pub fn new(
        config: ServerConfig,
        catalog: Arc<Catalog>,
        maps: BTreeMap<String, Map>,
        accounts: Box<dyn AccountStore>,
        rng: DeterministicRng,
    ) -> Self {
        Self {
            config,
            catalog,
            maps,
            accounts,
            sessions: BTreeMap::new(),
            offers: BTreeMap::new(),
            matches: BTreeMap::new(),
            rng,
            next_session_id: 1,
        }
    }

    /// Built-in catalog and map, in-memory accounts, entropy-seeded rng.
    pub fn with_defaults(config: ServerConfig) -> Self {
        let map = Map::skirmish();
        let maps = BTreeMap::from([(map.name().to_string(), map)]);
        Self::new(
            config,
            Arc::new(Catalog::builtin()),
            maps,
            Box::new(MemoryAccountStore::new()),
            DeterministicRng::from_entropy(),
        )
    }

    /// Server settings.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Look up a session.
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Connected sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Open offers.
    pub fn offer_count(&self) -> usize {
        self.offers.len()
    }

    /// Running matches.
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// The game a session plays in, if any.
    pub fn game_of(&self, id: SessionId) -> Option<&Game> {
        let game_id = self.sessions.get(&id)?.game?;
        self.matches.get(&game_id).map(|m| &m.game)
    }

    pub(super) fn send(&self, id: SessionId, message: ServerMessage) {
        if let Some(session) = self.sessions.get(&id) {
            session.send(message);
        }
    }

    /// Report a fault to the client and queue the close.
    pub(super) fn fail(&self, id: SessionId, message: impl Into<String>) {
        if let Some(session) = self.sessions.get(&id) {
            session.send(ServerMessage::error(message));
            session.close();
        }
    }

    // =========================================================================
    // CONNECTIONS
    // =========================================================================

    /// Register an accepted connection.
    pub fn connect(&mut self, addr: SocketAddr, outbound: mpsc::UnboundedSender<Outbound>) -> SessionId {
        let id = self.next_session_id;
        self.next_session_id += 1;
        self.sessions.insert(id, Session::new(id, addr, outbound));
        debug!("Session {} opened for {}", id, addr);
        id
    }

    /// Forget a connection, withdrawing its offer or forfeiting its game.
    #[instrument(skip(self))]
    pub fn disconnect(&mut self, id: SessionId) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        info!(
            "Session {} ({}) disconnected",
            id,
            session.name().unwrap_or("anonymous")
        );

        match (session.state, session.game) {
            (ClientState::WaitingForOpponent, Some(game_id)) => {
                self.offers.remove(&game_id);
                info!("Offer {} withdrawn", game_id);
            }
            (ClientState::InGame(_), Some(game_id)) => {
                if let (Some(m), Some(side)) = (self.matches.get_mut(&game_id), session.side) {
                    m.game.forfeit(side);
                }
                self.publish(game_id);
            }
            _ => {}
        }
    }

    // =========================================================================
    // IDENTITY
    // =========================================================================

    fn connected_name_in_use(&self, name: &str) -> bool {
        self.sessions.values().any(|s| s.name() == Some(name))
    }

    fn name_in_use(&self, name: &str) -> bool {
        self.accounts.find(name).is_some() || self.connected_name_in_use(name)
    }

    fn player_id_in_use(&self, id: PlayerId) -> bool {
        self.accounts.id_in_use(id)
            || self
                .sessions
                .values()
                .any(|s| s.identity.as_ref().is_some_and(|i| i.id == id))
    }

    fn generate_player_id(&mut self) -> PlayerId {
        loop {
            let candidate = PlayerId(self.rng.next_u64());
            if !self.player_id_in_use(candidate) {
                return candidate;
            }
        }
    }

    /// Log a session in, as a guest when no key hash is given.
    #[instrument(skip(self, key_hash))]
    pub fn login(
        &mut self,
        id: SessionId,
        name: &str,
        key_hash: Option<&[u8]>,
        client_version: u32,
    ) -> LoginOutcome {
        if client_version != self.config.protocol_version {
            return LoginOutcome::IncompatibleVersion;
        }
        if self.sessions.get(&id).is_some_and(|s| s.identity.is_some()) {
            return LoginOutcome::AlreadyLoggedIn;
        }

        let identity = match key_hash {
            None => {
                if !self.config.guest_login {
                    return LoginOutcome::GuestLoginDisabled;
                }
                if name.chars().count() > self.config.max_name_length {
                    return LoginOutcome::NameTooLong;
                }
                if self.name_in_use(name) {
                    return LoginOutcome::NameInUse;
                }
                Identity {
                    id: self.generate_player_id(),
                    name: name.to_string(),
                    registered: false,
                }
            }
            Some(key_hash) => {
                let check = self.accounts.verify(name, key_hash);
                if check == CredentialCheck::NotFound {
                    return LoginOutcome::NotFound;
                }
                if self.connected_name_in_use(name) {
                    return LoginOutcome::AlreadyLoggedIn;
                }
                if check == CredentialCheck::Invalid {
                    return LoginOutcome::InvalidPassword;
                }
                let Some(account) = self.accounts.find(name) else {
                    return LoginOutcome::NotFound;
                };
                Identity {
                    id: account.id,
                    name: account.name.clone(),
                    registered: true,
                }
            }
        };

        let Some(session) = self.sessions.get_mut(&id) else {
            return LoginOutcome::NotFound;
        };
        info!("{} logged in as {} ({})", session.addr(), identity.name, identity.id);
        session.identity = Some(identity);
        session.state = ClientState::LoggedIn;
        LoginOutcome::Success
    }

    /// Create an account.
    #[instrument(skip(self, key_hash))]
    pub fn register(&mut self, name: &str, key_hash: &[u8]) -> Result<RegistrationOutcome, StoreError> {
        if !self.config.registration {
            return Ok(RegistrationOutcome::Disabled);
        }
        if name.chars().count() > self.config.max_name_length {
            return Ok(RegistrationOutcome::NameTooLong);
        }
        if self.name_in_use(name) {
            return Ok(RegistrationOutcome::NameTaken);
        }
        if key_hash.len() != KEY_HASH_SIZE {
            return Ok(RegistrationOutcome::InvalidKeyHashSize);
        }
        let id = self.generate_player_id();
        self.accounts.create(Account::new(id, name, key_hash.to_vec()))?;
        info!("Registered {} as {}", name, id);
        Ok(RegistrationOutcome::Success)
    }

    // =========================================================================
    // MATCHMAKING
    // =========================================================================

    fn resolve_settings(&self, settings: &GameSettings) -> Result<GameConfiguration, GameError> {
        if !self.maps.contains_key(&settings.map) {
            return Err(GameError::UnknownMap(settings.map.clone()));
        }
        Ok(GameConfiguration {
            map: settings.map.clone(),
            points: settings.points.unwrap_or(self.config.default_points),
            turn_limit: settings.turn_limit.unwrap_or(self.config.default_turn_limit),
            deployment_time: settings
                .deployment_time
                .unwrap_or(self.config.default_deployment_time),
            turn_time: settings.turn_time.unwrap_or(self.config.default_turn_time),
        })
    }

    fn new_private_key(&mut self) -> String {
        loop {
            let mut bytes = [0u8; PRIVATE_KEY_BYTES];
            self.rng.fill_bytes(&mut bytes);
            let key = hex::encode(bytes);
            if !self.offers.values().any(|o| o.private_key.as_deref() == Some(key.as_str())) {
                return key;
            }
        }
    }

    /// Open an offer owned by `id`. Returns the join key of a private game.
    #[instrument(skip(self, army, settings))]
    pub fn create_game(
        &mut self,
        id: SessionId,
        army: BaseArmy,
        is_private: bool,
        settings: &GameSettings,
    ) -> Result<Option<String>, ClientFault> {
        let config = self.resolve_settings(settings)?;
        validate_army(&self.catalog, &army, config.points).map_err(GameError::from)?;

        let game_id = Uuid::new_v4();
        let private_key = is_private.then(|| self.new_private_key());
        let session = self.sessions.get_mut(&id).ok_or(ClientFault::NotInGame)?;
        session.game = Some(game_id);
        session.state = ClientState::WaitingForOpponent;

        info!(
            "{} offered {} game {} on {}",
            session.name().unwrap_or("?"),
            if is_private { "private" } else { "public" },
            game_id,
            config.map
        );
        self.offers.insert(
            game_id,
            Offer {
                owner: id,
                army,
                config,
                private_key: private_key.clone(),
            },
        );
        Ok(private_key)
    }

    /// Open public offers, oldest owner first.
    pub fn public_games(&self) -> Vec<PublicGame> {
        self.offers
            .values()
            .filter(|o| o.private_key.is_none())
            .filter_map(|o| {
                let owner = self.sessions.get(&o.owner)?.name()?.to_string();
                Some((o.owner, PublicGame {
                    owner,
                    config: o.config.clone(),
                }))
            })
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .collect()
    }

    fn find_offer(&self, target: &JoinTarget) -> Option<GameId> {
        self.offers
            .iter()
            .find(|(_, offer)| match target {
                JoinTarget::Public { owner } => {
                    offer.private_key.is_none()
                        && self.sessions.get(&offer.owner).and_then(Session::name) == Some(owner.as_str())
                }
                JoinTarget::Private { key } => offer.private_key.as_deref() == Some(key.as_str()),
            })
            .map(|(game_id, _)| *game_id)
    }

    /// Join an open offer. Returns `false` when no such offer exists.
    #[instrument(skip(self, army))]
    pub fn join_game(&mut self, id: SessionId, army: BaseArmy, target: &JoinTarget) -> Result<bool, ClientFault> {
        let Some(game_id) = self.find_offer(target) else {
            return Ok(false);
        };
        let seed = self.rng.next_u64();
        let Some(offer) = self.offers.get(&game_id) else {
            return Ok(false);
        };
        let map = self
            .maps
            .get(&offer.config.map)
            .cloned()
            .ok_or_else(|| GameError::UnknownMap(offer.config.map.clone()))?;
        let game = Game::new(
            offer.config.clone(),
            map,
            Arc::clone(&self.catalog),
            [&offer.army, &army],
            DeterministicRng::new(seed),
        )?;

        let owner = offer.owner;
        self.offers.remove(&game_id);
        let players = [owner, id];
        for side in Side::BOTH {
            let me = players[side.index()];
            let them = players[side.opponent().index()];
            if let Some(session) = self.sessions.get_mut(&me) {
                session.enter_game(game_id, side, them);
            }
        }

        let names = players.map(|p| {
            self.sessions
                .get(&p)
                .and_then(Session::name)
                .unwrap_or_default()
                .to_string()
        });
        for side in Side::BOTH {
            let start = GameStart {
                config: game.config().clone(),
                side,
                my_army: game.army(side),
                enemy_army: game.army(side.opponent()),
                opponent: names[side.opponent().index()].clone(),
                reinforcement_points: game.reinforcement_points(side),
            };
            self.send(players[side.index()], ServerMessage::GameStart(start));
        }

        info!("Game {} started: {} vs {}", game_id, names[0], names[1]);
        self.matches.insert(game_id, Match { game, players });
        Ok(true)
    }

    /// Withdraw the caller's offer. Returns whether one existed.
    pub fn cancel_game(&mut self, id: SessionId) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        let withdrawn = session
            .game
            .and_then(|game_id| self.offers.remove(&game_id))
            .is_some();
        session.leave_game();
        if withdrawn {
            debug!("Session {} cancelled its offer", id);
        }
        withdrawn
    }

    // =========================================================================
    // RUNNING GAMES
    // =========================================================================

    /// Apply an action of `id`'s side to its game and broadcast the results.
    pub fn play<F>(&mut self, id: SessionId, action: F) -> Result<(), ClientFault>
    where
        F: FnOnce(&mut Game, Side) -> Result<(), GameError>,
    {
        let (game_id, side) = self
            .sessions
            .get(&id)
            .and_then(|s| s.game.zip(s.side))
            .ok_or(ClientFault::NotInGame)?;
        let m = self.matches.get_mut(&game_id).ok_or(ClientFault::NotInGame)?;
        action(&mut m.game, side)?;
        self.publish(game_id);
        Ok(())
    }

    /// Deliver queued game events and bring both sessions in line with the
    /// game. An ended game is dropped and its players return to the lobby.
    fn publish(&mut self, game_id: GameId) {
        let Some(m) = self.matches.get_mut(&game_id) else {
            return;
        };
        let players = m.players;

        for event in m.game.take_events() {
            for side in Side::BOTH {
                if let Some(session) = self.sessions.get(&players[side.index()]) {
                    session.send(event_message(&event, side));
                }
            }
        }

        if m.game.is_over() {
            if let Some((outcome, winner)) = m.game.outcome() {
                info!("Game {} ended: {:?}, winner {:?}", game_id, outcome, winner);
            }
            self.matches.remove(&game_id);
            for player in players {
                if let Some(session) = self.sessions.get_mut(&player) {
                    session.leave_game();
                }
            }
            return;
        }

        for side in Side::BOTH {
            let state = match m.game.phase() {
                GamePhase::Deployment if m.game.has_deployed(side) => InGameState::DeploymentSubmitted,
                GamePhase::Deployment => InGameState::Deployment,
                _ if m.game.active_side() == side => InGameState::MyTurn,
                _ => InGameState::OpponentTurn,
            };
            if let Some(session) = self.sessions.get_mut(&players[side.index()]) {
                session.state = ClientState::InGame(state);
            }
        }
    }

    /// Log a client-side error report.
    pub(super) fn client_error(&self, id: SessionId, message: &str) {
        warn!("Session {} reported error: {}", id, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hex::Position;
    use crate::game::army::UnitConfiguration;
    use crate::game::events::{GameOutcome, UnitPosition};
    use crate::game::state::UnitId;
    use crate::network::auth::hash_key;
    use crate::config::PROTOCOL_VERSION;

    type Inbox = mpsc::UnboundedReceiver<Outbound>;

    fn directory(config: ServerConfig) -> Directory {
        let map = Map::skirmish();
        Directory::new(
            config,
            Arc::new(Catalog::builtin()),
            BTreeMap::from([(map.name().to_string(), map)]),
            Box::new(MemoryAccountStore::new()),
            DeterministicRng::new(42),
        )
    }

    fn connect(dir: &mut Directory) -> (SessionId, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (dir.connect("127.0.0.1:1".parse().unwrap(), tx), rx)
    }

    fn drain(rx: &mut Inbox) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Message(m) = item {
                out.push(m);
            }
        }
        out
    }

    fn guest(dir: &mut Directory, name: &str) -> (SessionId, Inbox) {
        let (id, rx) = connect(dir);
        assert_eq!(dir.login(id, name, None, PROTOCOL_VERSION), LoginOutcome::Success);
        (id, rx)
    }

    fn infantry(count: usize) -> BaseArmy {
        BaseArmy {
            faction_id: 1,
            units: vec![UnitConfiguration::new(1, 1); count],
        }
    }

    fn matched(dir: &mut Directory) -> ((SessionId, Inbox), (SessionId, Inbox)) {
        let (mut a, mut b) = (guest(dir, "Anna"), guest(dir, "Boris"));
        dir.create_game(a.0, infantry(2), false, &GameSettings::for_map("skirmish"))
            .unwrap();
        let target = JoinTarget::Public { owner: "Anna".into() };
        assert!(dir.join_game(b.0, infantry(2), &target).unwrap());
        drain(&mut a.1);
        drain(&mut b.1);
        (a, b)
    }

    #[test]
    fn test_register_then_name_taken() {
        let mut dir = directory(ServerConfig::default());
        let key = hash_key(b"salt", "secret");

        assert_eq!(dir.register("Alice", &key).unwrap(), RegistrationOutcome::Success);
        assert_eq!(dir.register("Alice", &key).unwrap(), RegistrationOutcome::NameTaken);
        assert_eq!(
            dir.register("Bob", &key[..32]).unwrap(),
            RegistrationOutcome::InvalidKeyHashSize
        );
    }

    #[test]
    fn test_register_name_length_capped() {
        let mut dir = directory(ServerConfig {
            max_name_length: 5,
            ..Default::default()
        });
        let key = hash_key(b"salt", "secret");
        assert_eq!(
            dir.register("Annabelle", &key).unwrap(),
            RegistrationOutcome::NameTooLong
        );
        assert_eq!(dir.register("Anna", &key).unwrap(), RegistrationOutcome::Success);
    }

    #[test]
    fn test_registration_disabled() {
        let mut dir = directory(ServerConfig {
            registration: false,
            ..Default::default()
        });
        assert_eq!(
            dir.register("Alice", &[0; KEY_HASH_SIZE]).unwrap(),
            RegistrationOutcome::Disabled
        );
    }

    #[test]
    fn test_guest_login_outcomes() {
        let mut dir = directory(ServerConfig {
            max_name_length: 5,
            ..Default::default()
        });
        let (id, _rx) = connect(&mut dir);

        assert_eq!(dir.login(id, "Anna", None, 99), LoginOutcome::IncompatibleVersion);
        assert_eq!(dir.login(id, "Annabelle", None, PROTOCOL_VERSION), LoginOutcome::NameTooLong);
        assert_eq!(dir.session(id).unwrap().state, ClientState::Connected);

        assert_eq!(dir.login(id, "Anna", None, PROTOCOL_VERSION), LoginOutcome::Success);
        assert_eq!(dir.session(id).unwrap().state, ClientState::LoggedIn);
        assert_eq!(dir.login(id, "Anna2", None, PROTOCOL_VERSION), LoginOutcome::AlreadyLoggedIn);

        let (other, _rx2) = connect(&mut dir);
        assert_eq!(dir.login(other, "Anna", None, PROTOCOL_VERSION), LoginOutcome::NameInUse);

        dir.register("Kurt", &[1; KEY_HASH_SIZE]).unwrap();
        assert_eq!(dir.login(other, "Kurt", None, PROTOCOL_VERSION), LoginOutcome::NameInUse);
    }

    #[test]
    fn test_guest_login_disabled() {
        let mut dir = directory(ServerConfig {
            guest_login: false,
            ..Default::default()
        });
        let (id, _rx) = connect(&mut dir);
        assert_eq!(dir.login(id, "Anna", None, PROTOCOL_VERSION), LoginOutcome::GuestLoginDisabled);
    }

    #[test]
    fn test_registered_login_outcomes() {
        let mut dir = directory(ServerConfig::default());
        let key = hash_key(b"salt", "secret");
        dir.register("Alice", &key).unwrap();

        let (id, _rx) = connect(&mut dir);
        assert_eq!(dir.login(id, "Nobody", Some(&key), PROTOCOL_VERSION), LoginOutcome::NotFound);
        let wrong = hash_key(b"salt", "guess");
        assert_eq!(dir.login(id, "Alice", Some(&wrong), PROTOCOL_VERSION), LoginOutcome::InvalidPassword);
        assert_eq!(dir.login(id, "Alice", Some(&key), PROTOCOL_VERSION), LoginOutcome::Success);
        assert!(dir.session(id).unwrap().identity.as_ref().unwrap().registered);

        let (second, _rx2) = connect(&mut dir);
        assert_eq!(dir.login(second, "Alice", Some(&key), PROTOCOL_VERSION), LoginOutcome::AlreadyLoggedIn);
    }

    #[test]
    fn test_player_ids_unique() {
        let mut dir = directory(ServerConfig::default());
        let (a, _ra) = guest(&mut dir, "Anna");
        let (b, _rb) = guest(&mut dir, "Boris");
        let id_a = dir.session(a).unwrap().identity.as_ref().unwrap().id;
        let id_b = dir.session(b).unwrap().identity.as_ref().unwrap().id;
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn test_create_list_cancel() {
        let mut dir = directory(ServerConfig::default());
        let (a, _ra) = guest(&mut dir, "Anna");
        let (b, _rb) = guest(&mut dir, "Boris");

        let key = dir
            .create_game(a, infantry(2), false, &GameSettings::for_map("skirmish"))
            .unwrap();
        assert!(key.is_none());
        assert_eq!(dir.session(a).unwrap().state, ClientState::WaitingForOpponent);

        let private = dir
            .create_game(b, infantry(1), true, &GameSettings::for_map("skirmish"))
            .unwrap();
        assert_eq!(private.map(|k| k.len()), Some(PRIVATE_KEY_BYTES * 2));

        let games = dir.public_games();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].owner, "Anna");
        assert_eq!(games[0].config.points, 200);
        assert_eq!(games[0].config.turn_limit, 20);

        assert!(dir.cancel_game(a));
        assert_eq!(dir.session(a).unwrap().state, ClientState::LoggedIn);
        assert!(dir.public_games().is_empty());
        assert_eq!(dir.offer_count(), 1);
    }

    #[test]
    fn test_create_rejects_bad_requests() {
        let mut dir = directory(ServerConfig::default());
        let (a, _ra) = guest(&mut dir, "Anna");

        let unknown_map = dir.create_game(a, infantry(1), false, &GameSettings::for_map("atlantis"));
        assert!(matches!(unknown_map, Err(ClientFault::Game(GameError::UnknownMap(_)))));

        let mut settings = GameSettings::for_map("skirmish");
        settings.points = Some(30);
        let overspent = dir.create_game(a, infantry(2), false, &settings);
        assert!(matches!(overspent, Err(ClientFault::Game(GameError::Army(_)))));
        assert_eq!(dir.offer_count(), 0);
    }

    #[test]
    fn test_join_sends_game_start() {
        let mut dir = directory(ServerConfig::default());
        let (a, mut ra) = guest(&mut dir, "Anna");
        let (b, mut rb) = guest(&mut dir, "Boris");
        let key = dir
            .create_game(a, infantry(2), true, &GameSettings::for_map("skirmish"))
            .unwrap()
            .unwrap();

        let public = JoinTarget::Public { owner: "Anna".into() };
        assert!(!dir.join_game(b, infantry(1), &public).unwrap());

        let private = JoinTarget::Private { key };
        assert!(dir.join_game(b, infantry(1), &private).unwrap());
        assert_eq!(dir.match_count(), 1);
        assert_eq!(dir.offer_count(), 0);

        match drain(&mut ra).as_slice() {
            [ServerMessage::GameStart(start)] => {
                assert_eq!(start.side, Side::Side1);
                assert_eq!(start.opponent, "Boris");
                assert_eq!(start.my_army.units.len(), 2);
                assert_eq!(start.enemy_army.units[0].unit_id, Some(UnitId(2)));
                // 160 unspent and 200 available.
                assert_eq!(start.reinforcement_points, 120);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(drain(&mut rb).as_slice(), [ServerMessage::GameStart(s)] if s.side == Side::Side2));
        for id in [a, b] {
            assert_eq!(
                dir.session(id).unwrap().state,
                ClientState::InGame(InGameState::Deployment)
            );
        }
    }

    #[test]
    fn test_bad_joiner_army_keeps_offer() {
        let mut dir = directory(ServerConfig::default());
        let (a, _ra) = guest(&mut dir, "Anna");
        let (b, _rb) = guest(&mut dir, "Boris");
        dir.create_game(a, infantry(1), false, &GameSettings::for_map("skirmish"))
            .unwrap();

        let target = JoinTarget::Public { owner: "Anna".into() };
        let result = dir.join_game(b, BaseArmy { faction_id: 1, units: vec![] }, &target);
        assert!(matches!(result, Err(ClientFault::Game(GameError::Army(_)))));
        assert_eq!(dir.offer_count(), 1);
    }

    #[test]
    fn test_deployment_and_turn_states_complementary() {
        let mut dir = directory(ServerConfig::default());
        let ((a, mut ra), (b, mut rb)) = matched(&mut dir);

        let side1 = vec![UnitPosition { unit_id: UnitId(0), position: Position::new(-4, 1) }];
        dir.play(a, |g, side| g.submit_deployment(side, true, &side1)).unwrap();
        assert_eq!(
            dir.session(a).unwrap().state,
            ClientState::InGame(InGameState::DeploymentSubmitted)
        );
        assert!(drain(&mut rb).is_empty());

        let side2 = vec![UnitPosition { unit_id: UnitId(2), position: Position::new(4, -1) }];
        dir.play(b, |g, side| g.submit_deployment(side, false, &side2)).unwrap();

        assert_eq!(dir.session(a).unwrap().state, ClientState::InGame(InGameState::MyTurn));
        assert_eq!(dir.session(b).unwrap().state, ClientState::InGame(InGameState::OpponentTurn));

        let to_b = drain(&mut rb);
        assert!(matches!(
            &to_b[0],
            ServerMessage::InitialDeployment { my_units, enemy_units }
                if my_units == &side2 && enemy_units == &side1
        ));
        assert!(matches!(&to_b[1], ServerMessage::NewTurn { active: Side::Side1, .. }));
        assert_eq!(drain(&mut ra).len(), 2);

        dir.play(a, |g, side| g.end_turn(side)).unwrap();
        assert_eq!(dir.session(a).unwrap().state, ClientState::InGame(InGameState::OpponentTurn));
        assert_eq!(dir.session(b).unwrap().state, ClientState::InGame(InGameState::MyTurn));
    }

    #[test]
    fn test_rejected_action_changes_nothing() {
        let mut dir = directory(ServerConfig::default());
        let ((a, _ra), (_b, mut rb)) = matched(&mut dir);

        let outside = vec![UnitPosition { unit_id: UnitId(0), position: Position::new(0, 0) }];
        let result = dir.play(a, |g, side| g.submit_deployment(side, true, &outside));
        assert!(matches!(result, Err(ClientFault::Game(GameError::OutsideDeploymentZone(_)))));
        assert_eq!(dir.session(a).unwrap().state, ClientState::InGame(InGameState::Deployment));
        assert!(drain(&mut rb).is_empty());
    }

    #[test]
    fn test_surrender_returns_both_to_lobby() {
        let mut dir = directory(ServerConfig::default());
        let ((a, mut ra), (b, mut rb)) = matched(&mut dir);

        dir.play(b, |g, side| {
            g.surrender(side);
            Ok(())
        })
        .unwrap();

        let expected = ServerMessage::GameEnd {
            outcome: GameOutcome::Surrender,
            winner: Some(Side::Side1),
        };
        assert_eq!(drain(&mut ra), vec![expected.clone()]);
        assert_eq!(drain(&mut rb), vec![expected]);
        assert_eq!(dir.match_count(), 0);
        for id in [a, b] {
            let session = dir.session(id).unwrap();
            assert_eq!(session.state, ClientState::LoggedIn);
            assert!(session.game.is_none());
        }
    }

    #[test]
    fn test_disconnect_forfeits_game() {
        let mut dir = directory(ServerConfig::default());
        let ((a, mut ra), (b, _rb)) = matched(&mut dir);

        dir.disconnect(b);
        assert_eq!(
            drain(&mut ra),
            vec![ServerMessage::GameEnd {
                outcome: GameOutcome::Desertion,
                winner: Some(Side::Side1),
            }]
        );
        assert_eq!(dir.session(a).unwrap().state, ClientState::LoggedIn);
        assert_eq!(dir.match_count(), 0);
        assert_eq!(dir.session_count(), 1);
    }

    #[test]
    fn test_disconnect_withdraws_offer() {
        let mut dir = directory(ServerConfig::default());
        let (a, _ra) = guest(&mut dir, "Anna");
        dir.create_game(a, infantry(1), false, &GameSettings::for_map("skirmish"))
            .unwrap();

        dir.disconnect(a);
        assert_eq!(dir.offer_count(), 0);

        // The name is free again.
        let (_c, _rc) = guest(&mut dir, "Anna");
    }

    #[test]
    fn test_fail_queues_error_then_close() {
        let mut dir = directory(ServerConfig::default());
        let (a, mut ra) = connect(&mut dir);
        dir.fail(a, "bad");

        assert_eq!(ra.try_recv().unwrap(), Outbound::Message(ServerMessage::error("bad")));
        assert_eq!(ra.try_recv().unwrap(), Outbound::Close);
    }
}
