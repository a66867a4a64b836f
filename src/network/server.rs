//! Game Server
//!
//! Accepts TCP connections, runs the transport handshake and gives every
//! connection a reader and a writer task. The reader takes the directory lock
//! once per frame; the writer drains the session's outbound queue. Neither
//! holds the lock across I/O.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::network::directory::Directory;
use crate::network::dispatch::Disposition;
use crate::network::framing::{read_frame, write_frame, FrameError, FrameLimits};
use crate::network::session::Outbound;

/// Transport setup for an accepted connection, such as a TLS handshake.
pub trait Handshake: Send + Sync + 'static {
    /// Decrypted byte stream.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Turn an accepted socket into a ready stream.
    fn accept(&self, stream: TcpStream) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Unencrypted TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTcp;

impl Handshake for PlainTcp {
    type Stream = TcpStream;

    async fn accept(&self, stream: TcpStream) -> io::Result<TcpStream> {
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] io::Error),
}

/// Releases a connection slot when the connection task ends.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The game server.
pub struct GameServer<H: Handshake = PlainTcp> {
    directory: Arc<Mutex<Directory>>,
    handshake: Arc<H>,
    bind_addr: SocketAddr,
    max_connections: usize,
    limits: FrameLimits,
    connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer<PlainTcp> {
    /// Plain TCP server over `directory`.
    pub fn new(directory: Directory) -> Self {
        Self::with_handshake(directory, PlainTcp)
    }
}

impl<H: Handshake> GameServer<H> {
    /// Server running `handshake` on every accepted connection.
    pub fn with_handshake(directory: Directory, handshake: H) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = directory.config();
        Self {
            bind_addr: config.bind_addr,
            max_connections: config.max_connections,
            limits: FrameLimits {
                max_payload: config.max_frame_size,
            },
            directory: Arc::new(Mutex::new(directory)),
            handshake: Arc::new(handshake),
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Shared directory.
    pub fn directory(&self) -> Arc<Mutex<Directory>> {
        Arc::clone(&self.directory)
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connection_count() >= self.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            info!("New connection from {}", addr);
                            self.spawn_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let slot = ConnectionSlot::acquire(&self.connections);
        let handshake = Arc::clone(&self.handshake);
        let directory = Arc::clone(&self.directory);
        let limits = self.limits;
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _slot = slot;
            let stream = match handshake.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Handshake failed for {}: {}", addr, e);
                    return;
                }
            };
            run_connection(stream, addr, directory, limits, shutdown_rx).await;
        });
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Drive one connection until either side closes it.
async fn run_connection<S>(
    stream: S,
    addr: SocketAddr,
    directory: Arc<Mutex<Directory>>,
    limits: FrameLimits,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let id = directory.lock().await.connect(addr, outbound_tx);
    // Dropped when the writer stops, for whatever reason.
    let (writer_alive, mut writer_done) = oneshot::channel::<()>();

    let writer_task = tokio::spawn(async move {
        let _writer_alive = writer_alive;
        while let Some(item) = outbound_rx.recv().await {
            let message = match item {
                Outbound::Message(message) => message,
                Outbound::Close => break,
            };
            let payload = match message.to_bytes() {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to encode message for session {}: {}", id, e);
                    continue;
                }
            };
            match write_frame(&mut writer, &payload, limits).await {
                Ok(()) => {}
                Err(e @ FrameError::PayloadTooLarge { .. }) => {
                    warn!("Session {}: outgoing {}", id, e);
                    break;
                }
                Err(e) => {
                    debug!("Write to session {} failed: {}", id, e);
                    break;
                }
            }
        }
        let _ = writer.shutdown().await;
    });

    loop {
        tokio::select! {
            frame = read_frame(&mut reader, limits) => {
                match frame {
                    Ok(payload) => {
                        if directory.lock().await.handle_frame(id, &payload) == Disposition::Close {
                            break;
                        }
                    }
                    Err(FrameError::ConnectionClosed) => {
                        debug!("Session {} closed by peer", id);
                        break;
                    }
                    Err(e @ FrameError::PayloadTooLarge { .. }) => {
                        warn!("Session {}: {}", id, e);
                        directory.lock().await.fail(id, e.to_string());
                        break;
                    }
                    Err(e) => {
                        error!("Read error on session {}: {}", id, e);
                        break;
                    }
                }
            }
            _ = &mut writer_done => {
                debug!("Session {} writer stopped", id);
                break;
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    // Dropping the session drops its queue sender, which ends the writer
    // once everything queued is written.
    directory.lock().await.disconnect(id);
    let _ = writer_task.await;
    info!("Client {} cleaned up", addr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, PROTOCOL_VERSION};
    use crate::game::army::{BaseArmy, UnitConfiguration};
    use crate::game::events::GameOutcome;
    use crate::game::state::Side;
    use crate::network::protocol::{ClientMessage, GameSettings, JoinTarget, LoginOutcome, ServerMessage};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn start(config: ServerConfig) -> (Arc<GameServer>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(GameServer::new(Directory::with_defaults(config)));
        let serving = Arc::clone(&server);
        tokio::spawn(async move { serving.serve(listener).await });
        (server, addr)
    }

    async fn request(stream: &mut TcpStream, message: &ClientMessage) {
        write_frame(stream, &message.to_bytes().unwrap(), FrameLimits::default())
            .await
            .unwrap();
    }

    async fn reply(stream: &mut TcpStream) -> Result<ServerMessage, FrameError> {
        let payload = timeout(Duration::from_secs(5), read_frame(stream, FrameLimits::default()))
            .await
            .expect("reply timed out")?;
        Ok(ServerMessage::from_bytes(&payload).unwrap())
    }

    async fn logged_in(addr: SocketAddr, name: &str) -> TcpStream {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let login = ClientMessage::Login {
            name: name.into(),
            key_hash: None,
            client_version: PROTOCOL_VERSION,
        };
        request(&mut stream, &login).await;
        assert_eq!(
            reply(&mut stream).await.unwrap(),
            ServerMessage::LoginReply {
                outcome: LoginOutcome::Success,
                server_version: PROTOCOL_VERSION,
            }
        );
        stream
    }

    fn army() -> BaseArmy {
        BaseArmy {
            faction_id: 2,
            units: vec![UnitConfiguration::new(2, 1), UnitConfiguration::new(2, 3)],
        }
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::new(Directory::with_defaults(ServerConfig::default()));
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.directory().lock().await.session_count(), 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_kind_reports_and_closes() {
        let (_server, addr) = start(ServerConfig::default()).await;
        let mut stream = logged_in(addr, "Anna").await;

        write_frame(&mut stream, &77u32.to_le_bytes(), FrameLimits::default())
            .await
            .unwrap();
        assert!(matches!(reply(&mut stream).await, Ok(ServerMessage::Error { .. })));
        assert!(matches!(reply(&mut stream).await, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_match_and_desertion_over_tcp() {
        let (server, addr) = start(ServerConfig::default()).await;
        let mut anna = logged_in(addr, "Anna").await;
        let mut boris = logged_in(addr, "Boris").await;

        let create = ClientMessage::CreateGame {
            army: army(),
            is_private: true,
            settings: GameSettings::for_map("skirmish"),
        };
        request(&mut anna, &create).await;
        let key = match reply(&mut anna).await.unwrap() {
            ServerMessage::CreateGameReply { private_key: Some(key) } => key,
            other => panic!("unexpected {:?}", other),
        };

        let join = ClientMessage::JoinGame {
            army: army(),
            target: JoinTarget::Private { key },
        };
        request(&mut boris, &join).await;
        assert!(matches!(
            reply(&mut anna).await.unwrap(),
            ServerMessage::GameStart(start) if start.opponent == "Boris" && start.side == Side::Side1
        ));
        assert!(matches!(
            reply(&mut boris).await.unwrap(),
            ServerMessage::GameStart(start) if start.opponent == "Anna"
        ));

        drop(boris);
        assert_eq!(
            reply(&mut anna).await.unwrap(),
            ServerMessage::GameEnd {
                outcome: GameOutcome::Desertion,
                winner: Some(Side::Side1),
            }
        );
        assert_eq!(server.directory().lock().await.match_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_ends_session() {
        let (server, addr) = start(ServerConfig::default()).await;
        let mut anna = logged_in(addr, "Anna").await;
        let mut boris = logged_in(addr, "Boris").await;

        let create = ClientMessage::CreateGame {
            army: army(),
            is_private: false,
            settings: GameSettings::for_map("skirmish"),
        };
        request(&mut anna, &create).await;
        assert!(matches!(
            reply(&mut anna).await.unwrap(),
            ServerMessage::CreateGameReply { private_key: None }
        ));
        let join = ClientMessage::JoinGame {
            army: army(),
            target: JoinTarget::Public { owner: "Anna".into() },
        };
        request(&mut boris, &join).await;
        assert!(matches!(reply(&mut anna).await.unwrap(), ServerMessage::GameStart(_)));
        assert!(matches!(reply(&mut boris).await.unwrap(), ServerMessage::GameStart(_)));

        // Boris connected second; a reply over the frame limit kills his writer
        let too_big = "x".repeat(FrameLimits::default().max_payload as usize + 1);
        server.directory().lock().await.send(2, ServerMessage::error(too_big));

        assert!(matches!(reply(&mut boris).await, Err(FrameError::ConnectionClosed)));
        assert_eq!(
            reply(&mut anna).await.unwrap(),
            ServerMessage::GameEnd {
                outcome: GameOutcome::Desertion,
                winner: Some(Side::Side1),
            }
        );
        let directory = server.directory();
        let directory = directory.lock().await;
        assert_eq!(directory.session_count(), 1);
        assert_eq!(directory.match_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let (server, addr) = start(ServerConfig {
            max_connections: 1,
            ..Default::default()
        })
        .await;
        let _anna = logged_in(addr, "Anna").await;
        assert_eq!(server.connection_count(), 1);

        let mut rejected = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(reply(&mut rejected).await, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_fatal() {
        let (_server, addr) = start(ServerConfig {
            max_frame_size: 64,
            ..Default::default()
        })
        .await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(&1000u32.to_be_bytes()).await.unwrap();
        assert!(matches!(reply(&mut stream).await, Ok(ServerMessage::Error { .. })));
        assert!(matches!(reply(&mut stream).await, Err(FrameError::ConnectionClosed)));
    }
}
