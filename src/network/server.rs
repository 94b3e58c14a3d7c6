//! WebSocket Game Server
//!
//! Accepts WebSocket connections, decodes binary client requests into world
//! operations, and runs the fixed-rate tick driver. The world lives behind a
//! single mutex: a tick holds it from the first pass to the last, and every
//! request handler takes the same lock, so requests land between ticks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::core::opcodes::{ENTER_WORLD_ALREADY_IN, ENTER_WORLD_OK, ENTER_WORLD_UNKNOWN};
use crate::game::world::{RemovalCause, WorldState};
use crate::network::protocol::{enter_world_response, ClientMessage};
use crate::network::session::{ConnectionId, SessionRegistry};

/// Shared world handle.
pub type SharedWorld = Arc<Mutex<WorldState>>;

/// Shared session registry handle.
pub type SharedSessions = Arc<RwLock<SessionRegistry>>;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// World ticks per second.
    pub tick_rate: u32,
    /// JSON map catalog; the built-in demo world is used when unset.
    pub map_catalog: Option<PathBuf>,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9601)),
            max_connections: 1000,
            tick_rate: crate::TICK_RATE,
            map_catalog: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SERVER_BIND_ADDR`, `SERVER_MAX_CONNECTIONS`,
    /// `SERVER_TICK_RATE` and `SERVER_MAP_CATALOG`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(addr) = env_parse("SERVER_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(max) = env_parse("SERVER_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(rate) = env_parse::<u32>("SERVER_TICK_RATE") {
            if rate > 0 {
                config.tick_rate = rate;
            } else {
                warn!("SERVER_TICK_RATE must be positive, keeping {}", config.tick_rate);
            }
        }
        if let Ok(path) = std::env::var("SERVER_MAP_CATALOG") {
            config.map_catalog = Some(PathBuf::from(path));
        }
        config
    }

    /// Duration of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros((1_000_000 / u64::from(self.tick_rate.max(1))).max(1))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, value);
            None
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

// =============================================================================
// SERVER
// =============================================================================

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Authoritative world.
    world: SharedWorld,
    /// Connected clients.
    sessions: SharedSessions,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server around a world.
    pub fn new(config: ServerConfig, world: WorldState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            world: Arc::new(Mutex::new(world)),
            sessions: Arc::new(RwLock::new(SessionRegistry::new())),
            shutdown_tx,
        }
    }

    /// Shared world handle.
    pub fn world(&self) -> SharedWorld {
        self.world.clone()
    }

    /// Run the server until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(
            "World server {} listening on {} at {} Hz",
            self.config.version, self.config.bind_addr, self.config.tick_rate
        );

        let tick_handle = tokio::spawn(Self::run_tick_loop(
            self.world.clone(),
            self.sessions.clone(),
            self.config.tick_duration(),
            self.shutdown_tx.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connection_count().await >= self.config.max_connections {
                                warn!("Rejecting {}: {}", addr, GameServerError::ConnectionLimitReached);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
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

        tick_handle.abort();
        Ok(())
    }

    /// Fixed-rate tick driver. Missed ticks are skipped, not replayed.
    async fn run_tick_loop(
        world: SharedWorld,
        sessions: SharedSessions,
        tick_duration: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {}
                _ = shutdown_rx.recv() => break,
            }

            let mut world = world.lock().await;
            let result = world.tick();
            let sent = flush(&mut world, &mut *sessions.write().await);
            if result.tick % 600 == 0 {
                debug!(
                    "Tick {}: {} maps, {} frames sent",
                    result.tick, result.maps, sent
                );
            }
        }
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let world = self.world.clone();
        let sessions = self.sessions.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();
            sessions.write().await.register(addr, frame_tx);

            // Spawn frame writer task
            let sender_task = tokio::spawn(async move {
                while let Some(frame) = frame_rx.recv().await {
                    if ws_sender.send(Message::Binary(frame)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Binary(data))) => {
                                handle_frame(addr, &data, &world, &sessions).await;
                            }
                            Some(Ok(Message::Text(_))) => {
                                debug!("Ignoring text frame from {}", addr);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            sender_task.abort();
            disconnect(addr, &world, &sessions).await;
            info!("Client {} cleaned up", addr);
        });
    }

    /// Signal the server to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of connected clients.
    pub async fn connection_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

// =============================================================================
// REQUEST HANDLING
// =============================================================================

/// Decode and apply one binary frame. Malformed frames are logged with a
/// hex dump and dropped; the connection stays open.
pub(crate) async fn handle_frame(
    addr: ConnectionId,
    data: &[u8],
    world: &SharedWorld,
    sessions: &SharedSessions,
) {
    let msg = match ClientMessage::from_bytes(data) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Malformed message from {}: {} [{}]", addr, e, hex::encode(data));
            return;
        }
    };

    let mut world = world.lock().await;

    if let ClientMessage::EnterWorld { name } = &msg {
        let mut sessions = sessions.write().await;
        let reply = if sessions.entity_of(addr).is_some() {
            enter_world_response(ENTER_WORLD_ALREADY_IN, None)
        } else {
            match world.enter_world(name) {
                Ok((id, public_id)) => match sessions.bind(addr, id) {
                    Ok(()) => {
                        info!("{} entered the world as {:?} ({})", addr, name, id);
                        enter_world_response(ENTER_WORLD_OK, Some(public_id))
                    }
                    Err(e) => {
                        error!("Cannot bind {} to {}: {}", addr, id, e);
                        world.remove_entity(id, RemovalCause::Disconnect);
                        enter_world_response(ENTER_WORLD_ALREADY_IN, None)
                    }
                },
                Err(e) => {
                    warn!("{} could not enter the world as {:?}: {}", addr, name, e);
                    enter_world_response(ENTER_WORLD_UNKNOWN, None)
                }
            }
        };
        sessions.send(addr, reply.into_bytes());
        flush(&mut world, &mut sessions);
        return;
    }

    let mut sessions = sessions.write().await;
    let Some(id) = sessions.entity_of(addr) else {
        debug!("{} sent {:?} before entering the world", addr, msg);
        return;
    };

    let outcome = match msg {
        ClientMessage::Walk { destination } => world.set_destination(id, destination),
        ClientMessage::Attack => world.raise_attack(id),
        ClientMessage::Say { text } => world.say(id, &text).map(|_| ()),
        ClientMessage::LeaveWorld => {
            sessions.unbind(addr);
            world.remove_entity(id, RemovalCause::Disconnect);
            info!("{} left the world ({})", addr, id);
            Ok(())
        }
        ClientMessage::EnterWorld { .. } => Ok(()),
    };
    if let Err(e) = outcome {
        warn!("Request from {} failed: {}", addr, e);
    }
    flush(&mut world, &mut sessions);
}

/// Free the connections of players the world dropped, then route the queued
/// deliveries. Returns the number of frames handed to connections.
pub(crate) fn flush(world: &mut WorldState, sessions: &mut SessionRegistry) -> usize {
    for id in world.take_lost_players() {
        if let Some(conn) = sessions.release_entity(id) {
            warn!("{} lost its character {}", conn, id);
        }
    }
    sessions.deliver(world.take_deliveries())
}

/// Drop a connection and remove its character from the world.
pub(crate) async fn disconnect(addr: ConnectionId, world: &SharedWorld, sessions: &SharedSessions) {
    let mut world = world.lock().await;
    let mut sessions = sessions.write().await;
    if let Some(id) = sessions.unregister(addr) {
        world.remove_entity(id, RemovalCause::Disconnect);
        flush(&mut world, &mut sessions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::MessageIn;
    use crate::core::opcodes::{
        GPMSG_BEING_LEAVE, GPMSG_ENTER_WORLD_RESPONSE, GPMSG_PLAYER_MAP_CHANGE, GPMSG_SAY,
    };
    use crate::core::point::Point;
    use crate::game::entity::MapId;
    use crate::game::world::tests::world as test_world;

    fn addr(port: u16) -> ConnectionId {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn shared() -> (SharedWorld, SharedSessions) {
        (
            Arc::new(Mutex::new(test_world())),
            Arc::new(RwLock::new(SessionRegistry::new())),
        )
    }

    async fn connect(
        port: u16,
        sessions: &SharedSessions,
    ) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        sessions.write().await.register(addr(port), tx);
        rx
    }

    async fn send(port: u16, msg: ClientMessage, world: &SharedWorld, sessions: &SharedSessions) {
        let bytes = msg.to_message().unwrap().into_bytes();
        handle_frame(addr(port), &bytes, world, sessions).await;
    }

    fn opcode(frame: &[u8]) -> u16 {
        MessageIn::parse(frame).unwrap().id()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, 10);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.tick_duration(), Duration::from_millis(100));
        assert!(config.map_catalog.is_none());
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = GameServer::new(config, test_world());
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.world().lock().await.active_maps(), 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_enter_world_replies_then_map_change() {
        let (world, sessions) = shared();
        let mut rx = connect(1, &sessions).await;

        send(1, ClientMessage::EnterWorld { name: "hero".into() }, &world, &sessions).await;

        let reply = rx.recv().await.unwrap();
        let mut msg = MessageIn::parse(&reply).unwrap();
        assert_eq!(msg.id(), GPMSG_ENTER_WORLD_RESPONSE);
        assert_eq!(msg.read_byte().unwrap(), ENTER_WORLD_OK);
        assert_eq!(msg.read_short().unwrap(), 0);
        assert_eq!(opcode(&rx.recv().await.unwrap()), GPMSG_PLAYER_MAP_CHANGE);

        // Second enter on the same connection is refused
        send(1, ClientMessage::EnterWorld { name: "hero".into() }, &world, &sessions).await;
        let frame = rx.recv().await.unwrap();
        let mut again = MessageIn::parse(&frame).unwrap();
        assert_eq!(again.read_byte().unwrap(), ENTER_WORLD_ALREADY_IN);
    }

    #[tokio::test]
    async fn test_walk_and_say_before_entering_are_ignored() {
        let (world, sessions) = shared();
        let mut rx = connect(1, &sessions).await;

        send(1, ClientMessage::Walk { destination: Point::new(10, 10) }, &world, &sessions).await;
        send(1, ClientMessage::Say { text: "hi".into() }, &world, &sessions).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection() {
        let (world, sessions) = shared();
        let mut rx = connect(1, &sessions).await;

        handle_frame(addr(1), &[0x01], &world, &sessions).await;
        handle_frame(addr(1), &[0xEF, 0xBE], &world, &sessions).await;
        assert_eq!(sessions.read().await.len(), 1);

        send(1, ClientMessage::EnterWorld { name: "hero".into() }, &world, &sessions).await;
        assert_eq!(opcode(&rx.recv().await.unwrap()), GPMSG_ENTER_WORLD_RESPONSE);
    }

    #[tokio::test]
    async fn test_requests_reach_world() {
        let (world, sessions) = shared();
        let mut rx1 = connect(1, &sessions).await;
        let mut rx2 = connect(2, &sessions).await;
        send(1, ClientMessage::EnterWorld { name: "hero".into() }, &world, &sessions).await;
        send(2, ClientMessage::EnterWorld { name: "hero2".into() }, &world, &sessions).await;
        while rx1.try_recv().is_ok() {}
        while rx2.try_recv().is_ok() {}

        let id1 = sessions.read().await.entity_of(addr(1)).unwrap();
        send(1, ClientMessage::Walk { destination: Point::new(800, 900) }, &world, &sessions).await;
        send(1, ClientMessage::Attack, &world, &sessions).await;
        {
            let world = world.lock().await;
            let e = world.entity(id1).unwrap();
            assert_eq!(e.destination, Point::new(800, 900));
        }

        // hero at (700, 900), hero2 at the default start point: out of range
        send(1, ClientMessage::Say { text: "anyone?".into() }, &world, &sessions).await;
        assert_eq!(opcode(&rx1.recv().await.unwrap()), GPMSG_SAY);
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_removes_character() {
        let (world, sessions) = shared();
        let mut rx1 = connect(1, &sessions).await;
        let _rx2 = connect(2, &sessions).await;
        send(1, ClientMessage::EnterWorld { name: "hero".into() }, &world, &sessions).await;
        send(2, ClientMessage::EnterWorld { name: "hero".into() }, &world, &sessions).await;
        let id2 = sessions.read().await.entity_of(addr(2)).unwrap();
        while rx1.try_recv().is_ok() {}

        disconnect(addr(2), &world, &sessions).await;
        assert!(world.lock().await.entity(id2).is_none());
        assert_eq!(sessions.read().await.len(), 1);
        assert_eq!(opcode(&rx1.recv().await.unwrap()), GPMSG_BEING_LEAVE);
    }

    #[tokio::test]
    async fn test_failed_warp_frees_connection() {
        let (world, sessions) = shared();
        let mut rx = connect(1, &sessions).await;
        send(1, ClientMessage::EnterWorld { name: "hero".into() }, &world, &sessions).await;
        let id = sessions.read().await.entity_of(addr(1)).unwrap();
        {
            let mut world = world.lock().await;
            world.activate(MapId(2)).unwrap().public_id_limit = 0;
            assert!(world.warp(id, MapId(2), Point::new(100, 100)).is_err());
            flush(&mut world, &mut *sessions.write().await);
        }
        assert_eq!(sessions.read().await.entity_of(addr(1)), None);
        while rx.try_recv().is_ok() {}

        send(1, ClientMessage::EnterWorld { name: "hero".into() }, &world, &sessions).await;
        let frame = rx.recv().await.unwrap();
        let mut reply = MessageIn::parse(&frame).unwrap();
        assert_eq!(reply.read_byte().unwrap(), ENTER_WORLD_OK);
    }

    #[tokio::test]
    async fn test_leave_world_keeps_connection() {
        let (world, sessions) = shared();
        let _rx = connect(1, &sessions).await;
        send(1, ClientMessage::EnterWorld { name: "hero".into() }, &world, &sessions).await;
        let id = sessions.read().await.entity_of(addr(1)).unwrap();

        send(1, ClientMessage::LeaveWorld, &world, &sessions).await;
        assert!(world.lock().await.entity(id).is_none());
        assert_eq!(sessions.read().await.entity_of(addr(1)), None);
        assert_eq!(sessions.read().await.len(), 1);
    }
}
