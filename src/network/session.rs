//! Session Registry
//!
//! Maps live connections to the entities they control and routes queued
//! world deliveries to the right connection. Each connection has its own
//! outgoing channel, so messages to one player keep their queue order.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::game::entity::EntityId;
use crate::game::world::Delivery;

/// Connection identifier (peer address).
pub type ConnectionId = SocketAddr;

/// Outgoing frame channel of one connection.
pub type FrameSender = mpsc::UnboundedSender<Vec<u8>>;

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Connection is not registered.
    #[error("Connection not registered")]
    UnknownConnection,

    /// Connection already controls a character.
    #[error("Connection already controls a character")]
    AlreadyInWorld,

    /// Entity is controlled by another connection.
    #[error("Entity already controlled by another connection")]
    EntityTaken,
}

/// A connected client.
#[derive(Debug)]
struct Session {
    /// Frame channel to the socket writer task.
    sender: FrameSender,
    /// Character controlled by this connection.
    entity: Option<EntityId>,
}

/// Connection <-> entity mapping.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<ConnectionId, Session>,
    by_entity: BTreeMap<EntityId, ConnectionId>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Register a new connection.
    pub fn register(&mut self, conn: ConnectionId, sender: FrameSender) {
        if let Some(old) = self.sessions.insert(conn, Session { sender, entity: None }) {
            warn!("Connection {} registered twice", conn);
            if let Some(entity) = old.entity {
                self.by_entity.remove(&entity);
            }
        }
    }

    /// Forget a connection. Returns the entity it controlled.
    pub fn unregister(&mut self, conn: ConnectionId) -> Option<EntityId> {
        let session = self.sessions.remove(&conn)?;
        let entity = session.entity?;
        self.by_entity.remove(&entity);
        Some(entity)
    }

    /// Give a connection control of an entity.
    pub fn bind(&mut self, conn: ConnectionId, entity: EntityId) -> Result<(), SessionError> {
        if self.by_entity.contains_key(&entity) {
            return Err(SessionError::EntityTaken);
        }
        let session = self.sessions.get_mut(&conn).ok_or(SessionError::UnknownConnection)?;
        if session.entity.is_some() {
            return Err(SessionError::AlreadyInWorld);
        }
        session.entity = Some(entity);
        self.by_entity.insert(entity, conn);
        Ok(())
    }

    /// Release the entity controlled by a connection.
    pub fn unbind(&mut self, conn: ConnectionId) -> Option<EntityId> {
        let entity = self.sessions.get_mut(&conn)?.entity.take()?;
        self.by_entity.remove(&entity);
        Some(entity)
    }

    /// Release an entity from whichever connection controls it. The
    /// connection stays registered.
    pub fn release_entity(&mut self, entity: EntityId) -> Option<ConnectionId> {
        let conn = self.by_entity.remove(&entity)?;
        if let Some(session) = self.sessions.get_mut(&conn) {
            session.entity = None;
        }
        Some(conn)
    }

    /// Entity controlled by a connection.
    pub fn entity_of(&self, conn: ConnectionId) -> Option<EntityId> {
        self.sessions.get(&conn)?.entity
    }

    /// Connection controlling an entity.
    pub fn connection_of(&self, entity: EntityId) -> Option<ConnectionId> {
        self.by_entity.get(&entity).copied()
    }

    /// Queue a frame on one connection.
    pub fn send(&self, conn: ConnectionId, frame: Vec<u8>) -> bool {
        match self.sessions.get(&conn) {
            Some(session) => session.sender.send(frame).is_ok(),
            None => false,
        }
    }

    /// Route world deliveries to their connections, in order.
    ///
    /// Deliveries to entities without a connection are dropped. Returns the
    /// number of frames handed to connections.
    pub fn deliver(&self, deliveries: Vec<Delivery>) -> usize {
        let mut sent = 0;
        for delivery in deliveries {
            let Some(conn) = self.by_entity.get(&delivery.recipient) else {
                debug!("No connection for entity {}, dropping message", delivery.recipient);
                continue;
            };
            if self.send(*conn, delivery.message.into_bytes()) {
                sent += 1;
            } else {
                debug!("Connection {} closed, dropping message", conn);
            }
        }
        sent
    }
}
