//! World State
//!
//! Map-id to partition table, entity location index, the queue of outgoing
//! deliveries and the queue of structural changes deferred to a pass
//! boundary. Maps are activated on first reference and stay active.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::message::{MessageOut, ProtocolError};
use crate::core::opcodes::{GPMSG_PLAYER_MAP_CHANGE, GPMSG_SAY, NO_SPEAKER};
use crate::core::point::{Point, AROUND_AREA};
use crate::core::rng::DeterministicRng;
use crate::game::aoi::being_leave_message;
use crate::game::entity::{Entity, EntityId, MapId, PlayerData, PublicId, UpdateFlags};
use crate::game::hooks::{NoopHooks, ScriptHooks};
use crate::game::map::{CharacterRecord, MapProvider, Storage};
use crate::game::partition::SpatialPartition;
use crate::game::tick::{self, TickResult};

// =============================================================================
// ERRORS
// =============================================================================

/// World operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// Entity is already on a map.
    #[error("entity {0} is already inserted")]
    DuplicateInsertion(EntityId),

    /// Partition refused the entity.
    #[error("insertion of entity {entity} rejected: {reason}")]
    InsertionRejected {
        /// Rejected entity
        entity: EntityId,
        /// Why it was rejected
        reason: String,
    },

    /// Map provider does not know the map.
    #[error("unknown {0}")]
    UnknownMap(MapId),

    /// Entity is not on any map.
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    /// Requested point lies outside the map.
    #[error("{point} is not a valid destination for entity {entity}")]
    InvalidDestination {
        /// Entity asked to move
        entity: EntityId,
        /// Requested point
        point: Point,
    },

    /// Message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// World tuning.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Half-width of the area of interest, in pixels
    pub around_range: u16,
    /// Seed of every map's random stream
    pub rng_seed: u64,
    /// Map for characters without a stored record
    pub start_map: MapId,
    /// Position for characters without a stored record
    pub start_position: Point,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            around_range: AROUND_AREA,
            rng_seed: 0x5EED,
            start_map: MapId(1),
            start_position: Point::new(1600, 1600),
        }
    }
}

// =============================================================================
// QUEUED WORK
// =============================================================================

/// A message waiting for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Player that receives the message
    pub recipient: EntityId,
    /// Encoded message
    pub message: MessageOut,
}

/// Why an entity leaves its map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Controlling client went away.
    Disconnect,
    /// Entity died.
    Death,
    /// Entity was cleaned up by game logic.
    Despawn,
    /// Entity is moving to another map.
    Warp,
}

/// Structural change applied at the next pass boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Deferred {
    Remove(EntityId, RemovalCause),
    Warp(EntityId, MapId, Point),
}

/// Monotonic entity id source.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub(crate) fn next(&mut self) -> EntityId {
        self.next += 1;
        EntityId(self.next)
    }
}

// =============================================================================
// WORLD STATE
// =============================================================================

/// Authoritative state of every active map.
pub struct WorldState {
    config: WorldConfig,
    pub(crate) maps: BTreeMap<MapId, SpatialPartition>,
    pub(crate) locations: BTreeMap<EntityId, MapId>,
    pub(crate) outbox: Vec<Delivery>,
    pub(crate) deferred: Vec<Deferred>,
    pub(crate) ids: IdAllocator,
    pub(crate) tick: u64,
    lost: Vec<EntityId>,
    hooks: Box<dyn ScriptHooks>,
    provider: Arc<dyn MapProvider>,
    storage: Arc<dyn Storage>,
}

impl WorldState {
    /// Create an empty world.
    pub fn new(config: WorldConfig, provider: Arc<dyn MapProvider>, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            maps: BTreeMap::new(),
            locations: BTreeMap::new(),
            outbox: Vec::new(),
            deferred: Vec::new(),
            ids: IdAllocator::default(),
            tick: 0,
            lost: Vec::new(),
            hooks: Box::new(NoopHooks),
            provider,
            storage,
        }
    }

    /// Register the script hooks.
    pub fn set_hooks(&mut self, hooks: Box<dyn ScriptHooks>) {
        self.hooks = hooks;
    }

    /// World tuning.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Allocate a fresh entity id.
    pub fn allocate_id(&mut self) -> EntityId {
        self.ids.next()
    }

    /// Map an entity lives on.
    pub fn map_of(&self, id: EntityId) -> Option<MapId> {
        self.locations.get(&id).copied()
    }

    /// Look up an inserted entity.
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        let map = self.locations.get(&id)?;
        self.maps.get(map)?.get(id)
    }

    /// Partition of an active map.
    pub fn partition(&self, map: MapId) -> Option<&SpatialPartition> {
        self.maps.get(&map)
    }

    /// Number of active maps.
    pub fn active_maps(&self) -> usize {
        self.maps.len()
    }

    /// Activate a map, loading it on first reference.
    pub fn activate(&mut self, map_id: MapId) -> Result<&mut SpatialPartition, WorldError> {
        match self.maps.entry(map_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let loaded = self
                    .provider
                    .load_map(map_id)
                    .ok_or(WorldError::UnknownMap(map_id))?;
                info!(
                    "Activated {} ({}x{} tiles, {} things)",
                    map_id,
                    loaded.map.width(),
                    loaded.map.height(),
                    loaded.things.len()
                );
                let rng = DeterministicRng::for_map(self.config.rng_seed, map_id.0);
                Ok(entry.insert(SpatialPartition::new(map_id, loaded.map, loaded.things, rng)))
            }
        }
    }

    fn partition_of_mut(&mut self, id: EntityId) -> Result<&mut SpatialPartition, WorldError> {
        let map = self.locations.get(&id).ok_or(WorldError::UnknownEntity(id))?;
        self.maps.get_mut(map).ok_or(WorldError::UnknownEntity(id))
    }

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================

    /// Put an entity on its map and mark it new.
    ///
    /// Players also get a map-change message. On failure the error is
    /// logged and the entity is dropped.
    pub fn add_entity(&mut self, entity: Entity) -> Result<PublicId, WorldError> {
        let id = entity.id;
        let map_id = entity.map_id;
        match self.insert_entity(entity) {
            Ok(public_id) => {
                debug!("Entity {} joined {} as public id {}", id, map_id, public_id.0);
                Ok(public_id)
            }
            Err(e) => {
                error!("Could not add entity {} to {}: {}", id, map_id, e);
                Err(e)
            }
        }
    }

    fn insert_entity(&mut self, entity: Entity) -> Result<PublicId, WorldError> {
        if self.locations.contains_key(&entity.id) {
            return Err(WorldError::DuplicateInsertion(entity.id));
        }
        let id = entity.id;
        let map_id = entity.map_id;
        let position = entity.position;
        let is_player = entity.is_player();

        let partition = self.activate(map_id)?;
        let public_id = partition.insert(entity)?;
        if let Some(inserted) = partition.get_mut(id) {
            inserted.raise(UpdateFlags::NEW_ON_MAP);
        }
        self.locations.insert(id, map_id);

        if is_player {
            self.queue_map_change(id, map_id, position);
        }
        Ok(public_id)
    }

    fn queue_map_change(&mut self, id: EntityId, map_id: MapId, position: Point) {
        let name = self.storage.map_display_name(map_id).unwrap_or_else(|| {
            warn!("No display name for {}", map_id);
            map_id.0.to_string()
        });

        let mut msg = MessageOut::new(GPMSG_PLAYER_MAP_CHANGE);
        if let Err(e) = msg.write_string(&name) {
            error!("Cannot encode map change for {}: {}", id, e);
            return;
        }
        msg.write_coordinates(position.x, position.y);
        msg.write_byte(0);
        self.outbox.push(Delivery { recipient: id, message: msg });
    }

    /// Take an entity off its map right away.
    ///
    /// Players in range (other than the entity itself) are told it left,
    /// then the death and removal hooks run.
    pub fn remove_entity(&mut self, id: EntityId, cause: RemovalCause) -> Option<Entity> {
        let map_id = *self.locations.get(&id)?;
        let range = self.config.around_range;
        let partition = self.maps.get_mut(&map_id)?;

        let leaving = partition.get(id)?;
        // Items never enter anyone's view, so they never leave it either
        if let (true, Some(public_id)) = (leaving.is_moving(), leaving.public_id) {
            let msg = being_leave_message(public_id);
            let recipients: Vec<EntityId> = partition
                .query_around_object(leaving, range)
                .filter(|p| p.id != id)
                .map(|p| p.id)
                .collect();
            self.outbox.extend(
                recipients
                    .into_iter()
                    .map(|recipient| Delivery { recipient, message: msg.clone() }),
            );
        }

        let entity = partition.remove(id)?;
        self.locations.remove(&id);
        debug!("Entity {} left {} ({:?})", id, map_id, cause);

        if cause == RemovalCause::Death {
            self.hooks.on_death(&entity);
        }
        self.hooks.on_removed(&entity);
        Some(entity)
    }

    /// Remove an entity at the next pass boundary.
    pub fn queue_removal(&mut self, id: EntityId, cause: RemovalCause) {
        self.deferred.push(Deferred::Remove(id, cause));
    }

    /// Apply every queued structural change. Returns (removed, warped).
    pub(crate) fn apply_deferred(&mut self) -> (usize, usize) {
        let mut removed = 0;
        let mut warped = 0;
        for op in std::mem::take(&mut self.deferred) {
            match op {
                Deferred::Remove(id, cause) => {
                    if self.remove_entity(id, cause).is_some() {
                        removed += 1;
                    }
                }
                Deferred::Warp(id, map, point) => match self.warp(id, map, point) {
                    Ok(_) => warped += 1,
                    Err(e) => warn!("Warp of {} to {} failed: {}", id, map, e),
                },
            }
        }
        (removed, warped)
    }

    /// Move an entity to another map (or elsewhere on the same one).
    ///
    /// The target is validated first; an invalid target leaves the entity
    /// where it is. An entity the target map refuses is dropped, and a
    /// dropped player is reported through `take_lost_players`.
    pub fn warp(&mut self, id: EntityId, map: MapId, point: Point) -> Result<PublicId, WorldError> {
        if !self.locations.contains_key(&id) {
            return Err(WorldError::UnknownEntity(id));
        }
        if !self.activate(map)?.map().contains(point) {
            return Err(WorldError::InvalidDestination { entity: id, point });
        }

        let mut entity = self
            .remove_entity(id, RemovalCause::Warp)
            .ok_or(WorldError::UnknownEntity(id))?;
        info!("Warping {} from {} to {} at {}", id, entity.map_id, map, point);

        entity.map_id = map;
        entity.position = point;
        entity.old_position = point;
        entity.destination = point;
        entity.clear_flags();
        let is_player = entity.is_player();
        let result = self.add_entity(entity);
        if result.is_err() && is_player {
            self.lost.push(id);
        }
        result
    }

    /// Create a player from its stored record and put it in the world.
    ///
    /// Names without a record start fresh at the configured start point.
    pub fn enter_world(&mut self, name: &str) -> Result<(EntityId, PublicId), WorldError> {
        let record = self.storage.character(name).unwrap_or_else(|| {
            info!("No stored character named {:?}, creating one", name);
            CharacterRecord {
                name: name.to_string(),
                map: self.config.start_map,
                position: self.config.start_position,
                hair_style: 0,
                hair_color: 0,
                gender: 0,
            }
        });

        let id = self.allocate_id();
        let data = PlayerData {
            name: record.name,
            hair_style: record.hair_style,
            hair_color: record.hair_color,
            gender: record.gender,
        };
        let public_id = self.add_entity(Entity::player(id, data, record.map, record.position))?;
        Ok((id, public_id))
    }

    // =========================================================================
    // PLAYER ACTIONS
    // =========================================================================

    /// Start walking toward a point on the entity's map.
    pub fn set_destination(&mut self, id: EntityId, point: Point) -> Result<(), WorldError> {
        let partition = self.partition_of_mut(id)?;
        if !partition.map().contains(point) {
            return Err(WorldError::InvalidDestination { entity: id, point });
        }
        let entity = partition.get_mut(id).ok_or(WorldError::UnknownEntity(id))?;
        entity.set_destination(point);
        Ok(())
    }

    /// Mark that the entity attacked this tick.
    pub fn raise_attack(&mut self, id: EntityId) -> Result<(), WorldError> {
        let entity = self
            .partition_of_mut(id)?
            .get_mut(id)
            .ok_or(WorldError::UnknownEntity(id))?;
        entity.raise(UpdateFlags::ATTACK);
        Ok(())
    }

    /// Send chat from an entity to every player in range of it, itself
    /// included. Returns the number of recipients.
    pub fn say(&mut self, id: EntityId, text: &str) -> Result<usize, WorldError> {
        let range = self.config.around_range;
        let map = self.locations.get(&id).ok_or(WorldError::UnknownEntity(id))?;
        let partition = self.maps.get(map).ok_or(WorldError::UnknownEntity(id))?;
        let speaker = partition.get(id).ok_or(WorldError::UnknownEntity(id))?;

        let mut msg = MessageOut::new(GPMSG_SAY);
        msg.write_short(speaker.public_id.unwrap_or(PublicId::NONE).0);
        msg.write_string(text)?;

        let recipients: Vec<EntityId> = partition
            .query_around_object(speaker, range)
            .map(|p| p.id)
            .collect();
        Ok(self.broadcast(recipients, msg))
    }

    /// Send chat without a speaker to every player in range of a point.
    pub fn announce(&mut self, map: MapId, center: Point, text: &str) -> Result<usize, WorldError> {
        let range = self.config.around_range;
        let partition = self.maps.get(&map).ok_or(WorldError::UnknownMap(map))?;

        let mut msg = MessageOut::new(GPMSG_SAY);
        msg.write_short(NO_SPEAKER);
        msg.write_string(text)?;

        let recipients: Vec<EntityId> = partition
            .query_around(center, range)
            .filter(|e| e.is_player())
            .map(|p| p.id)
            .collect();
        Ok(self.broadcast(recipients, msg))
    }

    fn broadcast(&mut self, recipients: Vec<EntityId>, msg: MessageOut) -> usize {
        let count = recipients.len();
        self.outbox.extend(
            recipients
                .into_iter()
                .map(|recipient| Delivery { recipient, message: msg.clone() }),
        );
        count
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Advance every active map by one tick.
    pub fn tick(&mut self) -> TickResult {
        tick::tick(self)
    }

    /// Drain the players that were dropped from the world while their
    /// connection still controls them.
    pub fn take_lost_players(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.lost)
    }

    /// Drain the queued deliveries, in queue order.
    pub fn take_deliveries(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.outbox)
    }
}

impl std::fmt::Debug for WorldState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldState")
            .field("tick", &self.tick)
            .field("maps", &self.maps.len())
            .field("entities", &self.locations.len())
            .field("queued", &self.outbox.len())
            .finish()
    }
}
