//! Game Logic Module
//!
//! The world simulation: entities, maps, per-map spatial partitions and the
//! tick that drives them. Nothing in here touches the network; outgoing
//! messages are queued as deliveries on the world state.
//!
//! ## Module Structure
//!
//! - `entity`: Tagged entity record, ids and update flags
//! - `controller`: Monster wandering AI
//! - `map`: Walkability grid, trigger and spawn areas, collaborator traits
//! - `catalog`: JSON map and character catalog
//! - `partition`: Per-map membership, public ids and zone index
//! - `hooks`: Script callbacks on death and removal
//! - `world`: Map table, entity operations and delivery queue
//! - `tick`: Ordered per-tick passes
//! - `aoi`: Area-of-interest diff and encoder

pub mod entity;
pub mod controller;
pub mod map;
pub mod catalog;
pub mod partition;
pub mod hooks;
pub mod world;
pub mod tick;
pub mod aoi;

// Re-export key types
pub use entity::{Entity, EntityId, EntityKind, MapId, PlayerData, PublicId, UpdateFlags};
pub use map::{CharacterRecord, LoadedMap, Map, MapProvider, Storage, Thing};
pub use catalog::{CatalogError, MapCatalog};
pub use partition::SpatialPartition;
pub use hooks::{NoopHooks, ScriptHooks};
pub use world::{Delivery, RemovalCause, WorldConfig, WorldError, WorldState};
pub use tick::TickResult;
