//! # Realm Sync Server
//!
//! Authoritative world server for a tile-map multiplayer game: advances every
//! entity on every active map once per tick and keeps each player's client in
//! step with what is visible around them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    REALM SYNC SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── point.rs    - Pixel coordinates, box range test         │
//! │  ├── message.rs  - Little-endian message codec               │
//! │  ├── opcodes.rs  - Wire message ids                          │
//! │  └── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │                                                              │
//! │  game/           - World simulation                          │
//! │  ├── entity.rs   - Entity record and update flags            │
//! │  ├── map.rs      - Walkability, triggers, spawn areas        │
//! │  ├── partition.rs- Per-map membership and queries            │
//! │  ├── world.rs    - Map table, add/remove/say, deliveries     │
//! │  ├── tick.rs     - Ordered per-tick passes                   │
//! │  └── aoi.rs      - Area-of-interest diff and encoding        │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── server.rs   - WebSocket server and tick driver          │
//! │  ├── protocol.rs - Client request decoding                   │
//! │  └── session.rs  - Connection <-> entity registry            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tick Order
//!
//! Every active map runs, in order: position freeze, logic, movement,
//! bookkeeping (zones, triggers, spawns), area-of-interest diff, flag
//! clear. Removals and warps requested during a tick are applied between
//! maps, never inside a pass.
//!
//! Maps and entities are kept in `BTreeMap`s and all randomness comes from
//! per-map seeded generators, so a world fed the same requests replays the
//! same deliveries.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::point::{Point, Rectangle, AROUND_AREA, TILE_SIZE};
pub use crate::core::message::{MessageIn, MessageOut, ProtocolError};
pub use crate::core::rng::DeterministicRng;
pub use crate::game::world::{Delivery, WorldConfig, WorldError, WorldState};
pub use crate::game::entity::{Entity, EntityId, MapId, PublicId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// World tick rate (Hz)
pub const TICK_RATE: u32 = 10;
