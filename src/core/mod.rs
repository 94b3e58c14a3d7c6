//! Core primitives.
//!
//! Pixel coordinates, the little-endian message codec, the opcode table and
//! the deterministic RNG shared by every map.

pub mod point;
pub mod message;
pub mod opcodes;
pub mod rng;

// Re-export core types
pub use point::{Point, Rectangle, TILE_SIZE, AROUND_AREA, AROUND_AREA_IN_TILES};
pub use message::{MessageIn, MessageOut, ProtocolError, HEADER_SIZE};
pub use rng::DeterministicRng;
