//! Network Layer
//!
//! WebSocket transport for the world server. Frames are decoded into world
//! operations here; all simulation runs through `game/`.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{enter_world_response, ClientMessage};
pub use session::{ConnectionId, SessionError, SessionRegistry};
pub use server::{GameServer, GameServerError, ServerConfig};
