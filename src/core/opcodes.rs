//! Message Identifiers
//!
//! Opcode table shared by the world engine and the network layer.

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// `{ map name: string, x: u16, y: u16, 0: u8 }`
pub const GPMSG_PLAYER_MAP_CHANGE: u16 = 0x0100;
/// `{ status: u8, public id: u16 }` answer to an enter-world request
pub const GPMSG_ENTER_WORLD_RESPONSE: u16 = 0x0111;
/// `{ type: u8, public id: u16, payload }`
pub const GPMSG_BEING_ENTER: u16 = 0x0200;
/// `{ public id: u16 }`
pub const GPMSG_BEING_LEAVE: u16 = 0x0201;
/// Repeated `{ public id: u16, flags: u8, [x: u16, y: u16], [dx: u16, dy: u16] }`
pub const GPMSG_BEINGS_MOVE: u16 = 0x0280;
/// `{ public id: u16 }`
pub const GPMSG_BEING_ATTACK: u16 = 0x0291;
/// `{ speaker public id: u16, text: string }`
pub const GPMSG_SAY: u16 = 0x02A0;

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// `{ character name: string }`
pub const PGMSG_ENTER_WORLD: u16 = 0x0110;
/// Empty payload
pub const PGMSG_LEAVE_WORLD: u16 = 0x0112;
/// `{ x: u16, y: u16 }`
pub const PGMSG_WALK: u16 = 0x0260;
/// Empty payload
pub const PGMSG_ATTACK: u16 = 0x0290;
/// `{ text: string }`
pub const PGMSG_SAY: u16 = 0x02A1;

// =============================================================================
// FIELD VALUES
// =============================================================================

/// Move entry carries a coarse current position.
pub const MOVING_POSITION: u8 = 1;
/// Move entry carries a full-resolution destination.
pub const MOVING_DESTINATION: u8 = 2;

/// Speaker id used when the speaker has no public id.
pub const NO_SPEAKER: u16 = 0xFFFF;

/// Enter-world response status: accepted.
pub const ENTER_WORLD_OK: u8 = 0;
/// Enter-world response status: unknown character or map.
pub const ENTER_WORLD_UNKNOWN: u8 = 1;
/// Enter-world response status: connection already controls a character.
pub const ENTER_WORLD_ALREADY_IN: u8 = 2;
