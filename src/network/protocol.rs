//! Protocol Messages
//!
//! Inbound client requests decoded from binary WebSocket frames, and the
//! few server replies that the network layer builds itself. Everything the
//! world sends is encoded by the game module.

use crate::core::message::{MessageIn, MessageOut, ProtocolError};
use crate::core::opcodes::{
    GPMSG_ENTER_WORLD_RESPONSE, PGMSG_ATTACK, PGMSG_ENTER_WORLD, PGMSG_LEAVE_WORLD, PGMSG_SAY,
    PGMSG_WALK,
};
use crate::core::point::Point;
use crate::game::entity::PublicId;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Take control of a character.
    EnterWorld {
        /// Character name
        name: String,
    },

    /// Give up the character.
    LeaveWorld,

    /// Walk to a point on the current map.
    Walk {
        /// Target in pixels
        destination: Point,
    },

    /// Attack.
    Attack,

    /// Chat to everyone around.
    Say {
        /// Chat text
        text: String,
    },
}

impl ClientMessage {
    /// Decode a binary frame. Trailing bytes are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut msg = MessageIn::parse(data)?;
        let decoded = match msg.id() {
            PGMSG_ENTER_WORLD => ClientMessage::EnterWorld { name: msg.read_string()? },
            PGMSG_LEAVE_WORLD => ClientMessage::LeaveWorld,
            PGMSG_WALK => {
                let x = msg.read_short()?;
                let y = msg.read_short()?;
                ClientMessage::Walk { destination: Point::new(x, y) }
            }
            PGMSG_ATTACK => ClientMessage::Attack,
            PGMSG_SAY => ClientMessage::Say { text: msg.read_string()? },
            other => return Err(ProtocolError::UnknownMessage(other)),
        };
        Ok(decoded)
    }

    /// Encode as a client would send it.
    pub fn to_message(&self) -> Result<MessageOut, ProtocolError> {
        let msg = match self {
            ClientMessage::EnterWorld { name } => {
                let mut msg = MessageOut::new(PGMSG_ENTER_WORLD);
                msg.write_string(name)?;
                msg
            }
            ClientMessage::LeaveWorld => MessageOut::new(PGMSG_LEAVE_WORLD),
            ClientMessage::Walk { destination } => {
                let mut msg = MessageOut::new(PGMSG_WALK);
                msg.write_coordinates(destination.x, destination.y);
                msg
            }
            ClientMessage::Attack => MessageOut::new(PGMSG_ATTACK),
            ClientMessage::Say { text } => {
                let mut msg = MessageOut::new(PGMSG_SAY);
                msg.write_string(text)?;
                msg
            }
        };
        Ok(msg)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Reply to an enter-world request. The public id is `0xFFFF` on failure.
pub fn enter_world_response(status: u8, public_id: Option<PublicId>) -> MessageOut {
    let mut msg = MessageOut::new(GPMSG_ENTER_WORLD_RESPONSE);
    msg.write_byte(status);
    msg.write_short(public_id.unwrap_or(PublicId::NONE).0);
    msg
}
