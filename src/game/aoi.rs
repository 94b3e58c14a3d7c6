//! Area-of-Interest Diff
//!
//! Compares, for every player, what was visible at the start of the tick
//! with what is visible now, and encodes the difference: enter and leave
//! notifications, attack notifications, and one aggregated move message.

use tracing::error;
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::core::message::{MessageOut, ProtocolError};
use crate::core::opcodes::{
    GPMSG_BEINGS_MOVE, GPMSG_BEING_ATTACK, GPMSG_BEING_ENTER, GPMSG_BEING_LEAVE,
    MOVING_DESTINATION, MOVING_POSITION,
};
use crate::core::point::TILE_SIZE;
use crate::game::entity::{Entity, EntityKind, PublicId, UpdateFlags};
use crate::game::partition::SpatialPartition;
use crate::game::world::Delivery;

// =============================================================================
// MESSAGE BUILDERS
// =============================================================================

/// `BEING_ENTER` describing an entity to a client that has not seen it.
pub fn being_enter_message(entity: &Entity, public_id: PublicId) -> Result<MessageOut, ProtocolError> {
    let mut msg = MessageOut::new(GPMSG_BEING_ENTER);
    msg.write_byte(entity.kind.object_type());
    msg.write_short(public_id.0);
    match &entity.kind {
        EntityKind::Player(data) => {
            msg.write_string(&data.name)?;
            msg.write_byte(data.hair_style);
            msg.write_byte(data.hair_color);
            msg.write_byte(data.gender);
        }
        EntityKind::Monster(data) => msg.write_short(data.class_id),
        EntityKind::Npc { npc_id } => msg.write_short(*npc_id),
        EntityKind::Item { item_class } => msg.write_short(*item_class),
    }
    Ok(msg)
}

/// `BEING_LEAVE` for an entity that went out of sight or off the map.
pub fn being_leave_message(public_id: PublicId) -> MessageOut {
    let mut msg = MessageOut::new(GPMSG_BEING_LEAVE);
    msg.write_short(public_id.0);
    msg
}

/// `BEING_ATTACK` for an entity that attacked this tick.
pub fn being_attack_message(public_id: PublicId) -> MessageOut {
    let mut msg = MessageOut::new(GPMSG_BEING_ATTACK);
    msg.write_short(public_id.0);
    msg
}

// =============================================================================
// DIFF
// =============================================================================

/// Messages one player needs this tick, in send order. The aggregated
/// `BEINGS_MOVE` comes last and is omitted when it carries no entry.
pub fn diff_for_player(
    partition: &SpatialPartition,
    player: &Entity,
    range: u16,
) -> Result<Vec<MessageOut>, ProtocolError> {
    let mut out = Vec::new();
    let mut moves = MessageOut::new(GPMSG_BEINGS_MOVE);

    for other in partition.query_around_player(player, range) {
        let Some(other_pid) = other.public_id else {
            continue;
        };

        if other.update_flags.contains(UpdateFlags::ATTACK)
            && other.public_id != player.public_id
            && other.position.in_range_of(player.position, range)
        {
            out.push(being_attack_message(other_pid));
        }

        let new_on_map = (player.update_flags | other.update_flags)
            .contains(UpdateFlags::NEW_ON_MAP);
        let was = !new_on_map && other.old_position.in_range_of(player.old_position, range);
        let will = other.position.in_range_of(player.position, range);

        let mut flags = 0u8;
        match (was, will) {
            (false, false) => continue,
            (true, false) => {
                out.push(being_leave_message(other_pid));
                continue;
            }
            (false, true) => {
                out.push(being_enter_message(other, other_pid)?);
                flags |= MOVING_DESTINATION;
            }
            (true, true) => {
                if other.old_position == other.position {
                    continue;
                }
            }
        }

        if other.position != other.destination {
            flags |= MOVING_POSITION;
            if other.update_flags.contains(UpdateFlags::NEW_DESTINATION) {
                flags |= MOVING_DESTINATION;
            }
        } else {
            // Arrived: the destination is the final position
            flags |= MOVING_DESTINATION;
        }

        #[cfg(feature = "debug-tracing")]
        trace!(
            "move entry for {}: public id {} flags {:#04x}",
            player.id, other_pid.0, flags
        );

        moves.write_short(other_pid.0);
        moves.write_byte(flags);
        if flags & MOVING_POSITION != 0 {
            moves.write_coordinates(other.position.x / TILE_SIZE, other.position.y / TILE_SIZE);
        }
        if flags & MOVING_DESTINATION != 0 {
            moves.write_coordinates(other.destination.x, other.destination.y);
        }
    }

    if !moves.is_empty() {
        out.push(moves);
    }
    Ok(out)
}

/// Run the diff for every player of a partition and queue the results.
///
/// A player whose messages fail to encode gets nothing this tick; the
/// others are unaffected. Returns the number of queued deliveries.
pub fn synchronize(partition: &SpatialPartition, range: u16, outbox: &mut Vec<Delivery>) -> usize {
    let before = outbox.len();
    for player in partition.query_all_players() {
        match diff_for_player(partition, player, range) {
            Ok(messages) => outbox.extend(
                messages
                    .into_iter()
                    .map(|message| Delivery { recipient: player.id, message }),
            ),
            Err(e) => {
                error!("Failed to encode updates for {} on {}: {}", player.id, partition.id(), e);
            }
        }
    }
    outbox.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::MessageIn;
    use crate::core::point::{Point, AROUND_AREA};
    use crate::core::rng::DeterministicRng;
    use crate::game::entity::{EntityId, MapId, PlayerData};
    use crate::game::map::Map;

    const P: EntityId = EntityId(1);
    const M: EntityId = EntityId(2);

    fn partition() -> SpatialPartition {
        SpatialPartition::new(MapId(1), Map::open(100, 100), Vec::new(), DeterministicRng::new(1))
    }

    fn hero(x: u16, y: u16) -> Entity {
        let data = PlayerData { name: "hero".into(), hair_style: 3, hair_color: 4, gender: 1 };
        Entity::player(P, data, MapId(1), Point::new(x, y))
    }

    /// Partition with P and M inserted and settled (no flags, frozen).
    fn settled(p: Point, m: Point) -> SpatialPartition {
        let mut part = partition();
        part.insert(hero(p.x, p.y)).unwrap();
        part.insert(Entity::monster(M, 1002, MapId(1), m)).unwrap();
        part
    }

    fn begin_tick(part: &mut SpatialPartition) {
        for e in part.entities_mut() {
            e.freeze();
        }
    }

    fn diff(part: &SpatialPartition) -> Vec<MessageOut> {
        let player = part.get(P).unwrap();
        diff_for_player(part, player, AROUND_AREA).unwrap()
    }

    #[test]
    fn test_new_monster_enters_with_destination() {
        let mut part = settled(Point::new(700, 900), Point::new(720, 900));
        part.get_mut(M).unwrap().raise(UpdateFlags::NEW_ON_MAP);

        let msgs = diff(&part);
        assert_eq!(msgs.len(), 2);

        let mut enter = MessageIn::parse(msgs[0].as_bytes()).unwrap();
        assert_eq!(enter.id(), GPMSG_BEING_ENTER);
        assert_eq!(enter.read_byte().unwrap(), 2);
        assert_eq!(enter.read_short().unwrap(), 1);
        assert_eq!(enter.read_short().unwrap(), 1002);

        let mut moves = MessageIn::parse(msgs[1].as_bytes()).unwrap();
        assert_eq!(moves.id(), GPMSG_BEINGS_MOVE);
        assert_eq!(moves.read_short().unwrap(), 1);
        assert_eq!(moves.read_byte().unwrap(), MOVING_DESTINATION);
        assert_eq!(moves.read_short().unwrap(), 720);
        assert_eq!(moves.read_short().unwrap(), 900);
        assert_eq!(moves.remaining(), 0);
    }

    #[test]
    fn test_new_player_sees_itself_and_neighbours() {
        let mut part = settled(Point::new(700, 900), Point::new(720, 900));
        part.get_mut(P).unwrap().raise(UpdateFlags::NEW_ON_MAP);

        let msgs = diff(&part);
        let enters: Vec<_> = msgs.iter().filter(|m| m.id() == GPMSG_BEING_ENTER).collect();
        assert_eq!(enters.len(), 2);

        let mut own = MessageIn::parse(enters[0].as_bytes()).unwrap();
        assert_eq!(own.read_byte().unwrap(), 1);
        assert_eq!(own.read_short().unwrap(), 0);
        assert_eq!(own.read_string().unwrap(), "hero");
        assert_eq!(own.read_byte().unwrap(), 3);
        assert_eq!(own.read_byte().unwrap(), 4);
        assert_eq!(own.read_byte().unwrap(), 1);
    }

    #[test]
    fn test_moving_monster_sends_coarse_position_only() {
        let mut part = settled(Point::new(700, 900), Point::new(720, 900));
        begin_tick(&mut part);
        let m = part.get_mut(M).unwrap();
        m.position = Point::new(752, 900);
        m.destination = Point::new(800, 900);

        let msgs = diff(&part);
        assert_eq!(msgs.len(), 1);
        let mut moves = MessageIn::parse(msgs[0].as_bytes()).unwrap();
        assert_eq!(moves.read_short().unwrap(), 1);
        assert_eq!(moves.read_byte().unwrap(), MOVING_POSITION);
        assert_eq!(moves.read_short().unwrap(), 23);
        assert_eq!(moves.read_short().unwrap(), 28);
        assert_eq!(moves.remaining(), 0);
    }

    #[test]
    fn test_new_destination_adds_full_resolution_target() {
        let mut part = settled(Point::new(700, 900), Point::new(720, 900));
        begin_tick(&mut part);
        let m = part.get_mut(M).unwrap();
        m.set_destination(Point::new(800, 900));
        m.position = Point::new(728, 900);

        let msgs = diff(&part);
        let mut moves = MessageIn::parse(msgs[0].as_bytes()).unwrap();
        moves.read_short().unwrap();
        assert_eq!(moves.read_byte().unwrap(), MOVING_POSITION | MOVING_DESTINATION);
        assert_eq!((moves.read_short().unwrap(), moves.read_short().unwrap()), (22, 28));
        assert_eq!((moves.read_short().unwrap(), moves.read_short().unwrap()), (800, 900));
    }

    #[test]
    fn test_monster_leaving_range() {
        let mut part = settled(Point::new(700, 900), Point::new(1010, 900));
        begin_tick(&mut part);
        part.get_mut(M).unwrap().position = Point::new(1030, 900);
        part.refresh_zones();

        let msgs = diff(&part);
        assert_eq!(msgs.len(), 1);
        let mut leave = MessageIn::parse(msgs[0].as_bytes()).unwrap();
        assert_eq!(leave.id(), GPMSG_BEING_LEAVE);
        assert_eq!(leave.read_short().unwrap(), 1);
    }

    #[test]
    fn test_player_walking_away_from_monster() {
        let mut part = settled(Point::new(700, 900), Point::new(390, 900));
        begin_tick(&mut part);
        let p = part.get_mut(P).unwrap();
        p.position = Point::new(712, 900);
        p.destination = p.position;
        part.refresh_zones();

        let msgs = diff(&part);
        let leaves: Vec<_> = msgs.iter().filter(|m| m.id() == GPMSG_BEING_LEAVE).collect();
        assert_eq!(leaves.len(), 1);
        let mut leave = MessageIn::parse(leaves[0].as_bytes()).unwrap();
        assert_eq!(leave.read_short().unwrap(), 1);
        assert_eq!(leave.remaining(), 0);

        // The only move entry is the player's own
        let moves = msgs.last().unwrap();
        assert_eq!(moves.id(), GPMSG_BEINGS_MOVE);
        let mut moves = MessageIn::parse(moves.as_bytes()).unwrap();
        assert_eq!(moves.read_short().unwrap(), 0);
        assert_eq!(moves.read_byte().unwrap(), MOVING_DESTINATION);
        assert_eq!((moves.read_short().unwrap(), moves.read_short().unwrap()), (712, 900));
        assert_eq!(moves.remaining(), 0);
    }

    #[test]
    fn test_idle_neighbours_produce_nothing() {
        let mut part = settled(Point::new(700, 900), Point::new(720, 900));
        begin_tick(&mut part);
        assert!(diff(&part).is_empty());
    }

    #[test]
    fn test_attack_notification() {
        let mut part = settled(Point::new(700, 900), Point::new(720, 900));
        begin_tick(&mut part);
        part.get_mut(M).unwrap().raise(UpdateFlags::ATTACK);

        let msgs = diff(&part);
        assert_eq!(msgs.len(), 1);
        let mut attack = MessageIn::parse(msgs[0].as_bytes()).unwrap();
        assert_eq!(attack.id(), GPMSG_BEING_ATTACK);
        assert_eq!(attack.read_short().unwrap(), 1);
    }

    #[test]
    fn test_own_attack_not_reported() {
        let mut part = settled(Point::new(700, 900), Point::new(720, 900));
        begin_tick(&mut part);
        part.get_mut(P).unwrap().raise(UpdateFlags::ATTACK);
        assert!(diff(&part).is_empty());
    }

    #[test]
    fn test_synchronize_skips_unencodable_player() {
        let mut part = partition();
        let long_name = PlayerData {
            name: "x".repeat(u16::MAX as usize + 1),
            hair_style: 0,
            hair_color: 0,
            gender: 0,
        };
        part.insert(Entity::player(EntityId(1), long_name, MapId(1), Point::new(100, 100))).unwrap();
        let mut other = hero(2000, 2000);
        other.id = EntityId(3);
        part.insert(other).unwrap();
        for e in part.entities_mut() {
            e.raise(UpdateFlags::NEW_ON_MAP);
        }

        let mut outbox = Vec::new();
        let queued = synchronize(&part, AROUND_AREA, &mut outbox);
        assert_eq!(queued, 2);
        assert!(outbox.iter().all(|d| d.recipient == EntityId(3)));
    }
}
