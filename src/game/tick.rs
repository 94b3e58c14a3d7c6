//! World Tick
//!
//! The fixed-order pass sequence run once per tick on every active map.
//! Maps share no entity state, so each is processed to completion before
//! the next, in ascending map id order.

use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::game::aoi;
use crate::game::entity::{Entity, EntityId, MapId, UpdateFlags};
use crate::game::map::{SpawnArea, Thing, TriggerAction, TriggerArea};
use crate::game::partition::SpatialPartition;
use crate::game::world::{Deferred, IdAllocator, WorldState};

/// Attempts at finding a walkable spawn point before giving up for a tick.
const SPAWN_ATTEMPTS: usize = 10;

/// Result of a tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickResult {
    /// Tick number
    pub tick: u64,
    /// Maps processed
    pub maps: usize,
    /// Deliveries queued by the area-of-interest pass
    pub deliveries: usize,
    /// Monsters created by spawn areas
    pub spawned: usize,
    /// Entities removed at pass boundaries
    pub removed: usize,
    /// Entities warped at pass boundaries
    pub warped: usize,
}

/// Run one tick over every active map.
pub fn tick(world: &mut WorldState) -> TickResult {
    world.tick += 1;
    let mut result = TickResult {
        tick: world.tick,
        ..TickResult::default()
    };
    let range = world.config().around_range;

    let map_ids: Vec<MapId> = world.maps.keys().copied().collect();
    for map_id in map_ids {
        let WorldState { maps, locations, outbox, deferred, ids, .. } = &mut *world;
        let Some(partition) = maps.get_mut(&map_id) else {
            continue;
        };
        result.maps += 1;

        // 0. Freeze pre-tick positions
        for entity in partition.entities_mut() {
            entity.freeze();
        }

        // 1. Logic pass
        partition.update_all();

        // 2. Movement pass
        partition.step_all();

        // 3. Bookkeeping: zones, triggers, spawns
        partition.refresh_zones();
        result.spawned += run_things(partition, ids, locations, deferred);

        // 4. Area-of-interest diff
        result.deliveries += aoi::synchronize(partition, range, outbox);

        // 5. Flag clear
        for entity in partition.entities_mut() {
            entity.clear_flags();
        }

        // 6. Deferred structural changes
        let (removed, warped) = world.apply_deferred();
        result.removed += removed;
        result.warped += warped;
    }

    // Requests made while no map was active
    let (removed, warped) = world.apply_deferred();
    result.removed += removed;
    result.warped += warped;

    if result.spawned + result.removed + result.warped > 0 {
        debug!(
            "Tick {}: {} spawned, {} removed, {} warped, {} deliveries",
            result.tick, result.spawned, result.removed, result.warped, result.deliveries
        );
    }
    result
}

/// Run every trigger and spawn area of a map. Returns monsters spawned.
fn run_things(
    partition: &mut SpatialPartition,
    ids: &mut IdAllocator,
    locations: &mut BTreeMap<EntityId, MapId>,
    deferred: &mut Vec<Deferred>,
) -> usize {
    let mut things = std::mem::take(&mut partition.things);
    let mut spawned = 0;

    for thing in &mut things {
        match thing {
            Thing::Trigger(trigger) => fire_trigger(partition, trigger, deferred),
            Thing::Spawn(spawn) => {
                if spawn_monster(partition, spawn, ids, locations) {
                    spawned += 1;
                }
            }
        }
    }

    partition.things = things;
    spawned
}

fn fire_trigger(partition: &SpatialPartition, trigger: &TriggerArea, deferred: &mut Vec<Deferred>) {
    let TriggerAction::Warp { map, point } = trigger.action;
    deferred.extend(
        partition
            .query_all_players()
            .filter(|p| trigger.area.contains(p.position))
            .map(|p| Deferred::Warp(p.id, map, point)),
    );
}

fn spawn_monster(
    partition: &mut SpatialPartition,
    spawn: &mut SpawnArea,
    ids: &mut IdAllocator,
    locations: &mut BTreeMap<EntityId, MapId>,
) -> bool {
    // Forget monsters that died or despawned
    spawn.spawned.retain(|id| partition.contains(*id));
    if !spawn.ready() {
        return false;
    }

    let mut position = None;
    for _ in 0..SPAWN_ATTEMPTS {
        let candidate = partition.rng.point_in(&spawn.area);
        if partition.map().is_walkable(candidate) {
            position = Some(candidate);
            break;
        }
    }
    let Some(position) = position else {
        debug!("No walkable spawn point in {:?} on {}", spawn.area, partition.id());
        return false;
    };

    let id = ids.next();
    let monster = Entity::monster(id, spawn.monster_class, partition.id(), position);
    match partition.insert(monster) {
        Ok(_) => {
            if let Some(inserted) = partition.get_mut(id) {
                inserted.raise(UpdateFlags::NEW_ON_MAP);
            }
            locations.insert(id, partition.id());
            spawn.spawned.insert(id);
            true
        }
        Err(e) => {
            error!("Spawn of monster class {} failed: {}", spawn.monster_class, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::core::message::MessageIn;
    use crate::core::opcodes::{
        GPMSG_BEINGS_MOVE, GPMSG_BEING_ENTER, GPMSG_BEING_LEAVE, GPMSG_PLAYER_MAP_CHANGE,
        MOVING_POSITION,
    };
    use crate::core::point::Point;
    use crate::game::catalog::MapCatalog;
    use crate::game::world::tests::{add_player, world};
    use crate::game::world::{Delivery, RemovalCause, WorldConfig};

    fn deliveries_for(deliveries: &[Delivery], recipient: EntityId) -> Vec<&Delivery> {
        deliveries.iter().filter(|d| d.recipient == recipient).collect()
    }

    const SPAWN_CATALOG: &str = r#"{
        "maps": [{
            "id": 1, "name": "Woodland", "width": 40, "height": 40,
            "warps": [{ "area": {"x": 0, "y": 0, "w": 64, "h": 64}, "map": 2, "x": 320, "y": 320 }],
            "spawns": [{ "area": {"x": 640, "y": 640, "w": 128, "h": 128},
                         "monster_class": 1002, "max_beings": 3, "spawn_interval": 2 }]
        }, {
            "id": 2, "name": "Cave", "width": 20, "height": 20
        }]
    }"#;

    fn spawn_world() -> WorldState {
        let catalog = Arc::new(MapCatalog::from_json_str(SPAWN_CATALOG).unwrap());
        let mut world = WorldState::new(WorldConfig::default(), catalog.clone(), catalog);
        world.activate(MapId(1)).unwrap();
        world
    }

    fn monsters(world: &WorldState) -> usize {
        world
            .partition(MapId(1))
            .map(|p| p.query_all().filter(|e| e.as_monster().is_some()).count())
            .unwrap_or(0)
    }

    #[test]
    fn test_tick_without_maps() {
        let mut world = world();
        let result = world.tick();
        assert_eq!(result.tick, 1);
        assert_eq!(result.maps, 0);
    }

    #[test]
    fn test_flags_cleared_after_tick() {
        let mut world = world();
        let a = add_player(&mut world, "a", 1, 700, 900);
        add_player(&mut world, "b", 1, 720, 900);
        world.set_destination(a, Point::new(800, 900)).unwrap();
        world.raise_attack(a).unwrap();

        world.tick();
        for e in world.partition(MapId(1)).unwrap().query_all() {
            assert!(e.update_flags.is_empty(), "{:?} kept {:?}", e.id, e.update_flags);
        }
    }

    #[test]
    fn test_players_meet_then_walk_apart() {
        let mut world = world();
        let a = add_player(&mut world, "a", 1, 700, 900);
        let b = add_player(&mut world, "b", 1, 720, 900);
        world.take_deliveries();

        // First tick: both are new, each sees two beings enter
        world.tick();
        let out = world.take_deliveries();
        for id in [a, b] {
            let mine = deliveries_for(&out, id);
            assert_eq!(mine.iter().filter(|d| d.message.id() == GPMSG_BEING_ENTER).count(), 2);
            assert_eq!(mine.last().unwrap().message.id(), GPMSG_BEINGS_MOVE);
        }

        // Quiet tick
        world.tick();
        assert!(world.take_deliveries().is_empty());

        // b walks east; a sees coarse positions
        world.set_destination(b, Point::new(1200, 900)).unwrap();
        world.tick();
        let out = world.take_deliveries();
        let to_a = deliveries_for(&out, a);
        assert_eq!(to_a.len(), 1);
        let mut moves = MessageIn::parse(to_a[0].message.as_bytes()).unwrap();
        assert_eq!(moves.read_short().unwrap(), 1);
        assert_eq!(moves.read_byte().unwrap() & MOVING_POSITION, MOVING_POSITION);

        // Keep walking until b leaves a's area
        let mut left = false;
        for _ in 0..100 {
            world.tick();
            let out = world.take_deliveries();
            if deliveries_for(&out, a).iter().any(|d| d.message.id() == GPMSG_BEING_LEAVE) {
                left = true;
                break;
            }
        }
        assert!(left);
        assert!(world.entity(b).unwrap().position.x > 700 + 320);
    }

    #[test]
    fn test_spawn_area_respects_cap() {
        let mut world = spawn_world();
        for _ in 0..50 {
            world.tick();
        }
        assert_eq!(monsters(&world), 3);

        // Killing one lets the area refill
        let victim = world
            .partition(MapId(1))
            .and_then(|p| p.query_all().find(|e| e.as_monster().is_some()).map(|e| e.id))
            .unwrap();
        world.remove_entity(victim, RemovalCause::Death);
        assert_eq!(monsters(&world), 2);
        for _ in 0..10 {
            world.tick();
        }
        assert_eq!(monsters(&world), 3);
    }

    #[test]
    fn test_spawned_monsters_tracked_by_world() {
        let mut world = spawn_world();
        let result = world.tick();
        assert_eq!(result.spawned, 1);
        let id = world
            .partition(MapId(1))
            .and_then(|p| p.query_all().next().map(|e| e.id))
            .unwrap();
        assert_eq!(world.map_of(id), Some(MapId(1)));
    }

    #[test]
    fn test_warp_trigger_moves_player() {
        let mut world = spawn_world();
        let id = add_player(&mut world, "a", 1, 32, 32);
        world.take_deliveries();

        let result = world.tick();
        assert_eq!(result.warped, 1);
        assert_eq!(world.map_of(id), Some(MapId(2)));
        assert_eq!(world.entity(id).unwrap().position, Point::new(320, 320));

        let out = world.take_deliveries();
        let mut change = deliveries_for(&out, id)
            .into_iter()
            .filter(|d| d.message.id() == GPMSG_PLAYER_MAP_CHANGE)
            .map(|d| MessageIn::parse(d.message.as_bytes()).unwrap());
        assert_eq!(change.next().unwrap().read_string().unwrap(), "Cave");

        // Map 2 was activated after map 1's passes; the player is announced
        // to itself on the next tick
        world.tick();
        let out = world.take_deliveries();
        assert!(deliveries_for(&out, id).iter().any(|d| d.message.id() == GPMSG_BEING_ENTER));
    }

    #[test]
    fn test_same_seed_same_world() {
        let mut a = spawn_world();
        let mut b = spawn_world();
        for _ in 0..40 {
            a.tick();
            b.tick();
        }
        let pa: Vec<_> = a.partition(MapId(1)).unwrap().query_all().map(|e| e.position).collect();
        let pb: Vec<_> = b.partition(MapId(1)).unwrap().query_all().map(|e| e.position).collect();
        assert_eq!(pa, pb);
        assert_eq!(a.take_deliveries(), b.take_deliveries());
    }
}
