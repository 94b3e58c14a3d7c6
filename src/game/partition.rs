//! Spatial Partition
//!
//! Owns every entity of one map, hands out public ids, and answers
//! "who is around this point" queries through a zone-bucketed index.
//!
//! ## Zone index
//!
//! The map is cut into square zones of `ZONE_SIZE` pixels. An entity is
//! listed in the zone of its current position and in the zone of its
//! position at the start of the tick, so queries that look at both old and
//! new positions only have to visit the zones overlapping the query box.
//! Candidates are collected into a sorted set, which also fixes the
//! iteration order to ascending `EntityId`.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::point::Point;
use crate::core::rng::DeterministicRng;
use crate::game::entity::{Entity, EntityId, MapId, PublicId};
use crate::game::map::{Map, Thing};
use crate::game::world::WorldError;

/// Side of one index zone in pixels.
pub const ZONE_SIZE: u16 = 256;

/// One past the largest assignable public id (0xFFFF is reserved).
const PUBLIC_ID_LIMIT: u16 = PublicId::NONE.0;

/// All entities and static things of one map.
#[derive(Debug)]
pub struct SpatialPartition {
    id: MapId,
    map: Map,
    /// Trigger and spawn areas, processed by the bookkeeping pass
    pub(crate) things: Vec<Thing>,
    /// Map-local random stream
    pub(crate) rng: DeterministicRng,
    entities: BTreeMap<EntityId, Entity>,

    // Public ids: everything below `next_public_id` is either in use or free.
    free_public_ids: BTreeSet<u16>,
    next_public_id: u16,
    pub(crate) public_id_limit: u16,

    zones_x: u16,
    zones_y: u16,
    zones: Vec<BTreeSet<EntityId>>,
    indexed: BTreeMap<EntityId, (usize, usize)>,
}

impl SpatialPartition {
    /// Create an empty partition for a loaded map.
    pub fn new(id: MapId, map: Map, things: Vec<Thing>, rng: DeterministicRng) -> Self {
        let zone = u32::from(ZONE_SIZE);
        let zones_x = map.pixel_width().div_ceil(zone).max(1) as u16;
        let zones_y = map.pixel_height().div_ceil(zone).max(1) as u16;

        Self {
            id,
            map,
            things,
            rng,
            entities: BTreeMap::new(),
            free_public_ids: BTreeSet::new(),
            next_public_id: 0,
            public_id_limit: PUBLIC_ID_LIMIT,
            zones_x,
            zones_y,
            zones: vec![BTreeSet::new(); zones_x as usize * zones_y as usize],
            indexed: BTreeMap::new(),
        }
    }

    /// Map identifier.
    pub fn id(&self) -> MapId {
        self.id
    }

    /// Walkability grid.
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Number of inserted entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when no entity is inserted.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check membership.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Look up an entity.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Look up an entity for mutation.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Every entity, for the per-tick passes.
    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    /// Logic pass over every entity, drawing from the map's random stream.
    pub(crate) fn update_all(&mut self) {
        for entity in self.entities.values_mut() {
            entity.update(&mut self.rng);
        }
    }

    /// Movement pass over every entity.
    pub(crate) fn step_all(&mut self) {
        for entity in self.entities.values_mut() {
            entity.step(&self.map);
        }
    }

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================

    /// Insert an entity and assign it the lowest free public id.
    pub fn insert(&mut self, mut entity: Entity) -> Result<PublicId, WorldError> {
        if entity.public_id.is_some() || self.entities.contains_key(&entity.id) {
            return Err(WorldError::DuplicateInsertion(entity.id));
        }
        if !self.map.contains(entity.position) {
            return Err(WorldError::InsertionRejected {
                entity: entity.id,
                reason: format!("position {} outside {}", entity.position, self.id),
            });
        }
        let public_id = self.allocate_public_id().ok_or_else(|| WorldError::InsertionRejected {
            entity: entity.id,
            reason: format!("no free public id on {}", self.id),
        })?;

        entity.public_id = Some(public_id);
        let id = entity.id;
        let zone = self.zone_of(entity.position);
        self.zones[zone].insert(id);
        self.indexed.insert(id, (zone, zone));
        self.entities.insert(id, entity);

        Ok(public_id)
    }

    /// Remove an entity, freeing its public id. `None` if it is not here.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let mut entity = self.entities.remove(&id)?;

        if let Some((a, b)) = self.indexed.remove(&id) {
            self.zones[a].remove(&id);
            self.zones[b].remove(&id);
        }
        if let Some(public_id) = entity.public_id.take() {
            self.free_public_ids.insert(public_id.0);
        }

        Some(entity)
    }

    fn allocate_public_id(&mut self) -> Option<PublicId> {
        if let Some(id) = self.free_public_ids.pop_first() {
            return Some(PublicId(id));
        }
        if self.next_public_id < self.public_id_limit {
            let id = self.next_public_id;
            self.next_public_id += 1;
            return Some(PublicId(id));
        }
        None
    }

    // =========================================================================
    // ZONE INDEX
    // =========================================================================

    fn zone_of(&self, p: Point) -> usize {
        let zx = (p.x / ZONE_SIZE).min(self.zones_x - 1);
        let zy = (p.y / ZONE_SIZE).min(self.zones_y - 1);
        zy as usize * self.zones_x as usize + zx as usize
    }

    /// Re-file every entity under the zones of its old and current position.
    pub fn refresh_zones(&mut self) {
        let moved: Vec<(EntityId, (usize, usize))> = self
            .entities
            .values()
            .map(|e| (e.id, (self.zone_of(e.old_position), self.zone_of(e.position))))
            .filter(|(id, zones)| self.indexed.get(id) != Some(zones))
            .collect();

        for (id, (a, b)) in moved {
            if let Some((old_a, old_b)) = self.indexed.insert(id, (a, b)) {
                self.zones[old_a].remove(&id);
                self.zones[old_b].remove(&id);
            }
            self.zones[a].insert(id);
            self.zones[b].insert(id);
        }
    }

    /// Ids filed in any zone overlapping the bounding box of `a` and `b`
    /// grown by `range`.
    fn candidates(&self, a: Point, b: Point, range: u16) -> BTreeSet<EntityId> {
        let min_x = a.x.min(b.x).saturating_sub(range) / ZONE_SIZE;
        let min_y = a.y.min(b.y).saturating_sub(range) / ZONE_SIZE;
        let max_x = (a.x.max(b.x).saturating_add(range) / ZONE_SIZE).min(self.zones_x - 1);
        let max_y = (a.y.max(b.y).saturating_add(range) / ZONE_SIZE).min(self.zones_y - 1);

        let mut out = BTreeSet::new();
        for zy in min_y..=max_y {
            for zx in min_x..=max_x {
                let zone = zy as usize * self.zones_x as usize + zx as usize;
                out.extend(self.zones[zone].iter().copied());
            }
        }
        out
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Moving entities whose position is in range of `center`.
    pub fn query_around(&self, center: Point, range: u16) -> impl Iterator<Item = &Entity> + '_ {
        self.candidates(center, center, range)
            .into_iter()
            .filter_map(move |id| self.entities.get(&id))
            .filter(move |e| e.is_moving() && e.position.in_range_of(center, range))
    }

    /// Moving entities that were or are in range of where the player was or
    /// is. May include the player itself.
    pub fn query_around_player(
        &self,
        player: &Entity,
        range: u16,
    ) -> impl Iterator<Item = &Entity> + '_ {
        let (p_old, p_new) = (player.old_position, player.position);
        self.candidates(p_old, p_new, range)
            .into_iter()
            .filter_map(move |id| self.entities.get(&id))
            .filter(move |e| {
                e.is_moving()
                    && [e.old_position, e.position].iter().any(|o| {
                        o.in_range_of(p_old, range) || o.in_range_of(p_new, range)
                    })
            })
    }

    /// Players whose position is in range of the object's position.
    pub fn query_around_object(
        &self,
        object: &Entity,
        range: u16,
    ) -> impl Iterator<Item = &Entity> + '_ {
        let center = object.position;
        self.candidates(center, center, range)
            .into_iter()
            .filter_map(move |id| self.entities.get(&id))
            .filter(move |e| e.is_player() && e.position.in_range_of(center, range))
    }

    /// Every entity in ascending id order.
    pub fn query_all(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values()
    }

    /// Every player in ascending id order.
    pub fn query_all_players(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values().filter(|e| e.is_player())
    }
}
