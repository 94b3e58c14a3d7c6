//! Map Geometry and Static Things
//!
//! Walkability grid, the trigger and spawn areas attached to a map, and the
//! collaborator traits through which the world loads maps and characters.

use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;

use crate::core::point::{Point, Rectangle, TILE_SIZE};
use crate::game::entity::{EntityId, MapId};

// =============================================================================
// WALKABILITY
// =============================================================================

/// Tile grid of one map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Map {
    width: u16,
    height: u16,
    blocked: Vec<bool>,
}

impl Map {
    /// Fully walkable map of `width` x `height` tiles.
    pub fn open(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            blocked: vec![false; width as usize * height as usize],
        }
    }

    /// Width in tiles.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Height in tiles.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Width in pixels.
    pub fn pixel_width(&self) -> u32 {
        u32::from(self.width) * u32::from(TILE_SIZE)
    }

    /// Height in pixels.
    pub fn pixel_height(&self) -> u32 {
        u32::from(self.height) * u32::from(TILE_SIZE)
    }

    /// Mark a tile as not walkable. Out-of-range tiles are ignored.
    pub fn block(&mut self, tx: u16, ty: u16) {
        if let Some(idx) = self.index(tx, ty) {
            self.blocked[idx] = true;
        }
    }

    fn index(&self, tx: u16, ty: u16) -> Option<usize> {
        (tx < self.width && ty < self.height)
            .then(|| ty as usize * self.width as usize + tx as usize)
    }

    /// True when the point lies inside the map's pixel bounds.
    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        u32::from(p.x) < self.pixel_width() && u32::from(p.y) < self.pixel_height()
    }

    /// True when the point is inside the map and its tile is not blocked.
    pub fn is_walkable(&self, p: Point) -> bool {
        let (tx, ty) = p.tile();
        match self.index(tx, ty) {
            Some(idx) => !self.blocked[idx],
            None => false,
        }
    }
}

// =============================================================================
// THINGS
// =============================================================================

/// What a trigger area does to a player standing in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerAction {
    /// Move the player to another map.
    Warp {
        /// Target map
        map: MapId,
        /// Arrival point
        point: Point,
    },
}

/// Rectangle that fires an action for players inside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerArea {
    /// Area covered
    pub area: Rectangle,
    /// Action fired
    pub action: TriggerAction,
}

/// Rectangle that keeps a population of monsters alive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnArea {
    /// Area monsters appear in
    pub area: Rectangle,
    /// Class of spawned monsters
    pub monster_class: u16,
    /// Population cap
    pub max_beings: u16,
    /// Ticks between two spawns
    pub spawn_interval: u32,
    /// Monsters from this area still on the map
    pub spawned: BTreeSet<EntityId>,
    countdown: u32,
}

impl SpawnArea {
    /// Create an empty spawn area.
    pub fn new(area: Rectangle, monster_class: u16, max_beings: u16, spawn_interval: u32) -> Self {
        Self {
            area,
            monster_class,
            max_beings,
            spawn_interval,
            spawned: BTreeSet::new(),
            countdown: 0,
        }
    }

    /// Advance the spawn timer. Returns true when a monster should spawn now.
    pub fn ready(&mut self) -> bool {
        if self.spawned.len() >= self.max_beings as usize {
            return false;
        }
        if self.countdown > 0 {
            self.countdown -= 1;
            return false;
        }
        self.countdown = self.spawn_interval;
        true
    }
}

/// Static object attached to a map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Thing {
    /// Fires an action on players inside a rectangle.
    Trigger(TriggerArea),
    /// Spawns monsters inside a rectangle.
    Spawn(SpawnArea),
}

/// Result of loading a map.
#[derive(Clone, Debug)]
pub struct LoadedMap {
    /// Walkability grid
    pub map: Map,
    /// Static things to insert with the map
    pub things: Vec<Thing>,
}

// =============================================================================
// COLLABORATORS
// =============================================================================

/// Source of map content.
pub trait MapProvider: Send + Sync {
    /// Load a map, or `None` if it does not exist.
    fn load_map(&self, id: MapId) -> Option<LoadedMap>;
}

/// Persisted starting state of a character.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRecord {
    /// Character name
    pub name: String,
    /// Map the character starts on
    pub map: MapId,
    /// Starting position
    pub position: Point,
    /// Hair style index
    #[serde(default)]
    pub hair_style: u8,
    /// Hair color index
    #[serde(default)]
    pub hair_color: u8,
    /// Gender
    #[serde(default)]
    pub gender: u8,
}

/// Persistence lookups consulted by the world.
pub trait Storage: Send + Sync {
    /// Human-readable name of a map, sent with map changes.
    fn map_display_name(&self, id: MapId) -> Option<String>;

    /// Stored record of a character.
    fn character(&self, name: &str) -> Option<CharacterRecord>;
}
