//! Entity Model
//!
//! One record type for everything that can sit on a map. The variant tag
//! decides what the entity can do: items only have a position, everything
//! else walks, and players additionally receive area-of-interest updates.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::point::Point;
use crate::core::rng::DeterministicRng;
use crate::game::controller::Controller;
use crate::game::map::Map;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Process-unique entity identity, allocated by the world.
///
/// Stable for the whole life of the entity, including across map changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-map handle that clients use to refer to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicId(pub u16);

impl PublicId {
    /// Reserved value, never assigned. Used on the wire for "nobody".
    pub const NONE: PublicId = PublicId(0xFFFF);
}

/// Map identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MapId(pub u16);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map {}", self.0)
    }
}

// =============================================================================
// UPDATE FLAGS
// =============================================================================

/// Per-tick change markers read by the area-of-interest pass.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateFlags(u8);

impl UpdateFlags {
    /// No pending changes.
    pub const EMPTY: UpdateFlags = UpdateFlags(0);
    /// Entered the map this tick.
    pub const NEW_ON_MAP: UpdateFlags = UpdateFlags(1);
    /// Destination changed this tick.
    pub const NEW_DESTINATION: UpdateFlags = UpdateFlags(2);
    /// Performed an attack this tick.
    pub const ATTACK: UpdateFlags = UpdateFlags(4);

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True when every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: UpdateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set.
    #[inline]
    pub const fn intersects(self, other: UpdateFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// True when nothing is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set the bits of `other`.
    #[inline]
    pub fn insert(&mut self, other: UpdateFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for UpdateFlags {
    type Output = UpdateFlags;

    fn bitor(self, rhs: UpdateFlags) -> UpdateFlags {
        UpdateFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for UpdateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::NEW_ON_MAP) {
            names.push("NEW_ON_MAP");
        }
        if self.contains(Self::NEW_DESTINATION) {
            names.push("NEW_DESTINATION");
        }
        if self.contains(Self::ATTACK) {
            names.push("ATTACK");
        }
        write!(f, "UpdateFlags({})", names.join(" | "))
    }
}

// =============================================================================
// ENTITY KIND
// =============================================================================

/// Appearance of a player character.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerData {
    /// Character name
    pub name: String,
    /// Hair style index
    pub hair_style: u8,
    /// Hair color index
    pub hair_color: u8,
    /// Gender (0 male, 1 female)
    pub gender: u8,
}

/// Monster specifics.
#[derive(Clone, Debug)]
pub struct MonsterData {
    /// Monster class, sent to clients
    pub class_id: u16,
    /// Wandering AI
    pub controller: Controller,
}

/// Variant tag of an entity.
#[derive(Clone, Debug)]
pub enum EntityKind {
    /// Stationary object lying on the ground.
    Item {
        /// Item class
        item_class: u16,
    },
    /// Player-controlled character.
    Player(PlayerData),
    /// Server-controlled monster.
    Monster(MonsterData),
    /// Non-player character.
    Npc {
        /// NPC identifier, sent to clients
        npc_id: u16,
    },
}

impl EntityKind {
    /// Object type code used on the wire.
    pub fn object_type(&self) -> u8 {
        match self {
            EntityKind::Item { .. } => 0,
            EntityKind::Player(_) => 1,
            EntityKind::Monster(_) => 2,
            EntityKind::Npc { .. } => 3,
        }
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// Anything that occupies a position on a map.
#[derive(Clone, Debug)]
pub struct Entity {
    /// Stable identity
    pub id: EntityId,
    /// Assigned while the entity is inserted in a map
    pub public_id: Option<PublicId>,
    /// Map the entity lives on
    pub map_id: MapId,
    /// Current position
    pub position: Point,
    /// Position at the start of the current tick
    pub old_position: Point,
    /// Where the entity is walking to; equals `position` when idle
    pub destination: Point,
    /// Pixels advanced per tick on each axis
    pub speed: u16,
    /// Changes raised this tick
    pub update_flags: UpdateFlags,
    /// Variant data
    pub kind: EntityKind,
}

/// Default walking speed in pixels per tick.
pub const DEFAULT_SPEED: u16 = 8;

impl Entity {
    /// Create an entity at rest.
    pub fn new(id: EntityId, kind: EntityKind, map_id: MapId, position: Point) -> Self {
        Self {
            id,
            public_id: None,
            map_id,
            position,
            old_position: position,
            destination: position,
            speed: DEFAULT_SPEED,
            update_flags: UpdateFlags::EMPTY,
            kind,
        }
    }

    /// Create a player character.
    pub fn player(id: EntityId, data: PlayerData, map_id: MapId, position: Point) -> Self {
        Self::new(id, EntityKind::Player(data), map_id, position)
    }

    /// Create a monster that wanders around its spawn point.
    pub fn monster(id: EntityId, class_id: u16, map_id: MapId, position: Point) -> Self {
        let controller = Controller::new(position);
        Self::new(id, EntityKind::Monster(MonsterData { class_id, controller }), map_id, position)
    }

    /// Create a stationary NPC.
    pub fn npc(id: EntityId, npc_id: u16, map_id: MapId, position: Point) -> Self {
        let mut npc = Self::new(id, EntityKind::Npc { npc_id }, map_id, position);
        npc.speed = 0;
        npc
    }

    /// Create an item on the ground.
    pub fn item(id: EntityId, item_class: u16, map_id: MapId, position: Point) -> Self {
        let mut item = Self::new(id, EntityKind::Item { item_class }, map_id, position);
        item.speed = 0;
        item
    }

    // -------------------------------------------------------------------------
    // Capability queries
    // -------------------------------------------------------------------------

    /// True for everything that can walk and therefore shows up in AOI diffs.
    #[inline]
    pub fn is_moving(&self) -> bool {
        !matches!(self.kind, EntityKind::Item { .. })
    }

    /// True for player characters.
    #[inline]
    pub fn is_player(&self) -> bool {
        matches!(self.kind, EntityKind::Player(_))
    }

    /// Player view of this entity.
    pub fn as_player(&self) -> Option<&PlayerData> {
        match &self.kind {
            EntityKind::Player(data) => Some(data),
            _ => None,
        }
    }

    /// Monster view of this entity.
    pub fn as_monster(&self) -> Option<&MonsterData> {
        match &self.kind {
            EntityKind::Monster(data) => Some(data),
            _ => None,
        }
    }

    /// Mutable monster view of this entity.
    pub fn as_monster_mut(&mut self) -> Option<&mut MonsterData> {
        match &mut self.kind {
            EntityKind::Monster(data) => Some(data),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Per-tick behaviour
    // -------------------------------------------------------------------------

    /// Raise an update flag.
    #[inline]
    pub fn raise(&mut self, flag: UpdateFlags) {
        self.update_flags.insert(flag);
    }

    /// Start walking to `destination`.
    pub fn set_destination(&mut self, destination: Point) {
        self.destination = destination;
        self.raise(UpdateFlags::NEW_DESTINATION);
    }

    /// Freeze the pre-tick position.
    #[inline]
    pub fn freeze(&mut self) {
        self.old_position = self.position;
    }

    /// Logic pass. Monsters let their controller pick a new destination.
    pub fn update(&mut self, rng: &mut DeterministicRng) {
        let position = self.position;
        let destination = self.destination;
        let chosen = match self.as_monster_mut() {
            Some(monster) => monster.controller.update(position, destination, rng),
            None => None,
        };
        if let Some(target) = chosen {
            self.set_destination(target);
        }
    }

    /// Movement pass: advance one step toward the destination.
    ///
    /// Stops in place when the next step would leave the map or land on a
    /// blocked tile.
    pub fn step(&mut self, map: &Map) {
        if !self.is_moving() || self.position == self.destination || self.speed == 0 {
            return;
        }
        let next = self.position.step_toward(self.destination, self.speed);
        if map.is_walkable(next) {
            self.position = next;
        } else {
            self.destination = self.position;
        }
    }

    /// Flag-clear pass.
    #[inline]
    pub fn clear_flags(&mut self) {
        self.update_flags = UpdateFlags::EMPTY;
    }
}
