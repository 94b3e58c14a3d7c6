//! JSON Map Catalog
//!
//! Serves maps and character records from a single JSON document. Plays
//! both the `MapProvider` and the `Storage` role for the world.
//!
//! ```json
//! {
//!   "maps": [{
//!     "id": 1, "name": "Tulimshar", "width": 100, "height": 100,
//!     "blocked": [[4, 7]],
//!     "warps": [{ "area": {"x": 0, "y": 0, "w": 32, "h": 64},
//!                 "map": 2, "x": 320, "y": 320 }],
//!     "spawns": [{ "area": {"x": 640, "y": 640, "w": 320, "h": 320},
//!                  "monster_class": 1002, "max_beings": 4, "spawn_interval": 50 }]
//!   }],
//!   "characters": [{ "name": "hero", "map": 1, "position": {"x": 700, "y": 900} }]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::point::{Point, Rectangle};
use crate::game::entity::MapId;
use crate::game::map::{
    CharacterRecord, LoadedMap, Map, MapProvider, SpawnArea, Storage, Thing, TriggerAction,
    TriggerArea,
};

/// Errors loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// File could not be read.
    #[error("failed to read map catalog: {0}")]
    Io(#[from] std::io::Error),

    /// Document is not a valid catalog.
    #[error("invalid map catalog: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WarpEntry {
    area: Rectangle,
    map: MapId,
    x: u16,
    y: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SpawnEntry {
    area: Rectangle,
    monster_class: u16,
    max_beings: u16,
    spawn_interval: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct MapEntry {
    id: MapId,
    name: String,
    width: u16,
    height: u16,
    #[serde(default)]
    blocked: Vec<(u16, u16)>,
    #[serde(default)]
    warps: Vec<WarpEntry>,
    #[serde(default)]
    spawns: Vec<SpawnEntry>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    maps: Vec<MapEntry>,
    #[serde(default)]
    characters: Vec<CharacterRecord>,
}

/// In-memory map and character catalog.
#[derive(Clone, Debug, Default)]
pub struct MapCatalog {
    maps: BTreeMap<MapId, MapEntry>,
    characters: BTreeMap<String, CharacterRecord>,
}

impl MapCatalog {
    /// Parse a catalog from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        let mut catalog = Self::default();
        for map in doc.maps {
            if catalog.maps.insert(map.id, map.clone()).is_some() {
                warn!("Duplicate catalog entry for {}, keeping the last one", map.id);
            }
        }
        for character in doc.characters {
            catalog.characters.insert(character.name.clone(), character);
        }
        debug!(
            "Loaded catalog with {} maps and {} characters",
            catalog.maps.len(),
            catalog.characters.len()
        );
        Ok(catalog)
    }

    /// Read and parse a catalog file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Small built-in world used when no catalog file is configured.
    pub fn demo() -> Self {
        let mut catalog = Self::default();
        catalog.maps.insert(MapId(1), MapEntry {
            id: MapId(1),
            name: "Tulimshar".to_string(),
            width: 100,
            height: 100,
            blocked: Vec::new(),
            warps: vec![WarpEntry {
                area: Rectangle::new(0, 0, 32, 3200),
                map: MapId(2),
                x: 3000,
                y: 1600,
            }],
            spawns: vec![SpawnEntry {
                area: Rectangle::new(1280, 1280, 640, 640),
                monster_class: 1002,
                max_beings: 6,
                spawn_interval: 30,
            }],
        });
        catalog.maps.insert(MapId(2), MapEntry {
            id: MapId(2),
            name: "Desert Road".to_string(),
            width: 100,
            height: 100,
            blocked: Vec::new(),
            warps: vec![WarpEntry {
                area: Rectangle::new(3168, 0, 32, 3200),
                map: MapId(1),
                x: 200,
                y: 1600,
            }],
            spawns: Vec::new(),
        });
        catalog
    }

    /// Number of maps in the catalog.
    pub fn map_count(&self) -> usize {
        self.maps.len()
    }
}

impl MapProvider for MapCatalog {
    fn load_map(&self, id: MapId) -> Option<LoadedMap> {
        let entry = self.maps.get(&id)?;
        let mut map = Map::open(entry.width, entry.height);
        for &(tx, ty) in &entry.blocked {
            map.block(tx, ty);
        }

        let warps = entry.warps.iter().map(|w| {
            Thing::Trigger(TriggerArea {
                area: w.area,
                action: TriggerAction::Warp { map: w.map, point: Point::new(w.x, w.y) },
            })
        });
        let spawns = entry.spawns.iter().map(|s| {
            Thing::Spawn(SpawnArea::new(s.area, s.monster_class, s.max_beings, s.spawn_interval))
        });

        Some(LoadedMap { map, things: warps.chain(spawns).collect() })
    }
}

impl Storage for MapCatalog {
    fn map_display_name(&self, id: MapId) -> Option<String> {
        self.maps.get(&id).map(|m| m.name.clone())
    }

    fn character(&self, name: &str) -> Option<CharacterRecord> {
        self.characters.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "maps": [{
            "id": 3, "name": "Woodland", "width": 20, "height": 10,
            "blocked": [[1, 1]],
            "warps": [{ "area": {"x": 0, "y": 0, "w": 32, "h": 32}, "map": 4, "x": 64, "y": 96 }],
            "spawns": [{ "area": {"x": 64, "y": 64, "w": 64, "h": 64},
                         "monster_class": 12, "max_beings": 3, "spawn_interval": 5 }]
        }],
        "characters": [{ "name": "hero", "map": 3, "position": {"x": 100, "y": 120}, "gender": 1 }]
    }"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = MapCatalog::from_json_str(DOC).unwrap();
        assert_eq!(catalog.map_count(), 1);
        assert_eq!(catalog.map_display_name(MapId(3)).as_deref(), Some("Woodland"));
        assert_eq!(catalog.map_display_name(MapId(9)), None);

        let loaded = catalog.load_map(MapId(3)).unwrap();
        assert_eq!(loaded.map.width(), 20);
        assert!(!loaded.map.is_walkable(Point::new(40, 40)));
        assert_eq!(loaded.things.len(), 2);
        assert!(matches!(
            loaded.things[0],
            Thing::Trigger(TriggerArea {
                action: TriggerAction::Warp { map: MapId(4), point: Point { x: 64, y: 96 } },
                ..
            })
        ));
        assert!(catalog.load_map(MapId(4)).is_none());
    }

    #[test]
    fn test_character_lookup() {
        let catalog = MapCatalog::from_json_str(DOC).unwrap();
        let hero = catalog.character("hero").unwrap();
        assert_eq!(hero.map, MapId(3));
        assert_eq!(hero.position, Point::new(100, 120));
        assert_eq!(hero.gender, 1);
        assert_eq!(hero.hair_style, 0);
        assert!(catalog.character("nobody").is_none());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            MapCatalog::from_json_str("{ \"maps\": 3 }"),
            Err(CatalogError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            MapCatalog::from_file("/nonexistent/catalog.json"),
            Err(CatalogError::Io(_))
        ));
    }

    #[test]
    fn test_demo_catalog_loads() {
        let catalog = MapCatalog::demo();
        assert!(catalog.load_map(MapId(1)).is_some());
        assert!(catalog.load_map(MapId(2)).is_some());
    }
}
