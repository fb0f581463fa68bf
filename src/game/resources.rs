//! Match Resources
//!
//! Static configuration a match is built from (entity and trait
//! definitions, map registry, tile and team tables, match settings) and
//! the map sources that hand out map documents.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::game::action::DEFAULT_QUEUE_SIZE;
use crate::game::entity::{EntityType, TraitType};
use crate::game::grid::MapData;
use crate::game::team::TeamType;

/// Resource loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Map type {0} does not exist")]
    UnknownMap(String),
}

// =============================================================================
// Definitions
// =============================================================================

/// Tile metadata keyed by the type-layer value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TileType {
    pub passability: Option<String>,
    pub auto_capture: bool,
    pub has_border: bool,
}

/// Where a map document lives, relative to the map root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapType {
    pub directory: String,
    pub source: String,
}

/// Unit placed for a member when a match starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartingUnit {
    #[serde(rename = "type")]
    pub type_id: String,
    pub tile_x: i32,
    pub tile_y: i32,
    /// Join-order index of the member that controls the unit.
    pub slot: usize,
}

/// Versus match settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersusSettings {
    pub max_clients: usize,
    pub action_queue_size: usize,
    pub team_layer: String,
    pub type_layer: String,
    pub allow_ally_passing: bool,
    /// Stat block used when building entities.
    pub stat_mode: String,
    pub map_cache_enabled: bool,
    pub starting_units: Vec<StartingUnit>,
}

impl Default for VersusSettings {
    fn default() -> Self {
        Self {
            max_clients: 2,
            action_queue_size: DEFAULT_QUEUE_SIZE,
            team_layer: "team".to_string(),
            type_layer: "type".to_string(),
            allow_ally_passing: true,
            stat_mode: "story".to_string(),
            map_cache_enabled: true,
            starting_units: vec![
                StartingUnit {
                    type_id: "blue_battletank".to_string(),
                    tile_x: 0,
                    tile_y: 0,
                    slot: 0,
                },
                StartingUnit {
                    type_id: "red_battletank".to_string(),
                    tile_x: 2,
                    tile_y: 0,
                    slot: 1,
                },
            ],
        }
    }
}

/// Everything a match needs from static configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchResources {
    pub entities: BTreeMap<String, EntityType>,
    pub traits: BTreeMap<String, TraitType>,
    pub maps: BTreeMap<String, MapType>,
    pub tile_types: BTreeMap<String, TileType>,
    pub team_types: BTreeMap<String, TeamType>,
    pub settings: VersusSettings,
}

// =============================================================================
// Resource Loader
// =============================================================================

/// Reads [`MatchResources`] from a directory with one JSON file per section.
pub struct ResourceLoader;

impl ResourceLoader {
    pub const ENTITIES: &'static str = "entities.json";
    pub const TRAITS: &'static str = "traits.json";
    pub const MAPS: &'static str = "maps.json";
    pub const TILE_TYPES: &'static str = "tileTypes.json";
    pub const TEAM_TYPES: &'static str = "teamTypes.json";
    pub const SETTINGS: &'static str = "settings.json";

    /// Load all sections. Missing files fall back to defaults with a warning.
    pub fn from_dir(root: impl AsRef<Path>) -> Result<MatchResources, ResourceError> {
        let root = root.as_ref();
        let resources = MatchResources {
            entities: Self::section(root, Self::ENTITIES)?,
            traits: Self::section(root, Self::TRAITS)?,
            maps: Self::section(root, Self::MAPS)?,
            tile_types: Self::section(root, Self::TILE_TYPES)?,
            team_types: Self::section(root, Self::TEAM_TYPES)?,
            settings: Self::section(root, Self::SETTINGS)?,
        };

        info!(
            "Loaded {} entity types, {} traits, {} maps from {}",
            resources.entities.len(),
            resources.traits.len(),
            resources.maps.len(),
            root.display()
        );
        Ok(resources)
    }

    fn section<T: DeserializeOwned + Default>(root: &Path, file: &str) -> Result<T, ResourceError> {
        let path = root.join(file);
        if !path.exists() {
            warn!("Resource file {} not found, using defaults", path.display());
            return Ok(T::default());
        }
        read_json(&path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ResourceError> {
    let text = fs::read_to_string(path).map_err(|source| ResourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ResourceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

// =============================================================================
// Map Sources
// =============================================================================

/// Hands out map documents by map id.
pub trait MapSource: Send {
    fn load_map_data(&mut self, map_id: &str) -> Result<MapData, ResourceError>;
}

/// Reads maps from disk as `<root>/<directory>/<source>`.
#[derive(Debug, Clone)]
pub struct DirectoryMapSource {
    root: PathBuf,
    map_types: BTreeMap<String, MapType>,
    cache_enabled: bool,
    cache: BTreeMap<String, MapData>,
}

impl DirectoryMapSource {
    pub fn new(root: impl Into<PathBuf>, map_types: BTreeMap<String, MapType>, cache_enabled: bool) -> Self {
        Self {
            root: root.into(),
            map_types,
            cache_enabled,
            cache: BTreeMap::new(),
        }
    }
}

impl MapSource for DirectoryMapSource {
    fn load_map_data(&mut self, map_id: &str) -> Result<MapData, ResourceError> {
        if let Some(cached) = self.cache.get(map_id) {
            return Ok(cached.clone());
        }

        let map_type = self
            .map_types
            .get(map_id)
            .ok_or_else(|| ResourceError::UnknownMap(map_id.to_string()))?;
        let path = self.root.join(&map_type.directory).join(&map_type.source);
        let data: MapData = read_json(&path)?;
        debug!("Loaded map {} from {}", map_id, path.display());

        if self.cache_enabled {
            self.cache.insert(map_id.to_string(), data.clone());
        }
        Ok(data)
    }
}

/// In-memory maps.
#[derive(Debug, Clone, Default)]
pub struct StaticMapSource {
    maps: BTreeMap<String, MapData>,
}

impl StaticMapSource {
    pub fn new(maps: BTreeMap<String, MapData>) -> Self {
        Self { maps }
    }
}

impl MapSource for StaticMapSource {
    fn load_map_data(&mut self, map_id: &str) -> Result<MapData, ResourceError> {
        self.maps
            .get(map_id)
            .cloned()
            .ok_or_else(|| ResourceError::UnknownMap(map_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("skirmish-{}-{}", name, uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_settings_defaults() {
        let settings: VersusSettings = serde_json::from_str(r#"{"maxClients": 4}"#).unwrap();
        assert_eq!(settings.max_clients, 4);
        assert_eq!(settings.action_queue_size, 10);
        assert_eq!(settings.stat_mode, "story");
        assert_eq!(settings.starting_units.len(), 2);
    }

    #[test]
    fn test_loader_missing_files_default() {
        let dir = scratch_dir("empty");
        let resources = ResourceLoader::from_dir(&dir).unwrap();
        assert_eq!(resources, MatchResources::default());
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_loader_reads_sections() {
        let dir = scratch_dir("sections");
        fs::write(
            dir.join(ResourceLoader::TILE_TYPES),
            r#"{"1": {"passability": "land", "hasBorder": true}}"#,
        )
        .unwrap();
        fs::write(
            dir.join(ResourceLoader::TEAM_TYPES),
            r#"{"0": {"allies": ["0"], "enemies": ["1"]}}"#,
        )
        .unwrap();

        let resources = ResourceLoader::from_dir(&dir).unwrap();
        assert_eq!(resources.tile_types["1"].passability.as_deref(), Some("land"));
        assert!(resources.tile_types["1"].has_border);
        assert!(resources.team_types["0"].enemies.contains("1"));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_loader_rejects_bad_json() {
        let dir = scratch_dir("bad");
        fs::write(dir.join(ResourceLoader::MAPS), "{ not json").unwrap();
        assert!(matches!(
            ResourceLoader::from_dir(&dir),
            Err(ResourceError::Json { .. })
        ));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_directory_source_caches() {
        let dir = scratch_dir("maps");
        fs::create_dir_all(dir.join("versus")).unwrap();
        fs::write(dir.join("versus/duel.json"), r#"{"width": 2, "height": 1}"#).unwrap();

        let mut source = DirectoryMapSource::new(
            &dir,
            BTreeMap::from([(
                "duel".to_string(),
                MapType {
                    directory: "versus".into(),
                    source: "duel.json".into(),
                },
            )]),
            true,
        );

        assert_eq!(source.load_map_data("duel").unwrap().width, 2);
        fs::remove_file(dir.join("versus/duel.json")).unwrap();
        // Served from cache.
        assert_eq!(source.load_map_data("duel").unwrap().width, 2);
        assert!(matches!(
            source.load_map_data("other"),
            Err(ResourceError::UnknownMap(_))
        ));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_static_source() {
        let mut source = StaticMapSource::new(BTreeMap::from([("a".to_string(), MapData::default())]));
        assert!(source.load_map_data("a").is_ok());
        assert!(source.load_map_data("b").is_err());
    }
}
