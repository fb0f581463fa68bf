//! Tile Grid
//!
//! Rectangular map of tiles with named numeric layers. Each tile records
//! the entities standing on it (first entity is the primary occupant)
//! plus the team/passability metadata derived from the meta layers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::ids::EntityId;

/// Grid errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Tile ({x}, {y}) is out of bounds")]
    OutOfBounds { x: i32, y: i32 },
    #[error("Layer {0} does not exist")]
    UnknownLayer(String),
    #[error("Value {value} does not fit layer {layer}")]
    ValueTooLarge { layer: String, value: u32 },
}

// =============================================================================
// Map Data
// =============================================================================

/// Layer declaration inside map data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerConfig {
    pub id: String,
    pub auto_generate: bool,
}

/// Raw map document as stored on disk and sent to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapData {
    pub music: Option<String>,
    pub width: usize,
    pub height: usize,
    pub layers: BTreeMap<String, Vec<u32>>,
    pub background_layers: Vec<LayerConfig>,
    pub foreground_layers: Vec<LayerConfig>,
    pub meta_layers: Vec<LayerConfig>,
    pub entities: Vec<Value>,
    pub flags: BTreeMap<String, Value>,
}

// =============================================================================
// Layers
// =============================================================================

/// Layer storage. Visual layers hold 16-bit graphic codes, meta layers 8-bit values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Wide(Vec<u16>),
    Narrow(Vec<u8>),
}

impl Layer {
    fn wide(id: &str, size: usize, source: Option<&Vec<u32>>) -> Result<Self, GridError> {
        Ok(Layer::Wide(Self::parse(id, size, source)?))
    }

    fn narrow(id: &str, size: usize, source: Option<&Vec<u32>>) -> Result<Self, GridError> {
        Ok(Layer::Narrow(Self::parse(id, size, source)?))
    }

    /// Copy `source` into a zeroed buffer of `size` cells.
    fn parse<T>(id: &str, size: usize, source: Option<&Vec<u32>>) -> Result<Vec<T>, GridError>
    where
        T: Copy + Default + TryFrom<u32>,
    {
        let mut buffer = vec![T::default(); size];
        if let Some(data) = source {
            for (slot, value) in buffer.iter_mut().zip(data) {
                *slot = T::try_from(*value).map_err(|_| GridError::ValueTooLarge {
                    layer: id.to_string(),
                    value: *value,
                })?;
            }
        }
        Ok(buffer)
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        match self {
            Layer::Wide(data) => data.get(index).map(|v| u32::from(*v)),
            Layer::Narrow(data) => data.get(index).map(|v| u32::from(*v)),
        }
    }

    fn set(&mut self, index: usize, value: u32) -> bool {
        match self {
            Layer::Wide(data) => match (data.get_mut(index), u16::try_from(value)) {
                (Some(slot), Ok(v)) => {
                    *slot = v;
                    true
                }
                _ => false,
            },
            Layer::Narrow(data) => match (data.get_mut(index), u8::try_from(value)) {
                (Some(slot), Ok(v)) => {
                    *slot = v;
                    true
                }
                _ => false,
            },
        }
    }
}

// =============================================================================
// Tile
// =============================================================================

/// One grid cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tile {
    occupants: Vec<EntityId>,
    /// Owning team, from the team layer.
    pub team: String,
    /// Passability class; `None` means nothing may enter.
    pub passability: Option<String>,
    pub auto_capture: bool,
    pub has_border: bool,
}

impl Tile {
    /// Add an occupant. Duplicates are ignored.
    pub fn add_entity(&mut self, id: EntityId) {
        if !self.occupants.contains(&id) {
            self.occupants.push(id);
        }
    }

    pub fn remove_entity(&mut self, id: &EntityId) -> bool {
        let before = self.occupants.len();
        self.occupants.retain(|o| o != id);
        self.occupants.len() != before
    }

    pub fn has_entity(&self, id: &EntityId) -> bool {
        self.occupants.contains(id)
    }

    /// Primary occupant.
    pub fn first_entity(&self) -> Option<&EntityId> {
        self.occupants.first()
    }

    pub fn occupants(&self) -> &[EntityId] {
        &self.occupants
    }

    pub fn is_occupied(&self) -> bool {
        !self.occupants.is_empty()
    }

    pub fn clear(&mut self) {
        self.occupants.clear();
    }
}

// =============================================================================
// Tile Grid
// =============================================================================

/// The match map.
#[derive(Debug, Clone)]
pub struct TileGrid {
    id: String,
    width: usize,
    height: usize,
    music: Option<String>,
    layers: BTreeMap<String, Layer>,
    flags: BTreeMap<String, Value>,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// Empty grid with no layers.
    pub fn new(id: impl Into<String>, width: usize, height: usize) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            music: None,
            layers: BTreeMap::new(),
            flags: BTreeMap::new(),
            tiles: vec![Tile::default(); width * height],
        }
    }

    /// Build a grid from map data.
    ///
    /// Background/foreground layers become wide layers, meta layers narrow
    /// ones. Missing or short layer data is zero-filled; a value that does
    /// not fit its layer width is an error.
    pub fn from_map_data(id: impl Into<String>, data: &MapData) -> Result<Self, GridError> {
        let mut grid = Self::new(id, data.width, data.height);
        let size = data.width * data.height;

        grid.music = data.music.clone();
        grid.flags = data.flags.clone();

        for config in data.background_layers.iter().chain(&data.foreground_layers) {
            let layer = Layer::wide(&config.id, size, data.layers.get(&config.id))?;
            grid.layers.insert(config.id.clone(), layer);
        }
        for config in &data.meta_layers {
            let layer = Layer::narrow(&config.id, size, data.layers.get(&config.id))?;
            grid.layers.insert(config.id.clone(), layer);
        }

        Ok(grid)
    }

    /// Add an empty meta layer.
    pub fn add_meta_layer(&mut self, id: impl Into<String>) {
        let size = self.width * self.height;
        self.layers.insert(id.into(), Layer::Narrow(vec![0; size]));
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn music(&self) -> Option<&str> {
        self.music.as_deref()
    }

    pub fn flag(&self, name: &str) -> Option<&Value> {
        self.flags.get(name)
    }

    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.get(id)
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if self.in_bounds(x, y) {
            Some(y as usize * self.width + x as usize)
        } else {
            None
        }
    }

    pub fn tile(&self, x: i32, y: i32) -> Option<&Tile> {
        self.index(x, y).and_then(|i| self.tiles.get(i))
    }

    pub fn tile_mut(&mut self, x: i32, y: i32) -> Option<&mut Tile> {
        self.index(x, y).and_then(|i| self.tiles.get_mut(i))
    }

    /// Occupant of a tile, if any.
    pub fn tile_entity(&self, x: i32, y: i32) -> Option<&EntityId> {
        self.tile(x, y).and_then(Tile::first_entity)
    }

    /// In bounds and unoccupied.
    pub fn is_empty(&self, x: i32, y: i32) -> bool {
        self.tile(x, y).is_some_and(|tile| !tile.is_occupied())
    }

    /// Recompute every tile from its coordinates.
    pub fn init_tiles<F>(&mut self, mut build: F)
    where
        F: FnMut(&TileGrid, i32, i32) -> Tile,
    {
        let mut tiles = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                tiles.push(build(self, x, y));
            }
        }
        self.tiles = tiles;
    }

    /// Visit every tile with its coordinates.
    pub fn update_tiles<F>(&mut self, mut visit: F)
    where
        F: FnMut(&mut Tile, i32, i32),
    {
        let width = self.width.max(1);
        for (index, tile) in self.tiles.iter_mut().enumerate() {
            visit(tile, (index % width) as i32, (index / width) as i32);
        }
    }

    /// Value of a layer at a tile. Warns and returns `None` when out of range.
    pub fn layer_value(&self, layer: &str, x: i32, y: i32) -> Option<u32> {
        let Some(data) = self.layers.get(layer) else {
            warn!("Layer {} does not exist on map {}", layer, self.id);
            return None;
        };
        let Some(index) = self.index(x, y) else {
            warn!("Tile ({}, {}) is out of bounds on map {}", x, y, self.id);
            return None;
        };
        data.get(index)
    }

    /// Write a layer value at a tile.
    pub fn place_layer_value(&mut self, layer: &str, x: i32, y: i32, value: u32) -> Result<(), GridError> {
        let index = self.index(x, y).ok_or(GridError::OutOfBounds { x, y })?;
        let data = self
            .layers
            .get_mut(layer)
            .ok_or_else(|| GridError::UnknownLayer(layer.to_string()))?;
        if data.set(index, value) {
            Ok(())
        } else {
            Err(GridError::ValueTooLarge {
                layer: layer.to_string(),
                value,
            })
        }
    }

    /// Reset a layer value to 0.
    pub fn clear_layer_value(&mut self, layer: &str, x: i32, y: i32) -> Result<(), GridError> {
        self.place_layer_value(layer, x, y, 0)
    }

    fn footprint(&self, x: i32, y: i32, size_x: u32, size_y: u32) -> Result<Vec<usize>, GridError> {
        let cells = (size_x as usize).saturating_mul(size_y as usize);
        let mut indices = Vec::with_capacity(cells.min(self.tiles.len()));
        for dy in 0..size_y {
            for dx in 0..size_x {
                let (tx, ty) = (x.saturating_add_unsigned(dx), y.saturating_add_unsigned(dy));
                indices.push(self.index(tx, ty).ok_or(GridError::OutOfBounds { x: tx, y: ty })?);
            }
        }
        Ok(indices)
    }

    /// Record an entity on every tile of a rectangle.
    ///
    /// All-or-nothing: nothing is written if any tile is out of bounds.
    pub fn set_pointers(
        &mut self,
        x: i32,
        y: i32,
        size_x: u32,
        size_y: u32,
        id: &EntityId,
    ) -> Result<(), GridError> {
        for index in self.footprint(x, y, size_x, size_y)? {
            self.tiles[index].add_entity(id.clone());
        }
        Ok(())
    }

    /// Remove an entity from every tile of a rectangle.
    pub fn remove_pointers(
        &mut self,
        x: i32,
        y: i32,
        size_x: u32,
        size_y: u32,
        id: &EntityId,
    ) -> Result<(), GridError> {
        for index in self.footprint(x, y, size_x, size_y)? {
            self.tiles[index].remove_entity(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_data() -> MapData {
        MapData {
            width: 3,
            height: 2,
            layers: BTreeMap::from([
                ("ground".to_string(), vec![1000, 1001, 1002, 1003, 1004, 1005]),
                ("team".to_string(), vec![1, 1, 0]),
            ]),
            background_layers: vec![LayerConfig {
                id: "ground".into(),
                auto_generate: false,
            }],
            meta_layers: vec![
                LayerConfig {
                    id: "team".into(),
                    auto_generate: false,
                },
                LayerConfig {
                    id: "type".into(),
                    auto_generate: false,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_layers_parse_with_widths() {
        let grid = TileGrid::from_map_data("m", &map_data()).unwrap();
        assert!(matches!(grid.layer("ground"), Some(Layer::Wide(_))));
        assert!(matches!(grid.layer("team"), Some(Layer::Narrow(_))));
        assert_eq!(grid.layer_value("ground", 2, 1), Some(1005));
    }

    #[test]
    fn test_oversized_layer_value_rejected() {
        let mut data = map_data();
        data.layers.insert("team".to_string(), vec![1, 256]);
        assert_eq!(
            TileGrid::from_map_data("m", &data).unwrap_err(),
            GridError::ValueTooLarge {
                layer: "team".into(),
                value: 256
            }
        );

        // Wide layers take 16-bit codes.
        let mut data = map_data();
        data.layers.insert("team".to_string(), vec![0]);
        data.layers.insert("ground".to_string(), vec![65_535, 65_536]);
        assert!(matches!(
            TileGrid::from_map_data("m", &data),
            Err(GridError::ValueTooLarge { value: 65_536, .. })
        ));
    }

    #[test]
    fn test_large_footprint_out_of_bounds() {
        let mut grid = TileGrid::new("m", 2, 2);
        assert!(grid
            .set_pointers(0, 0, 70_000, 70_000, &EntityId::new("giant"))
            .is_err());
        assert!(grid.is_empty(0, 0));
    }

    #[test]
    fn test_short_layer_zero_filled() {
        let grid = TileGrid::from_map_data("m", &map_data()).unwrap();
        assert_eq!(grid.layer_value("team", 1, 0), Some(1));
        assert_eq!(grid.layer_value("team", 0, 1), Some(0));
        assert_eq!(grid.layer_value("type", 2, 1), Some(0));
    }

    #[test]
    fn test_layer_value_out_of_range() {
        let grid = TileGrid::from_map_data("m", &map_data()).unwrap();
        assert_eq!(grid.layer_value("team", 3, 0), None);
        assert_eq!(grid.layer_value("missing", 0, 0), None);
    }

    #[test]
    fn test_place_layer_value() {
        let mut grid = TileGrid::from_map_data("m", &map_data()).unwrap();
        grid.place_layer_value("team", 0, 1, 7).unwrap();
        assert_eq!(grid.layer_value("team", 0, 1), Some(7));
        assert_eq!(
            grid.place_layer_value("team", 0, 1, 300),
            Err(GridError::ValueTooLarge {
                layer: "team".into(),
                value: 300
            })
        );
        grid.clear_layer_value("team", 0, 1).unwrap();
        assert_eq!(grid.layer_value("team", 0, 1), Some(0));
    }

    #[test]
    fn test_pointers_cover_rectangle() {
        let mut grid = TileGrid::new("m", 4, 4);
        let id = EntityId::new("1");
        grid.set_pointers(1, 1, 2, 2, &id).unwrap();

        for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
            assert_eq!(grid.tile_entity(x, y), Some(&id));
        }
        assert!(grid.is_empty(0, 0));
        assert!(grid.is_empty(3, 3));

        grid.remove_pointers(1, 1, 2, 2, &id).unwrap();
        assert!(grid.is_empty(2, 2));
    }

    #[test]
    fn test_pointers_out_of_bounds_writes_nothing() {
        let mut grid = TileGrid::new("m", 2, 2);
        let id = EntityId::new("1");
        assert_eq!(
            grid.set_pointers(1, 1, 2, 1, &id),
            Err(GridError::OutOfBounds { x: 2, y: 1 })
        );
        assert!(grid.is_empty(1, 1));
    }

    #[test]
    fn test_first_entity_is_primary() {
        let mut tile = Tile::default();
        tile.add_entity(EntityId::new("a"));
        tile.add_entity(EntityId::new("b"));
        tile.add_entity(EntityId::new("a"));
        assert_eq!(tile.occupants().len(), 2);
        assert_eq!(tile.first_entity(), Some(&EntityId::new("a")));
        tile.remove_entity(&EntityId::new("a"));
        assert_eq!(tile.first_entity(), Some(&EntityId::new("b")));
    }

    #[test]
    fn test_update_tiles_visits_coordinates() {
        let mut grid = TileGrid::new("m", 3, 2);
        grid.update_tiles(|tile, x, y| tile.has_border = x == 2 && y == 1);
        assert!(grid.tile(2, 1).unwrap().has_border);
        assert!(!grid.tile(1, 1).unwrap().has_border);
    }

    #[test]
    fn test_is_empty_out_of_bounds() {
        let grid = TileGrid::new("m", 2, 2);
        assert!(!grid.is_empty(-1, 0));
        assert!(!grid.is_empty(0, 2));
    }

    #[test]
    fn test_init_tiles_reads_layers() {
        let mut grid = TileGrid::from_map_data("m", &map_data()).unwrap();
        grid.init_tiles(|grid, x, y| Tile {
            team: grid.layer_value("team", x, y).unwrap_or(0).to_string(),
            ..Default::default()
        });
        assert_eq!(grid.tile(0, 0).unwrap().team, "1");
        assert_eq!(grid.tile(2, 0).unwrap().team, "0");
    }
}
