//! # Block Catalog Module
//!
//! The registry of block definitions consulted by the mesher.
//!
//! Definitions are registered explicitly, in order, before any meshing
//! starts. Block id 0 is reserved for air, so the first registered definition
//! gets id 1. Each definition's textures occupy a contiguous run of layers in
//! the shared texture atlas; the run starts at the sum of the texture counts
//! of every definition registered before it.
//!
//! ## Usage
//!
//! ```
//! use voxel_streaming::engine_state::voxels::block::{BlockCatalog, BlockDefinition, BlockSide};
//!
//! let mut catalog = BlockCatalog::new();
//! let dirt = catalog.register(BlockDefinition::new("dirt", "dirt")).unwrap();
//! let stone = catalog.register(BlockDefinition::new("stone", "stone")).unwrap();
//!
//! assert_eq!(catalog.texture_layer(dirt, BlockSide::TOP), Some(0));
//! assert_eq!(catalog.texture_layer(stone, BlockSide::TOP), Some(1));
//! assert_eq!(catalog.texture_count(), 2);
//! ```

use std::collections::HashMap;

use log::debug;
use thiserror::Error;

use super::block_side::BlockSide;
use super::block_type::BlockDefinition;
use super::{BlockId, AIR};

/// Errors raised while registering block definitions.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The JSON document could not be parsed
    #[error("failed to parse block definitions: {0}")]
    Json(#[from] serde_json::Error),
    /// A definition without textures cannot be drawn
    #[error("block `{0}` has no textures")]
    NoTextures(String),
    /// A face refers to a texture the definition does not have
    #[error("block `{name}` uses texture {index} on {side:?} but only has {count}")]
    TextureOutOfRange {
        /// Name of the offending definition
        name: String,
        /// Face using the texture
        side: BlockSide,
        /// Requested texture index
        index: u8,
        /// Number of textures of the definition
        count: usize,
    },
    /// Two definitions share a name
    #[error("block `{0}` is already registered")]
    DuplicateName(String),
    /// Every id of the `u16` range is in use
    #[error("block id space is exhausted")]
    TooManyDefinitions,
}

/// Ordered registry of block definitions.
#[derive(Clone, Debug, Default)]
pub struct BlockCatalog {
    definitions: Vec<BlockDefinition>,
    texture_offsets: Vec<u32>,
    texture_count: u32,
    ids_by_name: HashMap<String, BlockId>,
}

impl BlockCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON array of definitions and registers them in order.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let definitions: Vec<BlockDefinition> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for definition in definitions {
            catalog.register(definition)?;
        }
        Ok(catalog)
    }

    /// The materials the reference world is built from.
    ///
    /// | id | name  | notes                                   |
    /// |----|-------|-----------------------------------------|
    /// | 1  | grass | grass top, dirt bottom, grass sides     |
    /// | 2  | dirt  |                                         |
    /// | 3  | stone |                                         |
    /// | 4  | sand  |                                         |
    /// | 5  | wood  | end grain on top/bottom, rotated sides  |
    /// | 6  | glass | no solid faces                          |
    /// | 7  | slab  | only the bottom face is solid           |
    pub fn builtin() -> Self {
        let side_faces = [
            BlockSide::NORTH,
            BlockSide::SOUTH,
            BlockSide::EAST,
            BlockSide::WEST,
        ];

        let grass = side_faces.iter().fold(
            BlockDefinition::new("grass", "grass_top")
                .with_textures(["grass_top", "dirt", "grass_side"])
                .with_side_texture(BlockSide::BOTTOM, 1),
            |definition, side| definition.with_side_texture(*side, 2),
        );
        let wood = side_faces.iter().fold(
            BlockDefinition::new("wood", "wood_top").with_textures(["wood_top", "wood_side"]),
            |definition, side| definition.with_side_texture(*side, 1).with_rotation(*side, 1),
        );

        let mut catalog = Self::new();
        for definition in [
            grass,
            BlockDefinition::new("dirt", "dirt"),
            BlockDefinition::new("stone", "stone"),
            BlockDefinition::new("sand", "sand"),
            wood,
            BlockDefinition::new("glass", "glass").with_solid_sides(0),
            BlockDefinition::new("slab", "slab").with_solid_sides(BlockSide::BOTTOM.bit()),
        ] {
            catalog.push(definition);
        }
        catalog
    }

    /// Registers a definition and returns its id.
    pub fn register(&mut self, definition: BlockDefinition) -> Result<BlockId, CatalogError> {
        if definition.textures.is_empty() {
            return Err(CatalogError::NoTextures(definition.name));
        }
        for side in BlockSide::all() {
            let index = definition.texture_index(side);
            if index as usize >= definition.textures.len() {
                return Err(CatalogError::TextureOutOfRange {
                    count: definition.textures.len(),
                    name: definition.name,
                    side,
                    index,
                });
            }
        }
        if self.ids_by_name.contains_key(&definition.name) {
            return Err(CatalogError::DuplicateName(definition.name));
        }
        if self.definitions.len() >= BlockId::MAX as usize {
            return Err(CatalogError::TooManyDefinitions);
        }

        Ok(self.push(definition))
    }

    fn push(&mut self, definition: BlockDefinition) -> BlockId {
        let id = (self.definitions.len() + 1) as BlockId;
        debug!(
            "Registered block `{}` as id {} with atlas layers {}..{}",
            definition.name,
            id,
            self.texture_count,
            self.texture_count + definition.textures.len() as u32
        );

        self.texture_offsets.push(self.texture_count);
        self.texture_count += definition.textures.len() as u32;
        self.ids_by_name.insert(definition.name.clone(), id);
        self.definitions.push(definition);
        id
    }

    /// Definition registered under `id`. Air and unknown ids have none.
    pub fn definition(&self, id: BlockId) -> Option<&BlockDefinition> {
        if id == AIR {
            return None;
        }
        self.definitions.get(id as usize - 1)
    }

    /// Id registered under `name`.
    pub fn id_of(&self, name: &str) -> Option<BlockId> {
        self.ids_by_name.get(name).copied()
    }

    /// Solidity bitmask of `id`; zero for air and unknown ids.
    pub fn solid_sides(&self, id: BlockId) -> u8 {
        self.definition(id).map_or(0, |definition| definition.solid_sides)
    }

    /// Is block `id` solid on `side`?
    pub fn is_solid_on(&self, id: BlockId, side: BlockSide) -> bool {
        self.solid_sides(id) & side.bit() != 0
    }

    /// First atlas layer of the textures of `id`.
    pub fn texture_offset(&self, id: BlockId) -> Option<u32> {
        if id == AIR {
            return None;
        }
        self.texture_offsets.get(id as usize - 1).copied()
    }

    /// Atlas layer shown on `side` of block `id`.
    pub fn texture_layer(&self, id: BlockId, side: BlockSide) -> Option<u32> {
        let definition = self.definition(id)?;
        let offset = self.texture_offset(id)?;
        Some(offset + definition.texture_index(side) as u32)
    }

    /// Total number of atlas layers.
    pub fn texture_count(&self) -> u32 {
        self.texture_count
    }

    /// Texture names in atlas layer order.
    pub fn atlas_layout(&self) -> impl Iterator<Item = &str> {
        self.definitions
            .iter()
            .flat_map(|definition| definition.textures.iter().map(String::as_str))
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
