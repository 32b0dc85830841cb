//! # Block Type Module
//!
//! The material description of one kind of block: which textures it shows on
//! each face, how those textures are rotated and which faces are solid.

use serde::{Deserialize, Serialize};

use super::block_side::{BlockSide, ALL_SIDES};

/// Describes how one block type looks and occludes.
///
/// `side_textures` index into this definition's own `textures`; the catalog
/// turns them into atlas layers. `side_rotations` are quarter turns applied
/// to the UV corners of each face. `solid_sides` is a bitmask of
/// [`BlockSide::bit`] values: a face that is solid hides the face of the
/// neighbor touching it and darkens ambient occlusion around it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    /// Unique name, used to look the type up in the catalog
    pub name: String,
    /// Texture names, in the order they are laid out in the atlas
    pub textures: Vec<String>,
    /// Per-face index into `textures`
    #[serde(default)]
    pub side_textures: [u8; 6],
    /// Per-face UV rotation in quarter turns
    #[serde(default)]
    pub side_rotations: [i8; 6],
    /// Bitmask of solid faces
    #[serde(default = "all_sides_solid")]
    pub solid_sides: u8,
}

fn all_sides_solid() -> u8 {
    ALL_SIDES
}

impl BlockDefinition {
    /// Creates a fully solid block showing `texture` on every face.
    pub fn new(name: impl Into<String>, texture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            textures: vec![texture.into()],
            side_textures: [0; 6],
            side_rotations: [0; 6],
            solid_sides: ALL_SIDES,
        }
    }

    /// Replaces the texture list.
    pub fn with_textures<I, S>(mut self, textures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.textures = textures.into_iter().map(Into::into).collect();
        self
    }

    /// Shows texture `texture` of this definition on `side`.
    pub fn with_side_texture(mut self, side: BlockSide, texture: u8) -> Self {
        self.side_textures[side.index()] = texture;
        self
    }

    /// Rotates the UVs of `side` by `quarter_turns`.
    pub fn with_rotation(mut self, side: BlockSide, quarter_turns: i8) -> Self {
        self.side_rotations[side.index()] = quarter_turns;
        self
    }

    /// Replaces the solidity mask.
    pub fn with_solid_sides(mut self, solid_sides: u8) -> Self {
        self.solid_sides = solid_sides & ALL_SIDES;
        self
    }

    /// Is the face on `side` solid?
    pub fn is_solid_on(&self, side: BlockSide) -> bool {
        self.solid_sides & side.bit() != 0
    }

    /// Index into `textures` shown on `side`.
    pub fn texture_index(&self, side: BlockSide) -> u8 {
        self.side_textures[side.index()]
    }

    /// UV rotation of `side` in quarter turns.
    pub fn texture_rotation(&self, side: BlockSide) -> i8 {
        self.side_rotations[side.index()]
    }
}
