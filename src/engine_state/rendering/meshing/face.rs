//! Per-face geometry: corner positions, ambient occlusion and the diagonal split.
//!
//! A face's corners are numbered counter-clockwise as seen from outside the
//! block: corner `k` sits at tangent-space signs `CORNER_SIGNS[k]`. Every
//! corner has two edge neighbors and one diagonal neighbor in the layer of
//! blocks in front of the face; those three decide its occlusion level.

use cgmath::Vector3;

use crate::engine_state::voxels::block::{BlockCatalog, BlockSide};

use super::neighborhood::{offset_index, Neighborhood};

/// Tangent-space signs `(u, v)` of the four corners, counter-clockwise.
const CORNER_SIGNS: [(i32, i32); 4] = [(-1, -1), (1, -1), (1, 1), (-1, 1)];

/// Texture coordinates of the corners before rotation.
const UV_CORNERS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

/// Emission order of the corners for the default diagonal (corner 0 to corner 2).
const DEFAULT_DIAGONAL: [usize; 4] = [0, 1, 3, 2];

/// Emission order of the corners for the other diagonal (corner 1 to corner 3).
const FLIPPED_DIAGONAL: [usize; 4] = [1, 2, 0, 3];

/// Occlusion level of one corner, from 0 (darkest) to 3 (unoccluded).
///
/// Two solid edge neighbors fully occlude the corner whatever the diagonal
/// neighbor is.
pub fn ambient_occlusion(side1: bool, side2: bool, corner: bool) -> u8 {
    let (side1, side2, corner) = (side1 as u8, side2 as u8, corner as u8);
    ((side1 & side2) ^ 1) * (3 - (side1 + side2 + corner))
}

/// Vertex brightness of an occlusion level: 0.5 at level 0, 1.0 at level 3.
pub fn brightness(level: u8) -> f32 {
    0.5 + level as f32 / 6.0
}

/// Corner emission order for the given occlusion levels.
///
/// The quad is split along the diagonal whose levels add up higher; ties keep
/// the default diagonal. The returned corner indices go into vertex slots
/// 0..4 of [`super::QUAD_INDEX_PATTERN`], whose shared edge is slot 0 to slot 3.
pub fn diagonal_order(levels: [u8; 4]) -> [usize; 4] {
    if levels[1] + levels[3] > levels[0] + levels[2] {
        FLIPPED_DIAGONAL
    } else {
        DEFAULT_DIAGONAL
    }
}

/// UV of corner `corner` after rotating the face texture by `rotation` quarter turns.
///
/// Positive turns walk the UV corners backwards.
pub fn rotated_uv(corner: usize, rotation: i8) -> [f32; 2] {
    UV_CORNERS[(corner as i32 - rotation as i32).rem_euclid(4) as usize]
}

/// Neighbor slots and facing sides that decide one corner's occlusion.
#[derive(Clone, Copy, Debug)]
pub struct CornerGeometry {
    /// Corner position relative to the block origin, in block units
    pub offset: [f32; 3],
    /// Slot of the first edge neighbor
    pub side1: usize,
    /// Side of the first edge neighbor that faces the corner
    pub side1_facing: BlockSide,
    /// Slot of the second edge neighbor
    pub side2: usize,
    /// Side of the second edge neighbor that faces the corner
    pub side2_facing: BlockSide,
    /// Slot of the diagonal neighbor
    pub corner: usize,
}

/// Everything about one side of a block that does not depend on the blocks.
#[derive(Clone, Copy, Debug)]
pub struct FaceGeometry {
    /// The side
    pub side: BlockSide,
    /// Outward normal as floats
    pub normal: [f32; 3],
    /// Slot of the neighbor the face looks at
    pub facing: usize,
    /// The four corners, counter-clockwise from outside
    pub corners: [CornerGeometry; 4],
}

impl FaceGeometry {
    /// Derives the geometry of `side` from its normal and tangents.
    pub fn of(side: BlockSide) -> Self {
        let normal = side.normal();
        let (u, v) = side.tangents();

        let corners = CORNER_SIGNS.map(|(su, sv)| {
            let along_u = u * su;
            let along_v = v * sv;
            // Doubled offset from the block center, every component is -1 or 1.
            let doubled = normal + along_u + along_v;
            CornerGeometry {
                offset: [
                    (doubled.x + 1) as f32 / 2.0,
                    (doubled.y + 1) as f32 / 2.0,
                    (doubled.z + 1) as f32 / 2.0,
                ],
                side1: offset_index(normal + along_u),
                side1_facing: facing(-along_u),
                side2: offset_index(normal + along_v),
                side2_facing: facing(-along_v),
                corner: offset_index(normal + along_u + along_v),
            }
        });

        Self {
            side,
            normal: [normal.x as f32, normal.y as f32, normal.z as f32],
            facing: offset_index(normal),
            corners,
        }
    }

    /// Geometry of all six sides, in [`BlockSide::all`] order.
    pub fn all() -> [FaceGeometry; 6] {
        BlockSide::all().map(FaceGeometry::of)
    }

    /// Should this face of `block` be drawn, given its neighborhood?
    ///
    /// Faces against air are always drawn. Faces against another block are
    /// drawn when that block is not solid on the touching side and is not the
    /// same kind of block.
    pub fn is_visible(&self, neighborhood: &Neighborhood, catalog: &BlockCatalog) -> bool {
        let block = neighborhood.center();
        let neighbor = neighborhood.get(self.facing);
        neighbor == 0
            || (!catalog.is_solid_on(neighbor, self.side.opposite()) && neighbor != block)
    }

    /// Occlusion levels of the four corners.
    pub fn occlusion(&self, neighborhood: &Neighborhood, catalog: &BlockCatalog) -> [u8; 4] {
        self.corners.map(|corner| {
            let side1 = catalog.is_solid_on(neighborhood.get(corner.side1), corner.side1_facing);
            let side2 = catalog.is_solid_on(neighborhood.get(corner.side2), corner.side2_facing);
            let diagonal = catalog.solid_sides(neighborhood.get(corner.corner)) != 0;
            ambient_occlusion(side1, side2, diagonal)
        })
    }
}

fn facing(direction: Vector3<i32>) -> BlockSide {
    match BlockSide::from_direction(direction) {
        Some(side) => side,
        None => unreachable!("tangents are unit axis vectors"),
    }
}
