//! # Block Side Module
//!
//! The six axis-aligned faces of a block and the geometry attached to each.
//!
//! The planet uses a Z-up convention: `TOP` faces +Z, `SOUTH` faces +Y and
//! `EAST` faces +X. Each side also carries a pair of in-plane tangents `(u, v)`
//! with `u × v = normal`, so walking the corners `(0,0) → (1,0) → (1,1) → (0,1)`
//! in tangent space is counter-clockwise when the face is seen from outside.
//! Side faces all use `v = +Z` so textures stand upright.

use cgmath::Vector3;
use serde::{Deserialize, Serialize};

/// One of the six faces of a block.
///
/// The discriminant is the face's slot in per-face tables such as texture
/// indices, rotations and the solidity bitmask.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum BlockSide {
    /// Facing +Z
    TOP = 0,
    /// Facing -Z
    BOTTOM = 1,
    /// Facing -Y
    NORTH = 2,
    /// Facing +Y
    SOUTH = 3,
    /// Facing +X
    EAST = 4,
    /// Facing -X
    WEST = 5,
}

/// Bitmask with every side set.
pub const ALL_SIDES: u8 = 0b11_1111;

impl BlockSide {
    /// Returns all six faces in table order.
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::TOP,
            BlockSide::BOTTOM,
            BlockSide::NORTH,
            BlockSide::SOUTH,
            BlockSide::EAST,
            BlockSide::WEST,
        ]
    }

    /// Slot of this face in per-face tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit of this face in a solidity mask.
    pub fn bit(self) -> u8 {
        1 << self as u8
    }

    /// The face pointing the other way.
    pub fn opposite(self) -> BlockSide {
        match self {
            BlockSide::TOP => BlockSide::BOTTOM,
            BlockSide::BOTTOM => BlockSide::TOP,
            BlockSide::NORTH => BlockSide::SOUTH,
            BlockSide::SOUTH => BlockSide::NORTH,
            BlockSide::EAST => BlockSide::WEST,
            BlockSide::WEST => BlockSide::EAST,
        }
    }

    /// Outward unit normal.
    pub fn normal(self) -> Vector3<i32> {
        match self {
            BlockSide::TOP => Vector3::new(0, 0, 1),
            BlockSide::BOTTOM => Vector3::new(0, 0, -1),
            BlockSide::NORTH => Vector3::new(0, -1, 0),
            BlockSide::SOUTH => Vector3::new(0, 1, 0),
            BlockSide::EAST => Vector3::new(1, 0, 0),
            BlockSide::WEST => Vector3::new(-1, 0, 0),
        }
    }

    /// In-plane tangents `(u, v)` with `u × v == normal`.
    pub fn tangents(self) -> (Vector3<i32>, Vector3<i32>) {
        match self {
            BlockSide::TOP => (Vector3::new(1, 0, 0), Vector3::new(0, 1, 0)),
            BlockSide::BOTTOM => (Vector3::new(0, 1, 0), Vector3::new(1, 0, 0)),
            BlockSide::NORTH => (Vector3::new(1, 0, 0), Vector3::new(0, 0, 1)),
            BlockSide::SOUTH => (Vector3::new(-1, 0, 0), Vector3::new(0, 0, 1)),
            BlockSide::EAST => (Vector3::new(0, 1, 0), Vector3::new(0, 0, 1)),
            BlockSide::WEST => (Vector3::new(0, -1, 0), Vector3::new(0, 0, 1)),
        }
    }

    /// The face whose normal is the given unit axis vector.
    pub fn from_direction(direction: Vector3<i32>) -> Option<BlockSide> {
        BlockSide::all()
            .into_iter()
            .find(|side| side.normal() == direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Zero;

    fn cross(a: Vector3<i32>, b: Vector3<i32>) -> Vector3<i32> {
        Vector3::new(
            a.y * b.z - a.z * b.y,
            a.z * b.x - a.x * b.z,
            a.x * b.y - a.y * b.x,
        )
    }

    #[test]
    fn tangents_are_right_handed() {
        for side in BlockSide::all() {
            let (u, v) = side.tangents();
            assert_eq!(cross(u, v), side.normal(), "{side:?}");
        }
    }

    #[test]
    fn opposite_sides_cancel() {
        for side in BlockSide::all() {
            assert_eq!(side.normal() + side.opposite().normal(), Vector3::zero());
            assert_eq!(side.opposite().opposite(), side);
            assert_eq!(BlockSide::from_direction(side.normal()), Some(side));
        }
        assert_eq!(BlockSide::from_direction(Vector3::new(1, 1, 0)), None);
    }

    #[test]
    fn bits_cover_the_mask() {
        let mask = BlockSide::all().iter().fold(0, |mask, side| mask | side.bit());
        assert_eq!(mask, ALL_SIDES);
    }
}
