//! The 3×3×3 block neighborhood around the block being meshed.

use cgmath::{EuclideanSpace, Point3, Vector3};

use crate::engine_state::voxels::block::BlockId;
use crate::engine_state::voxels::chunk::{BlockGrid, CHUNK_DIMENSION, CHUNK_PLANE_SIZE};
use crate::engine_state::voxels::coords::BlockIndex;
use crate::engine_state::voxels::window_cache::BlockAccess;

/// Slot of the center block.
pub const CENTER: usize = 13;

/// Block ids around one block, indexed by [`offset_index`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Neighborhood {
    blocks: [BlockId; 27],
}

/// Slot of the neighbor at `offset` (each component in -1..=1).
pub fn offset_index(offset: Vector3<i32>) -> usize {
    (((offset.z + 1) * 3 + (offset.y + 1)) * 3 + (offset.x + 1)) as usize
}

fn offset_of(index: usize) -> Vector3<i32> {
    let index = index as i32;
    Vector3::new(index % 3 - 1, (index / 3) % 3 - 1, index / 9 - 1)
}

/// Does the neighborhood of `local` reach outside the chunk?
pub fn is_border(local: Point3<i32>) -> bool {
    let last = CHUNK_DIMENSION - 1;
    [local.x, local.y, local.z]
        .iter()
        .any(|&component| component == 0 || component == last)
}

impl Neighborhood {
    /// Builds a neighborhood from raw ids.
    pub fn from_blocks(blocks: [BlockId; 27]) -> Self {
        Self { blocks }
    }

    /// Neighbor at `offset`.
    pub fn at(&self, offset: Vector3<i32>) -> BlockId {
        self.blocks[offset_index(offset)]
    }

    /// Neighbor in slot `index`.
    pub fn get(&self, index: usize) -> BlockId {
        self.blocks[index]
    }

    /// The block in the middle.
    pub fn center(&self) -> BlockId {
        self.blocks[CENTER]
    }

    /// Gathers the neighborhood of an interior block straight from the grid.
    ///
    /// `local` must be at least one block away from every chunk face.
    pub fn interior(grid: &BlockGrid, local: Point3<i32>) -> Self {
        let base = local.x + local.y * CHUNK_DIMENSION + local.z * CHUNK_PLANE_SIZE;
        let mut blocks = [0; 27];
        for (index, block) in blocks.iter_mut().enumerate() {
            let offset = offset_of(index);
            let linear = base + offset.x + offset.y * CHUNK_DIMENSION + offset.z * CHUNK_PLANE_SIZE;
            *block = grid.get_linear(linear as usize);
        }
        Self { blocks }
    }

    /// Gathers the neighborhood of a border block, asking `access` for the
    /// positions that fall into neighboring chunks.
    ///
    /// # Returns
    /// `None` if one of those neighbors is still pending
    pub fn border(
        grid: &BlockGrid,
        origin: BlockIndex,
        local: Point3<i32>,
        access: &impl BlockAccess,
    ) -> Option<Self> {
        let mut blocks = [0; 27];
        for (index, block) in blocks.iter_mut().enumerate() {
            let position = local + offset_of(index);
            *block = match BlockGrid::linear_index(position) {
                Some(linear) => grid.get_linear(linear),
                None => access.block_at(origin + position.to_vec())?,
            };
        }
        Some(Self { blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_round_trip() {
        for index in 0..27 {
            assert_eq!(offset_index(offset_of(index)), index);
        }
        assert_eq!(offset_index(Vector3::new(0, 0, 0)), CENTER);
        assert_eq!(offset_index(Vector3::new(-1, -1, -1)), 0);
        assert_eq!(offset_index(Vector3::new(1, 1, 1)), 26);
    }

    #[test]
    fn border_reads_outside_through_the_accessor() {
        let mut grid = BlockGrid::empty();
        grid.set(Point3::new(0, 0, 0), 4);
        grid.set(Point3::new(1, 0, 0), 5);
        let origin = Point3::new(CHUNK_DIMENSION, 0, 0);

        let access = |global: BlockIndex| -> Option<BlockId> {
            Some(if global.x < CHUNK_DIMENSION { 9 } else { 0 })
        };
        let neighborhood =
            Neighborhood::border(&grid, origin, Point3::new(0, 0, 0), &access).unwrap();

        assert_eq!(neighborhood.center(), 4);
        assert_eq!(neighborhood.at(Vector3::new(1, 0, 0)), 5);
        assert_eq!(neighborhood.at(Vector3::new(-1, 0, 0)), 9);
        assert_eq!(neighborhood.at(Vector3::new(0, -1, 0)), 0);

        let pending = |_: BlockIndex| -> Option<BlockId> { None };
        assert!(Neighborhood::border(&grid, Point3::origin(), Point3::new(0, 0, 0), &pending).is_none());
    }

    #[test]
    fn interior_matches_border_gathering() {
        let mut grid = BlockGrid::empty();
        for (i, x) in (4..7).enumerate() {
            grid.set(Point3::new(x, 5, 5), i as BlockId + 1);
            grid.set(Point3::new(5, x, 6), i as BlockId + 10);
        }
        let local = Point3::new(5, 5, 5);
        let never = |_: BlockIndex| -> Option<BlockId> { unreachable!() };

        assert!(!is_border(local));
        assert!(is_border(Point3::new(5, 15, 5)));
        assert_eq!(
            Neighborhood::interior(&grid, local),
            Neighborhood::border(&grid, Point3::origin(), local, &never).unwrap()
        );
    }
}
