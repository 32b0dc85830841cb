//! # Chunk Iteration Module
//!
//! Iteration over the non-air blocks of a grid.
//!
//! The grid keeps an occupancy bit per block next to the dense id array, so
//! the iterator jumps from set bit to set bit and never looks at air.

use bitvec::order::Lsb0;
use bitvec::slice::IterOnes;
use cgmath::Point3;

use crate::engine_state::voxels::block::BlockId;

use super::{BlockGrid, CHUNK_DIMENSION, CHUNK_PLANE_SIZE};

/// Iterator over `(local position, block id)` of every non-air block.
///
/// Blocks are visited in storage order: X fastest, then Y, then Z.
pub struct OccupiedBlocks<'a> {
    grid: &'a BlockGrid,
    ones: IterOnes<'a, usize, Lsb0>,
}

impl<'a> OccupiedBlocks<'a> {
    pub(super) fn new(grid: &'a BlockGrid) -> Self {
        Self {
            grid,
            ones: grid.occupancy.iter_ones(),
        }
    }
}

impl Iterator for OccupiedBlocks<'_> {
    type Item = (Point3<i32>, BlockId);

    fn next(&mut self) -> Option<Self::Item> {
        let linear = self.ones.next()?;
        Some((position_of(linear), self.grid.blocks[linear]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ones.size_hint()
    }
}

/// Local position of a linear grid index.
pub fn position_of(linear: usize) -> Point3<i32> {
    let linear = linear as i32;
    Point3::new(
        linear % CHUNK_DIMENSION,
        (linear / CHUNK_DIMENSION) % CHUNK_DIMENSION,
        linear / CHUNK_PLANE_SIZE,
    )
}
