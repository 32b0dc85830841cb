//! # Chunk Module
//!
//! This module provides the `Chunk` struct, a shared, editable 16x16x16 block
//! of voxel data, and the `BlockGrid` it wraps.
//!
//! ## Storage
//!
//! A `BlockGrid` keeps two parallel views of the same blocks:
//! - `blocks`: one `u16` id per block, X fastest, then Y, then Z (air is 0)
//! - `occupancy`: a bit vector with one bit per block, set for every non-air block
//!
//! The dense array gives O(1) lookups for neighbor queries; the bit vector
//! lets the mesher iterate only the non-air blocks of sparse chunks.
//!
//! ## Sharing and Edits
//!
//! Chunks are handed out as `Arc<Chunk>`. The grid sits behind an
//! [`MtResource`] so mesh workers can take read snapshots while world edits go
//! through [`Chunk::set_block`]. Every edit that changes a block notifies the
//! chunk's subscribers once the write lock has been released.

use std::sync::RwLockReadGuard;

use bitvec::prelude::BitVec;
use cgmath::Point3;

use crate::core::MtResource;

use super::block::{BlockId, AIR};
use super::coords::{split_block_index, BlockIndex, ChunkIndex};

pub mod chunk_iteration;
pub mod subscription;

pub use chunk_iteration::OccupiedBlocks;
pub use subscription::{ChangeCallback, ChangeListeners, Subscription};

/// The dimension (width, depth, height) of a chunk in blocks.
pub const CHUNK_DIMENSION: i32 = 16;
/// The number of blocks in a single Z layer of a chunk (CHUNK_DIMENSION²).
pub const CHUNK_PLANE_SIZE: i32 = CHUNK_DIMENSION * CHUNK_DIMENSION;
/// The total number of blocks in a chunk (CHUNK_DIMENSION³).
pub const CHUNK_SIZE: i32 = CHUNK_PLANE_SIZE * CHUNK_DIMENSION;

/// Dense grid of block ids for one chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockGrid {
    blocks: Vec<BlockId>,
    occupancy: BitVec,
}

impl BlockGrid {
    /// A grid of air.
    pub fn empty() -> Self {
        Self {
            blocks: vec![AIR; CHUNK_SIZE as usize],
            occupancy: BitVec::repeat(false, CHUNK_SIZE as usize),
        }
    }

    /// A grid where every block is `id`.
    pub fn filled(id: BlockId) -> Self {
        let mut grid = Self::empty();
        grid.fill(id);
        grid
    }

    /// Linear storage index of a local position, `None` outside the chunk.
    pub fn linear_index(local: Point3<i32>) -> Option<usize> {
        let range = 0..CHUNK_DIMENSION;
        if range.contains(&local.x) && range.contains(&local.y) && range.contains(&local.z) {
            Some((local.x + local.y * CHUNK_DIMENSION + local.z * CHUNK_PLANE_SIZE) as usize)
        } else {
            None
        }
    }

    /// Block at a local position; air outside the chunk.
    pub fn get(&self, local: Point3<i32>) -> BlockId {
        Self::linear_index(local).map_or(AIR, |linear| self.blocks[linear])
    }

    /// Block at a linear storage index.
    ///
    /// # Panics
    /// Panics if `linear >= CHUNK_SIZE`.
    pub fn get_linear(&self, linear: usize) -> BlockId {
        self.blocks[linear]
    }

    /// Replaces the block at a local position.
    ///
    /// # Returns
    /// The previous id, or `None` if the position is outside the chunk
    pub fn set(&mut self, local: Point3<i32>, id: BlockId) -> Option<BlockId> {
        let linear = Self::linear_index(local)?;
        let previous = std::mem::replace(&mut self.blocks[linear], id);
        self.occupancy.set(linear, id != AIR);
        Some(previous)
    }

    /// Sets every block to `id`.
    pub fn fill(&mut self, id: BlockId) {
        self.blocks.fill(id);
        self.occupancy.fill(id != AIR);
    }

    /// Returns `true` if every block is air.
    pub fn is_empty(&self) -> bool {
        self.occupancy.not_any()
    }

    /// Number of non-air blocks.
    pub fn occupied_count(&self) -> usize {
        self.occupancy.count_ones()
    }

    /// Iterates the non-air blocks.
    pub fn occupied(&self) -> OccupiedBlocks<'_> {
        OccupiedBlocks::new(self)
    }
}

impl Default for BlockGrid {
    fn default() -> Self {
        Self::empty()
    }
}

/// A chunk of the planet: its index, its blocks and who wants to hear about edits.
pub struct Chunk {
    index: ChunkIndex,
    grid: MtResource<BlockGrid>,
    listeners: ChangeListeners,
}

impl Chunk {
    /// Wraps a grid as the chunk at `index`.
    pub fn new(index: ChunkIndex, grid: BlockGrid) -> Self {
        Self {
            index,
            grid: MtResource::new(grid),
            listeners: ChangeListeners::default(),
        }
    }

    /// An all-air chunk.
    pub fn empty(index: ChunkIndex) -> Self {
        Self::new(index, BlockGrid::empty())
    }

    /// The index this chunk reports for itself.
    pub fn index(&self) -> ChunkIndex {
        self.index
    }

    /// Read access to the blocks. Keep the guard short-lived.
    pub fn blocks(&self) -> RwLockReadGuard<'_, BlockGrid> {
        self.grid.get()
    }

    /// Copy of the blocks, for work that must not hold the lock.
    pub fn snapshot(&self) -> BlockGrid {
        self.grid.get().clone()
    }

    /// Block at a local position.
    pub fn get_block(&self, local: Point3<i32>) -> BlockId {
        self.grid.get().get(local)
    }

    /// Block at a global position, masked into this chunk.
    pub fn get_block_global(&self, global: BlockIndex) -> BlockId {
        let (_, local) = split_block_index(global);
        self.get_block(local)
    }

    /// Replaces a block and notifies subscribers if it changed.
    ///
    /// # Returns
    /// `true` if the block changed
    pub fn set_block(&self, local: Point3<i32>, id: BlockId) -> bool {
        let changed = {
            let mut grid = self.grid.get_mut();
            matches!(grid.set(local, id), Some(previous) if previous != id)
        };

        if changed {
            self.listeners.notify(self.index);
        }
        changed
    }

    /// Sets every block to `id` and notifies subscribers.
    pub fn fill(&self, id: BlockId) {
        self.grid.get_mut().fill(id);
        self.listeners.notify(self.index);
    }

    /// Notifies subscribers without an edit, for an edit next door that
    /// changes how this chunk's border meshes.
    pub fn notify_changed(&self) {
        self.listeners.notify(self.index);
    }

    /// Registers a change callback for as long as the returned guard lives.
    pub fn subscribe(&self, callback: ChangeCallback) -> Subscription {
        self.listeners.subscribe(callback)
    }

    /// Number of live change subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("index", &self.index)
            .field("occupied", &self.grid.get().occupied_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn grid_tracks_occupancy() {
        let mut grid = BlockGrid::empty();
        assert!(grid.is_empty());

        assert_eq!(grid.set(Point3::new(1, 2, 3), 4), Some(AIR));
        assert_eq!(grid.get(Point3::new(1, 2, 3)), 4);
        assert_eq!(grid.occupied_count(), 1);
        assert_eq!(grid.set(Point3::new(16, 0, 0), 4), None);
        assert_eq!(grid.get(Point3::new(-1, 0, 0)), AIR);

        grid.set(Point3::new(1, 2, 3), AIR);
        assert!(grid.is_empty());
        assert_eq!(BlockGrid::filled(2).occupied_count(), CHUNK_SIZE as usize);
    }

    #[test]
    fn edits_notify_subscribers_only_on_change() {
        let chunk = Chunk::empty(Point3::new(2, 3, 0));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let _subscription = chunk.subscribe(Arc::new(move |index| {
            assert_eq!(index, Point3::new(2, 3, 0));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(chunk.set_block(Point3::new(0, 0, 0), 3));
        assert!(!chunk.set_block(Point3::new(0, 0, 0), 3));
        assert!(!chunk.set_block(Point3::new(0, 0, 99), 3));
        chunk.fill(AIR);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(chunk.blocks().is_empty());
    }

    #[test]
    fn global_lookup_masks_into_the_chunk() {
        let chunk = Chunk::empty(Point3::new(-1, 0, 0));
        chunk.set_block(Point3::new(15, 0, 0), 6);

        assert_eq!(chunk.get_block_global(Point3::new(-1, 0, 0)), 6);
        assert_eq!(chunk.snapshot().get(Point3::new(15, 0, 0)), 6);
    }
}
