//! # Coordinates Module
//!
//! Index types and the wraparound arithmetic of a planet.
//!
//! A planet is a finite grid of chunks whose X and Y axes wrap around (the
//! surface is a torus) while Z is bounded. Every positional comparison the
//! streaming core makes goes through [`PlanetSize`]: shortest distances take
//! the short way around the torus on X/Y and the plain difference on Z.
//!
//! ```
//! use cgmath::Point2;
//! use voxel_streaming::engine_state::voxels::coords::PlanetSize;
//!
//! let planet = PlanetSize::new(64, 64, 4);
//! assert_eq!(planet.column_distance(Point2::new(0, 0), Point2::new(63, 0)), 1.0);
//! ```

use cgmath::{InnerSpace, Point2, Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::chunk::CHUNK_DIMENSION;

/// Position of a chunk, in chunk units.
pub type ChunkIndex = Point3<i32>;

/// Position of a chunk column (X/Y only), in chunk units.
pub type ColumnIndex = Point2<i32>;

/// Global position of a block, in block units.
pub type BlockIndex = Point3<i32>;

/// Size of a planet in chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanetSize {
    /// Number of chunk columns along X before wrapping
    pub x: i32,
    /// Number of chunk columns along Y before wrapping
    pub y: i32,
    /// Number of chunk layers along Z (no wrapping)
    pub z: i32,
}

impl PlanetSize {
    /// Creates a planet size from chunk counts.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Wraps a column into `[0, x) × [0, y)`.
    pub fn normalize_column(&self, column: ColumnIndex) -> ColumnIndex {
        Point2::new(column.x.rem_euclid(self.x), column.y.rem_euclid(self.y))
    }

    /// Wraps the X/Y part of a chunk index. Z is left untouched.
    pub fn normalize_chunk(&self, index: ChunkIndex) -> ChunkIndex {
        Point3::new(
            index.x.rem_euclid(self.x),
            index.y.rem_euclid(self.y),
            index.z,
        )
    }

    /// Returns `true` if `z` names an existing chunk layer.
    pub fn contains_layer(&self, z: i32) -> bool {
        (0..self.z).contains(&z)
    }

    /// Number of blocks along each axis of the planet.
    pub fn block_extent(&self) -> Vector3<i32> {
        Vector3::new(self.x, self.y, self.z) * CHUNK_DIMENSION
    }

    /// Shortest chunk offset leading from `from` to `to`.
    ///
    /// X and Y take the short way around the planet, Z is the plain difference.
    pub fn shortest_offset(&self, from: ChunkIndex, to: ChunkIndex) -> Vector3<i32> {
        Vector3::new(
            toroidal_delta(from.x, to.x, self.x),
            toroidal_delta(from.y, to.y, self.y),
            to.z - from.z,
        )
    }

    /// Squared length of [`Self::shortest_offset`], used to order work by distance.
    pub fn distance_squared(&self, from: ChunkIndex, to: ChunkIndex) -> i64 {
        let offset = self.shortest_offset(from, to);
        let (x, y, z) = (offset.x as i64, offset.y as i64, offset.z as i64);
        x * x + y * y + z * z
    }

    /// Shortest offset between two columns.
    pub fn column_offset(&self, from: ColumnIndex, to: ColumnIndex) -> Vector2<i32> {
        Vector2::new(
            toroidal_delta(from.x, to.x, self.x),
            toroidal_delta(from.y, to.y, self.y),
        )
    }

    /// Euclidean length of the shortest offset between two columns.
    pub fn column_distance(&self, from: ColumnIndex, to: ColumnIndex) -> f32 {
        let offset = self.column_offset(from, to);
        Vector2::new(offset.x as f32, offset.y as f32).magnitude()
    }
}

/// Signed shortest distance from `from` to `to` on a ring of `size` cells.
///
/// The result lies in `(-size / 2, size / 2]`.
pub fn toroidal_delta(from: i32, to: i32, size: i32) -> i32 {
    let delta = (to - from).rem_euclid(size);
    if delta > size / 2 {
        delta - size
    } else {
        delta
    }
}

/// Column part of a chunk index.
pub fn column_of(index: ChunkIndex) -> ColumnIndex {
    Point2::new(index.x, index.y)
}

/// Splits a global block position into the owning chunk and the local position inside it.
pub fn split_block_index(global: BlockIndex) -> (ChunkIndex, Point3<i32>) {
    let chunk = Point3::new(
        global.x.div_euclid(CHUNK_DIMENSION),
        global.y.div_euclid(CHUNK_DIMENSION),
        global.z.div_euclid(CHUNK_DIMENSION),
    );
    let local = Point3::new(
        global.x.rem_euclid(CHUNK_DIMENSION),
        global.y.rem_euclid(CHUNK_DIMENSION),
        global.z.rem_euclid(CHUNK_DIMENSION),
    );
    (chunk, local)
}

/// Chunks other than `index` whose meshes read the block at `local`.
///
/// A block on a face, edge or corner of its chunk is part of the 3×3×3
/// neighborhoods of up to seven adjacent chunks. Indices are not wrapped.
pub fn touching_chunks(index: ChunkIndex, local: Point3<i32>) -> Vec<ChunkIndex> {
    let steps = |coordinate: i32| -> &'static [i32] {
        if coordinate == 0 {
            &[0, -1]
        } else if coordinate == CHUNK_DIMENSION - 1 {
            &[0, 1]
        } else {
            &[0]
        }
    };

    let mut touching = Vec::new();
    for &dx in steps(local.x) {
        for &dy in steps(local.y) {
            for &dz in steps(local.z) {
                if (dx, dy, dz) != (0, 0, 0) {
                    touching.push(index + Vector3::new(dx, dy, dz));
                }
            }
        }
    }
    touching
}

/// Global position of the first block of a chunk.
pub fn chunk_origin(index: ChunkIndex) -> BlockIndex {
    Point3::new(
        index.x * CHUNK_DIMENSION,
        index.y * CHUNK_DIMENSION,
        index.z * CHUNK_DIMENSION,
    )
}
