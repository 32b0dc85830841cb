//! # Voxel Data
//!
//! This module holds the block data the streaming core works on: how a planet
//! is addressed, what a block is, how chunks store and publish their blocks,
//! and where chunks come from.
//!
//! ## Architecture
//!
//! * **coords**: Chunk, column and block indices on a toroidal planet
//! * **block**: Block ids, sides and the material catalog
//! * **chunk**: Fixed-size block grids with change notification
//! * **source**: The `ChunkSource` contract the streaming core consumes
//! * **world**: A generated reference source
//! * **window_cache**: The resident window of chunks around the viewer
//!
//! ## Data Flow
//!
//! 1. The window cache asks the source for the chunks of every column it covers
//! 2. A pending chunk is retried on a later pass
//! 3. Edits to a chunk notify its subscribers with the chunk's index
//! 4. The scheduler re-meshes the affected render slot
//!
//! ## Thread Safety
//!
//! * Chunk grids sit behind a read-write lock; meshing works on a snapshot
//! * Change callbacks run after the grid lock is released
//! * The window's column mapping is written by a single thread

pub mod block;
pub mod chunk;
pub mod coords;
pub mod source;
pub mod window_cache;
pub mod world;
