//! The producer side of chunk data.
//!
//! The streaming core never generates or stores terrain itself. It asks a
//! [`ChunkSource`] for chunks and subscribes to their edits; the source may
//! answer "not yet" while it generates in the background.

use std::sync::Arc;

use super::chunk::{ChangeCallback, Chunk, Subscription};
use super::coords::ChunkIndex;

/// Answer of a [`ChunkSource`] to a chunk request.
#[derive(Clone, Debug)]
pub enum ChunkRequest {
    /// The chunk is resident
    Ready(Arc<Chunk>),
    /// The chunk is being produced; ask again later
    Pending,
}

impl ChunkRequest {
    /// The chunk, if it is ready.
    pub fn ready(self) -> Option<Arc<Chunk>> {
        match self {
            ChunkRequest::Ready(chunk) => Some(chunk),
            ChunkRequest::Pending => None,
        }
    }
}

/// Supplies chunks to the window cache.
pub trait ChunkSource: Send + Sync {
    /// Requests the chunk at a normalized index.
    fn request_chunk(&self, index: ChunkIndex) -> ChunkRequest;

    /// Subscribes `callback` to edits of `chunk`.
    fn subscribe_to_changes(&self, chunk: &Chunk, callback: ChangeCallback) -> Subscription {
        chunk.subscribe(callback)
    }
}
