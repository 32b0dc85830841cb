//! # Upload Marshaling
//!
//! Meshes are built on worker threads but GPU buffers may only be touched by
//! the thread that owns the device. Workers therefore never upload: they
//! push a [`PendingUpload`] into an [`UploadQueue`] and the render thread
//! drains it, handing each mesh to an [`UploadSink`].
//!
//! ## Generations
//!
//! Every upload carries the binding generation of its slot at the time the
//! mesh was built. A slot rebound in the meantime has a newer generation and
//! the stale mesh is discarded instead of being drawn for the wrong chunk.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use thiserror::Error;

use super::meshing::ChunkMesh;
use super::render_slot::RenderSlot;
use super::vertex::Vertex;

/// Reasons an upload sink can refuse a mesh.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The mesh needs a bigger buffer than the device allows
    #[error("mesh needs a {requested} byte buffer, the limit is {limit} bytes")]
    BufferTooLarge {
        /// Bytes the mesh needs
        requested: u64,
        /// Largest buffer the sink can create
        limit: u64,
    },
    /// The device went away
    #[error("device lost: {0}")]
    DeviceLost(String),
}

/// Turns CPU meshes into drawable buffers on the render thread.
///
/// An upload either resizes `target` in place or replaces it completely. On
/// error `target` must still hold the previous buffer.
pub trait UploadSink {
    /// The buffer type slots keep and drawers consume
    type Buffer: Send + 'static;

    /// Uploads `mesh` into `target`.
    fn upload(&mut self, target: &mut Option<Self::Buffer>, mesh: &ChunkMesh) -> Result<(), UploadError>;
}

/// A finished mesh waiting for the render thread.
pub struct PendingUpload<B> {
    /// The slot the mesh was built for
    pub slot: Arc<RenderSlot<B>>,
    /// The slot's binding generation when the mesh was built
    pub generation: u64,
    /// The mesh
    pub mesh: ChunkMesh,
}

/// Worker-side handle for sending meshes to the render thread.
pub struct UploadQueue<B> {
    sender: Sender<PendingUpload<B>>,
}

impl<B> Clone for UploadQueue<B> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<B> UploadQueue<B> {
    /// Creates a queue and the receiver the render thread drains.
    pub fn channel() -> (Self, Receiver<PendingUpload<B>>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }

    /// Hands an upload to the render thread.
    ///
    /// # Returns
    /// `false` if the render thread is gone
    pub fn dispatch(&self, upload: PendingUpload<B>) -> bool {
        self.sender.send(upload).is_ok()
    }
}

/// Geometry kept in host memory by [`MemoryUploadSink`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryGeometry {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Index data
    pub indices: Vec<u32>,
}

impl MemoryGeometry {
    /// Bytes the geometry occupies.
    pub fn byte_size(&self) -> u64 {
        mesh_bytes(self.vertices.len(), self.indices.len())
    }
}

/// An upload sink that copies meshes into host memory.
///
/// Used when no GPU is available and by tests. An optional byte limit per
/// mesh stands in for the device's maximum buffer size.
#[derive(Clone, Debug, Default)]
pub struct MemoryUploadSink {
    max_buffer_bytes: Option<u64>,
    uploads: usize,
}

impl MemoryUploadSink {
    /// A sink without a size limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that refuses meshes larger than `bytes`.
    pub fn with_limit(bytes: u64) -> Self {
        Self {
            max_buffer_bytes: Some(bytes),
            uploads: 0,
        }
    }

    /// Number of successful uploads so far.
    pub fn uploads(&self) -> usize {
        self.uploads
    }
}

impl UploadSink for MemoryUploadSink {
    type Buffer = MemoryGeometry;

    fn upload(&mut self, target: &mut Option<MemoryGeometry>, mesh: &ChunkMesh) -> Result<(), UploadError> {
        let requested = mesh_bytes(mesh.vertices.len(), mesh.indices.len());
        if let Some(limit) = self.max_buffer_bytes {
            if requested > limit {
                return Err(UploadError::BufferTooLarge { requested, limit });
            }
        }

        match target {
            Some(geometry) => {
                geometry.vertices.clear();
                geometry.vertices.extend_from_slice(&mesh.vertices);
                geometry.indices.clear();
                geometry.indices.extend_from_slice(&mesh.indices);
            }
            None => {
                *target = Some(MemoryGeometry {
                    vertices: mesh.vertices.clone(),
                    indices: mesh.indices.clone(),
                });
            }
        }
        self.uploads += 1;
        Ok(())
    }
}

/// Bytes needed for `vertices` vertices and `indices` indices.
pub fn mesh_bytes(vertices: usize, indices: usize) -> u64 {
    (vertices * std::mem::size_of::<Vertex>() + indices * std::mem::size_of::<u32>()) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> ChunkMesh {
        let vertex = Vertex {
            position: [0.0; 3],
            normal: [0.0, 0.0, 1.0],
            uv: [0.0; 2],
            layer: 0,
            brightness: 1.0,
        };
        let mut mesh = ChunkMesh::new();
        mesh.push_quad([vertex; 4]);
        mesh
    }

    #[test]
    fn memory_sink_replaces_in_place() {
        let mut sink = MemoryUploadSink::new();
        let mut target = None;
        sink.upload(&mut target, &quad_mesh()).unwrap();
        assert_eq!(target.as_ref().unwrap().indices.len(), 6);

        sink.upload(&mut target, &ChunkMesh::new()).unwrap();
        assert_eq!(target, Some(MemoryGeometry::default()));
        assert_eq!(sink.uploads(), 2);
    }

    #[test]
    fn oversized_mesh_keeps_the_previous_buffer() {
        let mesh = quad_mesh();
        let bytes = mesh_bytes(4, 6);
        assert_eq!(bytes, 4 * 40 + 6 * 4);

        let mut sink = MemoryUploadSink::with_limit(bytes - 1);
        let previous = MemoryGeometry {
            vertices: Vec::new(),
            indices: vec![7],
        };
        let mut target = Some(previous.clone());

        let error = sink.upload(&mut target, &mesh).unwrap_err();
        assert!(matches!(error, UploadError::BufferTooLarge { requested, .. } if requested == bytes));
        assert_eq!(target, Some(previous));
        assert_eq!(sink.uploads(), 0);
    }
}
