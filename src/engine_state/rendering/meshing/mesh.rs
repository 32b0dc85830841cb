//! CPU-side geometry of one chunk.

use crate::engine_state::rendering::vertex::Vertex;

/// Index pattern of one quad, relative to its first vertex.
///
/// The quad is split along the diagonal from vertex 0 to vertex 3; the mesher
/// orders the four corners so that this diagonal is the one it chose.
pub const QUAD_INDEX_PATTERN: [u32; 6] = [0, 1, 3, 0, 3, 2];

/// Vertices and triangle indices of a chunk, four vertices and six indices per quad.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkMesh {
    /// Quad corners, four per quad
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

impl ChunkMesh {
    /// An empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one quad whose corners are already in emission order.
    pub fn push_quad(&mut self, corners: [Vertex; 4]) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&corners);
        self.indices
            .extend(QUAD_INDEX_PATTERN.iter().map(|offset| base + offset));
    }

    /// Number of quads.
    pub fn quad_count(&self) -> usize {
        self.vertices.len() / 4
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    /// Number of indices.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Returns `true` if there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Iterates the quads as slices of four vertices.
    pub fn quads(&self) -> impl Iterator<Item = &[Vertex]> {
        self.vertices.chunks_exact(4)
    }
}
