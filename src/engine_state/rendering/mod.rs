//! Rendering side of chunk streaming.
//!
//! This module turns chunks into meshes, marshals the meshes to the render
//! thread and draws them. Render slots tie the three together: each slot is
//! one position of the window around the viewer and owns the geometry
//! uploaded for the chunk bound to it.
//!
//! The GPU is reached only through two traits, [`UploadSink`] and
//! [`ChunkDrawer`]. [`gpu`] implements them on `wgpu`; [`MemoryUploadSink`]
//! keeps meshes in host memory for headless runs and tests.

pub mod gpu;
pub mod meshing;
pub mod render_slot;
mod texture;
pub mod upload;
mod vertex;

pub use meshing::{ChunkMesh, MeshBuilder};
pub use render_slot::{ChunkDrawer, ChunkTransforms, RenderSlot, RenderThreadToken, SlotBinding};
pub use upload::{MemoryGeometry, MemoryUploadSink, PendingUpload, UploadError, UploadQueue, UploadSink};
pub use vertex::Vertex;
