#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Streaming
//!
//! The chunk streaming and meshing core of a voxel planet renderer, built
//! with Rust and WGPU.
//!
//! A window of chunk columns follows the viewer across a planet that wraps
//! around in X and Y. Background workers mesh every chunk in the window,
//! nearest first, and rebuild chunks as they are edited. The render thread
//! uploads the meshes and draws the chunks in front of the viewer.
//!
//! ## Key Modules
//!
//! * `core` - Concurrency primitives used throughout the crate
//! * `engine_state` - The streaming engine, its voxels, meshing, scheduling and rendering
//!
//! ## Architecture
//!
//! The crate is split along the data flow:
//! * Chunk supply (`voxels::source`, `voxels::world`)
//! * The resident window (`voxels::window_cache`)
//! * Mesh generation (`rendering::meshing`)
//! * Slot scheduling (`task_management`)
//! * Upload and draw (`rendering::upload`, `rendering::gpu`)
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use cgmath::Point3;
//! use voxel_streaming::engine_state::StreamingEngine;
//! use voxel_streaming::engine_state::camera_state::SharedViewer;
//! use voxel_streaming::engine_state::config::load_config;
//! use voxel_streaming::engine_state::rendering::{MemoryGeometry, MemoryUploadSink};
//! use voxel_streaming::engine_state::voxels::block::BlockCatalog;
//! use voxel_streaming::engine_state::voxels::world::World;
//!
//! let config = load_config("streaming.json").unwrap();
//! let catalog = BlockCatalog::builtin();
//! let world = Arc::new(World::from_config(&config, &catalog));
//! let viewer = Arc::new(SharedViewer::new(Point3::new(0.0, 0.0, 48.0)));
//! let mut engine: StreamingEngine<MemoryGeometry> =
//!     StreamingEngine::new(&config, world, catalog, viewer.clone()).unwrap();
//!
//! let mut sink = MemoryUploadSink::new();
//! engine.update();
//! engine.apply_uploads(&mut sink);
//! ```
//!
//! ## Performance Considerations
//!
//! * Chunk-based voxel storage with a compact occupancy bitmap
//! * Meshes are built from grid snapshots, so edits never wait on meshing
//! * Workers interleave the slot list, all starting near the viewer
//! * Buffers are reused in place while meshes fit

pub mod core;
pub mod engine_state;
