//! # Engine State Module
//!
//! The streaming core: keeps a window of chunks meshed around a moving
//! viewer and draws it.
//!
//! ## Key Components
//!
//! * `StreamingEngine` - Owns the window cache, the scheduler and its render half
//! * `camera_state` - Camera, viewer position feed and visibility sphere
//! * `config` - JSON configuration
//! * `rendering` - Meshing, render slots, upload marshaling and the `wgpu` backend
//! * `task_management` - Background threads that rebuild stale slots
//! * `voxels` - Blocks, chunks, the window cache and the reference world
//!
//! ## Architecture
//!
//! Chunk data comes from a [`voxels::source::ChunkSource`]. The window cache
//! keeps the columns around the viewer resident, render slots mirror them one
//! chunk each, and the scheduler's workers mesh whatever slot turned stale.
//! Finished meshes travel to the thread owning the `StreamingEngine`, which
//! uploads and draws them.
//!
//! ## Performance Considerations
//!
//! * Workers walk the slots nearest first
//! * Only chunks inside the visibility sphere are drawn
//! * Meshing never holds a chunk or slot lock

use std::io;
use std::sync::Arc;

use thiserror::Error;

pub mod camera_state;
pub mod config;
pub mod rendering;
pub mod task_management;
pub mod voxels;

use camera_state::{CameraView, ViewerFeed};
use config::{ConfigError, StreamingConfig};
use rendering::{ChunkDrawer, UploadSink};
use task_management::{Diagnostic, RegenerationScheduler, RenderThread, SlotSummary, UploadStats};
use voxels::block::BlockCatalog;
use voxels::source::ChunkSource;
use voxels::window_cache::ChunkWindowCache;

/// Errors from starting a [`StreamingEngine`].
#[derive(Error, Debug)]
pub enum EngineError {
    /// The configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A worker thread could not be spawned
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// The streaming core, driven once per frame by the render thread.
///
/// `B` is the buffer type of the upload sink the caller renders with.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use cgmath::Point3;
/// use voxel_streaming::engine_state::StreamingEngine;
/// use voxel_streaming::engine_state::camera_state::SharedViewer;
/// use voxel_streaming::engine_state::config::StreamingConfig;
/// use voxel_streaming::engine_state::rendering::{MemoryGeometry, MemoryUploadSink};
/// use voxel_streaming::engine_state::voxels::block::BlockCatalog;
/// use voxel_streaming::engine_state::voxels::world::World;
///
/// let config = StreamingConfig::default();
/// let catalog = BlockCatalog::builtin();
/// let world = Arc::new(World::from_config(&config, &catalog));
/// let viewer = Arc::new(SharedViewer::new(Point3::new(8.0, 8.0, 40.0)));
///
/// let mut engine: StreamingEngine<MemoryGeometry> =
///     StreamingEngine::new(&config, world, catalog, viewer).unwrap();
/// let mut sink = MemoryUploadSink::new();
/// loop {
///     engine.update();
///     engine.apply_uploads(&mut sink);
/// }
/// ```
pub struct StreamingEngine<B: Send + 'static> {
    scheduler: RegenerationScheduler<B>,
    render_thread: RenderThread<B>,
}

impl<B: Send + 'static> StreamingEngine<B> {
    /// Validates `config`, creates the window cache and starts the workers.
    ///
    /// # Arguments
    /// * `config` - Streaming settings
    /// * `source` - Where chunks come from
    /// * `catalog` - Block definitions for meshing
    /// * `viewer` - Where the viewer is; polled by `update`
    pub fn new(
        config: &StreamingConfig,
        source: Arc<dyn ChunkSource>,
        catalog: BlockCatalog,
        viewer: Arc<dyn ViewerFeed>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let cache = Arc::new(ChunkWindowCache::new(source, config.planet_size, config.view_range));
        let (scheduler, render_thread) =
            RegenerationScheduler::start(cache, Arc::new(catalog), viewer, config.scheduler_options())?;
        Ok(Self {
            scheduler,
            render_thread,
        })
    }

    /// Polls the viewer and wakes workers. Call once per frame.
    pub fn update(&mut self) {
        self.scheduler.update();
    }

    /// Uploads every finished mesh through `sink`.
    pub fn apply_uploads<S>(&mut self, sink: &mut S) -> UploadStats
    where
        S: UploadSink<Buffer = B>,
    {
        self.render_thread.apply_uploads(sink)
    }

    /// Draws the visible chunks.
    ///
    /// # Returns
    /// The number of chunks drawn
    pub fn draw_chunks(&self, drawer: &mut impl ChunkDrawer<B>, view: &CameraView) -> usize {
        self.render_thread.draw_chunks(drawer, view)
    }

    /// Takes the diagnostics reported since the last call.
    pub fn drain_diagnostics(&self) -> Vec<Diagnostic> {
        self.render_thread.drain_diagnostics()
    }

    /// Reports whether the window recentred since the last call.
    pub fn take_center_changed(&self) -> bool {
        self.render_thread.take_center_changed()
    }

    /// Counts bound, loaded and stale slots.
    pub fn slot_summary(&self) -> SlotSummary {
        self.scheduler.slot_summary()
    }

    /// The chunk window around the viewer.
    pub fn cache(&self) -> &Arc<ChunkWindowCache> {
        self.scheduler.cache()
    }

    /// The scheduler driving the workers.
    pub fn scheduler(&self) -> &RegenerationScheduler<B> {
        &self.scheduler
    }

    /// Stops the workers. Dropping the engine does the same.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
    }
}
