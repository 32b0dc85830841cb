//! # Voxel Streaming Demo
//!
//! Flies a camera across the reference planet and streams the chunks around
//! it. Frames are rendered offscreen when a GPU with push constants is
//! available and counted in host memory otherwise.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- [streaming.json]
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cgmath::{Deg, Point3, Vector3};
use log::{error, info, warn};
use web_time::Instant;

use voxel_streaming::engine_state::camera_state::camera::{Camera, Projection};
use voxel_streaming::engine_state::camera_state::{CameraView, SharedViewer};
use voxel_streaming::engine_state::config::{load_config, StreamingConfig};
use voxel_streaming::engine_state::rendering::gpu::{GpuContext, OffscreenFrame};
use voxel_streaming::engine_state::rendering::{ChunkDrawer, ChunkTransforms, MemoryUploadSink, UploadSink};
use voxel_streaming::engine_state::task_management::UploadStats;
use voxel_streaming::engine_state::voxels::block::{BlockCatalog, BlockId};
use voxel_streaming::engine_state::voxels::chunk::CHUNK_DIMENSION;
use voxel_streaming::engine_state::voxels::world::World;
use voxel_streaming::engine_state::StreamingEngine;

const FRAMES: u32 = 900;
const FRAME_TIME: Duration = Duration::from_millis(16);
/// Blocks per frame
const FLIGHT_SPEED: f32 = 0.75;
const EDIT_INTERVAL: u32 = 120;
const REPORT_INTERVAL: u32 = 60;
const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 360;
const GENERATION_BUDGET: usize = 8;

fn main() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match load_config(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => StreamingConfig::default(),
    };
    info!("Streaming config: {:?}", config);

    let catalog = BlockCatalog::builtin();
    let marker = catalog.id_of("glass");
    let world = Arc::new(World::from_config(&config, &catalog));

    let stop = Arc::new(AtomicBool::new(false));
    let generator = if config.world.deferred {
        spawn_generator(world.clone(), stop.clone())
    } else {
        None
    };

    let spawn_height = (config.planet_size.z * CHUNK_DIMENSION) as f32 * 0.75;
    let mut camera = Camera::new((8.0, 8.0, spawn_height), Deg(30.0), Deg(-25.0));
    let projection = Projection::new(FRAME_WIDTH, FRAME_HEIGHT, Deg(70.0), config.near_plane, 1000.0);
    let viewer = Arc::new(SharedViewer::new(camera.position));

    let demo = Demo {
        world: world.clone(),
        viewer: viewer.clone(),
        projection,
        marker,
    };

    match pollster::block_on(GpuContext::request()) {
        Some(gpu) => {
            let mut engine = start_engine(&config, world, catalog, viewer);
            let frame = OffscreenFrame::new(&gpu.device, FRAME_WIDTH, FRAME_HEIGHT);
            let mut sink = gpu.upload_sink();
            demo.run(&mut engine, &mut sink, &mut camera, |engine, view| {
                frame.render(&gpu.device, &gpu.queue, |drawer| engine.draw_chunks(drawer, view))
            });
            engine.shutdown();
        }
        None => {
            info!("No suitable GPU, keeping meshes in host memory");
            let mut engine = start_engine(&config, world, catalog, viewer);
            let mut sink = MemoryUploadSink::new();
            let mut drawer = CountingDrawer::default();
            demo.run(&mut engine, &mut sink, &mut camera, |engine, view| {
                engine.draw_chunks(&mut drawer, view)
            });
            engine.shutdown();
            info!("Counted {} indices across all frames", drawer.indices);
        }
    }

    stop.store(true, Ordering::SeqCst);
    if let Some(generator) = generator {
        if generator.join().is_err() {
            error!("Terrain generator panicked");
        }
    }
}

fn start_engine<B: Send + 'static>(
    config: &StreamingConfig,
    world: Arc<World>,
    catalog: BlockCatalog,
    viewer: Arc<SharedViewer>,
) -> StreamingEngine<B> {
    match StreamingEngine::new(config, world, catalog, viewer) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to start streaming: {}", e);
            std::process::exit(1);
        }
    }
}

/// Generates queued chunks of a deferred world until `stop` is raised.
fn spawn_generator(world: Arc<World>, stop: Arc<AtomicBool>) -> Option<JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name("terrain-generator".to_string())
        .spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                if world.generate_queued(GENERATION_BUDGET) == 0 {
                    thread::sleep(Duration::from_millis(5));
                }
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Could not start the terrain generator, chunks will stay pending: {}", e);
            None
        }
    }
}

/// Counts indices instead of drawing them.
#[derive(Default)]
struct CountingDrawer {
    indices: u64,
}

impl<B> ChunkDrawer<B> for CountingDrawer {
    fn draw_chunk(&mut self, _geometry: &B, index_count: u32, _transforms: &ChunkTransforms) {
        self.indices += u64::from(index_count);
    }
}

struct Demo {
    world: Arc<World>,
    viewer: Arc<SharedViewer>,
    projection: Projection,
    marker: Option<BlockId>,
}

impl Demo {
    fn run<B, S, R>(&self, engine: &mut StreamingEngine<B>, sink: &mut S, camera: &mut Camera, mut render: R)
    where
        B: Send + 'static,
        S: UploadSink<Buffer = B>,
        R: FnMut(&StreamingEngine<B>, &CameraView) -> usize,
    {
        let sun = Vector3::new(0.4, 0.3, -1.0);
        let started = Instant::now();
        let mut totals = UploadStats::default();
        let mut drawn = 0;

        for frame in 1..=FRAMES {
            engine.update();
            let stats = engine.apply_uploads(sink);
            totals.applied += stats.applied;
            totals.discarded += stats.discarded;
            totals.failed += stats.failed;

            camera.translate(FLIGHT_SPEED, 0.0, 0.0);
            self.viewer.set_position(camera.position);
            let view = CameraView::new(camera, &self.projection, sun, 64.0);
            drawn = render(engine, &view);

            if engine.take_center_changed() {
                info!("Window recentred around chunk {:?}", view.viewer_chunk);
            }
            for diagnostic in engine.drain_diagnostics() {
                warn!("Streaming diagnostic: {:?}", diagnostic);
            }

            if frame % EDIT_INTERVAL == 0 {
                self.place_marker(camera.position);
            }
            if frame % REPORT_INTERVAL == 0 {
                let summary = engine.slot_summary();
                info!(
                    "Frame {}: {}/{} slots loaded, {} stale, {} drawn, uploads {:?}",
                    frame, summary.loaded, summary.total, summary.stale, drawn, totals
                );
            }

            thread::sleep(FRAME_TIME);
        }

        info!(
            "Streamed {} frames in {:.1}s, last frame drew {} chunks",
            FRAMES,
            started.elapsed().as_secs_f32(),
            drawn
        );
    }

    /// Drops a marker block a few blocks below the camera.
    fn place_marker(&self, position: Point3<f32>) {
        let Some(marker) = self.marker else {
            return;
        };
        let below = Point3::new(
            position.x.floor() as i32,
            position.y.floor() as i32,
            position.z.floor() as i32 - 6,
        );
        if self.world.set_block(below, marker) {
            info!("Placed a marker at {:?}", below);
        }
    }
}
