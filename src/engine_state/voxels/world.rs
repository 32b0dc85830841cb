//! # World Module
//!
//! This module provides `World`, the reference [`ChunkSource`] used by the
//! binary and the integration tests. It generates chunks on request and keeps
//! recently used ones in an LRU cache.
//!
//! ## Chunk Generation
//!
//! Multiple terrain generation strategies are supported:
//! - Perlin noise heightmap, sampled on a 4D torus so terrain wraps seamlessly around the planet
//! - Flat terrain at a fixed height
//! - Checkerboard pattern for testing
//! - Solid chunks (all blocks filled)
//! - Empty chunks (all blocks air)
//!
//! ## Immediate and Deferred Modes
//!
//! An immediate world generates a missing chunk inside `request_chunk`. A
//! deferred world only queues the index and answers `Pending`; whoever owns
//! the world calls `generate_queued` from a background thread. The deferred
//! mode is how the "generation pending" path of the streaming core gets
//! exercised.
//!
//! ## Performance Considerations
//!
//! - Generation runs outside the cache lock, so concurrent requests for different chunks do not serialize
//! - The LRU capacity must cover the window volume, which `StreamingConfig::validate` checks; an evicted chunk that is requested again is regenerated and loses its edits

use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use cgmath::Point3;
use log::debug;
use lru::LruCache;
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::engine_state::config::StreamingConfig;

use super::block::{BlockCatalog, BlockId, AIR};
use super::chunk::{BlockGrid, Chunk, CHUNK_DIMENSION};
use super::coords::{chunk_origin, split_block_index, touching_chunks, BlockIndex, ChunkIndex, PlanetSize};
use super::source::{ChunkRequest, ChunkSource};

/// Scaling factor applied to world coordinates when sampling Perlin noise.
pub const PERLIN_SCALE_FACTOR: f64 = 0.02;

/// Height variation of Perlin terrain around the sea level, in blocks.
pub const PERLIN_AMPLITUDE: f64 = CHUNK_DIMENSION as f64 * 1.5;

/// The method used to generate new chunks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum GenerationMethod {
    /// Rolling hills from wrapped Perlin noise
    #[default]
    Perlin,
    /// Ground up to a fixed block height
    Flat {
        /// Global Z of the surface block
        height: i32,
    },
    /// Alternating solid and air blocks
    Checkerboard,
    /// Every block solid
    Solid,
    /// Every block air
    Empty,
}

/// Block ids the generator places.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerrainPalette {
    /// Topmost block of a column
    pub surface: BlockId,
    /// The few blocks below the surface
    pub subsurface: BlockId,
    /// Everything deeper
    pub rock: BlockId,
    /// Surface block at or below sea level
    pub shore: BlockId,
}

impl TerrainPalette {
    /// Picks grass, dirt, stone and sand from the catalog, falling back to id 1.
    pub fn from_catalog(catalog: &BlockCatalog) -> Self {
        let pick = |name: &str| catalog.id_of(name).unwrap_or(1);
        Self {
            surface: pick("grass"),
            subsurface: pick("dirt"),
            rock: pick("stone"),
            shore: pick("sand"),
        }
    }
}

/// Produces the block grid of any chunk of a planet.
pub struct TerrainGenerator {
    planet: PlanetSize,
    method: GenerationMethod,
    palette: TerrainPalette,
    perlin: Perlin,
    seed: u32,
}

impl TerrainGenerator {
    /// Creates a generator for `planet`.
    pub fn new(
        planet: PlanetSize,
        method: GenerationMethod,
        palette: TerrainPalette,
        seed: u32,
    ) -> Self {
        Self {
            planet,
            method,
            palette,
            perlin: Perlin::new(seed),
            seed,
        }
    }

    /// Global Z of the block below which everything is water-level terrain.
    pub fn sea_level(&self) -> i32 {
        self.planet.block_extent().z / 2
    }

    /// Generates the blocks of the chunk at a normalized index.
    pub fn generate(&self, index: ChunkIndex) -> BlockGrid {
        match self.method {
            GenerationMethod::Empty => BlockGrid::empty(),
            GenerationMethod::Solid => BlockGrid::filled(self.palette.rock),
            GenerationMethod::Checkerboard => self.checkerboard(index),
            GenerationMethod::Flat { height } => self.heightmap(index, |_, _| height),
            GenerationMethod::Perlin => self.heightmap(index, |x, y| self.perlin_height(x, y)),
        }
    }

    fn checkerboard(&self, index: ChunkIndex) -> BlockGrid {
        let origin = chunk_origin(index);
        let mut grid = BlockGrid::empty();
        for z in 0..CHUNK_DIMENSION {
            for y in 0..CHUNK_DIMENSION {
                for x in 0..CHUNK_DIMENSION {
                    if (origin.x + x + origin.y + y + origin.z + z) & 1 == 0 {
                        grid.set(Point3::new(x, y, z), self.palette.rock);
                    }
                }
            }
        }
        grid
    }

    fn heightmap(&self, index: ChunkIndex, height_at: impl Fn(i32, i32) -> i32) -> BlockGrid {
        let origin = chunk_origin(index);
        let sea_level = self.sea_level();
        let mut grid = BlockGrid::empty();

        for y in 0..CHUNK_DIMENSION {
            for x in 0..CHUNK_DIMENSION {
                let (world_x, world_y) = (origin.x + x, origin.y + y);
                let height = height_at(world_x, world_y);
                if height < origin.z {
                    continue;
                }

                let mut rng = fastrand::Rng::with_seed(self.column_seed(world_x, world_y));
                let soil_depth = 2 + rng.i32(0..3);
                let top = if height <= sea_level {
                    self.palette.shore
                } else {
                    self.palette.surface
                };

                for z in 0..CHUNK_DIMENSION {
                    let world_z = origin.z + z;
                    let block = match height - world_z {
                        depth if depth < 0 => AIR,
                        0 => top,
                        depth if depth <= soil_depth => self.palette.subsurface,
                        _ => self.palette.rock,
                    };
                    if block != AIR {
                        grid.set(Point3::new(x, y, z), block);
                    }
                }
            }
        }
        grid
    }

    fn perlin_height(&self, world_x: i32, world_y: i32) -> i32 {
        let extent = self.planet.block_extent();
        let (circumference_x, circumference_y) = (extent.x as f64, extent.y as f64);
        let radius_x = circumference_x * PERLIN_SCALE_FACTOR / TAU;
        let radius_y = circumference_y * PERLIN_SCALE_FACTOR / TAU;
        let angle_x = world_x as f64 / circumference_x * TAU;
        let angle_y = world_y as f64 / circumference_y * TAU;

        let noise = self.perlin.get([
            radius_x * angle_x.cos(),
            radius_x * angle_x.sin(),
            radius_y * angle_y.cos(),
            radius_y * angle_y.sin(),
        ]);

        self.sea_level() + (noise * PERLIN_AMPLITUDE) as i32
    }

    fn column_seed(&self, world_x: i32, world_y: i32) -> u64 {
        (self.seed as u64)
            ^ (world_x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (world_y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
    }
}

/// A generated planet that serves chunks to the streaming core.
pub struct World {
    planet: PlanetSize,
    generator: TerrainGenerator,
    chunks: Mutex<LruCache<ChunkIndex, Arc<Chunk>>>,
    deferred: bool,
    queue: Mutex<VecDeque<ChunkIndex>>,
}

impl World {
    /// Creates an immediate world keeping up to `capacity` chunks.
    pub fn new(planet: PlanetSize, generator: TerrainGenerator, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            planet,
            generator,
            chunks: Mutex::new(LruCache::new(capacity)),
            deferred: false,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Builds the world described by `config.world`.
    pub fn from_config(config: &StreamingConfig, catalog: &BlockCatalog) -> Self {
        let generator = TerrainGenerator::new(
            config.planet_size,
            config.world.generation,
            TerrainPalette::from_catalog(catalog),
            config.world.seed,
        );
        let world = Self::new(config.planet_size, generator, config.world.cache_capacity);
        if config.world.deferred {
            world.deferred()
        } else {
            world
        }
    }

    /// Switches to deferred generation.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// The planet this world covers.
    pub fn planet(&self) -> PlanetSize {
        self.planet
    }

    /// Resident chunk at `index`, without generating or touching LRU order.
    pub fn chunk(&self, index: ChunkIndex) -> Option<Arc<Chunk>> {
        let index = self.planet.normalize_chunk(index);
        self.lock_chunks().peek(&index).cloned()
    }

    /// Edits the block at a global position if its chunk is resident.
    ///
    /// An edit on the chunk border also notifies the resident neighbors that
    /// see the block, so their faces and occlusion are rebuilt too.
    pub fn set_block(&self, global: BlockIndex, id: BlockId) -> bool {
        let (index, local) = split_block_index(global);
        let changed = self
            .chunk(index)
            .is_some_and(|chunk| chunk.set_block(local, id));
        if !changed {
            return false;
        }

        for neighbor in touching_chunks(index, local) {
            if !self.planet.contains_layer(neighbor.z) {
                continue;
            }
            if let Some(chunk) = self.chunk(neighbor) {
                chunk.notify_changed();
            }
        }
        true
    }

    /// Number of chunks waiting for deferred generation.
    pub fn queued(&self) -> usize {
        self.lock_queue().len()
    }

    /// Generates up to `budget` queued chunks.
    ///
    /// # Returns
    /// The number of chunks generated
    pub fn generate_queued(&self, budget: usize) -> usize {
        let mut generated = 0;
        while generated < budget {
            let Some(index) = self.lock_queue().pop_front() else {
                break;
            };
            self.generate(index);
            generated += 1;
        }
        generated
    }

    fn generate(&self, index: ChunkIndex) -> Arc<Chunk> {
        let chunk = Arc::new(Chunk::new(index, self.generator.generate(index)));

        let mut chunks = self.lock_chunks();
        if let Some(existing) = chunks.get(&index) {
            return existing.clone();
        }
        if let Some((evicted, _)) = chunks.push(index, chunk.clone()) {
            if evicted != index {
                debug!("Evicted chunk {:?} from the world cache", evicted);
            }
        }
        chunk
    }

    fn lock_chunks(&self) -> std::sync::MutexGuard<'_, LruCache<ChunkIndex, Arc<Chunk>>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<ChunkIndex>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChunkSource for World {
    fn request_chunk(&self, index: ChunkIndex) -> ChunkRequest {
        let index = self.planet.normalize_chunk(index);
        if !self.planet.contains_layer(index.z) {
            return ChunkRequest::Ready(Arc::new(Chunk::empty(index)));
        }

        if let Some(chunk) = self.lock_chunks().get(&index) {
            return ChunkRequest::Ready(chunk.clone());
        }

        if self.deferred {
            let mut queue = self.lock_queue();
            if !queue.contains(&index) {
                queue.push_back(index);
            }
            return ChunkRequest::Pending;
        }

        ChunkRequest::Ready(self.generate(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(method: GenerationMethod) -> World {
        let planet = PlanetSize::new(4, 4, 2);
        let catalog = BlockCatalog::builtin();
        let generator =
            TerrainGenerator::new(planet, method, TerrainPalette::from_catalog(&catalog), 7);
        World::new(planet, generator, 64)
    }

    #[test]
    fn immediate_world_generates_on_request() {
        let world = world(GenerationMethod::Solid);
        let chunk = world.request_chunk(Point3::new(5, -1, 0)).ready().unwrap();

        assert_eq!(chunk.index(), Point3::new(1, 3, 0));
        assert!(!chunk.blocks().is_empty());
        assert!(Arc::ptr_eq(&chunk, &world.chunk(Point3::new(1, 3, 0)).unwrap()));
    }

    #[test]
    fn deferred_world_answers_pending_until_generated() {
        let world = world(GenerationMethod::Empty).deferred();
        let index = Point3::new(0, 0, 1);

        assert!(world.request_chunk(index).ready().is_none());
        assert!(world.request_chunk(index).ready().is_none());
        assert_eq!(world.queued(), 1);

        assert_eq!(world.generate_queued(8), 1);
        assert!(world.request_chunk(index).ready().is_some());
        assert_eq!(world.queued(), 0);
    }

    #[test]
    fn flat_terrain_is_layered() {
        let catalog = BlockCatalog::builtin();
        let world = world(GenerationMethod::Flat { height: 20 });
        let chunk = world.request_chunk(Point3::new(0, 0, 1)).ready().unwrap();

        assert_eq!(chunk.get_block(Point3::new(0, 0, 4)), catalog.id_of("grass").unwrap());
        assert_eq!(chunk.get_block(Point3::new(0, 0, 5)), AIR);

        let deep = world.request_chunk(Point3::new(0, 0, 0)).ready().unwrap();
        assert_eq!(deep.get_block(Point3::new(0, 0, 0)), catalog.id_of("stone").unwrap());
    }

    #[test]
    fn perlin_terrain_wraps_seamlessly() {
        let world = world(GenerationMethod::Perlin);
        let extent = world.planet().block_extent();

        assert_eq!(
            world.generator.perlin_height(0, 5),
            world.generator.perlin_height(extent.x, 5)
        );
        assert_eq!(
            world.generator.perlin_height(3, 0),
            world.generator.perlin_height(3, extent.y)
        );
    }

    #[test]
    fn edits_reach_resident_chunks_only() {
        let world = world(GenerationMethod::Empty);
        assert!(!world.set_block(Point3::new(1, 1, 1), 3));

        world.request_chunk(Point3::new(0, 0, 0));
        assert!(world.set_block(Point3::new(1, 1, 1), 3));
        assert_eq!(world.chunk(Point3::new(0, 0, 0)).unwrap().get_block(Point3::new(1, 1, 1)), 3);
    }

    #[test]
    fn border_edits_notify_the_neighbors() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let world = world(GenerationMethod::Empty);
        let counters: Vec<(ChunkIndex, Arc<AtomicUsize>, _)> = [
            Point3::new(0, 0, 0),
            Point3::new(3, 0, 0),
            Point3::new(1, 0, 0),
            Point3::new(0, 0, 1),
        ]
        .into_iter()
        .map(|index| {
            let chunk = world.request_chunk(index).ready().unwrap();
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = calls.clone();
            let subscription = chunk.subscribe(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
            (index, calls, subscription)
        })
        .collect();
        let calls = |index: ChunkIndex| {
            counters
                .iter()
                .find(|(at, _, _)| *at == index)
                .map_or(0, |(_, calls, _)| calls.load(Ordering::SeqCst))
        };

        // West face of chunk (0, 0, 0): its west neighbor wraps to x = 3.
        assert!(world.set_block(Point3::new(0, 5, 5), 3));
        assert_eq!(calls(Point3::new(0, 0, 0)), 1);
        assert_eq!(calls(Point3::new(3, 0, 0)), 1);
        assert_eq!(calls(Point3::new(1, 0, 0)), 0);

        // An interior edit stays local.
        assert!(world.set_block(Point3::new(5, 5, 5), 3));
        assert_eq!(calls(Point3::new(0, 0, 0)), 2);
        assert_eq!(calls(Point3::new(3, 0, 0)), 1);

        // The top east edge reaches the chunks east and above.
        assert!(world.set_block(Point3::new(15, 5, 15), 3));
        assert_eq!(calls(Point3::new(1, 0, 0)), 1);
        assert_eq!(calls(Point3::new(0, 0, 1)), 1);

        // Unchanged blocks notify nobody.
        assert!(!world.set_block(Point3::new(0, 5, 5), 3));
        assert_eq!(calls(Point3::new(3, 0, 0)), 1);
    }
}
