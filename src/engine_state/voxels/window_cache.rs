//! # Chunk Window Cache
//!
//! The resident set of chunks around the viewer.
//!
//! ## Architecture
//!
//! The window is `2^view_range` columns on each side and holds one chunk per
//! Z layer of each column. A global column maps to the slot
//! `(x & mask) + ((y & mask) << view_range)`, so when the window slides by one
//! column only the slots of the trailing edge are handed to the leading edge;
//! every other slot keeps its chunks untouched.
//!
//! ## Concurrency
//!
//! Which column a slot holds is written only by [`ChunkWindowCache::set_center`],
//! which the recentre thread owns. Mesh workers read concurrently and may see
//! a slot mid-transition: a lookup whose column does not match answers
//! "not available" rather than handing out the wrong chunk. Filling a missing
//! layer of an already-assigned column is the only other write and never
//! changes the column mapping.
//!
//! ## Pending Chunks
//!
//! A chunk the source cannot deliver yet is simply absent. `get_chunk` returns
//! `None`, `block_at` returns `None` for positions it needs, and the slot keeps
//! reporting `needs_reload` until the layer arrives.

use std::sync::Arc;

use cgmath::Point2;
use log::{debug, info};

use crate::core::MtResource;

use super::block::{BlockId, AIR};
use super::chunk::Chunk;
use super::coords::{column_of, split_block_index, BlockIndex, ChunkIndex, ColumnIndex, PlanetSize};
use super::source::ChunkSource;

/// Resolves global block positions, possibly outside the chunk being meshed.
pub trait BlockAccess {
    /// Block at a global position, or `None` while its chunk is pending.
    fn block_at(&self, global: BlockIndex) -> Option<BlockId>;
}

impl<F> BlockAccess for F
where
    F: Fn(BlockIndex) -> Option<BlockId>,
{
    fn block_at(&self, global: BlockIndex) -> Option<BlockId> {
        self(global)
    }
}

/// Outcome of [`ChunkWindowCache::set_center`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recenter {
    /// Whether the center moved
    pub changed: bool,
    /// Slots now holding a different column
    pub reassigned: Vec<usize>,
}

struct WindowColumn {
    column: Option<ColumnIndex>,
    layers: Vec<Option<Arc<Chunk>>>,
}

impl WindowColumn {
    fn needs_reload(&self) -> bool {
        self.column.is_some() && self.layers.iter().any(Option::is_none)
    }
}

/// Toroidally indexed window of chunk columns around a center column.
pub struct ChunkWindowCache {
    source: Arc<dyn ChunkSource>,
    planet: PlanetSize,
    view_range: u32,
    span: i32,
    mask: i32,
    columns: Vec<MtResource<WindowColumn>>,
    center: MtResource<Option<ColumnIndex>>,
}

impl ChunkWindowCache {
    /// Creates an empty window.
    ///
    /// `planet.x` and `planet.y` must be multiples of `2^view_range` so that
    /// wrapping never maps two window columns onto one slot; the streaming
    /// config checks this before the cache is built.
    pub fn new(source: Arc<dyn ChunkSource>, planet: PlanetSize, view_range: u32) -> Self {
        let span = 1 << view_range;
        debug_assert!(planet.x % span == 0 && planet.y % span == 0);

        let columns = (0..span * span)
            .map(|_| {
                MtResource::new(WindowColumn {
                    column: None,
                    layers: vec![None; planet.z as usize],
                })
            })
            .collect();

        Self {
            source,
            planet,
            view_range,
            span,
            mask: span - 1,
            columns,
            center: MtResource::new(None),
        }
    }

    /// The chunk source behind the window.
    pub fn source(&self) -> &Arc<dyn ChunkSource> {
        &self.source
    }

    /// The planet the window moves over.
    pub fn planet(&self) -> PlanetSize {
        self.planet
    }

    /// Window side length exponent.
    pub fn view_range(&self) -> u32 {
        self.view_range
    }

    /// Columns per window side.
    pub fn span(&self) -> i32 {
        self.span
    }

    /// Number of column slots.
    pub fn slot_count(&self) -> usize {
        self.columns.len()
    }

    /// Current center column, `None` before the first `set_center`.
    pub fn center(&self) -> Option<ColumnIndex> {
        *self.center.get()
    }

    /// Slot a global column maps to.
    pub fn slot_of(&self, column: ColumnIndex) -> usize {
        let column = self.planet.normalize_column(column);
        ((column.x & self.mask) + ((column.y & self.mask) << self.view_range)) as usize
    }

    /// Column currently assigned to `slot`.
    pub fn slot_column(&self, slot: usize) -> Option<ColumnIndex> {
        self.columns.get(slot).and_then(|column| column.get().column)
    }

    /// Whether `slot` is assigned and still misses at least one layer.
    pub fn needs_reload(&self, slot: usize) -> bool {
        self.columns
            .get(slot)
            .is_some_and(|column| column.get().needs_reload())
    }

    /// Global columns covered by a window centered on `center`, row by row.
    pub fn window_columns(&self, center: ColumnIndex) -> impl Iterator<Item = ColumnIndex> + '_ {
        let half = self.span / 2;
        (0..self.span).flat_map(move |dy| {
            (0..self.span).map(move |dx| {
                self.planet
                    .normalize_column(Point2::new(center.x + dx - half, center.y + dy - half))
            })
        })
    }

    /// Is `column` covered by the current window?
    pub fn contains_column(&self, column: ColumnIndex) -> bool {
        let column = self.planet.normalize_column(column);
        self.slot_column(self.slot_of(column)) == Some(column)
    }

    /// Recenters the window on `center`.
    ///
    /// Slots whose wrapped index still maps to the same global column keep
    /// their chunks; every other slot is reassigned and emptied.
    pub fn set_center(&self, center: ColumnIndex) -> Recenter {
        let center = self.planet.normalize_column(center);
        let mut current = self.center.get_mut();
        if *current == Some(center) {
            return Recenter::default();
        }

        let mut reassigned = Vec::new();
        for column in self.window_columns(center) {
            let slot = self.slot_of(column);
            let mut entry = self.columns[slot].get_mut();
            if entry.column != Some(column) {
                entry.column = Some(column);
                entry.layers.iter_mut().for_each(|layer| *layer = None);
                reassigned.push(slot);
            }
        }

        info!(
            "Window recentered from {:?} to {:?}, {} of {} columns reassigned",
            *current,
            center,
            reassigned.len(),
            self.columns.len()
        );
        *current = Some(center);

        Recenter {
            changed: true,
            reassigned,
        }
    }

    /// Requests every missing layer of every assigned column from the source.
    ///
    /// # Returns
    /// The number of chunks that became resident
    pub fn load_pending(&self) -> usize {
        let mut loaded = 0;
        for slot in 0..self.columns.len() {
            let missing: Vec<ChunkIndex> = {
                let entry = self.columns[slot].get();
                let Some(column) = entry.column else {
                    continue;
                };
                entry
                    .layers
                    .iter()
                    .enumerate()
                    .filter(|(_, layer)| layer.is_none())
                    .map(|(z, _)| ChunkIndex::new(column.x, column.y, z as i32))
                    .collect()
            };

            for index in missing {
                if self.fetch(slot, index).is_some() {
                    loaded += 1;
                }
            }
        }
        if loaded > 0 {
            debug!("Loaded {} pending chunks into the window", loaded);
        }
        loaded
    }

    /// Resident chunk at `index`, never asking the source.
    pub fn resident_chunk(&self, index: ChunkIndex) -> Option<Arc<Chunk>> {
        if !self.planet.contains_layer(index.z) {
            return None;
        }
        let index = self.planet.normalize_chunk(index);
        let entry = self.columns[self.slot_of(column_of(index))].get();
        if entry.column != Some(column_of(index)) {
            return None;
        }
        entry.layers[index.z as usize].clone()
    }

    /// Chunk at `index`.
    ///
    /// Inside the window a miss is requested from the source and stored in
    /// its slot. Outside the window the source is asked directly and the
    /// answer is not cached. `None` means the chunk is pending or lies above
    /// or below the planet.
    pub fn get_chunk(&self, index: ChunkIndex) -> Option<Arc<Chunk>> {
        if !self.planet.contains_layer(index.z) {
            return None;
        }
        let index = self.planet.normalize_chunk(index);
        let column = column_of(index);
        let slot = self.slot_of(column);

        {
            let entry = self.columns[slot].get();
            if entry.column != Some(column) {
                drop(entry);
                return self.source.request_chunk(index).ready();
            }
            if let Some(chunk) = &entry.layers[index.z as usize] {
                return Some(chunk.clone());
            }
        }

        self.fetch(slot, index)
    }

    /// Block at a global position; air when its chunk is not resident.
    pub fn get_block(&self, global: BlockIndex) -> BlockId {
        let (index, local) = split_block_index(global);
        self.resident_chunk(index)
            .map_or(AIR, |chunk| chunk.get_block(local))
    }

    fn fetch(&self, slot: usize, index: ChunkIndex) -> Option<Arc<Chunk>> {
        let chunk = self.source.request_chunk(index).ready()?;

        let mut entry = self.columns[slot].get_mut();
        if entry.column != Some(column_of(index)) {
            return Some(chunk);
        }
        let layer = &mut entry.layers[index.z as usize];
        Some(layer.get_or_insert(chunk).clone())
    }
}

impl BlockAccess for ChunkWindowCache {
    /// Above and below the planet, and outside the window, is air. Inside the
    /// window a missing chunk is requested and `None` returned while it is pending.
    fn block_at(&self, global: BlockIndex) -> Option<BlockId> {
        let (index, local) = split_block_index(global);
        if !self.planet.contains_layer(index.z) || !self.contains_column(column_of(index)) {
            return Some(AIR);
        }
        self.get_chunk(index).map(|chunk| chunk.get_block(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::chunk::CHUNK_DIMENSION;
    use crate::engine_state::voxels::source::ChunkRequest;
    use cgmath::Point3;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Source that serves empty chunks, except for indices marked pending.
    #[derive(Default)]
    struct TestSource {
        pending: Mutex<HashSet<ChunkIndex>>,
        requests: Mutex<Vec<ChunkIndex>>,
    }

    impl ChunkSource for TestSource {
        fn request_chunk(&self, index: ChunkIndex) -> ChunkRequest {
            self.requests.lock().unwrap().push(index);
            if self.pending.lock().unwrap().contains(&index) {
                ChunkRequest::Pending
            } else {
                let chunk = Chunk::empty(index);
                chunk.set_block(Point3::new(0, 0, 0), 1);
                ChunkRequest::Ready(Arc::new(chunk))
            }
        }
    }

    fn cache(source: Arc<TestSource>) -> ChunkWindowCache {
        ChunkWindowCache::new(source, PlanetSize::new(16, 16, 2), 2)
    }

    #[test]
    fn slots_wrap_with_the_mask() {
        let cache = cache(Arc::default());

        assert_eq!(cache.span(), 4);
        assert_eq!(cache.slot_count(), 16);
        assert_eq!(cache.slot_of(Point2::new(0, 0)), 0);
        assert_eq!(cache.slot_of(Point2::new(5, 0)), 1);
        assert_eq!(cache.slot_of(Point2::new(-1, 1)), 3 + 4);
    }

    #[test]
    fn one_column_move_only_reassigns_the_trailing_edge() {
        let cache = cache(Arc::default());
        assert!(cache.set_center(Point2::new(0, 0)).changed);
        assert_eq!(cache.load_pending(), 32);

        let before: Vec<Option<Arc<Chunk>>> = (0..cache.slot_count())
            .map(|slot| {
                let column = cache.slot_column(slot).unwrap();
                cache.resident_chunk(Point3::new(column.x, column.y, 0))
            })
            .collect();
        assert!((0..cache.slot_count()).all(|slot| !cache.needs_reload(slot)));

        let recenter = cache.set_center(Point2::new(1, 0));
        assert!(recenter.changed);
        assert_eq!(recenter.reassigned.len(), cache.span() as usize);

        for slot in 0..cache.slot_count() {
            let column = cache.slot_column(slot).unwrap();
            if recenter.reassigned.contains(&slot) {
                // The column that fell off the west edge went to the east edge.
                assert_eq!(column.x, 2);
                assert!(cache.needs_reload(slot));
            } else {
                assert!(!cache.needs_reload(slot));
                let now = cache.resident_chunk(Point3::new(column.x, column.y, 0)).unwrap();
                assert!(Arc::ptr_eq(before[slot].as_ref().unwrap(), &now));
            }
        }
    }

    #[test]
    fn recentering_on_the_same_column_is_a_no_op() {
        let cache = cache(Arc::default());
        cache.set_center(Point2::new(3, 3));

        assert_eq!(cache.set_center(Point2::new(3 + 16, 3)), Recenter::default());
        assert_eq!(cache.center(), Some(Point2::new(3, 3)));
    }

    #[test]
    fn pending_chunks_are_absent_not_errors() {
        let source = Arc::new(TestSource::default());
        source.pending.lock().unwrap().insert(Point3::new(0, 0, 1));
        let cache = cache(source.clone());
        cache.set_center(Point2::new(0, 0));

        assert_eq!(cache.load_pending(), 31);
        let slot = cache.slot_of(Point2::new(0, 0));
        assert!(cache.needs_reload(slot));
        assert!(cache.get_chunk(Point3::new(0, 0, 1)).is_none());
        assert_eq!(cache.block_at(Point3::new(0, 0, CHUNK_DIMENSION)), None);
        assert_eq!(cache.get_block(Point3::new(0, 0, CHUNK_DIMENSION)), AIR);

        source.pending.lock().unwrap().clear();
        assert!(cache.get_chunk(Point3::new(0, 0, 1)).is_some());
        assert!(!cache.needs_reload(slot));
        assert_eq!(cache.get_block(Point3::new(0, 0, CHUNK_DIMENSION)), 1);
    }

    #[test]
    fn outside_the_window_is_served_but_not_cached() {
        let source = Arc::new(TestSource::default());
        let cache = cache(source.clone());
        cache.set_center(Point2::new(0, 0));

        let far = Point3::new(8, 8, 0);
        assert!(!cache.contains_column(Point2::new(8, 8)));
        assert!(cache.get_chunk(far).is_some());
        assert!(cache.resident_chunk(far).is_none());
        assert_eq!(cache.block_at(Point3::new(8 * CHUNK_DIMENSION, 8 * CHUNK_DIMENSION, 0)), Some(AIR));
        assert_eq!(cache.block_at(Point3::new(0, 0, -1)), Some(AIR));
        assert!(cache.get_chunk(Point3::new(0, 0, 2)).is_none());
    }
}
