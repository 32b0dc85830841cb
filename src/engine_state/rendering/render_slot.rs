//! # Render Slots
//!
//! A render slot is one drawable position in the window around the viewer.
//! It is bound to the chunk that currently occupies that position, rebuilds
//! the chunk's mesh on worker threads and draws the last mesh the render
//! thread uploaded.
//!
//! ## State Machine
//!
//! `Unbound → Bound(stale) → Bound(fresh)`. A slot turns stale again when its
//! chunk reports an edit or when it is rebound to another chunk.
//!
//! ## Locking
//!
//! A slot has two locks, always taken in this order:
//! - `state`: binding, resolved chunk and change subscription
//! - `geometry`: the uploaded buffer and the `loaded` flag
//!
//! The geometry lock is held only while a buffer is swapped or drawn, never
//! while meshing. Meshing works on a snapshot of the chunk's grid, so no
//! chunk lock is held either.
//!
//! ## Generations
//!
//! Every rebind bumps the slot's generation under the geometry lock. A mesh
//! built for an older generation is dropped when it reaches the render thread.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cgmath::{Matrix4, Vector3};
use log::{debug, error, warn};

use crate::engine_state::task_management::{Diagnostic, RebuildContext};
use crate::engine_state::voxels::chunk::{ChangeCallback, Chunk, Subscription, CHUNK_DIMENSION};
use crate::engine_state::voxels::coords::ChunkIndex;

use super::meshing::{ChunkMesh, MeshBuilder};
use super::upload::{PendingUpload, UploadError, UploadSink};

/// What a render slot is showing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotBinding {
    /// Nothing; the slot is outside the planet or not yet placed
    Unbound,
    /// The chunk at this index
    Bound(ChunkIndex),
}

/// Per-draw transforms handed to a [`ChunkDrawer`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkTransforms {
    /// Chunk-local to clip space
    pub world_view_projection: Matrix4<f32>,
    /// Chunk-local to shadow map clip space
    pub shadow_world_view_projection: Matrix4<f32>,
}

/// Issues the draw call for one chunk.
pub trait ChunkDrawer<B> {
    /// Draws `index_count` indices of `geometry` with `transforms`.
    fn draw_chunk(&mut self, geometry: &B, index_count: u32, transforms: &ChunkTransforms);
}

/// Proof that the caller runs on the render thread.
///
/// Only [`crate::engine_state::task_management::RenderThread`] hands these
/// out, and it cannot leave the thread that created it.
pub struct RenderThreadToken {
    _not_send: PhantomData<*const ()>,
}

impl RenderThreadToken {
    pub(crate) fn new() -> Self {
        Self {
            _not_send: PhantomData,
        }
    }
}

struct SlotState {
    binding: SlotBinding,
    chunk: Option<Arc<Chunk>>,
    subscription: Option<Subscription>,
    deferred_passes: u32,
    pop_in_reported: bool,
}

struct SlotGeometry<B> {
    buffer: Option<B>,
    vertex_count: u32,
    index_count: u32,
    loaded: bool,
}

/// One drawable position in the window.
pub struct RenderSlot<B> {
    id: usize,
    state: Mutex<SlotState>,
    generation: AtomicU64,
    geometry: Mutex<SlotGeometry<B>>,
    needs_update: AtomicBool,
    queued: AtomicBool,
    rebuilding: AtomicBool,
    rerun: AtomicBool,
    violation_reported: AtomicBool,
}

impl<B: Send + 'static> RenderSlot<B> {
    /// Creates an unbound slot.
    pub fn new(id: usize) -> Self {
        Self {
            id,
            state: Mutex::new(SlotState {
                binding: SlotBinding::Unbound,
                chunk: None,
                subscription: None,
                deferred_passes: 0,
                pop_in_reported: false,
            }),
            generation: AtomicU64::new(0),
            geometry: Mutex::new(SlotGeometry {
                buffer: None,
                vertex_count: 0,
                index_count: 0,
                loaded: false,
            }),
            needs_update: AtomicBool::new(false),
            queued: AtomicBool::new(false),
            rebuilding: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            violation_reported: AtomicBool::new(false),
        }
    }

    /// Position of the slot in the scheduler's slot table.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Current binding.
    pub fn binding(&self) -> SlotBinding {
        self.lock_state().binding
    }

    /// Bound chunk index, if any.
    pub fn bound_index(&self) -> Option<ChunkIndex> {
        match self.binding() {
            SlotBinding::Bound(index) => Some(index),
            SlotBinding::Unbound => None,
        }
    }

    /// Binding generation, bumped on every rebind.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Does the slot wait for a rebuild?
    pub fn needs_update(&self) -> bool {
        self.needs_update.load(Ordering::SeqCst)
    }

    /// Marks the slot stale.
    pub fn mark_stale(&self) {
        self.needs_update.store(true, Ordering::SeqCst);
    }

    /// Has a mesh for the current binding been uploaded?
    pub fn is_loaded(&self) -> bool {
        self.lock_geometry().loaded
    }

    /// Vertex count of the uploaded mesh.
    pub fn vertex_count(&self) -> u32 {
        self.lock_geometry().vertex_count
    }

    /// Index count of the uploaded mesh.
    pub fn index_count(&self) -> u32 {
        self.lock_geometry().index_count
    }

    /// Consecutive rebuilds deferred on pending data.
    pub fn deferred_passes(&self) -> u32 {
        self.lock_state().deferred_passes
    }

    /// Binds the slot to the chunk at `index`.
    ///
    /// Binding the index the slot already shows only re-marks it stale when
    /// nothing has been uploaded for it yet. Binding another index drops the
    /// previous chunk and its change subscription.
    pub fn bind(&self, index: ChunkIndex) {
        let mut state = self.lock_state();
        if state.binding == SlotBinding::Bound(index) {
            if !self.lock_geometry().loaded {
                self.needs_update.store(true, Ordering::SeqCst);
            }
            return;
        }

        state.binding = SlotBinding::Bound(index);
        state.chunk = None;
        state.subscription = None;
        state.deferred_passes = 0;
        state.pop_in_reported = false;
        self.invalidate_geometry();
        self.needs_update.store(true, Ordering::SeqCst);
    }

    /// Resets the slot to `Unbound`.
    pub fn unbind(&self) {
        let mut state = self.lock_state();
        state.binding = SlotBinding::Unbound;
        state.chunk = None;
        state.subscription = None;
        state.deferred_passes = 0;
        state.pop_in_reported = false;
        self.invalidate_geometry();
        self.needs_update.store(false, Ordering::SeqCst);
    }

    /// Rebuilds the mesh of the bound chunk and sends it to the render thread.
    ///
    /// Safe to call from several threads at once: a call that finds another
    /// rebuild in progress asks it to run once more and returns.
    ///
    /// # Returns
    /// `true` if the slot is up to date once the upload is applied
    pub fn rebuild(self: &Arc<Self>, ctx: &RebuildContext<B>) -> bool {
        self.rerun.store(true, Ordering::SeqCst);
        let mut fresh = false;
        loop {
            if self.rebuilding.swap(true, Ordering::SeqCst) {
                return false;
            }
            while self.rerun.swap(false, Ordering::SeqCst) {
                fresh = self.rebuild_once(ctx);
            }
            self.rebuilding.store(false, Ordering::SeqCst);
            if !self.rerun.load(Ordering::SeqCst) {
                return fresh;
            }
        }
    }

    fn rebuild_once(self: &Arc<Self>, ctx: &RebuildContext<B>) -> bool {
        let (index, generation, resolved) = {
            let state = self.lock_state();
            let SlotBinding::Bound(index) = state.binding else {
                self.needs_update.store(false, Ordering::SeqCst);
                return true;
            };
            (index, self.generation(), state.chunk.clone())
        };

        let chunk = match resolved {
            Some(chunk) => chunk,
            None => match self.resolve(ctx, index, generation) {
                Some(chunk) => chunk,
                None => return false,
            },
        };

        if chunk.index() != index {
            self.repair_binding(ctx, index, chunk.index());
            return false;
        }

        self.needs_update.store(false, Ordering::SeqCst);
        // A rebind between the lookup and here would be lost with the flag.
        if self.generation() != generation {
            self.mark_stale();
            return false;
        }
        let grid = chunk.snapshot();
        let mesh = MeshBuilder::new(&ctx.catalog)
            .with_ambient_occlusion(ctx.ambient_occlusion)
            .build(&grid, index, ctx.cache.as_ref());
        let Some(mesh) = mesh else {
            self.needs_update.store(true, Ordering::SeqCst);
            self.defer(ctx, index);
            return false;
        };

        self.lock_state().deferred_passes = 0;
        self.violation_reported.store(false, Ordering::SeqCst);
        let sent = ctx.uploads.dispatch(PendingUpload {
            slot: self.clone(),
            generation,
            mesh,
        });
        if !sent {
            self.needs_update.store(true, Ordering::SeqCst);
            return false;
        }

        !self.needs_update() && self.generation() == generation
    }

    /// Looks up the bound chunk and subscribes to its edits.
    fn resolve(self: &Arc<Self>, ctx: &RebuildContext<B>, index: ChunkIndex, generation: u64) -> Option<Arc<Chunk>> {
        let Some(chunk) = ctx.cache.get_chunk(index) else {
            self.defer(ctx, index);
            return None;
        };
        let subscription = ctx
            .cache
            .source()
            .subscribe_to_changes(&chunk, self.change_callback(ctx));

        let mut state = self.lock_state();
        if state.binding != SlotBinding::Bound(index) || self.generation() != generation {
            return None;
        }
        state.chunk = Some(chunk.clone());
        state.subscription = Some(subscription);
        Some(chunk)
    }

    fn change_callback(self: &Arc<Self>, ctx: &RebuildContext<B>) -> ChangeCallback {
        let slot = Arc::downgrade(self);
        let forced = ctx.forced.clone();
        Arc::new(move |_| {
            if let Some(slot) = slot.upgrade() {
                slot.mark_stale();
                forced.push(slot);
            }
        })
    }

    /// Resets a slot whose chunk reported another index.
    ///
    /// The slot is left stale for the next stale-scan pass. Only the first
    /// violation of a streak is reported; the streak ends with a good rebuild.
    fn repair_binding(&self, ctx: &RebuildContext<B>, bound: ChunkIndex, reported: ChunkIndex) {
        if self.violation_reported.swap(true, Ordering::SeqCst) {
            debug!(
                "Render slot {} still resolves chunk {:?} for {:?}",
                self.id, reported, bound
            );
        } else {
            error!(
                "Render slot {} is bound to chunk {:?} but resolved chunk {:?}; rebinding",
                self.id, bound, reported
            );
            let _ = ctx.diagnostics.send(Diagnostic::InvariantViolation {
                slot: self.id,
                bound,
                reported,
            });
        }
        self.unbind();
        self.bind(bound);
    }

    fn defer(&self, ctx: &RebuildContext<B>, index: ChunkIndex) {
        self.needs_update.store(true, Ordering::SeqCst);
        let mut state = self.lock_state();
        state.deferred_passes += 1;
        debug!(
            "Deferred rebuild of chunk {:?} in slot {}, pass {}",
            index, self.id, state.deferred_passes
        );

        if state.deferred_passes >= ctx.pop_in_warning_passes && !state.pop_in_reported {
            state.pop_in_reported = true;
            warn!(
                "Chunk {:?} has been waiting on pending data for {} passes",
                index, state.deferred_passes
            );
            let _ = ctx.diagnostics.send(Diagnostic::PersistentPopIn {
                index,
                passes: state.deferred_passes,
            });
        }
    }

    /// Uploads `mesh` through `sink` if it was built for the current binding.
    ///
    /// # Returns
    /// `Ok(true)` if the mesh is now drawn, `Ok(false)` if it was stale and
    /// discarded. On error the previous buffer stays and the slot turns stale.
    pub fn apply_upload<S>(&self, sink: &mut S, generation: u64, mesh: &ChunkMesh) -> Result<bool, UploadError>
    where
        S: UploadSink<Buffer = B>,
    {
        let mut geometry = self.lock_geometry();
        if self.generation() != generation {
            return Ok(false);
        }
        if let Err(error) = sink.upload(&mut geometry.buffer, mesh) {
            self.needs_update.store(true, Ordering::SeqCst);
            return Err(error);
        }
        geometry.vertex_count = mesh.vertex_count();
        geometry.index_count = mesh.index_count();
        geometry.loaded = true;
        Ok(true)
    }

    /// Draws the last uploaded mesh, translated by `shift` chunks.
    ///
    /// # Returns
    /// `false` if there was nothing to draw
    pub fn draw(
        &self,
        _token: &RenderThreadToken,
        drawer: &mut impl ChunkDrawer<B>,
        view_projection: Matrix4<f32>,
        shadow_view_projection: Matrix4<f32>,
        shift: Vector3<i32>,
    ) -> bool {
        let geometry = self.lock_geometry();
        if !geometry.loaded || geometry.index_count == 0 {
            return false;
        }
        let Some(buffer) = &geometry.buffer else {
            return false;
        };

        let offset = shift * CHUNK_DIMENSION;
        let world = Matrix4::from_translation(Vector3::new(offset.x as f32, offset.y as f32, offset.z as f32));
        let transforms = ChunkTransforms {
            world_view_projection: view_projection * world,
            shadow_world_view_projection: shadow_view_projection * world,
        };
        drawer.draw_chunk(buffer, geometry.index_count, &transforms);
        true
    }

    /// Claims the slot for the forced queue.
    ///
    /// # Returns
    /// `false` if it is already queued
    pub(crate) fn try_enqueue(&self) -> bool {
        !self.queued.swap(true, Ordering::SeqCst)
    }

    /// Releases the forced queue claim.
    pub(crate) fn dequeued(&self) {
        self.queued.store(false, Ordering::SeqCst);
    }

    fn invalidate_geometry(&self) {
        let mut geometry = self.lock_geometry();
        self.generation.fetch_add(1, Ordering::SeqCst);
        geometry.loaded = false;
    }

    fn lock_state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_geometry(&self) -> MutexGuard<'_, SlotGeometry<B>> {
        self.geometry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B> std::fmt::Debug for RenderSlot<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSlot")
            .field("id", &self.id)
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("needs_update", &self.needs_update.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{channel, Receiver};

    use cgmath::{Point3, SquareMatrix};

    use super::*;
    use crate::engine_state::rendering::upload::{MemoryGeometry, MemoryUploadSink, UploadQueue};
    use crate::engine_state::task_management::ForcedQueue;
    use crate::engine_state::voxels::block::BlockCatalog;
    use crate::engine_state::voxels::chunk::BlockGrid;
    use crate::engine_state::voxels::coords::PlanetSize;
    use crate::engine_state::voxels::source::{ChunkRequest, ChunkSource};
    use crate::engine_state::voxels::window_cache::ChunkWindowCache;

    const STONE: u16 = 3;

    struct Fixture {
        ctx: RebuildContext<MemoryGeometry>,
        uploads: Receiver<PendingUpload<MemoryGeometry>>,
        diagnostics: Receiver<Diagnostic>,
    }

    /// Serves a single stone block in every chunk, optionally lying about indices.
    struct StoneSource {
        misreport: bool,
    }

    impl ChunkSource for StoneSource {
        fn request_chunk(&self, index: ChunkIndex) -> ChunkRequest {
            let mut grid = BlockGrid::empty();
            grid.set(Point3::new(5, 5, 5), STONE);
            let reported = if self.misreport { index + Vector3::new(0, 0, 1) } else { index };
            ChunkRequest::Ready(Arc::new(Chunk::new(reported, grid)))
        }
    }

    fn fixture(misreport: bool) -> Fixture {
        let planet = PlanetSize::new(4, 4, 2);
        let cache = Arc::new(ChunkWindowCache::new(Arc::new(StoneSource { misreport }), planet, 1));
        cache.set_center(cgmath::Point2::new(0, 0));
        cache.load_pending();

        let (uploads, upload_receiver) = UploadQueue::channel();
        let (diagnostics, diagnostic_receiver) = channel();
        Fixture {
            ctx: RebuildContext {
                cache,
                catalog: Arc::new(BlockCatalog::builtin()),
                ambient_occlusion: true,
                uploads,
                forced: Arc::new(ForcedQueue::new()),
                diagnostics,
                pop_in_warning_passes: 3,
            },
            uploads: upload_receiver,
            diagnostics: diagnostic_receiver,
        }
    }

    struct CountingDrawer {
        indices: Vec<u32>,
    }

    impl ChunkDrawer<MemoryGeometry> for CountingDrawer {
        fn draw_chunk(&mut self, geometry: &MemoryGeometry, index_count: u32, _: &ChunkTransforms) {
            assert_eq!(geometry.indices.len() as u32, index_count);
            self.indices.push(index_count);
        }
    }

    #[test]
    fn rebuild_uploads_and_draws() {
        let fixture = fixture(false);
        let slot = Arc::new(RenderSlot::new(0));
        slot.bind(Point3::new(0, 0, 0));
        assert!(slot.needs_update());

        assert!(slot.rebuild(&fixture.ctx));
        let upload = fixture.uploads.try_recv().unwrap();
        assert_eq!(upload.mesh.quad_count(), 6);

        let mut sink = MemoryUploadSink::new();
        assert!(upload.slot.apply_upload(&mut sink, upload.generation, &upload.mesh).unwrap());
        assert!(slot.is_loaded());
        assert_eq!(slot.index_count(), 36);

        let token = RenderThreadToken::new();
        let mut drawer = CountingDrawer { indices: Vec::new() };
        let identity = Matrix4::identity();
        assert!(slot.draw(&token, &mut drawer, identity, identity, Vector3::new(0, 0, 0)));
        assert_eq!(drawer.indices, vec![36]);
    }

    #[test]
    fn rebinding_discards_stale_uploads() {
        let fixture = fixture(false);
        let slot = Arc::new(RenderSlot::new(0));
        slot.bind(Point3::new(0, 0, 0));
        slot.rebuild(&fixture.ctx);
        let upload = fixture.uploads.try_recv().unwrap();

        slot.bind(Point3::new(1, 0, 0));
        let mut sink = MemoryUploadSink::new();
        assert!(!slot.apply_upload(&mut sink, upload.generation, &upload.mesh).unwrap());
        assert!(!slot.is_loaded());
        assert_eq!(sink.uploads(), 0);

        // Same index again keeps the generation.
        let generation = slot.generation();
        slot.bind(Point3::new(1, 0, 0));
        assert_eq!(slot.generation(), generation);
        assert!(slot.needs_update());
    }

    #[test]
    fn chunk_edits_queue_the_slot_once() {
        let fixture = fixture(false);
        let slot = Arc::new(RenderSlot::new(0));
        slot.bind(Point3::new(0, 0, 0));
        slot.rebuild(&fixture.ctx);

        let chunk = fixture.ctx.cache.get_chunk(Point3::new(0, 0, 0)).unwrap();
        assert_eq!(chunk.subscriber_count(), 1);
        chunk.set_block(Point3::new(1, 1, 1), STONE);
        chunk.set_block(Point3::new(2, 1, 1), STONE);

        assert!(slot.needs_update());
        assert_eq!(fixture.ctx.forced.len(), 1);

        slot.unbind();
        assert_eq!(chunk.subscriber_count(), 0);
    }

    #[test]
    fn misreported_chunk_is_repaired_and_reported() {
        let fixture = fixture(true);
        let slot = Arc::new(RenderSlot::new(7));
        slot.bind(Point3::new(0, 0, 0));

        assert!(!slot.rebuild(&fixture.ctx));
        match fixture.diagnostics.try_recv().unwrap() {
            Diagnostic::InvariantViolation { slot: id, bound, reported } => {
                assert_eq!(id, 7);
                assert_eq!(bound, Point3::new(0, 0, 0));
                assert_eq!(reported, Point3::new(0, 0, 1));
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
        assert_eq!(slot.binding(), SlotBinding::Bound(Point3::new(0, 0, 0)));
        assert!(slot.needs_update());
        assert!(fixture.ctx.forced.is_empty());
        assert!(fixture.uploads.try_recv().is_err());
    }

    #[test]
    fn forced_drain_stops_on_a_source_that_keeps_misreporting() {
        let fixture = fixture(true);
        let slot = Arc::new(RenderSlot::new(3));
        slot.bind(Point3::new(0, 0, 0));
        fixture.ctx.forced.push(slot.clone());

        let cancelled = AtomicBool::new(false);
        assert_eq!(fixture.ctx.drain_forced(&cancelled), 1);
        assert!(fixture.ctx.forced.is_empty());
        assert!(slot.needs_update());

        // Later stale-scan passes retry without reporting again.
        for _ in 0..5 {
            assert!(!slot.rebuild(&fixture.ctx));
        }
        assert_eq!(fixture.diagnostics.try_iter().count(), 1);
        assert!(fixture.ctx.forced.is_empty());
    }

    #[test]
    fn failed_upload_keeps_the_previous_buffer() {
        let fixture = fixture(false);
        let slot = Arc::new(RenderSlot::new(0));
        slot.bind(Point3::new(0, 0, 0));
        slot.rebuild(&fixture.ctx);
        let first = fixture.uploads.try_recv().unwrap();
        slot.apply_upload(&mut MemoryUploadSink::new(), first.generation, &first.mesh)
            .unwrap();

        let mut tiny = MemoryUploadSink::with_limit(16);
        assert!(slot.apply_upload(&mut tiny, first.generation, &first.mesh).is_err());
        assert!(slot.needs_update());
        assert!(slot.is_loaded());
        assert_eq!(slot.index_count(), 36);
    }

    #[test]
    fn unbound_slot_draws_nothing() {
        let slot: RenderSlot<MemoryGeometry> = RenderSlot::new(0);
        let mut drawer = CountingDrawer { indices: Vec::new() };
        let identity = Matrix4::identity();
        assert!(!slot.draw(&RenderThreadToken::new(), &mut drawer, identity, identity, Vector3::new(0, 0, 0)));
        assert!(drawer.indices.is_empty());
    }
}
