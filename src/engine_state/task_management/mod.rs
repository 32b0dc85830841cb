//! # Regeneration Scheduling
//!
//! This module keeps the render slots of the window in step with the chunks
//! around the viewer, using a fixed set of background threads.
//!
//! ## Architecture Overview
//!
//! - `RegenerationScheduler`: Owns the slot table and the worker threads
//! - `RenderThread`: The `!Send` half that applies uploads and draws
//! - `ForcedQueue`: FIFO of slots whose chunk was edited
//! - `ResetEvent`: The auto-reset signal every loop blocks on
//! - `Diagnostic`: Anomalies reported back to the owner
//!
//! ## Threads
//!
//! - **Recentre** (one): Moves the window when the viewer changes column,
//!   rebinds every slot to its new position, re-sorts the slot list and wakes
//!   the stale scanners. It then services stripe 0 itself.
//! - **Stale scan** (N): Worker `k` walks stripe `k` of the sorted list, the
//!   slots `k, k + n, k + 2n, …`, and rebuilds those that are stale.
//! - **Forced** (one): Drains the forced queue in FIFO order.
//! - **Render** (the caller): Applies uploads and issues draw calls.
//!
//! ## Task Lifecycle
//! 1. The caller polls `update()` once per frame
//! 2. A column change sets the recentre event
//! 3. Workers mesh stale slots and push uploads to the render thread
//! 4. The render thread applies them in `apply_uploads()` and draws
//! 5. Slots left stale by pending data are retried on the retry interval
//!
//! ## Performance Considerations
//! - Stripes interleave the sorted list, so every worker starts near the viewer
//! - A slot is queued for a forced rebuild at most once at a time
//! - Slot locks are never held while meshing

pub mod reset_event;

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cgmath::Point3;
use log::{error, info, warn};
use web_time::Instant;

use crate::core::MtResource;

use super::camera_state::{CameraView, ViewerFeed, VisibilitySphere};
use super::rendering::render_slot::{ChunkDrawer, RenderSlot, RenderThreadToken, SlotBinding};
use super::rendering::upload::{PendingUpload, UploadQueue, UploadSink};
use super::voxels::block::BlockCatalog;
use super::voxels::coords::{column_of, ChunkIndex, PlanetSize};
use super::voxels::window_cache::ChunkWindowCache;

pub use reset_event::ResetEvent;

/// Anomalies the scheduler reports to its owner.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// A slot resolved a chunk whose own index differs from the binding
    InvariantViolation {
        /// Slot id
        slot: usize,
        /// Index the slot was bound to
        bound: ChunkIndex,
        /// Index the resolved chunk reported
        reported: ChunkIndex,
    },
    /// A chunk stayed undrawable for many passes because data was pending
    PersistentPopIn {
        /// The chunk
        index: ChunkIndex,
        /// Consecutive deferred passes
        passes: u32,
    },
    /// The upload sink refused a mesh
    UploadFailed {
        /// The chunk, if the slot was still bound
        index: Option<ChunkIndex>,
        /// The sink's error message
        error: String,
    },
}

/// Number of stale-scan workers for a machine with `parallelism` hardware threads.
///
/// Small machines keep most cores for the render thread; large ones leave
/// four threads free. Never less than one.
pub fn default_stale_workers(parallelism: usize) -> usize {
    let workers = if parallelism <= 4 {
        parallelism / 3
    } else {
        parallelism - 4
    };
    workers.max(1)
}

/// Positions in a list of `len` entries served by stripe `stripe` of `stripes`.
pub fn stripe_positions(len: usize, stripe: usize, stripes: usize) -> impl Iterator<Item = usize> {
    (stripe..len).step_by(stripes.max(1))
}

/// Orders bindings by ascending toroidal distance from `viewer`, unbound last.
///
/// # Returns
/// Positions into `bindings`, nearest first. Ties keep their original order.
pub fn priority_order(bindings: &[SlotBinding], planet: PlanetSize, viewer: ChunkIndex) -> Vec<usize> {
    let mut order: Vec<usize> = (0..bindings.len()).collect();
    order.sort_by_cached_key(|&position| match bindings[position] {
        SlotBinding::Bound(index) => (false, planet.distance_squared(viewer, index)),
        SlotBinding::Unbound => (true, 0),
    });
    order
}

/// FIFO of slots whose chunks changed, plus the event that wakes its worker.
pub struct ForcedQueue<B> {
    slots: Mutex<VecDeque<Arc<RenderSlot<B>>>>,
    event: ResetEvent,
}

impl<B: Send + 'static> ForcedQueue<B> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(VecDeque::new()),
            event: ResetEvent::new(),
        }
    }

    /// Queues `slot` unless it is already queued, and wakes the worker.
    ///
    /// # Returns
    /// `true` if the slot was added
    pub fn push(&self, slot: Arc<RenderSlot<B>>) -> bool {
        if !slot.try_enqueue() {
            return false;
        }
        self.lock().push_back(slot);
        self.event.set();
        true
    }

    /// Takes the oldest slot. It may be queued again from here on.
    pub fn pop(&self) -> Option<Arc<RenderSlot<B>>> {
        let slot = self.lock().pop_front()?;
        slot.dequeued();
        Some(slot)
    }

    /// Number of queued slots.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The event the forced worker waits on.
    pub fn event(&self) -> &ResetEvent {
        &self.event
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<RenderSlot<B>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: Send + 'static> Default for ForcedQueue<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a slot needs to rebuild itself on a worker thread.
pub struct RebuildContext<B> {
    /// The window the chunks come from
    pub cache: Arc<ChunkWindowCache>,
    /// Block definitions for meshing
    pub catalog: Arc<BlockCatalog>,
    /// Whether meshes get ambient occlusion
    pub ambient_occlusion: bool,
    /// Where finished meshes go
    pub uploads: UploadQueue<B>,
    /// Where edited chunks' slots go
    pub forced: Arc<ForcedQueue<B>>,
    /// Where anomalies go
    pub diagnostics: Sender<Diagnostic>,
    /// Deferred passes before a persistent pop-in is reported
    pub pop_in_warning_passes: u32,
}

impl<B: Send + 'static> RebuildContext<B> {
    /// Rebuilds queued slots in FIFO order until the forced queue is empty.
    ///
    /// A rebuild never queues its own slot again; only chunk edits do.
    ///
    /// # Returns
    /// The number of slots rebuilt
    pub fn drain_forced(&self, cancelled: &AtomicBool) -> usize {
        let mut rebuilt = 0;
        while let Some(slot) = self.forced.pop() {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            slot.rebuild(self);
            rebuilt += 1;
        }
        rebuilt
    }
}

/// Tuning knobs of the scheduler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerOptions {
    /// Number of stale-scan threads
    pub stale_workers: usize,
    /// How often `update` retries while stale slots remain
    pub retry_interval: Duration,
    /// Whether meshes get ambient occlusion
    pub ambient_occlusion: bool,
    /// Deferred passes before a persistent pop-in is reported
    pub pop_in_warning_passes: u32,
    /// Near plane distance, sizes the visibility sphere
    pub near_plane: f32,
}

/// Counts of one `apply_uploads` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadStats {
    /// Meshes now drawn
    pub applied: usize,
    /// Meshes built for an outdated binding
    pub discarded: usize,
    /// Meshes the sink refused
    pub failed: usize,
}

/// Slot counts for progress reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotSummary {
    /// Total slots
    pub total: usize,
    /// Slots bound to a chunk
    pub bound: usize,
    /// Slots showing a mesh for their binding
    pub loaded: usize,
    /// Slots waiting for a rebuild
    pub stale: usize,
}

struct Shared<B: Send + 'static> {
    ctx: RebuildContext<B>,
    viewer: Arc<dyn ViewerFeed>,
    slots: Vec<Arc<RenderSlot<B>>>,
    ordered: MtResource<Arc<Vec<Arc<RenderSlot<B>>>>>,
    layers: i32,
    stripes: usize,
    recentre_event: ResetEvent,
    stale_events: Vec<ResetEvent>,
    cancelled: AtomicBool,
    center_changed: AtomicBool,
}

impl<B: Send + 'static> Shared<B> {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn recentre_pass(&self) {
        let cache = &self.ctx.cache;
        let viewer = cache.planet().normalize_chunk(self.viewer.current_chunk());

        let recenter = cache.set_center(column_of(viewer));
        cache.load_pending();

        if recenter.changed {
            if let Some(center) = cache.center() {
                for column in cache.window_columns(center) {
                    let first = cache.slot_of(column) * self.layers as usize;
                    for z in 0..self.layers {
                        self.slots[first + z as usize].bind(Point3::new(column.x, column.y, z));
                    }
                }
            }
            self.center_changed.store(true, Ordering::SeqCst);
        }

        self.sort(viewer);
        self.stale_events.iter().for_each(ResetEvent::set);
        self.service_stripe(0);
    }

    fn sort(&self, viewer: ChunkIndex) {
        let bindings: Vec<SlotBinding> = self.slots.iter().map(|slot| slot.binding()).collect();
        let ordered = priority_order(&bindings, self.ctx.cache.planet(), viewer)
            .into_iter()
            .map(|position| self.slots[position].clone())
            .collect();
        *self.ordered.get_mut() = Arc::new(ordered);
    }

    fn service_stripe(&self, stripe: usize) {
        let ordered = self.ordered.get().clone();
        for position in stripe_positions(ordered.len(), stripe, self.stripes) {
            if self.is_cancelled() {
                return;
            }
            let slot = &ordered[position];
            if slot.needs_update() {
                slot.rebuild(&self.ctx);
            }
        }
    }

    fn drain_forced(&self) {
        self.ctx.drain_forced(&self.cancelled);
    }
}

/// Keeps the window's render slots meshed around the viewer.
pub struct RegenerationScheduler<B: Send + 'static> {
    shared: Arc<Shared<B>>,
    workers: Vec<JoinHandle<()>>,
    last_viewer: Option<ChunkIndex>,
    last_retry: Instant,
    retry_interval: Duration,
}

impl<B: Send + 'static> RegenerationScheduler<B> {
    /// Creates the slot table and starts the worker threads.
    ///
    /// # Arguments
    /// * `cache` - The chunk window the slots mirror
    /// * `catalog` - Block definitions for meshing
    /// * `viewer` - Where the viewer is
    /// * `options` - Worker count and tuning
    ///
    /// # Returns
    /// The scheduler and the render-thread half that must stay on the
    /// calling thread
    pub fn start(
        cache: Arc<ChunkWindowCache>,
        catalog: Arc<BlockCatalog>,
        viewer: Arc<dyn ViewerFeed>,
        options: SchedulerOptions,
    ) -> io::Result<(Self, RenderThread<B>)> {
        let (uploads, upload_receiver) = UploadQueue::channel();
        let (diagnostics, diagnostic_receiver) = channel();
        let layers = cache.planet().z;
        let span = cache.span();
        let slot_count = cache.slot_count() * layers as usize;
        let stale_workers = options.stale_workers.max(1);

        let slots: Vec<Arc<RenderSlot<B>>> = (0..slot_count).map(|id| Arc::new(RenderSlot::new(id))).collect();
        let shared = Arc::new(Shared {
            ctx: RebuildContext {
                cache,
                catalog,
                ambient_occlusion: options.ambient_occlusion,
                uploads,
                forced: Arc::new(ForcedQueue::new()),
                diagnostics: diagnostics.clone(),
                pop_in_warning_passes: options.pop_in_warning_passes,
            },
            viewer,
            ordered: MtResource::new(Arc::new(slots.clone())),
            slots,
            layers,
            stripes: stale_workers + 1,
            recentre_event: ResetEvent::new(),
            stale_events: (0..stale_workers).map(|_| ResetEvent::new()).collect(),
            cancelled: AtomicBool::new(false),
            center_changed: AtomicBool::new(false),
        });

        let mut scheduler = Self {
            shared: shared.clone(),
            workers: Vec::with_capacity(stale_workers + 2),
            last_viewer: None,
            last_retry: Instant::now(),
            retry_interval: options.retry_interval,
        };

        scheduler.spawn("chunk-recentre", |shared| loop {
            shared.recentre_event.wait();
            if shared.is_cancelled() {
                break;
            }
            shared.recentre_pass();
        })?;
        for stripe in 1..=stale_workers {
            scheduler.spawn(&format!("chunk-stale-{}", stripe), move |shared| loop {
                shared.stale_events[stripe - 1].wait();
                if shared.is_cancelled() {
                    break;
                }
                shared.service_stripe(stripe);
            })?;
        }
        scheduler.spawn("chunk-forced", |shared| loop {
            shared.ctx.forced.event().wait();
            if shared.is_cancelled() {
                break;
            }
            shared.drain_forced();
        })?;

        info!(
            "Started {} render slots with {} stale-scan workers",
            slot_count, stale_workers
        );

        let render_thread = RenderThread {
            shared,
            uploads: upload_receiver,
            diagnostics: diagnostic_receiver,
            diagnostic_sender: diagnostics,
            sphere: VisibilitySphere::new(span, options.near_plane),
            token: RenderThreadToken::new(),
        };
        Ok((scheduler, render_thread))
    }

    fn spawn<F>(&mut self, name: &str, body: F) -> io::Result<()>
    where
        F: FnOnce(&Shared<B>) + Send + 'static,
    {
        let shared = self.shared.clone();
        let thread_name = name.to_string();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            info!("Worker {} started", thread_name);
            body(&shared);
            info!("Worker {} stopped", thread_name);
        })?;
        self.workers.push(handle);
        Ok(())
    }

    /// Polls the viewer and wakes workers as needed. Call once per frame.
    ///
    /// A viewer in a new chunk triggers a recentre pass right away. Otherwise
    /// a pass is triggered every retry interval while stale slots remain.
    pub fn update(&mut self) {
        let viewer = self.shared.viewer.current_chunk();
        if self.last_viewer != Some(viewer) {
            self.last_viewer = Some(viewer);
            self.last_retry = Instant::now();
            self.shared.recentre_event.set();
            return;
        }

        if self.last_retry.elapsed() >= self.retry_interval {
            self.last_retry = Instant::now();
            if self.shared.slots.iter().any(|slot| slot.needs_update()) {
                self.shared.recentre_event.set();
            }
        }
    }

    /// The window the slots mirror.
    pub fn cache(&self) -> &Arc<ChunkWindowCache> {
        &self.shared.ctx.cache
    }

    /// All slots in table order.
    pub fn slots(&self) -> &[Arc<RenderSlot<B>>] {
        &self.shared.slots
    }

    /// Slots in the current priority order.
    pub fn ordered_slots(&self) -> Arc<Vec<Arc<RenderSlot<B>>>> {
        self.shared.ordered.get().clone()
    }

    /// Counts bound, loaded and stale slots.
    pub fn slot_summary(&self) -> SlotSummary {
        self.shared.slots.iter().fold(
            SlotSummary {
                total: self.shared.slots.len(),
                ..SlotSummary::default()
            },
            |mut summary, slot| {
                if slot.bound_index().is_some() {
                    summary.bound += 1;
                }
                if slot.is_loaded() {
                    summary.loaded += 1;
                }
                if slot.needs_update() {
                    summary.stale += 1;
                }
                summary
            },
        )
    }

    /// Stops and joins every worker. In-flight rebuilds finish first.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.recentre_event.set();
        self.shared.stale_events.iter().for_each(ResetEvent::set);
        self.shared.ctx.forced.event().set();

        let count = self.workers.len();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("A chunk worker panicked before shutdown");
            }
        }
        info!("Stopped {} chunk workers", count);
    }
}

impl<B: Send + 'static> Drop for RegenerationScheduler<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The render-thread half of the scheduler.
///
/// Holds the only receiver of finished meshes and the only
/// [`RenderThreadToken`], and is neither `Send` nor `Sync`, so uploads and
/// draws happen on the thread that started the scheduler.
pub struct RenderThread<B: Send + 'static> {
    shared: Arc<Shared<B>>,
    uploads: Receiver<PendingUpload<B>>,
    diagnostics: Receiver<Diagnostic>,
    diagnostic_sender: Sender<Diagnostic>,
    sphere: VisibilitySphere,
    token: RenderThreadToken,
}

impl<B: Send + 'static> RenderThread<B> {
    /// Applies every finished mesh through `sink`.
    pub fn apply_uploads<S>(&mut self, sink: &mut S) -> UploadStats
    where
        S: UploadSink<Buffer = B>,
    {
        let mut stats = UploadStats::default();
        while let Ok(upload) = self.uploads.try_recv() {
            match upload.slot.apply_upload(sink, upload.generation, &upload.mesh) {
                Ok(true) => stats.applied += 1,
                Ok(false) => stats.discarded += 1,
                Err(error) => {
                    stats.failed += 1;
                    let index = upload.slot.bound_index();
                    warn!("Upload for chunk {:?} failed: {}", index, error);
                    let _ = self.diagnostic_sender.send(Diagnostic::UploadFailed {
                        index,
                        error: error.to_string(),
                    });
                }
            }
        }
        stats
    }

    /// Draws every loaded slot inside the visibility sphere.
    ///
    /// # Returns
    /// The number of chunks drawn
    pub fn draw_chunks(&self, drawer: &mut impl ChunkDrawer<B>, view: &CameraView) -> usize {
        let planet = self.shared.ctx.cache.planet();
        let mut drawn = 0;
        for slot in &self.shared.slots {
            let Some(bound) = slot.bound_index() else {
                continue;
            };
            let shift = planet.shortest_offset(view.viewer_chunk, bound);
            if !self.sphere.contains(shift, view.eye, view.direction) {
                continue;
            }
            if slot.draw(
                &self.token,
                drawer,
                view.view_projection,
                view.shadow_view_projection,
                shift,
            ) {
                drawn += 1;
            }
        }
        drawn
    }

    /// Reports whether the window recentred since the last call.
    pub fn take_center_changed(&self) -> bool {
        self.shared.center_changed.swap(false, Ordering::SeqCst)
    }

    /// Takes every pending diagnostic.
    pub fn drain_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.try_iter().collect()
    }
}
