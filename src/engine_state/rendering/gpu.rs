//! # GPU Backend
//!
//! `wgpu` implementations of the upload and draw seams:
//! - [`WgpuUploadSink`] copies meshes into vertex and index buffers
//! - [`RenderPassDrawer`] records one indexed draw per chunk
//! - [`ChunkPipeline`] and [`OffscreenFrame`] render chunks without a window
//!
//! ## Architecture
//!
//! Chunk transforms are passed as push constants, two matrices per draw, so
//! no uniform buffer has to be rewritten between chunks. Devices without
//! `PUSH_CONSTANTS` can still use the upload sink with their own drawer.
//!
//! ## Performance Considerations
//!
//! Buffers grow with a quarter of headroom and are reused in place while the
//! mesh fits, so edits to a chunk rarely reallocate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info};

use super::meshing::ChunkMesh;
use super::render_slot::{ChunkDrawer, ChunkTransforms};
use super::texture::Texture;
use super::upload::{mesh_bytes, UploadError, UploadSink};
use super::vertex::Vertex;

/// Bytes of push constants one draw needs.
pub const PUSH_CONSTANT_BYTES: u32 = std::mem::size_of::<[[[f32; 4]; 4]; 2]>() as u32;

/// A chunk's vertex and index buffers on the device.
#[derive(Debug)]
pub struct GpuGeometry {
    /// Vertex buffer
    pub vertex_buffer: wgpu::Buffer,
    /// Index buffer, `u32` indices
    pub index_buffer: wgpu::Buffer,
}

impl GpuGeometry {
    /// Bytes the vertex buffer can hold.
    pub fn vertex_capacity(&self) -> u64 {
        self.vertex_buffer.size()
    }

    /// Bytes the index buffer can hold.
    pub fn index_capacity(&self) -> u64 {
        self.index_buffer.size()
    }
}

/// Records whether the device was lost, and why.
#[derive(Clone, Debug, Default)]
pub struct DeviceLostFlag {
    lost: Arc<AtomicBool>,
    message: Arc<Mutex<String>>,
}

impl DeviceLostFlag {
    /// Installs a device-lost callback on `device` that raises the flag.
    pub fn watch(device: &wgpu::Device) -> Self {
        let flag = Self::default();
        let callback_flag = flag.clone();
        device.set_device_lost_callback(move |reason, message| {
            error!("GPU device lost ({:?}): {}", reason, message);
            *callback_flag.message.lock().unwrap_or_else(PoisonError::into_inner) = message;
            callback_flag.lost.store(true, Ordering::SeqCst);
        });
        flag
    }

    /// Has the device been lost?
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn message(&self) -> String {
        self.message.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Uploads meshes into `wgpu` buffers.
pub struct WgpuUploadSink<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    lost: Option<DeviceLostFlag>,
}

impl<'a> WgpuUploadSink<'a> {
    /// Creates a sink writing through `queue`.
    pub fn new(device: &'a wgpu::Device, queue: &'a wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            lost: None,
        }
    }

    /// Fails uploads once `flag` reports the device lost.
    pub fn with_lost_flag(mut self, flag: DeviceLostFlag) -> Self {
        self.lost = Some(flag);
        self
    }

    fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }
}

impl UploadSink for WgpuUploadSink<'_> {
    type Buffer = GpuGeometry;

    fn upload(&mut self, target: &mut Option<GpuGeometry>, mesh: &ChunkMesh) -> Result<(), UploadError> {
        if let Some(flag) = &self.lost {
            if flag.is_lost() {
                return Err(UploadError::DeviceLost(flag.message()));
            }
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);
        let limit = self.device.limits().max_buffer_size;
        let requested = (vertex_bytes.len() as u64).max(index_bytes.len() as u64);
        if requested > limit {
            return Err(UploadError::BufferTooLarge {
                requested: mesh_bytes(mesh.vertices.len(), mesh.indices.len()),
                limit,
            });
        }

        let vertex_fits = target
            .as_ref()
            .is_some_and(|geometry| geometry.vertex_capacity() >= vertex_bytes.len() as u64);
        let index_fits = target
            .as_ref()
            .is_some_and(|geometry| geometry.index_capacity() >= index_bytes.len() as u64);

        if !vertex_fits || !index_fits {
            let vertex_buffer = self.create_buffer(
                "Chunk Vertex Buffer",
                grown_capacity(vertex_bytes.len() as u64, limit),
                wgpu::BufferUsages::VERTEX,
            );
            let index_buffer = self.create_buffer(
                "Chunk Index Buffer",
                grown_capacity(index_bytes.len() as u64, limit),
                wgpu::BufferUsages::INDEX,
            );
            *target = Some(GpuGeometry {
                vertex_buffer,
                index_buffer,
            });
        }

        if let Some(geometry) = target {
            if !vertex_bytes.is_empty() {
                self.queue.write_buffer(&geometry.vertex_buffer, 0, vertex_bytes);
            }
            if !index_bytes.is_empty() {
                self.queue.write_buffer(&geometry.index_buffer, 0, index_bytes);
            }
        }
        Ok(())
    }
}

/// Buffer size for `bytes` of data with a quarter of headroom.
///
/// The limit is aligned down before clamping, so the size stays copy-aligned.
fn grown_capacity(bytes: u64, limit: u64) -> u64 {
    let alignment = wgpu::COPY_BUFFER_ALIGNMENT;
    let ceiling = limit - limit % alignment;
    let grown = wgpu::util::align_to(bytes + bytes / 4, alignment);
    grown.min(ceiling).max(alignment)
}

/// Draws chunks into a render pass that has a [`ChunkPipeline`] set.
pub struct RenderPassDrawer<'p, 'e> {
    pass: &'p mut wgpu::RenderPass<'e>,
    draws: usize,
}

impl<'p, 'e> RenderPassDrawer<'p, 'e> {
    /// Wraps `pass`.
    pub fn new(pass: &'p mut wgpu::RenderPass<'e>) -> Self {
        Self { pass, draws: 0 }
    }

    /// Draw calls recorded so far.
    pub fn draws(&self) -> usize {
        self.draws
    }
}

impl ChunkDrawer<GpuGeometry> for RenderPassDrawer<'_, '_> {
    fn draw_chunk(&mut self, geometry: &GpuGeometry, index_count: u32, transforms: &ChunkTransforms) {
        let matrices: [[[f32; 4]; 4]; 2] = [
            transforms.world_view_projection.into(),
            transforms.shadow_world_view_projection.into(),
        ];
        self.pass
            .set_push_constants(wgpu::ShaderStages::VERTEX, 0, bytemuck::cast_slice(&matrices));
        self.pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
        self.pass
            .set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.pass.draw_indexed(0..index_count, 0, 0..1);
        self.draws += 1;
    }
}

/// The render pipeline chunk meshes are drawn with.
pub struct ChunkPipeline {
    render_pipeline: wgpu::RenderPipeline,
}

impl ChunkPipeline {
    /// Creates the pipeline for color targets of `texture_format`.
    ///
    /// The device must have been created with `PUSH_CONSTANTS` and a push
    /// constant limit of at least [`PUSH_CONSTANT_BYTES`].
    pub fn new(device: &wgpu::Device, texture_format: wgpu::TextureFormat) -> Self {
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Chunk Render Pipeline Layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::VERTEX,
                range: 0..PUSH_CONSTANT_BYTES,
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Chunk Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("chunk.wgsl").into()),
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Chunk Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[Vertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: Texture::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        Self { render_pipeline }
    }
}

/// An offscreen color and depth target with the chunk pipeline.
pub struct OffscreenFrame {
    pipeline: ChunkPipeline,
    color: Texture,
    depth: Texture,
}

impl OffscreenFrame {
    /// Creates a `width` x `height` frame.
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        Self {
            pipeline: ChunkPipeline::new(device, Texture::COLOR_FORMAT),
            color: Texture::create_color_target(device, width, height, "Offscreen Color"),
            depth: Texture::create_depth_texture(device, width, height, "Offscreen Depth"),
        }
    }

    /// Clears the frame, lets `draw` record chunk draws and submits them.
    ///
    /// # Returns
    /// Whatever `draw` returns
    pub fn render<R>(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        draw: impl FnOnce(&mut RenderPassDrawer<'_, '_>) -> R,
    ) -> R {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Chunk Render Encoder"),
        });

        let result = {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Chunk Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.45,
                            g: 0.65,
                            b: 0.9,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            render_pass.set_pipeline(&self.pipeline.render_pipeline);
            let mut drawer = RenderPassDrawer::new(&mut render_pass);
            draw(&mut drawer)
        };

        queue.submit(std::iter::once(encoder.finish()));
        result
    }
}

/// A device and queue that can run the chunk pipeline.
pub struct GpuContext {
    /// The device
    pub device: wgpu::Device,
    /// Its queue
    pub queue: wgpu::Queue,
    /// Raised when the device is lost
    pub lost: DeviceLostFlag,
}

impl GpuContext {
    /// Requests a headless device with push constants.
    ///
    /// # Returns
    /// `None` when no adapter is present or it lacks push constants
    pub async fn request() -> Option<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::empty(),
            backend_options: wgpu::BackendOptions::from_env_or_default(),
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;

        if !adapter.features().contains(wgpu::Features::PUSH_CONSTANTS)
            || adapter.limits().max_push_constant_size < PUSH_CONSTANT_BYTES
        {
            info!("Adapter {:?} has no usable push constants", adapter.get_info().name);
            return None;
        }

        let required_limits = wgpu::Limits {
            max_push_constant_size: PUSH_CONSTANT_BYTES,
            ..wgpu::Limits::default()
        };
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::PUSH_CONSTANTS,
                required_limits,
                label: Some("Chunk Streaming Device"),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await
            .ok()?;

        info!("Using adapter {:?}", adapter.get_info().name);
        let lost = DeviceLostFlag::watch(&device);
        Some(Self { device, queue, lost })
    }

    /// An upload sink for this device.
    pub fn upload_sink(&self) -> WgpuUploadSink<'_> {
        WgpuUploadSink::new(&self.device, &self.queue).with_lost_flag(self.lost.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_grows_with_headroom() {
        assert_eq!(grown_capacity(0, 1 << 20), wgpu::COPY_BUFFER_ALIGNMENT);
        assert_eq!(grown_capacity(400, 1 << 20), 500);
        assert_eq!(grown_capacity(41, 1 << 20), 52);
        assert_eq!(grown_capacity(1000, 1100), 1100);
    }

    #[test]
    fn capacity_stays_aligned_under_an_odd_limit() {
        assert_eq!(grown_capacity(1000, 1102), 1100);
        assert_eq!(grown_capacity(1000, 1103) % wgpu::COPY_BUFFER_ALIGNMENT, 0);
        assert_eq!(grown_capacity(8, 9), 8);
    }

    #[test]
    fn push_constants_hold_two_matrices() {
        assert_eq!(PUSH_CONSTANT_BYTES, 128);
    }
}
