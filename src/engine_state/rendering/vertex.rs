//! Vertex data structures and layouts for chunk rendering.
//!
//! This module defines the vertex format produced by the mesher and the
//! matching `wgpu` vertex buffer layout.

/// A vertex of a chunk mesh.
///
/// Positions are local to the chunk; the draw call translates them by the
/// chunk's shift relative to the viewer.
///
/// # Memory Layout
/// - Position: [f32; 3] (12 bytes)
/// - Normal: [f32; 3] (12 bytes)
/// - UV: [f32; 2] (8 bytes)
/// - Texture layer: u32 (4 bytes)
/// - Brightness: f32 (4 bytes)
///
/// Total size: 40 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Corner position in chunk-local block units
    pub position: [f32; 3],
    /// Outward normal of the face
    pub normal: [f32; 3],
    /// Texture coordinates (0.0 or 1.0 per axis)
    pub uv: [f32; 2],
    /// Layer of the texture array holding the face texture
    pub layer: u32,
    /// Ambient occlusion brightness in [0.5, 1.0]
    pub brightness: f32,
}

impl Vertex {
    /// Returns the vertex buffer layout description for the shader pipeline.
    ///
    /// # Shader Attributes
    /// - `location = 0`: position (vec3<f32>)
    /// - `location = 1`: normal (vec3<f32>)
    /// - `location = 2`: uv (vec2<f32>)
    /// - `location = 3`: layer (u32)
    /// - `location = 4`: brightness (f32)
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Uint32,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 9]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_the_struct() {
        let layout = Vertex::desc();
        assert_eq!(layout.array_stride, 40);
        assert_eq!(std::mem::size_of::<Vertex>(), 40);

        let last = layout.attributes.last().unwrap();
        assert_eq!(last.offset + last.format.size(), layout.array_stride);
    }
}
