//! # Camera State Management
//!
//! This module connects the viewer to the streaming core:
//! - Where the viewer is, as a chunk index the scheduler can poll
//! - What a frame looks like, as the matrices and pick ray chunks are drawn with
//! - Which chunks are close enough to the pick ray to be drawn at all
//!
//! ## Core Components
//! - `ViewerFeed`: The viewer position contract the scheduler polls
//! - `SharedViewer`: A thread-safe viewer position fed by the application
//! - `CameraView`: Per-frame matrices, relative to the viewer's chunk
//! - `VisibilitySphere`: Coarse culling of chunks far from the view direction
//! - `camera`: A first-person camera and its projection

use cgmath::{InnerSpace, Matrix4, Point3, Vector3};

use crate::core::MtResource;

use super::voxels::chunk::CHUNK_DIMENSION;
use super::voxels::coords::ChunkIndex;

pub mod camera;

/// Tells the streaming core which chunk the viewer is in.
pub trait ViewerFeed: Send + Sync {
    /// Chunk containing the viewer. X and Y need not be wrapped.
    fn current_chunk(&self) -> ChunkIndex;
}

/// Chunk containing a world position.
pub fn chunk_of_position(position: Point3<f32>) -> ChunkIndex {
    let dimension = CHUNK_DIMENSION as f32;
    Point3::new(
        (position.x / dimension).floor() as i32,
        (position.y / dimension).floor() as i32,
        (position.z / dimension).floor() as i32,
    )
}

/// A viewer position shared between the application and the scheduler.
#[derive(Clone)]
pub struct SharedViewer {
    position: MtResource<Point3<f32>>,
}

impl SharedViewer {
    /// Creates a viewer at `position`.
    pub fn new(position: Point3<f32>) -> Self {
        Self {
            position: MtResource::new(position),
        }
    }

    /// Moves the viewer.
    pub fn set_position(&self, position: Point3<f32>) {
        *self.position.get_mut() = position;
    }

    /// Current world position.
    pub fn position(&self) -> Point3<f32> {
        *self.position.get()
    }
}

impl ViewerFeed for SharedViewer {
    fn current_chunk(&self) -> ChunkIndex {
        chunk_of_position(self.position())
    }
}

/// Everything a frame needs to draw chunks.
///
/// All positions are relative to the origin of `viewer_chunk`; each chunk is
/// drawn translated by its shortest offset from that chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraView {
    /// View-projection for an eye at `eye`
    pub view_projection: Matrix4<f32>,
    /// Shadow map view-projection in the same space
    pub shadow_view_projection: Matrix4<f32>,
    /// Chunk the viewer is in
    pub viewer_chunk: ChunkIndex,
    /// Eye position relative to the viewer chunk's origin
    pub eye: Point3<f32>,
    /// Normalized pick ray direction
    pub direction: Vector3<f32>,
}

impl CameraView {
    /// Builds the view of `camera` through `projection`.
    ///
    /// The shadow pass looks along `sun_direction` at the viewer from
    /// `shadow_distance` away, with an orthographic box of the same half extent.
    pub fn new(
        camera: &camera::Camera,
        projection: &camera::Projection,
        sun_direction: Vector3<f32>,
        shadow_distance: f32,
    ) -> Self {
        let viewer_chunk = chunk_of_position(camera.position);
        let origin = Vector3::new(
            viewer_chunk.x as f32,
            viewer_chunk.y as f32,
            viewer_chunk.z as f32,
        ) * CHUNK_DIMENSION as f32;
        let eye = camera.position - origin;

        let sun = sun_direction.normalize();
        let up = if sun.z.abs() > 0.99 { Vector3::unit_x() } else { Vector3::unit_z() };
        let shadow_view = Matrix4::look_to_rh(eye - sun * shadow_distance, sun, up);
        let shadow_projection = camera::OPENGL_TO_WGPU_MATRIX
            * cgmath::ortho(
                -shadow_distance,
                shadow_distance,
                -shadow_distance,
                shadow_distance,
                0.0,
                shadow_distance * 2.0,
            );

        Self {
            view_projection: projection.calc_matrix() * camera.view_matrix_at(eye),
            shadow_view_projection: shadow_projection * shadow_view,
            viewer_chunk,
            eye,
            direction: camera.get_view_vec(),
        }
    }
}

/// A sphere placed ahead of the viewer along the pick ray.
///
/// Chunks whose center lies inside the sphere are drawn. The sphere reaches
/// back to just behind the near plane, so nothing directly around the viewer
/// is culled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibilitySphere {
    radius: f32,
    radius_squared: f32,
}

impl VisibilitySphere {
    /// Sizes the sphere for a window of `span` chunks per side.
    pub fn new(span: i32, near_plane: f32) -> Self {
        let dimension = CHUNK_DIMENSION as f32;
        let chunk_diagonal = (3.0 * dimension * dimension).sqrt();
        let extent = span as f32 * dimension;
        let padded = (extent * extent * 3.0).sqrt() / 3.0 + near_plane + chunk_diagonal / 2.0;
        Self {
            radius: padded - chunk_diagonal / 2.0,
            radius_squared: padded * padded,
        }
    }

    /// Distance of the sphere center from the eye.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Is the chunk at `shift` chunks from the viewer chunk inside the sphere?
    pub fn contains(&self, shift: Vector3<i32>, eye: Point3<f32>, direction: Vector3<f32>) -> bool {
        let dimension = CHUNK_DIMENSION as f32;
        let center = eye + direction * self.radius;
        let chunk_center = Point3::new(
            shift.x as f32 * dimension + dimension / 2.0,
            shift.y as f32 * dimension + dimension / 2.0,
            shift.z as f32 * dimension + dimension / 2.0,
        );
        (center - chunk_center).magnitude2() < self.radius_squared
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Deg;

    use super::*;

    #[test]
    fn viewer_chunk_floors_negative_positions() {
        let viewer = SharedViewer::new(Point3::new(-0.5, 17.0, 3.0));
        assert_eq!(viewer.current_chunk(), Point3::new(-1, 1, 0));

        viewer.set_position(Point3::new(32.0, 0.0, -16.0));
        assert_eq!(viewer.current_chunk(), Point3::new(2, 0, -1));
    }

    #[test]
    fn sphere_keeps_what_is_ahead() {
        let sphere = VisibilitySphere::new(4, 0.1);
        let eye = Point3::new(8.0, 8.0, 8.0);
        let ahead = Vector3::new(1.0, 0.0, 0.0);

        assert!(sphere.contains(Vector3::new(0, 0, 0), eye, ahead));
        assert!(sphere.contains(Vector3::new(1, 0, 0), eye, ahead));
        assert!(!sphere.contains(Vector3::new(-3, 0, 0), eye, ahead));
        assert!(sphere.contains(Vector3::new(-3, 0, 0), eye, -ahead));
    }

    #[test]
    fn view_is_relative_to_the_viewer_chunk() {
        let camera = camera::Camera::new(Point3::new(40.0, -3.0, 20.0), Deg(0.0), Deg(0.0));
        let projection = camera::Projection::new(800, 600, Deg(70.0), 0.1, 500.0);
        let view = CameraView::new(&camera, &projection, Vector3::new(0.3, 0.2, -1.0), 64.0);

        assert_eq!(view.viewer_chunk, Point3::new(2, -1, 1));
        assert_eq!(view.eye, Point3::new(8.0, 13.0, 4.0));
        assert!((view.direction - Vector3::new(1.0, 0.0, 0.0)).magnitude() < 1e-6);
    }
}
