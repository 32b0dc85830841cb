//! # Camera Implementation
//!
//! A free-flying first-person camera on a Z-up planet, plus the projection it
//! renders with.
//!
//! ## Key Components
//! - `Camera`: Position and orientation in world space
//! - `Projection`: Perspective projection settings
//! - `OPENGL_TO_WGPU_MATRIX`: Depth range fix-up for wgpu's clip space

use cgmath::*;
use std::f32::consts::FRAC_PI_2;

/// Transformation matrix to convert from OpenGL's coordinate system to WGPU's.
///
/// WGPU expects clip-space depth in [0, 1] where OpenGL uses [-1, 1]:
/// 1. Scales the Z coordinate from [-1, 1] to [-0.5, 0.5]
/// 2. Translates the Z coordinate from [-0.5, 0.5] to [0, 1]
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,  // Scale Z from [-1,1] to [-0.5,0.5]
    0.0, 0.0, 0.5, 1.0,  // Translate Z from [-0.5,0.5] to [0,1]
);

/// Safe limit for pitch to prevent gimbal lock
const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

/// A first-person camera in world space.
///
/// # Fields
/// - `position`: The camera's position in world space
/// - `yaw`: Rotation around the Z axis, zero looking along +X
/// - `pitch`: Elevation above the XY plane
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    /// The camera's position in world space
    pub position: Point3<f32>,
    /// Rotation around the Z axis in radians
    pub yaw: Rad<f32>,
    /// Elevation in radians, clamped just short of straight up and down
    pub pitch: Rad<f32>,
}

impl Camera {
    /// Creates a camera with the specified position and orientation.
    ///
    /// # Arguments
    /// * `position` - Initial position in world space
    /// * `yaw` - Initial rotation around the Z axis
    /// * `pitch` - Initial elevation, clamped to avoid gimbal lock
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        let mut camera = Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: Rad(0.0),
        };
        camera.set_pitch(pitch);
        camera
    }

    /// Sets the pitch, clamped to avoid gimbal lock.
    pub fn set_pitch<P: Into<Rad<f32>>>(&mut self, pitch: P) {
        let pitch = pitch.into();
        self.pitch = if pitch < -Rad(SAFE_FRAC_PI_2) {
            -Rad(SAFE_FRAC_PI_2)
        } else if pitch > Rad(SAFE_FRAC_PI_2) {
            Rad(SAFE_FRAC_PI_2)
        } else {
            pitch
        };
    }

    /// Gets the camera's forward direction vector.
    ///
    /// # Returns
    /// A normalized vector in the direction the camera is facing
    pub fn get_view_vec(&self) -> Vector3<f32> {
        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.0.sin_cos();
        Vector3::new(pitch_cos * yaw_cos, pitch_cos * yaw_sin, pitch_sin).normalize()
    }

    /// Calculates the view matrix for an eye at `eye` looking along this camera's direction.
    ///
    /// Chunk rendering places the eye relative to the viewer's chunk rather
    /// than at the world position, which keeps vertex coordinates small.
    pub fn view_matrix_at(&self, eye: Point3<f32>) -> Matrix4<f32> {
        Matrix4::look_to_rh(eye, self.get_view_vec(), Vector3::unit_z())
    }

    /// Moves the camera along the ground plane and vertically.
    ///
    /// # Arguments
    /// * `forward` - Distance along the facing direction, projected onto XY
    /// * `right` - Distance to the right of the facing direction
    /// * `up` - Distance along +Z
    pub fn translate(&mut self, forward: f32, right: f32, up: f32) {
        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let ahead = Vector3::new(yaw_cos, yaw_sin, 0.0);
        let side = Vector3::new(yaw_sin, -yaw_cos, 0.0);
        self.position += ahead * forward + side * right + Vector3::unit_z() * up;
    }
}

/// Represents a camera's projection matrix and related parameters.
///
/// This handles the perspective projection used to render the 3D scene.
/// It manages the aspect ratio, field of view, and near/far clipping planes.
#[derive(Clone, Copy, Debug)]
pub struct Projection {
    /// Aspect ratio (width / height)
    aspect: f32,
    /// Vertical field of view in radians
    fovy: Rad<f32>,
    /// Near clipping plane distance
    znear: f32,
    /// Far clipping plane distance
    zfar: f32,
}

impl Projection {
    /// Creates a new projection with the given parameters.
    ///
    /// # Arguments
    /// * `width` - Viewport width in pixels
    /// * `height` - Viewport height in pixels
    /// * `fovy` - Vertical field of view (can be any type convertible to `Rad<f32>`)
    /// * `znear` - Near clipping plane distance
    /// * `zfar` - Far clipping plane distance
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    /// Near clipping plane distance.
    pub fn znear(&self) -> f32 {
        self.znear
    }

    /// Calculates the projection matrix.
    ///
    /// Combines the perspective projection with the OpenGL to WGPU coordinate system transform.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}
