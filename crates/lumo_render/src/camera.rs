//! Pinhole camera for ray generation.

use lumo_math::{Ray, Vec3};

/// Perspective camera mapping image-plane coordinates in [-1, 1] to
/// world-space rays.
#[derive(Debug, Clone)]
pub struct Camera {
    eye: Vec3,
    dir: Vec3,
    // Image-plane basis, pre-scaled by the field of view and aspect ratio
    right: Vec3,
    up: Vec3,
}

impl Camera {
    /// Create a camera looking from `eye` toward `center`.
    ///
    /// `vfov` is the vertical field of view in degrees, `aspect` the
    /// width/height ratio of the image.
    pub fn new(eye: Vec3, center: Vec3, vup: Vec3, vfov: f32, aspect: f32) -> Self {
        let dir = (center - eye).normalize();
        let w = (vfov.to_radians() * 0.5).tan();
        let right = dir.cross(vup).normalize() * (w * aspect);
        let up = right.normalize().cross(dir) * w;
        Self {
            eye,
            dir,
            right,
            up,
        }
    }

    /// Generate a primary ray through image-plane point `(x, y)`, both in
    /// [-1, 1] with `y = 1` at the top of the image.
    pub fn gen_ray(&self, x: f32, y: f32) -> Ray {
        let dir = (self.dir + x * self.right + y * self.up).normalize();
        Ray::with_offset(self.eye, dir, 0.0)
    }

    /// Camera position.
    pub fn eye(&self) -> Vec3 {
        self.eye
    }
}
