use crate::Vec3;

/// A ray in 3D space with origin, direction, and a valid `t` interval.
///
/// Points with `t` outside `[tmin, tmax]` are not considered hits; the
/// traversal kernel shrinks `tmax` as closer intersections are found.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub org: Vec3,
    pub dir: Vec3,
    pub tmin: f32,
    pub tmax: f32,
}

impl Ray {
    /// Create a new ray with an explicit `t` interval.
    pub fn new(org: Vec3, dir: Vec3, tmin: f32, tmax: f32) -> Self {
        Self {
            org,
            dir,
            tmin,
            tmax,
        }
    }

    /// Create a ray with an unbounded far interval.
    pub fn with_offset(org: Vec3, dir: Vec3, tmin: f32) -> Self {
        Self::new(org, dir, tmin, f32::MAX)
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: org + t * dir
    pub fn at(&self, t: f32) -> Vec3 {
        self.org + self.dir * t
    }
}
