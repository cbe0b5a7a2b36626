//! Precomputed triangle data for the Möller-Trumbore intersection kernel.

use lumo_math::{Ray, Vec3};

const MT_EPSILON: f32 = 1e-9;

/// Triangle reorganized for intersection: one vertex and the two edges
/// leaving it. Built once after the BVH build, in leaf order.
#[derive(Debug, Copy, Clone)]
pub struct PrecomputedTri {
    v0: Vec3,
    e1: Vec3,
    e2: Vec3,
}

impl PrecomputedTri {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self {
            v0,
            e1: v1 - v0,
            e2: v2 - v0,
        }
    }

    /// Möller-Trumbore ray-triangle intersection.
    ///
    /// On a hit with `t` in `(ray.tmin, *t_max)`, updates `t_max`, `u`,
    /// `v` and returns true.
    #[inline]
    pub fn intersect(&self, ray: &Ray, t_max: &mut f32, u: &mut f32, v: &mut f32) -> bool {
        let h = ray.dir.cross(self.e2);
        let det = self.e1.dot(h);

        // Parallel or degenerate
        if det.abs() < MT_EPSILON {
            return false;
        }

        let inv_det = 1.0 / det;
        let s = ray.org - self.v0;
        let hit_u = inv_det * s.dot(h);
        if !(0.0..=1.0).contains(&hit_u) {
            return false;
        }

        let q = s.cross(self.e1);
        let hit_v = inv_det * ray.dir.dot(q);
        if hit_v < 0.0 || hit_u + hit_v > 1.0 {
            return false;
        }

        let t = inv_det * self.e2.dot(q);
        if t > ray.tmin && t < *t_max {
            *t_max = t;
            *u = hit_u;
            *v = hit_v;
            true
        } else {
            false
        }
    }
}
