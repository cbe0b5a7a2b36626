use crate::Vec3;

/// Orthonormal shading basis around a normal.
///
/// Built with the branchless construction from "Building an Orthonormal
/// Basis, Revisited" (Duff et al., 2017).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LocalFrame {
    pub n: Vec3,
    pub t: Vec3,
    pub bt: Vec3,
}

impl LocalFrame {
    /// Build a frame from a unit normal.
    pub fn from_normal(n: Vec3) -> Self {
        let sign = 1.0_f32.copysign(n.z);
        let a = -1.0 / (sign + n.z);
        let b = n.x * n.y * a;

        let t = Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
        let bt = Vec3::new(b, sign + n.y * n.y * a, -n.y);

        Self { n, t, bt }
    }

    /// Transform a local direction (z along the normal) into world space.
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        local.x * self.t + local.y * self.bt + local.z * self.n
    }

    /// Cosine of the angle between a world direction and the normal.
    #[inline]
    pub fn cos_theta(&self, dir: Vec3) -> f32 {
        self.n.dot(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_orthonormal(n: Vec3) {
        let f = LocalFrame::from_normal(n.normalize());
        assert!(f.t.dot(f.bt).abs() < 1e-6);
        assert!(f.t.dot(f.n).abs() < 1e-6);
        assert!(f.bt.dot(f.n).abs() < 1e-6);
        assert!((f.t.length() - 1.0).abs() < 1e-5);
        assert!((f.bt.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_frame_orthonormal() {
        check_orthonormal(Vec3::Z);
        check_orthonormal(-Vec3::Z);
        check_orthonormal(Vec3::new(1.0, 2.0, 3.0));
        check_orthonormal(Vec3::new(-0.3, 0.9, -0.1));
    }

    #[test]
    fn test_frame_to_world() {
        let f = LocalFrame::from_normal(Vec3::Y);
        // Local z maps onto the normal
        let w = f.to_world(Vec3::Z);
        assert!((w - Vec3::Y).length() < 1e-6);
    }
}
