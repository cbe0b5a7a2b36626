//! Light sources: isotropic point lights and triangular area lights.

use crate::{sample_uniform_sphere, uniform_sphere_pdf, Color, UniformSampler};
use lumo_math::{LocalFrame, Vec3};

/// Sample for next-event estimation from a surface point.
#[derive(Debug, Copy, Clone)]
pub struct DirectSample {
    /// Position on the light
    pub pos: Vec3,
    /// Emitted intensity. Radiance for area lights; radiant intensity
    /// (divide by squared distance) for point lights.
    pub intensity: Color,
    /// Pdf of the position, in area measure (area lights)
    pub pdf_area: f32,
    /// Pdf of the direction, in solid angle (point lights)
    pub pdf_dir: f32,
    /// Cosine between the light normal and the direction to the shading
    /// point (1 for point lights)
    pub cos: f32,
}

/// Sample for emitting a light path during photon tracing.
///
/// `intensity` already contains the cosine at the emitter, so the photon
/// contribution is `intensity / (pdf_area * pdf_dir)`.
#[derive(Debug, Copy, Clone)]
pub struct EmissionSample {
    pub pos: Vec3,
    pub dir: Vec3,
    pub intensity: Color,
    pub pdf_area: f32,
    pub pdf_dir: f32,
}

/// Isotropic point light with radiant intensity `intensity`.
#[derive(Debug, Clone)]
pub struct PointLight {
    pub pos: Vec3,
    pub intensity: Color,
}

/// One-sided triangular area light emitting radiance `intensity` from its
/// front face (counter-clockwise winding).
#[derive(Debug, Clone)]
pub struct AreaLight {
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    normal: Vec3,
    area: f32,
    pub intensity: Color,
}

impl AreaLight {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, intensity: Color) -> Self {
        let cross = (v1 - v0).cross(v2 - v0);
        let area = 0.5 * cross.length();
        Self {
            v0,
            v1,
            v2,
            normal: cross.normalize_or_zero(),
            area,
            intensity,
        }
    }

    /// Uniform position on the triangle.
    fn sample_pos(&self, u: f32, v: f32) -> Vec3 {
        let su = u.sqrt();
        (1.0 - su) * self.v0 + (su * (1.0 - v)) * self.v1 + (su * v) * self.v2
    }
}

/// A light source, sampled three ways: directly from a surface point, as
/// an emission origin for photon tracing, or evaluated when a path hits
/// it.
#[derive(Debug, Clone)]
pub enum Light {
    Point(PointLight),
    Area(AreaLight),
}

impl Light {
    /// Whether the light has surface area. Area lights report their
    /// direct-sampling pdf in area measure; point lights in solid angle.
    pub fn has_area(&self) -> bool {
        matches!(self, Light::Area(_))
    }

    /// Sample a position on the light for direct illumination of `from`.
    pub fn sample_direct(&self, from: Vec3, sampler: &mut UniformSampler) -> DirectSample {
        match self {
            Light::Point(p) => DirectSample {
                pos: p.pos,
                intensity: p.intensity,
                pdf_area: 1.0,
                pdf_dir: 1.0,
                cos: 1.0,
            },
            Light::Area(a) => {
                let pos = a.sample_pos(sampler.next(), sampler.next());
                let cos = a.normal.dot((from - pos).normalize_or_zero());
                // Shading points behind the emitter receive nothing; keep
                // the pdfs valid so the caller's division stays finite.
                let (intensity, cos) = if cos > 1e-6 {
                    (a.intensity, cos)
                } else {
                    (Color::ZERO, 1.0)
                };
                DirectSample {
                    pos,
                    intensity,
                    pdf_area: 1.0 / a.area,
                    pdf_dir: 0.0,
                    cos,
                }
            }
        }
    }

    /// Solid-angle pdf of sampling, from `from`, the direction that hits
    /// the light at `on_light`. Zero for point lights (a BSDF sample
    /// never hits one). Used by the MIS weight on emitter hits.
    pub fn pdf_direct(&self, from: Vec3, on_light: Vec3) -> f32 {
        match self {
            Light::Point(_) => 0.0,
            Light::Area(a) => {
                let d = from - on_light;
                let dist2 = d.length_squared();
                let cos = a.normal.dot(d.normalize_or_zero());
                if cos <= 1e-6 {
                    0.0
                } else {
                    dist2 / (a.area * cos)
                }
            }
        }
    }

    /// Sample an emitted position and direction for photon tracing.
    pub fn sample_emission(&self, sampler: &mut UniformSampler) -> EmissionSample {
        match self {
            Light::Point(p) => {
                let s = sample_uniform_sphere(sampler.next(), sampler.next());
                EmissionSample {
                    pos: p.pos,
                    dir: s.dir,
                    intensity: p.intensity,
                    pdf_area: 1.0,
                    pdf_dir: uniform_sphere_pdf(),
                }
            }
            Light::Area(a) => {
                let pos = a.sample_pos(sampler.next(), sampler.next());
                let frame = LocalFrame::from_normal(a.normal);
                let s = crate::sample_cosine_hemisphere(&frame, sampler.next(), sampler.next());
                let cos = a.normal.dot(s.dir).max(0.0);
                EmissionSample {
                    pos,
                    dir: s.dir,
                    intensity: a.intensity * cos,
                    pdf_area: 1.0 / a.area,
                    pdf_dir: s.pdf,
                }
            }
        }
    }

    /// Radiance emitted toward `out` when a path hits the light directly.
    /// Point lights cannot be hit.
    pub fn emission(&self, out: Vec3, _u: f32, _v: f32) -> Color {
        match self {
            Light::Point(_) => Color::ZERO,
            Light::Area(a) => {
                if a.normal.dot(out) > 0.0 {
                    a.intensity
                } else {
                    Color::ZERO
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn quad_light() -> AreaLight {
        AreaLight::new(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 0.0),
            Color::splat(5.0),
        )
    }

    #[test]
    fn test_area_light_geometry() {
        let l = quad_light();
        assert!((l.area - 0.5).abs() < 1e-6);
        assert!((l.normal - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn test_sample_pos_on_triangle() {
        let l = quad_light();
        let mut sampler = UniformSampler::new(0);
        for _ in 0..1000 {
            let p = l.sample_pos(sampler.next(), sampler.next());
            // All sampled points stay in the triangle plane and its bounds
            assert!((p.y - 1.0).abs() < 1e-6);
            assert!(p.x >= -1e-6 && p.z >= -1e-6 && p.x + p.z <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_point_light_samples() {
        let l = Light::Point(PointLight {
            pos: Vec3::new(1.0, 2.0, 3.0),
            intensity: Color::splat(10.0),
        });
        assert!(!l.has_area());

        let mut sampler = UniformSampler::new(1);
        let ds = l.sample_direct(Vec3::ZERO, &mut sampler);
        assert_eq!(ds.pos, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(ds.pdf_dir, 1.0);

        let es = l.sample_emission(&mut sampler);
        assert!((es.dir.length() - 1.0).abs() < 1e-5);
        assert!((es.pdf_dir - uniform_sphere_pdf()).abs() < 1e-7);
        assert_eq!(l.emission(Vec3::Z, 0.0, 0.0), Color::ZERO);
    }

    #[test]
    fn test_emission_power() {
        // contrib = intensity / (pdf_area * pdf_dir) estimates the total
        // emitted power pi * A * L of a Lambertian emitter.
        let a = quad_light();
        let area = a.area;
        let radiance = a.intensity;
        let l = Light::Area(a);
        let mut sampler = UniformSampler::new(2);
        let n = 50_000;
        let mut sum = Color::ZERO;
        for _ in 0..n {
            let es = l.sample_emission(&mut sampler);
            sum += es.intensity / (es.pdf_area * es.pdf_dir);
        }
        let est = sum / n as f32;
        let expected = radiance * (PI * area);
        assert!(
            (est - expected).abs().max_element() / expected.max_element() < 0.02,
            "est = {est:?}, expected = {expected:?}"
        );
    }

    #[test]
    fn test_pdf_direct_matches_geometry() {
        let l = Light::Area(quad_light());
        let from = Vec3::new(0.2, 3.0, 0.2);
        let on_light = Vec3::new(0.25, 1.0, 0.25);
        let d = from - on_light;
        // pdf_area * dist^2 / cos with pdf_area = 1/area, cos against +y
        let expected = d.length_squared() / (0.5 * d.normalize().y);
        let pdf = l.pdf_direct(from, on_light);
        assert!((pdf - expected).abs() / expected < 1e-5);

        // From below, the back face is never sampled
        assert_eq!(l.pdf_direct(Vec3::new(0.2, -3.0, 0.2), on_light), 0.0);
    }
}
