//! Direction sampling on spheres and hemispheres, with matching pdfs.

use crate::Color;
use lumo_math::{LocalFrame, Vec3};
use std::f32::consts::PI;

/// A sampled direction together with its solid-angle pdf.
#[derive(Debug, Copy, Clone)]
pub struct DirSample {
    pub dir: Vec3,
    pub pdf: f32,
}

impl DirSample {
    pub fn new(dir: Vec3, pdf: f32) -> Self {
        Self { dir, pdf }
    }
}

/// Pdf of a direction on a uniformly sampled sphere.
#[inline]
pub fn uniform_sphere_pdf() -> f32 {
    1.0 / (4.0 * PI)
}

/// Sample a direction uniformly over the whole sphere.
pub fn sample_uniform_sphere(u: f32, v: f32) -> DirSample {
    let c = 2.0 * v - 1.0;
    let s = (1.0 - c * c).max(0.0).sqrt();
    let phi = 2.0 * PI * u;
    DirSample::new(
        Vec3::new(s * phi.cos(), s * phi.sin(), c),
        uniform_sphere_pdf(),
    )
}

/// Pdf of a cosine-weighted hemisphere direction, given the cosine with
/// the frame normal.
#[inline]
pub fn cosine_hemisphere_pdf(c: f32) -> f32 {
    c.max(0.0) / PI
}

/// Sample a hemisphere direction proportionally to the cosine with the
/// frame normal.
pub fn sample_cosine_hemisphere(frame: &LocalFrame, u: f32, v: f32) -> DirSample {
    let r = u.sqrt();
    let phi = 2.0 * PI * v;
    let x = r * phi.cos();
    let y = r * phi.sin();
    let z = (1.0 - u).max(0.0).sqrt();
    DirSample::new(frame.to_world(Vec3::new(x, y, z)), z / PI)
}

/// Pdf of a cosine-power lobe direction, given the cosine with the lobe
/// axis and the exponent k.
#[inline]
pub fn cosine_power_hemisphere_pdf(c: f32, k: f32) -> f32 {
    (k + 1.0) / (2.0 * PI) * c.max(0.0).powf(k)
}

/// Sample a hemisphere direction proportionally to cos^k around the frame
/// normal (the Phong lobe axis).
pub fn sample_cosine_power_hemisphere(frame: &LocalFrame, k: f32, u: f32, v: f32) -> DirSample {
    let cos_theta = u.powf(1.0 / (k + 1.0));
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = 2.0 * PI * v;
    let dir = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);
    DirSample::new(frame.to_world(dir), cosine_power_hemisphere_pdf(cos_theta, k))
}

/// Rec. 709 luminance of a linear RGB color.
#[inline]
pub fn luma(c: Color) -> f32 {
    c.dot(Vec3::new(0.2126, 0.7152, 0.0722))
}

/// Survival probability for Russian Roulette, given the path contribution
/// and the maximum survival probability allowed.
#[inline]
pub fn russian_roulette(c: Color, max: f32) -> f32 {
    (2.0 * luma(c)).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UniformSampler;

    // Integrate a pdf over the sphere with a stratified grid of 10^6
    // uniform-sphere samples. Stratification keeps the estimator error
    // well below the 1% acceptance band even for narrow lobes.
    fn integrate_pdf<F: Fn(Vec3) -> f32>(pdf: F) -> f32 {
        let n = 1000;
        let mut sum = 0.0f64;
        for i in 0..n {
            for j in 0..n {
                let u = (i as f32 + 0.5) / n as f32;
                let v = (j as f32 + 0.5) / n as f32;
                let d = sample_uniform_sphere(u, v);
                sum += (pdf(d.dir) / uniform_sphere_pdf()) as f64;
            }
        }
        (sum / (n * n) as f64) as f32
    }

    #[test]
    fn test_cosine_hemisphere_pdf_integrates_to_one() {
        let frame = LocalFrame::from_normal(Vec3::Z);
        let total = integrate_pdf(|d| cosine_hemisphere_pdf(frame.cos_theta(d)));
        assert!((total - 1.0).abs() < 0.01, "integral = {total}");
    }

    #[test]
    fn test_cosine_power_pdf_integrates_to_one() {
        let frame = LocalFrame::from_normal(Vec3::new(0.3, -0.2, 0.8).normalize());
        for k in [1.0, 10.0, 64.0] {
            let total = integrate_pdf(|d| cosine_power_hemisphere_pdf(frame.cos_theta(d), k));
            assert!((total - 1.0).abs() < 0.01, "k = {k}, integral = {total}");
        }
    }

    #[test]
    fn test_uniform_sphere_pdf_integrates_to_one() {
        let total = integrate_pdf(|_| uniform_sphere_pdf());
        assert!((total - 1.0).abs() < 1e-4, "integral = {total}");
    }

    #[test]
    fn test_sampled_directions_match_pdf() {
        // The pdf reported by the sampler must agree with the analytic pdf
        // evaluated at the sampled direction.
        let frame = LocalFrame::from_normal(Vec3::new(1.0, 1.0, 1.0).normalize());
        let mut sampler = UniformSampler::new(3);
        for _ in 0..1000 {
            let s = sample_cosine_hemisphere(&frame, sampler.next(), sampler.next());
            let c = frame.cos_theta(s.dir);
            assert!((s.pdf - cosine_hemisphere_pdf(c)).abs() < 1e-4);

            let s = sample_cosine_power_hemisphere(&frame, 32.0, sampler.next(), sampler.next());
            let c = frame.cos_theta(s.dir);
            assert!((s.pdf - cosine_power_hemisphere_pdf(c, 32.0)).abs() < 1e-3 * s.pdf.max(1.0));
        }
    }

    #[test]
    fn test_russian_roulette_clamped() {
        assert_eq!(russian_roulette(Color::splat(10.0), 0.95), 0.95);
        assert_eq!(russian_roulette(Color::ZERO, 0.95), 0.0);
        let q = russian_roulette(Color::splat(0.1), 0.95);
        assert!((q - 0.2).abs() < 1e-6);
    }
}
