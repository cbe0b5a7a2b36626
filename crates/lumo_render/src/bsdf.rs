//! BSDF variants for surface scattering.
//!
//! Mixing is modeled with a `Combine` variant instead of an ownership
//! graph, so every BSDF has a known size and estimators can branch on a
//! compact shape tag.
//!
//! Conventions: `out` points away from the surface toward the previous
//! path vertex, `in_dir` toward the next one. Neither `eval` nor the
//! color returned by `sample` includes the cosine term; estimators
//! multiply `|in_dir . n|` themselves. Dirac lobes fold the reciprocal
//! cosine into their sample color so that product stays exact.

use crate::scene::SurfaceParams;
use crate::{
    cosine_hemisphere_pdf, cosine_power_hemisphere_pdf, sample_cosine_hemisphere,
    sample_cosine_power_hemisphere, Color, Texture, UniformSampler,
};
use lumo_math::{LocalFrame, Vec3};
use std::f32::consts::PI;

/// Classification of BSDF shapes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BsdfType {
    /// Mostly uniform; easy for any estimator
    Diffuse,
    /// Peaked lobes; hard for photon density estimation
    Glossy,
    /// Dirac lobes; merging and connections are not possible
    Specular,
}

/// Sample returned by a BSDF: direction, pdf, and weighted contribution.
#[derive(Debug, Copy, Clone)]
pub struct BsdfSample {
    /// Sampled incoming direction
    pub dir: Vec3,
    /// Pdf of the sampled direction (zero marks a rejected sample)
    pub pdf: f32,
    /// BSDF value for the sampled direction, without the cosine term
    pub color: Color,
}

impl BsdfSample {
    /// A rejected sample; callers terminate the path on `pdf == 0`.
    fn rejected(dir: Vec3) -> Self {
        Self {
            dir,
            pdf: 0.0,
            color: Color::ZERO,
        }
    }

    /// Guard against corner cases (zero pdf, direction on the wrong side
    /// of the geometric surface). `BELOW` expects the direction under the
    /// surface, as produced by refraction.
    fn checked<const BELOW: bool>(dir: Vec3, pdf: f32, color: Color, surf: &SurfaceParams) -> Self {
        let sign = dir.dot(surf.face_normal);
        if pdf > 0.0 && ((BELOW && sign < 0.0) || (!BELOW && sign > 0.0)) {
            Self { dir, pdf, color }
        } else {
            Self::rejected(dir)
        }
    }
}

/// Purely Lambertian reflection.
#[derive(Debug, Clone)]
pub struct DiffuseBsdf {
    pub albedo: Texture,
}

/// Specular lobe of the normalized (physically plausible) Phong model.
#[derive(Debug, Clone)]
pub struct GlossyPhongBsdf {
    pub albedo: Texture,
    ns: f32,
    ks: f32,
}

impl GlossyPhongBsdf {
    pub fn new(albedo: Texture, ns: f32) -> Self {
        Self {
            albedo,
            ns,
            ks: (ns + 2.0) / (2.0 * PI),
        }
    }

    fn reflect_cosine(&self, in_dir: Vec3, surf: &SurfaceParams, out: Vec3) -> f32 {
        in_dir.dot(reflect(out, surf.frame.n)).max(0.0)
    }
}

/// Perfect mirror.
#[derive(Debug, Clone)]
pub struct MirrorBsdf {
    pub ks: Color,
}

/// Smooth separation between two media (glass when `kt` is high).
#[derive(Debug, Clone)]
pub struct GlassBsdf {
    eta: f32,
    ks: Color,
    kt: Color,
}

impl GlassBsdf {
    /// `n1` is the outside medium, `n2` the inside one.
    pub fn new(n1: f32, n2: f32, ks: Color, kt: Color) -> Self {
        Self {
            eta: n1 / n2,
            ks,
            kt,
        }
    }

    /// Unpolarized Fresnel reflectance from the relative IOR and the
    /// cosines of the incident and transmitted directions.
    fn fresnel_factor(k: f32, cos_i: f32, cos_t: f32) -> f32 {
        let r_s = (k * cos_i - cos_t) / (k * cos_i + cos_t);
        let r_p = (cos_i - k * cos_t) / (cos_i + k * cos_t);
        (r_s * r_s + r_p * r_p) * 0.5
    }
}

/// Convex combination of two BSDFs: `(1 - k) * a + k * b`.
#[derive(Debug, Clone)]
pub struct CombineBsdf {
    ty: BsdfType,
    a: Box<Bsdf>,
    b: Box<Bsdf>,
    k: f32,
}

impl CombineBsdf {
    pub fn new(a: Bsdf, b: Bsdf, k: f32) -> Self {
        // The combined shape is the broader of the children; a specular
        // child never widens the result.
        let ty = match (a.ty(), b.ty()) {
            (BsdfType::Specular, BsdfType::Specular) => BsdfType::Specular,
            (BsdfType::Diffuse, _) | (_, BsdfType::Diffuse) => BsdfType::Diffuse,
            _ => BsdfType::Glossy,
        };
        Self {
            ty,
            a: Box::new(a),
            b: Box::new(b),
            k,
        }
    }
}

/// A surface scattering model, tagged by shape class.
#[derive(Debug, Clone)]
pub enum Bsdf {
    Diffuse(DiffuseBsdf),
    GlossyPhong(GlossyPhongBsdf),
    Mirror(MirrorBsdf),
    Glass(GlassBsdf),
    Combine(CombineBsdf),
}

const KD: f32 = 1.0 / PI;

impl Bsdf {
    /// Shape class, used to make sampling decisions.
    pub fn ty(&self) -> BsdfType {
        match self {
            Bsdf::Diffuse(_) => BsdfType::Diffuse,
            Bsdf::GlossyPhong(_) => BsdfType::Glossy,
            Bsdf::Mirror(_) | Bsdf::Glass(_) => BsdfType::Specular,
            Bsdf::Combine(c) => c.ty,
        }
    }

    /// Evaluate the BSDF for a pair of directions. Dirac lobes and
    /// directions below the shading hemisphere evaluate to zero. Does
    /// not include the cosine term.
    pub fn eval(&self, in_dir: Vec3, surf: &SurfaceParams, out: Vec3) -> Color {
        match self {
            Bsdf::Diffuse(d) => {
                if in_dir.dot(surf.frame.n) <= 0.0 || out.dot(surf.frame.n) <= 0.0 {
                    return Color::ZERO;
                }
                d.albedo.sample(surf.uv.x, surf.uv.y) * KD
            }
            Bsdf::GlossyPhong(g) => {
                if in_dir.dot(surf.frame.n) <= 0.0 || out.dot(surf.frame.n) <= 0.0 {
                    return Color::ZERO;
                }
                let p = g.reflect_cosine(in_dir, surf, out);
                g.albedo.sample(surf.uv.x, surf.uv.y) * (p.powf(g.ns) * g.ks)
            }
            Bsdf::Mirror(_) | Bsdf::Glass(_) => Color::ZERO,
            Bsdf::Combine(c) => c
                .a
                .eval(in_dir, surf, out)
                .lerp(c.b.eval(in_dir, surf, out), c.k),
        }
    }

    /// Probability of sampling `in_dir` with [`Bsdf::sample`], in solid
    /// angle. Zero for Dirac lobes.
    pub fn pdf(&self, in_dir: Vec3, surf: &SurfaceParams, out: Vec3) -> f32 {
        match self {
            Bsdf::Diffuse(_) => cosine_hemisphere_pdf(in_dir.dot(surf.frame.n)),
            Bsdf::GlossyPhong(g) => {
                cosine_power_hemisphere_pdf(g.reflect_cosine(in_dir, surf, out), g.ns)
            }
            Bsdf::Mirror(_) | Bsdf::Glass(_) => 0.0,
            Bsdf::Combine(c) => lerp(
                c.a.pdf(in_dir, surf, out),
                c.b.pdf(in_dir, surf, out),
                c.k,
            ),
        }
    }

    /// Sample an incoming direction for the given outgoing one. The
    /// returned color does not include the cosine term. `adjoint` marks
    /// light-to-sensor transport (photon tracing), which scales refracted
    /// throughput by the squared relative IOR.
    pub fn sample(
        &self,
        sampler: &mut UniformSampler,
        surf: &SurfaceParams,
        out: Vec3,
        adjoint: bool,
    ) -> BsdfSample {
        match self {
            Bsdf::Diffuse(d) => {
                let s = sample_cosine_hemisphere(&surf.frame, sampler.next(), sampler.next());
                let color = d.albedo.sample(surf.uv.x, surf.uv.y) * KD;
                BsdfSample::checked::<false>(s.dir, s.pdf, color, surf)
            }
            Bsdf::GlossyPhong(g) => {
                let lobe = LocalFrame::from_normal(reflect(out, surf.frame.n));
                let s = sample_cosine_power_hemisphere(&lobe, g.ns, sampler.next(), sampler.next());
                let p = g.reflect_cosine(s.dir, surf, out);
                let color = g.albedo.sample(surf.uv.x, surf.uv.y) * (p.powf(g.ns) * g.ks);
                BsdfSample::checked::<false>(s.dir, s.pdf, color, surf)
            }
            Bsdf::Mirror(m) => {
                let dir = reflect(out, surf.frame.n);
                let cos = dir.dot(surf.frame.n).abs().max(1e-6);
                BsdfSample::checked::<false>(dir, 1.0, m.ks / cos, surf)
            }
            Bsdf::Glass(g) => {
                let k = if surf.entering { g.eta } else { 1.0 / g.eta };
                let n = surf.frame.n;
                let cos_i = out.dot(n);
                let cos2_t = 1.0 - k * k * (1.0 - cos_i * cos_i);
                if cos2_t > 0.0 {
                    // Refraction, unless the Fresnel term reflects us
                    let cos_t = cos2_t.sqrt();
                    let f = GlassBsdf::fresnel_factor(k, cos_i, cos_t);
                    if sampler.next() > f {
                        let t = (k * cos_i - cos_t) * n - k * out;
                        let adjoint_term = if adjoint { k * k } else { 1.0 };
                        let color = g.kt * (adjoint_term / cos_t.max(1e-6));
                        return BsdfSample::checked::<true>(t, 1.0, color, surf);
                    }
                }
                // Reflection (including total internal reflection)
                let dir = reflect(out, n);
                let cos = dir.dot(n).abs().max(1e-6);
                BsdfSample::checked::<false>(dir, 1.0, g.ks / cos, surf)
            }
            Bsdf::Combine(c) => {
                let use_b = sampler.next() < c.k;
                let (chosen, other) = if use_b { (&c.b, &c.a) } else { (&c.a, &c.b) };
                let mut sample = chosen.sample(sampler, surf, out, adjoint);
                if sample.pdf <= 0.0 {
                    return BsdfSample::rejected(sample.dir);
                }
                let other_pdf = other.pdf(sample.dir, surf, out);
                let other_color = other.eval(sample.dir, surf, out);
                if use_b {
                    sample.pdf = lerp(other_pdf, sample.pdf, c.k);
                    sample.color = other_color.lerp(sample.color, c.k);
                } else {
                    sample.pdf = lerp(sample.pdf, other_pdf, c.k);
                    sample.color = sample.color.lerp(other_color, c.k);
                }
                sample
            }
        }
    }
}

/// Reflect a direction pointing away from the surface about a normal.
#[inline]
fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    2.0 * v.dot(n) * n - v
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_uniform_sphere;

    fn test_surf() -> SurfaceParams {
        let n = Vec3::Z;
        SurfaceParams {
            entering: true,
            point: Vec3::ZERO,
            uv: lumo_math::Vec2::new(0.3, 0.7),
            face_normal: n,
            frame: LocalFrame::from_normal(n),
        }
    }

    fn hemisphere_dir(sampler: &mut UniformSampler) -> Vec3 {
        loop {
            let d = sample_uniform_sphere(sampler.next(), sampler.next()).dir;
            if d.z > 1e-3 {
                return d;
            }
        }
    }

    #[test]
    fn test_reciprocity_diffuse_glossy() {
        let surf = test_surf();
        let bsdfs = [
            Bsdf::Diffuse(DiffuseBsdf {
                albedo: Texture::Constant(Color::splat(0.8)),
            }),
            Bsdf::GlossyPhong(GlossyPhongBsdf::new(
                Texture::Constant(Color::splat(0.9)),
                32.0,
            )),
        ];
        let mut sampler = UniformSampler::new(0);
        for bsdf in &bsdfs {
            for _ in 0..500 {
                let wi = hemisphere_dir(&mut sampler);
                let wo = hemisphere_dir(&mut sampler);
                let a = bsdf.eval(wi, &surf, wo);
                let b = bsdf.eval(wo, &surf, wi);
                let m = a.max_element().max(b.max_element()).max(1e-8);
                assert!((a - b).abs().max_element() / m <= 1e-5);
            }
        }
    }

    #[test]
    fn test_sample_matches_pdf() {
        let surf = test_surf();
        let bsdf = Bsdf::GlossyPhong(GlossyPhongBsdf::new(Texture::Constant(Color::ONE), 16.0));
        let out = Vec3::new(0.3, 0.1, 0.9).normalize();
        let mut sampler = UniformSampler::new(1);
        for _ in 0..1000 {
            let s = bsdf.sample(&mut sampler, &surf, out, false);
            if s.pdf > 0.0 {
                let p = bsdf.pdf(s.dir, &surf, out);
                assert!((s.pdf - p).abs() <= 1e-3 * s.pdf.max(1.0));
            }
        }
    }

    #[test]
    fn test_mirror_reflects() {
        let surf = test_surf();
        let bsdf = Bsdf::Mirror(MirrorBsdf {
            ks: Color::splat(0.9),
        });
        let out = Vec3::new(1.0, 0.0, 1.0).normalize();
        let mut sampler = UniformSampler::new(2);
        let s = bsdf.sample(&mut sampler, &surf, out, false);
        assert!(s.pdf > 0.0);
        let expected = Vec3::new(-out.x, -out.y, out.z);
        assert!((s.dir - expected).length() < 1e-6);
        assert_eq!(bsdf.ty(), BsdfType::Specular);
        assert_eq!(bsdf.eval(s.dir, &surf, out), Color::ZERO);
    }

    #[test]
    fn test_glass_refracts_down() {
        let surf = test_surf();
        let bsdf = Bsdf::Glass(GlassBsdf::new(1.0, 1.5, Color::ONE, Color::ONE));
        let out = Vec3::new(0.4, 0.0, 0.9165151).normalize();
        let mut sampler = UniformSampler::new(3);
        let mut saw_refraction = false;
        let mut saw_reflection = false;
        for _ in 0..200 {
            let s = bsdf.sample(&mut sampler, &surf, out, false);
            assert!(s.pdf > 0.0);
            if s.dir.z < 0.0 {
                saw_refraction = true;
            } else {
                saw_reflection = true;
            }
        }
        assert!(saw_refraction && saw_reflection);
    }

    #[test]
    fn test_combine_type_and_mix() {
        let diffuse = Bsdf::Diffuse(DiffuseBsdf {
            albedo: Texture::Constant(Color::splat(0.5)),
        });
        let glossy = Bsdf::GlossyPhong(GlossyPhongBsdf::new(Texture::Constant(Color::ONE), 8.0));
        let mirror = Bsdf::Mirror(MirrorBsdf { ks: Color::ONE });

        let both = Bsdf::Combine(CombineBsdf::new(diffuse.clone(), glossy.clone(), 0.5));
        assert_eq!(both.ty(), BsdfType::Diffuse);
        let coated = Bsdf::Combine(CombineBsdf::new(glossy.clone(), mirror, 0.3));
        assert_eq!(coated.ty(), BsdfType::Glossy);

        // Mixed eval interpolates the children
        let surf = test_surf();
        let wi = Vec3::new(0.1, 0.2, 0.97).normalize();
        let wo = Vec3::new(-0.3, 0.1, 0.95).normalize();
        let e = both.eval(wi, &surf, wo);
        let expected = diffuse.eval(wi, &surf, wo).lerp(glossy.eval(wi, &surf, wo), 0.5);
        assert!((e - expected).length() < 1e-6);
    }
}
