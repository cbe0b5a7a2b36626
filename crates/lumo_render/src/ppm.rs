//! Progressive photon mapping.
//!
//! Every iteration traces one light path per pixel, rebuilds the photon
//! hash grid with a shrinking kernel radius, then gathers at the first
//! non-specular vertex of every eye path. The estimator is biased for
//! any fixed radius but consistent: the radius schedule drives the bias
//! to zero while keeping variance bounded.

use crate::{
    luma, par_tiles, sampler_seed, BsdfType, Color, HashGrid, Image, Renderer, Scene,
    SurfaceParams, UniformSampler, RAY_OFFSET,
};
use lumo_math::{Ray, Vec3, Vec4};
use rayon::prelude::*;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Radius-shrink exponent: `radius_i = base * i^{-(1 - PPM_ALPHA) / 2}`.
pub const PPM_ALPHA: f32 = 0.75;

/// Maximum eye-path length (specular chains only).
pub const PPM_EYE_MAX_PATH_LEN: usize = 10;

/// Default maximum light-path length.
pub const PPM_MAX_PATH_LEN: usize = 64;

/// Light paths per photon batch; batches merge under one mutex.
const PHOTON_BATCH_SIZE: usize = 32;

/// A stored photon: path contribution arriving at a surface vertex.
struct Photon {
    contrib: Color,
    surf: SurfaceParams,
    in_dir: Vec3,
}

/// Progressive photon mapping renderer.
pub struct PhotonMapper<'a> {
    scene: &'a Scene,
    max_path_len: usize,
    iter: u64,
    base_radius: f32,
    radius: f32,
    photons: Vec<Photon>,
    grid: Option<HashGrid>,
    cancel: Arc<AtomicBool>,
}

impl<'a> PhotonMapper<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        Self::with_max_path_len(scene, PPM_MAX_PATH_LEN)
    }

    pub fn with_max_path_len(scene: &'a Scene, max_path_len: usize) -> Self {
        Self {
            scene,
            max_path_len,
            iter: 1,
            base_radius: 1.0,
            radius: 1.0,
            photons: Vec::new(),
            grid: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag an embedding interactive loop can set to stop between photon
    /// batches and tiles.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Current gather radius.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Photons stored by the last iteration.
    pub fn photon_count(&self) -> usize {
        self.photons.len()
    }

    /// Trace one light path, storing a photon at every non-specular
    /// vertex.
    fn trace_photons(&self, photons: &mut Vec<Photon>, sampler: &mut UniformSampler) {
        let scene = self.scene;
        if scene.lights.is_empty() {
            return;
        }

        // Choose a light to sample from (uniformly)
        let num_lights = scene.lights.len();
        let light_idx = ((sampler.next() * num_lights as f32) as usize).min(num_lights - 1);
        let emission = scene.lights[light_idx].sample_emission(sampler);

        let pdf = emission.pdf_area * emission.pdf_dir * (1.0 / num_lights as f32);
        if pdf <= 0.0 {
            return;
        }
        let mut contrib = emission.intensity / pdf;
        let mut ray = Ray::with_offset(emission.pos, emission.dir, RAY_OFFSET);

        for path_len in 0..self.max_path_len {
            let hit = scene.intersect(&ray);
            if !hit.is_hit() {
                break;
            }

            let surf = scene.surface_params(&ray, &hit);
            let mat = scene.material(&hit);
            let out = -ray.dir;
            let Some(bsdf) = &mat.bsdf else { break };

            // Store the incident photon; merging at specular vertices is
            // not possible, so they keep nothing.
            if bsdf.ty() != BsdfType::Specular {
                photons.push(Photon {
                    contrib,
                    surf,
                    in_dir: out,
                });
            }

            // Continue the adjoint walk
            let sample = bsdf.sample(sampler, &surf, out, true);
            if sample.pdf <= 0.0 {
                break;
            }
            contrib *= sample.color * sample.dir.dot(surf.face_normal).abs() / sample.pdf;
            ray = Ray::with_offset(surf.point, sample.dir, RAY_OFFSET);

            // Russian Roulette
            if path_len > 2 {
                let q = luma(contrib).min(0.95);
                if q <= 0.0 || sampler.next() > q {
                    break;
                }
                contrib /= q;
            }
        }
    }

    /// Walk specular chains deterministically and gather photon density
    /// at the first non-specular vertex. The walk is weightless: no BSDF
    /// color accumulates along the chain.
    fn trace_eye_path(
        &self,
        mut ray: Ray,
        sampler: &mut UniformSampler,
        light_path_count: usize,
    ) -> Color {
        let scene = self.scene;
        let mut color = Color::ZERO;

        ray.tmin = RAY_OFFSET;
        for _ in 0..PPM_EYE_MAX_PATH_LEN {
            let hit = scene.intersect(&ray);
            if !hit.is_hit() {
                break;
            }

            let surf = scene.surface_params(&ray, &hit);
            let mat = scene.material(&hit);
            let out = -ray.dir;

            if surf.entering {
                if let Some(light) = scene.emitter(&hit) {
                    color += light.emission(out, hit.u, hit.v);
                }
            }

            let Some(bsdf) = &mat.bsdf else { break };

            if bsdf.ty() != BsdfType::Specular {
                let Some(grid) = &self.grid else { break };
                let r2 = self.radius * self.radius;
                let norm = 3.0 / (4.0 * PI * r2 * light_path_count as f32);
                let mut accumulated = Color::ZERO;
                grid.query(
                    surf.point,
                    |i| self.photons[i].surf.point,
                    |i, d2| {
                        let p = &self.photons[i];
                        // Epanechnikov kernel in the normalized distance
                        let w = 0.75 * (1.0 - d2 / r2);
                        let bsdf_val = bsdf.eval(p.in_dir, &surf, out);
                        accumulated += bsdf_val
                            * p.contrib
                            * p.in_dir.dot(surf.frame.n).abs()
                            * (w * norm);
                    },
                );
                return color + accumulated;
            }

            let sample = bsdf.sample(sampler, &surf, out, false);
            if sample.pdf <= 0.0 {
                break;
            }
            ray = Ray::with_offset(surf.point, sample.dir, RAY_OFFSET);
        }

        color
    }

    /// Mean world-space distance between neighboring camera rays sampled
    /// on an 8-pixel grid; seeds the initial gather radius.
    fn estimate_pixel_size(&self, width: usize, height: usize) -> f32 {
        let scene = self.scene;
        let kx = 2.0 / (width - 1).max(1) as f32;
        let ky = 2.0 / (height - 1).max(1) as f32;

        let (total_dist, total_count) = (0..height.div_ceil(8))
            .into_par_iter()
            .map(|ybin| {
                let y = ybin * 8;
                let mut d = 0.0f32;
                let mut c = 0u32;
                for x in (0..width).step_by(8) {
                    let mut rays = [Ray::with_offset(Vec3::ZERO, Vec3::Z, 0.0); 4];
                    let mut hits = [crate::Hit::none(); 4];
                    for i in 0..4 {
                        rays[i] = scene.camera.gen_ray(
                            (x + if i % 2 == 1 { 4 } else { 0 }) as f32 * kx - 1.0,
                            1.0 - (y + if i / 2 == 1 { 4 } else { 0 }) as f32 * ky,
                        );
                        hits[i] = scene.intersect(&rays[i]);
                    }
                    let mut eval_distance = |i: usize, j: usize| {
                        if hits[i].tri >= 0 && hits[i].tri == hits[j].tri {
                            d += (rays[i].at(hits[i].t) - rays[j].at(hits[j].t)).length();
                            c += 1;
                        }
                    };
                    eval_distance(0, 1);
                    eval_distance(2, 3);
                    eval_distance(0, 2);
                    eval_distance(1, 3);
                }
                (d, c)
            })
            .reduce(|| (0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

        if total_count > 0 {
            total_dist / (4 * total_count) as f32
        } else {
            1.0
        }
    }
}

impl Renderer for PhotonMapper<'_> {
    fn name(&self) -> &'static str {
        "ppm"
    }

    fn reset(&mut self) {
        self.iter = 1;
    }

    fn render(&mut self, img: &mut Image) {
        let width = img.width();
        let height = img.height();
        if self.iter == 1 {
            self.base_radius = 2.0 * self.estimate_pixel_size(width, height);
        }

        // Photon pass: one light path per pixel, traced in batches with
        // thread-local buffers. The merge below is the only lock in the
        // render path.
        let light_path_count = width * height;
        let mut photons = std::mem::take(&mut self.photons);
        photons.clear();
        let merged = Mutex::new(photons);

        let num_batches = light_path_count.div_ceil(PHOTON_BATCH_SIZE);
        (0..num_batches).into_par_iter().for_each(|batch| {
            if self.cancel.load(Ordering::Relaxed) {
                return;
            }
            let mut local = Vec::new();
            let mut sampler = UniformSampler::new(sampler_seed(batch as u64, self.iter));
            let paths = PHOTON_BATCH_SIZE.min(light_path_count - batch * PHOTON_BATCH_SIZE);
            for _ in 0..paths {
                self.trace_photons(&mut local, &mut sampler);
            }
            merged.lock().unwrap().append(&mut local);
        });
        self.photons = merged.into_inner().unwrap();

        // Build the photon map with the shrunk kernel radius
        self.radius =
            self.base_radius / (self.iter as f32).powf(0.5 * (1.0 - PPM_ALPHA));
        let photons = &self.photons;
        self.grid = Some(HashGrid::build(
            |i| photons[i].surf.point,
            photons.len(),
            self.radius,
        ));
        log::debug!(
            "PPM iteration {}: {} photons, radius {}",
            self.iter,
            self.photons.len(),
            self.radius
        );

        // Eye pass
        let this = &*self;
        let kx = 2.0 / (width - 1).max(1) as f32;
        let ky = 2.0 / (height - 1).max(1) as f32;
        par_tiles(img, this.iter, &this.cancel, |tile, sampler, buf| {
            for local_y in 0..tile.height {
                for local_x in 0..tile.width {
                    let x = tile.x + local_x;
                    let y = tile.y + local_y;
                    let ray = this.scene.camera.gen_ray(
                        (x as f32 + sampler.next()) * kx - 1.0,
                        1.0 - (y as f32 + sampler.next()) * ky,
                    );
                    let c = this.trace_eye_path(ray, sampler, light_path_count);
                    buf[local_y * tile.width + local_x] = Vec4::new(c.x, c.y, c.z, 1.0);
                }
            }
        });

        self.iter += 1;
    }
}
