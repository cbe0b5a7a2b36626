//! Unidirectional path tracer with next-event estimation, multiple
//! importance sampling and Russian Roulette.

use crate::{par_tiles, BsdfType, Image, Renderer, Scene, UniformSampler, Color, RAY_OFFSET};
use lumo_math::{Ray, Vec4};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Default maximum path length of the path tracer.
pub const DEFAULT_MAX_PATH_LEN: usize = 64;

/// Path-tracing renderer.
///
/// Direct light is sampled at every non-specular vertex and combined
/// with BSDF sampling through the balance heuristic: the explicit
/// connection is weighted by `light_pdf / (light_pdf + bsdf_pdf)` and a
/// BSDF-sampled emitter hit by `bsdf_pdf / (bsdf_pdf + light_pdf)`.
/// Emitter hits on the primary ray or after a specular bounce keep full
/// weight.
pub struct PathTracer<'a> {
    scene: &'a Scene,
    max_path_len: usize,
    iter: u64,
    cancel: Arc<AtomicBool>,
}

impl<'a> PathTracer<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        Self::with_max_path_len(scene, DEFAULT_MAX_PATH_LEN)
    }

    pub fn with_max_path_len(scene: &'a Scene, max_path_len: usize) -> Self {
        Self {
            scene,
            max_path_len,
            iter: 1,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag an embedding interactive loop can set to stop between tiles.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn path_trace(&self, mut ray: Ray, sampler: &mut UniformSampler) -> Color {
        let scene = self.scene;
        let mut color = Color::ZERO;
        let mut throughput = Color::ONE;

        // MIS state of the bounce that produced the current ray
        let mut prev_pdf = 0.0f32;
        let mut prev_point = ray.org;
        let mut specular_bounce = true;

        ray.tmin = RAY_OFFSET;
        for path_len in 0..self.max_path_len {
            let hit = scene.intersect(&ray);
            if !hit.is_hit() {
                break;
            }

            let surf = scene.surface_params(&ray, &hit);
            let mat = scene.material(&hit);
            let out = -ray.dir;

            // Direct hits on a light source
            if surf.entering {
                if let Some(light) = scene.emitter(&hit) {
                    let weight = if specular_bounce {
                        1.0
                    } else {
                        let light_pdf = light.pdf_direct(prev_point, surf.point);
                        if prev_pdf + light_pdf > 0.0 {
                            prev_pdf / (prev_pdf + light_pdf)
                        } else {
                            0.0
                        }
                    };
                    color += throughput * light.emission(out, hit.u, hit.v) * weight;
                }
            }

            // Materials without BSDFs act like black bodies
            let Some(bsdf) = &mat.bsdf else { break };
            let specular = bsdf.ty() == BsdfType::Specular;

            // Next event estimation
            if !specular && !scene.lights.is_empty() {
                let num_lights = scene.lights.len();
                let light_idx = ((sampler.next() * num_lights as f32) as usize).min(num_lights - 1);
                let light_select_prob = 1.0 / num_lights as f32;
                let light = &scene.lights[light_idx];

                let ls = light.sample_direct(surf.point, sampler);
                let to_light = ls.pos - surf.point;
                let dist = to_light.length();
                if dist > RAY_OFFSET {
                    let wi = to_light / dist;
                    let shadow_ray = Ray::new(surf.point, wi, RAY_OFFSET, dist - RAY_OFFSET);
                    if !scene.occluded(&shadow_ray) {
                        let bsdf_val = bsdf.eval(wi, &surf, out);
                        let bsdf_pdf = bsdf.pdf(wi, &surf, out);

                        // Convert area pdfs to solid angle for the weight
                        let light_pdf = if light.has_area() {
                            ls.pdf_area * dist * dist / ls.cos
                        } else {
                            ls.pdf_dir
                        };
                        let sum_pdf = light_pdf + bsdf_pdf;
                        let w_nee = if sum_pdf > 0.0 { light_pdf / sum_pdf } else { 0.0 };

                        let li = if light.has_area() {
                            ls.intensity
                        } else {
                            ls.intensity / (dist * dist)
                        };
                        let cos_theta = wi.dot(surf.frame.n).abs();
                        if light_pdf > 0.0 {
                            color += throughput * bsdf_val * li * cos_theta * w_nee
                                / (light_pdf * light_select_prob);
                        }
                    }
                }
            }

            // Russian Roulette
            if path_len > 3 {
                let q = throughput.max_element().min(0.95);
                if sampler.next() > q {
                    break;
                }
                throughput /= q;
            }

            // Sample the next direction
            let sample = bsdf.sample(sampler, &surf, out, false);
            if sample.pdf <= 0.0 {
                break;
            }
            let cos_theta = sample.dir.dot(surf.frame.n).abs();
            throughput *= sample.color * cos_theta / sample.pdf;

            prev_pdf = if specular { 0.0 } else { sample.pdf };
            prev_point = surf.point;
            specular_bounce = specular;
            ray = Ray::with_offset(surf.point, sample.dir, RAY_OFFSET);
        }

        color
    }
}

impl Renderer for PathTracer<'_> {
    fn name(&self) -> &'static str {
        "pt"
    }

    fn reset(&mut self) {
        self.iter = 1;
    }

    fn render(&mut self, img: &mut Image) {
        let kx = 2.0 / (img.width() - 1).max(1) as f32;
        let ky = 2.0 / (img.height() - 1).max(1) as f32;

        par_tiles(img, self.iter, &self.cancel, |tile, sampler, buf| {
            for local_y in 0..tile.height {
                for local_x in 0..tile.width {
                    let x = tile.x + local_x;
                    let y = tile.y + local_y;
                    let ray = self.scene.camera.gen_ray(
                        (x as f32 + sampler.next()) * kx - 1.0,
                        1.0 - (y as f32 + sampler.next()) * ky,
                    );
                    let c = self.path_trace(ray, sampler);
                    buf[local_y * tile.width + local_x] = Vec4::new(c.x, c.y, c.z, 1.0);
                }
            }
        });
        self.iter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bsdf, Camera, DiffuseBsdf, Material, MirrorBsdf, Texture};
    use lumo_math::Vec3;

    /// Closed box with inward-facing walls, all emitting the same
    /// radiance, around a white Lambertian floor. Every pixel of a path
    /// traced render must converge to the wall radiance (furnace test).
    fn furnace_scene(radiance: f32) -> Scene {
        let mut verts = Vec::new();
        let mut indices = Vec::new();
        let s = 5.0;
        let corners = [
            Vec3::new(-s, -s, -s),
            Vec3::new(s, -s, -s),
            Vec3::new(s, s, -s),
            Vec3::new(-s, s, -s),
            Vec3::new(-s, -s, s),
            Vec3::new(s, -s, s),
            Vec3::new(s, s, s),
            Vec3::new(-s, s, s),
        ];
        verts.extend_from_slice(&corners);
        // Inward-facing quads of the cube (material 0 = emitter)
        let quads: [[u32; 4]; 6] = [
            [0, 1, 2, 3], // back (z = -s)
            [5, 4, 7, 6], // front
            [4, 0, 3, 7], // left
            [1, 5, 6, 2], // right
            [3, 2, 6, 7], // top
            [0, 4, 5, 1], // bottom
        ];
        for q in quads {
            indices.extend_from_slice(&[q[0], q[1], q[2], 0]);
            indices.extend_from_slice(&[q[0], q[2], q[3], 0]);
        }

        // White Lambertian floor patch in the middle (material 1)
        let base = verts.len() as u32;
        verts.extend_from_slice(&[
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
        ]);
        indices.extend_from_slice(&[base, base + 2, base + 1, 1]);
        indices.extend_from_slice(&[base, base + 3, base + 2, 1]);

        let normals = vec![Vec3::Y; verts.len()];
        let materials = vec![
            Material::emissive(Color::splat(radiance)),
            Material::new(Bsdf::Diffuse(DiffuseBsdf {
                albedo: Texture::Constant(Color::ONE),
            })),
        ];
        let camera = Camera::new(Vec3::new(0.0, 3.0, 0.0), Vec3::ZERO, Vec3::Z, 40.0, 1.0);
        Scene::new(verts, indices, normals, materials, Vec::new(), camera).unwrap()
    }

    #[test]
    fn test_furnace() {
        let radiance = 0.8;
        let scene = furnace_scene(radiance);
        let mut img = Image::new(8, 8);
        let mut pt = PathTracer::new(&scene);
        for _ in 0..2048 {
            pt.render(&mut img);
        }

        let mut mean = 0.0;
        for y in 0..8 {
            for x in 0..8 {
                mean += img.mean(x, y).x;
            }
        }
        mean /= 64.0;
        assert!(
            (mean - radiance).abs() / radiance < 0.02,
            "furnace mean = {mean}, expected {radiance}"
        );
    }

    #[test]
    fn test_mirror_path_reaches_light() {
        // Camera looks at a mirror tilted 45 degrees; the light sits
        // where the reflected ray goes. No NEE happens at the specular
        // vertex, yet the emitter is still found through the mirror.
        let verts = vec![
            // Mirror quad in the x=0 plane rotated so its normal is
            // halfway between +z and +y: use a quad in the plane y = -z
            Vec3::new(-1.0, -1.0, -3.0),
            Vec3::new(1.0, -1.0, -3.0),
            Vec3::new(1.0, 1.0, -5.0),
            Vec3::new(-1.0, 1.0, -5.0),
            // Emissive quad above the camera, facing down
            Vec3::new(-1.0, 4.0, -3.5),
            Vec3::new(1.0, 4.0, -3.5),
            Vec3::new(1.0, 4.0, -5.5),
            Vec3::new(-1.0, 4.0, -5.5),
        ];
        let n_mirror = Vec3::new(0.0, 1.0, 1.0).normalize();
        let normals = vec![
            n_mirror, n_mirror, n_mirror, n_mirror,
            -Vec3::Y, -Vec3::Y, -Vec3::Y, -Vec3::Y,
        ];
        let indices = vec![
            0, 1, 2, 0, 0, 2, 3, 0, // mirror (material 0)
            4, 6, 5, 1, 4, 7, 6, 1, // light (material 1)
        ];
        let materials = vec![
            Material::new(Bsdf::Mirror(MirrorBsdf {
                ks: Color::splat(0.9),
            })),
            Material::emissive(Color::splat(2.0)),
        ];
        let camera = Camera::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -4.0), Vec3::Y, 45.0, 1.0);
        let scene = Scene::new(verts, indices, normals, materials, Vec::new(), camera).unwrap();

        let mut img = Image::new(32, 32);
        let mut pt = PathTracer::new(&scene);
        for _ in 0..8 {
            pt.render(&mut img);
        }

        // The center of the mirror reflects the light: 0.9 * 2.0
        let center = img.mean(16, 16);
        assert!(
            (center.x - 1.8).abs() / 1.8 < 0.05,
            "mirror reflection = {center:?}"
        );
    }
}
