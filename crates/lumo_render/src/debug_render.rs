//! Normal-shading debug renderer.

use crate::{par_tiles, Image, Renderer, Scene};
use lumo_math::Vec4;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Renders `|n . dir|` of the interpolated shading normal as grayscale.
/// Useful to check scene loading, normals and the BVH at interactive
/// rates.
pub struct DebugRenderer<'a> {
    scene: &'a Scene,
    iter: u64,
    cancel: Arc<AtomicBool>,
}

impl<'a> DebugRenderer<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        Self {
            scene,
            iter: 1,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag an embedding interactive loop can set to stop between tiles.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }
}

impl Renderer for DebugRenderer<'_> {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn reset(&mut self) {
        self.iter = 1;
    }

    fn render(&mut self, img: &mut Image) {
        let scene = self.scene;
        let kx = 2.0 / (img.width() - 1).max(1) as f32;
        let ky = 2.0 / (img.height() - 1).max(1) as f32;

        par_tiles(img, self.iter, &self.cancel, |tile, sampler, buf| {
            for local_y in 0..tile.height {
                for local_x in 0..tile.width {
                    let x = tile.x + local_x;
                    let y = tile.y + local_y;
                    let ray = scene.camera.gen_ray(
                        (x as f32 + sampler.next()) * kx - 1.0,
                        1.0 - (y as f32 + sampler.next()) * ky,
                    );

                    let hit = scene.intersect(&ray);
                    if hit.is_hit() {
                        let tri = hit.tri as usize;
                        let n0 = scene.normals[scene.indices[tri * 4] as usize];
                        let n1 = scene.normals[scene.indices[tri * 4 + 1] as usize];
                        let n2 = scene.normals[scene.indices[tri * 4 + 2] as usize];
                        let n = (n0 * (1.0 - hit.u - hit.v) + n1 * hit.u + n2 * hit.v)
                            .normalize_or_zero();
                        let k = n.dot(ray.dir).abs();
                        buf[local_y * tile.width + local_x] = Vec4::new(k, k, k, 1.0);
                    }
                }
            }
        });
        self.iter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bsdf, Camera, Color, DiffuseBsdf, Material, Texture};
    use lumo_math::Vec3;

    #[test]
    fn test_debug_render_quad() {
        // A camera-facing quad fills the image center
        let verts = vec![
            Vec3::new(-1.0, -1.0, -3.0),
            Vec3::new(1.0, -1.0, -3.0),
            Vec3::new(1.0, 1.0, -3.0),
            Vec3::new(-1.0, 1.0, -3.0),
        ];
        let normals = vec![Vec3::Z; 4];
        let indices = vec![0, 1, 2, 0, 0, 2, 3, 0];
        let materials = vec![Material::new(Bsdf::Diffuse(DiffuseBsdf {
            albedo: Texture::Constant(Color::splat(0.5)),
        }))];
        let camera = Camera::new(Vec3::ZERO, -Vec3::Z, Vec3::Y, 60.0, 1.0);
        let scene = Scene::new(verts, indices, normals, materials, Vec::new(), camera).unwrap();

        let mut img = Image::new(64, 64);
        let mut renderer = DebugRenderer::new(&scene);
        renderer.render(&mut img);

        // Center pixels see the quad head-on at full brightness
        let center = img.mean(32, 32);
        assert!(center.x > 0.9 && center.x <= 1.0, "center = {center:?}");
        // Every accumulated mean stays in [0, 1]
        for y in 0..64 {
            for x in 0..64 {
                let m = img.mean(x, y);
                assert!(m.min_element() >= 0.0 && m.max_element() <= 1.0);
            }
        }
    }
}
