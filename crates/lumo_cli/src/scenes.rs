//! Built-in test scenes.
//!
//! Scene files are the host application's concern; the renderer ships a
//! few scenes constructed in code so every algorithm can be exercised
//! out of the box.

use lumo_math::Vec3;
use lumo_render::{
    Bsdf, Camera, Color, CombineBsdf, DiffuseBsdf, GlassBsdf, GlossyPhongBsdf, Light, Material,
    MirrorBsdf, PointLight, Scene, SceneError, Texture,
};

/// Geometry under construction: vertex/normal/index accumulation with
/// the `4i + material` index layout.
#[derive(Default)]
struct SceneBuilder {
    verts: Vec<Vec3>,
    normals: Vec<Vec3>,
    indices: Vec<u32>,
}

impl SceneBuilder {
    /// Add a quad with an explicit shading normal. Winding determines
    /// the geometric front face.
    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3, material: u32) {
        let base = self.verts.len() as u32;
        self.verts.extend_from_slice(&corners);
        self.normals.extend(std::iter::repeat(normal).take(4));
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, material]);
        self.indices
            .extend_from_slice(&[base, base + 2, base + 3, material]);
    }

    /// Add a latitude/longitude sphere with smooth normals.
    fn push_sphere(&mut self, center: Vec3, radius: f32, stacks: u32, slices: u32, material: u32) {
        let base = self.verts.len() as u32;
        for i in 0..=stacks {
            let theta = std::f32::consts::PI * i as f32 / stacks as f32;
            for j in 0..=slices {
                let phi = 2.0 * std::f32::consts::PI * j as f32 / slices as f32;
                let n = Vec3::new(
                    theta.sin() * phi.cos(),
                    theta.cos(),
                    theta.sin() * phi.sin(),
                );
                self.verts.push(center + n * radius);
                self.normals.push(n);
            }
        }
        let ring = slices + 1;
        for i in 0..stacks {
            for j in 0..slices {
                let a = base + i * ring + j;
                let b = a + ring;
                self.indices.extend_from_slice(&[a, a + 1, b, material]);
                self.indices.extend_from_slice(&[a + 1, b + 1, b, material]);
            }
        }
    }
}

fn diffuse(color: Color) -> Material {
    Material::new(Bsdf::Diffuse(DiffuseBsdf {
        albedo: Texture::Constant(color),
    }))
}

/// Look up a built-in scene by name.
pub fn build(name: &str, aspect: f32) -> Option<Result<Scene, SceneError>> {
    match name {
        "cornell" => Some(cornell(aspect)),
        "spheres" => Some(spheres(aspect)),
        "caustic" => Some(caustic(aspect)),
        _ => None,
    }
}

/// The classic box: white floor/ceiling/back, red and green side walls,
/// one area light in the ceiling, a mirror sphere and a glossy sphere.
fn cornell(aspect: f32) -> Result<Scene, SceneError> {
    let mut b = SceneBuilder::default();

    // Walls of the [-1, 1] box, all facing inward
    let (lo, hi) = (-1.0, 1.0);
    b.push_quad(
        [
            Vec3::new(lo, lo, hi),
            Vec3::new(hi, lo, hi),
            Vec3::new(hi, lo, lo),
            Vec3::new(lo, lo, lo),
        ],
        Vec3::Y,
        0, // floor
    );
    b.push_quad(
        [
            Vec3::new(lo, hi, lo),
            Vec3::new(hi, hi, lo),
            Vec3::new(hi, hi, hi),
            Vec3::new(lo, hi, hi),
        ],
        -Vec3::Y,
        0, // ceiling
    );
    b.push_quad(
        [
            Vec3::new(lo, lo, lo),
            Vec3::new(hi, lo, lo),
            Vec3::new(hi, hi, lo),
            Vec3::new(lo, hi, lo),
        ],
        Vec3::Z,
        0, // back wall
    );
    b.push_quad(
        [
            Vec3::new(lo, lo, hi),
            Vec3::new(lo, lo, lo),
            Vec3::new(lo, hi, lo),
            Vec3::new(lo, hi, hi),
        ],
        Vec3::X,
        1, // left wall, red
    );
    b.push_quad(
        [
            Vec3::new(hi, lo, lo),
            Vec3::new(hi, lo, hi),
            Vec3::new(hi, hi, hi),
            Vec3::new(hi, hi, lo),
        ],
        -Vec3::X,
        2, // right wall, green
    );
    // Light panel just below the ceiling, facing down
    b.push_quad(
        [
            Vec3::new(-0.3, 0.99, -0.3),
            Vec3::new(0.3, 0.99, -0.3),
            Vec3::new(0.3, 0.99, 0.3),
            Vec3::new(-0.3, 0.99, 0.3),
        ],
        -Vec3::Y,
        3,
    );

    b.push_sphere(Vec3::new(-0.45, -0.65, -0.35), 0.35, 24, 48, 4);
    b.push_sphere(Vec3::new(0.45, -0.7, 0.2), 0.3, 24, 48, 5);

    let materials = vec![
        diffuse(Color::splat(0.75)),
        diffuse(Color::new(0.65, 0.06, 0.06)),
        diffuse(Color::new(0.08, 0.55, 0.09)),
        Material::emissive(Color::splat(10.0)),
        Material::new(Bsdf::Mirror(MirrorBsdf {
            ks: Color::splat(0.95),
        })),
        Material::new(Bsdf::Combine(CombineBsdf::new(
            Bsdf::Diffuse(DiffuseBsdf {
                albedo: Texture::Constant(Color::new(0.25, 0.25, 0.7)),
            }),
            Bsdf::GlossyPhong(GlossyPhongBsdf::new(
                Texture::Constant(Color::splat(0.9)),
                48.0,
            )),
            0.35,
        ))),
    ];

    let camera = Camera::new(
        Vec3::new(0.0, 0.0, 3.4),
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::Y,
        40.0,
        aspect,
    );
    Scene::new(b.verts, b.indices, b.normals, materials, Vec::new(), camera)
}

/// Mirror, glass and diffuse spheres over a checkered ground plane.
fn spheres(aspect: f32) -> Result<Scene, SceneError> {
    let mut b = SceneBuilder::default();

    let s = 8.0;
    b.push_quad(
        [
            Vec3::new(-s, 0.0, s),
            Vec3::new(s, 0.0, s),
            Vec3::new(s, 0.0, -s),
            Vec3::new(-s, 0.0, -s),
        ],
        Vec3::Y,
        0,
    );
    b.push_sphere(Vec3::new(-1.1, 0.5, 0.0), 0.5, 24, 48, 1);
    b.push_sphere(Vec3::new(0.0, 0.5, 0.0), 0.5, 24, 48, 2);
    b.push_sphere(Vec3::new(1.1, 0.5, 0.0), 0.5, 24, 48, 3);
    // Light panel overhead, facing down
    b.push_quad(
        [
            Vec3::new(-1.0, 3.0, -1.0),
            Vec3::new(1.0, 3.0, -1.0),
            Vec3::new(1.0, 3.0, 1.0),
            Vec3::new(-1.0, 3.0, 1.0),
        ],
        -Vec3::Y,
        4,
    );

    let materials = vec![
        Material::new(Bsdf::Diffuse(DiffuseBsdf {
            albedo: Texture::Checker {
                a: Color::splat(0.8),
                b: Color::splat(0.25),
                scale: 16.0,
            },
        })),
        Material::new(Bsdf::Mirror(MirrorBsdf {
            ks: Color::splat(0.92),
        })),
        Material::new(Bsdf::Glass(GlassBsdf::new(
            1.0,
            1.5,
            Color::ONE,
            Color::ONE,
        ))),
        diffuse(Color::new(0.7, 0.35, 0.12)),
        Material::emissive(Color::splat(6.0)),
    ];

    let camera = Camera::new(
        Vec3::new(0.0, 1.2, 3.5),
        Vec3::new(0.0, 0.5, 0.0),
        Vec3::Y,
        45.0,
        aspect,
    );
    Scene::new(b.verts, b.indices, b.normals, materials, Vec::new(), camera)
}

/// A glass sphere focusing a point light onto a diffuse floor.
fn caustic(aspect: f32) -> Result<Scene, SceneError> {
    let mut b = SceneBuilder::default();

    let s = 4.0;
    b.push_quad(
        [
            Vec3::new(-s, 0.0, s),
            Vec3::new(s, 0.0, s),
            Vec3::new(s, 0.0, -s),
            Vec3::new(-s, 0.0, -s),
        ],
        Vec3::Y,
        0,
    );
    b.push_sphere(Vec3::new(0.0, 1.0, 0.0), 0.45, 32, 64, 1);

    let materials = vec![
        diffuse(Color::splat(0.7)),
        Material::new(Bsdf::Glass(GlassBsdf::new(
            1.0,
            1.5,
            Color::ONE,
            Color::ONE,
        ))),
    ];

    let lights = vec![Light::Point(PointLight {
        pos: Vec3::new(0.0, 3.0, 0.0),
        intensity: Color::splat(8.0),
    })];

    let camera = Camera::new(
        Vec3::new(0.0, 2.2, 3.0),
        Vec3::new(0.0, 0.3, 0.0),
        Vec3::Y,
        45.0,
        aspect,
    );
    Scene::new(b.verts, b.indices, b.normals, materials, lights, camera)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_render::{DebugRenderer, Image, PathTracer, Renderer};

    #[test]
    fn test_all_scenes_build() {
        for name in ["cornell", "spheres", "caustic"] {
            let scene = build(name, 1.5).unwrap().unwrap();
            assert!(!scene.verts.is_empty());
            assert!(!scene.lights.is_empty(), "{name} has no lights");
        }
        assert!(build("nonexistent", 1.0).is_none());
    }

    #[test]
    fn test_cornell_camera_sees_the_box() {
        let scene = build("cornell", 1.0).unwrap().unwrap();
        let ray = scene.camera.gen_ray(0.0, 0.0);
        let hit = scene.intersect(&ray);
        assert!(hit.is_hit());
    }

    #[test]
    fn test_cornell_debug_render() {
        let scene = build("cornell", 1.0).unwrap().unwrap();
        let mut img = Image::new(128, 128);
        let mut renderer = DebugRenderer::new(&scene);
        renderer.render(&mut img);

        let mut nonzero = 0;
        for y in 0..128 {
            for x in 0..128 {
                let m = img.mean(x, y);
                assert!(m.min_element() >= 0.0 && m.max_element() <= 1.0);
                if m.max_element() > 0.0 {
                    nonzero += 1;
                }
            }
        }
        // The box fills the view
        assert!(nonzero > 128 * 128 / 2, "only {nonzero} lit pixels");
    }

    #[test]
    fn test_cornell_path_tracer_smoke() {
        let scene = build("cornell", 1.0).unwrap().unwrap();
        let mut img = Image::new(32, 32);
        let mut pt = PathTracer::new(&scene);
        for _ in 0..4 {
            pt.render(&mut img);
        }

        let mut total = 0.0;
        for y in 0..32 {
            for x in 0..32 {
                let m = img.mean(x, y);
                assert!(m.is_finite());
                assert!(m.min_element() >= 0.0);
                total += m.max_element();
            }
        }
        assert!(total > 0.0, "path traced image is black");
    }
}
