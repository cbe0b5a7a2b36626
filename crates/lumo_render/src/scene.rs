//! Scene: geometry, materials, lights, camera and the acceleration
//! structure, shared read-only by all render workers.

use crate::{AreaLight, Bsdf, Bvh, Camera, Color, Hit, Light};
use lumo_math::{LocalFrame, Ray, Vec2, Vec3};
use thiserror::Error;

/// Errors that can occur while assembling a scene.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("index buffer length {0} is not a multiple of 4")]
    BadIndexCount(usize),

    #[error("triangle {tri} references vertex {index}, but there are only {count} vertices")]
    VertexOutOfRange { tri: usize, index: u32, count: usize },

    #[error("triangle {tri} references material {id}, but there are only {count} materials")]
    MaterialOutOfRange { tri: usize, id: u32, count: usize },

    #[error("{normals} vertex normals for {verts} vertices")]
    NormalCountMismatch { normals: usize, verts: usize },
}

/// A material: an optional BSDF and an optional emission. Materials
/// without a BSDF act like black bodies; materials with an emission turn
/// their triangles into area lights.
#[derive(Debug, Clone)]
pub struct Material {
    pub bsdf: Option<Bsdf>,
    pub emission: Option<Color>,
}

impl Material {
    pub fn new(bsdf: Bsdf) -> Self {
        Self {
            bsdf: Some(bsdf),
            emission: None,
        }
    }

    pub fn emissive(intensity: Color) -> Self {
        Self {
            bsdf: None,
            emission: Some(intensity),
        }
    }
}

/// Differential surface data at a hit point.
#[derive(Debug, Copy, Clone)]
pub struct SurfaceParams {
    /// True if the ray hit the outside (front face) of the surface
    pub entering: bool,
    /// Hit point in world coordinates
    pub point: Vec3,
    /// Texture coordinates
    pub uv: Vec2,
    /// Geometric normal, oriented toward the ray origin
    pub face_normal: Vec3,
    /// Shading frame around the interpolated vertex normal, same side as
    /// `face_normal`
    pub frame: LocalFrame,
}

/// A renderable scene. Geometry is indexed: triangle `i` uses vertex
/// indices `indices[4i..4i+3]` and material id `indices[4i+3]`.
#[derive(Debug)]
pub struct Scene {
    pub verts: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub normals: Vec<Vec3>,
    pub materials: Vec<Material>,
    pub lights: Vec<Light>,
    pub camera: Camera,
    /// Light index per triangle, -1 for non-emitters
    tri_emitters: Vec<i32>,
    bvh: Bvh,
}

impl Scene {
    /// Validate the input arrays, derive an area light from every
    /// emissive triangle, and build the BVH.
    pub fn new(
        verts: Vec<Vec3>,
        indices: Vec<u32>,
        normals: Vec<Vec3>,
        materials: Vec<Material>,
        extra_lights: Vec<Light>,
        camera: Camera,
    ) -> Result<Self, SceneError> {
        if indices.len() % 4 != 0 {
            return Err(SceneError::BadIndexCount(indices.len()));
        }
        if normals.len() != verts.len() {
            return Err(SceneError::NormalCountMismatch {
                normals: normals.len(),
                verts: verts.len(),
            });
        }
        let num_tris = indices.len() / 4;
        for tri in 0..num_tris {
            for k in 0..3 {
                let index = indices[tri * 4 + k];
                if index as usize >= verts.len() {
                    return Err(SceneError::VertexOutOfRange {
                        tri,
                        index,
                        count: verts.len(),
                    });
                }
            }
            let id = indices[tri * 4 + 3];
            if id as usize >= materials.len() {
                return Err(SceneError::MaterialOutOfRange {
                    tri,
                    id,
                    count: materials.len(),
                });
            }
        }

        let mut lights = extra_lights;
        let mut tri_emitters = vec![-1i32; num_tris];
        for tri in 0..num_tris {
            let mat = &materials[indices[tri * 4 + 3] as usize];
            if let Some(intensity) = mat.emission {
                tri_emitters[tri] = lights.len() as i32;
                lights.push(Light::Area(AreaLight::new(
                    verts[indices[tri * 4] as usize],
                    verts[indices[tri * 4 + 1] as usize],
                    verts[indices[tri * 4 + 2] as usize],
                    intensity,
                )));
            }
        }

        let bvh = Bvh::build(&verts, &indices);
        log::info!(
            "Scene: {} triangles, {} materials, {} lights",
            num_tris,
            materials.len(),
            lights.len()
        );

        Ok(Self {
            verts,
            indices,
            normals,
            materials,
            lights,
            camera,
            tri_emitters,
            bvh,
        })
    }

    /// Closest intersection along the ray. A miss returns `hit.tri < 0`.
    pub fn intersect(&self, ray: &Ray) -> Hit {
        self.bvh.traverse::<false>(ray)
    }

    /// Whether anything blocks the ray within its interval.
    pub fn occluded(&self, ray: &Ray) -> bool {
        self.bvh.traverse::<true>(ray).is_hit()
    }

    /// Material of the triangle recorded in the hit.
    pub fn material(&self, hit: &Hit) -> &Material {
        &self.materials[self.indices[hit.tri as usize * 4 + 3] as usize]
    }

    /// The light attached to the hit triangle, if it emits.
    pub fn emitter(&self, hit: &Hit) -> Option<&Light> {
        let idx = self.tri_emitters[hit.tri as usize];
        (idx >= 0).then(|| &self.lights[idx as usize])
    }

    /// Surface parameters at the hit point. Both normals are oriented
    /// toward the side the ray came from; `entering` records whether
    /// that was the front face.
    pub fn surface_params(&self, ray: &Ray, hit: &Hit) -> SurfaceParams {
        let tri = hit.tri as usize;
        let i0 = self.indices[tri * 4] as usize;
        let i1 = self.indices[tri * 4 + 1] as usize;
        let i2 = self.indices[tri * 4 + 2] as usize;

        let v0 = self.verts[i0];
        let geom_normal = (self.verts[i1] - v0).cross(self.verts[i2] - v0).normalize();
        let entering = ray.dir.dot(geom_normal) < 0.0;

        let w0 = 1.0 - hit.u - hit.v;
        let shading_normal = (self.normals[i0] * w0
            + self.normals[i1] * hit.u
            + self.normals[i2] * hit.v)
            .normalize();

        let sign = if entering { 1.0 } else { -1.0 };
        SurfaceParams {
            entering,
            point: ray.at(hit.t),
            uv: Vec2::new(hit.u, hit.v),
            face_normal: geom_normal * sign,
            frame: LocalFrame::from_normal(shading_normal * sign),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiffuseBsdf, Texture, RAY_OFFSET};

    fn single_tri_scene() -> Scene {
        let verts = vec![
            Vec3::new(-1.0, -1.0, -2.0),
            Vec3::new(1.0, -1.0, -2.0),
            Vec3::new(0.0, 1.0, -2.0),
        ];
        let normals = vec![Vec3::Z; 3];
        let indices = vec![0, 1, 2, 0];
        let materials = vec![Material::new(Bsdf::Diffuse(DiffuseBsdf {
            albedo: Texture::Constant(Color::splat(0.5)),
        }))];
        let camera = Camera::new(Vec3::ZERO, -Vec3::Z, Vec3::Y, 60.0, 1.0);
        Scene::new(verts, indices, normals, materials, Vec::new(), camera).unwrap()
    }

    #[test]
    fn test_intersect_and_surface_params() {
        let scene = single_tri_scene();
        let ray = Ray::with_offset(Vec3::new(0.0, -0.2, 0.0), -Vec3::Z, RAY_OFFSET);
        let hit = scene.intersect(&ray);
        assert_eq!(hit.tri, 0);

        let surf = scene.surface_params(&ray, &hit);
        assert!(surf.entering);
        assert!((surf.point.z + 2.0).abs() < 1e-4);
        assert!((surf.face_normal - Vec3::Z).length() < 1e-5);
        assert!((surf.frame.n - Vec3::Z).length() < 1e-5);

        // Hitting the back face flips both normals
        let back_ray = Ray::with_offset(Vec3::new(0.0, -0.2, -4.0), Vec3::Z, RAY_OFFSET);
        let back_hit = scene.intersect(&back_ray);
        assert_eq!(back_hit.tri, 0);
        let back_surf = scene.surface_params(&back_ray, &back_hit);
        assert!(!back_surf.entering);
        assert!((back_surf.face_normal + Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_occluded_matches_intersect() {
        let scene = single_tri_scene();
        let blocked = Ray::new(Vec3::new(0.0, -0.2, 0.0), -Vec3::Z, RAY_OFFSET, 5.0);
        assert!(scene.occluded(&blocked));
        assert!(scene.intersect(&blocked).is_hit());

        // The interval ends before the triangle
        let short = Ray::new(Vec3::new(0.0, -0.2, 0.0), -Vec3::Z, RAY_OFFSET, 1.0);
        assert!(!scene.occluded(&short));
    }

    #[test]
    fn test_emissive_material_creates_area_light() {
        let verts = vec![
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(1.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, 1.0),
        ];
        let normals = vec![-Vec3::Y; 3];
        let indices = vec![0, 1, 2, 0];
        let materials = vec![Material::emissive(Color::splat(4.0))];
        let camera = Camera::new(Vec3::ZERO, Vec3::Y, Vec3::Z, 60.0, 1.0);
        let scene = Scene::new(verts, indices, normals, materials, Vec::new(), camera).unwrap();

        assert_eq!(scene.lights.len(), 1);
        assert!(scene.lights[0].has_area());

        let ray = Ray::with_offset(Vec3::new(0.2, 0.0, 0.2), Vec3::Y, RAY_OFFSET);
        let hit = scene.intersect(&ray);
        assert!(hit.is_hit());
        assert!(scene.emitter(&hit).is_some());
        assert!(scene.material(&hit).bsdf.is_none());
    }

    #[test]
    fn test_validation_errors() {
        let camera = Camera::new(Vec3::ZERO, -Vec3::Z, Vec3::Y, 60.0, 1.0);
        let err = Scene::new(
            vec![Vec3::ZERO],
            vec![0, 1, 2, 0],
            vec![Vec3::Z],
            vec![Material::emissive(Color::ONE)],
            Vec::new(),
            camera.clone(),
        )
        .unwrap_err();
        assert!(matches!(err, SceneError::VertexOutOfRange { .. }));

        let err = Scene::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2, 5],
            vec![Vec3::Z; 3],
            vec![Material::emissive(Color::ONE)],
            Vec::new(),
            camera,
        )
        .unwrap_err();
        assert!(matches!(err, SceneError::MaterialOutOfRange { .. }));
    }
}
