//! Lumo render core - CPU physically-based rendering.
//!
//! This crate provides:
//!
//! - **Acceleration**: a spatially-split SAH BVH with reinsertion
//!   optimization and a stack-based traversal kernel
//! - **Light transport**: a path tracer with next-event estimation and
//!   multiple importance sampling, and a progressive photon mapper
//! - **Scene model**: triangle meshes, tagged BSDF and light variants,
//!   and a pinhole camera shared by all renderers

mod sampler;
pub use sampler::{sampler_seed, UniformSampler};

mod sampling;
pub use sampling::{
    cosine_hemisphere_pdf, cosine_power_hemisphere_pdf, luma, russian_roulette,
    sample_cosine_hemisphere, sample_cosine_power_hemisphere, sample_uniform_sphere,
    uniform_sphere_pdf, DirSample,
};

mod texture;
pub use texture::Texture;

mod bsdf;
pub use bsdf::{Bsdf, BsdfSample, BsdfType, CombineBsdf, DiffuseBsdf, GlassBsdf, GlossyPhongBsdf, MirrorBsdf};

mod light;
pub use light::{AreaLight, DirectSample, EmissionSample, Light, PointLight};

mod camera;
pub use camera::Camera;

mod tri;
pub use tri::PrecomputedTri;

pub mod bvh;
pub use bvh::{Bvh, Hit};

mod scene;
pub use scene::{Material, Scene, SceneError, SurfaceParams};

mod image;
pub use image::Image;

mod tile;
pub use tile::{par_tiles, Tile, TILE_SIZE};

mod hash_grid;
pub use hash_grid::HashGrid;

mod renderer;
pub use renderer::Renderer;

mod debug_render;
pub use debug_render::DebugRenderer;

mod pt;
pub use pt::{PathTracer, DEFAULT_MAX_PATH_LEN};

mod ppm;
pub use ppm::{PhotonMapper, PPM_ALPHA, PPM_EYE_MAX_PATH_LEN, PPM_MAX_PATH_LEN};

/// Color type alias (linear RGB, typically 0-1)
pub type Color = lumo_math::Vec3;

/// Offset applied to secondary ray origins to avoid self-intersection.
pub const RAY_OFFSET: f32 = 1e-3;
