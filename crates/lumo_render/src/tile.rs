//! Tile scheduler.
//!
//! The image is covered by fixed-size tiles in raster order, each handed
//! to one rayon worker. Workers render into tile-local buffers which the
//! caller scatters back, so no two threads ever touch the same pixel.

use crate::{sampler_seed, Image, UniformSampler};
use lumo_math::Vec4;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Edge length of a scheduling tile, in pixels.
pub const TILE_SIZE: usize = 32;

/// A rectangular region of the image.
#[derive(Debug, Copy, Clone)]
pub struct Tile {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Cover `width x height` with tiles, left-to-right, top-to-bottom.
pub fn tiles(width: usize, height: usize) -> Vec<Tile> {
    let mut out = Vec::new();
    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            out.push(Tile {
                x,
                y,
                width: TILE_SIZE.min(width - x),
                height: TILE_SIZE.min(height - y),
            });
            x += TILE_SIZE;
        }
        y += TILE_SIZE;
    }
    out
}

/// Render one iteration over all tiles in parallel and accumulate the
/// results into `img`.
///
/// Each tile gets a sampler seeded from its origin and the iteration
/// index, and a zeroed sample buffer in tile-local row-major order.
/// Cancellation is honored between tiles, never inside one.
pub fn par_tiles<F>(img: &mut Image, iter: u64, cancel: &AtomicBool, f: F)
where
    F: Fn(&Tile, &mut UniformSampler, &mut [Vec4]) + Sync,
{
    let results: Vec<(Tile, Vec<Vec4>)> = tiles(img.width(), img.height())
        .into_par_iter()
        .filter_map(|tile| {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            let seed = sampler_seed((tile.x ^ tile.y) as u64, iter);
            let mut sampler = UniformSampler::new(seed);
            let mut buf = vec![Vec4::ZERO; tile.width * tile.height];
            f(&tile, &mut sampler, &mut buf);
            Some((tile, buf))
        })
        .collect();

    for (tile, buf) in results {
        img.blit(&tile, &buf);
    }
}
