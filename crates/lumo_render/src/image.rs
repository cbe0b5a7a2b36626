//! Accumulating image buffer.
//!
//! Pixels are four f32 channels in row-major order. Every sample adds
//! `(r, g, b, 1)`, so the alpha channel carries the per-pixel sample
//! count and `mean` yields the running average for display or output.

use crate::{Color, Tile};
use lumo_math::Vec4;

/// Dense row-major RGBA f32 buffer.
pub struct Image {
    width: usize,
    height: usize,
    pixels: Vec<Vec4>,
}

impl Image {
    /// Create a cleared image.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Vec4::ZERO; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Reset all accumulation (camera moved or renderer switched).
    pub fn clear(&mut self) {
        self.pixels.fill(Vec4::ZERO);
    }

    /// Add one sample to a pixel.
    #[inline]
    pub fn add(&mut self, x: usize, y: usize, color: Color) {
        self.pixels[y * self.width + x] += Vec4::new(color.x, color.y, color.z, 1.0);
    }

    /// Raw accumulated value of a pixel.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Vec4 {
        self.pixels[y * self.width + x]
    }

    /// Mean color of a pixel over its accumulated samples.
    #[inline]
    pub fn mean(&self, x: usize, y: usize) -> Color {
        let p = self.pixel(x, y);
        if p.w > 0.0 {
            Color::new(p.x, p.y, p.z) / p.w
        } else {
            Color::ZERO
        }
    }

    /// Scatter a tile-local sample buffer into the image. The buffer is
    /// row-major within the tile, one sample per pixel.
    pub fn blit(&mut self, tile: &Tile, samples: &[Vec4]) {
        debug_assert_eq!(samples.len(), tile.width * tile.height);
        for row in 0..tile.height {
            let src = &samples[row * tile.width..(row + 1) * tile.width];
            let base = (tile.y + row) * self.width + tile.x;
            for (dst, s) in self.pixels[base..base + tile.width].iter_mut().zip(src) {
                *dst += *s;
            }
        }
    }
}
