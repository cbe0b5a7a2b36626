//! Image output: 8-bit sRGB PNG or linear-float EXR, chosen by file
//! extension.

use image::{ImageBuffer, Rgb};
use log::{info, warn};
use lumo_render::Image;
use thiserror::Error;

/// Errors while writing the rendered image.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to write PNG: {0}")]
    Png(#[from] image::ImageError),

    #[error("failed to write EXR: {0}")]
    Exr(#[from] exr::error::Error),
}

pub type OutputResult<T> = Result<T, OutputError>;

/// Save the accumulated image, dispatching on the output extension.
/// Unknown extensions warn and fall back to PNG.
pub fn save(path: &str, img: &Image) -> OutputResult<()> {
    if path.ends_with(".exr") {
        save_exr(path, img)
    } else {
        if !path.ends_with(".png") {
            warn!("Could not determine output file type from extension, using PNG");
        }
        save_png(path, img)
    }
}

/// Linear radiance to the sRGB transfer curve.
fn linear_to_srgb(linear: f32) -> f32 {
    if linear <= 0.0 {
        0.0
    } else if linear <= 0.003_130_8 {
        12.92 * linear
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

/// Gamma-corrected 8-bit PNG of the per-pixel means.
pub fn save_png(path: &str, img: &Image) -> OutputResult<()> {
    let out: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_fn(img.width() as u32, img.height() as u32, |x, y| {
            let mean = img.mean(x as usize, y as usize);
            Rgb([
                (linear_to_srgb(mean.x.clamp(0.0, 1.0)) * 255.0) as u8,
                (linear_to_srgb(mean.y.clamp(0.0, 1.0)) * 255.0) as u8,
                (linear_to_srgb(mean.z.clamp(0.0, 1.0)) * 255.0) as u8,
            ])
        });
    out.save(path)?;
    info!("Image saved to '{path}'");
    Ok(())
}

/// Linear 32-bit float EXR of the per-pixel means.
pub fn save_exr(path: &str, img: &Image) -> OutputResult<()> {
    exr::prelude::write_rgb_file(path, img.width(), img.height(), |x, y| {
        let mean = img.mean(x, y);
        (mean.x, mean.y, mean.z)
    })?;
    info!("Image saved to '{path}'");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use exr::prelude::read_first_rgba_layer_from_file;
    use lumo_render::Color;

    fn test_image() -> Image {
        let mut img = Image::new(17, 9);
        for y in 0..9 {
            for x in 0..17 {
                img.add(
                    x,
                    y,
                    Color::new(x as f32 * 0.371, y as f32 * 0.111, 1.0 / (1 + x + y) as f32),
                );
            }
        }
        img
    }

    #[test]
    fn test_exr_roundtrip_bit_identical() {
        let img = test_image();
        let dir = std::env::temp_dir();
        let path_a = dir.join("lumo_roundtrip_a.exr");
        let path_b = dir.join("lumo_roundtrip_b.exr");
        save_exr(path_a.to_str().unwrap(), &img).unwrap();

        // Load the float channels back
        let loaded = read_first_rgba_layer_from_file(
            &path_a,
            |resolution, _| {
                vec![vec![(0.0f32, 0.0f32, 0.0f32); resolution.width()]; resolution.height()]
            },
            |pixels, position, (r, g, b, _a): (f32, f32, f32, f32)| {
                pixels[position.height()][position.width()] = (r, g, b);
            },
        )
        .unwrap();
        let pixels = loaded.layer_data.channel_data.pixels;

        // Every float channel survives unchanged
        let mut reloaded = Image::new(17, 9);
        for y in 0..9 {
            for x in 0..17 {
                let (r, g, b) = pixels[y][x];
                let mean = img.mean(x, y);
                assert_eq!(r.to_bits(), mean.x.to_bits());
                assert_eq!(g.to_bits(), mean.y.to_bits());
                assert_eq!(b.to_bits(), mean.z.to_bits());
                reloaded.add(x, y, Color::new(r, g, b));
            }
        }

        // Saving the reloaded image produces identical bytes
        save_exr(path_b.to_str().unwrap(), &reloaded).unwrap();
        let bytes_a = std::fs::read(&path_a).unwrap();
        let bytes_b = std::fs::read(&path_b).unwrap();
        assert_eq!(bytes_a, bytes_b);

        let _ = std::fs::remove_file(path_a);
        let _ = std::fs::remove_file(path_b);
    }

    #[test]
    fn test_png_save() {
        let img = test_image();
        let path = std::env::temp_dir().join("lumo_test_save.png");
        save(path.to_str().unwrap(), &img).unwrap();
        assert!(path.exists());
        let _ = std::fs::remove_file(path);
    }
}
