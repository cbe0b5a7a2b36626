//! Procedural albedo textures.
//!
//! File-backed textures are loaded by the host application; the core only
//! needs a UV lookup, so the variants here are procedural.

use crate::Color;

/// Albedo source evaluated at a surface UV.
#[derive(Debug, Clone)]
pub enum Texture {
    /// A single constant color.
    Constant(Color),
    /// Two colors alternating in a `scale`-periodic checkerboard.
    Checker { a: Color, b: Color, scale: f32 },
}

impl Texture {
    /// Evaluate the texture at the given UV coordinates.
    pub fn sample(&self, u: f32, v: f32) -> Color {
        match self {
            Texture::Constant(c) => *c,
            Texture::Checker { a, b, scale } => {
                let iu = (u * scale).floor() as i64;
                let iv = (v * scale).floor() as i64;
                if (iu + iv) & 1 == 0 {
                    *a
                } else {
                    *b
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        let t = Texture::Constant(Color::new(0.2, 0.4, 0.6));
        assert_eq!(t.sample(0.0, 0.0), t.sample(0.7, 0.3));
    }

    #[test]
    fn test_checker_alternates() {
        let t = Texture::Checker {
            a: Color::ONE,
            b: Color::ZERO,
            scale: 2.0,
        };
        assert_eq!(t.sample(0.1, 0.1), Color::ONE);
        assert_eq!(t.sample(0.6, 0.1), Color::ZERO);
        assert_eq!(t.sample(0.6, 0.6), Color::ONE);
    }
}
