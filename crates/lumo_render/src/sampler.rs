//! Pseudo-random uniform sample stream.
//!
//! Every tile and every photon batch owns its own sampler, seeded from the
//! tile/batch index and the iteration counter so that streams never repeat
//! across iterations and never correlate across workers.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// A seeded stream of uniform f32 samples in [0, 1).
pub struct UniformSampler {
    rng: StdRng,
}

impl UniformSampler {
    /// Create a sampler from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next uniform sample in [0, 1).
    ///
    /// Uses the top 24 bits of the generator output so the result is an
    /// exact multiple of 2^-24 and never reaches 1.0.
    #[inline]
    pub fn next(&mut self) -> f32 {
        (self.rng.next_u32() >> 8) as f32 * (1.0 / (1u32 << 24) as f32)
    }
}

/// SplitMix64 finalizer. Turns a counter-like input into a well-mixed word.
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Derive a sampler seed from a spatial index (tile or batch) and the
/// iteration counter. Distinct inputs on either argument give
/// decorrelated streams.
#[inline]
pub fn sampler_seed(index: u64, iter: u64) -> u64 {
    splitmix64(index ^ splitmix64(iter))
}
