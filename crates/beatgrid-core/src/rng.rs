//! Noise source for the percussive voices.

use std::time::{SystemTime, UNIX_EPOCH};

/// Pseudorandom generator for white noise. Not cryptographic. Two generators
/// built from the same seed yield the same stream, which is what lets a live
/// capture and an offline render of one project be compared sample for sample.
#[derive(Debug, Clone)]
pub struct NoiseRng(oorandom::Rand64);

impl Default for NoiseRng {
    fn default() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self(oorandom::Rand64::new(seed))
    }
}

impl NoiseRng {
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self(oorandom::Rand64::new(u128::from(seed)))
    }

    /// Uniform sample in `[-1, 1)`.
    pub fn next_bipolar(&mut self) -> f32 {
        (self.0.rand_float() * 2.0 - 1.0) as f32
    }

    /// Seed for an independent generator derived from this stream.
    pub fn next_seed(&mut self) -> u64 {
        self.0.rand_u64()
    }
}
