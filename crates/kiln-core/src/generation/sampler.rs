//! Weighted token sampling

use crate::{generation::shaper::Distribution, CoreError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Mass below this is treated as an empty distribution
const MIN_TOTAL_MASS: f64 = 1e-12;

/// Draws token ids from shaped distributions.
///
/// One sampler lives for one decode loop; with a fixed seed the sequence of
/// draws is fully reproducible.
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// Sampler seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Sampler with a fixed seed for reproducible generation
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_seed_opt(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::with_seed)
    }

    /// Single weighted draw over the distribution's support
    pub fn sample(&mut self, dist: &Distribution) -> Result<u32> {
        let probs = dist.as_slice();
        if let Some(idx) = probs.iter().position(|p| !p.is_finite() || *p < 0.0) {
            return Err(CoreError::degenerate(
                "DEGENERATE_INVALID_PROBABILITY",
                format!("Probability for token {} is {}", idx, probs[idx]),
                "Token sampling",
            ));
        }

        let total: f64 = probs.iter().map(|&p| f64::from(p)).sum();
        if total < MIN_TOTAL_MASS {
            return Err(CoreError::degenerate(
                "DEGENERATE_ZERO_MASS",
                "Distribution has no probability mass",
                "Token sampling",
            ));
        }

        let target = self.rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        let mut last_supported = 0;
        for (idx, &p) in probs.iter().enumerate() {
            if p <= 0.0 {
                continue;
            }
            cumulative += f64::from(p);
            last_supported = idx;
            if target < cumulative {
                return Ok(idx as u32);
            }
        }

        // Rounding can leave target just past the final cumulative sum
        Ok(last_supported as u32)
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}
