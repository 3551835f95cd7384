//! Distribution of per-task input block counts.

const STEP: f64 = 0.01;

/// Truncated log distribution of input block counts.
///
/// The CDF is `F(x) = p_min + coef * log2(x)` on `[min_blocks, max_blocks]`
/// with a point mass of `p_min` at the lower bound; `coef` is derived so that
/// `F(max_blocks) = 1`. Sampling inverts the CDF: draw `y` uniformly from
/// `[0, 1]` and call [inverse](BlockCountDistribution::inverse).
pub struct BlockCountDistribution {
    p_min: f64,
    min_blocks: u64,
    coef: f64,
}

impl BlockCountDistribution {
    pub fn new(p_min: f64, min_blocks: u64, max_blocks: u64) -> Self {
        assert!(p_min > 0.0 && p_min < 1.0, "p_min must be in (0, 1), got {}", p_min);
        assert!(
            min_blocks >= 1 && max_blocks > min_blocks,
            "invalid block bounds [{}, {}]",
            min_blocks,
            max_blocks
        );
        Self {
            p_min,
            min_blocks,
            coef: (1.0 - p_min) / (max_blocks as f64).log2(),
        }
    }

    /// Inverse of the CDF: `y <= p_min` maps to `min_blocks`, the tail maps to
    /// `round(2^((y - p_min) / coef))`.
    pub fn inverse(&self, y: f64) -> u64 {
        assert!((0.0..=1.0).contains(&y), "cumulative probability out of range: {}", y);
        if y <= self.p_min {
            self.min_blocks
        } else {
            ((y - self.p_min) / self.coef).exp2().round() as u64
        }
    }

    /// Expectation estimate: the point mass plus a Riemann sum over the tail.
    pub fn mean(&self) -> f64 {
        let mut mean = self.p_min * self.min_blocks as f64;
        let mut y = self.p_min + STEP;
        while y <= 1.0 {
            mean += STEP * self.inverse(y) as f64;
            y += STEP;
        }
        mean
    }
}

impl Default for BlockCountDistribution {
    fn default() -> Self {
        Self::new(0.5, 1, 320)
    }
}
