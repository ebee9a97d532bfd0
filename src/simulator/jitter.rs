//! Jittered delays for simulated backend calls.

use std::time::Duration;

use rand::Rng;

/// A delay uniformly spread around `base`.
///
/// `spread_pct` is the full width of the band as a percentage of `base`, so
/// 20 means ±10%. Samples fall in `[base - spread/2, base + spread/2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    base: Duration,
    spread_pct: u32,
}

impl Jitter {
    pub const fn new(base: Duration, spread_pct: u32) -> Self {
        Self { base, spread_pct }
    }

    pub const fn from_millis(base_ms: u64, spread_pct: u32) -> Self {
        Self::new(Duration::from_millis(base_ms), spread_pct)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Full width of the band. Saturates for absurdly large delays.
    pub fn spread(&self) -> Duration {
        self.base
            .checked_mul(self.spread_pct)
            .map_or(Duration::MAX, |wide| wide / 100)
    }

    /// Inclusive lower and upper bound of any sample.
    pub fn bounds(&self) -> (Duration, Duration) {
        let half = self.spread() / 2;
        (self.base.saturating_sub(half), self.base.saturating_add(half))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let spread = self.spread();
        if spread.is_zero() {
            return self.base;
        }
        let offset = rng.gen_range(Duration::ZERO..=spread);
        self.base.saturating_add(offset).saturating_sub(spread / 2)
    }
}
