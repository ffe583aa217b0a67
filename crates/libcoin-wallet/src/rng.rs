//! Injectable randomness.
//!
//! Coin selection's stochastic subset-sum trials and the jittered resend
//! delay both need randomness that tests can make deterministic. Rather
//! than thread a generic `Rng` bound through every signature, the wallet
//! depends on this narrow trait and is handed a concrete `StdRng` in
//! production or a seeded one in tests.

use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub trait WalletRng: Send {
    fn gen_range_u64(&mut self, low: u64, high: u64) -> u64;
    fn gen_bool(&mut self, probability: f64) -> bool;
}

/// Production RNG, seeded from the OS on construction.
pub struct OsBackedRng(StdRng);

impl OsBackedRng {
    pub fn new() -> Self {
        Self(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for OsBackedRng {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletRng for OsBackedRng {
    fn gen_range_u64(&mut self, low: u64, high: u64) -> u64 {
        self.0.gen_range(low..high)
    }

    fn gen_bool(&mut self, probability: f64) -> bool {
        self.0.gen_bool(probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_rng_is_deterministic() {
        let mut a = OsBackedRng::seeded(42);
        let mut b = OsBackedRng::seeded(42);
        for _ in 0..10 {
            assert_eq!(a.gen_range_u64(0, 1000), b.gen_range_u64(0, 1000));
        }
    }

    #[test]
    fn gen_range_respects_bounds() {
        let mut rng = OsBackedRng::seeded(1);
        for _ in 0..100 {
            let v = rng.gen_range_u64(10, 20);
            assert!((10..20).contains(&v));
        }
    }
}
