//! Probability gate: maps a rate in `[0, 1]` to a yes/no decision.
//!
//! The generator is seeded once and shared by every caller holding the same
//! gate. Draws are serialized by a mutex because each draw advances the
//! generator state. Callers that need an independent stream build their own
//! gate.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct ProbabilityGate {
    rng: Mutex<StdRng>,
}

impl ProbabilityGate {
    /// Gate seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Gate with a fixed seed, for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// `rate <= 0` never fires, `rate >= 1` always fires; otherwise fires
    /// with probability `rate`. NaN never fires.
    pub fn should_inject(&self, rate: f64) -> bool {
        if rate.is_nan() || rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        self.rng.lock().gen::<f64>() < rate
    }

    /// Uniform draw in `[min, max]`. Returns `min` when the range is empty.
    pub fn draw_range(&self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        self.rng.lock().gen_range(min..=max)
    }

    /// Fair coin flip.
    pub fn flip(&self) -> bool {
        self.rng.lock().gen::<bool>()
    }
}

impl Default for ProbabilityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProbabilityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbabilityGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_negative_rates_never_fire() {
        let gate = ProbabilityGate::with_seed(7);
        for rate in [0.0, -0.1, -1.0, f64::NEG_INFINITY, f64::NAN] {
            for _ in 0..1000 {
                assert!(!gate.should_inject(rate), "rate {rate} fired");
            }
        }
    }

    #[test]
    fn test_full_and_overfull_rates_always_fire() {
        let gate = ProbabilityGate::with_seed(7);
        for rate in [1.0, 1.5, 100.0, f64::INFINITY] {
            for _ in 0..1000 {
                assert!(gate.should_inject(rate), "rate {rate} did not fire");
            }
        }
    }

    #[test]
    fn test_half_rate_is_statistically_fair() {
        let gate = ProbabilityGate::with_seed(42);
        let iterations = 100_000;
        let hits = (0..iterations).filter(|_| gate.should_inject(0.5)).count();
        let observed = hits as f64 / iterations as f64;
        assert!(
            (observed - 0.5).abs() < 0.02,
            "Expected ~0.5, got {observed}"
        );
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let a = ProbabilityGate::with_seed(99);
        let b = ProbabilityGate::with_seed(99);
        let seq_a: Vec<bool> = (0..64).map(|_| a.should_inject(0.3)).collect();
        let seq_b: Vec<bool> = (0..64).map(|_| b.should_inject(0.3)).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn test_draw_range() {
        let gate = ProbabilityGate::with_seed(1);
        for _ in 0..1000 {
            let v = gate.draw_range(100, 200);
            assert!((100..=200).contains(&v));
        }
        assert_eq!(gate.draw_range(50, 50), 50);
        assert_eq!(gate.draw_range(80, 20), 80);
    }
}
