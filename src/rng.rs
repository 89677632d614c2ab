use crate::prelude::Real;
use rand::prelude::*;
use rand_distr::{Distribution, Gamma, LogNormal};

/// Single seeded source of randomness for a simulation. All stochastic
/// decisions consume this pool in a fixed order, which is what makes runs
/// reproducible under a fixed seed on the same platform.
#[derive(Debug, Clone)]
pub struct RandomPool {
    rng: SmallRng,
}

impl RandomPool {
    pub fn new(seed: u64) -> Self {
        RandomPool {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Uniform draw from [0, 1).
    pub fn uniform(&mut self) -> Real {
        self.rng.gen()
    }

    /// Uniform integer draw from [0, n). n must be positive.
    pub fn below(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Bernoulli draw. Probabilities outside [0, 1] saturate.
    pub fn chance(&mut self, p: Real) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        return self.rng.gen_bool(p);
    }

    /// Lognormal draw with the given location and shape on the log scale.
    pub fn lognormal(&mut self, mu: Real, sigma: Real) -> Real {
        let distrib = LogNormal::new(mu, sigma).unwrap();
        distrib.sample(&mut self.rng)
    }

    /// Gamma draw parametrized by mean and coefficient of variation.
    /// Both must be positive; this is enforced by parameter validation.
    pub fn gamma(&mut self, mean: Real, cv: Real) -> Real {
        let shape = 1.0 / (cv * cv);
        let scale = mean * cv * cv;
        let distrib = Gamma::new(shape, scale).unwrap();
        distrib.sample(&mut self.rng)
    }

    /// Direct access for shuffles and other `rand` adaptors.
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn same_seed_same_stream() {
        let mut a = RandomPool::new(7);
        let mut b = RandomPool::new(7);
        for _ in 0..100 {
            assert_eq!(a.uniform(), b.uniform());
        }
    }

    #[test]
    fn chance_saturates() {
        let mut pool = RandomPool::new(1);
        assert!(!pool.chance(0.0));
        assert!(!pool.chance(-0.5));
        assert!(pool.chance(1.0));
        assert!(pool.chance(1.5));
    }

    #[test]
    fn gamma_matches_requested_mean() {
        let mut pool = RandomPool::new(11);
        let n = 20_000;
        let total: Real = (0..n).map(|_| pool.gamma(5.1, 0.86)).sum();
        assert_approx_eq!(total / n as Real, 5.1, 0.15);
    }

    #[test]
    fn lognormal_is_positive() {
        let mut pool = RandomPool::new(3);
        for _ in 0..1000 {
            assert!(pool.lognormal(0.0, 0.5) > 0.0);
        }
    }
}
