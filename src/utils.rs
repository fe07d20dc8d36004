use std::sync::atomic::{AtomicU64, Ordering};

use rand_distr::LogNormal;

use crate::errors::{BidError, BidResult};

/// Base seed of every random stream; the CLI sets it to the iteration number
pub static RAND_SEED: AtomicU64 = AtomicU64::new(0);

/// Adjustment passes run since the counter was last reset
pub static TOTAL_ADJUSTMENT_PASSES: AtomicU64 = AtomicU64::new(0);

/// Seed for one random stream, offset so that streams stay independent
pub fn get_seed(offset: u64) -> u64 {
    RAND_SEED.load(Ordering::Relaxed).wrapping_mul(7919).wrapping_add(offset)
}

/// Convert mean and standard deviation to log-normal distribution parameters
/// Returns (μ, σ) for LogNormal(μ, σ) that approximates the given mean and stddev
///
/// - σ = sqrt(ln(1 + s²/m²))
/// - μ = ln(m) - σ²/2
fn lognormal_from_mean_stddev(mean: f64, stddev: f64) -> (f64, f64) {
    let variance = stddev * stddev;
    let sigma_squared = (1.0 + variance / (mean * mean)).ln();
    let sigma = sigma_squared.sqrt();
    let mu = mean.ln() - sigma_squared / 2.0;
    (mu, sigma)
}

/// Create a log-normal distribution from mean and standard deviation
pub fn create_lognormal(mean: f64, stddev: f64) -> BidResult<LogNormal<f64>> {
    if !(mean > 0.0) || !(stddev >= 0.0) {
        return Err(BidError::configuration(format!("log-normal needs mean > 0 and stddev >= 0, got {} and {}", mean, stddev)));
    }
    let (mu, sigma) = lognormal_from_mean_stddev(mean, stddev);
    LogNormal::new(mu, sigma).map_err(|e| BidError::configuration(format!("log-normal({}, {}): {}", mean, stddev, e)))
}

/// Round a CPC down to the closest quarter
///
/// Values below one keep their cents when under a quarter, so a small bid never rounds to zero.
pub fn round_down_to_quarter(value: f64) -> f64 {
    let whole = value.trunc();
    let fraction = value - whole;
    let rounded = if fraction < 0.25 {
        if whole > 0.0 {
            0.0
        } else {
            fraction
        }
    } else if fraction < 0.50 {
        0.25
    } else if fraction < 0.75 {
        0.50
    } else {
        0.75
    };
    whole + rounded
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::Distribution;

    #[test]
    fn test_round_down_to_quarter() {
        assert_eq!(round_down_to_quarter(1.37), 1.25);
        assert_eq!(round_down_to_quarter(2.99), 2.75);
        assert_eq!(round_down_to_quarter(3.10), 3.0);
        assert_eq!(round_down_to_quarter(0.60), 0.50);
        assert_eq!(round_down_to_quarter(4.0), 4.0);
        // under a quarter and under one dollar stays as is
        assert!((round_down_to_quarter(0.12) - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_lognormal_mean_is_close() {
        let dist = create_lognormal(10.0, 3.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| dist.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 10.0).abs() < 0.2, "mean {}", mean);
    }

    #[test]
    fn test_lognormal_rejects_bad_parameters() {
        assert!(create_lognormal(0.0, 1.0).is_err());
        assert!(create_lognormal(1.0, -1.0).is_err());
        assert!(create_lognormal(f64::NAN, 1.0).is_err());
    }
}
