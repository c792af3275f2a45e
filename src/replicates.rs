//! Noise replicates for estimating the uncertainty of a recovered distribution.
//!
//! Each replicate perturbs the prepared data with independent Gaussian noise of
//! the per-point sigma and is solved on its own; the spread of the replicate
//! images gives the per-bin error bars.

use nalgebra::DVector;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive, Result, SasError};
use crate::solving::SolverOutcome;

/// How many noisy replicates to solve and how to seed them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicateOptions {
    pub count: usize,
    /// Replicate `k` draws its noise from `seed + k`.
    pub seed: u64,
}

impl Default for ReplicateOptions {
    fn default() -> Self {
        Self { count: 10, seed: 0 }
    }
}

impl ReplicateOptions {
    pub fn new(count: usize, seed: u64) -> Self {
        Self { count, seed }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(SasError::invalid_option(
                "replicates.count",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Seed used by replicate `index`.
    pub fn seed_for(&self, index: usize) -> u64 {
        self.seed.wrapping_add(index as u64)
    }
}

/// Returns `data + sigma * N(0, 1)` with a deterministic generator.
pub fn add_gaussian_noise(
    data: &DVector<f64>,
    sigma: &DVector<f64>,
    seed: u64,
) -> Result<DVector<f64>> {
    if sigma.len() != data.len() {
        return Err(SasError::dimension_mismatch(
            "sigma length",
            data.len(),
            sigma.len(),
        ));
    }
    ensure_positive("sigma", sigma.iter())?;

    let mut rng = SmallRng::seed_from_u64(seed);
    Ok(data.zip_map(sigma, |value, s| {
        let draw: f64 = StandardNormal.sample(&mut rng);
        value + s * draw
    }))
}

/// Element-wise mean and population standard deviation over replicate outcomes.
#[derive(Clone, Debug)]
pub struct ReplicateSummary {
    pub mean_image: DVector<f64>,
    pub std_image: DVector<f64>,
    pub mean_forward: DVector<f64>,
    pub mean_chi_square: f64,
    /// Whether every replicate converged.
    pub converged: bool,
    /// Largest iteration count among the replicates.
    pub iterations: usize,
    pub replicates: usize,
}

impl ReplicateSummary {
    /// Summarizes a non-empty set of outcomes.
    pub fn from_outcomes(outcomes: &[SolverOutcome]) -> Result<Self> {
        let first = outcomes
            .first()
            .ok_or_else(|| SasError::dimension_mismatch("replicate count", 1, 0))?;
        let count = outcomes.len() as f64;

        let mut mean_image = DVector::zeros(first.image.len());
        let mut mean_forward = DVector::zeros(first.forward.len());
        let mut mean_chi_square = 0.0;
        for outcome in outcomes {
            mean_image += &outcome.image;
            mean_forward += &outcome.forward;
            mean_chi_square += outcome.chi_square;
        }
        mean_image /= count;
        mean_forward /= count;
        mean_chi_square /= count;

        let mut variance = DVector::zeros(first.image.len());
        for outcome in outcomes {
            let deviation = &outcome.image - &mean_image;
            variance += deviation.component_mul(&deviation);
        }
        let std_image = (variance / count).map(f64::sqrt);

        Ok(Self {
            mean_image,
            std_image,
            mean_forward,
            mean_chi_square,
            converged: outcomes.iter().all(|outcome| outcome.converged),
            iterations: outcomes
                .iter()
                .map(|outcome| outcome.iterations)
                .max()
                .unwrap_or(0),
            replicates: outcomes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn outcome(image: Vec<f64>, chi_square: f64, converged: bool) -> SolverOutcome {
        let forward = DVector::from_vec(image.iter().map(|v| 2.0 * v).collect());
        SolverOutcome {
            image: DVector::from_vec(image),
            forward,
            chi_square,
            converged,
            iterations: 3,
            history: Vec::new(),
        }
    }

    #[test]
    fn noise_is_reproducible_per_seed() {
        let data = DVector::from_element(500, 10.0);
        let sigma = DVector::from_element(500, 0.5);
        let first = add_gaussian_noise(&data, &sigma, 7).unwrap();
        let again = add_gaussian_noise(&data, &sigma, 7).unwrap();
        let other = add_gaussian_noise(&data, &sigma, 8).unwrap();
        assert_eq!(first, again);
        assert_ne!(first, other);

        let mean = first.mean();
        let spread = (first.map(|v| (v - mean).powi(2)).sum() / 500.0).sqrt();
        assert!((mean - 10.0).abs() < 0.15);
        assert!((spread - 0.5).abs() < 0.1);
    }

    #[test]
    fn noise_rejects_bad_sigma() {
        let data = DVector::from_element(3, 1.0);
        assert!(add_gaussian_noise(&data, &DVector::from_element(2, 1.0), 0).is_err());
        assert!(add_gaussian_noise(&data, &DVector::from_element(3, 0.0), 0).is_err());
    }

    #[test]
    fn summary_reports_mean_and_spread() {
        let outcomes = vec![
            outcome(vec![1.0, 4.0], 10.0, true),
            outcome(vec![3.0, 4.0], 20.0, false),
        ];
        let summary = ReplicateSummary::from_outcomes(&outcomes).unwrap();
        assert_relative_eq!(summary.mean_image, DVector::from_vec(vec![2.0, 4.0]));
        assert_relative_eq!(summary.std_image, DVector::from_vec(vec![1.0, 0.0]));
        assert_relative_eq!(summary.mean_forward[0], 4.0);
        assert_relative_eq!(summary.mean_chi_square, 15.0);
        assert!(!summary.converged);
        assert_eq!(summary.replicates, 2);
        assert!(ReplicateSummary::from_outcomes(&[]).is_err());
    }
}
