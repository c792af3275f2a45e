//! End-to-end size-distribution inversion of a scattering profile.

use std::ops::Range;

use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bins::SizeBins;
use crate::data::ScatteringProfile;
use crate::error::{Result, SasError};
use crate::ipg::IpgSolver;
use crate::maxent::MaxEntSolver;
use crate::options::{InversionOptions, SolverChoice};
use crate::replicates::{add_gaussian_noise, ReplicateOptions, ReplicateSummary};
use crate::response::response_matrix;
use crate::shapes::{Shape, ShapeRegistry};
use crate::solving::{IterationReport, SolverOutcome};
use crate::statistics::DistributionStatistics;

/// Recovered histogram of particle sizes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeDistribution {
    /// Bin-center radii.
    pub bin_centers: DVector<f64>,
    /// Bin widths in radius.
    pub bin_widths: DVector<f64>,
    /// Volume distribution per unit diameter.
    pub bin_magnitudes: DVector<f64>,
    /// Replicate standard deviation of each magnitude; zero for a single solve.
    pub magnitude_errors: DVector<f64>,
}

impl SizeDistribution {
    fn from_image(bins: &SizeBins, image: &DVector<f64>, spread: Option<&DVector<f64>>) -> Self {
        let widths = DVector::from_column_slice(bins.widths());
        let per_diameter = |values: &DVector<f64>| values.zip_map(&widths, |v, w| v / (2.0 * w));
        Self {
            bin_centers: DVector::from_column_slice(bins.centers()),
            bin_magnitudes: per_diameter(image),
            magnitude_errors: spread.map_or_else(|| DVector::zeros(bins.len()), per_diameter),
            bin_widths: widths,
        }
    }

    pub fn len(&self) -> usize {
        self.bin_centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bin_centers.is_empty()
    }
}

/// Outcome of [`SizeDistributionProblem::solve`].
#[derive(Clone, Debug)]
pub struct InversionResult {
    pub distribution: SizeDistribution,
    /// Chi-square of the fit (replicate mean when replicates were solved).
    pub chi_square: f64,
    pub converged: bool,
    pub iterations: usize,
    pub statistics: DistributionStatistics,
    /// Indices of the profile points used by the fit.
    pub q_range: Range<usize>,
    /// Per-iteration diagnostics of a single solve; empty for replicates.
    pub history: Vec<IterationReport>,
}

impl InversionResult {
    /// Chi-square per fitted point.
    pub fn reduced_chi_square(&self) -> f64 {
        self.chi_square / self.q_range.len() as f64
    }
}

/// Inverts scattering profiles against shapes from an injected registry.
#[derive(Clone, Copy, Debug)]
pub struct SizeDistributionProblem {
    registry: &'static ShapeRegistry,
}

impl Default for SizeDistributionProblem {
    fn default() -> Self {
        Self::new(ShapeRegistry::standard())
    }
}

impl SizeDistributionProblem {
    pub fn new(registry: &'static ShapeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'static ShapeRegistry {
        self.registry
    }

    /// Recovers the size distribution of `profile` over the configured Q-range.
    ///
    /// All inputs are validated before the response matrix is built. On success
    /// the profile's computed intensity is overwritten (zero outside the fitted
    /// range) and its background is set at every point.
    pub fn solve(
        &self,
        profile: &mut ScatteringProfile,
        options: &InversionOptions,
    ) -> Result<InversionResult> {
        options.validate()?;
        let shape = self
            .registry
            .shape(&options.shape.name, &options.shape.parameters)?;
        let bins = options.bins.build()?;
        let range = profile.q_range(options.q_min, options.q_max)?;

        let q: Vec<f64> = profile.q().as_slice()[range.clone()].to_vec();
        let response = response_matrix(&q, bins.centers(), options.contrast, &shape)?;

        let background: DVector<f64> =
            DVector::from_iterator(q.len(), q.iter().map(|v| options.background.evaluate(*v)));
        let data = DVector::from_iterator(
            q.len(),
            range
                .clone()
                .map(|i| options.scale * profile.intensity()[i])
                .zip(background.iter())
                .map(|(scaled, back)| scaled - back),
        );
        let sigma = DVector::from_iterator(
            q.len(),
            range
                .clone()
                .map(|i| options.scale / (options.weight_factor * profile.weight()[i]).sqrt()),
        );
        crate::error::ensure_positive("sigma", sigma.iter())?;
        let base = DVector::from_element(bins.len(), options.sky_level());

        let run = |data: &DVector<f64>| -> Result<SolverOutcome> {
            match &options.solver {
                SolverChoice::MaxEnt(settings) => {
                    MaxEntSolver::new(settings.clone()).solve(data, &sigma, &response, &base)
                }
                SolverChoice::Ipg(settings) => {
                    IpgSolver::new(settings.clone()).solve(&q, data, &sigma, &response)
                }
            }
        };

        let (distribution, forward, chi_square, converged, iterations, history, volume_error) =
            match &options.replicates {
                None => {
                    let outcome = run(&data)?;
                    (
                        SizeDistribution::from_image(&bins, &outcome.image, None),
                        outcome.forward,
                        outcome.chi_square,
                        outcome.converged,
                        outcome.iterations,
                        outcome.history,
                        0.0,
                    )
                }
                Some(replicates) => {
                    let outcomes = solve_replicates(replicates, &data, &sigma, &run)?;
                    let summary = ReplicateSummary::from_outcomes(&outcomes)?;
                    let volume_error = replicate_volume_spread(&bins, &shape, &outcomes);
                    (
                        SizeDistribution::from_image(
                            &bins,
                            &summary.mean_image,
                            Some(&summary.std_image),
                        ),
                        summary.mean_forward,
                        summary.mean_chi_square,
                        summary.converged,
                        summary.iterations,
                        Vec::new(),
                        volume_error,
                    )
                }
            };

        let fitted = forward + &background;
        let full_background = options.background.evaluate_all(profile.q());
        profile.record_fit(range.clone(), &fitted, full_background);

        let statistics = DistributionStatistics::from_distribution(&distribution, &shape)
            .with_volume_error(volume_error);
        info!(
            "{} size distribution for {}: chi^2 = {:.4} over {} points ({}converged)",
            options.solver.name(),
            shape.kind(),
            chi_square,
            range.len(),
            if converged { "" } else { "not " },
        );

        Ok(InversionResult {
            distribution,
            chi_square,
            converged,
            iterations,
            statistics,
            q_range: range,
            history,
        })
    }
}

/// Runs `run` on noisy copies of `data`. Divergence in any replicate aborts the
/// run; other failures are skipped unless every replicate fails.
fn solve_replicates<F>(
    replicates: &ReplicateOptions,
    data: &DVector<f64>,
    sigma: &DVector<f64>,
    run: &F,
) -> Result<Vec<SolverOutcome>>
where
    F: Fn(&DVector<f64>) -> Result<SolverOutcome> + Sync,
{
    let results: Vec<Result<SolverOutcome>> = (0..replicates.count)
        .into_par_iter()
        .map(|index| {
            let noisy = add_gaussian_noise(data, sigma, replicates.seed_for(index))?;
            run(&noisy)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(results.len());
    let mut first_error: Option<SasError> = None;
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) if err.is_divergence() => return Err(err),
            Err(err) => {
                warn!("replicate {index} failed: {err}");
                first_error.get_or_insert(err);
            }
        }
    }
    match (outcomes.is_empty(), first_error) {
        (true, Some(err)) => Err(err),
        _ => Ok(outcomes),
    }
}

fn replicate_volume_spread(bins: &SizeBins, shape: &Shape, outcomes: &[SolverOutcome]) -> f64 {
    let volumes: Vec<f64> = outcomes
        .iter()
        .map(|outcome| {
            let distribution = SizeDistribution::from_image(bins, &outcome.image, None);
            DistributionStatistics::from_distribution(&distribution, shape).volume
        })
        .collect();
    let count = volumes.len() as f64;
    let mean = volumes.iter().sum::<f64>() / count;
    (volumes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count).sqrt()
}

/// Response matrix for the configured shape and bins over the selected Q-range.
pub fn build_response(
    profile: &ScatteringProfile,
    options: &InversionOptions,
    registry: &ShapeRegistry,
) -> Result<DMatrix<f64>> {
    let shape = registry.shape(&options.shape.name, &options.shape.parameters)?;
    let bins = options.bins.build()?;
    let range = profile.q_range(options.q_min, options.q_max)?;
    response_matrix(
        &profile.q().as_slice()[range],
        bins.centers(),
        options.contrast,
        &shape,
    )
}
