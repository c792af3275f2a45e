//! Solver configuration, diagnostics and the forward/reverse transform seam.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SasError};

/// Configuration for the maximum-entropy solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxEntOptions {
    /// Maximum number of outer iterations.
    pub max_iterations: usize,
    /// Convergence requires `|chi^2 / n_data - 1|` below this value.
    pub chi_square_limit: f64,
    /// Convergence requires the entropy/chi-square gradient mismatch below this value.
    pub test_limit: f64,
    /// Steps longer than this fraction of `sum(f) / mean(base)` are scaled back.
    pub distance_limit_factor: f64,
    /// Image entries driven non-positive are reset to this multiple of the base entry.
    pub reset_strays: f64,
    /// Hard cap on the bisection over the entropy/chi-square mixing parameter.
    pub max_move_loops: usize,
    /// Tolerance on the chi-square ratio reached by the bisection.
    pub move_tolerance: f64,
}

impl Default for MaxEntOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5_000,
            chi_square_limit: 0.01,
            test_limit: 0.05,
            distance_limit_factor: 0.1,
            reset_strays: 1.0,
            max_move_loops: 5_000,
            move_tolerance: 0.001,
        }
    }
}

impl MaxEntOptions {
    /// Override the outer iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Override both stopping thresholds.
    pub fn with_stopping(mut self, chi_square_limit: f64, test_limit: f64) -> Self {
        self.chi_square_limit = chi_square_limit;
        self.test_limit = test_limit;
        self
    }

    /// Override the step-length limit factor.
    pub fn with_distance_limit_factor(mut self, factor: f64) -> Self {
        self.distance_limit_factor = factor;
        self
    }

    /// Override the floor multiplier applied to non-positive entries.
    pub fn with_reset_strays(mut self, reset_strays: f64) -> Self {
        self.reset_strays = reset_strays;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_positive("max_ent.chi_square_limit", self.chi_square_limit)?;
        check_positive("max_ent.test_limit", self.test_limit)?;
        check_positive("max_ent.distance_limit_factor", self.distance_limit_factor)?;
        check_positive("max_ent.reset_strays", self.reset_strays)?;
        check_positive("max_ent.move_tolerance", self.move_tolerance)?;
        if self.max_move_loops == 0 {
            return Err(SasError::invalid_option(
                "max_ent.max_move_loops",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Configuration for the interior-point gradient solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpgOptions {
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Fraction of the distance to zero a component may travel in one step.
    pub approach: f64,
    /// Weight data and response by `Q^power` instead of `1 / sigma`.
    pub power: Option<f64>,
}

impl Default for IpgOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5_000,
            approach: 0.8,
            power: None,
        }
    }
}

impl IpgOptions {
    /// Override the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Override the per-component step fraction.
    pub fn with_approach(mut self, approach: f64) -> Self {
        self.approach = approach;
        self
    }

    /// Weight the problem by a power of Q.
    pub fn with_power(mut self, power: f64) -> Self {
        self.power = Some(power);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.approach > 0.0 && self.approach < 1.0) {
            return Err(SasError::invalid_option(
                "ipg.approach",
                format!("must lie in (0, 1), found {}", self.approach),
            ));
        }
        if let Some(power) = self.power {
            if !power.is_finite() {
                return Err(SasError::invalid_option(
                    "ipg.power",
                    format!("must be finite, found {power}"),
                ));
            }
        }
        Ok(())
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SasError::invalid_option(
            name,
            format!("must be positive and finite, found {value}"),
        ))
    }
}

/// Diagnostics recorded after each solver iteration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    /// One-based iteration number.
    pub iteration: usize,
    /// Chi-square of the updated image.
    pub chi_square: f64,
    /// Normalized entropy of the updated image (zero for IPG).
    pub entropy: f64,
    /// Gradient mismatch statistic used for this step.
    pub test: f64,
    /// Number of entries reset to the floor during the update.
    pub clamped: usize,
    /// Factor applied to the step by the distance limit (1 when not limited).
    pub step_scale: f64,
}

/// Result of a single solve: always a usable image, even without convergence.
#[derive(Clone, Debug)]
pub struct SolverOutcome {
    /// Final image, one entry per size bin.
    pub image: DVector<f64>,
    /// Forward prediction of the final image.
    pub forward: DVector<f64>,
    /// Chi-square of the final image against the data.
    pub chi_square: f64,
    /// Whether the stopping criteria were met.
    pub converged: bool,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Per-iteration diagnostics.
    pub history: Vec<IterationReport>,
}

impl SolverOutcome {
    /// Chi-square divided by the number of data points.
    pub fn reduced_chi_square(&self) -> f64 {
        self.chi_square / self.forward.len() as f64
    }
}

/// Forward ("opus") and reverse ("tropus") linear maps between image and data space.
pub trait ImageTransform {
    /// Number of image entries the transform accepts.
    fn image_len(&self) -> usize;

    /// Number of data points the transform produces.
    fn data_len(&self) -> usize;

    /// Maps an image to data space.
    fn image_to_data(&self, image: &DVector<f64>) -> DVector<f64>;

    /// Maps a data-space vector back to image space.
    fn data_to_image(&self, data: &DVector<f64>) -> DVector<f64>;
}

/// Transform defined by a `[bins x Q]` response matrix.
#[derive(Clone, Copy, Debug)]
pub struct ResponseTransform<'a> {
    response: &'a DMatrix<f64>,
}

impl<'a> ResponseTransform<'a> {
    pub fn new(response: &'a DMatrix<f64>) -> Self {
        Self { response }
    }

    pub fn response(&self) -> &'a DMatrix<f64> {
        self.response
    }
}

impl ImageTransform for ResponseTransform<'_> {
    fn image_len(&self) -> usize {
        self.response.nrows()
    }

    fn data_len(&self) -> usize {
        self.response.ncols()
    }

    fn image_to_data(&self, image: &DVector<f64>) -> DVector<f64> {
        self.response.tr_mul(image)
    }

    fn data_to_image(&self, data: &DVector<f64>) -> DVector<f64> {
        self.response * data
    }
}

/// Checks the data/sigma/image lengths shared by both solvers.
pub(crate) fn check_problem<T: ImageTransform + ?Sized>(
    transform: &T,
    data: &DVector<f64>,
    sigma: &DVector<f64>,
    image_len: usize,
) -> Result<()> {
    if transform.image_len() == 0 {
        return Err(SasError::InvalidBinCount { count: 0 });
    }
    if image_len != transform.image_len() {
        return Err(SasError::dimension_mismatch(
            "image length",
            transform.image_len(),
            image_len,
        ));
    }
    if data.is_empty() {
        return Err(SasError::dimension_mismatch("data length", 1, 0));
    }
    if data.len() != transform.data_len() {
        return Err(SasError::dimension_mismatch(
            "data length",
            transform.data_len(),
            data.len(),
        ));
    }
    if sigma.len() != data.len() {
        return Err(SasError::dimension_mismatch(
            "sigma length",
            data.len(),
            sigma.len(),
        ));
    }
    if data.iter().any(|value| !value.is_finite()) {
        return Err(SasError::NumericalError {
            context: "data validation",
        });
    }
    crate::error::ensure_positive("sigma", sigma.iter())
}
