//! Interior-point gradient solver for non-negative least squares.
//!
//! Minimizes `|A^T x - B|^2` over `x >= 0` with the scaled gradient iteration of
//! Merritt and Zhang (J. Optim. Theory Appl. 126, 2005): the gradient is scaled
//! component-wise by `x / (A A^T x)`, and each component's step is clipped so it
//! travels at most a fixed fraction of its distance to zero.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

use crate::error::{ensure_positive, Result, SasError};
use crate::solving::{check_problem, IpgOptions, IterationReport, ResponseTransform, SolverOutcome};

/// Starting value of every weight.
const INITIAL_WEIGHT: f64 = 1e-32;

/// Non-negative least-squares inversion of `data ≈ G^T x`.
#[derive(Clone, Debug, Default)]
pub struct IpgSolver {
    options: IpgOptions,
}

impl IpgSolver {
    pub fn new(options: IpgOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &IpgOptions {
        &self.options
    }

    /// Solves against a `[bins x Q]` response matrix.
    ///
    /// Rows of the problem are weighted by `1 / sigma`, or by `Q^power` when a
    /// power is configured. Iteration stops once the reduced chi-square drops to
    /// one or the iteration cap is reached.
    pub fn solve(
        &self,
        q: &[f64],
        data: &DVector<f64>,
        sigma: &DVector<f64>,
        response: &DMatrix<f64>,
    ) -> Result<SolverOutcome> {
        self.options.validate()?;
        let transform = ResponseTransform::new(response);
        check_problem(&transform, data, sigma, response.nrows())?;
        if q.len() != data.len() {
            return Err(SasError::dimension_mismatch("Q length", data.len(), q.len()));
        }

        let row_weights: DVector<f64> = match self.options.power {
            Some(power) => {
                ensure_positive("Q", q)?;
                DVector::from_iterator(q.len(), q.iter().map(|qi| qi.powf(power)))
            }
            None => sigma.map(|s| 1.0 / s),
        };

        let mut a = response.clone();
        for (i, weight) in row_weights.iter().enumerate() {
            a.column_mut(i).scale_mut(*weight);
        }
        let b = data.component_mul(&row_weights);
        let aa = &a * a.transpose();
        let ab = &a * &b;

        let n = response.nrows();
        let npt = data.len() as f64;
        let mut x = DVector::from_element(n, INITIAL_WEIGHT);
        let mut forward = response.tr_mul(&x);
        let mut chisq = (data - &forward).component_div(sigma).norm_squared();
        let mut history = Vec::new();

        while history.len() < self.options.max_iterations && chisq / npt > 1.0 {
            let aax = &aa * &x;
            let gradient = &aax - &ab;
            let scaling = x.zip_map(&aax, |xj, axj| if axj > 0.0 { xj / axj } else { 0.0 });
            let direction = -scaling.component_mul(&gradient);
            let curvature = direction.dot(&(&aa * &direction));
            if !(curvature > 0.0) {
                debug!("IPG stopped at iteration {}: no descent direction", history.len());
                break;
            }
            let step = -direction.dot(&gradient) / curvature;

            for j in 0..n {
                let p = direction[j];
                let length = if p < 0.0 {
                    (self.options.approach * (-x[j] / p)).min(step)
                } else {
                    step
                };
                x[j] += length * p;
            }

            forward = response.tr_mul(&x);
            chisq = (data - &forward).component_div(sigma).norm_squared();
            if !chisq.is_finite() {
                return Err(SasError::NumericalError {
                    context: "interior-point update",
                });
            }
            history.push(IterationReport {
                iteration: history.len() + 1,
                chi_square: chisq,
                entropy: 0.0,
                test: 0.0,
                clamped: 0,
                step_scale: 1.0,
            });
            debug!(
                "IPG {}/{}: chi^2/n {:.6}, step {:.4e}",
                history.len(),
                self.options.max_iterations,
                chisq / npt,
                step
            );
        }

        let converged = chisq / npt <= 1.0;
        if !converged {
            warn!(
                "IPG did not converge after {} iterations (chi^2/n = {:.4})",
                history.len(),
                chisq / npt
            );
        }
        Ok(SolverOutcome {
            image: x,
            forward,
            chi_square: chisq,
            converged,
            iterations: history.len(),
            history,
        })
    }
}
