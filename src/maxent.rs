//! Skilling–Bryan maximum-entropy solver.
//!
//! Each iteration builds three search directions in image space (chi-square
//! descent, an entropy/chi-square blend and a curvature correction), reduces the
//! entropy and chi-square to quadratic models in the three step coefficients, and
//! picks the coefficients by a bisection over the mixing parameter between the two
//! models. The step is capped in length, applied, and any non-positive entry is
//! reset to the floor.
//!
//! Reference: J. Skilling and R. K. Bryan, "Maximum entropy image reconstruction:
//! general algorithm", Mon. Not. R. Astron. Soc. 211 (1984) 111-124.

use std::f64::consts::E;

use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::error::{ensure_positive, Result, SasError};
use crate::linalg::cho_sol;
use crate::solving::{
    check_problem, ImageTransform, IterationReport, MaxEntOptions, ResponseTransform,
    SolverOutcome,
};

/// Maximum-entropy inversion of `data ≈ forward(image)`.
#[derive(Clone, Debug, Default)]
pub struct MaxEntSolver {
    options: MaxEntOptions,
}

impl MaxEntSolver {
    pub fn new(options: MaxEntOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MaxEntOptions {
        &self.options
    }

    /// Solves against a `[bins x Q]` response matrix.
    pub fn solve(
        &self,
        data: &DVector<f64>,
        sigma: &DVector<f64>,
        response: &DMatrix<f64>,
        base: &DVector<f64>,
    ) -> Result<SolverOutcome> {
        self.solve_with(&ResponseTransform::new(response), data, sigma, base)
    }

    /// Solves with caller-supplied forward and reverse transforms.
    ///
    /// The image starts at `base`. Returns an error only for invalid inputs or
    /// numerical divergence; running out of iterations yields an outcome with
    /// `converged == false`.
    pub fn solve_with<T: ImageTransform + ?Sized>(
        &self,
        transform: &T,
        data: &DVector<f64>,
        sigma: &DVector<f64>,
        base: &DVector<f64>,
    ) -> Result<SolverOutcome> {
        self.options.validate()?;
        check_problem(transform, data, sigma, base.len())?;
        ensure_positive("base", base.iter())?;

        if base.len() == 1 {
            return self.solve_single_bin(transform, data, sigma, base);
        }

        let opts = &self.options;
        let n = base.len();
        let chizer = data.len() as f64;
        let blank = base.sum() / n as f64;

        let mut image = base.clone();
        let mut fsum = image.sum();
        let mut forward = transform.image_to_data(&image);
        let mut residual = (data - &forward).component_div(sigma);
        let mut chisq = residual.norm_squared();
        let mut history = Vec::new();

        for iteration in 0..opts.max_iterations {
            if !(chisq > 0.0) {
                debug!("MaxEnt stopped at iteration {iteration}: exact fit");
                break;
            }

            let ox = residual.component_div(sigma) * -2.0;
            let cgrad = transform.data_to_image(&ox);
            let sgrad = image.zip_map(base, |f, b| -(f / b).ln() / (blank * E));

            let snorm = weighted_norm(&image, &sgrad);
            let cnorm = weighted_norm(&image, &cgrad);
            let tnorm = image.component_mul(&sgrad).dot(&cgrad);
            if !(cnorm > 0.0) {
                debug!("MaxEnt stopped at iteration {iteration}: vanishing chi-square gradient");
                break;
            }

            let mut a = 1.0;
            let mut b = 1.0 / cnorm;
            let mut test = 0.0;
            if iteration > 0 && snorm > 0.0 {
                test = ((1.0 - tnorm / (snorm * cnorm)).max(0.0) / 2.0).sqrt();
                if test > 0.0 {
                    a = 0.5 / (snorm * test);
                    b *= 0.5 / test;
                }
            }

            let directions = SearchDirections::build(
                transform, &image, &sgrad, &cgrad, sigma, a, b, cnorm,
            );
            let model = directions.quadratics(&image, &sgrad, &cgrad, sigma, chisq, blank);

            let (beta, step_scale) = if iteration == 0 {
                if !(model.c2[(0, 0)] > 0.0) {
                    return Err(SasError::NonPositivePivot {
                        pivot: model.c2[(0, 0)],
                    });
                }
                (Vector3::new(-0.5 * model.c1[0] / model.c2[(0, 0)], 0.0, 0.0), 1.0)
            } else {
                model.step(opts, fsum, blank, chisq, chizer)?
            };

            let mut clamped = 0;
            for j in 0..n {
                image[j] += beta[0] * directions.xi[0][j]
                    + beta[1] * directions.xi[1][j]
                    + beta[2] * directions.xi[2][j];
                if !(image[j] > 0.0) {
                    image[j] = opts.reset_strays * base[j];
                    clamped += 1;
                }
            }

            let previous_sum = fsum;
            fsum = image.sum();
            forward = transform.image_to_data(&image);
            residual = (data - &forward).component_div(sigma);
            chisq = residual.norm_squared();
            if !chisq.is_finite() {
                return Err(SasError::NumericalError {
                    context: "maximum-entropy update",
                });
            }
            let entropy = normalized_entropy(&image);

            debug!(
                "MaxEnt {}/{}: residual mismatch {:.2}%, entropy {:.6}, sum {:.6e}, change {:.4}%, clamped {}",
                iteration + 1,
                opts.max_iterations,
                100.0 * (chisq / chizer - 1.0),
                entropy,
                fsum,
                100.0 * (fsum - previous_sum) / previous_sum,
                clamped,
            );
            history.push(IterationReport {
                iteration: iteration + 1,
                chi_square: chisq,
                entropy,
                test,
                clamped,
                step_scale,
            });

            if (chisq / chizer - 1.0).abs() < opts.chi_square_limit && test < opts.test_limit {
                return Ok(SolverOutcome {
                    image,
                    forward,
                    chi_square: chisq,
                    converged: true,
                    iterations: iteration + 1,
                    history,
                });
            }
        }

        warn!(
            "MaxEnt did not converge after {} iterations (chi^2/n = {:.4}); consider raising the error multiplier",
            history.len(),
            chisq / chizer
        );
        Ok(SolverOutcome {
            image,
            forward,
            chi_square: chisq,
            converged: false,
            iterations: history.len(),
            history,
        })
    }

    /// A single bin has constant normalized entropy, so the best image is the
    /// positive least-squares scale of the lone response column.
    fn solve_single_bin<T: ImageTransform + ?Sized>(
        &self,
        transform: &T,
        data: &DVector<f64>,
        sigma: &DVector<f64>,
        base: &DVector<f64>,
    ) -> Result<SolverOutcome> {
        let column = transform.image_to_data(&DVector::from_element(1, 1.0));
        let scaled = column.component_div(sigma);
        let curvature = scaled.norm_squared();
        let projection = scaled.dot(&data.component_div(sigma));

        let mut value = projection / curvature;
        if !(value > 0.0) || !value.is_finite() {
            value = self.options.reset_strays * base[0];
        }

        let image = DVector::from_element(1, value);
        let forward = transform.image_to_data(&image);
        let chi_square = (data - &forward).component_div(sigma).norm_squared();
        let converged =
            (chi_square / data.len() as f64 - 1.0).abs() < self.options.chi_square_limit;
        if !converged {
            warn!(
                "single-bin MaxEnt fit has chi^2/n = {:.4}",
                chi_square / data.len() as f64
            );
        }

        Ok(SolverOutcome {
            image,
            forward,
            chi_square,
            converged,
            iterations: 1,
            history: vec![IterationReport {
                iteration: 1,
                chi_square,
                entropy: 0.0,
                test: 0.0,
                clamped: 0,
                step_scale: 1.0,
            }],
        })
    }
}

/// Normalized entropy `-sum(p ln p)` of `image / sum(image)`.
pub fn normalized_entropy(image: &DVector<f64>) -> f64 {
    let total = image.sum();
    -image
        .iter()
        .map(|f| {
            let p = f / total;
            if p > 0.0 {
                p * p.ln()
            } else {
                0.0
            }
        })
        .sum::<f64>()
}

fn weighted_norm(image: &DVector<f64>, gradient: &DVector<f64>) -> f64 {
    image
        .iter()
        .zip(gradient.iter())
        .map(|(f, g)| f * g * g)
        .sum::<f64>()
        .sqrt()
}

/// The three image-space search directions and their data-space images.
struct SearchDirections {
    xi: [DVector<f64>; 3],
    eta: [DVector<f64>; 3],
}

impl SearchDirections {
    #[allow(clippy::too_many_arguments)]
    fn build<T: ImageTransform + ?Sized>(
        transform: &T,
        image: &DVector<f64>,
        sgrad: &DVector<f64>,
        cgrad: &DVector<f64>,
        sigma: &DVector<f64>,
        a: f64,
        b: f64,
        cnorm: f64,
    ) -> Self {
        let xi0 = image.component_mul(cgrad) / cnorm;
        let xi1 = image.zip_zip_map(sgrad, cgrad, |f, s, c| f * (a * s - b * c));
        let eta0 = transform.image_to_data(&xi0);
        let eta1 = transform.image_to_data(&xi1);

        let ox = eta1.zip_map(sigma, |e, s| e / (s * s));
        let curvature = transform.data_to_image(&ox);
        let norm = weighted_norm(image, &curvature);
        let xi2 = if norm > 0.0 {
            image.component_mul(&curvature) / norm
        } else {
            DVector::zeros(image.len())
        };
        let eta2 = transform.image_to_data(&xi2);

        Self {
            xi: [xi0, xi1, xi2],
            eta: [eta0, eta1, eta2],
        }
    }

    fn quadratics(
        &self,
        image: &DVector<f64>,
        sgrad: &DVector<f64>,
        cgrad: &DVector<f64>,
        sigma: &DVector<f64>,
        chisq: f64,
        blank: f64,
    ) -> Quadratics {
        let mut c1 = Vector3::zeros();
        let mut s1 = Vector3::zeros();
        let mut c2 = Matrix3::zeros();
        let mut s2 = Matrix3::zeros();

        for k in 0..3 {
            c1[k] = self.xi[k].dot(cgrad) / chisq;
            s1[k] = self.xi[k].dot(sgrad);
            for l in 0..=k {
                let chi_curvature: f64 = self.eta[k]
                    .iter()
                    .zip(self.eta[l].iter())
                    .zip(sigma.iter())
                    .map(|((ek, el), s)| ek * el / (s * s))
                    .sum();
                let entropy_curvature: f64 = self.xi[k]
                    .iter()
                    .zip(self.xi[l].iter())
                    .zip(image.iter())
                    .map(|((xk, xl), f)| xk * xl / f)
                    .sum();
                c2[(k, l)] = 2.0 * chi_curvature / chisq;
                s2[(k, l)] = -entropy_curvature / blank;
                c2[(l, k)] = c2[(k, l)];
                s2[(l, k)] = s2[(k, l)];
            }
        }

        Quadratics { c1, c2, s1, s2 }
    }
}

/// Quadratic models of chi-square (`c1`, `c2`, relative to the current
/// chi-square) and entropy (`s1`, `s2`) in the step coefficients.
#[derive(Clone, Debug)]
struct Quadratics {
    c1: Vector3<f64>,
    c2: Matrix3<f64>,
    s1: Vector3<f64>,
    s2: Matrix3<f64>,
}

impl Quadratics {
    /// Step coefficients for mixing parameter `ax` and the predicted chi-square ratio.
    fn chi_now(&self, ax: f64) -> Result<(f64, Vector3<f64>)> {
        let bx = 1.0 - ax;
        let a = self.c2 * bx - self.s2 * ax;
        let b = -(self.c1 * bx - self.s1 * ax);
        let beta = cho_sol(&a, &b)?;

        let mut w = 1.0;
        for k in 0..3 {
            let mut z = 0.0;
            for l in 0..3 {
                z += self.c2[(k, l)] * beta[l];
            }
            w += beta[k] * (self.c1[k] + 0.5 * z);
        }
        Ok((w, beta))
    }

    /// Chooses the step coefficients for one iteration and applies the distance cap.
    fn step(
        &self,
        opts: &MaxEntOptions,
        fsum: f64,
        blank: f64,
        chisq: f64,
        chizer: f64,
    ) -> Result<(Vector3<f64>, f64)> {
        let (cmin, beta_low) = self.chi_now(0.0)?;
        let target = if cmin * chisq > chizer {
            0.5 * (1.0 + cmin)
        } else {
            chizer / chisq
        };
        let mut f_low = cmin - target;
        let (cmax, beta_high) = self.chi_now(1.0)?;
        let mut f_high = cmax - target;

        let mut beta = if f_low * f_high > 0.0 {
            // target not bracketed
            if f_low.abs() <= f_high.abs() {
                beta_low
            } else {
                beta_high
            }
        } else {
            self.bisect(opts, target, &mut f_low, &mut f_high)?
        };

        let distance = -(beta.transpose() * self.s2 * beta)[(0, 0)];
        let mut step_scale = 1.0;
        if distance > opts.distance_limit_factor * fsum / blank {
            step_scale = (fsum / (blank * distance)).sqrt();
            beta *= step_scale;
        }
        Ok((beta, step_scale))
    }

    fn bisect(
        &self,
        opts: &MaxEntOptions,
        target: f64,
        f_low: &mut f64,
        f_high: &mut f64,
    ) -> Result<Vector3<f64>> {
        let mut low = 0.0;
        let mut high = 1.0;
        let mut beta = Vector3::zeros();
        let mut residual = f64::INFINITY;
        let mut loops = 0;

        while residual.abs() >= opts.move_tolerance {
            if loops == opts.max_move_loops {
                return Err(SasError::MoveDidNotConverge { loops, residual });
            }
            let mid = 0.5 * (low + high);
            let (chi, trial) = self.chi_now(mid)?;
            beta = trial;
            residual = chi - target;
            if *f_low * residual > 0.0 {
                low = mid;
                *f_low = residual;
            }
            if *f_high * residual > 0.0 {
                high = mid;
                *f_high = residual;
            }
            loops += 1;
        }
        Ok(beta)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn gaussian_kernel(n: usize, npt: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, npt, |j, i| {
            let centre = (j as f64 + 0.5) / n as f64;
            let x = (i as f64 + 0.5) / npt as f64;
            (-(x - centre).powi(2) / 0.02).exp() + 0.05
        })
    }

    #[test]
    fn recovers_a_smooth_image_without_divergence() {
        let g = gaussian_kernel(6, 30);
        let truth = DVector::from_vec(vec![0.3, 1.0, 1.8, 1.2, 0.5, 0.4]);
        let data = g.tr_mul(&truth);
        let sigma = DVector::from_element(30, 0.01 * data.max());
        let base = DVector::from_element(6, 0.1);

        let solver = MaxEntSolver::new(MaxEntOptions::default().with_max_iterations(200));
        assert_eq!(solver.options().max_iterations, 200);
        let outcome = solver.solve(&data, &sigma, &g, &base).unwrap();
        assert!(outcome.image.iter().all(|value| *value > 0.0));
        assert_eq!(outcome.history.len(), outcome.iterations);
        let initial = (&data - g.tr_mul(&base)).component_div(&sigma).norm_squared();
        assert!(outcome.chi_square < initial);
        assert_relative_eq!(
            outcome.forward,
            g.tr_mul(&outcome.image),
            max_relative = 1e-12
        );
    }

    #[test]
    fn exhausted_step_search_is_divergence() {
        let g = gaussian_kernel(6, 30);
        let truth = DVector::from_vec(vec![0.3, 1.0, 1.8, 1.2, 0.5, 0.4]);
        let data = g.tr_mul(&truth);
        let sigma = DVector::from_element(30, 0.01 * data.max());
        let base = DVector::from_element(6, 0.1);

        // the first bracketed step search needs about a dozen halvings
        let mut options = MaxEntOptions::default().with_max_iterations(200);
        options.max_move_loops = 1;
        let err = MaxEntSolver::new(options)
            .solve(&data, &sigma, &g, &base)
            .unwrap_err();
        assert!(matches!(err, SasError::MoveDidNotConverge { loops: 1, .. }));
        assert!(err.is_divergence());
    }

    #[test]
    fn exact_fit_returns_base_unchanged() {
        let g = gaussian_kernel(4, 12);
        let base = DVector::from_element(4, 0.5);
        let data = g.tr_mul(&base);
        let sigma = DVector::from_element(12, 1.0);

        let outcome = MaxEntSolver::default()
            .solve(&data, &sigma, &g, &base)
            .unwrap();
        assert_eq!(outcome.iterations, 0);
        assert!(!outcome.converged);
        assert_eq!(outcome.chi_square, 0.0);
        assert_eq!(outcome.image, base);
    }

    #[test]
    fn single_bin_uses_least_squares_scale() {
        let g = DMatrix::from_row_slice(1, 4, &[1.0, 2.0, 3.0, 4.0]);
        let data = DVector::from_vec(vec![2.0, 4.0, 6.0, 8.0]);
        let sigma = DVector::from_element(4, 1.0);
        let base = DVector::from_element(1, 1e-3);

        let outcome = MaxEntSolver::default()
            .solve(&data, &sigma, &g, &base)
            .unwrap();
        assert_relative_eq!(outcome.image[0], 2.0, max_relative = 1e-12);
        assert!(outcome.chi_square < 1e-20);
        // exact fit is far below the expected chi-square of n_data
        assert!(!outcome.converged);

        let negative = -data;
        let floored = MaxEntSolver::default()
            .solve(&negative, &sigma, &g, &base)
            .unwrap();
        assert_eq!(floored.image[0], 1e-3);
    }

    #[test]
    fn entropy_of_uniform_image_is_log_n() {
        let image = DVector::from_element(8, 3.0);
        assert_relative_eq!(normalized_entropy(&image), 8f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn invalid_inputs_are_rejected_before_solving() {
        let g = gaussian_kernel(3, 5);
        let data = DVector::from_element(5, 1.0);
        let solver = MaxEntSolver::default();

        let zero_sigma = DVector::from_element(5, 0.0);
        let err = solver
            .solve(&data, &zero_sigma, &g, &DVector::from_element(3, 1.0))
            .unwrap_err();
        assert!(!err.is_divergence());

        let bad_base = DVector::from_vec(vec![1.0, 0.0, 1.0]);
        assert!(solver
            .solve(&data, &DVector::from_element(5, 1.0), &g, &bad_base)
            .is_err());

        let short_base = DVector::from_element(2, 1.0);
        assert!(matches!(
            solver.solve(&data, &DVector::from_element(5, 1.0), &g, &short_base),
            Err(SasError::DimensionMismatch { .. })
        ));
    }
}
