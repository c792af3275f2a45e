//! Response matrix linking size bins to scattered intensity.
//!
//! `G[j, i] = RESPONSE_SCALE * contrast * V(r_j) * F(Q_i, r_j)^2`, one row per
//! bin and one column per Q point. Each entry costs one form-factor evaluation,
//! which for orientation-averaged shapes is itself a fixed-order quadrature
//! (see [`crate::shapes`]). Rows are independent and are built in parallel.

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::error::{ensure_positive, Result, SasError};
use crate::shapes::Shape;

/// Unit conversion between 1e-20 cm^-4 contrast and 1e-24 cm^3 volumes.
pub const RESPONSE_SCALE: f64 = 1e-4;

/// Builds the response matrix for a registered shape.
pub fn response_matrix(
    q: &[f64],
    radii: &[f64],
    contrast: f64,
    shape: &Shape,
) -> Result<DMatrix<f64>> {
    shape.validate()?;
    for radius in radii {
        shape.check_size(*radius)?;
    }
    response_matrix_with(
        q,
        radii,
        contrast,
        |q, r| shape.form_factor(q, r),
        |r| shape.volume(r),
    )
}

/// Builds the response matrix from arbitrary form-factor and volume functions.
pub fn response_matrix_with<F, V>(
    q: &[f64],
    radii: &[f64],
    contrast: f64,
    form_factor: F,
    volume: V,
) -> Result<DMatrix<f64>>
where
    F: Fn(f64, f64) -> f64 + Sync,
    V: Fn(f64) -> f64 + Sync,
{
    if q.is_empty() {
        return Err(SasError::dimension_mismatch("Q grid length", 1, 0));
    }
    if radii.is_empty() {
        return Err(SasError::InvalidBinCount { count: 0 });
    }
    ensure_positive("Q", q)?;
    ensure_positive("bin radius", radii)?;
    if !contrast.is_finite() {
        return Err(SasError::invalid_option(
            "contrast",
            format!("must be finite, found {contrast}"),
        ));
    }

    let rows: Vec<Vec<f64>> = radii
        .par_iter()
        .map(|&r| {
            let weight = RESPONSE_SCALE * contrast * volume(r);
            q.iter()
                .map(|&qi| weight * form_factor(qi, r).powi(2))
                .collect()
        })
        .collect();

    let matrix = DMatrix::from_fn(radii.len(), q.len(), |j, i| rows[j][i]);
    if matrix.iter().any(|value| !value.is_finite()) {
        return Err(SasError::NumericalError {
            context: "response matrix construction",
        });
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn q_grid() -> Vec<f64> {
        (0..20).map(|i| 0.005 + 0.01 * i as f64).collect()
    }

    #[test]
    fn single_bin_sphere_row_matches_direct_construction() {
        let q = q_grid();
        let r = 42.0;
        let contrast = 3.5;
        let g = response_matrix(&q, &[r], contrast, &Shape::Sphere).unwrap();
        assert_eq!(g.shape(), (1, q.len()));
        for (i, qi) in q.iter().enumerate() {
            let expected = RESPONSE_SCALE
                * contrast
                * Shape::Sphere.volume(r)
                * Shape::Sphere.form_factor(*qi, r).powi(2);
            assert_relative_eq!(g[(0, i)], expected, max_relative = 1e-14);
        }
    }

    #[test]
    fn rows_follow_bin_order() {
        let q = q_grid();
        let radii = [10.0, 20.0, 40.0];
        let g = response_matrix(&q, &radii, 1.0, &Shape::Spheroid { aspect_ratio: 2.0 }).unwrap();
        assert_eq!(g.shape(), (3, q.len()));
        // forward scattering grows with particle volume
        assert!(g[(0, 0)] < g[(1, 0)]);
        assert!(g[(1, 0)] < g[(2, 0)]);
    }

    #[test]
    fn custom_functions_are_honored() {
        let q = [0.1, 0.2];
        let g = response_matrix_with(&q, &[1.0, 2.0], 2.0, |q, r| q * r, |r| r).unwrap();
        assert_relative_eq!(g[(1, 1)], RESPONSE_SCALE * 2.0 * 2.0 * 0.16, max_relative = 1e-14);
    }

    #[test]
    fn empty_or_invalid_inputs_are_rejected() {
        assert!(response_matrix(&[], &[1.0], 1.0, &Shape::Sphere).is_err());
        assert!(response_matrix(&[0.1], &[], 1.0, &Shape::Sphere).is_err());
        assert!(response_matrix(&[0.1], &[-1.0], 1.0, &Shape::Sphere).is_err());
        let tube = Shape::UnifiedTube {
            length: 10.0,
            thickness: 5.0,
        };
        assert!(response_matrix(&[0.1], &[4.0], 1.0, &tube).is_err());
    }
}
