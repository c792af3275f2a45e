//! Background model subtracted from the data before inversion.

use nalgebra::{DVector, Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::data::ScatteringProfile;
use crate::error::{Result, SasError};

/// `scale * Q^power` term of the background.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerLaw {
    pub scale: f64,
    pub power: f64,
}

impl PowerLaw {
    pub fn evaluate(&self, q: f64) -> f64 {
        self.scale * q.powf(self.power)
    }
}

/// Flat background plus an optional power law, `constant + scale * Q^power`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Background {
    pub constant: f64,
    pub power_law: Option<PowerLaw>,
}

impl Background {
    /// Flat background.
    pub fn flat(constant: f64) -> Self {
        Self {
            constant,
            power_law: None,
        }
    }

    pub fn with_power_law(mut self, scale: f64, power: f64) -> Self {
        self.power_law = Some(PowerLaw { scale, power });
        self
    }

    pub fn evaluate(&self, q: f64) -> f64 {
        self.constant + self.power_law.map_or(0.0, |law| law.evaluate(q))
    }

    /// Background at every point of `q`.
    pub fn evaluate_all(&self, q: &DVector<f64>) -> DVector<f64> {
        q.map(|value| self.evaluate(value))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let finite = self.constant.is_finite()
            && self
                .power_law
                .map_or(true, |law| law.scale.is_finite() && law.power.is_finite());
        if finite {
            Ok(())
        } else {
            Err(SasError::invalid_option(
                "background",
                format!("parameters must be finite, found {self:?}"),
            ))
        }
    }
}

/// Fitted power law with standard errors.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerLawFit {
    pub scale: f64,
    pub power: f64,
    pub scale_error: f64,
    /// Zero when the power was held fixed.
    pub power_error: f64,
    /// Number of points in the fitted range.
    pub points: usize,
}

impl PowerLawFit {
    pub fn power_law(&self) -> PowerLaw {
        PowerLaw {
            scale: self.scale,
            power: self.power,
        }
    }
}

/// Fits `ln I = ln A + m ln Q` over `[q_min, q_max]` by weighted least squares.
///
/// Log-space weights are `w I^2`, the profile weight propagated through the
/// logarithm. With `fixed_power` only the scale is fitted. Standard errors come
/// from the diagonal of the inverse normal matrix.
pub fn fit_power_law(
    profile: &ScatteringProfile,
    q_min: f64,
    q_max: f64,
    fixed_power: Option<f64>,
) -> Result<PowerLawFit> {
    if !(q_max > q_min) {
        return Err(SasError::EmptyQRange {
            qmin: q_min,
            qmax: q_max,
        });
    }
    let range = profile.q_range(q_min, q_max)?;
    let parameters = if fixed_power.is_some() { 1 } else { 2 };
    if range.len() < parameters {
        return Err(SasError::dimension_mismatch(
            "background fit points",
            parameters,
            range.len(),
        ));
    }

    let mut normal = Matrix2::<f64>::zeros();
    let mut rhs = Vector2::<f64>::zeros();
    for index in range.clone() {
        let intensity = profile.intensity()[index];
        if !(intensity > 0.0) {
            return Err(SasError::NonPositiveValue {
                context: "background intensity",
                index,
                value: intensity,
            });
        }
        let x = profile.q()[index].ln();
        let y = match fixed_power {
            Some(power) => intensity.ln() - power * x,
            None => intensity.ln(),
        };
        let w = profile.weight()[index] * intensity * intensity;
        normal[(0, 0)] += w;
        normal[(0, 1)] += w * x;
        normal[(1, 1)] += w * x * x;
        rhs[0] += w * y;
        rhs[1] += w * x * y;
    }
    normal[(1, 0)] = normal[(0, 1)];

    if let Some(power) = fixed_power {
        if !(normal[(0, 0)] > 0.0) {
            return Err(SasError::singular("background scale fit"));
        }
        let log_scale = rhs[0] / normal[(0, 0)];
        let scale = log_scale.exp();
        return Ok(PowerLawFit {
            scale,
            power,
            scale_error: scale * (1.0 / normal[(0, 0)]).sqrt(),
            power_error: 0.0,
            points: range.len(),
        });
    }

    let cholesky = nalgebra::linalg::Cholesky::new(normal)
        .ok_or_else(|| SasError::singular("background power-law fit"))?;
    let solution = cholesky.solve(&rhs);
    let covariance = cholesky.inverse();
    let scale = solution[0].exp();
    Ok(PowerLawFit {
        scale,
        power: solution[1],
        scale_error: scale * covariance[(0, 0)].sqrt(),
        power_error: covariance[(1, 1)].sqrt(),
        points: range.len(),
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::data::ScatteringProfileBuilder;

    fn porod_profile() -> ScatteringProfile {
        let q = DVector::from_fn(20, |i, _| 0.01 * (i + 1) as f64);
        let intensity = q.map(|value| 3e-6 * value.powi(-4));
        let errors = intensity.map(|value| 0.05 * value);
        ScatteringProfileBuilder::new(q, intensity)
            .uncertainties(errors)
            .build()
            .unwrap()
    }

    #[test]
    fn recovers_exact_power_law() {
        let fit = fit_power_law(&porod_profile(), 0.05, 0.15, None).unwrap();
        assert_relative_eq!(fit.power, -4.0, epsilon = 1e-9);
        assert_relative_eq!(fit.scale, 3e-6, max_relative = 1e-8);
        assert_eq!(fit.points, 11);
        assert!(fit.scale_error > 0.0 && fit.power_error > 0.0);
    }

    #[test]
    fn fixed_power_fits_scale_only() {
        let fit = fit_power_law(&porod_profile(), 0.02, 0.2, Some(-4.0)).unwrap();
        assert_relative_eq!(fit.scale, 3e-6, max_relative = 1e-10);
        assert_eq!(fit.power_error, 0.0);
        let background = Background::flat(0.1).with_power_law(fit.scale, fit.power);
        assert_relative_eq!(background.evaluate(0.1), 0.1 + 3e-2, max_relative = 1e-9);
    }

    #[test]
    fn degenerate_ranges_are_rejected() {
        let profile = porod_profile();
        assert!(fit_power_law(&profile, 0.1, 0.1, None).is_err());
        assert!(matches!(
            fit_power_law(&profile, 0.3, 0.4, None),
            Err(SasError::EmptyQRange { .. })
        ));
        // a lone point cannot determine both parameters
        assert!(fit_power_law(&profile, 0.2, 0.25, None).is_err());

        let negative = ScatteringProfile::new(
            DVector::from_vec(vec![0.1, 0.2, 0.3]),
            DVector::from_vec(vec![1.0, -1.0, 1.0]),
        )
        .unwrap();
        assert!(matches!(
            fit_power_law(&negative, 0.1, 0.3, None),
            Err(SasError::NonPositiveValue { index: 1, .. })
        ));
    }
}
