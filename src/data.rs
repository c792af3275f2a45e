//! Scattering profile containers, weighting schemes and Q-range selection.

use std::ops::Range;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive, Result, SasError};

/// How per-point inverse-variance weights are derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scheme", content = "percent")]
pub enum WeightScheme {
    /// Every point weighted equally.
    #[default]
    Uniform,
    /// `1 / dI^2` from measured uncertainties.
    Uncertainty,
    /// Poisson-like errors, `sigma = sqrt(I)`.
    SqrtIntensity,
    /// `sigma` is the given percentage of `|I|`.
    PercentIntensity(f64),
}

impl WeightScheme {
    /// Builds the weight array for `intensity`.
    pub fn weights(
        &self,
        intensity: &DVector<f64>,
        uncertainties: Option<&DVector<f64>>,
    ) -> Result<DVector<f64>> {
        let sigma = match self {
            Self::Uniform => return Ok(DVector::from_element(intensity.len(), 1.0)),
            Self::Uncertainty => {
                let errors = uncertainties.ok_or_else(|| {
                    SasError::invalid_option("weight scheme", "uncertainty weighting needs dI")
                })?;
                if errors.len() != intensity.len() {
                    return Err(SasError::dimension_mismatch(
                        "uncertainty length",
                        intensity.len(),
                        errors.len(),
                    ));
                }
                errors.clone()
            }
            Self::SqrtIntensity => intensity.map(|i| if i > 0.0 { i.sqrt() } else { 0.0 }),
            Self::PercentIntensity(percent) => {
                if !(*percent > 0.0) {
                    return Err(SasError::invalid_option(
                        "weight scheme",
                        format!("percentage must be positive, found {percent}"),
                    ));
                }
                intensity.map(|i| percent / 100.0 * i.abs())
            }
        };
        ensure_positive("sigma", sigma.iter())?;
        Ok(sigma.map(|s| 1.0 / (s * s)))
    }
}

/// Measured intensity profile together with the arrays written by an inversion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScatteringProfile {
    q: DVector<f64>,
    intensity: DVector<f64>,
    weight: DVector<f64>,
    computed: DVector<f64>,
    background: DVector<f64>,
}

impl ScatteringProfile {
    /// Builds a uniformly weighted profile.
    pub fn new(q: DVector<f64>, intensity: DVector<f64>) -> Result<Self> {
        ScatteringProfileBuilder::new(q, intensity).build()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    /// Ascending scattering-vector magnitudes.
    pub fn q(&self) -> &DVector<f64> {
        &self.q
    }

    pub fn intensity(&self) -> &DVector<f64> {
        &self.intensity
    }

    /// Inverse-variance weights.
    pub fn weight(&self) -> &DVector<f64> {
        &self.weight
    }

    /// Intensity predicted by the last inversion (zero outside its Q-range).
    pub fn computed(&self) -> &DVector<f64> {
        &self.computed
    }

    /// Background level evaluated at every Q by the last inversion.
    pub fn background(&self) -> &DVector<f64> {
        &self.background
    }

    /// Index range `[searchsorted(q_min), searchsorted(q_max) + 1)`, clamped to the profile.
    pub fn q_range(&self, q_min: f64, q_max: f64) -> Result<Range<usize>> {
        let q = self.q.as_slice();
        let start = q.partition_point(|value| *value < q_min);
        let end = (q.partition_point(|value| *value < q_max) + 1).min(q.len());
        if !(q_min <= q_max) || start >= end {
            return Err(SasError::EmptyQRange {
                qmin: q_min,
                qmax: q_max,
            });
        }
        Ok(start..end)
    }

    /// Stores the fitted intensity over `range` and the background everywhere.
    pub(crate) fn record_fit(
        &mut self,
        range: Range<usize>,
        fitted: &DVector<f64>,
        background: DVector<f64>,
    ) {
        self.computed.fill(0.0);
        for (offset, index) in range.enumerate() {
            self.computed[index] = fitted[offset];
        }
        self.background = background;
    }
}

/// Builder validating lengths, ordering and weights before constructing a [`ScatteringProfile`].
#[derive(Debug)]
pub struct ScatteringProfileBuilder {
    q: DVector<f64>,
    intensity: DVector<f64>,
    uncertainties: Option<DVector<f64>>,
    weights: Option<DVector<f64>>,
    scheme: Option<WeightScheme>,
}

impl ScatteringProfileBuilder {
    pub fn new(q: DVector<f64>, intensity: DVector<f64>) -> Self {
        Self {
            q,
            intensity,
            uncertainties: None,
            weights: None,
            scheme: None,
        }
    }

    /// Measured one-sigma uncertainties; selects [`WeightScheme::Uncertainty`] unless overridden.
    pub fn uncertainties(mut self, errors: DVector<f64>) -> Self {
        self.uncertainties = Some(errors);
        self
    }

    /// Explicit inverse-variance weights, taking precedence over any scheme.
    pub fn weights(mut self, weights: DVector<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn weight_scheme(mut self, scheme: WeightScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn build(self) -> Result<ScatteringProfile> {
        let n = self.q.len();
        if n == 0 {
            return Err(SasError::dimension_mismatch("Q length", 1, 0));
        }
        if self.intensity.len() != n {
            return Err(SasError::dimension_mismatch(
                "intensity length",
                n,
                self.intensity.len(),
            ));
        }
        ensure_positive("Q", self.q.iter())?;
        for (index, pair) in self.q.as_slice().windows(2).enumerate() {
            if !(pair[1] > pair[0]) {
                return Err(SasError::NonPositiveValue {
                    context: "Q increment",
                    index: index + 1,
                    value: pair[1] - pair[0],
                });
            }
        }
        if self.intensity.iter().any(|value| !value.is_finite()) {
            return Err(SasError::NumericalError {
                context: "intensity validation",
            });
        }

        let weight = match self.weights {
            Some(weights) => {
                if weights.len() != n {
                    return Err(SasError::dimension_mismatch("weight length", n, weights.len()));
                }
                ensure_positive("weight", weights.iter())?;
                weights
            }
            None => {
                let scheme = self.scheme.unwrap_or(if self.uncertainties.is_some() {
                    WeightScheme::Uncertainty
                } else {
                    WeightScheme::Uniform
                });
                scheme.weights(&self.intensity, self.uncertainties.as_ref())?
            }
        };

        Ok(ScatteringProfile {
            q: self.q,
            intensity: self.intensity,
            weight,
            computed: DVector::zeros(n),
            background: DVector::zeros(n),
        })
    }
}
