//! Size bins: radius centers and widths derived from a diameter range.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SasError};

/// How bin edges are spread between the minimum and maximum diameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinSpacing {
    Linear,
    #[default]
    Logarithmic,
}

/// Radius bins used for one inversion. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeBins {
    edges: Vec<f64>,
    centers: Vec<f64>,
    widths: Vec<f64>,
}

impl SizeBins {
    /// Splits `[min_diameter, max_diameter]` into `count` bins and converts to radii.
    ///
    /// Edges are spaced linearly or logarithmically in diameter, halved into
    /// radii; each center sits halfway between its two edges.
    pub fn new(
        count: usize,
        min_diameter: f64,
        max_diameter: f64,
        spacing: BinSpacing,
    ) -> Result<Self> {
        if count == 0 {
            return Err(SasError::InvalidBinCount { count });
        }
        let valid = min_diameter > 0.0
            && min_diameter.is_finite()
            && max_diameter.is_finite()
            && max_diameter >= min_diameter;
        if !valid {
            return Err(SasError::InvalidDiameterRange {
                min: min_diameter,
                max: max_diameter,
            });
        }

        let steps = count as f64;
        let edges: Vec<f64> = match spacing {
            BinSpacing::Linear => (0..=count)
                .map(|k| (min_diameter + (max_diameter - min_diameter) * k as f64 / steps) / 2.0)
                .collect(),
            BinSpacing::Logarithmic => {
                let lo = min_diameter.log10();
                let hi = max_diameter.log10();
                (0..=count)
                    .map(|k| 10f64.powf(lo + (hi - lo) * k as f64 / steps) / 2.0)
                    .collect()
            }
        };

        let widths: Vec<f64> = edges.windows(2).map(|pair| pair[1] - pair[0]).collect();
        for (index, width) in widths.iter().enumerate() {
            if !(*width > 0.0) {
                return Err(SasError::NonPositiveValue {
                    context: "bin width",
                    index,
                    value: *width,
                });
            }
        }
        let centers = edges
            .iter()
            .zip(widths.iter())
            .map(|(edge, width)| edge + width / 2.0)
            .collect();

        Ok(Self {
            edges,
            centers,
            widths,
        })
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    /// Always false; a bin set holds at least one bin.
    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Bin-center radii.
    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    /// Bin widths in radius.
    pub fn widths(&self) -> &[f64] {
        &self.widths
    }

    /// The `len() + 1` bin edges in radius.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn logarithmic_bins_have_constant_ratio() {
        let bins = SizeBins::new(4, 10.0, 10_000.0, BinSpacing::Logarithmic).unwrap();
        assert_eq!(bins.len(), 4);
        assert_relative_eq!(bins.edges()[0], 5.0, epsilon = 1e-9);
        assert_relative_eq!(bins.edges()[4], 5_000.0, epsilon = 1e-6);
        for pair in bins.edges().windows(2) {
            assert_relative_eq!(pair[1] / pair[0], 10f64.powf(0.75), epsilon = 1e-9);
        }
    }

    #[test]
    fn linear_bins_are_evenly_spaced_radii() {
        let bins = SizeBins::new(5, 10.0, 110.0, BinSpacing::Linear).unwrap();
        for width in bins.widths() {
            assert_relative_eq!(*width, 10.0, epsilon = 1e-12);
        }
        assert_relative_eq!(bins.centers()[0], 10.0, epsilon = 1e-12);
        assert_relative_eq!(bins.centers()[4], 50.0, epsilon = 1e-12);
    }

    #[test]
    fn single_bin_is_allowed() {
        let bins = SizeBins::new(1, 20.0, 80.0, BinSpacing::Logarithmic).unwrap();
        assert_eq!(bins.len(), 1);
        assert!(bins.widths()[0] > 0.0);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(matches!(
            SizeBins::new(0, 10.0, 100.0, BinSpacing::Linear),
            Err(SasError::InvalidBinCount { .. })
        ));
        assert!(matches!(
            SizeBins::new(3, 0.0, 100.0, BinSpacing::Linear),
            Err(SasError::InvalidDiameterRange { .. })
        ));
        assert!(matches!(
            SizeBins::new(3, 100.0, 10.0, BinSpacing::Logarithmic),
            Err(SasError::InvalidDiameterRange { .. })
        ));
        // a degenerate range has zero-width bins
        assert!(SizeBins::new(3, 50.0, 50.0, BinSpacing::Linear).is_err());
    }
}
