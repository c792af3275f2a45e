//! Summary statistics of a recovered size distribution, in diameter units.

use serde::{Deserialize, Serialize};

use crate::inversion::SizeDistribution;
use crate::shapes::Shape;

/// Volume fraction and characteristic diameters of a distribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionStatistics {
    /// Integral of the volume distribution over diameter.
    pub volume: f64,
    /// Spread of `volume` across noise replicates; zero for a single solve.
    pub volume_error: f64,
    /// Volume-weighted mean diameter.
    pub mean: f64,
    /// Diameter at which the cumulative volume reaches one half.
    pub median: f64,
    /// Diameter of the most frequent particle (number distribution maximum).
    pub mode: f64,
}

impl DistributionStatistics {
    /// Computes the statistics; characteristic diameters are zero for an empty distribution.
    pub fn from_distribution(distribution: &SizeDistribution, shape: &Shape) -> Self {
        let diameters: Vec<f64> = distribution.bin_centers.iter().map(|r| 2.0 * r).collect();
        let magnitudes = &distribution.bin_magnitudes;
        let masses: Vec<f64> = magnitudes
            .iter()
            .zip(distribution.bin_widths.iter())
            .map(|(m, w)| m * 2.0 * w)
            .collect();

        let volume = if diameters.len() == 1 {
            masses[0]
        } else {
            trapezoid(&diameters, magnitudes.as_slice())
        };

        let total: f64 = masses.iter().sum();
        if !(total > 0.0) {
            return Self {
                volume,
                ..Self::default()
            };
        }

        let mean = masses
            .iter()
            .zip(diameters.iter())
            .map(|(mass, d)| mass * d)
            .sum::<f64>()
            / total;

        let mut cumulative = 0.0;
        let mut median = diameters[diameters.len() - 1];
        for (mass, d) in masses.iter().zip(diameters.iter()) {
            cumulative += mass / total;
            if cumulative >= 0.5 {
                median = *d;
                break;
            }
        }

        let mut mode = diameters[0];
        let mut peak = f64::NEG_INFINITY;
        for ((m, r), d) in magnitudes
            .iter()
            .zip(distribution.bin_centers.iter())
            .zip(diameters.iter())
        {
            let number = m / shape.volume(*r);
            if number > peak {
                peak = number;
                mode = *d;
            }
        }

        Self {
            volume,
            volume_error: 0.0,
            mean,
            median,
            mode,
        }
    }

    pub fn with_volume_error(mut self, volume_error: f64) -> Self {
        self.volume_error = volume_error;
        self
    }
}

fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]))
        .sum()
}
