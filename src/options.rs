//! Configuration of a complete size-distribution inversion.
//!
//! Every struct deserializes over its defaults, so a configuration document only
//! needs to name the values it changes.

use serde::{Deserialize, Serialize};

use crate::background::Background;
use crate::bins::{BinSpacing, SizeBins};
use crate::error::{Result, SasError};
use crate::replicates::ReplicateOptions;
use crate::solving::{IpgOptions, MaxEntOptions};

/// Bin layout in diameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinOptions {
    pub count: usize,
    pub min_diameter: f64,
    pub max_diameter: f64,
    pub spacing: BinSpacing,
}

impl Default for BinOptions {
    fn default() -> Self {
        Self {
            count: 40,
            min_diameter: 10.0,
            max_diameter: 1_000.0,
            spacing: BinSpacing::Logarithmic,
        }
    }
}

impl BinOptions {
    pub fn new(count: usize, min_diameter: f64, max_diameter: f64, spacing: BinSpacing) -> Self {
        Self {
            count,
            min_diameter,
            max_diameter,
            spacing,
        }
    }

    /// Builds the radius bins described by these options.
    pub fn build(&self) -> Result<SizeBins> {
        SizeBins::new(self.count, self.min_diameter, self.max_diameter, self.spacing)
    }
}

/// A registry shape name with its positional parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeSelection {
    pub name: String,
    pub parameters: Vec<f64>,
}

impl Default for ShapeSelection {
    fn default() -> Self {
        Self {
            name: "Sphere".to_string(),
            parameters: Vec::new(),
        }
    }
}

impl ShapeSelection {
    pub fn new(name: impl Into<String>, parameters: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
}

/// Which regularization inverts the data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SolverChoice {
    MaxEnt(MaxEntOptions),
    Ipg(IpgOptions),
}

impl Default for SolverChoice {
    fn default() -> Self {
        Self::MaxEnt(MaxEntOptions::default())
    }
}

impl SolverChoice {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxEnt(_) => "MaxEnt",
            Self::Ipg(_) => "IPG",
        }
    }
}

/// Full configuration of one inversion run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InversionOptions {
    pub q_min: f64,
    pub q_max: f64,
    pub bins: BinOptions,
    pub shape: ShapeSelection,
    /// Scattering contrast in 1e20 cm^-4.
    pub contrast: f64,
    /// Multiplies the measured intensity and the sigma.
    pub scale: f64,
    pub background: Background,
    /// Log10 of the flat prior image, before the scale/contrast conversion.
    pub sky_log10: f64,
    /// Multiplies the variance implied by the profile weights.
    pub weight_factor: f64,
    pub solver: SolverChoice,
    pub replicates: Option<ReplicateOptions>,
}

impl Default for InversionOptions {
    fn default() -> Self {
        Self {
            q_min: 0.0,
            q_max: f64::MAX,
            bins: BinOptions::default(),
            shape: ShapeSelection::default(),
            contrast: 1.0,
            scale: 1.0,
            background: Background::default(),
            sky_log10: -6.0,
            weight_factor: 1.0,
            solver: SolverChoice::default(),
            replicates: None,
        }
    }
}

impl InversionOptions {
    /// Restrict the inversion to `[q_min, q_max]`.
    pub fn with_q_range(mut self, q_min: f64, q_max: f64) -> Self {
        self.q_min = q_min;
        self.q_max = q_max;
        self
    }

    pub fn with_bins(mut self, bins: BinOptions) -> Self {
        self.bins = bins;
        self
    }

    pub fn with_shape(mut self, name: impl Into<String>, parameters: Vec<f64>) -> Self {
        self.shape = ShapeSelection::new(name, parameters);
        self
    }

    pub fn with_contrast(mut self, contrast: f64) -> Self {
        self.contrast = contrast;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_background(mut self, background: Background) -> Self {
        self.background = background;
        self
    }

    pub fn with_sky_log10(mut self, sky_log10: f64) -> Self {
        self.sky_log10 = sky_log10;
        self
    }

    pub fn with_weight_factor(mut self, weight_factor: f64) -> Self {
        self.weight_factor = weight_factor;
        self
    }

    pub fn with_solver(mut self, solver: SolverChoice) -> Self {
        self.solver = solver;
        self
    }

    /// Solve `count` noisy replicates instead of the data alone.
    pub fn with_replicates(mut self, count: usize, seed: u64) -> Self {
        self.replicates = Some(ReplicateOptions::new(count, seed));
        self
    }

    /// Flat prior value per bin: `10^sky * scale / contrast`.
    pub fn sky_level(&self) -> f64 {
        10f64.powf(self.sky_log10) * self.scale / self.contrast
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("contrast", self.contrast),
            ("scale", self.scale),
            ("weight_factor", self.weight_factor),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(SasError::invalid_option(
                    name,
                    format!("must be positive and finite, found {value}"),
                ));
            }
        }
        if !self.sky_log10.is_finite() || !(self.sky_level() > 0.0) {
            return Err(SasError::invalid_option(
                "sky_log10",
                format!("gives no positive prior, found {}", self.sky_log10),
            ));
        }
        self.background.validate()?;
        match &self.solver {
            SolverChoice::MaxEnt(options) => options.validate()?,
            SolverChoice::Ipg(options) => options.validate()?,
        }
        if let Some(replicates) = &self.replicates {
            replicates.validate()?;
        }
        Ok(())
    }
}
