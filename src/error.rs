use thiserror::Error;

/// Unified error type for `sasdist` operations.
#[derive(Debug, Error)]
pub enum SasError {
    /// Raised when provided arrays or matrices have incompatible dimensions.
    #[error("dimension mismatch in {context}: expected {expected} but found {found}")]
    DimensionMismatch {
        /// Human-readable context describing the operation.
        context: &'static str,
        /// The required dimension, usually implied by the Q-grid or the bins.
        expected: usize,
        /// The dimension that was actually supplied.
        found: usize,
    },

    /// Raised when the requested number of size bins is zero.
    #[error("bin count must be positive, found {count}")]
    InvalidBinCount { count: usize },

    /// Raised when the diameter range is empty, inverted or non-positive.
    #[error("diameter range must satisfy 0 < min <= max, found [{min}, {max}]")]
    InvalidDiameterRange { min: f64, max: f64 },

    /// Raised when an entry that must be strictly positive is not.
    #[error("{context} at index {index} must be positive, found {value}")]
    NonPositiveValue {
        context: &'static str,
        index: usize,
        value: f64,
    },

    /// Raised when the active Q-range selects no data points.
    #[error("Q range [{qmin}, {qmax}] selects no data points")]
    EmptyQRange { qmin: f64, qmax: f64 },

    /// Raised when a shape receives the wrong number or kind of parameters.
    #[error("invalid parameters for shape `{shape}`: {reason}")]
    InvalidShapeParameters { shape: &'static str, reason: String },

    /// Raised when a shape name is not part of the registry.
    #[error("unknown shape `{name}`")]
    UnknownShape { name: String },

    /// Raised when a configuration value is out of its admissible range.
    #[error("invalid option `{name}`: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    /// Raised when a least-squares system is singular, e.g. a background fit
    /// over a range with a single distinct Q.
    #[error("singular system in {context}")]
    SingularSystem { context: &'static str },

    /// Raised when the 3x3 Cholesky factorization meets a non-positive pivot.
    #[error("Cholesky pivot {pivot} must be positive")]
    NonPositivePivot { pivot: f64 },

    /// Raised when the bisection on the entropy/chi-square mixing parameter runs out of loops.
    #[error("step search did not reach its target after {loops} loops; residual {residual}")]
    MoveDidNotConverge {
        /// Number of bisection loops performed.
        loops: usize,
        /// Distance to the chi-square target in the last loop.
        residual: f64,
    },

    /// Raised when a solver produces a non-finite quantity.
    #[error("encountered a non-finite value during {context}")]
    NumericalError { context: &'static str },
}

/// Coarse classification of [`SasError`] values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller supplied inconsistent or out-of-range inputs; nothing was computed.
    Input,
    /// The solver hit a numerically degenerate configuration.
    SolverDivergence,
}

impl SasError {
    /// Helper to format a [`DimensionMismatch`](SasError::DimensionMismatch) error.
    pub fn dimension_mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            found,
        }
    }

    /// Helper for singular least-squares systems.
    pub fn singular(context: &'static str) -> Self {
        Self::SingularSystem { context }
    }

    /// Helper for shape parameter validation failures.
    pub fn shape_parameters(shape: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidShapeParameters {
            shape,
            reason: reason.into(),
        }
    }

    /// Helper for rejected configuration values.
    pub fn invalid_option(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            name,
            reason: reason.into(),
        }
    }

    /// Which side of the input/divergence split this error falls on.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NonPositivePivot { .. }
            | Self::MoveDidNotConverge { .. }
            | Self::NumericalError { .. } => ErrorClass::SolverDivergence,
            _ => ErrorClass::Input,
        }
    }

    /// True when the error signals solver divergence rather than bad input.
    pub fn is_divergence(&self) -> bool {
        self.class() == ErrorClass::SolverDivergence
    }
}

/// Checks that every entry of `values` is finite and strictly positive.
pub(crate) fn ensure_positive<'a, I>(context: &'static str, values: I) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    for (index, value) in values.into_iter().enumerate() {
        if !(*value > 0.0) || !value.is_finite() {
            return Err(SasError::NonPositiveValue {
                context,
                index,
                value: *value,
            });
        }
    }
    Ok(())
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, SasError>;
