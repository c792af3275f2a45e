//! Particle size distributions from small-angle scattering data.
//!
//! The crate inverts a measured intensity profile `I(Q)` into a non-negative
//! histogram of particle sizes for a chosen particle shape. The forward model is
//! a dense response matrix built from the shape's form factor and volume; the
//! ill-posed inversion is regularized either by maximum entropy (Skilling–Bryan)
//! or by non-negative least squares with an interior-point gradient method.
//!
//! It offers tools to
//!
//! - hold and weight measured profiles (`data` module),
//! - describe particle shapes through an immutable registry (`shapes` module),
//! - build the response matrix over size bins (`bins` and `response` modules),
//! - run the solvers directly (`maxent` and `ipg` modules), and
//! - drive a complete inversion with background subtraction, noise replicates
//!   and summary statistics (`inversion` module).
//!
//! # Quick start
//!
//! ```no_run
//! use nalgebra::DVector;
//! use sasdist::bins::BinSpacing;
//! use sasdist::data::ScatteringProfileBuilder;
//! use sasdist::inversion::SizeDistributionProblem;
//! use sasdist::options::{BinOptions, InversionOptions, SolverChoice};
//! use sasdist::solving::MaxEntOptions;
//!
//! let q = DVector::from_fn(100, |i, _| 0.005 + 0.003 * i as f64);
//! let intensity = q.map(|value| 1e-3 * value.powi(-2) + 0.1);
//! let errors = intensity.map(|value| 0.05 * value);
//!
//! let mut profile = ScatteringProfileBuilder::new(q, intensity)
//!     .uncertainties(errors)
//!     .build()
//!     .expect("validated profile");
//!
//! let options = InversionOptions::default()
//!     .with_q_range(0.01, 0.25)
//!     .with_bins(BinOptions::new(40, 10.0, 500.0, BinSpacing::Logarithmic))
//!     .with_shape("Spheroid", vec![1.5])
//!     .with_solver(SolverChoice::MaxEnt(
//!         MaxEntOptions::default().with_max_iterations(200),
//!     ));
//!
//! let result = SizeDistributionProblem::default()
//!     .solve(&mut profile, &options)
//!     .expect("inversion ran");
//! println!(
//!     "chi^2/n = {:.3}, mean diameter {:.1}",
//!     result.reduced_chi_square(),
//!     result.statistics.mean
//! );
//! ```

pub mod background;
pub mod bins;
pub mod data;
pub mod error;
pub mod inversion;
pub mod ipg;
pub mod linalg;
pub mod maxent;
pub mod options;
pub mod replicates;
pub mod response;
pub mod shapes;
pub mod solving;
pub mod special;
pub mod statistics;

pub use data::{ScatteringProfile, ScatteringProfileBuilder, WeightScheme};
pub use error::{ErrorClass, Result, SasError};
pub use inversion::{InversionResult, SizeDistribution, SizeDistributionProblem};
pub use ipg::IpgSolver;
pub use maxent::MaxEntSolver;
pub use options::{BinOptions, InversionOptions, SolverChoice};
pub use shapes::{Shape, ShapeKind, ShapeRegistry};
pub use solving::{IpgOptions, MaxEntOptions, SolverOutcome};
