//! Particle shapes, their form factors and volumes, and the registry that names them.
//!
//! Every shape is parametrized by a single size variable (the bin radius, or the
//! half-length for [`Shape::Cylinder`]) plus fixed shape parameters. Form factors
//! are normalized scattering amplitudes, so the response for one particle is
//! `volume * form_factor^2`.
//!
//! The spheroid and cylinder variants average over particle orientation with a
//! fixed-order quadrature ([`SPHEROID_QUADRATURE_POINTS`] and
//! [`CYLINDER_QUADRATURE_POINTS`] evaluations per `(Q, r)` pair), which dominates
//! the cost of building a response matrix for those shapes.

use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SasError};
use crate::special::{bessel_j1_over_x, erf, sinc, sphere_amplitude};

/// Orientation samples used by [`Shape::Spheroid`].
pub const SPHEROID_QUADRATURE_POINTS: usize = 50;
/// Orientation samples used by the cylinder variants.
pub const CYLINDER_QUADRATURE_POINTS: usize = 200;

/// Aspect ratios inside this open interval are treated as spheres.
const SPHERICAL_ASPECT_RANGE: (f64, f64) = (0.99, 1.01);

/// Identifier of a registered shape family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Sphere,
    SphericalShell,
    Spheroid,
    Cylinder,
    CylinderAspect,
    UnifiedSphere,
    UnifiedRod,
    UnifiedRodAspect,
    UnifiedDisk,
    UnifiedTube,
}

impl ShapeKind {
    /// Canonical registry name of this shape family.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sphere => "Sphere",
            Self::SphericalShell => "Spherical shell",
            Self::Spheroid => "Spheroid",
            Self::Cylinder => "Cylinder",
            Self::CylinderAspect => "Cylinder AR",
            Self::UnifiedSphere => "Unified sphere",
            Self::UnifiedRod => "Unified rod",
            Self::UnifiedRodAspect => "Unified rod AR",
            Self::UnifiedDisk => "Unified disk",
            Self::UnifiedTube => "Unified tube",
        }
    }

    /// Names of the fixed parameters, in the order [`ShapeKind::build`] expects them.
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            Self::Sphere | Self::UnifiedSphere => &[],
            Self::SphericalShell => &["ratio"],
            Self::Spheroid | Self::CylinderAspect | Self::UnifiedRodAspect => &["aspect_ratio"],
            Self::Cylinder => &["radius"],
            Self::UnifiedRod => &["length"],
            Self::UnifiedDisk => &["thickness"],
            Self::UnifiedTube => &["length", "thickness"],
        }
    }

    /// Builds a validated [`Shape`] from positional parameters.
    pub fn build(self, parameters: &[f64]) -> Result<Shape> {
        let names = self.parameter_names();
        if parameters.len() != names.len() {
            return Err(SasError::shape_parameters(
                self.name(),
                format!(
                    "expected {} parameter(s) {:?}, found {}",
                    names.len(),
                    names,
                    parameters.len()
                ),
            ));
        }
        let p = |i: usize| parameters[i];
        let shape = match self {
            Self::Sphere => Shape::Sphere,
            Self::SphericalShell => Shape::SphericalShell { ratio: p(0) },
            Self::Spheroid => Shape::Spheroid {
                aspect_ratio: p(0),
            },
            Self::Cylinder => Shape::Cylinder { radius: p(0) },
            Self::CylinderAspect => Shape::CylinderAspect {
                aspect_ratio: p(0),
            },
            Self::UnifiedSphere => Shape::UnifiedSphere,
            Self::UnifiedRod => Shape::UnifiedRod { length: p(0) },
            Self::UnifiedRodAspect => Shape::UnifiedRodAspect {
                aspect_ratio: p(0),
            },
            Self::UnifiedDisk => Shape::UnifiedDisk { thickness: p(0) },
            Self::UnifiedTube => Shape::UnifiedTube {
                length: p(0),
                thickness: p(1),
            },
        };
        shape.validate()?;
        Ok(shape)
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShapeKind {
    type Err = SasError;

    fn from_str(name: &str) -> Result<Self> {
        ShapeRegistry::standard()
            .lookup(name)
            .map(|entry| entry.kind)
    }
}

/// A particle shape with its fixed parameters bound.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    /// Homogeneous sphere of radius `r`.
    Sphere,
    /// Shell between radii `r` and `ratio * r` (whichever is larger is the outer radius).
    ///
    /// The amplitude is the volume-weighted difference of the two sphere amplitudes,
    /// normalized to 1 at `q = 0`, not the plain difference `F(r) - F(ratio * r)`.
    SphericalShell { ratio: f64 },
    /// Spheroid with equatorial radius `r` and polar radius `aspect_ratio * r`.
    Spheroid { aspect_ratio: f64 },
    /// Cylinder of fixed `radius`; the size variable is the half-length.
    Cylinder { radius: f64 },
    /// Cylinder of radius `r` and length `2 r aspect_ratio`.
    CylinderAspect { aspect_ratio: f64 },
    /// Unified (Guinier + Porod) sphere.
    UnifiedSphere,
    /// Unified rod of radius `r` and fixed `length`.
    UnifiedRod { length: f64 },
    /// Unified rod of radius `r` and length `2 r aspect_ratio`.
    UnifiedRodAspect { aspect_ratio: f64 },
    /// Unified disk of radius `r` and fixed `thickness`.
    UnifiedDisk { thickness: f64 },
    /// Unified hollow tube of outer radius `r`, fixed `length` and wall `thickness`.
    UnifiedTube { length: f64, thickness: f64 },
}

impl Shape {
    /// The family this shape belongs to.
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Sphere => ShapeKind::Sphere,
            Self::SphericalShell { .. } => ShapeKind::SphericalShell,
            Self::Spheroid { .. } => ShapeKind::Spheroid,
            Self::Cylinder { .. } => ShapeKind::Cylinder,
            Self::CylinderAspect { .. } => ShapeKind::CylinderAspect,
            Self::UnifiedSphere => ShapeKind::UnifiedSphere,
            Self::UnifiedRod { .. } => ShapeKind::UnifiedRod,
            Self::UnifiedRodAspect { .. } => ShapeKind::UnifiedRodAspect,
            Self::UnifiedDisk { .. } => ShapeKind::UnifiedDisk,
            Self::UnifiedTube { .. } => ShapeKind::UnifiedTube,
        }
    }

    /// Checks the fixed parameters.
    pub fn validate(&self) -> Result<()> {
        let name = self.kind().name();
        let positive = |label: &str, value: f64| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(SasError::shape_parameters(
                    name,
                    format!("{label} must be positive and finite, found {value}"),
                ))
            }
        };
        match *self {
            Self::Sphere | Self::UnifiedSphere => Ok(()),
            Self::SphericalShell { ratio } => {
                if !(ratio >= 0.0) || !ratio.is_finite() {
                    return Err(SasError::shape_parameters(
                        name,
                        format!("ratio must be non-negative and finite, found {ratio}"),
                    ));
                }
                if ratio == 1.0 {
                    return Err(SasError::shape_parameters(
                        name,
                        "ratio of one describes an empty shell",
                    ));
                }
                Ok(())
            }
            Self::Spheroid { aspect_ratio }
            | Self::CylinderAspect { aspect_ratio }
            | Self::UnifiedRodAspect { aspect_ratio } => positive("aspect_ratio", aspect_ratio),
            Self::Cylinder { radius } => positive("radius", radius),
            Self::UnifiedRod { length } => positive("length", length),
            Self::UnifiedDisk { thickness } => positive("thickness", thickness),
            Self::UnifiedTube { length, thickness } => {
                positive("length", length)?;
                positive("thickness", thickness)
            }
        }
    }

    /// Checks that `size` is admissible for this shape.
    pub fn check_size(&self, size: f64) -> Result<()> {
        if !(size > 0.0) || !size.is_finite() {
            return Err(SasError::shape_parameters(
                self.kind().name(),
                format!("size must be positive and finite, found {size}"),
            ));
        }
        if let Self::UnifiedTube { thickness, .. } = *self {
            if thickness >= size {
                return Err(SasError::shape_parameters(
                    self.kind().name(),
                    format!("wall thickness {thickness} must be smaller than radius {size}"),
                ));
            }
        }
        Ok(())
    }

    /// Normalized scattering amplitude at scattering vector `q` for a particle of `size`.
    pub fn form_factor(&self, q: f64, size: f64) -> f64 {
        match *self {
            Self::Sphere => sphere_amplitude(q * size),
            Self::SphericalShell { ratio } => {
                let (inner, outer) = shell_radii(size, ratio);
                let v_outer = sphere_volume(outer);
                let v_inner = sphere_volume(inner);
                (v_outer * sphere_amplitude(q * outer) - v_inner * sphere_amplitude(q * inner))
                    / (v_outer - v_inner)
            }
            Self::Spheroid { aspect_ratio } => spheroid_form_factor(q, size, aspect_ratio),
            Self::Cylinder { radius } => cylinder_form_factor(q, radius, 2.0 * size),
            Self::CylinderAspect { aspect_ratio } => {
                cylinder_form_factor(q, size, 2.0 * size * aspect_ratio)
            }
            Self::UnifiedSphere => unified_sphere(q, size),
            Self::UnifiedRod { length } => unified_rod(q, size, length),
            Self::UnifiedRodAspect { aspect_ratio } => {
                unified_rod(q, size, 2.0 * aspect_ratio * size)
            }
            Self::UnifiedDisk { thickness } => unified_disk(q, size, thickness),
            Self::UnifiedTube { length, thickness } => unified_tube(q, size, length, thickness),
        }
    }

    /// Volume of a particle of `size`.
    pub fn volume(&self, size: f64) -> f64 {
        match *self {
            Self::Sphere | Self::UnifiedSphere => sphere_volume(size),
            Self::SphericalShell { ratio } => {
                let (inner, outer) = shell_radii(size, ratio);
                sphere_volume(outer) - sphere_volume(inner)
            }
            Self::Spheroid { aspect_ratio } => aspect_ratio * sphere_volume(size),
            Self::Cylinder { radius } => cylinder_volume(radius, 2.0 * size),
            Self::CylinderAspect { aspect_ratio } | Self::UnifiedRodAspect { aspect_ratio } => {
                cylinder_volume(size, 2.0 * size * aspect_ratio)
            }
            Self::UnifiedRod { length } => cylinder_volume(size, length),
            Self::UnifiedDisk { thickness } => cylinder_volume(size, thickness),
            Self::UnifiedTube { length, thickness } => {
                cylinder_volume(size, length) - cylinder_volume(size - thickness, length)
            }
        }
    }
}

/// One row of the shape registry.
#[derive(Clone, Copy, Debug)]
pub struct ShapeEntry {
    /// Name used to select the shape.
    pub name: &'static str,
    /// Shape family the name resolves to.
    pub kind: ShapeKind,
}

impl ShapeEntry {
    /// Parameter names expected by this entry.
    pub fn parameter_names(&self) -> &'static [&'static str] {
        self.kind.parameter_names()
    }
}

/// Read-only table from shape names to shape families.
#[derive(Debug)]
pub struct ShapeRegistry {
    entries: &'static [ShapeEntry],
}

static STANDARD_SHAPES: ShapeRegistry = ShapeRegistry {
    entries: &[
        ShapeEntry {
            name: "Sphere",
            kind: ShapeKind::Sphere,
        },
        ShapeEntry {
            name: "Spherical shell",
            kind: ShapeKind::SphericalShell,
        },
        ShapeEntry {
            name: "Spheroid",
            kind: ShapeKind::Spheroid,
        },
        ShapeEntry {
            name: "Cylinder",
            kind: ShapeKind::Cylinder,
        },
        ShapeEntry {
            name: "Cylinder diam",
            kind: ShapeKind::Cylinder,
        },
        ShapeEntry {
            name: "Cylinder AR",
            kind: ShapeKind::CylinderAspect,
        },
        ShapeEntry {
            name: "Unified sphere",
            kind: ShapeKind::UnifiedSphere,
        },
        ShapeEntry {
            name: "Unified rod",
            kind: ShapeKind::UnifiedRod,
        },
        ShapeEntry {
            name: "Unified rod AR",
            kind: ShapeKind::UnifiedRodAspect,
        },
        ShapeEntry {
            name: "Unified disk",
            kind: ShapeKind::UnifiedDisk,
        },
        ShapeEntry {
            name: "Unified tube",
            kind: ShapeKind::UnifiedTube,
        },
    ],
};

impl ShapeRegistry {
    /// The built-in registry shared by every solve.
    pub fn standard() -> &'static ShapeRegistry {
        &STANDARD_SHAPES
    }

    /// Iterates over the registered names.
    pub fn entries(&self) -> impl Iterator<Item = &ShapeEntry> {
        self.entries.iter()
    }

    /// Finds an entry by name, ignoring ASCII case.
    pub fn lookup(&self, name: &str) -> Result<&ShapeEntry> {
        let trimmed = name.trim();
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| SasError::UnknownShape {
                name: name.to_string(),
            })
    }

    /// Resolves a name and its positional parameters into a validated [`Shape`].
    pub fn shape(&self, name: &str, parameters: &[f64]) -> Result<Shape> {
        self.lookup(name)?.kind.build(parameters)
    }
}

fn sphere_volume(radius: f64) -> f64 {
    (4.0 / 3.0) * PI * radius.powi(3)
}

fn cylinder_volume(radius: f64, length: f64) -> f64 {
    PI * length * radius * radius
}

fn shell_radii(size: f64, ratio: f64) -> (f64, f64) {
    if ratio < 1.0 {
        (size * ratio, size)
    } else {
        (size, size * ratio)
    }
}

fn spheroid_form_factor(q: f64, radius: f64, aspect_ratio: f64) -> f64 {
    let (low, high) = SPHERICAL_ASPECT_RANGE;
    if aspect_ratio > low && aspect_ratio < high {
        return sphere_amplitude(q * radius);
    }
    let n = SPHEROID_QUADRATURE_POINTS;
    let stretch = aspect_ratio * aspect_ratio - 1.0;
    let sum: f64 = (0..n)
        .map(|k| {
            let cos_theta = k as f64 / (n - 1) as f64;
            let r_eff = radius * (1.0 + stretch * cos_theta * cos_theta).sqrt();
            sphere_amplitude(q * r_eff).powi(2)
        })
        .sum();
    (sum / n as f64).sqrt()
}

fn cylinder_form_factor(q: f64, radius: f64, length: f64) -> f64 {
    let n = CYLINDER_QUADRATURE_POINTS;
    let sum: f64 = (0..n)
        .map(|k| {
            let alpha = FRAC_PI_2 * k as f64 / (n - 1) as f64;
            let (sin_a, cos_a) = alpha.sin_cos();
            let axial = sinc(0.5 * q * length * cos_a);
            let radial = bessel_j1_over_x(q * radius * sin_a);
            sin_a * (axial * radial).powi(2)
        })
        .sum();
    (2.0 * PI * sum / n as f64).sqrt()
}

/// `q / erf(q rg / sqrt(6))^3`, the Porod crossover variable of the unified fit.
fn q_star(q: f64, rg: f64) -> f64 {
    q / erf(q * rg / 6f64.sqrt()).powi(3)
}

fn guinier(q: f64, rg: f64) -> f64 {
    (-(q * rg).powi(2) / 3.0).exp()
}

fn unified_sphere(q: f64, radius: f64) -> f64 {
    let rg = (3.0f64 / 5.0).sqrt() * radius;
    let porod = PI * 1.62 / rg.powi(4);
    (guinier(q, rg) + porod / q_star(q, rg).powi(4)).sqrt()
}

fn unified_rod(q: f64, radius: f64, length: f64) -> f64 {
    let rg_rod = (radius * radius / 2.0 + length * length / 12.0).sqrt();
    let b_rod = PI / length;
    let rg_cross = 3f64.sqrt() * radius / 2.0;
    let g_cross = (2.0 / 3.0) * radius / length;
    let b_cross = 4.0 * (length + radius) / (radius.powi(3) * length * length);
    let mut intensity =
        guinier(q, rg_rod) + (b_rod / q_star(q, rg_rod)) * guinier(q, rg_cross);
    intensity += g_cross * guinier(q, rg_cross) + b_cross / q_star(q, rg_cross).powi(4);
    intensity.sqrt()
}

fn unified_disk(q: f64, radius: f64, thickness: f64) -> f64 {
    let rg_disk = (radius * radius / 2.0 + thickness * thickness / 12.0).sqrt();
    let b_disk = 2.0 / (radius * radius);
    let rg_thick = 3f64.sqrt() * thickness / 2.0;
    let rg_cutoff = 1.1 * rg_thick;
    let g_thick = (2.0 / 3.0) * (thickness / radius).powi(2);
    let b_thick = 4.0 * (thickness + radius) / (radius.powi(3) * thickness * thickness);
    let mut intensity =
        guinier(q, rg_disk) + (b_disk / q_star(q, rg_disk).powi(2)) * guinier(q, rg_cutoff);
    intensity += g_thick * guinier(q, rg_thick) + b_thick / q_star(q, rg_thick).powi(4);
    intensity.sqrt()
}

fn unified_tube(q: f64, radius: f64, length: f64, thickness: f64) -> f64 {
    let inner = radius - thickness;
    let annulus = radius * radius - inner * inner;
    let wall_volume = PI * annulus * length;
    let rg_tube = (annulus / 2.0 + length * length / 12.0).sqrt();
    let b_surface = 4.0 * PI * PI * (annulus + length * (radius + inner)) / wall_volume.powi(2);
    let b_wall = PI * PI * thickness / wall_volume;
    let b_rod = PI / length;
    let mut intensity =
        guinier(q, rg_tube) + (b_rod / q_star(q, rg_tube)) * guinier(q, radius);
    intensity += (b_wall / q_star(q, radius).powi(2)) * guinier(q, thickness);
    intensity += b_surface / q_star(q, thickness).powi(4);
    intensity.sqrt()
}
