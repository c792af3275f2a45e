//! Special functions needed by the particle form factors.

pub use statrs::function::erf::erf;

/// Below this argument the sphere amplitude switches to its Taylor series.
const SPHERE_SERIES_CUTOFF: f64 = 1e-2;

/// Normalized amplitude of a homogeneous sphere, `3 (sin x - x cos x) / x^3`.
///
/// Equals one at `x = 0`; the series branch avoids the cancellation in the
/// closed form for small arguments.
pub fn sphere_amplitude(x: f64) -> f64 {
    if x.abs() < SPHERE_SERIES_CUTOFF {
        let x2 = x * x;
        return 1.0 - x2 / 10.0 + x2 * x2 / 280.0;
    }
    3.0 * (x.sin() - x * x.cos()) / (x * x * x)
}

/// Bessel function of the first kind of order one.
///
/// Rational approximation for `|x| < 8` and the asymptotic phase/amplitude
/// form beyond; absolute error is below `1e-8` on the real line.
pub fn bessel_j1(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 8.0 {
        let y = x * x;
        let num = x
            * (72_362_614_232.0
                + y * (-7_895_059_235.0
                    + y * (242_396_853.1
                        + y * (-2_972_611.439 + y * (15_704.482_60 + y * (-30.160_366_06))))));
        let den = 144_725_228_442.0
            + y * (2_300_535_178.0
                + y * (18_583_304.74 + y * (99_447.433_94 + y * (376.999_139_7 + y))));
        num / den
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 2.356_194_491;
        let p = 1.0
            + y * (0.183_105e-2
                + y * (-0.351_639_649_6e-4 + y * (0.245_752_017_4e-5 + y * (-0.240_337_019e-6))));
        let q = 0.046_874_999_95
            + y * (-0.200_269_087_3e-3
                + y * (0.844_919_909_6e-5 + y * (-0.882_289_87e-6 + y * 0.105_787_412e-6)));
        let ans = (0.636_619_772 / ax).sqrt() * (xx.cos() * p - z * xx.sin() * q);
        if x < 0.0 {
            -ans
        } else {
            ans
        }
    }
}

/// `J1(x) / x`, continuous at the origin where it equals `1/2`.
pub fn bessel_j1_over_x(x: f64) -> f64 {
    if x.abs() < 1e-6 {
        0.5
    } else {
        bessel_j1(x) / x
    }
}

/// `sin(x) / x`, continuous at the origin.
pub fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-6 {
        1.0
    } else {
        x.sin() / x
    }
}
