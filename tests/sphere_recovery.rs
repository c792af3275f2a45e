use approx::assert_relative_eq;
use nalgebra::DVector;
use sasdist::bins::{BinSpacing, SizeBins};
use sasdist::response::{response_matrix, RESPONSE_SCALE};
use sasdist::{
    BinOptions, InversionOptions, IpgOptions, IpgSolver, MaxEntOptions, MaxEntSolver,
    ScatteringProfile, Shape, SizeDistributionProblem, SolverChoice,
};

fn q_grid() -> DVector<f64> {
    DVector::from_fn(50, |i, _| 0.005 + (0.3 - 0.005) * i as f64 / 49.0)
}

fn sphere_intensity(q: &DVector<f64>, radius: f64) -> DVector<f64> {
    q.map(|value| {
        RESPONSE_SCALE * Shape::Sphere.volume(radius) * Shape::Sphere.form_factor(value, radius).powi(2)
    })
}

fn nearest_bin(centers: &DVector<f64>, radius: f64) -> usize {
    centers
        .iter()
        .enumerate()
        .min_by(|a, b| (a.1 - radius).abs().total_cmp(&(b.1 - radius).abs()))
        .map(|(index, _)| index)
        .unwrap()
}

/// Noiseless data from 50 Å spheres, 30 logarithmic bins over 10-500 Å diameter.
#[test]
fn maxent_recovers_single_sphere_population() {
    let q = q_grid();
    let mut profile = ScatteringProfile::new(q.clone(), sphere_intensity(&q, 50.0)).unwrap();
    let options = InversionOptions::default()
        .with_bins(BinOptions::new(30, 10.0, 500.0, BinSpacing::Logarithmic))
        .with_sky_log10(-6.0)
        .with_solver(SolverChoice::MaxEnt(
            MaxEntOptions::default().with_max_iterations(40),
        ));

    let result = SizeDistributionProblem::default()
        .solve(&mut profile, &options)
        .unwrap();

    let distribution = &result.distribution;
    let peak = distribution.bin_magnitudes.imax();
    let expected = nearest_bin(&distribution.bin_centers, 50.0);
    assert!(
        peak.abs_diff(expected) <= 1,
        "peak bin {peak} at r = {}, expected near bin {expected}",
        distribution.bin_centers[peak]
    );
    assert!((result.reduced_chi_square() - 1.0).abs() < 0.1);
    assert!(distribution.bin_magnitudes.iter().all(|m| *m > 0.0));
    assert_eq!(result.q_range, 0..50);
    assert_eq!(result.history.len(), result.iterations);

    // the profile now carries the forward prediction of the recovered distribution
    let residual = (profile.intensity() - profile.computed()).norm_squared();
    assert_relative_eq!(residual, result.chi_square, max_relative = 1e-9);
}

#[test]
fn ipg_recovers_single_sphere_population() {
    let q = q_grid();
    let mut profile = ScatteringProfile::new(q.clone(), sphere_intensity(&q, 50.0)).unwrap();
    let options = InversionOptions::default()
        .with_bins(BinOptions::new(30, 10.0, 500.0, BinSpacing::Logarithmic))
        .with_solver(SolverChoice::Ipg(IpgOptions::default().with_max_iterations(200)));

    let result = SizeDistributionProblem::default()
        .solve(&mut profile, &options)
        .unwrap();
    let distribution = &result.distribution;
    // volume per bin rather than per unit diameter
    let volumes = distribution
        .bin_magnitudes
        .component_mul(&distribution.bin_widths);
    let expected = nearest_bin(&distribution.bin_centers, 50.0);
    assert!(volumes.imax().abs_diff(expected) <= 1);
    assert!(result.converged);
    assert!(distribution.bin_magnitudes.iter().all(|m| *m >= 0.0));
}

#[test]
fn exact_fit_does_not_increase_chi_square() {
    let q = q_grid();
    let bins = SizeBins::new(30, 10.0, 500.0, BinSpacing::Logarithmic).unwrap();
    let g = response_matrix(q.as_slice(), bins.centers(), 1.0, &Shape::Sphere).unwrap();
    let base = DVector::from_element(bins.len(), 1e-6);
    let data = g.tr_mul(&base);
    let sigma = DVector::from_element(q.len(), 1.0);

    let initial = (&data - g.tr_mul(&base)).norm_squared();
    let outcome = MaxEntSolver::new(MaxEntOptions::default().with_max_iterations(40))
        .solve(&data, &sigma, &g, &base)
        .unwrap();
    assert!(outcome.chi_square <= initial);
    assert!(outcome.image.iter().all(|f| *f > 0.0));
}

#[test]
fn zero_data_stays_near_the_prior() {
    let q = q_grid();
    let bins = SizeBins::new(30, 10.0, 500.0, BinSpacing::Logarithmic).unwrap();
    let g = response_matrix(q.as_slice(), bins.centers(), 1.0, &Shape::Sphere).unwrap();
    let base = DVector::from_element(bins.len(), 1e-6);
    let data = DVector::zeros(q.len());
    let sigma = DVector::from_element(q.len(), 1.0);

    let outcome = MaxEntSolver::new(MaxEntOptions::default().with_max_iterations(40))
        .solve(&data, &sigma, &g, &base)
        .unwrap();
    for (f, b) in outcome.image.iter().zip(base.iter()) {
        assert!(*f > 0.0);
        assert!((f - b).abs() <= 1e-3 * b, "image entry {f} drifted from {b}");
    }
}

#[test]
fn one_bin_works_for_builder_and_both_solvers() {
    let q = q_grid();
    let bins = SizeBins::new(1, 90.0, 110.0, BinSpacing::Logarithmic).unwrap();
    let g = response_matrix(q.as_slice(), bins.centers(), 1.0, &Shape::Sphere).unwrap();
    assert_eq!(g.shape(), (1, 50));

    let data = sphere_intensity(&q, bins.centers()[0]) * 3.0;
    let sigma = DVector::from_element(q.len(), 1.0);
    let base = DVector::from_element(1, 1e-6);

    let maxent = MaxEntSolver::default().solve(&data, &sigma, &g, &base).unwrap();
    assert_relative_eq!(maxent.image[0], 3.0, max_relative = 1e-9);

    let ipg = IpgSolver::default()
        .solve(q.as_slice(), &data, &sigma, &g)
        .unwrap();
    assert!(ipg.converged);
    assert!(ipg.image[0] > 0.0);

    let mut profile = ScatteringProfile::new(q.clone(), data).unwrap();
    let options = InversionOptions::default()
        .with_bins(BinOptions::new(1, 90.0, 110.0, BinSpacing::Linear))
        .with_solver(SolverChoice::MaxEnt(MaxEntOptions::default()));
    let result = SizeDistributionProblem::default()
        .solve(&mut profile, &options)
        .unwrap();
    assert_eq!(result.distribution.len(), 1);
    assert!(result.distribution.bin_magnitudes[0] > 0.0);
}
