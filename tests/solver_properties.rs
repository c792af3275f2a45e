use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use sasdist::bins::BinSpacing;
use sasdist::response::RESPONSE_SCALE;
use sasdist::{
    InversionOptions, IpgOptions, IpgSolver, MaxEntOptions, MaxEntSolver, ScatteringProfile,
    Shape, SizeDistributionProblem, SolverChoice,
};

struct Instance {
    response: DMatrix<f64>,
    data: DVector<f64>,
    sigma: DVector<f64>,
    base: DVector<f64>,
}

/// Gaussian-kernel response with a constant floor, noisy data from a positive image.
fn random_instance(rng: &mut SmallRng) -> Instance {
    let n = rng.gen_range(4..=10);
    let npt = rng.gen_range(15..=40);
    let width = rng.gen_range(0.02..0.1);
    let response = DMatrix::from_fn(n, npt, |j, i| {
        let offset = i as f64 / npt as f64 - j as f64 / n as f64;
        (-(offset * offset) / width).exp() + 0.05
    });
    let truth = DVector::from_fn(n, |_, _| rng.gen_range(0.2..2.0));
    let clean = response.tr_mul(&truth);
    let sigma = DVector::from_element(npt, 0.01 * clean.max());
    let data = clean.zip_map(&sigma, |value, s| {
        let draw: f64 = StandardNormal.sample(&mut *rng);
        value + s * draw
    });
    Instance {
        response,
        data,
        sigma,
        base: DVector::from_element(n, 0.1),
    }
}

#[test]
fn maxent_images_stay_positive_and_chi_square_decreases() {
    let mut rng = SmallRng::seed_from_u64(2024);
    let solver = MaxEntSolver::new(MaxEntOptions::default().with_max_iterations(30));
    let mut checked = 0;

    for _ in 0..100 {
        let instance = random_instance(&mut rng);
        let npt = instance.data.len() as f64;
        let outcome = solver
            .solve(&instance.data, &instance.sigma, &instance.response, &instance.base)
            .unwrap();
        assert!(outcome.image.iter().all(|f| *f > 0.0));

        // before convergence, unclamped steps not enlarged by the distance cap
        // never raise chi-square
        for pair in outcome.history.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);
            if current.iteration < 3
                || current.clamped > 0
                || current.step_scale > 1.0
                || previous.chi_square <= npt
            {
                continue;
            }
            checked += 1;
            assert!(
                current.chi_square <= previous.chi_square * (1.0 + 1e-3) + 1e-9,
                "chi-square rose from {} to {} at iteration {}",
                previous.chi_square,
                current.chi_square,
                current.iteration
            );
        }
    }
    assert!(checked > 0);
}

#[test]
fn ipg_weights_are_never_negative() {
    let mut rng = SmallRng::seed_from_u64(77);
    for _ in 0..20 {
        let instance = random_instance(&mut rng);
        let q: Vec<f64> = (0..instance.data.len())
            .map(|i| 0.01 * (i + 1) as f64)
            .collect();
        for cap in [1, 2, 5, 20] {
            let solver = IpgSolver::new(IpgOptions::default().with_max_iterations(cap));
            let outcome = solver
                .solve(&q, &instance.data, &instance.sigma, &instance.response)
                .unwrap();
            assert!(outcome.image.iter().all(|w| *w >= 0.0));
        }
    }
}

#[test]
fn configuration_document_drives_an_inversion() {
    let json = r#"{
        "q_min": 0.01,
        "q_max": 0.25,
        "bins": {"count": 15, "min_diameter": 20.0, "max_diameter": 400.0},
        "shape": {"name": "sphere"},
        "solver": {"method": "max_ent", "max_iterations": 60}
    }"#;
    let options: InversionOptions = serde_json::from_str(json).unwrap();
    assert_eq!(options.bins.spacing, BinSpacing::Logarithmic);
    assert!(matches!(options.solver, SolverChoice::MaxEnt(ref o) if o.max_iterations == 60));

    let q = DVector::from_fn(60, |i, _| 0.005 + 0.004 * i as f64);
    let intensity = q.map(|value| {
        RESPONSE_SCALE * Shape::Sphere.volume(40.0) * Shape::Sphere.form_factor(value, 40.0).powi(2)
    });
    let mut profile = ScatteringProfile::new(q, intensity).unwrap();
    let result = SizeDistributionProblem::default()
        .solve(&mut profile, &options)
        .unwrap();
    assert_eq!(result.distribution.len(), 15);
    assert!(result.distribution.bin_magnitudes.iter().all(|m| *m > 0.0));

    let round_trip: InversionOptions =
        serde_json::from_str(&serde_json::to_string(&options).unwrap()).unwrap();
    assert_eq!(round_trip, options);
}
