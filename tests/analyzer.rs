// Copyright 2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

/// Depth-averaged rates computed against the bundled ⁸Li-in-Nb stopping
/// profile.

#[macro_use] extern crate assert_approx_eq;
extern crate bnmr_srf;
extern crate bnmr_srf_test_support;

use bnmr_srf::field::FieldPenetration;
use bnmr_srf::output::RateTableWriter;
use bnmr_srf::relaxation::LocalRelaxationRate;
use bnmr_srf::{AnalyzerConfig, ConvergencePolicy, DepthResolvedAnalyzer, Error, FieldModel,
               Interpolation, ParameterLayout, ProfileRegistry, SlrParameters, StoppingProfile};
use bnmr_srf_test_support::{fixture_path, quiet_log, Sampler};
use std::sync::Arc;

const PROFILE: &str = "stopping-profile-8li-nb.csv";

fn profile() -> Arc<StoppingProfile> {
    Arc::new(StoppingProfile::from_path(fixture_path(PROFILE), Interpolation::Linear).unwrap())
}

fn analyzer(config: AnalyzerConfig) -> DepthResolvedAnalyzer {
    DepthResolvedAnalyzer::new(profile(), config, quiet_log())
}

/// Representative values for a clean Nb sample.
fn reference() -> SlrParameters {
    SlrParameters {
        temperature: 3.5077,
        critical_temperature: 8.53147,
        lambda_0: 61.3246,
        exponent: 4.,
        applied_field: 0.02001,
        dipole_field: 2.39548e-4,
        correlation_rate: 8363.69,
        slr_constant: 0.451973,
        slr_exponent: 1.,
        surface_thickness: 7.41019,
        surface_rate: 18.2169,
        ..SlrParameters::default()
    }
}

fn nonlocal_reference() -> SlrParameters {
    SlrParameters {
        gap: 1.53,
        coherence_length: 39.,
        mean_free_path: 300.,
        ..reference()
    }
}

#[test]
fn reference_point_local() {
    let a = analyzer(AnalyzerConfig::default());
    let est = a.evaluate_with_error(&reference(), 19.9321).unwrap();
    assert!(est.converged);
    assert!(est.rel_err < 1e-7);
    assert_approx_eq!(est.value, 54.0061592, 1e-5);
}

/// ∫ρ·rate dz / ∫ρ dz by a plain midpoint sum, with nothing shared with the
/// analyzer except the profile shape and the local rate.
fn midpoint_average(a: &DepthResolvedAnalyzer, p: &SlrParameters, energy: f64, n: usize) -> f64 {
    let config = a.config();
    let field = FieldPenetration::new(config.model, config.field_tolerance, config.fourier_levels);
    let local = LocalRelaxationRate::new(config.surface, &config.probe, &config.host);
    let screening = field.screening(p, a.critical_temperature(p).unwrap()).unwrap();
    let terms = local.terms(p, 1.).unwrap();

    let shape = a.profile().shape_at(energy).unwrap();
    let h = shape.z_max() / n as f64;
    let mut weighted = 0.;
    let mut mass = 0.;

    for i in 0..n {
        let z = (i as f64 + 0.5) * h;
        let rho = shape.density(z);
        weighted += rho * local.rate(z, &terms, &field, &screening).unwrap().value;
        mass += rho;
    }

    weighted / mass
}

#[test]
fn depth_average_matches_midpoint_sum() {
    let a = analyzer(AnalyzerConfig::default());
    let p = reference();

    for &e in &[1., 5., 19.9321, 30.] {
        let got = a.evaluate(&p, e).unwrap();
        let brute = midpoint_average(&a, &p, e, 2_000_000);
        assert!(((got - brute) / brute).abs() < 1e-6, "{} keV: {} vs {}", e, got, brute);
    }
}

#[test]
fn reference_point_nonlocal() {
    for &model in &[FieldModel::Pippard, FieldModel::ExtremeAnomalous] {
        let config = AnalyzerConfig::new(model).with_tolerances(1e-6, 1e-6);
        let a = analyzer(config);
        let est = a.evaluate_with_error(&nonlocal_reference(), 19.9321).unwrap();
        assert!(est.value.is_finite() && est.value >= 0., "{:?}: {:?}", model, est);
    }
}

#[test]
fn random_points_are_finite() {
    let a = analyzer(AnalyzerConfig::default());
    let (lo, hi) = a.profile().energy_range();
    let temps = Sampler::new(false, 0.5, 15.);
    let energies = Sampler::new(false, lo, hi);
    let fields = Sampler::new(true, 1e-3, 0.3);

    for _ in 0..20 {
        let p = SlrParameters {
            temperature: temps.get(),
            applied_field: fields.get(),
            ..reference()
        };
        let e = energies.get();
        let rate = a.evaluate(&p, e).unwrap();
        assert!(rate.is_finite() && rate >= 0., "bad rate {} at {:?}, {} keV", rate, p, e);
    }
}

#[test]
fn energy_range_is_inclusive() {
    let a = analyzer(AnalyzerConfig::default());
    let (lo, hi) = a.profile().energy_range();
    assert_eq!((lo, hi), (1., 30.));

    assert!(a.evaluate(&reference(), lo).unwrap().is_finite());
    assert!(a.evaluate(&reference(), hi).unwrap().is_finite());

    for &e in &[lo - 1., hi + 1.] {
        match a.evaluate(&reference(), e) {
            Err(Error::Domain { value, .. }) => assert_eq!(value, e),
            other => panic!("expected a domain error at {} keV, got {:?}", e, other),
        }
    }
}

#[test]
fn field_is_applied_field_at_surface() {
    let p = nonlocal_reference();

    for &model in &[FieldModel::Local, FieldModel::Pippard, FieldModel::ExtremeAnomalous] {
        let field = FieldPenetration::new(model, 1e-8, 8);
        let screening = field.screening(&p, p.critical_temperature).unwrap();
        let b = field.field_at_depth(0., p.applied_field, &screening).unwrap();
        assert_eq!(b.value, p.applied_field);
        assert!(b.converged);
    }
}

#[test]
fn repeated_evaluation_is_identical() {
    let a = analyzer(AnalyzerConfig::default());
    let r1 = a.evaluate(&reference(), 12.5).unwrap();
    let r2 = a.evaluate(&reference(), 12.5).unwrap();
    assert_eq!(r1.to_bits(), r2.to_bits());
}

#[test]
fn normal_state_rate_rises_with_correlation_rate() {
    // Above T_c with ν_c well below the Larmor frequencies, J(ω) grows with
    // ν_c.
    let a = analyzer(AnalyzerConfig::default());
    let mut last = 0.;

    for &nu_c in &[1e3, 3e3, 1e4, 3e4, 1e5] {
        let p = SlrParameters { temperature: 10., correlation_rate: nu_c, ..reference() };
        let rate = a.evaluate(&p, 8.).unwrap();
        assert!(rate > last, "rate {} at nu_c = {} is not above {}", rate, nu_c, last);
        last = rate;
    }
}

#[test]
fn strict_and_lenient_policies() {
    let starved = AnalyzerConfig::default()
        .with_tolerances(1e-13, 1e-8)
        .with_budgets(1, 32);

    let strict = analyzer(starved.with_policy(ConvergencePolicy::Strict));
    match strict.evaluate(&reference(), 19.9321) {
        Err(Error::Convergence { stage, estimate, .. }) => {
            assert_eq!(stage, "depth");
            assert!(estimate.is_finite());
        },
        other => panic!("expected a convergence failure, got {:?}", other),
    }

    let lenient = analyzer(starved.with_policy(ConvergencePolicy::Lenient));
    let est = lenient.evaluate_with_error(&reference(), 19.9321).unwrap();
    assert!(!est.converged);
    assert!(est.value.is_finite() && est.value >= 0.);
}

#[test]
fn flat_adapter() {
    let a = analyzer(AnalyzerConfig::default());
    assert_eq!(a.layout(), ParameterLayout::Local);

    let p = reference();
    let x = [p.temperature, p.applied_field, 19.9321];
    let par = [
        p.critical_temperature, p.lambda_0, p.exponent, p.dipole_field, p.correlation_rate,
        p.slr_constant, p.slr_exponent, p.surface_thickness, p.surface_rate,
    ];

    let flat = a.fit_function(&x, &par).unwrap();
    let direct = a.evaluate(&p, 19.9321).unwrap();
    assert_eq!(flat.to_bits(), direct.to_bits());

    match a.fit_function(&x, &par[..8]) {
        Err(Error::ParameterCount { expected: 9, got: 8 }) => {},
        other => panic!("expected a parameter-count error, got {:?}", other),
    }

    let nonlocal = analyzer(AnalyzerConfig::new(FieldModel::Pippard));
    assert_eq!(nonlocal.layout().len(), 13);
    assert!(matches!(nonlocal.fit_function(&x, &par), Err(Error::ParameterCount { expected: 13, .. })));
}

#[test]
fn missing_parameters_are_named() {
    let a = analyzer(AnalyzerConfig::default());
    let p = SlrParameters { lambda_0: f64::NAN, ..reference() };

    match a.evaluate(&p, 19.9321) {
        Err(Error::MissingParameter(name)) => assert_eq!(name, "lambda_0"),
        other => panic!("expected a missing-parameter error, got {:?}", other),
    }

    let pippard = analyzer(AnalyzerConfig::new(FieldModel::Pippard));
    match pippard.evaluate(&reference(), 19.9321) {
        Err(Error::MissingParameter(name)) => assert_eq!(name, "gap"),
        other => panic!("expected a missing-parameter error, got {:?}", other),
    }
}

#[test]
fn shared_between_threads() {
    let a = Arc::new(analyzer(AnalyzerConfig::default()));
    let expected = a.evaluate(&reference(), 15.).unwrap();

    let handles: Vec<_> = (0..4).map(|i| {
        let a = a.clone();
        std::thread::spawn(move || {
            let t = 2.5 + i as f64;
            let p = SlrParameters { temperature: t, ..reference() };
            (a.evaluate(&p, 15.).unwrap(), a.evaluate(&reference(), 15.).unwrap())
        })
    }).collect();

    for h in handles {
        let (varied, fixed) = h.join().unwrap();
        assert!(varied.is_finite());
        assert_eq!(fixed.to_bits(), expected.to_bits());
    }
}

#[test]
fn registry_loads_once() {
    let registry = ProfileRegistry::new();
    let log = quiet_log();
    assert!(registry.is_empty());

    let p1 = registry.get_or_load(fixture_path(PROFILE), Interpolation::Nearest, &log).unwrap();
    let p2 = registry.get_or_load(fixture_path(PROFILE), Interpolation::Nearest, &log).unwrap();
    assert!(Arc::ptr_eq(&p1, &p2));
    assert_eq!(registry.len(), 1);

    let p3 = registry.get_or_load(fixture_path(PROFILE), Interpolation::Pchip, &log).unwrap();
    assert!(!Arc::ptr_eq(&p1, &p3));
    assert_eq!(registry.len(), 2);

    assert!(matches!(
        registry.get_or_load(fixture_path("no-such-profile.csv"), Interpolation::Nearest, &log),
        Err(Error::Io(_))
    ));
    assert_eq!(registry.len(), 2);
}

#[test]
fn scan_to_csv() {
    let a = analyzer(AnalyzerConfig::default());
    let mut w = RateTableWriter::new(Vec::new()).unwrap();

    for &e in &[2., 5., 10., 20.] {
        let p = reference();
        let rate = a.evaluate(&p, e).unwrap();
        w.write_row(p.temperature, p.applied_field, e, rate).unwrap();
    }

    assert_eq!(w.rows(), 4);
    let text = String::from_utf8(w.into_inner().unwrap()).unwrap();
    assert_eq!(text.lines().count(), 5);
}
