// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

/// Compute one depth-averaged rate at a representative point for ⁸Li in Nb.
///
/// Logging goes to the terminal, so running with the `max_level_trace`
/// feature shows every stage of the calculation.

extern crate bnmr_srf;
extern crate bnmr_srf_test_support;

use bnmr_srf::{AnalyzerConfig, DepthResolvedAnalyzer, SlrParameters};
use bnmr_srf_test_support::{default_log, fixture_path};

fn main() {
    const ENERGY: f64 = 19.9321;

    let p = SlrParameters {
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
    };

    let log = default_log();
    let analyzer = match DepthResolvedAnalyzer::from_path(
        fixture_path("stopping-profile-8li-nb.csv"), AnalyzerConfig::default(), log
    ) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        },
    };

    match analyzer.evaluate_with_error(&p, ENERGY) {
        Ok(est) => println!("1/T1 at {} keV: {:.10e} s^-1 (rel. err. {:.1e}, converged: {})",
                            ENERGY, est.value, est.rel_err, est.converged),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        },
    }
}
