// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

/// Exercise the QAWF Fourier-sine integrator on transforms with known
/// answers.

extern crate bnmr_srf;

use bnmr_srf::quad::FourierSine;
use std::f64::consts::{FRAC_PI_2, PI};

fn main() {
    let quad = FourierSine::default().abs_tolerance(1e-12);

    let cases: [(&str, fn(f64) -> f64, fn(f64) -> f64); 3] = [
        ("exp(-x)", |x| (-x).exp(), |w| w / (1. + w * w)),
        ("x/(1+x^2)", |x| x / (1. + x * x), |w| FRAC_PI_2 * (-w).exp()),
        ("x/(1+x^2)^2", |x| x / ((1. + x * x) * (1. + x * x)), |w| 0.25 * PI * w * (-w).exp()),
    ];

    for (name, f, exact) in cases.iter() {
        for &omega in &[0.5, 1., 4., 40.] {
            match quad.integrate(f, omega) {
                Ok(r) => println!("{:>12} w={:<4} ours={:.15e} exact={:.15e} abserr={:.1e}",
                                  name, omega, r.value, exact(omega), r.abserr),
                Err(e) => println!("{:>12} w={:<4} failed: {}", name, omega, e),
            }
        }
    }
}
