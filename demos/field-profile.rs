// Copyright 2017 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

/// Print the screened field as a function of depth for each model.

extern crate bnmr_srf;

use bnmr_srf::field::FieldPenetration;
use bnmr_srf::{FieldModel, SlrParameters};

fn main() {
    const B0: f64 = 0.02;

    let p = SlrParameters {
        temperature: 2.,
        critical_temperature: 9.25,
        gap: 1.53,
        coherence_length: 39.,
        mean_free_path: 300.,
        lambda_0: 40.,
        exponent: 4.,
        ..SlrParameters::default()
    };

    let models = [FieldModel::Local, FieldModel::Pippard, FieldModel::ExtremeAnomalous];
    let mut fields = Vec::new();

    for &model in &models {
        let field = FieldPenetration::new(model, 1e-8, 8);

        match field.screening(&p, p.critical_temperature) {
            Ok(s) => fields.push((field, s)),
            Err(e) => {
                eprintln!("error: {:?}: {}", model, e);
                std::process::exit(1);
            },
        }
    }

    println!("z(nm)\tlocal(T)\tpippard(T)\teal(T)");

    for i in 0..=40 {
        let z = 5. * i as f64;
        print!("{:.1}", z);

        for (field, screening) in &fields {
            match field.field_at_depth(z, B0, screening) {
                Ok(b) => print!("\t{:.6e}", b.value),
                Err(e) => print!("\t({})", e),
            }
        }

        println!();
    }
}
