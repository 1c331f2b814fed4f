// Copyright 2017 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

/// Crank out depth-averaged rates at random temperatures and energies and
/// write them to a CSV table, logging the time each one takes.

extern crate bnmr_srf;
extern crate bnmr_srf_test_support;
extern crate clap;
#[macro_use] extern crate slog;

use bnmr_srf::output::RateTableWriter;
use bnmr_srf::{AnalyzerConfig, DepthResolvedAnalyzer, FieldModel, Interpolation, SlrParameters};
use bnmr_srf_test_support::{default_log, Sampler};
use clap::{crate_name, crate_version, value_parser, Arg, Command};
use std::path::PathBuf;
use std::time::Instant;


fn main() {
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about("Crank out depth-averaged SLR rates for random temperatures and energies")
        .arg(Arg::new("PROFILE")
             .help("The stopping-profile table to use")
             .required(true)
             .value_parser(value_parser!(PathBuf))
             .index(1))
        .arg(Arg::new("OUTFILE")
             .help("The path of the CSV file to create")
             .required(true)
             .value_parser(value_parser!(PathBuf))
             .index(2))
        .arg(Arg::new("model")
             .long("model")
             .help("The screening model")
             .value_parser(["local", "pippard", "eal"])
             .default_value("local"))
        .arg(Arg::new("count")
             .long("count")
             .help("How many rates to compute")
             .value_parser(value_parser!(usize))
             .default_value("100"))
        .arg(Arg::new("t-min")
             .long("t-min")
             .help("The minimum temperature (K)")
             .value_parser(value_parser!(f64))
             .default_value("2.5"))
        .arg(Arg::new("t-max")
             .long("t-max")
             .help("The maximum temperature (K)")
             .value_parser(value_parser!(f64))
             .default_value("12"))
        .arg(Arg::new("field")
             .long("field")
             .help("The applied field (T)")
             .value_parser(value_parser!(f64))
             .default_value("0.02"))
        .get_matches();

    let log = default_log();

    let model = match matches.get_one::<String>("model").map(|s| s.as_str()) {
        Some("pippard") => FieldModel::Pippard,
        Some("eal") => FieldModel::ExtremeAnomalous,
        _ => FieldModel::Local,
    };

    let profile = matches.get_one::<PathBuf>("PROFILE").cloned().unwrap_or_default();
    let outfile = matches.get_one::<PathBuf>("OUTFILE").cloned().unwrap_or_default();
    let count = matches.get_one::<usize>("count").cloned().unwrap_or(100);
    let t_min = matches.get_one::<f64>("t-min").cloned().unwrap_or(2.5);
    let t_max = matches.get_one::<f64>("t-max").cloned().unwrap_or(12.);
    let field = matches.get_one::<f64>("field").cloned().unwrap_or(0.02);

    let config = AnalyzerConfig::new(model).with_interpolation(Interpolation::Pchip);

    let analyzer = match DepthResolvedAnalyzer::from_path(&profile, config, log.clone()) {
        Ok(a) => a,
        Err(e) => {
            crit!(log, "cannot load stopping profile"; "path" => %profile.display(), "err" => %e);
            std::process::exit(1);
        },
    };

    let (e_min, e_max) = analyzer.profile().energy_range();
    let t_sampler = Sampler::new(false, t_min, t_max);
    let e_sampler = Sampler::new(false, e_min, e_max);

    let mut out = match RateTableWriter::create(&outfile) {
        Ok(w) => w,
        Err(e) => {
            crit!(log, "cannot create output"; "path" => %outfile.display(), "err" => %e);
            std::process::exit(1);
        },
    };

    for _ in 0..count {
        let p = SlrParameters {
            temperature: t_sampler.get(),
            critical_temperature: 9.25,
            gap: 1.53,
            coherence_length: 39.,
            mean_free_path: 300.,
            lambda_0: 40.,
            exponent: 4.,
            applied_field: field,
            dipole_field: 2.4e-4,
            correlation_rate: 8.4e3,
            slr_constant: 0.45,
            slr_exponent: 1.,
            surface_thickness: 7.4,
            surface_rate: 18.2,
            ..SlrParameters::default()
        };
        let energy = e_sampler.get();

        let t0 = Instant::now();
        let rate = analyzer.evaluate(&p, energy);
        let ms = t0.elapsed().as_secs_f64() * 1e3;

        match rate {
            Ok(rate) => {
                info!(log, "computed rate"; "t" => p.temperature, "energy" => energy, "rate" => rate, "ms" => ms);

                if let Err(e) = out.write_row(p.temperature, p.applied_field, energy, rate) {
                    crit!(log, "write failed"; "err" => %e);
                    std::process::exit(1);
                }
            },
            Err(e) => warn!(log, "evaluation failed"; "t" => p.temperature, "energy" => energy, "err" => %e),
        }
    }

    if let Err(e) = out.flush() {
        crit!(log, "flush failed"; "err" => %e);
        std::process::exit(1);
    }
}
