// Copyright 2017 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=wrapper.h");

    // pkg-config emits the link flags itself when it finds the library.
    let include_paths = match pkg_config::Config::new().atleast_version("2.0").probe("gsl") {
        Ok(lib) => lib.include_paths,
        Err(_) => {
            println!("cargo:rustc-link-lib=dylib=gsl");
            println!("cargo:rustc-link-lib=dylib=gslcblas");
            Vec::new()
        },
    };

    let bindings = bindgen::Builder::default()
        .header("wrapper.h")
        .clang_args(include_paths.iter().map(|p| format!("-I{}", p.display())))
        .allowlist_type("gsl_.*")
        .allowlist_function("gsl_integration_.*")
        .allowlist_function("gsl_set_error_handler_off")
        .allowlist_function("gsl_strerror")
        .generate()
        .expect("Unable to generate bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Couldn't write bindings!");
}
