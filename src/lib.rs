// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

/*! Model depth-resolved β-NMR spin-lattice relaxation in superconductors.

A beam of spin-polarized ⁸Li⁺ ions stops in a sample at depths set by the
implantation energy. The probe's spin-lattice relaxation (SLR) rate depends
on the local magnetic field, which the superconductor screens in its
Meissner state, and on the electronic state of the host. A measurement at a
given energy sees the rate averaged over the implantation profile. This
crate computes that average so that it can be fit against data.

The pieces, from the bottom up:

- [`quad`]: the GSL adaptive quadratures that everything else leans on,
  including QAWF for the Fourier-sine transforms that give the nonlocal
  field profiles.
- [`superconductivity`]: BCS temperature dependences, the Pippard kernel,
  and the Dynes-broadened density of states.
- [`field`]: the screened field as a function of depth for the local
  (London), Pippard, and extreme anomalous limit models.
- [`relaxation`]: the SLR rate at a single depth, including the
  Hebel-Slichter coherence factor.
- [`stopping`]: tabulated implantation profiles and their interpolation in
  energy.
- [`analyzer`]: the depth average itself, a flat fitting interface, and a
  cache of loaded profiles.
- [`output`]: CSV tables of computed rates.

*/

#![deny(missing_docs)]

#[macro_use] extern crate slog;
#[cfg(test)] #[macro_use] extern crate assert_approx_eq;

use std::f64;

pub mod analyzer;
pub mod error;
pub mod field;
mod gsl;
pub mod output;
pub mod quad;
pub mod relaxation;
pub mod stopping;
pub mod superconductivity;

pub use analyzer::{AnalyzerConfig, ConvergencePolicy, DepthResolvedAnalyzer, ParameterLayout,
                   ProfileRegistry, SlrParameters};
pub use error::{Error, Result};
pub use field::{Estimate, FieldModel, Geometry};
pub use relaxation::SurfaceLayer;
pub use stopping::{Interpolation, StoppingProfile};

pub use f64::consts::PI;

/// Two times pi, as an `f64`.
pub const TWO_PI: f64 = 2. * PI;

/// The Boltzmann constant in meV per kelvin.
pub const BOLTZMANN_MEV: f64 = 8.617333262e-2;

/// The Euler-Mascheroni constant.
pub const EULER_GAMMA: f64 = 0.5772156649015329;

/// The nuclear magneton divided by Planck's constant, in MHz per tesla.
pub const NUCLEAR_MAGNETON_MHZ_PER_T: f64 = 7.6225932291;


/// A nucleus taking part in relaxation, either as the implanted probe or as
/// a constituent of the host.
#[derive(Copy,Clone,Debug,PartialEq)]
pub struct Nucleus {
    /// A label such as `"8Li"`.
    pub name: &'static str,

    /// The nuclear spin quantum number.
    pub spin: f64,

    /// The magnetic moment in nuclear magnetons.
    pub magnetic_moment: f64,

    /// The half-life in seconds; infinite for stable nuclei.
    pub half_life: f64,
}

impl Nucleus {
    /// The gyromagnetic ratio γ = μ/(ħI), in rad s⁻¹ T⁻¹.
    pub fn gyromagnetic_ratio(&self) -> f64 {
        TWO_PI * 1e6 * NUCLEAR_MAGNETON_MHZ_PER_T * self.magnetic_moment / self.spin
    }

    /// The mean radioactive lifetime τ = t½/ln 2, in seconds.
    pub fn lifetime(&self) -> f64 {
        self.half_life / f64::consts::LN_2
    }
}

/// The ⁸Li probe.
pub const LITHIUM_8: Nucleus = Nucleus {
    name: "8Li",
    spin: 2.,
    magnetic_moment: 1.65350,
    half_life: 0.83840,
};

/// ⁹³Nb, the host nucleus of niobium samples.
pub const NIOBIUM_93: Nucleus = Nucleus {
    name: "93Nb",
    spin: 4.5,
    magnetic_moment: 6.163,
    half_life: f64::INFINITY,
};
