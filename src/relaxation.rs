// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

/*! Spin-lattice relaxation of the implanted probe at a single depth.

The local rate has two parts. The first is dipole-dipole relaxation by the
host nuclei, whose fluctuating dipolar field `B_d` has a correlation rate
`ν_c`; it depends on depth through the local field, which sets the Larmor
frequencies. The second is a phenomenological normal-state (Korringa-like)
term `c Tᵐ`. Below `T_c` the latter can optionally be multiplied by the
Hebel-Slichter ratio of superconducting to normal-state rates.

All rates are in s⁻¹, fields in T, and gyromagnetic ratios in rad s⁻¹ T⁻¹.

*/

use std::f64;

use crate::analyzer::SlrParameters;
use crate::error::{Error, Result};
use crate::field::{Estimate, FieldPenetration, Screening};
use crate::Nucleus;


/// Relaxation through the dipolar coupling of unlike spins.
pub mod dipole_dipole {
    /// The Lorentzian (BPP) spectral density `J(ω) = ν_c / (ν_c² + ω²)`.
    pub fn spectral_density(omega: f64, nu_c: f64) -> f64 {
        nu_c / (nu_c * nu_c + omega * omega)
    }

    /// The SLR rate of spin I (gyromagnetic ratio `gamma_i`) coupled to spin
    /// S (`gamma_s`) in field `b0`, for a fluctuating dipolar field `b_d`
    /// with correlation rate `nu_c`.
    pub fn slr_rate(b0: f64, b_d: f64, nu_c: f64, gamma_i: f64, gamma_s: f64) -> f64 {
        let omega_i = gamma_i * b0;
        let omega_s = gamma_s * b0;

        (gamma_i * gamma_s).abs() * b_d * b_d * (
            spectral_density(omega_i - omega_s, nu_c) / 3.
                + spectral_density(omega_i, nu_c)
                + 2. * spectral_density(omega_i + omega_s, nu_c)
        )
    }
}


/// The normal-state rate `c Tᵐ`.
pub fn normal_state_rate(temperature: f64, slr_constant: f64, slr_exponent: f64) -> f64 {
    slr_constant * temperature.powf(slr_exponent)
}


/// The Hebel-Slichter coherence peak.
pub mod hebel_slichter {
    use crate::quad::{Finite, IntegrationResult, QuadError, UpperTail};
    use crate::superconductivity::{self, Dynes};
    use crate::BOLTZMANN_MEV;

    /// `f(E)(1 − f(E))` for the Fermi function at inverse temperature
    /// `beta` (meV⁻¹), written so that it can't overflow.
    fn fermi_window(energy: f64, beta: f64) -> f64 {
        let c = (0.5 * beta * energy).cosh();
        0.25 / (c * c)
    }

    /// The integrand `[N(E)² + M(E)²] f(E)(1 − f(E))`, energies in meV.
    pub fn integrand(energy: f64, dynes: &Dynes, beta: f64) -> f64 {
        let n = dynes.density_of_states(energy);
        let m = dynes.coherence_factor(energy);
        (n * n + m * m) * fermi_window(energy, beta)
    }

    fn scale(r: IntegrationResult, factor: f64) -> IntegrationResult {
        IntegrationResult {
            value: r.value * factor,
            abserr: r.abserr * factor,
        }
    }

    fn sum(a: IntegrationResult, b: IntegrationResult) -> IntegrationResult {
        IntegrationResult {
            value: a.value + b.value,
            abserr: a.abserr + b.abserr,
        }
    }

    /// The ratio `R_s/R_n = 2β ∫₀^∞ [N(E)² + M(E)²] f(E)(1 − f(E)) dE` of
    /// the superconducting to normal-state SLR rate.
    ///
    /// `gap0` is the zero-temperature gap and `broadening` the Dynes Γ, both
    /// in meV. The ratio is 1 at and above `t_c` and 0 at zero temperature.
    /// The integral is split at the gap edge, where the broadened density of
    /// states peaks: `quad` integrates below it, `tail` above.
    pub fn slr_ratio(
        quad: &Finite, tail: &UpperTail, t: f64, t_c: f64, gap0: f64, broadening: f64
    ) -> Result<IntegrationResult, QuadError> {
        if t >= t_c {
            return Ok(IntegrationResult { value: 1., abserr: 0. });
        }

        if t <= 0. {
            return Ok(IntegrationResult { value: 0., abserr: 0. });
        }

        let gap = superconductivity::gap(t, t_c, gap0);
        let dynes = Dynes::new(gap, broadening);
        let beta = 1. / (BOLTZMANN_MEV * t);
        let f = |e: f64| integrand(e, &dynes, beta);

        let mut not_converged = false;

        let mut piece = |r: Result<IntegrationResult, QuadError>| -> Result<IntegrationResult, QuadError> {
            match r {
                Ok(r) => Ok(r),
                Err(QuadError::NotConverged { best }) => {
                    not_converged = true;
                    Ok(best)
                },
                Err(e) => Err(e),
            }
        };

        let below = piece(quad.integrate(f, 0., gap))?;
        let above = piece(tail.integrate(f, gap))?;
        let total = scale(sum(below, above), 2. * beta);

        if not_converged {
            Err(QuadError::NotConverged { best: total })
        } else {
            Ok(total)
        }
    }
}


/// How the surface dead layer relaxes.
#[derive(Copy,Clone,Debug,Eq,Hash,PartialEq)]
pub enum SurfaceLayer {
    /// The dead layer has its own rate, `surface_rate`.
    Independent,

    /// The dead layer is normal metal: it sees the full applied field and
    /// relaxes at the normal-state rate.
    NormalState,
}

impl Default for SurfaceLayer {
    fn default() -> Self {
        SurfaceLayer::Independent
    }
}


/// Everything about the local rate that is fixed for one evaluation.
#[derive(Copy,Clone,Debug,PartialEq)]
pub struct RateTerms {
    /// The applied field, T.
    pub applied_field: f64,
    /// The fluctuating dipolar field, T.
    pub dipole_field: f64,
    /// Its correlation rate, s⁻¹.
    pub correlation_rate: f64,
    /// `c Tᵐ`, s⁻¹.
    pub normal_state: f64,
    /// Multiplies `normal_state` below the dead layer.
    pub coherence_ratio: f64,
    /// The dead-layer thickness, nm.
    pub dead_layer: f64,
    /// The dead-layer rate, s⁻¹; only meaningful for
    /// [`SurfaceLayer::Independent`].
    pub surface_rate: f64,
}


/// The SLR rate of the probe at a given depth.
#[derive(Copy,Clone,Debug,PartialEq)]
pub struct LocalRelaxationRate {
    surface: SurfaceLayer,
    gamma_probe: f64,
    gamma_host: f64,
}

impl LocalRelaxationRate {
    /// Create a rate model for a probe relaxed by host nuclei.
    pub fn new(surface: SurfaceLayer, probe: &Nucleus, host: &Nucleus) -> Self {
        LocalRelaxationRate {
            surface,
            gamma_probe: probe.gyromagnetic_ratio(),
            gamma_host: host.gyromagnetic_ratio(),
        }
    }

    /// The treatment of the dead layer.
    pub fn surface(&self) -> SurfaceLayer {
        self.surface
    }

    /// Validate the relaxation parameters and gather the per-evaluation
    /// constants. `coherence_ratio` is the Hebel-Slichter factor (1 to
    /// disable it).
    pub fn terms(&self, p: &SlrParameters, coherence_ratio: f64) -> Result<RateTerms> {
        let temperature = Error::require_nonnegative("temperature", p.temperature)?;
        let applied_field = Error::require("applied_field", p.applied_field)?;
        let dipole_field = Error::require("dipole_field", p.dipole_field)?;
        let correlation_rate = Error::require_positive("correlation_rate", p.correlation_rate)?;
        let slr_constant = Error::require("slr_constant", p.slr_constant)?;
        let slr_exponent = Error::require("slr_exponent", p.slr_exponent)?;
        let dead_layer = Error::require_nonnegative("surface_thickness", p.surface_thickness)?;

        let surface_rate = match self.surface {
            SurfaceLayer::Independent => Error::require("surface_rate", p.surface_rate)?,
            SurfaceLayer::NormalState => f64::NAN,
        };

        Ok(RateTerms {
            applied_field,
            dipole_field,
            correlation_rate,
            normal_state: normal_state_rate(temperature, slr_constant, slr_exponent),
            coherence_ratio,
            dead_layer,
            surface_rate,
        })
    }

    /// The dipole-dipole rate in a local field `b`.
    pub fn dipolar(&self, b: f64, terms: &RateTerms) -> f64 {
        dipole_dipole::slr_rate(b, terms.dipole_field, terms.correlation_rate,
                                self.gamma_probe, self.gamma_host)
    }

    /// The rate at depth `z` (nm, from the outer surface). The error
    /// estimate is that of the field profile.
    pub fn rate(
        &self, z: f64, terms: &RateTerms, field: &FieldPenetration, screening: &Screening
    ) -> Result<Estimate> {
        let depth = z - terms.dead_layer;

        if depth < 0. {
            return Ok(Estimate::exact(match self.surface {
                SurfaceLayer::Independent => terms.surface_rate,
                SurfaceLayer::NormalState => self.dipolar(terms.applied_field, terms) + terms.normal_state,
            }));
        }

        let b = field.field_at_depth(depth, terms.applied_field, screening)?;

        Ok(Estimate {
            value: self.dipolar(b.value, terms) + terms.normal_state * terms.coherence_ratio,
            ..b
        })
    }
}
