// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

/*! The Meissner screening profile `B(z)` below the surface of a
superconductor.

Three electrodynamic models are available, chosen at runtime through
[`FieldModel`]:

- `Local`: London screening, `B(z) = B₀ exp(−z/λ)`. Optionally a film of
  finite thickness screened from both faces, which gives a `cosh` profile.
- `Pippard`: nonlocal screening,
  `B(z) = (2/π) B₀ ∫₀^∞ q sin(qz) / (q² + K(q)) dq` with the Pippard kernel
  `K(q) = λ(T)^{-2} (ξ(T)/ξ(0)) g(q ξ(T))`.
- `ExtremeAnomalous`: the large-`q` limit of the same kernel,
  `K(q) = 3π / (4 λ(T)² ξ(0) q)`, appropriate when the coherence length
  dwarfs the penetration depth.

Everything that depends only on the material and the temperature is worked
out once per evaluation in a [`Screening`]; the depth integral then only
pays for the wavevector integral at each node.

For the nonlocal models the London profile at the `q → 0` scale `c` is
taken out in closed form, `(2/π) ∫ q sin(qz)/(q² + c²) dq = exp(−cz)`. The
remainder falls off as `q⁻³` and goes to GSL's QAWF.

*/

use std::f64;
use std::f64::consts::{FRAC_2_PI, FRAC_PI_2, PI};

use crate::analyzer::SlrParameters;
use crate::error::{Error, Result};
use crate::quad::{FourierSine, IntegrationResult, QuadError};
use crate::superconductivity;


/// Which electrodynamic screening model to use.
#[derive(Copy,Clone,Debug,Eq,Hash,PartialEq)]
pub enum FieldModel {
    /// Local (London) electrodynamics.
    Local,

    /// Nonlocal Pippard electrodynamics.
    Pippard,

    /// The extreme anomalous limit of the Pippard model.
    ExtremeAnomalous,
}

impl FieldModel {
    /// Whether the model needs a wavevector integral.
    pub fn is_nonlocal(&self) -> bool {
        *self != FieldModel::Local
    }
}


/// The shape of the superconducting region.
#[derive(Copy,Clone,Debug,PartialEq)]
pub enum Geometry {
    /// A half-space.
    SemiInfinite,

    /// A film of the given total thickness (nm, including the surface dead
    /// layer) with field applied to both faces. Only supported by the local
    /// model.
    Film {
        /// Total film thickness in nm.
        thickness: f64,
    },
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry::SemiInfinite
    }
}


/// A value together with the relative error reported by the integrator that
/// produced it.
#[derive(Copy,Clone,Debug,PartialEq)]
pub struct Estimate {
    /// The value.
    pub value: f64,

    /// The estimated relative error of `value`; zero for closed forms.
    pub rel_err: f64,

    /// Whether the integrator met its tolerance.
    pub converged: bool,
}

impl Estimate {
    /// A value known without numerical error.
    pub fn exact(value: f64) -> Self {
        Estimate { value, rel_err: 0., converged: true }
    }
}


/// The temperature-dependent screening state of the superconductor.
///
/// Lengths are in nm and couplings in nm⁻².
#[derive(Copy,Clone,Debug,PartialEq)]
pub enum Screening {
    /// The sample is in the normal state and the field is not screened.
    Unscreened,

    /// London screening of a half-space.
    London {
        /// The effective penetration depth.
        penetration_depth: f64,
    },

    /// London screening of a film from both faces.
    Film {
        /// The effective penetration depth.
        penetration_depth: f64,

        /// The superconducting thickness below the dead layer.
        thickness: f64,
    },

    /// Pippard screening, `K(q) = coupling · g(q ξ)`.
    Pippard {
        /// `λ(T)^{-2} ξ(T)/ξ(0)`.
        coupling: f64,

        /// `ξ(T)`.
        coherence_length: f64,
    },

    /// Extreme anomalous screening, `K(q) = coupling / q`.
    ExtremeAnomalous {
        /// `3π / (4 λ(T)² ξ(0))`.
        coupling: f64,
    },
}

impl Screening {
    /// The kernel `K(q)` of the nonlocal models. Zero for the local ones.
    pub fn kernel(&self, q: f64) -> f64 {
        match *self {
            Screening::Pippard { coupling, coherence_length } =>
                coupling * superconductivity::pippard_g(q * coherence_length),
            Screening::ExtremeAnomalous { coupling } => coupling / q,
            _ => 0.,
        }
    }

    /// The wavenumber `c` of the London profile subtracted from a nonlocal
    /// one: `K(0)^{1/2}` for Pippard and `coupling^{1/3}` in the extreme
    /// anomalous limit. Zero for the local models.
    pub fn reference_wavenumber(&self) -> f64 {
        match *self {
            Screening::Pippard { coupling, .. } => coupling.sqrt(),
            Screening::ExtremeAnomalous { coupling } => coupling.cbrt(),
            _ => 0.,
        }
    }

    /// `q/(q² + K(q)) − q/(q² + c²)`, arranged to stay finite at `q = 0`.
    pub fn residual(&self, q: f64, c2: f64) -> f64 {
        match *self {
            Screening::Pippard { .. } => {
                let k = self.kernel(q);
                q * (c2 - k) / ((q * q + k) * (q * q + c2))
            },
            Screening::ExtremeAnomalous { coupling } =>
                q * (q * c2 - coupling) / ((q * q * q + coupling) * (q * q + c2)),
            _ => 0.,
        }
    }
}


/// Computes field profiles for one [`FieldModel`].
///
/// The wavevector integrator is built at construction and shared by every
/// evaluation; its GSL workspaces are pooled.
#[derive(Clone,Debug)]
pub struct FieldPenetration {
    model: FieldModel,
    geometry: Geometry,
    fourier: FourierSine,
}

impl FieldPenetration {
    /// Below this fraction of the applied field, the nonlocal profile only
    /// needs to be accurate in absolute terms.
    const FIELD_FLOOR: f64 = 1e-3;

    /// Create a calculator. `tolerance` is the relative tolerance of the
    /// field, applied in absolute terms at `FIELD_FLOOR` of the applied
    /// field, and `levels` the depth of the QAWO moment tables.
    pub fn new(model: FieldModel, tolerance: f64, levels: usize) -> Self {
        let fourier = FourierSine::new(levels)
            .abs_tolerance(tolerance * Self::FIELD_FLOOR * FRAC_PI_2);

        FieldPenetration {
            model,
            geometry: Geometry::SemiInfinite,
            fourier,
        }
    }

    /// Set the sample geometry.
    pub fn geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// The screening model in use.
    pub fn model(&self) -> FieldModel {
        self.model
    }

    /// Work out the screening state for temperature `p.temperature` and the
    /// (possibly field-suppressed) critical temperature `t_c`.
    ///
    /// All parameters that the model needs are checked here, including in
    /// the normal state where some of them go unused.
    pub fn screening(&self, p: &SlrParameters, t_c: f64) -> Result<Screening> {
        let t = Error::require_nonnegative("temperature", p.temperature)?;
        let lambda0 = Error::require_positive("lambda_0", p.lambda_0)?;
        let exponent = Error::require_positive("exponent", p.exponent)?;

        match self.model {
            FieldModel::Local => {
                let film_thickness = match self.geometry {
                    Geometry::SemiInfinite => None,
                    Geometry::Film { thickness } => {
                        let dead = Error::require_nonnegative("surface_thickness", p.surface_thickness)?;
                        let d = thickness - dead;

                        if !(d > 0.) {
                            return Err(Error::InvalidParameter {
                                name: "thickness",
                                value: thickness,
                                reason: "film must be thicker than its surface dead layer",
                            });
                        }

                        Some(d)
                    },
                };

                if !(t < t_c) {
                    return Ok(Screening::Unscreened);
                }

                let mut lambda = superconductivity::penetration_depth(t, t_c, lambda0, exponent);

                // Dirty-limit lengthening, only when both lengths are known.
                if p.coherence_length.is_finite() && p.mean_free_path.is_finite() && p.mean_free_path > 0. {
                    lambda *= (1. + p.coherence_length / p.mean_free_path).sqrt();
                }

                Ok(match film_thickness {
                    None => Screening::London { penetration_depth: lambda },
                    Some(thickness) => Screening::Film { penetration_depth: lambda, thickness },
                })
            },

            FieldModel::Pippard => {
                self.reject_film()?;
                let gap = Error::require_positive("gap", p.gap)?;
                let xi0 = Error::require_positive("coherence_length", p.coherence_length)?;
                let ell = Error::require_positive("mean_free_path", p.mean_free_path)?;

                if xi0.is_infinite() && ell.is_infinite() {
                    return Err(Error::InvalidParameter {
                        name: "mean_free_path",
                        value: ell,
                        reason: "the coherence length and mean free path cannot both be infinite",
                    });
                }

                if !(t < t_c) {
                    return Ok(Screening::Unscreened);
                }

                let lambda = superconductivity::penetration_depth(t, t_c, lambda0, exponent);
                let xi_t = superconductivity::coherence_length(t, t_c, gap, exponent, xi0, ell);
                let xi_0 = superconductivity::coherence_length(0., t_c, gap, exponent, xi0, ell);

                Ok(Screening::Pippard {
                    coupling: xi_t / (xi_0 * lambda * lambda),
                    coherence_length: xi_t,
                })
            },

            FieldModel::ExtremeAnomalous => {
                self.reject_film()?;
                let xi0 = Error::require_positive("coherence_length", p.coherence_length)?;

                let ell = if p.mean_free_path.is_nan() {
                    f64::INFINITY
                } else {
                    Error::require_positive("mean_free_path", p.mean_free_path)?
                };

                if !(t < t_c) {
                    return Ok(Screening::Unscreened);
                }

                let lambda = superconductivity::penetration_depth(t, t_c, lambda0, exponent);
                let xi_0 = 1. / (1. / xi0 + 1. / ell);

                if !(xi_0.is_finite()) {
                    return Err(Error::InvalidParameter {
                        name: "coherence_length",
                        value: xi0,
                        reason: "the extreme anomalous limit needs a finite coherence length",
                    });
                }

                Ok(Screening::ExtremeAnomalous {
                    coupling: 0.75 * PI / (lambda * lambda * xi_0),
                })
            },
        }
    }

    fn reject_film(&self) -> Result<()> {
        match self.geometry {
            Geometry::SemiInfinite => Ok(()),
            Geometry::Film { thickness } => Err(Error::InvalidParameter {
                name: "thickness",
                value: thickness,
                reason: "film geometry is only available for the local model",
            }),
        }
    }

    fn nonlocal_estimate(b0: f64, london: f64, r: IntegrationResult, converged: bool) -> Estimate {
        let ratio = london + FRAC_2_PI * r.value;
        let abserr = FRAC_2_PI * r.abserr;

        Estimate {
            value: b0 * ratio,
            rel_err: if abserr == 0. { 0. } else { abserr / ratio.abs() },
            converged,
        }
    }

    /// The field at depth `z` (nm, measured from the top of the
    /// superconducting region) for an applied field `b0`.
    ///
    /// Depths at or above the surface return `b0` exactly. A nonlocal profile
    /// that misses its tolerance is still returned, flagged as unconverged.
    pub fn field_at_depth(&self, z: f64, b0: f64, screening: &Screening) -> Result<Estimate> {
        if z <= 0. {
            return Ok(Estimate::exact(b0));
        }

        match *screening {
            Screening::Unscreened => Ok(Estimate::exact(b0)),

            Screening::London { penetration_depth } =>
                Ok(Estimate::exact(b0 * (-z / penetration_depth).exp())),

            Screening::Film { penetration_depth, thickness } => {
                if z >= thickness {
                    return Ok(Estimate::exact(b0));
                }

                // cosh((d/2 − z)/λ) / cosh(d/2λ), arranged so that thick films
                // don't overflow.
                let x = z / penetration_depth;
                let two_a = thickness / penetration_depth;
                let ratio = ((-x).exp() + (x - two_a).exp()) / (1. + (-two_a).exp());
                Ok(Estimate::exact(b0 * ratio))
            },

            Screening::Pippard { .. } | Screening::ExtremeAnomalous { .. } => {
                let c = screening.reference_wavenumber();
                let c2 = c * c;
                let london = (-c * z).exp();

                match self.fourier.integrate(|q| screening.residual(q, c2), z) {
                    Ok(r) => Ok(Self::nonlocal_estimate(b0, london, r, true)),
                    Err(QuadError::NotConverged { best }) => Ok(Self::nonlocal_estimate(b0, london, best, false)),
                    Err(e) => Err(Error::Numerical { stage: "field", source: e }),
                }
            },
        }
    }
}
