// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

/*! Material properties of a BCS superconductor.

Temperatures are in Kelvin, energies in meV, lengths in nm, and fields in
Tesla. Everything here is closed-form apart from the gap equation, which
needs a short Newton iteration.

The temperature dependence of the gap uses the weak-coupling approximation of
Thouless, `tanh(δ/t) = δ` for the reduced gap `δ = Δ(T)/Δ(0)` at reduced
temperature `t = T/T_c`. The penetration depth follows the two-fluid scaling
`λ(T) = λ₀ / sqrt(1 − tⁿ)`, with `n = 4` being the classic Gorter-Casimir
choice.

*/

use num_complex::Complex64;
use std::f64;

use crate::{BOLTZMANN_MEV, EULER_GAMMA};


/// The reduced BCS gap `Δ(T)/Δ(0)` at reduced temperature `t = T/T_c`.
///
/// This is 1 for `t <= 0` and 0 for `t >= 1`.
pub fn reduced_gap(t: f64) -> f64 {
    if t <= 0. {
        return 1.;
    }

    if t >= 1. {
        return 0.;
    }

    // f(δ) = tanh(δ/t) − δ is concave in δ, so Newton's method started to the
    // right of the root walks down onto it without overshooting.
    let mut delta = 1.;

    for _ in 0..200 {
        let th = (delta / t).tanh();
        let f = th - delta;
        let df = (1. - th * th) / t - 1.;
        let step = f / df;
        delta -= step;

        if step.abs() <= 4. * f64::EPSILON * delta.abs() {
            break;
        }
    }

    delta.max(0.)
}


/// The zero-temperature BCS gap in meV for a weak-coupling superconductor
/// with critical temperature `t_c`: `π e^{−γ} k_B T_c ≈ 1.764 k_B T_c`.
pub fn bcs_gap_mev(t_c: f64) -> f64 {
    f64::consts::PI * (-EULER_GAMMA).exp() * BOLTZMANN_MEV * t_c
}


/// The reduced gap `2Δ(0) / k_B T_c` implied by a gap and critical
/// temperature; 3.53 in the BCS weak-coupling limit.
pub fn gap_ratio(gap_mev: f64, t_c: f64) -> f64 {
    2. * gap_mev / (BOLTZMANN_MEV * t_c)
}


/// The gap at temperature `t`, given its zero-temperature value.
pub fn gap(t: f64, t_c: f64, gap0: f64) -> f64 {
    gap0 * reduced_gap(t / t_c)
}


/// The two-fluid penetration depth at temperature `t`.
///
/// Infinite at and above `t_c`.
pub fn penetration_depth(t: f64, t_c: f64, lambda0: f64, exponent: f64) -> f64 {
    let reduced = (t / t_c).max(0.);

    if reduced >= 1. {
        f64::INFINITY
    } else {
        lambda0 / (1. - reduced.powf(exponent)).sqrt()
    }
}


/// The critical temperature suppressed by an applied field `b`:
/// `T_c(B) = T_c0 sqrt(1 − B/B_c2)`.
///
/// Fields at or above `b_c2` destroy superconductivity (`T_c = 0`); a
/// negative field leaves `T_c` untouched.
pub fn critical_temperature(t_c0: f64, b: f64, b_c2: f64) -> f64 {
    if b <= 0. {
        t_c0
    } else if b >= b_c2 {
        0.
    } else {
        t_c0 * (1. - b / b_c2).sqrt()
    }
}


/// The Pippard function `g(x) = (3/2)[(1 + x²) atan(x) − x] / x³`.
///
/// It tends to 1 as `x → 0` and to `3π/(4x)` as `x → ∞`.
pub fn pippard_g(x: f64) -> f64 {
    let x = x.abs();

    if x < 1e-5 {
        return 1.;
    }

    if x < 1e-2 {
        // 3 Σ (−1)^{k+1} x^{2(k−1)} / (4k² − 1)
        let x2 = x * x;
        return 1. - 3. * x2 / 15. + 3. * x2 * x2 / 35. - 3. * x2 * x2 * x2 / 63.;
    }

    1.5 * ((1. + x * x) * x.atan() - x) / (x * x * x)
}


/// The Pippard coherence-length scaling `J(T)`, which is 1 at zero
/// temperature.
///
/// `J(T) = (λ(T)/λ₀)² δ(t) tanh(Δ(T) / 2k_BT)`.
pub fn coherence_scaling(t: f64, t_c: f64, gap0: f64, exponent: f64) -> f64 {
    if t <= 0. {
        return 1.;
    }

    let reduced = t / t_c;

    if reduced >= 1. {
        return 0.;
    }

    let lambda_ratio_sq = 1. / (1. - reduced.powf(exponent));
    let delta = reduced_gap(reduced);
    lambda_ratio_sq * delta * (gap0 * delta / (2. * BOLTZMANN_MEV * t)).tanh()
}


/// The effective Pippard coherence length `ξ(T) = 1 / (J(T)/ξ₀ + 1/ℓ)`.
///
/// An infinite `xi0` or `ell` drops the corresponding term; a zero one
/// forces the coherence length to zero.
pub fn coherence_length(t: f64, t_c: f64, gap0: f64, exponent: f64, xi0: f64, ell: f64) -> f64 {
    let inv = coherence_scaling(t, t_c, gap0, exponent) / xi0 + 1. / ell;
    1. / inv
}


/// The Dynes-broadened density of states and coherence factor.
#[derive(Copy,Clone,Debug,PartialEq)]
pub struct Dynes {
    /// The superconducting gap, in meV.
    pub gap: f64,

    /// The pair-breaking broadening Γ, in meV.
    pub broadening: f64,
}

impl Dynes {
    /// Create a new Dynes model.
    pub fn new(gap: f64, broadening: f64) -> Self {
        Dynes { gap, broadening }
    }

    fn root(&self, energy: f64) -> (Complex64, Complex64) {
        let e = Complex64::new(energy, -self.broadening);
        let root = (e * e - self.gap * self.gap).sqrt();
        (e, root)
    }

    /// The normalized density of states `Re[E/sqrt(E² − Δ²)]`, `E → E − iΓ`.
    pub fn density_of_states(&self, energy: f64) -> f64 {
        let (e, root) = self.root(energy);
        (e / root).re
    }

    /// The coherence factor `Re[Δ/sqrt(E² − Δ²)]`, `E → E − iΓ`.
    pub fn coherence_factor(&self, energy: f64) -> f64 {
        let (_, root) = self.root(energy);
        (self.gap / root).re
    }
}
