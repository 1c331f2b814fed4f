// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

//! Adaptive quadrature, backed by GSL.
//!
//! Three integrators live here. Each holds its settings and gets its GSL
//! workspaces when called:
//!
//! - [`Finite`] for `[a, b]`: QAGS by default, which extrapolates away
//!   integrable endpoint singularities (the stopping profiles have them when
//!   α < 1 or β < 1), or QAG with a fixed Gauss-Kronrod rule;
//! - [`UpperTail`] for `[a, ∞)` with a decaying integrand (QAGIU);
//! - [`FourierSine`] for `∫₀^∞ f(x) sin(ωx) dx` (QAWF). Its Chebyshev
//!   moment tables are kept in a pool and reused from call to call.
//!
//! An integral that misses its tolerance comes back as
//! [`QuadError::NotConverged`] with GSL's best estimate attached; what to do
//! with it is up to the caller.

use std::f64;
use std::os::raw;
use std::sync::Mutex;
use thiserror::Error;

use crate::gsl::{self, IntegrationWorkspace, QawoTable, RawOutcome};

pub use crate::gsl::IntegrationRule;


/// The output of a quadrature.
#[derive(Clone,Copy,Debug,PartialEq)]
pub struct IntegrationResult {
    /// The estimated value of the integral.
    pub value: f64,

    /// GSL's estimate of the absolute error of `value`.
    pub abserr: f64,
}

impl IntegrationResult {
    fn zero() -> Self {
        IntegrationResult { value: 0., abserr: 0. }
    }

    /// The estimated error relative to the value itself.
    pub fn rel_err(&self) -> f64 {
        if self.abserr == 0. {
            0.
        } else {
            self.abserr / self.value.abs()
        }
    }

    fn negate(self) -> Self {
        IntegrationResult { value: -self.value, ..self }
    }
}


/// Ways that a quadrature can fail.
#[derive(Clone,Debug,Error,PartialEq)]
pub enum QuadError {
    /// The tolerance was not met: the subinterval budget ran out, roundoff
    /// got in the way, or the integrand misbehaved.
    #[error("quadrature did not converge (estimate {:e}, error {:e})", .best.value, .best.abserr)]
    NotConverged {
        /// The estimate GSL settled on.
        best: IntegrationResult,
    },

    /// The integrand returned NaN or an infinity.
    #[error("integrand is not finite at x = {x:e} (got {value})")]
    NonFinite {
        /// The abscissa.
        x: f64,
        /// What the integrand returned there.
        value: f64,
    },

    /// An integration bound or frequency was unusable.
    #[error("cannot integrate over [{a}, {b}]")]
    BadInterval {
        /// The lower bound.
        a: f64,
        /// The upper bound.
        b: f64,
    },

    /// GSL refused to start, for instance because the tolerance is
    /// unattainable or memory ran out.
    #[error("GSL error {code}: {message}")]
    Gsl {
        /// The GSL status code.
        code: i32,
        /// Its description.
        message: String,
    },
}

impl QuadError {
    fn from_status(code: raw::c_int) -> Self {
        QuadError::Gsl { code, message: gsl::strerror(code) }
    }
}


/// Interpret a GSL status.
fn finish(raw: RawOutcome) -> Result<IntegrationResult, QuadError> {
    let r = IntegrationResult { value: raw.value, abserr: raw.abserr };

    match raw.status {
        gsl::GSL_SUCCESS => Ok(r),
        gsl::GSL_EMAXITER | gsl::GSL_EROUND | gsl::GSL_ESING | gsl::GSL_EDIVERGE
            | gsl::GSL_ETOL | gsl::GSL_ETABLE | gsl::GSL_EFAILED if r.value.is_finite() =>
            Err(QuadError::NotConverged { best: r }),
        code => Err(QuadError::from_status(code)),
    }
}


/// Run `body` on an integrand that swaps non-finite values for zero, and
/// report the first one afterwards. GSL itself would happily sum a NaN.
fn guarded<F, B>(mut f: F, body: B) -> Result<IntegrationResult, QuadError>
    where F: FnMut(f64) -> f64,
          B: FnOnce(&mut dyn FnMut(f64) -> f64) -> RawOutcome
{
    let mut bad = None;

    let raw = body(&mut |x: f64| {
        let y = f(x);

        if y.is_finite() {
            y
        } else {
            if bad.is_none() {
                bad = Some((x, y));
            }
            0.
        }
    });

    if let Some((x, value)) = bad {
        return Err(QuadError::NonFinite { x, value });
    }

    finish(raw)
}


fn workspace(limit: usize) -> Result<IntegrationWorkspace, QuadError> {
    IntegrationWorkspace::new(limit).ok_or_else(|| QuadError::from_status(gsl::GSL_ENOMEM))
}


/// Adaptive integration over a finite interval.
#[derive(Clone,Copy,Debug,PartialEq)]
pub struct Finite {
    tolerance: f64,
    limit: usize,
    rule: Option<IntegrationRule>,
}

impl Default for Finite {
    fn default() -> Self {
        Finite {
            tolerance: 1e-8,
            limit: 200,
            rule: None,
        }
    }
}

impl Finite {
    /// QAGS with a relative tolerance of 1e-8 and 200 subintervals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relative tolerance.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the maximum number of subintervals.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Use QAG with a fixed rule instead of QAGS. Better for smooth but
    /// sharply peaked integrands.
    pub fn rule(mut self, rule: IntegrationRule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// The relative tolerance in use.
    pub fn get_tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Integrate `f` from `a` to `b`.
    pub fn integrate<F>(&self, f: F, a: f64, b: f64) -> Result<IntegrationResult, QuadError>
        where F: FnMut(f64) -> f64
    {
        if !(a.is_finite() && b.is_finite()) {
            return Err(QuadError::BadInterval { a, b });
        }

        if a == b {
            return Ok(IntegrationResult::zero());
        }

        if a > b {
            return match self.integrate(f, b, a) {
                Ok(r) => Ok(r.negate()),
                Err(QuadError::NotConverged { best }) => Err(QuadError::NotConverged { best: best.negate() }),
                Err(e) => Err(e),
            };
        }

        let mut ws = workspace(self.limit)?;

        guarded(f, |g| match self.rule {
            None => ws.qags(g, a, b).tolerance(0., self.tolerance).compute(),
            Some(rule) => ws.qag(g, a, b).tolerance(0., self.tolerance).rule(rule).compute(),
        })
    }
}


/// Adaptive integration over `[a, ∞)`.
#[derive(Clone,Copy,Debug,PartialEq)]
pub struct UpperTail {
    tolerance: f64,
    limit: usize,
}

impl Default for UpperTail {
    fn default() -> Self {
        UpperTail {
            tolerance: 1e-8,
            limit: 200,
        }
    }
}

impl UpperTail {
    /// QAGIU with a relative tolerance of 1e-8 and 200 subintervals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relative tolerance.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the maximum number of subintervals.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// The relative tolerance in use.
    pub fn get_tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Integrate `f` from `a` to positive infinity.
    pub fn integrate<F>(&self, f: F, a: f64) -> Result<IntegrationResult, QuadError>
        where F: FnMut(f64) -> f64
    {
        if !a.is_finite() {
            return Err(QuadError::BadInterval { a, b: f64::INFINITY });
        }

        let mut ws = workspace(self.limit)?;
        guarded(f, |g| ws.qagiu(g, a).tolerance(0., self.tolerance).compute())
    }
}


/// The GSL state needed by one QAWF call.
#[derive(Debug)]
struct FourierWorkspace {
    intervals: IntegrationWorkspace,
    cycles: IntegrationWorkspace,
    table: QawoTable,
}


/// Fourier sine integrals `∫₀^∞ f(x) sin(ωx) dx` with `ω > 0`.
///
/// QAWF accepts only an absolute tolerance. Workspaces are checked out of a
/// pool for the duration of a call, so concurrent callers never share one.
#[derive(Debug)]
pub struct FourierSine {
    abs_tolerance: f64,
    limit: usize,
    levels: usize,
    pool: Mutex<Vec<FourierWorkspace>>,
}

impl FourierSine {
    /// Create an integrator whose moment tables have `levels` levels of
    /// bisection. The default absolute tolerance is `sqrt(ε)`.
    pub fn new(levels: usize) -> Self {
        FourierSine {
            abs_tolerance: f64::EPSILON.sqrt(),
            limit: 500,
            levels: levels.max(1),
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Set the absolute tolerance.
    pub fn abs_tolerance(mut self, abs_tolerance: f64) -> Self {
        self.abs_tolerance = abs_tolerance;
        self
    }

    /// Set the maximum number of cycles and of subintervals per cycle.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// The absolute tolerance in use.
    pub fn get_abs_tolerance(&self) -> f64 {
        self.abs_tolerance
    }

    /// The number of workspaces waiting in the pool.
    pub fn pooled(&self) -> usize {
        self.pool.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn checkout(&self) -> Result<FourierWorkspace, QuadError> {
        if let Some(ws) = self.pool.lock().unwrap_or_else(|e| e.into_inner()).pop() {
            return Ok(ws);
        }

        Ok(FourierWorkspace {
            intervals: workspace(self.limit)?,
            cycles: workspace(self.limit)?,
            table: QawoTable::sine(self.levels)
                .ok_or_else(|| QuadError::from_status(gsl::GSL_ENOMEM))?,
        })
    }

    /// Integrate `f(x) sin(ωx)` over `[0, ∞)`.
    pub fn integrate<F>(&self, f: F, omega: f64) -> Result<IntegrationResult, QuadError>
        where F: FnMut(f64) -> f64
    {
        if !(omega.is_finite() && omega > 0.) {
            return Err(QuadError::BadInterval { a: 0., b: f64::INFINITY });
        }

        let mut ws = self.checkout()?;

        let result = {
            let FourierWorkspace { ref mut intervals, ref mut cycles, ref mut table } = ws;
            guarded(f, |g| {
                intervals.qawf(g, 0., omega, cycles, table)
                    .tolerance(self.abs_tolerance, 0.)
                    .compute()
            })
        };

        self.pool.lock().unwrap_or_else(|e| e.into_inner()).push(ws);
        result
    }
}

impl Clone for FourierSine {
    fn clone(&self) -> Self {
        FourierSine {
            abs_tolerance: self.abs_tolerance,
            limit: self.limit,
            levels: self.levels,
            pool: Mutex::new(Vec::new()),
        }
    }
}

impl Default for FourierSine {
    fn default() -> Self {
        Self::new(32)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn finite_polynomial() {
        let r = Finite::new().integrate(|x| x * x, 0., 3.).unwrap();
        assert_approx_eq!(r.value, 9., 1e-12);
        assert!(r.rel_err() < 1e-8);
    }

    #[test]
    fn finite_endpoint_singularity() {
        let r = Finite::new().integrate(|x| 1. / x.sqrt(), 0., 1.).unwrap();
        assert_approx_eq!(r.value, 2., 1e-8);

        let r = Finite::new().integrate(|x| (1. - x).ln(), 0., 1.).unwrap();
        assert_approx_eq!(r.value, -1., 1e-8);
    }

    #[test]
    fn finite_fixed_rule() {
        let q = Finite::new().rule(IntegrationRule::GaussKonrod61);
        let r = q.integrate(|x| 1. / (1e-4 + (x - 0.3) * (x - 0.3)), 0., 1.).unwrap();
        let expected = 100. * ((0.7f64 / 1e-2).atan() + (0.3f64 / 1e-2).atan());
        assert_approx_eq!(r.value, expected, 1e-7 * expected);
    }

    #[test]
    fn finite_reversed_and_empty() {
        let r = Finite::new().integrate(|x| x.cos(), PI / 2., 0.).unwrap();
        assert_approx_eq!(r.value, -1., 1e-12);

        let r = Finite::new().integrate(|x| x.cos(), 1., 1.).unwrap();
        assert_eq!(r.value, 0.);
    }

    #[test]
    fn finite_nonfinite() {
        match Finite::new().integrate(|_| f64::NAN, 0., 1.) {
            Err(QuadError::NonFinite { .. }) => {},
            other => panic!("unexpected: {:?}", other),
        }

        match Finite::new().integrate(|x| x, 0., f64::INFINITY) {
            Err(QuadError::BadInterval { .. }) => {},
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn finite_budget_exhausted() {
        // Far too oscillatory for a single subinterval.
        match Finite::new().limit(1).integrate(|x| (200. * x).sin(), 0., 10.) {
            Err(QuadError::NotConverged { best }) => assert!(best.value.is_finite()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn unattainable_tolerance_is_a_hard_error() {
        match Finite::new().tolerance(1e-20).integrate(|x| x, 0., 1.) {
            Err(QuadError::Gsl { code, .. }) => assert_eq!(code, gsl::GSL_EBADTOL),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn upper_tail_basic() {
        let r = UpperTail::new().integrate(|x| (-x).exp(), 0.).unwrap();
        assert_approx_eq!(r.value, 1., 1e-9);

        let r = UpperTail::new().integrate(|x| 1. / (1. + x * x), 0.).unwrap();
        assert_approx_eq!(r.value, PI / 2., 1e-7);

        let r = UpperTail::new().integrate(|x| (-x).exp(), 2.).unwrap();
        assert_approx_eq!(r.value, (-2f64).exp(), 1e-9);
    }

    #[test]
    fn fourier_sine_decaying() {
        // ∫ e^{-x} sin(ωx) dx = ω / (1 + ω²)
        let q = FourierSine::default().abs_tolerance(1e-10);

        for &omega in &[0.1, 1., 7.5] {
            let r = q.integrate(|x| (-x).exp(), omega).unwrap();
            assert_approx_eq!(r.value, omega / (1. + omega * omega), 1e-8);
        }
    }

    #[test]
    fn fourier_sine_algebraic_decay() {
        // ∫ x sin(ωx) / (x² + k²)² dx = π ω e^{-kω} / 4k
        let q = FourierSine::default().abs_tolerance(1e-10);
        let k: f64 = 0.7;
        let omega = 3.;
        let r = q.integrate(|x| x / ((x * x + k * k) * (x * x + k * k)), omega).unwrap();
        assert_approx_eq!(r.value, PI * omega * (-k * omega).exp() / (4. * k), 1e-8);

        // ∫ x sin(ωx) / (x² + k²) dx = (π/2) e^{-kω}, whose 1/x tail leaves
        // it to the cycle extrapolation.
        let r = q.integrate(|x| x / (x * x + k * k), omega);
        let value = match r {
            Ok(r) => r.value,
            Err(QuadError::NotConverged { best }) => best.value,
            Err(e) => panic!("{}", e),
        };
        assert_approx_eq!(value, FRAC_PI_2 * (-k * omega).exp(), 1e-6);
    }

    #[test]
    fn fourier_sine_reuses_workspaces() {
        let q = FourierSine::new(16);
        assert_eq!(q.pooled(), 0);

        for &omega in &[0.5, 2., 8.] {
            q.integrate(|x| (-x).exp(), omega).unwrap();
        }

        assert_eq!(q.pooled(), 1);
        assert_eq!(q.clone().pooled(), 0);
    }

    #[test]
    fn fourier_sine_rejects_bad_omega() {
        let q = FourierSine::default();
        assert!(q.integrate(|x| (-x).exp(), 0.).is_err());
        assert!(q.integrate(|x| (-x).exp(), -1.).is_err());
    }
}
