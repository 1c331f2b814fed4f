// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

//! Safe-ish wrappers around the GSL QUADPACK routines.
//!
//! The error handler is switched off the first time a workspace is
//! allocated, so failures come back as status codes instead of aborting the
//! process.

use gsl_sys;
use std::f64;
use std::os::raw;
use std::sync::Once;


// These are unnamed enum constants in gsl_errno.h, so we spell them out.
pub const GSL_SUCCESS: raw::c_int = 0;
pub const GSL_EFAILED: raw::c_int = 5;
pub const GSL_ENOMEM: raw::c_int = 8;
pub const GSL_EMAXITER: raw::c_int = 11;
pub const GSL_EBADTOL: raw::c_int = 13;
pub const GSL_ETOL: raw::c_int = 14;
pub const GSL_EROUND: raw::c_int = 18;
pub const GSL_ESING: raw::c_int = 21;
pub const GSL_EDIVERGE: raw::c_int = 22;
pub const GSL_ETABLE: raw::c_int = 26;

/// `GSL_INTEG_SINE` from `enum gsl_integration_qawo_enum`.
const GSL_INTEG_SINE: raw::c_uint = 1;


fn disable_error_handler() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| unsafe {
        gsl_sys::gsl_set_error_handler_off();
    });
}


/// The GSL description of a status code.
pub fn strerror(status: raw::c_int) -> String {
    unsafe {
        let msg = gsl_sys::gsl_strerror(status);

        if msg.is_null() {
            format!("GSL error {}", status)
        } else {
            std::ffi::CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}


#[derive(Debug)]
pub struct IntegrationWorkspace {
    handle: *mut gsl_sys::gsl_integration_workspace,
    limit: usize,
}

// The workspace is plain heap memory owned by this value.
unsafe impl Send for IntegrationWorkspace {}

impl IntegrationWorkspace {
    /// Allocate room for `limit` subintervals. `None` if GSL is out of
    /// memory.
    pub fn new(limit: usize) -> Option<Self> {
        disable_error_handler();
        let limit = limit.max(1);
        let handle = unsafe { gsl_sys::gsl_integration_workspace_alloc(limit) };

        if handle.is_null() {
            None
        } else {
            Some(IntegrationWorkspace { handle, limit })
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Drop for IntegrationWorkspace {
    fn drop(&mut self) {
        unsafe { gsl_sys::gsl_integration_workspace_free(self.handle) }
    }
}


/// Chebyshev moments for sine-weighted integrals, reused across
/// frequencies.
#[derive(Debug)]
pub struct QawoTable {
    handle: *mut gsl_sys::gsl_integration_qawo_table,
}

unsafe impl Send for QawoTable {}

impl QawoTable {
    /// Allocate a sine table with `levels` levels of bisection.
    pub fn sine(levels: usize) -> Option<Self> {
        disable_error_handler();
        let handle = unsafe {
            gsl_sys::gsl_integration_qawo_table_alloc(
                1., 1., GSL_INTEG_SINE as gsl_sys::gsl_integration_qawo_enum, levels.max(1)
            )
        };

        if handle.is_null() {
            None
        } else {
            Some(QawoTable { handle })
        }
    }

    /// Switch the table to angular frequency `omega`.
    fn set_frequency(&mut self, omega: f64) -> raw::c_int {
        unsafe {
            gsl_sys::gsl_integration_qawo_table_set(
                self.handle, omega, 1., GSL_INTEG_SINE as gsl_sys::gsl_integration_qawo_enum
            )
        }
    }
}

impl Drop for QawoTable {
    fn drop(&mut self) {
        unsafe { gsl_sys::gsl_integration_qawo_table_free(self.handle) }
    }
}


/// What GSL handed back. `value` and `abserr` are filled in even when
/// `status` reports a failure.
#[derive(Clone,Copy,Debug,PartialEq)]
pub struct RawOutcome {
    pub value: f64,
    pub abserr: f64,
    pub status: raw::c_int,
}


// This enum is unnamed in GSL so I'm not sure how to get bindgen to pick it up.
/// A fixed Gauss-Kronrod rule for QAG.
#[derive(Clone,Copy,Debug,Eq,PartialEq)]
pub enum IntegrationRule {
    /// 15-point Gauss-Kronrod rule.
    GaussKonrod15 = 1,
    /// 21-point Gauss-Kronrod rule.
    GaussKonrod21 = 2,
    /// 31-point Gauss-Kronrod rule.
    GaussKonrod31 = 3,
    /// 41-point Gauss-Kronrod rule.
    GaussKonrod41 = 4,
    /// 51-point Gauss-Kronrod rule.
    GaussKonrod51 = 5,
    /// 61-point Gauss-Kronrod rule.
    GaussKonrod61 = 6,
}


#[derive(Clone,Copy,Debug,Eq,PartialEq)]
pub enum Integrator {
    QAG,
    QAGS,
    QAGIU,
    QAWF,
}


pub struct IntegrationBuilder<'a, F: 'a> where F: FnMut(f64) -> f64 {
    workspace: &'a mut IntegrationWorkspace,
    oscillation: Option<(&'a mut IntegrationWorkspace, &'a mut QawoTable, f64)>,
    function: F,
    kind: Integrator,
    rule: IntegrationRule,
    lower_bound: f64,
    upper_bound: f64,
    epsabs: f64,
    epsrel: f64,
}


unsafe extern "C" fn rust_integrand<F>(x: f64, ctxt: *mut raw::c_void) -> f64 where F: FnMut(f64) -> f64 {
    let f = &mut *(ctxt as *mut F);
    f(x)
}


impl<'a, F: 'a> IntegrationBuilder<'a, F> where F: FnMut(f64) -> f64 {
    pub fn new(ws: &'a mut IntegrationWorkspace, f: F, kind: Integrator,
               lower: f64, upper: f64) -> IntegrationBuilder<'a, F> {
        IntegrationBuilder {
            workspace: ws,
            oscillation: None,
            function: f,
            kind,
            rule: IntegrationRule::GaussKonrod31,
            lower_bound: lower,
            upper_bound: upper,
            epsabs: 0.,
            epsrel: 0.,
        }
    }

    pub fn tolerance(mut self, epsabs: f64, epsrel: f64) -> Self {
        self.epsabs = epsabs;
        self.epsrel = epsrel;
        self
    }

    pub fn rule(mut self, rule: IntegrationRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn compute(mut self) -> RawOutcome {
        let mut result = f64::NAN;
        let mut abserr = f64::NAN;
        let limit = self.workspace.limit;

        let mut f = gsl_sys::gsl_function_struct {
            function: Some(rust_integrand::<F>),
            params: &mut self.function as *mut F as *mut raw::c_void,
        };

        let status = match self.kind {
            Integrator::QAG => unsafe {
                gsl_sys::gsl_integration_qag(
                    &f,
                    self.lower_bound,
                    self.upper_bound,
                    self.epsabs,
                    self.epsrel,
                    limit,
                    self.rule as raw::c_int,
                    self.workspace.handle,
                    &mut result,
                    &mut abserr
                )
            },
            Integrator::QAGS => unsafe {
                gsl_sys::gsl_integration_qags(
                    &f,
                    self.lower_bound,
                    self.upper_bound,
                    self.epsabs,
                    self.epsrel,
                    limit,
                    self.workspace.handle,
                    &mut result,
                    &mut abserr
                )
            },
            Integrator::QAGIU => unsafe {
                gsl_sys::gsl_integration_qagiu(
                    &mut f,
                    self.lower_bound,
                    self.epsabs,
                    self.epsrel,
                    limit,
                    self.workspace.handle,
                    &mut result,
                    &mut abserr
                )
            },
            Integrator::QAWF => match self.oscillation.take() {
                Some((cycles, table, omega)) => {
                    let status = table.set_frequency(omega);

                    if status != GSL_SUCCESS {
                        status
                    } else {
                        unsafe {
                            gsl_sys::gsl_integration_qawf(
                                &mut f,
                                self.lower_bound,
                                self.epsabs,
                                limit.min(cycles.limit),
                                self.workspace.handle,
                                cycles.handle,
                                table.handle,
                                &mut result,
                                &mut abserr
                            )
                        }
                    }
                },
                None => GSL_EFAILED,
            },
        };

        RawOutcome { value: result, abserr, status }
    }
}


impl IntegrationWorkspace {
    pub fn qag<'a, F>(&'a mut self, f: F, lower_bound: f64, upper_bound: f64) -> IntegrationBuilder<'a, F> where F: FnMut(f64) -> f64 {
        IntegrationBuilder::new(self, f, Integrator::QAG, lower_bound, upper_bound)
    }

    pub fn qags<'a, F>(&'a mut self, f: F, lower_bound: f64, upper_bound: f64) -> IntegrationBuilder<'a, F> where F: FnMut(f64) -> f64 {
        IntegrationBuilder::new(self, f, Integrator::QAGS, lower_bound, upper_bound)
    }

    pub fn qagiu<'a, F>(&'a mut self, f: F, lower_bound: f64) -> IntegrationBuilder<'a, F> where F: FnMut(f64) -> f64 {
        IntegrationBuilder::new(self, f, Integrator::QAGIU, lower_bound, f64::INFINITY)
    }

    /// `∫ f(x) sin(ωx) dx` over `[lower_bound, ∞)`. Only the absolute
    /// tolerance is used.
    pub fn qawf<'a, F>(
        &'a mut self, f: F, lower_bound: f64, omega: f64,
        cycles: &'a mut IntegrationWorkspace, table: &'a mut QawoTable
    ) -> IntegrationBuilder<'a, F> where F: FnMut(f64) -> f64 {
        let mut b = IntegrationBuilder::new(self, f, Integrator::QAWF, lower_bound, f64::INFINITY);
        b.oscillation = Some((cycles, table, omega));
        b
    }
}
