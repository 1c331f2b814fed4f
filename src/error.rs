// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

//! Error types.
//!
//! Everything fallible in this crate funnels into [`Error`]. The quadrature
//! routines have their own [`QuadError`](crate::quad::QuadError), which the
//! analyzer converts according to its
//! [`ConvergencePolicy`](crate::analyzer::ConvergencePolicy).

use thiserror::Error;

use crate::quad::QuadError;

/// A `Result` with this crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// All of the ways that building or evaluating a model can fail.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument lies outside of the range that the model is tabulated
    /// for. There is no extrapolation.
    #[error("{quantity} = {value} lies outside of the valid range [{min}, {max}]")]
    Domain {
        /// What was out of range.
        quantity: &'static str,
        /// The offending value.
        value: f64,
        /// The lower bound (inclusive).
        min: f64,
        /// The upper bound (inclusive).
        max: f64,
    },

    /// An adaptive integration did not reach its target tolerance within its
    /// subinterval budget and the strict convergence policy is active.
    #[error("{stage} integral did not converge: estimate {estimate:e} with relative error {rel_err:e} (tolerance {tolerance:e})")]
    Convergence {
        /// Which integral gave up.
        stage: &'static str,
        /// The best available estimate.
        estimate: f64,
        /// The estimated relative error of `estimate`.
        rel_err: f64,
        /// The tolerance that was requested.
        tolerance: f64,
    },

    /// A quadrature failed outright, for instance because its integrand
    /// stopped being finite. This is never subject to the convergence
    /// policy.
    #[error("{stage} integral failed: {source}")]
    Numerical {
        /// Which integral failed.
        stage: &'static str,
        /// The underlying failure.
        #[source]
        source: QuadError,
    },

    /// A model parameter needed by the active configuration was never set
    /// (it is still `NaN`).
    #[error("required parameter `{0}` is unset or NaN")]
    MissingParameter(&'static str),

    /// A model parameter has a value that the model can't work with.
    #[error("parameter `{name}` = {value} is invalid: {reason}")]
    InvalidParameter {
        /// The name of the parameter.
        name: &'static str,
        /// Its value.
        value: f64,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A flat parameter or variable array had the wrong length.
    #[error("expected {expected} values but got {got}")]
    ParameterCount {
        /// The required length.
        expected: usize,
        /// The length that was supplied.
        got: usize,
    },

    /// The stopping-profile table was malformed.
    #[error("bad stopping-profile table: {0}")]
    Profile(String),

    /// An I/O error while reading a data source or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A CSV-level error while reading a data source or writing output.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn require(name: &'static str, value: f64) -> Result<f64> {
        if value.is_nan() {
            Err(Error::MissingParameter(name))
        } else {
            Ok(value)
        }
    }

    pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<f64> {
        let value = Error::require(name, value)?;

        if value > 0. {
            Ok(value)
        } else {
            Err(Error::InvalidParameter { name, value, reason: "must be positive" })
        }
    }

    pub(crate) fn require_nonnegative(name: &'static str, value: f64) -> Result<f64> {
        let value = Error::require(name, value)?;

        if value >= 0. {
            Ok(value)
        } else {
            Err(Error::InvalidParameter { name, value, reason: "must not be negative" })
        }
    }
}
