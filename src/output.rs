// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

//! Tables of computed rates.
//!
//! One row per `(T, B, E)` point, numbers in scientific notation with ten
//! fractional digits so that plots can be regenerated without loss.

use std::fs::File;
use std::io;
use std::path::Path;

use crate::error::Result;

/// The column headings, in order.
pub const HEADER: [&str; 4] = ["Temperature (K)", "Field (T)", "Energy (keV)", "Rate (1/s)"];

/// Writes rates as CSV.
pub struct RateTableWriter<W: io::Write> {
    inner: csv::Writer<W>,
    rows: usize,
}

impl RateTableWriter<File> {
    /// Create (or truncate) a file and write the header to it.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(File::create(path)?)
    }
}

impl<W: io::Write> RateTableWriter<W> {
    /// Wrap a writer and emit the header.
    pub fn new(writer: W) -> Result<Self> {
        let mut inner = csv::Writer::from_writer(writer);
        inner.write_record(&HEADER)?;
        Ok(RateTableWriter { inner, rows: 0 })
    }

    /// Append one row.
    pub fn write_row(&mut self, temperature: f64, field: f64, energy: f64, rate: f64) -> Result<()> {
        self.inner.write_record(&[
            format!("{:.10e}", temperature),
            format!("{:.10e}", field),
            format!("{:.10e}", energy),
            format!("{:.10e}", rate),
        ])?;
        self.rows += 1;
        Ok(())
    }

    /// The number of rows written so far, not counting the header.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush buffered rows to the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Flush and give back the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.inner.into_inner().map_err(|e| e.into_error().into())
    }
}
