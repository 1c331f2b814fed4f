// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

/*! Implantation-depth distributions.

A stopping profile is tabulated as a set of shape coefficients on a grid of
implantation energies, usually from fits to Monte Carlo (SRIM) range
calculations. Three shapes are understood, chosen from the column headers of
the table:

- a modified beta distribution on `[0, z_max]` (`alpha`, `beta`, `z_max`);
- a mixture of two of them (`alpha_1`, `beta_1`, `z_max_1`, `fraction_1`,
  `alpha_2`, `beta_2`, `z_max_2`);
- the "custom" shape `N yᵅ (1 − y)ᵝ exp(−((z − z_max)/σ)²)`, `y = z/z_max`
  (`alpha`, `beta`, `sigma`, `z_max`, `N`).

Every table also has an `Energy (keV)` column. Other columns, such as fit
uncertainties, are ignored. Depths are in nm.

Coefficients between grid energies are found by nearest-neighbour lookup,
linear interpolation, or monotone piecewise-cubic (PCHIP) interpolation.
Energies outside the grid are an error.

*/

use statrs::function::beta::ln_beta;
use std::collections::HashMap;
use std::f64;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::field::Estimate;
use crate::quad::{Finite, QuadError};


/// How to find shape coefficients between tabulated energies.
#[derive(Copy,Clone,Debug,Eq,Hash,PartialEq)]
pub enum Interpolation {
    /// Use the row with the closest energy (the lower one on ties).
    Nearest,

    /// Piecewise-linear interpolation.
    Linear,

    /// Fritsch-Carlson monotone piecewise-cubic Hermite interpolation.
    Pchip,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::Nearest
    }
}


/// The depth distribution at one implantation energy.
#[derive(Copy,Clone,Debug,PartialEq)]
pub enum ProfileShape {
    /// A beta distribution stretched onto `[0, z_max]`.
    Beta {
        #[allow(missing_docs)] alpha: f64,
        #[allow(missing_docs)] beta: f64,
        #[allow(missing_docs)] z_max: f64,
    },

    /// `fraction_1` of one stretched beta distribution plus the remainder of
    /// another.
    TwoBeta {
        #[allow(missing_docs)] alpha_1: f64,
        #[allow(missing_docs)] beta_1: f64,
        #[allow(missing_docs)] z_max_1: f64,
        #[allow(missing_docs)] fraction_1: f64,
        #[allow(missing_docs)] alpha_2: f64,
        #[allow(missing_docs)] beta_2: f64,
        #[allow(missing_docs)] z_max_2: f64,
    },

    /// `N yᵅ (1 − y)ᵝ exp(−((z − z_max)/σ)²)` with `y = z/z_max`. Not
    /// normalized.
    Custom {
        #[allow(missing_docs)] alpha: f64,
        #[allow(missing_docs)] beta: f64,
        #[allow(missing_docs)] sigma: f64,
        #[allow(missing_docs)] z_max: f64,
        #[allow(missing_docs)] norm: f64,
    },
}


fn modified_beta(z: f64, alpha: f64, beta: f64, z_max: f64) -> f64 {
    if z <= 0. || z >= z_max {
        return 0.;
    }

    let y = z / z_max;
    let w = (z_max - z) / z_max;
    ((alpha - 1.) * y.ln() + (beta - 1.) * w.ln() - ln_beta(alpha, beta)).exp() / z_max
}


impl ProfileShape {
    /// The (possibly unnormalized) density at depth `z`. Exactly zero outside
    /// of the support.
    pub fn density(&self, z: f64) -> f64 {
        match *self {
            ProfileShape::Beta { alpha, beta, z_max } => modified_beta(z, alpha, beta, z_max),

            ProfileShape::TwoBeta { alpha_1, beta_1, z_max_1, fraction_1, alpha_2, beta_2, z_max_2 } =>
                fraction_1 * modified_beta(z, alpha_1, beta_1, z_max_1)
                + (1. - fraction_1) * modified_beta(z, alpha_2, beta_2, z_max_2),

            ProfileShape::Custom { alpha, beta, sigma, z_max, norm } => {
                if z <= 0. || z >= z_max {
                    return 0.;
                }

                let y = z / z_max;
                let w = (z_max - z) / z_max;
                let g = (z - z_max) / sigma;
                norm * y.powf(alpha) * w.powf(beta) * (-g * g).exp()
            },
        }
    }

    /// The deepest depth at which the density may be nonzero.
    pub fn z_max(&self) -> f64 {
        match *self {
            ProfileShape::Beta { z_max, .. } | ProfileShape::Custom { z_max, .. } => z_max,
            ProfileShape::TwoBeta { z_max_1, z_max_2, .. } => z_max_1.max(z_max_2),
        }
    }

    /// Depths strictly inside the support where the density is not smooth.
    pub fn breakpoints(&self) -> Vec<f64> {
        match *self {
            ProfileShape::TwoBeta { z_max_1, z_max_2, .. } if z_max_1 != z_max_2 =>
                vec![z_max_1.min(z_max_2)],
            _ => Vec::new(),
        }
    }

    /// The mean depth, when it has a closed form.
    pub fn closed_form_mean(&self) -> Option<f64> {
        match *self {
            ProfileShape::Beta { alpha, beta, z_max } => Some(z_max * alpha / (alpha + beta)),

            ProfileShape::TwoBeta { alpha_1, beta_1, z_max_1, fraction_1, alpha_2, beta_2, z_max_2 } =>
                Some(fraction_1 * z_max_1 * alpha_1 / (alpha_1 + beta_1)
                     + (1. - fraction_1) * z_max_2 * alpha_2 / (alpha_2 + beta_2)),

            ProfileShape::Custom { .. } => None,
        }
    }

    fn kind(&self) -> ShapeKind {
        match *self {
            ProfileShape::Beta { .. } => ShapeKind::Beta,
            ProfileShape::TwoBeta { .. } => ShapeKind::TwoBeta,
            ProfileShape::Custom { .. } => ShapeKind::Custom,
        }
    }

    fn coefficients(&self) -> Vec<f64> {
        match *self {
            ProfileShape::Beta { alpha, beta, z_max } => vec![alpha, beta, z_max],
            ProfileShape::TwoBeta { alpha_1, beta_1, z_max_1, fraction_1, alpha_2, beta_2, z_max_2 } =>
                vec![alpha_1, beta_1, z_max_1, fraction_1, alpha_2, beta_2, z_max_2],
            ProfileShape::Custom { alpha, beta, sigma, z_max, norm } => vec![alpha, beta, sigma, z_max, norm],
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let positive = |name: &str, v: f64| {
            if v > 0. && v.is_finite() {
                Ok(())
            } else {
                Err(format!("{} must be positive and finite (got {})", name, v))
            }
        };

        match *self {
            ProfileShape::Beta { alpha, beta, z_max } => {
                positive("alpha", alpha)?;
                positive("beta", beta)?;
                positive("z_max", z_max)
            },

            ProfileShape::TwoBeta { alpha_1, beta_1, z_max_1, fraction_1, alpha_2, beta_2, z_max_2 } => {
                positive("alpha_1", alpha_1)?;
                positive("beta_1", beta_1)?;
                positive("z_max_1", z_max_1)?;
                positive("alpha_2", alpha_2)?;
                positive("beta_2", beta_2)?;
                positive("z_max_2", z_max_2)?;

                if (0. ..=1.).contains(&fraction_1) {
                    Ok(())
                } else {
                    Err(format!("fraction_1 must lie in [0, 1] (got {})", fraction_1))
                }
            },

            ProfileShape::Custom { alpha, beta, sigma, z_max, norm } => {
                positive("sigma", sigma)?;
                positive("z_max", z_max)?;
                positive("N", norm)?;

                if alpha > -1. && beta > -1. {
                    Ok(())
                } else {
                    Err(format!("alpha and beta must exceed -1 (got {} and {})", alpha, beta))
                }
            },
        }
    }
}


#[derive(Copy,Clone,Debug,Eq,Hash,PartialEq)]
enum ShapeKind {
    Beta,
    TwoBeta,
    Custom,
}

impl ShapeKind {
    fn columns(&self) -> &'static [&'static str] {
        match *self {
            ShapeKind::Beta => &["alpha", "beta", "z_max"],
            ShapeKind::TwoBeta => &["alpha_1", "beta_1", "z_max_1", "fraction_1", "alpha_2", "beta_2", "z_max_2"],
            ShapeKind::Custom => &["alpha", "beta", "sigma", "z_max", "N"],
        }
    }

    fn shape(&self, c: &[f64]) -> ProfileShape {
        match *self {
            ShapeKind::Beta => ProfileShape::Beta { alpha: c[0], beta: c[1], z_max: c[2] },
            ShapeKind::TwoBeta => ProfileShape::TwoBeta {
                alpha_1: c[0], beta_1: c[1], z_max_1: c[2], fraction_1: c[3],
                alpha_2: c[4], beta_2: c[5], z_max_2: c[6],
            },
            ShapeKind::Custom => ProfileShape::Custom {
                alpha: c[0], beta: c[1], sigma: c[2], z_max: c[3], norm: c[4],
            },
        }
    }
}


/// One row of a stopping-profile table.
#[derive(Copy,Clone,Debug,PartialEq)]
pub struct ProfileRow {
    /// Implantation energy in keV.
    pub energy: f64,

    /// The depth distribution at that energy.
    pub shape: ProfileShape,
}


/// Fritsch-Carlson derivative estimates for monotone cubic interpolation.
fn pchip_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();

    if n < 2 {
        return vec![0.; n];
    }

    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let delta: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / h[k]).collect();

    if n == 2 {
        return vec![delta[0], delta[0]];
    }

    let mut d = vec![0.; n];

    for k in 1..n - 1 {
        if delta[k - 1] * delta[k] > 0. {
            let w1 = 2. * h[k] + h[k - 1];
            let w2 = h[k] + 2. * h[k - 1];
            d[k] = (w1 + w2) / (w1 / delta[k - 1] + w2 / delta[k]);
        }
    }

    let edge = |h0: f64, h1: f64, d0: f64, d1: f64| {
        let d = ((2. * h0 + h1) * d0 - h0 * d1) / (h0 + h1);

        if d.signum() != d0.signum() || d0 == 0. {
            0.
        } else if d0.signum() != d1.signum() && d.abs() > 3. * d0.abs() {
            3. * d0
        } else {
            d
        }
    };

    d[0] = edge(h[0], h[1], delta[0], delta[1]);
    d[n - 1] = edge(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
    d
}


/// A tabulated stopping profile.
///
/// Immutable after construction apart from a cache of normalization
/// integrals, so it can be shared between threads.
#[derive(Debug)]
pub struct StoppingProfile {
    kind: ShapeKind,
    energies: Vec<f64>,
    coefficients: Vec<Vec<f64>>,
    slopes: Vec<Vec<f64>>,
    interpolation: Interpolation,
    quad: Finite,
    normalizations: Mutex<HashMap<u64, Estimate>>,
    cache_capacity: usize,
}

impl StoppingProfile {
    /// Load a CSV table from a file.
    pub fn from_path<P: AsRef<Path>>(path: P, interpolation: Interpolation) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file, interpolation)
    }

    /// Load a CSV table from a stream.
    pub fn from_reader<R: io::Read>(reader: R, interpolation: Interpolation) -> Result<Self> {
        const ENERGY: &str = "Energy (keV)";

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let header_map: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h, i)).collect();

        let has = |names: &[&str]| names.iter().all(|n| header_map.contains_key(n));

        let energy_col = *header_map.get(ENERGY)
            .ok_or_else(|| Error::Profile(format!("missing column `{}`", ENERGY)))?;

        let kind = [ShapeKind::TwoBeta, ShapeKind::Custom, ShapeKind::Beta]
            .iter()
            .cloned()
            .find(|k| has(k.columns()))
            .ok_or_else(|| Error::Profile(
                "no recognized set of shape columns (expected alpha/beta/z_max, \
                 alpha/beta/sigma/z_max/N, or alpha_1/beta_1/z_max_1/fraction_1/alpha_2/beta_2/z_max_2)".to_owned()
            ))?;

        let shape_cols: Vec<usize> = kind.columns().iter().map(|n| header_map[n]).collect();

        let parse = |record: &csv::StringRecord, col: usize, line: usize| -> Result<f64> {
            let text = record.get(col).unwrap_or("");
            text.parse::<f64>().map_err(|_| Error::Profile(format!(
                "line {}, column `{}`: cannot parse `{}` as a number", line, &headers[col], text
            )))
        };

        let mut rows = Vec::new();

        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            let line = idx + 2;
            let energy = parse(&record, energy_col, line)?;
            let coeffs = shape_cols.iter()
                .map(|&c| parse(&record, c, line))
                .collect::<Result<Vec<f64>>>()?;
            rows.push(ProfileRow { energy, shape: kind.shape(&coeffs) });
        }

        Self::from_rows(rows, interpolation)
    }

    /// Build a profile from rows in memory. The rows needn't be sorted, but
    /// they must all have the same kind of shape and distinct energies.
    pub fn from_rows(mut rows: Vec<ProfileRow>, interpolation: Interpolation) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::Profile("the table has no rows".to_owned()));
        }

        let kind = rows[0].shape.kind();

        for row in &rows {
            if !row.energy.is_finite() {
                return Err(Error::Profile(format!("non-finite energy {}", row.energy)));
            }

            if row.shape.kind() != kind {
                return Err(Error::Profile("rows mix different kinds of shape".to_owned()));
            }

            row.shape.validate()
                .map_err(|msg| Error::Profile(format!("at {} keV: {}", row.energy, msg)))?;
        }

        rows.sort_by(|a, b| a.energy.total_cmp(&b.energy));

        for pair in rows.windows(2) {
            if pair[0].energy == pair[1].energy {
                return Err(Error::Profile(format!("energy {} keV appears twice", pair[0].energy)));
            }
        }

        let energies: Vec<f64> = rows.iter().map(|r| r.energy).collect();
        let per_row: Vec<Vec<f64>> = rows.iter().map(|r| r.shape.coefficients()).collect();
        let coefficients: Vec<Vec<f64>> = (0..kind.columns().len())
            .map(|i| per_row.iter().map(|c| c[i]).collect())
            .collect();

        let slopes = match interpolation {
            Interpolation::Pchip => coefficients.iter().map(|y| pchip_slopes(&energies, y)).collect(),
            _ => Vec::new(),
        };

        Ok(StoppingProfile {
            kind,
            energies,
            coefficients,
            slopes,
            interpolation,
            quad: Finite::new().tolerance(1e-10),
            normalizations: Mutex::new(HashMap::new()),
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
        })
    }

    /// The default number of normalizations remembered.
    pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

    /// Change the quadrature used for normalization integrals.
    pub fn quadrature(mut self, quad: Finite) -> Self {
        self.quad = quad;
        self
    }

    /// Change how many normalizations are remembered. The cache is emptied
    /// when it fills up.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity.max(1);
        self
    }

    /// The number of normalizations currently cached.
    pub fn cached_normalizations(&self) -> usize {
        self.normalizations.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The relative tolerance of the depth integrals over the profile.
    pub fn tolerance(&self) -> f64 {
        self.quad.get_tolerance()
    }

    /// The interpolation policy.
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// The tabulated energies, in ascending order.
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// The inclusive range of energies that can be evaluated.
    pub fn energy_range(&self) -> (f64, f64) {
        (self.energies[0], self.energies[self.energies.len() - 1])
    }

    fn check_energy(&self, energy: f64) -> Result<()> {
        let (min, max) = self.energy_range();

        if energy >= min && energy <= max {
            Ok(())
        } else {
            Err(Error::Domain { quantity: "implantation energy (keV)", value: energy, min, max })
        }
    }

    /// The index of the grid interval containing `energy`, which must be in
    /// range.
    fn interval(&self, energy: f64) -> usize {
        let n = self.energies.len();
        let k = self.energies.partition_point(|&e| e <= energy);
        k.saturating_sub(1).min(n.saturating_sub(2))
    }

    fn coefficient(&self, i: usize, energy: f64) -> f64 {
        let x = &self.energies;
        let y = &self.coefficients[i];

        if x.len() == 1 {
            return y[0];
        }

        let k = self.interval(energy);
        let h = x[k + 1] - x[k];
        let t = (energy - x[k]) / h;

        match self.interpolation {
            Interpolation::Nearest => if t <= 0.5 { y[k] } else { y[k + 1] },

            Interpolation::Linear => y[k] + t * (y[k + 1] - y[k]),

            Interpolation::Pchip => {
                let d = &self.slopes[i];
                let t2 = t * t;
                let t3 = t2 * t;
                (2. * t3 - 3. * t2 + 1.) * y[k]
                    + (t3 - 2. * t2 + t) * h * d[k]
                    + (-2. * t3 + 3. * t2) * y[k + 1]
                    + (t3 - t2) * h * d[k + 1]
            },
        }
    }

    /// The shape coefficients at `energy` (keV).
    pub fn shape_at(&self, energy: f64) -> Result<ProfileShape> {
        self.check_energy(energy)?;
        let c: Vec<f64> = (0..self.coefficients.len()).map(|i| self.coefficient(i, energy)).collect();
        Ok(self.kind.shape(&c))
    }

    /// The depth of the end of the support at `energy`.
    pub fn z_max(&self, energy: f64) -> Result<f64> {
        Ok(self.shape_at(energy)?.z_max())
    }

    /// The unnormalized density at depth `z` for implantation energy
    /// `energy`.
    pub fn density(&self, z: f64, energy: f64) -> Result<f64> {
        Ok(self.shape_at(energy)?.density(z))
    }

    fn integrate(&self, shape: &ProfileShape, weight: impl Fn(f64) -> f64) -> std::result::Result<Estimate, QuadError> {
        let mut edges = vec![0.];
        edges.extend(shape.breakpoints());
        edges.push(shape.z_max());

        let mut value = 0.;
        let mut abserr = 0.;
        let mut converged = true;

        for w in edges.windows(2) {
            let r = match self.quad.integrate(|z| weight(z) * shape.density(z), w[0], w[1]) {
                Ok(r) => r,
                Err(QuadError::NotConverged { best }) => {
                    converged = false;
                    best
                },
                Err(e) => return Err(e),
            };

            value += r.value;
            abserr += r.abserr;
        }

        let rel_err = if abserr == 0. { 0. } else { abserr / value.abs() };
        Ok(Estimate { value, rel_err, converged })
    }

    /// `∫ density(z) dz` over the support at `energy`, with its error
    /// estimate. Computed once per distinct energy and then cached.
    pub fn normalization_with_error(&self, energy: f64) -> Result<Estimate> {
        let shape = self.shape_at(energy)?;
        let key = energy.to_bits();

        if let Some(est) = self.normalizations.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Ok(*est);
        }

        let est = self.integrate(&shape, |_| 1.)
            .map_err(|e| Error::Numerical { stage: "normalization", source: e })?;

        if !(est.value > 0. && est.value.is_finite()) {
            return Err(Error::Profile(format!(
                "profile at {} keV does not have a positive finite integral ({})", energy, est.value
            )));
        }

        let mut cache = self.normalizations.lock().unwrap_or_else(|e| e.into_inner());

        if cache.len() >= self.cache_capacity {
            cache.clear();
        }

        cache.insert(key, est);

        Ok(est)
    }

    /// `∫ density(z) dz` over the support at `energy`.
    ///
    /// Fails with [`Error::Convergence`] if the integral missed its tolerance;
    /// use [`normalization_with_error`](Self::normalization_with_error) to
    /// get the estimate regardless.
    pub fn normalization(&self, energy: f64) -> Result<f64> {
        let est = self.normalization_with_error(energy)?;

        if est.converged {
            Ok(est.value)
        } else {
            Err(Error::Convergence {
                stage: "normalization",
                estimate: est.value,
                rel_err: est.rel_err,
                tolerance: self.quad.get_tolerance(),
            })
        }
    }

    /// The mean implantation depth at `energy`.
    pub fn mean_depth(&self, energy: f64) -> Result<f64> {
        let shape = self.shape_at(energy)?;

        if let Some(mean) = shape.closed_form_mean() {
            return Ok(mean);
        }

        let first = self.integrate(&shape, |z| z)
            .map_err(|e| Error::Numerical { stage: "mean depth", source: e })?;
        let norm = self.normalization_with_error(energy)?;
        Ok(first.value / norm.value)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn two_beta(energy: f64, scale: f64) -> ProfileRow {
        ProfileRow {
            energy,
            shape: ProfileShape::TwoBeta {
                alpha_1: 1.8 + 0.02 * energy,
                beta_1: 3.2,
                z_max_1: 12. * scale,
                fraction_1: 0.85,
                alpha_2: 1.4,
                beta_2: 0.9,
                z_max_2: 15. * scale,
            },
        }
    }

    fn table(interpolation: Interpolation) -> StoppingProfile {
        let rows = (1..=10).map(|i| two_beta(2. * i as f64, i as f64)).collect();
        StoppingProfile::from_rows(rows, interpolation).unwrap()
    }

    #[test]
    fn density_vanishes_outside_support() {
        let p = table(Interpolation::Nearest);
        let zmax = p.z_max(10.).unwrap();
        assert_eq!(zmax, 75.);
        assert_eq!(p.density(-1., 10.).unwrap(), 0.);
        assert_eq!(p.density(0., 10.).unwrap(), 0.);
        assert_eq!(p.density(zmax, 10.).unwrap(), 0.);
        assert_eq!(p.density(zmax + 1., 10.).unwrap(), 0.);
        assert!(p.density(20., 10.).unwrap() > 0.);
    }

    #[test]
    fn beta_mixtures_are_normalized() {
        for &interp in &[Interpolation::Nearest, Interpolation::Linear, Interpolation::Pchip] {
            let p = table(interp);

            for &e in &[2., 3.3, 11., 20.] {
                assert_approx_eq!(p.normalization(e).unwrap(), 1., 1e-8);
            }
        }
    }

    #[test]
    fn singular_beta_is_normalized() {
        let rows = vec![
            ProfileRow { energy: 1., shape: ProfileShape::Beta { alpha: 0.5, beta: 0.7, z_max: 10. } },
            ProfileRow { energy: 2., shape: ProfileShape::Beta { alpha: 0.6, beta: 0.8, z_max: 20. } },
        ];
        let p = StoppingProfile::from_rows(rows, Interpolation::Linear).unwrap();
        assert_approx_eq!(p.normalization(1.5).unwrap(), 1., 1e-7);
    }

    #[test]
    fn custom_shape_normalization_is_cached() {
        let shape = ProfileShape::Custom { alpha: 1.5, beta: 2., sigma: 30., z_max: 50., norm: 3. };
        let p = StoppingProfile::from_rows(vec![ProfileRow { energy: 5., shape }], Interpolation::Nearest).unwrap();

        let n1 = p.normalization(5.).unwrap();
        assert!(n1 > 0.);
        assert_eq!(p.normalization(5.).unwrap(), n1);
        assert_eq!(p.cached_normalizations(), 1);

        // mean from quadrature should sit inside the support
        let mean = p.mean_depth(5.).unwrap();
        assert!(mean > 0. && mean < 50.);
    }

    #[test]
    fn normalization_cache_is_bounded() {
        let p = table(Interpolation::Linear).cache_capacity(16);

        for i in 0..100 {
            let e = 2. + 0.15 * i as f64;
            assert_approx_eq!(p.normalization(e).unwrap(), 1., 1e-8);
            assert!(p.cached_normalizations() <= 16);
        }

        assert!(p.cached_normalizations() >= 1);
    }

    #[test]
    fn energy_bounds_are_inclusive() {
        let p = table(Interpolation::Pchip);
        assert_eq!(p.energy_range(), (2., 20.));
        assert!(p.shape_at(2.).is_ok());
        assert!(p.shape_at(20.).is_ok());

        for &e in &[1., 21., f64::NAN] {
            match p.shape_at(e) {
                Err(Error::Domain { min, max, .. }) => {
                    assert_eq!(min, 2.);
                    assert_eq!(max, 20.);
                },
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn nearest_and_linear_lookup() {
        let p = table(Interpolation::Nearest);
        assert_eq!(p.z_max(4.9).unwrap(), 30.);
        assert_eq!(p.z_max(5.1).unwrap(), 45.);

        let p = table(Interpolation::Linear);
        assert_approx_eq!(p.z_max(5.).unwrap(), 37.5, 1e-12);
    }

    #[test]
    fn pchip_hits_nodes_and_stays_monotone() {
        let p = table(Interpolation::Pchip);

        for i in 1..=10 {
            assert_approx_eq!(p.z_max(2. * i as f64).unwrap(), 15. * i as f64, 1e-12);
        }

        let mut prev = 0.;

        for i in 0..=180 {
            let z = p.z_max(2. + 0.1 * i as f64).unwrap();
            assert!(z >= prev);
            prev = z;
        }
    }

    #[test]
    fn pchip_flat_where_data_turns() {
        let x = [0., 1., 2., 3.];
        let y = [0., 1., 1., 0.];
        let d = pchip_slopes(&x, &y);
        assert_eq!(d[1], 0.);
        assert_eq!(d[2], 0.);
    }

    #[test]
    fn mean_depth_closed_form() {
        let p = table(Interpolation::Nearest);
        let mean = p.mean_depth(4.).unwrap();
        let expected = 0.85 * 24. * 1.88 / (1.88 + 3.2) + 0.15 * 30. * 1.4 / (1.4 + 0.9);
        assert_approx_eq!(mean, expected, 1e-12);
    }

    const CSV: &str = "\
Energy (keV),alpha_1,alpha_1_error,beta_1,beta_1_error,z_max_1,z_max_1_error,fraction_1,fraction_1_error,alpha_2,alpha_2_error,beta_2,beta_2_error,z_max_2,z_max_2_error
2.0,1.9,0.1,3.1,0.1,24.0,1.0,0.8,0.01,1.3,0.1,1.0,0.1,30.0,1.0
1.0, 1.8,0.1,3.0,0.1,12.0,1.0,0.8,0.01,1.2,0.1,1.0,0.1,15.0,1.0
";

    #[test]
    fn csv_two_beta() {
        let p = StoppingProfile::from_reader(CSV.as_bytes(), Interpolation::Nearest).unwrap();
        assert_eq!(p.energies(), &[1., 2.]);

        match p.shape_at(1.).unwrap() {
            ProfileShape::TwoBeta { alpha_1, z_max_2, .. } => {
                assert_eq!(alpha_1, 1.8);
                assert_eq!(z_max_2, 15.);
            },
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn csv_single_beta() {
        let text = "Energy (keV),alpha,beta,z_max\n1,2,3,10\n5,2.5,3,40\n";
        let p = StoppingProfile::from_reader(text.as_bytes(), Interpolation::Linear).unwrap();
        assert_approx_eq!(p.z_max(3.).unwrap(), 25., 1e-12);
    }

    #[test]
    fn csv_errors() {
        let missing = "Energy (keV),alpha,z_max\n1,2,10\n";
        assert!(matches!(StoppingProfile::from_reader(missing.as_bytes(), Interpolation::Nearest),
                         Err(Error::Profile(_))));

        let garbled = "Energy (keV),alpha,beta,z_max\n1,2,x,10\n";
        assert!(matches!(StoppingProfile::from_reader(garbled.as_bytes(), Interpolation::Nearest),
                         Err(Error::Profile(_))));

        let duplicate = "Energy (keV),alpha,beta,z_max\n1,2,3,10\n1,2,3,10\n";
        assert!(matches!(StoppingProfile::from_reader(duplicate.as_bytes(), Interpolation::Nearest),
                         Err(Error::Profile(_))));

        let invalid = "Energy (keV),alpha,beta,z_max\n1,-2,3,10\n";
        assert!(matches!(StoppingProfile::from_reader(invalid.as_bytes(), Interpolation::Nearest),
                         Err(Error::Profile(_))));

        let empty = "Energy (keV),alpha,beta,z_max\n";
        assert!(matches!(StoppingProfile::from_reader(empty.as_bytes(), Interpolation::Nearest),
                         Err(Error::Profile(_))));
    }
}
