// Copyright 2017-2018 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the GPL version 3.

/*! The depth-resolved SLR model.

[`DepthResolvedAnalyzer`] averages the local relaxation rate over the
implantation profile:

```text
⟨1/T₁⟩(E) = ∫ rate(z) ρ(z; E) dz / ∫ ρ(z; E) dz
```

where `rate(z)` needs the screened field at each depth (one wavevector
integral per depth for the nonlocal models) and `ρ` is the stopping profile
at implantation energy `E`. The depth integral is split wherever the
integrand is not smooth: at the bottom of the surface dead layer and at the
end of the shallower component of a two-beta profile.

Model parameters come in per call as an immutable [`SlrParameters`], so a
single analyzer can be shared by any number of threads. Fitting frameworks
that want a flat `f(x, par)` get one through
[`DepthResolvedAnalyzer::fit_function`], with the parameter order given by
[`ParameterLayout`].

*/

use slog::Logger;
use std::collections::HashMap;
use std::f64;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::{Error, Result};
use crate::field::{Estimate, FieldModel, FieldPenetration, Geometry};
use crate::quad::{Finite, IntegrationRule, QuadError, UpperTail};
use crate::relaxation::{hebel_slichter, LocalRelaxationRate, SurfaceLayer};
use crate::stopping::{Interpolation, StoppingProfile};
use crate::superconductivity;
use crate::{Nucleus, LITHIUM_8, NIOBIUM_93};


/// The model parameters for one evaluation.
///
/// Temperatures are in K, fields in T, lengths in nm, the gap in meV and
/// rates in s⁻¹. Fields that the active configuration doesn't need may be
/// left unset (`NaN`, the default); fields that it does need are checked
/// and reported by name.
#[derive(Copy,Clone,Debug,PartialEq)]
pub struct SlrParameters {
    /// Sample temperature.
    pub temperature: f64,
    /// Zero-field critical temperature.
    pub critical_temperature: f64,
    /// Zero-temperature superconducting gap. Needed by the Pippard model and
    /// the Hebel-Slichter correction.
    pub gap: f64,
    /// Pippard coherence length ξ₀.
    pub coherence_length: f64,
    /// Electron mean free path ℓ.
    pub mean_free_path: f64,
    /// Zero-temperature London penetration depth λ₀.
    pub lambda_0: f64,
    /// Two-fluid exponent of the penetration depth.
    pub exponent: f64,
    /// Applied field.
    pub applied_field: f64,
    /// Fluctuating dipolar field of the host nuclei.
    pub dipole_field: f64,
    /// Correlation rate ν_c of the dipolar field.
    pub correlation_rate: f64,
    /// Prefactor `c` of the normal-state rate `c Tᵐ`.
    pub slr_constant: f64,
    /// Exponent `m` of the normal-state rate.
    pub slr_exponent: f64,
    /// Thickness of the non-superconducting surface layer.
    pub surface_thickness: f64,
    /// SLR rate inside the surface layer.
    pub surface_rate: f64,
    /// Dynes broadening in units of the gap. Enables the Hebel-Slichter
    /// correction when set and positive.
    pub electron_phonon_coupling: f64,
}

impl Default for SlrParameters {
    fn default() -> Self {
        SlrParameters {
            temperature: f64::NAN,
            critical_temperature: f64::NAN,
            gap: f64::NAN,
            coherence_length: f64::NAN,
            mean_free_path: f64::NAN,
            lambda_0: f64::NAN,
            exponent: f64::NAN,
            applied_field: f64::NAN,
            dipole_field: f64::NAN,
            correlation_rate: f64::NAN,
            slr_constant: f64::NAN,
            slr_exponent: f64::NAN,
            surface_thickness: f64::NAN,
            surface_rate: f64::NAN,
            electron_phonon_coupling: f64::NAN,
        }
    }
}


/// The order of the flat parameter array accepted by
/// [`DepthResolvedAnalyzer::fit_function`].
///
/// The independent variables are always `x = [temperature, applied_field,
/// energy]`.
#[derive(Copy,Clone,Debug,Eq,Hash,PartialEq)]
pub enum ParameterLayout {
    /// Nine parameters, for the local model.
    Local,

    /// Thirteen parameters, for the nonlocal models.
    Nonlocal,
}

impl ParameterLayout {
    const LOCAL: [&'static str; 9] = [
        "critical_temperature",
        "lambda_0",
        "exponent",
        "dipole_field",
        "correlation_rate",
        "slr_constant",
        "slr_exponent",
        "surface_thickness",
        "surface_rate",
    ];

    const NONLOCAL: [&'static str; 13] = [
        "critical_temperature",
        "gap",
        "coherence_length",
        "mean_free_path",
        "lambda_0",
        "exponent",
        "dipole_field",
        "correlation_rate",
        "slr_constant",
        "slr_exponent",
        "surface_thickness",
        "surface_rate",
        "electron_phonon_coupling",
    ];

    /// The layout that goes with a field model.
    pub fn for_model(model: FieldModel) -> Self {
        if model.is_nonlocal() {
            ParameterLayout::Nonlocal
        } else {
            ParameterLayout::Local
        }
    }

    /// The parameter names, in order.
    pub fn names(&self) -> &'static [&'static str] {
        match *self {
            ParameterLayout::Local => &Self::LOCAL,
            ParameterLayout::Nonlocal => &Self::NONLOCAL,
        }
    }

    /// The number of parameters.
    pub fn len(&self) -> usize {
        self.names().len()
    }

    /// Unpack flat arrays into parameters and an implantation energy.
    pub fn to_parameters(&self, x: &[f64], par: &[f64]) -> Result<(SlrParameters, f64)> {
        if x.len() != 3 {
            return Err(Error::ParameterCount { expected: 3, got: x.len() });
        }

        if par.len() != self.len() {
            return Err(Error::ParameterCount { expected: self.len(), got: par.len() });
        }

        let mut p = SlrParameters {
            temperature: x[0],
            applied_field: x[1],
            ..SlrParameters::default()
        };

        for (name, &value) in self.names().iter().zip(par) {
            let slot = match *name {
                "critical_temperature" => &mut p.critical_temperature,
                "gap" => &mut p.gap,
                "coherence_length" => &mut p.coherence_length,
                "mean_free_path" => &mut p.mean_free_path,
                "lambda_0" => &mut p.lambda_0,
                "exponent" => &mut p.exponent,
                "dipole_field" => &mut p.dipole_field,
                "correlation_rate" => &mut p.correlation_rate,
                "slr_constant" => &mut p.slr_constant,
                "slr_exponent" => &mut p.slr_exponent,
                "surface_thickness" => &mut p.surface_thickness,
                "surface_rate" => &mut p.surface_rate,
                "electron_phonon_coupling" => &mut p.electron_phonon_coupling,
                _ => return Err(Error::InvalidParameter {
                    name: *name,
                    value,
                    reason: "not a model parameter",
                }),
            };
            *slot = value;
        }

        Ok((p, x[2]))
    }
}


/// What to do when an integral exhausts its subinterval budget.
#[derive(Copy,Clone,Debug,Eq,Hash,PartialEq)]
pub enum ConvergencePolicy {
    /// Log a warning and carry on with the best estimate.
    Lenient,

    /// Fail with [`Error::Convergence`].
    Strict,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        ConvergencePolicy::Lenient
    }
}


/// Static configuration of a [`DepthResolvedAnalyzer`].
#[derive(Copy,Clone,Debug,PartialEq)]
pub struct AnalyzerConfig {
    /// The screening model.
    pub model: FieldModel,
    /// The treatment of the surface dead layer.
    pub surface: SurfaceLayer,
    /// The sample geometry.
    pub geometry: Geometry,
    /// How stopping-profile coefficients are interpolated in energy. Used
    /// when the analyzer loads its own profile.
    pub interpolation: Interpolation,
    /// What to do about unconverged integrals.
    pub policy: ConvergencePolicy,
    /// Relative tolerance of the depth and Hebel-Slichter integrals.
    pub tolerance: f64,
    /// Relative tolerance of the field profile. It is enforced in absolute
    /// terms at a thousandth of the applied field, below which the profile
    /// is only needed to that absolute accuracy.
    pub field_tolerance: f64,
    /// Maximum number of subintervals of each depth and Hebel-Slichter
    /// integral.
    pub max_subintervals: usize,
    /// Bisection depth of the QAWO moment tables of the wavevector integral.
    pub fourier_levels: usize,
    /// How many Hebel-Slichter ratios to remember before starting over.
    pub cache_capacity: usize,
    /// Upper critical field (T) used to suppress `T_c` in an applied field.
    pub upper_critical_field: f64,
    /// The implanted probe nucleus.
    pub probe: Nucleus,
    /// The host nucleus responsible for dipolar relaxation.
    pub host: Nucleus,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            model: FieldModel::Local,
            surface: SurfaceLayer::Independent,
            geometry: Geometry::SemiInfinite,
            interpolation: Interpolation::Nearest,
            policy: ConvergencePolicy::Lenient,
            tolerance: 1e-8,
            field_tolerance: f64::EPSILON.sqrt(),
            max_subintervals: 200,
            fourier_levels: 32,
            cache_capacity: 4096,
            upper_critical_field: 0.425,
            probe: LITHIUM_8,
            host: NIOBIUM_93,
        }
    }
}

impl AnalyzerConfig {
    /// The default configuration with a given screening model.
    pub fn new(model: FieldModel) -> Self {
        AnalyzerConfig { model, ..Self::default() }
    }

    /// Set the treatment of the surface dead layer.
    pub fn with_surface(mut self, surface: SurfaceLayer) -> Self {
        self.surface = surface;
        self
    }

    /// Set the sample geometry.
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Set the stopping-profile interpolation policy.
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Set the convergence policy.
    pub fn with_policy(mut self, policy: ConvergencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the tolerances of the depth and wavevector integrals.
    pub fn with_tolerances(mut self, tolerance: f64, field_tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self.field_tolerance = field_tolerance;
        self
    }

    /// Set the subinterval budget of the depth and Hebel-Slichter integrals
    /// and the moment-table depth of the wavevector integral.
    pub fn with_budgets(mut self, max_subintervals: usize, fourier_levels: usize) -> Self {
        self.max_subintervals = max_subintervals;
        self.fourier_levels = fourier_levels;
        self
    }

    /// Set how many Hebel-Slichter ratios are memoized.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the upper critical field.
    pub fn with_upper_critical_field(mut self, b_c2: f64) -> Self {
        self.upper_critical_field = b_c2;
        self
    }

    /// Set the probe and host nuclei.
    pub fn with_nuclei(mut self, probe: Nucleus, host: Nucleus) -> Self {
        self.probe = probe;
        self.host = host;
        self
    }
}


/// Computes depth-averaged SLR rates for one stopping profile.
///
/// Evaluation takes `&self`; the only interior state is a bounded memo of
/// Hebel-Slichter ratios, the profile's cache of normalizations, and the pool
/// of GSL workspaces of the wavevector integral, all behind mutexes.
#[derive(Debug)]
pub struct DepthResolvedAnalyzer {
    profile: Arc<StoppingProfile>,
    config: AnalyzerConfig,
    field: FieldPenetration,
    relaxation: LocalRelaxationRate,
    depth_quad: Finite,
    gap_quad: Finite,
    gap_tail: UpperTail,
    coherence_ratios: Mutex<HashMap<[u64; 4], f64>>,
    logger: Logger,
}

impl DepthResolvedAnalyzer {
    /// Create an analyzer around an already-loaded profile.
    pub fn new(profile: Arc<StoppingProfile>, config: AnalyzerConfig, logger: Logger) -> Self {
        let field = FieldPenetration::new(config.model, config.field_tolerance, config.fourier_levels)
            .geometry(config.geometry);
        let relaxation = LocalRelaxationRate::new(config.surface, &config.probe, &config.host);
        let depth_quad = Finite::new()
            .tolerance(config.tolerance)
            .limit(config.max_subintervals);
        // The broadened density of states peaks sharply at the gap edge.
        let gap_quad = depth_quad.rule(IntegrationRule::GaussKonrod61);
        let gap_tail = UpperTail::new()
            .tolerance(config.tolerance)
            .limit(config.max_subintervals);

        debug!(logger, "created depth-resolved analyzer";
               "model" => ?config.model,
               "surface" => ?config.surface,
               "geometry" => ?config.geometry,
               "policy" => ?config.policy,
               "energy_range" => ?profile.energy_range(),
        );

        DepthResolvedAnalyzer {
            profile,
            config,
            field,
            relaxation,
            depth_quad,
            gap_quad,
            gap_tail,
            coherence_ratios: Mutex::new(HashMap::new()),
            logger,
        }
    }

    /// Create an analyzer that logs nothing.
    pub fn quiet(profile: Arc<StoppingProfile>, config: AnalyzerConfig) -> Self {
        Self::new(profile, config, Logger::root(slog::Discard, o!()))
    }

    /// Create an analyzer whose profile comes from the global
    /// [`ProfileRegistry`], so that repeated construction doesn't re-read
    /// the file.
    pub fn from_path<P: AsRef<Path>>(path: P, config: AnalyzerConfig, logger: Logger) -> Result<Self> {
        let profile = ProfileRegistry::global().get_or_load(path, config.interpolation, &logger)?;
        Ok(Self::new(profile, config, logger))
    }

    /// The stopping profile.
    pub fn profile(&self) -> &Arc<StoppingProfile> {
        &self.profile
    }

    /// The configuration.
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// The flat parameter layout expected by
    /// [`fit_function`](Self::fit_function).
    pub fn layout(&self) -> ParameterLayout {
        ParameterLayout::for_model(self.config.model)
    }

    /// The critical temperature in the applied field.
    pub fn critical_temperature(&self, p: &SlrParameters) -> Result<f64> {
        let t_c0 = Error::require_positive("critical_temperature", p.critical_temperature)?;
        let b = Error::require("applied_field", p.applied_field)?;
        Ok(superconductivity::critical_temperature(t_c0, b, self.config.upper_critical_field))
    }

    /// Apply the convergence policy to an estimate.
    fn accept(&self, stage: &'static str, est: Estimate, tolerance: f64) -> Result<Estimate> {
        if est.converged {
            return Ok(est);
        }

        match self.config.policy {
            ConvergencePolicy::Strict => Err(Error::Convergence {
                stage,
                estimate: est.value,
                rel_err: est.rel_err,
                tolerance,
            }),
            ConvergencePolicy::Lenient => {
                warn!(self.logger, "accepting unconverged integral";
                      "stage" => stage,
                      "estimate" => est.value,
                      "rel_err" => est.rel_err,
                      "tolerance" => tolerance,
                );
                Ok(est)
            },
        }
    }

    /// The Hebel-Slichter factor for the normal-state rate; 1 when the
    /// correction is disabled.
    fn coherence_ratio(&self, p: &SlrParameters, t_c: f64) -> Result<f64> {
        let coupling = p.electron_phonon_coupling;

        if coupling.is_nan() || coupling == 0. {
            return Ok(1.);
        }

        let coupling = Error::require_positive("electron_phonon_coupling", coupling)?;
        let gap = Error::require_positive("gap", p.gap)?;
        let t = p.temperature;

        if !(t < t_c) {
            return Ok(1.);
        }

        let broadening = coupling * gap;
        let key = [t.to_bits(), t_c.to_bits(), gap.to_bits(), broadening.to_bits()];

        if let Some(&ratio) = self.coherence_ratios.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Ok(ratio);
        }

        let est = match hebel_slichter::slr_ratio(&self.gap_quad, &self.gap_tail, t, t_c, gap, broadening) {
            Ok(r) => Estimate { value: r.value, rel_err: r.rel_err(), converged: true },
            Err(QuadError::NotConverged { best }) => Estimate {
                value: best.value,
                rel_err: best.rel_err(),
                converged: false,
            },
            Err(e) => return Err(Error::Numerical { stage: "Hebel-Slichter", source: e }),
        };

        let ratio = self.accept("Hebel-Slichter", est, self.config.tolerance)?.value;
        trace!(self.logger, "Hebel-Slichter ratio"; "t" => t, "t_c" => t_c, "ratio" => ratio);

        let mut memo = self.coherence_ratios.lock().unwrap_or_else(|e| e.into_inner());

        // Keys change with every fit iteration; start over when full.
        if memo.len() >= self.config.cache_capacity.max(1) {
            memo.clear();
        }

        memo.insert(key, ratio);

        Ok(ratio)
    }

    /// The depth-averaged SLR rate (s⁻¹) at implantation energy `energy`
    /// (keV).
    pub fn evaluate(&self, p: &SlrParameters, energy: f64) -> Result<f64> {
        Ok(self.evaluate_with_error(p, energy)?.value)
    }

    /// Like [`evaluate`](Self::evaluate), but also report the estimated
    /// relative error and whether every integral converged.
    pub fn evaluate_with_error(&self, p: &SlrParameters, energy: f64) -> Result<Estimate> {
        let shape = self.profile.shape_at(energy)?;
        let t_c = self.critical_temperature(p)?;
        let screening = self.field.screening(p, t_c)?;
        let ratio = self.coherence_ratio(p, t_c)?;
        let terms = self.relaxation.terms(p, ratio)?;

        let norm = self.profile.normalization_with_error(energy)?;
        let norm = self.accept("normalization", norm, self.profile.tolerance())?;

        let z_max = shape.z_max();
        let mut edges = vec![0., z_max];
        edges.push(terms.dead_layer);
        edges.extend(shape.breakpoints());
        edges.retain(|&z| z >= 0. && z <= z_max);
        edges.sort_by(|a, b| a.total_cmp(b));
        edges.dedup();

        let strict = self.config.policy == ConvergencePolicy::Strict;
        let field_tolerance = self.config.field_tolerance;
        let mut failure: Option<Error> = None;
        let mut unconverged_fields = 0usize;
        let mut worst_field_err = 0f64;

        let mut integrand = |z: f64| {
            if failure.is_some() {
                return f64::NAN;
            }

            let rho = shape.density(z);

            if rho == 0. {
                return 0.;
            }

            match self.relaxation.rate(z, &terms, &self.field, &screening) {
                Ok(rate) => {
                    if !rate.converged {
                        if strict {
                            failure = Some(Error::Convergence {
                                stage: "field",
                                estimate: rate.value,
                                rel_err: rate.rel_err,
                                tolerance: field_tolerance,
                            });
                            return f64::NAN;
                        }

                        unconverged_fields += 1;
                        worst_field_err = worst_field_err.max(rate.rel_err);
                    }

                    rate.value * rho
                },
                Err(e) => {
                    failure = Some(e);
                    f64::NAN
                },
            }
        };

        let mut total = 0.;
        let mut abserr = 0.;
        let mut converged = true;

        for w in edges.windows(2) {
            let r = match self.depth_quad.integrate(&mut integrand, w[0], w[1]) {
                Ok(r) => r,
                Err(QuadError::NotConverged { best }) => {
                    converged = false;
                    best
                },
                Err(e) => {
                    return Err(failure.take().unwrap_or_else(|| Error::Numerical { stage: "depth", source: e }));
                },
            };

            total += r.value;
            abserr += r.abserr;
        }

        if unconverged_fields > 0 {
            warn!(self.logger, "field profile missed its tolerance";
                  "nodes" => unconverged_fields,
                  "worst_rel_err" => worst_field_err,
                  "tolerance" => field_tolerance,
            );
        }

        let depth_rel_err = if abserr == 0. { 0. } else { abserr / total.abs() };
        let depth = self.accept("depth", Estimate { value: total, rel_err: depth_rel_err, converged },
                                self.config.tolerance)?;

        let result = Estimate {
            value: depth.value / norm.value,
            rel_err: depth.rel_err + norm.rel_err,
            converged: depth.converged && norm.converged && unconverged_fields == 0,
        };

        trace!(self.logger, "depth-averaged SLR rate";
               "energy" => energy,
               "temperature" => p.temperature,
               "applied_field" => p.applied_field,
               "t_c" => t_c,
               "pieces" => edges.len() - 1,
               "normalization" => norm.value,
               "rate" => result.value,
               "rel_err" => result.rel_err,
        );

        Ok(result)
    }

    /// The flat fitting interface: `x = [temperature, applied_field,
    /// energy]` and `par` ordered according to [`layout`](Self::layout).
    pub fn fit_function(&self, x: &[f64], par: &[f64]) -> Result<f64> {
        let (p, energy) = self.layout().to_parameters(x, par)?;
        self.evaluate(&p, energy)
    }
}


/// A cache of loaded stopping profiles, keyed by data-source path and
/// interpolation policy.
///
/// Loading happens under the lock, so concurrent requests for the same
/// file read it only once.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: Mutex<HashMap<(PathBuf, Interpolation), Arc<StoppingProfile>>>,
}

impl ProfileRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static ProfileRegistry {
        static GLOBAL: OnceLock<ProfileRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ProfileRegistry::new)
    }

    /// Get the profile for `path`, loading it on first use.
    pub fn get_or_load<P: AsRef<Path>>(
        &self, path: P, interpolation: Interpolation, logger: &Logger
    ) -> Result<Arc<StoppingProfile>> {
        let path = path.as_ref();
        let key = (path.canonicalize().unwrap_or_else(|_| path.to_path_buf()), interpolation);
        let mut profiles = self.profiles.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(profile) = profiles.get(&key) {
            debug!(logger, "stopping profile cache hit"; "path" => %key.0.display());
            return Ok(profile.clone());
        }

        debug!(logger, "loading stopping profile"; "path" => %key.0.display(), "interpolation" => ?interpolation);
        let profile = Arc::new(StoppingProfile::from_path(&key.0, interpolation)?);
        profiles.insert(key, profile.clone());
        Ok(profile)
    }

    /// The number of cached profiles.
    pub fn len(&self) -> usize {
        self.profiles.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::stopping::{ProfileRow, ProfileShape};

    fn profile() -> Arc<StoppingProfile> {
        let rows = (1..=6).map(|i| {
            let e = 5. * i as f64;
            ProfileRow {
                energy: e,
                shape: ProfileShape::Beta { alpha: 2.2, beta: 3.1, z_max: 6. * e },
            }
        }).collect();
        Arc::new(StoppingProfile::from_rows(rows, Interpolation::Nearest).unwrap())
    }

    fn reference() -> SlrParameters {
        SlrParameters {
            temperature: 3.5077,
            critical_temperature: 8.53147,
            lambda_0: 61.3246,
            exponent: 4.,
            applied_field: 0.02001,
            dipole_field: 0.000239548,
            correlation_rate: 8363.69,
            slr_constant: 0.451973,
            slr_exponent: 1.,
            surface_thickness: 7.41019,
            surface_rate: 18.2169,
            ..SlrParameters::default()
        }
    }

    #[test]
    fn layouts() {
        assert_eq!(ParameterLayout::Local.len(), 9);
        assert_eq!(ParameterLayout::Nonlocal.len(), 13);
        assert_eq!(ParameterLayout::for_model(FieldModel::Local), ParameterLayout::Local);
        assert_eq!(ParameterLayout::for_model(FieldModel::ExtremeAnomalous), ParameterLayout::Nonlocal);

        let par = [8.53147, 61.3246, 4., 0.000239548, 8363.69, 0.451973, 1., 7.41019, 18.2169];
        let (p, e) = ParameterLayout::Local.to_parameters(&[3.5077, 0.02001, 19.9321], &par).unwrap();
        assert_eq!(p, reference());
        assert_eq!(e, 19.9321);

        let par = [8.5, 1.53, 39., 1., 61., 4., 2.4e-4, 8e3, 0.45, 1., 7.4, 18.2, 2.1];
        let (p, _) = ParameterLayout::Nonlocal.to_parameters(&[3.5, 0.02, 20.], &par).unwrap();
        assert_eq!(p.gap, 1.53);
        assert_eq!(p.mean_free_path, 1.);
        assert_eq!(p.lambda_0, 61.);
        assert_eq!(p.electron_phonon_coupling, 2.1);
    }

    #[test]
    fn layout_counts_are_checked() {
        match ParameterLayout::Local.to_parameters(&[3.5, 0.02, 20.], &[1.; 13]) {
            Err(Error::ParameterCount { expected: 9, got: 13 }) => {},
            other => panic!("unexpected: {:?}", other),
        }

        match ParameterLayout::Nonlocal.to_parameters(&[3.5, 0.02], &[1.; 13]) {
            Err(Error::ParameterCount { expected: 3, got: 2 }) => {},
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn analyzer_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DepthResolvedAnalyzer>();
        assert_send_sync::<ProfileRegistry>();
    }

    #[test]
    fn unscreened_average_is_closed_form() {
        // Above T_c the field is B₀ everywhere below the dead layer, so the
        // average is a two-level mixture weighted by the profile mass in the
        // dead layer.
        let profile = profile();
        let a = DepthResolvedAnalyzer::quiet(profile.clone(), AnalyzerConfig::default());
        let p = SlrParameters { temperature: 10., ..reference() };

        let shape = profile.shape_at(20.).unwrap();
        let shallow = Finite::new().tolerance(1e-12)
            .integrate(|z| shape.density(z), 0., p.surface_thickness).unwrap().value;

        let terms = a.relaxation.terms(&p, 1.).unwrap();
        let deep_rate = a.relaxation.dipolar(p.applied_field, &terms) + terms.normal_state;
        let expected = shallow * p.surface_rate + (1. - shallow) * deep_rate;

        let got = a.evaluate_with_error(&p, 20.).unwrap();
        assert!(got.converged);
        assert_approx_eq!(got.value, expected, 1e-7 * expected);
    }

    #[test]
    fn coherence_ratio_is_memoized() {
        let a = DepthResolvedAnalyzer::quiet(profile(), AnalyzerConfig::default());
        let p = SlrParameters { gap: 1.3, electron_phonon_coupling: 0.05, ..reference() };

        let r1 = a.coherence_ratio(&p, 8.).unwrap();
        let r2 = a.coherence_ratio(&p, 8.).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(a.coherence_ratios.lock().unwrap().len(), 1);

        let off = SlrParameters { electron_phonon_coupling: f64::NAN, ..p };
        assert_eq!(a.coherence_ratio(&off, 8.).unwrap(), 1.);

        let no_gap = SlrParameters { gap: f64::NAN, ..p };
        assert!(matches!(a.coherence_ratio(&no_gap, 8.), Err(Error::MissingParameter("gap"))));
    }

    #[test]
    fn coherence_memo_is_bounded() {
        let config = AnalyzerConfig::default().with_cache_capacity(8);
        let a = DepthResolvedAnalyzer::quiet(profile(), config);

        for i in 0..30 {
            // a fit walking T_c
            let t_c = 8. + 0.01 * i as f64;
            let p = SlrParameters { gap: 1.3, electron_phonon_coupling: 0.05, ..reference() };
            let ratio = a.coherence_ratio(&p, t_c).unwrap();
            assert!(ratio.is_finite() && ratio >= 0.);
            assert!(a.coherence_ratios.lock().unwrap().len() <= 8);
        }
    }

    #[test]
    fn registry_survives_a_poisoned_lock() {
        let registry = Arc::new(ProfileRegistry::new());
        let r = registry.clone();

        let _ = std::thread::spawn(move || {
            let _guard = r.profiles.lock().unwrap();
            panic!("loader died");
        }).join();

        assert!(registry.profiles.is_poisoned());
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn every_flat_parameter_has_its_own_field() {
        for &layout in &[ParameterLayout::Local, ParameterLayout::Nonlocal] {
            let par: Vec<f64> = (1..=layout.len()).map(|i| i as f64).collect();
            let (p, _) = layout.to_parameters(&[3.5, 0.02, 20.], &par).unwrap();

            let fields = [
                p.critical_temperature, p.gap, p.coherence_length, p.mean_free_path, p.lambda_0,
                p.exponent, p.dipole_field, p.correlation_rate, p.slr_constant, p.slr_exponent,
                p.surface_thickness, p.surface_rate, p.electron_phonon_coupling,
            ];
            let mut set: Vec<f64> = fields.iter().cloned().filter(|v| !v.is_nan()).collect();
            set.sort_by(|a, b| a.total_cmp(b));
            assert_eq!(set, par, "{:?}", layout);
        }

        let (p, _) = ParameterLayout::Nonlocal.to_parameters(&[3.5, 0.02, 20.], &[0.; 13]).unwrap();
        assert_eq!(p.electron_phonon_coupling, 0.);
    }

    #[test]
    fn strict_policy_reports_unconverged_depth_integral() {
        let config = AnalyzerConfig::default()
            .with_policy(ConvergencePolicy::Strict)
            .with_tolerances(1e-13, 1e-8)
            .with_budgets(1, 32);
        let a = DepthResolvedAnalyzer::quiet(profile(), config);

        match a.evaluate(&reference(), 20.) {
            Err(Error::Convergence { stage, .. }) => assert_eq!(stage, "depth"),
            other => panic!("unexpected: {:?}", other),
        }

        let lenient = DepthResolvedAnalyzer::quiet(profile(), config.with_policy(ConvergencePolicy::Lenient));
        let est = lenient.evaluate_with_error(&reference(), 20.).unwrap();
        assert!(!est.converged);
        assert!(est.value.is_finite() && est.value > 0.);
    }

    #[test]
    fn missing_parameters_fail_fast() {
        let a = DepthResolvedAnalyzer::quiet(profile(), AnalyzerConfig::default());

        for &(name, ref p) in &[
            ("critical_temperature", SlrParameters { critical_temperature: f64::NAN, ..reference() }),
            ("dipole_field", SlrParameters { dipole_field: f64::NAN, ..reference() }),
            ("surface_thickness", SlrParameters { surface_thickness: f64::NAN, ..reference() }),
        ] {
            match a.evaluate(p, 20.) {
                Err(Error::MissingParameter(missing)) => assert_eq!(missing, name),
                other => panic!("unexpected for {}: {:?}", name, other),
            }
        }
    }
}
