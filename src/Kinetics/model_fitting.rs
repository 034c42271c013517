//! # Model fitting
//!
//! Fits a rate law to the rate data pooled over all heating rates. The fit works in the time
//! domain: the target of every sample is the experimental rate `y = β·dα/dT` in 1/min and the
//! residual is `rate_model(α, T) − y`.
//!
//! ## Pooling
//! From every series the samples with α (clipped to [ε, 1−ε]) inside the α window and a finite
//! dα/dT are taken; samples with any other non-finite column are masked.
//!
//! ## Variants
//! | Variant | Fitted parameters | Eₐ |
//! |---------|-------------------|----|
//! | GlobalFit | m, n, p, lnA | isoconversional Eₐ(α) |
//! | CKA | m, n, p, lnA | mean of the IQR-filtered isoconversional Eₐ inside the window |
//! | Kamal-Sourour | lnA₁, E₁, lnA₂, E₂, m, n | fitted |
//! | GAI | lnA, E, n₁, z₀, n₂ | fitted |
//! | PAR | lnA₁, E₁, n₁, lnA₂, E₂, n₂ | fitted |
//!
//! All variants use bounded Levenberg-Marquardt with the soft-L1 loss and analytic Jacobians
//! from [`RateFunction::gradient_per_min`]. The parameter covariance is
//! `pinv(JᵀJ)·2·cost/(n − p)`; when it cannot be formed the standard errors are NaN and a
//! warning is attached to the result.
//!
//! Prefactors are fitted as ln A with A in 1/min and reported as A in 1/s.

use crate::Kinetics::diagnostics::{Analysis, Diagnostics};
use crate::Kinetics::heating_rate_series::{HeatingRateSeries, SeriesSet};
use crate::Kinetics::isoconversional::{EaCurve, usable_mean_ea_j};
use crate::Kinetics::kinetics_error::{KineticsError, KineticsResult, check_alpha_range};
use crate::Kinetics::npa::NonParametricAnalyzer;
use crate::Kinetics::rate_laws::{
    EaSource, Gai, KamalSourour, ModelKind, ParallelReactions, RateFunction, RateModel,
    SestakBerggren, clip_alpha,
};
use crate::Utils::LM_optimization::{
    LMSettings, LeastSquaresProblem, LevenbergMarquardt, covariance,
};
use crate::Utils::statistics::{iqr_filter, mean, r_squared, sample_std};
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Minimum pooled samples for the Šesták-Berggren variants
pub const MIN_SAMPLES_SB: usize = 10;
/// Minimum pooled samples for the autocatalytic variants
pub const MIN_SAMPLES_AUTOCATALYTIC: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedParameter {
    pub name: String,
    pub value: f64,
    pub std_err: f64,
    pub unit: String,
}

impl DerivedParameter {
    fn new(name: &str, value: f64, std_err: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            std_err,
            unit: unit.to_string(),
        }
    }

    /// A in 1/s from ln A in 1/min; σ_A = σ_lnA·A.
    fn prefactor(name: &str, ln_a_min: f64, se_ln_a: f64) -> Self {
        let a = ln_a_min.exp() / 60.0;
        Self::new(name, a, se_ln_a * a, "1/s")
    }

    fn energy(name: &str, e_j: f64, se_j: f64) -> Self {
        Self::new(name, e_j / 1000.0, se_j / 1000.0, "kJ/mol")
    }

    fn shape(name: &str, value: f64, std_err: f64) -> Self {
        Self::new(name, value, std_err, "-")
    }
}

/// Result of a fit: the rate law with its fitted parameters plus the fit statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub model: RateModel,
    pub kind: ModelKind,
    /// names of the entries of `raw`
    pub param_order: Vec<String>,
    pub raw: Vec<f64>,
    /// reported quantities (A in 1/s, energies in kJ/mol) with standard errors
    pub derived: Vec<DerivedParameter>,
    /// covariance of the leading `raw` entries that were fitted; `None` if unusable
    pub covariance: Option<DMatrix<f64>>,
    pub r_squared: f64,
    pub n_samples: usize,
    pub cost: f64,
    pub alpha_range: (f64, f64),
}

impl FittedModel {
    pub fn derived_parameter(&self, name: &str) -> Option<&DerivedParameter> {
        self.derived.iter().find(|d| d.name == name)
    }

    pub fn raw_parameter(&self, name: &str) -> Option<f64> {
        self.param_order
            .iter()
            .position(|n| n == name)
            .map(|i| self.raw[i])
    }

    pub fn rate_per_min(&self, alpha: f64, temp_k: f64) -> f64 {
        self.model.rate_per_min(alpha, temp_k)
    }

    pub fn rate_per_s(&self, alpha: f64, temp_k: f64) -> f64 {
        self.model.rate_per_s(alpha, temp_k)
    }
}

/// Samples pooled over all heating rates for one α window.
#[derive(Debug, Clone, Default)]
pub(crate) struct PooledRates {
    pub alpha: Vec<f64>,
    pub temp_k: Vec<f64>,
    /// β·dα/dT, 1/min
    pub rate: Vec<f64>,
}

impl PooledRates {
    pub fn collect(series: &SeriesSet, amin: f64, amax: f64) -> Self {
        let mut pooled = PooledRates::default();
        for s in series {
            for sample in s.samples() {
                let (a, _) = clip_alpha(sample.alpha);
                if a < amin || a > amax || !sample.dadt.is_finite() {
                    continue;
                }
                let y = sample.dadt * s.beta();
                if !(y.is_finite() && sample.temp_k.is_finite()) {
                    continue;
                }
                pooled.alpha.push(a);
                pooled.temp_k.push(sample.temp_k);
                pooled.rate.push(y);
            }
        }
        pooled
    }

    pub fn len(&self) -> usize {
        self.rate.len()
    }

    fn require(&self, minimum: usize, label: &str) -> KineticsResult<()> {
        if self.len() < minimum {
            return Err(KineticsError::InsufficientData(format!(
                "{}: {} samples in the alpha window, at least {} needed",
                label,
                self.len(),
                minimum
            )));
        }
        Ok(())
    }
}

/// Rate residuals of a parametrised rate law over pooled samples.
struct RateResiduals<'a, B: Fn(&[f64]) -> RateModel> {
    data: &'a PooledRates,
    build: B,
}

impl<B: Fn(&[f64]) -> RateModel> LeastSquaresProblem for RateResiduals<'_, B> {
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let model = (self.build)(params.as_slice());
        DVector::from_iterator(
            self.data.len(),
            (0..self.data.len()).map(|i| {
                model.rate_per_min(self.data.alpha[i], self.data.temp_k[i]) - self.data.rate[i]
            }),
        )
    }

    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
        let model = (self.build)(params.as_slice());
        let mut jac = DMatrix::zeros(self.data.len(), params.len());
        for i in 0..self.data.len() {
            let row = model.gradient_per_min(self.data.alpha[i], self.data.temp_k[i]);
            for (j, g) in row.into_iter().enumerate() {
                jac[(i, j)] = g;
            }
        }
        jac
    }
}

/// Fitted parameters and statistics before they are assembled into a [`FittedModel`].
struct Solution {
    params: Vec<f64>,
    std_err: Vec<f64>,
    covariance: Option<DMatrix<f64>>,
    cost: f64,
    r_squared: f64,
    model: RateModel,
}

/// Fits rate laws to a set of heating rates over an α window.
pub struct ModelFitter<'a> {
    series: &'a SeriesSet,
    ea_curve: &'a EaCurve,
    alpha_range: (f64, f64),
    settings: LMSettings,
}

impl<'a> ModelFitter<'a> {
    pub fn new(
        series: &'a SeriesSet,
        ea_curve: &'a EaCurve,
        amin: f64,
        amax: f64,
    ) -> KineticsResult<Self> {
        check_alpha_range(amin, amax)?;
        Ok(Self {
            series,
            ea_curve,
            alpha_range: (amin, amax),
            settings: LMSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: LMSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Fits the requested variant. NPA is delegated to [`NonParametricAnalyzer`].
    pub fn fit(&self, kind: ModelKind) -> KineticsResult<Analysis<FittedModel>> {
        match kind {
            ModelKind::GlobalFit => self.fit_global(),
            ModelKind::Cka => self.fit_cka(),
            ModelKind::KamalSourour | ModelKind::Gai | ModelKind::Par => {
                self.fit_autocatalytic(kind)
            }
            ModelKind::Npa => {
                let (amin, amax) = self.alpha_range;
                let analysis =
                    NonParametricAnalyzer::new(self.series, self.ea_curve, amin, amax)?.analyze()?;
                Ok(analysis.map(|npa| npa.model))
            }
        }
    }

    /// Šesták-Berggren law with Eₐ(α) taken from the isoconversional curve.
    pub fn fit_global(&self) -> KineticsResult<Analysis<FittedModel>> {
        let label = ModelKind::GlobalFit.to_string();
        let data = self.pool();
        data.require(MIN_SAMPLES_SB, &label)?;
        let mut diagnostics = Diagnostics::new();
        let ea = EaSource::Isoconversional(self.ea_curve.clone());
        let build = |p: &[f64]| -> RateModel {
            SestakBerggren::new(p[0], p[1], p[2], p[3], ea.clone()).into()
        };
        let sol = self.solve(
            &label,
            &data,
            build,
            &[1.0, 1.0, 0.0, 30.0],
            vec![0.0, 0.0, 0.0, 10.0],
            vec![5.0, 5.0, 5.0, 50.0],
            &mut diagnostics,
        )?;
        let p = &sol.params;
        let se = &sol.std_err;
        let derived = vec![
            DerivedParameter::new(
                "Ea",
                self.ea_curve.mean_ea_kj(),
                self.ea_curve.std_ea_kj(),
                "kJ/mol",
            ),
            DerivedParameter::prefactor("A", p[3], se[3]),
            DerivedParameter::shape("m", p[0], se[0]),
            DerivedParameter::shape("n", p[1], se[1]),
            DerivedParameter::shape("p", p[2], se[2]),
        ];
        let fitted = self.assemble(ModelKind::GlobalFit, &["m", "n", "p", "logA"], sol, derived, &data);
        Ok(Analysis::new(fitted, diagnostics))
    }

    /// Šesták-Berggren law with a single Eₐ fixed at the mean of the isoconversional energies
    /// inside the window, after removing outliers with the Tukey fences.
    pub fn fit_cka(&self) -> KineticsResult<Analysis<FittedModel>> {
        let label = ModelKind::Cka.to_string();
        let (amin, amax) = self.alpha_range;
        let mut diagnostics = Diagnostics::new();
        let window: Vec<f64> = self
            .ea_curve
            .window(amin, amax)
            .into_iter()
            .filter(|e| e.is_finite())
            .collect();
        if window.is_empty() {
            return Err(KineticsError::InsufficientData(format!(
                "{}: no activation energy in the alpha window [{}, {}]",
                label, amin, amax
            )));
        }
        let (filtered, fell_back) = iqr_filter(&window);
        if fell_back {
            diagnostics.warning(
                &label,
                "IQR filter removed every activation energy; using the unfiltered mean",
            );
        } else if filtered.len() < window.len() {
            diagnostics.info(
                &label,
                format!(
                    "IQR filter removed {} of {} activation energies",
                    window.len() - filtered.len(),
                    window.len()
                ),
            );
        }
        let ea_fixed_j = mean(&filtered) * 1000.0;
        let ea_std_kj = sample_std(&filtered);
        info!("{}: fixed Ea = {:.2} kJ/mol", label, ea_fixed_j / 1000.0);

        let data = self.pool();
        data.require(MIN_SAMPLES_SB, &label)?;
        let build = |p: &[f64]| -> RateModel {
            SestakBerggren::new(p[0], p[1], p[2], p[3], EaSource::Fixed { ea_j: ea_fixed_j })
                .into()
        };
        let mut sol = self.solve(
            &label,
            &data,
            build,
            &[1.0, 1.0, 0.0, 30.0],
            vec![0.0, 0.0, 0.0, -30.0],
            vec![5.0, 5.0, 5.0, 70.0],
            &mut diagnostics,
        )?;
        let p = sol.params.clone();
        let se = sol.std_err.clone();
        let derived = vec![
            DerivedParameter::new("Ea", ea_fixed_j / 1000.0, ea_std_kj, "kJ/mol"),
            DerivedParameter::prefactor("A", p[3], se[3]),
            DerivedParameter::shape("m", p[0], se[0]),
            DerivedParameter::shape("n", p[1], se[1]),
            DerivedParameter::shape("p", p[2], se[2]),
        ];
        // Eₐ is carried in the raw vector but was not fitted, the covariance stays 4×4
        sol.params.push(ea_fixed_j);
        let fitted = self.assemble(
            ModelKind::Cka,
            &["m", "n", "p", "logA", "Ea_J"],
            sol,
            derived,
            &data,
        );
        Ok(Analysis::new(fitted, diagnostics))
    }

    /// Kamal-Sourour, GAI or PAR. Initial energies are scaled from the mean isoconversional Eₐ.
    pub fn fit_autocatalytic(&self, kind: ModelKind) -> KineticsResult<Analysis<FittedModel>> {
        let label = kind.to_string();
        let data = self.pool();
        data.require(MIN_SAMPLES_AUTOCATALYTIC, &label)?;
        let ea = usable_mean_ea_j(self.ea_curve);
        let mut diagnostics = Diagnostics::new();
        let fitted = match kind {
            ModelKind::KamalSourour => {
                let sol = self.solve(
                    &label,
                    &data,
                    |p: &[f64]| -> RateModel { KamalSourour::from_params(p).into() },
                    &[15.0, 0.8 * ea, 15.0, 1.2 * ea, 0.5, 1.5],
                    vec![0.0, 1e4, 0.0, 1e4, 0.0, 0.0],
                    vec![70.0, 4e5, 70.0, 4e5, 5.0, 5.0],
                    &mut diagnostics,
                )?;
                let (p, se) = (&sol.params, &sol.std_err);
                let derived = vec![
                    DerivedParameter::energy("E1", p[1], se[1]),
                    DerivedParameter::prefactor("A1", p[0], se[0]),
                    DerivedParameter::energy("E2", p[3], se[3]),
                    DerivedParameter::prefactor("A2", p[2], se[2]),
                    DerivedParameter::shape("m", p[4], se[4]),
                    DerivedParameter::shape("n", p[5], se[5]),
                ];
                self.assemble(
                    kind,
                    &["logA1", "E1_J", "logA2", "E2_J", "m", "n"],
                    sol,
                    derived,
                    &data,
                )
            }
            ModelKind::Gai => {
                let sol = self.solve(
                    &label,
                    &data,
                    |p: &[f64]| -> RateModel { Gai::from_params(p).into() },
                    &[15.0, ea, 1.0, 1e-4, 1.0],
                    vec![0.0, 1e4, 0.0, 0.0, 0.0],
                    vec![70.0, 4e5, 5.0, 1.0, 5.0],
                    &mut diagnostics,
                )?;
                let (p, se) = (&sol.params, &sol.std_err);
                let derived = vec![
                    DerivedParameter::energy("Ea", p[1], se[1]),
                    DerivedParameter::prefactor("A", p[0], se[0]),
                    DerivedParameter::shape("n1", p[2], se[2]),
                    DerivedParameter::shape("z0", p[3], se[3]),
                    DerivedParameter::shape("n2", p[4], se[4]),
                ];
                self.assemble(kind, &["logA", "E_J", "n1", "z0", "n2"], sol, derived, &data)
            }
            ModelKind::Par => {
                let sol = self.solve(
                    &label,
                    &data,
                    |p: &[f64]| -> RateModel { ParallelReactions::from_params(p).into() },
                    &[15.0, 0.9 * ea, 1.0, 15.0, 1.1 * ea, 1.0],
                    vec![0.0, 1e4, 0.0, 0.0, 1e4, 0.0],
                    vec![70.0, 4e5, 5.0, 70.0, 4e5, 5.0],
                    &mut diagnostics,
                )?;
                let (p, se) = (&sol.params, &sol.std_err);
                let derived = vec![
                    DerivedParameter::energy("E1", p[1], se[1]),
                    DerivedParameter::prefactor("A1", p[0], se[0]),
                    DerivedParameter::shape("n1", p[2], se[2]),
                    DerivedParameter::energy("E2", p[4], se[4]),
                    DerivedParameter::prefactor("A2", p[3], se[3]),
                    DerivedParameter::shape("n2", p[5], se[5]),
                ];
                self.assemble(
                    kind,
                    &["logA1", "E1_J", "n1", "logA2", "E2_J", "n2"],
                    sol,
                    derived,
                    &data,
                )
            }
            other => {
                return Err(KineticsError::Configuration(format!(
                    "{} is not an autocatalytic model",
                    other
                )));
            }
        };
        Ok(Analysis::new(fitted, diagnostics))
    }

    fn pool(&self) -> PooledRates {
        let (amin, amax) = self.alpha_range;
        let data = PooledRates::collect(self.series, amin, amax);
        debug!(
            "pooled {} samples from {} heating rates in alpha [{}, {}]",
            data.len(),
            self.series.len(),
            amin,
            amax
        );
        data
    }

    #[allow(clippy::too_many_arguments)]
    fn solve<B: Fn(&[f64]) -> RateModel>(
        &self,
        label: &str,
        data: &PooledRates,
        build: B,
        x0: &[f64],
        lower: Vec<f64>,
        upper: Vec<f64>,
        diagnostics: &mut Diagnostics,
    ) -> KineticsResult<Solution> {
        let lm = LevenbergMarquardt::new(self.settings, lower, upper)
            .map_err(|e| KineticsError::Configuration(format!("{}: {}", label, e)))?;
        let problem = RateResiduals { data, build };
        let report = lm
            .minimize(&problem, x0)
            .map_err(|e| KineticsError::Convergence(format!("{}: {}", label, e)))?;
        if !report.cost.is_finite() {
            return Err(KineticsError::Convergence(format!(
                "{}: non-finite cost at the solution",
                label
            )));
        }
        info!(
            "{}: converged after {} evaluations ({:?}), cost = {:.4e}",
            label, report.evaluations, report.termination, report.cost
        );
        let params: Vec<f64> = report.params.iter().copied().collect();
        let cov = covariance(&report.jacobian, report.cost);
        let std_err = match &cov {
            Some(c) => (0..params.len()).map(|i| c[(i, i)].max(0.0).sqrt()).collect(),
            None => {
                diagnostics.warning(
                    label,
                    "covariance matrix could not be estimated; standard errors are undefined",
                );
                vec![f64::NAN; params.len()]
            }
        };
        let model = (problem.build)(&params);
        let predicted: Vec<f64> = (0..data.len())
            .map(|i| model.rate_per_min(data.alpha[i], data.temp_k[i]))
            .collect();
        Ok(Solution {
            params,
            std_err,
            covariance: cov,
            cost: report.cost,
            r_squared: r_squared(&data.rate, &predicted),
            model,
        })
    }

    fn assemble(
        &self,
        kind: ModelKind,
        order: &[&str],
        sol: Solution,
        derived: Vec<DerivedParameter>,
        data: &PooledRates,
    ) -> FittedModel {
        FittedModel {
            model: sol.model,
            kind,
            param_order: order.iter().map(|s| s.to_string()).collect(),
            raw: sol.params,
            derived,
            covariance: sol.covariance,
            r_squared: sol.r_squared,
            n_samples: data.len(),
            cost: sol.cost,
            alpha_range: self.alpha_range,
        }
    }
}

/// Experimental and modelled rate at one sample of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatePoint {
    pub temp_k: f64,
    pub alpha: f64,
    /// β·dα/dT, 1/min
    pub observed: f64,
    /// model dα/dt, 1/min
    pub predicted: f64,
}

/// Modelled rate along the samples of one series, next to the experimental one.
pub fn predict_rate_curve<M: RateFunction>(model: &M, series: &HeatingRateSeries) -> Vec<RatePoint> {
    series
        .samples()
        .iter()
        .map(|s| RatePoint {
            temp_k: s.temp_k,
            alpha: s.alpha,
            observed: s.dadt * series.beta(),
            predicted: model.rate_per_min(s.alpha, s.temp_k),
        })
        .collect()
}

/// Shortcut for a one-off fit with default optimiser settings.
pub fn fit_model(
    series: &SeriesSet,
    ea_curve: &EaCurve,
    kind: ModelKind,
    amin: f64,
    amax: f64,
) -> KineticsResult<Analysis<FittedModel>> {
    ModelFitter::new(series, ea_curve, amin, amax)?.fit(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Kinetics::heating_rate_series::HeatingRateSeries;
    use crate::Kinetics::isoconversional::IsoMethod;

    fn flat_series(beta: f64, n: usize) -> HeatingRateSeries {
        let t: Vec<f64> = (0..n).map(|i| 500.0 + i as f64).collect();
        let time: Vec<f64> = (0..n).map(|i| i as f64 / beta).collect();
        let alpha: Vec<f64> = (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
        let dadt = vec![1.0 / (n - 1) as f64; n];
        HeatingRateSeries::from_columns(beta, &t, &time, &alpha, &dadt).unwrap()
    }

    #[test]
    fn test_pooling_respects_window() {
        let set = SeriesSet::new(vec![flat_series(5.0, 11), flat_series(10.0, 11)]).unwrap();
        let pooled = PooledRates::collect(&set, 0.2, 0.8);
        // α = 0.2, 0.3, ..., 0.8 in each series
        assert_eq!(pooled.len(), 14);
        assert!(pooled.alpha.iter().all(|a| (0.2..=0.8).contains(a)));
        assert!((pooled.rate[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_samples() {
        let set = SeriesSet::new(vec![flat_series(5.0, 6), flat_series(10.0, 6)]).unwrap();
        let curve = EaCurve::constant(IsoMethod::Friedman, &[0.2, 0.5, 0.8], 120.0).unwrap();
        let fitter = ModelFitter::new(&set, &curve, 0.1, 0.9).unwrap();
        assert!(matches!(
            fitter.fit_global(),
            Err(KineticsError::InsufficientData(_))
        ));
        assert!(matches!(
            fitter.fit_autocatalytic(ModelKind::Gai),
            Err(KineticsError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_invalid_window() {
        let set = SeriesSet::new(vec![flat_series(5.0, 11)]).unwrap();
        let curve = EaCurve::constant(IsoMethod::Friedman, &[0.2, 0.5, 0.8], 120.0).unwrap();
        assert!(matches!(
            ModelFitter::new(&set, &curve, 0.8, 0.2),
            Err(KineticsError::Configuration(_))
        ));
    }

    #[test]
    fn test_cka_requires_energies_in_window() {
        let set = SeriesSet::new(vec![flat_series(5.0, 41), flat_series(10.0, 41)]).unwrap();
        let curve = EaCurve::constant(IsoMethod::KAS, &[0.05, 0.08], 120.0).unwrap();
        let fitter = ModelFitter::new(&set, &curve, 0.2, 0.8).unwrap();
        assert!(matches!(
            fitter.fit_cka(),
            Err(KineticsError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_derived_prefactor_units() {
        let d = DerivedParameter::prefactor("A", (600.0_f64).ln(), 0.1);
        assert!((d.value - 10.0).abs() < 1e-9);
        assert!((d.std_err - 1.0).abs() < 1e-9);
        assert_eq!(d.unit, "1/s");
    }
}
