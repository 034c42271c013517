//! # Analysis session
//!
//! A [`KineticsSession`] is an immutable value holding what the stages of a workflow have
//! produced so far: the series, the isoconversional result and the current fitted model.
//! Every stage returns a new session and leaves the receiver untouched, so a fit can never
//! silently change the model used by an earlier prediction.
//!
//! ```text
//! new(series, settings) ─ with_isoconversional ─┬─ with_fit(kind) ─┬─ predict_lifetime
//!                                               └─ with_npa ───────┼─ cross_validate
//!                                                                  └─ reconstruct
//! ```

use crate::Kinetics::cross_validation::{CrossValidationReport, CrossValidator};
use crate::Kinetics::curve_reconstruction::{CurveReconstructor, ReconstructedCurve};
use crate::Kinetics::diagnostics::Analysis;
use crate::Kinetics::heating_rate_series::SeriesSet;
use crate::Kinetics::ideal_mechanisms::{IdealMechanism, MechanismComparison, compare_fit};
use crate::Kinetics::isoconversional::{EaCurve, IsoconversionalResult, IsoconversionalSolver};
use crate::Kinetics::kinetics_error::{KineticsError, KineticsResult};
use crate::Kinetics::model_fitting::{FittedModel, ModelFitter};
use crate::Kinetics::npa::{NonParametricAnalyzer, NpaBin};
use crate::Kinetics::rate_laws::ModelKind;
use crate::Kinetics::thermal_events::{
    DscEventTable, ThermalEventTable, analyze_dsc_events, analyze_thermal_events,
};
use crate::Kinetics::uncertainty::{PredictionCurve, UncertaintyPropagator};
use crate::settings::AnalysisSettings;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct KineticsSession {
    series: Arc<SeriesSet>,
    settings: Arc<AnalysisSettings>,
    isoconversional: Option<Arc<IsoconversionalResult>>,
    fitted_model: Option<Arc<FittedModel>>,
    npa_bins: Option<Arc<Vec<NpaBin>>>,
}

impl KineticsSession {
    pub fn new(series: SeriesSet, settings: AnalysisSettings) -> KineticsResult<Self> {
        settings.validate()?;
        Ok(Self {
            series: Arc::new(series),
            settings: Arc::new(settings),
            isoconversional: None,
            fitted_model: None,
            npa_bins: None,
        })
    }

    pub fn series(&self) -> &SeriesSet {
        &self.series
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn isoconversional(&self) -> Option<&IsoconversionalResult> {
        self.isoconversional.as_deref()
    }

    pub fn ea_curve(&self) -> Option<&EaCurve> {
        self.isoconversional.as_deref().map(|r| &r.ea_curve)
    }

    pub fn fitted_model(&self) -> Option<&FittedModel> {
        self.fitted_model.as_deref()
    }

    /// Binned Z(α) of the last NPA run, if the current model came from one.
    pub fn npa_bins(&self) -> Option<&[NpaBin]> {
        self.npa_bins.as_deref().map(|b| b.as_slice())
    }

    fn require_curve(&self) -> KineticsResult<&EaCurve> {
        self.ea_curve().ok_or_else(|| {
            KineticsError::Configuration(
                "run the isoconversional analysis before this stage".to_string(),
            )
        })
    }

    fn require_fit(&self) -> KineticsResult<&FittedModel> {
        self.fitted_model().ok_or_else(|| {
            KineticsError::Configuration("no fitted model in the session".to_string())
        })
    }

    /// Isoconversional analysis with the configured method and α grid. Any previous fit is
    /// dropped from the new session since it was made against another curve.
    pub fn with_isoconversional(&self) -> KineticsResult<Analysis<KineticsSession>> {
        let s = &self.settings;
        let result = IsoconversionalSolver::new(&self.series, s.iso_method)
            .with_tolerances(s.vyazovkin_tolerances)
            .with_max_iters(s.vyazovkin_max_iters)
            .solve(&s.iso_alphas())?;
        Ok(result.map(|iso| KineticsSession {
            series: Arc::clone(&self.series),
            settings: Arc::clone(&self.settings),
            isoconversional: Some(Arc::new(iso)),
            fitted_model: None,
            npa_bins: None,
        }))
    }

    /// Fits `kind` over the configured window; the new session holds it as the current fit.
    pub fn with_fit(&self, kind: ModelKind) -> KineticsResult<Analysis<KineticsSession>> {
        if kind == ModelKind::Npa {
            return self.with_npa();
        }
        let curve = self.require_curve()?;
        let s = &self.settings;
        let fitted = ModelFitter::new(&self.series, curve, s.alpha_min, s.alpha_max)?
            .with_settings(s.fit)
            .fit(kind)?;
        Ok(fitted.map(|model| KineticsSession {
            fitted_model: Some(Arc::new(model)),
            npa_bins: None,
            ..self.clone()
        }))
    }

    /// Non-parametric analysis; its rate table becomes the current fit.
    pub fn with_npa(&self) -> KineticsResult<Analysis<KineticsSession>> {
        let curve = self.require_curve()?;
        let s = &self.settings;
        let npa = NonParametricAnalyzer::new(&self.series, curve, s.alpha_min, s.alpha_max)?
            .with_bins(s.npa_bins)
            .analyze()?;
        Ok(npa.map(|result| KineticsSession {
            fitted_model: Some(Arc::new(result.model)),
            npa_bins: Some(Arc::new(result.bins)),
            ..self.clone()
        }))
    }

    /// Isothermal conversion times of the current fit; the configured temperature when
    /// `temp_k` is `None`.
    pub fn predict_lifetime(&self, temp_k: Option<f64>) -> KineticsResult<Analysis<PredictionCurve>> {
        let model = self.require_fit()?;
        UncertaintyPropagator::new(model)
            .with_tolerances(self.settings.prediction_tolerances)
            .predict(temp_k.unwrap_or(self.settings.prediction_temperature_k))
    }

    /// Leave-one-heating-rate-out validation of the kind of the current fit, or of `kind`.
    pub fn cross_validate(
        &self,
        kind: Option<ModelKind>,
    ) -> KineticsResult<Analysis<CrossValidationReport>> {
        let kind = match kind {
            Some(k) => k,
            None => self.require_fit()?.kind,
        };
        let s = &self.settings;
        CrossValidator::new(
            &self.series,
            kind,
            s.iso_method,
            &s.iso_alphas(),
            s.alpha_min,
            s.alpha_max,
        )?
        .with_settings(s.fit)
        .run()
    }

    /// α(T) and TG(T) of the current fit along the heating program of the series at `beta`.
    pub fn reconstruct(&self, beta: f64) -> KineticsResult<ReconstructedCurve> {
        let model = self.require_fit()?;
        let series = self.series.get(beta).ok_or_else(|| {
            KineticsError::Configuration(format!("no series at beta = {} K/min", beta))
        })?;
        CurveReconstructor::new(model)
            .with_tolerances(self.settings.ode)
            .reconstruct(series)
    }

    /// Ranking of the ideal mechanisms against the shape of the current fit.
    pub fn compare_mechanisms(
        &self,
        mechanisms: &[IdealMechanism],
    ) -> KineticsResult<MechanismComparison> {
        compare_fit(self.require_fit()?, mechanisms)
    }

    pub fn thermal_events(&self) -> KineticsResult<Analysis<ThermalEventTable>> {
        analyze_thermal_events(&self.series)
    }

    /// DSC peak parameters of the series recorded with a DSC signal.
    pub fn dsc_events(&self) -> KineticsResult<Analysis<DscEventTable>> {
        analyze_dsc_events(&self.series)
    }
}
