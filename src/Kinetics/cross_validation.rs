//! # Leave-one-heating-rate-out cross-validation
//!
//! For every heating rate β of the set, the model is refitted on the remaining series (with
//! the isoconversional curve recomputed on that training subset with the same method and α
//! targets) and used to predict the rate of the held-out series. The sum of squared errors of
//! the predicted rate (1/min) against β·dα/dT over the held-out samples inside the α window
//! measures how well the model transfers to an unseen heating rate.
//!
//! The raw SSE carries the units of the rate squared and so grows with β²: the same relative
//! misfit costs 16 times more at 20 K/min than at 5 K/min. Folds are therefore compared by
//! the relative SSE, the SSE divided by Σ observed² over the same samples.
//!
//! A fold that fails is recorded with its reason; it never aborts the other folds.

use crate::Kinetics::diagnostics::{Analysis, Diagnostics};
use crate::Kinetics::heating_rate_series::{HeatingRateSeries, SeriesSet};
use crate::Kinetics::isoconversional::{IsoMethod, IsoconversionalSolver};
use crate::Kinetics::kinetics_error::{KineticsError, KineticsResult, check_alpha_range};
use crate::Kinetics::model_fitting::{FittedModel, ModelFitter, predict_rate_curve};
use crate::Kinetics::rate_laws::{ModelKind, clip_alpha};
use crate::Utils::LM_optimization::LMSettings;
use crate::Utils::statistics::{mean, sample_std};
use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const MIN_HEATING_RATES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldFit {
    pub sse: f64,
    /// sse / Σ observed²
    pub relative_sse: f64,
    /// held-out samples that entered the SSE
    pub n_points: usize,
    /// fitted raw parameters, by name
    pub params: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldOutcome {
    pub held_out_beta: f64,
    pub result: Result<FoldFit, String>,
}

impl FoldOutcome {
    /// SSE of the fold, NaN if the fold failed.
    pub fn sse(&self) -> f64 {
        match &self.result {
            Ok(fit) => fit.sse,
            Err(_) => f64::NAN,
        }
    }

    /// Relative SSE of the fold, NaN if the fold failed.
    pub fn relative_sse(&self) -> f64 {
        match &self.result {
            Ok(fit) => fit.relative_sse,
            Err(_) => f64::NAN,
        }
    }
}

/// Mean and standard deviation of one parameter over the successful folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpread {
    pub name: String,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub kind: ModelKind,
    pub folds: Vec<FoldOutcome>,
}

impl CrossValidationReport {
    pub fn finite_sse(&self) -> Vec<f64> {
        self.folds
            .iter()
            .map(|f| f.sse())
            .filter(|s| s.is_finite())
            .collect()
    }

    pub fn mean_sse(&self) -> f64 {
        mean(&self.finite_sse())
    }

    pub fn std_sse(&self) -> f64 {
        sample_std(&self.finite_sse())
    }

    pub fn finite_relative_sse(&self) -> Vec<f64> {
        self.folds
            .iter()
            .map(|f| f.relative_sse())
            .filter(|s| s.is_finite())
            .collect()
    }

    pub fn mean_relative_sse(&self) -> f64 {
        mean(&self.finite_relative_sse())
    }

    /// Largest over smallest relative SSE of the successful folds, NaN with fewer than two.
    pub fn relative_sse_spread(&self) -> f64 {
        let values = self.finite_relative_sse();
        if values.len() < 2 {
            return f64::NAN;
        }
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        max / min
    }

    pub fn n_failed(&self) -> usize {
        self.folds.iter().filter(|f| f.result.is_err()).count()
    }

    pub fn fold(&self, beta: f64) -> Option<&FoldOutcome> {
        self.folds.iter().find(|f| f.held_out_beta == beta)
    }

    /// Spread of every parameter over the successful folds, in the order of the first one.
    pub fn parameter_spread(&self) -> Vec<ParameterSpread> {
        let fits: Vec<&FoldFit> = self
            .folds
            .iter()
            .filter_map(|f| f.result.as_ref().ok())
            .collect();
        let Some(first) = fits.first() else {
            return Vec::new();
        };
        first
            .params
            .iter()
            .map(|(name, _)| {
                let values: Vec<f64> = fits
                    .iter()
                    .filter_map(|fit| fit.params.iter().find(|(n, _)| n == name).map(|p| p.1))
                    .collect();
                ParameterSpread {
                    name: name.clone(),
                    mean: mean(&values),
                    std: sample_std(&values),
                }
            })
            .collect()
    }
}

pub struct CrossValidator<'a> {
    series: &'a SeriesSet,
    kind: ModelKind,
    method: IsoMethod,
    iso_alphas: Vec<f64>,
    alpha_range: (f64, f64),
    settings: LMSettings,
}

impl<'a> CrossValidator<'a> {
    /// `method` and `iso_alphas` define the isoconversional curve recomputed in every fold;
    /// `amin`/`amax` the fitting window.
    pub fn new(
        series: &'a SeriesSet,
        kind: ModelKind,
        method: IsoMethod,
        iso_alphas: &[f64],
        amin: f64,
        amax: f64,
    ) -> KineticsResult<Self> {
        check_alpha_range(amin, amax)?;
        Ok(Self {
            series,
            kind,
            method,
            iso_alphas: iso_alphas.to_vec(),
            alpha_range: (amin, amax),
            settings: LMSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: LMSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn run(&self) -> KineticsResult<Analysis<CrossValidationReport>> {
        let betas = self.series.betas();
        if betas.len() < MIN_HEATING_RATES {
            return Err(KineticsError::InsufficientData(format!(
                "cross-validation needs at least {} heating rates, got {}",
                MIN_HEATING_RATES,
                betas.len()
            )));
        }
        let stage = format!("CV {}", self.kind);
        let mut diagnostics = Diagnostics::new();
        let mut folds = Vec::with_capacity(betas.len());
        for (i, &beta) in betas.iter().enumerate() {
            info!(
                "{}: fold {}/{}, validating beta = {} K/min",
                stage,
                i + 1,
                betas.len(),
                beta
            );
            let result = match self.series.get(beta) {
                Some(held_out) => self.fold(beta, held_out).map_err(|e| e.to_string()),
                None => Err(format!("no series at beta = {}", beta)),
            };
            if let Err(reason) = &result {
                warn!("{}: fold beta = {} failed: {}", stage, beta, reason);
                diagnostics.warning(&stage, format!("fold beta = {} failed: {}", beta, reason));
            }
            folds.push(FoldOutcome {
                held_out_beta: beta,
                result,
            });
        }
        Ok(Analysis::new(
            CrossValidationReport {
                kind: self.kind,
                folds,
            },
            diagnostics,
        ))
    }

    fn fold(&self, beta: f64, held_out: &HeatingRateSeries) -> KineticsResult<FoldFit> {
        let training = self.series.without(beta);
        let fitted = self.fit_training(&training)?;
        let HeldOutError { sse, sum_sq_observed, n_points } = held_out_sse(&fitted, held_out);
        if n_points == 0 {
            return Err(KineticsError::InsufficientData(format!(
                "held-out series beta = {} has no finite samples in the alpha window",
                beta
            )));
        }
        Ok(FoldFit {
            sse,
            relative_sse: sse / sum_sq_observed,
            n_points,
            params: fitted
                .param_order
                .iter()
                .cloned()
                .zip(fitted.raw.iter().copied())
                .collect(),
        })
    }

    fn fit_training(&self, training: &SeriesSet) -> KineticsResult<FittedModel> {
        let iso = IsoconversionalSolver::new(training, self.method).solve(&self.iso_alphas)?;
        let (amin, amax) = self.alpha_range;
        let fitted = ModelFitter::new(training, &iso.value.ea_curve, amin, amax)?
            .with_settings(self.settings)
            .fit(self.kind)?;
        Ok(fitted.value)
    }
}

/// Misfit of a model on one held-out series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldOutError {
    pub sse: f64,
    pub sum_sq_observed: f64,
    pub n_points: usize,
}

/// SSE of the predicted rate against β·dα/dT over the finite samples of `series` inside the
/// model's α window, with the sum of squares of the observed rates over the same samples.
pub fn held_out_sse(model: &FittedModel, series: &HeatingRateSeries) -> HeldOutError {
    let (amin, amax) = model.alpha_range;
    let mut err = HeldOutError {
        sse: 0.0,
        sum_sq_observed: 0.0,
        n_points: 0,
    };
    for point in predict_rate_curve(&model.model, series) {
        let (a, _) = clip_alpha(point.alpha);
        if a < amin || a > amax || !point.observed.is_finite() || !point.predicted.is_finite() {
            continue;
        }
        err.sse += (point.predicted - point.observed).powi(2);
        err.sum_sq_observed += point.observed.powi(2);
        err.n_points += 1;
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_statistics_skip_failed_folds() {
        let report = CrossValidationReport {
            kind: ModelKind::Cka,
            folds: vec![
                FoldOutcome {
                    held_out_beta: 5.0,
                    result: Ok(FoldFit {
                        sse: 1.0,
                        relative_sse: 0.01,
                        n_points: 10,
                        params: vec![("m".to_string(), 0.1), ("n".to_string(), 1.0)],
                    }),
                },
                FoldOutcome {
                    held_out_beta: 10.0,
                    result: Err("did not converge".to_string()),
                },
                FoldOutcome {
                    held_out_beta: 20.0,
                    result: Ok(FoldFit {
                        sse: 3.0,
                        relative_sse: 0.04,
                        n_points: 12,
                        params: vec![("m".to_string(), 0.3), ("n".to_string(), 1.0)],
                    }),
                },
            ],
        };
        assert_eq!(report.n_failed(), 1);
        assert!(report.fold(10.0).unwrap().sse().is_nan());
        assert_eq!(report.finite_sse(), vec![1.0, 3.0]);
        assert!((report.mean_sse() - 2.0).abs() < 1e-12);
        assert!(report.fold(10.0).unwrap().relative_sse().is_nan());
        assert!((report.relative_sse_spread() - 4.0).abs() < 1e-12);
        let spread = report.parameter_spread();
        assert_eq!(spread.len(), 2);
        assert_eq!(spread[0].name, "m");
        assert!((spread[0].mean - 0.2).abs() < 1e-12);
        assert!(spread[1].std.abs() < 1e-12);
    }
}
