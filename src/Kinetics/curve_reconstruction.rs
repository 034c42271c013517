//! # Curve reconstruction
//!
//! Integrates a fitted rate law along the linear heating program of one series,
//!
//! ```text
//! dα/dt = r(α, T₀ + β·t)        r in 1/min, β in K/min, t in min
//! ```
//!
//! from the first to the last temperature of the series, starting at its first measured α,
//! and reports α(T) and the mass curve TG = m₀ − α·(m₀ − m∞) on the series' own temperature
//! grid, together with the deviation from the measured curves.
//!
//! The ODE goes to RustedSciThe's RK45 with the rate law in symbolic form; the run stops
//! once α reaches [`ALPHA_STOP`] and the remaining grid holds that value.

use crate::Kinetics::EPS;
use crate::Kinetics::heating_rate_series::HeatingRateSeries;
use crate::Kinetics::kinetics_error::{KineticsError, KineticsResult};
use crate::Kinetics::model_fitting::FittedModel;
use crate::Kinetics::rate_laws::{ModelKind, RateFunction, RateModel};
use crate::Utils::ode::{OdeError, ScalarIvp, Tolerances};
use RustedSciThe::symbolic::symbolic_engine::Expr;
use log::info;
use serde::{Deserialize, Serialize};

/// conversion at which the heating-program integration stops
pub const ALPHA_STOP: f64 = 0.9999;
/// accepted steps across the heating program, at least
const PROGRAM_STEPS: usize = 500;

/// α of `model` on `temp_grid` (increasing, K) under heating at `beta` K/min from `alpha0`.
pub(crate) fn heating_program_alpha(
    model: &RateModel,
    beta: f64,
    temp_grid: &[f64],
    alpha0: f64,
    tol: Tolerances,
) -> Result<Vec<f64>, OdeError> {
    let (t_first, t_last) = match (temp_grid.first(), temp_grid.last()) {
        (Some(&a), Some(&b)) => (a, b),
        _ => return Err(OdeError::InvalidGrid),
    };
    let alpha0 = alpha0.clamp(EPS, 1.0);
    if t_last <= t_first || alpha0 >= ALPHA_STOP {
        return Ok(vec![alpha0; temp_grid.len()]);
    }
    let time: Vec<f64> = temp_grid.iter().map(|t| (t - t_first) / beta).collect();
    let temp = Expr::Const(t_first) + Expr::Const(beta) * Expr::Var("t".to_owned());
    let rhs = model.rate_expr(&Expr::Var("a".to_owned()), &temp);
    let trajectory = ScalarIvp::new(rhs, "a", "t", tol)
        .with_min_steps(PROGRAM_STEPS)
        .with_stop(ALPHA_STOP)
        .solve(0.0, alpha0, (t_last - t_first) / beta)?;
    let alpha = trajectory.sample(&time, |t, a| {
        model.rate_per_min(a.clamp(0.0, 1.0), t_first + beta * t)
    })?;
    Ok(alpha.into_iter().map(|a| a.clamp(0.0, 1.0)).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedPoint {
    pub temp_k: f64,
    pub alpha_model: f64,
    pub tg_pct_model: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedCurve {
    pub beta: f64,
    pub model_kind: ModelKind,
    pub points: Vec<ReconstructedPoint>,
    /// root mean square deviation from the measured α
    pub rmse_alpha: f64,
    /// root mean square deviation from the measured mass, %
    pub rmse_tg: f64,
}

pub struct CurveReconstructor<'a> {
    model: &'a FittedModel,
    tolerances: Tolerances,
}

impl<'a> CurveReconstructor<'a> {
    pub fn new(model: &'a FittedModel) -> Self {
        Self {
            model,
            tolerances: Tolerances::default(),
        }
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn reconstruct(&self, series: &HeatingRateSeries) -> KineticsResult<ReconstructedCurve> {
        let beta = series.beta();
        let grid = series.temp_k();
        let first = series.samples().first().ok_or_else(|| {
            KineticsError::Reconstruction(format!("series at beta = {} is empty", beta))
        })?;
        let states =
            heating_program_alpha(&self.model.model, beta, &grid, first.alpha, self.tolerances)
                .map_err(|e| {
                    KineticsError::Reconstruction(format!(
                        "ODE solver failed for beta = {}: {}",
                        beta, e
                    ))
                })?;
        let (m0, m_inf) = series.mass_endpoints();
        let points: Vec<ReconstructedPoint> = grid
            .iter()
            .zip(states.iter())
            .map(|(&temp_k, &alpha_model)| {
                ReconstructedPoint {
                    temp_k,
                    alpha_model,
                    tg_pct_model: m0 - alpha_model * (m0 - m_inf),
                }
            })
            .collect();
        let rmse_alpha = rmse(
            series.samples().iter().map(|s| s.alpha),
            points.iter().map(|p| p.alpha_model),
        );
        let rmse_tg = rmse(
            series.samples().iter().map(|s| s.tg_pct),
            points.iter().map(|p| p.tg_pct_model),
        );
        info!(
            "{} reconstruction at beta = {} K/min: RMSE alpha = {:.4}, RMSE TG = {:.3} %",
            self.model.kind, beta, rmse_alpha, rmse_tg
        );
        Ok(ReconstructedCurve {
            beta,
            model_kind: self.model.kind,
            points,
            rmse_alpha,
            rmse_tg,
        })
    }
}

fn rmse(observed: impl Iterator<Item = f64>, modelled: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = observed
        .zip(modelled)
        .filter(|(o, m)| o.is_finite() && m.is_finite())
        .fold((0.0, 0usize), |(s, n), (o, m)| (s + (o - m).powi(2), n + 1));
    if n == 0 { f64::NAN } else { (sum / n as f64).sqrt() }
}
