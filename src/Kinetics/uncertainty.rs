//! # Isothermal lifetime prediction
//!
//! Time needed to reach conversion α at a constant temperature T₀:
//!
//! ```text
//! t(α) = ∫_ε^α dα' / (r(α', T₀) + 1e-30)          r in 1/s
//! ```
//!
//! The integral is solved once per curve as the ODE dt/dα = 1/(r + 1e-30) on RustedSciThe's
//! RK45, and t is read off at every tabulated conversion.
//!
//! For parametric models with a usable covariance matrix C the uncertainty of t(α) is
//! propagated with the delta method:
//!
//! ```text
//! J = ∂t/∂θ        var t = Jᵀ C J        CI = t ± 1.96 √var
//! ```
//!
//! with ∂t/∂θ(α) = ∫_ε^α −(∂r/∂θ)/r² dα', integrated the same way from the analytic rate
//! gradient, one solve per parameter. The lower bound of the interval is clipped at zero.
//! Times are reported in seconds and days.
//!
//! NPA has no covariance, and CKA carries a covariance that excludes its fixed Eₐ; both, as
//! well as any fit whose covariance could not be estimated, are predicted without an interval.

use crate::Kinetics::EPS;
use crate::Kinetics::diagnostics::{Analysis, Diagnostics};
use crate::Kinetics::kinetics_error::{KineticsResult, check_temperature};
use crate::Kinetics::model_fitting::FittedModel;
use crate::Kinetics::rate_laws::{ModelKind, RateFunction, RateModel};
use crate::Utils::ode::{OdeError, ScalarIvp, Tolerances};
use crate::Utils::statistics::linspace;
use RustedSciThe::symbolic::symbolic_engine::Expr;
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: f64 = 86400.0;
/// conversions evaluated when a confidence interval is computed
pub const POINTS_WITH_CI: usize = 50;
/// conversions evaluated without a confidence interval
pub const POINTS_WITHOUT_CI: usize = 99;
/// two-sided 95 % normal quantile
pub const Z_95: f64 = 1.96;
/// floor added to the rate in 1/s
pub const RATE_FLOOR: f64 = 1e-30;
/// accepted steps along the conversion axis, at least
const TIME_STEPS: usize = 1000;

/// ∫_ε^α integrand dα' at the increasing conversions `alphas`; `slope` is the integrand
/// evaluated numerically, for resampling.
fn conversion_integral(
    integrand: Expr,
    slope: impl Fn(f64) -> f64,
    alphas: &[f64],
    tol: Tolerances,
) -> Result<Vec<f64>, OdeError> {
    let alpha_end = alphas.last().copied().ok_or(OdeError::InvalidGrid)?;
    let trajectory = ScalarIvp::new(integrand, "t", "a", tol)
        .with_min_steps(TIME_STEPS)
        .solve(EPS, 0.0, alpha_end)?;
    trajectory.sample(alphas, |a, _| slope(a))
}

/// Per-minute rate in `a` plus [`RATE_FLOOR`] converted to 1/min.
fn floored_rate_expr(model: &RateModel, temp_k: f64) -> Expr {
    model.rate_expr(&Expr::Var("a".to_owned()), &Expr::Const(temp_k))
        + Expr::Const(60.0 * RATE_FLOOR)
}

/// t(α) in seconds at the increasing conversions `alphas`, integrated from α = ε.
fn conversion_times(
    model: &RateModel,
    temp_k: f64,
    alphas: &[f64],
    tol: Tolerances,
) -> Result<Vec<f64>, OdeError> {
    let rhs = Expr::Const(60.0) / floored_rate_expr(model, temp_k);
    conversion_integral(
        rhs,
        |a| 1.0 / (model.rate_per_s(a, temp_k) + RATE_FLOOR),
        alphas,
        tol,
    )
}

/// ∂t/∂θ in s at `alphas` for every fitted parameter θ, NaN where the integration failed.
fn time_sensitivities(
    model: &RateModel,
    temp_k: f64,
    alphas: &[f64],
    tol: Tolerances,
) -> Vec<Vec<f64>> {
    let alpha = Expr::Var("a".to_owned());
    let temp = Expr::Const(temp_k);
    let rate = floored_rate_expr(model, temp_k);
    // rates per minute: −(g/60)/(r/60)² = −60·g/r²
    let slope = |a: f64, i: usize| {
        let r = model.rate_per_s(a, temp_k);
        if r.abs() < RATE_FLOOR {
            return 0.0;
        }
        -(model.gradient_per_min(a, temp_k)[i] / 60.0) / (r * r)
    };
    model
        .gradient_expr(&alpha, &temp)
        .into_iter()
        .enumerate()
        .map(|(i, grad)| {
            let rhs = Expr::Const(-60.0) * grad / (rate.clone() * rate.clone());
            conversion_integral(rhs, |a| slope(a, i), alphas, tol).unwrap_or_else(|e| {
                debug!("sensitivity {} failed: {}", i, e);
                vec![f64::NAN; alphas.len()]
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionPoint {
    pub alpha: f64,
    pub t_s: f64,
    pub t_days: f64,
    pub variance_days2: f64,
    pub ci_lower_days: f64,
    pub ci_upper_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionCurve {
    pub temperature_k: f64,
    pub model_kind: ModelKind,
    pub has_confidence_interval: bool,
    pub points: Vec<PredictionPoint>,
}

impl PredictionCurve {
    /// Predicted time in days at conversion `alpha`, linear between tabulated points.
    pub fn days_at(&self, alpha: f64) -> f64 {
        let xs: Vec<f64> = self.points.iter().map(|p| p.alpha).collect();
        let ys: Vec<f64> = self.points.iter().map(|p| p.t_days).collect();
        crate::Utils::interpolation::interp(alpha, &xs, &ys)
    }
}

pub struct UncertaintyPropagator<'a> {
    model: &'a FittedModel,
    tolerances: Tolerances,
}

impl<'a> UncertaintyPropagator<'a> {
    pub fn new(model: &'a FittedModel) -> Self {
        Self {
            model,
            tolerances: Tolerances::new(1e-8, 1e-12),
        }
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    /// Covariance usable for the delta method, with the reason when it is not.
    fn usable_covariance(&self) -> Result<&'a DMatrix<f64>, String> {
        match self.model.kind {
            ModelKind::Npa => return Err("NPA has no parameter covariance".to_string()),
            ModelKind::Cka => {
                return Err(
                    "CKA covariance does not include the fixed activation energy".to_string(),
                );
            }
            _ => {}
        }
        let cov = self
            .model
            .covariance
            .as_ref()
            .ok_or_else(|| "covariance matrix is missing".to_string())?;
        let n = self.model.model.params().len();
        if cov.nrows() != n || cov.ncols() != n {
            return Err(format!(
                "covariance is {}x{} for {} parameters",
                cov.nrows(),
                cov.ncols(),
                n
            ));
        }
        if cov.iter().any(|v| !v.is_finite()) {
            return Err("covariance matrix is not finite".to_string());
        }
        Ok(cov)
    }

    /// Conversion times at `temp_k` with a 95 % interval where the model allows one.
    pub fn predict(&self, temp_k: f64) -> KineticsResult<Analysis<PredictionCurve>> {
        check_temperature(temp_k)?;
        let stage = format!("Prediction {}", self.model.kind);
        let mut diagnostics = Diagnostics::new();
        let cov = match self.usable_covariance() {
            Ok(c) => Some(c),
            Err(reason) => {
                diagnostics.warning(
                    &stage,
                    format!("{}; predicting without confidence interval", reason),
                );
                None
            }
        };
        let n_points = if cov.is_some() {
            POINTS_WITH_CI
        } else {
            POINTS_WITHOUT_CI
        };
        let alphas = linspace(0.01, 0.99, n_points);
        let times = match conversion_times(&self.model.model, temp_k, &alphas, self.tolerances) {
            Ok(t) => t,
            Err(e) => {
                debug!("{}: time integral failed: {}", stage, e);
                vec![f64::NAN; alphas.len()]
            }
        };
        let failed = times.iter().filter(|t| !t.is_finite()).count();
        let sensitivities =
            cov.map(|_| time_sensitivities(&self.model.model, temp_k, &alphas, self.tolerances));
        let points: Vec<PredictionPoint> = alphas
            .iter()
            .zip(times.iter())
            .enumerate()
            .map(|(k, (&alpha, &t_s))| {
                let t_days = t_s / SECONDS_PER_DAY;
                match (cov, sensitivities.as_ref()) {
                    (Some(c), Some(sens)) => {
                        let j = DVector::from_iterator(c.nrows(), sens.iter().map(|s| s[k]));
                        let var_s2 = (j.transpose() * c * &j)[(0, 0)];
                        let half_width = Z_95 * var_s2.sqrt();
                        // NaN passes through, negative bounds are clipped
                        let lower = (t_s - half_width) / SECONDS_PER_DAY;
                        PredictionPoint {
                            alpha,
                            t_s,
                            t_days,
                            variance_days2: var_s2 / SECONDS_PER_DAY.powi(2),
                            ci_lower_days: if lower < 0.0 { 0.0 } else { lower },
                            ci_upper_days: (t_s + half_width) / SECONDS_PER_DAY,
                        }
                    }
                    _ => PredictionPoint {
                        alpha,
                        t_s,
                        t_days,
                        variance_days2: f64::NAN,
                        ci_lower_days: f64::NAN,
                        ci_upper_days: f64::NAN,
                    },
                }
            })
            .collect();
        if failed > 0 {
            diagnostics.warning(
                &stage,
                format!("time integral failed at {} of {} conversions", failed, n_points),
            );
        }
        debug!("{}: {} points at T0 = {} K", stage, points.len(), temp_k);
        if let Some(last) = points.last() {
            info!(
                "{}: alpha = {:.2} reached after {:.4e} days at {} K",
                stage, last.alpha, last.t_days, temp_k
            );
        }
        Ok(Analysis::new(
            PredictionCurve {
                temperature_k: temp_k,
                model_kind: self.model.kind,
                has_confidence_interval: cov.is_some(),
                points,
            },
            diagnostics,
        ))
    }
}

/// Lifetime prediction with the default RK45 tolerances.
pub fn predict_lifetime(
    model: &FittedModel,
    temp_k: f64,
) -> KineticsResult<Analysis<PredictionCurve>> {
    UncertaintyPropagator::new(model).predict(temp_k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Kinetics::R;
    use crate::Kinetics::kinetics_error::KineticsError;
    use crate::Kinetics::rate_laws::{EaSource, RateModel, SestakBerggren};
    use approx::assert_relative_eq;

    fn first_order_fit(kind: ModelKind, covariance: Option<DMatrix<f64>>) -> FittedModel {
        let ln_a = (1e10_f64 * 60.0).ln();
        let model = SestakBerggren::new(0.0, 1.0, 0.0, ln_a, EaSource::Fixed { ea_j: 120e3 });
        FittedModel {
            model: RateModel::from(model),
            kind,
            param_order: vec!["m".into(), "n".into(), "p".into(), "logA".into()],
            raw: vec![0.0, 1.0, 0.0, ln_a],
            derived: Vec::new(),
            covariance,
            r_squared: 1.0,
            n_samples: 100,
            cost: 0.0,
            alpha_range: (0.1, 0.9),
        }
    }

    #[test]
    fn test_first_order_time_matches_closed_form() {
        // GlobalFit kind with a fixed energy still follows the first-order law
        let cov = DMatrix::from_diagonal(&DVector::from_vec(vec![1e-4, 1e-4, 1e-4, 1e-3]));
        let fit = first_order_fit(ModelKind::GlobalFit, Some(cov));
        let t0 = 450.0;
        let curve = predict_lifetime(&fit, t0).unwrap().value;
        assert!(curve.has_confidence_interval);
        assert_eq!(curve.points.len(), POINTS_WITH_CI);
        let k = 1e10 * (-120e3 / (R * t0)).exp();
        for p in curve.points.iter().filter(|p| p.alpha > 0.05 && p.alpha < 0.95) {
            let exact = (-(1.0 - p.alpha).ln() + (1.0 - EPS).ln()) / k;
            assert_relative_eq!(p.t_s, exact, max_relative = 1e-4);
            assert!(p.ci_lower_days >= 0.0);
            assert!(p.ci_lower_days <= p.t_days && p.t_days <= p.ci_upper_days);
        }
    }

    #[test]
    fn test_ln_a_sensitivity() {
        // t ∝ 1/A, so ∂t/∂lnA = −t and the half width is 1.96·σ_lnA·t
        let sigma = 0.05_f64;
        let mut cov = DMatrix::zeros(4, 4);
        cov[(3, 3)] = sigma * sigma;
        let fit = first_order_fit(ModelKind::GlobalFit, Some(cov));
        let curve = predict_lifetime(&fit, 450.0).unwrap().value;
        let p = curve.points[25];
        assert_relative_eq!(
            p.ci_upper_days - p.t_days,
            Z_95 * sigma * p.t_days,
            max_relative = 1e-3
        );
    }

    #[test]
    fn test_integrated_sensitivity_matches_difference() {
        let t0 = 450.0;
        let alphas = linspace(0.1, 0.9, 5);
        let tol = Tolerances::new(1e-10, 1e-14);
        let law = |n: f64| -> RateModel {
            SestakBerggren::new(0.2, n, 0.0, 27.0, EaSource::Fixed { ea_j: 120e3 }).into()
        };
        let sens = time_sensitivities(&law(1.2), t0, &alphas, tol);
        assert_eq!(sens.len(), 4);
        let h = 1e-4;
        let up = conversion_times(&law(1.2 + h), t0, &alphas, tol).unwrap();
        let down = conversion_times(&law(1.2 - h), t0, &alphas, tol).unwrap();
        for k in 0..alphas.len() {
            let central = (up[k] - down[k]) / (2.0 * h);
            assert_relative_eq!(sens[1][k], central, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_cka_and_missing_covariance_skip_interval() {
        let cov = DMatrix::identity(4, 4);
        for fit in [
            first_order_fit(ModelKind::Cka, Some(cov)),
            first_order_fit(ModelKind::GlobalFit, None),
        ] {
            let result = predict_lifetime(&fit, 450.0).unwrap();
            assert!(!result.value.has_confidence_interval);
            assert_eq!(result.value.points.len(), POINTS_WITHOUT_CI);
            assert!(result.value.points.iter().all(|p| p.ci_lower_days.is_nan()));
            assert!(result.diagnostics.has_warnings());
        }
    }

    #[test]
    fn test_invalid_temperature() {
        let fit = first_order_fit(ModelKind::GlobalFit, None);
        assert!(matches!(
            predict_lifetime(&fit, 0.0),
            Err(KineticsError::Configuration(_))
        ));
        assert!(matches!(
            predict_lifetime(&fit, f64::NAN),
            Err(KineticsError::Configuration(_))
        ));
    }

    #[test]
    fn test_times_increase_with_conversion() {
        let fit = first_order_fit(ModelKind::GlobalFit, None);
        let curve = predict_lifetime(&fit, 450.0).unwrap().value;
        assert!(curve.points.windows(2).all(|w| w[1].t_s > w[0].t_s));
        assert_relative_eq!(
            curve.days_at(curve.points[10].alpha),
            curve.points[10].t_days
        );
    }
}
