//! # Isoconversional analysis
//!
//! Model-free estimation of the activation energy as a function of conversion from a set of
//! heating rates. For every target α the temperature T(α) of each series is found by linear
//! interpolation against that series' own (α, T) samples, then one of four methods is applied:
//!
//! | Method | Regression | Y | X |
//! |--------|------------|---|---|
//! | Friedman | linear | ln(β·dα/dT) | 1/T |
//! | KAS | linear | ln(β/T²) | 1/T |
//! | OFW | linear, Eₐ × 0.921 (Doyle) | ln β | 1/T |
//! | Vyazovkin | non-linear, bounded scalar minimisation | | |
//!
//! For the linear methods `Eₐ = −slope·R` with R² and the standard error of the slope.
//!
//! The Vyazovkin method works on increments: for α past the first target and its predecessor
//! α_prev, the temperature integral `I(E) = ∫ exp(−E/RT) dT` over [T(α_prev), T(α)] is taken for
//! every series, and
//!
//! ```text
//! Φ(E) = Σ_{i≠j} | I_i(E)·β_j / (I_j(E)·β_i) − 1 |
//! ```
//!
//! is minimised over E ∈ [1, 500] kJ/mol with Brent's method. Each integral is solved as a
//! quadrature ODE on RustedSciThe's RK45, scaled by exp(−E/RT_b) at the upper limit so the
//! tolerances act on an integrand of order one. No R² or standard error is defined for the
//! method (NaN).
//!
//! ## Masking policy
//! An α with fewer than two usable heating rates is left out of the curve; it is never padded
//! with NaN and never raises. Only a curve with no α left at all is an error.

use crate::Kinetics::diagnostics::{Analysis, Diagnostics};
use crate::Kinetics::heating_rate_series::SeriesSet;
use crate::Kinetics::kinetics_error::{KineticsError, KineticsResult};
use crate::Kinetics::{EPS, R};
use crate::Utils::interpolation::{Pchip, interp};
use crate::Utils::ode::{Tolerances, integral};
use crate::Utils::statistics::{linear_regression, mean, sample_std};
use argmin::core::{CostFunction, Executor, State};
use argmin::solver::brent::BrentOpt;
use RustedSciThe::symbolic::symbolic_engine::Expr;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Doyle approximation correction applied to OFW energies
pub const DOYLE_FACTOR: f64 = 0.921;
/// Search interval of the Vyazovkin minimisation, J/mol
pub const VYAZOVKIN_BOUNDS: (f64, f64) = (1.0e3, 5.0e5);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, Display, EnumString,
)]
pub enum IsoMethod {
    Friedman,
    KAS,
    OFW,
    Vyazovkin,
}

impl IsoMethod {
    /// Linearised form used by the method, for table headers.
    pub fn equation(&self) -> &'static str {
        match self {
            IsoMethod::Friedman => "ln(β·dα/dT) = ln[A·f(α)] − Eₐ/(R·T)",
            IsoMethod::KAS => "ln(β/T²) = ln(A·R/(Eₐ·g(α))) − Eₐ/(R·T)",
            IsoMethod::OFW => "ln(β) = ln(A·Eₐ/(R·g(α))) − 5.331 − 1.052·Eₐ/(R·T)",
            IsoMethod::Vyazovkin => "min Φ(Eₐ) = Σ_{i≠j} |I(Eₐ,T_i)β_j / (I(Eₐ,T_j)β_i) − 1|",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EaPoint {
    pub alpha: f64,
    pub ea_kj: f64,
    pub r_squared: f64,
    pub std_err_kj: f64,
}

/// Activation energy profile Eₐ(α). Conversions are strictly increasing and every energy is finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EaCurve {
    method: IsoMethod,
    points: Vec<EaPoint>,
}

impl EaCurve {
    /// Rows with a non-finite energy are dropped; the remaining conversions must be strictly
    /// increasing and at least one row must survive.
    pub fn new(method: IsoMethod, points: Vec<EaPoint>) -> KineticsResult<Self> {
        let points: Vec<EaPoint> = points.into_iter().filter(|p| p.ea_kj.is_finite()).collect();
        if points.is_empty() {
            return Err(KineticsError::NumericalDomain(format!(
                "{}: no conversion produced a finite activation energy",
                method
            )));
        }
        if points.windows(2).any(|w| w[1].alpha <= w[0].alpha) {
            return Err(KineticsError::Configuration(
                "activation energy curve must have strictly increasing conversions".to_string(),
            ));
        }
        Ok(Self { method, points })
    }

    /// Curve with the same energy at every conversion, mostly useful for tests and for
    /// models with a single activation energy.
    pub fn constant(method: IsoMethod, alphas: &[f64], ea_kj: f64) -> KineticsResult<Self> {
        let points = alphas
            .iter()
            .map(|&alpha| EaPoint {
                alpha,
                ea_kj,
                r_squared: f64::NAN,
                std_err_kj: f64::NAN,
            })
            .collect();
        Self::new(method, points)
    }

    pub fn method(&self) -> IsoMethod {
        self.method
    }

    pub fn points(&self) -> &[EaPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn alphas(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.alpha).collect()
    }

    pub fn ea_kj(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.ea_kj).collect()
    }

    /// Eₐ(α) in kJ/mol, linear between rows, constant beyond the ends.
    pub fn ea_at(&self, alpha: f64) -> f64 {
        let xs = self.alphas();
        let ys = self.ea_kj();
        interp(alpha, &xs, &ys)
    }

    /// Eₐ(α) in J/mol.
    pub fn ea_j_at(&self, alpha: f64) -> f64 {
        self.ea_at(alpha) * 1000.0
    }

    /// Shape-preserving interpolant of Eₐ in J/mol over α.
    pub fn pchip_j(&self) -> KineticsResult<Pchip> {
        let ys = self.points.iter().map(|p| p.ea_kj * 1000.0).collect();
        Pchip::new(self.alphas(), ys).map_err(KineticsError::NumericalDomain)
    }

    pub fn mean_ea_kj(&self) -> f64 {
        mean(&self.ea_kj())
    }

    pub fn std_ea_kj(&self) -> f64 {
        sample_std(&self.ea_kj())
    }

    /// Energies of the rows with `amin <= α <= amax`.
    pub fn window(&self, amin: f64, amax: f64) -> Vec<f64> {
        self.points
            .iter()
            .filter(|p| p.alpha >= amin && p.alpha <= amax)
            .map(|p| p.ea_kj)
            .collect()
    }
}

/// Temperature of every series at one target conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaTemperatureRow {
    pub alpha: f64,
    /// (β, T) with `None` when the series never reaches α
    pub temperatures: Vec<(f64, Option<f64>)>,
}

/// One point of the linear regression of a linear method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionPoint {
    pub alpha: f64,
    pub beta: f64,
    /// 1/T, 1/K
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsoconversionalResult {
    pub ea_curve: EaCurve,
    pub alpha_temperature: Vec<AlphaTemperatureRow>,
    /// empty for the Vyazovkin method
    pub regression_points: Vec<RegressionPoint>,
}

/// Interval of one series between two consecutive conversions.
#[derive(Debug, Clone, Copy)]
struct Increment {
    beta: f64,
    t_prev: f64,
    t: f64,
}

impl Increment {
    /// ∫ exp(−E/RT) dT over the increment.
    fn temperature_integral(&self, e: f64, tol: Tolerances) -> Option<f64> {
        if self.t <= self.t_prev {
            return None;
        }
        let temp = Expr::Var("T".to_owned());
        let scaled = Expr::Exp(Box::new(
            Expr::Const(-e / R) * (Expr::Const(1.0) / temp - Expr::Const(1.0 / self.t)),
        ));
        let value = integral(scaled, "T", self.t_prev, self.t, tol).ok()?;
        let value = value * (-e / (R * self.t)).exp();
        value.is_finite().then_some(value)
    }
}

/// Vyazovkin objective Φ(E) over the increments of one conversion step.
struct VyazovkinObjective<'a> {
    increments: &'a [Increment],
    tolerances: Tolerances,
}

impl VyazovkinObjective<'_> {
    /// Φ(E) and the number of ordered pairs left out of the sum.
    fn phi(&self, e: f64) -> (f64, usize) {
        // one integral per series per evaluation
        let integrals: Vec<Option<f64>> = self
            .increments
            .iter()
            .map(|inc| inc.temperature_integral(e, self.tolerances))
            .collect();
        let mut phi = 0.0;
        let mut skipped = 0;
        for (i, inc_i) in self.increments.iter().enumerate() {
            for (j, inc_j) in self.increments.iter().enumerate() {
                if i == j {
                    continue;
                }
                match (integrals[i], integrals[j]) {
                    (Some(ii), Some(ij)) if ij.abs() >= 1e-100 && inc_i.beta.abs() >= 1e-100 => {
                        phi += (ii * inc_j.beta / (ij * inc_i.beta) - 1.0).abs();
                    }
                    _ => skipped += 1,
                }
            }
        }
        (phi, skipped)
    }
}

impl CostFunction for VyazovkinObjective<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, e: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.phi(*e).0)
    }
}

/// Solver over a set of heating-rate series.
pub struct IsoconversionalSolver<'a> {
    series: &'a SeriesSet,
    method: IsoMethod,
    tolerances: Tolerances,
    max_iters: u64,
}

impl<'a> IsoconversionalSolver<'a> {
    pub fn new(series: &'a SeriesSet, method: IsoMethod) -> Self {
        Self {
            series,
            method,
            tolerances: Tolerances::new(1e-8, 1e-10),
            max_iters: 500,
        }
    }

    /// RK45 tolerances of the Vyazovkin temperature integrals.
    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    /// Iteration budget of the Vyazovkin scalar minimisation.
    pub fn with_max_iters(mut self, max_iters: u64) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Computes Eₐ(α) at the requested conversions.
    pub fn solve(&self, alphas: &[f64]) -> KineticsResult<Analysis<IsoconversionalResult>> {
        if self.series.is_empty() {
            return Err(KineticsError::InsufficientData(
                "isoconversional analysis needs at least one heating-rate series".to_string(),
            ));
        }
        if alphas.is_empty() {
            return Err(KineticsError::Configuration(
                "no target conversions given".to_string(),
            ));
        }
        if let Some(a) = alphas.iter().find(|a| !(**a > 0.0 && **a < 1.0)) {
            return Err(KineticsError::Configuration(format!(
                "target conversion {} is outside (0, 1)",
                a
            )));
        }
        if alphas.windows(2).any(|w| w[1] <= w[0]) {
            return Err(KineticsError::Configuration(
                "target conversions must be strictly increasing".to_string(),
            ));
        }
        if self.series.len() < 2 {
            return Err(KineticsError::InsufficientData(format!(
                "{} needs at least two heating rates, got {}",
                self.method,
                self.series.len()
            )));
        }
        let mut diagnostics = Diagnostics::new();
        let alpha_temperature = self.alpha_temperature_table(alphas);
        let (points, regression_points) = match self.method {
            IsoMethod::Vyazovkin => (
                self.vyazovkin(&alpha_temperature, &mut diagnostics)?,
                Vec::new(),
            ),
            _ => self.linear(&alpha_temperature),
        };
        let requested = match self.method {
            IsoMethod::Vyazovkin => alphas.len() - 1,
            _ => alphas.len(),
        };
        let solved = points.len();
        let ea_curve = EaCurve::new(self.method, points)?;
        if solved < requested {
            diagnostics.info(
                &self.method.to_string(),
                format!(
                    "{} of {} conversions had fewer than two usable heating rates and were left out",
                    requested - solved,
                    requested
                ),
            );
        }
        info!(
            "{}: Eₐ solved at {} conversions, mean {:.2} kJ/mol",
            self.method,
            ea_curve.len(),
            ea_curve.mean_ea_kj()
        );
        Ok(Analysis::new(
            IsoconversionalResult {
                ea_curve,
                alpha_temperature,
                regression_points,
            },
            diagnostics,
        ))
    }

    fn alpha_temperature_table(&self, alphas: &[f64]) -> Vec<AlphaTemperatureRow> {
        alphas
            .iter()
            .map(|&alpha| AlphaTemperatureRow {
                alpha,
                temperatures: self
                    .series
                    .iter()
                    .map(|s| (s.beta(), s.temperature_at(alpha)))
                    .collect(),
            })
            .collect()
    }

    /// Friedman, KAS and OFW.
    fn linear(&self, table: &[AlphaTemperatureRow]) -> (Vec<EaPoint>, Vec<RegressionPoint>) {
        let mut points = Vec::new();
        let mut regression_points = Vec::new();
        for row in table {
            let mut xy: Vec<RegressionPoint> = Vec::new();
            for (series, &(beta, temp)) in self.series.iter().zip(row.temperatures.iter()) {
                let Some(t) = temp else { continue };
                let y = match self.method {
                    IsoMethod::Friedman => {
                        let dadt = interp(t, &series.temp_k(), &series.dadt());
                        if !(dadt.is_finite() && dadt > 0.0) {
                            continue;
                        }
                        (beta * dadt).ln()
                    }
                    IsoMethod::KAS => (beta / (t * t)).ln(),
                    _ => beta.ln(),
                };
                if !y.is_finite() {
                    continue;
                }
                xy.push(RegressionPoint {
                    alpha: row.alpha,
                    beta,
                    x: 1.0 / t,
                    y,
                });
            }
            if xy.len() < 2 {
                debug!("{}: alpha = {} has {} usable rates, skipped", self.method, row.alpha, xy.len());
                continue;
            }
            let x: Vec<f64> = xy.iter().map(|p| p.x).collect();
            let y: Vec<f64> = xy.iter().map(|p| p.y).collect();
            let Some(fit) = linear_regression(&x, &y) else {
                debug!("{}: alpha = {} has a degenerate abscissa, skipped", self.method, row.alpha);
                continue;
            };
            let factor = if self.method == IsoMethod::OFW {
                DOYLE_FACTOR
            } else {
                1.0
            };
            points.push(EaPoint {
                alpha: row.alpha,
                ea_kj: -fit.slope * R / 1000.0 * factor,
                r_squared: fit.r_squared,
                std_err_kj: fit.se_slope * R / 1000.0 * factor,
            });
            regression_points.extend(xy);
        }
        (points, regression_points)
    }

    fn vyazovkin(
        &self,
        table: &[AlphaTemperatureRow],
        diagnostics: &mut Diagnostics,
    ) -> KineticsResult<Vec<EaPoint>> {
        let mut points = Vec::new();
        let mut skipped_pairs = 0usize;
        for k in 1..table.len() {
            let (prev, row) = (&table[k - 1], &table[k]);
            let increments: Vec<Increment> = prev
                .temperatures
                .iter()
                .zip(row.temperatures.iter())
                .filter_map(|(&(beta, t_prev), &(_, t))| match (t_prev, t) {
                    (Some(t_prev), Some(t)) => Some(Increment { beta, t_prev, t }),
                    _ => None,
                })
                .collect();
            let usable = increments.iter().filter(|i| i.t > i.t_prev).count();
            if usable < 2 {
                debug!(
                    "Vyazovkin: alpha = {} has {} usable increments, skipped",
                    row.alpha, usable
                );
                continue;
            }
            let objective = VyazovkinObjective {
                increments: &increments,
                tolerances: self.tolerances,
            };
            let e_opt = self.minimize(VyazovkinObjective {
                increments: &increments,
                tolerances: self.tolerances,
            })?;
            let (_, skipped) = objective.phi(e_opt);
            skipped_pairs += skipped;
            points.push(EaPoint {
                alpha: row.alpha,
                ea_kj: e_opt / 1000.0,
                r_squared: f64::NAN,
                std_err_kj: f64::NAN,
            });
        }
        if skipped_pairs > 0 {
            diagnostics.info(
                "Vyazovkin",
                format!(
                    "{} heating-rate pairs with a non-positive temperature increment or a vanishing integral were left out of the objective",
                    skipped_pairs
                ),
            );
        }
        Ok(points)
    }

    fn minimize(&self, objective: VyazovkinObjective<'_>) -> KineticsResult<f64> {
        let solver = BrentOpt::new(VYAZOVKIN_BOUNDS.0, VYAZOVKIN_BOUNDS.1);
        let result = Executor::new(objective, solver)
            .configure(|state| state.max_iters(self.max_iters))
            .run()
            .map_err(|e| KineticsError::Convergence(format!("Vyazovkin minimisation: {}", e)))?;
        let best = result.state().get_best_param().copied().ok_or_else(|| {
            KineticsError::Convergence("Vyazovkin minimisation returned no parameter".to_string())
        })?;
        if !best.is_finite() {
            return Err(KineticsError::NumericalDomain(
                "Vyazovkin minimisation returned a non-finite energy".to_string(),
            ));
        }
        Ok(best.clamp(VYAZOVKIN_BOUNDS.0, VYAZOVKIN_BOUNDS.1))
    }
}

/// Convenience wrapper: isoconversional curve at `alphas` with default numerical settings.
pub fn solve_isoconversional(
    series: &SeriesSet,
    method: IsoMethod,
    alphas: &[f64],
) -> KineticsResult<Analysis<IsoconversionalResult>> {
    IsoconversionalSolver::new(series, method).solve(alphas)
}

/// Mean Eₐ in J/mol used to seed the autocatalytic fits, 100 kJ/mol when the mean is unusable.
pub(crate) fn usable_mean_ea_j(curve: &EaCurve) -> f64 {
    let m = curve.mean_ea_kj() * 1000.0;
    if m.is_finite() && m > EPS { m } else { 100_000.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_temperature_integral_against_trapezoid() {
        let inc = Increment {
            beta: 10.0,
            t_prev: 505.0,
            t: 512.0,
        };
        let e = 120e3;
        let n = 20000;
        let h = (inc.t - inc.t_prev) / n as f64;
        let f = |temp: f64| (-e / (R * temp)).exp();
        let trapezoid: f64 = (0..n)
            .map(|i| {
                let a = inc.t_prev + h * i as f64;
                0.5 * h * (f(a) + f(a + h))
            })
            .sum();
        let value = inc.temperature_integral(e, Tolerances::new(1e-8, 1e-10)).unwrap();
        assert_relative_eq!(value, trapezoid, max_relative = 1e-6);
        let empty = Increment { t: 505.0, ..inc };
        assert!(empty.temperature_integral(e, Tolerances::default()).is_none());
    }
}
