//! # Bounded, robust least squares on the `levenberg-marquardt` crate
//!
//! Minimises `cost(x) = 0.5 * Σ ρ(f_i(x)²)` subject to box constraints `lo <= x <= hi`.
//! The minimisation itself is the MINPACK-style solver of `levenberg-marquardt`; this module
//! only adapts the problem to it:
//!
//! - Box constraints by reparametrisation (as in MINUIT and lmfit). The solver works on an
//!   unbounded internal vector u:
//!   - two-sided: x = lo + (hi − lo)·(sin u + 1)/2
//!   - lower only: x = lo − 1 + √(u² + 1)
//!   - upper only: x = hi + 1 − √(u² + 1)
//!
//!   and the Jacobian columns are multiplied by dx/du. A start on a bound is moved slightly
//!   inside, where dx/du does not vanish.
//! - Soft-L1 loss ρ(z) = 2(√(1+z) − 1) by rescaling every residual to f̃ with f̃² = ρ(f²), so
//!   the plain sum of squares of f̃ is the robust cost, and every Jacobian row by df̃/df.
//!
//! ## Failure
//! Any termination the crate does not count as successful is an error: running out of
//! evaluations, no further improvement possible, or a Jacobian with non-finite entries
//! (reported through the crate's user-termination channel). Trial points with non-finite
//! residuals are answered with a large finite residual so the step is rejected.
//!
//! The returned Jacobian is the loss-scaled one in the original parameters, i.e. `JᵀJ`
//! approximates the Hessian of the cost and can be used directly for the parameter covariance.

use levenberg_marquardt::{LevenbergMarquardt as MinpackLM, TerminationReason};
use log::debug;
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;

/// residual substituted for a non-finite one at a trial point
const REJECTED_RESIDUAL: f64 = 1e10;
/// relative distance a start on a bound is moved inside the box
const BOUND_NUDGE: f64 = 1e-3;

/// Residual vector and Jacobian of a least-squares problem.
pub trait LeastSquaresProblem {
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;
    /// rows = residuals, columns = parameters
    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Loss {
    Linear,
    /// ρ(z) = 2(√(1+z) − 1)
    SoftL1,
}

impl Loss {
    /// f̃ with f̃² = ρ(f²), and df̃/df.
    fn scale(&self, f: f64) -> (f64, f64) {
        match self {
            Loss::Linear => (f, 1.0),
            Loss::SoftL1 => {
                let root = (1.0 + f * f).sqrt();
                // 2(√(1+f²) − 1) = 2f²/(√(1+f²) + 1)
                let s = (2.0 / (root + 1.0)).sqrt();
                (f * s, 1.0 / (s * root))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LMSettings {
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    /// patience of the solver: at most `max_iterations · (parameters + 1)` evaluations
    pub max_iterations: usize,
    pub loss: Loss,
}

impl Default for LMSettings {
    fn default() -> Self {
        Self {
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            max_iterations: 2000,
            loss: Loss::SoftL1,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LMError {
    #[error("evaluation budget ({0} iterations) used up without convergence")]
    MaxIterations(usize),
    #[error("residuals are not finite at the initial point")]
    NonFiniteStart,
    #[error("non-finite {0} during the minimisation")]
    NonFinite(String),
    #[error("minimisation did not converge: {0}")]
    NotConverged(String),
    #[error("dimension mismatch: {0}")]
    Dimension(String),
}

#[derive(Debug)]
pub struct LMReport {
    pub params: DVector<f64>,
    /// 0.5 Σ ρ(f²)
    pub cost: f64,
    pub residuals: DVector<f64>,
    /// loss-scaled Jacobian at the solution
    pub jacobian: DMatrix<f64>,
    pub evaluations: usize,
    pub termination: TerminationReason,
}

/// One coordinate of the bound transformation.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound {
    Free,
    Lower(f64),
    Upper(f64),
    Both(f64, f64),
}

impl Bound {
    fn new(lo: f64, hi: f64) -> Self {
        match (lo.is_finite(), hi.is_finite()) {
            (true, true) => Bound::Both(lo, hi),
            (true, false) => Bound::Lower(lo),
            (false, true) => Bound::Upper(hi),
            (false, false) => Bound::Free,
        }
    }

    fn to_internal(&self, x: f64) -> f64 {
        match *self {
            Bound::Free => x,
            Bound::Lower(lo) => {
                let x = x.max(lo + BOUND_NUDGE);
                ((x - lo + 1.0).powi(2) - 1.0).sqrt()
            }
            Bound::Upper(hi) => {
                let x = x.min(hi - BOUND_NUDGE);
                ((hi - x + 1.0).powi(2) - 1.0).sqrt()
            }
            Bound::Both(lo, hi) => {
                let width = hi - lo;
                if width <= 0.0 {
                    return 0.0;
                }
                let nudge = BOUND_NUDGE * width;
                let x = x.clamp(lo + nudge, hi - nudge);
                (2.0 * (x - lo) / width - 1.0).asin()
            }
        }
    }

    fn to_external(&self, u: f64) -> f64 {
        match *self {
            Bound::Free => u,
            Bound::Lower(lo) => lo - 1.0 + (u * u + 1.0).sqrt(),
            Bound::Upper(hi) => hi + 1.0 - (u * u + 1.0).sqrt(),
            Bound::Both(lo, hi) => lo + (hi - lo) * (u.sin() + 1.0) / 2.0,
        }
    }

    /// dx/du
    fn derivative(&self, u: f64) -> f64 {
        match *self {
            Bound::Free => 1.0,
            Bound::Lower(_) => u / (u * u + 1.0).sqrt(),
            Bound::Upper(_) => -u / (u * u + 1.0).sqrt(),
            Bound::Both(lo, hi) => (hi - lo) * u.cos() / 2.0,
        }
    }
}

/// The user's problem seen in internal coordinates with loss-scaled residuals.
struct Internal<'a, P: LeastSquaresProblem> {
    problem: &'a P,
    bounds: &'a [Bound],
    loss: Loss,
    u: DVector<f64>,
}

impl<P: LeastSquaresProblem> Internal<'_, P> {
    fn external(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.u.len(),
            self.u
                .iter()
                .zip(self.bounds.iter())
                .map(|(&u, b)| b.to_external(u)),
        )
    }
}

impl<P: LeastSquaresProblem> levenberg_marquardt::LeastSquaresProblem<f64, Dyn, Dyn>
    for Internal<'_, P>
{
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, u: &DVector<f64>) {
        self.u.copy_from(u);
    }

    fn params(&self) -> DVector<f64> {
        self.u.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let f = self.problem.residuals(&self.external());
        Some(f.map(|r| {
            if r.is_finite() {
                self.loss.scale(r).0
            } else {
                REJECTED_RESIDUAL
            }
        }))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let x = self.external();
        let f = self.problem.residuals(&x);
        let mut jac = self.problem.jacobian(&x);
        if jac.nrows() != f.len() || jac.ncols() != self.u.len() {
            return None;
        }
        for i in 0..f.len() {
            let (_, slope) = self.loss.scale(f[i]);
            jac.row_mut(i).scale_mut(slope);
        }
        for (k, b) in self.bounds.iter().enumerate() {
            jac.column_mut(k).scale_mut(b.derivative(self.u[k]));
        }
        if jac.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(jac)
    }
}

pub struct LevenbergMarquardt {
    pub settings: LMSettings,
    bounds: Vec<Bound>,
}

impl LevenbergMarquardt {
    pub fn new(settings: LMSettings, lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, LMError> {
        if lower.len() != upper.len() {
            return Err(LMError::Dimension(format!(
                "{} lower bounds vs {} upper bounds",
                lower.len(),
                upper.len()
            )));
        }
        if lower.iter().zip(upper.iter()).any(|(l, u)| l > u) {
            return Err(LMError::Dimension("lower bound above upper bound".to_string()));
        }
        Ok(Self {
            settings,
            bounds: lower
                .iter()
                .zip(upper.iter())
                .map(|(&l, &u)| Bound::new(l, u))
                .collect(),
        })
    }

    fn scaled(&self, f: &DVector<f64>, jac: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
        let mut fs = f.clone();
        let mut js = jac.clone();
        for i in 0..f.len() {
            let (value, slope) = self.settings.loss.scale(f[i]);
            fs[i] = value;
            js.row_mut(i).scale_mut(slope);
        }
        (fs, js)
    }

    pub fn minimize<P: LeastSquaresProblem>(
        &self,
        problem: &P,
        x0: &[f64],
    ) -> Result<LMReport, LMError> {
        let n = x0.len();
        if n != self.bounds.len() {
            return Err(LMError::Dimension(format!(
                "{} parameters vs {} bounds",
                n,
                self.bounds.len()
            )));
        }
        let u0 = DVector::from_iterator(
            n,
            x0.iter()
                .zip(self.bounds.iter())
                .map(|(&x, b)| b.to_internal(x)),
        );
        let internal = Internal {
            problem,
            bounds: &self.bounds,
            loss: self.settings.loss,
            u: u0,
        };
        if problem
            .residuals(&internal.external())
            .iter()
            .any(|r| !r.is_finite())
        {
            return Err(LMError::NonFiniteStart);
        }
        let (internal, report) = MinpackLM::new()
            .with_ftol(self.settings.ftol)
            .with_xtol(self.settings.xtol)
            .with_gtol(self.settings.gtol)
            .with_patience(self.settings.max_iterations.max(1))
            .minimize(internal);
        debug!(
            "LM finished after {} evaluations ({:?})",
            report.number_of_evaluations, report.termination
        );
        if !report.termination.was_successful() {
            return Err(match report.termination {
                TerminationReason::LostPatience => {
                    LMError::MaxIterations(self.settings.max_iterations)
                }
                TerminationReason::User(what) => LMError::NonFinite(what.to_string()),
                other => LMError::NotConverged(format!("{:?}", other)),
            });
        }
        let x = internal.external();
        let f = problem.residuals(&x);
        let (fs, js) = self.scaled(&f, &problem.jacobian(&x));
        let cost = 0.5 * fs.norm_squared();
        if !cost.is_finite() {
            return Err(LMError::NonFinite("cost at the solution".to_string()));
        }
        Ok(LMReport {
            params: x,
            cost,
            residuals: f,
            jacobian: js,
            evaluations: report.number_of_evaluations,
            termination: report.termination,
        })
    }
}

/// Parameter covariance `pinv(JᵀJ) · 2·cost / (n − p)`.
/// `None` when there are no degrees of freedom or the result is not finite.
pub fn covariance(jacobian: &DMatrix<f64>, cost: f64) -> Option<DMatrix<f64>> {
    let (n, p) = jacobian.shape();
    if n <= p {
        return None;
    }
    let jtj = jacobian.transpose() * jacobian;
    let pinv = jtj.pseudo_inverse(1e-15).ok()?;
    let s_sq = 2.0 * cost / (n - p) as f64;
    let cov = pinv * s_sq;
    if cov.iter().all(|v| v.is_finite()) {
        Some(cov)
    } else {
        None
    }
}
