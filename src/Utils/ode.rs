//! # Scalar initial value problems on RustedSciThe's RK45
//!
//! Every ODE the engine solves has a single unknown: conversion along a heating program,
//! time along the conversion axis at constant temperature, or a running integral. The
//! right-hand side is built as a symbolic expression and handed to `UniversalODESolver`
//! with the non-stiff RK45 method. The accepted steps come back as a [`Trajectory`], which
//! is resampled on the caller's own grid by cubic Hermite interpolation with slopes taken
//! from the numeric right-hand side.
//!
//! ```rust, ignore
//! let y = Expr::Var("y".to_owned());
//! let ivp = ScalarIvp::new(-y, "y", "x", Tolerances::new(1e-8, 1e-10));
//! let trajectory = ivp.solve(0.0, 1.0, 2.0)?;
//! let ys = trajectory.sample(&[0.0, 0.5, 1.0], |_x, y| -y)?;
//! ```

use RustedSciThe::numerical::ODE_api2::{SolverParam, SolverType, UniversalODESolver};
use RustedSciThe::symbolic::symbolic_engine::Expr;
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// accepted steps across the span, at least
pub const DEFAULT_MIN_STEPS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub rtol: f64,
    pub atol: f64,
}

impl Tolerances {
    pub fn new(rtol: f64, atol: f64) -> Self {
        Self { rtol, atol }
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::new(1e-3, 1e-6)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OdeError {
    #[error("integration span {0}..{1} is empty or not finite")]
    InvalidSpan(f64, f64),
    #[error("solver returned no trajectory")]
    NoResult,
    #[error("trajectory ends at {reached} instead of {x_end}")]
    Incomplete { reached: f64, x_end: f64 },
    #[error("output grid must be non-empty and non-decreasing")]
    InvalidGrid,
}

/// `dy/dx = rhs(x, y)` with one unknown.
pub struct ScalarIvp {
    rhs: Expr,
    unknown: String,
    arg: String,
    tol: Tolerances,
    min_steps: usize,
    stop_at: Option<f64>,
}

impl ScalarIvp {
    pub fn new(rhs: Expr, unknown: &str, arg: &str, tol: Tolerances) -> Self {
        Self {
            rhs,
            unknown: unknown.to_owned(),
            arg: arg.to_owned(),
            tol,
            min_steps: DEFAULT_MIN_STEPS,
            stop_at: None,
        }
    }

    /// Caps the step at span / `min_steps`.
    pub fn with_min_steps(mut self, min_steps: usize) -> Self {
        self.min_steps = min_steps.max(1);
        self
    }

    /// Ends the integration once the (increasing) unknown reaches `value`; the trajectory
    /// then holds its last state up to the end of the span.
    pub fn with_stop(mut self, value: f64) -> Self {
        self.stop_at = Some(value);
        self
    }

    fn solver_params(&self, span: f64) -> HashMap<String, SolverParam> {
        HashMap::from([
            ("step_size".to_owned(), SolverParam::Float(1e-3)),
            ("tolerance".to_owned(), SolverParam::Float(self.tol.rtol)),
            ("max_iterations".to_owned(), SolverParam::Int(1000000)),
            ("rtol".to_owned(), SolverParam::Float(self.tol.rtol)),
            ("atol".to_owned(), SolverParam::Float(self.tol.atol)),
            (
                "max_step".to_owned(),
                SolverParam::Float(span / self.min_steps as f64),
            ),
            ("first_step".to_owned(), SolverParam::OptionalFloat(None)),
            ("vectorized".to_owned(), SolverParam::Bool(false)),
            ("jac_sparsity".to_owned(), SolverParam::OptionalMatrix(None)),
            ("parallel".to_owned(), SolverParam::Bool(false)),
        ])
    }

    /// Integrates from `(x0, y0)` to `x_end`.
    pub fn solve(&self, x0: f64, y0: f64, x_end: f64) -> Result<Trajectory, OdeError> {
        if !(x0.is_finite() && x_end.is_finite() && y0.is_finite() && x_end > x0) {
            return Err(OdeError::InvalidSpan(x0, x_end));
        }
        let mut ode = UniversalODESolver::new(
            vec![self.rhs.clone()],
            vec![self.unknown.clone()],
            self.arg.clone(),
            SolverType::NonStiff("RK45".to_owned()),
            x0,
            DVector::from_vec(vec![y0]),
            x_end,
        );
        ode.set_parameters(self.solver_params(x_end - x0));
        if let Some(stop) = self.stop_at {
            ode.set_stop_condition(HashMap::from([(self.unknown.clone(), stop)]));
        }
        ode.initialize();
        ode.solve();
        let (x, y) = match ode.get_result() {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(OdeError::NoResult),
        };
        // one column per unknown, or one row if the solver stores states transposed
        let states: Vec<f64> = if y.nrows() == x.len() {
            y.column(0).iter().copied().collect()
        } else {
            y.row(0).iter().copied().collect()
        };
        let mut xs: Vec<f64> = Vec::with_capacity(x.len());
        let mut ys: Vec<f64> = Vec::with_capacity(x.len());
        for (&xi, &yi) in x.iter().zip(states.iter()) {
            if !(xi.is_finite() && yi.is_finite()) {
                break;
            }
            if xs.last().is_some_and(|&last| xi <= last) {
                continue;
            }
            xs.push(xi);
            ys.push(yi);
        }
        let (reached, y_last) = match (xs.last(), ys.last()) {
            (Some(&xr), Some(&yr)) => (xr, yr),
            _ => return Err(OdeError::NoResult),
        };
        let stopped = self.stop_at.is_some_and(|s| y_last >= s);
        let slack = 1e-9 * (x_end - x0).abs().max(1.0);
        if !stopped && reached < x_end - slack {
            return Err(OdeError::Incomplete { reached, x_end });
        }
        debug!(
            "RK45 for d{}/d{}: {} steps on [{:.6e}, {:.6e}]{}",
            self.unknown,
            self.arg,
            xs.len(),
            x0,
            reached,
            if stopped { ", stop condition met" } else { "" }
        );
        Ok(Trajectory {
            x: xs,
            y: ys,
            stopped,
        })
    }
}

/// Accepted RK45 steps of a scalar problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    x: Vec<f64>,
    y: Vec<f64>,
    stopped: bool,
}

impl Trajectory {
    pub fn steps(&self) -> usize {
        self.x.len()
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }

    /// Last accepted `(x, y)`.
    pub fn last(&self) -> (f64, f64) {
        let n = self.x.len() - 1;
        (self.x[n], self.y[n])
    }

    /// y at `xv`: cubic Hermite between accepted steps with slopes `slope(x, y)`, the initial
    /// state before the start and the final state past the last step.
    pub fn value_at(&self, xv: f64, slope: &impl Fn(f64, f64) -> f64) -> f64 {
        let n = self.x.len();
        if xv.is_nan() {
            return f64::NAN;
        }
        if xv <= self.x[0] {
            return self.y[0];
        }
        if xv >= self.x[n - 1] {
            return self.y[n - 1];
        }
        let k = self.x.partition_point(|&v| v <= xv) - 1;
        let (x0, x1) = (self.x[k], self.x[k + 1]);
        let (y0, y1) = (self.y[k], self.y[k + 1]);
        let h = x1 - x0;
        let t = (xv - x0) / h;
        let (d0, d1) = (slope(x0, y0), slope(x1, y1));
        if !(d0.is_finite() && d1.is_finite()) {
            return y0 + t * (y1 - y0);
        }
        let (t2, t3) = (t * t, t * t * t);
        (2.0 * t3 - 3.0 * t2 + 1.0) * y0
            + (t3 - 2.0 * t2 + t) * h * d0
            + (-2.0 * t3 + 3.0 * t2) * y1
            + (t3 - t2) * h * d1
    }

    /// [`Trajectory::value_at`] on a non-decreasing grid.
    pub fn sample(
        &self,
        grid: &[f64],
        slope: impl Fn(f64, f64) -> f64,
    ) -> Result<Vec<f64>, OdeError> {
        if grid.is_empty() || grid.windows(2).any(|w| !(w[1] >= w[0])) {
            return Err(OdeError::InvalidGrid);
        }
        Ok(grid.iter().map(|&xv| self.value_at(xv, &slope)).collect())
    }
}

/// ∫ₐᵇ f dx of a symbolic integrand in `var`, solved as y' = f with y(a) = 0.
pub fn integral(integrand: Expr, var: &str, a: f64, b: f64, tol: Tolerances) -> Result<f64, OdeError> {
    if a == b {
        return Ok(0.0);
    }
    if b < a {
        return integral(integrand, var, b, a, tol).map(|v| -v);
    }
    let trajectory = ScalarIvp::new(integrand, "integral", var, tol)
        .with_min_steps(20)
        .solve(a, 0.0, b)?;
    Ok(trajectory.last().1)
}
