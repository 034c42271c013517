//! # Interpolation
//!
//! Two interpolants are used across the engine:
//! - [`interp`]: piecewise-linear interpolation with constant extrapolation at both ends.
//!   Used for Eₐ(α) lookups and for reading dα/dT at an isoconversional temperature.
//! - [`Pchip`]: monotone piecewise cubic Hermite interpolation (Fritsch-Carlson slopes)
//!   with polynomial extrapolation from the end intervals. Used by the non-parametric
//!   rate model, where the rate amplitude must not overshoot between bins.
//!
//! Both have symbolic counterparts ([`interp_expr`], [`Pchip::expr`]) built from the ramp
//! max(x, 0), so tabulated Eₐ(α) and Z(α) can enter the right-hand side of an ODE.

use RustedSciThe::symbolic::symbolic_engine::Expr;
use serde::{Deserialize, Serialize};

/// Linear interpolation of `(xp, fp)` at `x`.
///
/// `xp` must be increasing. Outside the table the end values are returned.
/// An empty table or a NaN abscissa gives NaN.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 || x.is_nan() {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // first index with xp[j] > x, guaranteed to be in 1..n
    let j = xp[..n].partition_point(|&v| v <= x);
    let (x0, x1) = (xp[j - 1], xp[j]);
    let (f0, f1) = (fp[j - 1], fp[j]);
    let dx = x1 - x0;
    if dx == 0.0 {
        return f0;
    }
    f0 + (f1 - f0) * (x - x0) / dx
}

/// Vectorised [`interp`].
pub fn interp_many(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    x.iter().map(|&xi| interp(xi, xp, fp)).collect()
}

/// max(x, 0) written as (x + √(x²))/2.
pub fn ramp_expr(x: Expr) -> Expr {
    (x.clone() + Expr::Pow(Box::new(x.clone() * x), Box::new(Expr::Const(0.5)))) * Expr::Const(0.5)
}

/// The broken line of [`interp`] as an expression in `x`, constant outside the table.
pub fn interp_expr(x: &Expr, xp: &[f64], fp: &[f64]) -> Expr {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return Expr::Const(f64::NAN);
    }
    let mut e = Expr::Const(fp[0]);
    for k in 0..n - 1 {
        let dx = xp[k + 1] - xp[k];
        let slope = (fp[k + 1] - fp[k]) / dx;
        if dx <= 0.0 || slope == 0.0 {
            continue;
        }
        let piece = ramp_expr(x.clone() - Expr::Const(xp[k]))
            - ramp_expr(x.clone() - Expr::Const(xp[k + 1]));
        e = e + Expr::Const(slope) * piece;
    }
    e
}

/// Shape-preserving cubic interpolant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pchip {
    x: Vec<f64>,
    y: Vec<f64>,
    d: Vec<f64>,
}

impl Pchip {
    /// Builds the interpolant. Abscissae must be strictly increasing and finite.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, String> {
        if x.len() != y.len() {
            return Err(format!(
                "PCHIP: x and y lengths differ ({} vs {})",
                x.len(),
                y.len()
            ));
        }
        if x.is_empty() {
            return Err("PCHIP: empty table".to_string());
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err("PCHIP: non-finite node".to_string());
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return Err("PCHIP: abscissae must be strictly increasing".to_string());
        }
        let d = Self::slopes(&x, &y);
        Ok(Self { x, y, d })
    }

    fn slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
        let n = x.len();
        if n == 1 {
            return vec![0.0];
        }
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let delta: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / h[k]).collect();
        if n == 2 {
            return vec![delta[0], delta[0]];
        }
        let mut d = vec![0.0; n];
        for k in 1..n - 1 {
            let (d0, d1) = (delta[k - 1], delta[k]);
            if d0 * d1 <= 0.0 {
                d[k] = 0.0;
            } else {
                let w1 = 2.0 * h[k] + h[k - 1];
                let w2 = h[k] + 2.0 * h[k - 1];
                d[k] = (w1 + w2) / (w1 / d0 + w2 / d1);
            }
        }
        d[0] = Self::edge_slope(h[0], h[1], delta[0], delta[1]);
        d[n - 1] = Self::edge_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
        d
    }

    /// Three-point end condition, limited so the end interval stays monotone.
    fn edge_slope(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
        let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
        if d.signum() != m0.signum() || m0 == 0.0 {
            0.0
        } else if m0.signum() != m1.signum() && d.abs() > 3.0 * m0.abs() {
            3.0 * m0
        } else {
            d
        }
    }

    /// Evaluates the interpolant; outside the nodes the end cubic is extended.
    pub fn eval(&self, xv: f64) -> f64 {
        let n = self.x.len();
        if xv.is_nan() {
            return f64::NAN;
        }
        if n == 1 {
            return self.y[0];
        }
        let k = self.x.partition_point(|&v| v <= xv).clamp(1, n - 1) - 1;
        let h = self.x[k + 1] - self.x[k];
        let t = (xv - self.x[k]) / h;
        let (t2, t3) = (t * t, t * t * t);
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        h00 * self.y[k] + h10 * h * self.d[k] + h01 * self.y[k + 1] + h11 * h * self.d[k + 1]
    }

    /// The interpolant as an expression in `x`, extrapolation included.
    ///
    /// The first cubic is written out as a polynomial; at every interior node the change of
    /// the second and third derivative enters through truncated powers of the ramp, so the
    /// expression agrees with [`Pchip::eval`] everywhere.
    pub fn expr(&self, x: &Expr) -> Expr {
        let n = self.x.len();
        if n == 1 {
            return Expr::Const(self.y[0]);
        }
        // q_k(s) = y_k + d_k·s + c2_k·s² + c3_k·s³ on [x_k, x_k+1], s = x − x_k
        let coeffs: Vec<(f64, f64, f64)> = (0..n - 1)
            .map(|k| {
                let h = self.x[k + 1] - self.x[k];
                let delta = (self.y[k + 1] - self.y[k]) / h;
                let c2 = (3.0 * delta - 2.0 * self.d[k] - self.d[k + 1]) / h;
                let c3 = (self.d[k] + self.d[k + 1] - 2.0 * delta) / (h * h);
                (h, c2, c3)
            })
            .collect();
        let s = x.clone() - Expr::Const(self.x[0]);
        let (_, c2, c3) = coeffs[0];
        let mut e = Expr::Const(self.y[0])
            + Expr::Const(self.d[0]) * s.clone()
            + Expr::Const(c2) * s.clone() * s.clone()
            + Expr::Const(c3) * s.clone() * s.clone() * s;
        for k in 1..n - 1 {
            let (h_prev, c2_prev, c3_prev) = coeffs[k - 1];
            let (_, c2, c3) = coeffs[k];
            let jump2 = c2 - (c2_prev + 3.0 * c3_prev * h_prev);
            let jump3 = c3 - c3_prev;
            let r = ramp_expr(x.clone() - Expr::Const(self.x[k]));
            e = e
                + Expr::Const(jump2) * r.clone() * r.clone()
                + Expr::Const(jump3) * r.clone() * r.clone() * r;
        }
        e
    }

    pub fn nodes(&self) -> (&[f64], &[f64]) {
        (&self.x, &self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_interp_inside_and_clamped() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 40.0];
        assert_relative_eq!(interp(0.5, &xp, &fp), 5.0);
        assert_relative_eq!(interp(1.5, &xp, &fp), 25.0);
        assert_relative_eq!(interp(-3.0, &xp, &fp), 0.0);
        assert_relative_eq!(interp(7.0, &xp, &fp), 40.0);
        assert_relative_eq!(interp(1.0, &xp, &fp), 10.0);
        assert!(interp(0.5, &[], &[]).is_nan());
    }

    #[test]
    fn test_pchip_reproduces_nodes_and_lines() {
        let x = vec![0.0, 1.0, 2.5, 4.0];
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v - 1.0).collect();
        let p = Pchip::new(x.clone(), y.clone()).unwrap();
        for (xi, yi) in x.iter().zip(y.iter()) {
            assert_relative_eq!(p.eval(*xi), *yi, epsilon = 1e-12);
        }
        // linear data stays linear, including extrapolation
        assert_relative_eq!(p.eval(1.7), 3.0 * 1.7 - 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.eval(5.0), 14.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pchip_is_monotone_for_monotone_data() {
        let x = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let y = vec![0.0, 0.1, 0.2, 5.0, 5.1];
        let p = Pchip::new(x, y).unwrap();
        let mut prev = p.eval(0.0);
        for i in 1..=400 {
            let v = p.eval(i as f64 * 0.01);
            assert!(v >= prev - 1e-12);
            prev = v;
        }
    }

    #[test]
    fn test_interp_expr_matches_interp() {
        let xp = [0.1, 0.3, 0.5, 0.9];
        let fp = [120.0, 140.0, 135.0, 150.0];
        let f = interp_expr(&Expr::Var("a".to_owned()), &xp, &fp).lambdify1D();
        for x in [0.0, 0.1, 0.2, 0.31, 0.5, 0.77, 0.9, 1.0] {
            assert_relative_eq!(f(x), interp(x, &xp, &fp), max_relative = 1e-12);
        }
    }

    #[test]
    fn test_pchip_expr_matches_eval() {
        let x = vec![0.05, 0.2, 0.4, 0.5, 0.8, 0.95];
        let y = vec![20.0, 23.5, 24.0, 26.0, 25.0, 30.0];
        let p = Pchip::new(x, y).unwrap();
        let f = p.expr(&Expr::Var("a".to_owned())).lambdify1D();
        for i in 0..=50 {
            let a = i as f64 * 0.02;
            assert_relative_eq!(f(a), p.eval(a), max_relative = 1e-9, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_pchip_rejects_bad_tables() {
        assert!(Pchip::new(vec![], vec![]).is_err());
        assert!(Pchip::new(vec![0.0, 0.0], vec![1.0, 2.0]).is_err());
        assert!(Pchip::new(vec![0.0, 1.0], vec![1.0, f64::NAN]).is_err());
    }
}
