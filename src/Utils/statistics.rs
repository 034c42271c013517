//! Descriptive statistics, ordinary least squares and grid helpers.

use serde::{Deserialize, Serialize};

pub fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        return f64::NAN;
    }
    v.iter().sum::<f64>() / v.len() as f64
}

/// Sample standard deviation (n - 1 in the denominator); NaN for fewer than two values.
pub fn sample_std(v: &[f64]) -> f64 {
    if v.len() < 2 {
        return f64::NAN;
    }
    let m = mean(v);
    let ss: f64 = v.iter().map(|x| (x - m).powi(2)).sum();
    (ss / (v.len() - 1) as f64).sqrt()
}

/// Quantile with linear interpolation between order statistics.
pub fn quantile(v: &[f64], q: f64) -> f64 {
    if v.is_empty() {
        return f64::NAN;
    }
    let mut s = v.to_vec();
    s.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (s.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    s[lo] + (s[hi] - s[lo]) * (pos - lo as f64)
}

/// Tukey fence filter. Returns the values inside `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`
/// and a flag telling whether the filter removed everything, in which case the
/// unfiltered values are returned instead.
pub fn iqr_filter(v: &[f64]) -> (Vec<f64>, bool) {
    let q1 = quantile(v, 0.25);
    let q3 = quantile(v, 0.75);
    let iqr = q3 - q1;
    let (lo, hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    let kept: Vec<f64> = v.iter().copied().filter(|x| *x >= lo && *x <= hi).collect();
    if kept.is_empty() {
        (v.to_vec(), true)
    } else {
        (kept, false)
    }
}

/// `n` evenly spaced points over `[start, stop]`, both ends included.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Values `start, start + step, ...` up to and including `stop` (within half a step),
/// rounded to four decimals so that conversion grids compare exactly.
pub fn arange_inclusive(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || stop < start {
        return vec![];
    }
    let n = ((stop - start) / step + 1e-9).floor() as usize + 1;
    (0..n)
        .map(|i| ((start + step * i as f64) * 1e4).round() / 1e4)
        .collect()
}

/// Derivative of `y` with respect to `x`: second-order central differences inside,
/// one-sided first-order differences at the ends. Non-uniform spacing is allowed;
/// repeated abscissae give non-finite values that callers mask out.
pub fn gradient(y: &[f64], x: &[f64]) -> Vec<f64> {
    let n = y.len().min(x.len());
    if n < 2 {
        return vec![f64::NAN; n];
    }
    let mut g = vec![0.0; n];
    g[0] = (y[1] - y[0]) / (x[1] - x[0]);
    g[n - 1] = (y[n - 1] - y[n - 2]) / (x[n - 1] - x[n - 2]);
    for i in 1..n - 1 {
        let hd = x[i] - x[i - 1];
        let hs = x[i + 1] - x[i];
        g[i] = (hd * hd * y[i + 1] - hs * hs * y[i - 1] + (hs * hs - hd * hd) * y[i])
            / (hs * hd * (hd + hs));
    }
    g
}

/// Trapezoidal integral of `y` over `x`; 0 for fewer than two points.
pub fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    let n = y.len().min(x.len());
    (1..n)
        .map(|i| 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]))
        .sum()
}

/// Straight line fitted by ordinary least squares.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// standard error of the slope, 0 for two points
    pub se_slope: f64,
    pub n: usize,
}

/// OLS on `(x, y)`. `None` for fewer than two points or a degenerate abscissa.
pub fn linear_regression(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let xm = mean(x);
    let ym = mean(y);
    let sxx: f64 = x.iter().map(|v| (v - xm).powi(2)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a - xm) * (b - ym)).sum();
    let slope = sxy / sxx;
    let intercept = ym - slope * xm;
    let sse: f64 = x
        .iter()
        .zip(y)
        .map(|(a, b)| (b - (slope * a + intercept)).powi(2))
        .sum();
    let sst: f64 = y.iter().map(|b| (b - ym).powi(2)).sum();
    let r_squared = if sst > 0.0 { 1.0 - sse / sst } else { 0.0 };
    let se_slope = if n > 2 {
        (sse / (n - 2) as f64).sqrt() / (sxx + crate::Kinetics::EPS).sqrt()
    } else {
        0.0
    };
    Some(LinearFit {
        slope,
        intercept,
        r_squared,
        se_slope,
        n,
    })
}

/// Coefficient of determination of a prediction; 0 when the observations are constant.
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = observed
        .iter()
        .zip(predicted)
        .filter(|(o, p)| o.is_finite() && p.is_finite())
        .map(|(o, p)| (*o, *p))
        .collect();
    if pairs.is_empty() {
        return f64::NAN;
    }
    let om = pairs.iter().map(|(o, _)| o).sum::<f64>() / pairs.len() as f64;
    let ss_res: f64 = pairs.iter().map(|(o, p)| (o - p).powi(2)).sum();
    let ss_tot: f64 = pairs.iter().map(|(o, _)| (o - om).powi(2)).sum();
    if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_std() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&v), 5.0);
        assert_relative_eq!(sample_std(&v), (32.0_f64 / 7.0).sqrt(), epsilon = 1e-12);
        assert!(sample_std(&[1.0]).is_nan());
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn test_quantile_linear() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(quantile(&v, 0.25), 1.75);
        assert_relative_eq!(quantile(&v, 0.75), 3.25);
        assert_relative_eq!(quantile(&v, 0.5), 2.5);
    }

    #[test]
    fn test_iqr_filter_drops_outlier() {
        let v = [100.0, 101.0, 99.0, 100.5, 99.5, 300.0];
        let (kept, fell_back) = iqr_filter(&v);
        assert!(!fell_back);
        assert_eq!(kept.len(), 5);
        assert!(!kept.contains(&300.0));
    }

    #[test]
    fn test_regression_exact_line() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|v| -2.0 * v + 1.0).collect();
        let fit = linear_regression(&x, &y).unwrap();
        assert_relative_eq!(fit.slope, -2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-12);
        assert_relative_eq!(fit.r_squared, 1.0, epsilon = 1e-12);
        assert!(fit.se_slope < 1e-10);
        let two = linear_regression(&x[..2], &y[..2]).unwrap();
        assert_eq!(two.se_slope, 0.0);
        assert!(linear_regression(&[1.0], &[1.0]).is_none());
    }

    #[test]
    fn test_gradient_matches_quadratic() {
        let x = [0.0, 0.5, 1.5, 2.0, 3.0];
        let y: Vec<f64> = x.iter().map(|v| v * v).collect();
        let g = gradient(&y, &x);
        // second order scheme is exact for quadratics inside the grid
        for i in 1..4 {
            assert_relative_eq!(g[i], 2.0 * x[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_trapezoid_is_exact_for_lines() {
        let x = [0.0, 0.5, 2.0, 3.0];
        let y: Vec<f64> = x.iter().map(|x| 2.0 * x + 1.0).collect();
        assert_relative_eq!(trapezoid(&y, &x), 12.0, epsilon = 1e-12);
        assert_eq!(trapezoid(&[1.0], &[0.0]), 0.0);
    }

    #[test]
    fn test_grids() {
        let l = linspace(0.01, 0.99, 50);
        assert_eq!(l.len(), 50);
        assert_relative_eq!(l[49], 0.99);
        let a = arange_inclusive(0.1, 0.9, 0.05);
        assert_eq!(a.len(), 17);
        assert_eq!(a[16], 0.9);
    }
}
