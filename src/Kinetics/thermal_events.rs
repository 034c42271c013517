//! # Characteristic points of TG/DTG curves
//!
//! For every series: the peak temperature at the minimum of DTG, the maximal loss rate
//! L_max = −DTG_min, and onset/endset temperatures from the intersection of the inflection
//! tangent of TG with the initial/final baseline. The baseline is the mean of the first
//! (last) 5 % of the TG points. ML is the mass lost between onset and endset.
//!
//! Series recorded with a DSC signal get the same construction on the mass-normalised heat
//! flow. The peak is the extremum of the dominant sign; for an upward peak the signal is
//! mirrored before the tangents are drawn so that both directions use the same inflection
//! rule. ΔH (J/g) is the trapezoidal integral over time (s) of the heat flow minus the
//! straight baseline through the signal at onset and endset.

use crate::Kinetics::EPS;
use crate::Kinetics::diagnostics::{Analysis, Diagnostics};
use crate::Kinetics::heating_rate_series::{HeatingRateSeries, SeriesSet};
use crate::Kinetics::kinetics_error::{KineticsError, KineticsResult};
use crate::Utils::interpolation::interp;
use crate::Utils::statistics::{gradient, mean, trapezoid};
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TangentSide {
    Onset,
    Endset,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalEvents {
    pub t_onset_k: f64,
    pub t_peak_k: f64,
    pub t_end_k: f64,
    /// mass lost between onset and endset, %
    pub mass_loss_pct: f64,
    /// maximal mass loss rate, %/min
    pub l_max_pct_min: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalEventRow {
    pub beta: f64,
    pub result: Result<ThermalEvents, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalEventTable {
    pub rows: Vec<ThermalEventRow>,
}

impl ThermalEventTable {
    pub fn successful(&self) -> impl Iterator<Item = (f64, &ThermalEvents)> {
        self.rows
            .iter()
            .filter_map(|r| r.result.as_ref().ok().map(|e| (r.beta, e)))
    }

    pub fn get(&self, beta: f64) -> Option<&ThermalEvents> {
        self.successful().find(|(b, _)| *b == beta).map(|(_, e)| e)
    }
}

/// Temperature where the tangent of `y` at its inflection point crosses the baseline.
///
/// The inflection is the steepest descent before `peak_idx` for the onset and the largest
/// slope from `peak_idx` on for the endset. A flat tangent returns the inflection abscissa.
pub fn tangent_intersection(x: &[f64], y: &[f64], peak_idx: usize, side: TangentSide) -> f64 {
    let n = x.len();
    if n == 0 {
        return f64::NAN;
    }
    let peak_idx = peak_idx.min(n - 1);
    let slope = gradient(y, x);
    let argext = |range: std::ops::Range<usize>, better: fn(f64, f64) -> bool| {
        range
            .filter(|&i| slope[i].is_finite())
            .fold(None, |best: Option<usize>, i| match best {
                Some(b) if !better(slope[i], slope[b]) => best,
                _ => Some(i),
            })
    };
    let (inflection, base) = match side {
        TangentSide::Onset => {
            let idx = if peak_idx > 0 {
                argext(0..peak_idx, |a, b| a < b).unwrap_or(0)
            } else {
                0
            };
            let head = &y[..n / 20];
            let base = if head.is_empty() { y[0] } else { mean(head) };
            (idx, base)
        }
        TangentSide::Endset => {
            let idx = if peak_idx < n - 1 {
                argext(peak_idx..n, |a, b| a > b).unwrap_or(n - 1)
            } else {
                n - 1
            };
            // ceil(n/20) points, at least the last one
            let tail = &y[n - n.div_ceil(20)..];
            (idx, mean(tail))
        }
    };
    let s = slope[inflection];
    let (x1, y1) = (x[inflection], y[inflection]);
    if !s.is_finite() || s.abs() < EPS {
        return x1;
    }
    x1 + (base - y1) / s
}

/// Characteristic points of one series.
pub fn characterize(series: &HeatingRateSeries) -> KineticsResult<ThermalEvents> {
    let samples = series.samples();
    let peak_idx = samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.dtg_min.is_finite())
        .min_by(|a, b| a.1.dtg_min.total_cmp(&b.1.dtg_min))
        .map(|(i, _)| i)
        .ok_or_else(|| {
            KineticsError::NumericalDomain(format!(
                "beta = {}: DTG has no finite value",
                series.beta()
            ))
        })?;
    let temp = series.temp_k();
    let tg: Vec<f64> = samples.iter().map(|s| s.tg_pct).collect();
    let t_onset_k = tangent_intersection(&temp, &tg, peak_idx, TangentSide::Onset);
    let t_end_k = tangent_intersection(&temp, &tg, peak_idx, TangentSide::Endset);
    let mass_loss_pct = interp(t_onset_k, &temp, &tg) - interp(t_end_k, &temp, &tg);
    let events = ThermalEvents {
        t_onset_k,
        t_peak_k: samples[peak_idx].temp_k,
        t_end_k,
        mass_loss_pct,
        l_max_pct_min: -samples[peak_idx].dtg_min,
    };
    if [t_onset_k, t_end_k, mass_loss_pct].iter().any(|v| !v.is_finite()) {
        return Err(KineticsError::NumericalDomain(format!(
            "beta = {}: tangent construction produced a non-finite value",
            series.beta()
        )));
    }
    Ok(events)
}

/// Characteristic points of every series. Failed series are kept as `Err` rows with a
/// warning; an error is returned only when no series succeeds.
pub fn analyze_thermal_events(set: &SeriesSet) -> KineticsResult<Analysis<ThermalEventTable>> {
    let mut diagnostics = Diagnostics::new();
    let mut rows = Vec::with_capacity(set.len());
    for series in set {
        let result = characterize(series).map_err(|e| e.to_string());
        match &result {
            Ok(ev) => info!(
                "TG/DTG beta = {} K/min: onset {:.1} K, peak {:.1} K, end {:.1} K, ML {:.2} %",
                series.beta(),
                ev.t_onset_k,
                ev.t_peak_k,
                ev.t_end_k,
                ev.mass_loss_pct
            ),
            Err(reason) => {
                warn!("TG/DTG beta = {} skipped: {}", series.beta(), reason);
                diagnostics.warning("TG/DTG", format!("beta = {} skipped: {}", series.beta(), reason));
            }
        }
        rows.push(ThermalEventRow {
            beta: series.beta(),
            result,
        });
    }
    if rows.iter().all(|r| r.result.is_err()) {
        return Err(KineticsError::NumericalDomain(
            "TG/DTG parameter calculation failed for all series".to_string(),
        ));
    }
    Ok(Analysis::new(ThermalEventTable { rows }, diagnostics))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DscEvents {
    pub t_onset_k: f64,
    pub t_peak_k: f64,
    pub t_end_k: f64,
    /// heat flow at the peak, W/g
    pub peak_w_g: f64,
    /// ∫ (DSC − baseline) dt between onset and endset, J/g; the sign follows the peak
    pub enthalpy_j_g: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DscEventRow {
    pub beta: f64,
    pub result: Result<DscEvents, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DscEventTable {
    pub rows: Vec<DscEventRow>,
}

impl DscEventTable {
    pub fn successful(&self) -> impl Iterator<Item = (f64, &DscEvents)> {
        self.rows
            .iter()
            .filter_map(|r| r.result.as_ref().ok().map(|e| (r.beta, e)))
    }

    pub fn get(&self, beta: f64) -> Option<&DscEvents> {
        self.successful().find(|(b, _)| *b == beta).map(|(_, e)| e)
    }
}

/// DSC peak, onset/endset and enthalpy of one series.
pub fn characterize_dsc(series: &HeatingRateSeries) -> KineticsResult<DscEvents> {
    let beta = series.beta();
    let points: Vec<_> = series
        .samples()
        .iter()
        .filter(|s| s.dsc_w_g.is_finite())
        .collect();
    if points.len() < 3 {
        return Err(KineticsError::InsufficientData(format!(
            "beta = {}: DSC has {} finite samples",
            beta,
            points.len()
        )));
    }
    let temp: Vec<f64> = points.iter().map(|s| s.temp_k).collect();
    let dsc: Vec<f64> = points.iter().map(|s| s.dsc_w_g).collect();
    let (i_min, min) = extremum(&dsc, |a, b| a < b);
    let (i_max, max) = extremum(&dsc, |a, b| a > b);
    let downward = min < -max;
    let peak_idx = if downward { i_min } else { i_max };
    let oriented: Vec<f64> = if downward {
        dsc.clone()
    } else {
        dsc.iter().map(|d| -d).collect()
    };
    let t_onset_k = tangent_intersection(&temp, &oriented, peak_idx, TangentSide::Onset);
    let t_end_k = tangent_intersection(&temp, &oriented, peak_idx, TangentSide::Endset);
    if !(t_onset_k.is_finite() && t_end_k.is_finite() && t_end_k > t_onset_k) {
        return Err(KineticsError::NumericalDomain(format!(
            "beta = {}: DSC tangents give onset {} K and endset {} K",
            beta, t_onset_k, t_end_k
        )));
    }
    let y_start = interp(t_onset_k, &temp, &dsc);
    let y_end = interp(t_end_k, &temp, &dsc);
    let baseline = |t: f64| y_start + (y_end - y_start) * (t - t_onset_k) / (t_end_k - t_onset_k);
    let (time_s, corrected): (Vec<f64>, Vec<f64>) = points
        .iter()
        .filter(|s| s.temp_k >= t_onset_k && s.temp_k <= t_end_k && s.time_min.is_finite())
        .map(|s| (s.time_min * 60.0, s.dsc_w_g - baseline(s.temp_k)))
        .unzip();
    if time_s.len() < 2 {
        return Err(KineticsError::InsufficientData(format!(
            "beta = {}: fewer than two DSC samples between onset and endset",
            beta
        )));
    }
    Ok(DscEvents {
        t_onset_k,
        t_peak_k: temp[peak_idx],
        t_end_k,
        peak_w_g: dsc[peak_idx],
        enthalpy_j_g: trapezoid(&corrected, &time_s),
    })
}

fn extremum(v: &[f64], better: fn(f64, f64) -> bool) -> (usize, f64) {
    v.iter()
        .enumerate()
        .fold((0, v[0]), |(bi, bv), (i, &x)| if better(x, bv) { (i, x) } else { (bi, bv) })
}

/// DSC parameters of every series. Series without a DSC signal are skipped with a warning;
/// an error is returned only when no series succeeds.
pub fn analyze_dsc_events(set: &SeriesSet) -> KineticsResult<Analysis<DscEventTable>> {
    let mut diagnostics = Diagnostics::new();
    let mut rows = Vec::with_capacity(set.len());
    for series in set {
        let result = if series.has_dsc() {
            characterize_dsc(series).map_err(|e| e.to_string())
        } else {
            Err("no DSC signal".to_string())
        };
        match &result {
            Ok(ev) => info!(
                "DSC beta = {} K/min: onset {:.1} K, peak {:.1} K, end {:.1} K, dH {:.2} J/g",
                series.beta(),
                ev.t_onset_k,
                ev.t_peak_k,
                ev.t_end_k,
                ev.enthalpy_j_g
            ),
            Err(reason) => {
                warn!("DSC beta = {} skipped: {}", series.beta(), reason);
                diagnostics.warning("DSC", format!("beta = {} skipped: {}", series.beta(), reason));
            }
        }
        rows.push(DscEventRow {
            beta: series.beta(),
            result,
        });
    }
    if rows.iter().all(|r| r.result.is_err()) {
        return Err(KineticsError::NumericalDomain(
            "DSC parameter calculation failed for all series".to_string(),
        ));
    }
    Ok(Analysis::new(DscEventTable { rows }, diagnostics))
}
