//! # Heating-rate series
//!
//! One [`HeatingRateSeries`] per experimental heating rate β (K/min). A series is built once
//! and is immutable afterwards; all derived columns are computed at construction.
//!
//! Invariants enforced by every constructor:
//! - samples are sorted by temperature
//! - α is clipped to [0, 1] and made non-decreasing by a running maximum
//! - dα/dT may be non-finite at the ends of the series; such samples are masked by
//!   consumers, never rejected here
//!
//! [`SeriesSet`] groups series with distinct heating rates, ordered by β.

use crate::Kinetics::kinetics_error::{KineticsError, KineticsResult};
use crate::Utils::statistics::gradient;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub temp_k: f64,
    pub time_min: f64,
    pub alpha: f64,
    /// dα/dT, 1/K
    pub dadt: f64,
    /// residual mass, %
    pub tg_pct: f64,
    /// dTG/dt, %/min
    pub dtg_min: f64,
    /// DSC heat flow per sample mass, W/g (mW/mg); NaN when no DSC was recorded
    pub dsc_w_g: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatingRateSeries {
    beta: f64,
    samples: Vec<Sample>,
    /// (m0, m_inf), mass % at the start and the end of the decomposition
    mass_endpoints: (f64, f64),
}

fn check_beta(beta: f64) -> KineticsResult<()> {
    if !(beta.is_finite() && beta > 0.0) {
        return Err(KineticsError::Configuration(format!(
            "heating rate must be positive, got {}",
            beta
        )));
    }
    Ok(())
}

fn check_lengths(name: &str, expected: usize, got: usize) -> KineticsResult<()> {
    if expected != got {
        return Err(KineticsError::Configuration(format!(
            "column {} has {} values, expected {}",
            name, got, expected
        )));
    }
    Ok(())
}

/// Sorts by temperature, then clips α to [0, 1] and takes its running maximum.
fn enforce_monotone(mut rows: Vec<Sample>) -> Vec<Sample> {
    rows.sort_by(|a, b| a.temp_k.total_cmp(&b.temp_k));
    let mut running = 0.0_f64;
    for row in rows.iter_mut() {
        running = running.max(row.alpha.clamp(0.0, 1.0));
        row.alpha = running;
    }
    rows
}

impl HeatingRateSeries {
    /// Builds a series from the columns supplied by data ingestion:
    /// Temp_K, Time_min, alpha and dAdT. Rows with non-finite temperature or
    /// conversion are dropped.
    pub fn from_columns(
        beta: f64,
        temp_k: &[f64],
        time_min: &[f64],
        alpha: &[f64],
        dadt: &[f64],
    ) -> KineticsResult<Self> {
        check_beta(beta)?;
        let n = temp_k.len();
        check_lengths("Time_min", n, time_min.len())?;
        check_lengths("alpha", n, alpha.len())?;
        check_lengths("dAdT", n, dadt.len())?;
        let rows: Vec<Sample> = (0..n)
            .filter(|&i| temp_k[i].is_finite() && alpha[i].is_finite())
            .map(|i| Sample {
                temp_k: temp_k[i],
                time_min: time_min[i],
                alpha: alpha[i],
                dadt: dadt[i],
                tg_pct: 100.0 * (1.0 - alpha[i].clamp(0.0, 1.0)),
                dtg_min: f64::NAN,
                dsc_w_g: f64::NAN,
            })
            .collect();
        if rows.len() < n {
            debug!("beta = {}: dropped {} non-finite rows", beta, n - rows.len());
        }
        Self::finish(beta, rows, (100.0, 0.0))
    }

    /// Builds a series from a thermogram (temperature, time, residual mass %).
    ///
    /// α = (m0 − TG)/(m0 − m∞) with m0 the first and m∞ the smallest mass; dα/dT is the
    /// numerical derivative of α over temperature.
    pub fn from_thermogram(
        beta: f64,
        temp_k: &[f64],
        time_min: &[f64],
        tg_pct: &[f64],
    ) -> KineticsResult<Self> {
        Self::thermogram(beta, temp_k, time_min, tg_pct, None)
    }

    /// Same as [`Self::from_thermogram`] with a simultaneous DSC signal in mW.
    ///
    /// With `sample_mass_mg` the heat flow is divided by the initial sample mass and stored
    /// in W/g; without it the signal is taken as already normalised. Non-finite DSC values
    /// are kept as NaN, they do not drop the TG row.
    pub fn from_thermogram_with_dsc(
        beta: f64,
        temp_k: &[f64],
        time_min: &[f64],
        tg_pct: &[f64],
        dsc_mw: &[f64],
        sample_mass_mg: Option<f64>,
    ) -> KineticsResult<Self> {
        check_lengths("DSC", temp_k.len(), dsc_mw.len())?;
        let mass = match sample_mass_mg {
            Some(m) if m.is_finite() && m > 0.0 => m,
            Some(m) => {
                return Err(KineticsError::Configuration(format!(
                    "sample mass must be positive, got {} mg",
                    m
                )));
            }
            None => 1.0,
        };
        let normalised: Vec<f64> = dsc_mw.iter().map(|d| d / mass).collect();
        Self::thermogram(beta, temp_k, time_min, tg_pct, Some(&normalised))
    }

    fn thermogram(
        beta: f64,
        temp_k: &[f64],
        time_min: &[f64],
        tg_pct: &[f64],
        dsc_w_g: Option<&[f64]>,
    ) -> KineticsResult<Self> {
        check_beta(beta)?;
        let n = temp_k.len();
        check_lengths("Time_min", n, time_min.len())?;
        check_lengths("TG_pct", n, tg_pct.len())?;
        let mut rows: Vec<(f64, f64, f64, f64)> = (0..n)
            .filter(|&i| temp_k[i].is_finite() && tg_pct[i].is_finite())
            .map(|i| {
                let dsc = dsc_w_g.map_or(f64::NAN, |d| d[i]);
                (temp_k[i], time_min[i], tg_pct[i], dsc)
            })
            .collect();
        if rows.is_empty() {
            return Err(KineticsError::InsufficientData(format!(
                "thermogram at beta = {} has no finite samples",
                beta
            )));
        }
        let m0 = rows[0].2;
        let m_inf = rows.iter().map(|r| r.2).fold(f64::INFINITY, f64::min);
        let span = m0 - m_inf;
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        let samples = rows
            .iter()
            .map(|&(t, time, tg, dsc)| Sample {
                temp_k: t,
                time_min: time,
                alpha: if span != 0.0 { (m0 - tg) / span } else { 0.0 },
                dadt: f64::NAN,
                tg_pct: tg,
                dtg_min: f64::NAN,
                dsc_w_g: dsc,
            })
            .collect();
        let mut series = Self::finish(beta, samples, (m0, m_inf))?;
        let t: Vec<f64> = series.temp_k();
        let a: Vec<f64> = series.alpha();
        for (s, d) in series.samples.iter_mut().zip(gradient(&a, &t)) {
            s.dadt = d;
        }
        Ok(series)
    }

    fn finish(beta: f64, rows: Vec<Sample>, mass_endpoints: (f64, f64)) -> KineticsResult<Self> {
        if rows.len() < 2 {
            return Err(KineticsError::InsufficientData(format!(
                "series at beta = {} needs at least two samples",
                beta
            )));
        }
        let mut samples = enforce_monotone(rows);
        let tg: Vec<f64> = samples.iter().map(|s| s.tg_pct).collect();
        let time: Vec<f64> = samples.iter().map(|s| s.time_min).collect();
        for (s, d) in samples.iter_mut().zip(gradient(&tg, &time)) {
            s.dtg_min = d;
        }
        Ok(Self {
            beta,
            samples,
            mass_endpoints,
        })
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn temp_k(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.temp_k).collect()
    }

    pub fn alpha(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.alpha).collect()
    }

    pub fn dadt(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.dadt).collect()
    }

    pub fn has_dsc(&self) -> bool {
        self.samples.iter().any(|s| s.dsc_w_g.is_finite())
    }

    /// (m0, m∞); (100, 0) when the recorded span is zero.
    pub fn mass_endpoints(&self) -> (f64, f64) {
        let (m0, m_inf) = self.mass_endpoints;
        if m0 - m_inf == 0.0 {
            (100.0, 0.0)
        } else {
            (m0, m_inf)
        }
    }

    /// Experimental rate dα/dt in 1/min for every sample.
    pub fn rate_per_min(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.dadt * self.beta).collect()
    }

    /// Temperature at which the series reaches conversion `a`.
    ///
    /// Takes the first sample with α ≥ a. At the first sample, or on an exact hit, that
    /// sample's temperature is returned as is; otherwise the temperature is interpolated
    /// linearly from the preceding sample. `None` if the series never reaches `a`.
    pub fn temperature_at(&self, a: f64) -> Option<f64> {
        let idx = self.samples.iter().position(|s| s.alpha >= a)?;
        let s1 = &self.samples[idx];
        if idx == 0 || s1.alpha == a {
            return Some(s1.temp_k);
        }
        let s0 = &self.samples[idx - 1];
        let da = s1.alpha - s0.alpha;
        if da < crate::Kinetics::EPS {
            return Some(s0.temp_k);
        }
        Some(s0.temp_k + (a - s0.alpha) * (s1.temp_k - s0.temp_k) / da)
    }
}

/// Series with distinct heating rates, ordered by β.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSet {
    series: Vec<HeatingRateSeries>,
}

impl SeriesSet {
    pub fn new(mut series: Vec<HeatingRateSeries>) -> KineticsResult<Self> {
        series.sort_by(|a, b| a.beta.total_cmp(&b.beta));
        if let Some(w) = series.windows(2).find(|w| w[0].beta == w[1].beta) {
            return Err(KineticsError::Configuration(format!(
                "duplicate heating rate {} K/min",
                w[0].beta
            )));
        }
        Ok(Self { series })
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HeatingRateSeries> {
        self.series.iter()
    }

    pub fn betas(&self) -> Vec<f64> {
        self.series.iter().map(|s| s.beta).collect()
    }

    pub fn get(&self, beta: f64) -> Option<&HeatingRateSeries> {
        self.series.iter().find(|s| s.beta == beta)
    }

    /// Copy of the set without the series at `beta`.
    pub fn without(&self, beta: f64) -> SeriesSet {
        SeriesSet {
            series: self
                .series
                .iter()
                .filter(|s| s.beta != beta)
                .cloned()
                .collect(),
        }
    }

    /// Copy of the set with the series at `beta` replaced.
    pub fn replaced(&self, replacement: HeatingRateSeries) -> KineticsResult<SeriesSet> {
        let mut series = self.without(replacement.beta).series;
        series.push(replacement);
        SeriesSet::new(series)
    }
}

impl<'a> IntoIterator for &'a SeriesSet {
    type Item = &'a HeatingRateSeries;
    type IntoIter = std::slice::Iter<'a, HeatingRateSeries>;
    fn into_iter(self) -> Self::IntoIter {
        self.series.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sort_clip_and_running_max() {
        let t = [303.0, 301.0, 302.0, 304.0, 305.0];
        let time = [3.0, 1.0, 2.0, 4.0, 5.0];
        let a = [0.3, -0.1, 0.2, 0.25, 1.4];
        let d = [0.1; 5];
        let s = HeatingRateSeries::from_columns(10.0, &t, &time, &a, &d).unwrap();
        assert_eq!(s.temp_k(), vec![301.0, 302.0, 303.0, 304.0, 305.0]);
        assert_eq!(s.alpha(), vec![0.0, 0.2, 0.3, 0.3, 1.0]);
        assert!(s.alpha().windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_thermogram_conversion() {
        let t = [400.0, 410.0, 420.0, 430.0, 440.0];
        let time = [0.0, 1.0, 2.0, 3.0, 4.0];
        let tg = [100.0, 95.0, 70.0, 45.0, 40.0];
        let s = HeatingRateSeries::from_thermogram(10.0, &t, &time, &tg).unwrap();
        assert_relative_eq!(s.alpha()[0], 0.0);
        assert_relative_eq!(s.alpha()[2], 0.5);
        assert_relative_eq!(s.alpha()[4], 1.0);
        assert_eq!(s.mass_endpoints(), (100.0, 40.0));
        // central difference (0.5 - 0.0) / 20
        assert_relative_eq!(s.dadt()[1], (30.0 / 60.0) / 20.0, epsilon = 1e-12);
        assert_relative_eq!(s.samples()[2].dtg_min, -25.0, epsilon = 1e-12);
    }

    #[test]
    fn test_flat_thermogram_defaults_endpoints() {
        let s = HeatingRateSeries::from_thermogram(
            5.0,
            &[400.0, 410.0, 420.0],
            &[0.0, 2.0, 4.0],
            &[80.0, 80.0, 80.0],
        )
        .unwrap();
        assert_eq!(s.mass_endpoints(), (100.0, 0.0));
        assert!(s.alpha().iter().all(|a| *a == 0.0));
    }

    #[test]
    fn test_dsc_column_is_mass_normalised() {
        let t = [420.0, 400.0, 410.0];
        let time = [2.0, 0.0, 1.0];
        let tg = [90.0, 100.0, 95.0];
        let dsc = [-4.0, 1.0, f64::NAN];
        let s = HeatingRateSeries::from_thermogram_with_dsc(10.0, &t, &time, &tg, &dsc, Some(2.0))
            .unwrap();
        assert!(s.has_dsc());
        let col: Vec<f64> = s.samples().iter().map(|x| x.dsc_w_g).collect();
        // follows the temperature sort
        assert_eq!(col[0], 0.5);
        assert!(col[1].is_nan());
        assert_eq!(col[2], -2.0);
        assert!(!HeatingRateSeries::from_thermogram(10.0, &t, &time, &tg).unwrap().has_dsc());
        assert!(matches!(
            HeatingRateSeries::from_thermogram_with_dsc(10.0, &t, &time, &tg, &dsc, Some(0.0)),
            Err(KineticsError::Configuration(_))
        ));
        assert!(HeatingRateSeries::from_thermogram_with_dsc(10.0, &t, &time, &tg, &dsc[..2], None)
            .is_err());
    }

    #[test]
    fn test_temperature_at() {
        let t = [500.0, 510.0, 520.0, 530.0];
        let a = [0.1, 0.2, 0.4, 0.8];
        let s = HeatingRateSeries::from_columns(10.0, &t, &t, &a, &[0.0; 4]).unwrap();
        assert_eq!(s.temperature_at(0.05), Some(500.0));
        assert_eq!(s.temperature_at(0.2), Some(510.0));
        assert_relative_eq!(s.temperature_at(0.3).unwrap(), 515.0);
        assert_relative_eq!(s.temperature_at(0.6).unwrap(), 525.0);
        assert_eq!(s.temperature_at(0.9), None);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            HeatingRateSeries::from_columns(0.0, &[1.0, 2.0], &[1.0, 2.0], &[0.0, 0.1], &[0.0, 0.0]),
            Err(KineticsError::Configuration(_))
        ));
        assert!(HeatingRateSeries::from_columns(5.0, &[1.0, 2.0], &[1.0], &[0.0, 0.1], &[0.0, 0.0])
            .is_err());
        assert!(matches!(
            HeatingRateSeries::from_columns(5.0, &[1.0], &[1.0], &[0.0], &[0.0]),
            Err(KineticsError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_series_set() {
        let mk = |b: f64| {
            HeatingRateSeries::from_columns(b, &[1.0, 2.0], &[1.0, 2.0], &[0.0, 0.5], &[0.1, 0.1])
                .unwrap()
        };
        let set = SeriesSet::new(vec![mk(20.0), mk(5.0), mk(10.0)]).unwrap();
        assert_eq!(set.betas(), vec![5.0, 10.0, 20.0]);
        assert_eq!(set.without(10.0).betas(), vec![5.0, 20.0]);
        assert!(SeriesSet::new(vec![mk(5.0), mk(5.0)]).is_err());
    }
}
