//! Noise-free thermal-analysis data generated from a known rate law.
//!
//! α(T) is integrated under linear heating from α₀ = ε at the first temperature (RK45 on the
//! symbolic rate law, see [`heating_program_alpha`]); dα/dT is
//! then evaluated from the rate law itself, so the Friedman input carries no differentiation
//! error. Residual mass is 100·(1 − α).

use crate::Kinetics::EPS;
use crate::Kinetics::curve_reconstruction::heating_program_alpha;
use crate::Kinetics::heating_rate_series::{HeatingRateSeries, SeriesSet};
use crate::Kinetics::kinetics_error::{KineticsError, KineticsResult};
use crate::Kinetics::rate_laws::{EaSource, RateFunction, RateModel, SestakBerggren};
use crate::Utils::ode::Tolerances;
use crate::Utils::statistics::arange_inclusive;
use log::debug;

#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    model: RateModel,
    t_start: f64,
    t_end: f64,
    t_step: f64,
    tolerances: Tolerances,
}

impl SyntheticGenerator {
    /// Temperature grid `t_start..=t_end` with spacing `t_step`, K.
    pub fn new(model: RateModel, t_start: f64, t_end: f64, t_step: f64) -> KineticsResult<Self> {
        if !(t_start > 0.0 && t_end > t_start && t_step > 0.0) {
            return Err(KineticsError::Configuration(format!(
                "invalid temperature grid {}..{} step {}",
                t_start, t_end, t_step
            )));
        }
        Ok(Self {
            model,
            t_start,
            t_end,
            t_step,
            tolerances: Tolerances::new(1e-8, 1e-12),
        })
    }

    /// First-order (F1) law with a fixed activation energy, A in 1/s.
    pub fn first_order(ea_kj: f64, a_per_s: f64) -> RateModel {
        SestakBerggren::new(
            0.0,
            1.0,
            0.0,
            (a_per_s * 60.0).ln(),
            EaSource::Fixed { ea_j: ea_kj * 1000.0 },
        )
        .into()
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn model(&self) -> &RateModel {
        &self.model
    }

    pub fn series(&self, beta: f64) -> KineticsResult<HeatingRateSeries> {
        let temp = arange_inclusive(self.t_start, self.t_end, self.t_step);
        let alpha = heating_program_alpha(&self.model, beta, &temp, EPS, self.tolerances)
            .map_err(|e| {
                KineticsError::Reconstruction(format!(
                    "synthetic series at beta = {} failed: {}",
                    beta, e
                ))
            })?;
        debug!("synthetic beta = {}: {} points", beta, temp.len());
        let dadt: Vec<f64> = temp
            .iter()
            .zip(alpha.iter())
            .map(|(&t, &a)| self.model.rate_per_min(a, t) / beta)
            .collect();
        let time: Vec<f64> = temp.iter().map(|t| (t - self.t_start) / beta).collect();
        HeatingRateSeries::from_columns(beta, &temp, &time, &alpha, &dadt)
    }

    pub fn series_set(&self, betas: &[f64]) -> KineticsResult<SeriesSet> {
        let series = betas
            .iter()
            .map(|&b| self.series(b))
            .collect::<KineticsResult<Vec<_>>>()?;
        SeriesSet::new(series)
    }
}
