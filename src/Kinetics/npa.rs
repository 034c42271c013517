//! # Non-parametric analysis
//!
//! Separates the rate into its temperature part, taken from the isoconversional Eₐ(α), and a
//! model-free amplitude
//!
//! ```text
//! Z(α) = A(α)·f(α) = (β/60 · dα/dT) / exp(−Eₐ(α)/RT)      [1/s]
//! ```
//!
//! Z is computed for every sample inside the α window, averaged over equal-width α bins and
//! reported as log₁₀ Z. The binned table together with the Eₐ curve defines a rate law
//! (`RateModel::NonParametric`) that can be used for lifetime prediction and curve
//! reconstruction like any fitted model.

use crate::Kinetics::diagnostics::{Analysis, Diagnostics};
use crate::Kinetics::heating_rate_series::SeriesSet;
use crate::Kinetics::isoconversional::EaCurve;
use crate::Kinetics::kinetics_error::{KineticsError, KineticsResult, check_alpha_range};
use crate::Kinetics::model_fitting::{FittedModel, PooledRates};
use crate::Kinetics::rate_laws::{
    ModelKind, NonParametricRate, RateFunction, RateModel, clip_alpha,
};
use crate::Kinetics::R;
use crate::Utils::interpolation::Pchip;
use crate::Utils::statistics::{linspace, r_squared};
use log::{debug, info};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NPA_BINS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NpaBin {
    /// bin centre
    pub alpha: f64,
    /// mean Z over the bin, 1/s
    pub z_per_s: f64,
    pub log10_z: f64,
    pub n_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpaResult {
    pub bins: Vec<NpaBin>,
    pub model: FittedModel,
}

pub struct NonParametricAnalyzer<'a> {
    series: &'a SeriesSet,
    ea_curve: &'a EaCurve,
    alpha_range: (f64, f64),
    n_bins: usize,
}

impl<'a> NonParametricAnalyzer<'a> {
    pub fn new(
        series: &'a SeriesSet,
        ea_curve: &'a EaCurve,
        amin: f64,
        amax: f64,
    ) -> KineticsResult<Self> {
        check_alpha_range(amin, amax)?;
        Ok(Self {
            series,
            ea_curve,
            alpha_range: (amin, amax),
            n_bins: DEFAULT_NPA_BINS,
        })
    }

    pub fn with_bins(mut self, n_bins: usize) -> Self {
        self.n_bins = n_bins.max(1);
        self
    }

    /// (α, Z) for every usable sample of every series inside the window.
    pub fn amplitudes(&self) -> Vec<(f64, f64)> {
        let (amin, amax) = self.alpha_range;
        let mut out = Vec::new();
        for s in self.series {
            let beta_s = s.beta() / 60.0;
            for sample in s.samples() {
                let (a, _) = clip_alpha(sample.alpha);
                if a < amin || a > amax || !sample.dadt.is_finite() {
                    continue;
                }
                let ea = self.ea_curve.ea_j_at(a);
                let z = sample.dadt * beta_s / (-ea / (R * sample.temp_k)).exp();
                if z.is_finite() && z > 0.0 {
                    out.push((a, z));
                }
            }
        }
        out
    }

    /// Mean Z per bin. Bins are closed on the right; the lowest edge belongs to the first bin.
    fn bin(&self, amplitudes: &[(f64, f64)]) -> Vec<NpaBin> {
        let (amin, amax) = self.alpha_range;
        let edges = linspace(amin, amax, self.n_bins + 1);
        let width = (amax - amin) / self.n_bins as f64;
        let mut sums = vec![(0.0_f64, 0usize); self.n_bins];
        for &(a, z) in amplitudes {
            // first edge >= a closes the bin
            let upper = edges.partition_point(|&e| e < a);
            let idx = upper.saturating_sub(1).min(self.n_bins - 1);
            sums[idx].0 += z;
            sums[idx].1 += 1;
        }
        sums.iter()
            .enumerate()
            .filter(|(_, (_, n))| *n > 0)
            .map(|(i, (sum, n))| {
                let z = sum / *n as f64;
                NpaBin {
                    alpha: edges[i] + width / 2.0,
                    z_per_s: z,
                    log10_z: z.log10(),
                    n_samples: *n,
                }
            })
            .collect()
    }

    pub fn analyze(&self) -> KineticsResult<Analysis<NpaResult>> {
        let mut diagnostics = Diagnostics::new();
        let amplitudes = self.amplitudes();
        let bins = self.bin(&amplitudes);
        if bins.is_empty() {
            return Err(KineticsError::NumericalDomain(format!(
                "NPA: no finite positive Z(alpha) in [{}, {}]",
                self.alpha_range.0, self.alpha_range.1
            )));
        }
        debug!(
            "NPA: {} samples averaged into {} of {} bins",
            amplitudes.len(),
            bins.len(),
            self.n_bins
        );
        if bins.len() < self.n_bins {
            diagnostics.info(
                "NPA",
                format!("{} of {} bins are empty", self.n_bins - bins.len(), self.n_bins),
            );
        }
        let model = self.build_model(&bins)?;
        info!(
            "NPA: log10 Z from {:.3} to {:.3}",
            bins.first().map(|b| b.log10_z).unwrap_or(f64::NAN),
            bins.last().map(|b| b.log10_z).unwrap_or(f64::NAN)
        );
        Ok(Analysis::new(NpaResult { bins, model }, diagnostics))
    }

    fn build_model(&self, bins: &[NpaBin]) -> KineticsResult<FittedModel> {
        let ln_z = Pchip::new(
            bins.iter().map(|b| b.alpha).collect(),
            bins.iter().map(|b| b.z_per_s.ln()).collect(),
        )
        .map_err(KineticsError::NumericalDomain)?;
        let rate = NonParametricRate::new(ln_z, self.ea_curve.pchip_j()?);
        let (amin, amax) = self.alpha_range;
        let data = PooledRates::collect(self.series, amin, amax);
        let predicted: Vec<f64> = (0..data.len())
            .map(|i| rate.rate_per_min(data.alpha[i], data.temp_k[i]))
            .collect();
        let cost = 0.5
            * predicted
                .iter()
                .zip(data.rate.iter())
                .map(|(p, o)| (p - o).powi(2))
                .filter(|v| v.is_finite())
                .sum::<f64>();
        Ok(FittedModel {
            model: RateModel::from(rate),
            kind: ModelKind::Npa,
            param_order: Vec::new(),
            raw: Vec::new(),
            derived: Vec::new(),
            covariance: None,
            r_squared: r_squared(&data.rate, &predicted),
            n_samples: data.len(),
            cost,
            alpha_range: self.alpha_range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Kinetics::heating_rate_series::HeatingRateSeries;
    use crate::Kinetics::isoconversional::IsoMethod;
    use approx::assert_relative_eq;

    /// First-order series with an exact dα/dT, Z = A(1−α)
    fn first_order(beta: f64, a_per_s: f64, ea_j: f64) -> HeatingRateSeries {
        let t: Vec<f64> = (0..200).map(|i| 450.0 + i as f64).collect();
        let time: Vec<f64> = t.iter().map(|x| (x - 450.0) / beta).collect();
        let alpha: Vec<f64> = (0..200).map(|i| (i as f64 + 0.5) / 200.0).collect();
        let dadt: Vec<f64> = t
            .iter()
            .zip(alpha.iter())
            .map(|(tk, a)| a_per_s * 60.0 / beta * (-ea_j / (R * tk)).exp() * (1.0 - a))
            .collect();
        HeatingRateSeries::from_columns(beta, &t, &time, &alpha, &dadt).unwrap()
    }

    #[test]
    fn test_amplitude_recovers_prefactor() {
        let set = SeriesSet::new(vec![first_order(5.0, 1e10, 120e3), first_order(10.0, 1e10, 120e3)])
            .unwrap();
        let curve = EaCurve::constant(IsoMethod::Friedman, &[0.05, 0.5, 0.95], 120.0).unwrap();
        let analyzer = NonParametricAnalyzer::new(&set, &curve, 0.1, 0.9).unwrap();
        for (a, z) in analyzer.amplitudes() {
            assert_relative_eq!(z, 1e10 * (1.0 - a), max_relative = 1e-9);
        }
    }

    #[test]
    fn test_bins_and_model() {
        let set = SeriesSet::new(vec![first_order(5.0, 1e10, 120e3), first_order(10.0, 1e10, 120e3)])
            .unwrap();
        let curve = EaCurve::constant(IsoMethod::Friedman, &[0.05, 0.5, 0.95], 120.0).unwrap();
        let result = NonParametricAnalyzer::new(&set, &curve, 0.1, 0.9)
            .unwrap()
            .with_bins(10)
            .analyze()
            .unwrap()
            .value;
        assert_eq!(result.bins.len(), 10);
        assert_eq!(result.model.kind, ModelKind::Npa);
        assert!(result.model.covariance.is_none());
        for b in &result.bins {
            assert!(b.alpha > 0.1 && b.alpha < 0.9);
            assert_relative_eq!(b.log10_z, b.z_per_s.log10());
            // Z decreases as 1 − α
            assert!(b.log10_z > 9.0 && b.log10_z < 10.0);
        }
        assert!(result.model.r_squared > 0.99);
    }

    #[test]
    fn test_empty_window_is_an_error() {
        let set = SeriesSet::new(vec![first_order(5.0, 1e10, 120e3)]).unwrap();
        let curve = EaCurve::constant(IsoMethod::Friedman, &[0.05, 0.5, 0.95], 120.0).unwrap();
        // window between two consecutive samples
        let analyzer = NonParametricAnalyzer::new(&set, &curve, 0.5001, 0.5020).unwrap();
        assert!(matches!(
            analyzer.analyze(),
            Err(KineticsError::NumericalDomain(_))
        ));
    }
}
