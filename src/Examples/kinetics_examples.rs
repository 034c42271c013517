use crate::Kinetics::heating_rate_series::{HeatingRateSeries, SeriesSet};
use crate::Kinetics::ideal_mechanisms::IdealMechanism;
use crate::Kinetics::isoconversional::{IsoMethod, IsoconversionalSolver};
use crate::Kinetics::pretty_print::PrettyPrint;
use crate::Kinetics::rate_laws::{EaSource, ModelKind, RateModel, SestakBerggren};
use crate::Kinetics::session::KineticsSession;
use crate::Kinetics::synthetic::SyntheticGenerator;
use crate::settings::{AnalysisSettings, with_settings};

const BETAS: [f64; 4] = [2.5, 5.0, 10.0, 20.0];

fn first_order_data() -> SeriesSet {
    SyntheticGenerator::new(SyntheticGenerator::first_order(120.0, 1e10), 400.0, 650.0, 0.5)
        .and_then(|g| g.series_set(&BETAS))
        .unwrap_or_else(|e| panic!("synthetic data: {}", e))
}

pub fn kin_examples(kintask: usize) {
    //
    let settings: AnalysisSettings = with_settings(|s| s.clone());
    match kintask {
        0 => {
            // MODEL-FREE ANALYSIS: all four methods on the same first-order data
            let set = first_order_data();
            let alphas = settings.iso_alphas();
            for method in [IsoMethod::Friedman, IsoMethod::KAS, IsoMethod::OFW, IsoMethod::Vyazovkin] {
                match IsoconversionalSolver::new(&set, method)
                    .with_tolerances(settings.vyazovkin_tolerances)
                    .with_max_iters(settings.vyazovkin_max_iters)
                    .solve(&alphas)
                {
                    Ok(result) => {
                        result.value.ea_curve.pretty_print();
                        if method == IsoMethod::Friedman {
                            result.value.pretty_print();
                        }
                        result.diagnostics.pretty_print();
                    }
                    Err(e) => println!("{} failed: {}", method, e),
                }
            }
        }
        1 => {
            // FULL WORKFLOW: Ea(alpha) -> global fit -> lifetime -> reconstruction -> validation
            let session = KineticsSession::new(first_order_data(), settings)
                .unwrap_or_else(|e| panic!("{}", e));
            let session = session.with_isoconversional().unwrap_or_else(|e| panic!("{}", e));
            if let Some(curve) = session.value.ea_curve() {
                curve.pretty_print();
            }
            let fitted = session
                .value
                .with_fit(ModelKind::GlobalFit)
                .unwrap_or_else(|e| panic!("{}", e))
                .value;
            if let Some(model) = fitted.fitted_model() {
                model.pretty_print();
            }

            let lifetime = fitted.predict_lifetime(Some(450.0)).unwrap_or_else(|e| panic!("{}", e));
            lifetime.value.pretty_print();
            println!("t(alpha = 0.5) at 450 K: {:.3} days", lifetime.value.days_at(0.5));

            match fitted.reconstruct(10.0) {
                Ok(curve) => curve.pretty_print(),
                Err(e) => println!("reconstruction failed: {}", e),
            }
            match fitted.cross_validate(None) {
                Ok(report) => report.value.pretty_print(),
                Err(e) => println!("cross-validation failed: {}", e),
            }
            match fitted.compare_mechanisms(&[]) {
                Ok(ranking) => {
                    for m in ranking.ranking.iter().take(5) {
                        println!("{:>10} {:<45} R2 = {:.4}", m.mechanism, m.mechanism.name(), m.r_squared);
                    }
                }
                Err(e) => println!("mechanism comparison failed: {}", e),
            }
        }
        2 => {
            // AUTOCATALYTIC FAMILY AND NPA on a Sestak-Berggren(0.5, 1.5) process
            let model: RateModel = SestakBerggren::new(
                0.5,
                1.5,
                0.0,
                (5e9_f64 * 60.0).ln(),
                EaSource::Fixed { ea_j: 110e3 },
            )
            .into();
            let set = SyntheticGenerator::new(model, 380.0, 650.0, 0.5)
                .and_then(|g| g.series_set(&BETAS))
                .unwrap_or_else(|e| panic!("{}", e));
            let session = KineticsSession::new(set, settings)
                .and_then(|s| s.with_isoconversional())
                .unwrap_or_else(|e| panic!("{}", e))
                .value;
            for kind in [ModelKind::Cka, ModelKind::KamalSourour, ModelKind::Gai, ModelKind::Par] {
                match session.with_fit(kind) {
                    Ok(fit) => {
                        if let Some(model) = fit.value.fitted_model() {
                            model.pretty_print();
                        }
                        fit.diagnostics.pretty_print();
                    }
                    Err(e) => println!("{} failed: {}", kind, e),
                }
            }
            if let Ok(npa) = session.with_npa() {
                if let Some(bins) = npa.value.npa_bins() {
                    for b in bins.iter().step_by(5) {
                        println!("alpha = {:.3}: log10 Z = {:.4}", b.alpha, b.log10_z);
                    }
                }
            }
        }
        3 => {
            // TG/DTG and DSC characteristic points from thermograms; the DSC trace is an
            // endotherm proportional to the conversion rate, -300 J/g in total, 8 mg sample
            let set = first_order_data();
            let thermograms: Vec<HeatingRateSeries> = set
                .iter()
                .filter_map(|s| {
                    let time: Vec<f64> = s.samples().iter().map(|x| x.time_min).collect();
                    let tg: Vec<f64> = s.samples().iter().map(|x| x.tg_pct).collect();
                    let dsc_mw: Vec<f64> = s
                        .rate_per_min()
                        .iter()
                        .map(|r| if r.is_finite() { -300.0 * 8.0 * r / 60.0 } else { 0.0 })
                        .collect();
                    HeatingRateSeries::from_thermogram_with_dsc(
                        s.beta(),
                        &s.temp_k(),
                        &time,
                        &tg,
                        &dsc_mw,
                        Some(8.0),
                    )
                    .ok()
                })
                .collect();
            let set = SeriesSet::new(thermograms).unwrap_or_else(|e| panic!("{}", e));
            let session = KineticsSession::new(set, settings).unwrap_or_else(|e| panic!("{}", e));
            match session.thermal_events() {
                Ok(table) => table.value.pretty_print(),
                Err(e) => println!("TG/DTG analysis failed: {}", e),
            }
            match session.dsc_events() {
                Ok(table) => table.value.pretty_print(),
                Err(e) => println!("DSC analysis failed: {}", e),
            }
        }
        4 => {
            // LIBRARY OF IDEAL MECHANISMS
            IdealMechanism::pretty_print();
        }
        _ => {
            println!("Wrong task number");
        }
    }
}
