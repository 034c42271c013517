//////////////////////////////////////////////////////////////////////////////////////////////////
// TESTS: cross-validation, lifetime prediction, reconstruction and the session workflow
//////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use crate::Kinetics::cross_validation::{CrossValidator, MIN_HEATING_RATES};
    use crate::Kinetics::curve_reconstruction::CurveReconstructor;
    use crate::Kinetics::heating_rate_series::{HeatingRateSeries, SeriesSet};
    use crate::Kinetics::isoconversional::{EaCurve, IsoMethod, solve_isoconversional};
    use crate::Kinetics::kinetics_error::KineticsError;
    use crate::Kinetics::model_fitting::{FittedModel, fit_model};
    use crate::Kinetics::pretty_print::PrettyPrint;
    use crate::Kinetics::rate_laws::ModelKind;
    use crate::Kinetics::session::KineticsSession;
    use crate::Kinetics::synthetic::SyntheticGenerator;
    use crate::Kinetics::thermal_events::analyze_thermal_events;
    use crate::Kinetics::uncertainty::{POINTS_WITH_CI, UncertaintyPropagator};
    use crate::Utils::statistics::arange_inclusive;
    use crate::settings::AnalysisSettings;

    fn first_order_set(betas: &[f64]) -> SeriesSet {
        SyntheticGenerator::new(SyntheticGenerator::first_order(120.0, 1e10), 400.0, 650.0, 0.5)
            .unwrap()
            .series_set(betas)
            .unwrap()
    }

    /// Copy of a series with dα/dT scaled sample by sample.
    fn scaled(series: &HeatingRateSeries, factor: impl Fn(usize) -> f64) -> HeatingRateSeries {
        let s = series.samples();
        let time: Vec<f64> = s.iter().map(|x| x.time_min).collect();
        let dadt: Vec<f64> = s.iter().enumerate().map(|(i, x)| x.dadt * factor(i)).collect();
        HeatingRateSeries::from_columns(series.beta(), &series.temp_k(), &time, &series.alpha(), &dadt)
            .unwrap()
    }

    /// ±2 % deterministic ripple on the rates, enough for a non-degenerate covariance
    fn rippled(set: &SeriesSet) -> SeriesSet {
        SeriesSet::new(
            set.iter()
                .map(|s| scaled(s, |i| 1.0 + 0.02 * (i as f64 * 0.7).sin()))
                .collect(),
        )
        .unwrap()
    }

    fn friedman_curve(set: &SeriesSet) -> EaCurve {
        solve_isoconversional(set, IsoMethod::Friedman, &arange_inclusive(0.05, 0.95, 0.05))
            .unwrap()
            .value
            .ea_curve
    }

    fn global_fit(set: &SeriesSet) -> FittedModel {
        let curve = friedman_curve(set);
        fit_model(set, &curve, ModelKind::GlobalFit, 0.1, 0.9).unwrap().value
    }

    fn validator(set: &SeriesSet) -> CrossValidator<'_> {
        CrossValidator::new(
            set,
            ModelKind::GlobalFit,
            IsoMethod::Friedman,
            &arange_inclusive(0.05, 0.95, 0.05),
            0.1,
            0.9,
        )
        .unwrap()
    }

    #[test]
    fn test_cross_validation_on_clean_data() {
        let set = first_order_set(&[5.0, 10.0, 15.0, 20.0]);
        let report = validator(&set).run().unwrap().value;
        assert_eq!(report.folds.len(), 4);
        assert_eq!(report.n_failed(), 0);
        assert_eq!(report.finite_sse().len(), 4);
        assert!(report.mean_sse().is_finite());
        for fold in &report.folds {
            let fit = fold.result.as_ref().unwrap();
            assert!(fit.n_points > 0);
            assert_eq!(fit.params.len(), 4);
        }
        let spread = report.parameter_spread();
        assert_eq!(spread[1].name, "n");
        assert!((spread[1].mean - 1.0).abs() < 0.1);
        assert_eq!(report.table().len(), 4 + 2 + spread.len());
    }

    #[test]
    fn test_clean_folds_agree_within_an_order_of_magnitude() {
        let set = first_order_set(&[5.0, 10.0, 15.0, 20.0]);
        let report = validator(&set).run().unwrap().value;
        let relative = report.finite_relative_sse();
        assert_eq!(relative.len(), 4);
        assert!(relative.iter().all(|r| r.is_finite() && *r >= 0.0));
        let spread = report.relative_sse_spread();
        assert!(spread <= 10.0, "relative SSE {:?}, spread {}", relative, spread);
        // the raw SSE is in (1/min)^2 and still grows with the rate level
        let raw = report.finite_sse();
        assert!(raw[3] > raw[0]);
    }

    #[test]
    fn test_corrupted_series_inflates_its_fold() {
        let clean = first_order_set(&[5.0, 10.0, 15.0, 20.0]);
        let corrupted_series = scaled(clean.get(15.0).unwrap(), |_| 3.0);
        let corrupted = clean.replaced(corrupted_series).unwrap();
        let clean_report = validator(&clean).run().unwrap().value;
        let corrupted_report = validator(&corrupted).run().unwrap().value;
        let clean_sse = clean_report.fold(15.0).unwrap().sse();
        let corrupted_sse = corrupted_report.fold(15.0).unwrap().sse();
        assert!(corrupted_sse.is_finite());
        assert!(corrupted_sse >= 10.0 * clean_sse, "{} vs {}", corrupted_sse, clean_sse);
        // a threefold rate error leaves a relative SSE near (1 - 1/3)^2 on its own fold,
        // far above anything a clean fold reaches
        let corrupted_relative = corrupted_report.fold(15.0).unwrap().relative_sse();
        let worst_clean = clean_report
            .finite_relative_sse()
            .into_iter()
            .fold(0.0, f64::max);
        assert!(corrupted_relative > 0.1, "{}", corrupted_relative);
        assert!(corrupted_relative >= 10.0 * worst_clean);
    }

    #[test]
    fn test_cross_validation_needs_three_rates() {
        let set = first_order_set(&[5.0, 10.0]);
        assert!(set.len() < MIN_HEATING_RATES);
        assert!(matches!(
            validator(&set).run(),
            Err(KineticsError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_lifetime_interval_is_ordered() {
        let set = rippled(&first_order_set(&[5.0, 10.0, 20.0]));
        let fit = global_fit(&set);
        assert!(fit.covariance.is_some());
        let result = UncertaintyPropagator::new(&fit).predict(450.0).unwrap();
        let curve = result.value;
        assert!(curve.has_confidence_interval);
        assert_eq!(curve.points.len(), POINTS_WITH_CI);
        for p in &curve.points {
            assert!(p.t_days.is_finite() && p.t_days > 0.0);
            assert!(p.ci_lower_days >= 0.0);
            assert!(p.ci_lower_days <= p.t_days);
            assert!(p.t_days <= p.ci_upper_days);
            assert!(p.variance_days2 >= 0.0);
        }
        assert!(curve.points.windows(2).all(|w| w[1].t_days > w[0].t_days));
        // colder storage, longer life
        let colder = UncertaintyPropagator::new(&fit).predict(430.0).unwrap().value;
        assert!(colder.days_at(0.5) > curve.days_at(0.5));
    }

    #[test]
    fn test_reconstruction_follows_measured_conversion() {
        let set = first_order_set(&[5.0, 10.0, 20.0]);
        let fit = global_fit(&set);
        for series in &set {
            let curve = CurveReconstructor::new(&fit).reconstruct(series).unwrap();
            assert_eq!(curve.points.len(), series.len());
            for (p, s) in curve.points.iter().zip(series.samples()) {
                assert!((p.alpha_model - s.alpha).abs() < 0.05, "beta {} T {}", series.beta(), s.temp_k);
                assert!((0.0..=1.0).contains(&p.alpha_model));
            }
            assert!(curve.rmse_alpha < 0.02);
        }
    }

    #[test]
    fn test_thermal_events_shift_with_heating_rate() {
        let set = first_order_set(&[5.0, 10.0, 20.0]);
        let table = analyze_thermal_events(&set).unwrap().value;
        let peaks: Vec<f64> = table.successful().map(|(_, e)| e.t_peak_k).collect();
        assert_eq!(peaks.len(), 3);
        assert!(peaks.windows(2).all(|w| w[1] > w[0]));
        for (_, e) in table.successful() {
            assert!(e.t_onset_k < e.t_peak_k && e.t_peak_k < e.t_end_k);
            assert!(e.l_max_pct_min > 0.0);
            assert!(e.mass_loss_pct > 50.0 && e.mass_loss_pct <= 100.0);
        }
    }

    #[test]
    fn test_dsc_events_of_an_endotherm_following_the_rate() {
        // heat flow = ΔH · dα/dt with ΔH = -250 J/g, recorded in mW for a 5 mg sample
        let set = first_order_set(&[5.0, 10.0, 20.0]);
        let with_dsc: Vec<HeatingRateSeries> = set
            .iter()
            .map(|s| {
                let time: Vec<f64> = s.samples().iter().map(|x| x.time_min).collect();
                let tg: Vec<f64> = s.samples().iter().map(|x| x.tg_pct).collect();
                let dsc: Vec<f64> = s
                    .rate_per_min()
                    .iter()
                    .map(|r| if r.is_finite() { -250.0 * 5.0 * r / 60.0 } else { 0.0 })
                    .collect();
                HeatingRateSeries::from_thermogram_with_dsc(s.beta(), &s.temp_k(), &time, &tg, &dsc, Some(5.0))
                    .unwrap()
            })
            .collect();
        let session =
            KineticsSession::new(SeriesSet::new(with_dsc).unwrap(), AnalysisSettings::default()).unwrap();
        let table = session.dsc_events().unwrap().value;
        let events: Vec<_> = table.successful().map(|(_, e)| *e).collect();
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[1].t_peak_k > w[0].t_peak_k));
        for e in &events {
            assert!(e.peak_w_g < 0.0);
            assert!(e.t_onset_k < e.t_peak_k && e.t_peak_k < e.t_end_k);
            // the chord between onset and endset cuts off the tails of the peak
            assert!(e.enthalpy_j_g < -125.0 && e.enthalpy_j_g > -250.0, "{}", e.enthalpy_j_g);
        }
        assert!(table.rows.len() == 3 && table.table().len() == 4);
    }

    #[test]
    fn test_session_threads_stages_without_mutation() {
        let set = first_order_set(&[5.0, 10.0, 15.0, 20.0]);
        let start = KineticsSession::new(set, AnalysisSettings::default()).unwrap();
        assert!(matches!(
            start.with_fit(ModelKind::GlobalFit),
            Err(KineticsError::Configuration(_))
        ));
        assert!(matches!(
            start.predict_lifetime(None),
            Err(KineticsError::Configuration(_))
        ));

        let iso = start.with_isoconversional().unwrap().value;
        assert!(start.ea_curve().is_none());
        assert!(iso.ea_curve().is_some());

        let fitted = iso.with_fit(ModelKind::GlobalFit).unwrap().value;
        assert!(iso.fitted_model().is_none());
        assert_eq!(fitted.fitted_model().unwrap().kind, ModelKind::GlobalFit);

        let npa = fitted.with_npa().unwrap().value;
        assert_eq!(npa.fitted_model().unwrap().kind, ModelKind::Npa);
        assert!(npa.npa_bins().is_some());
        // the earlier session keeps its own fit
        assert_eq!(fitted.fitted_model().unwrap().kind, ModelKind::GlobalFit);
        assert!(fitted.npa_bins().is_none());

        let prediction = npa.predict_lifetime(Some(450.0)).unwrap();
        assert!(!prediction.value.has_confidence_interval);
        assert!(prediction.diagnostics.has_warnings());

        let curve = fitted.reconstruct(10.0).unwrap();
        assert!(curve.rmse_alpha < 0.02);
        assert!(matches!(
            fitted.reconstruct(7.0),
            Err(KineticsError::Configuration(_))
        ));

        let report = fitted.cross_validate(None).unwrap().value;
        assert_eq!(report.kind, ModelKind::GlobalFit);
        assert_eq!(report.folds.len(), 4);

        let ranking = fitted.compare_mechanisms(&[]).unwrap();
        assert_eq!(ranking.ranking.len(), 68);
    }
}
