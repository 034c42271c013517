//////////////////////////////////////////////////////////////////////////////////////////////////
// TESTS
//////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use crate::Kinetics::heating_rate_series::SeriesSet;
    use crate::Kinetics::ideal_mechanisms::{IdealMechanism, ShapeExponents, compare_fit};
    use crate::Kinetics::isoconversional::{EaCurve, IsoMethod, solve_isoconversional};
    use crate::Kinetics::kinetics_error::KineticsError;
    use crate::Kinetics::model_fitting::{ModelFitter, fit_model, predict_rate_curve};
    use crate::Kinetics::rate_laws::{ModelKind, RateFunction};
    use crate::Kinetics::synthetic::SyntheticGenerator;
    use crate::Utils::LM_optimization::{LMSettings, Loss};
    use crate::Utils::statistics::{arange_inclusive, r_squared};
    use approx::assert_relative_eq;

    const EA_KJ: f64 = 120.0;
    const A_PER_S: f64 = 1e10;

    fn first_order_set() -> SeriesSet {
        SyntheticGenerator::new(SyntheticGenerator::first_order(EA_KJ, A_PER_S), 400.0, 650.0, 0.5)
            .unwrap()
            .series_set(&[5.0, 10.0, 20.0])
            .unwrap()
    }

    fn friedman_curve(set: &SeriesSet) -> EaCurve {
        solve_isoconversional(set, IsoMethod::Friedman, &arange_inclusive(0.05, 0.95, 0.05))
            .unwrap()
            .value
            .ea_curve
    }

    /// ln of the per-minute prefactor of the synthetic data
    fn ln_a_min() -> f64 {
        (A_PER_S * 60.0).ln()
    }

    #[test]
    fn test_global_fit_recovers_first_order() {
        let set = first_order_set();
        let curve = friedman_curve(&set);
        let fit = ModelFitter::new(&set, &curve, 0.1, 0.9)
            .unwrap()
            .fit_global()
            .unwrap()
            .value;
        assert_eq!(fit.kind, ModelKind::GlobalFit);
        assert_eq!(fit.param_order, vec!["m", "n", "p", "logA"]);
        assert!(fit.raw_parameter("m").unwrap().abs() < 0.1);
        assert!((fit.raw_parameter("n").unwrap() - 1.0).abs() < 0.1);
        assert!(fit.raw_parameter("p").unwrap().abs() < 0.1);
        let ln_a = fit.raw_parameter("logA").unwrap();
        assert!((ln_a - ln_a_min()).abs() / ln_a_min() < 0.05);
        assert!(fit.r_squared > 0.99);
        assert!(fit.covariance.is_some());
        let a = fit.derived_parameter("A").unwrap();
        assert_relative_eq!(a.value, ln_a.exp() / 60.0, max_relative = 1e-12);
        assert_eq!(a.unit, "1/s");
        assert_relative_eq!(
            fit.derived_parameter("Ea").unwrap().value,
            EA_KJ,
            max_relative = 0.02
        );
    }

    #[test]
    fn test_fit_is_idempotent() {
        let set = first_order_set();
        let curve = friedman_curve(&set);
        let first = fit_model(&set, &curve, ModelKind::GlobalFit, 0.1, 0.9).unwrap().value;
        let second = fit_model(&set, &curve, ModelKind::GlobalFit, 0.1, 0.9).unwrap().value;
        assert_eq!(first.raw, second.raw);
        assert_eq!(first.cost, second.cost);
    }

    #[test]
    fn test_cka_fixes_the_mean_energy() {
        let set = first_order_set();
        let curve = friedman_curve(&set);
        let fit = fit_model(&set, &curve, ModelKind::Cka, 0.1, 0.9).unwrap().value;
        assert_eq!(fit.kind, ModelKind::Cka);
        // Ea is carried in the raw vector but not in the 4x4 covariance
        assert_eq!(fit.raw.len(), 5);
        assert_relative_eq!(fit.raw_parameter("Ea_J").unwrap(), 120e3, max_relative = 0.02);
        if let Some(cov) = &fit.covariance {
            assert_eq!(cov.nrows(), 4);
        }
        assert!((fit.raw_parameter("n").unwrap() - 1.0).abs() < 0.1);
        assert!(fit.r_squared > 0.99);
    }

    #[test]
    fn test_autocatalytic_fits_succeed() {
        let set = first_order_set();
        let curve = friedman_curve(&set);
        let fitter = ModelFitter::new(&set, &curve, 0.1, 0.9).unwrap();
        for kind in [ModelKind::KamalSourour, ModelKind::Gai, ModelKind::Par] {
            let fit = fitter.fit(kind).unwrap().value;
            assert_eq!(fit.kind, kind);
            assert_eq!(fit.model.kind(), kind);
            assert_eq!(fit.raw.len(), fit.param_order.len());
            assert!(fit.raw.iter().all(|v| v.is_finite()), "{}: {:?}", kind, fit.raw);
            assert!(fit.cost.is_finite());
            // equivalent shape for the mechanism comparison
            let shape = ShapeExponents::from_fit(&fit).unwrap();
            assert!(shape.m > 0.0 && shape.m < 1.0);
            assert_relative_eq!(shape.m + shape.n, 1.0);
            assert_eq!(shape.p, 0.0);
        }
        assert!(matches!(
            fitter.fit_autocatalytic(ModelKind::Cka),
            Err(KineticsError::Configuration(_))
        ));
    }

    #[test]
    fn test_npa_through_the_fitter() {
        let set = first_order_set();
        let curve = friedman_curve(&set);
        let fit = fit_model(&set, &curve, ModelKind::Npa, 0.1, 0.9).unwrap().value;
        assert_eq!(fit.kind, ModelKind::Npa);
        assert!(fit.raw.is_empty());
        assert!(fit.covariance.is_none());
        assert!(fit.r_squared > 0.95);
        assert!(matches!(
            ShapeExponents::from_fit(&fit),
            Err(KineticsError::Configuration(_))
        ));
    }

    #[test]
    fn test_predicted_rate_follows_each_series() {
        let set = first_order_set();
        let curve = friedman_curve(&set);
        let fit = fit_model(&set, &curve, ModelKind::GlobalFit, 0.1, 0.9).unwrap().value;
        for series in &set {
            let points: Vec<_> = predict_rate_curve(&fit.model, series)
                .into_iter()
                .filter(|p| p.alpha > 0.1 && p.alpha < 0.9)
                .collect();
            let observed: Vec<f64> = points.iter().map(|p| p.observed).collect();
            let predicted: Vec<f64> = points.iter().map(|p| p.predicted).collect();
            assert!(r_squared(&observed, &predicted) > 0.99);
        }
    }

    #[test]
    fn test_first_order_shape_ranks_first_order_mechanisms() {
        let set = first_order_set();
        let curve = friedman_curve(&set);
        let fit = fit_model(&set, &curve, ModelKind::GlobalFit, 0.1, 0.9).unwrap().value;
        let cmp = compare_fit(&fit, &[IdealMechanism::F1, IdealMechanism::F2, IdealMechanism::A3])
            .unwrap();
        assert_eq!(cmp.ranking[0].mechanism, IdealMechanism::F1);
        assert!(cmp.ranking[0].r_squared > 0.95);
    }

    #[test]
    fn test_unconverged_fit_is_a_convergence_error() {
        let set = first_order_set();
        let curve = friedman_curve(&set);
        let starved = LMSettings {
            ftol: 0.0,
            xtol: 0.0,
            gtol: 0.0,
            max_iterations: 1,
            loss: Loss::Linear,
        };
        let fitter = ModelFitter::new(&set, &curve, 0.1, 0.9)
            .unwrap()
            .with_settings(starved);
        assert!(matches!(fitter.fit_global(), Err(KineticsError::Convergence(_))));
        assert!(matches!(fitter.fit(ModelKind::Cka), Err(KineticsError::Convergence(_))));
    }
}
