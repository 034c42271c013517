#[cfg(test)]
mod tests {
    use crate::Kinetics::heating_rate_series::SeriesSet;
    use crate::Kinetics::isoconversional::{EaCurve, EaPoint, IsoMethod, IsoconversionalSolver};
    use crate::Kinetics::kinetics_error::KineticsError;
    use crate::Kinetics::synthetic::SyntheticGenerator;
    use crate::Utils::statistics::arange_inclusive;
    use approx::assert_relative_eq;
    use strum::IntoEnumIterator;

    const EA_KJ: f64 = 120.0;
    const A_PER_S: f64 = 1e10;

    fn first_order_set(betas: &[f64]) -> SeriesSet {
        SyntheticGenerator::new(SyntheticGenerator::first_order(EA_KJ, A_PER_S), 400.0, 650.0, 0.5)
            .unwrap()
            .series_set(betas)
            .unwrap()
    }

    #[test]
    fn test_all_methods_recover_first_order_energy() {
        let set = first_order_set(&[5.0, 10.0, 20.0]);
        let alphas = arange_inclusive(0.2, 0.8, 0.05);
        for method in IsoMethod::iter() {
            let result = IsoconversionalSolver::new(&set, method).solve(&alphas).unwrap();
            let curve = &result.value.ea_curve;
            assert!(!curve.is_empty(), "{} produced no energies", method);
            for p in curve.points() {
                assert!(
                    (p.ea_kj - EA_KJ).abs() / EA_KJ < 0.05,
                    "{} at alpha = {}: {} kJ/mol",
                    method,
                    p.alpha,
                    p.ea_kj
                );
            }
            if method == IsoMethod::Vyazovkin {
                assert!(curve.ea_kj().iter().all(|e| (114.0..=126.0).contains(e)));
                assert!(result.value.regression_points.is_empty());
                // one energy per increment
                assert_eq!(curve.len(), alphas.len() - 1);
            } else {
                assert_eq!(curve.len(), alphas.len());
                assert_eq!(result.value.regression_points.len(), 3 * alphas.len());
            }
        }
    }

    #[test]
    fn test_friedman_is_nearly_exact() {
        let set = first_order_set(&[5.0, 10.0, 20.0]);
        let result = IsoconversionalSolver::new(&set, IsoMethod::Friedman)
            .solve(&[0.3, 0.5, 0.7])
            .unwrap();
        for p in result.value.ea_curve.points() {
            assert_relative_eq!(p.ea_kj, EA_KJ, max_relative = 0.01);
            assert!(p.r_squared > 0.999);
        }
    }

    #[test]
    fn test_alpha_temperature_table() {
        let set = first_order_set(&[5.0, 10.0, 20.0]);
        let result = IsoconversionalSolver::new(&set, IsoMethod::KAS)
            .solve(&[0.2, 0.5])
            .unwrap();
        let rows = &result.value.alpha_temperature;
        assert_eq!(rows.len(), 2);
        for row in rows {
            let temps: Vec<f64> = row.temperatures.iter().map(|(_, t)| t.unwrap()).collect();
            // faster heating reaches the same conversion later
            assert!(temps.windows(2).all(|w| w[1] > w[0]));
        }
    }

    #[test]
    fn test_unreached_conversion_is_absent() {
        let slow = SyntheticGenerator::new(SyntheticGenerator::first_order(EA_KJ, A_PER_S), 400.0, 650.0, 0.5)
            .unwrap()
            .series(5.0)
            .unwrap();
        // stops around alpha = 0.5 at 10 K/min
        let truncated =
            SyntheticGenerator::new(SyntheticGenerator::first_order(EA_KJ, A_PER_S), 400.0, 512.0, 0.5)
                .unwrap()
                .series(10.0)
                .unwrap();
        let set = SeriesSet::new(vec![slow, truncated]).unwrap();
        let result = IsoconversionalSolver::new(&set, IsoMethod::Friedman)
            .solve(&[0.2, 0.3, 0.9])
            .unwrap();
        let curve = &result.value.ea_curve;
        assert_eq!(curve.alphas(), vec![0.2, 0.3]);
        assert!(curve.ea_kj().iter().all(|e| e.is_finite()));
        assert!(result.value.alpha_temperature[2].temperatures[1].1.is_none());
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn test_solve_is_idempotent() {
        let set = first_order_set(&[5.0, 10.0, 20.0]);
        let solver = IsoconversionalSolver::new(&set, IsoMethod::Vyazovkin);
        let a = solver.solve(&[0.3, 0.4, 0.5]).unwrap().value;
        let b = solver.solve(&[0.3, 0.4, 0.5]).unwrap().value;
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_requests() {
        let set = first_order_set(&[5.0, 10.0]);
        let solver = IsoconversionalSolver::new(&set, IsoMethod::OFW);
        assert!(matches!(solver.solve(&[]), Err(KineticsError::Configuration(_))));
        assert!(matches!(solver.solve(&[0.5, 0.3]), Err(KineticsError::Configuration(_))));
        assert!(matches!(solver.solve(&[0.0, 0.3]), Err(KineticsError::Configuration(_))));
        let single = set.without(10.0);
        assert!(matches!(
            IsoconversionalSolver::new(&single, IsoMethod::OFW).solve(&[0.3]),
            Err(KineticsError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_ea_curve_operations() {
        let point = |alpha: f64, ea_kj: f64| EaPoint {
            alpha,
            ea_kj,
            r_squared: 1.0,
            std_err_kj: 0.0,
        };
        let curve = EaCurve::new(
            IsoMethod::Friedman,
            vec![point(0.2, 100.0), point(0.4, f64::NAN), point(0.6, 140.0)],
        )
        .unwrap();
        // the NaN row is dropped
        assert_eq!(curve.alphas(), vec![0.2, 0.6]);
        assert_relative_eq!(curve.ea_at(0.4), 120.0);
        assert_relative_eq!(curve.ea_at(0.0), 100.0);
        assert_relative_eq!(curve.ea_at(0.9), 140.0);
        assert_relative_eq!(curve.ea_j_at(0.4), 120e3);
        assert_relative_eq!(curve.mean_ea_kj(), 120.0);
        assert_eq!(curve.window(0.3, 0.7), vec![140.0]);
        let pchip = curve.pchip_j().unwrap();
        assert_relative_eq!(pchip.eval(0.2), 100e3, epsilon = 1e-6);
        assert!(
            EaCurve::new(IsoMethod::KAS, vec![point(0.5, 1.0), point(0.4, 1.0)]).is_err()
        );
        assert!(matches!(
            EaCurve::new(IsoMethod::KAS, vec![point(0.5, f64::NAN)]),
            Err(KineticsError::NumericalDomain(_))
        ));
    }
}
