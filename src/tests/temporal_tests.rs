#[cfg(test)]
mod temporal_tests {
    use crate::config::AnalysisConfig;
    use crate::errors::PipelineError;
    use crate::temporal::*;
    use crate::tests::test_helpers::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use polars::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_ndvi_patterns_with_enough_observations() {
        let features = ndvi_frame("P001", 30);
        let (history, trend) = ndvi_patterns(&features, "P001", &AnalysisConfig::default()).unwrap();

        assert_eq!(history.ndvi_seasonal.len(), 30);
        assert_eq!(history.ndvi_trend.len(), 18);
        assert_eq!(history.ndvi_residual.len(), 18);
        assert_eq!(history.ndvi_trend[0].date, at(day(7 * 6), 0));

        assert_eq!(history.ndvi_moving_avg.len(), 1);
        assert_eq!(history.ndvi_moving_avg[0].date, at(day(7 * 29), 0));
        let expected_avg = (0..30).map(ndvi_value).sum::<f64>() / 30.0;
        assert_relative_eq!(history.ndvi_moving_avg[0].value, expected_avg, epsilon = 1e-12);

        assert_relative_eq!(history.summary_stats.mean, expected_avg, epsilon = 1e-12);
        assert!(trend.slope > 0.0);
        assert_relative_eq!(trend.mean_variation, trend.slope / expected_avg, epsilon = 1e-12);
    }

    #[test]
    fn test_ndvi_patterns_ignore_null_ndvi_and_other_parcels() {
        let gap = DataFrame::new(vec![
            Column::new("parcelle_id".into(), ["P001"]),
            ts_column("date", &[Some(at(day(300), 0))]),
            Column::new("ndvi".into(), [None::<f64>]),
        ])
        .unwrap();
        let features = ndvi_frame("P001", 30)
            .vstack(&ndvi_frame("P002", 3))
            .unwrap()
            .vstack(&gap)
            .unwrap();

        let (history, _) = ndvi_patterns(&features, "P001", &AnalysisConfig::default()).unwrap();
        assert_eq!(history.ndvi_seasonal.len(), 30);
    }

    #[test]
    fn test_too_few_ndvi_observations() {
        let err = ndvi_patterns(&ndvi_frame("P001", 5), "P001", &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData { required: 12, found: 5, .. }
        ));
    }

    #[test]
    fn test_decomposition_needs_two_cycles() {
        let err = ndvi_patterns(&ndvi_frame("P001", 15), "P001", &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData { required: 24, found: 15, .. }
        ));
    }

    #[test]
    fn test_unknown_parcel_and_missing_column() {
        let features = ndvi_frame("P001", 30);
        assert!(matches!(
            ndvi_patterns(&features, "P404", &AnalysisConfig::default()),
            Err(PipelineError::EmptyInput { .. })
        ));

        let without_ndvi = features.drop("ndvi").unwrap();
        assert!(matches!(
            ndvi_patterns(&without_ndvi, "P001", &AnalysisConfig::default()),
            Err(PipelineError::Schema { .. })
        ));
    }

    #[test]
    fn test_constant_yield_series_gets_noise() {
        let history = yield_frame(&[
            ("P002", 2020, Some(4.0)),
            ("P002", 2021, Some(4.0)),
            ("P002", 2022, Some(4.0)),
            ("P002", 2023, Some(4.0)),
            ("P002", 2024, Some(4.0)),
        ]);
        let mut rng = StdRng::seed_from_u64(42);

        let analysis = analyze_yield_patterns(&history, "P002", 0.1, &mut rng).unwrap();
        assert!(analysis.noise_injected);
        assert!(analysis.trend.slope.abs() < 1e-3);
        assert_eq!(analysis.residuals.len(), 5);
        assert!(analysis.residuals.iter().all(|r| r.value.abs() < 0.5));
        assert_abs_diff_eq!(analysis.summary.mean, 4.0, epsilon = 0.2);
    }

    #[test]
    fn test_yield_residuals_sum_to_zero() {
        let history = yield_frame(&[
            ("P001", 2023, Some(7.2)),
            ("P001", 2020, Some(6.0)),
            ("P001", 2022, None),
            ("P001", 2021, Some(6.5)),
            ("P001", 2024, Some(7.5)),
        ]);
        let mut rng = StdRng::seed_from_u64(1);

        let analysis = analyze_yield_patterns(&history, "P001", 0.1, &mut rng).unwrap();
        assert!(!analysis.noise_injected);
        assert!(analysis.trend.slope > 0.0);

        let sum: f64 = analysis.residuals.iter().map(|r| r.value).sum();
        assert_abs_diff_eq!(sum, 0.0, epsilon = 1e-9);
        assert_relative_eq!(analysis.summary.mean, 6.81, epsilon = 1e-12);
        assert_eq!(analysis.summary.min, 6.0);
        assert_eq!(analysis.summary.max, 7.5);

        let years: Vec<i32> = analysis
            .residuals
            .iter()
            .map(|r| chrono::Datelike::year(&r.date))
            .collect();
        assert_eq!(years, vec![2020, 2021, 2022, 2023, 2024]);
    }

    #[test]
    fn test_leading_missing_yields_are_dropped() {
        let history = yield_frame(&[
            ("P003", 2022, None),
            ("P003", 2023, Some(5.0)),
            ("P003", 2024, Some(6.0)),
        ]);
        let mut rng = StdRng::seed_from_u64(3);

        let analysis = analyze_yield_patterns(&history, "P003", 0.1, &mut rng).unwrap();
        assert_eq!(analysis.residuals.len(), 2);
        assert_abs_diff_eq!(analysis.residuals[0].value, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_yield_for_unknown_parcel_is_empty_input() {
        let history = yield_frame(&[("P001", 2024, Some(7.0))]);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            analyze_yield_patterns(&history, "P999", 0.1, &mut rng),
            Err(PipelineError::EmptyInput { .. })
        ));
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let history = yield_frame(&[("P002", 2023, Some(4.0)), ("P002", 2024, Some(4.0))]);
        let a = analyze_yield_patterns(&history, "P002", 0.1, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = analyze_yield_patterns(&history, "P002", 0.1, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }
}
