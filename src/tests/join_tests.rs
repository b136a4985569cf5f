#[cfg(test)]
mod join_tests {
    use crate::config::PipelineConfig;
    use crate::io::{f64_values, has_column, i64_values, timestamp_values};
    use crate::join::*;
    use crate::normalize::normalize_weather;
    use crate::tests::test_helpers::*;
    use chrono::{Duration, NaiveDateTime};
    use polars::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn distance(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
        (a - b).num_seconds().abs()
    }

    #[test]
    fn test_no_unmatched_candidate_is_strictly_closer() {
        let mut rng = StdRng::seed_from_u64(11);
        let base = at(day(0), 0);

        // Whole hours on both sides make exact ties likely.
        let mut right: Vec<NaiveDateTime> = (0..40)
            .map(|_| base + Duration::hours(rng.gen_range(0..24 * 200)))
            .collect();
        right.sort();
        right.dedup();
        let left: Vec<NaiveDateTime> = (0..200)
            .map(|_| base + Duration::hours(rng.gen_range(-24 * 10..24 * 210)))
            .collect();

        let left_df = DataFrame::new(vec![
            Column::new("obs".into(), (0..left.len() as i64).collect::<Vec<_>>()),
            ts_column("date", &left.iter().copied().map(Some).collect::<Vec<_>>()),
        ])
        .unwrap();
        let right_df = DataFrame::new(vec![
            ts_column("date", &right.iter().copied().map(Some).collect::<Vec<_>>()),
            Column::new("stamp".into(), (0..right.len() as i64).collect::<Vec<_>>()),
        ])
        .unwrap();

        let merged = merge_asof_nearest(&left_df, &right_df, "date").unwrap();
        assert_eq!(merged.height(), left.len());

        let observations = i64_values(&merged, "features", "obs").unwrap();
        let stamps = i64_values(&merged, "features", "stamp").unwrap();
        for (obs, stamp) in observations.into_iter().zip(stamps) {
            let target = left[obs.unwrap() as usize];
            let chosen = right[stamp.unwrap() as usize];
            for candidate in &right {
                let (d_candidate, d_chosen) = (distance(*candidate, target), distance(chosen, target));
                assert!(d_candidate >= d_chosen);
                if d_candidate == d_chosen {
                    assert!(chosen <= *candidate, "tie at {target} went to the later reading");
                }
            }
        }
    }

    #[test]
    fn test_parcel_uses_day_before_with_corrected_radiation() {
        let d = day(69);
        let monitoring = DataFrame::new(vec![
            Column::new("parcelle_id".into(), ["P001"]),
            ts_column("date", &[Some(at(d, 0))]),
            Column::new("ndvi".into(), [0.6]),
        ])
        .unwrap();
        let weather = DataFrame::new(vec![
            ts_column(
                "date",
                &[Some(at(d - Duration::days(1), 12)), Some(at(d + Duration::days(2), 9))],
            ),
            Column::new("rayonnement_solaire".into(), [-3.0, 5.0]),
        ])
        .unwrap();
        let soil = polars::df!("parcelle_id" => ["P001"], "ph" => [6.8]).unwrap();
        let history = yield_frame(&[("P001", 2024, Some(7.0))]);

        let daily = normalize_weather(&weather, 2024).unwrap();
        let features =
            build_feature_table(&monitoring, &daily, &soil, &history, &PipelineConfig::default()).unwrap();

        assert_eq!(features.height(), 1);
        assert_eq!(timestamp_values(&features, "features", "date").unwrap(), vec![Some(at(d, 0))]);
        assert_eq!(f64_values(&features, "features", "rayonnement_solaire").unwrap(), vec![Some(3.0)]);
        assert_eq!(f64_values(&features, "features", "ph").unwrap(), vec![Some(6.8)]);
        assert_eq!(f64_values(&features, "features", "rendement").unwrap(), vec![Some(7.0)]);
        // no culture / matiere_organique columns, so scoring is skipped
        assert!(!has_column(&features, "risk_index"));
    }

    #[test]
    fn test_no_weather_leaves_weather_columns_null() {
        let monitoring = DataFrame::new(vec![
            Column::new("parcelle_id".into(), ["P001"]),
            ts_column("date", &[Some(at(day(10), 0))]),
        ])
        .unwrap();
        let weather = DataFrame::new(vec![
            ts_column("date", &[]),
            Column::new("temperature".into(), Vec::<f64>::new()),
        ])
        .unwrap();

        let merged = merge_asof_nearest(&monitoring, &weather, "date").unwrap();
        assert_eq!(names(&merged), vec!["parcelle_id", "date", "temperature"]);
        assert_eq!(f64_values(&merged, "features", "temperature").unwrap(), vec![None]);
    }

    #[test]
    fn test_full_sources_keep_monitoring_coordinates() {
        let (dir, config) = full_data_dir();
        let sources = crate::loader::load_sources(&config);
        let daily = normalize_weather(sources.weather.as_ref().unwrap(), 2024).unwrap();

        let features = build_feature_table(
            sources.monitoring.as_ref().unwrap(),
            &daily,
            sources.soil.as_ref().unwrap(),
            sources.yield_history.as_ref().unwrap(),
            &config,
        )
        .unwrap();

        assert_eq!(features.height(), 2 * NDVI_OBSERVATIONS as usize);
        for dropped in ["latitude_x", "latitude_y", "longitude_x", "longitude_y"] {
            assert!(!has_column(&features, dropped));
        }
        let p1 = select_parcel(&features, "P001");
        assert_eq!(p1.height(), NDVI_OBSERVATIONS as usize);
        assert!(f64_values(&p1, "features", "latitude").unwrap().iter().all(|v| *v == Some(45.1)));
        assert!(f64_values(&p1, "features", "rendement").unwrap().iter().all(|v| *v == Some(7.5)));
        assert!(has_column(&features, "risk_index"));
        assert!(has_column(&features, "risk_category"));

        let dates = timestamp_values(&features, "features", "date").unwrap();
        assert!(dates.windows(2).all(|w| w[0] <= w[1]));
        drop(dir);
    }
}
