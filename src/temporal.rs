//! Per-parcel trend analyses over the feature artifact (NDVI) and over the
//! multi-year yield history.

use chrono::NaiveDateTime;
use polars::prelude::*;
use rand::Rng;
use rand_distr::Normal;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::artifact::read_feature_artifact;
use crate::config::AnalysisConfig;
use crate::decompose::seasonal_decompose_additive;
use crate::errors::PipelineError;
use crate::io::{f64_values, i64_values, require_columns, timestamp_values};
use crate::join::{PARCEL_COLUMN, YIELD_COLUMN};
use crate::loader::YEAR_COLUMN;
use crate::normalize::DATE_COLUMN;
use crate::stats::{interpolate_linear, rolling_mean, LinearFit, SummaryStats};
use crate::utils::{date_ordinal, year_start};

pub const NDVI_COLUMN: &str = "ndvi";

/// Linear trend of a series against the date ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendSummary {
    #[serde(rename = "pente")]
    pub slope: f64,
    pub intercept: f64,
    /// Slope relative to the series mean, 0 when the mean is 0.
    #[serde(rename = "variation_moyenne")]
    pub mean_variation: f64,
}

impl TrendSummary {
    fn new(fit: &LinearFit, mean: f64) -> Self {
        Self {
            slope: fit.slope,
            intercept: fit.intercept,
            mean_variation: if mean != 0.0 { fit.slope / mean } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DatedValue {
    pub date: NaiveDateTime,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NdviHistory {
    pub ndvi_trend: Vec<DatedValue>,
    pub ndvi_seasonal: Vec<DatedValue>,
    pub ndvi_residual: Vec<DatedValue>,
    pub ndvi_moving_avg: Vec<DatedValue>,
    pub summary_stats: SummaryStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldAnalysis {
    #[serde(rename = "tendance")]
    pub trend: TrendSummary,
    #[serde(rename = "residus")]
    pub residuals: Vec<DatedValue>,
    #[serde(rename = "statistiques_resume")]
    pub summary: SummaryStats,
    pub noise_injected: bool,
}

fn fit_against_dates(dates: &[NaiveDateTime], values: &[f64]) -> Result<LinearFit, PipelineError> {
    let x: Vec<f64> = dates.iter().map(|d| date_ordinal(d) as f64).collect();
    LinearFit::fit(&x, values)
        .ok_or_else(|| PipelineError::Computation("linear trend fit on empty series".to_string()))
}

fn zip_dated(dates: &[NaiveDateTime], values: impl IntoIterator<Item = Option<f64>>) -> Vec<DatedValue> {
    dates
        .iter()
        .zip(values)
        .filter_map(|(&date, v)| v.map(|value| DatedValue { date, value }))
        .collect()
}

/// Rows of one parcel, sorted on `order_by`.
pub fn parcel_rows(df: &DataFrame, parcel_id: &str, order_by: &str) -> Result<DataFrame, PipelineError> {
    require_columns(df, "parcel selection", &[PARCEL_COLUMN, order_by])?;
    df.clone()
        .lazy()
        .filter(col(PARCEL_COLUMN).cast(DataType::String).eq(lit(parcel_id)))
        .sort(
            [order_by],
            SortMultipleOptions::default()
                .with_maintain_order(true)
                .with_nulls_last(true),
        )
        .collect()
        .map_err(PipelineError::polars(format!("selecting parcelle_id {parcel_id}")))
}

/// Dated NDVI observations of one parcel, nulls skipped, in date order.
pub fn ndvi_series(features: &DataFrame, parcel_id: &str) -> Result<Vec<DatedValue>, PipelineError> {
    require_columns(features, "features", &[NDVI_COLUMN])?;
    let parcel = parcel_rows(features, parcel_id, DATE_COLUMN)?;
    if parcel.height() == 0 {
        return Err(PipelineError::empty(format!("parcelle_id {parcel_id}")));
    }
    let dates = timestamp_values(&parcel, "features", DATE_COLUMN)?;
    let ndvi = f64_values(&parcel, "features", NDVI_COLUMN)?;
    Ok(dates
        .into_iter()
        .zip(ndvi)
        .filter_map(|(d, v)| Some(DatedValue { date: d?, value: v? }))
        .collect())
}

/// NDVI decomposition, moving average and linear trend for one parcel of an
/// in-memory feature table.
pub fn ndvi_patterns(
    features: &DataFrame,
    parcel_id: &str,
    config: &AnalysisConfig,
) -> Result<(NdviHistory, TrendSummary), PipelineError> {
    let (dates, ndvi): (Vec<NaiveDateTime>, Vec<f64>) = ndvi_series(features, parcel_id)?
        .into_iter()
        .map(|p| (p.date, p.value))
        .unzip();

    if ndvi.len() < config.min_ndvi_observations {
        return Err(PipelineError::InsufficientData {
            what: format!("NDVI analysis of {parcel_id}"),
            required: config.min_ndvi_observations,
            found: ndvi.len(),
        });
    }

    let decomposition = seasonal_decompose_additive(&ndvi, config.seasonal_period)?;
    let fit = fit_against_dates(&dates, &ndvi)?;
    let summary = SummaryStats::from_values(&ndvi)
        .ok_or_else(|| PipelineError::empty(format!("NDVI values of {parcel_id}")))?;

    let window = config.moving_average_window;
    let moving = rolling_mean(&ndvi, window);
    let moving_dates = if moving.is_empty() { &[][..] } else { &dates[window - 1..] };

    let history = NdviHistory {
        ndvi_trend: zip_dated(&dates, decomposition.trend),
        ndvi_seasonal: zip_dated(&dates, decomposition.seasonal.into_iter().map(Some)),
        ndvi_residual: zip_dated(&dates, decomposition.residual),
        ndvi_moving_avg: zip_dated(moving_dates, moving.into_iter().map(Some)),
        summary_stats: summary,
    };

    debug!(
        "NDVI analysis of {}: {} observations, slope {:.6}",
        parcel_id,
        ndvi.len(),
        fit.slope
    );
    Ok((history, TrendSummary::new(&fit, summary.mean)))
}

/// Reload the persisted feature table and analyse one parcel's NDVI.
pub fn get_temporal_patterns(
    artifact_path: &Path,
    parcel_id: &str,
    config: &AnalysisConfig,
) -> Result<(NdviHistory, TrendSummary), PipelineError> {
    let features = read_feature_artifact(artifact_path)?;
    ndvi_patterns(&features, parcel_id, config)
}

/// Linear trend, residuals and summary of one parcel's yearly yields.
///
/// Missing yields are interpolated; a constant series gets `noise_std`
/// Gaussian noise so the trend stays well defined.
pub fn analyze_yield_patterns<R: Rng>(
    yield_history: &DataFrame,
    parcel_id: &str,
    noise_std: f64,
    rng: &mut R,
) -> Result<YieldAnalysis, PipelineError> {
    require_columns(yield_history, "yield_history", &[YIELD_COLUMN])?;
    let parcel = parcel_rows(yield_history, parcel_id, YEAR_COLUMN)?;
    if parcel.height() == 0 {
        return Err(PipelineError::empty(format!("yield data of parcelle_id {parcel_id}")));
    }

    let years: Vec<Option<NaiveDateTime>> = i64_values(&parcel, "yield_history", YEAR_COLUMN)?
        .into_iter()
        .map(|y| y.and_then(|y| i32::try_from(y).ok()).and_then(year_start))
        .collect();
    let raw = f64_values(&parcel, "yield_history", YIELD_COLUMN)?;

    let filled = if raw.iter().any(Option::is_none) {
        info!("Filling missing values in yield series of {}", parcel_id);
        interpolate_linear(&raw)
    } else {
        raw
    };

    let (dates, mut values): (Vec<NaiveDateTime>, Vec<f64>) = years
        .into_iter()
        .zip(filled)
        .filter_map(|(d, v)| Some((d?, v?)))
        .unzip();
    if values.is_empty() {
        return Err(PipelineError::empty(format!("usable yield values of {parcel_id}")));
    }
    if values.len() < parcel.height() {
        warn!(
            "Dropped {} leading yield rows of {} that could not be interpolated",
            parcel.height() - values.len(),
            parcel_id
        );
    }

    let constant = values.iter().all(|&v| v == values[0]);
    if constant {
        info!("Adding noise to constant yield series of {}", parcel_id);
        let noise = Normal::new(0.0, noise_std).map_err(|e| {
            PipelineError::Computation(format!("invalid yield noise std {noise_std}: {e}"))
        })?;
        for v in &mut values {
            *v += rng.sample(noise);
        }
    }

    let fit = fit_against_dates(&dates, &values)?;
    let residuals = dates
        .iter()
        .zip(&values)
        .map(|(&date, &v)| DatedValue {
            date,
            value: v - fit.predict(date_ordinal(&date) as f64),
        })
        .collect();

    let summary = SummaryStats::from_values(&values)
        .ok_or_else(|| PipelineError::empty(format!("yield values of {parcel_id}")))?;

    Ok(YieldAnalysis {
        trend: TrendSummary::new(&fit, summary.mean),
        residuals,
        summary,
        noise_injected: constant,
    })
}
