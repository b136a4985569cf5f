use polars::prelude::*;
use tracing::{debug, info};

use crate::errors::PipelineError;
use crate::io::{is_numeric, require_columns, timestamp_dtype};

pub const DATE_COLUMN: &str = "date";
pub const RADIATION_COLUMN: &str = "rayonnement_solaire";

/// Keep the rows whose date falls in `year`. Rows without a date are dropped.
pub fn filter_year(weather: &DataFrame, column: &str, year: i32) -> Result<DataFrame, PipelineError> {
    require_columns(weather, "weather", &[column])?;
    weather
        .clone()
        .lazy()
        .filter(col(column).dt().year().eq(lit(year)))
        .collect()
        .map_err(PipelineError::polars(format!("filtering weather to {year}")))
}

/// Replace every solar radiation reading with its absolute value.
pub fn fix_radiation_sign(weather: &DataFrame) -> Result<DataFrame, PipelineError> {
    require_columns(weather, "weather", &[RADIATION_COLUMN])?;
    weather
        .clone()
        .lazy()
        .with_column(col(RADIATION_COLUMN).abs())
        .collect()
        .map_err(PipelineError::polars("radiation sign fix"))
}

/// Collapse sub-daily rows into one row per calendar day, labelled at
/// midnight, averaging every numeric column. Nulls are skipped, non-numeric
/// columns dropped, and days with no rows are absent.
pub fn resample_daily_mean(weather: &DataFrame, date_column: &str) -> Result<DataFrame, PipelineError> {
    require_columns(weather, "weather", &[date_column])?;

    let numeric: Vec<String> = weather
        .get_columns()
        .iter()
        .filter(|c| c.name().as_str() != date_column && is_numeric(c.dtype()))
        .map(|c| c.name().to_string())
        .collect();
    let dropped = weather.width() - 1 - numeric.len();
    if dropped > 0 {
        debug!("Daily resampling drops {} non-numeric weather columns", dropped);
    }

    let options = DynamicGroupOptions {
        every: Duration::parse("1d"),
        period: Duration::parse("1d"),
        offset: Duration::parse("0d"),
        ..Default::default()
    };
    let means: Vec<Expr> = numeric
        .iter()
        .map(|c| col(c.as_str()).cast(DataType::Float64).mean())
        .collect();

    weather
        .clone()
        .lazy()
        .with_column(col(date_column).cast(timestamp_dtype()))
        .filter(col(date_column).is_not_null())
        .sort([date_column], SortMultipleOptions::default())
        .group_by_dynamic(col(date_column), Vec::<Expr>::new(), options)
        .agg(means)
        .collect()
        .map_err(PipelineError::polars("daily weather resampling"))
}

/// Year filter, radiation sign fix and daily resampling, in that order.
pub fn normalize_weather(weather: &DataFrame, target_year: i32) -> Result<DataFrame, PipelineError> {
    let in_year = filter_year(weather, DATE_COLUMN, target_year)?;
    let cleaned = fix_radiation_sign(&in_year)?;
    let daily = resample_daily_mean(&cleaned, DATE_COLUMN)?;

    info!(
        "Weather normalized: {} raw rows -> {} rows in {} -> {} daily rows",
        weather.height(),
        in_year.height(),
        target_year,
        daily.height()
    );
    Ok(daily)
}
