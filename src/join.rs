//! Alignment of the daily weather onto monitoring observations and
//! enrichment with static soil attributes and the target-year yield.

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::io::{has_column, require_columns, timestamp_dtype};
use crate::loader::YEAR_COLUMN;
use crate::normalize::DATE_COLUMN;
use crate::risk;

pub const PARCEL_COLUMN: &str = "parcelle_id";
pub const YIELD_COLUMN: &str = "rendement";

const RIGHT_SUFFIX: &str = "_y";
const ASOF_KEY: &str = "__asof_key";
const MATCH_KEY: &str = "__asof_match";
const EARLIER_SUFFIX: &str = "__earlier";

fn asof_args(strategy: AsofStrategy) -> JoinArgs {
    let options = AsOfOptions {
        strategy,
        allow_eq: true,
        check_sortedness: true,
        ..Default::default()
    };
    JoinArgs {
        how: JoinType::AsOf(options.into()),
        suffix: Some(RIGHT_SUFFIX.into()),
        ..Default::default()
    }
}

fn micros(name: &str) -> Expr {
    col(name).dt().timestamp(TimeUnit::Microseconds)
}

/// Nearest-in-time merge: every left row receives the columns of the right
/// row whose `on` timestamp is closest, in either direction. At equal
/// distance the earlier right row wins. Rows are returned in `on` order;
/// left rows without a timestamp are dropped.
pub fn merge_asof_nearest(left: &DataFrame, right: &DataFrame, on: &str) -> Result<DataFrame, PipelineError> {
    require_columns(left, "monitoring", &[on])?;
    require_columns(right, "weather", &[on])?;

    let left_columns: Vec<String> = left.get_column_names().iter().map(|c| c.to_string()).collect();
    let right_columns: Vec<String> = right
        .get_column_names()
        .iter()
        .filter(|c| c.as_str() != on)
        .map(|c| c.to_string())
        .collect();
    // Name of each right column in the joined frame.
    let joined_columns: Vec<String> = right_columns
        .iter()
        .map(|c| {
            if has_column(left, c) {
                format!("{c}{RIGHT_SUFFIX}")
            } else {
                c.clone()
            }
        })
        .collect();

    let left_keyed = left
        .clone()
        .lazy()
        .filter(col(on).is_not_null())
        .with_column(col(on).cast(timestamp_dtype()).alias(ASOF_KEY))
        .sort([ASOF_KEY], SortMultipleOptions::default().with_maintain_order(true));

    let mut right_select = vec![col(on).cast(timestamp_dtype()).alias(ASOF_KEY)];
    right_select.extend(right_columns.iter().map(|c| col(c.as_str())));
    right_select.push(col(on).cast(timestamp_dtype()).alias(MATCH_KEY));
    let right_keyed = right
        .clone()
        .lazy()
        .filter(col(on).is_not_null())
        .select(right_select)
        .sort([ASOF_KEY], SortMultipleOptions::default().with_maintain_order(true));

    let context = "nearest as-of merge";
    let nearest = left_keyed
        .clone()
        .join(right_keyed.clone(), [col(ASOF_KEY)], [col(ASOF_KEY)], asof_args(AsofStrategy::Nearest))
        .collect()
        .map_err(PipelineError::polars(context))?;

    // The backward match is the earlier candidate of a tie.
    let earlier_select: Vec<Expr> = joined_columns
        .iter()
        .map(String::as_str)
        .chain([MATCH_KEY])
        .map(|c| col(c).alias(format!("{c}{EARLIER_SUFFIX}")))
        .collect();
    let earlier = left_keyed
        .join(right_keyed, [col(ASOF_KEY)], [col(ASOF_KEY)], asof_args(AsofStrategy::Backward))
        .select(earlier_select)
        .collect()
        .map_err(PipelineError::polars(context))?;

    let combined = nearest
        .hstack(earlier.get_columns())
        .map_err(PipelineError::polars(context))?;

    let earlier_gap = micros(ASOF_KEY) - micros(&format!("{MATCH_KEY}{EARLIER_SUFFIX}"));
    let nearest_gap = (micros(MATCH_KEY) - micros(ASOF_KEY)).abs();
    let take_earlier = earlier_gap.lt_eq(nearest_gap);

    let picks: Vec<Expr> = joined_columns
        .iter()
        .map(|c| {
            when(take_earlier.clone())
                .then(col(format!("{c}{EARLIER_SUFFIX}")))
                .otherwise(col(c.as_str()))
                .alias(c.as_str())
        })
        .collect();
    let output: Vec<Expr> = left_columns
        .iter()
        .chain(&joined_columns)
        .map(|c| col(c.as_str()))
        .collect();

    let merged = combined
        .lazy()
        .with_columns(picks)
        .select(output)
        .collect()
        .map_err(PipelineError::polars(context))?;

    let dropped = left.height() - merged.height();
    if dropped > 0 {
        debug!("{} monitoring rows without a timestamp were not merged", dropped);
    }
    Ok(merged)
}

/// Left join on equality of `on`. Left rows without a match keep null right
/// columns, left rows with several matches are repeated. Right columns whose
/// name is already taken get a `_y` suffix.
pub fn left_join(left: &DataFrame, right: &DataFrame, on: &str) -> Result<DataFrame, PipelineError> {
    require_columns(left, "left", &[on])?;
    require_columns(right, "right", &[on])?;

    left.clone()
        .lazy()
        .join(
            right.clone().lazy(),
            [col(on)],
            [col(on)],
            JoinArgs {
                how: JoinType::Left,
                suffix: Some(RIGHT_SUFFIX.into()),
                ..Default::default()
            },
        )
        .collect()
        .map_err(PipelineError::polars(format!("left join on {on}")))
}

/// Keep the monitoring coordinates by dropping the soil-side duplicates.
pub fn resolve_coordinates(mut features: DataFrame) -> Result<DataFrame, PipelineError> {
    for duplicate in ["latitude_y", "longitude_y"] {
        if has_column(&features, duplicate) {
            features = features
                .drop(duplicate)
                .map_err(PipelineError::polars("coordinate resolution"))?;
        }
    }
    Ok(features)
}

/// Attach the target-year yield of each parcel to every one of its rows.
pub fn enrich_with_yield(
    data: &DataFrame,
    yield_history: &DataFrame,
    target_year: i32,
) -> Result<DataFrame, PipelineError> {
    require_columns(yield_history, "yield_history", &[PARCEL_COLUMN, YEAR_COLUMN, YIELD_COLUMN])?;
    let of_year = yield_history
        .clone()
        .lazy()
        .filter(col(YEAR_COLUMN).eq(lit(target_year)))
        .select([col(PARCEL_COLUMN), col(YEAR_COLUMN), col(YIELD_COLUMN)])
        .collect()
        .map_err(PipelineError::polars(format!("selecting {target_year} yields")))?;

    if of_year.height() == 0 {
        warn!("No yield records for {}; rendement will be empty", target_year);
    }
    left_join(data, &of_year, PARCEL_COLUMN)
}

/// Build the scored feature table from the raw monitoring table, the
/// normalized daily weather, the soil table and the yield history. Rows come
/// out ordered by date, then parcel.
pub fn build_feature_table(
    monitoring: &DataFrame,
    weather_daily: &DataFrame,
    soil: &DataFrame,
    yield_history: &DataFrame,
    config: &PipelineConfig,
) -> Result<DataFrame, PipelineError> {
    let merged = merge_asof_nearest(monitoring, weather_daily, DATE_COLUMN)?;
    let with_soil = left_join(&merged, soil, PARCEL_COLUMN)?;
    let with_yield = enrich_with_yield(&with_soil, yield_history, config.target_year)?;
    let resolved = resolve_coordinates(with_yield)?
        .sort(
            [DATE_COLUMN, PARCEL_COLUMN],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .map_err(PipelineError::polars("feature ordering"))?;

    info!(
        "Merged {} monitoring rows into {} feature rows ({} columns)",
        monitoring.height(),
        resolved.height(),
        resolved.width()
    );

    Ok(risk::score_or_passthrough(resolved, &config.risk))
}
