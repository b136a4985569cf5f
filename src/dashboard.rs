//! Datasets consumed by the dashboard and map front-ends. Rendering happens
//! elsewhere; this module only shapes the feature table and the yield history
//! into serialisable values.

use polars::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::errors::PipelineError;
use crate::io::{f64_values, has_column, i64_values, require_columns, str_values};
use crate::join::{PARCEL_COLUMN, YIELD_COLUMN};
use crate::loader::YEAR_COLUMN;
use crate::risk::RISK_INDEX_COLUMN;
use crate::temporal::{ndvi_series, parcel_rows, DatedValue, NDVI_COLUMN};

pub const TEMPERATURE_COLUMN: &str = "temperature";
pub const STRESS_COLUMN: &str = "stress_hydrique";
pub const LATITUDE_COLUMN: &str = "latitude";
pub const LONGITUDE_COLUMN: &str = "longitude";

const TEMPERATURE_BIN: f64 = 5.0;
const STRESS_BIN: f64 = 0.1;

/// Sorted, de-duplicated parcel identifiers of the yield history.
pub fn parcel_options(yield_history: &DataFrame) -> Result<Vec<String>, PipelineError> {
    let ids: BTreeSet<String> = str_values(yield_history, "yield_history", PARCEL_COLUMN)?
        .into_iter()
        .flatten()
        .collect();
    Ok(ids.into_iter().collect())
}

pub fn filter_by_parcel(df: &DataFrame, parcel_id: &str) -> Result<DataFrame, PipelineError> {
    require_columns(df, "features", &[PARCEL_COLUMN])?;
    df.clone()
        .lazy()
        .filter(col(PARCEL_COLUMN).cast(DataType::String).eq(lit(parcel_id)))
        .collect()
        .map_err(PipelineError::polars(format!("filtering parcelle_id {parcel_id}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearlyYield {
    pub annee: i32,
    pub rendement: Option<f64>,
}

/// Time series of the selected parcel: its NDVI observations from the
/// feature table and its full yield history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParcelSeries {
    pub ndvi: Vec<DatedValue>,
    pub yields: Vec<YearlyYield>,
}

pub fn parcel_series(
    features: &DataFrame,
    yield_history: &DataFrame,
    parcel_id: &str,
) -> Result<ParcelSeries, PipelineError> {
    let ndvi = ndvi_series(features, parcel_id)?;

    let history = parcel_rows(yield_history, parcel_id, YEAR_COLUMN)?;
    let years = i64_values(&history, "yield_history", YEAR_COLUMN)?;
    let values = f64_values(&history, "yield_history", YIELD_COLUMN)?;
    let yields = years
        .into_iter()
        .zip(values)
        .filter_map(|(year, rendement)| {
            Some(YearlyYield {
                annee: i32::try_from(year?).ok()?,
                rendement,
            })
        })
        .collect();

    Ok(ParcelSeries { ndvi, yields })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StressCell {
    pub parcelle_id: String,
    pub temp_bin: f64,
    pub stress_bin: f64,
    pub count: usize,
    pub normalized_count: f64,
}

/// Joint distribution of temperature and water stress per parcel, counted
/// on 5 degree by 0.1 bins and scaled by the densest cell.
pub fn stress_matrix(features: &DataFrame) -> Result<Vec<StressCell>, PipelineError> {
    require_columns(features, "features", &[PARCEL_COLUMN, TEMPERATURE_COLUMN, STRESS_COLUMN])?;
    let parcels = str_values(features, "features", PARCEL_COLUMN)?;
    let temperatures = f64_values(features, "features", TEMPERATURE_COLUMN)?;
    let stress = f64_values(features, "features", STRESS_COLUMN)?;

    let mut counts: BTreeMap<(String, i64, i64), usize> = BTreeMap::new();
    for ((parcel, t), s) in parcels.into_iter().zip(temperatures).zip(stress) {
        let (Some(parcel), Some(t), Some(s)) = (parcel, t, s) else {
            continue;
        };
        let temp_bin = (t / TEMPERATURE_BIN).floor() as i64;
        let stress_bin = (s / STRESS_BIN).floor() as i64;
        *counts.entry((parcel, temp_bin, stress_bin)).or_insert(0) += 1;
    }

    let max = counts.values().copied().max().unwrap_or(0);
    let cells = counts
        .into_iter()
        .map(|((parcelle_id, t, s), count)| StressCell {
            parcelle_id,
            temp_bin: t as f64 * TEMPERATURE_BIN,
            stress_bin: s as f64 * STRESS_BIN,
            count,
            normalized_count: count as f64 / max as f64,
        })
        .collect::<Vec<_>>();

    debug!("Stress matrix: {} cells", cells.len());
    Ok(cells)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapCenter {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub parcelle_id: String,
    pub rendement: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValuePoint {
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    fn of(points: &[ValuePoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(Self {
            min: points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min),
            max: points.iter().map(|p| p.value).fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayers {
    pub center: MapCenter,
    pub yield_points: Vec<YieldPoint>,
    pub ndvi_points: Vec<ValuePoint>,
    pub ndvi_range: Option<ValueRange>,
    pub risk_points: Vec<ValuePoint>,
    pub risk_max: Option<f64>,
}

/// Point layers for the parcel map. Rows without both coordinates are not
/// placed on any layer.
pub fn map_layers(features: &DataFrame) -> Result<MapLayers, PipelineError> {
    require_columns(features, "features", &[LATITUDE_COLUMN, LONGITUDE_COLUMN, PARCEL_COLUMN])?;
    let optional = |column: &str| -> Result<Vec<Option<f64>>, PipelineError> {
        if has_column(features, column) {
            f64_values(features, "features", column)
        } else {
            Ok(vec![None; features.height()])
        }
    };
    let latitudes = f64_values(features, "features", LATITUDE_COLUMN)?;
    let longitudes = f64_values(features, "features", LONGITUDE_COLUMN)?;
    let parcels = str_values(features, "features", PARCEL_COLUMN)?;
    let yields = optional(YIELD_COLUMN)?;
    let ndvi = optional(NDVI_COLUMN)?;
    let risk = optional(RISK_INDEX_COLUMN)?;
    let has_ndvi = has_column(features, NDVI_COLUMN);
    let has_risk = has_column(features, RISK_INDEX_COLUMN);

    // (latitude, longitude, row index)
    let placed: Vec<(f64, f64, usize)> = latitudes
        .iter()
        .zip(&longitudes)
        .enumerate()
        .filter_map(|(i, (lat, lon))| Some(((*lat)?, (*lon)?, i)))
        .collect();
    if placed.is_empty() {
        return Err(PipelineError::empty("rows with coordinates"));
    }

    let n = placed.len() as f64;
    let center = MapCenter {
        latitude: placed.iter().map(|p| p.0).sum::<f64>() / n,
        longitude: placed.iter().map(|p| p.1).sum::<f64>() / n,
    };

    let yield_points = placed
        .iter()
        .filter_map(|&(latitude, longitude, i)| {
            Some(YieldPoint {
                latitude,
                longitude,
                parcelle_id: parcels[i].clone()?,
                rendement: yields[i],
            })
        })
        .collect();

    let value_points = |present: bool, values: &[Option<f64>]| -> Vec<ValuePoint> {
        if !present {
            return Vec::new();
        }
        placed
            .iter()
            .filter_map(|&(latitude, longitude, i)| {
                Some(ValuePoint {
                    latitude,
                    longitude,
                    value: values[i]?,
                })
            })
            .collect()
    };

    let ndvi_points = value_points(has_ndvi, &ndvi);
    let risk_points = value_points(has_risk, &risk);
    let ndvi_range = ValueRange::of(&ndvi_points);
    let risk_max = ValueRange::of(&risk_points).map(|r| r.max);

    Ok(MapLayers {
        center,
        yield_points,
        ndvi_points,
        ndvi_range,
        risk_points,
        risk_max,
    })
}

/// Everything the dashboard needs for one selected parcel. Each widget is
/// built on its own; one that cannot be built is left empty and logged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardData {
    pub parcel_options: Option<Vec<String>>,
    pub selected_parcel: String,
    pub parcel: Option<ParcelSeries>,
    pub stress_matrix: Option<Vec<StressCell>>,
    pub map: Option<MapLayers>,
}

fn widget<T>(name: &str, result: Result<T, PipelineError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Dashboard {} unavailable: {}", name, e);
            None
        }
    }
}

impl DashboardData {
    pub fn build(features: &DataFrame, yield_history: &DataFrame, selected_parcel: &str) -> Self {
        Self {
            parcel_options: widget("parcel options", parcel_options(yield_history)),
            selected_parcel: selected_parcel.to_string(),
            parcel: widget(
                "parcel series",
                parcel_series(features, yield_history, selected_parcel),
            ),
            stress_matrix: widget("stress matrix", stress_matrix(features)),
            map: widget("map", map_layers(features)),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| PipelineError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, json).map_err(|e| PipelineError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Dashboard data written to {}", path.display());
        Ok(())
    }
}
