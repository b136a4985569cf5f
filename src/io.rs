//! CSV in and out of polars frames, plus typed views of single columns.

use chrono::NaiveDateTime;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{ParseError, PipelineError};
use crate::utils::{from_micros, parse_date, NULL_MARKERS};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Dtype every non-date timestamp column is normalised to.
pub fn timestamp_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Microseconds, None)
}

/// Read a CSV file with a header row. Dates are inferred by polars; the
/// columns in `date_columns` must exist and end up temporal, cells polars
/// left as text being parsed one by one.
pub fn read_csv_frame(path: &Path, table: &str, date_columns: &[&str]) -> Result<DataFrame, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::MissingSource {
            path: path.to_path_buf(),
        });
    }

    let null_values = NullValues::AllColumns(NULL_MARKERS.iter().map(|m| (*m).into()).collect());
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .map_parse_options(|opts| {
            opts.with_try_parse_dates(true)
                .with_null_values(Some(null_values.clone()))
        })
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(PipelineError::polars(format!("reading {}", path.display())))?;

    for column in date_columns {
        df = ensure_temporal(df, path, table, column)?;
    }

    debug!("Read {:?} (rows, columns) from {}", df.shape(), path.display());
    Ok(df)
}

fn ensure_temporal(mut df: DataFrame, path: &Path, table: &str, column: &str) -> Result<DataFrame, PipelineError> {
    let series = column_series(&df, table, column)?;
    if matches!(series.dtype(), DataType::Date | DataType::Datetime(_, _)) {
        return Ok(df);
    }

    let context = || format!("parsing {column} of {}", path.display());
    let text = series
        .cast(&DataType::String)
        .map_err(PipelineError::polars(context()))?;
    let mut micros = Vec::with_capacity(text.len());
    for (row, cell) in text.str().map_err(PipelineError::polars(context()))?.into_iter().enumerate() {
        let Some(raw) = cell else {
            micros.push(None);
            continue;
        };
        let dt = parse_date(raw).ok_or_else(|| {
            PipelineError::Parse(
                ParseError::TimestampParseError {
                    row: row + 1,
                    column: column.to_string(),
                    value: raw.to_string(),
                },
                path.to_path_buf(),
            )
        })?;
        micros.push(Some(dt.and_utc().timestamp_micros()));
    }

    let parsed = Series::new(column.into(), micros)
        .cast(&timestamp_dtype())
        .map_err(PipelineError::polars(context()))?;
    df.with_column(parsed).map_err(PipelineError::polars(context()))?;
    Ok(df)
}

/// Write a frame as CSV, replacing any previous file at `path` in one rename.
/// Dates are written as `%Y-%m-%d`, timestamps as `%Y-%m-%d %H:%M:%S`.
pub fn write_csv_frame(df: &mut DataFrame, path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    let tmp_path = temp_path_for(path);
    let file = File::create(&tmp_path).map_err(|e| PipelineError::Io {
        path: tmp_path.clone(),
        source: e,
    })?;
    CsvWriter::new(file)
        .include_header(true)
        .with_date_format(Some(DATE_FORMAT.into()))
        .with_datetime_format(Some(DATETIME_FORMAT.into()))
        .finish(df)
        .map_err(PipelineError::polars(format!("writing {}", tmp_path.display())))?;

    fs::rename(&tmp_path, path).map_err(|e| PipelineError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn has_column(df: &DataFrame, column: &str) -> bool {
    df.get_column_index(column).is_some()
}

pub fn require_columns(df: &DataFrame, table: &str, columns: &[&str]) -> Result<(), PipelineError> {
    match columns.iter().find(|c| !has_column(df, c)) {
        Some(missing) => Err(PipelineError::schema(table, missing)),
        None => Ok(()),
    }
}

pub fn column_series<'a>(df: &'a DataFrame, table: &str, column: &str) -> Result<&'a Series, PipelineError> {
    df.column(column)
        .map(Column::as_materialized_series)
        .map_err(|_| PipelineError::schema(table, column))
}

pub fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Column values as `f64`, nulls kept. Text that does not parse becomes null.
pub fn f64_values(df: &DataFrame, table: &str, column: &str) -> Result<Vec<Option<f64>>, PipelineError> {
    let context = || format!("reading {column} of {table} as f64");
    let cast = column_series(df, table, column)?
        .cast(&DataType::Float64)
        .map_err(PipelineError::polars(context()))?;
    Ok(cast.f64().map_err(PipelineError::polars(context()))?.into_iter().collect())
}

pub fn i64_values(df: &DataFrame, table: &str, column: &str) -> Result<Vec<Option<i64>>, PipelineError> {
    let context = || format!("reading {column} of {table} as i64");
    let cast = column_series(df, table, column)?
        .cast(&DataType::Int64)
        .map_err(PipelineError::polars(context()))?;
    Ok(cast.i64().map_err(PipelineError::polars(context()))?.into_iter().collect())
}

pub fn str_values(df: &DataFrame, table: &str, column: &str) -> Result<Vec<Option<String>>, PipelineError> {
    let context = || format!("reading {column} of {table} as text");
    let cast = column_series(df, table, column)?
        .cast(&DataType::String)
        .map_err(PipelineError::polars(context()))?;
    Ok(cast
        .str()
        .map_err(PipelineError::polars(context()))?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Values of a `Date` or `Datetime` column as naive timestamps.
pub fn timestamp_values(
    df: &DataFrame,
    table: &str,
    column: &str,
) -> Result<Vec<Option<NaiveDateTime>>, PipelineError> {
    let context = || format!("reading {column} of {table} as timestamps");
    let micros = column_series(df, table, column)?
        .cast(&timestamp_dtype())
        .and_then(|s| s.cast(&DataType::Int64))
        .map_err(PipelineError::polars(context()))?;
    Ok(micros
        .i64()
        .map_err(PipelineError::polars(context()))?
        .into_iter()
        .map(|v| v.and_then(from_micros))
        .collect())
}

/// Share of non-null cells in a series.
pub fn coverage(series: &Series) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    (series.len() - series.null_count()) as f64 / series.len() as f64
}
