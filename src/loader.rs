use chrono::Datelike;
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::errors::{ParseError, PipelineError};
use crate::io::{column_series, coverage, read_csv_frame};
use crate::utils::parse_date;

pub const YEAR_COLUMN: &str = "annee";

/// The four raw inputs of a run. A frame stays `None` when its file could not
/// be read; later stages report what they are missing.
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub monitoring: Option<DataFrame>,
    pub weather: Option<DataFrame>,
    pub soil: Option<DataFrame>,
    pub yield_history: Option<DataFrame>,
}

impl SourceTables {
    pub fn is_complete(&self) -> bool {
        self.monitoring.is_some()
            && self.weather.is_some()
            && self.soil.is_some()
            && self.yield_history.is_some()
    }

    pub fn require_monitoring(&self) -> Result<&DataFrame, PipelineError> {
        self.monitoring.as_ref().ok_or_else(|| PipelineError::empty("monitoring table"))
    }

    pub fn require_weather(&self) -> Result<&DataFrame, PipelineError> {
        self.weather.as_ref().ok_or_else(|| PipelineError::empty("weather table"))
    }

    pub fn require_soil(&self) -> Result<&DataFrame, PipelineError> {
        self.soil.as_ref().ok_or_else(|| PipelineError::empty("soil table"))
    }

    pub fn require_yield_history(&self) -> Result<&DataFrame, PipelineError> {
        self.yield_history
            .as_ref()
            .ok_or_else(|| PipelineError::empty("yield history table"))
    }
}

pub fn load_monitoring(path: &Path) -> Result<DataFrame, PipelineError> {
    read_csv_frame(path, "monitoring", &["date"])
}

pub fn load_weather(path: &Path) -> Result<DataFrame, PipelineError> {
    read_csv_frame(path, "weather", &["date"])
}

pub fn load_soil(path: &Path) -> Result<DataFrame, PipelineError> {
    read_csv_frame(path, "soil", &[])
}

/// The yield history with `annee` as an `Int32` calendar year, whether the
/// file holds bare years or full dates.
pub fn load_yield_history(path: &Path) -> Result<DataFrame, PipelineError> {
    let df = read_csv_frame(path, "yield_history", &[])?;
    let years = column_series(&df, "yield_history", YEAR_COLUMN)?;
    let dtype = years.dtype().clone();
    let context = || format!("normalising {YEAR_COLUMN} of {}", path.display());

    let normalised = match dtype {
        DataType::Date | DataType::Datetime(_, _) => df
            .lazy()
            .with_column(col(YEAR_COLUMN).dt().year().alias(YEAR_COLUMN))
            .collect()
            .map_err(PipelineError::polars(context()))?,
        DataType::String => {
            let mut parsed = Vec::with_capacity(years.len());
            for (row, cell) in years.str().map_err(PipelineError::polars(context()))?.into_iter().enumerate() {
                let year = match cell {
                    None => None,
                    Some(raw) => Some(parse_date(raw).map(|d| d.year()).ok_or_else(|| {
                        PipelineError::Parse(
                            ParseError::TimestampParseError {
                                row: row + 1,
                                column: YEAR_COLUMN.to_string(),
                                value: raw.to_string(),
                            },
                            path.to_path_buf(),
                        )
                    })?),
                };
                parsed.push(year);
            }
            let mut df = df;
            df.with_column(Series::new(YEAR_COLUMN.into(), parsed))
                .map_err(PipelineError::polars(context()))?;
            df
        }
        _ => df
            .lazy()
            .with_column(col(YEAR_COLUMN).cast(DataType::Int32))
            .collect()
            .map_err(PipelineError::polars(context()))?,
    };
    Ok(normalised)
}

/// Load every source once. Failures are logged per source and never abort
/// the others.
pub fn load_sources(config: &PipelineConfig) -> SourceTables {
    SourceTables {
        monitoring: load_or_report("monitoring", load_monitoring(&config.monitoring_path())),
        weather: load_or_report("weather", load_weather(&config.weather_path())),
        soil: load_or_report("soil", load_soil(&config.soil_path())),
        yield_history: load_or_report(
            "yield history",
            load_yield_history(&config.yield_history_path()),
        ),
    }
}

fn load_or_report(source: &str, result: Result<DataFrame, PipelineError>) -> Option<DataFrame> {
    match result {
        Ok(df) => {
            info!("Loaded {} source: {} rows", source, df.height());
            report_coverage(source, &df);
            Some(df)
        }
        Err(PipelineError::MissingSource { path }) => {
            warn!("File not found for {} source: {}", source, path.display());
            None
        }
        Err(e) => {
            warn!("Error loading {} source: {}", source, e);
            None
        }
    }
}

/// Log the non-null share of every column that has gaps.
fn report_coverage(source: &str, df: &DataFrame) {
    for column in df.get_columns() {
        let share = coverage(column.as_materialized_series());
        if share < 1.0 {
            info!("{} source: column {} is {:.1}% filled", source, column.name(), share * 100.0);
        } else {
            debug!("{} source: column {} is complete", source, column.name());
        }
    }
}
