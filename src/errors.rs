use polars::prelude::PolarsError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse JSON configuration in {path}: {source}")]
    JsonParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Configuration file not found at {path}")]
    NotFound { path: PathBuf },
}

/// Failures of a single pipeline stage. Every stage returns one of these
/// instead of printing and carrying on; the orchestrator decides what to log.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source file not found: {path}")]
    MissingSource { path: PathBuf },
    #[error("Required column '{column}' is missing from table '{table}'")]
    Schema { table: String, column: String },
    #[error("Not enough data for {what}: required {required}, found {found}")]
    InsufficientData {
        what: String,
        required: usize,
        found: usize,
    },
    #[error("No data found for {what}")]
    EmptyInput { what: String },
    #[error("Parsing failed for {1}: {0}")]
    Parse(ParseError, PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Polars error during {context}: {source}")]
    Polars {
        context: String,
        #[source]
        source: PolarsError,
    },
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported artifact format version {found} in {path} (expected {expected})")]
    ArtifactVersion {
        path: PathBuf,
        expected: u32,
        found: u32,
    },
    #[error("Computation failed: {0}")]
    Computation(String),
}

impl PipelineError {
    pub fn schema(table: &str, column: &str) -> Self {
        PipelineError::Schema {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn empty(what: impl Into<String>) -> Self {
        PipelineError::EmptyInput { what: what.into() }
    }

    /// Adapter for `map_err` on polars results.
    pub fn polars(context: impl Into<String>) -> impl FnOnce(PolarsError) -> Self {
        let context = context.into();
        move |source| PipelineError::Polars { context, source }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Timestamp parsing error at row {row} in column '{column}' for value '{value}'")]
    TimestampParseError {
        row: usize,
        column: String,
        value: String,
    },
}
