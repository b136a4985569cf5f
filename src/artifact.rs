//! The feature table on disk: the hand-off between preparation and the
//! analysis / presentation consumers.

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::PipelineError;
use crate::io::{read_csv_frame, write_csv_frame};
use crate::normalize::DATE_COLUMN;

pub const FORMAT_VERSION: u32 = 1;

/// Sidecar written next to the CSV. Contains nothing run-specific beyond the
/// table shape, so identical inputs give identical files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub format_version: u32,
    pub target_year: i32,
    pub rows: usize,
    pub columns: Vec<String>,
}

pub fn meta_path(artifact_path: &Path) -> PathBuf {
    artifact_path.with_extension("meta.json")
}

/// Persist the feature table and its metadata, overwriting any earlier run.
pub fn write_feature_artifact(
    features: &mut DataFrame,
    path: &Path,
    target_year: i32,
) -> Result<ArtifactMeta, PipelineError> {
    write_csv_frame(features, path)?;

    let meta = ArtifactMeta {
        format_version: FORMAT_VERSION,
        target_year,
        rows: features.height(),
        columns: features.get_column_names().iter().map(|c| c.to_string()).collect(),
    };
    let meta_file = meta_path(path);
    let json = serde_json::to_string_pretty(&meta).map_err(|e| PipelineError::Json {
        path: meta_file.clone(),
        source: e,
    })?;
    fs::write(&meta_file, json).map_err(|e| PipelineError::Io {
        path: meta_file.clone(),
        source: e,
    })?;

    info!("Feature table written to {} ({} rows)", path.display(), meta.rows);
    Ok(meta)
}

pub fn read_artifact_meta(path: &Path) -> Result<Option<ArtifactMeta>, PipelineError> {
    let meta_file = meta_path(path);
    if !meta_file.exists() {
        return Ok(None);
    }
    let file = File::open(&meta_file).map_err(|e| PipelineError::Io {
        path: meta_file.clone(),
        source: e,
    })?;
    serde_json::from_reader(BufReader::new(file))
        .map(Some)
        .map_err(|e| PipelineError::Json {
            path: meta_file,
            source: e,
        })
}

/// Load the latest feature table. The sidecar is optional, but when present
/// its format version must match.
pub fn read_feature_artifact(path: &Path) -> Result<DataFrame, PipelineError> {
    match read_artifact_meta(path)? {
        Some(meta) if meta.format_version != FORMAT_VERSION => {
            return Err(PipelineError::ArtifactVersion {
                path: path.to_path_buf(),
                expected: FORMAT_VERSION,
                found: meta.format_version,
            });
        }
        Some(_) => {}
        None => warn!("No metadata next to {}, reading it as a bare CSV", path.display()),
    }
    read_csv_frame(path, "features", &[DATE_COLUMN])
}
