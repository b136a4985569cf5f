//! Stage functions over an explicit run context. Preparation ends by writing
//! the feature artifact; the analysis stages read it back on their own.

use polars::prelude::DataFrame;
use rand::Rng;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use crate::artifact::{read_feature_artifact, write_feature_artifact, ArtifactMeta};
use crate::config::PipelineConfig;
use crate::dashboard::DashboardData;
use crate::errors::PipelineError;
use crate::join::build_feature_table;
use crate::loader::{load_sources, SourceTables};
use crate::normalize::normalize_weather;
use crate::temporal::{analyze_yield_patterns, get_temporal_patterns, NdviHistory, TrendSummary, YieldAnalysis};

/// State of one batch run: the configuration and the raw tables, loaded once.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub sources: SourceTables,
}

impl PipelineContext {
    pub fn load(config: PipelineConfig) -> Self {
        let start = Instant::now();
        let sources = load_sources(&config);
        if !sources.is_complete() {
            warn!("Some data sources are missing; dependent stages will be skipped");
        }
        info!("Sources loaded in {:.2?}", start.elapsed());
        Self { config, sources }
    }

    pub fn features_path(&self) -> PathBuf {
        self.config.features_path()
    }

    /// Target-year, sign-corrected daily weather.
    pub fn normalized_weather(&self) -> Result<DataFrame, PipelineError> {
        normalize_weather(self.sources.require_weather()?, self.config.target_year)
    }

    /// Rebuild the feature table from the raw sources and overwrite the
    /// artifact. Nothing is cached between calls.
    pub fn prepare_features(&self) -> Result<(DataFrame, ArtifactMeta), PipelineError> {
        let start = Instant::now();
        let monitoring = self.sources.require_monitoring()?;
        let soil = self.sources.require_soil()?;
        let yield_history = self.sources.require_yield_history()?;

        let weather_daily = self.normalized_weather()?;
        let mut features = build_feature_table(monitoring, &weather_daily, soil, yield_history, &self.config)?;
        let meta = write_feature_artifact(&mut features, &self.features_path(), self.config.target_year)?;

        info!("Feature preparation finished in {:.2?}", start.elapsed());
        Ok((features, meta))
    }

    pub fn load_features(&self) -> Result<DataFrame, PipelineError> {
        read_feature_artifact(&self.features_path())
    }

    pub fn analyze_ndvi(&self, parcel_id: &str) -> Result<(NdviHistory, TrendSummary), PipelineError> {
        get_temporal_patterns(&self.features_path(), parcel_id, &self.config.analysis)
    }

    pub fn analyze_yield<R: Rng>(&self, parcel_id: &str, rng: &mut R) -> Result<YieldAnalysis, PipelineError> {
        analyze_yield_patterns(
            self.sources.require_yield_history()?,
            parcel_id,
            self.config.analysis.yield_noise_std,
            rng,
        )
    }

    pub fn dashboard(&self, parcel_id: &str) -> Result<DashboardData, PipelineError> {
        let features = self.load_features()?;
        Ok(DashboardData::build(
            &features,
            self.sources.require_yield_history()?,
            parcel_id,
        ))
    }
}

/// Outcome of every stage of a run. A failed stage leaves its slot empty.
#[derive(Debug, Default)]
pub struct RunReport {
    pub feature_rows: Option<usize>,
    pub ndvi: Option<(NdviHistory, TrendSummary)>,
    pub yields: Option<YieldAnalysis>,
    pub dashboard: Option<DashboardData>,
}

fn log_stage<T>(stage: &str, result: Result<T, PipelineError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} skipped: {}", stage, e);
            None
        }
    }
}

/// Run every stage for one parcel, logging and carrying on past data errors.
pub fn run<R: Rng>(ctx: &PipelineContext, parcel_id: &str, rng: &mut R) -> RunReport {
    let start = Instant::now();
    let feature_rows = log_stage("Feature preparation", ctx.prepare_features()).map(|(_, meta)| meta.rows);

    let report = RunReport {
        feature_rows,
        ndvi: log_stage("NDVI analysis", ctx.analyze_ndvi(parcel_id)),
        yields: log_stage("Yield analysis", ctx.analyze_yield(parcel_id, rng)),
        dashboard: log_stage("Dashboard data", ctx.dashboard(parcel_id)),
    };

    info!("Pipeline run for {} finished in {:.2?}", parcel_id, start.elapsed());
    report
}
