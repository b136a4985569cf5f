use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub sources: SourceFiles,
    pub target_year: i32,
    pub risk: RiskWeights,
    pub analysis: AnalysisConfig,
}

/// File names of the raw inputs and of the feature artifact, relative to `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFiles {
    pub monitoring: String,
    pub weather: String,
    pub soil: String,
    pub yield_history: String,
    pub features: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub rendement: f64,
    pub ph: f64,
    pub matiere_organique: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub seasonal_period: usize,
    pub min_ndvi_observations: usize,
    pub moving_average_window: usize,
    pub yield_noise_std: f64,
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sources: SourceFiles::default(),
            target_year: 2024,
            risk: RiskWeights::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            monitoring: String::from("monitoring_cultures.csv"),
            weather: String::from("meteo_detaillee.csv"),
            soil: String::from("sols.csv"),
            yield_history: String::from("historique_rendements.csv"),
            features: String::from("features_daily.csv"),
        }
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            rendement: 0.5,
            ph: 0.3,
            matiere_organique: 0.2,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            seasonal_period: 12,
            min_ndvi_observations: 12,
            moving_average_window: 30,
            yield_noise_std: 0.1,
            seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn monitoring_path(&self) -> PathBuf {
        self.data_dir.join(&self.sources.monitoring)
    }

    pub fn weather_path(&self) -> PathBuf {
        self.data_dir.join(&self.sources.weather)
    }

    pub fn soil_path(&self) -> PathBuf {
        self.data_dir.join(&self.sources.soil)
    }

    pub fn yield_history_path(&self) -> PathBuf {
        self.data_dir.join(&self.sources.yield_history)
    }

    pub fn features_path(&self) -> PathBuf {
        self.data_dir.join(&self.sources.features)
    }

    /// Load a JSON configuration. Missing keys fall back to the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let reader = BufReader::new(file);

        serde_json::from_reader(reader).map_err(|e| ConfigError::JsonParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_paths() {
        let config = PipelineConfig::default();
        assert_eq!(config.target_year, 2024);
        assert_eq!(config.monitoring_path(), PathBuf::from("data/monitoring_cultures.csv"));
        assert_eq!(config.features_path(), PathBuf::from("data/features_daily.csv"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut file = File::create(&path).unwrap();
        write!(file, r#"{{"target_year": 2023, "risk": {{"ph": 0.4}}}}"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.target_year, 2023);
        assert_eq!(config.risk.ph, 0.4);
        assert_eq!(config.risk.rendement, 0.5);
        assert_eq!(config.analysis.seasonal_period, 12);
        assert_eq!(config.sources.soil, "sols.csv");
    }

    #[test]
    fn test_missing_config_file() {
        let result = PipelineConfig::from_file(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }
}
