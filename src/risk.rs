use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::config::RiskWeights;
use crate::errors::PipelineError;
use crate::io::{f64_values, require_columns};

pub const REQUIRED_COLUMNS: [&str; 5] = ["parcelle_id", "culture", "rendement", "ph", "matiere_organique"];
pub const RISK_INDEX_COLUMN: &str = "risk_index";
pub const RISK_CATEGORY_COLUMN: &str = "risk_category";

/// Ordinal risk buckets over the composite index. Intervals are half-open,
/// so each boundary belongs to the bucket above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    #[serde(rename = "Très Bas")]
    TresBas,
    #[serde(rename = "Bas")]
    Bas,
    #[serde(rename = "Modéré")]
    Modere,
    #[serde(rename = "Élevé")]
    Eleve,
}

impl RiskCategory {
    pub fn from_index(risk_index: f64) -> Self {
        if risk_index < -1.0 {
            RiskCategory::TresBas
        } else if risk_index < 0.0 {
            RiskCategory::Bas
        } else if risk_index < 1.0 {
            RiskCategory::Modere
        } else {
            RiskCategory::Eleve
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskCategory::TresBas => "Très Bas",
            RiskCategory::Bas => "Bas",
            RiskCategory::Modere => "Modéré",
            RiskCategory::Eleve => "Élevé",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Z-scores with the population standard deviation. A constant column maps
/// to zeros.
pub fn standardize(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    let scale = if std > 0.0 { std } else { 1.0 };
    values.iter().map(|&x| (x - mean) / scale).collect()
}

/// Drop rows missing any required value, then add `risk_index` and
/// `risk_category`. The scaler is fitted on this call's rows only.
pub fn calculate_risk_metrics(data: &DataFrame, weights: &RiskWeights) -> Result<DataFrame, PipelineError> {
    require_columns(data, "features", &REQUIRED_COLUMNS)?;

    let complete_rows = REQUIRED_COLUMNS
        .iter()
        .map(|c| col(*c).is_not_null())
        .reduce(|acc, e| acc.and(e))
        .unwrap_or_else(|| lit(true));
    let mut complete = data
        .clone()
        .lazy()
        .filter(complete_rows)
        .collect()
        .map_err(PipelineError::polars("risk input filtering"))?;
    if complete.height() == 0 {
        return Err(PipelineError::InsufficientData {
            what: "risk scoring".to_string(),
            required: 1,
            found: 0,
        });
    }

    let numeric = |column: &str| -> Result<Vec<f64>, PipelineError> {
        f64_values(&complete, "features", column)?
            .into_iter()
            .map(|v| {
                v.ok_or_else(|| {
                    PipelineError::Computation(format!("non-numeric value in column '{column}'"))
                })
            })
            .collect()
    };

    let z_yield = standardize(&numeric("rendement")?);
    let z_ph = standardize(&numeric("ph")?);
    let z_om = standardize(&numeric("matiere_organique")?);

    let risk_index: Vec<f64> = z_yield
        .iter()
        .zip(&z_ph)
        .zip(&z_om)
        .map(|((y, p), o)| weights.rendement * y + weights.ph * p + weights.matiere_organique * o)
        .collect();

    if risk_index.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::Computation("non-finite risk index".to_string()));
    }

    let categories: Vec<&str> = risk_index
        .iter()
        .map(|&v| RiskCategory::from_index(v).label())
        .collect();

    complete
        .with_column(Series::new(RISK_INDEX_COLUMN.into(), risk_index))
        .and_then(|df| df.with_column(Series::new(RISK_CATEGORY_COLUMN.into(), categories)))
        .map_err(PipelineError::polars("risk columns"))?;

    info!(
        "Risk metrics added to {} rows ({} rows dropped for missing values)",
        complete.height(),
        data.height() - complete.height()
    );
    Ok(complete)
}

/// Best-effort scoring: on any failure the input comes back unmodified.
pub fn score_or_passthrough(data: DataFrame, weights: &RiskWeights) -> DataFrame {
    match calculate_risk_metrics(&data, weights) {
        Ok(scored) => scored,
        Err(e) => {
            warn!("Error calculating risk metrics: {}", e);
            data
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_category_boundaries_are_half_open() {
        assert_eq!(RiskCategory::from_index(-1.5), RiskCategory::TresBas);
        assert_eq!(RiskCategory::from_index(-1.0), RiskCategory::Bas);
        assert_eq!(RiskCategory::from_index(-0.0001), RiskCategory::Bas);
        assert_eq!(RiskCategory::from_index(0.0), RiskCategory::Modere);
        assert_eq!(RiskCategory::from_index(0.9999), RiskCategory::Modere);
        assert_eq!(RiskCategory::from_index(1.0), RiskCategory::Eleve);
        assert_eq!(RiskCategory::from_index(42.0), RiskCategory::Eleve);
    }

    #[test]
    fn test_category_is_monotonic() {
        let mut previous = RiskCategory::TresBas;
        for step in -300..=300 {
            let category = RiskCategory::from_index(step as f64 / 100.0);
            assert!(category >= previous);
            previous = category;
        }
    }

    #[test]
    fn test_standardize() {
        let z = standardize(&[1.0, 2.0, 3.0]);
        assert_abs_diff_eq!(z.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z[2], 1.224_744_871, epsilon = 1e-9);

        assert_eq!(standardize(&[5.0, 5.0]), vec![0.0, 0.0]);
        assert!(standardize(&[]).is_empty());
    }

    #[test]
    fn test_labels_serialize_in_french() {
        let json = serde_json::to_string(&RiskCategory::Modere).unwrap();
        assert_eq!(json, "\"Modéré\"");
        assert_eq!(RiskCategory::TresBas.to_string(), "Très Bas");
    }
}
