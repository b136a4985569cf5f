//! Classical additive seasonal decomposition (moving-average trend).

use crate::errors::PipelineError;

/// Components aligned with the input series. Trend and residual are undefined
/// for the first and last `period / 2` observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub trend: Vec<Option<f64>>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<Option<f64>>,
}

/// Centred moving-average weights. An even period uses a 2xP filter with
/// half weights on both ends.
fn trend_filter(period: usize) -> Vec<f64> {
    let p = period as f64;
    if period % 2 == 0 {
        let mut weights = vec![1.0 / p; period + 1];
        weights[0] = 0.5 / p;
        weights[period] = 0.5 / p;
        weights
    } else {
        vec![1.0 / p; period]
    }
}

/// Split `values` into trend + seasonal + residual with a fixed `period`.
/// At least two full periods are required.
pub fn seasonal_decompose_additive(values: &[f64], period: usize) -> Result<Decomposition, PipelineError> {
    if period < 2 {
        return Err(PipelineError::Computation(format!(
            "seasonal period must be at least 2, got {period}"
        )));
    }
    let n = values.len();
    if n < 2 * period {
        return Err(PipelineError::InsufficientData {
            what: "seasonal decomposition".to_string(),
            required: 2 * period,
            found: n,
        });
    }

    let filter = trend_filter(period);
    let half = filter.len() / 2;

    let mut trend = vec![None; n];
    for (i, slot) in trend.iter_mut().enumerate().take(n - half).skip(half) {
        let window = &values[i - half..i - half + filter.len()];
        *slot = Some(window.iter().zip(&filter).map(|(v, w)| v * w).sum());
    }

    let detrended: Vec<Option<f64>> = values
        .iter()
        .zip(&trend)
        .map(|(v, t)| t.map(|t| v - t))
        .collect();

    let mut phase_means = Vec::with_capacity(period);
    for phase in 0..period {
        let defined: Vec<f64> = detrended.iter().skip(phase).step_by(period).flatten().copied().collect();
        if defined.is_empty() {
            return Err(PipelineError::Computation(format!(
                "no detrended values for seasonal phase {phase}"
            )));
        }
        phase_means.push(defined.iter().sum::<f64>() / defined.len() as f64);
    }
    let centre = phase_means.iter().sum::<f64>() / period as f64;
    for m in &mut phase_means {
        *m -= centre;
    }

    let seasonal: Vec<f64> = (0..n).map(|i| phase_means[i % period]).collect();
    let residual = detrended
        .iter()
        .zip(&seasonal)
        .map(|(d, s)| d.map(|d| d - s))
        .collect();

    Ok(Decomposition {
        trend,
        seasonal,
        residual,
    })
}
