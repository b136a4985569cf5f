use serde::Serialize;

/// Descriptive statistics of a series. `std` uses the n-1 denominator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl SummaryStats {
    /// `None` for an empty series. A single value has a NaN std.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            mean: mean(values),
            std: sample_std(values),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss = values.iter().map(|&x| (x - m).powi(2)).sum::<f64>();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Ordinary least squares fit of `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Fit on paired samples. When every `x` is identical the slope is zero
    /// and the intercept is the mean of `y`.
    pub fn fit(x: &[f64], y: &[f64]) -> Option<Self> {
        if x.len() != y.len() || x.is_empty() {
            return None;
        }
        let mx = mean(x);
        let my = mean(y);
        let sxx: f64 = x.iter().map(|&v| (v - mx).powi(2)).sum();
        let sxy: f64 = x.iter().zip(y).map(|(&a, &b)| (a - mx) * (b - my)).sum();

        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        Some(Self {
            slope,
            intercept: my - slope * mx,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fill interior gaps by linear interpolation over positions and carry the
/// last value over trailing gaps. Leading gaps stay empty.
pub fn interpolate_linear(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    let mut last_known: Option<usize> = None;

    for i in 0..values.len() {
        let Some(current) = values[i] else { continue };
        if let Some(prev) = last_known {
            let start = values[prev].unwrap_or(current);
            let span = (i - prev) as f64;
            for (step, slot) in out.iter_mut().enumerate().take(i).skip(prev + 1) {
                let t = (step - prev) as f64 / span;
                *slot = Some(start + (current - start) * t);
            }
        }
        last_known = Some(i);
    }

    if let Some(last) = last_known {
        let fill = values[last];
        for slot in out.iter_mut().skip(last + 1) {
            *slot = fill;
        }
    }
    out
}

/// Trailing mean over `window` observations; the first `window - 1`
/// positions have no value and are omitted, so the result is aligned with
/// `values[window - 1..]`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}
