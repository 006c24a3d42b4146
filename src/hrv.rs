//! Heart rate variability
//!
//! SDNN and RMSSD over a sequence of inter-beat intervals (ms). Both return
//! NaN for fewer than two intervals; [`HrvMetrics`] turns that into absence.

/// Sample standard deviation of the intervals (n - 1 denominator)
pub fn sdnn(ibi: &[f64]) -> f64 {
    if ibi.len() < 2 {
        return f64::NAN;
    }
    let n = ibi.len() as f64;
    let mean = ibi.iter().sum::<f64>() / n;
    let var_sum: f64 = ibi.iter().map(|v| (v - mean).powi(2)).sum();
    (var_sum / (n - 1.0)).sqrt()
}

/// Root mean square of successive interval differences
pub fn rmssd(ibi: &[f64]) -> f64 {
    if ibi.len() < 2 {
        return f64::NAN;
    }
    let sum_sq: f64 = ibi.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    (sum_sq / (ibi.len() - 1) as f64).sqrt()
}

/// HRV metrics with NaN mapped to `None`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HrvMetrics {
    pub sdnn: Option<f64>,
    pub rmssd: Option<f64>,
}

impl HrvMetrics {
    /// Compute both metrics from an optional interval list
    pub fn from_ibi(ibi: Option<&[f64]>) -> Self {
        match ibi {
            Some(ibi) => Self {
                sdnn: finite(sdnn(ibi)),
                rmssd: finite(rmssd(ibi)),
            },
            None => Self::default(),
        }
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
