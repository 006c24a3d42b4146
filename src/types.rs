//! Core types for the pulse-relay pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw ticks, baseline statistics, per-tick stress results, and the
//! representative sample that crosses the device boundary.

use serde::{Deserialize, Serialize};

/// Three-axis acceleration (m/s²)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Acceleration {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm of the vector, gravity included
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// One sensor observation cycle, assembled from the most recent cached values.
///
/// Every field except the timestamp may be absent; absence is never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTick {
    /// Tick time (epoch milliseconds)
    pub timestamp_ms: i64,
    /// Heart rate (bpm)
    pub heart_rate_bpm: Option<f64>,
    /// Inter-beat intervals in arrival order (ms)
    pub ibi_ms: Option<Vec<f64>>,
    /// Object (skin) temperature (°C)
    pub object_temp_c: Option<f64>,
    /// Ambient temperature (°C)
    pub ambient_temp_c: Option<f64>,
    /// Raw acceleration including gravity (m/s²)
    pub acceleration: Option<Acceleration>,
    /// Smoothed movement intensity (0-1)
    pub movement_intensity: Option<f64>,
    /// Cumulative step count reported by the step counter
    pub total_steps: Option<u64>,
    /// Steps detected over the trailing minute
    pub steps_per_minute: Option<u32>,
}

impl RawTick {
    /// Create a tick with every optional field absent
    pub fn new(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }

    /// True when no sensor contributed anything to this tick
    pub fn is_empty(&self) -> bool {
        self.heart_rate_bpm.is_none()
            && self.ibi_ms.as_ref().map_or(true, |ibi| ibi.is_empty())
            && self.object_temp_c.is_none()
            && self.ambient_temp_c.is_none()
            && self.acceleration.is_none()
            && self.movement_intensity.is_none()
            && self.total_steps.is_none()
            && self.steps_per_minute.is_none()
    }
}

/// Mean and standard deviation of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    pub std: f64,
}

impl MetricStats {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }

    /// z = (value - mean) / std; absent if the value is absent or std is not positive
    pub fn z_score(&self, value: Option<f64>) -> Option<f64> {
        let value = value?;
        if self.std <= 0.0 || !self.std.is_finite() || !value.is_finite() {
            return None;
        }
        let z = (value - self.mean) / self.std;
        z.is_finite().then_some(z)
    }
}

/// Per-user reference statistics used to normalize raw metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    /// SDNN (ms)
    pub sdnn: MetricStats,
    /// RMSSD (ms)
    pub rmssd: MetricStats,
    /// Heart rate (bpm)
    pub heart_rate: MetricStats,
    /// Object (skin) temperature (°C)
    pub object_temp: MetricStats,
    /// Number of measurements the statistics were computed from
    #[serde(default)]
    pub measurement_count: u32,
    /// Record version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Whether this record is the active one
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_version() -> u32 {
    1
}

fn default_active() -> bool {
    true
}

/// Stress index and level derived from a single tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressResult {
    /// Stress index (0-100)
    pub stress_index: f64,
    /// Stress level (1-5)
    pub stress_level: u8,
    /// SDNN of the tick's inter-beat intervals (ms)
    pub sdnn: Option<f64>,
    /// RMSSD of the tick's inter-beat intervals (ms)
    pub rmssd: Option<f64>,
}

impl StressResult {
    /// Result for a tick with nothing to score
    pub fn calm() -> Self {
        Self {
            stress_index: 0.0,
            stress_level: 1,
            sdnn: None,
            rmssd: None,
        }
    }
}

/// A sanitized tick paired with its stress result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTick {
    pub tick: RawTick,
    pub result: StressResult,
}

/// One aggregated window; the unit sent to the companion device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentativeSample {
    /// Timestamp of the last tick in the window (epoch milliseconds)
    pub timestamp_ms: i64,
    pub heart_rate_bpm: Option<f64>,
    pub hrv_sdnn_ms: Option<f64>,
    pub hrv_rmssd_ms: Option<f64>,
    pub object_temp_c: Option<f64>,
    pub ambient_temp_c: Option<f64>,
    pub accel_x: Option<f64>,
    pub accel_y: Option<f64>,
    pub accel_z: Option<f64>,
    pub movement_intensity: Option<f64>,
    /// Mean stress index over the window (0-100)
    pub stress_index: f64,
    /// Rounded mean of the per-tick stress levels (1-5)
    pub stress_level: u8,
    /// Highest cumulative step count seen in the window
    pub total_steps: Option<u64>,
    /// Rounded mean steps-per-minute
    pub steps_per_minute: Option<u32>,
    /// Sustained high stress within the window
    pub is_anomaly: bool,
}
