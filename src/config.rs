//! Configuration
//!
//! Every component takes a plain settings struct with defaults matching the
//! device behaviour. [`PulseConfig`] bundles them so a host can load a single
//! (possibly partial) JSON document.

use crate::aggregator::WindowConfig;
use crate::error::PulseError;
use crate::gesture::GestureConfig;
use crate::scorer::ScorerConfig;
use crate::supervisor::SupervisorConfig;
use crate::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All component settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub scorer: ScorerConfig,
    pub window: WindowConfig,
    pub gesture: GestureConfig,
    pub supervisor: SupervisorConfig,
    pub transport: TransportConfig,
}

impl PulseConfig {
    /// Parse and validate a JSON document; missing sections use defaults
    pub fn from_json(json: &str) -> Result<Self, PulseError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PulseError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PulseError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, PulseError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings no component can work with
    pub fn validate(&self) -> Result<(), PulseError> {
        let invalid = |msg: &str| Err(PulseError::InvalidConfig(msg.to_string()));

        let w = &self.scorer.weights;
        let weights = [w.sdnn, w.rmssd, w.heart_rate, w.temperature, w.movement];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return invalid("scorer weights must be finite and non-negative");
        }
        if !(self.scorer.movement_ceiling > 0.0) {
            return invalid("scorer.movement_ceiling must be positive");
        }
        if !(0.0..=1.0).contains(&self.scorer.activity_factor) {
            return invalid("scorer.activity_factor must be within [0, 1]");
        }

        if self.window.size == 0 {
            return invalid("window.size must be at least 1");
        }
        if self.window.anomaly_count == 0 || self.window.anomaly_count > self.window.size {
            return invalid("window.anomaly_count must be within [1, window.size]");
        }
        if !(1..=5).contains(&self.window.anomaly_level) {
            return invalid("window.anomaly_level must be within [1, 5]");
        }

        let g = &self.gesture;
        if !(g.accel_threshold > 0.0) || !(g.gyro_threshold > 0.0) {
            return invalid("gesture thresholds must be positive");
        }
        if !(g.alpha > 0.0 && g.alpha < 1.0) {
            return invalid("gesture.alpha must be within (0, 1)");
        }
        if g.min_alternations == 0 {
            return invalid("gesture.min_alternations must be at least 1");
        }
        if g.window_ms <= 0 || g.cooldown_ms < 0 || g.gyro_spike_window_ms < 0 {
            return invalid("gesture durations must not be negative");
        }

        let s = &self.supervisor;
        if s.tick_interval_ms == 0
            || s.wake_lock_renew_ms == 0
            || s.heartbeat_ms == 0
            || s.sensor_max_age_ms == 0
        {
            return invalid("supervisor intervals must be positive");
        }
        if s.wake_lock_renew_ms >= s.wake_lock_timeout_ms {
            return invalid(
                "supervisor.wake_lock_renew_ms must be shorter than the wake lock timeout",
            );
        }
        if s.sensor_queue_capacity == 0 {
            return invalid("supervisor.sensor_queue_capacity must be at least 1");
        }

        if self.transport.queue_capacity == 0 {
            return invalid("transport.queue_capacity must be at least 1");
        }
        if self.transport.data_path == self.transport.alert_path {
            return invalid("transport data and alert paths must differ");
        }

        Ok(())
    }
}
