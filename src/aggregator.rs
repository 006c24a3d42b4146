//! Window aggregation
//!
//! Collects scored ticks into fixed-size windows and reduces each full
//! window to one [`RepresentativeSample`]. Averages only count ticks where a
//! value was present, so a dropped sensor never drags a mean toward zero.

use crate::types::{RepresentativeSample, ScoredTick};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::mem;
use tracing::{debug, info, warn};

/// Window and anomaly settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Ticks per window (K)
    pub size: usize,
    /// Per-tick level counted as high stress
    pub anomaly_level: u8,
    /// High-stress ticks needed in one window to flag an anomaly
    pub anomaly_count: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size: 10,
            anomaly_level: 4,
            anomaly_count: 6,
        }
    }
}

/// Thread-safe window aggregator
#[derive(Debug)]
pub struct WindowAggregator {
    config: WindowConfig,
    queue: Mutex<Vec<ScoredTick>>,
}

impl Default for WindowAggregator {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}

impl WindowAggregator {
    /// Create an aggregator; a window size of zero is treated as one
    pub fn new(mut config: WindowConfig) -> Self {
        config.size = config.size.max(1);
        Self {
            queue: Mutex::new(Vec::with_capacity(config.size)),
            config,
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Queue a tick; returns a sample when this tick completes a window
    pub fn push(&self, tick: ScoredTick) -> Option<RepresentativeSample> {
        let drained = {
            let mut queue = self.queue.lock();
            queue.push(tick);
            if queue.len() < self.config.size {
                return None;
            }
            mem::replace(&mut *queue, Vec::with_capacity(self.config.size))
        };

        let sample = self.reduce(&drained);
        if sample.is_anomaly {
            warn!(
                stress_level = sample.stress_level,
                stress_index = sample.stress_index,
                "sustained high stress in window"
            );
        }
        debug!(
            ticks = drained.len(),
            stress_index = sample.stress_index,
            "window emitted"
        );
        Some(sample)
    }

    /// Ticks waiting for the current window to fill
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drop a partially filled window; returns how many ticks were dropped
    pub fn discard_partial(&self) -> usize {
        let dropped = mem::take(&mut *self.queue.lock()).len();
        if dropped > 0 {
            info!(dropped, "partial window discarded");
        }
        dropped
    }

    fn reduce(&self, ticks: &[ScoredTick]) -> RepresentativeSample {
        let n = ticks.len().max(1) as f64;

        let stress_index = ticks.iter().map(|t| t.result.stress_index).sum::<f64>() / n;
        let mean_level = ticks
            .iter()
            .map(|t| f64::from(t.result.stress_level))
            .sum::<f64>()
            / n;
        let high = ticks
            .iter()
            .filter(|t| t.result.stress_level >= self.config.anomaly_level)
            .count();

        RepresentativeSample {
            timestamp_ms: ticks.last().map_or(0, |t| t.tick.timestamp_ms),
            heart_rate_bpm: mean_present(ticks.iter().map(|t| t.tick.heart_rate_bpm)),
            hrv_sdnn_ms: mean_present(ticks.iter().map(|t| t.result.sdnn)),
            hrv_rmssd_ms: mean_present(ticks.iter().map(|t| t.result.rmssd)),
            object_temp_c: mean_present(ticks.iter().map(|t| t.tick.object_temp_c)),
            ambient_temp_c: mean_present(ticks.iter().map(|t| t.tick.ambient_temp_c)),
            accel_x: mean_present(ticks.iter().map(|t| t.tick.acceleration.map(|a| a.x))),
            accel_y: mean_present(ticks.iter().map(|t| t.tick.acceleration.map(|a| a.y))),
            accel_z: mean_present(ticks.iter().map(|t| t.tick.acceleration.map(|a| a.z))),
            movement_intensity: mean_present(ticks.iter().map(|t| t.tick.movement_intensity)),
            stress_index,
            stress_level: mean_level.round().clamp(1.0, 5.0) as u8,
            total_steps: ticks.iter().filter_map(|t| t.tick.total_steps).max(),
            steps_per_minute: mean_present(
                ticks
                    .iter()
                    .map(|t| t.tick.steps_per_minute.map(f64::from)),
            )
            .map(|spm| spm.round() as u32),
            is_anomaly: high >= self.config.anomaly_count,
        }
    }
}

/// Mean of the present values, absent if none were present
fn mean_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}
