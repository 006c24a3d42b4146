//! Sensor channels and the per-tick cache
//!
//! Platform callbacks arrive as [`SensorEvent`]s on whatever thread the host
//! uses. The tick task folds them into a [`SensorCache`] and snapshots the
//! most recent values once per second. Values may be up to one callback
//! interval stale; that is accepted.

use crate::types::{Acceleration, RawTick};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::trace;

/// Standard gravity (m/s²)
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Named sensor sources a platform may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorChannel {
    HeartRate,
    SkinTemperature,
    Accelerometer,
    Gyroscope,
    StepCounter,
    StepDetector,
}

impl SensorChannel {
    pub const ALL: [SensorChannel; 6] = [
        SensorChannel::HeartRate,
        SensorChannel::SkinTemperature,
        SensorChannel::Accelerometer,
        SensorChannel::Gyroscope,
        SensorChannel::StepCounter,
        SensorChannel::StepDetector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorChannel::HeartRate => "heart_rate",
            SensorChannel::SkinTemperature => "skin_temperature",
            SensorChannel::Accelerometer => "accelerometer",
            SensorChannel::Gyroscope => "gyroscope",
            SensorChannel::StepCounter => "step_counter",
            SensorChannel::StepDetector => "step_detector",
        }
    }
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of one sensor callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorReading {
    HeartRate {
        bpm: Option<f64>,
        #[serde(default)]
        ibi_ms: Vec<f64>,
    },
    SkinTemperature {
        object_c: Option<f64>,
        ambient_c: Option<f64>,
    },
    /// m/s², gravity included
    Accelerometer { x: f64, y: f64, z: f64 },
    /// rad/s
    Gyroscope { x: f64, y: f64, z: f64 },
    StepCounter { total: u64 },
    StepDetected,
}

/// A timestamped reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub timestamp_ms: i64,
    #[serde(flatten)]
    pub reading: SensorReading,
}

impl SensorEvent {
    pub fn new(timestamp_ms: i64, reading: SensorReading) -> Self {
        Self {
            timestamp_ms,
            reading,
        }
    }

    /// Channel this reading belongs to
    pub fn channel(&self) -> SensorChannel {
        match self.reading {
            SensorReading::HeartRate { .. } => SensorChannel::HeartRate,
            SensorReading::SkinTemperature { .. } => SensorChannel::SkinTemperature,
            SensorReading::Accelerometer { .. } => SensorChannel::Accelerometer,
            SensorReading::Gyroscope { .. } => SensorChannel::Gyroscope,
            SensorReading::StepCounter { .. } => SensorChannel::StepCounter,
            SensorReading::StepDetected => SensorChannel::StepDetector,
        }
    }
}

/// Counts detected steps over a trailing window
#[derive(Debug, Clone)]
pub struct StepRateTracker {
    window_ms: i64,
    steps: VecDeque<i64>,
}

impl Default for StepRateTracker {
    fn default() -> Self {
        Self::new(60_000)
    }
}

impl StepRateTracker {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            steps: VecDeque::new(),
        }
    }

    pub fn record(&mut self, timestamp_ms: i64) {
        self.steps.push_back(timestamp_ms);
        self.prune(timestamp_ms);
    }

    /// Steps seen within the window ending at `now_ms`
    pub fn steps_per_minute(&mut self, now_ms: i64) -> u32 {
        self.prune(now_ms);
        u32::try_from(self.steps.len()).unwrap_or(u32::MAX)
    }

    fn prune(&mut self, now_ms: i64) {
        while self
            .steps
            .front()
            .is_some_and(|&t| t < now_ms.saturating_sub(self.window_ms))
        {
            self.steps.pop_front();
        }
    }
}

/// Smoothed 0-1 movement intensity from raw acceleration
#[derive(Debug, Clone, Default)]
pub struct MovementTracker {
    ema: Option<f64>,
}

impl MovementTracker {
    /// Dynamic acceleration that maps to full intensity (m/s²)
    pub const CAP: f64 = 6.0;
    /// EMA weight of the newest sample
    pub const ALPHA: f64 = 0.2;

    pub fn update(&mut self, accel: Acceleration) -> Option<f64> {
        let instant = ((accel.magnitude() - STANDARD_GRAVITY).abs() / Self::CAP).clamp(0.0, 1.0);
        if !instant.is_finite() {
            return self.ema;
        }
        self.ema = Some(match self.ema {
            Some(prev) => Self::ALPHA * instant + (1.0 - Self::ALPHA) * prev,
            None => instant,
        });
        self.ema
    }

    pub fn current(&self) -> Option<f64> {
        self.ema
    }
}

/// Default age after which a cached reading no longer counts (ms)
pub const DEFAULT_MAX_AGE_MS: i64 = 10_000;

/// A cached reading and the time it arrived
#[derive(Debug, Clone, Copy)]
struct Latest<T> {
    at_ms: i64,
    value: T,
}

/// Latest value per channel, snapshotted into a [`RawTick`] once per tick.
///
/// A reading older than the max age is treated as absent, so a sensor that
/// stops reporting drops out instead of repeating its last value. The step
/// counter only reports on change and its total never goes stale.
#[derive(Debug, Clone)]
pub struct SensorCache {
    max_age_ms: i64,
    heart_rate_bpm: Option<Latest<f64>>,
    ibi: VecDeque<(i64, f64)>,
    ibi_window_ms: i64,
    ibi_capacity: usize,
    object_temp_c: Option<Latest<f64>>,
    ambient_temp_c: Option<Latest<f64>>,
    acceleration: Option<Latest<Acceleration>>,
    movement: MovementTracker,
    total_steps: Option<u64>,
    step_rate: StepRateTracker,
    step_detector_seen: bool,
}

impl Default for SensorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorCache {
    pub fn new() -> Self {
        Self::with_max_age(DEFAULT_MAX_AGE_MS)
    }

    /// Create a cache whose readings expire after `max_age_ms`
    pub fn with_max_age(max_age_ms: i64) -> Self {
        Self {
            max_age_ms,
            heart_rate_bpm: None,
            ibi: VecDeque::new(),
            ibi_window_ms: 30_000,
            ibi_capacity: 64,
            object_temp_c: None,
            ambient_temp_c: None,
            acceleration: None,
            movement: MovementTracker::default(),
            total_steps: None,
            step_rate: StepRateTracker::default(),
            step_detector_seen: false,
        }
    }

    /// Fold one event into the cache
    pub fn apply(&mut self, event: &SensorEvent) {
        let ts = event.timestamp_ms;
        let stamp = |value| Latest { at_ms: ts, value };
        match &event.reading {
            SensorReading::HeartRate { bpm, ibi_ms } => {
                if let Some(bpm) = bpm {
                    self.heart_rate_bpm = Some(stamp(*bpm));
                }
                for &ibi in ibi_ms {
                    self.ibi.push_back((ts, ibi));
                }
                while self.ibi.len() > self.ibi_capacity {
                    self.ibi.pop_front();
                }
            }
            SensorReading::SkinTemperature {
                object_c,
                ambient_c,
            } => {
                if let Some(object_c) = object_c {
                    self.object_temp_c = Some(stamp(*object_c));
                }
                if let Some(ambient_c) = ambient_c {
                    self.ambient_temp_c = Some(stamp(*ambient_c));
                }
            }
            SensorReading::Accelerometer { x, y, z } => {
                let accel = Acceleration::new(*x, *y, *z);
                self.acceleration = Some(Latest {
                    at_ms: ts,
                    value: accel,
                });
                self.movement.update(accel);
            }
            // Gyroscope only feeds the gesture detector
            SensorReading::Gyroscope { .. } => {}
            SensorReading::StepCounter { total } => self.total_steps = Some(*total),
            SensorReading::StepDetected => {
                self.step_detector_seen = true;
                self.step_rate.record(ts);
            }
        }
    }

    fn fresh<T: Copy>(&self, slot: Option<Latest<T>>, now_ms: i64) -> Option<T> {
        slot.filter(|l| now_ms.saturating_sub(l.at_ms) <= self.max_age_ms)
            .map(|l| l.value)
    }

    /// Build a tick from the cached values.
    ///
    /// Inter-beat intervals older than the rolling window are dropped first.
    pub fn snapshot(&mut self, now_ms: i64) -> RawTick {
        let ibi_cutoff = now_ms.saturating_sub(self.ibi_window_ms);
        while self.ibi.front().is_some_and(|&(t, _)| t < ibi_cutoff) {
            self.ibi.pop_front();
        }

        let ibi_ms: Vec<f64> = self.ibi.iter().map(|&(_, v)| v).collect();
        let steps_per_minute = if self.step_detector_seen {
            Some(self.step_rate.steps_per_minute(now_ms))
        } else {
            None
        };
        let acceleration = self.fresh(self.acceleration, now_ms);

        let tick = RawTick {
            timestamp_ms: now_ms,
            heart_rate_bpm: self.fresh(self.heart_rate_bpm, now_ms),
            ibi_ms: (!ibi_ms.is_empty()).then_some(ibi_ms),
            object_temp_c: self.fresh(self.object_temp_c, now_ms),
            ambient_temp_c: self.fresh(self.ambient_temp_c, now_ms),
            acceleration,
            movement_intensity: acceleration.and(self.movement.current()),
            total_steps: self.total_steps,
            steps_per_minute,
        };
        trace!(now_ms, empty = tick.is_empty(), "sensor snapshot");
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_channel() {
        let event = SensorEvent::new(0, SensorReading::StepDetected);
        assert_eq!(event.channel(), SensorChannel::StepDetector);
        assert_eq!(SensorChannel::ALL.len(), 6);
        assert_eq!(SensorChannel::Gyroscope.to_string(), "gyroscope");
    }

    #[test]
    fn test_event_json_shape() {
        let json = r#"{"timestamp_ms": 5, "type": "accelerometer", "x": 1.0, "y": 0.0, "z": 9.8}"#;
        let event: SensorEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.channel(), SensorChannel::Accelerometer);
        assert_eq!(event.timestamp_ms, 5);
    }

    #[test]
    fn test_step_rate_window() {
        let mut tracker = StepRateTracker::default();
        for t in [0, 10_000, 30_000, 59_000] {
            tracker.record(t);
        }
        assert_eq!(tracker.steps_per_minute(59_000), 4);
        // Step at 0 falls out after 60 s
        assert_eq!(tracker.steps_per_minute(60_001), 3);
        assert_eq!(tracker.steps_per_minute(200_000), 0);
    }

    #[test]
    fn test_movement_tracker() {
        let mut movement = MovementTracker::default();
        // At rest the dynamic component is ~0
        let rest = movement.update(Acceleration::new(0.0, 0.0, STANDARD_GRAVITY)).unwrap();
        assert!(rest.abs() < 1e-9);

        // Saturated sample moves the EMA by alpha
        let moved = movement.update(Acceleration::new(0.0, 0.0, 30.0)).unwrap();
        assert!((moved - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_cache_snapshot() {
        let mut cache = SensorCache::new();
        assert!(cache.snapshot(0).is_empty());

        cache.apply(&SensorEvent::new(
            100,
            SensorReading::HeartRate {
                bpm: Some(72.0),
                ibi_ms: vec![820.0, 830.0],
            },
        ));
        cache.apply(&SensorEvent::new(
            200,
            SensorReading::SkinTemperature {
                object_c: Some(34.1),
                ambient_c: None,
            },
        ));
        cache.apply(&SensorEvent::new(300, SensorReading::StepCounter { total: 4200 }));

        let tick = cache.snapshot(1_000);
        assert_eq!(tick.timestamp_ms, 1_000);
        assert_eq!(tick.heart_rate_bpm, Some(72.0));
        assert_eq!(tick.ibi_ms, Some(vec![820.0, 830.0]));
        assert_eq!(tick.object_temp_c, Some(34.1));
        assert_eq!(tick.ambient_temp_c, None);
        assert_eq!(tick.total_steps, Some(4200));
        assert_eq!(tick.steps_per_minute, None);

        // A reading without bpm keeps the previous heart rate
        cache.apply(&SensorEvent::new(
            1_100,
            SensorReading::HeartRate {
                bpm: None,
                ibi_ms: vec![],
            },
        ));
        assert_eq!(cache.snapshot(2_000).heart_rate_bpm, Some(72.0));

        // Old intervals age out
        assert_eq!(cache.snapshot(40_000).ibi_ms, None);
    }

    #[test]
    fn test_cache_step_rate_appears_after_first_step() {
        let mut cache = SensorCache::new();
        cache.apply(&SensorEvent::new(500, SensorReading::StepDetected));
        cache.apply(&SensorEvent::new(900, SensorReading::StepDetected));
        assert_eq!(cache.snapshot(1_000).steps_per_minute, Some(2));
        assert_eq!(cache.snapshot(120_000).steps_per_minute, Some(0));
    }

    #[test]
    fn test_silent_sensor_drops_out() {
        let mut cache = SensorCache::new();
        cache.apply(&SensorEvent::new(
            0,
            SensorReading::HeartRate {
                bpm: Some(150.0),
                ibi_ms: vec![],
            },
        ));
        cache.apply(&SensorEvent::new(
            0,
            SensorReading::SkinTemperature {
                object_c: Some(36.5),
                ambient_c: Some(22.0),
            },
        ));
        cache.apply(&SensorEvent::new(
            0,
            SensorReading::Accelerometer {
                x: 0.0,
                y: 0.0,
                z: STANDARD_GRAVITY,
            },
        ));
        cache.apply(&SensorEvent::new(0, SensorReading::StepCounter { total: 900 }));

        let tick = cache.snapshot(DEFAULT_MAX_AGE_MS);
        assert_eq!(tick.heart_rate_bpm, Some(150.0));
        assert_eq!(tick.object_temp_c, Some(36.5));
        assert!(tick.movement_intensity.is_some());

        // An hour with nothing from the sensors
        let tick = cache.snapshot(3_600_000);
        assert_eq!(tick.heart_rate_bpm, None);
        assert_eq!(tick.object_temp_c, None);
        assert_eq!(tick.ambient_temp_c, None);
        assert_eq!(tick.acceleration, None);
        assert_eq!(tick.movement_intensity, None);
        assert_eq!(tick.total_steps, Some(900));
    }

    #[test]
    fn test_fresh_reading_replaces_stale_one() {
        let mut cache = SensorCache::with_max_age(2_000);
        let hr = |bpm| SensorReading::HeartRate {
            bpm: Some(bpm),
            ibi_ms: vec![],
        };
        cache.apply(&SensorEvent::new(0, hr(70.0)));
        assert_eq!(cache.snapshot(2_001).heart_rate_bpm, None);

        cache.apply(&SensorEvent::new(2_500, hr(74.0)));
        assert_eq!(cache.snapshot(3_000).heart_rate_bpm, Some(74.0));
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let mut cache = SensorCache::new();
        cache.apply(&SensorEvent::new(i64::MIN, SensorReading::StepDetected));
        let tick = cache.snapshot(i64::MIN);
        assert!(tick.ibi_ms.is_none());
    }
}
