//! Wrist-shake gesture detection
//!
//! A time-windowed pattern matcher over the accelerometer stream. Gravity is
//! tracked with a low-pass filter and removed; a shake is a run of
//! high-magnitude samples whose dominant axis keeps flipping sign. The
//! gyroscope can optionally confirm that the wrist was actually rotating.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Gesture detector tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Minimum dynamic acceleration magnitude (m/s², gravity removed)
    pub accel_threshold: f64,
    /// Sign flips needed to fire
    pub min_alternations: u32,
    /// Window within which the flips must happen (ms)
    pub window_ms: i64,
    /// Quiet period after a trigger (ms)
    pub cooldown_ms: i64,
    /// Require a recent gyroscope spike before counting a flip
    pub use_gyro_assist: bool,
    /// Angular velocity magnitude that counts as a spike (rad/s)
    pub gyro_threshold: f64,
    /// How recent a spike must be to count (ms)
    pub gyro_spike_window_ms: i64,
    /// Deadband for classifying the dominant axis sign
    pub sign_threshold: f64,
    /// Low-pass factor for the gravity estimate
    pub alpha: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            accel_threshold: 12.0,
            min_alternations: 3,
            window_ms: 600,
            cooldown_ms: 2000,
            use_gyro_assist: true,
            gyro_threshold: 2.0,
            gyro_spike_window_ms: 150,
            sign_threshold: 0.5,
            alpha: 0.8,
        }
    }
}

/// Mutable detector state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GestureState {
    /// Low-pass gravity estimate
    pub gravity: [f64; 3],
    pub initialized: bool,
    /// Last non-zero sign of the dominant axis
    pub last_sign: i8,
    pub alternations: u32,
    pub window_start_ms: i64,
    pub last_gyro_spike_ms: Option<i64>,
    pub last_trigger_ms: Option<i64>,
}

/// Single-threaded shake detector; feed it samples in time order
#[derive(Debug, Clone, Default)]
pub struct GestureDetector {
    config: GestureConfig,
    state: GestureState,
}

impl GestureDetector {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            state: GestureState::default(),
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    /// Forget everything, including cooldown
    pub fn reset(&mut self) {
        self.state = GestureState::default();
    }

    fn in_cooldown(&self, now_ms: i64) -> bool {
        self.state
            .last_trigger_ms
            .is_some_and(|t| now_ms.saturating_sub(t) < self.config.cooldown_ms)
    }

    fn reset_window(&mut self, now_ms: i64) {
        self.state.window_start_ms = now_ms;
        self.state.alternations = 0;
        self.state.last_sign = 0;
    }

    /// Record a gyroscope sample (rad/s)
    pub fn on_gyroscope(&mut self, now_ms: i64, x: f64, y: f64, z: f64) {
        if !self.config.use_gyro_assist || self.in_cooldown(now_ms) {
            return;
        }
        if (x * x + y * y + z * z).sqrt() > self.config.gyro_threshold {
            self.state.last_gyro_spike_ms = Some(now_ms);
        }
    }

    /// Process an accelerometer sample (m/s², gravity included).
    ///
    /// Returns true exactly when this sample completes a shake.
    pub fn on_accelerometer(&mut self, now_ms: i64, x: f64, y: f64, z: f64) -> bool {
        if self.in_cooldown(now_ms) {
            self.state.initialized = false;
            return false;
        }

        let raw = [x, y, z];
        if !self.state.initialized {
            self.state.gravity = raw;
            self.state.initialized = true;
            self.reset_window(now_ms);
            return false;
        }

        let alpha = self.config.alpha;
        let mut linear = [0.0; 3];
        for axis in 0..3 {
            self.state.gravity[axis] = alpha * self.state.gravity[axis] + (1.0 - alpha) * raw[axis];
            linear[axis] = raw[axis] - self.state.gravity[axis];
        }
        let magnitude = linear.iter().map(|v| v * v).sum::<f64>().sqrt();

        let dominant = dominant_axis(linear);
        let threshold = self.config.sign_threshold;
        let sign: i8 = if dominant > threshold {
            1
        } else if dominant < -threshold {
            -1
        } else {
            0
        };

        if now_ms.saturating_sub(self.state.window_start_ms) > self.config.window_ms {
            self.reset_window(now_ms);
        }

        let gyro_ok = !self.config.use_gyro_assist
            || self
                .state
                .last_gyro_spike_ms
                .is_some_and(|t| now_ms.saturating_sub(t) <= self.config.gyro_spike_window_ms);

        if magnitude <= self.config.accel_threshold || !gyro_ok {
            return false;
        }

        if sign != 0 && self.state.last_sign != 0 && sign != self.state.last_sign {
            self.state.alternations += 1;
        }
        if sign != 0 {
            self.state.last_sign = sign;
        }

        if self.state.alternations >= self.config.min_alternations {
            debug!(now_ms, magnitude, "shake alternations reached");
            self.state.last_trigger_ms = Some(now_ms);
            self.state.initialized = false;
            self.reset_window(now_ms);
            return true;
        }
        false
    }
}

/// Value of the axis with the largest magnitude (ties favour x, then y)
fn dominant_axis([x, y, z]: [f64; 3]) -> f64 {
    if x.abs() >= y.abs() && x.abs() >= z.abs() {
        x
    } else if y.abs() >= z.abs() {
        y
    } else {
        z
    }
}

/// Callback invoked when a shake fires
pub type TriggerCallback = Arc<dyn Fn() + Send + Sync>;

/// Thread-safe wrapper pairing a detector with its callback.
///
/// The callback runs after the detector lock is released, so it may call
/// back into the trigger.
#[derive(Clone)]
pub struct GestureTrigger {
    detector: Arc<Mutex<GestureDetector>>,
    on_trigger: TriggerCallback,
}

impl fmt::Debug for GestureTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GestureTrigger")
            .field("detector", &self.detector)
            .finish_non_exhaustive()
    }
}

impl GestureTrigger {
    pub fn new(config: GestureConfig, on_trigger: TriggerCallback) -> Self {
        Self {
            detector: Arc::new(Mutex::new(GestureDetector::new(config))),
            on_trigger,
        }
    }

    pub fn config(&self) -> GestureConfig {
        *self.detector.lock().config()
    }

    pub fn on_gyroscope(&self, now_ms: i64, x: f64, y: f64, z: f64) {
        self.detector.lock().on_gyroscope(now_ms, x, y, z);
    }

    /// Feed an accelerometer sample; returns true if the callback fired
    pub fn on_accelerometer(&self, now_ms: i64, x: f64, y: f64, z: f64) -> bool {
        let fired = self.detector.lock().on_accelerometer(now_ms, x, y, z);
        if fired {
            info!(at_ms = now_ms, "wrist shake detected");
            (self.on_trigger)();
        }
        fired
    }

    /// Reset detector state, e.g. when subscriptions are re-established
    pub fn reset(&self) {
        self.detector.lock().reset();
    }

    pub fn state(&self) -> GestureState {
        self.detector.lock().state().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const G: f64 = 9.8;

    fn no_gyro() -> GestureConfig {
        GestureConfig {
            use_gyro_assist: false,
            ..Default::default()
        }
    }

    /// Seed gravity at `start`, then alternate ±30 on x every 50 ms
    fn shake(det: &mut GestureDetector, start: i64, samples: usize) -> Vec<i64> {
        let mut fired = Vec::new();
        if det.on_accelerometer(start, 0.0, 0.0, G) {
            fired.push(start);
        }
        for i in 0..samples {
            let t = start + 50 * (i as i64 + 1);
            let x = if i % 2 == 0 { 30.0 } else { -30.0 };
            if det.on_accelerometer(t, x, 0.0, G) {
                fired.push(t);
            }
        }
        fired
    }

    #[test]
    fn test_three_alternations_trigger_once() {
        let mut det = GestureDetector::new(no_gyro());
        // Linear x ≈ 24, -28.8, 24.96, -28.03: third flip on the fourth sample
        let fired = shake(&mut det, 1_000, 4);
        assert_eq!(fired, vec![1_200]);
    }

    #[test]
    fn test_extra_alternation_does_not_retrigger() {
        let mut det = GestureDetector::new(no_gyro());
        let fired = shake(&mut det, 1_000, 8);
        assert_eq!(fired, vec![1_200]);
        assert!(!det.state().initialized);
    }

    #[test]
    fn test_cooldown_then_rearm() {
        let mut det = GestureDetector::new(no_gyro());
        assert_eq!(shake(&mut det, 1_000, 4), vec![1_200]);

        // Inside the cooldown: nothing fires
        assert!(shake(&mut det, 1_500, 6).is_empty());

        // After the cooldown the first sample seeds gravity again
        assert_eq!(shake(&mut det, 3_200, 4), vec![3_400]);
    }

    #[test]
    fn test_window_timeout_resets_count() {
        let mut det = GestureDetector::new(no_gyro());
        assert!(!det.on_accelerometer(0, 0.0, 0.0, G));
        assert!(!det.on_accelerometer(50, 30.0, 0.0, G));
        assert!(!det.on_accelerometer(100, -30.0, 0.0, G));
        assert_eq!(det.state().alternations, 1);

        // Past the 600 ms window: count starts over
        assert!(!det.on_accelerometer(700, 30.0, 0.0, G));
        assert_eq!(det.state().alternations, 0);
        assert!(!det.on_accelerometer(750, -30.0, 0.0, G));
        assert!(!det.on_accelerometer(800, 30.0, 0.0, G));
        assert_eq!(det.state().alternations, 2);
    }

    #[test]
    fn test_low_magnitude_is_ignored() {
        let mut det = GestureDetector::new(no_gyro());
        det.on_accelerometer(0, 0.0, 0.0, G);
        for i in 1..20 {
            let x = if i % 2 == 0 { 5.0 } else { -5.0 };
            assert!(!det.on_accelerometer(i * 20, x, 0.0, G));
        }
        assert_eq!(det.state().alternations, 0);
    }

    #[test]
    fn test_gyro_assist_requires_spike() {
        let mut det = GestureDetector::new(GestureConfig::default());
        assert!(shake(&mut det, 1_000, 6).is_empty());
        assert_eq!(det.state().alternations, 0);
    }

    #[test]
    fn test_gyro_assist_with_spikes() {
        let mut det = GestureDetector::new(GestureConfig::default());
        det.on_accelerometer(1_000, 0.0, 0.0, G);
        let mut fired = Vec::new();
        for i in 0..4 {
            let t = 1_050 + 50 * i;
            det.on_gyroscope(t - 10, 3.0, 0.0, 0.0);
            let x = if i % 2 == 0 { 30.0 } else { -30.0 };
            if det.on_accelerometer(t, x, 0.0, G) {
                fired.push(t);
            }
        }
        assert_eq!(fired, vec![1_200]);
    }

    #[test]
    fn test_stale_gyro_spike_does_not_count() {
        let mut det = GestureDetector::new(GestureConfig::default());
        det.on_gyroscope(800, 3.0, 0.0, 0.0);
        det.on_gyroscope(850, 0.5, 0.0, 0.0);
        // Last real spike at 800 is more than 150 ms before every sample
        assert!(shake(&mut det, 1_000, 4).is_empty());
    }

    #[test]
    fn test_trigger_invokes_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = count.clone();
        let trigger = GestureTrigger::new(
            no_gyro(),
            Arc::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );

        trigger.on_accelerometer(1_000, 0.0, 0.0, G);
        for (i, t) in [1_050, 1_100, 1_150, 1_200, 1_250].into_iter().enumerate() {
            let x = if i % 2 == 0 { 30.0 } else { -30.0 };
            trigger.on_accelerometer(t, x, 0.0, G);
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(trigger.state().last_trigger_ms, Some(1_200));

        trigger.reset();
        assert_eq!(trigger.state(), GestureState::default());
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let mut det = GestureDetector::new(GestureConfig::default());
        det.on_gyroscope(i64::MIN, 3.0, 0.0, 0.0);
        assert!(!det.on_accelerometer(i64::MIN, 0.0, 0.0, G));
        assert!(!det.on_accelerometer(i64::MAX, 30.0, 0.0, G));
        assert_eq!(det.state().window_start_ms, i64::MAX);

        let mut det = GestureDetector::new(no_gyro());
        assert_eq!(shake(&mut det, 1_000, 4), vec![1_200]);
        assert!(!det.on_accelerometer(i64::MIN, 0.0, 0.0, G));
        assert!(!det.on_accelerometer(i64::MAX, 0.0, 0.0, G));
    }
}
