//! Reading sanitization
//!
//! Rejects physiologically impossible single readings. Out-of-range values
//! become absent rather than clamped, so they drop out of scoring and
//! averaging instead of skewing them.

use crate::types::RawTick;
use std::ops::RangeInclusive;

/// Accepted heart rate range (bpm)
pub const HEART_RATE_RANGE: RangeInclusive<f64> = 30.0..=220.0;

/// Accepted skin temperature range (°C)
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 30.0..=40.0;

/// Keep a heart rate reading only if it lies within [30, 220] bpm
pub fn sanitize_heart_rate(hr: Option<f64>) -> Option<f64> {
    hr.filter(|v| HEART_RATE_RANGE.contains(v))
}

/// Keep a skin temperature reading only if it lies within [30, 40] °C
pub fn sanitize_temperature(temp: Option<f64>) -> Option<f64> {
    temp.filter(|v| TEMPERATURE_RANGE.contains(v))
}

/// Fill a missing or non-positive heart rate from the most recent inter-beat interval.
///
/// The reported value wins whenever it is positive; the derived value is
/// `60000 / ibi`. Range checks are left to [`sanitize_heart_rate`].
pub fn heart_rate_with_ibi_fallback(hr: Option<f64>, ibi_ms: Option<&[f64]>) -> Option<f64> {
    match hr {
        Some(bpm) if bpm.is_finite() && bpm > 0.0 => Some(bpm),
        _ => ibi_ms
            .and_then(|ibi| ibi.last().copied())
            .filter(|last| last.is_finite() && *last > 0.0)
            .map(|last| 60_000.0 / last),
    }
}

/// Applies the per-field checks to a whole tick
pub struct Sanitizer;

impl Sanitizer {
    /// Sanitize a raw tick.
    ///
    /// Heart rate falls back to the IBI-derived value before the range check.
    /// Ambient temperature is environmental and only needs to be finite.
    pub fn sanitize(tick: RawTick) -> RawTick {
        let heart_rate_bpm = sanitize_heart_rate(heart_rate_with_ibi_fallback(
            tick.heart_rate_bpm,
            tick.ibi_ms.as_deref(),
        ));

        let ibi_ms = tick.ibi_ms.map(|ibi| {
            ibi.into_iter()
                .filter(|v| v.is_finite() && *v > 0.0)
                .collect::<Vec<_>>()
        });

        RawTick {
            heart_rate_bpm,
            ibi_ms: ibi_ms.filter(|ibi| !ibi.is_empty()),
            object_temp_c: sanitize_temperature(tick.object_temp_c),
            ambient_temp_c: tick.ambient_temp_c.filter(|t| t.is_finite()),
            acceleration: tick.acceleration.filter(|a| a.magnitude().is_finite()),
            movement_intensity: tick.movement_intensity.filter(|m| m.is_finite()),
            ..tick
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Acceleration;

    #[test]
    fn test_heart_rate_range_is_closed() {
        assert_eq!(sanitize_heart_rate(Some(30.0)), Some(30.0));
        assert_eq!(sanitize_heart_rate(Some(220.0)), Some(220.0));
        assert_eq!(sanitize_heart_rate(Some(72.5)), Some(72.5));
        assert_eq!(sanitize_heart_rate(Some(29.9)), None);
        assert_eq!(sanitize_heart_rate(Some(220.1)), None);
        assert_eq!(sanitize_heart_rate(Some(f64::NAN)), None);
        assert_eq!(sanitize_heart_rate(None), None);
    }

    #[test]
    fn test_temperature_range_is_closed() {
        assert_eq!(sanitize_temperature(Some(30.0)), Some(30.0));
        assert_eq!(sanitize_temperature(Some(40.0)), Some(40.0));
        assert_eq!(sanitize_temperature(Some(34.2)), Some(34.2));
        assert_eq!(sanitize_temperature(Some(25.0)), None);
        assert_eq!(sanitize_temperature(Some(41.0)), None);
        assert_eq!(sanitize_temperature(Some(f64::INFINITY)), None);
        assert_eq!(sanitize_temperature(None), None);
    }

    #[test]
    fn test_ibi_fallback() {
        // 800 ms between beats = 75 bpm
        let ibi = [820.0, 800.0];
        assert_eq!(heart_rate_with_ibi_fallback(None, Some(&ibi[..])), Some(75.0));
        assert_eq!(heart_rate_with_ibi_fallback(Some(0.0), Some(&ibi[..])), Some(75.0));

        // Reported value wins
        assert_eq!(heart_rate_with_ibi_fallback(Some(64.0), Some(&ibi[..])), Some(64.0));

        // Nothing usable
        assert_eq!(heart_rate_with_ibi_fallback(None, None), None);
        assert_eq!(heart_rate_with_ibi_fallback(None, Some(&[][..])), None);
        assert_eq!(heart_rate_with_ibi_fallback(None, Some(&[0.0][..])), None);
    }

    #[test]
    fn test_sanitize_tick() {
        let tick = RawTick {
            heart_rate_bpm: Some(250.0),
            ibi_ms: Some(vec![800.0, -5.0, f64::NAN, 810.0]),
            object_temp_c: Some(45.0),
            ambient_temp_c: Some(21.0),
            acceleration: Some(Acceleration::new(0.1, 0.2, 9.8)),
            total_steps: Some(1200),
            ..RawTick::new(5_000)
        };

        let clean = Sanitizer::sanitize(tick);
        assert_eq!(clean.timestamp_ms, 5_000);
        assert_eq!(clean.heart_rate_bpm, None);
        assert_eq!(clean.ibi_ms, Some(vec![800.0, 810.0]));
        assert_eq!(clean.object_temp_c, None);
        assert_eq!(clean.ambient_temp_c, Some(21.0));
        assert!(clean.acceleration.is_some());
        assert_eq!(clean.total_steps, Some(1200));
    }

    #[test]
    fn test_sanitize_tick_uses_fallback() {
        let tick = RawTick {
            ibi_ms: Some(vec![750.0]),
            ..RawTick::new(0)
        };
        let clean = Sanitizer::sanitize(tick);
        assert_eq!(clean.heart_rate_bpm, Some(80.0));
    }
}
