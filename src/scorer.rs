//! Stress scoring
//!
//! Converts one sanitized tick into a stress index (0-100) and level (1-5)
//! by comparing its metrics against the active baseline. Scoring is total:
//! missing inputs contribute nothing and the worst case is a calm result.

use crate::baseline::BaselineProvider;
use crate::hrv::HrvMetrics;
use crate::types::{BaselineStats, RawTick, StressResult};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// How HRV z-scores map onto stress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrvPolarity {
    /// Apply the curve to the z-score as-is
    #[default]
    Direct,
    /// Score `100 - curve(z)`: variability below baseline reads as stress
    Inverted,
}

/// Relative weight of each sub-score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub sdnn: f64,
    pub rmssd: f64,
    pub heart_rate: f64,
    pub temperature: f64,
    pub movement: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            sdnn: 0.30,
            rmssd: 0.30,
            heart_rate: 0.25,
            temperature: 0.10,
            movement: 0.05,
        }
    }
}

/// Scorer configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub weights: ScoreWeights,
    /// Acceleration magnitude (m/s²) that maps to a movement sub-score of 100
    pub movement_ceiling: f64,
    /// Steps per minute at or above which the activity discount applies
    pub activity_spm_threshold: u32,
    /// Multiplier applied to the index during activity
    pub activity_factor: f64,
    pub hrv_polarity: HrvPolarity,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            movement_ceiling: 20.0,
            activity_spm_threshold: 100,
            activity_factor: 0.4,
            hrv_polarity: HrvPolarity::Direct,
        }
    }
}

/// Map a z-score onto the 0-100 sub-score curve.
///
/// Continuous at every breakpoint: -1 → 0, 0 → 30, 1 → 70, 2 → 100.
pub fn curve(z: f64) -> f64 {
    if z.is_nan() || z <= -1.0 {
        0.0
    } else if z <= 0.0 {
        30.0 * (z + 1.0)
    } else if z <= 1.0 {
        30.0 + 40.0 * z
    } else if z <= 2.0 {
        70.0 + 30.0 * (z - 1.0)
    } else {
        100.0
    }
}

/// Bucket a 0-100 index into a 1-5 level
pub fn stress_level(index: f64) -> u8 {
    match index {
        i if i < 21.0 => 1,
        i if i < 41.0 => 2,
        i if i < 61.0 => 3,
        i if i < 81.0 => 4,
        _ => 5,
    }
}

/// Per-tick stress scorer
#[derive(Debug, Clone, Default)]
pub struct StressScorer {
    config: ScorerConfig,
}

impl StressScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score a tick against whatever baseline the provider currently holds
    pub fn score(&self, tick: &RawTick, provider: &dyn BaselineProvider) -> StressResult {
        let hrv = HrvMetrics::from_ibi(tick.ibi_ms.as_deref());
        self.score_with(tick, hrv, provider.active().as_ref())
    }

    /// Score a tick with precomputed HRV metrics and an explicit baseline
    pub fn score_with(
        &self,
        tick: &RawTick,
        hrv: HrvMetrics,
        baseline: Option<&BaselineStats>,
    ) -> StressResult {
        let w = &self.config.weights;

        let (sdnn_score, rmssd_score, hr_score, temp_score) = match baseline {
            Some(b) => (
                self.hrv_score(b.sdnn.z_score(hrv.sdnn)),
                self.hrv_score(b.rmssd.z_score(hrv.rmssd)),
                b.heart_rate.z_score(tick.heart_rate_bpm).map_or(0.0, curve),
                b.object_temp.z_score(tick.object_temp_c).map_or(0.0, curve),
            ),
            None => (0.0, 0.0, 0.0, 0.0),
        };

        let movement_score = self.movement_score(tick);

        let mut index = sdnn_score * w.sdnn
            + rmssd_score * w.rmssd
            + hr_score * w.heart_rate
            + temp_score * w.temperature
            + movement_score * w.movement;

        let active = tick
            .steps_per_minute
            .is_some_and(|spm| spm >= self.config.activity_spm_threshold);
        if active {
            index *= self.config.activity_factor;
        }

        let index = if index.is_nan() {
            0.0
        } else {
            index.clamp(0.0, 100.0)
        };

        trace!(
            timestamp_ms = tick.timestamp_ms,
            index,
            active,
            has_baseline = baseline.is_some(),
            "tick scored"
        );

        StressResult {
            stress_index: index,
            stress_level: stress_level(index),
            sdnn: hrv.sdnn,
            rmssd: hrv.rmssd,
        }
    }

    fn hrv_score(&self, z: Option<f64>) -> f64 {
        match (z, self.config.hrv_polarity) {
            (None, _) => 0.0,
            (Some(z), HrvPolarity::Direct) => curve(z),
            (Some(z), HrvPolarity::Inverted) => 100.0 - curve(z),
        }
    }

    fn movement_score(&self, tick: &RawTick) -> f64 {
        let ceiling = self.config.movement_ceiling;
        match tick.acceleration {
            Some(accel) if ceiling > 0.0 => {
                let score = accel.magnitude() / ceiling * 100.0;
                if score.is_finite() {
                    score.clamp(0.0, 100.0)
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::StaticBaseline;
    use crate::types::{Acceleration, MetricStats};

    fn make_baseline() -> BaselineStats {
        BaselineStats {
            sdnn: MetricStats::new(40.0, 8.0),
            rmssd: MetricStats::new(35.0, 15.0),
            heart_rate: MetricStats::new(70.0, 10.0),
            object_temp: MetricStats::new(33.0, 0.5),
            measurement_count: 100,
            version: 1,
            is_active: true,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_curve_breakpoints() {
        assert_eq!(curve(-3.0), 0.0);
        assert_eq!(curve(-1.0), 0.0);
        assert_eq!(curve(0.0), 30.0);
        assert_eq!(curve(1.0), 70.0);
        assert_eq!(curve(2.0), 100.0);
        assert_eq!(curve(5.0), 100.0);
        assert!(approx(curve(-0.5), 15.0));
        assert!(approx(curve(0.5), 50.0));
        assert!(approx(curve(1.5), 85.0));
    }

    #[test]
    fn test_level_breakpoints() {
        assert_eq!(stress_level(0.0), 1);
        assert_eq!(stress_level(20.9), 1);
        assert_eq!(stress_level(21.0), 2);
        assert_eq!(stress_level(40.99), 2);
        assert_eq!(stress_level(41.0), 3);
        assert_eq!(stress_level(61.0), 4);
        assert_eq!(stress_level(80.9), 4);
        assert_eq!(stress_level(81.0), 5);
        assert_eq!(stress_level(100.0), 5);
    }

    #[test]
    fn test_all_absent_is_calm() {
        let scorer = StressScorer::default();
        let tick = RawTick::new(0);

        let result = scorer.score(&tick, &StaticBaseline(Some(make_baseline())));
        assert_eq!(result, StressResult::calm());

        let result = scorer.score(&tick, &StaticBaseline(None));
        assert_eq!(result, StressResult::calm());
    }

    #[test]
    fn test_no_baseline_scores_movement_only() {
        let scorer = StressScorer::default();
        let tick = RawTick {
            heart_rate_bpm: Some(150.0),
            acceleration: Some(Acceleration::new(0.0, 0.0, 10.0)),
            ..RawTick::new(0)
        };
        let result = scorer.score(&tick, &StaticBaseline(None));
        // 10/20 * 100 = 50, weight 0.05
        assert!(approx(result.stress_index, 2.5));
        assert_eq!(result.stress_level, 1);
    }

    #[test]
    fn test_heart_rate_only() {
        let scorer = StressScorer::default();
        let tick = RawTick {
            heart_rate_bpm: Some(80.0),
            ..RawTick::new(0)
        };
        // z = 1 → 70, weight 0.25
        let result = scorer.score(&tick, &StaticBaseline(Some(make_baseline())));
        assert!(approx(result.stress_index, 17.5));
    }

    #[test]
    fn test_activity_discount() {
        let scorer = StressScorer::default();
        let base = RawTick {
            heart_rate_bpm: Some(90.0),
            object_temp_c: Some(34.0),
            ..RawTick::new(0)
        };
        let baseline = StaticBaseline(Some(make_baseline()));

        let resting = scorer.score(&base, &baseline);
        let walking = scorer.score(
            &RawTick {
                steps_per_minute: Some(99),
                ..base.clone()
            },
            &baseline,
        );
        let running = scorer.score(
            &RawTick {
                steps_per_minute: Some(100),
                ..base.clone()
            },
            &baseline,
        );

        assert!(approx(walking.stress_index, resting.stress_index));
        assert!(approx(running.stress_index, resting.stress_index * 0.4));
    }

    #[test]
    fn test_index_is_clamped() {
        let config = ScorerConfig {
            weights: ScoreWeights {
                sdnn: 1.0,
                rmssd: 1.0,
                heart_rate: 1.0,
                temperature: 1.0,
                movement: 1.0,
            },
            ..Default::default()
        };
        let scorer = StressScorer::new(config);
        let tick = RawTick {
            heart_rate_bpm: Some(200.0),
            object_temp_c: Some(39.0),
            acceleration: Some(Acceleration::new(30.0, 30.0, 30.0)),
            ..RawTick::new(0)
        };
        let result = scorer.score(&tick, &StaticBaseline(Some(make_baseline())));
        assert_eq!(result.stress_index, 100.0);
        assert_eq!(result.stress_level, 5);
    }

    #[test]
    fn test_zero_std_metric_is_ignored() {
        let mut baseline = make_baseline();
        baseline.heart_rate.std = 0.0;
        let tick = RawTick {
            heart_rate_bpm: Some(120.0),
            ..RawTick::new(0)
        };
        let result = StressScorer::default().score(&tick, &StaticBaseline(Some(baseline)));
        assert_eq!(result.stress_index, 0.0);
    }

    #[test]
    fn test_hrv_polarity() {
        // sdnn 20, rmssd 20 from [780, 800, 820]
        let tick = RawTick {
            ibi_ms: Some(vec![780.0, 800.0, 820.0]),
            ..RawTick::new(0)
        };
        let baseline = StaticBaseline(Some(make_baseline()));

        let direct = StressScorer::default().score(&tick, &baseline);
        // sdnn z = -2.5 → 0, rmssd z = -1 → 0
        assert_eq!(direct.stress_index, 0.0);
        assert!(approx(direct.sdnn.unwrap(), 20.0));

        let inverted = StressScorer::new(ScorerConfig {
            hrv_polarity: HrvPolarity::Inverted,
            ..Default::default()
        })
        .score(&tick, &baseline);
        // (100 - 0) * 0.3 twice
        assert!(approx(inverted.stress_index, 60.0));
        assert_eq!(inverted.stress_level, 3);
    }

    #[test]
    fn test_absent_hrv_is_zero_under_either_polarity() {
        let tick = RawTick {
            ibi_ms: Some(vec![800.0]),
            ..RawTick::new(0)
        };
        let baseline = StaticBaseline(Some(make_baseline()));
        let inverted = StressScorer::new(ScorerConfig {
            hrv_polarity: HrvPolarity::Inverted,
            ..Default::default()
        });
        assert_eq!(inverted.score(&tick, &baseline).stress_index, 0.0);
    }
}
