//! Pipeline orchestration
//!
//! Runs each tick through the stages in order:
//! 1. Sanitizer - drop impossible readings
//! 2. HRV estimator - SDNN / RMSSD from the tick's intervals
//! 3. StressScorer - index and level against the active baseline
//! 4. WindowAggregator - one representative sample per full window

use crate::aggregator::WindowAggregator;
use crate::baseline::{store_from_json, BaselineProvider, BaselineStore};
use crate::config::PulseConfig;
use crate::error::PulseError;
use crate::hrv::HrvMetrics;
use crate::sanitizer::Sanitizer;
use crate::scorer::StressScorer;
use crate::types::{RawTick, RepresentativeSample, ScoredTick};
use std::sync::Arc;
use tracing::debug;

/// Stateful per-tick pipeline.
///
/// Takes `&self` everywhere, so one instance can be shared between the tick
/// task and anything that needs to flush it at shutdown.
pub struct TelemetryPipeline {
    baseline: Arc<dyn BaselineProvider>,
    scorer: StressScorer,
    aggregator: WindowAggregator,
}

impl TelemetryPipeline {
    pub fn new(
        baseline: Arc<dyn BaselineProvider>,
        scorer: StressScorer,
        aggregator: WindowAggregator,
    ) -> Self {
        Self {
            baseline,
            scorer,
            aggregator,
        }
    }

    /// Build the scorer and aggregator from a config
    pub fn from_config(config: &PulseConfig, baseline: Arc<dyn BaselineProvider>) -> Self {
        Self::new(
            baseline,
            StressScorer::new(config.scorer),
            WindowAggregator::new(config.window),
        )
    }

    /// Build a pipeline whose baseline comes from JSON (a single record or a
    /// store dump); `None` means no baseline
    pub fn from_baseline_json(
        config: &PulseConfig,
        baseline_json: Option<&str>,
    ) -> Result<Self, PulseError> {
        let store = match baseline_json {
            Some(json) => store_from_json(json)?,
            None => BaselineStore::new(),
        };
        Ok(Self::from_config(config, Arc::new(store)))
    }

    /// Sanitize and score one tick without queueing it
    pub fn score_tick(&self, tick: RawTick) -> ScoredTick {
        let tick = Sanitizer::sanitize(tick);
        let hrv = HrvMetrics::from_ibi(tick.ibi_ms.as_deref());
        let baseline = self.baseline.active();
        let result = self.scorer.score_with(&tick, hrv, baseline.as_ref());
        ScoredTick { tick, result }
    }

    /// Run one tick through every stage; returns a sample when a window completes
    pub fn process_tick(&self, tick: RawTick) -> Option<RepresentativeSample> {
        let scored = self.score_tick(tick);
        debug!(
            timestamp_ms = scored.tick.timestamp_ms,
            stress_index = scored.result.stress_index,
            stress_level = scored.result.stress_level,
            "tick processed"
        );
        self.aggregator.push(scored)
    }

    /// Ticks waiting in the current window
    pub fn pending(&self) -> usize {
        self.aggregator.pending()
    }

    /// Drop the partial window
    pub fn discard_partial(&self) -> usize {
        self.aggregator.discard_partial()
    }

    pub fn baseline(&self) -> Arc<dyn BaselineProvider> {
        Arc::clone(&self.baseline)
    }
}

/// Run a batch of ticks through a fresh pipeline.
///
/// A trailing partial window produces nothing.
pub fn ticks_to_samples(
    ticks: impl IntoIterator<Item = RawTick>,
    baseline: Arc<dyn BaselineProvider>,
    config: &PulseConfig,
) -> Vec<RepresentativeSample> {
    let pipeline = TelemetryPipeline::from_config(config, baseline);
    let samples: Vec<_> = ticks
        .into_iter()
        .filter_map(|tick| pipeline.process_tick(tick))
        .collect();
    pipeline.discard_partial();
    samples
}

/// Convert a JSON array of ticks into sample JSON strings.
///
/// # Example
/// ```ignore
/// let samples = ticks_json_to_samples(ticks_json, Some(baseline_json))?;
/// ```
pub fn ticks_json_to_samples(
    ticks_json: &str,
    baseline_json: Option<&str>,
) -> Result<Vec<String>, PulseError> {
    let ticks: Vec<RawTick> = serde_json::from_str(ticks_json)?;
    let pipeline = TelemetryPipeline::from_baseline_json(&PulseConfig::default(), baseline_json)?;

    ticks
        .into_iter()
        .filter_map(|tick| pipeline.process_tick(tick))
        .map(|sample| serde_json::to_string(&sample).map_err(PulseError::from))
        .collect()
}
