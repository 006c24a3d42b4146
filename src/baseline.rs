//! Baseline management
//!
//! The scorer reads one active reference record per user. The store keeps
//! every version it has been given, but only one is active at a time.
//! Recalculating baselines is the host's job; this module never computes them.

use crate::error::PulseError;
use crate::types::{BaselineStats, MetricStats};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Read-only source of the active baseline
pub trait BaselineProvider: Send + Sync {
    /// The currently active record, if any.
    ///
    /// `None` is not an error: every z-score is then treated as absent.
    fn active(&self) -> Option<BaselineStats>;
}

impl BaselineStats {
    /// Population defaults used before a personal baseline exists
    pub fn bootstrap() -> Self {
        Self {
            sdnn: MetricStats::new(15.0, 10.0),
            rmssd: MetricStats::new(20.0, 15.0),
            heart_rate: MetricStats::new(95.0, 5.0),
            object_temp: MetricStats::new(36.0, 0.2),
            measurement_count: 0,
            version: 0,
            is_active: true,
        }
    }
}

/// Fixed baseline, handy for hosts that manage persistence themselves
#[derive(Debug, Clone)]
pub struct StaticBaseline(pub Option<BaselineStats>);

impl BaselineProvider for StaticBaseline {
    fn active(&self) -> Option<BaselineStats> {
        self.0.clone().filter(|b| b.is_active)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    records: Vec<BaselineStats>,
    #[serde(default)]
    fallback: Option<BaselineStats>,
}

/// Versioned baseline store
#[derive(Debug, Default)]
pub struct BaselineStore {
    state: RwLock<StoreState>,
}

impl BaselineStore {
    /// Create an empty store (no active baseline)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that answers with [`BaselineStats::bootstrap`] until a
    /// personal record is upserted
    pub fn with_bootstrap() -> Self {
        Self {
            state: RwLock::new(StoreState {
                records: Vec::new(),
                fallback: Some(BaselineStats::bootstrap()),
            }),
        }
    }

    /// Store `stats` as the active record, deactivating any previous one
    pub fn upsert_active(&self, mut stats: BaselineStats) {
        let mut state = self.state.write();

        for record in state.records.iter_mut() {
            record.is_active = false;
        }

        // Versions only move forward
        if let Some(latest) = state.records.iter().map(|r| r.version).max() {
            if stats.version <= latest {
                stats.version = latest + 1;
            }
        }
        stats.is_active = true;

        info!(
            version = stats.version,
            measurements = stats.measurement_count,
            "baseline activated"
        );
        state.records.push(stats);
    }

    /// Number of stored records, active or not
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Load a store from JSON
    pub fn from_json(json: &str) -> Result<Self, PulseError> {
        let state: StoreState =
            serde_json::from_str(json).map_err(|e| PulseError::BaselineParse(e.to_string()))?;
        debug!(records = state.records.len(), "baseline store loaded");
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Serialize the store to JSON
    pub fn to_json(&self) -> Result<String, PulseError> {
        Ok(serde_json::to_string(&*self.state.read())?)
    }
}

impl BaselineProvider for BaselineStore {
    fn active(&self) -> Option<BaselineStats> {
        let state = self.state.read();
        state
            .records
            .iter()
            .rev()
            .find(|r| r.is_active)
            .cloned()
            .or_else(|| state.fallback.clone())
    }
}

/// Parse either a single record or a full store dump into a provider.
///
/// Used by the CLI and FFI, where callers hand over whatever they persisted.
pub fn store_from_json(json: &str) -> Result<BaselineStore, PulseError> {
    if let Ok(stats) = serde_json::from_str::<BaselineStats>(json) {
        let store = BaselineStore::new();
        store.upsert_active(stats);
        return Ok(store);
    }
    BaselineStore::from_json(json)
}
