//! Error types for pulse-relay
//!
//! Only boundary operations (parsing, host services, delivery) are fallible.
//! Scoring and aggregation are total and never produce these.

use thiserror::Error;

/// Errors raised at the crate's external boundaries
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse baseline: {0}")]
    BaselineParse(String),

    #[error("Companion discovery failed: {0}")]
    Discovery(String),

    #[error("Delivery to node {node} failed: {reason}")]
    Delivery { node: String, reason: String },

    #[error("Sensor channel unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Sensor subscription failed for {channel}: {reason}")]
    Subscription { channel: String, reason: String },

    #[error("Wake lock error: {0}")]
    WakeLock(String),

    #[error("Restart scheduling failed: {0}")]
    RestartSchedule(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("No tokio runtime available: {0}")]
    RuntimeUnavailable(String),
}
