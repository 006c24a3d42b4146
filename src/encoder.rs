//! Telemetry encoding
//!
//! Wraps outbound payloads in a small JSON envelope carrying a message id,
//! producer metadata and the send time. The companion only relies on there
//! being one sample per message; everything else is for tracing deliveries.

use crate::error::PulseError;
use crate::types::RepresentativeSample;
use crate::{PRODUCER_NAME, PULSE_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Envelope around one outbound payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEnvelope<T> {
    pub message_id: String,
    pub producer: Producer,
    pub sent_at_utc: String,
    pub path: String,
    pub payload: T,
}

/// Short notice sent alongside an anomalous sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub timestamp_ms: i64,
    pub stress_level: u8,
    pub stress_index: f64,
}

impl From<&RepresentativeSample> for AnomalyAlert {
    fn from(sample: &RepresentativeSample) -> Self {
        Self {
            timestamp_ms: sample.timestamp_ms,
            stress_level: sample.stress_level,
            stress_index: sample.stress_index,
        }
    }
}

/// Produces envelopes stamped with this process's instance id
#[derive(Debug, Clone)]
pub struct TelemetryEncoder {
    instance_id: String,
}

impl Default for TelemetryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryEncoder {
    /// Create an encoder with a fresh instance id
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a fixed instance id
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Wrap a payload for `path`, stamped with the current time
    pub fn encode<T: Serialize>(&self, path: &str, payload: T) -> TelemetryEnvelope<T> {
        self.encode_at(path, payload, Utc::now())
    }

    /// Wrap a payload with an explicit send time
    pub fn encode_at<T: Serialize>(
        &self,
        path: &str,
        payload: T,
        sent_at: DateTime<Utc>,
    ) -> TelemetryEnvelope<T> {
        TelemetryEnvelope {
            message_id: Uuid::new_v4().to_string(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: PULSE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            sent_at_utc: sent_at.to_rfc3339(),
            path: path.to_string(),
            payload,
        }
    }

    /// Encode a payload straight to JSON bytes
    pub fn encode_to_vec<T: Serialize>(
        &self,
        path: &str,
        payload: T,
    ) -> Result<Vec<u8>, PulseError> {
        Ok(serde_json::to_vec(&self.encode(path, payload))?)
    }

    /// Encode a sample to a JSON string
    pub fn encode_sample_to_json(
        &self,
        path: &str,
        sample: &RepresentativeSample,
    ) -> Result<String, PulseError> {
        serde_json::to_string(&self.encode(path, sample)).map_err(PulseError::JsonError)
    }
}
