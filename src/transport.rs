//! Telemetry transport
//!
//! Ships one representative sample per window to every reachable companion
//! node. Delivery is at-most-once: failures are logged and the sample is
//! dropped. [`TransportWorker`] moves the blocking delivery off the tick
//! path onto its own thread.

use crate::encoder::{AnomalyAlert, TelemetryEncoder};
use crate::error::PulseError;
use crate::types::RepresentativeSample;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Delivery endpoint registry of the paired companion device(s)
pub trait CompanionLink: Send + Sync {
    /// Ids of the nodes currently reachable
    fn connected_nodes(&self) -> Result<Vec<String>, PulseError>;

    /// Deliver one payload to one node; `Ok` means the node acknowledged it
    fn deliver(&self, node: &str, path: &str, payload: &[u8]) -> Result<(), PulseError>;
}

/// Transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Path samples are delivered on
    pub data_path: String,
    /// Path anomaly alerts are delivered on
    pub alert_path: String,
    /// Samples the worker may hold before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            data_path: "/pulse/telemetry".to_string(),
            alert_path: "/pulse/anomaly".to_string(),
            queue_capacity: 8,
        }
    }
}

/// Delivery counters
#[derive(Debug, Default)]
pub struct TransportStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl TransportStats {
    /// Samples acknowledged by at least one node
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Samples no node acknowledged
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Samples dropped before a send was attempted
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Best-effort sample sender
pub struct TelemetryTransport {
    link: Arc<dyn CompanionLink>,
    encoder: TelemetryEncoder,
    config: TransportConfig,
    stats: Arc<TransportStats>,
}

impl TelemetryTransport {
    pub fn new(
        link: Arc<dyn CompanionLink>,
        encoder: TelemetryEncoder,
        config: TransportConfig,
    ) -> Self {
        Self {
            link,
            encoder,
            config,
            stats: Arc::new(TransportStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    /// Send one sample; true if at least one node acknowledged it
    pub fn send(&self, sample: &RepresentativeSample) -> bool {
        let nodes = match self.link.connected_nodes() {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "companion discovery failed, sample dropped");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };
        if nodes.is_empty() {
            debug!("no companion connected, sample dropped");
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let payload = match self.encoder.encode_to_vec(&self.config.data_path, sample) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to encode sample");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        let acked = self.deliver_all(&nodes, &self.config.data_path, &payload);
        if acked > 0 {
            self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            info!(
                nodes = nodes.len(),
                acked,
                stress_level = sample.stress_level,
                is_anomaly = sample.is_anomaly,
                "sample delivered"
            );
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(nodes = nodes.len(), "no node acknowledged sample, dropped");
        }

        if sample.is_anomaly {
            self.send_alert(&nodes, AnomalyAlert::from(sample));
        }

        acked > 0
    }

    fn send_alert(&self, nodes: &[String], alert: AnomalyAlert) {
        match self.encoder.encode_to_vec(&self.config.alert_path, alert) {
            Ok(payload) => {
                let acked = self.deliver_all(nodes, &self.config.alert_path, &payload);
                debug!(acked, "anomaly alert sent");
            }
            Err(e) => error!(error = %e, "failed to encode anomaly alert"),
        }
    }

    fn deliver_all(&self, nodes: &[String], path: &str, payload: &[u8]) -> usize {
        nodes
            .iter()
            .filter(|node| match self.link.deliver(node, path, payload) {
                Ok(()) => true,
                Err(e) => {
                    warn!(node = %node, path, error = %e, "delivery failed");
                    false
                }
            })
            .count()
    }
}

/// Runs [`TelemetryTransport::send`] on a dedicated thread
pub struct TransportWorker {
    tx: Option<mpsc::Sender<RepresentativeSample>>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<TransportStats>,
}

impl TransportWorker {
    /// Start the worker thread
    pub fn spawn(transport: TelemetryTransport, capacity: usize) -> Result<Self, PulseError> {
        let (tx, mut rx) = mpsc::channel::<RepresentativeSample>(capacity.max(1));
        let stats = transport.stats();

        let handle = thread::Builder::new()
            .name("pulse-transport".to_string())
            .spawn(move || {
                while let Some(sample) = rx.blocking_recv() {
                    transport.send(&sample);
                }
                debug!("transport worker stopped");
            })
            .map_err(|e| PulseError::ChannelClosed(format!("transport worker: {e}")))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            stats,
        })
    }

    /// Hand a sample to the worker without waiting; false if it was dropped
    pub fn dispatch(&self, sample: RepresentativeSample) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(sample) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("transport queue full, sample dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("transport worker gone, sample dropped");
                false
            }
        }
    }

    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    /// Close the queue and wait for queued samples to be sent
    pub fn shutdown(mut self) {
        self.close();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("transport worker panicked");
            }
        }
    }

    fn close(&mut self) {
        self.tx.take();
    }
}

impl Drop for TransportWorker {
    fn drop(&mut self) {
        // The thread exits on its own once the queue drains
        self.close();
    }
}
