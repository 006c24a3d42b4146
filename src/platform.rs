//! Host OS seams
//!
//! The supervisor never talks to the operating system directly. Sensor
//! registration, wake locks and deferred restarts all go through these
//! traits so a native host (or a test) can supply its own implementation.

use crate::error::PulseError;
use crate::sensors::{SensorChannel, SensorEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Handle returned by [`SensorPlatform::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Non-blocking sink a platform callback pushes readings into.
///
/// Backed by a bounded channel; when the consumer falls behind, readings are
/// dropped rather than stalling the sensor thread.
#[derive(Debug, Clone)]
pub struct SensorSender {
    channel: SensorChannel,
    tx: mpsc::Sender<SensorEvent>,
    dropped: Arc<AtomicU64>,
}

impl SensorSender {
    pub fn new(channel: SensorChannel, tx: mpsc::Sender<SensorEvent>) -> Self {
        Self {
            channel,
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn channel(&self) -> SensorChannel {
        self.channel
    }

    /// Deliver one reading; returns false if it was dropped
    pub fn send(&self, event: SensorEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(channel = %self.channel, dropped, "sensor queue full, reading dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Readings dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// True once the consuming side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Sensor framework of the host device
pub trait SensorPlatform: Send + Sync {
    /// Channels this device actually has
    fn available_channels(&self) -> Vec<SensorChannel>;

    /// Start delivering readings for `channel` into `sink`
    fn subscribe(
        &self,
        channel: SensorChannel,
        sink: SensorSender,
    ) -> Result<SubscriptionId, PulseError>;

    /// Stop a subscription; unknown ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Time-limited OS wake lock
pub trait WakeLock: Send + Sync {
    /// Acquire (or re-acquire) the lock; it lapses on its own after `timeout`
    fn acquire(&self, timeout: Duration) -> Result<(), PulseError>;

    fn release(&self);

    fn is_held(&self) -> bool;
}

/// Deferred-alarm facility used to bring the process back after teardown
pub trait RestartScheduler: Send + Sync {
    fn schedule_restart(&self, delay: Duration) -> Result<(), PulseError>;
}

/// Wake lock for hosts without power management
#[derive(Debug, Default)]
pub struct NoopWakeLock;

impl WakeLock for NoopWakeLock {
    fn acquire(&self, _timeout: Duration) -> Result<(), PulseError> {
        Ok(())
    }

    fn release(&self) {}

    fn is_held(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorReading;

    #[tokio::test]
    async fn test_sender_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(2);
        let sender = SensorSender::new(SensorChannel::Accelerometer, tx);
        let event = || SensorEvent::new(0, SensorReading::Accelerometer { x: 0.0, y: 0.0, z: 9.8 });

        assert!(sender.send(event()));
        assert!(sender.send(event()));
        assert!(!sender.send(event()));
        assert_eq!(sender.dropped(), 1);

        assert!(rx.recv().await.is_some());
        assert!(sender.send(event()));
    }

    #[tokio::test]
    async fn test_sender_reports_closed() {
        let (tx, rx) = mpsc::channel(1);
        let sender = SensorSender::new(SensorChannel::HeartRate, tx);
        drop(rx);
        assert!(sender.is_closed());
        assert!(!sender.send(SensorEvent::new(0, SensorReading::StepDetected)));
        assert_eq!(sender.dropped(), 0);
    }
}
