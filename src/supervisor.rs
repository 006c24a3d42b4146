//! Lifecycle supervision
//!
//! The supervisor is the only component aware of process semantics. It owns
//! the sensor subscriptions, a periodically renewed wake lock, the 1 Hz tick
//! that drives the pipeline, the gesture task, and the restart that is
//! scheduled every time it stops.

use crate::baseline::BaselineProvider;
use crate::config::PulseConfig;
use crate::encoder::TelemetryEncoder;
use crate::error::PulseError;
use crate::gesture::{GestureTrigger, TriggerCallback};
use crate::pipeline::TelemetryPipeline;
use crate::platform::{RestartScheduler, SensorPlatform, SensorSender, SubscriptionId, WakeLock};
use crate::sensors::{SensorCache, SensorChannel, SensorEvent, SensorReading};
use crate::transport::{CompanionLink, TelemetryTransport, TransportWorker};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Channels whose readings feed the scoring pipeline
const PIPELINE_CHANNELS: [SensorChannel; 5] = [
    SensorChannel::HeartRate,
    SensorChannel::SkinTemperature,
    SensorChannel::Accelerometer,
    SensorChannel::StepCounter,
    SensorChannel::StepDetector,
];

/// Supervisor timings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub tick_interval_ms: u64,
    /// Wake lock lifetime per acquisition
    pub wake_lock_timeout_ms: u64,
    /// Re-acquire period; must be shorter than the timeout
    pub wake_lock_renew_ms: u64,
    pub heartbeat_ms: u64,
    /// Delay before the OS restarts the process after a stop
    pub restart_delay_ms: u64,
    /// Per-channel queue depth between callbacks and the tick task
    pub sensor_queue_capacity: usize,
    /// Age after which a cached sensor reading counts as absent
    pub sensor_max_age_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            wake_lock_timeout_ms: 30_000,
            wake_lock_renew_ms: 25_000,
            heartbeat_ms: 30_000,
            restart_delay_ms: 3_000,
            sensor_queue_capacity: 64,
            sensor_max_age_ms: 10_000,
        }
    }
}

/// Host OS services the supervisor drives
#[derive(Clone)]
pub struct HostServices {
    pub sensors: Arc<dyn SensorPlatform>,
    pub wake_lock: Arc<dyn WakeLock>,
    pub restarter: Arc<dyn RestartScheduler>,
}

/// Stop flag shared with the background tasks.
///
/// Each unit of task work runs while holding the lock, so once [`close`]
/// returns no tick or renewal is in flight and none will start.
///
/// [`close`]: RunGate::close
#[derive(Debug, Default)]
struct RunGate {
    closed: Mutex<bool>,
}

impl RunGate {
    /// Run `work` unless the gate is closed
    fn run<T>(&self, work: impl FnOnce() -> T) -> Option<T> {
        let closed = self.closed.lock();
        if *closed {
            return None;
        }
        Some(work())
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Close the gate, waiting for in-flight work to finish
    fn close(&self) {
        *self.closed.lock() = true;
    }
}

/// Background service owner
pub struct Supervisor {
    config: SupervisorConfig,
    host: HostServices,
    pipeline: Arc<TelemetryPipeline>,
    gesture: GestureTrigger,
    transport: Arc<TransportWorker>,
    subscriptions: Vec<SubscriptionId>,
    tasks: Vec<JoinHandle<()>>,
    gate: Arc<RunGate>,
    running: bool,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        host: HostServices,
        pipeline: Arc<TelemetryPipeline>,
        gesture: GestureTrigger,
        transport: Arc<TransportWorker>,
    ) -> Self {
        Self {
            config,
            host,
            pipeline,
            gesture,
            transport,
            subscriptions: Vec::new(),
            tasks: Vec::new(),
            gate: Arc::new(RunGate::default()),
            running: false,
        }
    }

    /// Wire every component from one config
    pub fn from_config(
        config: &PulseConfig,
        host: HostServices,
        baseline: Arc<dyn BaselineProvider>,
        link: Arc<dyn CompanionLink>,
        on_gesture: TriggerCallback,
    ) -> Result<Self, PulseError> {
        config.validate()?;
        let transport =
            TelemetryTransport::new(link, TelemetryEncoder::new(), config.transport.clone());
        let worker = TransportWorker::spawn(transport, config.transport.queue_capacity)?;

        Ok(Self::new(
            config.supervisor,
            host,
            Arc::new(TelemetryPipeline::from_config(config, baseline)),
            GestureTrigger::new(config.gesture, on_gesture),
            Arc::new(worker),
        ))
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Active sensor subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn pipeline(&self) -> Arc<TelemetryPipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Start everything on the current tokio runtime.
    ///
    /// Individual sensor or wake lock failures are logged and do not abort
    /// the start; only a missing runtime is an error.
    pub fn start(&mut self) -> Result<(), PulseError> {
        if self.running {
            debug!("supervisor already running");
            return Ok(());
        }
        let runtime =
            Handle::try_current().map_err(|e| PulseError::RuntimeUnavailable(e.to_string()))?;
        self.gate = Arc::new(RunGate::default());

        let lock_timeout = Duration::from_millis(self.config.wake_lock_timeout_ms);
        if let Err(e) = self.host.wake_lock.acquire(lock_timeout) {
            warn!(error = %e, "wake lock not acquired");
        }

        let available = self.host.sensors.available_channels();
        info!(channels = available.len(), "starting supervisor");

        let mut pipeline_rx = Vec::new();
        for channel in PIPELINE_CHANNELS {
            let (tx, rx) = mpsc::channel(self.config.sensor_queue_capacity);
            if self.subscribe(&available, channel, tx) {
                pipeline_rx.push(rx);
            }
        }

        let (gesture_tx, gesture_rx) = mpsc::channel(self.config.sensor_queue_capacity);
        let mut gesture_channels = vec![SensorChannel::Accelerometer];
        if self.gesture.config().use_gyro_assist {
            gesture_channels.push(SensorChannel::Gyroscope);
        }
        for channel in gesture_channels {
            self.subscribe(&available, channel, gesture_tx.clone());
        }
        drop(gesture_tx);

        self.tasks.push(runtime.spawn(gesture_loop(
            self.gesture.clone(),
            gesture_rx,
            Arc::clone(&self.gate),
        )));
        self.tasks.push(runtime.spawn(tick_loop(
            Duration::from_millis(self.config.tick_interval_ms),
            SensorCache::with_max_age(
                i64::try_from(self.config.sensor_max_age_ms).unwrap_or(i64::MAX),
            ),
            pipeline_rx,
            Arc::clone(&self.pipeline),
            Arc::clone(&self.transport),
            Arc::clone(&self.gate),
        )));
        self.tasks.push(runtime.spawn(wake_lock_loop(
            Arc::clone(&self.host.wake_lock),
            Duration::from_millis(self.config.wake_lock_renew_ms),
            lock_timeout,
            Arc::clone(&self.gate),
        )));
        self.tasks.push(runtime.spawn(heartbeat_loop(
            Duration::from_millis(self.config.heartbeat_ms),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.transport),
        )));

        self.running = true;
        info!(
            subscriptions = self.subscriptions.len(),
            "supervisor started"
        );
        Ok(())
    }

    fn subscribe(
        &mut self,
        available: &[SensorChannel],
        channel: SensorChannel,
        tx: mpsc::Sender<SensorEvent>,
    ) -> bool {
        if !available.contains(&channel) {
            info!(%channel, "sensor channel not available on this device");
            return false;
        }
        match self
            .host
            .sensors
            .subscribe(channel, SensorSender::new(channel, tx))
        {
            Ok(id) => {
                debug!(%channel, id = id.0, "subscribed");
                self.subscriptions.push(id);
                true
            }
            Err(e) => {
                warn!(%channel, error = %e, "sensor subscription failed");
                false
            }
        }
    }

    /// Tear everything down and schedule a restart.
    ///
    /// Cleanup runs only once; the restart is scheduled on every call. Blocks
    /// until an in-flight tick or wake lock renewal has finished, so nothing
    /// from this run touches the pipeline or the lock afterwards.
    pub fn stop(&mut self) {
        if self.running {
            info!("stopping supervisor");

            for id in self.subscriptions.drain(..) {
                self.host.sensors.unsubscribe(id);
            }
            self.gate.close();
            for task in self.tasks.drain(..) {
                task.abort();
            }
            self.pipeline.discard_partial();
            if self.host.wake_lock.is_held() {
                self.host.wake_lock.release();
            }
            self.running = false;
        }

        let delay = Duration::from_millis(self.config.restart_delay_ms);
        match self.host.restarter.schedule_restart(delay) {
            Ok(()) => info!(delay_ms = self.config.restart_delay_ms, "restart scheduled"),
            Err(e) => error!(error = %e, "failed to schedule restart"),
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.running {
            self.stop();
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

async fn gesture_loop(
    gesture: GestureTrigger,
    mut rx: mpsc::Receiver<SensorEvent>,
    gate: Arc<RunGate>,
) {
    while let Some(event) = rx.recv().await {
        // The trigger callback runs outside the gate so it may stop the supervisor
        if gate.is_closed() {
            break;
        }
        match event.reading {
            SensorReading::Accelerometer { x, y, z } => {
                gesture.on_accelerometer(event.timestamp_ms, x, y, z);
            }
            SensorReading::Gyroscope { x, y, z } => {
                gesture.on_gyroscope(event.timestamp_ms, x, y, z);
            }
            _ => {}
        }
    }
    debug!("gesture input closed");
}

async fn tick_loop(
    period: Duration,
    mut cache: SensorCache,
    mut receivers: Vec<mpsc::Receiver<SensorEvent>>,
    pipeline: Arc<TelemetryPipeline>,
    transport: Arc<TransportWorker>,
    gate: Arc<RunGate>,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        for rx in receivers.iter_mut() {
            while let Ok(event) = rx.try_recv() {
                cache.apply(&event);
            }
        }

        let tick = cache.snapshot(now_ms());
        if tick.is_empty() {
            trace!("no sensor data yet, tick skipped");
            continue;
        }
        match gate.run(|| pipeline.process_tick(tick)) {
            Some(Some(sample)) => {
                transport.dispatch(sample);
            }
            Some(None) => {}
            None => break,
        }
    }
}

async fn wake_lock_loop(
    lock: Arc<dyn WakeLock>,
    every: Duration,
    timeout: Duration,
    gate: Arc<RunGate>,
) {
    let mut interval = time::interval_at(time::Instant::now() + every, every);
    loop {
        interval.tick().await;
        match gate.run(|| lock.acquire(timeout)) {
            Some(Ok(())) => trace!("wake lock renewed"),
            Some(Err(e)) => warn!(error = %e, "wake lock renewal failed"),
            None => break,
        }
    }
}

async fn heartbeat_loop(
    every: Duration,
    pipeline: Arc<TelemetryPipeline>,
    transport: Arc<TransportWorker>,
) {
    let mut interval = time::interval_at(time::Instant::now() + every, every);
    loop {
        interval.tick().await;
        let stats = transport.stats();
        info!(
            pending_ticks = pipeline.pending(),
            delivered = stats.delivered(),
            failed = stats.failed(),
            dropped = stats.dropped(),
            "supervisor heartbeat"
        );
    }
}
