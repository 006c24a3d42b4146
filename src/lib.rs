//! pulse-relay - on-wrist stress telemetry
//!
//! Turns noisy, intermittently missing physiological sensor readings into one
//! compact, anomaly-flagged sample per window for a paired companion device:
//! sanitize → HRV → stress score (against a baseline) → window aggregate →
//! encode → transport.
//!
//! ## Modules
//!
//! - **Pipeline**: [`TelemetryPipeline`] runs the per-tick stages
//! - **Gesture**: [`GestureTrigger`] recognizes a deliberate wrist shake
//! - **Supervisor**: [`Supervisor`] owns subscriptions, wake lock, tick timer
//!   and self-restart on a tokio runtime

pub mod aggregator;
pub mod baseline;
pub mod config;
pub mod encoder;
pub mod error;
pub mod gesture;
pub mod hrv;
pub mod pipeline;
pub mod platform;
pub mod sanitizer;
pub mod scorer;
pub mod sensors;
pub mod supervisor;
pub mod transport;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use aggregator::{WindowAggregator, WindowConfig};
pub use baseline::{BaselineProvider, BaselineStore, StaticBaseline};
pub use config::PulseConfig;
pub use encoder::TelemetryEncoder;
pub use error::PulseError;
pub use gesture::{GestureConfig, GestureDetector, GestureTrigger};
pub use pipeline::{ticks_json_to_samples, ticks_to_samples, TelemetryPipeline};
pub use scorer::{HrvPolarity, ScorerConfig, StressScorer};
pub use supervisor::{HostServices, Supervisor, SupervisorConfig};
pub use transport::{CompanionLink, TelemetryTransport, TransportWorker};
pub use types::{BaselineStats, RawTick, RepresentativeSample, StressResult};

/// Library version embedded in every telemetry envelope
pub const PULSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for telemetry envelopes
pub const PRODUCER_NAME: &str = "pulse-relay";
