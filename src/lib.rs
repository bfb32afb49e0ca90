//! Ships load-test result batches to a Prometheus Pushgateway.
//!
//! The runner fires a "stats" event per result batch; [`PrometheusReporter`]
//! turns each batch into histogram, counter and gauge observations and pushes
//! the current state to the gateway, best effort.

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod notifier;
pub mod push;
pub mod report;
pub mod reporter;
pub mod sampler;
pub mod translate;

pub use config::{Configuration, LabelNames};
pub use error::{ConfigurationError, Error, PushError, RegistrationConflictError, Result, SamplingError};
pub use metrics::{InstrumentRegistry, InstrumentSet};
pub use notifier::{EventEmitter, StatsListener, StatsNotifier};
pub use push::{GatewayPusher, HttpPushTransport, PushTarget, PushTransport};
pub use report::{ResultRecord, TestReport};
pub use reporter::{Collaborators, PrometheusReporter, ReportCycle};
pub use sampler::{ResourceSampler, ResourceUsage, SysinfoSampler};
