//! Metric instruments for load-test reporting
//!
//! [`InstrumentRegistry`] owns every named instrument for the lifetime of the
//! process. [`InstrumentSet`] is the fixed set the reporter records into:
//! latency and phase histograms, the client error counter and the runner
//! stats gauge.

pub mod exposition;
pub mod instruments;
pub mod registry;

pub use instruments::{Counter, Gauge, Histogram};
pub use registry::InstrumentRegistry;

use crate::constants::*;
use crate::error::RegistrationConflictError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Histogram => "histogram",
            MetricType::Gauge => "gauge",
        }
    }
}

/// The instruments a reporting cycle records into.
#[derive(Debug, Clone)]
pub struct InstrumentSet {
    pub latency: Histogram,
    pub phase_duration: Histogram,
    pub client_errors: Counter,
    pub runner_stats: Gauge,
}

impl InstrumentSet {
    /// Fetch the set from `registry`, creating any instrument not yet there.
    pub fn obtain(registry: &InstrumentRegistry, buckets: &[f64]) -> Result<Self, RegistrationConflictError> {
        Ok(Self {
            latency: registry.histogram(
                REQUEST_DURATION_SECONDS,
                "Duration of outgoing requests in seconds",
                &[LABEL_PATH, LABEL_STATUS_CODE],
                buckets,
            )?,
            phase_duration: registry.histogram(
                CONNECTION_TIMINGS_SECONDS,
                "Duration of each request phase (dns, connect, firstByte, ...) in seconds",
                &[LABEL_PATH, LABEL_STATUS_CODE, LABEL_PHASE],
                buckets,
            )?,
            client_errors: registry.counter(
                CLIENT_ERRORS,
                "Counter of client errors like TIMEOUT/EAI_AGAIN",
                &[LABEL_ERROR],
            )?,
            runner_stats: registry.gauge(RUNNER_STATS, "runner stats", &[LABEL_FIELD])?,
        })
    }
}
