//! Result batches emitted by the load-test runner
//!
//! Two wire shapes exist: the legacy one (`_entries`, `_errors`,
//! `_pendingRequests`, `_scenariosAvoided`) and the current one (`latencies`,
//! `errors`, `pendingRequests`, `scenariosAvoided`). Both deserialize through
//! [`WireReport`] and are normalized into a single [`TestReport`].

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::constants::NANOS_PER_SECOND;
use crate::error::ReportError;

// Positions inside a wire record array
const TIMESTAMP: usize = 0;
const REQUEST_ID: usize = 1;
const LATENCY: usize = 2;
const STATUS_CODE: usize = 3;
const PATH: usize = 4;
const TIMINGS: usize = 5;

/// One measured request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub timestamp: Option<i64>,
    pub request_id: Option<String>,
    pub latency_nanos: f64,
    pub status_code: String,
    pub path: String,
    /// Phase name (dns, connect, firstByte, ...) to duration in nanoseconds.
    pub timings_by_phase: Option<BTreeMap<String, f64>>,
}

impl ResultRecord {
    pub fn new(latency_nanos: f64, status_code: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            request_id: None,
            latency_nanos,
            status_code: status_code.into(),
            path: path.into(),
            timings_by_phase: None,
        }
    }

    pub fn with_phase(mut self, phase: impl Into<String>, nanos: f64) -> Self {
        self.timings_by_phase
            .get_or_insert_with(BTreeMap::new)
            .insert(phase.into(), nanos);
        self
    }

    pub fn latency_seconds(&self) -> f64 {
        self.latency_nanos / NANOS_PER_SECOND
    }

    /// Parse `[timestamp, requestId, latencyNanos, statusCode, path, timings?]`.
    /// Returns `None` when the entry is not a usable record.
    pub fn from_wire(entry: &Value) -> Option<Self> {
        let fields = entry.as_array()?;
        if fields.len() <= PATH {
            return None;
        }
        let latency_nanos = fields[LATENCY].as_f64()?;

        let timings_by_phase = fields.get(TIMINGS).and_then(Value::as_object).map(|phases| {
            phases
                .iter()
                .filter_map(|(phase, v)| v.as_f64().map(|nanos| (phase.clone(), nanos)))
                .collect::<BTreeMap<_, _>>()
        });

        Some(Self {
            timestamp: fields[TIMESTAMP]
                .as_i64()
                .or_else(|| fields[TIMESTAMP].as_f64().map(|t| t as i64)),
            request_id: label_text(&fields[REQUEST_ID]),
            latency_nanos,
            status_code: label_text(&fields[STATUS_CODE]).unwrap_or_default(),
            path: label_text(&fields[PATH]).unwrap_or_default(),
            timings_by_phase,
        })
    }
}

/// A normalized result batch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "WireReport")]
pub struct TestReport {
    pub latencies: Vec<ResultRecord>,
    /// Entry key to error kind (e.g. `TIMEOUT`, `EAI_AGAIN`).
    pub errors: BTreeMap<String, String>,
    pub pending_requests: f64,
    pub scenarios_avoided: f64,
}

impl TestReport {
    pub fn from_value(value: Value) -> Result<Self, ReportError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn is_empty(&self) -> bool {
        self.latencies.is_empty() && self.errors.is_empty()
    }
}

/// Fields shared by both wire shapes. Legacy spellings win when both appear.
#[derive(Debug, Default, Deserialize)]
struct WireSummary {
    #[serde(rename = "_errors", default)]
    legacy_errors: Option<Map<String, Value>>,
    #[serde(default)]
    errors: Option<Map<String, Value>>,
    #[serde(rename = "_pendingRequests", default)]
    legacy_pending_requests: Option<f64>,
    #[serde(rename = "pendingRequests", default)]
    pending_requests: Option<f64>,
    #[serde(rename = "_scenariosAvoided", default)]
    legacy_scenarios_avoided: Option<f64>,
    #[serde(rename = "scenariosAvoided", default)]
    scenarios_avoided: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireReport {
    Legacy {
        #[serde(rename = "_entries")]
        entries: Vec<Value>,
        #[serde(flatten)]
        summary: WireSummary,
    },
    Current {
        #[serde(default)]
        latencies: Option<Vec<Value>>,
        #[serde(flatten)]
        summary: WireSummary,
    },
}

impl From<WireReport> for TestReport {
    fn from(wire: WireReport) -> Self {
        let (entries, summary) = match wire {
            WireReport::Legacy { entries, summary } => (entries, summary),
            WireReport::Current { latencies, summary } => (latencies.unwrap_or_default(), summary),
        };

        let latencies = entries
            .iter()
            .filter_map(|entry| {
                let record = ResultRecord::from_wire(entry);
                if record.is_none() {
                    warn!("skipping malformed result record: {}", entry);
                }
                record
            })
            .collect();

        let errors = summary
            .legacy_errors
            .or(summary.errors)
            .map(|errors| {
                errors
                    .into_iter()
                    .map(|(key, value)| {
                        let kind = match value {
                            Value::String(kind) => kind,
                            _ => key.clone(),
                        };
                        (key, kind)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            latencies,
            errors,
            pending_requests: summary
                .legacy_pending_requests
                .or(summary.pending_requests)
                .unwrap_or_default(),
            scenarios_avoided: summary
                .legacy_scenarios_avoided
                .or(summary.scenarios_avoided)
                .unwrap_or_default(),
        }
    }
}

fn label_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
