//! Get-or-create registry for the plugin's named instruments
//!
//! Instruments are keyed by name. Asking for a name that already exists hands
//! back the original instrument, so initializing the reporter twice in one
//! process never double-registers anything. Each instrument owns its own
//! Prometheus recorder because bucket layouts are fixed when a recorder is
//! built.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use metrics::{Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use tracing::{debug, info, warn};

use super::instruments::{Counter, Gauge, Histogram};
use super::MetricType;
use crate::constants::DEFAULT_BUCKETS;
use crate::error::RegistrationConflictError;

const METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// Labels merged into every observation, shared with all handles.
pub(crate) type DefaultLabels = Arc<RwLock<Vec<(String, String)>>>;

/// One registered instrument and the recorder holding its series.
pub(crate) struct Registered {
    pub(crate) name: String,
    pub(crate) kind: MetricType,
    label_names: Vec<String>,
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl Registered {
    fn new(kind: MetricType, name: &str, help: &str, label_names: &[&str], buckets: Option<&[f64]>) -> Self {
        let builder = match kind {
            MetricType::Histogram => {
                let buckets = buckets.filter(|b| !b.is_empty()).unwrap_or(&DEFAULT_BUCKETS[..]);
                PrometheusBuilder::new().set_buckets(buckets).unwrap_or_else(|e| {
                    warn!("invalid buckets for '{}', using exporter defaults: {}", name, e);
                    PrometheusBuilder::new()
                })
            }
            MetricType::Counter | MetricType::Gauge => PrometheusBuilder::new(),
        };

        let recorder = builder.build_recorder();
        let handle = recorder.handle();
        let key_name = name.to_string();
        let description = help.to_string();
        match kind {
            MetricType::Histogram => recorder.describe_histogram(key_name.into(), None, description.into()),
            MetricType::Counter => recorder.describe_counter(key_name.into(), None, description.into()),
            MetricType::Gauge => recorder.describe_gauge(key_name.into(), None, description.into()),
        }

        Self {
            name: name.to_string(),
            kind,
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
            recorder,
            handle,
        }
    }

    /// Build the series key: default labels first, then the instrument's own
    /// labels. Labels the instrument did not declare are dropped.
    fn key(&self, defaults: &DefaultLabels, labels: &[(&str, &str)]) -> Key {
        let defaults = defaults.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<Label> = defaults
            .iter()
            .filter(|(k, _)| !self.label_names.iter().any(|own| own == k))
            .map(|(k, v)| Label::new(k.clone(), v.clone()))
            .collect();

        for (k, v) in labels {
            if self.label_names.iter().any(|own| own == k) {
                all.push(Label::new(k.to_string(), v.to_string()));
            } else {
                warn!("dropping undeclared label '{}' on metric '{}'", k, self.name);
            }
        }

        Key::from_parts(self.name.clone(), all)
    }

    pub(crate) fn record_histogram(&self, defaults: &DefaultLabels, labels: &[(&str, &str)], value: f64) {
        let key = self.key(defaults, labels);
        self.recorder.register_histogram(&key, &METADATA).record(value);
    }

    pub(crate) fn increment_counter(&self, defaults: &DefaultLabels, labels: &[(&str, &str)], by: u64) {
        let key = self.key(defaults, labels);
        self.recorder.register_counter(&key, &METADATA).increment(by);
    }

    pub(crate) fn set_gauge(&self, defaults: &DefaultLabels, labels: &[(&str, &str)], value: f64) {
        let key = self.key(defaults, labels);
        self.recorder.register_gauge(&key, &METADATA).set(value);
    }
}

#[derive(Default)]
struct Instruments {
    by_name: HashMap<String, Arc<Registered>>,
    order: Vec<Arc<Registered>>,
}

/// Process-wide instrument store, constructed once and passed by reference.
#[derive(Default)]
pub struct InstrumentRegistry {
    instruments: Mutex<Instruments>,
    default_labels: DefaultLabels,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the instrument registered under `name`, creating it on first use.
    ///
    /// The first registration's help text and buckets win. Asking for an
    /// existing name with a different kind is a conflict.
    pub(crate) fn get_or_create(
        &self,
        kind: MetricType,
        name: &str,
        help: &str,
        label_names: &[&str],
        buckets: Option<&[f64]>,
    ) -> Result<Arc<Registered>, RegistrationConflictError> {
        let mut instruments = self.instruments.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = instruments.by_name.get(name) {
            if existing.kind != kind {
                return Err(RegistrationConflictError {
                    name: name.to_string(),
                    existing: existing.kind.as_str(),
                    requested: kind.as_str(),
                });
            }
            debug!("reusing registered {} '{}'", kind.as_str(), name);
            return Ok(Arc::clone(existing));
        }

        let registered = Arc::new(Registered::new(kind, name, help, label_names, buckets));
        instruments.by_name.insert(name.to_string(), Arc::clone(&registered));
        instruments.order.push(Arc::clone(&registered));
        info!("registered {} '{}'", kind.as_str(), name);
        Ok(registered)
    }

    pub fn histogram(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
        buckets: &[f64],
    ) -> Result<Histogram, RegistrationConflictError> {
        let inner = self.get_or_create(MetricType::Histogram, name, help, label_names, Some(buckets))?;
        Ok(Histogram::new(inner, Arc::clone(&self.default_labels)))
    }

    pub fn counter(&self, name: &str, help: &str, label_names: &[&str]) -> Result<Counter, RegistrationConflictError> {
        let inner = self.get_or_create(MetricType::Counter, name, help, label_names, None)?;
        Ok(Counter::new(inner, Arc::clone(&self.default_labels)))
    }

    pub fn gauge(&self, name: &str, help: &str, label_names: &[&str]) -> Result<Gauge, RegistrationConflictError> {
        let inner = self.get_or_create(MetricType::Gauge, name, help, label_names, None)?;
        Ok(Gauge::new(inner, Arc::clone(&self.default_labels)))
    }

    /// Replace the labels merged into every subsequent observation.
    pub fn set_default_labels(&self, labels: Vec<(String, String)>) {
        let mut defaults = self.default_labels.write().unwrap_or_else(PoisonError::into_inner);
        *defaults = labels;
    }

    pub fn default_labels(&self) -> Vec<(String, String)> {
        self.default_labels.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instruments.lock().unwrap_or_else(PoisonError::into_inner).by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.instruments.lock().unwrap_or_else(PoisonError::into_inner).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prometheus text exposition of every instrument, in registration order.
    pub fn render(&self) -> String {
        let instruments = self.instruments.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();
        for registered in &instruments.order {
            let text = registered.handle.render();
            out.push_str(&text);
            if !text.is_empty() && !text.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    /// Read one sample back from the current exposition. `labels` only needs
    /// to be a subset of the series' labels.
    ///
    /// Introspection aid for tests and debugging; reporting never reads back.
    pub fn sample(&self, series: &str, labels: &[(&str, &str)]) -> Option<f64> {
        super::exposition::find_sample(&self.render(), series, labels)
    }
}
