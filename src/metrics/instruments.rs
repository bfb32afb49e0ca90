//! Typed handles over registered instruments.
//!
//! Handles are cheap to clone and safe to share; every observation goes
//! through the atomic storage of the underlying recorder.

use std::fmt;
use std::sync::Arc;

use super::registry::{DefaultLabels, Registered};

#[derive(Clone)]
pub struct Histogram {
    inner: Arc<Registered>,
    defaults: DefaultLabels,
}

impl Histogram {
    pub(crate) fn new(inner: Arc<Registered>, defaults: DefaultLabels) -> Self {
        Self { inner, defaults }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn observe(&self, value: f64, labels: &[(&str, &str)]) {
        self.inner.record_histogram(&self.defaults, labels, value);
    }
}

#[derive(Clone)]
pub struct Counter {
    inner: Arc<Registered>,
    defaults: DefaultLabels,
}

impl Counter {
    pub(crate) fn new(inner: Arc<Registered>, defaults: DefaultLabels) -> Self {
        Self { inner, defaults }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn increment(&self, labels: &[(&str, &str)]) {
        self.inner.increment_counter(&self.defaults, labels, 1);
    }
}

#[derive(Clone)]
pub struct Gauge {
    inner: Arc<Registered>,
    defaults: DefaultLabels,
}

impl Gauge {
    pub(crate) fn new(inner: Arc<Registered>, defaults: DefaultLabels) -> Self {
        Self { inner, defaults }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn set(&self, value: f64, labels: &[(&str, &str)]) {
        self.inner.set_gauge(&self.defaults, labels, value);
    }
}

impl PartialEq for Histogram {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Counter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Gauge {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Histogram").field(&self.name()).finish()
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Counter").field(&self.name()).finish()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Gauge").field(&self.name()).finish()
    }
}
