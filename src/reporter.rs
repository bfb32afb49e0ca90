//! Reporting orchestrator: the plugin's entry point
//!
//! [`PrometheusReporter::initialize`] resolves the configuration, obtains the
//! instrument set, points a [`GatewayPusher`] at the configured gateway and
//! subscribes to the runner's "stats" notification. Each notification runs
//! one [`ReportCycle`]:
//!
//! 1. translate the batch and push;
//! 2. in the background, sample process resources, update `runnerStats` and
//!    push again. A failed sample skips this step only.
//!
//! Runner-stats updates are applied in the order the batches were received.
//! A sample that completes after a newer batch's update has been applied is
//! discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::{Configuration, LabelNames};
use crate::constants::LABEL_FIELD;
use crate::error::Result;
use crate::metrics::{Gauge, InstrumentRegistry, InstrumentSet};
use crate::notifier::StatsNotifier;
use crate::push::{GatewayPusher, HttpPushTransport, PushTarget, PushTransport};
use crate::report::TestReport;
use crate::sampler::{ResourceSampler, ResourceUsage, SysinfoSampler};
use crate::translate::translate;

/// External collaborators the reporter is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<InstrumentRegistry>,
    pub transport: Arc<dyn PushTransport>,
    pub sampler: Arc<dyn ResourceSampler>,
    /// Process whose resources are reported in `runnerStats`.
    pub pid: u32,
}

impl Collaborators {
    /// HTTP transport, `sysinfo` sampler, current process.
    pub fn new(registry: Arc<InstrumentRegistry>) -> Self {
        Self {
            registry,
            transport: Arc::new(HttpPushTransport::new()),
            sampler: Arc::new(SysinfoSampler::new()),
            pid: std::process::id(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn PushTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }
}

/// Background work started by one reporting cycle. Dropping it detaches the
/// tasks; awaiting [`ReportCycle::finished`] waits for both.
pub struct ReportCycle {
    pub report_push: JoinHandle<()>,
    pub runner_stats: JoinHandle<()>,
}

impl ReportCycle {
    pub async fn finished(self) {
        if let Err(e) = self.report_push.await {
            warn!("report push task failed: {}", e);
        }
        if let Err(e) = self.runner_stats.await {
            warn!("runner stats task failed: {}", e);
        }
    }
}

/// Everything a background runner-stats update needs.
#[derive(Clone)]
struct RunnerStats {
    sampler: Arc<dyn ResourceSampler>,
    pid: u32,
    gauge: Gauge,
    label_names: LabelNames,
    pusher: GatewayPusher,
    /// Sequence number of the newest batch whose update has been applied.
    applied: Arc<Mutex<u64>>,
}

impl RunnerStats {
    async fn record(self, seq: u64, report: TestReport) {
        let usage = match self.sampler.sample(self.pid).await {
            Ok(usage) => usage,
            Err(e) => {
                warn!("skipping runner stats update: {}", e);
                return;
            }
        };

        // Set and snapshot under the lock; older batches lose to newer ones.
        let push = {
            let mut applied = self.applied.lock().unwrap_or_else(PoisonError::into_inner);
            if seq < *applied {
                debug!(seq, applied = *applied, "discarding stale runner stats sample");
                return;
            }
            *applied = seq;
            set_runner_stats(&self.gauge, &self.label_names, usage, &report);
            self.pusher.push()
        };

        if let Err(e) = push.await {
            warn!("runner stats push task failed: {}", e);
        }
    }
}

pub struct PrometheusReporter {
    config: Configuration,
    instruments: InstrumentSet,
    pusher: GatewayPusher,
    runner_stats: RunnerStats,
    received: AtomicU64,
    in_flight: Mutex<JoinSet<()>>,
    runtime: Handle,
}

impl PrometheusReporter {
    /// Resolve `raw` (the `prometheus` plugin entry), build the reporter and
    /// subscribe it to `notifier`. Nothing is registered or subscribed when
    /// the configuration is invalid.
    ///
    /// Must be called from within a Tokio runtime; reporting cycles are
    /// spawned onto it even when the notifier fires from another thread.
    pub fn initialize(
        raw: Option<&Value>,
        collaborators: Collaborators,
        notifier: &dyn StatsNotifier,
    ) -> Result<Arc<Self>> {
        let config = Configuration::resolve(raw)?;
        Self::subscribe(config, collaborators, notifier)
    }

    /// Like [`PrometheusReporter::initialize`], starting from the full host
    /// script config (`{"plugins": {"prometheus": {...}}}`).
    pub fn initialize_script(
        script: &Value,
        collaborators: Collaborators,
        notifier: &dyn StatsNotifier,
    ) -> Result<Arc<Self>> {
        let config = Configuration::resolve_script(script)?;
        Self::subscribe(config, collaborators, notifier)
    }

    fn subscribe(
        config: Configuration,
        collaborators: Collaborators,
        notifier: &dyn StatsNotifier,
    ) -> Result<Arc<Self>> {
        let reporter = Arc::new(Self::new(config, collaborators)?);

        let listener = Arc::clone(&reporter);
        notifier.subscribe(Arc::new(move |report: TestReport| {
            let cycle = listener.report(report);
            listener.track(cycle);
        }));

        info!(
            test_name = %reporter.config.test_name,
            test_run_id = reporter.config.test_run_id().unwrap_or("-"),
            push_url = %reporter.pusher.target().push_url(),
            "prometheus reporter initialized"
        );
        Ok(reporter)
    }

    /// Build a reporter from an already resolved configuration without
    /// subscribing it anywhere.
    pub fn new(config: Configuration, collaborators: Collaborators) -> Result<Self> {
        let runtime = Handle::try_current()?;
        let Collaborators {
            registry,
            transport,
            sampler,
            pid,
        } = collaborators;

        let instruments = InstrumentSet::obtain(&registry, &config.buckets)?;
        registry.set_default_labels(config.default_labels());

        let target = PushTarget::new(config.push_gateway_url.clone(), config.job_name.clone());
        let pusher = GatewayPusher::new(target, registry, transport, runtime.clone());
        let runner_stats = RunnerStats {
            sampler,
            pid,
            gauge: instruments.runner_stats.clone(),
            label_names: config.label_names.clone(),
            pusher: pusher.clone(),
            applied: Arc::new(Mutex::new(0)),
        };

        Ok(Self {
            config,
            instruments,
            pusher,
            runner_stats,
            received: AtomicU64::new(0),
            in_flight: Mutex::new(JoinSet::new()),
            runtime,
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn instruments(&self) -> &InstrumentSet {
        &self.instruments
    }

    /// Run one reporting cycle for `report`.
    ///
    /// Translation finishes and the report push is initiated before this
    /// returns. Resource sampling happens on a background task and never
    /// delays the latency and error observations.
    pub fn report(&self, report: TestReport) -> ReportCycle {
        let translation = translate(&report, &self.instruments);
        debug!(?translation, "recorded report");
        let report_push = self.pusher.push();

        let seq = self.received.fetch_add(1, Ordering::SeqCst) + 1;
        let runner_stats = self.runtime.spawn(self.runner_stats.clone().record(seq, report));

        ReportCycle {
            report_push,
            runner_stats,
        }
    }

    /// Run a cycle for a raw stats payload. Payloads matching neither report
    /// shape are logged and dropped.
    pub fn report_value(&self, value: Value) -> Option<ReportCycle> {
        match TestReport::from_value(value) {
            Ok(report) => Some(self.report(report)),
            Err(e) => {
                warn!("dropping stats payload: {}", e);
                None
            }
        }
    }

    /// Keep a subscribed cycle until it finishes, reaping completed ones.
    fn track(&self, cycle: ReportCycle) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn_on(cycle.finished(), &self.runtime);
    }

    /// Number of subscribed cycles that have not been reaped yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Wait for every cycle started through the subscription so far.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner));
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!("report cycle task failed: {}", e);
            }
        }
    }
}

fn set_runner_stats(gauge: &Gauge, label_names: &LabelNames, usage: ResourceUsage, report: &TestReport) {
    gauge.set(usage.cpu_percent, &[(LABEL_FIELD, label_names.cpu.as_str())]);
    gauge.set(usage.memory_mb, &[(LABEL_FIELD, label_names.memory.as_str())]);
    gauge.set(
        report.pending_requests,
        &[(LABEL_FIELD, label_names.pending_requests.as_str())],
    );
    gauge.set(
        report.scenarios_avoided,
        &[(LABEL_FIELD, label_names.avoided_scenarios.as_str())],
    );
}
