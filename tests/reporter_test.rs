use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use artillery_prometheus::{
    Collaborators, ConfigurationError, Error, EventEmitter, InstrumentRegistry, PrometheusReporter, PushError,
    PushTarget, PushTransport, ResourceSampler, ResourceUsage, ResultRecord, SamplingError, TestReport,
};
use async_trait::async_trait;
use serde_json::{json, Value};

#[derive(Default)]
struct RecordingTransport {
    pushes: Mutex<Vec<(PushTarget, String)>>,
}

impl RecordingTransport {
    fn count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }

    fn bodies(&self) -> Vec<String> {
        self.pushes.lock().unwrap().iter().map(|(_, body)| body.clone()).collect()
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn push_add(&self, target: &PushTarget, body: String) -> Result<(), PushError> {
        self.pushes.lock().unwrap().push((target.clone(), body));
        Ok(())
    }
}

struct FixedSampler(ResourceUsage);

#[async_trait]
impl ResourceSampler for FixedSampler {
    async fn sample(&self, _pid: u32) -> Result<ResourceUsage, SamplingError> {
        Ok(self.0)
    }
}

struct GoneSampler;

#[async_trait]
impl ResourceSampler for GoneSampler {
    async fn sample(&self, pid: u32) -> Result<ResourceUsage, SamplingError> {
        Err(SamplingError::ProcessNotFound(pid))
    }
}

/// Answers the first call only after a delay, later calls immediately.
#[derive(Default)]
struct SlowFirstSampler {
    calls: AtomicUsize,
}

#[async_trait]
impl ResourceSampler for SlowFirstSampler {
    async fn sample(&self, _pid: u32) -> Result<ResourceUsage, SamplingError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(ResourceUsage {
            cpu_percent: 10.0,
            memory_mb: 64.0,
        })
    }
}

fn plugin_config() -> Value {
    json!({
        "testName": "checkout",
        "pushGatewayUrl": "http://localhost:9091",
        "tags": { "testRunId": "run-1" },
        "environment": "staging"
    })
}

fn collaborators(
    registry: &Arc<InstrumentRegistry>,
    transport: &Arc<RecordingTransport>,
    sampler: Arc<dyn ResourceSampler>,
) -> Collaborators {
    Collaborators::new(Arc::clone(registry))
        .with_transport(Arc::clone(transport) as Arc<dyn PushTransport>)
        .with_sampler(sampler)
        .with_pid(4242)
}

fn healthy() -> Arc<dyn ResourceSampler> {
    Arc::new(FixedSampler(ResourceUsage {
        cpu_percent: 25.0,
        memory_mb: 128.0,
    }))
}

#[tokio::test]
async fn test_missing_push_gateway_url_creates_nothing() {
    let registry = Arc::new(InstrumentRegistry::new());
    let transport = Arc::new(RecordingTransport::default());
    let emitter = EventEmitter::new();

    let result = PrometheusReporter::initialize(
        Some(&json!({ "testName": "checkout" })),
        collaborators(&registry, &transport, healthy()),
        &emitter,
    );

    assert!(matches!(
        result,
        Err(Error::Config(ConfigurationError::MissingField(_)))
    ));
    assert!(registry.is_empty());
    assert_eq!(emitter.listener_count(), 0);
}

#[tokio::test]
async fn test_missing_config_is_fatal() {
    let registry = Arc::new(InstrumentRegistry::new());
    let transport = Arc::new(RecordingTransport::default());
    let emitter = EventEmitter::new();

    let result = PrometheusReporter::initialize(None, collaborators(&registry, &transport, healthy()), &emitter);

    assert!(result.is_err());
    assert_eq!(emitter.listener_count(), 0);
}

#[tokio::test]
async fn test_reinitialization_reuses_instruments() -> Result<()> {
    let registry = Arc::new(InstrumentRegistry::new());
    let transport = Arc::new(RecordingTransport::default());
    let emitter = EventEmitter::new();

    let first = PrometheusReporter::initialize(
        Some(&plugin_config()),
        collaborators(&registry, &transport, healthy()),
        &emitter,
    )?;
    let second = PrometheusReporter::initialize(
        Some(&plugin_config()),
        collaborators(&registry, &transport, healthy()),
        &emitter,
    )?;

    assert_eq!(registry.len(), 4);
    assert!(first.instruments().latency == second.instruments().latency);

    let report = TestReport {
        latencies: vec![ResultRecord::new(2e8, "200", "/cart")],
        ..Default::default()
    };
    first.report(report.clone()).finished().await;
    second.report(report).finished().await;

    assert_eq!(
        registry.sample("request_duration_seconds_count", &[("path", "/cart")]),
        Some(2.0)
    );
    Ok(())
}

#[tokio::test]
async fn test_cycle_records_latency_errors_and_runner_stats() -> Result<()> {
    let registry = Arc::new(InstrumentRegistry::new());
    let transport = Arc::new(RecordingTransport::default());
    let emitter = EventEmitter::new();
    let reporter = PrometheusReporter::initialize(
        Some(&plugin_config()),
        collaborators(&registry, &transport, healthy()),
        &emitter,
    )?;

    let cycle = reporter
        .report_value(json!({
            "latencies": [[1700000000000u64, "r1", 1_000_000_000u64, 200, "/users"]],
            "errors": { "a": "TIMEOUT", "b": "EAI_AGAIN" },
            "pendingRequests": 4,
            "scenariosAvoided": 1
        }))
        .expect("report shape is valid");
    cycle.finished().await;

    let users = [("path", "/users"), ("status_code", "200"), ("testName", "checkout")];
    assert_eq!(registry.sample("request_duration_seconds_count", &users), Some(1.0));
    assert_eq!(registry.sample("request_duration_seconds_sum", &users), Some(1.0));
    assert_eq!(registry.sample("clientErrors", &[("error", "TIMEOUT")]), Some(1.0));
    assert_eq!(registry.sample("clientErrors", &[("error", "EAI_AGAIN")]), Some(1.0));

    assert_eq!(registry.sample("runnerStats", &[("field", "cpu")]), Some(25.0));
    assert_eq!(registry.sample("runnerStats", &[("field", "memory")]), Some(128.0));
    assert_eq!(registry.sample("runnerStats", &[("field", "pending_requests")]), Some(4.0));
    assert_eq!(registry.sample("runnerStats", &[("field", "avoided_scenarios")]), Some(1.0));

    assert_eq!(
        registry.sample(
            "clientErrors",
            &[("testRunId", "run-1"), ("cluster", "staging"), ("error", "TIMEOUT")]
        ),
        Some(1.0)
    );

    // One push for the report, one after the gauge update.
    assert_eq!(transport.count(), 2);
    let pushes = transport.pushes.lock().unwrap();
    assert!(pushes.iter().all(|(target, _)| target.job_name == "artillery"));
    Ok(())
}

#[tokio::test]
async fn test_empty_report_still_pushes() -> Result<()> {
    let registry = Arc::new(InstrumentRegistry::new());
    let transport = Arc::new(RecordingTransport::default());
    let emitter = EventEmitter::new();
    let reporter = PrometheusReporter::initialize(
        Some(&plugin_config()),
        collaborators(&registry, &transport, Arc::new(GoneSampler)),
        &emitter,
    )?;

    reporter.report(TestReport::default()).finished().await;

    assert_eq!(transport.count(), 1);
    assert_eq!(registry.sample("request_duration_seconds_count", &[]), None);
    Ok(())
}

#[tokio::test]
async fn test_sampler_failure_skips_only_gauge_update() -> Result<()> {
    let registry = Arc::new(InstrumentRegistry::new());
    let transport = Arc::new(RecordingTransport::default());
    let emitter = EventEmitter::new();
    let reporter = PrometheusReporter::initialize(
        Some(&plugin_config()),
        collaborators(&registry, &transport, Arc::new(GoneSampler)),
        &emitter,
    )?;

    let report = TestReport {
        latencies: vec![ResultRecord::new(5e6, "500", "/pay")],
        ..Default::default()
    };
    reporter.report(report).finished().await;

    assert_eq!(transport.count(), 1);
    assert!(transport.bodies()[0].contains("request_duration_seconds"));
    assert_eq!(registry.sample("runnerStats", &[]), None);

    // The next cycle still reports.
    reporter.report(TestReport::default()).finished().await;
    assert_eq!(transport.count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_emitter_drives_reporting() -> Result<()> {
    let registry = Arc::new(InstrumentRegistry::new());
    let transport = Arc::new(RecordingTransport::default());
    let emitter = EventEmitter::new();
    let reporter = PrometheusReporter::initialize_script(
        &json!({ "plugins": { "prometheus": plugin_config() } }),
        collaborators(&registry, &transport, healthy()),
        &emitter,
    )?;
    assert_eq!(emitter.listener_count(), 1);

    let legacy = TestReport::from_value(json!({
        "_entries": [[0, "r", 3_000_000_000u64, 200, "/legacy", { "dns": 1_000_000 }]],
        "_errors": { "ETIMEDOUT": 2 }
    }))?;
    emitter.emit_stats(legacy);

    reporter.flush().await;

    assert_eq!(reporter.in_flight(), 0);
    assert_eq!(transport.count(), 2);
    assert_eq!(
        registry.sample("request_duration_seconds_sum", &[("path", "/legacy")]),
        Some(3.0)
    );
    assert_eq!(
        registry.sample("connection_timings_seconds_count", &[("phase", "dns")]),
        Some(1.0)
    );
    assert_eq!(registry.sample("clientErrors", &[("error", "ETIMEDOUT")]), Some(1.0));
    Ok(())
}

#[tokio::test]
async fn test_unknown_payload_is_dropped() -> Result<()> {
    let registry = Arc::new(InstrumentRegistry::new());
    let transport = Arc::new(RecordingTransport::default());
    let emitter = EventEmitter::new();
    let reporter = PrometheusReporter::initialize(
        Some(&plugin_config()),
        collaborators(&registry, &transport, healthy()),
        &emitter,
    )?;

    assert!(reporter.report_value(json!("not a report")).is_none());
    assert_eq!(transport.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_runner_stats_keep_latest_batch_when_samples_finish_out_of_order() -> Result<()> {
    let registry = Arc::new(InstrumentRegistry::new());
    let transport = Arc::new(RecordingTransport::default());
    let emitter = EventEmitter::new();
    let reporter = PrometheusReporter::initialize(
        Some(&plugin_config()),
        collaborators(&registry, &transport, Arc::new(SlowFirstSampler::default())),
        &emitter,
    )?;

    let first = reporter.report(TestReport {
        pending_requests: 10.0,
        ..Default::default()
    });
    let second = reporter.report(TestReport {
        pending_requests: 2.0,
        ..Default::default()
    });
    first.finished().await;
    second.finished().await;

    assert_eq!(
        registry.sample("runnerStats", &[("field", "pending_requests")]),
        Some(2.0)
    );
    // Two report pushes, and a single runner-stats push from the newer batch.
    assert_eq!(transport.count(), 3);
    Ok(())
}

#[tokio::test]
async fn test_flush_waits_for_subscribed_cycles() -> Result<()> {
    let registry = Arc::new(InstrumentRegistry::new());
    let transport = Arc::new(RecordingTransport::default());
    let emitter = EventEmitter::new();
    let reporter = PrometheusReporter::initialize(
        Some(&plugin_config()),
        collaborators(&registry, &transport, Arc::new(SlowFirstSampler::default())),
        &emitter,
    )?;

    for pending in [1.0, 2.0, 3.0] {
        emitter.emit_stats(TestReport {
            pending_requests: pending,
            ..Default::default()
        });
    }
    reporter.flush().await;

    assert_eq!(reporter.in_flight(), 0);
    assert_eq!(
        registry.sample("runnerStats", &[("field", "pending_requests")]),
        Some(3.0)
    );
    Ok(())
}
