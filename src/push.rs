//! Best-effort delivery of instrument state to a Prometheus Pushgateway
//!
//! Every push renders the registry and hands the text to a [`PushTransport`]
//! on a background task. Failures are logged and dropped: there is no retry
//! and nothing is buffered for a later attempt.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::PushError;
use crate::metrics::InstrumentRegistry;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Where pushes go: the gateway base URL and the job grouping label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub gateway_url: String,
    pub job_name: String,
}

impl PushTarget {
    pub fn new(gateway_url: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            job_name: job_name.into(),
        }
    }

    /// `{gateway}/metrics/job/{job}`
    pub fn push_url(&self) -> String {
        format!(
            "{}/metrics/job/{}",
            self.gateway_url.trim_end_matches('/'),
            self.job_name
        )
    }
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Add `body` to the metrics already held under the target's job.
    async fn push_add(&self, target: &PushTarget, body: String) -> Result<(), PushError>;
}

/// Pushgateway transport over HTTP (`POST`, push-add semantics).
#[derive(Debug, Clone, Default)]
pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn push_add(&self, target: &PushTarget, body: String) -> Result<(), PushError> {
        let push_url = target.push_url();
        debug!("pushgateway: pushing {} bytes to {}", body.len(), push_url);

        let response = self
            .client
            .post(&push_url)
            .header("Content-Type", CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Status { status, body });
        }
        Ok(())
    }
}

/// Fire-and-forget pusher bound to one target for the process lifetime.
#[derive(Clone)]
pub struct GatewayPusher {
    target: PushTarget,
    registry: Arc<InstrumentRegistry>,
    transport: Arc<dyn PushTransport>,
    runtime: Handle,
}

impl GatewayPusher {
    pub fn new(
        target: PushTarget,
        registry: Arc<InstrumentRegistry>,
        transport: Arc<dyn PushTransport>,
        runtime: Handle,
    ) -> Self {
        Self {
            target,
            registry,
            transport,
            runtime,
        }
    }

    pub fn target(&self) -> &PushTarget {
        &self.target
    }

    /// Snapshot the registry now and push it in the background.
    ///
    /// The snapshot is taken before this returns; the network round trip is
    /// not awaited. The returned handle may be dropped.
    pub fn push(&self) -> JoinHandle<()> {
        let body = self.registry.render();
        let target = self.target.clone();
        let transport = Arc::clone(&self.transport);

        self.runtime.spawn(async move {
            match transport.push_add(&target, body).await {
                Ok(()) => info!("pushgateway: pushed metrics for job={}", target.job_name),
                Err(e) => error!("Error pushing metrics to push gateway: {}", e),
            }
        })
    }
}
