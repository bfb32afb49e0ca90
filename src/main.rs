use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use artillery_prometheus::config;
use artillery_prometheus::constants::{CONFIG_PUSH_GATEWAY_URL, PLUGIN_NAME};
use artillery_prometheus::{
    logging, Collaborators, EventEmitter, InstrumentRegistry, PrometheusReporter, TestReport,
};
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "artillery-prometheus")]
#[command(about = "Push newline-delimited load-test stats to a Prometheus Pushgateway")]
#[command(version)]
struct Cli {
    /// Plugin config or full script config (TOML or JSON)
    #[arg(long)]
    config: PathBuf,

    /// Overrides `pushGatewayUrl` from the config file
    #[arg(long, env = "ARTILLERY_PROMETHEUS_PUSHGATEWAY_URL")]
    pushgateway_url: Option<String>,

    /// Directory for the rotating JSON log file
    #[arg(long, default_value = "logs")]
    log_dir: String,
}

/// Apply `--pushgateway-url` to the plugin entry of `raw`, which is either a
/// bare plugin config or a full script config.
fn apply_url_override(raw: &mut Value, pushgateway_url: Option<String>) {
    let Some(url) = pushgateway_url else {
        return;
    };
    let entry = if is_script(raw) {
        raw.pointer_mut(&format!("/plugins/{}", PLUGIN_NAME))
    } else {
        Some(raw)
    };
    if let Some(Value::Object(entry)) = entry {
        entry.insert(CONFIG_PUSH_GATEWAY_URL.to_string(), Value::String(url));
    }
}

fn is_script(raw: &Value) -> bool {
    raw.get("plugins").is_some()
}

/// Read newline-delimited stats batches and emit each one on `emitter`.
/// Returns the number of batches emitted.
async fn pump<R>(reader: R, emitter: &EventEmitter) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut batches = 0usize;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = match serde_json::from_str::<Value>(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("skipping line that is not JSON: {}", e);
                continue;
            }
        };
        match TestReport::from_value(value) {
            Ok(report) => {
                emitter.emit_stats(report);
                batches += 1;
            }
            Err(e) => warn!("dropping stats payload: {}", e),
        }
    }
    Ok(batches)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log_dir);

    let mut raw = config::load_file(&cli.config)?;
    apply_url_override(&mut raw, cli.pushgateway_url);

    let emitter = EventEmitter::new();
    let collaborators = Collaborators::new(Arc::new(InstrumentRegistry::new()));
    let reporter = if is_script(&raw) {
        PrometheusReporter::initialize_script(&raw, collaborators, &emitter)
    } else {
        PrometheusReporter::initialize(Some(&raw), collaborators, &emitter)
    }
    .context("invalid prometheus plugin configuration")?;

    let batches = pump(BufReader::new(tokio::io::stdin()), &emitter).await?;

    // Pushes are fire-and-forget per batch, but the process must not exit under them.
    reporter.flush().await;
    info!("reported {} batch(es)", batches);
    Ok(())
}
