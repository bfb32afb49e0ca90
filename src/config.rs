//! Plugin configuration: validation, defaulting and static labels.
//!
//! The host hands over a loosely typed JSON object. [`Configuration::resolve`]
//! turns it into an immutable, fully defaulted [`Configuration`] without
//! touching the caller's value.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::constants::*;
use crate::error::ConfigurationError;

/// Field names written into the `runnerStats` gauge.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelNames {
    pub cpu: String,
    pub memory: String,
    pub pending_requests: String,
    pub avoided_scenarios: String,
}

impl Default for LabelNames {
    fn default() -> Self {
        Self {
            cpu: DEFAULT_CPU_LABEL.to_string(),
            memory: DEFAULT_MEMORY_LABEL.to_string(),
            pending_requests: DEFAULT_PENDING_REQUESTS_LABEL.to_string(),
            avoided_scenarios: DEFAULT_AVOIDED_SCENARIOS_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub test_name: String,
    pub push_gateway_url: String,
    /// Always contains `testName`; contains `testRunId` unless excluded.
    pub static_tags: BTreeMap<String, String>,
    pub label_names: LabelNames,
    /// Histogram bucket edges in seconds, strictly increasing.
    pub buckets: Vec<f64>,
    pub environment: Option<String>,
    pub job_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    test_name: Option<String>,
    push_gateway_url: Option<String>,
    tags: Option<Value>,
    test_run_id: Option<Value>,
    exclude_test_run_id: Option<bool>,
    require_test_name: Option<bool>,
    environment: Option<String>,
    job_name: Option<String>,
    buckets: Option<Vec<f64>>,
    cpu: Option<String>,
    memory: Option<String>,
    pending_requests: Option<String>,
    avoided_scenarios: Option<String>,
}

impl Configuration {
    /// Resolve the plugin entry out of a full host script config
    /// (`{"plugins": {"prometheus": {...}}}`).
    pub fn resolve_script(script: &Value) -> Result<Self, ConfigurationError> {
        let plugins = script
            .get("plugins")
            .filter(|p| p.is_object())
            .ok_or(ConfigurationError::PluginsNotFound)?;
        Self::resolve(plugins.get(PLUGIN_NAME))
    }

    pub fn resolve(raw: Option<&Value>) -> Result<Self, ConfigurationError> {
        let raw = match raw {
            Some(v) if v.is_object() => v,
            _ => return Err(ConfigurationError::PluginConfigRequired(PLUGIN_NAME.to_string())),
        };

        let parsed = RawConfig::deserialize(raw).map_err(|e| ConfigurationError::InvalidField {
            field: PLUGIN_NAME.to_string(),
            reason: e.to_string(),
        })?;

        let mut static_tags = parse_tags(parsed.tags.as_ref())?;

        let require_test_name = parsed.require_test_name.unwrap_or(true);
        let test_name = match non_empty(parsed.test_name) {
            Some(name) => name,
            None if require_test_name => {
                return Err(ConfigurationError::MissingField(CONFIG_TEST_NAME.to_string()))
            }
            None => UNNAMED_TEST.to_string(),
        };
        static_tags.insert(CONFIG_TEST_NAME.to_string(), test_name.clone());

        if !static_tags.contains_key(CONFIG_TEST_RUN_ID) {
            if let Some(id) = parsed.test_run_id.as_ref().and_then(tag_value) {
                static_tags.insert(CONFIG_TEST_RUN_ID.to_string(), id);
            } else if !parsed.exclude_test_run_id.unwrap_or(false) {
                let id = Uuid::new_v4().to_string();
                debug!(test_run_id = %id, "generated test run id");
                static_tags.insert(CONFIG_TEST_RUN_ID.to_string(), id);
            }
        }

        let push_gateway_url = non_empty(parsed.push_gateway_url).ok_or_else(|| {
            ConfigurationError::MissingField(format!("{}.{}", PLUGIN_NAME, CONFIG_PUSH_GATEWAY_URL))
        })?;

        let buckets = match parsed.buckets {
            Some(buckets) => validate_buckets(buckets)?,
            None => DEFAULT_BUCKETS.to_vec(),
        };

        let defaults = LabelNames::default();
        let label_names = LabelNames {
            cpu: non_empty(parsed.cpu).unwrap_or(defaults.cpu),
            memory: non_empty(parsed.memory).unwrap_or(defaults.memory),
            pending_requests: non_empty(parsed.pending_requests).unwrap_or(defaults.pending_requests),
            avoided_scenarios: non_empty(parsed.avoided_scenarios)
                .unwrap_or(defaults.avoided_scenarios),
        };

        Ok(Self {
            test_name,
            push_gateway_url,
            static_tags,
            label_names,
            buckets,
            environment: non_empty(parsed.environment),
            job_name: non_empty(parsed.job_name).unwrap_or_else(|| DEFAULT_JOB_NAME.to_string()),
        })
    }

    pub fn test_run_id(&self) -> Option<&str> {
        self.static_tags.get(CONFIG_TEST_RUN_ID).map(String::as_str)
    }

    /// Labels applied to every observation: the static tags plus the
    /// environment (as `cluster`) when one is configured.
    pub fn default_labels(&self) -> Vec<(String, String)> {
        let mut labels = self.static_tags.clone();
        if let Some(env) = &self.environment {
            labels.insert(ENVIRONMENT_LABEL.to_string(), env.clone());
        }
        labels.into_iter().collect()
    }
}

/// Read a plugin entry or a whole script config from a TOML or JSON file.
/// Files ending in `.toml` are parsed as TOML, everything else as JSON.
pub fn load_file(path: &Path) -> Result<Value, ConfigurationError> {
    let load_error = |reason: String| ConfigurationError::Load {
        path: path.display().to_string(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    if is_toml {
        let table: toml::Value = toml::from_str(&content).map_err(|e| load_error(e.to_string()))?;
        serde_json::to_value(table).map_err(|e| load_error(e.to_string()))
    } else {
        serde_json::from_str(&content).map_err(|e| load_error(e.to_string()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn tag_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_tags(tags: Option<&Value>) -> Result<BTreeMap<String, String>, ConfigurationError> {
    match tags {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => {
            if let Some(reserved) = map.keys().find(|k| is_reserved_label(k)) {
                return Err(ConfigurationError::InvalidField {
                    field: format!("{}.{}", CONFIG_STATIC_TAGS, reserved),
                    reason: "label name is reserved".to_string(),
                });
            }
            Ok(map
                .iter()
                .filter_map(|(k, v)| tag_value(v).map(|v| (k.clone(), v)))
                .collect())
        }
        Some(_) => Err(ConfigurationError::InvalidField {
            field: CONFIG_STATIC_TAGS.to_string(),
            reason: "expected a mapping of label names to values".to_string(),
        }),
    }
}

fn is_reserved_label(name: &str) -> bool {
    RESERVED_LABELS.contains(&name) || name.starts_with(RESERVED_LABEL_PREFIX)
}

fn validate_buckets(buckets: Vec<f64>) -> Result<Vec<f64>, ConfigurationError> {
    if buckets.is_empty() {
        return Err(ConfigurationError::InvalidBuckets("at least one bucket is required".into()));
    }
    if buckets.iter().any(|b| !b.is_finite() || *b <= 0.0) {
        return Err(ConfigurationError::InvalidBuckets("buckets must be positive numbers".into()));
    }
    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ConfigurationError::InvalidBuckets("buckets must be strictly increasing".into()));
    }
    Ok(buckets)
}
