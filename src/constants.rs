/// Name of the plugin entry under `plugins` in the host script config.
pub const PLUGIN_NAME: &str = "prometheus";

// Configuration keys (as written by users in the script config)
pub const CONFIG_TEST_NAME: &str = "testName";
pub const CONFIG_PUSH_GATEWAY_URL: &str = "pushGatewayUrl";
pub const CONFIG_STATIC_TAGS: &str = "tags";
pub const CONFIG_TEST_RUN_ID: &str = "testRunId";
pub const CONFIG_EXCLUDE_TEST_RUN_ID: &str = "excludeTestRunId";
pub const CONFIG_REQUIRE_TEST_NAME: &str = "requireTestName";
pub const CONFIG_ENVIRONMENT: &str = "environment";
pub const CONFIG_JOB_NAME: &str = "jobName";
pub const CONFIG_BUCKETS: &str = "buckets";
pub const CONFIG_CPU_LABEL: &str = "cpu";
pub const CONFIG_MEMORY_LABEL: &str = "memory";
pub const CONFIG_PENDING_REQUESTS_LABEL: &str = "pendingRequests";
pub const CONFIG_AVOIDED_SCENARIOS_LABEL: &str = "avoidedScenarios";

// Defaults
pub const DEFAULT_CPU_LABEL: &str = "cpu";
pub const DEFAULT_MEMORY_LABEL: &str = "memory";
pub const DEFAULT_PENDING_REQUESTS_LABEL: &str = "pending_requests";
pub const DEFAULT_AVOIDED_SCENARIOS_LABEL: &str = "avoided_scenarios";
pub const DEFAULT_JOB_NAME: &str = "artillery";
pub const UNNAMED_TEST: &str = "unnamed";

/// Histogram bucket edges, in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] = [0.01, 0.05, 0.10, 0.50, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Default label carrying the configured environment.
pub const ENVIRONMENT_LABEL: &str = "cluster";

// Emitted metric names
pub const REQUEST_DURATION_SECONDS: &str = "request_duration_seconds";
pub const CONNECTION_TIMINGS_SECONDS: &str = "connection_timings_seconds";
pub const CLIENT_ERRORS: &str = "clientErrors";
pub const RUNNER_STATS: &str = "runnerStats";

// Label names on emitted metrics
pub const LABEL_PATH: &str = "path";
pub const LABEL_STATUS_CODE: &str = "status_code";
pub const LABEL_PHASE: &str = "phase";
pub const LABEL_ERROR: &str = "error";
pub const LABEL_FIELD: &str = "field";

/// Label names the exposition format uses for histogram and summary series.
pub const RESERVED_LABELS: [&str; 2] = ["le", "quantile"];
pub const RESERVED_LABEL_PREFIX: &str = "__";

pub const NANOS_PER_SECOND: f64 = 1e9;
pub const BYTES_PER_MEGABYTE: f64 = 1_048_576.0;
