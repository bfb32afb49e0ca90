use thiserror::Error;

/// Fatal problems with the plugin configuration. Raised only during
/// initialization and propagated to the host.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("No \"plugins\" configuration found.")]
    PluginsNotFound,

    #[error("The configuration for {0} is required.")]
    PluginConfigRequired(String),

    #[error("The configuration parameter {0} is required.")]
    MissingField(String),

    #[error("The configuration parameter {field} is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Histogram buckets are invalid: {0}")]
    InvalidBuckets(String),

    #[error("Failed to load config file '{path}': {reason}")]
    Load { path: String, reason: String },
}

/// Two instruments of different kinds were requested under one name.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("metric '{name}' is already registered as a {existing}, cannot register it as a {requested}")]
pub struct RegistrationConflictError {
    pub name: String,
    pub existing: &'static str,
    pub requested: &'static str,
}

#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("process {0} could not be found")]
    ProcessNotFound(u32),

    #[error("resource sampler unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pushgateway returned status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("stats payload matches no known report shape: {0}")]
    UnknownShape(#[from] serde_json::Error),
}

/// Errors surfaced while bringing the reporter up.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error(transparent)]
    Registration(#[from] RegistrationConflictError),

    #[error("reporter must be initialized inside a Tokio runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}

pub type Result<T> = std::result::Result<T, Error>;
