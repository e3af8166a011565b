//! Configuration loading and types for s3mirror.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct.  Command-line flags are applied on top by the
//! binary.  Each subsection governs a different part of the tool: the
//! source bucket and its connection, the mirror run itself, logging, and
//! the metrics dump.

use garde::Validate;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct Config {
    /// Source bucket and connection settings.
    #[serde(default)]
    #[garde(skip)]
    pub source: SourceConfig,

    /// Mirror run settings.
    #[serde(default)]
    #[garde(dive)]
    pub mirror: MirrorConfig,

    /// Logging settings.
    #[serde(default)]
    #[garde(dive)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    #[garde(skip)]
    pub observability: ObservabilityConfig,
}

/// Source bucket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Bucket to read from.  Usually supplied on the command line.
    #[serde(default)]
    pub bucket: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Explicit AWS access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,
    /// Explicit AWS secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_region(),
            endpoint_url: String::new(),
            use_path_style: false,
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

/// Mirror run configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MirrorConfig {
    /// Only keys starting with this prefix are mirrored.  Empty means all.
    #[serde(default)]
    #[garde(skip)]
    pub prefix: String,

    /// Local directory the bucket is mirrored into.
    #[serde(default = "default_local_root")]
    #[garde(length(min = 1))]
    pub local_root: String,

    /// Number of downloads in flight.  1 keeps listing order.
    #[serde(default = "default_concurrency")]
    #[garde(range(min = 1, max = 64))]
    pub concurrency: usize,

    /// Abort on the first failed download instead of continuing.
    #[serde(default)]
    #[garde(skip)]
    pub fail_fast: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            local_root: default_local_root(),
            concurrency: default_concurrency(),
            fail_fast: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    #[garde(pattern(r"^(trace|debug|info|warn|error)$"))]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    #[garde(pattern(r"^(text|json)$"))]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservabilityConfig {
    /// Write Prometheus text exposition to this file after a run.
    /// Empty disables metrics collection.
    #[serde(default)]
    pub metrics_file: String,
}

/// S3 bucket naming rules, checked before any request is sent.
#[derive(Debug, Validate)]
struct BucketName<'a> {
    #[garde(length(min = 3, max = 63), pattern(r"^[a-z0-9][a-z0-9.\-]*[a-z0-9]$"))]
    name: &'a str,
}

/// Reject names S3 would refuse anyway.
pub fn validate_bucket_name(name: &str) -> anyhow::Result<()> {
    BucketName { name }
        .validate()
        .map_err(|report| anyhow::anyhow!("invalid bucket name '{name}': {report}"))
}

impl Config {
    /// Validate the whole configuration, including the source bucket name.
    pub fn check(&self) -> anyhow::Result<()> {
        self.validate()
            .map_err(|report| anyhow::anyhow!("invalid configuration: {report}"))?;
        validate_bucket_name(&self.source.bucket)
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_local_root() -> String {
    "downloads".to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
///
/// A missing file yields the defaults; an unreadable or malformed one is
/// an error.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
