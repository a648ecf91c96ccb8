// SPDX-License-Identifier: MIT
//! Configuration file loading and validation.
//!
//! The process is configured from a single YAML file. Before parsing, the raw
//! text is run through `${VAR}` environment interpolation so endpoints and
//! credentials can be supplied by the deployment environment. An unset
//! variable expands to the empty string.
//!
//! Loading is atomic: either the whole file parses and validates, or an error
//! is returned and nothing downstream (providers, subscriber) is touched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be located or read.
    #[error("failed to read configuration file {path}: {source}")]
    Unreadable {
        /// Path that was attempted.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but does not match the expected schema.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] config::ConfigError),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Service identity reported as resource attributes.
    #[serde(default)]
    pub service: ServiceConfig,

    /// OTLP exporter endpoints and timeouts.
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Periodic emitter settings.
    #[serde(default)]
    pub emitter: EmitterConfig,

    /// Log level filter directive (e.g. "info", "session_pulse=debug").
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            exporter: ExporterConfig::default(),
            emitter: EmitterConfig::default(),
            log_filter: default_log_filter(),
        }
    }
}

/// Service identity attached to every exported signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name resource attribute (`service.name`).
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Service version resource attribute (`service.version`).
    #[serde(default = "default_service_version")]
    pub version: String,

    /// Deployment environment resource attribute (`deployment.environment`).
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            version: default_service_version(),
            environment: default_environment(),
        }
    }
}

/// OTLP exporter configuration.
///
/// `endpoint` is the base URL without a per-signal suffix; each signal
/// defaults to `<endpoint>/v1/<signal>` and can be overridden individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Base OTLP endpoint. Example: `http://localhost:4318`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Export request timeout in seconds.
    #[serde(default = "default_export_timeout")]
    pub timeout_secs: u64,

    /// Optional trace endpoint override.
    #[serde(default)]
    pub traces: Option<SignalConfig>,

    /// Optional metric endpoint override.
    #[serde(default)]
    pub metrics: Option<SignalConfig>,

    /// Optional log endpoint override.
    #[serde(default)]
    pub logs: Option<SignalConfig>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_export_timeout(),
            traces: None,
            metrics: None,
            logs: None,
        }
    }
}

/// Per-signal exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Full endpoint for this signal, including the path.
    pub endpoint: String,
}

impl ExporterConfig {
    pub fn traces_endpoint(&self) -> String {
        self.signal_endpoint(self.traces.as_ref(), "v1/traces")
    }

    pub fn metrics_endpoint(&self) -> String {
        self.signal_endpoint(self.metrics.as_ref(), "v1/metrics")
    }

    pub fn logs_endpoint(&self) -> String {
        self.signal_endpoint(self.logs.as_ref(), "v1/logs")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn signal_endpoint(&self, signal: Option<&SignalConfig>, suffix: &str) -> String {
        match signal {
            Some(s) => s.endpoint.clone(),
            None => format!("{}/{}", self.endpoint.trim_end_matches('/'), suffix),
        }
    }
}

/// Periodic emitter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Seconds between cycles. Must be greater than zero.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

impl EmitterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_service_name() -> String {
    "session-pulse".to_string()
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_endpoint() -> String {
    "http://localhost:4318".to_string()
}

const fn default_export_timeout() -> u64 {
    30
}

const fn default_interval() -> u64 {
    15
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Read, interpolate, parse and validate the configuration file at `path`.
    ///
    /// # Errors
    /// [`ConfigError::Unreadable`] if the file cannot be read,
    /// [`ConfigError::Invalid`] if it is malformed or violates a constraint.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let expanded = expand_env(&raw);

        let parsed: Self = Config::builder()
            .add_source(File::from_str(&expanded, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.emitter.interval_secs == 0 {
            return Err(ConfigError::Invalid(config::ConfigError::Message(
                "emitter.interval_secs must be greater than zero".to_string(),
            )));
        }
        Ok(())
    }
}

/// Expand `${VAR}` placeholders against the process environment.
///
/// Unset variables expand to the empty string. A placeholder with no closing
/// brace is kept verbatim.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
