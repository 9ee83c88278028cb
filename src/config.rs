//! Configuration loading, validation, and persistence.
//!
//! Configuration is YAML (JSON parses identically) resolved in this order,
//! first hit wins: explicit path, `./vajrapulse.conf.yml`,
//! `~/.vajrapulse/vajrapulse.conf.yml`, `/etc/vajrapulse/vajrapulse.conf.yml`,
//! built-in defaults. Environment variables named
//! `VAJRAPULSE_<PATH_UPPERCASED_WITH_UNDERSCORES>` override file values,
//! e.g. `VAJRAPULSE_EXECUTION_DRAINTIMEOUT=30s`.
//!
//! Validation collects every offending value into a single
//! [`ConfigError::Validation`] so the operator fixes everything in one pass.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Worker pool strategy for iteration execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreadPoolStrategy {
    /// Unbounded lightweight tasks; preferred for I/O-bound workloads.
    Virtual,
    /// Fixed-size pool bounded by `platformThreadPoolSize`.
    Platform,
    /// Defer to the engine default (currently `Virtual`).
    Auto,
}

/// Engine execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionConfig {
    /// Graceful drain budget after the run loop exits.
    #[serde(with = "duration_format")]
    pub drain_timeout: Duration,
    /// Upper bound on the whole shutdown, measured from initiation.
    #[serde(with = "duration_format")]
    pub force_timeout: Duration,
    /// Pool strategy when the task has no preference.
    pub default_thread_pool: ThreadPoolStrategy,
    /// Pool size for `PLATFORM`; `-1` means the logical CPU count.
    pub platform_thread_pool_size: i32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(5),
            force_timeout: Duration::from_secs(10),
            default_thread_pool: ThreadPoolStrategy::Virtual,
            platform_thread_pool_size: -1,
        }
    }
}

impl ExecutionConfig {
    /// Resolves the platform pool size: `-1` becomes the logical CPU count.
    pub fn resolved_platform_pool_size(&self) -> usize {
        if self.platform_thread_pool_size == -1 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.platform_thread_pool_size.max(1) as usize
        }
    }

    /// Validates this section alone, aggregating every offender.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();
        self.collect_issues(&mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation { issues })
        }
    }

    fn collect_issues(&self, issues: &mut Vec<String>) {
        if self.drain_timeout.is_zero() {
            issues.push("execution.drainTimeout must be strictly positive".to_string());
        }
        if self.force_timeout.is_zero() {
            issues.push("execution.forceTimeout must be strictly positive".to_string());
        }
        if self.force_timeout < self.drain_timeout {
            issues.push(format!(
                "execution.forceTimeout ({}ms) must be >= execution.drainTimeout ({}ms)",
                self.force_timeout.as_millis(),
                self.drain_timeout.as_millis()
            ));
        }
        if self.platform_thread_pool_size != -1 && self.platform_thread_pool_size <= 0 {
            issues.push(format!(
                "execution.platformThreadPoolSize must be -1 or positive, got {}",
                self.platform_thread_pool_size
            ));
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObservabilityConfig {
    /// Enable per-iteration spans.
    pub tracing_enabled: bool,
    /// Enable the live export surface (periodic reporter).
    pub metrics_enabled: bool,
    /// Emit JSON log records instead of plain text.
    pub structured_logging: bool,
    /// Default OTLP endpoint handed to exporters that need one.
    pub otlp_endpoint: String,
    /// Head-based span sampling rate in `[0, 1]`.
    pub tracing_sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            tracing_enabled: false,
            metrics_enabled: true,
            structured_logging: true,
            otlp_endpoint: "http://localhost:4318".to_string(),
            tracing_sample_rate: 0.05,
        }
    }
}

impl ObservabilityConfig {
    /// Validates this section alone, aggregating every offender.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();
        self.collect_issues(&mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation { issues })
        }
    }

    fn collect_issues(&self, issues: &mut Vec<String>) {
        if !(0.0..=1.0).contains(&self.tracing_sample_rate) {
            issues.push(format!(
                "observability.tracingSampleRate must be in [0, 1], got {}",
                self.tracing_sample_rate
            ));
        }
    }
}

/// Complete framework configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VajraPulseConfig {
    /// Engine execution settings.
    pub execution: ExecutionConfig,
    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl VajraPulseConfig {
    /// Loads configuration from the standard search path, applies
    /// environment overrides, and validates.
    pub fn load() -> Result<Self, ConfigError> {
        for path in Self::search_paths() {
            if path.is_file() {
                return Self::load_from(&path);
            }
        }
        let mut config = Self::default();
        let env_issues = config.apply_env_overrides();
        config.validate_with(env_issues)?;
        Ok(config)
    }

    /// Loads configuration from an explicit path, applies environment
    /// overrides, and validates.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.display().to_string(),
        })?;
        let mut config = Self::from_yaml(&contents)?;
        let env_issues = config.apply_env_overrides();
        config.validate_with(env_issues)?;
        Ok(config)
    }

    /// Parses YAML (or JSON, which YAML subsumes) without validation.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Writes the configuration as YAML; reloading the file yields an equal
    /// config.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let rendered = serde_yaml::to_string(self).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        std::fs::write(path, rendered).map_err(|source| ConfigError::Io {
            source,
            path: path.display().to_string(),
        })
    }

    /// Validates all settings, aggregating every offender into one error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with(Vec::new())
    }

    fn validate_with(&self, mut issues: Vec<String>) -> Result<(), ConfigError> {
        self.execution.collect_issues(&mut issues);
        self.observability.collect_issues(&mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation { issues })
        }
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./vajrapulse.conf.yml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".vajrapulse/vajrapulse.conf.yml"));
        }
        paths.push(PathBuf::from("/etc/vajrapulse/vajrapulse.conf.yml"));
        paths
    }

    /// Applies `VAJRAPULSE_*` environment overrides in place, returning the
    /// parse problems encountered so they join the validation report.
    pub fn apply_env_overrides(&mut self) -> Vec<String> {
        let mut issues = Vec::new();

        if let Ok(raw) = std::env::var("VAJRAPULSE_EXECUTION_DRAINTIMEOUT") {
            match parse_duration(&raw) {
                Ok(v) => self.execution.drain_timeout = v,
                Err(e) => issues.push(format!("VAJRAPULSE_EXECUTION_DRAINTIMEOUT: {e}")),
            }
        }
        if let Ok(raw) = std::env::var("VAJRAPULSE_EXECUTION_FORCETIMEOUT") {
            match parse_duration(&raw) {
                Ok(v) => self.execution.force_timeout = v,
                Err(e) => issues.push(format!("VAJRAPULSE_EXECUTION_FORCETIMEOUT: {e}")),
            }
        }
        if let Ok(raw) = std::env::var("VAJRAPULSE_EXECUTION_DEFAULTTHREADPOOL") {
            match raw.to_uppercase().as_str() {
                "VIRTUAL" => self.execution.default_thread_pool = ThreadPoolStrategy::Virtual,
                "PLATFORM" => self.execution.default_thread_pool = ThreadPoolStrategy::Platform,
                "AUTO" => self.execution.default_thread_pool = ThreadPoolStrategy::Auto,
                other => issues.push(format!(
                    "VAJRAPULSE_EXECUTION_DEFAULTTHREADPOOL: expected VIRTUAL|PLATFORM|AUTO, got '{other}'"
                )),
            }
        }
        if let Ok(raw) = std::env::var("VAJRAPULSE_EXECUTION_PLATFORMTHREADPOOLSIZE") {
            match raw.parse::<i32>() {
                Ok(v) => self.execution.platform_thread_pool_size = v,
                Err(_) => issues.push(format!(
                    "VAJRAPULSE_EXECUTION_PLATFORMTHREADPOOLSIZE: expected integer, got '{raw}'"
                )),
            }
        }
        for (var, field) in [
            ("VAJRAPULSE_OBSERVABILITY_TRACINGENABLED", 0usize),
            ("VAJRAPULSE_OBSERVABILITY_METRICSENABLED", 1),
            ("VAJRAPULSE_OBSERVABILITY_STRUCTUREDLOGGING", 2),
        ] {
            if let Ok(raw) = std::env::var(var) {
                match raw.parse::<bool>() {
                    Ok(v) => match field {
                        0 => self.observability.tracing_enabled = v,
                        1 => self.observability.metrics_enabled = v,
                        _ => self.observability.structured_logging = v,
                    },
                    Err(_) => issues.push(format!("{var}: expected true|false, got '{raw}'")),
                }
            }
        }
        if let Ok(raw) = std::env::var("VAJRAPULSE_OBSERVABILITY_OTLPENDPOINT") {
            self.observability.otlp_endpoint = raw;
        }
        if let Ok(raw) = std::env::var("VAJRAPULSE_OBSERVABILITY_TRACINGSAMPLERATE") {
            match raw.parse::<f64>() {
                Ok(v) => self.observability.tracing_sample_rate = v,
                Err(_) => issues.push(format!(
                    "VAJRAPULSE_OBSERVABILITY_TRACINGSAMPLERATE: expected number, got '{raw}'"
                )),
            }
        }

        issues
    }
}

/// Parses a duration literal: `Nms`, `Ns`, `Nm`, or `Nh`.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (value, multiplier_ms) = if let Some(v) = raw.strip_suffix("ms") {
        (v, 1u64)
    } else if let Some(v) = raw.strip_suffix('s') {
        (v, 1_000)
    } else if let Some(v) = raw.strip_suffix('m') {
        (v, 60_000)
    } else if let Some(v) = raw.strip_suffix('h') {
        (v, 3_600_000)
    } else {
        return Err(format!("'{raw}' has no unit suffix (expected ms, s, m, or h)"));
    };
    let value: u64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a valid duration"))?;
    Ok(Duration::from_millis(value * multiplier_ms))
}

/// Renders a duration in the largest exact unit.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis() as u64;
    if ms == 0 {
        return "0ms".to_string();
    }
    if ms % 3_600_000 == 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms % 60_000 == 0 {
        format!("{}m", ms / 60_000)
    } else if ms % 1_000 == 0 {
        format!("{}s", ms / 1_000)
    } else {
        format!("{ms}ms")
    }
}

mod duration_format {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
