use crate::collectors::DEFAULT_PROC_ROOT;
use crate::http::DEFAULT_HEALTHZ_PATH;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_healthz_path")]
    pub healthz_path: String,
    /// Reported verbatim in every snapshot; the crate version when unset.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
    /// Filesystem measured for disk usage; the working directory when unset.
    #[serde(default)]
    pub disk_path: Option<PathBuf>,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_base_backoff", with = "humantime_duration")]
    pub base_backoff: Duration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_probe_timeout", with = "humantime_duration")]
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            healthz_path: default_healthz_path(),
            version: None,
            proc_root: default_proc_root(),
            disk_path: None,
            probe: ProbeConfig::default(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_backoff: default_base_backoff(),
            max_attempts: default_max_attempts(),
            timeout: default_probe_timeout(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a host:port socket address".to_string(),
            ));
        }
        if !self.healthz_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "healthz_path must start with '/'".to_string(),
            ));
        }
        if self.healthz_path == "/metrics" {
            return Err(ConfigError::Validation(
                "healthz_path must not shadow /metrics".to_string(),
            ));
        }
        if let Some(version) = &self.version {
            if version.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "version must not be empty when set".to_string(),
                ));
            }
        }

        validate_probe(&self.probe)?;
        Ok(())
    }

    pub fn version_or_default(&self) -> String {
        self.version
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../healthd.yaml.example")
    }
}

fn validate_probe(cfg: &ProbeConfig) -> Result<(), ConfigError> {
    if cfg.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "probe.max_attempts must be >= 1".to_string(),
        ));
    }
    if cfg.base_backoff.is_zero() {
        return Err(ConfigError::Validation(
            "probe.base_backoff must be > 0".to_string(),
        ));
    }
    if cfg.timeout.is_zero() {
        return Err(ConfigError::Validation(
            "probe.timeout must be > 0".to_string(),
        ));
    }
    Ok(())
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_healthz_path() -> String {
    DEFAULT_HEALTHZ_PATH.to_string()
}

fn default_proc_root() -> PathBuf {
    PathBuf::from(DEFAULT_PROC_ROOT)
}

const fn default_base_backoff() -> Duration {
    Duration::from_millis(500)
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}
