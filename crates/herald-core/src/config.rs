//! Process configuration.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. TOML file (`HERALD_CONFIG`, default `herald.toml`; optional)
//! 3. environment, `HERALD_<SECTION>__<KEY>` (e.g. `HERALD_SERVER__SHARED_SECRET`)
//!
//! Loaded and validated once at startup, then passed into constructors.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::app::RetryPolicy;
use crate::observability::LogFormat;

pub const CONFIG_PATH_ENV: &str = "HERALD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "herald.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// A credential that never shows up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str("<redacted>")
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    pub server: ServerConfig,
    pub dispatcher: DispatcherConfig,
    pub generator: GeneratorConfig,
    pub publisher: PublisherConfig,
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub shared_secret: SecretString,
    pub log_format: LogFormat,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            shared_secret: SecretString::default(),
            log_format: LogFormat::Text,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// `0` means unbounded.
    pub max_concurrent_jobs: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorProvider {
    #[default]
    Openai,
}

impl GeneratorProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            GeneratorProvider::Openai => "openai",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub provider: GeneratorProvider,
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: GeneratorProvider::Openai,
            api_key: SecretString::default(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 120,
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherProvider {
    #[default]
    Github,
    Local,
}

impl PublisherProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            PublisherProvider::Github => "github",
            PublisherProvider::Local => "local",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub provider: PublisherProvider,
    pub token: SecretString,
    pub owner: String,
    pub api_base: String,
    pub branch: String,
    pub local_root: PathBuf,
    pub public_base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            provider: PublisherProvider::Github,
            token: SecretString::default(),
            owner: String::new(),
            api_base: "https://api.github.com".to_string(),
            branch: "main".to_string(),
            local_root: PathBuf::from("./published"),
            public_base_url: None,
            timeout_secs: 60,
        }
    }
}

impl PublisherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub max_elapsed_ms: u64,
    pub jitter: bool,
    pub request_timeout_secs: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
            max_elapsed_ms: 300_000,
            jitter: false,
            request_timeout_secs: 30,
        }
    }
}

impl ReportingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: 2.0,
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
            max_elapsed: Duration::from_millis(self.max_elapsed_ms),
            jitter: self.jitter,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl HeraldConfig {
    /// Load from the file named by `HERALD_CONFIG` (or `herald.toml`) and the
    /// environment, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config: HeraldConfig = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("HERALD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on anything that would only surface once a job runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.server.shared_secret.is_blank() {
            return Err(invalid("server.shared_secret", "must be set"));
        }

        match self.generator.provider {
            GeneratorProvider::Openai => {
                if self.generator.api_key.is_blank() {
                    return Err(invalid("generator.api_key", "must be set for provider 'openai'"));
                }
                if self.generator.model.trim().is_empty() {
                    return Err(invalid("generator.model", "must not be empty"));
                }
                check_url("generator.base_url", &self.generator.base_url)?;
            }
        }
        if self.generator.timeout_secs == 0 {
            return Err(invalid("generator.timeout_secs", "must be > 0"));
        }

        match self.publisher.provider {
            PublisherProvider::Github => {
                if self.publisher.token.is_blank() {
                    return Err(invalid("publisher.token", "must be set for provider 'github'"));
                }
                if self.publisher.owner.trim().is_empty() {
                    return Err(invalid("publisher.owner", "must be set for provider 'github'"));
                }
                if self.publisher.branch.trim().is_empty() {
                    return Err(invalid("publisher.branch", "must not be empty"));
                }
                check_url("publisher.api_base", &self.publisher.api_base)?;
            }
            PublisherProvider::Local => {
                if self.publisher.local_root.as_os_str().is_empty() {
                    return Err(invalid("publisher.local_root", "must not be empty"));
                }
                if let Some(base) = &self.publisher.public_base_url {
                    check_url("publisher.public_base_url", base)?;
                }
            }
        }
        if self.publisher.timeout_secs == 0 {
            return Err(invalid("publisher.timeout_secs", "must be > 0"));
        }

        let r = &self.reporting;
        if r.max_attempts == 0 {
            return Err(invalid("reporting.max_attempts", "must be >= 1"));
        }
        if r.max_delay_ms < r.base_delay_ms {
            return Err(invalid(
                "reporting.max_delay_ms",
                format!("must be >= base_delay_ms ({})", r.base_delay_ms),
            ));
        }
        // The first delivery waits one base delay; a smaller ceiling would
        // give up before any report is sent.
        if r.max_elapsed_ms < r.base_delay_ms {
            return Err(invalid(
                "reporting.max_elapsed_ms",
                format!("must be >= base_delay_ms ({})", r.base_delay_ms),
            ));
        }
        if r.request_timeout_secs == 0 {
            return Err(invalid("reporting.request_timeout_secs", "must be > 0"));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e: std::net::AddrParseError| invalid("server.bind", e.to_string()))
    }
}

fn check_url(field: &'static str, raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| invalid(field, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(field, format!("unsupported scheme '{}'", url.scheme())));
    }
    Ok(())
}
