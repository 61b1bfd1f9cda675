use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use reqwest::Url;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub model: ModelConfig,
    pub analyzer: AnalyzerConfig,
    pub delivery: DeliveryConfig,
    pub ingestion: IngestionConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup so tests do not depend on the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let environment = AppEnvironment::from_str(&get("APP_ENV", "development"));

        let host = get("APP_HOST", "127.0.0.1");
        let port = get("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = get("APP_LOG_LEVEL", "info");
        let log_format = LogFormat::parse(&get("APP_LOG_FORMAT", "compact"))?;

        let model = ModelConfig {
            version: get("MODEL_VERSION", "v1.0.0"),
            enforcement_mode: get("FALLBACK_MODE", "shadow"),
        };

        let ai_enabled = match lookup("AI_ENABLED") {
            Some(raw) => parse_flag("AI_ENABLED", &raw)?,
            None => environment.is_production(),
        };
        let endpoint = lookup("MODEL_ENDPOINT")
            .filter(|value| !value.trim().is_empty())
            .map(|raw| parse_url("MODEL_ENDPOINT", &raw))
            .transpose()?;
        if ai_enabled && endpoint.is_none() && environment.is_production() {
            return Err(ConfigError::Missing("MODEL_ENDPOINT"));
        }
        let sync_timeout = parse_millis("AI_SYNC_TIMEOUT_MS", &get("AI_SYNC_TIMEOUT_MS", "400"))?;
        if sync_timeout >= Duration::from_millis(500) {
            return Err(ConfigError::InvalidValue {
                key: "AI_SYNC_TIMEOUT_MS",
                reason: "must stay below the 500 ms synchronous budget".to_string(),
            });
        }
        let analyzer = AnalyzerConfig {
            enabled: ai_enabled,
            endpoint,
            model_name: get("VERTEX_MODEL", "gemini-3-flash-preview"),
            sync_timeout,
            event_timeout: parse_millis(
                "AI_EVENT_TIMEOUT_MS",
                &get("AI_EVENT_TIMEOUT_MS", "15000"),
            )?,
        };

        let token = match lookup("INTERNAL_API_TOKEN") {
            Some(token) if !token.trim().is_empty() => token,
            _ if environment.is_production() => {
                return Err(ConfigError::Missing("INTERNAL_API_TOKEN"))
            }
            _ => "dev-internal-token".to_string(),
        };
        let delivery = DeliveryConfig {
            base_url: parse_url(
                "INTERNAL_API_URL",
                &get("INTERNAL_API_URL", "http://localhost:8080/api/v1/internal"),
            )?,
            token,
            timeout: parse_seconds("CALLBACK_TIMEOUT", &get("CALLBACK_TIMEOUT", "10"))?,
        };

        let endpoint = match lookup("PUBSUB_EMULATOR_HOST").filter(|v| !v.trim().is_empty()) {
            Some(host) => {
                let raw = if host.starts_with("http://") || host.starts_with("https://") {
                    host
                } else {
                    format!("http://{host}")
                };
                Some(parse_url("PUBSUB_EMULATOR_HOST", &raw)?)
            }
            None if environment.is_production() => {
                return Err(ConfigError::Missing("PUBSUB_EMULATOR_HOST"))
            }
            None => None,
        };
        let ingestion = IngestionConfig {
            endpoint,
            project_id: get("GCP_PROJECT_ID", "monkeyswork"),
            max_messages: get("PUBSUB_MAX_MESSAGES", "10")
                .parse::<usize>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: "PUBSUB_MAX_MESSAGES",
                    reason: "expected a positive integer".to_string(),
                })?,
            pull_timeout: parse_seconds(
                "PUBSUB_PULL_TIMEOUT_SECS",
                &get("PUBSUB_PULL_TIMEOUT_SECS", "5"),
            )?,
            poll_interval: parse_millis(
                "PUBSUB_POLL_INTERVAL_MS",
                &get("PUBSUB_POLL_INTERVAL_MS", "1000"),
            )?,
            shutdown_grace: parse_seconds(
                "SHUTDOWN_GRACE_SECS",
                &get("SHUTDOWN_GRACE_SECS", "10"),
            )?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            model,
            analyzer,
            delivery,
            ingestion,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidValue {
                key: "APP_LOG_FORMAT",
                reason: format!("unknown format '{other}'"),
            }),
        }
    }
}

/// Rule engine identity shared by every domain.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub version: String,
    pub enforcement_mode: String,
}

/// Switch and endpoint for the opaque AI analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub enabled: bool,
    pub endpoint: Option<Url>,
    pub model_name: String,
    pub sync_timeout: Duration,
    pub event_timeout: Duration,
}

/// System of record reached by the delivery client.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub base_url: Url,
    pub token: String,
    pub timeout: Duration,
}

/// Pull-subscription settings. `endpoint == None` disables ingestion.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub endpoint: Option<Url>,
    pub project_id: String,
    pub max_messages: usize,
    pub pull_timeout: Duration,
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidValue {
        key,
        reason: err.to_string(),
    })
}

fn parse_millis(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidValue {
            key,
            reason: "expected milliseconds as an integer".to_string(),
        })
}

fn parse_seconds(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let seconds = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            reason: "expected a non-negative number of seconds".to_string(),
        })?;
    Duration::try_from_secs_f64(seconds).map_err(|err| ConfigError::InvalidValue {
        key,
        reason: format!("{seconds} seconds is not a usable duration: {err}"),
    })
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    Missing(&'static str),
    InvalidValue { key: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::Missing(key) => write!(f, "{key} is required in production"),
            ConfigError::InvalidValue { key, reason } => write!(f, "{key} is invalid: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
