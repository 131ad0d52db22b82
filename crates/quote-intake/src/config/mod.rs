use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::quote::DEFAULT_SESSION_IDLE_TTL;

pub const DEFAULT_LEADS_TABLE: &str = "leads";
pub const DEFAULT_POLICY_DOCS_BUCKET: &str = "policy-docs";

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
}

/// Top-level configuration for the quote intake service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub sessions: SessionConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let idle_ttl = match non_empty_var("SESSION_IDLE_TTL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidSessionTtl)?,
            None => DEFAULT_SESSION_IDLE_TTL,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage: StorageConfig::from_env(),
            sessions: SessionConfig { idle_ttl },
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
}

/// Lifetime of wizard sessions held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub idle_ttl: Duration,
}

/// Connection parameters for the hosted database and blob storage.
///
/// Both credentials are optional at load time. A missing value only
/// surfaces when a lead is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub base_url: Option<String>,
    pub access_key: Option<String>,
    pub leads_table: String,
    pub documents_bucket: String,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: non_empty_var("SUPABASE_URL"),
            access_key: non_empty_var("SUPABASE_ANON_KEY"),
            leads_table: non_empty_var("LEADS_TABLE")
                .unwrap_or_else(|| DEFAULT_LEADS_TABLE.to_string()),
            documents_bucket: non_empty_var("POLICY_DOCS_BUCKET")
                .unwrap_or_else(|| DEFAULT_POLICY_DOCS_BUCKET.to_string()),
        }
    }

    pub fn with_credentials(base_url: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            access_key: Some(access_key.into()),
            ..Self::default()
        }
    }

    pub fn credentials(&self) -> Result<StorageCredentials, ConfigError> {
        match (&self.base_url, &self.access_key) {
            (Some(base_url), Some(access_key)) => Ok(StorageCredentials {
                base_url: base_url.trim_end_matches('/').to_string(),
                access_key: access_key.clone(),
            }),
            _ => Err(ConfigError::MissingStorageCredentials),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            access_key: None,
            leads_table: DEFAULT_LEADS_TABLE.to_string(),
            documents_bucket: DEFAULT_POLICY_DOCS_BUCKET.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub base_url: String,
    pub access_key: String,
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingStorageCredentials,
    InvalidStorageCredentials,
    InvalidSessionTtl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingStorageCredentials => {
                write!(f, "Storage environment variables are not configured")
            }
            ConfigError::InvalidStorageCredentials => {
                write!(f, "SUPABASE_ANON_KEY contains characters not allowed in a header")
            }
            ConfigError::InvalidSessionTtl => {
                write!(f, "SESSION_IDLE_TTL_SECS must be a positive number of seconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::MissingStorageCredentials
            | ConfigError::InvalidStorageCredentials
            | ConfigError::InvalidSessionTtl => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
