use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub seed: SeedConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "5174".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let database = match env::var("APP_DATABASE_URL") {
            Ok(raw) => StorageBackend::parse(&raw)?,
            Err(_) => StorageBackend::Sqlite(PathBuf::from(DEFAULT_DATABASE_PATH)),
        };

        let classes_csv = env::var("APP_SEED_CLASSES")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let admin_invite =
            env::var("APP_ADMIN_INVITE").unwrap_or_else(|_| DEFAULT_ADMIN_INVITE.to_string());
        let admin_email =
            env::var("APP_ADMIN_EMAIL").unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage: StorageConfig { backend: database },
            seed: SeedConfig {
                classes_csv,
                admin_invite,
                admin_email,
            },
        })
    }
}

pub const DEFAULT_ADMIN_INVITE: &str = "ADMIN-INVITE-001";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@dojo.com";
const DEFAULT_DATABASE_PATH: &str = "data/classbook.db";

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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where bookings are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Sqlite(PathBuf),
}

impl StorageBackend {
    /// `memory` (or `:memory:`) selects the in-process store, anything else is a SQLite path.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidDatabaseUrl);
        }
        if trimmed.eq_ignore_ascii_case("memory") || trimmed == ":memory:" {
            return Ok(Self::Memory);
        }
        let path = trimmed.strip_prefix("sqlite://").unwrap_or(trimmed);
        Ok(Self::Sqlite(PathBuf::from(path)))
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

/// Data ensured at startup.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub classes_csv: Option<PathBuf>,
    pub admin_invite: String,
    pub admin_email: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDatabaseUrl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDatabaseUrl => {
                write!(f, "APP_DATABASE_URL must be `memory` or a SQLite file path")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidDatabaseUrl => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
