use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

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

/// Top-level configuration for the pipeline service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub batch: BatchSettings,
    pub portal: PortalConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env_u64("APP_PORT", 3000)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::InvalidNumber {
            var: "APP_PORT",
            value: port.to_string(),
        })?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let batch = BatchSettings {
            pacing_min: Duration::from_secs(parse_env_u64("APP_PACING_MIN_SECS", 5)?),
            pacing_max: Duration::from_secs(parse_env_u64("APP_PACING_MAX_SECS", 15)?),
            lease_timeout: Duration::from_secs(parse_env_u64("APP_LEASE_TIMEOUT_SECS", 60)?),
        };
        if batch.pacing_min > batch.pacing_max {
            return Err(ConfigError::InvalidPacingWindow {
                min: batch.pacing_min.as_secs(),
                max: batch.pacing_max.as_secs(),
            });
        }

        let portal = PortalConfig {
            base_url: env::var("APP_PORTAL_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            api_key: env::var("APP_PORTAL_API_KEY").ok(),
            timeout: Duration::from_secs(parse_env_u64("APP_PORTAL_TIMEOUT_SECS", 10)?),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            batch,
            portal,
        })
    }
}

fn parse_env_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
        Err(_) => Ok(default),
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

/// Tracing and log filtering controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Scheduling knobs for the batch loop. Pacing bounds and the run-lease
/// timeout are deployment configuration, never hardcoded in the loop.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub pacing_min: Duration,
    pub pacing_max: Duration,
    pub lease_timeout: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            pacing_min: Duration::from_secs(5),
            pacing_max: Duration::from_secs(15),
            lease_timeout: Duration::from_secs(60),
        }
    }
}

/// Connection settings for the external submission portal.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost { source: std::net::AddrParseError },
    #[error("pacing window is inverted: min {min}s > max {max}s")]
    InvalidPacingWindow { min: u64, max: u64 },
}
