use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

pub const DEFAULT_BASE_URL: &str = "https://gateway.apiserpro.gov.br/integra-contador/v1";

/// Distinguishes runtime behavior for different stages of the filer.
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

/// Top-level configuration for the filer. Secrets live in
/// [`SerproCredentials`] so that offline commands never need them.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub endpoints: EndpointConfig,
    pub transmission: TransmissionConfig,
    pub declaration: DeclarationConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let base_url = env::var("SERPRO_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let auth_url = env::var("SERPRO_AUTH_URL").unwrap_or_else(|_| format!("{base_url}/token"));

        let transmission = TransmissionConfig {
            max_retries: parse_var("PGDAS_MAX_RETRIES", 2)?,
            connect_timeout: Duration::from_secs(parse_var("PGDAS_CONNECT_TIMEOUT_SECS", 10)?),
            request_timeout: Duration::from_secs(parse_var("PGDAS_REQUEST_TIMEOUT_SECS", 30)?),
            poll_interval: Duration::from_secs(parse_var("PGDAS_POLL_INTERVAL_SECS", 4)?),
            poll_budget: Duration::from_secs(parse_var("PGDAS_POLL_BUDGET_SECS", 180)?),
        };

        let declaration = DeclarationConfig {
            transmit: parse_flag("PGDAS_TRANSMIT", false)?,
            resolver_cache_capacity: parse_var("PGDAS_RESOLVER_CACHE_CAPACITY", 4096)?,
        };

        let storage = StorageConfig {
            store_dir: env::var("PGDAS_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("transmissions")),
            archive_dir: env::var("PGDAS_ARCHIVE_DIR").ok().map(PathBuf::from),
        };

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            endpoints: EndpointConfig { base_url, auth_url },
            transmission,
            declaration,
            storage,
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// SERPRO gateway locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub base_url: String,
    pub auth_url: String,
}

impl EndpointConfig {
    pub fn with_base(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            auth_url: format!("{base_url}/token"),
            base_url,
        }
    }

    pub fn declare_url(&self) -> String {
        format!("{}/Declarar", self.base_url)
    }

    pub fn emit_url(&self) -> String {
        format!("{}/Emitir", self.base_url)
    }

    pub fn monitor_url(&self) -> String {
        format!("{}/Monitorar", self.base_url)
    }
}

/// Timeouts, retry and polling policy for outbound calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionConfig {
    pub max_retries: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_budget: Duration,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(4),
            poll_budget: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationConfig {
    /// Value of `indicadorTransmissao`; `false` asks SERPRO for a dry run.
    pub transmit: bool,
    pub resolver_cache_capacity: usize,
}

impl Default for DeclarationConfig {
    fn default() -> Self {
        Self {
            transmit: false,
            resolver_cache_capacity: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub store_dir: PathBuf,
    pub archive_dir: Option<PathBuf>,
}

/// Identity material for the SERPRO gateway.
#[derive(Debug, Clone)]
pub struct SerproCredentials {
    pub api_key: SecretString,
    pub contractor_cnpj: String,
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    pub certificate_path: PathBuf,
    pub certificate_password: SecretString,
}

impl SerproCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            api_key: SecretString::from(required_var("SERPRO_API_KEY")?),
            contractor_cnpj: required_var("SERPRO_CONTRACTOR_CNPJ")?,
            consumer_key: required_var("SERPRO_CONSUMER_KEY")?,
            consumer_secret: SecretString::from(required_var("SERPRO_CONSUMER_SECRET")?),
            certificate_path: PathBuf::from(required_var("SERPRO_CERTIFICATE")?),
            certificate_password: SecretString::from(required_var("SERPRO_CERTIFICATE_PASSWORD")?),
        })
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing { name }),
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { name, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing { name: &'static str },
    InvalidNumber { name: &'static str, value: String },
    InvalidFlag { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing { name } => write!(f, "{name} must be set"),
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be a non-negative integer, got '{value}'")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be true or false, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
