use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub screening: ScreeningConfig,
    pub scoring: ScoringConfig,
    pub query: QueryConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            screening: ScreeningConfig::from_env()?,
            scoring: ScoringConfig::from_env()?,
            query: QueryConfig::from_env()?,
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

pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "doc", "docx", "txt"];
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Upload limits, pipeline concurrency, and where screening state lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreeningConfig {
    pub max_file_bytes: u64,
    pub allowed_extensions: Vec<String>,
    pub max_concurrency: usize,
    pub storage_dir: PathBuf,
    /// Snapshot file for job posts, applicants, CV records, and screening results.
    pub state_path: PathBuf,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            storage_dir: PathBuf::from("./data/cv-files"),
            state_path: PathBuf::from("./data/screening-state.json"),
        }
    }
}

impl ScreeningConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let allowed_extensions = match env::var("SCREENING_ALLOWED_EXTENSIONS") {
            Ok(raw) => parse_extension_list(&raw),
            Err(_) => defaults.allowed_extensions,
        };
        if allowed_extensions.is_empty() {
            return Err(ConfigError::Invalid {
                variable: "SCREENING_ALLOWED_EXTENSIONS",
                reason: "at least one extension is required".to_string(),
            });
        }

        let max_concurrency =
            parse_var("SCREENING_MAX_CONCURRENCY", defaults.max_concurrency)?;
        if max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                variable: "SCREENING_MAX_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            max_file_bytes: parse_var("SCREENING_MAX_FILE_BYTES", defaults.max_file_bytes)?,
            allowed_extensions,
            max_concurrency,
            storage_dir: env::var("SCREENING_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            state_path: env::var("SCREENING_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_path),
        })
    }
}

pub const DEFAULT_SCORING_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_SCORING_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SCORING_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_CV_CHARS: usize = 20_000;

/// Connection settings for the external scoring capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_cv_chars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SCORING_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_SCORING_MODEL.to_string(),
            timeout_secs: DEFAULT_SCORING_TIMEOUT_SECS,
            max_cv_chars: DEFAULT_MAX_CV_CHARS,
        }
    }
}

impl ScoringConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let timeout_secs = parse_var("SCORING_TIMEOUT_SECS", defaults.timeout_secs)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                variable: "SCORING_TIMEOUT_SECS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            endpoint: env::var("SCORING_ENDPOINT").unwrap_or(defaults.endpoint),
            api_key: env::var("SCORING_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            model: env::var("SCORING_MODEL").unwrap_or(defaults.model),
            timeout_secs,
            max_cv_chars: parse_var("SCORING_MAX_CV_CHARS", defaults.max_cv_chars)?,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Page size clamps for applicant listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    pub min_page_size: usize,
    pub max_page_size: usize,
    pub default_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            min_page_size: 1,
            max_page_size: 100,
            default_page_size: 20,
        }
    }
}

impl QueryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            min_page_size: parse_var("QUERY_MIN_PAGE_SIZE", defaults.min_page_size)?,
            max_page_size: parse_var("QUERY_MAX_PAGE_SIZE", defaults.max_page_size)?,
            default_page_size: parse_var("QUERY_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
        };

        if config.min_page_size == 0 || config.min_page_size > config.max_page_size {
            return Err(ConfigError::Invalid {
                variable: "QUERY_MIN_PAGE_SIZE",
                reason: format!(
                    "must be between 1 and QUERY_MAX_PAGE_SIZE ({})",
                    config.max_page_size
                ),
            });
        }

        Ok(config)
    }

    /// Clamp a requested page size into the configured window.
    pub fn clamp_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(self.min_page_size, self.max_page_size)
    }
}

fn parse_var<T: std::str::FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            variable,
            reason: format!("'{raw}' is not a valid number"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_extension_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    Invalid {
        variable: &'static str,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::Invalid { variable, reason } => write!(f, "{variable}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::Invalid { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
