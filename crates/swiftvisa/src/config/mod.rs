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
    pub worker: WorkerConfig,
    pub auth: AuthConfig,
    pub alias_table_path: Option<PathBuf>,
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

        let api_token = env::var("APP_API_TOKEN")
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        let alias_table_path = env::var("ALIAS_TABLE_PATH")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            worker: WorkerConfig::from_env()?,
            auth: AuthConfig { api_token },
            alias_table_path,
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

/// Optional bearer token guarding the eligibility route.
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub api_token: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// What happens to a request when every worker slot is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    Queue,
    Reject,
}

/// How the external reasoning worker is launched and bounded.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub max_concurrent: usize,
    pub admission: AdmissionPolicy,
    pub credential_vars: Vec<String>,
}

impl WorkerConfig {
    pub const DEFAULT_SCRIPT: &'static str = "SwiftVisa-Backend/src/inference_with_gemini.py";

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(60),
            max_concurrent: 4,
            admission: AdmissionPolicy::Queue,
            credential_vars: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_credential_vars<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.credential_vars = vars.into_iter().map(Into::into).collect();
        self
    }

    fn from_env() -> Result<Self, ConfigError> {
        let program = env::var("WORKER_PROGRAM").unwrap_or_else(|_| "python3".to_string());
        let script =
            env::var("WORKER_SCRIPT").unwrap_or_else(|_| Self::DEFAULT_SCRIPT.to_string());
        let args = if script.trim().is_empty() {
            Vec::new()
        } else {
            vec![script]
        };

        let timeout_secs = env::var("WORKER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::InvalidWorkerTimeout)?;

        let max_concurrent = env::var("WORKER_MAX_CONCURRENCY")
            .unwrap_or_else(|_| "4".to_string())
            .parse::<usize>()
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or(ConfigError::InvalidWorkerConcurrency)?;

        let admission = match env::var("WORKER_ADMISSION")
            .unwrap_or_else(|_| "queue".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "queue" => AdmissionPolicy::Queue,
            "reject" => AdmissionPolicy::Reject,
            other => {
                return Err(ConfigError::InvalidAdmissionPolicy {
                    value: other.to_string(),
                })
            }
        };

        let credential_vars = env::var("WORKER_CREDENTIAL_VARS")
            .unwrap_or_else(|_| "GOOGLE_API_KEY".to_string())
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            program,
            args,
            timeout: Duration::from_secs(timeout_secs),
            max_concurrent,
            admission,
            credential_vars,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidWorkerTimeout,
    InvalidWorkerConcurrency,
    InvalidAdmissionPolicy { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidWorkerTimeout => {
                write!(f, "WORKER_TIMEOUT_SECS must be a positive number of seconds")
            }
            ConfigError::InvalidWorkerConcurrency => {
                write!(f, "WORKER_MAX_CONCURRENCY must be a positive integer")
            }
            ConfigError::InvalidAdmissionPolicy { value } => {
                write!(
                    f,
                    "WORKER_ADMISSION must be 'queue' or 'reject' (found '{}')",
                    value
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidWorkerTimeout
            | ConfigError::InvalidWorkerConcurrency
            | ConfigError::InvalidAdmissionPolicy { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_API_TOKEN",
            "ALIAS_TABLE_PATH",
            "WORKER_PROGRAM",
            "WORKER_SCRIPT",
            "WORKER_TIMEOUT_SECS",
            "WORKER_MAX_CONCURRENCY",
            "WORKER_ADMISSION",
            "WORKER_CREDENTIAL_VARS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.auth.api_token.is_none());
        assert!(config.alias_table_path.is_none());

        assert_eq!(config.worker.program, "python3");
        assert_eq!(config.worker.args, vec![WorkerConfig::DEFAULT_SCRIPT.to_string()]);
        assert_eq!(config.worker.timeout, Duration::from_secs(60));
        assert_eq!(config.worker.max_concurrent, 4);
        assert_eq!(config.worker.admission, AdmissionPolicy::Queue);
        assert_eq!(config.worker.credential_vars, vec!["GOOGLE_API_KEY".to_string()]);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn worker_overrides_are_applied() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("WORKER_PROGRAM", "/opt/worker/bin/eligibility");
        env::set_var("WORKER_SCRIPT", "");
        env::set_var("WORKER_TIMEOUT_SECS", "15");
        env::set_var("WORKER_MAX_CONCURRENCY", "2");
        env::set_var("WORKER_ADMISSION", "Reject");
        env::set_var("WORKER_CREDENTIAL_VARS", "GOOGLE_API_KEY, VECTOR_DB_TOKEN ,");
        env::set_var("APP_API_TOKEN", "s3cret");

        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.worker.program, "/opt/worker/bin/eligibility");
        assert!(config.worker.args.is_empty());
        assert_eq!(config.worker.timeout, Duration::from_secs(15));
        assert_eq!(config.worker.max_concurrent, 2);
        assert_eq!(config.worker.admission, AdmissionPolicy::Reject);
        assert_eq!(
            config.worker.credential_vars,
            vec!["GOOGLE_API_KEY".to_string(), "VECTOR_DB_TOKEN".to_string()]
        );
        assert_eq!(config.auth.api_token.as_deref(), Some("s3cret"));
        assert!(!format!("{:?}", config.auth).contains("s3cret"));
        reset_env();
    }

    #[test]
    fn rejects_invalid_worker_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("WORKER_TIMEOUT_SECS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidWorkerTimeout)
        ));

        reset_env();
        env::set_var("WORKER_ADMISSION", "drop");
        match AppConfig::load() {
            Err(ConfigError::InvalidAdmissionPolicy { value }) => assert_eq!(value, "drop"),
            other => panic!("expected admission error, got {other:?}"),
        }
        reset_env();
    }
}
