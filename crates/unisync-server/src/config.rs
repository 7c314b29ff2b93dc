use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use unisync_client::ClientConfig;
use unisync_engine::{ControllerSettings, EngineSettings};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// External API client: base URL, timeout and bearer tokens
    #[serde(default)]
    pub api: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Engine validations
        let engine = &self.engine;
        if engine.workers == 0 {
            return Err("engine.workers must be > 0".into());
        }
        if engine.resync_interval_secs == 0 {
            return Err("engine.resync_interval_secs must be > 0".into());
        }
        if engine.cleanup_interval_secs == 0 {
            return Err("engine.cleanup_interval_secs must be > 0".into());
        }
        if engine.api_timeout_ms == 0 {
            return Err("engine.api_timeout_ms must be > 0".into());
        }
        if engine.conflict_attempts == 0 {
            return Err("engine.conflict_attempts must be > 0".into());
        }
        if engine.error_backoff_base_ms == 0 {
            return Err("engine.error_backoff_base_ms must be > 0".into());
        }
        if engine.error_backoff_base_ms > engine.error_backoff_max_ms {
            return Err("engine.error_backoff_base_ms must be <= engine.error_backoff_max_ms".into());
        }
        // API validations
        match url::Url::parse(&self.api.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(format!("api.base_url is not an http(s) URL: {}", self.api.base_url)),
        }
        if self.api.request_timeout_ms == 0 {
            return Err("api.request_timeout_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Reconciliation timing and concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_error_backoff_base_ms")]
    pub error_backoff_base_ms: u64,
    #[serde(default = "default_error_backoff_max_ms")]
    pub error_backoff_max_ms: u64,
    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,
    /// Quiet period after a change before it is applied. 0 disables debouncing.
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,
    #[serde(default = "default_conflict_attempts")]
    pub conflict_attempts: u32,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_workers() -> usize {
    4
}
fn default_resync_interval_secs() -> u64 {
    600
}
fn default_error_backoff_base_ms() -> u64 {
    5_000
}
fn default_error_backoff_max_ms() -> u64 {
    300_000
}
fn default_api_timeout_ms() -> u64 {
    30_000
}
fn default_debounce_window_ms() -> u64 {
    2_000
}
fn default_conflict_attempts() -> u32 {
    5
}
fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            resync_interval_secs: default_resync_interval_secs(),
            error_backoff_base_ms: default_error_backoff_base_ms(),
            error_backoff_max_ms: default_error_backoff_max_ms(),
            api_timeout_ms: default_api_timeout_ms(),
            debounce_window_ms: default_debounce_window_ms(),
            conflict_attempts: default_conflict_attempts(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            resync_interval: Duration::from_secs(self.resync_interval_secs),
            error_backoff_base: Duration::from_millis(self.error_backoff_base_ms),
            error_backoff_max: Duration::from_millis(self.error_backoff_max_ms),
            api_timeout: Duration::from_millis(self.api_timeout_ms),
            conflict_attempts: self.conflict_attempts,
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            workers: self.workers,
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
        }
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, looked up in the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "unisync.toml";

    /// Loads `path` (or the default file) layered with `UNISYNC__*`
    /// environment overrides, then validates the result. A missing file
    /// is not an error.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        let mut builder = Config::builder();
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., UNISYNC__ENGINE__WORKERS=8
        builder = builder.add_source(
            Environment::with_prefix("UNISYNC")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
