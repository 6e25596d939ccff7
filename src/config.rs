//! Service configuration.
//!
//! Resolution order, last wins: built-in defaults, TOML file, environment
//! (`ASR_DAEMON_*`, `.env` honoured), command-line flags.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8765
//!
//! [model]
//! model_identifier = "nvidia/parakeet-tdt-0.6b-v2"
//! inference_command = "whisper-cli -m {model} -f {audio} --no-timestamps"
//!
//! [security]
//! enable_authentication = true
//! max_requests_per_window = 60
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::daemon::core::ServerOptions;
use crate::daemon::model::InferencePolicy;
use crate::daemon::protocol::{DEFAULT_HOST, DEFAULT_PORT};
use crate::daemon::security::SecurityConfig;
use crate::daemon::validation::ValidatorConfig;

pub const DEFAULT_MODEL: &str = "nvidia/parakeet-tdt-0.6b-v2";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to render config TOML: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub request_timeout_secs: u64,
    pub max_message_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: 10,
            request_timeout_secs: 30,
            max_message_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub model_identifier: String,
    pub cache_dir: PathBuf,
    pub inference_policy: InferencePolicy,
    /// Argv template with `{audio}` and `{model}` placeholders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_command: Option<String>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            model_identifier: DEFAULT_MODEL.to_string(),
            cache_dir: default_cache_dir(),
            inference_policy: InferencePolicy::default(),
            inference_command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub enable_authentication: bool,
    pub enable_rate_limiting: bool,
    pub max_requests_per_window: usize,
    pub rate_limit_window_secs: u64,
    pub token_expiry_secs: u64,
    pub token_sweep_interval_secs: u64,
    pub enable_input_validation: bool,
    pub allowed_file_extensions: Vec<String>,
    /// Largest audio file accepted, in bytes.
    pub max_request_size: u64,
    pub allow_remote_clients: bool,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            enable_authentication: true,
            enable_rate_limiting: true,
            max_requests_per_window: 60,
            rate_limit_window_secs: 60,
            token_expiry_secs: 3600,
            token_sweep_interval_secs: 300,
            enable_input_validation: true,
            allowed_file_extensions: ["wav", "mp3", "flac", "m4a"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_request_size: 100 * 1024 * 1024,
            allow_remote_clients: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerSection,
    pub model: ModelSection,
    pub security: SecuritySection,
    pub log: LogSection,
}

impl ServiceConfig {
    /// Load from `path` (or the default location) and apply environment
    /// overrides. A missing default file yields defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(raw)?;
        for ext in &mut config.security.allowed_file_extensions {
            *ext = ext.trim_start_matches('.').to_ascii_lowercase();
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `ASR_DAEMON_*` variables. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = dotenvy::var("ASR_DAEMON_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parsed_env("ASR_DAEMON_PORT") {
            self.server.port = port;
        }
        if let Ok(model) = dotenvy::var("ASR_DAEMON_MODEL") {
            self.model.model_identifier = model;
        }
        if let Ok(dir) = dotenvy::var("ASR_DAEMON_CACHE_DIR") {
            self.model.cache_dir = PathBuf::from(dir);
        }
        if let Some(enabled) = flag_env("ASR_DAEMON_AUTH") {
            self.security.enable_authentication = enabled;
        }
        if let Some(enabled) = flag_env("ASR_DAEMON_RATE_LIMIT") {
            self.security.enable_rate_limiting = enabled;
        }
        if let Some(max) = parsed_env("ASR_DAEMON_MAX_REQUESTS") {
            self.security.max_requests_per_window = max;
        }
        if let Ok(level) = dotenvy::var("ASR_DAEMON_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Ok(file) = dotenvy::var("ASR_DAEMON_LOG_FILE") {
            self.log.file = Some(PathBuf::from(file));
        }
        if let Ok(command) = dotenvy::var("ASR_DAEMON_INFERENCE_COMMAND") {
            self.model.inference_command = Some(command);
        }
    }

    /// Reject settings that would make the service misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.security;
        let checks: [(bool, &str); 8] = [
            (s.rate_limit_window_secs >= 1, "security.rate_limit_window_secs must be >= 1"),
            (s.max_requests_per_window >= 1, "security.max_requests_per_window must be >= 1"),
            (s.token_expiry_secs >= 1, "security.token_expiry_secs must be >= 1"),
            (self.server.request_timeout_secs >= 1, "server.request_timeout_secs must be >= 1"),
            (self.server.max_connections >= 1, "server.max_connections must be >= 1"),
            (s.max_request_size >= 1, "security.max_request_size must be >= 1"),
            (
                !s.allowed_file_extensions.is_empty(),
                "security.allowed_file_extensions must not be empty",
            ),
            (
                !self.model.model_identifier.trim().is_empty(),
                "model.model_identifier must not be empty",
            ),
        ];
        if let Some((_, message)) = checks.iter().find(|(ok, _)| !ok) {
            return Err(ConfigError::Invalid((*message).to_string()));
        }

        if self.server.port != 0 && self.server.port < 1024 {
            warn!(port = self.server.port, "Binding a privileged port");
        }
        Ok(())
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            host: self.server.host.clone(),
            port: self.server.port,
            max_connections: self.server.max_connections,
            request_timeout: Duration::from_secs(self.server.request_timeout_secs),
            max_message_bytes: self.server.max_message_bytes,
            token_sweep_interval: Duration::from_secs(self.security.token_sweep_interval_secs.max(1)),
            enable_input_validation: self.security.enable_input_validation,
        }
    }

    pub fn security_config(&self) -> SecurityConfig {
        SecurityConfig {
            enable_authentication: self.security.enable_authentication,
            enable_rate_limiting: self.security.enable_rate_limiting,
            max_requests_per_window: self.security.max_requests_per_window,
            rate_limit_window: Duration::from_secs(self.security.rate_limit_window_secs),
            token_expiry: Duration::from_secs(self.security.token_expiry_secs),
        }
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            allowed_extensions: self.security.allowed_file_extensions.clone(),
            max_file_size: self.security.max_request_size,
            max_message_bytes: self.server.max_message_bytes,
            allow_remote_clients: self.security.allow_remote_clients,
        }
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = dotenvy::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

fn flag_env(key: &str) -> Option<bool> {
    let raw = dotenvy::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value = %raw, "Ignoring unparseable environment flag");
            None
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "asr-daemon", "asr-daemon")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn default_cache_dir() -> PathBuf {
    project_dirs().map_or_else(
        || std::env::temp_dir().join("asr-daemon-cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}
