// Configuration loading and parsing (server.toml, credentials.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use ensemble_core::{Catalog, CatalogError};
use ensemble_llm::UpstreamConfig;
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamSection,
    pub credentials: CredentialsConfig,
    /// Absolute catalog path, or `None` for the catalog built into the binary.
    pub catalog_path: Option<PathBuf>,
}

impl Config {
    /// Settings handed to the relay client.
    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            url: self.upstream.url.clone(),
            api_key: self.credentials.api_key.clone(),
            model: self.upstream.model.clone(),
            temperature: self.upstream.temperature,
            max_tokens: self.upstream.max_tokens,
            timeout: Duration::from_secs(self.upstream.timeout_secs),
        }
    }

    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => Catalog::load(path),
            None => Catalog::builtin(),
        }
    }
}

// ---------------------------------------------------------------------------
// server.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire server.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ServerFile {
    server: ServerConfig,
    upstream: UpstreamSection,
    #[serde(default)]
    catalog: CatalogSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `"*"` allows any.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSection {
    pub url: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CatalogSection {
    path: Option<PathBuf>,
}

fn default_temperature() -> f32 {
    ensemble_llm::client::DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    ensemble_llm::client::DEFAULT_MAX_TOKENS
}

fn default_timeout_secs() -> u64 {
    ensemble_llm::client::DEFAULT_TIMEOUT.as_secs()
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/server.toml` and
/// (optionally) `config/credentials.toml` relative to `base_dir`, then apply
/// environment overrides looked up through `env`.
///
/// Recognized overrides: `ENSEMBLE_API_KEY`, `ENSEMBLE_UPSTREAM_URL`,
/// `ENSEMBLE_MODEL`, `ENSEMBLE_PORT`.
pub fn load_config_from(
    base_dir: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- server.toml (required) ---
    let server_path = config_dir.join("server.toml");
    let server_text = read_file(&server_path)?;
    let server_file: ServerFile =
        toml::from_str(&server_text).map_err(|e| ConfigError::ParseError {
            path: server_path.clone(),
            source: e,
        })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let mut config = Config {
        server: server_file.server,
        upstream: server_file.upstream,
        credentials,
        catalog_path: server_file.catalog.path.map(|p| base_dir.join(p)),
    };

    apply_env_overrides(&mut config, env)?;
    validate(&config)?;

    Ok(config)
}

fn apply_env_overrides(
    config: &mut Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(key) = env("ENSEMBLE_API_KEY") {
        config.credentials.api_key = Some(key);
    }
    if let Some(url) = env("ENSEMBLE_UPSTREAM_URL") {
        config.upstream.url = url;
    }
    if let Some(model) = env("ENSEMBLE_MODEL") {
        config.upstream.model = model;
    }
    if let Some(port) = env("ENSEMBLE_PORT") {
        config.server.port = port.parse().map_err(|_| ConfigError::ValidationError {
            field: "ENSEMBLE_PORT".into(),
            message: format!("must be a valid port number, got {port:?}"),
        })?;
    }
    Ok(())
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Load config relative to the current working directory, copying defaults
/// first and reading overrides from the process environment.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd, |key| std::env::var(key).ok())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    let upstream = &config.upstream;
    if !(upstream.url.starts_with("http://") || upstream.url.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "upstream.url".into(),
            message: format!("must be an http(s) URL, got {:?}", upstream.url),
        });
    }

    if upstream.model.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "upstream.model".into(),
            message: "must not be empty".into(),
        });
    }

    if !(0.0..=2.0).contains(&upstream.temperature) {
        return Err(ConfigError::ValidationError {
            field: "upstream.temperature".into(),
            message: format!(
                "must be between 0.0 and 2.0 inclusive, got {}",
                upstream.temperature
            ),
        });
    }

    if upstream.max_tokens == 0 {
        return Err(ConfigError::ValidationError {
            field: "upstream.max_tokens".into(),
            message: "must be > 0".into(),
        });
    }

    if upstream.timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "upstream.timeout_secs".into(),
            message: "must be > 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
