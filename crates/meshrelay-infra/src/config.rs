//! Configuration loader for meshrelay.
//!
//! Reads `meshrelay.toml` and deserializes it into [`RelayConfig`]. A missing
//! file yields defaults; an unreadable or malformed file is an error, since a
//! relay must not run with limits the operator did not ask for.

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use meshrelay_types::config::{LlmBackendConfig, RelayConfig};
use meshrelay_types::error::ConfigError;
use meshrelay_types::llm::BackendKind;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "MESHRELAY_CONFIG";

pub const DEFAULT_CONFIG_FILE: &str = "meshrelay.toml";

/// Generic key variable checked before the backend-specific one.
const GENERIC_KEY_ENV: &str = "LLM_API_KEY";

/// Pick the config path: explicit flag, then `MESHRELAY_CONFIG`, then
/// `./meshrelay.toml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    resolve_config_path_with(explicit, |name| std::env::var(name).ok())
}

fn resolve_config_path_with(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    env(CONFIG_ENV)
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load and validate configuration from `path`.
pub async fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return Ok(RelayConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                message: err.to_string(),
            });
        }
    };

    let config: RelayConfig =
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    tracing::debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Database file location. Relative paths resolve against the directory
/// holding the config file.
pub fn resolve_database_path(config_path: &Path, config: &RelayConfig) -> PathBuf {
    let database = Path::new(&config.storage.database);
    if database.is_absolute() {
        return database.to_path_buf();
    }
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(database),
        _ => database.to_path_buf(),
    }
}

/// Resolve a backend's API key.
///
/// A `${VAR}` value reads that environment variable. A literal value is used
/// as is. With no value, `LLM_API_KEY` and then the backend's conventional
/// variable are tried.
pub fn resolve_api_key(backend: &LlmBackendConfig) -> Option<SecretString> {
    resolve_api_key_with(backend, |name| std::env::var(name).ok())
}

fn resolve_api_key_with(
    backend: &LlmBackendConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Option<SecretString> {
    let value = match backend.api_key.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match env_reference(raw) {
            Some(var) => env(var),
            None => Some(raw.to_string()),
        },
        _ => env(GENERIC_KEY_ENV).or_else(|| env(provider_key_env(backend.backend))),
    };
    value
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

fn provider_key_env(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::OpenAi => "OPENAI_API_KEY",
        BackendKind::Anthropic => "ANTHROPIC_API_KEY",
    }
}

/// `${NAME}` -> `NAME`.
fn env_reference(raw: &str) -> Option<&str> {
    raw.strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}
