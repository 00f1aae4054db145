//! Configuration loader for Tether.
//!
//! Reads `config.toml` from the data directory (`~/.tether/` in production)
//! and deserializes it into [`TetherConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use tether_types::config::{EmbeddingProviderKind, TetherConfig};

use crate::vector::schema::{DEFAULT_DIMENSION, GEMINI_DIMENSION};

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `TETHER_DATA_DIR` environment variable
/// 2. `~/.tether`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TETHER_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".tether");
    }

    PathBuf::from(".tether")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`TetherConfig::default()`].
/// - Unreadable or unparseable file: logs a warning and returns the default.
///
/// The memory dimension is aligned with the configured embedding provider.
pub async fn load_config(data_dir: &Path) -> TetherConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return TetherConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return TetherConfig::default();
        }
    };

    match toml::from_str::<TetherConfig>(&content) {
        Ok(config) => align_dimension(config),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            TetherConfig::default()
        }
    }
}

/// Force `memory.dimension` to match the embedding provider's output.
pub fn align_dimension(mut config: TetherConfig) -> TetherConfig {
    let expected = match config.providers.embedding {
        EmbeddingProviderKind::Fastembed => DEFAULT_DIMENSION,
        EmbeddingProviderKind::Gemini => GEMINI_DIMENSION,
    };
    if config.memory.dimension != expected {
        tracing::warn!(
            configured = config.memory.dimension,
            expected,
            "memory.dimension does not match the embedding provider, overriding"
        );
        config.memory.dimension = expected;
    }
    config
}

/// Read the Gemini API key from the configured environment variable.
pub fn resolve_api_key(config: &TetherConfig) -> Option<SecretString> {
    std::env::var(&config.providers.api_key_env)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}
