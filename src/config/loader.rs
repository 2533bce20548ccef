//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ShieldConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `tokens.access_secret`.
pub const ACCESS_SECRET_ENV: &str = "SHIELD_ACCESS_SECRET";
/// Environment variable overriding `tokens.refresh_secret`.
pub const REFRESH_SECRET_ENV: &str = "SHIELD_REFRESH_SECRET";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ShieldConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
///
/// Secrets may be supplied through [`ACCESS_SECRET_ENV`] and
/// [`REFRESH_SECRET_ENV`] instead of the file; the environment wins.
pub fn parse_config(content: &str) -> Result<ShieldConfig, ConfigError> {
    let mut config: ShieldConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Default configuration with environment overrides, validated.
pub fn default_config() -> Result<ShieldConfig, ConfigError> {
    parse_config("")
}

fn apply_env_overrides(config: &mut ShieldConfig) {
    if let Ok(secret) = std::env::var(ACCESS_SECRET_ENV) {
        config.tokens.access_secret = secret;
    }
    if let Ok(secret) = std::env::var(REFRESH_SECRET_ENV) {
        config.tokens.refresh_secret = secret;
    }
}
