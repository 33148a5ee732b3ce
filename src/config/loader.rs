//! Configuration loader with environment variable expansion

use super::{expand_env_vars, Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from YAML text
    ///
    /// `${VAR}` and `${VAR:-default}` placeholders are expanded before parsing,
    /// so passwords and the base URL can come from the environment.
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        Self::parse_with(content, |_| {})
    }

    /// Load a file, apply `overrides`, then validate the result
    pub fn load_with<P, F>(path: P, overrides: F) -> Result<Config, ConfigError>
    where
        P: AsRef<Path>,
        F: FnOnce(&mut Config),
    {
        let content = std::fs::read_to_string(path)?;
        Self::parse_with(&content, overrides)
    }

    fn parse_with<F: FnOnce(&mut Config)>(content: &str, overrides: F) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);
        let mut config: Config = serde_yaml::from_str(&expanded)?;
        overrides(&mut config);
        config.validate()?;
        Ok(config)
    }
}
