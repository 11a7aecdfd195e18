//! Configuration for the optimistic controllers
//!
//! Loaded from TOML:
//!
//! ```toml
//! max_body_chars = 2000
//!
//! [memory]
//! first_canonical_id = 42
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MomentConfig {
    /// Longest accepted comment body, in characters, after trimming
    pub max_body_chars: Option<usize>,
    /// In-memory store settings
    pub memory: MemoryConfig,
}

impl MomentConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a body length limit
    #[inline]
    #[must_use]
    pub fn with_max_body_chars(mut self, max: usize) -> Self {
        self.max_body_chars = Some(max);
        self
    }

    /// With the first id handed out by the in-memory store
    #[inline]
    #[must_use]
    pub fn with_first_canonical_id(mut self, first: u64) -> Self {
        self.memory.first_canonical_id = first;
        self
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML or unknown keys
    /// - `ConfigError::Invalid` on unusable values
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Read` if the file cannot be read
    /// - anything [`MomentConfig::from_toml_str`] returns
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_chars == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_body_chars",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MomentConfig {
    fn default() -> Self {
        Self {
            max_body_chars: None,
            memory: MemoryConfig::default(),
        }
    }
}

/// Settings for [`InMemoryRemote`](crate::remote::memory::InMemoryRemote)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Numeric part of the first canonical id (`c-<n>`)
    pub first_canonical_id: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            first_canonical_id: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = MomentConfig::new();
        assert_eq!(config.max_body_chars, None);
        assert_eq!(config.memory.first_canonical_id, 1);
    }

    #[test]
    fn parse_full_document() {
        let config = MomentConfig::from_toml_str(
            r"
            max_body_chars = 280

            [memory]
            first_canonical_id = 42
            ",
        )
        .unwrap();
        assert_eq!(
            config,
            MomentConfig::new()
                .with_max_body_chars(280)
                .with_first_canonical_id(42)
        );
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(MomentConfig::from_toml_str("").unwrap(), MomentConfig::new());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = MomentConfig::from_toml_str("retries = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_body_limit_is_rejected() {
        let err = MomentConfig::from_toml_str("max_body_chars = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_body_chars",
                ..
            }
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_body_chars = 500").unwrap();
        let config = MomentConfig::load(file.path()).unwrap();
        assert_eq!(config.max_body_chars, Some(500));
    }

    #[test]
    fn load_missing_file() {
        let err = MomentConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
