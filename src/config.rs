//! Engine configuration

use crate::error::{Result, StateError};
use crate::store::memory::DEFAULT_CURSOR_BATCH_SIZE;
use crate::window::PageRequest;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding `default_page_limit`
pub const ENV_DEFAULT_PAGE_LIMIT: &str = "STATEWATCH_DEFAULT_PAGE_LIMIT";
/// Environment variable overriding `max_page_limit`
pub const ENV_MAX_PAGE_LIMIT: &str = "STATEWATCH_MAX_PAGE_LIMIT";
/// Environment variable overriding `preview_size`
pub const ENV_PREVIEW_SIZE: &str = "STATEWATCH_PREVIEW_SIZE";
/// Environment variable overriding `cursor_batch_size`
pub const ENV_CURSOR_BATCH_SIZE: &str = "STATEWATCH_CURSOR_BATCH_SIZE";

/// State engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Page size when the caller gives none
    pub default_page_limit: usize,

    /// Largest page a caller may request
    pub max_page_limit: usize,

    /// Number of samples in an active-key preview
    pub preview_size: usize,

    /// Channel capacity between a store scan and its cursor
    pub cursor_batch_size: usize,

    /// Deadline for a single query, in seconds
    #[serde(with = "seconds")]
    pub scan_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_limit: 25,
            max_page_limit: 1000,
            preview_size: 5,
            cursor_batch_size: DEFAULT_CURSOR_BATCH_SIZE,
            scan_timeout: Duration::from_secs(30),
        }
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Builder for EngineConfig
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new config builder
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Set the default page size
    pub fn default_page_limit(mut self, limit: usize) -> Self {
        self.config.default_page_limit = limit;
        self
    }

    /// Set the largest page size
    pub fn max_page_limit(mut self, limit: usize) -> Self {
        self.config.max_page_limit = limit;
        self
    }

    /// Set the preview size
    pub fn preview_size(mut self, size: usize) -> Self {
        self.config.preview_size = size;
        self
    }

    /// Set the cursor channel capacity
    pub fn cursor_batch_size(mut self, size: usize) -> Self {
        self.config.cursor_batch_size = size;
        self
    }

    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.config.scan_timeout = timeout;
        self
    }

    /// Build the configuration
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Create a new config builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Parse a YAML document; missing fields keep their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Apply `STATEWATCH_*` overrides from the process environment
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up through `lookup`
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |name: &str| -> Result<Option<usize>> {
            match lookup(name) {
                Some(raw) => raw.trim().parse::<usize>().map(Some).map_err(|e| {
                    StateError::Configuration(format!("{} ('{}'): {}", name, raw, e))
                }),
                None => Ok(None),
            }
        };

        if let Some(v) = parse(ENV_DEFAULT_PAGE_LIMIT)? {
            self.default_page_limit = v;
        }
        if let Some(v) = parse(ENV_MAX_PAGE_LIMIT)? {
            self.max_page_limit = v;
        }
        if let Some(v) = parse(ENV_PREVIEW_SIZE)? {
            self.preview_size = v;
        }
        if let Some(v) = parse(ENV_CURSOR_BATCH_SIZE)? {
            self.cursor_batch_size = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.default_page_limit == 0 {
            return Err(StateError::Configuration(
                "Default page limit must be greater than 0".to_string(),
            ));
        }

        if self.max_page_limit < self.default_page_limit {
            return Err(StateError::Configuration(
                "Max page limit cannot be below the default page limit".to_string(),
            ));
        }

        if self.cursor_batch_size == 0 {
            return Err(StateError::Configuration(
                "Cursor batch size must be greater than 0".to_string(),
            ));
        }

        if self.scan_timeout.is_zero() {
            return Err(StateError::Configuration(
                "Scan timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Turn an optional 1-based page number and limit into a page request
    ///
    /// A missing limit falls back to the default, a large one is clamped.
    pub fn resolve_page(&self, page: Option<usize>, limit: Option<usize>) -> Result<PageRequest> {
        let limit = limit.unwrap_or(self.default_page_limit);
        let request = PageRequest::from_page(page.unwrap_or(1), limit.min(self.max_page_limit));
        request.validate()?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_page_limit, 25);
        assert_eq!(config.preview_size, 5);
    }

    #[test]
    fn test_builder_and_validation() {
        let config = EngineConfig::builder()
            .default_page_limit(50)
            .max_page_limit(20)
            .build();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StateError::Configuration(_)));

        let config = EngineConfig::builder()
            .scan_timeout(Duration::ZERO)
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml_str("max_page_limit: 200\nscan_timeout: 2.5\n").unwrap();
        assert_eq!(config.max_page_limit, 200);
        assert_eq!(config.scan_timeout, Duration::from_millis(2500));
        assert_eq!(config.default_page_limit, 25);

        let err = EngineConfig::from_yaml_str("max_page_limit: [").unwrap_err();
        assert!(matches!(err, StateError::Yaml(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "preview_size: 3").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.preview_size, 3);

        let missing = EngineConfig::from_file("/nonexistent/statewatch.yaml").unwrap_err();
        assert!(matches!(missing, StateError::Io(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [(ENV_PREVIEW_SIZE, "8"), (ENV_MAX_PAGE_LIMIT, " 500 ")]
            .into_iter()
            .collect();
        let config = EngineConfig::default()
            .apply_vars(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.preview_size, 8);
        assert_eq!(config.max_page_limit, 500);

        let err = EngineConfig::default()
            .apply_vars(|name| (name == ENV_CURSOR_BATCH_SIZE).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_CURSOR_BATCH_SIZE));
    }

    #[test]
    fn test_resolve_page() {
        let config = EngineConfig::default();
        assert_eq!(config.resolve_page(None, None).unwrap(), PageRequest::new(0, 25));
        assert_eq!(config.resolve_page(Some(3), Some(10)).unwrap(), PageRequest::new(20, 10));
        assert_eq!(config.resolve_page(None, Some(5000)).unwrap().limit, 1000);
        assert!(config.resolve_page(Some(1), Some(0)).is_err());
    }
}
