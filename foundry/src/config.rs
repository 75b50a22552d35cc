//! Foundry configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categories a request or app may declare, used as the default
/// [`CatalogConfig::categories`] list.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "productivity",
    "utilities",
    "games",
    "entertainment",
    "social",
    "education",
    "development",
    "graphics",
    "audio",
    "video",
    "communication",
    "system",
    "other",
];

/// Errors loading configuration from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Main Foundry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundryConfig {
    /// Instance name, used in logs.
    pub instance: String,

    /// Catalog settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Safety classifier settings.
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Build capability settings.
    #[serde(default)]
    pub builder: BuilderConfig,

    /// Package output settings.
    #[serde(default)]
    pub packages: PackageConfig,
}

impl Default for FoundryConfig {
    fn default() -> Self {
        Self {
            instance: "foundry".to_string(),
            catalog: CatalogConfig::default(),
            safety: SafetyConfig::default(),
            builder: BuilderConfig::default(),
            packages: PackageConfig::default(),
        }
    }
}

impl FoundryConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&raw)?)
    }

    pub fn is_valid_category(&self, category: &str) -> bool {
        self.catalog.categories.iter().any(|c| c == category)
    }
}

/// Catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Valid categories for requests and apps.
    pub categories: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Safety classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Consult a remote semantic analyzer for prompts the rules pass.
    pub semantic_analysis: bool,
    /// Base URL of the analyzer service.
    pub analyzer_url: Option<String>,
    pub analyzer_api_key: Option<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            semantic_analysis: false,
            analyzer_url: None,
            analyzer_api_key: None,
        }
    }
}

/// Build capability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Base URL of the remote build service.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Wall-clock ceiling for one external build call, in seconds.
    pub build_timeout_secs: u64,
    /// Builds allowed in flight at once.
    pub max_concurrent_builds: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            build_timeout_secs: 300,
            max_concurrent_builds: 2,
        }
    }
}

/// Package output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Directory finished package archives are written to.
    pub dir: PathBuf,
    /// Staging root for in-progress build workspaces. Defaults to the
    /// system temp directory when unset.
    pub staging_dir: Option<PathBuf>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("packages"),
            staging_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FoundryConfig::default();
        assert_eq!(config.instance, "foundry");
        assert_eq!(config.catalog.categories.len(), 13);
        assert_eq!(config.builder.build_timeout_secs, 300);
        assert!(!config.safety.semantic_analysis);
        assert!(config.is_valid_category("utilities"));
        assert!(config.is_valid_category("other"));
        assert!(!config.is_valid_category("weapons"));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = FoundryConfig::default();
        let yaml = config.to_yaml().unwrap();
        let parsed = FoundryConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.instance, config.instance);
        assert_eq!(parsed.catalog.categories, config.catalog.categories);
        assert_eq!(
            parsed.builder.max_concurrent_builds,
            config.builder.max_concurrent_builds
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed = FoundryConfig::from_yaml("instance: staging\n").unwrap();
        assert_eq!(parsed.instance, "staging");
        assert_eq!(parsed.builder.build_timeout_secs, 300);
        assert_eq!(parsed.packages.dir, PathBuf::from("packages"));
    }
}
