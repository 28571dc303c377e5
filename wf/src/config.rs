//! Wildforge configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main wildforge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wildcard directories
    pub wildcards: WildcardsConfig,

    /// Template directory
    pub templates: TemplatesConfig,

    /// Expansion defaults
    pub generation: GenerationConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Fails when none of the configured wildcard directories exists.
    pub fn validate(&self) -> Result<()> {
        let paths = self.wildcards.expanded_paths();
        if !paths.iter().any(|p| p.is_dir()) {
            return Err(eyre::eyre!(
                "No wildcard directory found. Checked: {}",
                paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .wildforge.yml
        let local_config = PathBuf::from(".wildforge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/wildforge/wildforge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("wildforge").join("wildforge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Wildcard directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WildcardsConfig {
    /// Directories to read wildcard files from; later entries override earlier ones
    pub paths: Vec<String>,
}

impl Default for WildcardsConfig {
    fn default() -> Self {
        Self {
            paths: vec!["~/.config/wildforge/wildcards".to_string(), "wildcards".to_string()],
        }
    }
}

impl WildcardsConfig {
    /// Expand paths (resolve ~/)
    pub fn expanded_paths(&self) -> Vec<PathBuf> {
        self.paths.iter().filter_map(|p| expand_home(p)).collect()
    }
}

/// Template directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    pub dir: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dir: "templates".to_string(),
        }
    }
}

impl TemplatesConfig {
    pub fn expanded_dir(&self) -> Option<PathBuf> {
        expand_home(&self.dir)
    }
}

/// Expansion defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Seed used when none is given on the command line
    #[serde(rename = "default-seed")]
    pub default_seed: Option<u64>,
}

fn expand_home(path: &str) -> Option<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir().map(|home| home.join(rest))
    } else if path == "~" {
        dirs::home_dir()
    } else {
        Some(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.wildcards.paths.len(), 2);
        assert_eq!(config.templates.dir, "templates");
        assert!(config.generation.default_seed.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
wildcards:
  paths:
    - /srv/wildcards
    - /srv/wildcards-extra

templates:
  dir: /srv/templates

generation:
  default-seed: 1234
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.wildcards.expanded_paths(),
            vec![PathBuf::from("/srv/wildcards"), PathBuf::from("/srv/wildcards-extra")]
        );
        assert_eq!(config.templates.expanded_dir(), Some(PathBuf::from("/srv/templates")));
        assert_eq!(config.generation.default_seed, Some(1234));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("generation:\n  default-seed: 7\n").unwrap();
        assert_eq!(config.templates.dir, "templates");
        assert_eq!(config.generation.default_seed, Some(7));
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/wc"), Some(home.join("wc")));
        }
        assert_eq!(expand_home("relative/wc"), Some(PathBuf::from("relative/wc")));
    }

    #[test]
    fn test_load_explicit_path_and_validate() {
        let temp = TempDir::new().unwrap();
        let wildcards = temp.path().join("wc");
        fs::create_dir(&wildcards).unwrap();
        let config_path = temp.path().join("wildforge.yml");
        fs::write(
            &config_path,
            format!("wildcards:\n  paths:\n    - {}\n", wildcards.display()),
        )
        .unwrap();

        let config = Config::load(Some(&config_path)).unwrap();
        assert!(config.validate().is_ok());

        let missing = Config {
            wildcards: WildcardsConfig {
                paths: vec![temp.path().join("nope").display().to_string()],
            },
            ..Config::default()
        };
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path_missing_is_error() {
        let path = PathBuf::from("/nonexistent/wildforge.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
