// ⚙️ Settings - visa-bulletin.toml
//
// Every field has a default, so an empty or missing file is a valid config:
//
//   [store]
//   path = "data/bulletins.db"
//
//   [fetch]
//   base_url = "https://travel.state.gov/content/travel/en/legal/visa-law0/visa-bulletin"
//   timeout_secs = 30
//   cache_dir = "data/cache"
//
//   [export]
//   json_path = "data/bulletin_data.json"
//
//   [logging]
//   level = "info"
//   json = false

use crate::fetcher::DEFAULT_BASE_URL;
use crate::vocabulary::Vocabulary;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Replaces the embedded vocabulary when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocabulary_path: Option<PathBuf>,
    pub store: StoreConfig,
    pub fetch: FetchConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/bulletins.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    /// Per-request timeout; a timeout fails the month, it is not retried
    pub timeout_secs: u64,
    /// Pages are read from / written to this directory when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            cache_dir: None,
            user_agent: format!("visa-bulletin/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub json_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            json_path: PathBuf::from("data/bulletin_data.json"),
            csv_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive; RUST_LOG wins when set
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Read settings; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_toml(&content).with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Configured vocabulary, or the one shipped with the crate
    pub fn vocabulary(&self) -> Result<Vocabulary> {
        match &self.vocabulary_path {
            Some(path) => Vocabulary::load(path)
                .with_context(|| format!("Failed to load vocabulary {}", path.display())),
            None => Vocabulary::embedded().context("Embedded vocabulary is invalid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let settings = Settings::default();
        assert_eq!(settings.store.path, PathBuf::from("data/bulletins.db"));
        assert_eq!(settings.fetch.timeout(), Duration::from_secs(30));
        assert!(settings.fetch.cache_dir.is_none());
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let settings = Settings::from_toml(
            r#"
            [fetch]
            timeout_secs = 5
            cache_dir = "/tmp/bulletins"

            [logging]
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.fetch.timeout_secs, 5);
        assert_eq!(settings.fetch.cache_dir, Some(PathBuf::from("/tmp/bulletins")));
        assert_eq!(settings.fetch.base_url, DEFAULT_BASE_URL);
        assert!(settings.logging.json);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.store, StoreConfig::default());
    }

    #[test]
    fn test_config_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("visa-bulletin.toml");

        let mut settings = Settings::default();
        settings.export.csv_path = Some(PathBuf::from("out.csv"));
        settings.save_to_file(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[export]"));
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[fetch]\ntimeout_secs = \"soon\"").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.toml"));
    }

    #[test]
    fn test_vocabulary_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vocab.toml");
        fs::write(
            &path,
            "[[category]]\ncode = \"F1\"\nclass = \"family\"\n[[country]]\ncode = \"All\"\n",
        )
        .unwrap();

        let settings = Settings {
            vocabulary_path: Some(path),
            ..Settings::default()
        };
        let vocabulary = settings.vocabulary().unwrap();
        assert_eq!(vocabulary.all_categories().len(), 1);
    }
}
