use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default model artifact file name
pub const DEFAULT_MODEL_FILE: &str = "boosting.json";
/// Default database file name
pub const DEFAULT_DATABASE_FILE: &str = "sepsis_data.db";

/// Scoring service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,

    /// Pretrained model artifact (XGBoost JSON)
    pub model_path: Option<PathBuf>,

    /// SQLite database holding patient records
    pub database_path: Option<PathBuf>,

    /// Filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            model_path: None,
            database_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from file, or create default
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            serde_json::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".sepsisrisk"))
    }

    /// Get the model file path
    pub fn get_model_path(&self) -> Result<PathBuf> {
        match self.model_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(Self::default_config_dir()?.join(DEFAULT_MODEL_FILE)),
        }
    }

    /// Get the database file path
    pub fn get_database_path(&self) -> Result<PathBuf> {
        match self.database_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(Self::default_config_dir()?.join(DEFAULT_DATABASE_FILE)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.log_level, "info");
        assert!(config.model_path.is_none());
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = Config {
            model_path: Some(PathBuf::from("/models/boosting.txt")),
            database_path: Some(PathBuf::from("/data/patients.db")),
            ..Config::default()
        };
        assert_eq!(config.get_model_path().unwrap(), PathBuf::from("/models/boosting.txt"));
        assert_eq!(config.get_database_path().unwrap(), PathBuf::from("/data/patients.db"));
    }

    #[test]
    fn test_missing_file_gives_default() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("config.json");
        let config = Config {
            database_path: Some(dir.path().join("sepsis.db")),
            log_level: "debug".to_string(),
            ..Config::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "log_level": "warn" }"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.schema_version, 1);
    }
}
