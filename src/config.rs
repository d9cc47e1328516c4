use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "BOARD_ENGINE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// Used when `RUST_LOG` is unset.
    pub filter: String,
    /// Relative paths resolve against `dataDir`.
    pub directory: PathBuf,
    pub file_prefix: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            directory: PathBuf::from("logs"),
            file_prefix: "board-engine.log".to_string(),
            json: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub database_file: String,
    pub log: LogConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_file: "boards.sqlite".to_string(),
            log: LogConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Reads the file named by `BOARD_ENGINE_CONFIG`; defaults when unset or missing.
    pub fn load() -> AppResult<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_path(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> AppResult<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|error| AppError::validation("config", error.to_string()))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn log_dir(&self) -> PathBuf {
        if self.log.directory.is_absolute() {
            self.log.directory.clone()
        } else {
            self.data_dir.join(&self.log.directory)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ServiceConfig::from_yaml(
            "dataDir: /var/lib/boards\nlog:\n  filter: board_engine_lib=debug\n",
        )
        .expect("config");
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/boards/boards.sqlite"));
        assert_eq!(config.log.filter, "board_engine_lib=debug");
        assert_eq!(config.log.file_prefix, "board-engine.log");
        assert_eq!(config.log_dir(), PathBuf::from("/var/lib/boards/logs"));
        assert!(config.log.json);
    }

    #[test]
    fn missing_file_and_empty_yaml_fall_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = ServiceConfig::from_path(&dir.path().join("absent.yaml")).expect("missing");
        assert_eq!(missing, ServiceConfig::default());
        assert_eq!(ServiceConfig::from_yaml("  \n").expect("empty"), ServiceConfig::default());
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "dataDir: [unterminated").expect("write");
        assert!(ServiceConfig::from_path(&path).is_err());
    }
}
