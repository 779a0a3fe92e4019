use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tabula_core::{TabulaError, TabulaResult};

const DEFAULT_CONFIG_NAME: &str = "tabula.json";
const DEFAULT_DB_NAME: &str = "tabula.sqlite";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub directory: String,
    pub auto_migrate: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Off,
    Warn,
    #[default]
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TabulaConfig {
    pub database: DatabaseConfig,
    pub read_only: Option<bool>,
    pub validation_mode: Option<ValidationMode>,
    pub migrations: Option<MigrationConfig>,
}

/// Options for opening one connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read_only: bool,
    pub validation_mode: ValidationMode,
}

impl OpenOptions {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn read_write() -> Self {
        Self::default()
    }

    pub fn with_validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }
}

impl TabulaConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig {
                path: Some(path.into()),
            },
            read_only: Some(false),
            validation_mode: Some(ValidationMode::Error),
            migrations: None,
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> TabulaResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| TabulaError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| TabulaError::storage(format!("read config: {err}")))?;
            let config: TabulaConfig = serde_json::from_str(&raw)
                .map_err(|err| TabulaError::storage(format!("parse config: {err}")))?;
            return Ok(config);
        }
        let default = TabulaConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| TabulaError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| TabulaError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> PathBuf {
        let path = self
            .database
            .path
            .clone()
            .unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
        resolve(base_dir, &path)
    }

    pub fn migrations_dir(&self, base_dir: &Path) -> Option<PathBuf> {
        self.migrations
            .as_ref()
            .map(|migrations| resolve(base_dir, &migrations.directory))
    }

    pub fn auto_migrate(&self) -> bool {
        self.migrations
            .as_ref()
            .and_then(|migrations| migrations.auto_migrate)
            .unwrap_or(false)
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            read_only: self.read_only.unwrap_or(false),
            validation_mode: self.validation_mode.unwrap_or_default(),
        }
    }
}

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        candidate
    } else {
        base_dir.join(candidate)
    }
}
