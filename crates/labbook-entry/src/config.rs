use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable overriding [`EntryConfig::db_path`].
pub const DB_PATH_ENV: &str = "LABBOOK_DB_PATH";
/// Environment variable overriding [`EntryConfig::meta_root`].
pub const META_ROOT_ENV: &str = "LABBOOK_META_ROOT";
/// Environment variable overriding [`EntryConfig::backup_dir`].
pub const BACKUP_DIR_ENV: &str = "LABBOOK_BACKUP_DIR";

/// Settings for the labnumber-entry workflow.
/// Serializable to and from YAML using serde and serde_yaml; every field is
/// optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    pub db_path: PathBuf,
    pub meta_root: PathBuf,
    pub backup_dir: PathBuf,
    /// Prefix shared by irradiation names, used when proposing the next one.
    pub irradiation_prefix: String,
    /// Prefix of the per-irradiation flux-monitor project.
    pub irradiation_project_prefix: String,
    pub monitor_name: String,
    pub monitor_material: String,
    /// J accumulated per irradiation hour.
    pub j_multiplier: f64,
    pub default_principal_investigator: String,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("labbook.db"),
            meta_root: PathBuf::from("meta"),
            backup_dir: PathBuf::from(".labbook"),
            irradiation_prefix: String::from("NM-"),
            irradiation_project_prefix: String::from("Irradiation-"),
            monitor_name: String::new(),
            monitor_material: String::new(),
            j_multiplier: 1e-4,
            default_principal_investigator: String::new(),
        }
    }
}

impl EntryConfig {
    /// Read the configuration in a YAML file.
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Loads the file if given (defaults otherwise), then applies the
    /// environment overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::read_config_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies path overrides from `lookup` (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(DB_PATH_ENV) {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(META_ROOT_ENV) {
            self.meta_root = PathBuf::from(v);
        }
        if let Some(v) = lookup(BACKUP_DIR_ENV) {
            self.backup_dir = PathBuf::from(v);
        }
    }

    /// Name of the flux-monitor project created alongside an irradiation.
    pub fn monitor_project(&self, irradiation: &str) -> String {
        format!("{}{}", self.irradiation_project_prefix, irradiation)
    }
}
