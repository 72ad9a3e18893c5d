use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Store name used when the caller does not give one.
pub const DEFAULT_STORE_NAME: &str = "default";

/// `store_dir` value that keeps every store in memory.
pub const IN_MEMORY: &str = ":memory:";

/// Where and how stores are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_store_dir() -> String {
    "store".to_string()
}

fn default_extension() -> String {
    "json".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            store_dir: default_store_dir(),
            extension: default_extension(),
        }
    }
}

impl Settings {
    pub fn in_memory() -> Self {
        Settings {
            store_dir: IN_MEMORY.to_string(),
            ..Settings::default()
        }
    }

    pub fn with_store_dir(dir: impl AsRef<Path>) -> Self {
        Settings {
            store_dir: dir.as_ref().to_string_lossy().into_owned(),
            ..Settings::default()
        }
    }

    /// Parse settings from a YAML string
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        Ok(settings)
    }

    /// Parse settings from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn is_in_memory(&self) -> bool {
        self.store_dir == IN_MEMORY
    }

    pub fn store_dir(&self) -> Option<PathBuf> {
        (!self.is_in_memory()).then(|| PathBuf::from(&self.store_dir))
    }

    /// `<store_dir>/<name>.<extension>`, or `None` in memory mode.
    pub fn store_file(&self, name: &str) -> Option<PathBuf> {
        self.store_dir()
            .map(|dir| dir.join(format!("{name}.{}", self.extension)))
    }
}
