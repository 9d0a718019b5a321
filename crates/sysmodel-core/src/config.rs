//! sysmodel.toml configuration parser.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level registry configuration. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Mutex-guarded maps; state is lost on exit.
    #[default]
    Memory,
    /// A redb database file at `storage.path`.
    Redb,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing-subscriber` env-filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl RegistryConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: RegistryConfig = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.storage.backend == StorageBackend::Redb && self.storage.path.is_none() {
            anyhow::bail!("storage.path is required when storage.backend = \"redb\"");
        }
        Ok(())
    }
}
