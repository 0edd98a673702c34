use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub directory: DirectoryConfig,

    pub entra: EntraConfig,

    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            worker_threads: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub host: String,

    pub port: u16,

    pub use_ssl: bool,

    pub use_starttls: bool,

    pub bind_dn: String,

    pub bind_password: String,

    /// Search base for user lookups, e.g. "DC=contoso,DC=com".
    pub base_dn: String,

    /// Connection timeout in seconds (default: 30)
    pub connect_timeout_seconds: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 389,
            use_ssl: false,
            use_starttls: false,
            bind_dn: "change-me".to_string(),
            bind_password: "change-me".to_string(),
            base_dn: "DC=example,DC=com".to_string(),
            connect_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntraConfig {
    /// When disabled the export runs from directory data alone.
    pub enabled: bool,

    pub tenant_id: String,

    pub client_id: String,

    pub client_secret: String,
}

impl Default for EntraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tenant_id: "change-me".to_string(),
            client_id: "change-me".to_string(),
            client_secret: "change-me".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_path: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_path: "hybrid_users.csv".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            directory: DirectoryConfig::default(),
            entra: EntraConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("idaudit").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".idaudit").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.directory.host.is_empty() {
            anyhow::bail!("Directory host cannot be empty");
        }

        if self.directory.base_dn.is_empty() {
            anyhow::bail!("Directory base DN cannot be empty");
        }

        if self.entra.enabled
            && (self.entra.tenant_id.is_empty()
                || self.entra.client_id.is_empty()
                || self.entra.client_secret.is_empty())
        {
            anyhow::bail!("Entra tenant_id, client_id and client_secret are required when enabled");
        }

        Ok(())
    }
}
