use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::download::{DEFAULT_USER_AGENT, DownloadOptions};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub interface: InterfaceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// 0 disables the timeout.
    #[serde(default)]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_watch_interval_ms() -> u64 {
    1000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: 0,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            watch_interval_ms: default_watch_interval_ms(),
        }
    }
}

impl Config {
    /// Options for a [`crate::DownloadManager`] built from this config.
    pub fn download_options(&self) -> DownloadOptions {
        let options = DownloadOptions::new(&self.general.download_dir)
            .with_user_agent(&self.http.user_agent);
        if self.http.connect_timeout_secs > 0 {
            options.with_connect_timeout(Duration::from_secs(self.http.connect_timeout_secs))
        } else {
            options
        }
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.interface.watch_interval_ms)
    }
}

pub struct ConfigManager {
    config_file: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Load the config from the platform config directory, writing the
    /// defaults there on first run.
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("", "", "smartdl").context("Failed to determine config directory")?;
        Self::from_path(project_dirs.config_dir().join("config.toml"))
    }

    /// Load the config from an explicit file, creating it with defaults if it
    /// does not exist.
    pub fn from_path(config_file: impl Into<PathBuf>) -> Result<Self> {
        let config_file = config_file.into();

        if let Some(config_dir) = config_file.parent() {
            if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
                fs::create_dir_all(config_dir).with_context(|| {
                    format!("Failed to create config directory: {:?}", config_dir)
                })?;
            }
        }

        let config = if config_file.exists() {
            Self::load_config(&config_file)?
        } else {
            let default_config = Config::default();
            Self::save_config(&config_file, &default_config)?;
            default_config
        };

        Ok(Self {
            config_file,
            config,
        })
    }

    /// Get a reference to the current config
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the current config
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Get the config file path
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Render the current config as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.config).context("Failed to serialize config")
    }

    fn load_config(config_file: &Path) -> Result<Config> {
        let content = fs::read_to_string(config_file)
            .with_context(|| format!("Failed to read config file: {:?}", config_file))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_file))?;

        Ok(config)
    }

    fn save_config(config_file: &Path, config: &Config) -> Result<()> {
        let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

        fs::write(config_file, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

        Ok(())
    }

    /// Validate the current configuration
    pub fn validate(&self) -> Result<()> {
        if self.config.general.download_dir.as_os_str().is_empty() {
            anyhow::bail!("download_dir cannot be empty");
        }

        if self.config.http.user_agent.trim().is_empty() {
            anyhow::bail!("user_agent cannot be empty");
        }

        self.config
            .server
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid server bind address: {}", self.config.server.bind))?;

        if self.config.interface.watch_interval_ms < 100 {
            anyhow::bail!("watch_interval_ms must be at least 100");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_run_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("nested").join("config.toml");

        let manager = ConfigManager::from_path(&config_file).unwrap();
        assert!(config_file.exists());
        assert_eq!(manager.config_file(), config_file);
        assert_eq!(manager.config().general.download_dir, PathBuf::from("downloads"));
        assert_eq!(manager.config().server.bind, "127.0.0.1:8080");
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        fs::write(
            &config_file,
            "[general]\ndownload_dir = \"/srv/files\"\n\n[http]\nconnect_timeout_secs = 15\n",
        )
        .unwrap();

        let manager = ConfigManager::from_path(&config_file).unwrap();
        let config = manager.config();
        assert_eq!(config.general.download_dir, PathBuf::from("/srv/files"));
        assert_eq!(config.http.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.interface.watch_interval_ms, 1000);

        let options = config.download_options();
        assert_eq!(options.output_directory, PathBuf::from("/srv/files"));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let options = Config::default().download_options();
        assert!(options.connect_timeout.is_none());
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        fs::write(&config_file, "[general\n").unwrap();

        let err = ConfigManager::from_path(&config_file).err().unwrap();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_validation() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = ConfigManager::from_path(temp_dir.path().join("config.toml")).unwrap();

        manager.config_mut().server.bind = "not-an-address".to_string();
        assert!(manager.validate().is_err());

        manager.config_mut().server.bind = "0.0.0.0:9000".to_string();
        manager.config_mut().interface.watch_interval_ms = 10;
        assert!(manager.validate().is_err());

        manager.config_mut().interface.watch_interval_ms = 500;
        assert!(manager.validate().is_ok());
    }
}
