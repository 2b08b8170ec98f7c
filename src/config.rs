use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::connection::{ManagerConfig, DEFAULT_MAX_RETRIES, DEFAULT_RECONNECT_DELAY};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration directory on this platform")]
    NoConfigDir,

    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// Connection settings, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Identifies this dashboard to the host. Generated on first run.
    pub device_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub reconnect_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            device_id: String::new(),
            username: None,
            password: None,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// `<config dir>/host-dashboard/settings.json`
pub fn default_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("host-dashboard").join("settings.json"))
        .ok_or(ConfigError::NoConfigDir)
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, raw).map_err(io_error)
    }

    /// Load `path`, falling back to defaults if it does not exist. A device id is
    /// generated and written back when missing.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = if path.exists() {
            Self::load(path)?
        } else {
            log::info!("No settings at {:?}, using defaults", path);
            Self::default()
        };

        if settings.device_id.trim().is_empty() {
            settings.device_id = Uuid::new_v4().to_string();
            log::info!("Generated device id {}", settings.device_id);
            settings.save(path)?;
        }
        Ok(settings)
    }

    /// Apply `DASHBOARD_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DASHBOARD_HOST") {
            log::info!("Using host from environment: {}", host);
            self.host = host;
        }
        if let Some(port) = lookup("DASHBOARD_PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        if let Some(device_id) = lookup("DASHBOARD_DEVICE_ID") {
            self.device_id = device_id;
        }
        if let Some(username) = lookup("DASHBOARD_USERNAME") {
            self.username = Some(username);
        }
        if let Some(password) = lookup("DASHBOARD_PASSWORD") {
            self.password = Some(password);
        }
        Ok(())
    }

    pub fn socket_url(&self) -> String {
        format!(
            "ws://{}:{}/ws?device_id={}",
            self.host, self.port, self.device_id
        )
    }

    pub fn rest_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_retries: self.max_retries,
        }
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}
