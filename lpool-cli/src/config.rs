use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use leslies_pool::{ClientOptions, Credentials};
use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::error::{CliError, Result};

const CONFIG_DIR: &str = "lpool";
const CONFIG_FILE: &str = "config.toml";

/// Settings persisted between runs. Command-line flags and environment
/// variables take precedence over the file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub username: String,
    pub password: String,
    pub pool_profile_id: String,
    pub pool_name: String,
    /// Seconds between polls.
    pub scan_interval: u64,
    /// Per-request timeout in seconds, 0 for none.
    pub request_timeout: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            pool_profile_id: String::new(),
            pool_name: String::new(),
            scan_interval: leslies_pool::DEFAULT_SCAN_INTERVAL.as_secs(),
            request_timeout: leslies_pool::http::DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pool_profile_id", &self.pool_profile_id)
            .field("pool_name", &self.pool_name)
            .field("scan_interval", &self.scan_interval)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
            .ok_or_else(|| CliError::Config("could not determine config directory".to_string()))
    }

    fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::default_path(),
        }
    }

    /// Load the configuration file, or defaults when it does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(path)?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = Self::resolve_path(path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn reset(path: Option<&Path>) -> Result<()> {
        Self::default().save(path)
    }

    /// TOML rendering with the password masked.
    pub fn show(&self) -> Result<String> {
        let mut masked = self.clone();
        if !masked.password.is_empty() {
            masked.password = "********".to_string();
        }
        Ok(toml::to_string_pretty(&masked)?)
    }

    pub fn with_overrides(mut self, args: &Args) -> Self {
        if let Some(username) = &args.username {
            self.username = username.clone();
        }
        if let Some(password) = &args.password {
            self.password = password.clone();
        }
        if let Some(id) = &args.pool_profile_id {
            self.pool_profile_id = id.clone();
        }
        if let Some(name) = &args.pool_name {
            self.pool_name = name.clone();
        }
        if let Some(interval) = args.scan_interval {
            self.scan_interval = interval;
        }
        if let Some(timeout) = args.timeout {
            self.request_timeout = timeout;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.credentials().validate()?;
        if self.scan_interval == 0 {
            return Err(CliError::Config(
                "scan_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            &self.username,
            &self.password,
            &self.pool_profile_id,
            &self.pool_name,
        )
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::default().with_request_timeout(Duration::from_secs(self.request_timeout))
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }
}
