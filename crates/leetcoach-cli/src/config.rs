//! Configuration management

use anyhow::{bail, Result};
use directories::ProjectDirs;
use leetcoach_core::chat::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the configured backend
pub const BACKEND_URL_ENV: &str = "LEETCOACH_BACKEND_URL";

/// User settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend base URL including the API prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,

    /// Scrape settings
    #[serde(default)]
    pub scrape: ScrapeSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeSettings {
    /// Render pages in headless Chrome
    #[serde(default)]
    pub javascript: bool,

    /// Give up detecting a problem after this many seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Fall back to the site API when the page yields nothing
    #[serde(default = "default_true")]
    pub use_network: bool,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            javascript: false,
            timeout_secs: default_timeout(),
            use_network: default_true(),
        }
    }
}

fn default_timeout() -> u64 {
    12
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the profile location or use defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            return Ok(config);
        }
        Ok(Self::default())
    }

    /// Save configuration to the profile location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Settings file, falling back to the working directory without a profile
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("com", "leetcoach", "leetcoach")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".leetcoach").join("config.toml"))
    }

    /// Backend to talk to: environment, then file, then the local default
    pub fn backend_url(&self) -> String {
        resolve_backend_url(std::env::var(BACKEND_URL_ENV).ok(), self.backend_url.as_deref())
    }

    /// Read a setting by key
    pub fn get(&self, key: &str) -> Result<String> {
        Ok(match key {
            "backend_url" | "backend" => self.backend_url(),
            "javascript" | "js" => self.scrape.javascript.to_string(),
            "timeout" | "timeout_secs" => self.scrape.timeout_secs.to_string(),
            "use_network" | "network" => self.scrape.use_network.to_string(),
            _ => bail!("Unknown setting: {}", key),
        })
    }

    /// Change a setting in memory; call `save` to persist it
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "backend_url" | "backend" => {
                let value = value.trim();
                self.backend_url = if value.is_empty() {
                    None
                } else {
                    url::Url::parse(value)?;
                    Some(value.trim_end_matches('/').to_string())
                };
            }
            "javascript" | "js" => self.scrape.javascript = parse_bool(value)?,
            "timeout" | "timeout_secs" => self.scrape.timeout_secs = value.parse()?,
            "use_network" | "network" => self.scrape.use_network = parse_bool(value)?,
            _ => bail!("Unknown setting: {}", key),
        }
        Ok(())
    }
}

fn resolve_backend_url(env: Option<String>, stored: Option<&str>) -> String {
    env.filter(|v| !v.trim().is_empty())
        .or_else(|| stored.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => bail!("Expected true or false, got '{}'", value),
    }
}
