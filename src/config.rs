use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub timeout_secs: u64,
    pub data_dir: PathBuf,
}

/// Optional overrides read from `config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    timeout_secs: Option<u64>,
    data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Defaults, then the user config file, then the CLI/environment value.
    pub fn load(api_url_override: Option<&str>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = default_config_path() {
            if path.exists() {
                config = config.merge_file(&path)?;
            }
        }
        if let Some(url) = api_url_override {
            config.api_url = url.to_string();
        }
        config.api_url = normalize_url(&config.api_url);
        Ok(config)
    }

    fn merge_file(self, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        self.merge_toml(&raw)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    fn merge_toml(mut self, raw: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(raw)?;
        if let Some(url) = file.api_url {
            self.api_url = url;
        }
        if let Some(timeout) = file.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(dir) = file.data_dir {
            self.data_dir = dir;
        }
        Ok(self)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("resumex.db")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("resumex.log")
    }
}

fn default_data_dir() -> PathBuf {
    // XDG data directory, or the current directory as a fallback
    match directories::ProjectDirs::from("", "", "resumex") {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => PathBuf::from("."),
    }
}

fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "resumex")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
