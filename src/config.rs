use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DownloaderError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.faang.org";
pub const DEFAULT_PAGE_SIZE: usize = 10_000;
pub const DEFAULT_MAX_WORKERS: usize = 8;
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 3600;
pub const API_URL_ENV: &str = "FAANG_API_URL";

const DEFAULT_CONFIG_FILE: &str = "faang-dl.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub transfer_timeout_secs: Option<u64>,
    #[serde(default)]
    pub download_location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base_url: String,
    pub page_size: usize,
    pub max_workers: usize,
    pub transfer_timeout: Duration,
    pub download_location: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            transfer_timeout: Duration::from_secs(DEFAULT_TRANSFER_TIMEOUT_SECS),
            download_location: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `faang-dl.json` from the working directory, or `path` when given.
    /// A missing default file is not an error; a missing explicit one is.
    pub fn resolve(path: Option<&str>) -> Result<Settings, DownloaderError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| DownloaderError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| DownloaderError::ConfigParse(err.to_string()))?
        };

        let mut settings = Self::resolve_config(config)?;
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                settings.api_base_url = normalize_base_url(&url);
            }
        }
        Ok(settings)
    }

    pub fn resolve_config(config: Config) -> Result<Settings, DownloaderError> {
        let defaults = Settings::default();

        let page_size = config.page_size.unwrap_or(defaults.page_size);
        if page_size == 0 {
            return Err(DownloaderError::ConfigParse(
                "page_size must be greater than zero".to_string(),
            ));
        }
        let max_workers = config.max_workers.unwrap_or(defaults.max_workers);
        if max_workers == 0 {
            return Err(DownloaderError::ConfigParse(
                "max_workers must be greater than zero".to_string(),
            ));
        }
        let transfer_timeout = match config.transfer_timeout_secs {
            Some(0) => {
                return Err(DownloaderError::ConfigParse(
                    "transfer_timeout_secs must be greater than zero".to_string(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.transfer_timeout,
        };

        Ok(Settings {
            api_base_url: config
                .api_base_url
                .as_deref()
                .map(normalize_base_url)
                .unwrap_or(defaults.api_base_url),
            page_size,
            max_workers,
            transfer_timeout,
            download_location: config
                .download_location
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
