use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Result, WrapErr};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::batch::{DEFAULT_LANGUAGE, DEFAULT_MAX_CONCURRENCY};
use crate::summarize::DEFAULT_SUMMARIZE_TIMEOUT;
use crate::youtube::{ClientSettings, DEFAULT_REQUEST_TIMEOUT};

pub const DEFAULT_IP: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub default_lang: Option<String>,
    pub default_format: Option<String>,
    pub default_model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_concurrency: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub summarize_timeout_secs: Option<u64>,
    pub batch_timeout_secs: Option<u64>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub base_url: Option<String>,
    pub client_name: Option<String>,
    pub client_version: Option<String>,
}

impl Config {
    /// Load config from ~/.config/ytldr/config.toml if it exists
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(path)?;
            let config: Config =
                toml::from_str(&content).wrap_err_with(|| format!("invalid config file {}", path.display()))?;
            Ok(config)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    pub fn language(&self) -> &str {
        self.default_lang.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY).max(1)
    }

    pub fn summarize_timeout(&self) -> Duration {
        self.summarize_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SUMMARIZE_TIMEOUT)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }

    pub fn client_settings(&self) -> ClientSettings {
        let defaults = ClientSettings::default();
        ClientSettings {
            base_url: self.base_url.clone().unwrap_or(defaults.base_url),
            client_name: self.client_name.clone().unwrap_or(defaults.client_name),
            client_version: self.client_version.clone().unwrap_or(defaults.client_version),
            request_timeout: self
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytldr")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
default_lang = "es"
default_format = "json"
default_model = "gemini-2.0-flash"
max_concurrency = 8
request_timeout_secs = 5
batch_timeout_secs = 300
port = 9000
client_version = "2.20250101.00.00"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.language(), "es");
        assert_eq!(config.default_format.as_deref(), Some("json"));
        assert_eq!(config.default_model.as_deref(), Some("gemini-2.0-flash"));
        assert_eq!(config.max_concurrency(), 8);
        assert_eq!(config.batch_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.port, Some(9000));

        let settings = config.client_settings();
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.client_version, "2.20250101.00.00");
        assert_eq!(settings.base_url, crate::youtube::DEFAULT_BASE_URL);
    }

    #[test]
    fn test_parse_empty_config() {
        let toml_str = "";
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.language(), "en");
        assert_eq!(config.max_concurrency(), DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.summarize_timeout(), DEFAULT_SUMMARIZE_TIMEOUT);
        assert!(config.batch_timeout().is_none());
        assert_eq!(config.client_settings().request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"default_lang = "fr""#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_lang.as_deref(), Some("fr"));
        assert!(config.default_model.is_none());
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let config: Config = toml::from_str("max_concurrency = 0").unwrap();
        assert_eq!(config.max_concurrency(), 1);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(Path::new("/definitely/not/here/config.toml")).unwrap();
        assert!(config.default_lang.is_none());
    }
}
