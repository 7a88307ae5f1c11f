//! Configuration loader and validator for the badge generator.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema. Every section falls
/// back to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub scholar: Scholar,
    pub web_of_science: WebOfScience,
    pub badges: Badges,
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub output_dir: String,
    pub metadata_file: String,
    pub update_flag_file: String,
    pub summary_file: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            output_dir: "dist".into(),
            metadata_file: "metadata.json".into(),
            update_flag_file: "updated.txt".into(),
            summary_file: "summary.md".into(),
        }
    }
}

/// Google Scholar endpoint and retry budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Scholar {
    pub base_url: String,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_seconds: u64,
}

impl Default for Scholar {
    fn default() -> Self {
        Self {
            base_url: "https://scholar.google.com/".into(),
            max_attempts: 5,
            base_backoff_ms: 1000,
            max_backoff_seconds: 60,
        }
    }
}

/// Web of Science profile page and the WebDriver used to render it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebOfScience {
    pub base_url: String,
    pub webdriver_url: String,
    pub headless: bool,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for WebOfScience {
    fn default() -> Self {
        Self {
            base_url: "https://www.webofscience.com/".into(),
            webdriver_url: "http://localhost:9515/".into(),
            headless: true,
            poll_attempts: 10,
            poll_interval_ms: 1000,
        }
    }
}

/// Badge rendering service and colors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Badges {
    pub base_url: String,
    pub style: String,
    pub citation_color: String,
    pub review_color: String,
}

impl Default for Badges {
    fn default() -> Self {
        Self {
            base_url: "https://img.shields.io/".into(),
            style: "flat-square".into(),
            citation_color: "3388ee".into(),
            review_color: "8A2BE2".into(),
        }
    }
}

impl App {
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.output_path().join(&self.metadata_file)
    }

    pub fn update_flag_path(&self) -> PathBuf {
        self.output_path().join(&self.update_flag_file)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_path().join(&self.summary_file)
    }
}

impl WebOfScience {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.output_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.output_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.output_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, the built-in defaults are used.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let cfg = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        }
        None => Config::default(),
    };
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.output_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.output_dir must be non-empty"));
    }
    if cfg.app.metadata_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.metadata_file must be non-empty"));
    }
    if cfg.app.update_flag_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.update_flag_file must be non-empty"));
    }
    if cfg.app.summary_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.summary_file must be non-empty"));
    }

    if cfg.scholar.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("scholar.base_url must be non-empty"));
    }
    if Url::parse(cfg.scholar.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("scholar.base_url must be a valid URL"));
    }
    if cfg.scholar.max_attempts == 0 {
        return Err(ConfigError::Invalid("scholar.max_attempts must be > 0"));
    }

    if cfg.web_of_science.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("web_of_science.base_url must be non-empty"));
    }
    if Url::parse(cfg.web_of_science.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("web_of_science.base_url must be a valid URL"));
    }
    if cfg.web_of_science.webdriver_url.trim().is_empty() {
        return Err(ConfigError::Invalid("web_of_science.webdriver_url must be non-empty"));
    }
    if Url::parse(cfg.web_of_science.webdriver_url.trim()).is_err() {
        return Err(ConfigError::Invalid("web_of_science.webdriver_url must be a valid URL"));
    }
    if cfg.web_of_science.poll_attempts == 0 {
        return Err(ConfigError::Invalid("web_of_science.poll_attempts must be > 0"));
    }

    if cfg.badges.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("badges.base_url must be non-empty"));
    }
    if Url::parse(cfg.badges.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("badges.base_url must be a valid URL"));
    }
    if cfg.badges.citation_color.trim().is_empty() || cfg.badges.review_color.trim().is_empty() {
        return Err(ConfigError::Invalid("badges colors must be non-empty"));
    }

    Ok(())
}

/// Example YAML matching the built-in defaults.
pub fn example() -> &'static str {
    r#"app:
  output_dir: "dist"
  metadata_file: "metadata.json"
  update_flag_file: "updated.txt"
  summary_file: "summary.md"

scholar:
  base_url: "https://scholar.google.com/"
  max_attempts: 5
  base_backoff_ms: 1000
  max_backoff_seconds: 60

web_of_science:
  base_url: "https://www.webofscience.com/"
  webdriver_url: "http://localhost:9515/"
  headless: true
  poll_attempts: 10
  poll_interval_ms: 1000

badges:
  base_url: "https://img.shields.io/"
  style: "flat-square"
  citation_color: "3388ee"
  review_color: "8A2BE2"
"#
}
