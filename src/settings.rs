use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;

/// Runtime settings: defaults, then `asylum.toml`, then `ASYLUM_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_state_index_path")]
    pub state_index_path: String,
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    #[serde(default)]
    pub proxy_key: Option<String>,
    #[serde(default = "default_completion_url")]
    pub completion_url: String,
    #[serde(default)]
    pub completion_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_state_delay_ms")]
    pub state_delay_ms: u64,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_extraction_delay_ms")]
    pub extraction_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://www.asylumprojects.org".into()
}
fn default_state_index_path() -> String {
    "/index.php?title=Category:United_States_of_America".into()
}
fn default_proxy_url() -> String {
    "https://api.scrapfly.io/scrape".into()
}
fn default_completion_url() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    10
}
fn default_state_delay_ms() -> u64 {
    3000
}
fn default_page_delay_ms() -> u64 {
    5000
}
fn default_extraction_delay_ms() -> u64 {
    1200
}
fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: default_base_url(),
            state_index_path: default_state_index_path(),
            proxy_url: default_proxy_url(),
            proxy_key: None,
            completion_url: default_completion_url(),
            completion_key: None,
            model: default_model(),
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            state_delay_ms: default_state_delay_ms(),
            page_delay_ms: default_page_delay_ms(),
            extraction_delay_ms: default_extraction_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// How many times a detail page is tried, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Minimum spacing between calls to each external dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub state_page: Duration,
    pub detail_page: Duration,
    pub extraction: Duration,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("asylum").required(false))
            .add_source(Environment::with_prefix("ASYLUM").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            state_page: Duration::from_millis(self.state_delay_ms),
            detail_page: Duration::from_millis(self.page_delay_ms),
            extraction: Duration::from_millis(self.extraction_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn state_index_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.state_index_path)
    }

    pub fn proxy_key(&self) -> Result<&str, ConfigError> {
        credential(&self.proxy_key, "PROXY_KEY")
    }

    pub fn completion_key(&self) -> Result<&str, ConfigError> {
        credential(&self.completion_key, "COMPLETION_KEY")
    }

    // ── Output layout ──

    pub fn state_links_path(&self) -> PathBuf {
        self.output_dir.join("state_links.csv")
    }

    pub fn facility_links_path(&self) -> PathBuf {
        self.output_dir.join("hospital_links.csv")
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.output_dir.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.output_dir.join("processed")
    }

    pub fn final_output_path(&self) -> PathBuf {
        self.output_dir.join("final_hospitals.csv")
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.log_dir.join("scraper.log")
    }
}

fn credential<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingCredential(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_empty() -> Settings {
        Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn empty_sources_match_default() {
        let s = from_empty();
        let d = Settings::default();
        assert_eq!(s.base_url, d.base_url);
        assert_eq!(s.output_dir, d.output_dir);
        assert_eq!(s.retry_policy(), d.retry_policy());
        assert_eq!(s.pacing(), d.pacing());
    }

    #[test]
    fn defaults_fill_every_field() {
        let s = Settings::default();
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.retry_policy().retry_delay, Duration::from_secs(10));
        assert_eq!(s.pacing().extraction, Duration::from_millis(1200));
        assert_eq!(
            s.state_index_url(),
            "https://www.asylumprojects.org/index.php?title=Category:United_States_of_America"
        );
        assert_eq!(s.final_output_path(), PathBuf::from("./output/final_hospitals.csv"));
        assert_eq!(s.log_file_path(), PathBuf::from("./logs/scraper.log"));
    }

    #[test]
    fn missing_or_blank_credentials_are_reported() {
        let mut s = Settings::default();
        assert!(matches!(
            s.proxy_key(),
            Err(ConfigError::MissingCredential("PROXY_KEY"))
        ));
        s.completion_key = Some("   ".into());
        assert!(s.completion_key().is_err());
        s.completion_key = Some("sk-test".into());
        assert_eq!(s.completion_key().unwrap(), "sk-test");
    }

    #[test]
    fn zero_retries_still_attempts_once() {
        let policy = RetryPolicy {
            max_retries: 0,
            retry_delay: Duration::ZERO,
        };
        assert_eq!(policy.attempts(), 1);
    }
}
