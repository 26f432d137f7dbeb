//! Application configuration for confbot.
//!
//! User config lives at `~/.confbot/confbot.toml` (or any path passed with
//! `--config`). Environment variables override file values, which override
//! defaults. API keys are never stored in the file: the config names the
//! environment variable that holds them.

use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfbotError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "confbot.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".confbot";

/// Environment overrides, as (variable, field) pairs applied by
/// [`AppConfig::apply_overrides`].
const ENV_CACHE_DIR: &str = "CONFBOT_CACHE_DIR";
const ENV_MODEL: &str = "CONFBOT_MODEL";
const ENV_FEED_URL: &str = "CONFBOT_FEED_URL";
const ENV_FAQ_URL: &str = "CONFBOT_FAQ_URL";

// ---------------------------------------------------------------------------
// Config structs (matching confbot.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache locations and freshness windows.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Batch scheduling.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Pages, FAQ, and feed to crawl.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Chat prompt settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Append-only event log locations.
    #[serde(default)]
    pub logs: LogsConfig,
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory holding `raw-html/`, `extracted-data/`, and the JSON state files.
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,

    /// Max age of raw fetched pages.
    #[serde(default = "default_day_hours")]
    pub raw_max_age_hours: u64,

    /// Max age of cleaned (extracted) content.
    #[serde(default = "default_day_hours")]
    pub cleaned_max_age_hours: u64,

    /// Max age of the feed snapshot when read through at chat time.
    #[serde(default = "default_feed_max_age_minutes")]
    pub feed_max_age_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
            raw_max_age_hours: default_day_hours(),
            cleaned_max_age_hours: default_day_hours(),
            feed_max_age_minutes: default_feed_max_age_minutes(),
        }
    }
}

/// Upper bound for any configured age or interval, in hours (100 years).
pub const MAX_HOURS: u64 = 24 * 365 * 100;
/// [`MAX_HOURS`] in minutes.
pub const MAX_MINUTES: u64 = MAX_HOURS * 60;

// Clamped to the bound; `validate()` rejects anything above it.
fn hours(value: u64) -> TimeDelta {
    TimeDelta::hours(value.min(MAX_HOURS) as i64)
}

fn minutes(value: u64) -> TimeDelta {
    TimeDelta::minutes(value.min(MAX_MINUTES) as i64)
}

fn check_range(field: &str, value: u64, max: u64) -> Result<()> {
    if value == 0 {
        return Err(ConfbotError::config(format!("{field} must be greater than 0")));
    }
    if value > max {
        return Err(ConfbotError::config(format!(
            "{field} must be at most {max}, got {value}"
        )));
    }
    Ok(())
}

impl CacheConfig {
    pub fn raw_max_age(&self) -> TimeDelta {
        hours(self.raw_max_age_hours)
    }

    pub fn cleaned_max_age(&self) -> TimeDelta {
        hours(self.cleaned_max_age_hours)
    }

    pub fn feed_max_age(&self) -> TimeDelta {
        minutes(self.feed_max_age_minutes)
    }
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("cache")
}
fn default_day_hours() -> u64 {
    24
}
fn default_feed_max_age_minutes() -> u64 {
    60
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minimum time between two successful batch runs.
    #[serde(default = "default_day_hours")]
    pub interval_hours: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_day_hours(),
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> TimeDelta {
        hours(self.interval_hours)
    }
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Pages crawled and extracted on every batch, in order.
    #[serde(default)]
    pub urls: Vec<String>,

    /// FAQ page, extracted with the question/answer prompt.
    #[serde(default)]
    pub faq_url: String,

    /// Structured session/speaker feed (JSON).
    #[serde(default)]
    pub feed_url: String,

    /// Boilerplate sections the extraction prompt asks the model to drop.
    #[serde(default = "default_exclude_sections")]
    pub exclude_sections: Vec<String>,

    /// HTTP timeout for page and feed fetches.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            faq_url: String::new(),
            feed_url: String::new(),
            exclude_sections: default_exclude_sections(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_exclude_sections() -> Vec<String> {
    vec!["footer".into(), "footnote".into(), "disclaimer".into()]
}
fn default_fetch_timeout_secs() -> u64 {
    30
}

/// Provider family, inferred from the model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    OpenAi,
    Gemini,
}

impl ModelFamily {
    /// Infer the provider from a model name (`gpt-*` or `gemini-*`).
    pub fn from_model(model: &str) -> Option<Self> {
        if model.starts_with("gpt-") {
            Some(Self::OpenAi)
        } else if model.starts_with("gemini-") {
            Some(Self::Gemini)
        } else {
            None
        }
    }

    /// Environment variable conventionally holding this provider's key.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model used for both extraction and chat.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key. Defaults per provider family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Override of the provider's API base URL (proxies, tests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Output token cap for chat replies.
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,

    /// Output token cap for extraction calls.
    #[serde(default = "default_extraction_max_tokens")]
    pub extraction_max_tokens: u32,

    /// Advisory price per million input tokens, in USD.
    #[serde(default = "default_input_price")]
    pub input_price_per_million: f64,

    /// Advisory price per million output tokens, in USD.
    #[serde(default = "default_output_price")]
    pub output_price_per_million: f64,

    /// HTTP timeout for provider calls.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: None,
            base_url: None,
            chat_max_tokens: default_chat_max_tokens(),
            extraction_max_tokens: default_extraction_max_tokens(),
            input_price_per_million: default_input_price(),
            output_price_per_million: default_output_price(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Provider family for the configured model.
    pub fn family(&self) -> Result<ModelFamily> {
        ModelFamily::from_model(&self.model).ok_or_else(|| {
            ConfbotError::config(format!(
                "unknown model '{}': expected a gpt-* or gemini-* model",
                self.model
            ))
        })
    }

    /// Env var to read the API key from.
    pub fn api_key_env(&self) -> Result<String> {
        match &self.api_key_env {
            Some(name) => Ok(name.clone()),
            None => Ok(self.family()?.default_api_key_env().to_string()),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_chat_max_tokens() -> u32 {
    500
}
fn default_extraction_max_tokens() -> u32 {
    1500
}
fn default_input_price() -> f64 {
    0.15
}
fn default_output_price() -> f64 {
    0.60
}
fn default_llm_timeout_secs() -> u64 {
    60
}

/// `[chat]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// File holding the system prompt. A built-in prompt is used when unreadable.
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: PathBuf,

    /// Name of the event, used to label the knowledge block in the prompt.
    #[serde(default = "default_event_name")]
    pub event_name: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt_path: default_system_prompt_path(),
            event_name: default_event_name(),
        }
    }
}

fn default_system_prompt_path() -> PathBuf {
    PathBuf::from("ai_prompt.txt")
}
fn default_event_name() -> String {
    "Conference".into()
}

/// `[logs]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    /// One line per answered chat message.
    #[serde(default = "default_interaction_log")]
    pub interaction_log: PathBuf,

    /// One line per completed extraction.
    #[serde(default = "default_extraction_log")]
    pub extraction_log: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            interaction_log: default_interaction_log(),
            extraction_log: default_extraction_log(),
        }
    }
}

fn default_interaction_log() -> PathBuf {
    PathBuf::from("confbot.log")
}
fn default_extraction_log() -> PathBuf {
    PathBuf::from("confbot-extraction.log")
}

// ---------------------------------------------------------------------------
// Overrides & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache.root = PathBuf::from(dir);
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.llm.model = model;
        }
        if let Some(url) = lookup(ENV_FEED_URL) {
            self.sources.feed_url = url;
        }
        if let Some(url) = lookup(ENV_FAQ_URL) {
            self.sources.faq_url = url;
        }
    }

    /// Check values that must hold for any command.
    pub fn validate(&self) -> Result<()> {
        check_range("cache.raw_max_age_hours", self.cache.raw_max_age_hours, MAX_HOURS)?;
        check_range(
            "cache.cleaned_max_age_hours",
            self.cache.cleaned_max_age_hours,
            MAX_HOURS,
        )?;
        check_range(
            "cache.feed_max_age_minutes",
            self.cache.feed_max_age_minutes,
            MAX_MINUTES,
        )?;
        check_range("schedule.interval_hours", self.schedule.interval_hours, MAX_HOURS)?;

        self.llm.family()?;

        for url in &self.sources.urls {
            parse_source_url("sources.urls", url)?;
        }
        if !self.sources.faq_url.is_empty() {
            parse_source_url("sources.faq_url", &self.sources.faq_url)?;
        }
        if !self.sources.feed_url.is_empty() {
            parse_source_url("sources.feed_url", &self.sources.feed_url)?;
        }

        Ok(())
    }

    /// Check that everything a batch run needs is configured.
    pub fn require_sources(&self) -> Result<()> {
        if self.sources.urls.is_empty() {
            return Err(ConfbotError::config(
                "sources.urls is empty: add the pages to crawl to the config file",
            ));
        }
        if self.sources.faq_url.is_empty() {
            return Err(ConfbotError::config(format!(
                "sources.faq_url is not set (config file or {ENV_FAQ_URL})"
            )));
        }
        if self.sources.feed_url.is_empty() {
            return Err(ConfbotError::config(format!(
                "sources.feed_url is not set (config file or {ENV_FEED_URL})"
            )));
        }
        Ok(())
    }
}

fn parse_source_url(field: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| ConfbotError::config(format!("{field}: invalid URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfbotError::config(format!(
            "{field}: unsupported scheme '{scheme}' in '{raw}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.confbot/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ConfbotError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.confbot/confbot.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from the default location. Uses defaults if
/// the file does not exist. Environment overrides are applied and the result
/// validated.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        let mut config = AppConfig::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        return Ok(config);
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path, then apply
/// environment overrides and validate.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfbotError::io(path, e))?;

    let mut config: AppConfig = toml::from_str(&content).map_err(|e| {
        ConfbotError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ConfbotError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ConfbotError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ConfbotError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the provider API key from the environment variable the config names.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = config.llm.api_key_env()?;
    match std::env::var(&var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ConfbotError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("raw_max_age_hours"));
        assert!(toml_str.contains("gpt-4o-mini"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.cache.raw_max_age_hours, 24);
        assert_eq!(parsed.cache.feed_max_age_minutes, 60);
        assert_eq!(parsed.sources.exclude_sections, vec!["footer", "footnote", "disclaimer"]);
    }

    #[test]
    fn config_with_sources() {
        let toml_str = r#"
[cache]
root = "/var/lib/confbot"
feed_max_age_minutes = 5

[sources]
urls = ["https://conf.example.org/", "https://conf.example.org/keynotes/"]
faq_url = "https://conf.example.org/faq/"
feed_url = "https://feed.example.org/api/v2/abc/view/All"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.sources.urls.len(), 2);
        assert_eq!(config.cache.root, PathBuf::from("/var/lib/confbot"));
        assert_eq!(config.cache.feed_max_age(), TimeDelta::minutes(5));
        assert_eq!(config.cache.raw_max_age(), TimeDelta::hours(24));
        assert!(config.validate().is_ok());
        assert!(config.require_sources().is_ok());
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CONFBOT_CACHE_DIR", "/tmp/confbot-cache"),
            ("CONFBOT_MODEL", "gemini-1.5-flash"),
            ("CONFBOT_FEED_URL", "https://feed.example.org/all"),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.cache.root, PathBuf::from("/tmp/confbot-cache"));
        assert_eq!(config.llm.model, "gemini-1.5-flash");
        assert_eq!(config.sources.feed_url, "https://feed.example.org/all");
        assert!(config.sources.faq_url.is_empty());
    }

    #[test]
    fn validate_rejects_zero_max_age() {
        let mut config = AppConfig::default();
        config.cache.raw_max_age_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_durations() {
        let mut config = AppConfig::default();
        config.cache.feed_max_age_minutes = MAX_MINUTES + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.feed_max_age_minutes"));

        let mut config = AppConfig::default();
        config.schedule.interval_hours = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cache.cleaned_max_age_hours = MAX_HOURS;
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.cleaned_max_age(), TimeDelta::hours(MAX_HOURS as i64));
    }

    #[test]
    fn huge_max_age_in_file_is_rejected_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("confbot.toml");
        std::fs::write(&path, "[cache]\nraw_max_age_hours = 3000000000000000\n").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("cache.raw_max_age_hours"));
    }

    #[test]
    fn duration_accessors_never_panic() {
        let mut config = AppConfig::default();
        config.cache.raw_max_age_hours = u64::MAX;
        config.cache.feed_max_age_minutes = u64::MAX;
        config.schedule.interval_hours = u64::MAX;
        assert_eq!(config.cache.raw_max_age(), TimeDelta::hours(MAX_HOURS as i64));
        assert_eq!(config.cache.feed_max_age(), TimeDelta::minutes(MAX_MINUTES as i64));
        assert_eq!(config.schedule.interval(), TimeDelta::hours(MAX_HOURS as i64));
    }

    #[test]
    fn validate_rejects_unknown_model() {
        let mut config = AppConfig::default();
        config.llm.model = "llama-3".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown model"));
    }

    #[test]
    fn validate_rejects_bad_url() {
        let mut config = AppConfig::default();
        config.sources.urls = vec!["not a url".into()];
        assert!(config.validate().is_err());

        config.sources.urls = vec!["ftp://conf.example.org/".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn require_sources_reports_missing_feed() {
        let mut config = AppConfig::default();
        config.sources.urls = vec!["https://conf.example.org/".into()];
        config.sources.faq_url = "https://conf.example.org/faq/".into();
        let err = config.require_sources().unwrap_err();
        assert!(err.to_string().contains("feed_url"));
    }

    #[test]
    fn model_family_inference() {
        assert_eq!(ModelFamily::from_model("gpt-4o-mini"), Some(ModelFamily::OpenAi));
        assert_eq!(ModelFamily::from_model("gemini-1.5-flash"), Some(ModelFamily::Gemini));
        assert_eq!(ModelFamily::from_model("claude"), None);
    }

    #[test]
    fn api_key_env_defaults_per_family() {
        let mut llm = LlmConfig::default();
        assert_eq!(llm.api_key_env().unwrap(), "OPENAI_API_KEY");
        llm.model = "gemini-1.5-flash".into();
        assert_eq!(llm.api_key_env().unwrap(), "GEMINI_API_KEY");
        llm.api_key_env = Some("MY_KEY".into());
        assert_eq!(llm.api_key_env().unwrap(), "MY_KEY");
    }

    #[test]
    fn api_key_resolution_fails_when_unset() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = Some("CONFBOT_TEST_NONEXISTENT_KEY_12345".into());
        let result = resolve_api_key(&config);
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("confbot.toml");
        std::fs::write(
            &path,
            "[schedule]\ninterval_hours = 12\n\n[llm]\nchat_max_tokens = 200\n",
        )
        .expect("write config");

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.schedule.interval(), TimeDelta::hours(12));
        assert_eq!(config.llm.chat_max_tokens, 200);
        assert_eq!(config.llm.extraction_max_tokens, 1500);
    }

    #[test]
    fn load_config_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[cache\nroot = ").expect("write config");
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
