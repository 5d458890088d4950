use crate::errors::ConfigError;
use crate::filter::{BlacklistMode, DEFAULT_AGENCY_KEYWORDS};
use crate::scraper::{RenderOptions, RendererKind};
use anyhow::{Context, Result};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Listing site configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// Path segment that page N ≥ 2 rewrites into `<segment>/strana-N`.
    #[serde(default = "default_page_segment")]
    pub page_segment: String,

    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_location")]
    pub default_location: String,

    /// `browser` (headless Chrome) or `http` (static fetch).
    #[serde(default)]
    pub renderer: RendererKind,

    /// Upper bound on waiting for the document to stop changing.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_scroll_passes")]
    pub scroll_passes: u32,

    #[serde(default = "default_scroll_step_px")]
    pub scroll_step_px: u32,

    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,
}

/// Seller filtering configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Comma-separated string or list.
    #[serde(default, deserialize_with = "string_or_list")]
    pub blacklist: Vec<String>,

    /// Extra entries, separated by commas and/or newlines.
    #[serde(default)]
    pub blacklist_file: Option<PathBuf>,

    #[serde(default)]
    pub blacklist_mode: BlacklistMode,

    #[serde(default = "default_agency_keywords", deserialize_with = "string_or_list")]
    pub agency_keywords: Vec<String>,
}

/// Telegram delivery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub telegram_token: String,

    #[serde(default)]
    pub telegram_chat_id: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_send_pause_ms")]
    pub send_pause_ms: u64,

    #[serde(default = "default_caption_limit")]
    pub caption_limit: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

/// Poll loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_target_url() -> String {
    "https://estitor.com/me/prodaja/stanovi/grad-podgorica".to_string()
}
fn default_page_segment() -> String {
    "/grad-podgorica".to_string()
}
fn default_max_pages() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    90
}
fn default_request_delay_ms() -> u64 {
    1500
}
fn default_jitter_ms() -> u64 {
    500
}
fn default_max_retries() -> u32 {
    2
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) estate-watch/0.1".to_string()
}
fn default_location() -> String {
    "Podgorica".to_string()
}
fn default_settle_ms() -> u64 {
    5000
}
fn default_scroll_passes() -> u32 {
    10
}
fn default_scroll_step_px() -> u32 {
    2500
}
fn default_scroll_pause_ms() -> u64 {
    2000
}
fn default_agency_keywords() -> Vec<String> {
    DEFAULT_AGENCY_KEYWORDS.iter().map(|s| s.to_string()).collect()
}
fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_send_pause_ms() -> u64 {
    1000
}
fn default_caption_limit() -> usize {
    1000
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/listings.duckdb")
}
fn default_interval_minutes() -> u64 {
    45
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            page_segment: default_page_segment(),
            max_pages: default_max_pages(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            default_location: default_location(),
            renderer: RendererKind::default(),
            settle_ms: default_settle_ms(),
            scroll_passes: default_scroll_passes(),
            scroll_step_px: default_scroll_step_px(),
            scroll_pause_ms: default_scroll_pause_ms(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            blacklist: Vec::new(),
            blacklist_file: None,
            blacklist_mode: BlacklistMode::default(),
            agency_keywords: default_agency_keywords(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            telegram_chat_id: String::new(),
            api_base: default_api_base(),
            send_pause_ms: default_send_pause_ms(),
            caption_limit: default_caption_limit(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            filter: FilterConfig::default(),
            notifier: NotifierConfig::default(),
            storage: StorageConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

// ── "a, b" or ["a", "b"] ─────────────────────────────────────────────────────

pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrList;

    impl<'de> Visitor<'de> for StringOrList {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a comma-separated string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
            Ok(split_list(v))
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                out.extend(split_list(&item));
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(StringOrList)
}

// ── Loader ───────────────────────────────────────────────────────────────────

/// Unprefixed variable names still honoured → config keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("TARGET_URL", "scraper.target_url"),
    ("MAX_PAGES", "scraper.max_pages"),
    ("CRAWL_INTERVAL_MINUTES", "schedule.interval_minutes"),
    ("CRNA_LISTA", "filter.blacklist"),
    ("TELEGRAM_TOKEN", "notifier.telegram_token"),
    ("TELEGRAM_CHAT_ID", "notifier.telegram_chat_id"),
];

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("ESTATE")
                    .prefix_separator("_")
                    .separator("__"),
            );

        for (var, key) in LEGACY_ENV {
            builder = builder
                .set_override_option(*key, std::env::var(var).ok())
                .with_context(|| format!("Bad value in ${}", var))?;
        }

        let app_cfg: AppConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        app_cfg.validate()?;
        Ok(app_cfg)
    }

    /// Checks every command relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let target = &self.scraper.target_url;
        let parsed = url::Url::parse(target).map_err(|e| ConfigError::TargetUrl {
            url: target.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::TargetUrl {
                url: target.clone(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        if self.scraper.max_pages > 1 && !target.contains(&self.scraper.page_segment) {
            return Err(ConfigError::TargetUrl {
                url: target.clone(),
                reason: format!("does not contain page segment {:?}", self.scraper.page_segment),
            });
        }
        if self.scraper.max_pages == 0 {
            return Err(ConfigError::Zero { field: "scraper.max_pages" });
        }
        if self.schedule.interval_minutes == 0 {
            return Err(ConfigError::Zero { field: "schedule.interval_minutes" });
        }
        if self.notifier.caption_limit == 0 {
            return Err(ConfigError::Zero { field: "notifier.caption_limit" });
        }
        Ok(())
    }

    /// Extra checks for commands that deliver notifications.
    pub fn validate_for_delivery(&self) -> Result<(), ConfigError> {
        if self.notifier.telegram_token.trim().is_empty() {
            return Err(ConfigError::MissingCredential("TELEGRAM_TOKEN"));
        }
        if self.notifier.telegram_chat_id.trim().is_empty() {
            return Err(ConfigError::MissingCredential("TELEGRAM_CHAT_ID"));
        }
        Ok(())
    }
}

impl ScraperConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            timeout: self.fetch_timeout(),
            settle: Duration::from_millis(self.settle_ms),
            scroll_passes: self.scroll_passes,
            scroll_step_px: self.scroll_step_px,
            scroll_pause: Duration::from_millis(self.scroll_pause_ms),
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}
