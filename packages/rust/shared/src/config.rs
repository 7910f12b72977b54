//! Application configuration for leadharvest.
//!
//! User config lives at `~/.leadharvest/leadharvest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LeadHarvestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadharvest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadharvest";

// ---------------------------------------------------------------------------
// Config structs (matching leadharvest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// File locations.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Source platform endpoints and URL patterns.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Search and profile extraction timing.
    #[serde(default)]
    pub harvest: HarvestSection,

    /// Website email hunting.
    #[serde(default)]
    pub hunter: HunterSection,

    /// Batch scheduling.
    #[serde(default)]
    pub schedule: ScheduleSection,

    /// Embedding service.
    #[serde(default)]
    pub embedding: EmbeddingSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Persisted session file.
    #[serde(default = "default_session_path")]
    pub session_path: String,

    /// CSV export of leads with a discovered email. Empty disables export.
    #[serde(default = "default_export_path")]
    pub export_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            session_path: default_session_path(),
            export_path: default_export_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.leadharvest/leads.db".into()
}
fn default_session_path() -> String {
    "~/.leadharvest/session.json".into()
}
fn default_export_path() -> String {
    "live_sales_inventory.csv".into()
}

/// `[platform]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Origin of the source platform.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Registrable domain; links on it are never treated as external websites.
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Path of the organization search endpoint.
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// Query-string parameter carrying the free-text query.
    #[serde(default = "default_query_param")]
    pub query_param: String,

    /// Query-string parameter selecting a result page.
    #[serde(default = "default_page_param")]
    pub page_param: String,

    /// Substring identifying an organization profile link.
    #[serde(default = "default_profile_pattern")]
    pub profile_pattern: String,

    /// Sub-page of a profile holding the description and website.
    #[serde(default = "default_profile_suffix")]
    pub profile_suffix: String,

    /// Path the platform redirects to when the session has expired.
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            domain: default_domain(),
            search_path: default_search_path(),
            query_param: default_query_param(),
            page_param: default_page_param(),
            profile_pattern: default_profile_pattern(),
            profile_suffix: default_profile_suffix(),
            login_path: default_login_path(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.linkedin.com".into()
}
fn default_domain() -> String {
    "linkedin.com".into()
}
fn default_search_path() -> String {
    "/search/results/companies/".into()
}
fn default_query_param() -> String {
    "keywords".into()
}
fn default_page_param() -> String {
    "page".into()
}
fn default_profile_pattern() -> String {
    "/company/".into()
}
fn default_profile_suffix() -> String {
    "about/".into()
}
fn default_login_path() -> String {
    "/login".into()
}

/// Natural key used by the deduplication gate during harvesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// Platform profile URL (checked before any navigation).
    #[default]
    Source,
    /// Resolved organization website (checked after profile extraction).
    Website,
}

/// How the description text handed to the embedder is composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedTemplate {
    /// `Bio: {bio}`
    #[default]
    Bio,
    /// `{industry}: {bio}`
    IndustryBio,
}

/// `[harvest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSection {
    /// Number of load-more cycles after the first results page.
    #[serde(default = "default_scroll_cycles")]
    pub scroll_cycles: u32,

    /// Pause after each load-more cycle.
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,

    /// Pause after the first results page loads.
    #[serde(default = "default_initial_wait_ms")]
    pub initial_wait_ms: u64,

    /// Pause after a profile page loads, before extraction.
    #[serde(default = "default_profile_settle_ms")]
    pub profile_settle_ms: u64,

    /// Timeout for search and profile navigations.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Dedup key mode.
    #[serde(default)]
    pub key_mode: KeyMode,

    /// Embedding text template.
    #[serde(default)]
    pub embed_template: EmbedTemplate,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            scroll_cycles: default_scroll_cycles(),
            scroll_pause_ms: default_scroll_pause_ms(),
            initial_wait_ms: default_initial_wait_ms(),
            profile_settle_ms: default_profile_settle_ms(),
            navigation_timeout_secs: default_navigation_timeout(),
            key_mode: KeyMode::default(),
            embed_template: EmbedTemplate::default(),
        }
    }
}

fn default_scroll_cycles() -> u32 {
    3
}
fn default_scroll_pause_ms() -> u64 {
    1500
}
fn default_initial_wait_ms() -> u64 {
    4000
}
fn default_profile_settle_ms() -> u64 {
    2000
}
fn default_navigation_timeout() -> u64 {
    30
}

/// `[hunter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HunterSection {
    /// Timeout for each website navigation.
    #[serde(default = "default_hunter_timeout")]
    pub timeout_secs: u64,

    /// Candidates containing any of these (case-insensitive) are discarded.
    #[serde(default = "default_noise_tokens")]
    pub noise_tokens: Vec<String>,

    /// Link texts that mark a contact/about sub-page.
    #[serde(default = "default_contact_link_words")]
    pub contact_link_words: Vec<String>,

    /// Pause after the contact page loads.
    #[serde(default = "default_contact_settle_ms")]
    pub contact_settle_ms: u64,
}

impl Default for HunterSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_hunter_timeout(),
            noise_tokens: default_noise_tokens(),
            contact_link_words: default_contact_link_words(),
            contact_settle_ms: default_contact_settle_ms(),
        }
    }
}

fn default_hunter_timeout() -> u64 {
    15
}
fn default_noise_tokens() -> Vec<String> {
    [
        ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", "sentry", "example", "wixpress",
        "@domain.com", "yourname", "@email.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_contact_link_words() -> Vec<String> {
    ["contact", "about", "get in touch"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_contact_settle_ms() -> u64 {
    0
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSection {
    /// Units of work run concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Lower bound of the randomized pause between batches.
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: u64,

    /// Upper bound (inclusive) of the randomized pause between batches.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

fn default_batch_size() -> usize {
    3
}
fn default_min_delay() -> u64 {
    5
}
fn default_max_delay() -> u64 {
    10
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSection {
    /// OpenAI-compatible API base URL (`/embeddings` is appended).
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    /// Model name sent with each request.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Expected vector length.
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout.
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_endpoint() -> String {
    "http://localhost:8080/v1".into()
}
fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".into()
}
fn default_embedding_dimensions() -> usize {
    384
}
fn default_api_key_env() -> String {
    "LEADHARVEST_EMBEDDING_KEY".into()
}
fn default_embedding_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration for search harvesting and profile extraction.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub platform: PlatformConfig,
    pub scroll_cycles: u32,
    pub scroll_pause: Duration,
    pub initial_wait: Duration,
    pub profile_settle: Duration,
    pub navigation_timeout: Duration,
    pub key_mode: KeyMode,
    pub embed_template: EmbedTemplate,
}

impl From<&AppConfig> for HarvestConfig {
    fn from(config: &AppConfig) -> Self {
        let h = &config.harvest;
        Self {
            platform: config.platform.clone(),
            scroll_cycles: h.scroll_cycles,
            scroll_pause: Duration::from_millis(h.scroll_pause_ms),
            initial_wait: Duration::from_millis(h.initial_wait_ms),
            profile_settle: Duration::from_millis(h.profile_settle_ms),
            navigation_timeout: Duration::from_secs(h.navigation_timeout_secs),
            key_mode: h.key_mode,
            embed_template: h.embed_template,
        }
    }
}

/// Runtime configuration for the website email hunter.
#[derive(Debug, Clone)]
pub struct HunterConfig {
    /// Registrable domain of the source platform.
    pub platform_domain: String,
    pub timeout: Duration,
    pub noise_tokens: Vec<String>,
    pub contact_link_words: Vec<String>,
    pub contact_settle: Duration,
}

impl From<&AppConfig> for HunterConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            platform_domain: config.platform.domain.clone(),
            timeout: Duration::from_secs(config.hunter.timeout_secs),
            noise_tokens: config.hunter.noise_tokens.clone(),
            contact_link_words: config.hunter.contact_link_words.clone(),
            contact_settle: Duration::from_millis(config.hunter.contact_settle_ms),
        }
    }
}

/// Runtime configuration for batch scheduling.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub batch_size: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl ScheduleConfig {
    /// Reject bounds the scheduler cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(LeadHarvestError::config("schedule.batch_size must be at least 1"));
        }
        if self.min_delay > self.max_delay {
            return Err(LeadHarvestError::config(format!(
                "schedule.min_delay_secs ({}) exceeds max_delay_secs ({})",
                self.min_delay.as_secs(),
                self.max_delay.as_secs()
            )));
        }
        Ok(())
    }
}

impl From<&AppConfig> for ScheduleConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_size: config.schedule.batch_size,
            min_delay: Duration::from_secs(config.schedule.min_delay_secs),
            max_delay: Duration::from_secs(config.schedule.max_delay_secs),
        }
    }
}

/// Runtime configuration for the embedding client.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub dimensions: usize,
    /// Resolved from the env var named by `embedding.api_key_env`.
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl From<&AppConfig> for EmbeddingConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            endpoint: config.embedding.endpoint.clone(),
            model: config.embedding.model.clone(),
            dimensions: config.embedding.dimensions,
            api_key: embedding_api_key(config),
            timeout: Duration::from_secs(config.embedding.timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadharvest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadHarvestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadharvest/leadharvest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadHarvestError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LeadHarvestError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadHarvestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadHarvestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadHarvestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| LeadHarvestError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read the embedding API key from the configured env var, if set.
pub fn embedding_api_key(config: &AppConfig) -> Option<String> {
    std::env::var(&config.embedding.api_key_env)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("session_path"));
        assert!(toml_str.contains("LEADHARVEST_EMBEDDING_KEY"));
        assert!(toml_str.contains("batch_size"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.harvest.scroll_cycles, 3);
        assert_eq!(parsed.schedule.batch_size, 3);
        assert_eq!(parsed.hunter.timeout_secs, 15);
        assert_eq!(parsed.harvest.key_mode, KeyMode::Source);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_str = r#"
[schedule]
batch_size = 5

[harvest]
key_mode = "website"
embed_template = "industry_bio"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.schedule.batch_size, 5);
        assert_eq!(config.schedule.min_delay_secs, 5);
        assert_eq!(config.harvest.key_mode, KeyMode::Website);
        assert_eq!(config.harvest.embed_template, EmbedTemplate::IndustryBio);
        assert_eq!(config.platform.domain, "linkedin.com");
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();

        let harvest = HarvestConfig::from(&app);
        assert_eq!(harvest.scroll_pause, Duration::from_millis(1500));
        assert_eq!(harvest.navigation_timeout, Duration::from_secs(30));

        let hunter = HunterConfig::from(&app);
        assert_eq!(hunter.timeout, Duration::from_secs(15));
        assert!(hunter.noise_tokens.iter().any(|t| t == "sentry"));
        assert_eq!(hunter.platform_domain, "linkedin.com");

        let schedule = ScheduleConfig::from(&app);
        assert_eq!(schedule.batch_size, 3);
        assert_eq!(schedule.min_delay, Duration::from_secs(5));
        assert_eq!(schedule.max_delay, Duration::from_secs(10));
        assert!(schedule.validate().is_ok());
    }

    #[test]
    fn schedule_validation() {
        let mut schedule = ScheduleConfig::from(&AppConfig::default());
        schedule.batch_size = 0;
        assert!(schedule.validate().is_err());

        schedule.batch_size = 3;
        schedule.min_delay = Duration::from_secs(20);
        let err = schedule.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/leads.db").unwrap(), PathBuf::from("/tmp/leads.db"));
        assert!(expand_home("~/leads.db").unwrap().ends_with("leads.db"));
    }

    #[test]
    fn api_key_lookup() {
        let mut config = AppConfig::default();
        config.embedding.api_key_env = "LH_TEST_NONEXISTENT_KEY_12345".into();
        assert!(embedding_api_key(&config).is_none());

        let runtime = EmbeddingConfig::from(&config);
        assert!(runtime.api_key.is_none());
        assert_eq!(runtime.dimensions, 384);
        assert_eq!(runtime.timeout, Duration::from_secs(30));
    }
}
