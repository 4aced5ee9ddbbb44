use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18620;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Hard cap on LLM round-trips per conversational turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 6;
/// Whole-turn deadline in seconds.
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 30;
/// Per-LLM-call deadline in seconds.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 8;
/// Per-database-call deadline in seconds.
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 3;
/// Orders older than this (completed/cancelled) are moved to the cold store.
pub const DEFAULT_ARCHIVE_AGE_HOURS: i64 = 24;
/// Sessions idle past this many minutes are reaped to `closed`.
pub const DEFAULT_SESSION_IDLE_MINUTES: i64 = 120;
/// Business-level fallback for the customer cancellation window.
pub const DEFAULT_CANCEL_HOURS: i64 = 2;

/// Top-level config (plaza.toml + PLAZA_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlazaConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Static bearer tokens mapped to principal ids in the `users` table.
    /// Token issuance (JWT service) is external to this process.
    #[serde(default)]
    pub api_tokens: Vec<ApiTokenConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            api_tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTokenConfig {
    pub token: String,
    /// Id of the principal row this token authenticates as.
    pub principal_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Operational store (carts, orders, reservations, sessions, tickets).
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Cold store holding immutable order logs.
    #[serde(default = "default_archive_db_path")]
    pub archive_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            archive_path: default_archive_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,
    #[serde(default = "default_db_timeout")]
    pub db_timeout_secs: u64,
    /// How many recent conversation turns are replayed into the prompt.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    /// Fallback UTC offset (minutes) for tenants without one configured.
    #[serde(default)]
    pub default_tz_offset_minutes: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            turn_timeout_secs: DEFAULT_TURN_TIMEOUT_SECS,
            db_timeout_secs: DEFAULT_DB_TIMEOUT_SECS,
            history_turns: default_history_turns(),
            default_tz_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: i64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_minutes: DEFAULT_SESSION_IDLE_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Cron expression for the daily archive sweep. Only the minute and hour
    /// fields are honoured (see plaza-scheduler).
    #[serde(default = "default_archive_cron")]
    pub job_cron: String,
    #[serde(default = "default_archive_age_hours")]
    pub order_age_hours: i64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            job_cron: default_archive_cron(),
            order_age_hours: DEFAULT_ARCHIVE_AGE_HOURS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    pub whatsapp: Option<ChannelWebhookConfig>,
    pub telegram: Option<ChannelWebhookConfig>,
    pub instagram: Option<ChannelWebhookConfig>,
    pub facebook: Option<ChannelWebhookConfig>,
}

/// How an inbound webhook delivery is authenticated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WebhookAuthMode {
    /// HMAC-SHA256 over the raw request body (Meta-style X-Hub-Signature-256).
    HmacSha256,
    /// Static token in the x-verify-token header.
    #[default]
    VerifyToken,
}

/// Inbound webhook settings for one platform. The outbound credentials
/// (access token, page/phone id) live per tenant in `bot_integrations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelWebhookConfig {
    /// Echoed during the GET subscription handshake; also the POST credential
    /// in `verify-token` mode.
    pub verify_token: String,
    #[serde(default)]
    pub auth_mode: WebhookAuthMode,
    /// HMAC signing secret (the platform app secret). Required in
    /// `hmac-sha256` mode.
    pub app_secret: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.plaza/plaza.db", home)
}
fn default_archive_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.plaza/order_logs.db", home)
}
fn default_llm_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_llm_timeout() -> u64 {
    DEFAULT_LLM_TIMEOUT_SECS
}
fn default_max_tool_rounds() -> u32 {
    DEFAULT_MAX_TOOL_ROUNDS
}
fn default_turn_timeout() -> u64 {
    DEFAULT_TURN_TIMEOUT_SECS
}
fn default_db_timeout() -> u64 {
    DEFAULT_DB_TIMEOUT_SECS
}
fn default_history_turns() -> usize {
    12
}
fn default_idle_minutes() -> i64 {
    DEFAULT_SESSION_IDLE_MINUTES
}
fn default_archive_cron() -> String {
    "0 2 * * *".to_string()
}
fn default_archive_age_hours() -> i64 {
    DEFAULT_ARCHIVE_AGE_HOURS
}

impl PlazaConfig {
    /// Load config from a TOML file with PLAZA_* env var overrides.
    ///
    /// The bare `ARCHIVE_JOB_CRON` / `ARCHIVE_ORDER_AGE_HOURS` env keys are
    /// honoured as well, matching the deployment contract.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let mut config: PlazaConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PLAZA_").split("_"))
            .extract()
            .map_err(|e| crate::error::PlazaError::Config(e.to_string()))?;

        if let Ok(cron) = std::env::var("ARCHIVE_JOB_CRON") {
            config.archive.job_cron = cron;
        }
        if let Ok(hours) = std::env::var("ARCHIVE_ORDER_AGE_HOURS") {
            config.archive.order_age_hours = hours
                .parse()
                .map_err(|_| crate::error::PlazaError::Config(format!(
                    "ARCHIVE_ORDER_AGE_HOURS must be an integer, got '{}'",
                    hours
                )))?;
        }

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.plaza/plaza.toml", home)
}
