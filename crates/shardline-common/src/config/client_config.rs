//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use shardline_core::Intents;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::BackoffConfig;

/// Main client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub app: AppSettings,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub backoff: BackoffConfig,
    pub rest: RestConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Bot credentials
#[derive(Clone)]
pub struct AuthConfig {
    pub token: String,
}

impl AuthConfig {
    /// Value of the REST `Authorization` header
    pub fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }
}

// Never print the token
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Gateway session and fleet configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Fallback gateway URL; normally replaced by the one from `GET /gateway/bot`
    pub url: String,
    /// Fixed shard count; `None` uses the platform recommendation
    pub shard_count: Option<u32>,
    pub intents: Intents,
    /// Minimum time between two IDENTIFY sends in one concurrency partition
    pub identify_spacing: Duration,
    /// Member count above which a guild is sent without its offline members (50..=250)
    pub large_threshold: u8,
    /// Bound on the WebSocket connect, which runs while an identify slot is held
    pub connect_timeout: Duration,
    pub hello_timeout: Duration,
    /// How long a shard waits for the next GUILD_CREATE before it is considered settled
    pub guild_ready_timeout: Duration,
    /// Upper bound for `wait_until_ready` when the caller gives none
    pub startup_timeout: Duration,
    /// Emit the raw `GatewayDispatch` event for every dispatch
    pub debug_events: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            shard_count: None,
            intents: Intents::default(),
            identify_spacing: Duration::from_millis(default_identify_spacing_ms()),
            large_threshold: default_large_threshold(),
            connect_timeout: Duration::from_millis(default_connect_timeout_ms()),
            hello_timeout: Duration::from_millis(default_hello_timeout_ms()),
            guild_ready_timeout: Duration::from_millis(default_guild_ready_timeout_ms()),
            startup_timeout: Duration::from_millis(default_startup_timeout_ms()),
            debug_events: false,
        }
    }
}

/// REST transport configuration
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    /// Retries after the first attempt, capped at 5
    pub max_retries: u32,
    /// Client-side ceiling on requests per second across all routes
    pub global_rps: Option<u32>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_rest_base_url(),
            max_retries: default_max_retries(),
            global_rps: Some(default_global_rps()),
            timeout: Duration::from_millis(default_rest_timeout_ms()),
            user_agent: default_user_agent(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "shardline".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg".to_string()
}

fn default_identify_spacing_ms() -> u64 {
    5000
}

fn default_large_threshold() -> u8 {
    250
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_hello_timeout_ms() -> u64 {
    20_000
}

fn default_guild_ready_timeout_ms() -> u64 {
    2000
}

fn default_startup_timeout_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_rest_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_global_rps() -> u32 {
    50
}

fn default_rest_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot (https://github.com/shardline/shardline, {})",
        env!("CARGO_PKG_VERSION")
    )
}

const MAX_REST_RETRIES: u32 = 5;

impl ClientConfig {
    /// Configuration with every default and the given token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            app: AppSettings {
                name: default_app_name(),
                env: default_env(),
            },
            auth: AuthConfig {
                token: token.into(),
            },
            gateway: GatewayConfig::default(),
            backoff: BackoffConfig::default(),
            rest: RestConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `BOT_TOKEN` is missing or any variable fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let token = vars
            .string("BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingVar("BOT_TOKEN"))?;

        let intents = match vars.string("GATEWAY_INTENTS") {
            Some(raw) => Intents::parse(&raw)
                .ok_or(ConfigError::InvalidValue("GATEWAY_INTENTS", raw))?,
            None => Intents::default(),
        };

        let config = Self {
            app: AppSettings {
                name: vars.string("APP_NAME").unwrap_or_else(default_app_name),
                env: match vars.string("APP_ENV") {
                    Some(raw) => Environment::parse(&raw)
                        .ok_or(ConfigError::InvalidValue("APP_ENV", raw))?,
                    None => default_env(),
                },
            },
            auth: AuthConfig { token },
            gateway: GatewayConfig {
                url: vars.string("GATEWAY_URL").unwrap_or_else(default_gateway_url),
                shard_count: vars.parse("SHARD_COUNT")?,
                intents,
                identify_spacing: vars
                    .millis("IDENTIFY_SPACING_MS")?
                    .unwrap_or(Duration::from_millis(default_identify_spacing_ms())),
                large_threshold: vars
                    .parse("LARGE_THRESHOLD")?
                    .unwrap_or_else(default_large_threshold),
                connect_timeout: vars
                    .millis("CONNECT_TIMEOUT_MS")?
                    .unwrap_or(Duration::from_millis(default_connect_timeout_ms())),
                hello_timeout: vars
                    .millis("HELLO_TIMEOUT_MS")?
                    .unwrap_or(Duration::from_millis(default_hello_timeout_ms())),
                guild_ready_timeout: vars
                    .millis("GUILD_READY_TIMEOUT_MS")?
                    .unwrap_or(Duration::from_millis(default_guild_ready_timeout_ms())),
                startup_timeout: vars
                    .millis("STARTUP_TIMEOUT_MS")?
                    .unwrap_or(Duration::from_millis(default_startup_timeout_ms())),
                debug_events: vars.parse("DEBUG_EVENTS")?.unwrap_or(false),
            },
            backoff: {
                let defaults = BackoffConfig::default();
                BackoffConfig {
                    initial_delay: vars
                        .millis("BACKOFF_INITIAL_MS")?
                        .unwrap_or(defaults.initial_delay),
                    max_delay: vars.millis("BACKOFF_MAX_MS")?.unwrap_or(defaults.max_delay),
                    factor: vars.parse("BACKOFF_FACTOR")?.unwrap_or(defaults.factor),
                    jitter: vars.parse("BACKOFF_JITTER")?.unwrap_or(defaults.jitter),
                    reset_after: vars
                        .millis("BACKOFF_RESET_AFTER_MS")?
                        .unwrap_or(defaults.reset_after),
                }
            },
            rest: RestConfig {
                base_url: vars.string("REST_BASE_URL").unwrap_or_else(default_rest_base_url),
                max_retries: vars
                    .parse("REST_MAX_RETRIES")?
                    .unwrap_or_else(default_max_retries),
                // 0 disables the client-side ceiling
                global_rps: vars
                    .parse::<u32>("REST_GLOBAL_RPS")?
                    .map_or(Some(default_global_rps()), |rps| (rps > 0).then_some(rps)),
                timeout: vars
                    .millis("REST_TIMEOUT_MS")?
                    .unwrap_or(Duration::from_millis(default_rest_timeout_ms())),
                user_agent: default_user_agent(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.token.trim().is_empty() {
            return Err(ConfigError::MissingVar("BOT_TOKEN"));
        }
        if self.gateway.shard_count == Some(0) {
            return Err(ConfigError::InvalidValue(
                "SHARD_COUNT",
                "must be > 0".to_string(),
            ));
        }
        if !(50..=250).contains(&self.gateway.large_threshold) {
            return Err(ConfigError::InvalidValue(
                "LARGE_THRESHOLD",
                "must be between 50 and 250".to_string(),
            ));
        }
        if self.rest.max_retries > MAX_REST_RETRIES {
            return Err(ConfigError::InvalidValue(
                "REST_MAX_RETRIES",
                format!("must be <= {MAX_REST_RETRIES}"),
            ));
        }
        if self.gateway.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "CONNECT_TIMEOUT_MS",
                "must be > 0".to_string(),
            ));
        }
        if self.gateway.hello_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "HELLO_TIMEOUT_MS",
                "must be > 0".to_string(),
            ));
        }
        self.backoff.validate()
    }
}

/// Typed access to a variable source
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        match self.string(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue(key, raw)),
            None => Ok(None),
        }
    }

    fn millis(&self, key: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
