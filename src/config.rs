use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Smallest and largest page sizes the timeline endpoint accepts
pub const MIN_MAX_RESULTS: u32 = 5;
pub const MAX_MAX_RESULTS: u32 = 100;

const DEFAULT_TWITTER_API_BASE: &str = "https://api.twitter.com";
const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_NITTER_INSTANCES: &str = "https://nitter.poast.org,https://nitter.net";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub discord: DiscordConfig,
    pub source: SourceConfig,
    pub accounts: Vec<String>,
    pub poll: PollConfig,
    pub rate_limit: RateLimitConfig,
    pub http_timeout: Duration,
}

/// Destination channel for relayed posts
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub channel_id: u64,
    pub api_base: String,
}

/// Where posts are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Official Twitter API v2 (bearer token, quota-gated)
    Twitter,
    /// Nitter mirrors, tried in priority order
    Nitter,
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitter" => Ok(SourceKind::Twitter),
            "nitter" => Ok(SourceKind::Nitter),
            other => Err(ConfigError::InvalidSource(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Required when `kind` is `Twitter`
    pub bearer_token: Option<String>,
    pub api_base: String,
    pub max_results: u32,
    pub nitter_instances: Vec<String>,
}

/// Pacing of the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between scheduled cycles
    pub interval: Duration,
    /// Pause after each account check
    pub account_pause: Duration,
    /// Pause between two deliveries for the same account
    pub post_pause: Duration,
    /// How long an account is skipped after the upstream answers 429
    pub suspension: Duration,
}

/// Local pacing of outbound API calls
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Length of the sliding request window
    pub window: Duration,
    /// Accepted calls allowed inside one window
    pub window_capacity: usize,
    /// Minimum spacing between two accepted calls
    pub min_interval: Duration,
    /// Extra cooldown imposed after a 429, always longer than `min_interval`
    pub penalty: Duration,
    /// Posts that may be read per monthly period
    pub monthly_post_limit: u64,
    /// Posts a single call is assumed to consume
    pub posts_per_call: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),

    #[error("DISCORD_CHANNEL_ID must be numeric, got '{0}'")]
    InvalidChannelId(String),

    #[error("TWITTER_ACCOUNTS must name at least one account")]
    NoAccounts,

    #[error("TWEET_SOURCE must be 'twitter' or 'nitter', got '{0}'")]
    InvalidSource(String),

    #[error("{var} is not a valid http(s) URL: '{value}'")]
    InvalidUrl { var: &'static str, value: String },
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let source = SourceConfig::from_env()?;
        let accounts = parse_accounts(&env::var("TWITTER_ACCOUNTS").unwrap_or_default());
        if accounts.is_empty() {
            return Err(if env::var("TWITTER_ACCOUNTS").is_err() {
                ConfigError::MissingVar("TWITTER_ACCOUNTS")
            } else {
                ConfigError::NoAccounts
            });
        }

        Ok(Self {
            discord: DiscordConfig::from_env()?,
            source,
            accounts,
            poll: PollConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            http_timeout: Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 20)),
        })
    }
}

impl DiscordConfig {
    /// Load Discord configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = required("DISCORD_TOKEN")?;
        let raw_channel = required("DISCORD_CHANNEL_ID")?;
        let channel_id = raw_channel
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidChannelId(raw_channel.clone()))?;

        let api_base = env::var("DISCORD_API_BASE")
            .unwrap_or_else(|_| DEFAULT_DISCORD_API_BASE.to_string());
        validate_url("DISCORD_API_BASE", &api_base)?;

        Ok(Self {
            token,
            channel_id,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

impl SourceConfig {
    /// Load source configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let kind = match env::var("TWEET_SOURCE") {
            Ok(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => SourceKind::Twitter,
        };

        let bearer_token = env::var("TWITTER_BEARER_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        if kind == SourceKind::Twitter && bearer_token.is_none() {
            return Err(ConfigError::MissingVar("TWITTER_BEARER_TOKEN"));
        }

        let api_base =
            env::var("TWITTER_API_BASE").unwrap_or_else(|_| DEFAULT_TWITTER_API_BASE.to_string());
        validate_url("TWITTER_API_BASE", &api_base)?;

        let nitter_instances: Vec<String> = env::var("NITTER_INSTANCES")
            .unwrap_or_else(|_| DEFAULT_NITTER_INSTANCES.to_string())
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for instance in &nitter_instances {
            validate_url("NITTER_INSTANCES", instance)?;
        }

        Ok(Self {
            kind,
            bearer_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            max_results: max_results_from_env(),
            nitter_instances,
        })
    }
}

impl PollConfig {
    /// Load poll pacing from environment variables
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_secs(env_or("POLL_INTERVAL_SECS", 900)),
            account_pause: Duration::from_secs(env_or("ACCOUNT_PAUSE_SECS", 5)),
            post_pause: Duration::from_secs(env_or("POST_PAUSE_SECS", 1)),
            suspension: Duration::from_secs(env_or("SUSPENSION_SECS", 900)),
        }
    }
}

impl RateLimitConfig {
    /// Load rate limit configuration from environment variables
    pub fn from_env() -> Self {
        let min_interval = Duration::from_secs(env_or("RATE_LIMIT_MIN_INTERVAL_SECS", 90));
        let penalty = Duration::from_secs(env_or("RATE_LIMIT_PENALTY_SECS", 180));

        Self {
            window: Duration::from_secs(env_or("RATE_LIMIT_WINDOW_SECS", 900)),
            window_capacity: env_or("RATE_LIMIT_WINDOW_CAPACITY", 10),
            min_interval,
            penalty: penalty_floor(penalty, min_interval),
            monthly_post_limit: env_or("MONTHLY_POST_LIMIT", 10_000),
            posts_per_call: u64::from(max_results_from_env()),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(900),
            window_capacity: 10,
            min_interval: Duration::from_secs(90),
            penalty: Duration::from_secs(180),
            monthly_post_limit: 10_000,
            posts_per_call: u64::from(MIN_MAX_RESULTS),
        }
    }
}

/// Keeps the 429 cooldown strictly longer than the normal spacing. A penalty
/// that is not falls back to twice the spacing, and at least one second more.
fn penalty_floor(penalty: Duration, min_interval: Duration) -> Duration {
    if penalty > min_interval {
        return penalty;
    }
    min_interval
        .saturating_mul(2)
        .max(min_interval.saturating_add(Duration::from_secs(1)))
}

/// Splits a comma-separated account list, dropping `@`, blanks and duplicates
pub fn parse_accounts(raw: &str) -> Vec<String> {
    let mut accounts: Vec<String> = Vec::new();
    for name in raw.split(',') {
        let name = name.trim().trim_start_matches('@');
        if name.is_empty() {
            continue;
        }
        if !accounts.iter().any(|a| a.eq_ignore_ascii_case(name)) {
            accounts.push(name.to_string());
        }
    }
    accounts
}

fn max_results_from_env() -> u32 {
    env_or("TWITTER_MAX_RESULTS", MIN_MAX_RESULTS).clamp(MIN_MAX_RESULTS, MAX_MAX_RESULTS)
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingVar(var))
}

fn env_or<T: FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn validate_url(var: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        var,
        value: value.to_string(),
    };
    let parsed = url::Url::parse(value).map_err(|_| invalid())?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid());
    }
    Ok(())
}
