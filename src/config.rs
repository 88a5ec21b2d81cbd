use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub rpc_url: String,
    pub ws_url: String,
    pub program_id: String,
    /// JSON catalog file; the builtin catalog is used when unset.
    pub catalog_path: Option<String>,
    pub gap: GapConfig,
    pub subscriber: SubscriberConfig,
    pub score_policy: ScorePolicy,
}

/// Gap reconciler timing and limits.
#[derive(Debug, Clone, PartialEq)]
pub struct GapConfig {
    pub check_interval: Duration,
    pub initial_delay: Duration,
    pub signature_limit: usize,
    /// Used instead of `signature_limit` when the action log is empty.
    pub initial_backfill_limit: usize,
    pub backfill_delay: Duration,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(600),
            initial_delay: Duration::from_secs(5),
            signature_limit: 100,
            initial_backfill_limit: 10,
            backfill_delay: Duration::from_millis(100),
        }
    }
}

/// Live subscriber retry and health settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberConfig {
    /// Per-attempt delays for fetching a notified transaction.
    pub fetch_retry_delays: Vec<Duration>,
    /// Bound on the RPC client's own backoff within one fetch attempt, so a
    /// slow node cannot stretch the schedule above.
    pub fetch_max_elapsed: Duration,
    pub health_check_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            fetch_retry_delays: [500, 1000, 2000, 3000, 5000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
            fetch_max_elapsed: Duration::from_secs(2),
            health_check_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 10,
        }
    }
}

/// Weights of the composite leaderboard score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorePolicy {
    /// Smallest currency units per whole token.
    pub base_units_per_token: f64,
    pub points_per_token_earned: f64,
    pub points_per_property: f64,
    pub points_per_complete_set: f64,
    pub points_per_steal: f64,
    pub win_rate_bonus: f64,
    pub roi_multiplier: f64,
    pub roi_cap: f64,
    pub points_per_shield: f64,
    pub defense_bonus: f64,
}

impl Default for ScorePolicy {
    fn default() -> Self {
        Self {
            base_units_per_token: 1e9,
            points_per_token_earned: 0.3,
            points_per_property: 100.0,
            points_per_complete_set: 5000.0,
            points_per_steal: 500.0,
            win_rate_bonus: 5000.0,
            roi_multiplier: 25000.0,
            roi_cap: 50000.0,
            points_per_shield: 100.0,
            defense_bonus: 10000.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16)?;
        let database_path = required(&env_map, "DATABASE_PATH")?;
        let rpc_url = required(&env_map, "RPC_URL")?;
        let program_id = required(&env_map, "PROGRAM_ID")?;

        let ws_url = match env_map.get("WS_URL") {
            Some(url) => url.clone(),
            None => derive_ws_url(&rpc_url).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "RPC_URL".to_string(),
                    "must start with http:// or https:// when WS_URL is unset".to_string(),
                )
            })?,
        };

        let catalog_path = env_map
            .get("CATALOG_PATH")
            .filter(|s| !s.trim().is_empty())
            .cloned();

        let defaults = GapConfig::default();
        let gap = GapConfig {
            check_interval: secs(&env_map, "GAP_CHECK_INTERVAL_SECS", defaults.check_interval)?,
            initial_delay: secs(&env_map, "GAP_INITIAL_DELAY_SECS", defaults.initial_delay)?,
            signature_limit: parse_or(&env_map, "GAP_SIGNATURE_LIMIT", defaults.signature_limit)?,
            initial_backfill_limit: parse_or(
                &env_map,
                "GAP_INITIAL_BACKFILL_LIMIT",
                defaults.initial_backfill_limit,
            )?,
            backfill_delay: Duration::from_millis(parse_or(
                &env_map,
                "BACKFILL_DELAY_MS",
                defaults.backfill_delay.as_millis() as u64,
            )?),
        };
        if gap.check_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "GAP_CHECK_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let defaults = SubscriberConfig::default();
        let subscriber = SubscriberConfig {
            fetch_retry_delays: defaults.fetch_retry_delays,
            fetch_max_elapsed: defaults.fetch_max_elapsed,
            health_check_interval: secs(
                &env_map,
                "HEALTH_CHECK_INTERVAL_SECS",
                defaults.health_check_interval,
            )?,
            reconnect_delay: secs(&env_map, "RECONNECT_DELAY_SECS", defaults.reconnect_delay)?,
            max_reconnect_attempts: parse_or(
                &env_map,
                "MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            )?,
        };
        if subscriber.health_check_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "HEALTH_CHECK_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            port,
            database_path,
            rpc_url,
            ws_url,
            program_id,
            catalog_path,
            gap,
            subscriber,
            score_policy: ScorePolicy::default(),
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(
                key.to_string(),
                format!("must be a valid {}", std::any::type_name::<T>()),
            )
        }),
    }
}

fn secs(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parse_or(env_map, key, default.as_secs()).map(Duration::from_secs)
}

/// `https://host` -> `wss://host`, `http://host` -> `ws://host`.
fn derive_ws_url(rpc_url: &str) -> Option<String> {
    if let Some(rest) = rpc_url.strip_prefix("https://") {
        Some(format!("wss://{}", rest))
    } else {
        rpc_url
            .strip_prefix("http://")
            .map(|rest| format!("ws://{}", rest))
    }
}
