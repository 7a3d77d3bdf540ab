use chrono::NaiveTime;

/// All configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Broker endpoints
    pub feed_ws_url: String,
    pub instrument_master_url: String,
    pub candle_api_url: String,

    // Session credentials (acquired externally, handed in via env)
    pub streaming_credential: String,
    pub session_credential: String,

    // Feed
    pub retry_delay_secs: u64,

    // Strategy refresh
    pub signal_refresh_secs: u64,

    // Positions
    pub quantity: f64,
    pub risk_pct: f64,
    pub reward_ratio: f64,
    pub mtm_min_change: f64,

    // Scheduler
    pub scheduler_interval_secs: u64,
    pub square_off_time: NaiveTime,

    // Database
    pub database_url: String,

    // Watchlist file path
    pub watchlist_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let square_off_time = optional_env("SQUARE_OFF_TIME")
            .unwrap_or_else(|| "15:25".to_string());
        let square_off_time = NaiveTime::parse_from_str(&square_off_time, "%H:%M")
            .unwrap_or_else(|e| panic!("SQUARE_OFF_TIME must be HH:MM: {e}"));

        Config {
            feed_ws_url: required_env("FEED_WS_URL"),
            instrument_master_url: required_env("INSTRUMENT_MASTER_URL"),
            candle_api_url: required_env("CANDLE_API_URL"),
            streaming_credential: required_env("FEED_TOKEN"),
            session_credential: required_env("SESSION_TOKEN"),
            retry_delay_secs: parsed_env("FEED_RETRY_DELAY_SECS", 5),
            signal_refresh_secs: parsed_env("SIGNAL_REFRESH_SECS", 60),
            quantity: parsed_env("ORDER_QUANTITY", 1.0),
            risk_pct: parsed_env("RISK_PCT", 0.01),
            reward_ratio: parsed_env("REWARD_RATIO", 1.5),
            mtm_min_change: parsed_env("MTM_MIN_CHANGE", 0.05),
            scheduler_interval_secs: parsed_env("SCHEDULER_INTERVAL_SECS", 30),
            square_off_time,
            database_url: required_env("DATABASE_URL"),
            watchlist_path: optional_env("WATCHLIST_PATH")
                .unwrap_or_else(|| "config/watchlist.toml".to_string()),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    optional_env(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
