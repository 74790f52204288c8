use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub default_service_duration_minutes: i64,
    pub max_window_days: u32,
    pub day_query_timeout: Duration,
    pub calendar_sync_url: String,
    pub calendar_sync_token: String,
    pub sync_retry: RetryPolicy,
}

/// Backoff schedule for best-effort calendar pushes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` (1-based) failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: var_or("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "salonbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            default_service_duration_minutes: var_or("DEFAULT_SERVICE_DURATION_MINUTES", 60),
            max_window_days: var_or("MAX_WINDOW_DAYS", 62),
            day_query_timeout: Duration::from_millis(var_or("DAY_QUERY_TIMEOUT_MS", 5000)),
            calendar_sync_url: env::var("CALENDAR_SYNC_URL").unwrap_or_default(),
            calendar_sync_token: env::var("CALENDAR_SYNC_TOKEN").unwrap_or_default(),
            sync_retry: RetryPolicy {
                max_attempts: var_or("SYNC_MAX_ATTEMPTS", 5),
                base_delay: Duration::from_millis(var_or("SYNC_BASE_DELAY_MS", 500)),
                max_delay: Duration::from_millis(var_or("SYNC_MAX_DELAY_MS", 30_000)),
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: ":memory:".to_string(),
            admin_token: "changeme".to_string(),
            default_service_duration_minutes: 60,
            max_window_days: 62,
            day_query_timeout: Duration::from_secs(5),
            calendar_sync_url: String::new(),
            calendar_sync_token: String::new(),
            sync_retry: RetryPolicy::default(),
        }
    }
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
