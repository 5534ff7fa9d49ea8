//! Client configuration loaded from `.env` and the process environment.
//!
//! Loading never fails: unparsable values fall back to defaults and numbers
//! are clamped to sane ranges.

use std::time::Duration;

use super::retry::RetryConfig;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Baseline status poll cadence.
    pub poll_interval: Duration,
    /// Follow-up poll cadence after a start/stop request.
    pub fast_poll_interval: Duration,
    pub fast_poll_max_attempts: usize,
    pub status_timeout: Duration,
    /// Upper bound on a single chat exchange; a hung backend surfaces as a
    /// connection failure once this elapses.
    pub chat_timeout: Duration,
    pub history_timeout: Duration,
    pub history_retry: RetryConfig,
    /// Log events instead of printing them; for scripted or non-interactive runs.
    pub headless: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(3_000),
            fast_poll_interval: Duration::from_millis(1_000),
            fast_poll_max_attempts: 60,
            status_timeout: Duration::from_millis(5_000),
            chat_timeout: Duration::from_millis(120_000),
            history_timeout: Duration::from_millis(15_000),
            history_retry: RetryConfig::default(),
            headless: false,
        }
    }
}

pub(crate) fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn env_millis(key: &str, default: Duration, min_ms: u64, max_ms: u64) -> Duration {
    Duration::from_millis(env_u64(key, default.as_millis() as u64).clamp(min_ms, max_ms))
}

fn normalize_base_url(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    if base.contains("://") {
        base.to_string()
    } else {
        format!("http://{}", base)
    }
}

/// Load client configuration from `.env`/environment.
///
/// Reads:
/// - `INFOSAGE_BASE_URL`
/// - `INFOSAGE_POLL_INTERVAL_MS`, `INFOSAGE_FAST_POLL_INTERVAL_MS`, `INFOSAGE_FAST_POLL_MAX_ATTEMPTS`
/// - `INFOSAGE_STATUS_TIMEOUT_MS`, `INFOSAGE_CHAT_TIMEOUT_MS`, `INFOSAGE_HISTORY_TIMEOUT_MS`
/// - `INFOSAGE_HEADLESS`
/// - retry settings, see [`RetryConfig::from_env`]
pub fn load_client_config() -> ClientConfig {
    let _ = dotenvy::dotenv();
    let defaults = ClientConfig::default();

    let base_url = std::env::var("INFOSAGE_BASE_URL").unwrap_or_default();

    ClientConfig {
        base_url: normalize_base_url(&base_url),
        poll_interval: env_millis(
            "INFOSAGE_POLL_INTERVAL_MS",
            defaults.poll_interval,
            250,
            600_000,
        ),
        fast_poll_interval: env_millis(
            "INFOSAGE_FAST_POLL_INTERVAL_MS",
            defaults.fast_poll_interval,
            100,
            60_000,
        ),
        fast_poll_max_attempts: env_usize(
            "INFOSAGE_FAST_POLL_MAX_ATTEMPTS",
            defaults.fast_poll_max_attempts,
        )
        .clamp(1, 1_000),
        status_timeout: env_millis(
            "INFOSAGE_STATUS_TIMEOUT_MS",
            defaults.status_timeout,
            100,
            120_000,
        ),
        chat_timeout: env_millis(
            "INFOSAGE_CHAT_TIMEOUT_MS",
            defaults.chat_timeout,
            1_000,
            3_600_000,
        ),
        history_timeout: env_millis(
            "INFOSAGE_HISTORY_TIMEOUT_MS",
            defaults.history_timeout,
            100,
            300_000,
        ),
        history_retry: RetryConfig::from_env(),
        headless: env_flag("INFOSAGE_HEADLESS"),
    }
}
