use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};

/// Read an environment variable, falling back to `default` when the variable
/// is unset or does not parse.
pub fn env_u64(name: &str, default: u64) -> u64 {
    parse_or(std::env::var(name).ok(), default)
}

pub fn env_u32(name: &str, default: u32) -> u32 {
    parse_or(std::env::var(name).ok(), default)
}

pub fn env_f64(name: &str, default: f64) -> f64 {
    parse_or(std::env::var(name).ok(), default)
}

pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Environment variable holding a duration in whole seconds.
pub fn env_secs(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_u64(name, default_secs))
}

/// Environment variable holding a duration in milliseconds.
pub fn env_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(name, default_ms))
}

fn parse_or<T: std::str::FromStr + Copy>(raw: Option<String>, default: T) -> T {
    raw.map_or(default, |value| value.parse().unwrap_or(default))
}

/// Bound an external call in time.
///
/// The label names the operation in the timeout error so a hung dependency is
/// attributable from the log line alone.
pub async fn with_timeout<T, E, F>(limit: Duration, label: &str, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(anyhow::Error::new),
        Err(_) => Err(anyhow!("{label} timed out after {limit:?}")),
    }
}

/// Human-readable age of a timestamp, e.g. "12 minutes".
///
/// Mirrors the usual distance ladder of date formatting libraries: 45 seconds
/// round to a minute, 45 minutes to an hour, and so on. Used verbatim in
/// alert messages.
pub fn format_elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    let seconds = (to - from).num_seconds().max(0);
    let minutes = (seconds as f64 / 60.0).round() as i64;

    if seconds < 45 {
        return "less than a minute".to_string();
    }
    if seconds < 90 {
        return "1 minute".to_string();
    }
    if minutes < 45 {
        return format!("{minutes} minutes");
    }
    if minutes < 90 {
        return "about 1 hour".to_string();
    }

    let hours = (minutes as f64 / 60.0).round() as i64;
    if hours < 24 {
        return format!("about {hours} hours");
    }
    if hours < 48 {
        return "1 day".to_string();
    }

    let days = (hours as f64 / 24.0).round() as i64;
    if days < 30 {
        return format!("{days} days");
    }
    if days < 60 {
        return "about 1 month".to_string();
    }

    format!("{} months", (days as f64 / 30.0).round() as i64)
}
