pub mod cache;
pub mod config;
pub mod email;
pub mod period;
pub mod probe;
pub mod queue;
pub mod repo;
pub mod services;
pub mod util;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use period::{PeriodType, TimeRange};

/// Health classification of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    Up,
    Down,
    Degraded,
}

impl ProbeStatus {
    /// Anything other than `Up` counts against an endpoint in alerting.
    pub fn is_problematic(&self) -> bool {
        !matches!(self, ProbeStatus::Up)
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Up => write!(f, "UP"),
            ProbeStatus::Down => write!(f, "DOWN"),
            ProbeStatus::Degraded => write!(f, "DEGRADED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub url: String,
}

/// One entry of the cached fleet snapshot.
///
/// Serialized as `{"id", "url", "monitorActive"}`, the wire format of the
/// snapshot stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetEndpoint {
    pub id: String,
    pub url: String,
    pub monitor_active: bool,
}

/// One recorded health-check result, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeLog {
    pub endpoint_id: String,
    pub status: ProbeStatus,
    /// None when the probe failed at the transport level.
    pub response_time_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Period-aggregated analytics values.
///
/// The percentage fields partition all logs of the period, so they sum to
/// 100 (within floating point) whenever the period had any logs at all.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RollupMetrics {
    pub avg_response_time: f64,
    pub avg_uptime: f64,
    pub avg_downtime: f64,
    pub avg_degraded_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Downtime,
    Performance,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertType::Downtime => write!(f, "DOWNTIME"),
            AlertType::Performance => write!(f, "PERFORMANCE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub endpoint_id: String,
    pub alert_type: AlertType,
    pub status: AlertStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Payload of one queued probe job.
///
/// Serialized as `{"endpointId", "url", "timeoutMs"?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeJob {
    pub endpoint_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_status_wire_format() {
        assert_eq!(serde_json::to_string(&ProbeStatus::Up).unwrap(), "\"UP\"");
        assert_eq!(serde_json::to_string(&ProbeStatus::Down).unwrap(), "\"DOWN\"");
        assert_eq!(
            serde_json::to_string(&ProbeStatus::Degraded).unwrap(),
            "\"DEGRADED\""
        );

        let parsed: ProbeStatus = serde_json::from_str("\"DEGRADED\"").unwrap();
        assert_eq!(parsed, ProbeStatus::Degraded);
    }

    #[test]
    fn test_probe_job_wire_format_uses_camel_case() {
        let job = ProbeJob {
            endpoint_id: "ep_1".to_string(),
            url: "https://example.com".to_string(),
            timeout_ms: None,
        };

        let json = serde_json::to_string(&job).unwrap();
        assert_eq!(json, r#"{"endpointId":"ep_1","url":"https://example.com"}"#);

        // timeoutMs appears only when set
        let job = ProbeJob {
            timeout_ms: Some(10_000),
            ..job
        };
        assert!(serde_json::to_string(&job).unwrap().contains("\"timeoutMs\":10000"));
    }

    #[test]
    fn test_problematic_statuses() {
        assert!(!ProbeStatus::Up.is_problematic());
        assert!(ProbeStatus::Down.is_problematic());
        assert!(ProbeStatus::Degraded.is_problematic());
    }
}
