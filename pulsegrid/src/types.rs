//! Types that mirror the backend's JSON schema, plus the client-side Sample.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One resource-usage observation for a (server, tag) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub server_id: String,
    pub tag: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    // bytes, not a percentage
    pub network_usage: f64,
    /// Unix epoch millis
    pub timestamp: i64,
}

impl Sample {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(&self.server_id, &self.tag)
    }

    pub fn value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Cpu => self.cpu_usage,
            MetricKind::Memory => self.memory_usage,
            MetricKind::Disk => self.disk_usage,
            MetricKind::Network => self.network_usage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub server_id: String,
    pub tag: String,
}

impl SeriesKey {
    pub fn new(server_id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            tag: tag.into(),
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.server_id, self.tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::Network,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MetricKind::Cpu => "CPU",
            MetricKind::Memory => "Memory",
            MetricKind::Disk => "Disk",
            MetricKind::Network => "Network",
        }
    }

    pub fn is_percentage(self) -> bool {
        !matches!(self, MetricKind::Network)
    }
}

/// Live feed payload. The wire carries no usable timestamp; the receiver stamps it.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveMessage {
    pub server_id: String,
    pub tag: String,
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
    #[serde(default)]
    pub disk_usage: f64,
    #[serde(default)]
    pub network_usage: f64,
}

impl LiveMessage {
    pub fn into_sample(self, received_at_ms: i64) -> Result<Sample> {
        if self.server_id.trim().is_empty() {
            return Err(Error::invalid_sample("empty server_id"));
        }
        if self.tag.trim().is_empty() {
            return Err(Error::invalid_sample("empty tag"));
        }
        Ok(Sample {
            server_id: self.server_id,
            tag: self.tag,
            cpu_usage: self.cpu_usage,
            memory_usage: self.memory_usage,
            disk_usage: self.disk_usage,
            network_usage: self.network_usage,
            timestamp: received_at_ms,
        })
    }
}

/// Directory listing row: one known (server, tag) pair.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerRow {
    #[serde(rename = "ServerID", alias = "server_id")]
    pub server_id: String,
    #[serde(rename = "Tag", alias = "tag")]
    pub tag: String,
}

impl From<ServerRow> for SeriesKey {
    fn from(r: ServerRow) -> Self {
        SeriesKey::new(r.server_id, r.tag)
    }
}

/// Historical row as stored by the backend (newest-first, capitalized field names).
#[derive(Debug, Clone, Deserialize)]
pub struct MetricRow {
    #[serde(rename = "ID", alias = "id", default)]
    pub id: i64,
    #[serde(rename = "ServerID", alias = "server_id")]
    pub server_id: String,
    #[serde(rename = "Tag", alias = "tag")]
    pub tag: String,
    #[serde(rename = "CPUUsage", alias = "cpu_usage")]
    pub cpu_usage: f64,
    #[serde(rename = "MemoryUsage", alias = "memory_usage")]
    pub memory_usage: f64,
    #[serde(rename = "DiskUsage", alias = "disk_usage")]
    pub disk_usage: f64,
    #[serde(rename = "NetworkUsage", alias = "network_usage")]
    pub network_usage: f64,
    #[serde(rename = "CreatedAt", alias = "created_at")]
    pub created_at: String,
}

impl MetricRow {
    pub fn into_sample(self) -> Result<Sample> {
        let timestamp = parse_created_at(&self.created_at)?;
        Ok(Sample {
            server_id: self.server_id,
            tag: self.tag,
            cpu_usage: self.cpu_usage,
            memory_usage: self.memory_usage,
            disk_usage: self.disk_usage,
            network_usage: self.network_usage,
            timestamp,
        })
    }
}

/// Parse the backend's creation time into epoch millis.
///
/// Accepts RFC 3339 as well as Postgres' text rendering of `timestamptz`
/// (`2024-05-01 10:00:00.123+00`). A value without an offset is taken as UTC.
pub fn parse_created_at(s: &str) -> Result<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.timestamp_millis());
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }
    Err(Error::Timestamp { value: s.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_at_formats() {
        let rfc = parse_created_at("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(rfc, 1_714_557_600_000);
        assert_eq!(parse_created_at("2024-05-01T12:00:00+02:00").unwrap(), rfc);
        assert_eq!(parse_created_at("2024-05-01 10:00:00.250+00").unwrap(), rfc + 250);
        assert_eq!(parse_created_at("2024-05-01 10:00:00").unwrap(), rfc);
        assert!(parse_created_at("yesterday").is_err());
    }

    #[test]
    fn metric_row_accepts_backend_and_snake_case_names() {
        let go: MetricRow = serde_json::from_str(
            r#"{"ID":7,"ServerID":"s1","Tag":"prod","CPUUsage":10,"MemoryUsage":20.5,
                "DiskUsage":30,"NetworkUsage":4096,"CreatedAt":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        let snake: MetricRow = serde_json::from_str(
            r#"{"server_id":"s1","tag":"prod","cpu_usage":10,"memory_usage":20.5,
                "disk_usage":30,"network_usage":4096,"created_at":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        let a = go.into_sample().unwrap();
        let b = snake.into_sample().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.memory_usage, 20.5);
        assert_eq!(a.timestamp, 1_714_557_600_000);
    }

    #[test]
    fn live_message_rejects_blank_identity() {
        let m: LiveMessage =
            serde_json::from_str(r#"{"server_id":"  ","tag":"prod","cpu_usage":1}"#).unwrap();
        assert!(m.into_sample(0).is_err());
    }
}
