use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub time: i64,
    #[serde(default)]
    pub status: u16,
    pub version: String,
    pub uptime: String,
    pub cpu: String,
    pub memory: String,
    pub disk: String,
    pub load1: String,
    pub load5: String,
    pub load15: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessInfo {
    started_at: SystemTime,
    version: String,
}

impl ProcessInfo {
    pub fn new(started_at: SystemTime, version: impl Into<String>) -> Self {
        Self {
            started_at,
            version: version.into(),
        }
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn started_at_unix(&self) -> i64 {
        unix_seconds(self.started_at)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    // a clock that moved backwards yields zero
    pub fn uptime_minutes(&self, now: SystemTime) -> f64 {
        now.duration_since(self.started_at)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64()
            / 60.0
    }
}

pub fn format_metric(value: f64) -> String {
    format!("{value:.2}")
}

pub fn unix_seconds(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_reported_in_minutes() {
        let start = UNIX_EPOCH + Duration::from_secs(1_000);
        let info = ProcessInfo::new(start, "v1.2.3");
        let now = start + Duration::from_secs(90);

        assert_eq!(info.started_at_unix(), 1_000);
        assert_eq!(format_metric(info.uptime_minutes(now)), "1.50");
        assert_eq!(info.uptime_minutes(start - Duration::from_secs(5)), 0.0);
    }

    #[test]
    fn format_metric_rounds_to_two_decimals() {
        assert_eq!(format_metric(0.0), "0.00");
        assert_eq!(format_metric(42.126), "42.13");
        assert_eq!(format_metric(100.0), "100.00");
    }

    #[test]
    fn snapshot_decodes_without_errors_field() {
        let body = r#"{
            "time": 1700000000,
            "status": 0,
            "version": "v1",
            "uptime": "3.00",
            "cpu": "1.00",
            "memory": "2.00",
            "disk": "3.00",
            "load1": "0.10",
            "load5": "0.20",
            "load15": "0.30"
        }"#;
        let snapshot: Snapshot = serde_json::from_str(body).expect("legacy body");
        assert!(snapshot.errors.is_empty());
        assert_eq!(snapshot.load15, "0.30");
    }

    #[test]
    fn snapshot_requires_metric_fields() {
        let body = r#"{"time": 1, "version": "v1", "uptime": "0.00"}"#;
        assert!(serde_json::from_str::<Snapshot>(body).is_err());
    }
}
