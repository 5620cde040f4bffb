//! KGroot event representation.
//!
//! Distinct from the orchestrator's persisted `TaskEvent`: these are
//! normalized Kubernetes failure observations fed into the correlation
//! engine and FPG builder.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// One normalized failure observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KgEvent {
    pub id: String,
    /// Timezone-aware UTC timestamp.
    pub timestamp: DateTime<Utc>,
    /// Source-specific reason, upper-snake-cased (e.g. `FAILEDSCHEDULING`).
    pub raw_type: String,
    /// Normalized taxonomy tag (e.g. `OOM_KILLED`) used for pattern matching.
    pub abstract_type: String,
    /// Where it happened, e.g. `pod:api-1` or `node:worker-3`.
    pub location: String,
    pub severity: Severity,
    pub details: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_message: Option<String>,
}

impl KgEvent {
    /// Dedup key: abstract type + location + timestamp truncated to the
    /// second.
    pub fn dedup_key(&self) -> String {
        let second = self.timestamp.with_nanosecond(0).unwrap_or(self.timestamp);
        format!("{}:{}:{}", self.abstract_type, self.location, second.to_rfc3339())
    }
}

/// Drop duplicate events (first occurrence wins) and sort the remainder
/// chronologically ascending.
pub fn dedup_and_sort(events: Vec<KgEvent>) -> Vec<KgEvent> {
    let mut seen = std::collections::HashSet::new();
    let mut unique: Vec<KgEvent> = Vec::with_capacity(events.len());
    for event in events {
        if seen.insert(event.dedup_key()) {
            unique.push(event);
        } else {
            tracing::debug!(
                abstract_type = %event.abstract_type,
                location = %event.location,
                "duplicate event filtered"
            );
        }
    }
    unique.sort_by_key(|e| e.timestamp);
    unique
}

#[cfg(test)]
pub(crate) fn test_event(abstract_type: &str, location: &str, offset_secs: i64) -> KgEvent {
    use chrono::TimeZone;
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    KgEvent {
        id: format!("{abstract_type}@{location}+{offset_secs}"),
        timestamp: base + chrono::Duration::seconds(offset_secs),
        raw_type: abstract_type.to_string(),
        abstract_type: abstract_type.to_string(),
        location: location.to_string(),
        severity: Severity::Warning,
        details: BTreeMap::new(),
        raw_message: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut a = test_event("OOM_KILLED", "pod:api-1", 0);
        a.raw_message = Some("first".to_string());
        let mut b = test_event("OOM_KILLED", "pod:api-1", 0);
        b.raw_message = Some("second".to_string());
        let c = test_event("OOM_KILLED", "pod:api-1", 1);

        let out = dedup_and_sort(vec![a, b, c]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].raw_message.as_deref(), Some("first"));
    }

    #[test]
    fn test_dedup_key_truncates_to_second() {
        let mut a = test_event("POD_CRASH_LOOP", "pod:x", 0);
        let mut b = test_event("POD_CRASH_LOOP", "pod:x", 0);
        a.timestamp = a.timestamp.with_nanosecond(100_000_000).unwrap();
        b.timestamp = b.timestamp.with_nanosecond(900_000_000).unwrap();
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_sorted_ascending() {
        let out = dedup_and_sort(vec![
            test_event("A", "pod:x", 30),
            test_event("B", "pod:x", 0),
            test_event("C", "pod:x", 15),
        ]);
        let types: Vec<_> = out.iter().map(|e| e.abstract_type.as_str()).collect();
        assert_eq!(types, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_different_locations_not_deduped() {
        let out = dedup_and_sort(vec![
            test_event("OOM_KILLED", "pod:a", 0),
            test_event("OOM_KILLED", "pod:b", 0),
        ]);
        assert_eq!(out.len(), 2);
    }
}
