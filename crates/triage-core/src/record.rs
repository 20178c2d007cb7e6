use std::collections::HashMap;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Host identity surfaced in the report header. Carries no findings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_time: Option<String>,
}

/// One volume. `free_percent` stays absent when the collector could not
/// determine size/free; absence is classification-relevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskRecord {
    pub drive: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_percent: Option<f64>,
    #[serde(default)]
    pub volume_name: String,
}

/// Point-in-time CPU/memory snapshot. Each sub-metric classifies
/// independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_load_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_percent: Option<f64>,
}

/// An automatic service reported as not running by the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub start_mode: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RebootRecord {
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Antivirus / real-time protection flag set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtectionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_time_protection: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antivirus_enabled: Option<bool>,
    #[serde(default)]
    pub notes: String,
}

/// One scheduled job (backup or similar) with its last outcome and the
/// timestamps staleness classification needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub notes: String,
}

/// Performance-counter summary over the collection window. `key` is the
/// canonical threshold-lookup form of the path; `label` is display-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterRecord {
    pub raw_path: String,
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub samples: u64,
}

impl CounterRecord {
    pub fn new(raw_path: impl Into<String>, average: Option<f64>, maximum: Option<f64>, samples: u64) -> Self {
        let raw_path = raw_path.into();
        let key = canonical_counter_path(&raw_path);
        let label = friendly_counter_label(&key);
        Self {
            raw_path,
            key,
            label,
            average,
            maximum,
            samples,
        }
    }
}

/// One event-log row retained for the newest-events table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub time_created: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub message: String,
}

/// Per-log level tally plus the newest noisy rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventTally {
    pub log: String,
    pub critical: u64,
    pub error: u64,
    pub warning: u64,
    pub information: u64,
    pub other: u64,
    pub total: u64,
    #[serde(default)]
    pub newest: Vec<EventRecord>,
}

const NEWEST_EVENT_LIMIT: usize = 20;
const EVENT_MESSAGE_TRUNCATE: usize = 200;

impl EventTally {
    /// Tally rows by level and retain the newest Critical/Error/Warning rows
    /// (by `time_created` descending, string order) with truncated messages.
    pub fn from_rows(log: impl Into<String>, rows: Vec<EventRecord>) -> Self {
        let mut tally = EventTally {
            log: log.into(),
            total: rows.len() as u64,
            ..EventTally::default()
        };
        let mut noisy: Vec<EventRecord> = Vec::new();
        for mut row in rows {
            match row.level.trim() {
                "Critical" => tally.critical += 1,
                "Error" => tally.error += 1,
                "Warning" => tally.warning += 1,
                "Information" => tally.information += 1,
                _ => tally.other += 1,
            }
            if matches!(row.level.trim(), "Critical" | "Error" | "Warning") {
                row.message = truncate_message(&row.message);
                noisy.push(row);
            }
        }
        noisy.sort_by(|a, b| b.time_created.cmp(&a.time_created));
        noisy.truncate(NEWEST_EVENT_LIMIT);
        tally.newest = noisy;
        tally
    }
}

fn truncate_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() > EVENT_MESSAGE_TRUNCATE {
        let cut: String = trimmed.chars().take(EVENT_MESSAGE_TRUNCATE).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

/// All normalized records of one run, grouped by check category. Constructed
/// once, never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemInfo>,
    #[serde(default)]
    pub disks: Vec<DiskRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceRecord>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reboot: Option<RebootRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<ProtectionRecord>,
    #[serde(default)]
    pub jobs: Vec<JobRecord>,
    #[serde(default)]
    pub counters: Vec<CounterRecord>,
    #[serde(default)]
    pub event_logs: Vec<EventTally>,
}

static HOST_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\\\\[^\\]+\\(.*)$").expect("host prefix pattern is valid"));

/// Canonicalize a performance-counter path for threshold lookup:
/// `\\HOST\processor(_total)\% processor time` becomes
/// `\processor(_total)\% processor time`, lowercased, so lookups are
/// host-independent and case-insensitive.
pub fn canonical_counter_path(raw: &str) -> String {
    let s = raw.trim();
    match HOST_PREFIX.captures(s) {
        Some(caps) => format!("\\{}", &caps[1]).to_lowercase(),
        None => s.to_lowercase(),
    }
}

static COUNTER_LABELS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            "\\processor(_total)\\% processor time",
            "CPU % Processor Time (Total)",
        ),
        (
            "\\memory\\% committed bytes in use",
            "Memory % Committed Bytes In Use",
        ),
        ("\\memory\\available mbytes", "Memory Available MB"),
        (
            "\\physicaldisk(_total)\\avg. disk queue length",
            "Disk Avg. Disk Queue Length (Total)",
        ),
    ])
});

/// Human-friendly label for a canonical counter key. Unknown keys fall back
/// to the canonical form verbatim.
pub fn friendly_counter_label(key: &str) -> String {
    COUNTER_LABELS
        .get(key)
        .map(|label| (*label).to_string())
        .unwrap_or_else(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_path_strips_host_and_case_folds() {
        assert_eq!(
            canonical_counter_path("\\\\SRV-01\\Processor(_Total)\\% Processor Time"),
            "\\processor(_total)\\% processor time"
        );
    }

    #[test]
    fn counter_path_without_host_is_only_case_folded() {
        assert_eq!(
            canonical_counter_path("\\Memory\\Available MBytes"),
            "\\memory\\available mbytes"
        );
    }

    #[test]
    fn friendly_label_known_and_fallback() {
        assert_eq!(
            friendly_counter_label("\\memory\\available mbytes"),
            "Memory Available MB"
        );
        assert_eq!(
            friendly_counter_label("\\custom\\queue depth"),
            "\\custom\\queue depth"
        );
    }

    #[test]
    fn counter_record_derives_key_and_label() {
        let rec = CounterRecord::new(
            "\\\\HOST\\Memory\\Available MBytes",
            Some(900.0),
            Some(1100.0),
            60,
        );
        assert_eq!(rec.key, "\\memory\\available mbytes");
        assert_eq!(rec.label, "Memory Available MB");
    }

    #[test]
    fn event_tally_counts_levels_and_keeps_noisy_rows() {
        let rows = vec![
            EventRecord {
                time_created: "2026-08-01T10:00:00".into(),
                level: "Information".into(),
                ..EventRecord::default()
            },
            EventRecord {
                time_created: "2026-08-01T11:00:00".into(),
                level: "Error".into(),
                message: "disk failure".into(),
                ..EventRecord::default()
            },
            EventRecord {
                time_created: "2026-08-01T12:00:00".into(),
                level: "Warning".into(),
                ..EventRecord::default()
            },
            EventRecord {
                time_created: "2026-08-01T09:00:00".into(),
                level: "Audit".into(),
                ..EventRecord::default()
            },
        ];
        let tally = EventTally::from_rows("System", rows);
        assert_eq!(tally.total, 4);
        assert_eq!(tally.error, 1);
        assert_eq!(tally.warning, 1);
        assert_eq!(tally.information, 1);
        assert_eq!(tally.other, 1);
        assert_eq!(tally.newest.len(), 2);
        // newest first
        assert_eq!(tally.newest[0].level, "Warning");
        assert_eq!(tally.newest[1].message, "disk failure");
    }

    #[test]
    fn long_event_messages_are_truncated() {
        let rows = vec![EventRecord {
            time_created: "t".into(),
            level: "Error".into(),
            message: "x".repeat(300),
            ..EventRecord::default()
        }];
        let tally = EventTally::from_rows("Application", rows);
        assert_eq!(tally.newest[0].message.len(), 203);
        assert!(tally.newest[0].message.ends_with("..."));
    }
}
