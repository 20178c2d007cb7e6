use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categorical outcome of a job result code against the configured value
/// sets. Values in none of the sets are benign by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Warning,
    Fail,
    Unknown,
}

/// Boundaries for one performance counter. High-is-bad counters carry
/// `warn`/`alert`; inverse metrics (free capacity, available memory) carry
/// `warn_low`/`alert_low`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CounterBounds {
    HighIsBad { warn: f64, alert: f64 },
    LowIsBad { warn_low: f64, alert_low: f64 },
}

/// Externally supplied policy values bounding each metric's OK/WARN/ALERT
/// ranges. Loaded once per run, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSet {
    #[serde(default = "default_disk_free_warn")]
    pub disk_free_warn_pct: f64,
    #[serde(default = "default_disk_free_alert")]
    pub disk_free_alert_pct: f64,

    #[serde(default = "default_cpu_warn")]
    pub cpu_warn_pct: f64,
    #[serde(default = "default_cpu_alert")]
    pub cpu_alert_pct: f64,

    #[serde(default = "default_mem_warn")]
    pub mem_used_warn_pct: f64,
    #[serde(default = "default_mem_alert")]
    pub mem_used_alert_pct: f64,

    /// Service names exempt from the stopped-service check, compared
    /// case-insensitively. Matching records contribute no finding at all.
    #[serde(default)]
    pub service_allowlist: Vec<String>,

    #[serde(default = "default_success_values")]
    pub allowed_success_values: Vec<String>,
    #[serde(default = "default_warning_values")]
    pub allowed_warning_values: Vec<String>,
    #[serde(default = "default_fail_values")]
    pub allowed_fail_values: Vec<String>,

    /// Escalate warning-class job results to ALERT.
    #[serde(default)]
    pub fail_on_warning_result: bool,

    #[serde(default = "default_warning_days")]
    pub warning_days: f64,
    #[serde(default = "default_stale_days")]
    pub stale_days: f64,

    /// Critical+Error event tally boundaries; absent means event volume is
    /// not classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_error_warn: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_error_alert: Option<u64>,

    /// Per-counter bounds keyed by canonical counter path (host-stripped,
    /// lowercased).
    #[serde(default = "default_counters")]
    pub counters: BTreeMap<String, CounterBounds>,
}

fn default_disk_free_warn() -> f64 {
    10.0
}
fn default_disk_free_alert() -> f64 {
    5.0
}
fn default_cpu_warn() -> f64 {
    70.0
}
fn default_cpu_alert() -> f64 {
    85.0
}
fn default_mem_warn() -> f64 {
    75.0
}
fn default_mem_alert() -> f64 {
    90.0
}
fn default_success_values() -> Vec<String> {
    vec!["success".into()]
}
fn default_warning_values() -> Vec<String> {
    vec!["warning".into()]
}
fn default_fail_values() -> Vec<String> {
    vec!["failed".into(), "error".into()]
}
fn default_warning_days() -> f64 {
    2.0
}
fn default_stale_days() -> f64 {
    3.0
}

fn default_counters() -> BTreeMap<String, CounterBounds> {
    let mut counters = BTreeMap::new();
    counters.insert(
        "\\processor(_total)\\% processor time".to_string(),
        CounterBounds::HighIsBad {
            warn: 70.0,
            alert: 85.0,
        },
    );
    counters.insert(
        "\\memory\\% committed bytes in use".to_string(),
        CounterBounds::HighIsBad {
            warn: 75.0,
            alert: 85.0,
        },
    );
    counters.insert(
        "\\physicaldisk(_total)\\avg. disk queue length".to_string(),
        CounterBounds::HighIsBad { warn: 2.0, alert: 4.0 },
    );
    counters.insert(
        "\\memory\\available mbytes".to_string(),
        CounterBounds::LowIsBad {
            warn_low: 1024.0,
            alert_low: 512.0,
        },
    );
    counters
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            disk_free_warn_pct: default_disk_free_warn(),
            disk_free_alert_pct: default_disk_free_alert(),
            cpu_warn_pct: default_cpu_warn(),
            cpu_alert_pct: default_cpu_alert(),
            mem_used_warn_pct: default_mem_warn(),
            mem_used_alert_pct: default_mem_alert(),
            service_allowlist: Vec::new(),
            allowed_success_values: default_success_values(),
            allowed_warning_values: default_warning_values(),
            allowed_fail_values: default_fail_values(),
            fail_on_warning_result: false,
            warning_days: default_warning_days(),
            stale_days: default_stale_days(),
            events_error_warn: None,
            events_error_alert: None,
            counters: default_counters(),
        }
    }
}

/// Errors emitted while validating a threshold configuration. All of these
/// are fatal before any record is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`{metric}` alert boundary {alert} must be >= warn boundary {warn}")]
    AlertBelowWarn { metric: String, warn: f64, alert: f64 },
    #[error("`{metric}` alert_low boundary {alert_low} must be <= warn_low boundary {warn_low}")]
    AlertAboveWarnLow {
        metric: String,
        warn_low: f64,
        alert_low: f64,
    },
    #[error("stale_days {stale_days} must be >= warning_days {warning_days}")]
    StalenessOrder { warning_days: f64, stale_days: f64 },
}

impl ThresholdSet {
    /// Check the alert-at-least-as-extreme-as-warn invariant for every
    /// metric. Violations are configuration errors, not classification
    /// errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // disk free percent is a low-is-bad metric
        if self.disk_free_alert_pct > self.disk_free_warn_pct {
            return Err(ConfigError::AlertAboveWarnLow {
                metric: "disk_free_pct".into(),
                warn_low: self.disk_free_warn_pct,
                alert_low: self.disk_free_alert_pct,
            });
        }
        for (metric, warn, alert) in [
            ("cpu_pct", self.cpu_warn_pct, self.cpu_alert_pct),
            ("mem_used_pct", self.mem_used_warn_pct, self.mem_used_alert_pct),
        ] {
            if alert < warn {
                return Err(ConfigError::AlertBelowWarn {
                    metric: metric.into(),
                    warn,
                    alert,
                });
            }
        }
        if let (Some(warn), Some(alert)) = (self.events_error_warn, self.events_error_alert) {
            if alert < warn {
                return Err(ConfigError::AlertBelowWarn {
                    metric: "events_error".into(),
                    warn: warn as f64,
                    alert: alert as f64,
                });
            }
        }
        if self.stale_days < self.warning_days {
            return Err(ConfigError::StalenessOrder {
                warning_days: self.warning_days,
                stale_days: self.stale_days,
            });
        }
        for (key, bounds) in &self.counters {
            match *bounds {
                CounterBounds::HighIsBad { warn, alert } => {
                    if alert < warn {
                        return Err(ConfigError::AlertBelowWarn {
                            metric: key.clone(),
                            warn,
                            alert,
                        });
                    }
                }
                CounterBounds::LowIsBad { warn_low, alert_low } => {
                    if alert_low > warn_low {
                        return Err(ConfigError::AlertAboveWarnLow {
                            metric: key.clone(),
                            warn_low,
                            alert_low,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Look up counter bounds by canonical key, case-insensitively.
    pub fn counter_bounds(&self, key: &str) -> Option<&CounterBounds> {
        self.counters.get(key).or_else(|| {
            self.counters
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    pub fn is_service_allowlisted(&self, name: &str) -> bool {
        self.service_allowlist
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(name.trim()))
    }

    /// Classify a job result code against the configured value sets. The
    /// fail set is checked first so a value listed in several sets fails.
    pub fn outcome_of(&self, result: &str) -> Outcome {
        let res = result.trim();
        let matches = |values: &[String]| values.iter().any(|v| v.eq_ignore_ascii_case(res));
        if matches(&self.allowed_fail_values) {
            Outcome::Fail
        } else if matches(&self.allowed_warning_values) {
            Outcome::Warning
        } else if matches(&self.allowed_success_values) {
            Outcome::Success
        } else {
            Outcome::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_is_valid() {
        let t = ThresholdSet::default();
        t.validate().expect("defaults must satisfy the ordering invariant");
        assert_eq!(t.disk_free_warn_pct, 10.0);
        assert_eq!(t.stale_days, 3.0);
        assert!(t.counters.contains_key("\\memory\\available mbytes"));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let t: ThresholdSet = serde_json::from_str("{}").unwrap();
        assert_eq!(t.cpu_alert_pct, 85.0);
        assert_eq!(t.allowed_fail_values, vec!["failed", "error"]);
        assert!(!t.fail_on_warning_result);
    }

    #[test]
    fn inverted_high_is_bad_bounds_are_rejected() {
        let t: ThresholdSet =
            serde_json::from_str(r#"{"cpu_warn_pct": 90, "cpu_alert_pct": 80}"#).unwrap();
        let err = t.validate().unwrap_err();
        assert!(matches!(err, ConfigError::AlertBelowWarn { .. }));
        assert!(err.to_string().contains("cpu_pct"));
    }

    #[test]
    fn inverted_low_is_bad_bounds_are_rejected() {
        let t: ThresholdSet =
            serde_json::from_str(r#"{"disk_free_warn_pct": 5, "disk_free_alert_pct": 10}"#)
                .unwrap();
        assert!(matches!(
            t.validate().unwrap_err(),
            ConfigError::AlertAboveWarnLow { .. }
        ));
    }

    #[test]
    fn staleness_boundaries_must_be_ordered() {
        let t: ThresholdSet =
            serde_json::from_str(r#"{"warning_days": 5, "stale_days": 2}"#).unwrap();
        assert!(matches!(
            t.validate().unwrap_err(),
            ConfigError::StalenessOrder { .. }
        ));
    }

    #[test]
    fn counter_bounds_parse_untagged() {
        let t: ThresholdSet = serde_json::from_str(
            r#"{
                "counters": {
                    "\\processor(_total)\\% processor time": {"warn": 60, "alert": 80},
                    "\\memory\\available mbytes": {"warn_low": 2048, "alert_low": 1024}
                }
            }"#,
        )
        .unwrap();
        t.validate().unwrap();
        assert!(matches!(
            t.counter_bounds("\\processor(_total)\\% processor time"),
            Some(CounterBounds::HighIsBad { warn, .. }) if *warn == 60.0
        ));
        assert!(matches!(
            t.counter_bounds("\\MEMORY\\Available MBytes"),
            Some(CounterBounds::LowIsBad { alert_low, .. }) if *alert_low == 1024.0
        ));
    }

    #[test]
    fn inverted_counter_bounds_are_rejected() {
        let t: ThresholdSet = serde_json::from_str(
            r#"{"counters": {"\\memory\\available mbytes": {"warn_low": 100, "alert_low": 200}}}"#,
        )
        .unwrap();
        assert!(t.validate().is_err());
    }

    #[test]
    fn outcome_sets_match_case_insensitively() {
        let t = ThresholdSet::default();
        assert_eq!(t.outcome_of("Success"), Outcome::Success);
        assert_eq!(t.outcome_of("WARNING"), Outcome::Warning);
        assert_eq!(t.outcome_of("Failed"), Outcome::Fail);
        assert_eq!(t.outcome_of("error"), Outcome::Fail);
        assert_eq!(t.outcome_of("SomethingElse"), Outcome::Unknown);
    }

    #[test]
    fn allowlist_matching_ignores_case_and_whitespace() {
        let t: ThresholdSet =
            serde_json::from_str(r#"{"service_allowlist": ["gupdate", "SysmonLog"]}"#).unwrap();
        assert!(t.is_service_allowlisted("GUpdate"));
        assert!(t.is_service_allowlisted(" sysmonlog "));
        assert!(!t.is_service_allowlisted("spooler"));
    }
}
