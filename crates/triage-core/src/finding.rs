use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Triage outcome for one observation, totally ordered by urgency
/// (`Alert > Warn > Ok`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Ok,
    Warn,
    Alert,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warn => "WARN",
            Severity::Alert => "ALERT",
        }
    }
}

/// One classified observation about a single monitored entity.
///
/// `days_since_success` is only populated for job-style findings and acts as
/// the secondary sort key within a severity band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_since_success: Option<f64>,
}

impl Finding {
    pub fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            days_since_success: None,
        }
    }

    pub fn with_staleness(mut self, days: Option<f64>) -> Self {
        self.days_since_success = days;
        self
    }
}

/// Order findings for display: ALERT first, then WARN, then OK; within a
/// severity band the stalest entries come first. The sort is stable, so ties
/// keep their input order and repeated runs over unchanged input produce an
/// identical artifact.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        b.severity.cmp(&a.severity).then_with(|| {
            let da = a.days_since_success.unwrap_or(0.0);
            let db = b.days_since_success.unwrap_or(0.0);
            db.partial_cmp(&da).unwrap_or(Ordering::Equal)
        })
    });
}

/// Count findings of one severity. Summary counts are always derived from
/// the finding list, never stored alongside it.
pub fn count_severity(findings: &[Finding], severity: Severity) -> usize {
    findings.iter().filter(|f| f.severity == severity).count()
}
