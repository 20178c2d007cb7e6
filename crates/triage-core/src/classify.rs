//! Pure threshold classification. Every function here is a total function
//! over well-typed input: same (record, thresholds) always yields the same
//! findings, and no classifier panics or errors for numeric input.

use chrono::NaiveDateTime;

use crate::finding::{Finding, Severity};
use crate::record::{
    CounterRecord, DiskRecord, EventTally, JobRecord, ProtectionRecord, RebootRecord,
    ResourceRecord, ServiceRecord, Snapshot,
};
use crate::thresholds::{CounterBounds, Outcome, ThresholdSet};

/// Run every category classifier over the snapshot and collect the raw
/// (unsorted) finding list. `now` anchors staleness measurement.
pub fn classify_snapshot(snapshot: &Snapshot, thresholds: &ThresholdSet, now: NaiveDateTime) -> Vec<Finding> {
    let mut findings = Vec::new();
    for disk in &snapshot.disks {
        findings.push(classify_disk(disk, thresholds));
    }
    if let Some(resource) = &snapshot.resource {
        findings.extend(classify_resource(resource, thresholds));
    }
    for service in &snapshot.services {
        findings.extend(classify_service(service, thresholds));
    }
    if let Some(reboot) = &snapshot.reboot {
        findings.push(classify_reboot(reboot));
    }
    if let Some(protection) = &snapshot.protection {
        findings.push(classify_protection(protection));
    }
    for job in &snapshot.jobs {
        findings.push(classify_job(job, now, thresholds));
    }
    for counter in &snapshot.counters {
        findings.push(classify_counter(counter, thresholds));
    }
    for tally in &snapshot.event_logs {
        findings.push(classify_events(tally, thresholds));
    }
    findings
}

/// Free disk capacity is a low-is-bad metric; a missing percentage is itself
/// a WARN finding, never silently healthy.
pub fn classify_disk(disk: &DiskRecord, t: &ThresholdSet) -> Finding {
    let category = format!("Disk {}", disk.drive);
    match disk.free_percent {
        None => Finding::new(Severity::Warn, category, "No disk size/free data"),
        Some(pct) if pct < t.disk_free_alert_pct => Finding::new(
            Severity::Alert,
            category,
            format!("Low disk space: {pct:.2}% free"),
        ),
        Some(pct) if pct < t.disk_free_warn_pct => Finding::new(
            Severity::Warn,
            category,
            format!("Disk space getting low: {pct:.2}% free"),
        ),
        Some(pct) => Finding::new(Severity::Ok, category, format!("Disk space OK: {pct:.2}% free")),
    }
}

/// CPU and memory classify independently; one snapshot yields two findings.
pub fn classify_resource(resource: &ResourceRecord, t: &ThresholdSet) -> Vec<Finding> {
    vec![
        classify_high_is_bad(
            "CPU",
            resource.cpu_load_percent,
            t.cpu_warn_pct,
            t.cpu_alert_pct,
            "CPU load",
        ),
        classify_high_is_bad(
            "Memory",
            resource.memory_used_percent,
            t.mem_used_warn_pct,
            t.mem_used_alert_pct,
            "memory usage",
        ),
    ]
}

fn classify_high_is_bad(category: &str, value: Option<f64>, warn: f64, alert: f64, what: &str) -> Finding {
    match value {
        None => Finding::new(Severity::Warn, category, format!("{what} unavailable")),
        Some(v) if v >= alert => {
            Finding::new(Severity::Alert, category, format!("High {what}: {v:.2}%"))
        }
        Some(v) if v >= warn => {
            Finding::new(Severity::Warn, category, format!("Elevated {what}: {v:.2}%"))
        }
        Some(v) => Finding::new(Severity::Ok, category, format!("{what} OK: {v:.2}%")),
    }
}

/// Allow-listed services are excluded from classification entirely: no
/// finding at all, which is distinct from a monitored-and-healthy OK.
pub fn classify_service(service: &ServiceRecord, t: &ThresholdSet) -> Option<Finding> {
    if t.is_service_allowlisted(&service.name) {
        return None;
    }
    let label = if service.display_name.trim().is_empty() {
        service.name.clone()
    } else {
        service.display_name.clone()
    };
    Some(Finding::new(
        Severity::Warn,
        format!("Service {}", service.name),
        format!("Automatic service not running: {label}"),
    ))
}

pub fn classify_reboot(reboot: &RebootRecord) -> Finding {
    if reboot.pending {
        let message = if reboot.reasons.is_empty() {
            "Pending reboot detected".to_string()
        } else {
            format!("Pending reboot detected: {}", reboot.reasons.join(", "))
        };
        Finding::new(Severity::Warn, "Reboot", message)
    } else {
        Finding::new(Severity::Ok, "Reboot", "No reboot pending")
    }
}

/// Protection flags are categorical; an unavailable status is a WARN, not a
/// silent pass.
pub fn classify_protection(protection: &ProtectionRecord) -> Finding {
    let category = "Protection";
    match protection.available {
        Some(true) => {
            if protection.real_time_protection == Some(false) {
                Finding::new(Severity::Warn, category, "Real-time protection is disabled")
            } else if protection.antivirus_enabled == Some(false) {
                Finding::new(Severity::Warn, category, "Antivirus engine is disabled")
            } else {
                Finding::new(Severity::Ok, category, "Protection enabled")
            }
        }
        _ => Finding::new(Severity::Warn, category, "Protection status unavailable"),
    }
}

/// Combine the categorical outcome with staleness: the final severity is the
/// more severe of the two, and when both degrade the result the reason keeps
/// both explanations. A missing last-success timestamp is an ALERT outright;
/// silence about the most important signal is treated as failure.
///
/// An escalated warning result (`fail_on_warning_result`) returns ALERT
/// unconditionally; staleness never caps it.
pub fn classify_job(job: &JobRecord, now: NaiveDateTime, t: &ThresholdSet) -> Finding {
    let category = format!("Job {}", job.name);
    let days = job
        .last_success
        .map(|s| (now - s).num_seconds() as f64 / 86_400.0);

    let outcome = t.outcome_of(&job.last_result);
    match outcome {
        Outcome::Fail => {
            return Finding::new(
                Severity::Alert,
                category,
                format!("Last result is {}", job.last_result),
            )
            .with_staleness(days);
        }
        Outcome::Warning if t.fail_on_warning_result => {
            return Finding::new(
                Severity::Alert,
                category,
                format!("Last result is {}", job.last_result),
            )
            .with_staleness(days);
        }
        _ => {}
    }

    let (base_severity, base_reason) = match outcome {
        Outcome::Warning => (
            Severity::Warn,
            format!("Last result is {}", job.last_result),
        ),
        _ => (Severity::Ok, "Last result OK".to_string()),
    };

    let Some(d) = days else {
        return Finding::new(Severity::Alert, category, "No last_success timestamp");
    };

    let (stale_severity, stale_reason) = if d >= t.stale_days {
        (
            Severity::Alert,
            format!("Stale: last success {d:.1} days ago"),
        )
    } else if d >= t.warning_days {
        (
            Severity::Warn,
            format!("Approaching stale: last success {d:.1} days ago"),
        )
    } else {
        (Severity::Ok, String::new())
    };

    let severity = base_severity.max(stale_severity);
    let message = match (base_severity, stale_severity) {
        (Severity::Ok, Severity::Ok) => base_reason,
        (Severity::Ok, _) => stale_reason,
        (_, Severity::Ok) => base_reason,
        _ => format!("{base_reason}; {stale_reason}"),
    };

    Finding::new(severity, category, message).with_staleness(Some(d))
}

/// Counters check both the running average and the observed maximum; either
/// one crossing a boundary is sufficient. A counter without configured
/// bounds is benign by design.
pub fn classify_counter(counter: &CounterRecord, t: &ThresholdSet) -> Finding {
    let category = counter.label.clone();
    let Some(bounds) = t.counter_bounds(&counter.key) else {
        return Finding::new(Severity::Ok, category, "No threshold set");
    };

    let (avg, max) = (counter.average, counter.maximum);
    if avg.is_none() && max.is_none() {
        return Finding::new(Severity::Warn, category, "No samples collected");
    }
    let shown = format!(
        "avg={}, max={}",
        fmt_opt(avg),
        fmt_opt(max)
    );

    match *bounds {
        CounterBounds::HighIsBad { warn, alert } => {
            let crosses = |bound: f64| {
                avg.map_or(false, |v| v >= bound) || max.map_or(false, |v| v >= bound)
            };
            if crosses(alert) {
                Finding::new(Severity::Alert, category, format!("High usage ({shown})"))
            } else if crosses(warn) {
                Finding::new(Severity::Warn, category, format!("Elevated usage ({shown})"))
            } else {
                Finding::new(Severity::Ok, category, "Within normal range")
            }
        }
        CounterBounds::LowIsBad { warn_low, alert_low } => {
            let crosses = |bound: f64| {
                avg.map_or(false, |v| v <= bound) || max.map_or(false, |v| v <= bound)
            };
            if crosses(alert_low) {
                Finding::new(Severity::Alert, category, format!("Low capacity ({shown})"))
            } else if crosses(warn_low) {
                Finding::new(Severity::Warn, category, format!("Capacity getting low ({shown})"))
            } else {
                Finding::new(Severity::Ok, category, "Within normal range")
            }
        }
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.1}")).unwrap_or_else(|| "n/a".into())
}

/// Critical+Error volume in the window, high-is-bad against the optional
/// event bounds.
pub fn classify_events(tally: &EventTally, t: &ThresholdSet) -> Finding {
    let category = format!("Events {}", tally.log);
    let errors = tally.critical + tally.error;
    let message = format!("{errors} critical/error event(s) in window");
    if let Some(alert) = t.events_error_alert {
        if errors >= alert {
            return Finding::new(Severity::Alert, category, message);
        }
    }
    if let Some(warn) = t.events_error_warn {
        if errors >= warn {
            return Finding::new(Severity::Warn, category, message);
        }
    }
    Finding::new(Severity::Ok, category, message)
}
