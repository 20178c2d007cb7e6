//! Report assembly and rendering. Rendering is presentation-only: it never
//! classifies and never mutates severities, so re-rendering an unmodified
//! report is byte-identical (the timestamp lives inside the report itself).

use std::fmt::Write as _;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::classify::classify_snapshot;
use crate::finding::{count_severity, sort_findings, Finding, Severity};
use crate::record::Snapshot;
use crate::thresholds::ThresholdSet;

/// Durable output contract of one run: thresholds used, every normalized
/// input record, and the sorted finding list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: NaiveDateTime,
    pub thresholds: ThresholdSet,
    pub inputs: Snapshot,
    pub findings: Vec<Finding>,
}

impl Report {
    /// Classify the snapshot, aggregate and sort the findings, and freeze
    /// the result. The only non-deterministic input is `now`.
    pub fn build(thresholds: ThresholdSet, inputs: Snapshot, now: NaiveDateTime) -> Self {
        let mut findings = classify_snapshot(&inputs, &thresholds, now);
        sort_findings(&mut findings);
        Self {
            generated_at: now,
            thresholds,
            inputs,
            findings,
        }
    }

    pub fn alerts(&self) -> usize {
        count_severity(&self.findings, Severity::Alert)
    }

    pub fn warnings(&self) -> usize {
        count_severity(&self.findings, Severity::Warn)
    }
}

/// Pretty JSON form, suitable for programmatic re-consumption.
pub fn render_json(report: &Report) -> anyhow::Result<String> {
    let mut out = serde_json::to_string_pretty(report)?;
    out.push('\n');
    Ok(out)
}

/// Self-contained HTML document with a fixed section order: summary, full
/// findings list, then one table per check category. Empty tables render a
/// "No data" placeholder instead of omitting the section.
pub fn render_html(report: &Report) -> String {
    let host = report
        .inputs
        .system
        .as_ref()
        .map(|s| s.hostname.clone())
        .unwrap_or_default();
    let os = report
        .inputs
        .system
        .as_ref()
        .map(|s| s.os.clone())
        .unwrap_or_default();
    let uptime = report
        .inputs
        .system
        .as_ref()
        .and_then(|s| s.uptime_hours)
        .map(|h| format!("{h:.1}"))
        .unwrap_or_default();
    let generated = report.generated_at.format("%Y-%m-%d %H:%M:%S").to_string();
    let t = &report.thresholds;

    let reboot_line = match &report.inputs.reboot {
        Some(r) if r.pending => format!("Pending reboot: YES {}", r.reasons.join(", ")),
        Some(_) => "Pending reboot: No".to_string(),
        None => "Pending reboot: unknown".to_string(),
    };

    let summary = make_table(
        &["Host", "OS", "Uptime (hrs)", "Alerts", "Warnings", "Generated"],
        vec![vec![
            host.clone(),
            os,
            uptime,
            report.alerts().to_string(),
            report.warnings().to_string(),
            generated.clone(),
        ]],
    );

    let findings_tbl = make_table(
        &["Status", "Category", "Details"],
        report
            .findings
            .iter()
            .map(|f| {
                vec![
                    Cell::raw(badge(f.severity)),
                    Cell::text(&f.category),
                    Cell::text(&f.message),
                ]
            })
            .collect(),
    );

    let disks_tbl = make_table(
        &["Drive", "SizeGB", "FreeGB", "Free%", "Volume", "Status", "Notes"],
        report
            .inputs
            .disks
            .iter()
            .map(|d| {
                let (status, note) = finding_columns(report, &format!("Disk {}", d.drive));
                vec![
                    d.drive.clone(),
                    fmt_opt2(d.size_gb),
                    fmt_opt2(d.free_gb),
                    fmt_opt2(d.free_percent),
                    d.volume_name.clone(),
                    status,
                    note,
                ]
            })
            .collect(),
    );

    let resource_tbl = make_table(
        &["CPU Load %", "Memory Used %"],
        report
            .inputs
            .resource
            .iter()
            .map(|r| vec![fmt_opt2(r.cpu_load_percent), fmt_opt2(r.memory_used_percent)])
            .collect(),
    );

    let services_tbl = make_table(
        &["Name", "DisplayName", "State", "StartMode"],
        report
            .inputs
            .services
            .iter()
            .map(|s| {
                vec![
                    s.name.clone(),
                    s.display_name.clone(),
                    s.state.clone(),
                    s.start_mode.clone(),
                ]
            })
            .collect(),
    );

    let protection_tbl = make_table(
        &["Available", "RealTimeProtection", "AntivirusEnabled", "Notes"],
        report
            .inputs
            .protection
            .iter()
            .map(|p| {
                vec![
                    fmt_opt_bool(p.available),
                    fmt_opt_bool(p.real_time_protection),
                    fmt_opt_bool(p.antivirus_enabled),
                    p.notes.clone(),
                ]
            })
            .collect(),
    );

    let jobs_tbl = make_table(
        &[
            "Job",
            "Last Result",
            "Last Run",
            "Last Success",
            "Days Since Success",
            "Duration (min)",
            "Notes",
        ],
        report
            .inputs
            .jobs
            .iter()
            .map(|j| {
                let days = j
                    .last_success
                    .map(|s| (report.generated_at - s).num_seconds() as f64 / 86_400.0);
                vec![
                    j.name.clone(),
                    j.last_result.clone(),
                    fmt_opt_dt(j.last_run),
                    fmt_opt_dt(j.last_success),
                    days.map(|d| format!("{d:.2}")).unwrap_or_default(),
                    j.duration_minutes
                        .map(|d| format!("{d:.1}"))
                        .unwrap_or_default(),
                    j.notes.clone(),
                ]
            })
            .collect(),
    );

    let counters_tbl = make_table(
        &["Counter", "Avg", "Max", "Samples", "Status", "Notes"],
        report
            .inputs
            .counters
            .iter()
            .map(|c| {
                let (status, note) = finding_columns(report, &c.label);
                vec![
                    c.label.clone(),
                    fmt_opt3(c.average),
                    fmt_opt3(c.maximum),
                    c.samples.to_string(),
                    status,
                    note,
                ]
            })
            .collect(),
    );

    let events_tbl = make_table(
        &[
            "Log",
            "Critical",
            "Error",
            "Warning",
            "Information",
            "Other",
            "Total",
        ],
        report
            .inputs
            .event_logs
            .iter()
            .map(|e| {
                vec![
                    e.log.clone(),
                    e.critical.to_string(),
                    e.error.to_string(),
                    e.warning.to_string(),
                    e.information.to_string(),
                    e.other.to_string(),
                    e.total.to_string(),
                ]
            })
            .collect(),
    );

    let newest_tbl = make_table(
        &["Log", "Time", "Level", "Provider", "EventID", "Message (truncated)"],
        report
            .inputs
            .event_logs
            .iter()
            .flat_map(|e| {
                e.newest.iter().map(|ev| {
                    vec![
                        e.log.clone(),
                        ev.time_created.clone(),
                        ev.level.clone(),
                        ev.provider.clone(),
                        ev.event_id.clone(),
                        ev.message.clone(),
                    ]
                })
            })
            .collect(),
    );

    let mut out = String::new();
    let _ = write!(
        out,
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8" />
  <title>Health Triage Report - {title}</title>
  <style>
    body {{ font-family: Segoe UI, Arial, sans-serif; margin: 24px; }}
    h1 {{ margin-bottom: 6px; }}
    .meta {{ color: #555; margin-bottom: 18px; }}
    .badge {{ display: inline-block; padding: 2px 8px; border-radius: 999px; font-weight: 700; font-size: 12px; }}
    .ok {{ background: #e9f7ef; }}
    .warn {{ background: #fff4e5; }}
    .bad {{ background: #fdecea; }}
    table {{ border-collapse: collapse; width: 100%; margin: 10px 0 22px; }}
    th, td {{ border: 1px solid #ddd; padding: 8px; font-size: 14px; vertical-align: top; }}
    th {{ text-align: left; background: #f6f6f6; }}
  </style>
</head>
<body>
  <h1>Health Triage Report</h1>
  <div class="meta">
    <div><b>{reboot}</b></div>
    <div><b>Thresholds:</b> Disk warn {dw}% / alert {da}%,
      CPU warn {cw}% / alert {ca}%,
      Mem warn {mw}% / alert {ma}%,
      Stale {sd} days</div>
    <div><b>Generated:</b> {generated}</div>
  </div>

  <h2>Summary</h2>
  {summary}

  <h2>Findings</h2>
  {findings}

  <h2>Disks</h2>
  {disks}

  <h2>CPU / Memory</h2>
  {resource}

  <h2>Auto Services Stopped</h2>
  {services}

  <h2>Protection</h2>
  {protection}

  <h2>Backup Jobs</h2>
  {jobs}

  <h2>Performance Counters</h2>
  {counters}

  <h2>Event Summary</h2>
  {events}

  <h2>Newest Events (Critical/Error/Warning)</h2>
  {newest}
</body>
</html>
"#,
        title = esc(&host),
        reboot = esc(&reboot_line),
        dw = t.disk_free_warn_pct,
        da = t.disk_free_alert_pct,
        cw = t.cpu_warn_pct,
        ca = t.cpu_alert_pct,
        mw = t.mem_used_warn_pct,
        ma = t.mem_used_alert_pct,
        sd = t.stale_days,
        generated = esc(&generated),
        summary = summary,
        findings = findings_tbl,
        disks = disks_tbl,
        resource = resource_tbl,
        services = services_tbl,
        protection = protection_tbl,
        jobs = jobs_tbl,
        counters = counters_tbl,
        events = events_tbl,
        newest = newest_tbl,
    );
    out
}

/// Status/message columns for a detail row, read back from the already
/// classified finding list. The renderer never classifies on its own.
fn finding_columns(report: &Report, category: &str) -> (String, String) {
    report
        .findings
        .iter()
        .find(|f| f.category == category)
        .map(|f| (f.severity.as_str().to_string(), f.message.clone()))
        .unwrap_or_default()
}

/// A table cell: either free text (escaped) or pre-rendered markup.
enum Cell {
    Text(String),
    Raw(String),
}

impl Cell {
    fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    fn raw(s: impl Into<String>) -> Self {
        Cell::Raw(s.into())
    }

    fn render(&self) -> String {
        match self {
            Cell::Text(s) => esc(s),
            Cell::Raw(s) => s.clone(),
        }
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

fn make_table<C: Into<Cell>>(headers: &[&str], rows: Vec<Vec<C>>) -> String {
    let mut out = String::from("<table><thead><tr>");
    for h in headers {
        let _ = write!(out, "<th>{}</th>", esc(h));
    }
    out.push_str("</tr></thead><tbody>");
    if rows.is_empty() {
        let _ = write!(
            out,
            "<tr><td colspan='{}'><i>No data</i></td></tr>",
            headers.len()
        );
    } else {
        for row in rows {
            out.push_str("<tr>");
            for cell in row {
                let _ = write!(out, "<td>{}</td>", cell.into().render());
            }
            out.push_str("</tr>");
        }
    }
    out.push_str("</tbody></table>");
    out
}

fn badge(severity: Severity) -> String {
    let class = match severity {
        Severity::Ok => "ok",
        Severity::Warn => "warn",
        Severity::Alert => "bad",
    };
    format!("<span class='badge {class}'>{}</span>", severity.as_str())
}

/// Escape free text for HTML output.
fn esc(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn fmt_opt2(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_default()
}

fn fmt_opt3(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.3}")).unwrap_or_default()
}

fn fmt_opt_bool(value: Option<bool>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt_opt_dt(value: Option<NaiveDateTime>) -> String {
    value
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DiskRecord, JobRecord, ResourceRecord, SystemInfo};
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 20)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn sample_report() -> Report {
        let snapshot = Snapshot {
            system: Some(SystemInfo {
                hostname: "SRV-01".into(),
                os: "Windows Server 2022".into(),
                uptime_hours: Some(120.5),
                boot_time: None,
            }),
            disks: vec![DiskRecord {
                drive: "C:".into(),
                size_gb: Some(256.0),
                free_gb: Some(7.7),
                free_percent: Some(3.0),
                volume_name: "OS <system>".into(),
            }],
            resource: Some(ResourceRecord {
                cpu_load_percent: Some(42.0),
                memory_used_percent: None,
            }),
            jobs: vec![JobRecord {
                name: "nightly & weekly".into(),
                last_run: Some(ts()),
                last_result: "Success".into(),
                last_success: Some(ts() - chrono::Duration::days(1)),
                duration_minutes: Some(33.3),
                notes: String::new(),
            }],
            ..Snapshot::default()
        };
        Report::build(ThresholdSet::default(), snapshot, ts())
    }

    #[test]
    fn findings_are_sorted_most_urgent_first() {
        let report = sample_report();
        assert!(report.alerts() >= 1);
        assert_eq!(report.findings[0].severity, Severity::Alert);
        let ranks: Vec<Severity> = report.findings.iter().map(|f| f.severity).collect();
        let mut sorted = ranks.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(ranks, sorted);
    }

    #[test]
    fn json_form_round_trips() {
        let report = sample_report();
        let json = render_json(&report).unwrap();
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.findings.len(), report.findings.len());
        assert_eq!(parsed.generated_at, report.generated_at);
        // rendering from the re-parsed report matches the original rendering
        assert_eq!(render_html(&parsed), render_html(&report));
    }

    #[test]
    fn double_render_is_byte_identical() {
        let report = sample_report();
        assert_eq!(render_html(&report), render_html(&report));
        assert_eq!(
            render_json(&report).unwrap(),
            render_json(&report).unwrap()
        );
    }

    #[test]
    fn html_escapes_free_text() {
        let report = sample_report();
        let html = render_html(&report);
        assert!(html.contains("OS &lt;system&gt;"));
        assert!(html.contains("nightly &amp; weekly"));
        assert!(!html.contains("OS <system>"));
    }

    #[test]
    fn empty_sections_render_no_data_placeholder() {
        let report = Report::build(ThresholdSet::default(), Snapshot::default(), ts());
        let html = render_html(&report);
        assert!(html.contains("<h2>Auto Services Stopped</h2>"));
        assert!(html.contains("<h2>Performance Counters</h2>"));
        assert!(html.contains("No data"));
    }

    #[test]
    fn summary_counts_match_findings_list() {
        let report = sample_report();
        let html = render_html(&report);
        assert!(html.contains(&format!(
            "<td>{}</td><td>{}</td>",
            report.alerts(),
            report.warnings()
        )));
    }
}
