//! Input loading: one threshold document plus a snapshot directory of
//! per-category documents produced by out-of-scope collectors. The threshold
//! file and the snapshot directory are mandatory; every per-category
//! document is optional and defaults to an empty record set. Documents may
//! carry a UTF-8 BOM (PowerShell ConvertTo-Json/Export-Csv output).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::record::{
    CounterRecord, DiskRecord, EventRecord, EventTally, JobRecord, ProtectionRecord, RebootRecord,
    ResourceRecord, ServiceRecord, Snapshot, SystemInfo,
};
use crate::thresholds::{ConfigError, ThresholdSet};

/// Fatal input errors. Any of these aborts the run before output is written.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("missing required input: {0}")]
    Missing(PathBuf),
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid CSV in {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Load and validate the threshold document. Fatal on any failure.
pub fn load_thresholds(path: &Path) -> Result<ThresholdSet, SourceError> {
    if !path.exists() {
        return Err(SourceError::Missing(path.to_path_buf()));
    }
    let thresholds: ThresholdSet = read_json(path)?;
    thresholds.validate()?;
    Ok(thresholds)
}

/// Load every per-category document found under the snapshot directory.
/// The directory itself must exist; each file inside is optional.
pub fn load_snapshot(dir: &Path) -> Result<Snapshot, SourceError> {
    if !dir.is_dir() {
        return Err(SourceError::Missing(dir.to_path_buf()));
    }
    Ok(Snapshot {
        system: read_json_opt::<RawSystemInfo>(&dir.join("system_info.json"))?.map(Into::into),
        disks: load_disks(&dir.join("disk.json"))?,
        resource: read_json_opt::<RawResource>(&dir.join("resource.json"))?.map(Into::into),
        services: load_services(&dir.join("services.json"))?,
        reboot: read_json_opt::<RawReboot>(&dir.join("reboot.json"))?.map(Into::into),
        protection: read_json_opt::<RawProtection>(&dir.join("protection.json"))?.map(Into::into),
        jobs: load_jobs(&dir.join("jobs.csv"))?,
        counters: load_counters(&dir.join("perf_summary.csv"))?,
        event_logs: load_event_logs(dir)?,
    })
}

/// ConvertTo-Json emits a bare object instead of a single-element array;
/// every list-shaped document must tolerate that.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(item) => vec![item],
        }
    }
}

fn read_to_string(path: &Path) -> Result<String, SourceError> {
    let content = fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content.trim_start_matches('\u{feff}').to_string())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SourceError> {
    let content = read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| SourceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Optional JSON document: absent file or `null` body means "no data".
fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SourceError> {
    if !path.exists() {
        return Ok(None);
    }
    read_json::<Option<T>>(path)
}

/// Optional list-shaped JSON document, normalized to a list regardless of
/// whether the producer wrapped a single element.
fn read_json_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SourceError> {
    match read_json_opt::<OneOrMany<T>>(path)? {
        Some(items) => Ok(items.into_vec()),
        None => Ok(Vec::new()),
    }
}

#[derive(Deserialize)]
struct RawSystemInfo {
    #[serde(rename = "Hostname", default)]
    hostname: String,
    #[serde(rename = "OS", default)]
    os: String,
    #[serde(rename = "UptimeHours", default)]
    uptime_hours: Option<f64>,
    #[serde(rename = "BootTime", default)]
    boot_time: Option<String>,
}

impl From<RawSystemInfo> for SystemInfo {
    fn from(raw: RawSystemInfo) -> Self {
        SystemInfo {
            hostname: raw.hostname,
            os: raw.os,
            uptime_hours: raw.uptime_hours,
            boot_time: raw.boot_time,
        }
    }
}

#[derive(Deserialize)]
struct RawDisk {
    #[serde(rename = "Drive", default)]
    drive: Option<String>,
    #[serde(rename = "SizeGB", default)]
    size_gb: Option<f64>,
    #[serde(rename = "FreeGB", default)]
    free_gb: Option<f64>,
    #[serde(rename = "FreePercent", default)]
    free_percent: Option<f64>,
    #[serde(rename = "VolumeName", default)]
    volume_name: Option<String>,
}

fn load_disks(path: &Path) -> Result<Vec<DiskRecord>, SourceError> {
    let mut disks = Vec::new();
    for raw in read_json_list::<RawDisk>(path)? {
        let Some(drive) = raw.drive.filter(|d| !d.trim().is_empty()) else {
            warn!(file = %path.display(), "skipping disk record without drive id");
            continue;
        };
        disks.push(DiskRecord {
            drive,
            size_gb: raw.size_gb,
            free_gb: raw.free_gb,
            free_percent: raw.free_percent,
            volume_name: raw.volume_name.unwrap_or_default(),
        });
    }
    Ok(disks)
}

#[derive(Deserialize)]
struct RawResource {
    #[serde(rename = "CpuLoadPercent", default)]
    cpu_load_percent: Option<f64>,
    #[serde(rename = "MemoryUsedPercent", default)]
    memory_used_percent: Option<f64>,
}

impl From<RawResource> for ResourceRecord {
    fn from(raw: RawResource) -> Self {
        ResourceRecord {
            cpu_load_percent: raw.cpu_load_percent,
            memory_used_percent: raw.memory_used_percent,
        }
    }
}

#[derive(Deserialize)]
struct RawService {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "DisplayName", default)]
    display_name: Option<String>,
    #[serde(rename = "State", default)]
    state: Option<String>,
    #[serde(rename = "StartMode", default)]
    start_mode: Option<String>,
}

fn load_services(path: &Path) -> Result<Vec<ServiceRecord>, SourceError> {
    let mut services = Vec::new();
    for raw in read_json_list::<RawService>(path)? {
        let Some(name) = raw.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) else {
            warn!(file = %path.display(), "skipping service record without name");
            continue;
        };
        services.push(ServiceRecord {
            name,
            display_name: raw.display_name.unwrap_or_default(),
            state: raw.state.unwrap_or_default(),
            start_mode: raw.start_mode.unwrap_or_default(),
        });
    }
    Ok(services)
}

#[derive(Deserialize)]
struct RawReboot {
    #[serde(rename = "Pending", default)]
    pending: bool,
    #[serde(rename = "Reasons", default)]
    reasons: Option<OneOrMany<String>>,
}

impl From<RawReboot> for RebootRecord {
    fn from(raw: RawReboot) -> Self {
        RebootRecord {
            pending: raw.pending,
            reasons: raw.reasons.map(OneOrMany::into_vec).unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct RawProtection {
    #[serde(rename = "Available", default)]
    available: Option<bool>,
    #[serde(rename = "RealTimeProtectionEnabled", default)]
    real_time_protection: Option<bool>,
    #[serde(rename = "AntivirusEnabled", default)]
    antivirus_enabled: Option<bool>,
    #[serde(rename = "Notes", default)]
    notes: Option<String>,
}

impl From<RawProtection> for ProtectionRecord {
    fn from(raw: RawProtection) -> Self {
        ProtectionRecord {
            available: raw.available,
            real_time_protection: raw.real_time_protection,
            antivirus_enabled: raw.antivirus_enabled,
            notes: raw.notes.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct RawJobRow {
    #[serde(default)]
    job_name: String,
    #[serde(default)]
    last_run: String,
    #[serde(default)]
    last_result: String,
    #[serde(default)]
    last_success: String,
    #[serde(default)]
    duration_minutes: Option<f64>,
    #[serde(default)]
    notes: String,
}

/// Accept ISO-ish local timestamps (`2026-01-17T02:10:00` or with a space);
/// anything unparseable is treated as absent.
fn parse_local_dt(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
}

fn load_jobs(path: &Path) -> Result<Vec<JobRecord>, SourceError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = read_to_string(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut jobs = Vec::new();
    for row in reader.deserialize::<RawJobRow>() {
        let raw = row.map_err(|source| SourceError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if raw.job_name.trim().is_empty() {
            warn!(file = %path.display(), "skipping job row without job_name");
            continue;
        }
        jobs.push(JobRecord {
            name: raw.job_name.trim().to_string(),
            last_run: parse_local_dt(&raw.last_run),
            last_result: raw.last_result.trim().to_string(),
            last_success: parse_local_dt(&raw.last_success),
            duration_minutes: raw.duration_minutes,
            notes: raw.notes.trim().to_string(),
        });
    }
    Ok(jobs)
}

#[derive(Deserialize)]
struct RawCounterRow {
    #[serde(rename = "Counter", default)]
    counter: String,
    #[serde(rename = "Avg", default)]
    avg: Option<f64>,
    #[serde(rename = "Max", default)]
    max: Option<f64>,
    #[serde(rename = "Samples", default)]
    samples: Option<u64>,
}

fn load_counters(path: &Path) -> Result<Vec<CounterRecord>, SourceError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = read_to_string(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut counters = Vec::new();
    for row in reader.deserialize::<RawCounterRow>() {
        let raw = row.map_err(|source| SourceError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if raw.counter.trim().is_empty() {
            warn!(file = %path.display(), "skipping counter row without counter path");
            continue;
        }
        counters.push(CounterRecord::new(
            raw.counter,
            raw.avg,
            raw.max,
            raw.samples.unwrap_or(0),
        ));
    }
    Ok(counters)
}

#[derive(Deserialize)]
struct RawEventRow {
    #[serde(rename = "TimeCreated", default)]
    time_created: String,
    #[serde(rename = "LevelDisplayName", default)]
    level: String,
    #[serde(rename = "ProviderName", default)]
    provider: String,
    #[serde(rename = "EventID", default)]
    event_id: String,
    #[serde(rename = "Message", default)]
    message: String,
}

fn load_event_logs(dir: &Path) -> Result<Vec<EventTally>, SourceError> {
    let mut tallies = Vec::new();
    for (log, file) in [
        ("System", "events_system.csv"),
        ("Application", "events_application.csv"),
    ] {
        let path = dir.join(file);
        if !path.exists() {
            continue;
        }
        let content = read_to_string(&path)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut rows = Vec::new();
        for row in reader.deserialize::<RawEventRow>() {
            let raw = row.map_err(|source| SourceError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            rows.push(EventRecord {
                time_created: raw.time_created,
                level: raw.level,
                provider: raw.provider,
                event_id: raw.event_id,
                message: raw.message,
            });
        }
        tallies.push(EventTally::from_rows(log, rows));
    }
    Ok(tallies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn missing_thresholds_file_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let err = load_thresholds(&temp.path().join("thresholds.json")).unwrap_err();
        assert!(matches!(err, SourceError::Missing(_)));
    }

    #[test]
    fn thresholds_with_bom_parse() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("thresholds.json");
        write(&path, "\u{feff}{\"disk_free_warn_pct\": 20, \"disk_free_alert_pct\": 10}");
        let t = load_thresholds(&path).unwrap();
        assert_eq!(t.disk_free_warn_pct, 20.0);
    }

    #[test]
    fn invalid_threshold_ordering_is_a_config_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("thresholds.json");
        write(&path, r#"{"cpu_warn_pct": 95, "cpu_alert_pct": 80}"#);
        let err = load_thresholds(&path).unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }

    #[test]
    fn missing_snapshot_dir_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let err = load_snapshot(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, SourceError::Missing(_)));
    }

    #[test]
    fn empty_snapshot_dir_yields_empty_record_sets() {
        let temp = tempfile::tempdir().unwrap();
        let snapshot = load_snapshot(temp.path()).unwrap();
        assert!(snapshot.disks.is_empty());
        assert!(snapshot.resource.is_none());
        assert!(snapshot.jobs.is_empty());
        assert!(snapshot.event_logs.is_empty());
    }

    #[test]
    fn lone_disk_object_normalizes_to_single_element_list() {
        let temp = tempfile::tempdir().unwrap();
        write(
            &temp.path().join("disk.json"),
            r#"{"Drive": "C:", "SizeGB": 256.0, "FreeGB": 12.8, "FreePercent": 5.0, "VolumeName": "OS"}"#,
        );
        let one = load_snapshot(temp.path()).unwrap();
        assert_eq!(one.disks.len(), 1);

        write(
            &temp.path().join("disk.json"),
            r#"[{"Drive": "C:", "FreePercent": 5.0}, {"Drive": "D:", "FreePercent": 40.0}]"#,
        );
        let two = load_snapshot(temp.path()).unwrap();
        assert_eq!(two.disks.len(), 2);
        assert_eq!(one.disks[0].drive, two.disks[0].drive);
        assert_eq!(one.disks[0].free_percent, two.disks[0].free_percent);
    }

    #[test]
    fn disk_record_without_drive_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        write(
            &temp.path().join("disk.json"),
            r#"[{"FreePercent": 5.0}, {"Drive": "D:", "FreePercent": 40.0}]"#,
        );
        let snapshot = load_snapshot(temp.path()).unwrap();
        assert_eq!(snapshot.disks.len(), 1);
        assert_eq!(snapshot.disks[0].drive, "D:");
    }

    #[test]
    fn reboot_single_reason_string_normalizes_to_list() {
        let temp = tempfile::tempdir().unwrap();
        write(
            &temp.path().join("reboot.json"),
            r#"{"Pending": true, "Reasons": "Windows Update"}"#,
        );
        let snapshot = load_snapshot(temp.path()).unwrap();
        let reboot = snapshot.reboot.unwrap();
        assert!(reboot.pending);
        assert_eq!(reboot.reasons, vec!["Windows Update"]);
    }

    #[test]
    fn jobs_csv_parses_timestamps_and_skips_nameless_rows() {
        let temp = tempfile::tempdir().unwrap();
        write(
            &temp.path().join("jobs.csv"),
            "\u{feff}job_name,last_run,last_result,last_success,duration_minutes,notes\n\
             nightly,2026-08-19T02:10:00,Success,2026-08-19 02:40:00,30.5,ok\n\
             ,2026-08-19T02:10:00,Failed,,,orphan row\n\
             weekly,not-a-date,Warning,,,\n",
        );
        let snapshot = load_snapshot(temp.path()).unwrap();
        assert_eq!(snapshot.jobs.len(), 2);
        let nightly = &snapshot.jobs[0];
        assert!(nightly.last_run.is_some());
        assert!(nightly.last_success.is_some());
        assert_eq!(nightly.duration_minutes, Some(30.5));
        let weekly = &snapshot.jobs[1];
        assert!(weekly.last_run.is_none());
        assert!(weekly.last_success.is_none());
    }

    #[test]
    fn perf_summary_rows_get_canonical_keys() {
        let temp = tempfile::tempdir().unwrap();
        write(
            &temp.path().join("perf_summary.csv"),
            "Counter,Avg,Max,Samples\n\
             \\\\SRV-01\\Processor(_Total)\\% Processor Time,12.5,55.0,60\n\
             \\\\SRV-01\\Memory\\Available MBytes,,,0\n",
        );
        let snapshot = load_snapshot(temp.path()).unwrap();
        assert_eq!(snapshot.counters.len(), 2);
        assert_eq!(snapshot.counters[0].key, "\\processor(_total)\\% processor time");
        assert_eq!(snapshot.counters[0].average, Some(12.5));
        assert_eq!(snapshot.counters[1].average, None);
        assert_eq!(snapshot.counters[1].maximum, None);
    }

    #[test]
    fn event_csvs_tally_per_log() {
        let temp = tempfile::tempdir().unwrap();
        write(
            &temp.path().join("events_system.csv"),
            "TimeCreated,LevelDisplayName,ProviderName,EventID,Message\n\
             2026-08-19T10:00:00,Error,disk,7,Bad block\n\
             2026-08-19T11:00:00,Information,kernel,1,Boot\n",
        );
        let snapshot = load_snapshot(temp.path()).unwrap();
        assert_eq!(snapshot.event_logs.len(), 1);
        let system = &snapshot.event_logs[0];
        assert_eq!(system.log, "System");
        assert_eq!(system.error, 1);
        assert_eq!(system.information, 1);
        assert_eq!(system.newest.len(), 1);
    }
}
