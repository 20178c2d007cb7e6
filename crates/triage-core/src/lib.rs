pub mod classify;
pub mod finding;
pub mod record;
pub mod report;
pub mod sources;
pub mod thresholds;

pub use finding::{count_severity, sort_findings, Finding, Severity};
pub use record::{
    CounterRecord, DiskRecord, EventRecord, EventTally, JobRecord, ProtectionRecord, RebootRecord,
    ResourceRecord, ServiceRecord, Snapshot, SystemInfo,
};
pub use report::{render_html, render_json, Report};
pub use sources::{load_snapshot, load_thresholds, SourceError};
pub use thresholds::{ConfigError, CounterBounds, Outcome, ThresholdSet};
