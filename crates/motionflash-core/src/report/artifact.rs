//! Artifact naming and the CSV telemetry trace

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::telemetry::Reading;

/// What an artifact file contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Flash report
    Flash,
    /// Test report
    Test,
    /// Per-sample telemetry trace of a test run
    TestTelemetry,
}

impl ArtifactKind {
    fn token(self) -> &'static str {
        match self {
            Self::Flash => "flash",
            Self::Test => "test",
            Self::TestTelemetry => "test_telemetry",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::TestTelemetry => "csv",
            _ => "json",
        }
    }
}

/// Port path reduced to a file-name token: `/dev/ttyACM0` -> `ttyACM0`
pub fn port_token(port: &str) -> String {
    port.replace("/dev/", "").replace('/', "_")
}

/// Deterministic artifact path `<ts>_<kind>_<port>_0x<AA>.<ext>`
///
/// The timestamp loses its colons so the name is portable.
pub fn artifact_path(
    report_dir: &Path,
    kind: ArtifactKind,
    port: &str,
    address: u8,
    timestamp: &str,
) -> PathBuf {
    let ts = match timestamp.strip_suffix("+00:00") {
        Some(base) => format!("{}Z", base),
        None => timestamp.to_string(),
    }
    .replace(':', "");

    report_dir.join(format!(
        "{}_{}_{}_0x{:02X}.{}",
        ts,
        kind.token(),
        port_token(port),
        address,
        kind.extension()
    ))
}

/// One telemetry sample of a test run
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    /// Zero-based step index
    pub step: usize,
    /// Scheduled offset of the sample from the start of the run
    pub offset_ms: u64,
    /// Readings taken for the step's fields
    pub fields: BTreeMap<String, Reading>,
}

/// Render a trace as CSV with header `step,offset_ms,<sorted fields>`
///
/// Fields a step did not sample are left empty; unsupported readings are
/// written as `unsupported`.
pub fn render_trace_csv(rows: &[TraceRow]) -> String {
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .collect();

    let mut out = String::from("step,offset_ms");
    for column in &columns {
        out.push(',');
        out.push_str(&csv_cell(column));
    }
    out.push('\n');

    for row in rows {
        out.push_str(&format!("{},{}", row.step, row.offset_ms));
        for column in &columns {
            out.push(',');
            match row.fields.get(*column) {
                Some(Reading::Value(v)) => out.push_str(&csv_cell(&v.to_string())),
                Some(Reading::Unsupported) => out.push_str("unsupported"),
                None => {}
            }
        }
        out.push('\n');
    }
    out
}

fn csv_cell(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
