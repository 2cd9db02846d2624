//! Deterministic, schema-tagged reports
//!
//! Reports are value objects: they are assembled once through a builder,
//! which refuses unknown schema versions, and never change afterwards.
//! [`render`] turns any report into canonical JSON: keys sorted, integral
//! floats printed as integers, `-0` printed as `0`, two-space indentation
//! and a trailing newline. Rendering the same logical content twice yields
//! identical bytes.

mod artifact;
mod canonical;
mod types;

pub use artifact::{artifact_path, port_token, render_trace_csv, ArtifactKind, TraceRow};
pub use canonical::{canonicalize, render};
pub use types::{
    ConfigDocument, FieldSummary, FlashReport, FlashReportBuilder, NvmResult, TestReport,
    TestReportBuilder, VerificationResult,
};

use core::fmt;
use core::str::FromStr;

use chrono::{SecondsFormat, Utc};

use crate::config::CONFIG_SCHEMA_VERSION;
use crate::error::{Error, Result};

/// Report and document schemas this crate can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    /// Flash run report
    FlashReportV1,
    /// Test run report
    TestReportV1,
    /// Configuration dump document
    ConfigV1,
}

impl SchemaVersion {
    /// Tag written into the `schema_version` field
    ///
    /// Dump documents carry the config schema tag so they can be fed back
    /// to `flash` unchanged.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FlashReportV1 => "flash_report_v1",
            Self::TestReportV1 => "test_report_v1",
            Self::ConfigV1 => CONFIG_SCHEMA_VERSION,
        }
    }

    /// Parse `raw` and require it to be `expected`
    pub fn expect(raw: &str, expected: SchemaVersion) -> Result<Self> {
        let parsed: SchemaVersion = raw.parse()?;
        if parsed != expected {
            return Err(Error::invalid(format!(
                "schema {} cannot be used where {} is required",
                raw,
                expected.as_str()
            )));
        }
        Ok(parsed)
    }
}

impl FromStr for SchemaVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flash_report_v1" => Ok(Self::FlashReportV1),
            "test_report_v1" => Ok(Self::TestReportV1),
            "config_v1" | "v1" => Ok(Self::ConfigV1),
            other => Err(Error::invalid(format!("unknown schema version: {}", other))),
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for SchemaVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Current UTC time at second precision, e.g. `2026-01-02T03:04:05Z`
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
