//! Report records and their builders

use std::collections::BTreeMap;

use serde::Serialize;

use super::{utc_timestamp, SchemaVersion};
use crate::config::{ConfigKey, ConfigPayload, ParamValue};
use crate::device::{FirmwareInfo, Target};
use crate::error::{Error, ErrorRecord, Result};
use crate::recipe::{Recipe, SafetyLimits};
use crate::tester::REASON_COMPLETED;

/// Placeholder for values that were never learned during a failed run
const UNKNOWN: &str = "unknown";

/// Outcome of the NVM persist step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NvmResult {
    /// Persist command acknowledged
    Ok,
    /// Persist command failed
    Failed,
    /// Never attempted
    Skipped,
}

/// Outcome of the read-back verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationResult {
    /// Read-back matches the applied parameters
    Pass,
    /// Read-back differs
    Mismatch,
    /// The read-back round-trip failed
    Error,
    /// Not requested or not reached
    Skipped,
}

/// Result of one flash run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlashReport {
    /// Always `flash_report_v1`
    pub schema_version: SchemaVersion,
    /// UTC time the run started
    pub timestamp: String,
    /// Serial port
    pub port: String,
    /// Packet-serial address
    pub address: u8,
    /// Firmware version, or `unknown`
    pub firmware: String,
    /// Hash of the applied payload, or `unknown`
    pub config_hash: String,
    /// Config schema version, or `unknown`
    pub config_version: String,
    /// Parameters that were requested
    pub applied_parameters: BTreeMap<ConfigKey, ParamValue>,
    /// Persist outcome, reported independently of verification
    pub write_nvm_result: NvmResult,
    /// Verification outcome
    pub verification_result: VerificationResult,
    /// Parameters whose read-back differed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mismatched_parameters: Vec<String>,
    /// Error that ended the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl FlashReport {
    /// Start a report; `schema_version` must be `flash_report_v1`
    pub fn builder(schema_version: &str) -> Result<FlashReportBuilder> {
        SchemaVersion::expect(schema_version, SchemaVersion::FlashReportV1)?;
        Ok(Self::v1())
    }

    /// Start a `flash_report_v1` report
    pub fn v1() -> FlashReportBuilder {
        FlashReportBuilder {
            report: FlashReport {
                schema_version: SchemaVersion::FlashReportV1,
                timestamp: utc_timestamp(),
                port: UNKNOWN.to_string(),
                address: 0,
                firmware: UNKNOWN.to_string(),
                config_hash: UNKNOWN.to_string(),
                config_version: UNKNOWN.to_string(),
                applied_parameters: BTreeMap::new(),
                write_nvm_result: NvmResult::Skipped,
                verification_result: VerificationResult::Skipped,
                mismatched_parameters: Vec::new(),
                error: None,
            },
        }
    }

    /// Whether apply and persist both succeeded
    pub fn persisted(&self) -> bool {
        self.write_nvm_result == NvmResult::Ok
    }
}

/// Assembles a [`FlashReport`]
#[derive(Debug, Clone)]
pub struct FlashReportBuilder {
    report: FlashReport,
}

impl FlashReportBuilder {
    /// Override the start time
    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.report.timestamp = timestamp.into();
        self
    }

    /// Device the run targeted
    pub fn target(mut self, port: &str, address: u8) -> Self {
        self.report.port = port.to_string();
        self.report.address = address;
        self
    }

    /// Firmware of the connected device
    pub fn firmware(mut self, firmware: &FirmwareInfo) -> Self {
        self.report.firmware = firmware.version.clone();
        self
    }

    /// Payload being flashed
    pub fn config(mut self, config: &ConfigPayload) -> Self {
        self.report.config_hash = config.config_hash();
        self.report.config_version = config.schema_version().to_string();
        self.report.applied_parameters = config.parameters().clone();
        self
    }

    /// Persist outcome
    pub fn write_nvm(mut self, result: NvmResult) -> Self {
        self.report.write_nvm_result = result;
        self
    }

    /// Verification outcome
    pub fn verification(mut self, result: VerificationResult) -> Self {
        self.report.verification_result = result;
        self
    }

    /// Parameters that failed verification
    pub fn mismatched(mut self, keys: Vec<String>) -> Self {
        self.report.mismatched_parameters = keys;
        self
    }

    /// Error that ended the run
    pub fn error(mut self, error: &Error) -> Self {
        self.report.error = Some(error.record());
        self
    }

    /// Finish the report
    pub fn build(self) -> FlashReport {
        self.report
    }
}

/// Per-field telemetry summary of a test run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldSummary {
    /// Numeric field
    Numeric {
        /// Smallest sampled value
        min: f64,
        /// Largest sampled value
        max: f64,
        /// Most recent sampled value
        last: f64,
        /// Number of samples
        samples: usize,
    },
    /// Enumerated field
    Enum {
        /// Most recent label
        last: String,
        /// Number of samples
        samples: usize,
    },
    /// Field not exposed by the firmware
    Unsupported {
        /// Always true
        unsupported: bool,
    },
}

/// Result of one test run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReport {
    /// Always `test_report_v1`
    pub schema_version: SchemaVersion,
    /// UTC time the run started
    pub timestamp: String,
    /// Recipe that was executed
    pub recipe_id: String,
    /// Limits in force during the run
    pub safety_limits: SafetyLimits,
    /// Whether the recipe's pass criteria were met
    pub passed: bool,
    /// `completed`, `safety_abort`, `mode_mismatch` or an error code
    pub reason: String,
    /// Limit breach or error code that aborted the run
    pub abort_reason: Option<String>,
    /// Summary per sampled field
    pub telemetry_summary: BTreeMap<String, FieldSummary>,
    /// Error that ended the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl TestReport {
    /// Start a report; `schema_version` must be `test_report_v1`
    pub fn builder(schema_version: &str) -> Result<TestReportBuilder> {
        SchemaVersion::expect(schema_version, SchemaVersion::TestReportV1)?;
        Ok(Self::v1())
    }

    /// Start a `test_report_v1` report
    pub fn v1() -> TestReportBuilder {
        TestReportBuilder {
            report: TestReport {
                schema_version: SchemaVersion::TestReportV1,
                timestamp: utc_timestamp(),
                recipe_id: String::new(),
                safety_limits: SafetyLimits::default(),
                passed: false,
                reason: String::new(),
                abort_reason: None,
                telemetry_summary: BTreeMap::new(),
                error: None,
            },
        }
    }
}

/// Assembles a [`TestReport`]
#[derive(Debug, Clone)]
pub struct TestReportBuilder {
    report: TestReport,
}

impl TestReportBuilder {
    /// Override the start time
    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.report.timestamp = timestamp.into();
        self
    }

    /// Recipe being executed
    pub fn recipe(mut self, recipe: &Recipe) -> Self {
        self.report.recipe_id = recipe.id().to_string();
        self.report.safety_limits = recipe.safety_limits().clone();
        self
    }

    /// Recipe id only, when the recipe itself could not be resolved
    pub fn recipe_id(mut self, id: &str) -> Self {
        self.report.recipe_id = id.to_string();
        self
    }

    /// A run that completed and met its pass criteria
    pub fn completed(mut self) -> Self {
        self.report.passed = true;
        self.report.reason = REASON_COMPLETED.to_string();
        self.report.abort_reason = None;
        self
    }

    /// A run cut short; `reason` is the category and `abort_reason` the cause
    pub fn aborted(mut self, reason: &str, abort_reason: impl Into<String>) -> Self {
        self.report.passed = false;
        self.report.reason = reason.to_string();
        self.report.abort_reason = Some(abort_reason.into());
        self
    }

    /// Telemetry summary
    pub fn summary(mut self, summary: BTreeMap<String, FieldSummary>) -> Self {
        self.report.telemetry_summary = summary;
        self
    }

    /// Error that ended the run
    pub fn error(mut self, error: &Error) -> Self {
        self.report.error = Some(error.record());
        self
    }

    /// Finish the report
    pub fn build(self) -> TestReport {
        self.report
    }
}

/// Configuration dump as written by `dump`
///
/// Carries the config schema tag, so the document is a valid `flash` input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigDocument {
    /// Config schema tag
    pub schema_version: SchemaVersion,
    /// Serial port
    pub port: String,
    /// Address as `0xAA`
    pub address: String,
    /// Firmware version
    pub firmware: String,
    /// Hash of the dumped payload
    pub config_hash: String,
    /// Dumped parameters
    pub parameters: BTreeMap<ConfigKey, ParamValue>,
}

impl ConfigDocument {
    /// Build a dump document for `config` read from `target`
    pub fn new(target: &Target, firmware: &FirmwareInfo, config: &ConfigPayload) -> Result<Self> {
        let schema_version = SchemaVersion::expect(config.schema_version(), SchemaVersion::ConfigV1)?;
        Ok(Self {
            schema_version,
            port: target.port().to_string(),
            address: format!("0x{:02X}", target.address()),
            firmware: firmware.version.clone(),
            config_hash: config.config_hash(),
            parameters: config.parameters().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::render;
    use serde_json::json;

    fn payload() -> ConfigPayload {
        ConfigPayload::new(
            "v1",
            [("mode", ParamValue::from("duty")), ("max_current", ParamValue::Integer(10))],
        )
        .unwrap()
    }

    #[test]
    fn test_builder_rejects_unknown_schema() {
        assert!(FlashReport::builder("flash_report_v9").is_err());
        assert!(FlashReport::builder("test_report_v1").is_err());
        assert!(TestReport::builder("test_report_v1").is_ok());
    }

    #[test]
    fn test_flash_report_fields() {
        let report = FlashReport::builder("flash_report_v1")
            .unwrap()
            .timestamp("2026-01-02T03:04:05Z")
            .target("/dev/ttyACM0", 0x80)
            .config(&payload())
            .write_nvm(NvmResult::Ok)
            .verification(VerificationResult::Pass)
            .build();
        let json: serde_json::Value = serde_json::from_str(&render(&report).unwrap()).unwrap();
        assert_eq!(json["schema_version"], "flash_report_v1");
        assert_eq!(json["address"], 128);
        assert_eq!(json["firmware"], "unknown");
        assert_eq!(json["write_nvm_result"], "ok");
        assert_eq!(json["verification_result"], "pass");
        assert_eq!(json["applied_parameters"], json!({"max_current": 10, "mode": "duty"}));
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_aborted_test_report() {
        let report = TestReport::builder("test_report_v1")
            .unwrap()
            .recipe_id("smoke_v1")
            .aborted("safety_abort", "max_current_exceeded")
            .build();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["passed"], false);
        assert_eq!(json["abort_reason"], "max_current_exceeded");
        assert_eq!(json["telemetry_summary"], json!({}));
    }

    #[test]
    fn test_config_document_is_flash_input() {
        let target = Target::new("/dev/ttyACM0", 0x80).unwrap();
        let fw = FirmwareInfo::from_version("USB Roboclaw 2x15a v4.2.8").unwrap();
        let doc = ConfigDocument::new(&target, &fw, &payload()).unwrap();
        let text = render(&doc).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["address"], "0x80");
        assert_eq!(json["schema_version"], "v1");

        let reread = ConfigPayload::from_json_str(&text).unwrap();
        assert_eq!(reread.config_hash(), doc.config_hash);
    }
}
