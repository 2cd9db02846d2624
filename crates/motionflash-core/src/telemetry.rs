//! Point-in-time telemetry snapshots
//!
//! Fields the firmware does not expose come back as [`Reading::Unsupported`]
//! instead of being dropped. Only a transport failure aborts a poll.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{Error, Result};
use crate::report::utc_timestamp;
use crate::session::{ActiveSession, Session};

/// Field names understood by the packet-serial controllers
pub const KNOWN_FIELDS: &[&str] = &[
    "battery_voltage",
    "logic_battery_voltage",
    "motor1_current",
    "motor2_current",
    "encoder1",
    "encoder2",
    "speed1",
    "speed2",
    "temperature",
    "error_bits",
    "status",
];

/// A sampled value
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Counter or raw integer value
    Integer(i64),
    /// Scaled physical value (volts, amps, degrees)
    Float(f64),
    /// Enumerated state label
    Enum(String),
}

impl FieldValue {
    /// Numeric view; enum labels have none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Enum(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Enum(s) => f.write_str(s),
        }
    }
}

/// Outcome of reading one field
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// The firmware reported a value
    Value(FieldValue),
    /// The firmware does not expose this field
    Unsupported,
}

impl Reading {
    /// The value, if supported
    pub fn value(&self) -> Option<&FieldValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Unsupported => None,
        }
    }

    /// Numeric view of a supported value
    pub fn as_f64(&self) -> Option<f64> {
        self.value().and_then(FieldValue::as_f64)
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Unsupported => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("unsupported", &true)?;
                map.end()
            }
        }
    }
}

/// Readings for a set of fields taken at one instant
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TelemetrySnapshot {
    /// UTC time the poll started
    pub timestamp: String,
    /// One entry per requested field
    pub fields: BTreeMap<String, Reading>,
}

impl TelemetrySnapshot {
    /// Reading for `field`, if it was requested
    pub fn get(&self, field: &str) -> Option<&Reading> {
        self.fields.get(field)
    }
}

/// Telemetry poller bound to a session
pub struct Telemetry<'s> {
    session: &'s Session,
}

impl<'s> Telemetry<'s> {
    /// Create a poller for `session`
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// One-shot poll; claims the session for its duration
    pub fn poll<S: AsRef<str>>(&self, fields: &[S]) -> Result<TelemetrySnapshot> {
        validate_fields(fields)?;
        let mut active = self.session.begin("telemetry_poll")?;
        Self::sample(&mut active, fields)
    }

    /// Poll through an already claimed session
    ///
    /// Used by the tester between commands of a running recipe.
    pub fn sample<S: AsRef<str>>(
        active: &mut ActiveSession<'_>,
        fields: &[S],
    ) -> Result<TelemetrySnapshot> {
        let timestamp = utc_timestamp();
        let mut readings = BTreeMap::new();
        for field in fields {
            let field = field.as_ref();
            let reading = active.read_field(field)?;
            if reading == Reading::Unsupported {
                log::debug!("{} is not supported by {}", field, active.firmware());
            }
            readings.insert(field.to_string(), reading);
        }
        Ok(TelemetrySnapshot {
            timestamp,
            fields: readings,
        })
    }
}

/// Reject empty, blank or duplicated field lists
pub fn validate_fields<S: AsRef<str>>(fields: &[S]) -> Result<()> {
    if fields.is_empty() {
        return Err(Error::invalid("at least one telemetry field is required"));
    }
    let mut seen = HashSet::new();
    for field in fields {
        let field = field.as_ref();
        if field.trim().is_empty() {
            return Err(Error::invalid("telemetry field names must be non-empty"));
        }
        if !seen.insert(field) {
            return Err(Error::invalid(format!(
                "telemetry field '{}' requested twice",
                field
            )));
        }
    }
    Ok(())
}
