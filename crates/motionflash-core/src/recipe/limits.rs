//! Safety limits
//!
//! Limits are kept in the order the recipe declares them. When one sample
//! breaches several limits, the first declared limit is the one reported.

use std::fmt;
use std::time::Duration;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{Error, Result};
use crate::telemetry::TelemetrySnapshot;

use super::Step;

/// Fields checked by [`SafetyLimit::MaxCurrent`]
const CURRENT_FIELDS: [&str; 2] = ["motor1_current", "motor2_current"];

/// Field checked by [`SafetyLimit::MinBatteryVoltage`]
const BATTERY_FIELD: &str = "battery_voltage";

/// One hard limit of a recipe
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
pub enum SafetyLimit {
    /// Largest absolute duty a step may command
    MaxDuty(i32),
    /// Largest absolute velocity a step may command
    MaxVelocity(i32),
    /// Longest the run may take, in seconds
    MaxRuntime(f64),
    /// Highest motor current, in amps, on either channel
    MaxCurrent(f64),
    /// Lowest main battery voltage
    MinBatteryVoltage(f64),
}

impl SafetyLimit {
    /// Name used in reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxDuty(_) => "max_duty",
            Self::MaxVelocity(_) => "max_velocity",
            Self::MaxRuntime(_) => "max_runtime_s",
            Self::MaxCurrent(_) => "max_current",
            Self::MinBatteryVoltage(_) => "min_battery_voltage",
        }
    }

    /// Configured threshold
    pub fn threshold(&self) -> f64 {
        match *self {
            Self::MaxDuty(v) | Self::MaxVelocity(v) => v as f64,
            Self::MaxRuntime(v) | Self::MaxCurrent(v) | Self::MinBatteryVoltage(v) => v,
        }
    }

    /// Abort reason recorded when this limit is breached
    pub fn breach_reason(&self) -> String {
        match self {
            Self::MinBatteryVoltage(_) => format!("{}_violated", self.name()),
            _ => format!("{}_exceeded", self.name()),
        }
    }

    fn validate(&self) -> Result<()> {
        let value = self.threshold();
        if !value.is_finite() || value < 0.0 {
            return Err(Error::invalid(format!(
                "safety limit {} must be a non-negative number, got {}",
                self.name(),
                value
            )));
        }
        if let Self::MaxRuntime(secs) = *self {
            Duration::try_from_secs_f64(secs).map_err(|_| {
                Error::invalid(format!("safety limit max_runtime_s {} is out of range", secs))
            })?;
        }
        Ok(())
    }

    /// Whether commanding `step` would breach this limit
    pub fn breached_by_command(&self, step: &Step) -> bool {
        match (self, step) {
            (Self::MaxDuty(max), Step::Duty { duty, .. }) => duty.unsigned_abs() > max.unsigned_abs(),
            (Self::MaxVelocity(max), Step::Velocity { speed, .. }) => {
                speed.unsigned_abs() > max.unsigned_abs()
            }
            _ => false,
        }
    }

    /// Whether a telemetry sample taken `elapsed` into the run breaches this limit
    ///
    /// Fields that were not sampled or are unsupported never breach.
    pub fn breached_by_sample(&self, sample: &TelemetrySnapshot, elapsed: Duration) -> bool {
        match *self {
            Self::MaxRuntime(max) => elapsed.as_secs_f64() > max,
            Self::MaxCurrent(max) => CURRENT_FIELDS.iter().any(|field| {
                sample
                    .get(field)
                    .and_then(|r| r.as_f64())
                    .is_some_and(|amps| amps.abs() > max)
            }),
            Self::MinBatteryVoltage(min) => sample
                .get(BATTERY_FIELD)
                .and_then(|r| r.as_f64())
                .is_some_and(|volts| volts < min),
            Self::MaxDuty(_) | Self::MaxVelocity(_) => false,
        }
    }
}

impl fmt::Display for SafetyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name(), self.threshold())
    }
}

/// Ordered, duplicate-free set of limits
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SafetyLimits(pub(super) Vec<SafetyLimit>);

impl SafetyLimits {
    /// Validate and wrap limits in declared order
    pub fn new(limits: Vec<SafetyLimit>) -> Result<Self> {
        for (i, limit) in limits.iter().enumerate() {
            limit.validate()?;
            if limits[..i].iter().any(|l| l.name() == limit.name()) {
                return Err(Error::invalid(format!(
                    "safety limit {} declared twice",
                    limit.name()
                )));
            }
        }
        Ok(Self(limits))
    }

    /// Limits in declared order
    pub fn iter(&self) -> impl Iterator<Item = &SafetyLimit> {
        self.0.iter()
    }

    /// Number of limits
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no limits are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Configured runtime ceiling, if any
    pub fn max_runtime(&self) -> Option<Duration> {
        self.0.iter().find_map(|l| match l {
            SafetyLimit::MaxRuntime(s) => Duration::try_from_secs_f64(*s).ok(),
            _ => None,
        })
    }

    /// First declared limit that commanding `step` would breach
    pub fn first_command_breach(&self, step: &Step) -> Option<&SafetyLimit> {
        self.0.iter().find(|l| l.breached_by_command(step))
    }

    /// First declared limit breached by `sample`
    pub fn first_sample_breach(
        &self,
        sample: &TelemetrySnapshot,
        elapsed: Duration,
    ) -> Option<&SafetyLimit> {
        self.0.iter().find(|l| l.breached_by_sample(sample, elapsed))
    }
}

impl Serialize for SafetyLimits {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for limit in &self.0 {
            match *limit {
                SafetyLimit::MaxDuty(v) | SafetyLimit::MaxVelocity(v) => {
                    map.serialize_entry(limit.name(), &v)?
                }
                SafetyLimit::MaxRuntime(v)
                | SafetyLimit::MaxCurrent(v)
                | SafetyLimit::MinBatteryVoltage(v) => map.serialize_entry(limit.name(), &v)?,
            }
        }
        map.end()
    }
}
