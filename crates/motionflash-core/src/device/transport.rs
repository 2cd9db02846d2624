//! Transport trait definition
//!
//! A `DeviceTransport` is the capability that turns named controller
//! commands into packets on the wire. Framing, CRC and the physical link are
//! entirely its concern; everything above it only sees the named operations
//! below and the typed errors they return.
//!
//! Implementations map their own failures onto the transport kinds:
//! - [`Error::Timeout`] when a reply did not arrive in time
//! - [`Error::CrcErrorResponse`] when a reply failed integrity checking
//! - [`Error::NoResponse`] when the device could not be reached at all
//!
//! A single call is a single attempt. Retrying is done by the session, which
//! owns the retry budget.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{ConfigKey, ParamValue};
use crate::device::{Channel, FirmwareInfo};
use crate::error::{Error, Result};
use crate::telemetry::FieldValue;

/// Confirmation key that must accompany the NVM persist command
pub const NVM_WRITE_KEY: u32 = 0xE22E_AB7A;

/// Named controller operations consumed by the session
pub trait DeviceTransport: Send {
    /// Open the link to `port` and address the controller at `address`
    fn open(&mut self, port: &str, address: u8) -> Result<()>;

    /// Release the link. Must be safe to call when not open.
    fn close(&mut self);

    /// Read the firmware version string
    fn read_firmware(&mut self) -> Result<FirmwareInfo>;

    /// Whether packet-serial motion commands are currently honored
    fn read_motion_mode(&mut self) -> Result<bool>;

    /// Write a single configuration parameter to live settings
    fn write_parameter(&mut self, key: ConfigKey, value: &ParamValue) -> Result<()>;

    /// Read the supported configuration subset from live settings
    fn read_parameters(&mut self) -> Result<BTreeMap<ConfigKey, ParamValue>>;

    /// Persist live settings to NVM; `key` must be [`NVM_WRITE_KEY`]
    fn persist_nvm(&mut self, key: u32) -> Result<()>;

    /// Reload live settings from NVM
    fn reload_nvm(&mut self) -> Result<()>;

    /// Open-loop duty command on one channel
    fn command_duty(&mut self, channel: Channel, duty: i32) -> Result<()>;

    /// Closed-loop velocity command on one channel
    fn command_velocity(&mut self, channel: Channel, speed: i32) -> Result<()>;

    /// Zero duty on all channels
    fn command_stop_all(&mut self) -> Result<()>;

    /// Read one telemetry field
    ///
    /// Returns `Ok(None)` when the firmware does not expose `field`.
    fn read_telemetry_field(&mut self, field: &str) -> Result<Option<FieldValue>>;

    /// Block for `duration` between telemetry samples
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Monotonic device-side time, for transports that keep their own clock
    ///
    /// `None` means run time is measured on the host's wall clock.
    fn clock(&self) -> Option<Duration> {
        None
    }
}

impl<T: DeviceTransport + ?Sized> DeviceTransport for Box<T> {
    fn open(&mut self, port: &str, address: u8) -> Result<()> {
        (**self).open(port, address)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn read_firmware(&mut self) -> Result<FirmwareInfo> {
        (**self).read_firmware()
    }

    fn read_motion_mode(&mut self) -> Result<bool> {
        (**self).read_motion_mode()
    }

    fn write_parameter(&mut self, key: ConfigKey, value: &ParamValue) -> Result<()> {
        (**self).write_parameter(key, value)
    }

    fn read_parameters(&mut self) -> Result<BTreeMap<ConfigKey, ParamValue>> {
        (**self).read_parameters()
    }

    fn persist_nvm(&mut self, key: u32) -> Result<()> {
        (**self).persist_nvm(key)
    }

    fn reload_nvm(&mut self) -> Result<()> {
        (**self).reload_nvm()
    }

    fn command_duty(&mut self, channel: Channel, duty: i32) -> Result<()> {
        (**self).command_duty(channel, duty)
    }

    fn command_velocity(&mut self, channel: Channel, speed: i32) -> Result<()> {
        (**self).command_velocity(channel, speed)
    }

    fn command_stop_all(&mut self) -> Result<()> {
        (**self).command_stop_all()
    }

    fn read_telemetry_field(&mut self, field: &str) -> Result<Option<FieldValue>> {
        (**self).read_telemetry_field(field)
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }

    fn clock(&self) -> Option<Duration> {
        (**self).clock()
    }
}

/// Transport used when no packet-serial backend is available for a port
///
/// Opening always fails with `NoResponse`; every other command reports that
/// there is no active connection.
#[derive(Debug, Default)]
pub struct UnconfiguredTransport {
    backend: Option<String>,
}

impl UnconfiguredTransport {
    /// Create a transport that names the missing backend in its errors
    pub fn named(backend: impl Into<String>) -> Self {
        Self {
            backend: Some(backend.into()),
        }
    }

    fn detached<T>(&self) -> Result<T> {
        Err(Error::NoResponse("no active transport connection".into()))
    }
}

impl DeviceTransport for UnconfiguredTransport {
    fn open(&mut self, port: &str, address: u8) -> Result<()> {
        let backend = self.backend.as_deref().unwrap_or("packet-serial");
        Err(Error::NoResponse(format!(
            "no {} codec available to open {} at 0x{:02X}",
            backend, port, address
        )))
    }

    fn close(&mut self) {}

    fn read_firmware(&mut self) -> Result<FirmwareInfo> {
        self.detached()
    }

    fn read_motion_mode(&mut self) -> Result<bool> {
        self.detached()
    }

    fn write_parameter(&mut self, _key: ConfigKey, _value: &ParamValue) -> Result<()> {
        self.detached()
    }

    fn read_parameters(&mut self) -> Result<BTreeMap<ConfigKey, ParamValue>> {
        self.detached()
    }

    fn persist_nvm(&mut self, _key: u32) -> Result<()> {
        self.detached()
    }

    fn reload_nvm(&mut self) -> Result<()> {
        self.detached()
    }

    fn command_duty(&mut self, _channel: Channel, _duty: i32) -> Result<()> {
        self.detached()
    }

    fn command_velocity(&mut self, _channel: Channel, _speed: i32) -> Result<()> {
        self.detached()
    }

    fn command_stop_all(&mut self) -> Result<()> {
        self.detached()
    }

    fn read_telemetry_field(&mut self, _field: &str) -> Result<Option<FieldValue>> {
        self.detached()
    }
}
