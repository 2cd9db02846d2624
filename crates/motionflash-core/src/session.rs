//! Session - exclusive ownership of one controller connection
//!
//! A [`Session`] owns the transport for its whole lifetime. Flasher, Tester
//! and Telemetry borrow it and run their work through an [`ActiveSession`],
//! which holds the session's single in-flight slot: a second operation that
//! tries to start while one is running is rejected with `Busy` instead of
//! interleaving commands on the wire.
//!
//! Every device command issued through an `ActiveSession` gets the session's
//! retry budget. Only transport kinds (timeout, CRC, no response) are
//! retried; the last error is returned once the budget is spent.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use crate::config::{ConfigKey, ParamValue};
use crate::device::{
    Channel, DeviceTransport, FirmwareInfo, Target, TransportTuning, NVM_WRITE_KEY,
};
use crate::error::{Error, Result};
use crate::telemetry::Reading;

/// Attempts made by [`ActiveSession::send_stop`] before giving up
const STOP_ATTEMPTS: u32 = 2;

struct Connection {
    target: Target,
    firmware: FirmwareInfo,
}

struct Link {
    transport: Box<dyn DeviceTransport>,
    connection: Option<Connection>,
}

impl Link {
    fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            log::info!("Closing {}", conn.target);
        }
        self.transport.close();
    }
}

/// Owned connection to a single controller
pub struct Session {
    address: u8,
    retries: u8,
    link: Mutex<Link>,
    disconnect_requested: AtomicBool,
}

impl Session {
    /// Create a disconnected session that will talk to `address`
    pub fn new<T: DeviceTransport + 'static>(transport: T, address: u8) -> Self {
        Self {
            address,
            retries: TransportTuning::default().retries,
            link: Mutex::new(Link {
                transport: Box::new(transport),
                connection: None,
            }),
            disconnect_requested: AtomicBool::new(false),
        }
    }

    /// Set the number of extra attempts for each device command
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    /// Packet-serial address this session targets
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Retry budget per device command
    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// Open the transport on `port` and read the firmware version
    ///
    /// The firmware query is retried within the budget. On failure the
    /// transport is closed again and the session stays disconnected.
    pub fn connect(&self, port: &str) -> Result<FirmwareInfo> {
        let target = Target::new(port, self.address)?;
        let mut link = self.lock("connect")?;

        if let Some(conn) = &link.connection {
            return Err(Error::invalid(format!(
                "session already connected to {}",
                conn.target
            )));
        }
        // A request that targeted an earlier connection does not carry over
        self.disconnect_requested.store(false, Ordering::SeqCst);

        log::info!("Opening {}", target);
        link.transport.open(target.port(), target.address())?;

        match with_retry(link.transport.as_mut(), self.retries, "read_firmware", |t| {
            t.read_firmware()
        }) {
            Ok(firmware) => {
                log::info!("Connected to {} ({})", target, firmware);
                link.connection = Some(Connection {
                    target,
                    firmware: firmware.clone(),
                });
                Ok(firmware)
            }
            Err(e) => {
                link.transport.close();
                Err(e)
            }
        }
    }

    /// Release the transport
    ///
    /// Idempotent and infallible. If an operation is in flight the
    /// disconnect happens as soon as that operation ends.
    pub fn disconnect(&self) {
        match self.link.try_lock() {
            Ok(mut link) => link.close(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().close(),
            Err(TryLockError::WouldBlock) => {
                log::warn!("Disconnect deferred until the running operation finishes");
                self.disconnect_requested.store(true, Ordering::SeqCst);
                // The operation may have ended between the two checks
                if let Ok(mut link) = self.link.try_lock() {
                    self.disconnect_requested.store(false, Ordering::SeqCst);
                    link.close();
                }
            }
        }
    }

    /// Whether a connection is open
    pub fn is_connected(&self) -> bool {
        match self.link.try_lock() {
            Ok(link) => link.connection.is_some(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().connection.is_some(),
            // Operations only run on connected sessions
            Err(TryLockError::WouldBlock) => true,
        }
    }

    /// Target of the open connection
    pub fn target(&self) -> Result<Target> {
        let link = self.lock("target")?;
        link.connection
            .as_ref()
            .map(|c| c.target.clone())
            .ok_or(Error::NotConnected)
    }

    /// Firmware cached at connect time
    pub fn get_firmware(&self) -> Result<FirmwareInfo> {
        let link = self.lock("get_firmware")?;
        link.connection
            .as_ref()
            .map(|c| c.firmware.clone())
            .ok_or(Error::NotConnected)
    }

    /// Whether packet-serial motion is currently permitted
    ///
    /// A disabled mode is `Ok(false)`, not an error.
    pub fn check_motion_mode(&self) -> Result<bool> {
        self.begin("check_motion_mode")?.check_motion_mode()
    }

    /// Read the supported configuration subset from the device
    pub fn read_parameters(&self) -> Result<BTreeMap<ConfigKey, ParamValue>> {
        self.begin("read_parameters")?.read_parameters()
    }

    /// Best-effort stop on all channels; never fails
    pub fn send_stop(&self) {
        match self.begin("send_stop") {
            Ok(mut active) => {
                active.send_stop();
            }
            Err(e) => log::error!("Stop command not sent: {}", e),
        }
    }

    /// Claim the session for one logical operation
    ///
    /// Fails with `Busy` when another operation holds the session and with
    /// `NotConnected` when no connection is open.
    pub fn begin(&self, operation: &'static str) -> Result<ActiveSession<'_>> {
        let link = self.lock(operation)?;
        let (target, firmware) = match &link.connection {
            Some(conn) => (conn.target.clone(), conn.firmware.clone()),
            None => return Err(Error::NotConnected),
        };

        log::trace!("{}: begin on {}", operation, target);
        Ok(ActiveSession {
            session: self,
            operation,
            target,
            firmware,
            link,
        })
    }

    fn lock(&self, operation: &str) -> Result<MutexGuard<'_, Link>> {
        match self.link.try_lock() {
            Ok(link) => Ok(link),
            Err(TryLockError::Poisoned(poisoned)) => {
                log::warn!("Recovering session after a panicked operation");
                Ok(poisoned.into_inner())
            }
            Err(TryLockError::WouldBlock) => Err(Error::Busy(format!(
                "another operation is in flight, rejected {}",
                operation
            ))),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// A session claimed by one running operation
///
/// Dropping it releases the in-flight slot.
pub struct ActiveSession<'s> {
    session: &'s Session,
    operation: &'static str,
    target: Target,
    firmware: FirmwareInfo,
    link: MutexGuard<'s, Link>,
}

impl ActiveSession<'_> {
    /// Connected target
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Firmware cached at connect time
    pub fn firmware(&self) -> &FirmwareInfo {
        &self.firmware
    }

    /// Name of the operation holding the session
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Whether packet-serial motion is currently permitted
    pub fn check_motion_mode(&mut self) -> Result<bool> {
        self.retry("read_motion_mode", |t| t.read_motion_mode())
    }

    /// Write one parameter to live settings
    pub fn write_parameter(&mut self, key: ConfigKey, value: &ParamValue) -> Result<()> {
        log::debug!("Writing {} = {}", key, value);
        self.retry("write_parameter", |t| t.write_parameter(key, value))
    }

    /// Read the supported configuration subset
    pub fn read_parameters(&mut self) -> Result<BTreeMap<ConfigKey, ParamValue>> {
        self.retry("read_parameters", |t| t.read_parameters())
    }

    /// Persist live settings to NVM with the fixed confirmation key
    pub fn persist_nvm(&mut self) -> Result<()> {
        self.retry("persist_nvm", |t| t.persist_nvm(NVM_WRITE_KEY))
    }

    /// Reload live settings from NVM
    pub fn reload_nvm(&mut self) -> Result<()> {
        self.retry("reload_nvm", |t| t.reload_nvm())
    }

    /// Duty command on one channel
    pub fn command_duty(&mut self, channel: Channel, duty: i32) -> Result<()> {
        log::debug!("Duty {} on {}", duty, channel);
        self.retry("command_duty", |t| t.command_duty(channel, duty))
    }

    /// Velocity command on one channel
    pub fn command_velocity(&mut self, channel: Channel, speed: i32) -> Result<()> {
        log::debug!("Velocity {} on {}", speed, channel);
        self.retry("command_velocity", |t| t.command_velocity(channel, speed))
    }

    /// Read one telemetry field; unsupported fields are a reading, not an error
    pub fn read_field(&mut self, field: &str) -> Result<Reading> {
        let value = self.retry("read_telemetry_field", |t| t.read_telemetry_field(field))?;
        Ok(match value {
            Some(v) => Reading::Value(v),
            None => Reading::Unsupported,
        })
    }

    /// Wait between samples using the transport's notion of time
    pub fn delay(&mut self, duration: Duration) {
        self.link.transport.delay(duration);
    }

    /// Device-side clock, if the transport keeps one
    pub fn clock(&self) -> Option<Duration> {
        self.link.transport.clock()
    }

    /// Zero duty on all channels, with one retry
    ///
    /// Runs inside failure paths, so it never returns an error. Returns
    /// whether the controller acknowledged the stop.
    pub fn send_stop(&mut self) -> bool {
        for attempt in 1..=STOP_ATTEMPTS {
            match self.link.transport.command_stop_all() {
                Ok(()) => {
                    log::debug!("Stop acknowledged by {}", self.target);
                    return true;
                }
                Err(e) => log::warn!("Stop attempt {} on {} failed: {}", attempt, self.target, e),
            }
        }
        log::error!(
            "Stop command failed on {}; motion state of the device is unknown",
            self.target
        );
        false
    }

    fn retry<T, F>(&mut self, operation: &str, f: F) -> Result<T>
    where
        F: FnMut(&mut dyn DeviceTransport) -> Result<T>,
    {
        with_retry(
            self.link.transport.as_mut(),
            self.session.retries,
            operation,
            f,
        )
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        log::trace!("{}: end on {}", self.operation, self.target);
        if self.session.disconnect_requested.swap(false, Ordering::SeqCst) {
            self.link.close();
        }
    }
}

fn with_retry<T, F>(
    transport: &mut dyn DeviceTransport,
    retries: u8,
    operation: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut(&mut dyn DeviceTransport) -> Result<T>,
{
    let mut attempt: u8 = 0;
    loop {
        match f(&mut *transport) {
            Ok(value) => return Ok(value),
            Err(e) if e.kind().is_transport() && attempt < retries => {
                attempt += 1;
                log::debug!(
                    "{} failed ({}), retry {}/{}",
                    operation,
                    e,
                    attempt,
                    retries
                );
            }
            Err(e) => {
                if attempt > 0 {
                    log::warn!("{} failed after {} attempts: {}", operation, attempt + 1, e);
                }
                return Err(e);
            }
        }
    }
}
