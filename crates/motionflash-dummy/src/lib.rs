//! motionflash-dummy - In-memory motor controller emulator
//!
//! This crate provides a [`DeviceTransport`] that emulates a two-channel
//! packet-serial controller in memory: live and NVM settings, a motion-mode
//! switch, and a simple drive model that turns duty into current, speed and
//! encoder counts. It is useful for testing and development without real
//! hardware.
//!
//! Time is virtual. `delay` advances the drive model instead of sleeping, so
//! a recipe that schedules seconds of motion runs instantly. A configurable
//! per-command latency models a slow link on the same clock.
//!
//! A [`DummyProbe`] shares the emulator state and lets a test inspect the
//! commands received, flip the motion mode, inject transport faults or make
//! NVM settings drift on reload.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use motionflash_core::device::NVM_WRITE_KEY;
use motionflash_core::error::{Error, Result};
use motionflash_core::{Channel, ConfigKey, DeviceTransport, FieldValue, FirmwareInfo, ParamValue};

/// Encoder counts per second for each percent of duty
const COUNTS_PER_DUTY: f64 = 50.0;

/// Configuration for the dummy controller
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Firmware version string, as the controller would report it
    pub firmware: String,
    /// Address the controller answers on
    pub address: u8,
    /// Whether packet-serial motion commands are honored
    pub motion_enabled: bool,
    /// Telemetry fields this firmware does not expose
    pub missing_fields: Vec<String>,
    /// Settings stored in NVM at power-up
    pub parameters: BTreeMap<ConfigKey, ParamValue>,
    /// Main battery voltage
    pub battery_voltage: f64,
    /// Motor current drawn per percent of duty
    pub amps_per_duty: f64,
    /// Virtual time each command takes on the link
    pub command_latency: Duration,
}

impl Default for DummyConfig {
    fn default() -> Self {
        let parameters = BTreeMap::from([
            (ConfigKey::Config, ParamValue::Integer(0x0003)),
            (ConfigKey::MaxCurrentM1, ParamValue::Integer(15)),
            (ConfigKey::MaxCurrentM2, ParamValue::Integer(15)),
            (ConfigKey::Mode, ParamValue::Integer(3)),
        ]);
        Self {
            firmware: "USB Roboclaw 2x15a v4.2.8\n".into(),
            address: motionflash_core::DEFAULT_ADDRESS,
            motion_enabled: true,
            missing_fields: Vec::new(),
            parameters,
            battery_voltage: 12.4,
            amps_per_duty: 0.05,
            command_latency: Duration::ZERO,
        }
    }
}

/// Device commands that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Open,
    ReadFirmware,
    ReadMotionMode,
    WriteParameter,
    ReadParameters,
    PersistNvm,
    ReloadNvm,
    Duty,
    Velocity,
    Stop,
    ReadField,
}

/// A command received by the emulator
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Open { port: String, address: u8 },
    Close,
    ReadFirmware,
    ReadMotionMode,
    WriteParameter(ConfigKey, ParamValue),
    ReadParameters,
    PersistNvm(u32),
    ReloadNvm,
    Duty(Channel, i32),
    Velocity(Channel, i32),
    StopAll,
    ReadField(String),
    Delay(Duration),
}

impl Command {
    /// Whether this command sets a motor in motion
    pub fn is_motion(&self) -> bool {
        matches!(self, Self::Duty(_, d) | Self::Velocity(_, d) if *d != 0)
    }
}

/// Per-channel drive state
#[derive(Debug, Clone, Copy, Default)]
struct Drive {
    duty: i32,
    /// Commanded speed in counts per second
    speed: i32,
    encoder: f64,
}

impl Drive {
    fn index(channel: Channel) -> usize {
        match channel {
            Channel::M1 => 0,
            Channel::M2 => 1,
        }
    }
}

#[derive(Debug)]
struct State {
    config: DummyConfig,
    open: bool,
    live: BTreeMap<ConfigKey, ParamValue>,
    nvm: BTreeMap<ConfigKey, ParamValue>,
    drift: BTreeMap<ConfigKey, ParamValue>,
    drives: [Drive; 2],
    overrides: HashMap<String, Option<FieldValue>>,
    faults: HashMap<Op, VecDeque<Error>>,
    commands: Vec<Command>,
    elapsed: Duration,
}

impl State {
    fn new(config: DummyConfig) -> Self {
        Self {
            live: config.parameters.clone(),
            nvm: config.parameters.clone(),
            config,
            open: false,
            drift: BTreeMap::new(),
            drives: [Drive::default(); 2],
            overrides: HashMap::new(),
            faults: HashMap::new(),
            commands: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Record `command` and decide whether the controller answers it
    fn receive(&mut self, op: Op, command: Command) -> Result<()> {
        log::trace!("dummy: {:?}", command);
        self.commands.push(command);
        let latency = self.config.command_latency;
        self.advance(latency);
        if let Some(err) = self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            log::debug!("dummy: injected fault on {:?}: {}", op, err);
            return Err(err);
        }
        if op != Op::Open && !self.open {
            return Err(Error::NoResponse("port not open".into()));
        }
        Ok(())
    }

    fn current(&self, drive: &Drive) -> f64 {
        let level = if drive.duty != 0 {
            drive.duty.unsigned_abs() as f64
        } else {
            drive.speed.unsigned_abs() as f64 / COUNTS_PER_DUTY
        };
        (level * self.config.amps_per_duty * 100.0).round() / 100.0
    }

    fn advance(&mut self, duration: Duration) {
        self.elapsed += duration;
        let secs = duration.as_secs_f64();
        for drive in &mut self.drives {
            drive.encoder += drive.speed as f64 * secs;
        }
    }

    fn field(&self, field: &str) -> Option<FieldValue> {
        if let Some(value) = self.overrides.get(field) {
            return value.clone();
        }
        if self.config.missing_fields.iter().any(|f| f == field) {
            return None;
        }

        let [m1, m2] = &self.drives;
        let value = match field {
            "battery_voltage" => FieldValue::Float(self.config.battery_voltage),
            "logic_battery_voltage" => FieldValue::Float(5.0),
            "motor1_current" => FieldValue::Float(self.current(m1)),
            "motor2_current" => FieldValue::Float(self.current(m2)),
            "encoder1" => FieldValue::Integer(m1.encoder as i64),
            "encoder2" => FieldValue::Integer(m2.encoder as i64),
            "speed1" => FieldValue::Integer(m1.speed as i64),
            "speed2" => FieldValue::Integer(m2.speed as i64),
            "temperature" => FieldValue::Float(25.0),
            "error_bits" => FieldValue::Integer(0),
            "status" => FieldValue::Enum(
                if self.drives.iter().any(|d| d.speed != 0) {
                    "running"
                } else {
                    "idle"
                }
                .into(),
            ),
            _ => return None,
        };
        Some(value)
    }
}

/// Emulated packet-serial motor controller
///
/// Cloning the controller shares the emulated device.
#[derive(Debug, Clone)]
pub struct DummyController {
    state: Arc<Mutex<State>>,
}

impl DummyController {
    /// Create a new dummy controller with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new(config))),
        }
    }

    /// Create a new dummy controller with the default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Handle for inspecting and steering the emulated device
    pub fn probe(&self) -> DummyProbe {
        DummyProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DummyController {
    fn default() -> Self {
        Self::new_default()
    }
}

impl DeviceTransport for DummyController {
    fn open(&mut self, port: &str, address: u8) -> Result<()> {
        let mut state = self.state();
        state.receive(
            Op::Open,
            Command::Open {
                port: port.to_string(),
                address,
            },
        )?;
        if address != state.config.address {
            return Err(Error::NoResponse(format!(
                "no controller answers at 0x{:02X} on {}",
                address, port
            )));
        }
        state.open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state();
        state.commands.push(Command::Close);
        state.open = false;
    }

    fn read_firmware(&mut self) -> Result<FirmwareInfo> {
        let mut state = self.state();
        state.receive(Op::ReadFirmware, Command::ReadFirmware)?;
        FirmwareInfo::from_version(&state.config.firmware)
    }

    fn read_motion_mode(&mut self) -> Result<bool> {
        let mut state = self.state();
        state.receive(Op::ReadMotionMode, Command::ReadMotionMode)?;
        Ok(state.config.motion_enabled)
    }

    fn write_parameter(&mut self, key: ConfigKey, value: &ParamValue) -> Result<()> {
        let mut state = self.state();
        state.receive(Op::WriteParameter, Command::WriteParameter(key, value.clone()))?;
        state.live.insert(key, value.clone());
        Ok(())
    }

    fn read_parameters(&mut self) -> Result<BTreeMap<ConfigKey, ParamValue>> {
        let mut state = self.state();
        state.receive(Op::ReadParameters, Command::ReadParameters)?;
        Ok(state.live.clone())
    }

    fn persist_nvm(&mut self, key: u32) -> Result<()> {
        let mut state = self.state();
        state.receive(Op::PersistNvm, Command::PersistNvm(key))?;
        if key != NVM_WRITE_KEY {
            // The controller silently ignores a bad key
            return Err(Error::timeout("persist_nvm"));
        }
        state.nvm = state.live.clone();
        Ok(())
    }

    fn reload_nvm(&mut self) -> Result<()> {
        let mut state = self.state();
        state.receive(Op::ReloadNvm, Command::ReloadNvm)?;
        let mut live = state.nvm.clone();
        live.extend(state.drift.clone());
        state.live = live;
        Ok(())
    }

    fn command_duty(&mut self, channel: Channel, duty: i32) -> Result<()> {
        let mut state = self.state();
        state.receive(Op::Duty, Command::Duty(channel, duty))?;
        if state.config.motion_enabled {
            let drive = &mut state.drives[Drive::index(channel)];
            drive.duty = duty;
            drive.speed = (duty as f64 * COUNTS_PER_DUTY) as i32;
        }
        Ok(())
    }

    fn command_velocity(&mut self, channel: Channel, speed: i32) -> Result<()> {
        let mut state = self.state();
        state.receive(Op::Velocity, Command::Velocity(channel, speed))?;
        if state.config.motion_enabled {
            let drive = &mut state.drives[Drive::index(channel)];
            drive.duty = 0;
            drive.speed = speed;
        }
        Ok(())
    }

    fn command_stop_all(&mut self) -> Result<()> {
        let mut state = self.state();
        state.receive(Op::Stop, Command::StopAll)?;
        for drive in &mut state.drives {
            drive.duty = 0;
            drive.speed = 0;
        }
        Ok(())
    }

    fn read_telemetry_field(&mut self, field: &str) -> Result<Option<FieldValue>> {
        let mut state = self.state();
        state.receive(Op::ReadField, Command::ReadField(field.to_string()))?;
        Ok(state.field(field))
    }

    fn delay(&mut self, duration: Duration) {
        let mut state = self.state();
        state.commands.push(Command::Delay(duration));
        state.advance(duration);
    }

    fn clock(&self) -> Option<Duration> {
        Some(self.state().elapsed)
    }
}

/// Shared view of a [`DummyController`]
#[derive(Debug, Clone)]
pub struct DummyProbe {
    state: Arc<Mutex<State>>,
}

impl DummyProbe {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All commands received so far
    pub fn commands(&self) -> Vec<Command> {
        self.state().commands.clone()
    }

    /// Number of stop commands received, including failed ones
    pub fn stop_count(&self) -> usize {
        self.count(|c| matches!(c, Command::StopAll))
    }

    /// Number of non-zero duty or velocity commands received
    pub fn motion_count(&self) -> usize {
        self.count(Command::is_motion)
    }

    /// Number of commands matching `pred`
    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.state().commands.iter().filter(|c| pred(c)).count()
    }

    /// Whether the link is currently open
    pub fn is_open(&self) -> bool {
        self.state().open
    }

    /// Settings currently stored in NVM
    pub fn nvm(&self) -> BTreeMap<ConfigKey, ParamValue> {
        self.state().nvm.clone()
    }

    /// Settings currently live
    pub fn live(&self) -> BTreeMap<ConfigKey, ParamValue> {
        self.state().live.clone()
    }

    /// Virtual time spent in delays and command latency
    pub fn elapsed(&self) -> Duration {
        self.state().elapsed
    }

    /// Enable or disable packet-serial motion
    pub fn set_motion(&self, enabled: bool) {
        self.state().config.motion_enabled = enabled;
    }

    /// Change the motor current drawn per percent of duty
    pub fn set_amps_per_duty(&self, amps: f64) {
        self.state().config.amps_per_duty = amps;
    }

    /// Change the virtual time each command takes
    pub fn set_command_latency(&self, latency: Duration) {
        self.state().config.command_latency = latency;
    }

    /// Pin a telemetry field to `value`, or hide it with `None`
    pub fn set_field(&self, field: &str, value: Option<FieldValue>) {
        self.state().overrides.insert(field.to_string(), value);
    }

    /// Fail the next `times` calls of `op` with `err`
    pub fn inject(&self, op: Op, times: usize, err: Error) {
        let mut state = self.state();
        let queue = state.faults.entry(op).or_default();
        queue.extend(std::iter::repeat(err).take(times));
    }

    /// Override `key` with `value` every time NVM is reloaded
    pub fn drift(&self, key: ConfigKey, value: ParamValue) {
        self.state().drift.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened() -> DummyController {
        let mut dummy = DummyController::new_default();
        dummy.open("/dev/ttyACM0", 0x80).unwrap();
        dummy
    }

    #[test]
    fn test_firmware_and_address() {
        let mut dummy = DummyController::new_default();
        assert!(matches!(
            dummy.open("/dev/ttyACM0", 0x81),
            Err(Error::NoResponse(_))
        ));
        assert!(matches!(dummy.read_firmware(), Err(Error::NoResponse(_))));

        dummy.open("/dev/ttyACM0", 0x80).unwrap();
        let firmware = dummy.read_firmware().unwrap();
        assert_eq!(firmware.version, "USB Roboclaw 2x15a v4.2.8");
        assert_eq!(firmware.model_hint.as_deref(), Some("USB Roboclaw 2x15a"));
    }

    #[test]
    fn test_persist_and_reload() {
        let mut dummy = opened();
        let probe = dummy.probe();

        dummy
            .write_parameter(ConfigKey::MaxCurrent, &ParamValue::Float(7.5))
            .unwrap();
        assert!(!probe.nvm().contains_key(&ConfigKey::MaxCurrent));

        assert!(matches!(
            dummy.persist_nvm(0x1234_5678),
            Err(Error::Timeout { .. })
        ));
        assert!(!probe.nvm().contains_key(&ConfigKey::MaxCurrent));

        dummy.persist_nvm(NVM_WRITE_KEY).unwrap();
        dummy.reload_nvm().unwrap();
        let live = dummy.read_parameters().unwrap();
        assert_eq!(live[&ConfigKey::MaxCurrent], ParamValue::Float(7.5));
    }

    #[test]
    fn test_drift_on_reload() {
        let mut dummy = opened();
        dummy.probe().drift(ConfigKey::Mode, ParamValue::Integer(1));
        dummy.reload_nvm().unwrap();
        assert_eq!(
            dummy.read_parameters().unwrap()[&ConfigKey::Mode],
            ParamValue::Integer(1)
        );
    }

    #[test]
    fn test_drive_model() {
        let mut dummy = opened();
        dummy.command_duty(Channel::M1, 20).unwrap();
        dummy.delay(Duration::from_millis(200));

        assert_eq!(
            dummy.read_telemetry_field("motor1_current").unwrap(),
            Some(FieldValue::Float(1.0))
        );
        assert_eq!(
            dummy.read_telemetry_field("encoder1").unwrap(),
            Some(FieldValue::Integer(200))
        );
        assert_eq!(
            dummy.read_telemetry_field("status").unwrap(),
            Some(FieldValue::Enum("running".into()))
        );

        dummy.command_stop_all().unwrap();
        assert_eq!(
            dummy.read_telemetry_field("motor1_current").unwrap(),
            Some(FieldValue::Float(0.0))
        );
        assert_eq!(dummy.probe().stop_count(), 1);
        assert_eq!(dummy.probe().motion_count(), 1);
    }

    #[test]
    fn test_motion_disabled_ignores_commands() {
        let mut dummy = DummyController::new(DummyConfig {
            motion_enabled: false,
            ..Default::default()
        });
        dummy.open("/dev/ttyACM0", 0x80).unwrap();
        assert!(!dummy.read_motion_mode().unwrap());
        dummy.command_duty(Channel::M2, 50).unwrap();
        assert_eq!(
            dummy.read_telemetry_field("motor2_current").unwrap(),
            Some(FieldValue::Float(0.0))
        );
    }

    #[test]
    fn test_missing_and_unknown_fields() {
        let mut dummy = DummyController::new(DummyConfig {
            missing_fields: vec!["temperature".into()],
            ..Default::default()
        });
        dummy.open("/dev/ttyACM0", 0x80).unwrap();
        assert_eq!(dummy.read_telemetry_field("temperature").unwrap(), None);
        assert_eq!(dummy.read_telemetry_field("flux_capacitor").unwrap(), None);
        assert!(dummy.read_telemetry_field("battery_voltage").unwrap().is_some());

        dummy.probe().set_field("battery_voltage", None);
        assert_eq!(dummy.read_telemetry_field("battery_voltage").unwrap(), None);
    }

    #[test]
    fn test_injected_faults_are_consumed() {
        let mut dummy = opened();
        dummy
            .probe()
            .inject(Op::ReadField, 2, Error::crc("read_telemetry_field"));
        assert!(dummy.read_telemetry_field("encoder1").is_err());
        assert!(dummy.read_telemetry_field("encoder1").is_err());
        assert!(dummy.read_telemetry_field("encoder1").is_ok());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut dummy = DummyController::new_default();
        dummy.close();
        dummy.close();
        assert!(!dummy.probe().is_open());
    }
}
