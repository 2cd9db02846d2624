//! Scripted transport for unit tests

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{ConfigKey, ParamValue};
use crate::device::{Channel, DeviceTransport, FirmwareInfo};
use crate::error::{Error, Result};
use crate::telemetry::FieldValue;

#[derive(Default)]
pub(crate) struct Script {
    pub log: Vec<String>,
    pub motion: bool,
    pub live: BTreeMap<ConfigKey, ParamValue>,
    pub nvm: BTreeMap<ConfigKey, ParamValue>,
    /// Overrides applied to live settings on every NVM reload
    pub drift: BTreeMap<ConfigKey, ParamValue>,
    pub fields: HashMap<String, FieldValue>,
    /// Per-operation queue of errors returned before the call succeeds
    pub failures: HashMap<&'static str, VecDeque<Error>>,
    pub open: bool,
    /// Device-side clock; `None` leaves timing to the host
    pub clock: Option<Duration>,
    /// Time every command takes on the device clock
    pub latency: Duration,
}

impl Script {
    pub fn fail(&mut self, op: &'static str, times: usize, err: Error) {
        let queue = self.failures.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(err.clone());
        }
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log.iter().filter(|l| l.starts_with(prefix)).count()
    }
}

#[derive(Clone)]
pub(crate) struct ScriptedTransport {
    pub script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let mut script = Script {
            motion: true,
            ..Default::default()
        };
        script
            .fields
            .insert("battery_voltage".into(), FieldValue::Float(12.5));
        script
            .fields
            .insert("motor1_current".into(), FieldValue::Float(0.4));
        script
            .fields
            .insert("encoder1".into(), FieldValue::Integer(1000));
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    pub fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    fn step(&mut self, op: &'static str, entry: String) -> Result<()> {
        let mut s = self.script.lock().unwrap();
        s.log.push(entry);
        let latency = s.latency;
        if let Some(now) = s.clock.as_mut() {
            *now += latency;
        }
        if let Some(err) = s.failures.get_mut(op).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        Ok(())
    }
}

impl DeviceTransport for ScriptedTransport {
    fn open(&mut self, port: &str, address: u8) -> Result<()> {
        self.step("open", format!("open {} {:#04x}", port, address))?;
        self.script().open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut s = self.script();
        s.log.push("close".into());
        s.open = false;
    }

    fn read_firmware(&mut self) -> Result<FirmwareInfo> {
        self.step("read_firmware", "read_firmware".into())?;
        FirmwareInfo::from_version("USB Roboclaw 2x15a v4.2.8\n")
    }

    fn read_motion_mode(&mut self) -> Result<bool> {
        self.step("read_motion_mode", "read_motion_mode".into())?;
        Ok(self.script().motion)
    }

    fn write_parameter(&mut self, key: ConfigKey, value: &ParamValue) -> Result<()> {
        self.step("write_parameter", format!("write {}={}", key, value))?;
        self.script().live.insert(key, value.clone());
        Ok(())
    }

    fn read_parameters(&mut self) -> Result<BTreeMap<ConfigKey, ParamValue>> {
        self.step("read_parameters", "read_parameters".into())?;
        Ok(self.script().live.clone())
    }

    fn persist_nvm(&mut self, key: u32) -> Result<()> {
        self.step("persist_nvm", format!("persist {:#010x}", key))?;
        let mut s = self.script();
        s.nvm = s.live.clone();
        Ok(())
    }

    fn reload_nvm(&mut self) -> Result<()> {
        self.step("reload_nvm", "reload_nvm".into())?;
        let mut s = self.script();
        let mut live = s.nvm.clone();
        live.extend(s.drift.clone());
        s.live = live;
        Ok(())
    }

    fn command_duty(&mut self, channel: Channel, duty: i32) -> Result<()> {
        self.step("command_duty", format!("duty {} {}", channel, duty))
    }

    fn command_velocity(&mut self, channel: Channel, speed: i32) -> Result<()> {
        self.step("command_velocity", format!("velocity {} {}", channel, speed))
    }

    fn command_stop_all(&mut self) -> Result<()> {
        self.step("command_stop_all", "stop".into())
    }

    fn read_telemetry_field(&mut self, field: &str) -> Result<Option<FieldValue>> {
        self.step("read_telemetry_field", format!("read {}", field))?;
        Ok(self.script().fields.get(field).cloned())
    }

    fn delay(&mut self, duration: Duration) {
        let mut s = self.script();
        s.log.push(format!("delay {}", duration.as_millis()));
        if let Some(now) = s.clock.as_mut() {
            *now += duration;
        }
    }

    fn clock(&self) -> Option<Duration> {
        self.script().clock
    }
}
