//! motionflash-core - Device-operation layer for packet-serial motor controllers
//!
//! This crate owns everything between the CLI and the wire: the session
//! lifecycle, telemetry polling, the apply → persist → verify flash sequence,
//! the safety-gated test-recipe executor and the deterministic report
//! builder. Byte-level framing lives behind the [`DeviceTransport`] trait.
//!
//! # Example
//!
//! ```ignore
//! use motionflash_core::{ConfigPayload, FlashOptions, Flasher, Session};
//!
//! let session = Session::new(transport, 0x80);
//! session.connect("/dev/ttyACM0")?;
//!
//! let config = ConfigPayload::from_json_str(&std::fs::read_to_string("config.json")?)?;
//! let report = Flasher::new(&session).flash(&config, FlashOptions::verified())?;
//! println!("{}", motionflash_core::report::render(&report)?);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod device;
pub mod error;
pub mod flash;
pub mod recipe;
pub mod report;
pub mod session;
pub mod telemetry;
pub mod tester;

#[cfg(test)]
mod testing;

pub use config::{ConfigKey, ConfigPayload, ParamValue, CONFIG_SCHEMA_VERSION};
pub use device::{Channel, DeviceTransport, FirmwareInfo, Target, TransportTuning, DEFAULT_ADDRESS};
pub use error::{Error, ErrorKind, Result, RunFailure};
pub use flash::{FlashOptions, FlashProgress, Flasher};
pub use recipe::{Recipe, RecipeBook, SafetyLimit, SafetyLimits, Step};
pub use report::{ConfigDocument, FlashReport, NvmResult, TestReport, VerificationResult};
pub use session::{ActiveSession, Session};
pub use telemetry::{FieldValue, Reading, Telemetry, TelemetrySnapshot};
pub use tester::{RunProgress, Tester};
