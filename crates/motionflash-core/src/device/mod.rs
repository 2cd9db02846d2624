//! Device-facing types: targets, firmware identity and the transport seam

mod transport;
mod tuning;
mod types;

pub use transport::{DeviceTransport, UnconfiguredTransport, NVM_WRITE_KEY};
pub use tuning::TransportTuning;
pub use types::{parse_address, Channel, FirmwareInfo, Target, DEFAULT_ADDRESS};
