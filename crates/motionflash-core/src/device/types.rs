//! Target, firmware and channel types

use crate::error::{Error, Result};
use core::fmt;

/// Default packet-serial address
pub const DEFAULT_ADDRESS: u8 = 0x80;

/// Parse a packet-serial address given as decimal or `0x` hex
///
/// Values outside `0x00..=0xFF` are rejected.
pub fn parse_address(s: &str) -> Result<u8> {
    let s = s.trim();
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    }
    .map_err(|e| Error::invalid(format!("invalid address '{}': {}", s, e)))?;

    u8::try_from(value)
        .map_err(|_| Error::invalid(format!("address {} out of range 0x00..0xFF", value)))
}

/// A device on a serial port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    port: String,
    address: u8,
}

impl Target {
    /// Create a target; the port must be non-empty
    pub fn new(port: impl Into<String>, address: u8) -> Result<Self> {
        let port = port.into();
        if port.trim().is_empty() {
            return Err(Error::invalid("port is required"));
        }
        Ok(Self { port, address })
    }

    /// Create a target from a wide integer address, rejecting values above 0xFF
    pub fn with_wide_address(port: impl Into<String>, address: u32) -> Result<Self> {
        let address = u8::try_from(address)
            .map_err(|_| Error::invalid(format!("address {} out of range 0x00..0xFF", address)))?;
        Self::new(port, address)
    }

    /// Serial port path
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Packet-serial address
    pub fn address(&self) -> u8 {
        self.address
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@0x{:02X}", self.port, self.address)
    }
}

/// Firmware identity, read once per connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareInfo {
    /// Version string as reported by the controller
    pub version: String,
    /// Model name, when it can be derived from the version string
    pub model_hint: Option<String>,
}

impl FirmwareInfo {
    /// Build from a raw version string
    ///
    /// Controllers report e.g. `"USB Roboclaw 2x15a v4.2.8\n"`; everything
    /// before the ` v<digit>` token is taken as the model hint.
    pub fn from_version(raw: &str) -> Result<Self> {
        let version = raw.trim_end_matches(['\0', '\n', '\r']).trim().to_string();
        if version.is_empty() {
            return Err(Error::NoResponse("empty firmware version".into()));
        }

        let model_hint = version
            .match_indices(" v")
            .find(|(idx, _)| {
                version[idx + 2..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_digit())
            })
            .map(|(idx, _)| version[..idx].trim().to_string())
            .filter(|m| !m.is_empty());

        Ok(Self {
            version,
            model_hint,
        })
    }
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)
    }
}

/// Motor channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Channel {
    /// Motor 1
    M1,
    /// Motor 2
    M2,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::M1 => f.write_str("M1"),
            Self::M2 => f.write_str("M2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x80").unwrap(), 0x80);
        assert_eq!(parse_address("128").unwrap(), 128);
        assert_eq!(parse_address("0XFF").unwrap(), 0xFF);
        assert_eq!(
            parse_address("0x100").unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert!(parse_address("-1").is_err());
        assert!(parse_address("abc").is_err());
    }

    #[test]
    fn test_target_validation() {
        assert!(Target::new("", 0x80).is_err());
        assert!(Target::with_wide_address("/dev/ttyACM0", 256).is_err());
        let target = Target::with_wide_address("/dev/ttyACM0", 0x81).unwrap();
        assert_eq!(target.to_string(), "/dev/ttyACM0@0x81");
    }

    #[test]
    fn test_firmware_model_hint() {
        let fw = FirmwareInfo::from_version("USB Roboclaw 2x15a v4.2.8\n\0").unwrap();
        assert_eq!(fw.version, "USB Roboclaw 2x15a v4.2.8");
        assert_eq!(fw.model_hint.as_deref(), Some("USB Roboclaw 2x15a"));

        let fw = FirmwareInfo::from_version("4.2.8").unwrap();
        assert_eq!(fw.model_hint, None);

        assert!(FirmwareInfo::from_version("\n").is_err());
    }
}
