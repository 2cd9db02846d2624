//! Transport tuning read from the environment

use std::time::Duration;

use crate::error::{Error, Result};

/// Link parameters shared by every transport backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTuning {
    /// Serial baud rate
    pub baud: u32,
    /// Per-command reply timeout
    pub timeout: Duration,
    /// Extra attempts after the first one for each device command
    pub retries: u8,
    /// Log every command at trace level
    pub verbose: bool,
}

impl Default for TransportTuning {
    fn default() -> Self {
        Self {
            baud: 38400,
            timeout: Duration::from_millis(10),
            retries: 2,
            verbose: false,
        }
    }
}

impl TransportTuning {
    /// Environment variable holding the baud rate
    pub const ENV_BAUD: &'static str = "MOTIONFLASH_BAUD";
    /// Environment variable holding the reply timeout in milliseconds
    pub const ENV_TIMEOUT_MS: &'static str = "MOTIONFLASH_TIMEOUT_MS";
    /// Environment variable holding the retry count
    pub const ENV_RETRIES: &'static str = "MOTIONFLASH_RETRIES";
    /// Environment variable enabling verbose transport logging
    pub const ENV_VERBOSE: &'static str = "MOTIONFLASH_VERBOSE";

    /// Read tuning from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read tuning through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut tuning = Self::default();

        if let Some(raw) = lookup(Self::ENV_BAUD) {
            tuning.baud = parse_u32(Self::ENV_BAUD, &raw)?;
            if tuning.baud == 0 {
                return Err(Error::invalid(format!("{} must be non-zero", Self::ENV_BAUD)));
            }
        }
        if let Some(raw) = lookup(Self::ENV_TIMEOUT_MS) {
            tuning.timeout = Duration::from_millis(parse_u32(Self::ENV_TIMEOUT_MS, &raw)? as u64);
        }
        if let Some(raw) = lookup(Self::ENV_RETRIES) {
            let retries = parse_u32(Self::ENV_RETRIES, &raw)?;
            tuning.retries = u8::try_from(retries).map_err(|_| {
                Error::invalid(format!("{} out of range: {}", Self::ENV_RETRIES, retries))
            })?;
        }
        if let Some(raw) = lookup(Self::ENV_VERBOSE) {
            tuning.verbose = matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(tuning)
    }
}

fn parse_u32(name: &str, raw: &str) -> Result<u32> {
    let s = raw.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    };
    parsed.map_err(|e| Error::invalid(format!("{}='{}': {}", name, raw, e)))
}
