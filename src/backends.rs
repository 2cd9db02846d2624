//! Backend registry
//!
//! Resolves `--backend name[:key=value,...]` into a [`Session`] whose
//! transport talks to the selected controller implementation.

use std::collections::HashMap;

use motionflash_core::device::UnconfiguredTransport;
use motionflash_core::{Error, Result, Session, TransportTuning};

/// Parsed backend parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendParams {
    /// Backend name (canonical)
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

/// Parse a backend string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
pub fn parse_backend_params(s: &str) -> Result<BackendParams> {
    let (name, rest) = match s.split_once(':') {
        Some((name, rest)) => (name, Some(rest)),
        None => (s, None),
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid("backend name is required"));
    }

    let mut params = HashMap::new();
    for pair in rest.into_iter().flat_map(|r| r.split(',')) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            Error::invalid(format!(
                "invalid backend parameter '{}' (expected key=value)",
                pair
            ))
        })?;
        params.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(BackendParams {
        name: name.to_string(),
        params,
    })
}

/// Open a disconnected session on `backend` for `address`
pub fn open_session(backend: &str, address: u8, tuning: &TransportTuning) -> Result<Session> {
    let params = parse_backend_params(backend)?;
    log::debug!("Using backend '{}'", params.name);

    let session = match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" => Session::new(open_dummy(&params, address)?, address),

        "serial" | "packet-serial" => open_serial(&params, address, tuning)?,

        _ => {
            return Err(Error::invalid(format!(
                "unknown backend: {} [available: {}]",
                params.name,
                backend_names_short()
            )))
        }
    };
    Ok(session.with_retries(tuning.retries))
}

#[cfg(feature = "dummy")]
fn open_dummy(params: &BackendParams, address: u8) -> Result<motionflash_dummy::DummyController> {
    use motionflash_dummy::{DummyConfig, DummyController};

    let mut config = DummyConfig {
        address,
        ..DummyConfig::default()
    };

    for (key, value) in &params.params {
        match key.as_str() {
            "motion" => {
                config.motion_enabled = match value.as_str() {
                    "on" | "1" | "true" => true,
                    "off" | "0" | "false" => false,
                    other => {
                        return Err(Error::invalid(format!(
                            "dummy: motion must be on or off, got '{}'",
                            other
                        )))
                    }
                }
            }
            "firmware" => config.firmware = value.clone(),
            "missing" => {
                config.missing_fields = value
                    .split('+')
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "amps" => {
                config.amps_per_duty = value
                    .parse::<f64>()
                    .ok()
                    .filter(|a| a.is_finite() && *a >= 0.0)
                    .ok_or_else(|| Error::invalid(format!("dummy: invalid amps '{}'", value)))?
            }
            "latency" => {
                config.command_latency = value
                    .parse::<u64>()
                    .map(std::time::Duration::from_millis)
                    .map_err(|_| Error::invalid(format!("dummy: invalid latency '{}' (ms)", value)))?
            }
            "address" => config.address = motionflash_core::device::parse_address(value)?,
            other => {
                return Err(Error::invalid(format!(
                    "dummy: unknown parameter '{}'",
                    other
                )))
            }
        }
    }

    log::info!("Opening dummy controller ({})", config.firmware.trim_end());
    Ok(DummyController::new(config))
}

fn open_serial(params: &BackendParams, address: u8, tuning: &TransportTuning) -> Result<Session> {
    if let Some(key) = params.params.keys().next() {
        return Err(Error::invalid(format!(
            "serial: unknown parameter '{}'",
            key
        )));
    }
    log::debug!(
        "serial: {} baud, {:?} timeout, {} retries",
        tuning.baud,
        tuning.timeout,
        tuning.retries
    );
    let transport = UnconfiguredTransport::named(params.name.clone());
    Ok(Session::new(transport, address))
}

/// Information about a backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    backends.push(BackendInfo {
        name: "serial",
        aliases: &["packet-serial"],
        description: "Packet-serial controller on a serial port (no codec bundled)",
    });

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory controller emulator (motion=on|off,firmware=TEXT,missing=f1+f2,amps=A,latency=MS)",
    });

    backends
}

/// Short list of backend names for help and error messages
pub fn backend_names_short() -> String {
    let names: Vec<&str> = available_backends().iter().map(|b| b.name).collect();
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_params() {
        let params = parse_backend_params("dummy").unwrap();
        assert_eq!(params.name, "dummy");
        assert!(params.params.is_empty());

        let params = parse_backend_params("dummy:motion=off, missing=temperature+speed1").unwrap();
        assert_eq!(params.params.get("motion").map(String::as_str), Some("off"));
        assert_eq!(
            params.params.get("missing").map(String::as_str),
            Some("temperature+speed1")
        );

        assert!(parse_backend_params("dummy:motion").is_err());
        assert!(parse_backend_params(":motion=on").is_err());
    }

    #[test]
    fn test_unknown_backend() {
        let err = open_session("nonsense", 0x80, &TransportTuning::default())
            .err()
            .unwrap();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn test_serial_has_no_codec() {
        let session = open_session("serial", 0x80, &TransportTuning::default()).unwrap();
        let err = session.connect("/dev/ttyACM0").unwrap_err();
        assert_eq!(err.code(), "no_response");
        assert!(!session.is_connected());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_options() {
        let session = open_session(
            "dummy:motion=off,firmware=Roboclaw 2x7a v4.1.34",
            0x81,
            &TransportTuning::default(),
        )
        .unwrap();
        let firmware = session.connect("/dev/ttyACM0").unwrap();
        assert_eq!(firmware.version, "Roboclaw 2x7a v4.1.34");
        assert!(!session.check_motion_mode().unwrap());

        assert!(open_session("dummy:motion=maybe", 0x80, &TransportTuning::default()).is_err());
        assert!(open_session("dummy:color=red", 0x80, &TransportTuning::default()).is_err());
    }
}
