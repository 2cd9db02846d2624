//! CLI command implementations
//!
//! Every command opens its own [`Session`] through the backend registry and
//! lets it drop (and disconnect) before returning. Failures are turned into
//! a [`CliError`], which `main` prints as a JSON object on stderr and maps
//! onto the process exit code.
//!
//! `flash` and `test` write their report artifact whether or not the run
//! succeeded; the path is echoed on stdout as `{"report": ...}` and repeated
//! in the error details.

mod device;
mod flash;
mod list;
mod progress;
mod test_run;

pub use device::{cmd_dump, cmd_info, cmd_status};
pub use flash::cmd_flash;
pub use list::{list_backends, list_ports, list_recipes};
pub use test_run::cmd_test;

use std::fs;
use std::path::Path;

use motionflash_core::device::parse_address;
use motionflash_core::{Error, RecipeBook, Session, Target, TransportTuning};
use serde_json::{json, Map, Value};

use crate::backends;
use crate::cli::TargetArgs;

/// Exit code for failures on the host side (artifact I/O, port enumeration)
pub const EXIT_HOST_FAILURE: u8 = 1;

/// Settings shared by every command
pub struct Context {
    /// `--backend` value
    pub backend: String,
    /// Transport tuning read from the environment
    pub tuning: TransportTuning,
    /// Built-in recipes plus any loaded with `--recipes`
    pub recipes: RecipeBook,
}

/// A failed command
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The device workflow failed with a typed error
    #[error("{error}")]
    Device {
        error: Error,
        details: Map<String, Value>,
    },

    /// The host could not read or write something
    #[error("{0}")]
    Host(String),
}

impl CliError {
    /// Host-side failure while doing `context`
    pub fn host(context: impl AsRef<str>, err: impl std::fmt::Display) -> Self {
        Self::Host(format!("{}: {}", context.as_ref(), err))
    }

    /// Device failure whose report was written to `report`
    pub fn with_report(error: Error, report: &Path) -> Self {
        let mut details = Map::new();
        details.insert("report".into(), Value::String(report.display().to_string()));
        Self::Device { error, details }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Device { error, .. } => error.code(),
            Self::Host(_) => "host_error",
        }
    }

    /// Process exit code
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Device { error, .. } => error.exit_code(),
            Self::Host(_) => EXIT_HOST_FAILURE,
        }
    }

    /// `{"code", "message", "details"}` as printed on stderr
    pub fn to_json(&self) -> Value {
        let details = match self {
            Self::Device { details, .. } => Value::Object(details.clone()),
            Self::Host(_) => Value::Object(Map::new()),
        };
        json!({
            "code": self.code(),
            "message": self.to_string(),
            "details": details,
        })
    }
}

impl From<Error> for CliError {
    fn from(error: Error) -> Self {
        Self::Device {
            error,
            details: Map::new(),
        }
    }
}

/// Validate `--port` and `--address`
///
/// Runs before any artifact is named, so a bad address is reported on
/// stderr only.
pub fn resolve_target(args: &TargetArgs) -> Result<Target, CliError> {
    let address = parse_address(&args.address)?;
    Ok(Target::new(args.port.as_str(), address)?)
}

/// Open a session on the configured backend and connect it to `target`
fn connect(ctx: &Context, target: &Target) -> Result<Session, Error> {
    let session = backends::open_session(&ctx.backend, target.address(), &ctx.tuning)?;
    session.connect(target.port())?;
    Ok(session)
}

/// Write `contents` to `path`, creating parent directories
fn write_artifact(path: &Path, contents: &str) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| CliError::host(format!("cannot create {}", parent.display()), e))?;
    }
    fs::write(path, contents)
        .map_err(|e| CliError::host(format!("cannot write {}", path.display()), e))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Print `{"report": path}` on stdout
fn announce_report(path: &Path) {
    println!("{}", json!({ "report": path.display().to_string() }));
}
