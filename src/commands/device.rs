//! One-shot device queries: info, status and dump

use std::path::Path;

use motionflash_core::report::render;
use motionflash_core::{ConfigDocument, ConfigPayload, Target, Telemetry};
use serde_json::json;

use super::{connect, write_artifact, CliError, Context};

/// Print `{"address", "firmware", "port"}` for the controller at `target`
pub fn cmd_info(ctx: &Context, target: &Target) -> Result<(), CliError> {
    let session = connect(ctx, target)?;
    let firmware = session.get_firmware()?;
    session.disconnect();

    let payload = json!({
        "address": format!("0x{:02X}", target.address()),
        "firmware": firmware.version,
        "port": target.port(),
    });
    println!("{}", payload);
    Ok(())
}

/// Print a telemetry snapshot for `fields`
pub fn cmd_status(ctx: &Context, target: &Target, fields: &[String]) -> Result<(), CliError> {
    // Catch a bad field list before touching the port
    motionflash_core::telemetry::validate_fields(fields)?;

    let session = connect(ctx, target)?;
    let snapshot = Telemetry::new(&session).poll(fields)?;
    session.disconnect();

    print!("{}", render(&snapshot)?);
    Ok(())
}

/// Read the supported configuration subset and write it as a config document
pub fn cmd_dump(ctx: &Context, target: &Target, out: &Path) -> Result<(), CliError> {
    let session = connect(ctx, target)?;
    let firmware = session.get_firmware()?;
    let parameters = session.read_parameters()?;
    let device = session.target()?;
    session.disconnect();

    let config = ConfigPayload::from_parameters(parameters)?;
    let document = ConfigDocument::new(&device, &firmware, &config)?;
    log::info!(
        "Dumped {} parameter(s) from {} (config {})",
        config.parameters().len(),
        device,
        config.config_hash()
    );
    write_artifact(out, &render(&document)?)
}
