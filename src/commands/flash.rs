//! The flash command

use std::fs;
use std::path::Path;

use motionflash_core::report::{artifact_path, render, ArtifactKind, VerificationResult};
use motionflash_core::{ConfigPayload, Error, FlashOptions, FlashReport, Flasher, Target};

use super::progress::FlashSpinner;
use super::{announce_report, connect, write_artifact, CliError, Context};

fn read_config(path: &Path) -> Result<ConfigPayload, Error> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::invalid(format!("cannot read config {}: {}", path.display(), e)))?;
    ConfigPayload::from_json_str(&text)
}

/// Write `report` to the report directory and return its path
fn store(report: &FlashReport, report_dir: &Path) -> Result<std::path::PathBuf, CliError> {
    let path = artifact_path(
        report_dir,
        ArtifactKind::Flash,
        &report.port,
        report.address,
        &report.timestamp,
    );
    write_artifact(&path, &render(report)?)?;
    Ok(path)
}

/// Apply the config at `config_path`, persist it and optionally verify it
///
/// A report is written for every outcome, including failures before the
/// device was reached. A verification mismatch fails the command even
/// without `--strict`; a verification round-trip error only does so with it.
pub fn cmd_flash(
    ctx: &Context,
    target: &Target,
    config_path: &Path,
    options: FlashOptions,
    report_dir: &Path,
) -> Result<(), CliError> {
    let mut config = None;
    let outcome = read_config(config_path).and_then(|payload| {
        let payload = config.insert(payload);
        let session = connect(ctx, target)?;
        Ok(Flasher::new(&session).flash_with_progress(payload, options, &mut FlashSpinner::new()))
    });

    let result = match outcome {
        Ok(result) => result,
        Err(error) => {
            log::error!("Flash aborted before the sequence started: {}", error);
            let mut builder = FlashReport::v1().target(target.port(), target.address());
            if let Some(config) = &config {
                builder = builder.config(config);
            }
            let report = builder.error(&error).build();
            let path = store(&report, report_dir)?;
            return Err(CliError::with_report(error, &path));
        }
    };

    match result {
        Ok(report) => {
            let path = store(&report, report_dir)?;
            announce_report(&path);
            match report.verification_result {
                VerificationResult::Mismatch => Err(CliError::with_report(
                    Error::VerificationMismatch(report.mismatched_parameters.clone()),
                    &path,
                )),
                VerificationResult::Error => {
                    log::warn!(
                        "Verification could not complete: {}",
                        report
                            .error
                            .as_ref()
                            .map(|e| e.message.as_str())
                            .unwrap_or("unknown error")
                    );
                    Ok(())
                }
                VerificationResult::Pass | VerificationResult::Skipped => Ok(()),
            }
        }
        Err(failure) => {
            let path = store(&failure.report, report_dir)?;
            announce_report(&path);
            Err(CliError::with_report(failure.error, &path))
        }
    }
}
