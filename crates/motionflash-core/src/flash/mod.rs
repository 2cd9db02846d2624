//! Flash sequence: apply → persist → verify
//!
//! The steps run in strict order under a single session claim. Persist is
//! only attempted after every parameter was applied, and verification only
//! after persist succeeded. Whatever happens, the caller gets a completed
//! [`FlashReport`]; on failure it travels inside a [`RunFailure`] next to the
//! error that ended the run.

mod progress;

pub use progress::{FlashProgress, NoProgress};

use crate::config::{ConfigPayload, ParamValue, CONFIG_SCHEMA_VERSION};
use crate::error::{Error, Result, RunFailure};
use crate::report::{FlashReport, FlashReportBuilder, NvmResult, VerificationResult};
use crate::session::{ActiveSession, Session};

/// How much of the sequence to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashOptions {
    /// Read the configuration back from NVM after persisting
    pub verify: bool,
    /// Fail the run when verification does not pass (implies `verify`)
    pub strict: bool,
}

impl FlashOptions {
    /// Apply and persist only
    pub fn unverified() -> Self {
        Self::default()
    }

    /// Apply, persist and report the verification outcome
    pub fn verified() -> Self {
        Self {
            verify: true,
            strict: false,
        }
    }

    /// Apply, persist and fail unless verification passes
    pub fn strict() -> Self {
        Self {
            verify: true,
            strict: true,
        }
    }

    fn wants_verify(&self) -> bool {
        self.verify || self.strict
    }
}

/// Flasher bound to a session
pub struct Flasher<'s> {
    session: &'s Session,
}

impl<'s> Flasher<'s> {
    /// Create a flasher for `session`
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Run the full sequence
    pub fn flash(
        &self,
        config: &ConfigPayload,
        options: FlashOptions,
    ) -> core::result::Result<FlashReport, RunFailure<FlashReport>> {
        self.flash_with_progress(config, options, &mut NoProgress)
    }

    /// Run the full sequence, reporting progress
    pub fn flash_with_progress(
        &self,
        config: &ConfigPayload,
        options: FlashOptions,
        progress: &mut dyn FlashProgress,
    ) -> core::result::Result<FlashReport, RunFailure<FlashReport>> {
        let builder = FlashReport::v1().config(config);

        let mut active = match self.session.begin("flash") {
            Ok(active) => active,
            Err(error) => {
                let report = builder
                    .target("unknown", self.session.address())
                    .error(&error)
                    .build();
                return Err(RunFailure { error, report });
            }
        };

        let builder = builder
            .target(active.target().port(), active.target().address())
            .firmware(active.firmware());
        let result = run_sequence(&mut active, config, options, builder, progress);
        drop(active);

        match &result {
            Ok(report) => progress.complete(report),
            Err(failure) => progress.complete(&failure.report),
        }
        result
    }
}

fn run_sequence(
    active: &mut ActiveSession<'_>,
    config: &ConfigPayload,
    options: FlashOptions,
    builder: FlashReportBuilder,
    progress: &mut dyn FlashProgress,
) -> core::result::Result<FlashReport, RunFailure<FlashReport>> {
    log::info!(
        "Flashing {} parameter(s) to {} (config {})",
        config.parameters().len(),
        active.target(),
        config.config_hash()
    );

    if let Err(error) = apply_config(active, config, progress) {
        log::error!("Apply failed, NVM left untouched: {}", error);
        let report = builder
            .write_nvm(NvmResult::Skipped)
            .verification(VerificationResult::Skipped)
            .error(&error)
            .build();
        return Err(RunFailure { error, report });
    }

    progress.persisting();
    if let Err(error) = write_nvm(active) {
        log::error!("NVM persist failed: {}", error);
        let report = builder
            .write_nvm(NvmResult::Failed)
            .verification(VerificationResult::Skipped)
            .error(&error)
            .build();
        return Err(RunFailure { error, report });
    }
    let builder = builder.write_nvm(NvmResult::Ok);

    if !options.wants_verify() {
        return Ok(builder.verification(VerificationResult::Skipped).build());
    }

    progress.verifying();
    match reload_from_nvm(active, config) {
        Ok(mismatched) if mismatched.is_empty() => {
            log::info!("Verification passed");
            Ok(builder.verification(VerificationResult::Pass).build())
        }
        Ok(mismatched) => {
            log::warn!("Verification mismatch on {}", mismatched.join(", "));
            let builder = builder
                .verification(VerificationResult::Mismatch)
                .mismatched(mismatched.clone());
            if options.strict {
                let error = Error::VerificationMismatch(mismatched);
                let report = builder.error(&error).build();
                return Err(RunFailure { error, report });
            }
            Ok(builder.build())
        }
        Err(cause) => {
            log::warn!("Verification round-trip failed: {}", cause);
            let builder = builder.verification(VerificationResult::Error);
            if options.strict {
                let error = Error::VerificationError(cause.to_string());
                let report = builder.error(&error).build();
                return Err(RunFailure { error, report });
            }
            Ok(builder.error(&cause).build())
        }
    }
}

/// Write every parameter of `config` to live settings, in key order
///
/// The payload is re-checked first; a violation fails with `InvalidInput`
/// before anything is sent.
pub fn apply_config(
    active: &mut ActiveSession<'_>,
    config: &ConfigPayload,
    progress: &mut dyn FlashProgress,
) -> Result<()> {
    if config.schema_version() != CONFIG_SCHEMA_VERSION {
        return Err(Error::invalid(format!(
            "unsupported config schema_version: {}",
            config.schema_version()
        )));
    }
    if config.parameters().is_empty() {
        return Err(Error::invalid("configuration has no parameters"));
    }
    for (key, value) in config.parameters() {
        key.validate(value)?;
    }

    progress.applying(config.parameters().len());
    for (done, (key, value)) in config.parameters().iter().enumerate() {
        active.write_parameter(*key, value)?;
        progress.applied(*key, done + 1);
    }
    Ok(())
}

/// Persist live settings to NVM
pub fn write_nvm(active: &mut ActiveSession<'_>) -> Result<()> {
    active.persist_nvm()
}

/// Reload from NVM and compare against `config`
///
/// Returns the names of parameters whose read-back differs or is missing;
/// an empty list means verification passed.
pub fn reload_from_nvm(active: &mut ActiveSession<'_>, config: &ConfigPayload) -> Result<Vec<String>> {
    active.reload_nvm()?;
    let readback = active.read_parameters()?;

    Ok(config
        .parameters()
        .iter()
        .filter(|(key, applied)| !same_value(applied, readback.get(*key)))
        .map(|(key, _)| key.to_string())
        .collect())
}

fn same_value(applied: &ParamValue, readback: Option<&ParamValue>) -> bool {
    match readback {
        None => false,
        Some(read) if read == applied => true,
        Some(read) => match (applied.as_f64(), read.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}
