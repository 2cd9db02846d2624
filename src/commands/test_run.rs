//! The test command

use std::path::{Path, PathBuf};

use motionflash_core::report::{artifact_path, render, render_trace_csv, ArtifactKind, TraceRow};
use motionflash_core::{Error, Target, TestReport, Tester};

use super::progress::RunSpinner;
use super::{announce_report, connect, write_artifact, CliError, Context};

struct Artifacts<'a> {
    target: &'a Target,
    report_dir: &'a Path,
    csv: bool,
}

impl Artifacts<'_> {
    fn path(&self, kind: ArtifactKind, report: &TestReport) -> PathBuf {
        artifact_path(
            self.report_dir,
            kind,
            self.target.port(),
            self.target.address(),
            &report.timestamp,
        )
    }

    /// Write the JSON report and, if requested, the CSV trace
    fn store(&self, report: &TestReport, trace: &[TraceRow]) -> Result<PathBuf, CliError> {
        let path = self.path(ArtifactKind::Test, report);
        write_artifact(&path, &render(report)?)?;
        if self.csv {
            let csv = self.path(ArtifactKind::TestTelemetry, report);
            write_artifact(&csv, &render_trace_csv(trace))?;
        }
        Ok(path)
    }
}

/// Run the recipe `recipe_id` against `target`
///
/// A run that completes with `passed == false` still fails the command
/// with the `safety_abort` exit code.
pub fn cmd_test(
    ctx: &Context,
    target: &Target,
    recipe_id: &str,
    csv: bool,
    report_dir: &Path,
) -> Result<(), CliError> {
    let artifacts = Artifacts {
        target,
        report_dir,
        csv,
    };

    let recipe = match ctx.recipes.resolve(recipe_id) {
        Ok(recipe) => recipe,
        Err(error) => {
            let builder = TestReport::v1().recipe_id(recipe_id);
            return Err(early_failure(&artifacts, builder, error));
        }
    };
    let session = match connect(ctx, target) {
        Ok(session) => session,
        Err(error) => {
            let builder = TestReport::v1().recipe(recipe);
            return Err(early_failure(&artifacts, builder, error));
        }
    };

    let mut tester = Tester::new(&session);
    let result = tester.run_with_progress(recipe, &mut RunSpinner::new());
    let trace = tester.trace().to_vec();
    session.disconnect();

    match result {
        Ok(report) => {
            let path = artifacts.store(&report, &trace)?;
            announce_report(&path);
            if report.passed {
                Ok(())
            } else {
                let reason = report
                    .abort_reason
                    .clone()
                    .unwrap_or_else(|| report.reason.clone());
                Err(CliError::with_report(Error::SafetyAbort(reason), &path))
            }
        }
        Err(failure) => {
            let path = artifacts.store(&failure.report, &trace)?;
            announce_report(&path);
            Err(CliError::with_report(failure.error, &path))
        }
    }
}

/// Report a run that never reached the device
fn early_failure(
    artifacts: &Artifacts<'_>,
    builder: motionflash_core::report::TestReportBuilder,
    error: Error,
) -> CliError {
    log::error!("Test aborted before the run started: {}", error);
    let report = builder
        .aborted(error.code(), error.code())
        .error(&error)
        .build();
    let path = artifacts.path(ArtifactKind::Test, &report);
    let written = render(&report)
        .map_err(CliError::from)
        .and_then(|json| write_artifact(&path, &json));
    match written {
        Ok(()) => CliError::with_report(error, &path),
        Err(host) => host,
    }
}
