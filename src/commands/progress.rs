//! Spinners for flash and test runs

use indicatif::{ProgressBar, ProgressStyle};
use motionflash_core::flash::FlashProgress;
use motionflash_core::report::VerificationResult;
use motionflash_core::{ConfigKey, FlashReport, RunProgress, Step, TelemetrySnapshot, TestReport};
use std::time::Duration;

/// Create a standard spinner style
fn create_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(create_spinner_style());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Flash progress on a single spinner line
pub struct FlashSpinner {
    pb: ProgressBar,
    total: usize,
}

impl FlashSpinner {
    pub fn new() -> Self {
        Self {
            pb: spinner(),
            total: 0,
        }
    }
}

impl FlashProgress for FlashSpinner {
    fn applying(&mut self, total: usize) {
        self.total = total;
        self.pb.set_message(format!("Applying {} parameter(s)...", total));
    }

    fn applied(&mut self, key: ConfigKey, done: usize) {
        self.pb
            .set_message(format!("Applied {} ({}/{})", key, done, self.total));
    }

    fn persisting(&mut self) {
        self.pb.set_message("Persisting to NVM...");
    }

    fn verifying(&mut self) {
        self.pb.set_message("Reloading from NVM and verifying...");
    }

    fn complete(&mut self, report: &FlashReport) {
        let message = match (report.persisted(), report.verification_result) {
            (false, _) => "Flash failed",
            (true, VerificationResult::Pass) => "Flash complete, verification passed",
            (true, VerificationResult::Mismatch) => "Flash complete, verification MISMATCH",
            (true, VerificationResult::Error) => "Flash complete, verification error",
            (true, VerificationResult::Skipped) => "Flash complete",
        };
        self.pb.finish_with_message(message);
    }
}

/// Test progress on a single spinner line
pub struct RunSpinner {
    pb: ProgressBar,
    step: String,
}

impl RunSpinner {
    pub fn new() -> Self {
        Self {
            pb: spinner(),
            step: String::new(),
        }
    }
}

impl RunProgress for RunSpinner {
    fn step(&mut self, index: usize, total: usize, step: &Step) {
        self.step = format!("Step {}/{} ({} ms)", index + 1, total, step.duration().as_millis());
        self.pb.set_message(self.step.clone());
    }

    fn sampled(&mut self, _index: usize, snapshot: &TelemetrySnapshot) {
        let readings: Vec<String> = snapshot
            .fields
            .iter()
            .map(|(field, reading)| match reading.value() {
                Some(value) => format!("{}={}", field, value),
                None => format!("{}=?", field),
            })
            .collect();
        self.pb
            .set_message(format!("{}: {}", self.step, readings.join(" ")));
    }

    fn complete(&mut self, report: &TestReport) {
        if report.passed {
            self.pb.finish_with_message("Test passed");
        } else {
            self.pb.finish_with_message(format!(
                "Test FAILED: {}",
                report.abort_reason.as_deref().unwrap_or(&report.reason)
            ));
        }
    }
}
