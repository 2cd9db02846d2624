//! Progress reporting for test runs

use crate::recipe::Step;
use crate::report::TestReport;
use crate::telemetry::TelemetrySnapshot;

/// Observer for a running recipe
pub trait RunProgress {
    /// Called before each step is commanded
    fn step(&mut self, index: usize, total: usize, step: &Step);

    /// Called after each telemetry sample
    fn sampled(&mut self, index: usize, snapshot: &TelemetrySnapshot);

    /// Called once the report is complete, whatever the outcome
    fn complete(&mut self, report: &TestReport);
}

/// A no-op progress reporter
pub struct NoRunProgress;

impl RunProgress for NoRunProgress {
    fn step(&mut self, _index: usize, _total: usize, _step: &Step) {}
    fn sampled(&mut self, _index: usize, _snapshot: &TelemetrySnapshot) {}
    fn complete(&mut self, _report: &TestReport) {}
}
