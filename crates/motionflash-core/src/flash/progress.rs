//! Progress reporting for flash runs

use crate::config::ConfigKey;
use crate::report::FlashReport;

/// Observer for the flash sequence
///
/// Each hook fires when the corresponding step starts, except `applied`
/// which fires after each parameter write.
pub trait FlashProgress {
    /// Called before the first parameter write
    fn applying(&mut self, total: usize);

    /// Called after each parameter write
    fn applied(&mut self, key: ConfigKey, done: usize);

    /// Called before the NVM persist command
    fn persisting(&mut self);

    /// Called before the NVM read-back
    fn verifying(&mut self);

    /// Called once the report is complete, whatever the outcome
    fn complete(&mut self, report: &FlashReport);
}

/// A no-op progress reporter
pub struct NoProgress;

impl FlashProgress for NoProgress {
    fn applying(&mut self, _total: usize) {}
    fn applied(&mut self, _key: ConfigKey, _done: usize) {}
    fn persisting(&mut self) {}
    fn verifying(&mut self) {}
    fn complete(&mut self, _report: &FlashReport) {}
}
