//! Safety-gated recipe executor
//!
//! A run moves through `Idle → ModeChecking → Running → Completed | Aborted`,
//! or ends in `ModeMismatch` straight from the mode check. The motion guard
//! is armed before the mode check and issues exactly one stop command when
//! the run ends, including when it unwinds from a panic.
//!
//! Limits are evaluated in declared order, so the first declared limit wins
//! when one sample breaches several. Commanded duty and velocity are checked
//! before they are sent, samples after they are taken.

mod progress;
mod summary;

pub use progress::{NoRunProgress, RunProgress};

use std::time::{Duration, Instant};

use crate::error::{Error, RunFailure};
use crate::recipe::{Recipe, SafetyLimit, Step};
use crate::report::{TestReport, TestReportBuilder, TraceRow};
use crate::session::{ActiveSession, Session};
use crate::telemetry::Telemetry;

use summary::Summary;

/// Reason recorded for a run that met its pass criteria
pub const REASON_COMPLETED: &str = "completed";
/// Reason recorded for a run stopped by a safety limit
pub const REASON_SAFETY_ABORT: &str = "safety_abort";
/// Reason recorded when motion is disabled on the device
pub const REASON_MODE_MISMATCH: &str = "mode_mismatch";

/// Sends the stop command once, on finish or on drop
struct MotionGuard<'s> {
    active: ActiveSession<'s>,
    stopped: bool,
}

impl<'s> MotionGuard<'s> {
    fn arm(active: ActiveSession<'s>) -> Self {
        Self {
            active,
            stopped: false,
        }
    }

    fn finish(mut self) -> bool {
        self.stopped = true;
        self.active.send_stop()
    }
}

impl Drop for MotionGuard<'_> {
    fn drop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            log::warn!("Run ended without an explicit stop, stopping now");
            self.active.send_stop();
        }
    }
}

/// Time since the first motion command of a run
///
/// Follows the transport's clock when it has one, so emulated time and
/// sample offsets agree; otherwise the host's wall clock.
enum RunClock {
    Device(Duration),
    Wall(Instant),
}

impl RunClock {
    fn start(active: &ActiveSession<'_>) -> Self {
        match active.clock() {
            Some(now) => Self::Device(now),
            None => Self::Wall(Instant::now()),
        }
    }

    fn elapsed(&self, active: &ActiveSession<'_>) -> Duration {
        match self {
            Self::Device(start) => active
                .clock()
                .map_or(Duration::ZERO, |now| now.saturating_sub(*start)),
            Self::Wall(start) => start.elapsed(),
        }
    }
}

enum Outcome {
    Completed,
    Breach(SafetyLimit),
    Failed(Error),
}

/// Recipe executor bound to a session
pub struct Tester<'s> {
    session: &'s Session,
    sample_interval: Duration,
    trace: Vec<TraceRow>,
}

impl<'s> Tester<'s> {
    /// Sampling cadence used unless overridden
    pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

    /// Create a tester for `session`
    pub fn new(session: &'s Session) -> Self {
        Self {
            session,
            sample_interval: Self::DEFAULT_SAMPLE_INTERVAL,
            trace: Vec::new(),
        }
    }

    /// Set the sampling cadence (at least 1 ms)
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Per-sample trace of the last run
    pub fn trace(&self) -> &[TraceRow] {
        &self.trace
    }

    /// Execute `recipe`
    ///
    /// A safety breach yields `Ok` with `passed == false`; a transport error
    /// or a mode mismatch yields a [`RunFailure`] carrying the report.
    pub fn run(&mut self, recipe: &Recipe) -> Result<TestReport, RunFailure<TestReport>> {
        self.run_with_progress(recipe, &mut NoRunProgress)
    }

    /// Execute `recipe`, reporting progress
    pub fn run_with_progress(
        &mut self,
        recipe: &Recipe,
        progress: &mut dyn RunProgress,
    ) -> Result<TestReport, RunFailure<TestReport>> {
        self.trace.clear();
        let builder = TestReport::v1().recipe(recipe);

        let result = match self.session.begin("test") {
            Ok(active) => self.supervise(MotionGuard::arm(active), recipe, builder, progress),
            Err(error) => Err(failure(builder, error, Summary::default())),
        };

        match &result {
            Ok(report) => progress.complete(report),
            Err(failure) => progress.complete(&failure.report),
        }
        result
    }

    fn supervise(
        &mut self,
        mut guard: MotionGuard<'_>,
        recipe: &Recipe,
        builder: TestReportBuilder,
        progress: &mut dyn RunProgress,
    ) -> Result<TestReport, RunFailure<TestReport>> {
        log::info!("Running recipe {} on {}", recipe.id(), guard.active.target());

        match guard.active.check_motion_mode() {
            Ok(true) => {}
            Ok(false) => {
                guard.finish();
                let error = Error::ModeMismatch(
                    "packet-serial motion is disabled on the device".to_string(),
                );
                log::error!("{}", error);
                let report = builder
                    .aborted(REASON_MODE_MISMATCH, REASON_MODE_MISMATCH)
                    .error(&error)
                    .build();
                return Err(RunFailure { error, report });
            }
            Err(error) => {
                guard.finish();
                return Err(failure(builder, error, Summary::default()));
            }
        }

        let mut summary = Summary::default();
        let outcome = self.execute(&mut guard.active, recipe, &mut summary, progress);
        // Every exit from Running goes through this stop
        guard.finish();

        match outcome {
            Outcome::Completed => {
                log::info!("Recipe {} completed", recipe.id());
                Ok(builder.completed().summary(summary.finish()).build())
            }
            Outcome::Breach(limit) => {
                log::warn!("Recipe {} aborted: {} breached", recipe.id(), limit);
                Ok(builder
                    .aborted(REASON_SAFETY_ABORT, limit.breach_reason())
                    .summary(summary.finish())
                    .build())
            }
            Outcome::Failed(error) => {
                log::error!("Recipe {} aborted: {}", recipe.id(), error);
                Err(failure(builder, error, summary))
            }
        }
    }

    fn execute(
        &mut self,
        active: &mut ActiveSession<'_>,
        recipe: &Recipe,
        summary: &mut Summary,
        progress: &mut dyn RunProgress,
    ) -> Outcome {
        let limits = recipe.safety_limits();
        let clock = RunClock::start(active);
        let mut offset = Duration::ZERO;

        for (index, step) in recipe.steps().iter().enumerate() {
            progress.step(index, recipe.steps().len(), step);

            if let Some(limit) = limits.first_command_breach(step) {
                return Outcome::Breach(*limit);
            }
            let commanded = match step {
                Step::Duty { channel, duty, .. } => active.command_duty(*channel, *duty),
                Step::Velocity { channel, speed, .. } => active.command_velocity(*channel, *speed),
                Step::Hold { .. } => Ok(()),
            };
            if let Err(e) = commanded {
                return Outcome::Failed(e);
            }

            let duration = step.duration();
            let samples = sample_count(duration, self.sample_interval);
            for k in 0..samples {
                let at = self.sample_interval * k;
                let snapshot = match Telemetry::sample(active, step.sample()) {
                    Ok(s) => s,
                    Err(e) => return Outcome::Failed(e),
                };
                summary.record(&snapshot);
                progress.sampled(index, &snapshot);
                self.trace.push(TraceRow {
                    step: index,
                    offset_ms: (offset + at).as_millis() as u64,
                    fields: snapshot.fields.clone(),
                });

                let elapsed = clock.elapsed(active);
                if let Some(limit) = limits.first_sample_breach(&snapshot, elapsed) {
                    return Outcome::Breach(*limit);
                }

                let next = (self.sample_interval * (k + 1)).min(duration);
                active.delay(next.saturating_sub(at));
            }
            offset += duration;
        }
        Outcome::Completed
    }
}

/// `max(1, ceil(duration / interval))`
fn sample_count(duration: Duration, interval: Duration) -> u32 {
    let interval = interval.as_micros().max(1);
    let n = duration.as_micros().div_ceil(interval);
    u32::try_from(n).unwrap_or(u32::MAX).max(1)
}

fn failure(builder: TestReportBuilder, error: Error, summary: Summary) -> RunFailure<TestReport> {
    let report = builder
        .aborted(error.code(), error.code())
        .summary(summary.finish())
        .error(&error)
        .build();
    RunFailure { error, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Channel;
    use crate::error::ErrorKind;
    use crate::recipe::RecipeBook;
    use crate::telemetry::FieldValue;
    use crate::testing::ScriptedTransport;

    fn connected() -> (Session, ScriptedTransport) {
        let transport = ScriptedTransport::new();
        let session = Session::new(transport.clone(), 0x80);
        session.connect("/dev/ttyACM0").unwrap();
        (session, transport)
    }

    fn smoke() -> Recipe {
        RecipeBook::builtin().resolve("smoke_v1").unwrap().clone()
    }

    #[test]
    fn test_smoke_v1_completes() {
        let (session, transport) = connected();
        let mut tester = Tester::new(&session);
        let report = tester.run(&smoke()).unwrap();

        assert!(report.passed);
        assert_eq!(report.reason, "completed");
        assert_eq!(report.abort_reason, None);
        assert!(report.telemetry_summary.contains_key("encoder1"));

        let s = transport.script();
        assert_eq!(s.count("stop"), 1);
        assert_eq!(s.count("duty M1 20"), 1);
        assert_eq!(s.count("duty M1 -20"), 1);
        // 200 ms at 50 ms cadence: four samples per step
        assert_eq!(tester.trace().len(), 8);
        assert_eq!(tester.trace()[5].offset_ms, 250);
        assert_eq!(s.log.last().map(String::as_str), Some("stop"));
    }

    #[test]
    fn test_step_delays_sum_to_duration() {
        let (session, transport) = connected();
        let mut tester = Tester::new(&session).with_sample_interval(Duration::from_millis(75));
        tester.run(&smoke()).unwrap();

        let s = transport.script();
        let total: u64 = s
            .log
            .iter()
            .filter_map(|l| l.strip_prefix("delay "))
            .map(|ms| ms.parse::<u64>().unwrap())
            .sum();
        assert_eq!(total, 400);
        assert_eq!(tester.trace().len(), 6);
    }

    #[test]
    fn test_current_breach_aborts_and_stops() {
        let (session, transport) = connected();
        transport
            .script()
            .fields
            .insert("motor1_current".into(), FieldValue::Float(7.5));

        let mut tester = Tester::new(&session);
        let report = tester.run(&smoke()).unwrap();
        assert!(!report.passed);
        assert_eq!(report.reason, "safety_abort");
        assert_eq!(report.abort_reason.as_deref(), Some("max_current_exceeded"));

        let s = transport.script();
        assert_eq!(s.count("stop"), 1);
        // Aborted on the first sample, so the second step never ran
        assert_eq!(s.count("duty M1 -20"), 0);
        assert_eq!(tester.trace().len(), 1);
    }

    #[test]
    fn test_mode_mismatch_never_commands_motion() {
        let (session, transport) = connected();
        transport.script().motion = false;

        let failure = Tester::new(&session).run(&smoke()).unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::ModeMismatch);
        assert_eq!(failure.report.reason, "mode_mismatch");
        assert!(!failure.report.passed);

        let s = transport.script();
        assert_eq!(s.count("duty"), 0);
        assert_eq!(s.count("velocity"), 0);
        assert_eq!(s.count("stop"), 1);
    }

    #[test]
    fn test_transport_error_aborts_with_code() {
        let (session, transport) = connected();
        transport
            .script()
            .fail("read_telemetry_field", 3, Error::timeout("read_telemetry_field"));

        let failure = Tester::new(&session).run(&smoke()).unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Timeout);
        assert_eq!(failure.report.reason, "timeout");
        assert_eq!(failure.report.abort_reason.as_deref(), Some("timeout"));
        assert_eq!(failure.report.error.as_ref().unwrap().code, "timeout");
        assert_eq!(transport.script().count("stop"), 1);
    }

    #[test]
    fn test_commanded_duty_over_limit_is_never_sent() {
        let (session, transport) = connected();
        let recipe = Recipe::new(
            "hot",
            vec![Step::Duty {
                channel: Channel::M2,
                duty: 40,
                duration_ms: 100,
                sample: vec!["encoder1".into()],
            }],
            vec![SafetyLimit::MaxCurrent(5.0), SafetyLimit::MaxDuty(20)],
        )
        .unwrap();

        let report = Tester::new(&session).run(&recipe).unwrap();
        assert_eq!(report.abort_reason.as_deref(), Some("max_duty_exceeded"));
        let s = transport.script();
        assert_eq!(s.count("duty"), 0);
        assert_eq!(s.count("stop"), 1);
    }

    #[test]
    fn test_runtime_limit_follows_device_clock() {
        let (session, transport) = connected();
        {
            let mut s = transport.script();
            s.clock = Some(Duration::ZERO);
            s.latency = Duration::from_millis(100);
        }
        let recipe = Recipe::new(
            "slow_link",
            vec![Step::Duty {
                channel: Channel::M1,
                duty: 10,
                duration_ms: 200,
                sample: vec!["encoder1".into()],
            }],
            vec![SafetyLimit::MaxRuntime(0.25)],
        )
        .unwrap();

        let mut tester = Tester::new(&session);
        let report = tester.run(&recipe).unwrap();
        assert!(!report.passed);
        assert_eq!(report.abort_reason.as_deref(), Some("max_runtime_s_exceeded"));
        // Duty plus first read reach 200 ms; the second read lands at 350 ms
        assert_eq!(tester.trace().len(), 2);
        assert_eq!(transport.script().count("stop"), 1);
    }

    #[test]
    fn test_velocity_over_limit_stops_after_earlier_motion() {
        let (session, transport) = connected();
        let recipe = Recipe::new(
            "sweep",
            vec![
                Step::Duty {
                    channel: Channel::M1,
                    duty: 10,
                    duration_ms: 100,
                    sample: vec!["encoder1".into()],
                },
                Step::Velocity {
                    channel: Channel::M2,
                    speed: -1500,
                    duration_ms: 100,
                    sample: vec!["encoder1".into()],
                },
            ],
            vec![SafetyLimit::MaxVelocity(1000)],
        )
        .unwrap();

        let report = Tester::new(&session).run(&recipe).unwrap();
        assert!(!report.passed);
        assert_eq!(report.reason, "safety_abort");
        assert_eq!(report.abort_reason.as_deref(), Some("max_velocity_exceeded"));
        let s = transport.script();
        assert_eq!(s.count("duty M1 10"), 1);
        assert_eq!(s.count("velocity"), 0);
        assert_eq!(s.count("stop"), 1);
        assert_eq!(s.log.last().map(String::as_str), Some("stop"));
    }

    #[test]
    fn test_hold_step_samples_without_motion() {
        let (session, transport) = connected();
        let recipe = Recipe::new(
            "idle",
            vec![Step::Hold {
                duration_ms: 10,
                sample: vec!["battery_voltage".into(), "temperature".into()],
            }],
            vec![],
        )
        .unwrap();

        let report = Tester::new(&session).run(&recipe).unwrap();
        assert!(report.passed);
        let json = serde_json::to_value(&report.telemetry_summary).unwrap();
        assert_eq!(json["temperature"], serde_json::json!({"unsupported": true}));
        assert_eq!(transport.script().count("duty"), 0);
    }

    #[test]
    fn test_busy_session_is_rejected_without_stop() {
        let (session, transport) = connected();
        let _held = session.begin("flash").unwrap();
        let failure = Tester::new(&session).run(&smoke()).unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Busy);
        assert_eq!(failure.report.reason, "busy");
        assert_eq!(transport.script().count("stop"), 0);
    }

    #[test]
    fn test_sample_count() {
        let ms = Duration::from_millis;
        assert_eq!(sample_count(ms(200), ms(50)), 4);
        assert_eq!(sample_count(ms(201), ms(50)), 5);
        assert_eq!(sample_count(ms(10), ms(50)), 1);
    }
}
