//! End-to-end workflows against the in-memory controller

use motionflash_core::report::{render, FieldSummary, NvmResult, VerificationResult};
use std::time::Duration;

use motionflash_core::{
    Channel, ConfigDocument, ConfigKey, ConfigPayload, Error, ErrorKind, FieldValue, FlashOptions,
    Flasher, ParamValue, Reading, Recipe, RecipeBook, SafetyLimit, Session, Step, Telemetry, Tester,
};
use motionflash_dummy::{Command, DummyConfig, DummyController, DummyProbe, Op};

const PORT: &str = "/dev/ttyACM0";

fn connected(config: DummyConfig) -> (Session, DummyProbe) {
    let dummy = DummyController::new(config);
    let probe = dummy.probe();
    let session = Session::new(dummy, 0x80);
    session.connect(PORT).unwrap();
    (session, probe)
}

fn duty_config() -> ConfigPayload {
    ConfigPayload::from_json_str(
        r#"{"schema_version": "v1", "parameters": {"mode": "duty", "max_current": 10}}"#,
    )
    .unwrap()
}

#[test]
fn flash_with_verification_passes() {
    let (session, probe) = connected(DummyConfig::default());

    let report = Flasher::new(&session)
        .flash(&duty_config(), FlashOptions::verified())
        .unwrap();

    assert_eq!(report.write_nvm_result, NvmResult::Ok);
    assert_eq!(report.verification_result, VerificationResult::Pass);
    assert_eq!(report.port, PORT);
    assert_eq!(report.address, 0x80);
    assert_eq!(report.firmware, "USB Roboclaw 2x15a v4.2.8");
    assert_eq!(
        probe.nvm().get(&ConfigKey::Mode),
        Some(&ParamValue::Text("duty".into()))
    );
    assert_eq!(probe.count(|c| matches!(c, Command::ReloadNvm)), 1);
}

#[test]
fn flash_reports_drifted_parameter() {
    let (session, probe) = connected(DummyConfig::default());
    probe.drift(ConfigKey::MaxCurrent, ParamValue::Integer(8));

    let report = Flasher::new(&session)
        .flash(&duty_config(), FlashOptions::verified())
        .unwrap();
    assert_eq!(report.write_nvm_result, NvmResult::Ok);
    assert_eq!(report.verification_result, VerificationResult::Mismatch);
    assert_eq!(report.mismatched_parameters, ["max_current"]);

    let failure = Flasher::new(&session)
        .flash(&duty_config(), FlashOptions::strict())
        .unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::VerificationMismatch);
    assert_eq!(failure.report.write_nvm_result, NvmResult::Ok);
}

#[test]
fn failed_apply_never_persists() {
    let (session, probe) = connected(DummyConfig::default());
    probe.inject(Op::WriteParameter, 3, Error::NoResponse("unplugged".into()));

    let failure = Flasher::new(&session)
        .flash(&duty_config(), FlashOptions::verified())
        .unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::NoResponse);
    assert_eq!(failure.report.write_nvm_result, NvmResult::Skipped);
    assert_eq!(failure.report.verification_result, VerificationResult::Skipped);
    assert_eq!(failure.report.error.as_ref().unwrap().code, "no_response");
    assert_eq!(probe.count(|c| matches!(c, Command::PersistNvm(_))), 0);
}

#[test]
fn dump_then_flash_twice_keeps_hash() {
    let (session, _probe) = connected(DummyConfig::default());

    let parameters = session.read_parameters().unwrap();
    let dumped = ConfigPayload::from_parameters(parameters).unwrap();
    let document = ConfigDocument::new(
        &session.target().unwrap(),
        &session.get_firmware().unwrap(),
        &dumped,
    )
    .unwrap();
    let text = render(&document).unwrap();

    let reloaded = ConfigPayload::from_json_str(&text).unwrap();
    let first = Flasher::new(&session)
        .flash(&reloaded, FlashOptions::verified())
        .unwrap();
    let second = Flasher::new(&session)
        .flash(&reloaded, FlashOptions::verified())
        .unwrap();

    assert_eq!(first.config_hash, second.config_hash);
    assert_eq!(first.config_hash, document.config_hash);
    assert_eq!(second.verification_result, VerificationResult::Pass);
}

#[test]
fn smoke_test_passes_on_healthy_controller() {
    let (session, probe) = connected(DummyConfig::default());
    let book = RecipeBook::builtin();

    let mut tester = Tester::new(&session);
    let report = tester.run(book.resolve("smoke_v1").unwrap()).unwrap();

    assert!(report.passed);
    assert_eq!(report.reason, "completed");
    assert_eq!(report.abort_reason, None);
    assert_eq!(probe.stop_count(), 1);
    assert_eq!(probe.motion_count(), 2);
    // Two 200 ms steps sampled every 50 ms
    assert_eq!(tester.trace().len(), 8);
    match &report.telemetry_summary["motor1_current"] {
        FieldSummary::Numeric { max, samples, .. } => {
            assert_eq!(*max, 1.0);
            assert_eq!(*samples, 8);
        }
        other => panic!("unexpected summary {:?}", other),
    }
    assert!(!probe.commands().last().unwrap().is_motion());
}

#[test]
fn smoke_test_aborts_on_overcurrent() {
    let (session, probe) = connected(DummyConfig {
        amps_per_duty: 0.5,
        ..Default::default()
    });

    let report = Tester::new(&session)
        .run(RecipeBook::builtin().resolve("smoke_v1").unwrap())
        .unwrap();

    assert!(!report.passed);
    assert_eq!(report.reason, "safety_abort");
    assert_eq!(report.abort_reason.as_deref(), Some("max_current_exceeded"));
    assert_eq!(probe.stop_count(), 1);
    // The second step is never commanded
    assert_eq!(probe.motion_count(), 1);
}

#[test]
fn slow_link_trips_runtime_limit() {
    let (session, probe) = connected(DummyConfig {
        command_latency: Duration::from_millis(100),
        ..Default::default()
    });
    let recipe = Recipe::new(
        "creep_v1",
        vec![Step::Duty {
            channel: Channel::M1,
            duty: 10,
            duration_ms: 200,
            sample: vec!["motor1_current".into()],
        }],
        vec![SafetyLimit::MaxRuntime(0.25)],
    )
    .unwrap();

    let mut tester = Tester::new(&session);
    let report = tester.run(&recipe).unwrap();

    assert!(!report.passed);
    assert_eq!(report.reason, "safety_abort");
    assert_eq!(report.abort_reason.as_deref(), Some("max_runtime_s_exceeded"));
    assert_eq!(tester.trace().len(), 2);
    assert_eq!(probe.motion_count(), 1);
    assert_eq!(probe.stop_count(), 1);
    assert!(!probe.commands().last().unwrap().is_motion());
}

#[test]
fn velocity_over_limit_is_never_commanded() {
    let (session, probe) = connected(DummyConfig::default());
    let recipe = Recipe::new(
        "sweep_v1",
        vec![
            Step::Duty {
                channel: Channel::M1,
                duty: 10,
                duration_ms: 100,
                sample: vec!["encoder1".into()],
            },
            Step::Velocity {
                channel: Channel::M2,
                speed: 1500,
                duration_ms: 100,
                sample: vec!["speed2".into()],
            },
        ],
        vec![SafetyLimit::MaxVelocity(1000)],
    )
    .unwrap();

    let report = Tester::new(&session).run(&recipe).unwrap();

    assert!(!report.passed);
    assert_eq!(report.reason, "safety_abort");
    assert_eq!(report.abort_reason.as_deref(), Some("max_velocity_exceeded"));
    assert_eq!(probe.motion_count(), 1);
    assert_eq!(probe.count(|c| matches!(c, Command::Velocity(..))), 0);
    assert_eq!(probe.stop_count(), 1);
}

#[test]
fn smoke_test_refuses_without_motion_mode() {
    let (session, probe) = connected(DummyConfig {
        motion_enabled: false,
        ..Default::default()
    });

    let failure = Tester::new(&session)
        .run(RecipeBook::builtin().resolve("smoke_v1").unwrap())
        .unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::ModeMismatch);
    assert_eq!(failure.report.reason, "mode_mismatch");
    assert_eq!(probe.motion_count(), 0);
    assert_eq!(probe.stop_count(), 1);
}

#[test]
fn smoke_test_stops_after_transport_failure() {
    let (session, probe) = connected(DummyConfig::default());
    probe.inject(Op::ReadField, 3, Error::timeout("read_telemetry_field"));

    let failure = Tester::new(&session)
        .run(RecipeBook::builtin().resolve("smoke_v1").unwrap())
        .unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::Timeout);
    assert!(!failure.report.passed);
    assert_eq!(failure.report.reason, "timeout");
    assert_eq!(failure.report.abort_reason.as_deref(), Some("timeout"));
    assert_eq!(probe.stop_count(), 1);
}

#[test]
fn poll_marks_missing_field_unsupported() {
    let (session, _probe) = connected(DummyConfig::default());

    let snapshot = Telemetry::new(&session)
        .poll(&["encoder1", "nonexistent_field"])
        .unwrap();

    assert_eq!(
        snapshot.get("encoder1"),
        Some(&Reading::Value(FieldValue::Integer(0)))
    );
    assert_eq!(snapshot.get("nonexistent_field"), Some(&Reading::Unsupported));
}

#[test]
fn disconnected_session_rejects_work() {
    let session = Session::new(DummyController::new_default(), 0x80);
    assert_eq!(
        session.get_firmware().unwrap_err().kind(),
        ErrorKind::NotConnected
    );

    let failure = Tester::new(&session)
        .run(RecipeBook::builtin().resolve("smoke_v1").unwrap())
        .unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::NotConnected);

    // disconnect is idempotent
    session.disconnect();
    session.disconnect();
}
