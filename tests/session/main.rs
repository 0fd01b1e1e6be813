mod common;

mod breakpoints;
mod protocol;
mod steps;
mod variables;

use crate::common::{run_program, Controller, FakeFrame, Op};
use rdbg::config::EngineConfig;
use rdbg::debugger::thread::ThreadRef;
use rdbg::protocol::CommandId;
use serial_test::serial;
use std::sync::Arc;

const MAIN_PY: &str = "/app/main.py";

#[test]
#[serial]
fn test_session_handshake() {
    let (mut controller, session) = Controller::start(EngineConfig::default());

    let version = controller.request(CommandId::Version, &["1.1", "UNIX", "ID"]);
    assert_eq!(version.id, CommandId::Version.code());
    assert_eq!(version.seq, 1);
    assert_eq!(version.payload, "1.1");

    controller.send(CommandId::ThreadKill, &["*"]);
    assert!(controller.drain().is_empty());
    assert!(session.is_finished());
}

#[test]
#[serial]
fn test_session_termination_releases_suspended_thread() {
    let (mut controller, session) = Controller::start(EngineConfig::default());
    controller.send(CommandId::SetBreak, &["1", "line", MAIN_PY, "2", "", "", ""]);
    controller.send(CommandId::Run, &[]);

    let main = Arc::new(FakeFrame::new("main", MAIN_PY));
    let program = run_program(
        &session,
        ThreadRef::new("t1", "MainThread"),
        vec![
            Op::Call(main.clone()),
            Op::Line(main.clone(), 1),
            Op::Line(main.clone(), 2),
            Op::Line(main.clone(), 3),
            Op::Return(main.clone()),
        ],
    );

    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert!(suspend.payload.contains("stop_reason=\"111\""));

    controller.send(CommandId::ThreadKill, &["*"]);
    program.join().unwrap();
    assert!(session.is_finished());

    // events after termination are ignored
    main.set_line(2);
    assert!(!session.on_event(
        &ThreadRef::new("t1", "MainThread"),
        rdbg::debugger::TraceEvent::line(main)
    ));
}

#[test]
#[serial]
fn test_controller_disconnect_finishes_session() {
    let (controller, session) = Controller::start(EngineConfig::default());
    drop(controller);

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while !session.is_finished() {
        assert!(std::time::Instant::now() < deadline, "session still alive");
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert!(!session.wait_for_run());
}
