use crate::common::{run_program, Controller, FakeFrame, Op};
use crate::MAIN_PY;
use rdbg::config::EngineConfig;
use rdbg::debugger::thread::ThreadRef;
use rdbg::protocol::CommandId;
use serial_test::serial;
use std::sync::Arc;

const UTIL_PY: &str = "/app/util.py";

/// `main` calls `helper` from line 2.
fn call_program(main: &Arc<FakeFrame>, helper: &Arc<FakeFrame>) -> Vec<Op> {
    vec![
        Op::Call(main.clone()),
        Op::Line(main.clone(), 1),
        Op::Line(main.clone(), 2),
        Op::Call(helper.clone()),
        Op::Line(helper.clone(), 10),
        Op::Line(helper.clone(), 11),
        Op::Return(helper.clone()),
        Op::Line(main.clone(), 3),
        Op::Line(main.clone(), 4),
        Op::Return(main.clone()),
    ]
}

fn frames() -> (Arc<FakeFrame>, Arc<FakeFrame>) {
    let main = Arc::new(FakeFrame::new("main", MAIN_PY));
    let helper = Arc::new(FakeFrame::new("helper", UTIL_PY).with_parent(main.clone()));
    (main, helper)
}

/// Line and function of the top frame of a THREAD_SUSPEND payload.
fn top_location(payload: &str) -> (String, String) {
    let frame = &payload[payload.find("<frame").unwrap()..];
    let attr = |name: &str| {
        let start = frame.find(&format!(" {name}=\"")).unwrap() + name.len() + 3;
        let end = start + frame[start..].find('"').unwrap();
        frame[start..end].to_string()
    };
    (attr("line"), attr("name"))
}

fn start(bp_line: &str) -> (Controller, rdbg::debugger::Session) {
    let (mut controller, session) = Controller::start(EngineConfig::default());
    controller.send(CommandId::SetBreak, &["1", "line", MAIN_PY, bp_line, "", "", ""]);
    controller.send(CommandId::Run, &[]);
    (controller, session)
}

#[test]
#[serial]
fn test_step_over() {
    let (mut controller, session) = start("2");
    let (main, helper) = frames();
    let program = run_program(
        &session,
        ThreadRef::new("t1", "MainThread"),
        call_program(&main, &helper),
    );

    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert_eq!(top_location(&suspend.payload), ("2".to_string(), "main".to_string()));

    controller.send(CommandId::StepOver, &["t1"]);
    let run = controller.wait_for(CommandId::ThreadRun);
    assert_eq!(run.fields(), vec!["t1", "108"]);

    // helper lines are passed, stop at the next line of main
    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert!(suspend.payload.contains("stop_reason=\"108\""));
    assert_eq!(top_location(&suspend.payload), ("3".to_string(), "main".to_string()));

    controller.send(CommandId::ThreadRun, &["t1"]);
    controller.wait_for(CommandId::ThreadKill);
    program.join().unwrap();
    session.finish();
}

#[test]
#[serial]
fn test_step_over_stops_at_breakpoint_in_callee() {
    let (mut controller, session) = start("2");
    controller.send(CommandId::SetBreak, &["2", "line", UTIL_PY, "10", "", "", ""]);
    let (main, helper) = frames();
    let program = run_program(
        &session,
        ThreadRef::new("t1", "MainThread"),
        call_program(&main, &helper),
    );

    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert_eq!(top_location(&suspend.payload), ("2".to_string(), "main".to_string()));

    // a breakpoint in a deeper frame wins over the step
    controller.send(CommandId::StepOver, &["t1"]);
    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert!(suspend.payload.contains("stop_reason=\"111\""));
    assert_eq!(top_location(&suspend.payload), ("10".to_string(), "helper".to_string()));

    controller.send(CommandId::ThreadRun, &["t1"]);
    controller.wait_for(CommandId::ThreadKill);
    program.join().unwrap();
    session.finish();
}

#[test]
#[serial]
fn test_step_into_and_return() {
    let (mut controller, session) = start("2");
    let (main, helper) = frames();
    let program = run_program(
        &session,
        ThreadRef::new("t1", "MainThread"),
        call_program(&main, &helper),
    );
    controller.wait_for(CommandId::ThreadSuspend);

    controller.send(CommandId::StepInto, &["t1"]);
    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert!(suspend.payload.contains("stop_reason=\"107\""));
    assert_eq!(top_location(&suspend.payload), ("10".to_string(), "helper".to_string()));

    // step return suspends in the caller when helper returns
    controller.send(CommandId::StepReturn, &["t1"]);
    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert!(suspend.payload.contains("stop_reason=\"109\""));
    assert_eq!(top_location(&suspend.payload).1, "main");

    controller.send(CommandId::ThreadRun, &["t1"]);
    controller.wait_for(CommandId::ThreadKill);
    program.join().unwrap();
    session.finish();
}

#[test]
#[serial]
fn test_run_to_line() {
    let (mut controller, session) = start("1");
    let (main, helper) = frames();
    let program = run_program(
        &session,
        ThreadRef::new("t1", "MainThread"),
        call_program(&main, &helper),
    );
    controller.wait_for(CommandId::ThreadSuspend);

    controller.send(CommandId::RunToLine, &["t1", "11", "helper"]);
    let run = controller.wait_for(CommandId::ThreadRun);
    assert_eq!(run.fields(), vec!["t1", "118"]);
    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert!(suspend.payload.contains("stop_reason=\"118\""));
    assert_eq!(top_location(&suspend.payload), ("11".to_string(), "helper".to_string()));

    controller.send(CommandId::ThreadRun, &["t1"]);
    controller.wait_for(CommandId::ThreadKill);
    program.join().unwrap();
    session.finish();
}

#[test]
#[serial]
fn test_set_next_statement() {
    let (mut controller, session) = start("2");
    let (main, helper) = frames();
    let program = run_program(
        &session,
        ThreadRef::new("t1", "MainThread"),
        call_program(&main, &helper),
    );
    controller.wait_for(CommandId::ThreadSuspend);

    controller.send(CommandId::SetNextStatement, &["t1", "4", ""]);
    let run = controller.wait_for(CommandId::ThreadRun);
    assert_eq!(run.fields(), vec!["t1", "121"]);
    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert!(suspend.payload.contains("stop_reason=\"121\""));
    assert_eq!(top_location(&suspend.payload).0, "4");

    controller.send(CommandId::ThreadRun, &["t1"]);
    controller.wait_for(CommandId::ThreadKill);
    program.join().unwrap();
    session.finish();
}
