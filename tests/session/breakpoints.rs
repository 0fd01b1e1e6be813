use crate::common::{run_program, Controller, FakeFrame, Op};
use crate::MAIN_PY;
use rdbg::config::EngineConfig;
use rdbg::debugger::thread::ThreadRef;
use rdbg::debugger::variable::Value;
use rdbg::protocol::CommandId;
use serial_test::serial;
use std::sync::Arc;

fn program(main: &Arc<FakeFrame>) -> Vec<Op> {
    vec![
        Op::Call(main.clone()),
        Op::Line(main.clone(), 1),
        Op::Line(main.clone(), 2),
        Op::Line(main.clone(), 3),
        Op::Line(main.clone(), 4),
        Op::Return(main.clone()),
    ]
}

#[test]
#[serial]
fn test_breakpoint_hit_and_resume() {
    let (mut controller, session) = Controller::start(EngineConfig::default());
    controller.send(CommandId::SetBreak, &["1", "python-line", MAIN_PY, "3", "None", "None", "None"]);
    controller.send(CommandId::Run, &[]);

    let main = Arc::new(FakeFrame::new("main", MAIN_PY).with_local("x", Value::Int(41)));
    let program = run_program(&session, ThreadRef::new("t1", "MainThread"), program(&main));

    let created = controller.wait_for(CommandId::ThreadCreate);
    assert_eq!(
        created.payload,
        "<xml><thread name=\"MainThread\" id=\"t1\" /></xml>"
    );
    assert_eq!(created.seq % 2, 0);

    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert_eq!(suspend.seq % 2, 0);
    assert!(suspend.payload.starts_with("<xml><thread id=\"t1\" stop_reason=\"111\">"));
    assert!(suspend
        .payload
        .contains(&format!("name=\"main\" file=\"{MAIN_PY}\" line=\"3\"")));

    let eval = controller.request(CommandId::EvaluateExpression, &["t1", "*", "x + 1"]);
    assert_eq!(eval.id, CommandId::EvaluateExpression.code());
    assert!(eval.payload.contains("value=\"int: 42\""), "{}", eval.payload);

    controller.send(CommandId::ThreadRun, &["t1"]);
    let run = controller.wait_for(CommandId::ThreadRun);
    assert_eq!(run.fields(), vec!["t1", "106"]);

    let kill = controller.wait_for(CommandId::ThreadKill);
    assert_eq!(kill.payload, "t1");
    program.join().unwrap();
    session.finish();
}

#[test]
#[serial]
fn test_multiple_breakpoints_at_line() {
    let (mut controller, session) = Controller::start(EngineConfig::default());
    // log point on the same line never suspends
    controller.send(CommandId::SetBreak, &["3", "line", MAIN_PY, "2", "", "x * 2", ""]);
    // first breakpoint condition is false, second one hits
    controller.send(CommandId::SetBreak, &["1", "line", MAIN_PY, "2", "x > 100", "", ""]);
    controller.send(CommandId::SetBreak, &["2", "line", MAIN_PY, "2", "x == 5", "", ""]);
    controller.send(CommandId::Run, &[]);

    let main = Arc::new(FakeFrame::new("main", MAIN_PY).with_local("x", Value::Int(5)));
    let program = run_program(&session, ThreadRef::new("t1", "MainThread"), program(&main));

    let console = controller.wait_for(CommandId::WriteToConsole);
    assert_eq!(console.payload, "<xml><io s=\"10&#10;\" ctx=\"1\"/></xml>");

    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert!(suspend.payload.contains("line=\"2\""));

    controller.send(CommandId::ThreadRun, &["t1"]);
    controller.wait_for(CommandId::ThreadKill);
    program.join().unwrap();
    session.finish();
}

#[test]
#[serial]
fn test_first_hit_skips_later_breakpoints() {
    let (session, outbox) = rdbg::debugger::Session::builder().build_detached();
    let set_break = |seq: i64, fields: &[&str]| {
        session.process_net_command(
            CommandId::SetBreak.code() as u32,
            seq,
            &rdbg::protocol::codec::join_fields(fields),
        );
    };
    set_break(1, &["1", "line", MAIN_PY, "2", "", "", ""]);
    // would report GET_BREAKPOINT_EXCEPTION if evaluated
    set_break(3, &["2", "line", MAIN_PY, "2", "undefined_name > 1", "", ""]);
    set_break(5, &["3", "line", MAIN_PY, "2", "", "x", ""]);
    session.process_net_command(CommandId::Run.code() as u32, 7, "");

    let main = Arc::new(FakeFrame::new("main", MAIN_PY).with_local("x", Value::Int(1)));
    let program = run_program(&session, ThreadRef::new("t1", "MainThread"), program(&main));

    let mut sent = vec![];
    while !sent.contains(&CommandId::ThreadSuspend) {
        let cmd = outbox
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("thread is not suspended");
        sent.push(cmd.id);
    }
    assert_eq!(sent, vec![CommandId::ThreadCreate, CommandId::ThreadSuspend]);

    session.process_net_command(CommandId::ThreadRun.code() as u32, 9, "t1");
    program.join().unwrap();
    let sent: Vec<_> = outbox.drain().into_iter().map(|cmd| cmd.id).collect();
    assert!(!sent.contains(&CommandId::GetBreakpointException));
    assert!(!sent.contains(&CommandId::WriteToConsole));
    session.finish();
}

#[test]
#[serial]
fn test_breakpoint_removal_and_skip_cache() {
    let (session, outbox) = rdbg::debugger::Session::builder().build_detached();
    let thread = ThreadRef::new("t1", "MainThread");
    session.process_net_command(CommandId::Run.code() as u32, 1, "");

    let main = Arc::new(FakeFrame::new("main", MAIN_PY));
    for line in 1..=4 {
        main.set_line(line);
        assert!(!session.on_event(&thread, rdbg::debugger::TraceEvent::line(main.clone())));
    }
    // every line without breakpoints is memoized
    assert_eq!(session.breakpoints().skip_cache().len(), 4);

    session.process_net_command(
        CommandId::SetBreak.code() as u32,
        3,
        &rdbg::protocol::codec::join_fields(&["7", "line", MAIN_PY, "9", "", "", ""]),
    );
    assert!(session.breakpoints().skip_cache().is_empty());

    session.process_net_command(
        CommandId::RemoveBreak.code() as u32,
        5,
        &rdbg::protocol::codec::join_fields(&["7", "line", MAIN_PY]),
    );
    assert!(!session.breakpoints().snapshot().has_breakpoints_in(MAIN_PY));

    let sent: Vec<_> = outbox.drain().into_iter().map(|cmd| cmd.id).collect();
    assert_eq!(sent, vec![CommandId::ThreadCreate]);
}
