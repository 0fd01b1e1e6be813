use crate::common::{Controller, FakeFrame};
use crate::MAIN_PY;
use rdbg::config::EngineConfig;
use rdbg::debugger::breakpoint::ExceptionInfo;
use rdbg::debugger::thread::ThreadRef;
use rdbg::debugger::TraceEvent;
use rdbg::protocol::CommandId;
use serial_test::serial;
use std::sync::Arc;

#[test]
#[serial]
fn test_request_errors_echo_sequence() {
    let (mut controller, session) = Controller::start(EngineConfig::default());

    controller.send_raw(501, 4, "1.1");
    let msg = controller.recv().unwrap();
    assert_eq!((msg.id, msg.seq), (CommandId::Error.code(), 4));

    controller.send_raw(777, 5, "");
    let msg = controller.recv().unwrap();
    assert_eq!((msg.id, msg.seq), (CommandId::Error.code(), 5));
    assert_eq!(msg.payload, "unknown command id 777");

    let version = controller.request(CommandId::Version, &["1.1"]);
    assert_eq!(version.payload, "1.1");

    let msg = controller.request(CommandId::StepOver, &["ghost"]);
    assert_eq!(msg.id, CommandId::Error.code());
    assert_eq!(msg.payload, "thread ghost not found");

    session.finish();
    assert!(controller.drain().is_empty());
}

#[test]
#[serial]
fn test_exception_breakpoint() {
    let (mut controller, session) = Controller::start(EngineConfig::default());
    controller.send(CommandId::SetPyException, &["false", "true", "LookupError"]);
    controller.send(CommandId::Run, &[]);

    let thread = ThreadRef::new("t1", "MainThread");
    let main = Arc::new(FakeFrame::new("main", MAIN_PY));
    main.set_line(7);
    let program = {
        let session = session.clone();
        let main = main.clone();
        std::thread::spawn(move || {
            session.wait_for_run();
            // caught exceptions are not reported without notify_always
            session.on_event(
                &thread,
                TraceEvent::exception(
                    main.clone(),
                    ExceptionInfo {
                        type_name: "KeyError".to_string(),
                        ancestors: vec!["LookupError".to_string(), "Exception".to_string()],
                        message: "'missing'".to_string(),
                        unhandled: false,
                    },
                ),
            );
            session.on_event(
                &thread,
                TraceEvent::exception(
                    main,
                    ExceptionInfo {
                        type_name: "KeyError".to_string(),
                        ancestors: vec!["LookupError".to_string(), "Exception".to_string()],
                        message: "'missing'".to_string(),
                        unhandled: true,
                    },
                ),
            );
        })
    };

    let trace = controller.wait_for(CommandId::SendCurrExceptionTrace);
    let fields = trace.fields();
    assert_eq!(fields[1], "KeyError");
    assert_eq!(fields[2], "'missing'");
    assert!(fields[3].contains("stop_reason=\"122\""));

    let suspend = controller.wait_for(CommandId::ThreadSuspend);
    assert!(suspend.payload.contains("stop_reason=\"122\""));
    assert!(suspend.payload.contains("line=\"7\""));

    let current = controller.request(CommandId::SendCurrExceptionTrace, &["t1"]);
    assert_eq!(current.id, CommandId::SendCurrExceptionTrace.code());
    assert_eq!(current.fields()[0], "KeyError");

    controller.send(CommandId::ThreadRun, &["t1"]);
    let proceeded = controller.wait_for(CommandId::SendCurrExceptionTraceProceeded);
    assert_eq!(proceeded.payload, "t1");
    program.join().unwrap();
    session.finish();
}

#[test]
#[serial]
fn test_console_output_and_wire_trace() {
    let trace_file = std::env::temp_dir().join(format!("rdbg-wire-{}.log", std::process::id()));
    _ = std::fs::remove_file(&trace_file);
    let config = EngineConfig {
        max_io_message: 5,
        wire_trace_file: Some(trace_file.clone()),
        ..EngineConfig::default()
    };
    let (mut controller, session) = Controller::start(config);

    session.write_to_console("hello world", 2);
    let output = controller.wait_for(CommandId::WriteToConsole);
    assert_eq!(output.payload, "<xml><io s=\"hello...\" ctx=\"2\"/></xml>");

    controller.request(CommandId::Version, &["1.1"]);
    session.finish();
    controller.drain();

    let trace = std::fs::read_to_string(&trace_file).unwrap();
    assert!(trace.lines().any(|l| l.starts_with("<- 501\t1\t")));
    assert!(trace.lines().any(|l| l == "-> 501\t1\t1.1"));
    _ = std::fs::remove_file(&trace_file);
}
