use crate::common::{run_program, Controller, FakeFrame, Op};
use crate::MAIN_PY;
use rdbg::config::EngineConfig;
use rdbg::debugger::thread::ThreadRef;
use rdbg::debugger::variable::render::ReprOptions;
use rdbg::debugger::variable::resolver::Resolver;
use rdbg::debugger::variable::{TypeIdentity, Value};
use rdbg::debugger::{Error, Session};
use rdbg::protocol::CommandId;
use serial_test::serial;
use std::sync::Arc;

/// Start a program suspended at line 2 of `main`.
fn suspended(
    controller: &mut Controller,
    session: &Session,
    main: &Arc<FakeFrame>,
) -> std::thread::JoinHandle<()> {
    controller.send(CommandId::SetBreak, &["1", "line", MAIN_PY, "2", "", "", ""]);
    controller.send(CommandId::Run, &[]);
    let program = run_program(
        session,
        ThreadRef::new("t1", "MainThread"),
        vec![
            Op::Call(main.clone()),
            Op::Line(main.clone(), 1),
            Op::Line(main.clone(), 2),
            Op::Return(main.clone()),
        ],
    );
    controller.wait_for(CommandId::ThreadSuspend);
    program
}

fn resume(controller: &mut Controller, session: Session, program: std::thread::JoinHandle<()>) {
    controller.send(CommandId::ThreadRun, &["t1"]);
    controller.wait_for(CommandId::ThreadKill);
    program.join().unwrap();
    session.finish();
}

fn count(payload: &str, pattern: &str) -> usize {
    payload.matches(pattern).count()
}

#[test]
#[serial]
fn test_large_list_children() {
    let (mut controller, session) = Controller::start(EngineConfig::default());
    let items = Value::list((0..350).map(Value::Int).collect());
    let main = Arc::new(FakeFrame::new("main", MAIN_PY).with_local("items", items));
    let program = suspended(&mut controller, &session, &main);

    let frame = controller.request(CommandId::GetFrame, &["t1", "*"]);
    assert_eq!(frame.id, CommandId::GetFrame.code());
    assert!(frame
        .payload
        .contains("<var name=\"items\" type=\"list\" value=\"list: [0, 1, 2, "));
    assert!(frame.payload.contains("isContainer=\"True\""));

    let children = controller.request(CommandId::GetVariable, &["t1", "*", "FRAME", "items"]);
    assert_eq!(children.id, CommandId::GetVariable.code());
    // 350 items and a length pseudo child
    assert_eq!(count(&children.payload, "<var "), 351);
    assert!(children
        .payload
        .contains("<var name=\"349\" type=\"int\" value=\"int: 349\" />"));
    assert!(children
        .payload
        .contains("<var name=\"__len__\" type=\"int\" value=\"int: 350\" />"));

    let single = controller.request(CommandId::GetVariable, &["t1", "*", "FRAME", "items\t__len__"]);
    assert_eq!(count(&single.payload, "<var "), 0);

    resume(&mut controller, session, program);
}

#[test]
#[serial]
fn test_nested_and_cyclic_values() {
    let (mut controller, session) = Controller::start(EngineConfig::default());
    let cyclic = Value::list(vec![Value::Int(1)]);
    if let Value::List(items) = &cyclic {
        items.write().unwrap().push(cyclic.clone());
    }
    let user = Value::object(
        TypeIdentity::new("app.models", "User"),
        vec![
            ("name".to_string(), Value::str("bob\t<admin>")),
            (
                "roles".to_string(),
                Value::dict(vec![(Value::str("db"), Value::str("rw"))]),
            ),
        ],
    );
    let main = Arc::new(
        FakeFrame::new("main", MAIN_PY)
            .with_local("cyclic", cyclic)
            .with_local("user", user)
            .with_global("DEBUG", Value::Bool(true)),
    );
    let program = suspended(&mut controller, &session, &main);

    let frame = controller.request(CommandId::GetFrame, &["t1", "*"]);
    assert!(frame.payload.contains("value=\"list: [1, [...]]\""), "{}", frame.payload);
    assert!(frame
        .payload
        .contains("<var name=\"user\" type=\"User\" qualifier=\"app.models\""));

    let roles = controller.request(
        CommandId::GetVariable,
        &["t1", "*", "FRAME", "user", "roles"],
    );
    assert!(roles.payload.contains("<var name=\"&apos;db&apos;\" type=\"str\""), "{}", roles.payload);

    let name = controller.request(CommandId::GetVariable, &["t1", "*", "FRAME", "user"]);
    assert!(name
        .payload
        .contains("value=\"str: &apos;bob\\t&lt;admin&gt;&apos;\""), "{}", name.payload);

    let globals = controller.request(CommandId::GetVariable, &["t1", "*", "GLOBAL"]);
    assert!(globals.payload.contains("<var name=\"DEBUG\" type=\"bool\" value=\"bool: True\" />"));

    let missing = controller.request(CommandId::GetVariable, &["t1", "*", "FRAME", "nope"]);
    assert_eq!(missing.id, CommandId::Error.code());

    resume(&mut controller, session, program);
}

#[test]
#[serial]
fn test_change_variable_and_completions() {
    let (mut controller, session) = Controller::start(EngineConfig::default());
    let main = Arc::new(
        FakeFrame::new("main", MAIN_PY)
            .with_local("x", Value::Int(1))
            .with_local("xs", Value::list(vec![Value::Int(1), Value::Int(2)])),
    );
    let program = suspended(&mut controller, &session, &main);

    let changed = controller.request(CommandId::ChangeVariable, &["t1", "*", "x", "x + 41"]);
    assert_eq!(changed.id, CommandId::Return.code());
    assert!(changed.payload.contains("value=\"int: 42\""));
    assert!(main.local("x").unwrap().equals(&Value::Int(42)));

    let changed = controller.request(CommandId::ChangeVariable, &["t1", "*", "xs\t1", "'two'"]);
    assert_eq!(changed.id, CommandId::Return.code());
    assert_eq!(format!("{:?}", main.local("xs").unwrap()), "[1, 'two']");

    let completions = controller.request(CommandId::GetCompletions, &["t1", "*", "x"]);
    assert_eq!(completions.id, CommandId::GetCompletions.code());
    assert_eq!(
        completions.payload,
        "<xml><comp p0=\"x\" p1=\"\" p2=\"\" p3=\"11\" /><comp p0=\"xs\" p1=\"\" p2=\"\" p3=\"11\" /></xml>"
    );

    let error = controller.request(CommandId::EvaluateExpression, &["t1", "*", "x +"]);
    assert_eq!(error.id, CommandId::Error.code());

    resume(&mut controller, session, program);
}

struct MoneyResolver;

impl Resolver for MoneyResolver {
    fn name(&self) -> &'static str {
        "money"
    }

    fn is_container(&self) -> bool {
        false
    }

    fn children(&self, _: &Value) -> Result<Vec<(String, Value)>, Error> {
        Ok(vec![])
    }

    fn repr(&self, value: &Value, _: &ReprOptions) -> Result<String, Error> {
        let Value::Object(obj) = value else {
            return Err(Error::Resolver(self.name(), "not money".to_string()));
        };
        match obj.get_attr("cents") {
            Some(Value::Int(cents)) => Ok(format!("${}.{:02}", cents / 100, cents % 100)),
            _ => Err(Error::Resolver(self.name(), "no cents".to_string())),
        }
    }
}

#[test]
#[serial]
fn test_user_resolver() {
    let money_type = TypeIdentity::new("billing", "Money");
    let builder = Session::builder().with_resolver(
        |value| value.type_identity() == TypeIdentity::new("billing", "Money"),
        MoneyResolver,
    );
    let (mut controller, session) = Controller::start_with(builder);

    let main = Arc::new(
        FakeFrame::new("main", MAIN_PY)
            .with_local(
                "price",
                Value::object(money_type.clone(), vec![("cents".to_string(), Value::Int(1999))]),
            )
            .with_local("broken", Value::object(money_type, vec![])),
    );
    let program = suspended(&mut controller, &session, &main);

    let frame = controller.request(CommandId::GetFrame, &["t1", "*"]);
    assert!(frame.payload.contains(
        "<var name=\"price\" type=\"Money\" qualifier=\"billing\" value=\"Money: $19.99\" />"
    ), "{}", frame.payload);
    assert!(frame
        .payload
        .contains("value=\"Unable to get repr for billing.Money\""));

    resume(&mut controller, session, program);
}
