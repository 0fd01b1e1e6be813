//! XML payloads of responses and notifications.

use crate::debugger::frame::{stack, Frame};
use crate::debugger::runtime::Completion;
use crate::debugger::thread::{StopReason, ThreadRef};
use crate::debugger::variable::resolver::ResolverRegistry;
use crate::debugger::variable::Value;
use crate::protocol::sourcemap::SourceMap;
use std::borrow::Cow;
use std::fmt::Write;
use std::sync::Arc;

/// Escape a string for use inside an attribute value.
///
/// Whitespace is written as char references, attribute value normalization
/// would turn it into plain spaces otherwise.
pub fn escape(s: &str) -> Cow<'_, str> {
    let escaped = quick_xml::escape::escape(s);
    if !escaped.contains(['\t', '\n', '\r']) {
        return escaped;
    }
    Cow::Owned(
        escaped
            .replace('\t', "&#9;")
            .replace('\n', "&#10;")
            .replace('\r', "&#13;"),
    )
}

fn thread_element(out: &mut String, thread: &ThreadRef) {
    _ = write!(
        out,
        "<thread name=\"{}\" id=\"{}\" />",
        escape(&thread.name),
        escape(thread.id.as_str())
    );
}

/// THREAD_CREATE payload.
pub fn thread_created(thread: &ThreadRef) -> String {
    let mut out = String::from("<xml>");
    thread_element(&mut out, thread);
    out.push_str("</xml>");
    out
}

/// LIST_THREADS response payload.
pub fn thread_list<'a>(threads: impl IntoIterator<Item = &'a ThreadRef>) -> String {
    let mut out = String::from("<xml>");
    for thread in threads {
        thread_element(&mut out, thread);
    }
    out.push_str("</xml>");
    out
}

/// Frames of a stack starting from `top`.
pub fn frames(out: &mut String, top: &Arc<dyn Frame>, source_map: &SourceMap) {
    for frame in stack(top.clone()) {
        let file = source_map.to_client(frame.file());
        _ = write!(
            out,
            "<frame id=\"{}\" name=\"{}\" file=\"{}\" line=\"{}\"></frame>",
            frame.id(),
            escape(frame.function_name()),
            escape(&file),
            frame.line()
        );
    }
}

/// Thread element with a stack, used by THREAD_SUSPEND.
pub fn suspended_thread(
    thread: &ThreadRef,
    reason: StopReason,
    top: &Arc<dyn Frame>,
    source_map: &SourceMap,
) -> String {
    let mut out = String::from("<xml>");
    _ = write!(
        out,
        "<thread id=\"{}\" stop_reason=\"{}\">",
        escape(thread.id.as_str()),
        reason.command_id().code()
    );
    frames(&mut out, top, source_map);
    out.push_str("</thread></xml>");
    out
}

/// Variable element.
pub fn var(out: &mut String, registry: &ResolverRegistry, name: &str, value: &Value, max_repr: usize) {
    let type_identity = value.type_identity();
    let resolver = registry.lookup(value);
    let display = registry.display(value, max_repr);
    _ = write!(
        out,
        "<var name=\"{}\" type=\"{}\"",
        escape(name),
        escape(type_identity.name())
    );
    if let Some(namespace) = type_identity.namespace() {
        _ = write!(out, " qualifier=\"{}\"", escape(namespace));
    }
    _ = write!(out, " value=\"{}\"", escape(&display));
    if resolver.is_container() {
        out.push_str(" isContainer=\"True\"");
    }
    out.push_str(" />");
}

/// List of variables wrapped into `<xml>`.
pub fn vars<S: AsRef<str>>(registry: &ResolverRegistry, vars: &[(S, Value)], max_repr: usize) -> String {
    let mut out = String::from("<xml>");
    for (name, value) in vars {
        var(&mut out, registry, name.as_ref(), value, max_repr);
    }
    out.push_str("</xml>");
    out
}

/// GET_COMPLETIONS response payload.
pub fn completions(completions: &[Completion]) -> String {
    let mut out = String::from("<xml>");
    for c in completions {
        _ = write!(
            out,
            "<comp p0=\"{}\" p1=\"{}\" p2=\"{}\" p3=\"{}\" />",
            escape(&c.name),
            escape(&c.doc),
            escape(&c.args),
            c.kind
        );
    }
    out.push_str("</xml>");
    out
}

/// WRITE_TO_CONSOLE payload, `ctx` is 1 for stdout and 2 for stderr.
pub fn console_output(text: &str, ctx: u8, max_len: usize) -> String {
    let text: Cow<str> = if text.chars().count() > max_len {
        let mut cut: String = text.chars().take(max_len).collect();
        cut.push_str("...");
        Cow::Owned(cut)
    } else {
        Cow::Borrowed(text)
    };
    format!("<xml><io s=\"{}\" ctx=\"{ctx}\"/></xml>", escape(&text))
}

/// Call signature, used by SIGNATURE_CALL_TRACE.
pub fn call_signature(file: &str, name: &str, args: &[(String, String)]) -> String {
    let mut out = String::from("<xml>");
    _ = write!(
        out,
        "<call_signature file=\"{}\" name=\"{}\">",
        escape(file),
        escape(name)
    );
    for (arg, type_name) in args {
        _ = write!(
            out,
            "<arg name=\"{}\" type=\"{}\"></arg>",
            escape(arg),
            escape(type_name)
        );
    }
    out.push_str("</call_signature></xml>");
    out
}
