//! Bounded, cycle-safe textual representation of values.

use crate::debugger::variable::{read, Value};
use std::fmt;
use std::fmt::Write;

/// Limits applied while rendering a value repr.
#[derive(Debug, Clone, Copy)]
pub struct ReprOptions {
    /// Container nesting after which nested containers render as `...`.
    pub max_depth: usize,
    /// Max number of chars in result (without the trailing `...`).
    pub max_len: usize,
}

impl Default for ReprOptions {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_len: 1000,
        }
    }
}

/// `fmt::Write` implementation that refuses to grow past `limit` chars.
///
/// When the limit is reached the writer keeps the head of the text and
/// returns `fmt::Error`, so a deep render stops as soon as possible.
pub(crate) struct BoundedWriter {
    buf: String,
    len: usize,
    limit: usize,
    overflow: bool,
}

impl BoundedWriter {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            len: 0,
            limit,
            overflow: false,
        }
    }

    /// Return written text, `...` is appended if the text was cut.
    pub(crate) fn finish(mut self) -> String {
        if self.overflow {
            self.buf.push_str("...");
        }
        self.buf
    }
}

impl Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.overflow {
            return Err(fmt::Error);
        }
        let n = s.chars().count();
        if self.len + n <= self.limit {
            self.buf.push_str(s);
            self.len += n;
            return Ok(());
        }
        let take = self.limit - self.len;
        self.buf.extend(s.chars().take(take));
        self.len = self.limit;
        self.overflow = true;
        Err(fmt::Error)
    }
}

/// Render value repr, never longer than `opts.max_len` chars plus `...`.
pub fn repr(value: &Value, opts: &ReprOptions) -> String {
    let mut w = BoundedWriter::new(opts.max_len);
    _ = ReprWriter::new(opts).write(&mut w, value, 0);
    w.finish()
}

struct ReprWriter<'a> {
    opts: &'a ReprOptions,
    /// Containers currently being rendered, a repeated address means a cycle.
    visited: Vec<*const ()>,
}

impl<'a> ReprWriter<'a> {
    fn new(opts: &'a ReprOptions) -> Self {
        Self {
            opts,
            visited: vec![],
        }
    }

    fn write(&mut self, w: &mut BoundedWriter, value: &Value, depth: usize) -> fmt::Result {
        match value {
            Value::None => w.write_str("None"),
            Value::Bool(true) => w.write_str("True"),
            Value::Bool(false) => w.write_str("False"),
            Value::Int(i) => write!(w, "{i}"),
            Value::Float(f) => write_float(w, *f),
            Value::Str(s) => write_str_literal(w, s),
            Value::Bytes(b) => write_bytes_literal(w, b),
            Value::Opaque(op) => w.write_str(&op.repr),
            Value::Object(obj) => write!(w, "<{} object>", obj.type_identity),
            Value::List(_) | Value::Tuple(_) | Value::Set(_) | Value::Dict(_) => {
                let addr = value.container_addr();
                if addr.is_some_and(|addr| self.visited.contains(&addr)) {
                    return w.write_str(cycle_marker(value));
                }
                if depth >= self.opts.max_depth {
                    return w.write_str(cycle_marker(value));
                }
                if let Some(addr) = addr {
                    self.visited.push(addr);
                }
                let result = self.write_container(w, value, depth);
                if addr.is_some() {
                    self.visited.pop();
                }
                result
            }
        }
    }

    fn write_container(&mut self, w: &mut BoundedWriter, value: &Value, depth: usize) -> fmt::Result {
        match value {
            Value::List(items) => {
                let items = read(items);
                self.write_seq(w, &items, "[", "]", depth)
            }
            Value::Tuple(items) => {
                if items.len() == 1 {
                    w.write_str("(")?;
                    self.write(w, &items[0], depth + 1)?;
                    return w.write_str(",)");
                }
                self.write_seq(w, items, "(", ")", depth)
            }
            Value::Set(items) => {
                let items = read(items);
                if items.is_empty() {
                    return w.write_str("set()");
                }
                self.write_seq(w, &items, "{", "}", depth)
            }
            Value::Dict(entries) => {
                let entries = read(entries);
                w.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i != 0 {
                        w.write_str(", ")?;
                    }
                    self.write(w, k, depth + 1)?;
                    w.write_str(": ")?;
                    self.write(w, v, depth + 1)?;
                }
                w.write_str("}")
            }
            _ => self.write(w, value, depth),
        }
    }

    fn write_seq(
        &mut self,
        w: &mut BoundedWriter,
        items: &[Value],
        open: &str,
        close: &str,
        depth: usize,
    ) -> fmt::Result {
        w.write_str(open)?;
        for (i, item) in items.iter().enumerate() {
            if i != 0 {
                w.write_str(", ")?;
            }
            self.write(w, item, depth + 1)?;
        }
        w.write_str(close)
    }
}

fn cycle_marker(value: &Value) -> &'static str {
    match value {
        Value::List(_) => "[...]",
        Value::Tuple(_) => "(...)",
        _ => "{...}",
    }
}

fn write_float(w: &mut impl Write, f: f64) -> fmt::Result {
    if f.is_nan() {
        w.write_str("nan")
    } else if f.is_infinite() {
        w.write_str(if f > 0.0 { "inf" } else { "-inf" })
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        write!(w, "{f:.1}")
    } else {
        write!(w, "{f}")
    }
}

fn write_str_literal(w: &mut impl Write, s: &str) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    w.write_char(quote)?;
    for c in s.chars() {
        match c {
            '\\' => w.write_str("\\\\")?,
            '\n' => w.write_str("\\n")?,
            '\r' => w.write_str("\\r")?,
            '\t' => w.write_str("\\t")?,
            c if c == quote => {
                w.write_char('\\')?;
                w.write_char(c)?;
            }
            c if c.is_control() => write!(w, "\\x{:02x}", c as u32)?,
            c => w.write_char(c)?,
        }
    }
    w.write_char(quote)
}

fn write_bytes_literal(w: &mut impl Write, b: &[u8]) -> fmt::Result {
    w.write_str("b'")?;
    for &byte in b {
        match byte {
            b'\\' => w.write_str("\\\\")?,
            b'\'' => w.write_str("\\'")?,
            b'\n' => w.write_str("\\n")?,
            b'\r' => w.write_str("\\r")?,
            b'\t' => w.write_str("\\t")?,
            0x20..=0x7e => w.write_char(byte as char)?,
            _ => write!(w, "\\x{byte:02x}")?,
        }
    }
    w.write_char('\'')
}
