//! Payload encoding.
//!
//! Two layers: a whole payload is percent-encoded so it never contains a
//! newline, and each field of a tab-separated payload is escaped so a field
//! (a condition, an expression, an attribute path) may contain tabs and
//! newlines itself.

use crate::debugger::Error;
use crate::protocol::RawCommand;

fn is_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-_.~/<>=\" :,()[]*'".contains(&b)
}

/// Percent-encode every byte outside of the safe set.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if is_safe(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(hex_digit(b >> 4));
            out.push(hex_digit(b & 0xf));
        }
    }
    out
}

fn hex_digit(n: u8) -> char {
    char::from_digit(n as u32, 16)
        .unwrap_or('0')
        .to_ascii_uppercase()
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Decode `%XX` sequences, malformed sequences are kept as is.
pub fn unquote(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Escape a single field of a tab-separated payload.
pub fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '%' => out.push_str("%25"),
            '\t' => out.push_str("%09"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            c => out.push(c),
        }
    }
    out
}

pub fn unescape_field(field: &str) -> String {
    unquote(field)
}

/// Join escaped fields with tabs.
pub fn join_fields<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join("\t")
}

/// Split a decoded payload into unescaped fields.
pub fn split_fields(payload: &str) -> Vec<String> {
    payload.split('\t').map(unescape_field).collect()
}

/// Parse a frame line (without the trailing newline).
pub fn parse_frame(line: &str) -> Result<RawCommand, Error> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut parts = line.splitn(3, '\t');
    let (Some(id), Some(seq)) = (parts.next(), parts.next()) else {
        return Err(Error::MalformedFrame(line.to_string()));
    };
    let id = id
        .parse::<u32>()
        .map_err(|_| Error::MalformedFrame(format!("bad command id `{id}`")))?;
    let seq = seq
        .parse::<i64>()
        .map_err(|_| Error::MalformedFrame(format!("bad sequence `{seq}`")))?;
    let payload = parts.next().map(unquote).unwrap_or_default();
    Ok(RawCommand { id, seq, payload })
}
