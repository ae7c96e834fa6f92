// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Printing and the `FORMAT_PRINT` placeholder-substitution contract.

use crate::value::Value;
use core::fmt::Write;

/// Render a value the way `PRINT`/`FORMAT_PRINT` do (spec §4.C).
///
/// Integers print in decimal, `F64` uses a shortest-roundtrip-ish general
/// format, booleans print as `true`/`false`, `Nil` is elided (prints as the
/// empty string when it is itself the thing being printed at the top level
/// the caller still sees nothing, but nested inside an array it renders as
/// the literal `nil` so `[1, nil, 3]` round-trips legibly), arrays print
/// recursively as `[e1, e2, ...]`, strings are inserted verbatim (no quotes)
/// at the top level but quoted when nested inside an array, matching how
/// every `Display`-for-container impl in the ecosystem prints its elements
/// with their `Debug` form and the container as a whole with `Display`.
#[must_use]
pub fn print_value(value: &Value) -> String {
    let mut out = String::new();
    write_top_level(&mut out, value);
    out
}

fn write_top_level(out: &mut String, value: &Value) {
    match value {
        Value::Nil => {}
        Value::String(r) => out.push_str(r.as_string()),
        _ => write_nested(out, value),
    }
}

fn write_nested(out: &mut String, value: &Value) {
    match value {
        Value::I32(n) => {
            let _ = write!(out, "{n}");
        }
        Value::I64(n) => {
            let _ = write!(out, "{n}");
        }
        Value::U32(n) => {
            let _ = write!(out, "{n}");
        }
        Value::U64(n) => {
            let _ = write!(out, "{n}");
        }
        Value::F64(n) => {
            let _ = write!(out, "{}", format_f64(*n));
        }
        Value::Bool(b) => {
            out.push_str(if *b { "true" } else { "false" });
        }
        Value::Nil => out.push_str("nil"),
        Value::String(r) => out.push_str(r.as_string()),
        Value::Array(r) => {
            out.push('[');
            for (i, elem) in r.as_array().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_nested(out, elem);
            }
            out.push(']');
        }
        Value::Error(r) => {
            let _ = write!(out, "{}: {}", r.error_kind(), r.error_message());
        }
        Value::RangeIterator(r) => {
            let (cur, end) = r.range_state();
            let _ = write!(out, "{cur}..{end}");
        }
    }
}

/// Shortest representation that round-trips, falling back to a trailing
/// `.0` for integral floats so `1.0` never prints as `1`.
fn format_f64(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let s = format!("{n}");
    if s.contains('.') || s.contains('e') {
        s
    } else {
        format!("{s}.0")
    }
}

/// Error raised when a `FORMAT_PRINT` placeholder count does not match the
/// supplied argument count (spec §4.C, a `TYPE` error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatMismatch {
    pub placeholders: usize,
    pub arguments: usize,
}

impl core::fmt::Display for FormatMismatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "format string has {} placeholder{} but {} argument{} were supplied",
            self.placeholders,
            if self.placeholders == 1 { "" } else { "s" },
            self.arguments,
            if self.arguments == 1 { "" } else { "s" },
        )
    }
}

/// Substitute each `{}` in `format` with the corresponding entry of `args`,
/// in order. Returns an error naming both counts if they disagree, exactly
/// as spec §4.C/§8 scenario 4 requires (`"1 placeholder ... 1 argument"`).
pub fn format_print(format: &str, args: &[Value]) -> Result<String, FormatMismatch> {
    let placeholders = format.matches("{}").count();
    if placeholders != args.len() {
        return Err(FormatMismatch {
            placeholders,
            arguments: args.len(),
        });
    }

    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut rest = format;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        // Unwrap is safe: placeholders == args.len() was checked above, and
        // each iteration of this loop consumes exactly one placeholder.
        let arg = args.next().expect("placeholder count checked above");
        write_top_level(&mut out, arg);
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
