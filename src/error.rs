// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Shared error taxonomy for the Orus VM.
//!
//! Every runtime failure ultimately classifies as one of the [`ErrorType`]
//! variants. Individual subsystems (the stack interpreter, the register
//! interpreter, the lowering pass, the module loader, the on-disk cache)
//! define their own `thiserror`-derived error enums with precise
//! messages; [`ErrorType`] is the coarse classification stored alongside a
//! caught `Value::Error` so catch blocks and the CLI's one-line stderr
//! message can discriminate without matching on every subsystem's enum.

use core::fmt;

/// Coarse error classification, mirrored into every `VAL_ERROR` heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Division by zero, stack underflow/overflow, invalid opcode, type
    /// mismatch, out-of-bounds access.
    Runtime,
    /// Format-print placeholder/argument mismatches, bad cast input.
    Type,
    /// Import cycle, missing module, double execution of a module body.
    Import,
    /// Allocation failure.
    Memory,
    /// Checked-arithmetic overflow.
    Overflow,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Runtime => "RuntimeError",
            Self::Type => "TypeError",
            Self::Import => "ImportError",
            Self::Memory => "MemoryError",
            Self::Overflow => "OverflowError",
        };
        f.write_str(name)
    }
}

/// Outcome of `interpret`/`interpret_module`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    /// Execution completed normally.
    Ok,
    /// Compilation failed before any bytecode ran. Produced by the external
    /// compiler; the VM never returns this itself, but callers that drive
    /// compile-then-run pipelines need the variant here.
    CompileError,
    /// A runtime error reached the top of the call stack uncaught.
    RuntimeError,
}

/// A rendered stack trace snippet: the last N call frames, innermost last,
/// used to build the user-visible failure message for an uncaught error.
#[derive(Debug, Clone, Default)]
pub struct StackTrace {
    /// Human-readable frame descriptions, outermost first.
    pub frames: Vec<String>,
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(f, "  at {frame}")?;
        }
        Ok(())
    }
}
