// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Native function ABI.
//!
//! Builtins are exposed here as `fn(&mut NativeContext, &[Value]) ->
//! Result<Value, NativeError>`: a slice of arguments and a `Result`, with
//! the error channel folded into the return type instead of a separate
//! sentinel and side-channel error slot.

use crate::gc::Heap;
use crate::value::Value;
use std::collections::HashMap;

/// Failure raised by a native function body.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct NativeError {
    pub message: String,
}

impl NativeError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Collaborator interface a native function body uses to allocate heap
/// values. Kept as a trait (rather than handing out `&mut Heap` directly)
/// so embedders can wrap allocation with their own bookkeeping.
pub trait NativeContext {
    fn heap_mut(&mut self) -> &mut Heap;

    fn alloc_string(&mut self, s: &str) -> Value {
        self.heap_mut().alloc_string(s)
    }
}

/// A native function body: arguments in, a `Value` or [`NativeError`] out.
pub type NativeFn = fn(&mut dyn NativeContext, &[Value]) -> Result<Value, NativeError>;

/// A name-addressed table of native functions, populated by an embedder
/// before running a chunk that references them via `CALL_NATIVE`.
#[derive(Default)]
pub struct NativeRegistry {
    functions: HashMap<String, NativeFn>,
}

impl NativeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, f: NativeFn) {
        self.functions.insert(name.into(), f);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.functions.get(name).copied()
    }
}

#[cfg(test)]
mod native_test {
    use super::*;

    struct FakeCtx {
        heap: Heap,
    }

    impl NativeContext for FakeCtx {
        fn heap_mut(&mut self) -> &mut Heap {
            &mut self.heap
        }
    }

    fn identity(_ctx: &mut dyn NativeContext, args: &[Value]) -> Result<Value, NativeError> {
        args.first().copied().ok_or_else(|| NativeError::new("missing argument"))
    }

    #[test]
    fn registry_round_trips_a_function() {
        let mut registry = NativeRegistry::new();
        registry.register("identity", identity as NativeFn);
        let f = registry.get("identity").expect("registered");
        let mut ctx = FakeCtx { heap: Heap::new() };
        let result = f(&mut ctx, &[Value::I32(7)]).expect("call succeeds");
        assert_eq!(result, Value::I32(7));
    }

    #[test]
    fn missing_native_returns_none() {
        let registry = NativeRegistry::new();
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn native_error_reports_message() {
        let mut ctx = FakeCtx { heap: Heap::new() };
        let err = identity(&mut ctx, &[]).unwrap_err();
        assert_eq!(err.message, "missing argument");
    }
}
