// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! # Orus VM
//!
//! Execution substrate for the Orus language.
//!
//! This crate provides:
//! - A tagged [`Value`](value::Value) model and a mark-sweep [`Heap`](gc::Heap)
//!   for strings, arrays, errors, and range iterators.
//! - [`Chunk`](chunk::Chunk): the immutable-after-build stack bytecode container.
//! - [`StackVm`](vm::StackVm): the stack-based interpreter.
//! - [`lower`](register::lower::lower): the stack-to-register lowering pass.
//! - [`RegisterVm`](register::vm::RegisterVm): the register-based interpreter.
//! - [`ModuleLoader`](module::ModuleLoader): module resolution, caching, cycle
//!   detection, and mtime invalidation.
//! - [`cache`]: the on-disk compiled-chunk cache envelope format.
//! - [`config::Config`]: the `ORUS_*` environment variable surface.
//!
//! Lexing, parsing, and compiling Orus source to a [`Chunk`] are external
//! collaborators; this crate only states the interfaces it needs from them
//! (see [`module::ModuleHost`]).

pub mod cache;
pub mod chunk;
pub mod config;
pub mod error;
pub mod gc;
pub mod module;
pub mod native;
pub mod opcode;
pub mod register;
pub mod value;
pub mod vm;

pub use chunk::Chunk;
pub use error::{ErrorType, InterpretResult};
pub use gc::Heap;
pub use value::Value;
pub use vm::StackVm;

/// Crate version, exposed for diagnostics and cache-format stamping.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
