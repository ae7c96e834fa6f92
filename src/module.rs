// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Module loading and caching.
//!
//! File I/O, path resolution, and source compilation are out of scope for
//! this crate; [`ModuleHost`] is the external
//! collaborator interface a CLI/embedder implements so [`ModuleLoader`]'s
//! cycle-detection and mtime-invalidation algorithm can be exercised here
//! against an in-memory fake, without this crate ever touching a
//! filesystem itself.


use crate::chunk::Chunk;
use crate::config::Config;
use crate::gc::Heap;
use crate::register::lower::{lower, LowerOptions};
use crate::register::vm::RegisterVm;
use crate::value::Value;
use std::collections::{HashMap, HashSet};

/// Failures raised while resolving or loading a module, classified under
/// the `IMPORT` error type.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModuleError {
    #[error("module not found: {0}")]
    NotFound(String),
    #[error("import cycle detected: {0}")]
    Cycle(String),
    #[error("module '{0}' already executed")]
    AlreadyExecuted(String),
    #[error("failed to compile module '{path}': {message}")]
    CompileFailed { path: String, message: String },
    #[error("failed to lower module '{path}' to register form: {message}")]
    LowerFailed { path: String, message: String },
    #[error("module '{path}' raised an uncaught error during execution: {message}")]
    ExecutionFailed { path: String, message: String },
}

/// A compiled module's state. `modules` only ever holds entries for modules
/// that finished executing - a module currently being loaded lives on
/// `loading_stack` instead, never in this map, so there is no separate
/// "loading" status to track here.
struct LoadedModule {
    chunk: Chunk,
    mtime: u64,
    /// The module body's globals after it finished running, frozen as its
    /// public exports. Kept alongside the heap that produced
    /// them so any `GcRef`-backed values (strings, arrays) stay valid.
    exports: HashMap<String, Value>,
    #[allow(dead_code)]
    heap: Heap,
}

/// External collaborator for everything module loading needs from the
/// outside world: source resolution, modification times, and a place to
/// persist/read compiled chunks. A real embedder backs this with the
/// filesystem; tests back it with an in-memory map.
pub trait ModuleHost {
    /// Read the source text at `path` and its last-modified timestamp.
    fn read_source(&self, path: &str) -> Result<(String, u64), ModuleError>;

    /// Compile `source` (from `path`) into a `Chunk`. The actual
    /// lexer/parser/compiler is out of scope here; this crate only needs
    /// the seam.
    fn compile(&self, path: &str, source: &str) -> Result<Chunk, ModuleError>;

    /// Read a previously-written cache blob (produced by a prior
    /// [`write_cache`](Self::write_cache) call, via [`crate::cache::encode`])
    /// for `cache_path`. `None` means no entry exists, which is a cache
    /// miss, not an error; hosts that don't support an on-disk cache can
    /// leave this at its default.
    fn read_cache(&self, cache_path: &str) -> Option<Vec<u8>> {
        let _ = cache_path;
        None
    }

    /// Persist `bytes` (produced by [`crate::cache::encode`]) as
    /// `cache_path`'s cache entry. Best-effort: a host with no cache
    /// directory configured, or one that fails to write, simply leaves the
    /// next load to recompile - this is never treated as fatal.
    fn write_cache(&self, cache_path: &str, bytes: &[u8]) {
        let _ = (cache_path, bytes);
    }
}

/// Loads and caches compiled modules, detecting import cycles and
/// invalidating stale cache entries by source mtime.
pub struct ModuleLoader<H: ModuleHost> {
    host: H,
    config: Config,
    modules: HashMap<String, LoadedModule>,
    loading_stack: Vec<String>,
}

impl<H: ModuleHost> ModuleLoader<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, Config::default())
    }

    pub fn with_config(host: H, config: Config) -> Self {
        Self {
            host,
            config,
            modules: HashMap::new(),
            loading_stack: Vec::new(),
        }
    }

    /// Load and compile `path`, or return the already-executed module's
    /// error: a second `load` of a module that finished executing is an
    /// error, not a silent cache hit.
    pub fn load(&mut self, path: &str) -> Result<&Chunk, ModuleError> {
        if self.modules.contains_key(path) {
            return Err(ModuleError::AlreadyExecuted(path.to_string()));
        }

        if self.loading_stack.iter().any(|p| p == path) {
            return Err(ModuleError::Cycle(self.cycle_path(path)));
        }

        self.loading_stack.push(path.to_string());
        let (source, mtime) = self.host.read_source(path).inspect_err(|_| {
            self.loading_stack.pop();
        })?;

        let cache_path = crate::cache::cache_file_name(path);
        let cached = (!self.config.cache_disabled())
            .then(|| self.host.read_cache(&cache_path))
            .flatten()
            .and_then(|bytes| crate::cache::decode(&bytes, mtime));

        let chunk = match cached {
            Some(chunk) => chunk,
            None => {
                let chunk = self.host.compile(path, &source).inspect_err(|_| {
                    self.loading_stack.pop();
                })?;
                if !self.config.cache_disabled() {
                    if let Ok(bytes) = crate::cache::encode(&chunk, mtime) {
                        self.host.write_cache(&cache_path, &bytes);
                    }
                }
                chunk
            }
        };

        let reg_chunk = lower(&chunk, LowerOptions::default()).map_err(|err| {
            self.loading_stack.pop();
            ModuleError::LowerFailed {
                path: path.to_string(),
                message: err.to_string(),
            }
        })?;
        let mut module_vm = RegisterVm::new(&reg_chunk);
        if let Err(err) = module_vm.run() {
            self.loading_stack.pop();
            return Err(ModuleError::ExecutionFailed {
                path: path.to_string(),
                message: err.to_string(),
            });
        }
        let (heap, exports) = module_vm.into_exports();
        self.loading_stack.pop();

        self.modules.insert(
            path.to_string(),
            LoadedModule {
                chunk,
                mtime,
                exports,
                heap,
            },
        );
        Ok(&self.modules.get(path).expect("just inserted").chunk)
    }

    /// The public globals a loaded module's body defined, frozen once it
    /// finished executing.
    #[must_use]
    pub fn exports(&self, path: &str) -> Option<&HashMap<String, Value>> {
        self.modules.get(path).map(|m| &m.exports)
    }

    /// Drop a cached module if its source's mtime has advanced past the
    /// one recorded at load time, so a subsequent `load` recompiles it.
    pub fn invalidate_if_stale(&mut self, path: &str) -> Result<bool, ModuleError> {
        let Some(module) = self.modules.get(path) else {
            return Ok(false);
        };
        let (_, current_mtime) = self.host.read_source(path)?;
        if current_mtime > module.mtime {
            self.modules.remove(path);
            return Ok(true);
        }
        Ok(false)
    }

    #[must_use]
    pub fn is_loaded(&self, path: &str) -> bool {
        self.modules.contains_key(path)
    }

    fn cycle_path(&self, closing: &str) -> String {
        let mut frames: Vec<&str> = self.loading_stack.iter().map(String::as_str).collect();
        frames.push(closing);
        frames.join(" -> ")
    }
}

/// An in-memory [`ModuleHost`] used by tests and embedders without a
/// filesystem (e.g. a REPL evaluating strings). Its cache map is a stand-in
/// for an `.obc` directory, so the same host can exercise
/// [`ModuleLoader`]'s cache-consulting path without any real I/O.
#[derive(Default)]
pub struct MemoryHost {
    sources: HashMap<String, (String, u64)>,
    cache: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>, mtime: u64) {
        self.sources.insert(path.into(), (source.into(), mtime));
    }

    /// Number of cache entries this host currently holds, for tests that
    /// need to confirm `ModuleLoader` actually wrote one.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl ModuleHost for MemoryHost {
    fn read_source(&self, path: &str) -> Result<(String, u64), ModuleError> {
        self.sources
            .get(path)
            .cloned()
            .ok_or_else(|| ModuleError::NotFound(path.to_string()))
    }

    /// Test/embedding-only stub: treats the source as an already-serialized
    /// chunk is out of scope, so this always yields an empty chunk. Real
    /// compilation is external to this crate.
    fn compile(&self, _path: &str, _source: &str) -> Result<Chunk, ModuleError> {
        Ok(Chunk::new())
    }

    fn read_cache(&self, cache_path: &str) -> Option<Vec<u8>> {
        self.cache.borrow().get(cache_path).cloned()
    }

    fn write_cache(&self, cache_path: &str, bytes: &[u8]) {
        self.cache.borrow_mut().insert(cache_path.to_string(), bytes.to_vec());
    }
}

/// Not itself part of `ModuleLoader`'s public surface, kept to document the
/// invariant that `loading_stack` never contains duplicates at rest
/// (enforced by the cycle check above, exercised in tests).
#[allow(dead_code)]
fn assert_no_duplicates(stack: &[String]) -> bool {
    let set: HashSet<&String> = stack.iter().collect();
    set.len() == stack.len()
}
