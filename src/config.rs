// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Process-wide configuration, read from the `ORUS_*` environment variables.
//!
//! [`Config`] only parses `std::env::var` into typed fields; it performs no
//! filesystem I/O of its own; resolved paths are handed to whatever
//! [`crate::module::ModuleHost`] the embedder provides.

#[cfg(test)]
mod config_test;

use std::path::PathBuf;

const TRACE_VAR: &str = "ORUS_TRACE";
const PATH_VAR: &str = "ORUS_PATH";
const CACHE_PATH_VAR: &str = "ORUS_CACHE_PATH";
const DEV_MODE_VAR: &str = "ORUS_DEV_MODE";

/// Process configuration derived from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `ORUS_TRACE=1` (or any non-empty, non-"0"/"false" value): enable
    /// per-instruction `tracing` events from both interpreters.
    pub trace: bool,
    /// `ORUS_PATH`: colon-separated module search roots, in the same
    /// convention as `PATH`/`CLASSPATH`; empty if unset.
    pub module_path: Vec<PathBuf>,
    /// `ORUS_CACHE_PATH`: directory compiled-chunk `.obc` files are read
    /// from and written to; `None` disables the on-disk cache and every
    /// module is recompiled every run.
    pub cache_path: Option<PathBuf>,
    /// `ORUS_DEV_MODE=1`: skip the on-disk cache even when `cache_path` is
    /// set, forcing every module to recompile on each load.
    pub dev_mode: bool,
}

impl Config {
    /// Read configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            trace: read_flag(TRACE_VAR),
            module_path: read_path_list(PATH_VAR),
            cache_path: std::env::var_os(CACHE_PATH_VAR).map(PathBuf::from),
            dev_mode: read_flag(DEV_MODE_VAR),
        }
    }

    /// Whether modules should bypass the on-disk cache entirely: either no
    /// cache directory is configured, or dev mode forces a fresh compile.
    #[must_use]
    pub fn cache_disabled(&self) -> bool {
        self.dev_mode || self.cache_path.is_none()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trace: false,
            module_path: Vec::new(),
            cache_path: None,
            dev_mode: false,
        }
    }
}

fn read_flag(var: &str) -> bool {
    match std::env::var(var) {
        Ok(value) => !matches!(value.as_str(), "" | "0" | "false"),
        Err(_) => false,
    }
}

fn read_path_list(var: &str) -> Vec<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(|v| std::env::split_paths(&v).collect())
        .unwrap_or_default()
}
