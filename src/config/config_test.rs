// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use super::*;
use std::sync::{Mutex, OnceLock};

/// `std::env` is process-global; serialize the tests that touch it so they
/// don't race against each other under cargo's default multi-threaded
/// test runner.
fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn clear_all() {
    // SAFETY: serialized by `env_lock`; no other thread reads/writes these
    // vars concurrently.
    unsafe {
        for var in [TRACE_VAR, PATH_VAR, CACHE_PATH_VAR, DEV_MODE_VAR] {
            std::env::remove_var(var);
        }
    }
}

fn set(var: &str, value: &str) {
    // SAFETY: serialized by `env_lock`.
    unsafe {
        std::env::set_var(var, value);
    }
}

#[test]
fn defaults_to_everything_off_when_unset() {
    let _guard = env_lock().lock().unwrap();
    clear_all();
    let config = Config::from_env();
    assert_eq!(config, Config::default());
    assert!(config.cache_disabled());
}

#[test]
fn trace_and_dev_mode_accept_common_truthy_spellings() {
    let _guard = env_lock().lock().unwrap();
    clear_all();
    set(TRACE_VAR, "1");
    set(DEV_MODE_VAR, "true");
    let config = Config::from_env();
    assert!(config.trace);
    assert!(config.dev_mode);
    clear_all();
}

#[test]
fn falsy_spellings_are_treated_as_unset() {
    let _guard = env_lock().lock().unwrap();
    clear_all();
    set(TRACE_VAR, "0");
    set(DEV_MODE_VAR, "false");
    let config = Config::from_env();
    assert!(!config.trace);
    assert!(!config.dev_mode);
    clear_all();
}

#[test]
fn cache_path_is_present_only_when_dev_mode_is_off() {
    let _guard = env_lock().lock().unwrap();
    clear_all();
    set(CACHE_PATH_VAR, "/tmp/orus-cache");
    let config = Config::from_env();
    assert_eq!(config.cache_path, Some(PathBuf::from("/tmp/orus-cache")));
    assert!(!config.cache_disabled());

    set(DEV_MODE_VAR, "1");
    let config = Config::from_env();
    assert!(config.cache_disabled());
    clear_all();
}

#[test]
fn module_path_splits_on_the_platform_separator() {
    let _guard = env_lock().lock().unwrap();
    clear_all();
    let joined = format!("a{}b", if cfg!(windows) { ';' } else { ':' });
    set(PATH_VAR, &joined);
    let config = Config::from_env();
    assert_eq!(config.module_path, vec![PathBuf::from("a"), PathBuf::from("b")]);
    clear_all();
}
