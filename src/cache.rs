// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! On-disk compiled-chunk cache format.
//!
//! This crate never touches the filesystem itself: a `ModuleHost` embedder
//! is responsible for reading/writing the byte blobs
//! this module knows how to produce ([`encode`]) and interpret
//! ([`decode`]). The envelope is a `bincode`-encoded `{format version,
//! source mtime, Chunk}` triple; `decode` treats anything that fails to
//! parse, carries a stale mtime, or was written by an incompatible format
//! version as a cache miss rather than an error - the safe fallback is
//! always "recompile", never "fail to load".

#[cfg(test)]
mod cache_test;

use crate::chunk::Chunk;
use serde::{Deserialize, Serialize};

/// Bumped whenever the envelope or `Chunk`'s on-disk shape changes in a
/// way that would make an old cache file undecodable or misleading.
const FORMAT_VERSION: u32 = 1;

/// Failure while encoding a chunk for the cache. Decoding never errors -
/// see [`decode`]'s doc comment - so this only covers the write side.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to encode chunk for cache: {0}")]
    Encode(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    format_version: u32,
    source_mtime: u64,
    chunk: Chunk,
}

/// The cache file a source at `source_path` should be read from/written
/// to, following the `<basename>.obc` convention.
#[must_use]
pub fn cache_file_name(source_path: &str) -> String {
    format!("{source_path}.obc")
}

/// Serialize `chunk`, stamped with `source_mtime`, into cache file bytes.
pub fn encode(chunk: &Chunk, source_mtime: u64) -> Result<Vec<u8>, CacheError> {
    let entry = CacheEntry {
        format_version: FORMAT_VERSION,
        source_mtime,
        chunk: chunk.clone(),
    };
    bincode::serialize(&entry).map_err(|err| CacheError::Encode(err.to_string()))
}

/// Decode a cache blob previously produced by [`encode`], discarding it
/// (returning `None`) if it doesn't parse, was written by a different
/// format version, or is stamped with an mtime other than
/// `expected_mtime` - any of these just means the source has moved on and
/// the caller should recompile.
#[must_use]
pub fn decode(bytes: &[u8], expected_mtime: u64) -> Option<Chunk> {
    let entry: CacheEntry = bincode::deserialize(bytes).ok()?;
    if entry.format_version != FORMAT_VERSION || entry.source_mtime != expected_mtime {
        tracing::debug!(
            format_version = entry.format_version,
            expected_format_version = FORMAT_VERSION,
            cached_mtime = entry.source_mtime,
            expected_mtime,
            "cache entry stale or mismatched, discarding"
        );
        return None;
    }
    Some(entry.chunk)
}
