// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use super::*;
use crate::opcode::OpCode;

fn sample_chunk() -> Chunk {
    let mut chunk = Chunk::new();
    let idx = chunk.add_constant(crate::chunk::ConstValue::I64(7));
    chunk.write_op(OpCode::Constant, 1);
    chunk.write_u16(idx, 1);
    chunk.write_op(OpCode::Return, 1);
    chunk
}

#[test]
fn round_trips_a_chunk() {
    let chunk = sample_chunk();
    let bytes = encode(&chunk, 100).expect("encodes");
    let decoded = decode(&bytes, 100).expect("decodes");
    assert_eq!(decoded.code(), chunk.code());
}

#[test]
fn discards_an_entry_stamped_with_a_different_mtime() {
    let chunk = sample_chunk();
    let bytes = encode(&chunk, 100).expect("encodes");
    assert!(decode(&bytes, 200).is_none());
}

#[test]
fn discards_corrupt_bytes() {
    assert!(decode(b"not a cache entry", 100).is_none());
}

#[test]
fn cache_file_name_appends_the_obc_extension() {
    assert_eq!(cache_file_name("main.orus"), "main.orus.obc");
}
