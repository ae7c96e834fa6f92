// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use super::*;
use crate::gc::Heap;
use crate::opcode::OpCode;

#[test]
fn write_op_and_read_back() {
    let mut chunk = Chunk::new();
    chunk.write_op(OpCode::Nil, 1);
    chunk.write_op(OpCode::Return, 1);
    assert_eq!(chunk.code(), &[OpCode::Nil as u8, OpCode::Return as u8]);
}

#[test]
fn line_table_tracks_runs() {
    let mut chunk = Chunk::new();
    chunk.write_op(OpCode::Nil, 1);
    chunk.write_op(OpCode::Pop, 1);
    chunk.write_op(OpCode::Nil, 2);
    assert_eq!(chunk.line_for_offset(0), 1);
    assert_eq!(chunk.line_for_offset(1), 1);
    assert_eq!(chunk.line_for_offset(2), 2);
}

#[test]
fn constants_round_trip_through_heap() {
    let mut chunk = Chunk::new();
    let idx = chunk.add_constant(ConstValue::String("hi".to_string()));
    let mut heap = Heap::new();
    let value = chunk.constant(idx).to_value(&mut heap);
    assert_eq!(value.as_gc_ref().unwrap().as_string(), "hi");
}

#[test]
fn patch_i16_rewrites_forward_jump() {
    let mut chunk = Chunk::new();
    chunk.write_op(OpCode::Jump, 1);
    let patch_at = chunk.len();
    chunk.write_i16(0, 1);
    chunk.patch_i16(patch_at, 42);
    assert_eq!(chunk.read_i16(patch_at), 42);
}

#[test]
fn disassemble_includes_operand() {
    let mut chunk = Chunk::new();
    let idx = chunk.add_constant(ConstValue::I32(7));
    chunk.write_op(OpCode::Constant, 1);
    chunk.write_u16(idx, 1);
    let text = chunk.disassemble("test");
    assert!(text.contains("CONSTANT"));
    assert!(text.contains('0'));
}

#[test]
fn serializes_without_heap_references() {
    let mut chunk = Chunk::new();
    chunk.add_constant(ConstValue::String("s".to_string()));
    chunk.write_op(OpCode::Nil, 1);
    let bytes = bincode::serialize(&chunk).expect("chunk serializes");
    let back: Chunk = bincode::deserialize(&bytes).expect("chunk deserializes");
    assert_eq!(back.code(), chunk.code());
}
