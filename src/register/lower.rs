// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Stack-to-register lowering.
//!
//! A single pass over a stack [`Chunk`] that tracks a shadow operand stack
//! of *register names* instead of values: pushing a value means "the next
//! thing produced lives in register N"; popping means "the most recent
//! producer's register is now a consumer's input." A small allocator hands
//! out registers per function, reusing freed ones and, once the window is
//! exhausted, spilling the oldest live register into a side table of slots
//! and reloading it on next use.


use crate::chunk::Chunk;
use crate::opcode::OpCode;
use crate::register::{FIRST_PARAM_REGISTER, RegChunk, RegFunction, RegInstr, RegOp, REGISTER_COUNT, SPILL_REGISTER_BASE};

/// Failure while lowering a stack chunk into register form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    #[error("opcode {0:?} has no register-form lowering and is not stack-neutral")]
    UnsupportedOpcode(OpCode),
    #[error("function body requires more than {0} live registers")]
    RegisterWindowExhausted(usize),
    #[error("unknown opcode byte {0} while lowering")]
    UnknownOpcode(u8),
    #[error("jump target at stack offset {0} does not land on an instruction boundary")]
    InvalidJumpTarget(usize),
}

/// Lowering options. `debug_info` controls whether the output chunk
/// records a source line per register instruction (spec §4.G: optional,
/// off by default to keep the hot path lean).
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerOptions {
    pub debug_info: bool,
}

/// Where a shadow-stack entry's value currently lives: in a live register,
/// or evicted to a spill slot awaiting reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Reg(u8),
    Spilled(u8),
}

/// Per-function allocator state: a shadow stack mirroring the stack
/// machine's operand stack (one [`Slot`] per live value), a free list of
/// released registers, and a free list of released spill slots. When the
/// register window (registers below [`SPILL_REGISTER_BASE`]) is exhausted
/// and nothing has been freed, the allocator evicts the oldest still-live
/// register into a spill slot, emitting a [`RegOp::SpillReg`]; the next use
/// of that shadow entry reloads it with [`RegOp::UnspillReg`].
struct RegAllocator {
    next: u8,
    high_water: u8,
    free: Vec<u8>,
    free_slots: Vec<u8>,
    next_slot: u16,
    shadow: Vec<Slot>,
}

impl RegAllocator {
    fn new() -> Self {
        Self {
            next: 0,
            high_water: 0,
            free: Vec::new(),
            free_slots: Vec::new(),
            next_slot: 0,
            shadow: Vec::new(),
        }
    }

    fn spill_slots(&self) -> u16 {
        self.next_slot
    }

    fn emit(out: &mut RegChunk, options: LowerOptions, line: u32, instr: RegInstr) -> u32 {
        let reg_offset = out.push(instr);
        if options.debug_info {
            out.debug_lines.as_mut().expect("debug_info enabled").push(line);
        }
        reg_offset
    }

    fn alloc_spill_slot(&mut self) -> Result<u8, LowerError> {
        if let Some(slot) = self.free_slots.pop() {
            return Ok(slot);
        }
        let slot = u8::try_from(self.next_slot).map_err(|_| LowerError::RegisterWindowExhausted(REGISTER_COUNT))?;
        self.next_slot += 1;
        Ok(slot)
    }

    /// Hand out a single fresh register, spilling the oldest live
    /// non-parameter register to make room if the window is exhausted and
    /// the free list is empty.
    fn alloc_raw(&mut self, out: &mut RegChunk, options: LowerOptions, line: u32) -> Result<u8, LowerError> {
        if let Some(reg) = self.free.pop() {
            return Ok(reg);
        }
        if self.next < SPILL_REGISTER_BASE {
            let reg = self.next;
            self.next += 1;
            self.high_water = self.high_water.max(self.next);
            return Ok(reg);
        }
        let victim_idx = self
            .shadow
            .iter()
            .position(|slot| matches!(slot, Slot::Reg(r) if *r != FIRST_PARAM_REGISTER))
            .ok_or(LowerError::RegisterWindowExhausted(REGISTER_COUNT))?;
        let Slot::Reg(victim_reg) = self.shadow[victim_idx] else {
            unreachable!("victim_idx only matches Slot::Reg entries")
        };
        let slot = self.alloc_spill_slot()?;
        self.shadow[victim_idx] = Slot::Spilled(slot);
        Self::emit(
            out,
            options,
            line,
            RegInstr {
                op: RegOp::SpillReg,
                dst: slot,
                src1: victim_reg,
                src2: 0,
            },
        );
        Ok(victim_reg)
    }

    /// Reserve `n` (at least 1) *contiguous* fresh registers, bypassing the
    /// free list and the spill path: callee argument windows and
    /// `FORMAT_PRINT`'s format-string-plus-args window both need a run of
    /// adjacent register numbers, which neither a free-list-first allocator
    /// nor a single spilled victim can promise. A body whose argument
    /// windows alone exhaust the register file is a genuine error rather
    /// than something spilling could fix.
    fn alloc_window(&mut self, n: u8) -> Result<u8, LowerError> {
        let n = n.max(1);
        let base = self.next;
        let end = self.next.checked_add(n).ok_or(LowerError::RegisterWindowExhausted(REGISTER_COUNT))?;
        if end >= SPILL_REGISTER_BASE {
            return Err(LowerError::RegisterWindowExhausted(REGISTER_COUNT));
        }
        self.next = end;
        self.high_water = self.high_water.max(self.next);
        Ok(base)
    }

    /// Ensure the shadow entry at `idx` currently holds a live register,
    /// reloading it from its spill slot first if necessary.
    fn materialize(&mut self, idx: usize, out: &mut RegChunk, options: LowerOptions, line: u32) -> Result<u8, LowerError> {
        match self.shadow[idx] {
            Slot::Reg(reg) => Ok(reg),
            Slot::Spilled(slot) => {
                let reg = self.alloc_raw(out, options, line)?;
                Self::emit(
                    out,
                    options,
                    line,
                    RegInstr {
                        op: RegOp::UnspillReg,
                        dst: reg,
                        src1: slot,
                        src2: 0,
                    },
                );
                self.free_slots.push(slot);
                self.shadow[idx] = Slot::Reg(reg);
                Ok(reg)
            }
        }
    }

    fn push(&mut self, reg: u8) {
        self.shadow.push(Slot::Reg(reg));
    }

    /// Pop the top shadow entry, releasing its register back to the free
    /// list once its value has been materialized.
    fn pop(&mut self, out: &mut RegChunk, options: LowerOptions, line: u32) -> Result<u8, LowerError> {
        let idx = self.shadow.len().checked_sub(1).expect("lowering popped an empty shadow stack");
        let reg = self.materialize(idx, out, options, line)?;
        self.shadow.pop();
        self.free.push(reg);
        Ok(reg)
    }

    /// Like [`Self::pop`], but the register is *not* released: the caller
    /// keeps using it (e.g. `ARRAY_SET` re-pushes the value it just
    /// consumed as its own result, per the stack opcode's return-the-value
    /// semantics).
    fn take(&mut self, out: &mut RegChunk, options: LowerOptions, line: u32) -> Result<u8, LowerError> {
        let idx = self.shadow.len().checked_sub(1).expect("lowering took from an empty shadow stack");
        let reg = self.materialize(idx, out, options, line)?;
        self.shadow.pop();
        Ok(reg)
    }

    fn peek(&mut self, out: &mut RegChunk, options: LowerOptions, line: u32) -> Result<u8, LowerError> {
        let idx = self.shadow.len().checked_sub(1).expect("lowering peeked an empty shadow stack");
        self.materialize(idx, out, options, line)
    }

    fn push_new(&mut self, out: &mut RegChunk, options: LowerOptions, line: u32) -> Result<u8, LowerError> {
        let reg = self.alloc_raw(out, options, line)?;
        self.push(reg);
        Ok(reg)
    }
}

/// A byte-offset-indexed map from stack-chunk instruction offsets to
/// register-chunk instruction offsets, used to retarget jump targets that
/// were expressed in stack-bytecode offsets.
struct OffsetMap {
    stack_to_reg: std::collections::HashMap<usize, u32>,
    /// Jump instructions whose target hadn't been lowered yet when they
    /// were emitted; patched once the whole chunk has been walked. Offsets
    /// always land in `src1`/`src2` as a big-endian `i16`, leaving `dst`
    /// free to carry a condition register where one applies.
    pending: Vec<(u32, usize)>,
}

impl OffsetMap {
    fn new() -> Self {
        Self {
            stack_to_reg: std::collections::HashMap::new(),
            pending: Vec::new(),
        }
    }
}

/// Lower a single stack [`Chunk`] (the top-level chunk or one function
/// body) into a [`RegChunk`], recursively lowering its function table.
pub fn lower(chunk: &Chunk, options: LowerOptions) -> Result<RegChunk, LowerError> {
    let mut out = RegChunk::new();
    out.constants = chunk.constants_shadow();
    if options.debug_info {
        out.debug_lines = Some(Vec::new());
    }

    // The top-level body takes no arguments; its "arity" is 0 regardless of
    // how many locals it declares.
    let entry = lower_body(chunk, 0, &mut out, options)?;
    out.functions.push(entry);

    for proto in &chunk.functions {
        let reg_fn = lower_body(&proto.chunk, proto.arity, &mut out, options)?;
        out.functions.push(reg_fn);
    }

    Ok(out)
}

fn lower_body(chunk: &Chunk, arity: u8, out: &mut RegChunk, options: LowerOptions) -> Result<RegFunction, LowerError> {
    let start = out.len();
    let mut alloc = RegAllocator::new();
    let mut map = OffsetMap::new();

    // Parameters/locals occupy the first registers, one-to-one, matching
    // the stack machine's slot_base convention; register 0 holds the
    // function's first parameter per the allocator's startup state. No
    // instruction has run yet so this can never trigger a spill.
    for slot in 0..chunk.local_count {
        let reg = alloc.alloc_raw(out, options, 0)?;
        debug_assert_eq!(reg, slot as u8, "locals must allocate contiguously from register 0");
    }

    let mut offset = 0usize;
    let code = chunk.code();
    while offset < code.len() {
        map.stack_to_reg.insert(offset, out.len());
        let byte = code[offset];
        let Some(op) = OpCode::from_u8(byte) else {
            return Err(LowerError::UnknownOpcode(byte));
        };
        let operand_len = op.operand_len();
        let line = chunk.line_for_offset(offset);
        lower_one(chunk, op, offset, out, &mut alloc, &mut map, options, line)?;
        offset += 1 + operand_len;
    }
    map.stack_to_reg.insert(offset, out.len());

    for (reg_offset, target_stack_offset) in &map.pending {
        let Some(&target_reg_offset) = map.stack_to_reg.get(target_stack_offset) else {
            return Err(LowerError::InvalidJumpTarget(*target_stack_offset));
        };
        let instr = out.fetch(*reg_offset).expect("pending jump offset exists");
        let delta = target_reg_offset as i64 - *reg_offset as i64 - 1;
        let delta = i16::try_from(delta).expect("register jump delta overflows i16");
        let [hi, lo] = (delta as u16).to_be_bytes();
        out.patch(
            *reg_offset,
            RegInstr {
                op: instr.op,
                dst: instr.dst,
                src1: hi,
                src2: lo,
            },
        );
    }

    Ok(RegFunction {
        start,
        window_size: alloc.high_water,
        arity,
        spill_slots: alloc.spill_slots(),
    })
}

#[allow(clippy::too_many_lines)]
fn lower_one(
    chunk: &Chunk,
    op: OpCode,
    offset: usize,
    out: &mut RegChunk,
    alloc: &mut RegAllocator,
    map: &mut OffsetMap,
    options: LowerOptions,
    line: u32,
) -> Result<(), LowerError> {
    let emit = |out: &mut RegChunk, instr: RegInstr| -> u32 { RegAllocator::emit(out, options, line, instr) };

    macro_rules! binary {
        ($regop:expr) => {{
            let b = alloc.pop(out, options, line)?;
            let a = alloc.pop(out, options, line)?;
            let dst = alloc.push_new(out, options, line)?;
            emit(
                out,
                RegInstr {
                    op: $regop,
                    dst,
                    src1: a,
                    src2: b,
                },
            );
        }};
    }

    macro_rules! unary {
        ($regop:expr) => {{
            let a = alloc.pop(out, options, line)?;
            let dst = alloc.push_new(out, options, line)?;
            emit(
                out,
                RegInstr {
                    op: $regop,
                    dst,
                    src1: a,
                    src2: 0,
                },
            );
        }};
    }

    match op {
        OpCode::Constant => {
            let index = chunk.read_u16(offset + 1);
            let dst = alloc.push_new(out, options, line)?;
            let [hi, lo] = index.to_be_bytes();
            emit(
                out,
                RegInstr {
                    op: RegOp::LoadConst,
                    dst,
                    src1: hi,
                    src2: lo,
                },
            );
        }
        OpCode::Nil => {
            let dst = alloc.push_new(out, options, line)?;
            emit(out, RegInstr { op: RegOp::LoadNil, dst, src1: 0, src2: 0 });
        }
        OpCode::True => {
            let dst = alloc.push_new(out, options, line)?;
            emit(out, RegInstr { op: RegOp::LoadTrue, dst, src1: 0, src2: 0 });
        }
        OpCode::False => {
            let dst = alloc.push_new(out, options, line)?;
            emit(out, RegInstr { op: RegOp::LoadFalse, dst, src1: 0, src2: 0 });
        }
        OpCode::Pop => {
            alloc.pop(out, options, line)?;
        }
        OpCode::Dup => {
            let src = alloc.peek(out, options, line)?;
            let dst = alloc.push_new(out, options, line)?;
            emit(out, RegInstr { op: RegOp::Move, dst, src1: src, src2: 0 });
        }
        OpCode::Swap => {
            // Both operands keep living (swap doesn't consume anything), so
            // `take` is used instead of `pop`: `pop` would release the
            // register to the free list, and the immediately-following
            // `push` would then put that same "free" register back on the
            // shadow stack as live, leaving it simultaneously free and live.
            let b = alloc.take(out, options, line)?;
            let a = alloc.take(out, options, line)?;
            alloc.push(b);
            alloc.push(a);
        }
        OpCode::Add => binary!(RegOp::Add),
        OpCode::Sub => binary!(RegOp::Sub),
        OpCode::Mul => binary!(RegOp::Mul),
        OpCode::Div => binary!(RegOp::Div),
        OpCode::Mod => binary!(RegOp::Mod),
        OpCode::Neg => unary!(RegOp::Neg),
        OpCode::Equal => binary!(RegOp::Equal),
        OpCode::NotEqual => binary!(RegOp::NotEqual),
        OpCode::Less => binary!(RegOp::Less),
        OpCode::LessEqual => binary!(RegOp::LessEqual),
        OpCode::Greater => binary!(RegOp::Greater),
        OpCode::GreaterEqual => binary!(RegOp::GreaterEqual),
        OpCode::Not => unary!(RegOp::Not),
        OpCode::And => binary!(RegOp::And),
        OpCode::Or => binary!(RegOp::Or),
        OpCode::GetLocal => {
            let slot = chunk.read_u16(offset + 1);
            let dst = alloc.push_new(out, options, line)?;
            let [hi, lo] = slot.to_be_bytes();
            emit(out, RegInstr { op: RegOp::GetLocal, dst, src1: hi, src2: lo });
        }
        OpCode::SetLocal => {
            let slot = chunk.read_u16(offset + 1);
            let value = alloc.peek(out, options, line)?;
            let [hi, lo] = slot.to_be_bytes();
            emit(
                out,
                RegInstr {
                    op: RegOp::SetLocal,
                    dst: value,
                    src1: hi,
                    src2: lo,
                },
            );
        }
        OpCode::GetGlobal => {
            let index = chunk.read_u16(offset + 1);
            let dst = alloc.push_new(out, options, line)?;
            let [hi, lo] = index.to_be_bytes();
            emit(out, RegInstr { op: RegOp::GetGlobal, dst, src1: hi, src2: lo });
        }
        OpCode::SetGlobal => {
            let index = chunk.read_u16(offset + 1);
            let value = alloc.peek(out, options, line)?;
            let [hi, lo] = index.to_be_bytes();
            emit(
                out,
                RegInstr {
                    op: RegOp::SetGlobal,
                    dst: value,
                    src1: hi,
                    src2: lo,
                },
            );
        }
        OpCode::DefineGlobal => {
            let index = chunk.read_u16(offset + 1);
            let value = alloc.pop(out, options, line)?;
            let [hi, lo] = index.to_be_bytes();
            emit(
                out,
                RegInstr {
                    op: RegOp::DefineGlobal,
                    dst: value,
                    src1: hi,
                    src2: lo,
                },
            );
        }
        OpCode::Jump => {
            let rel = chunk.read_i16(offset + 1);
            let target = (offset as i64 + 3 + i64::from(rel)) as usize;
            let reg_offset = emit(out, RegInstr { op: RegOp::Jump, dst: 0, src1: 0, src2: 0 });
            map.pending.push((reg_offset, target));
        }
        OpCode::JumpIfFalse => {
            let rel = chunk.read_i16(offset + 1);
            let target = (offset as i64 + 3 + i64::from(rel)) as usize;
            let cond = alloc.pop(out, options, line)?;
            let reg_offset = emit(
                out,
                RegInstr {
                    op: RegOp::JumpIfFalse,
                    dst: cond,
                    src1: 0,
                    src2: 0,
                },
            );
            map.pending.push((reg_offset, target));
        }
        OpCode::Loop => {
            let back = chunk.read_u16(offset + 1);
            let target = offset + 3 - back as usize;
            let reg_offset = emit(out, RegInstr { op: RegOp::Jump, dst: 0, src1: 0, src2: 0 });
            map.pending.push((reg_offset, target));
        }
        OpCode::Call => {
            // RegChunk.functions[0] is the entry/top-level body (pushed by
            // `lower` before any function prototype); every stack-chunk
            // function index is therefore offset by one once lowered.
            let function_index = chunk.read_u16(offset + 1) + 1;
            let arg_count = chunk.code()[offset + 3];
            // Arguments land in whatever registers their producing
            // expressions happened to use; CALL needs them contiguous
            // starting at the window that becomes the callee's frame, so
            // move each one into place before emitting the call.
            let mut args = Vec::with_capacity(arg_count as usize);
            for _ in 0..arg_count {
                args.push(alloc.pop(out, options, line)?);
            }
            args.reverse();
            let base = alloc.alloc_window(arg_count)?;
            for (i, src) in args.iter().enumerate() {
                emit(
                    out,
                    RegInstr {
                        op: RegOp::Move,
                        dst: base + i as u8,
                        src1: *src,
                        src2: 0,
                    },
                );
            }
            alloc.push(base);
            let function_index = u8::try_from(function_index).map_err(|_| {
                LowerError::RegisterWindowExhausted(REGISTER_COUNT)
            })?;
            emit(
                out,
                RegInstr {
                    op: RegOp::Call,
                    dst: base,
                    src1: function_index,
                    src2: arg_count,
                },
            );
        }
        OpCode::Return => {
            let value = alloc.pop(out, options, line)?;
            emit(out, RegInstr { op: RegOp::Return, dst: 0, src1: value, src2: 0 });
        }
        OpCode::NewArray => {
            let count = chunk.read_u16(offset + 1);
            let mut elements = Vec::with_capacity(count as usize);
            for _ in 0..count {
                elements.push(alloc.pop(out, options, line)?);
            }
            elements.reverse();
            // Elements need a contiguous window for NEW_ARRAY to read them
            // off as `dst..dst+count`; the window's base doubles as the
            // result register, same convention as CALL's `dst`.
            let count_u8 = u8::try_from(count).map_err(|_| LowerError::RegisterWindowExhausted(REGISTER_COUNT))?;
            let base = alloc.alloc_window(count_u8.max(1))?;
            for (i, src) in elements.iter().enumerate() {
                emit(
                    out,
                    RegInstr {
                        op: RegOp::Move,
                        dst: base + i as u8,
                        src1: *src,
                        src2: 0,
                    },
                );
            }
            alloc.push(base);
            let [hi, lo] = count.to_be_bytes();
            emit(out, RegInstr { op: RegOp::NewArray, dst: base, src1: hi, src2: lo });
        }
        OpCode::ArrayGet => binary!(RegOp::ArrayGet),
        OpCode::ArraySet => {
            // ARRAY_SET is ternary (array, index, value) but a RegInstr only
            // carries two source operands besides dst; the value travels
            // through the fixed SLICE_THIRD_ARG_REGISTER the same way the
            // spec's lowering uses it for SLICE's third argument. The stack
            // opcode returns the assigned value, so `value`'s register is
            // kept (not released) and re-pushed.
            let value = alloc.take(out, options, line)?;
            let index = alloc.pop(out, options, line)?;
            let array = alloc.pop(out, options, line)?;
            emit(
                out,
                RegInstr {
                    op: RegOp::Move,
                    dst: crate::register::SLICE_THIRD_ARG_REGISTER,
                    src1: value,
                    src2: 0,
                },
            );
            emit(
                out,
                RegInstr {
                    op: RegOp::ArraySet,
                    dst: 0,
                    src1: array,
                    src2: index,
                },
            );
            alloc.push(value);
        }
        OpCode::ArrayPush => {
            // Stack ARRAY_PUSH returns the array itself; keep its register
            // live instead of releasing it.
            let value = alloc.pop(out, options, line)?;
            let array = alloc.take(out, options, line)?;
            emit(
                out,
                RegInstr {
                    op: RegOp::ArrayPush,
                    dst: 0,
                    src1: array,
                    src2: value,
                },
            );
            alloc.push(array);
        }
        OpCode::ArrayPop => unary!(RegOp::ArrayPop),
        OpCode::ArrayLen => unary!(RegOp::ArrayLen),
        OpCode::FormatPrint => {
            let arg_count = chunk.code()[offset + 1];
            let mut args = Vec::with_capacity(arg_count as usize);
            for _ in 0..arg_count {
                args.push(alloc.pop(out, options, line)?);
            }
            args.reverse();
            let format = alloc.pop(out, options, line)?;
            // Window layout: [format, arg0, arg1, ...] contiguous, matching
            // RegOp::FormatPrint's `src1(format reg), args from src1+1`.
            let base = alloc.alloc_window(arg_count + 1)?;
            emit(out, RegInstr { op: RegOp::Move, dst: base, src1: format, src2: 0 });
            for (i, src) in args.iter().enumerate() {
                emit(
                    out,
                    RegInstr {
                        op: RegOp::Move,
                        dst: base + 1 + i as u8,
                        src1: *src,
                        src2: 0,
                    },
                );
            }
            let dst = alloc.push_new(out, options, line)?;
            emit(
                out,
                RegInstr {
                    op: RegOp::FormatPrint,
                    dst,
                    src1: base,
                    src2: arg_count,
                },
            );
        }
        OpCode::Print => {
            // Stack PRINT pushes Nil back after printing; mirror that so
            // shadow-stack depth matches the stack chunk at every offset.
            let value = alloc.pop(out, options, line)?;
            let dst = alloc.push_new(out, options, line)?;
            emit(out, RegInstr { op: RegOp::Print, dst, src1: value, src2: 0 });
        }
        OpCode::Concat => binary!(RegOp::Concat),
        OpCode::CastI32 => unary!(RegOp::CastI32),
        OpCode::CastI64 => unary!(RegOp::CastI64),
        OpCode::CastU32 => unary!(RegOp::CastU32),
        OpCode::CastU64 => unary!(RegOp::CastU64),
        OpCode::CastF64 => unary!(RegOp::CastF64),
        OpCode::CastBool => unary!(RegOp::CastBool),
        OpCode::TypeOf => unary!(RegOp::TypeOf),
        OpCode::Throw => {
            let value = alloc.pop(out, options, line)?;
            emit(out, RegInstr { op: RegOp::Throw, dst: 0, src1: value, src2: 0 });
        }
        OpCode::PushTry => {
            let rel = chunk.read_i16(offset + 1);
            let catch_var = chunk.read_u16(offset + 3);
            // Stack PUSH_TRY is 5 bytes wide (opcode + i16 offset + u16
            // catch-variable const index); the offset is relative to the
            // byte just past the whole instruction.
            let target = (offset as i64 + 5 + i64::from(rel)) as usize;
            let catch_var =
                u8::try_from(catch_var).map_err(|_| LowerError::RegisterWindowExhausted(REGISTER_COUNT))?;
            let reg_offset = emit(
                out,
                RegInstr {
                    op: RegOp::PushTry,
                    dst: catch_var,
                    src1: 0,
                    src2: 0,
                },
            );
            map.pending.push((reg_offset, target));
        }
        OpCode::PopTry => {
            emit(out, RegInstr { op: RegOp::PopTry, dst: 0, src1: 0, src2: 0 });
        }
        OpCode::NewRange => binary!(RegOp::NewRange),
        OpCode::RangeNext => {
            let iter = alloc.peek(out, options, line)?;
            let dst = alloc.push_new(out, options, line)?;
            let ok = alloc.push_new(out, options, line)?;
            emit(out, RegInstr { op: RegOp::RangeNext, dst, src1: iter, src2: 0 });
            emit(out, RegInstr { op: RegOp::RangeNextOk, dst: ok, src1: 0, src2: 0 });
            let rel = chunk.read_i16(offset + 1);
            let target = (offset as i64 + 3 + i64::from(rel)) as usize;
            let reg_offset = emit(
                out,
                RegInstr {
                    op: RegOp::JumpIfFalse,
                    dst: ok,
                    src1: 0,
                    src2: 0,
                },
            );
            map.pending.push((reg_offset, target));
            alloc.pop(out, options, line)?; // ok flag consumed by the jump
        }
        OpCode::Import => {
            let index = chunk.read_u16(offset + 1);
            let dst = alloc.push_new(out, options, line)?;
            let [hi, lo] = index.to_be_bytes();
            emit(out, RegInstr { op: RegOp::Import, dst, src1: hi, src2: lo });
        }
        OpCode::GcPause => {
            emit(out, RegInstr { op: RegOp::GcPause, dst: 0, src1: 0, src2: 0 });
        }
        OpCode::GcResume => {
            emit(out, RegInstr { op: RegOp::GcResume, dst: 0, src1: 0, src2: 0 });
        }
        OpCode::CallNative => {
            let name_index = chunk.read_u16(offset + 1);
            let arg_count = chunk.code()[offset + 3];
            let mut args = Vec::with_capacity(arg_count as usize);
            for _ in 0..arg_count {
                args.push(alloc.pop(out, options, line)?);
            }
            args.reverse();
            // Window layout: [dst(result), arg0, arg1, ...], matching
            // RegOp::CallNative's `dst, ...; args follow from dst+1`.
            let base = alloc.alloc_window(arg_count + 1)?;
            for (i, src) in args.iter().enumerate() {
                emit(
                    out,
                    RegInstr {
                        op: RegOp::Move,
                        dst: base + 1 + i as u8,
                        src1: *src,
                        src2: 0,
                    },
                );
            }
            alloc.push(base);
            let name_index = u8::try_from(name_index).map_err(|_| LowerError::RegisterWindowExhausted(REGISTER_COUNT))?;
            emit(
                out,
                RegInstr {
                    op: RegOp::CallNative,
                    dst: base,
                    src1: name_index,
                    src2: arg_count,
                },
            );
        }
    }

    Ok(())
}
