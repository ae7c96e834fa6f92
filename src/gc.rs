// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tracing, stop-the-world mark-sweep collector.
//!
//! `Heap` owns every allocation through an intrusive singly-linked list of
//! [`ObjHeader`]s. Collection runs every `GC_INTERVAL` allocated
//! bytes, unless paused by `GC_PAUSE`/`GC_RESUME` (the `GcHint` opcodes).
//! There is no compaction and no generations: a live object is marked in
//! place and left where it is; dead objects are unlinked and freed.

#[cfg(test)]
mod gc_test;

use crate::error::ErrorType;
use crate::value::object::{GcRef, ObjArray, ObjError, ObjHeader, ObjKind, ObjRangeIterator, ObjString};
use crate::value::Value;
use core::ptr::NonNull;

/// Bytes allocated before the first automatic collection is considered.
const INITIAL_GC_THRESHOLD: usize = 1024 * 1024;

/// Growth factor applied to the threshold after each collection, so the
/// collector's share of total runtime shrinks as the live set grows.
const GC_GROWTH_FACTOR: usize = 2;

/// Statistics reported after a collection cycle, used for the `tracing`
/// event emitted by `Heap::collect` and exercised by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectStats {
    pub bytes_before: usize,
    pub bytes_after: usize,
    pub objects_freed: usize,
}

/// Owner of every heap allocation made during a VM run.
pub struct Heap {
    objects: Option<NonNull<ObjHeader>>,
    bytes_allocated: usize,
    next_gc: usize,
    gc_paused: bool,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: None,
            bytes_allocated: 0,
            next_gc: INITIAL_GC_THRESHOLD,
            gc_paused: false,
        }
    }

    #[must_use]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// `GC_PAUSE`: disable automatic collection around hot regions.
    pub fn pause(&mut self) {
        self.gc_paused = true;
    }

    /// `GC_RESUME`: re-enable automatic collection.
    pub fn resume(&mut self) {
        self.gc_paused = false;
    }

    /// Whether the allocator thinks a collection is due. Interpreters check
    /// this every N instructions and call [`Heap::collect`] with their roots
    /// when it returns `true` and collection is not paused.
    #[must_use]
    pub fn should_collect(&self) -> bool {
        !self.gc_paused && self.bytes_allocated >= self.next_gc
    }

    fn link(&mut self, header: NonNull<ObjHeader>, size: usize) {
        // SAFETY: header was just allocated via Box::into_raw below and is
        // not yet reachable from anywhere else.
        unsafe {
            (*header.as_ptr()).next = self.objects;
        }
        self.objects = Some(header);
        self.bytes_allocated += size;
    }

    pub fn alloc_string(&mut self, s: &str) -> Value {
        let bytes: Box<[u8]> = s.as_bytes().into();
        let size = bytes.len();
        let boxed = Box::new(ObjString {
            header: ObjHeader {
                kind: ObjKind::String,
                marked: false,
                next: None,
            },
            bytes,
        });
        let ptr = NonNull::from(Box::leak(boxed)).cast::<ObjHeader>();
        self.link(ptr, size + core::mem::size_of::<ObjString>());
        // SAFETY: ptr was just linked into this heap's object list.
        Value::String(unsafe { GcRef::from_header(ptr) })
    }

    pub fn alloc_array(&mut self, elements: Vec<Value>) -> Value {
        let size = elements.capacity() * core::mem::size_of::<Value>();
        let boxed = Box::new(ObjArray {
            header: ObjHeader {
                kind: ObjKind::Array,
                marked: false,
                next: None,
            },
            elements,
        });
        let ptr = NonNull::from(Box::leak(boxed)).cast::<ObjHeader>();
        self.link(ptr, size + core::mem::size_of::<ObjArray>());
        Value::Array(unsafe { GcRef::from_header(ptr) })
    }

    pub fn alloc_error(&mut self, kind: ErrorType, message: impl Into<Box<str>>) -> Value {
        let message = message.into();
        let size = message.len();
        let boxed = Box::new(ObjError {
            header: ObjHeader {
                kind: ObjKind::Error,
                marked: false,
                next: None,
            },
            kind,
            message,
        });
        let ptr = NonNull::from(Box::leak(boxed)).cast::<ObjHeader>();
        self.link(ptr, size + core::mem::size_of::<ObjError>());
        Value::Error(unsafe { GcRef::from_header(ptr) })
    }

    pub fn alloc_range_iterator(&mut self, current: i64, end: i64) -> Value {
        let boxed = Box::new(ObjRangeIterator {
            header: ObjHeader {
                kind: ObjKind::RangeIterator,
                marked: false,
                next: None,
            },
            current,
            end,
        });
        let ptr = NonNull::from(Box::leak(boxed)).cast::<ObjHeader>();
        self.link(ptr, core::mem::size_of::<ObjRangeIterator>());
        Value::RangeIterator(unsafe { GcRef::from_header(ptr) })
    }

    /// Run a full mark-sweep cycle. `roots` yields every `Value` directly
    /// reachable from the interpreter(s): value stacks, the auxiliary i64
    /// shadow stack's *owning* values, globals, call-frame-preserved
    /// values, try-frame catch variables, `lastError`, and any live
    /// register-VM windows.
    pub fn collect<'a>(&mut self, roots: impl Iterator<Item = &'a Value>) -> CollectStats {
        let bytes_before = self.bytes_allocated;

        let mut gray: Vec<GcRef> = Vec::new();
        for root in roots {
            if let Some(r) = root.as_gc_ref() {
                mark(r, &mut gray);
            }
        }
        while let Some(r) = gray.pop() {
            trace_children(r, &mut gray);
        }

        let objects_freed = self.sweep();

        self.next_gc = self.bytes_allocated.saturating_mul(GC_GROWTH_FACTOR).max(INITIAL_GC_THRESHOLD);

        let stats = CollectStats {
            bytes_before,
            bytes_after: self.bytes_allocated,
            objects_freed,
        };
        tracing::debug!(
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            objects_freed = stats.objects_freed,
            "gc cycle"
        );
        stats
    }

    /// Unlink and free every unmarked object, clearing mark bits on survivors.
    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        let mut current = self.objects;
        let mut prev: Option<NonNull<ObjHeader>> = None;

        while let Some(node) = current {
            // SAFETY: every node on this list was linked by `link` and is
            // still owned by this heap.
            let (marked, kind, next) = unsafe {
                let header = node.as_ref();
                (header.marked, header.kind, header.next)
            };

            if marked {
                unsafe {
                    (*node.as_ptr()).marked = false;
                }
                prev = Some(node);
                current = next;
                continue;
            }

            // Unlink.
            match prev {
                Some(p) => unsafe { (*p.as_ptr()).next = next },
                None => self.objects = next,
            }
            current = next;
            freed += 1;
            self.bytes_allocated = self.bytes_allocated.saturating_sub(object_size(node, kind));
            free_object(node, kind);
        }

        freed
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let mut current = self.objects.take();
        while let Some(node) = current {
            // SAFETY: every node was linked by `link` and is dropped exactly once here.
            let (kind, next) = unsafe { (node.as_ref().kind, node.as_ref().next) };
            current = next;
            free_object(node, kind);
        }
    }
}

fn mark(r: GcRef, gray: &mut Vec<GcRef>) {
    if r.is_marked() {
        return;
    }
    r.set_marked(true);
    gray.push(r);
}

fn trace_children(r: GcRef, gray: &mut Vec<GcRef>) {
    if r.kind() == ObjKind::Array {
        for elem in r.as_array() {
            if let Some(child) = elem.as_gc_ref() {
                mark(child, gray);
            }
        }
    }
}

fn object_size(node: NonNull<ObjHeader>, kind: ObjKind) -> usize {
    match kind {
        ObjKind::String => {
            let obj = node.cast::<ObjString>();
            core::mem::size_of::<ObjString>() + unsafe { obj.as_ref().bytes.len() }
        }
        ObjKind::Array => {
            let obj = node.cast::<ObjArray>();
            core::mem::size_of::<ObjArray>()
                + unsafe { obj.as_ref().elements.capacity() } * core::mem::size_of::<Value>()
        }
        ObjKind::Error => {
            let obj = node.cast::<ObjError>();
            core::mem::size_of::<ObjError>() + unsafe { obj.as_ref().message.len() }
        }
        ObjKind::RangeIterator => core::mem::size_of::<ObjRangeIterator>(),
    }
}

/// Reconstruct the concrete boxed type from its header pointer and drop it.
fn free_object(node: NonNull<ObjHeader>, kind: ObjKind) {
    // SAFETY: `node` was produced by `Box::leak(Box::new(Obj*{ .. }))` and
    // cast to `NonNull<ObjHeader>`; `ObjHeader` is the first `#[repr(C)]`
    // field of every `Obj*` type, so casting back and reconstructing the
    // `Box` here is the exact inverse of `alloc_*` and runs at most once per
    // live allocation (sweep unlinks before calling this; Drop takes the
    // list so nothing else can reach these pointers afterward).
    unsafe {
        match kind {
            ObjKind::String => drop(Box::from_raw(node.cast::<ObjString>().as_ptr())),
            ObjKind::Array => drop(Box::from_raw(node.cast::<ObjArray>().as_ptr())),
            ObjKind::Error => drop(Box::from_raw(node.cast::<ObjError>().as_ptr())),
            ObjKind::RangeIterator => {
                drop(Box::from_raw(node.cast::<ObjRangeIterator>().as_ptr()));
            }
        }
    }
}
