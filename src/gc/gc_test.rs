// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use super::*;
use crate::error::ErrorType;

#[test]
fn alloc_string_round_trips() {
    let mut heap = Heap::new();
    let v = heap.alloc_string("hello");
    assert_eq!(v.as_gc_ref().unwrap().as_string(), "hello");
}

#[test]
fn collect_frees_unreachable_string() {
    let mut heap = Heap::new();
    let _kept = heap.alloc_string("kept");
    let _dropped = heap.alloc_string("dropped");
    let roots = vec![_kept];

    let stats = heap.collect(roots.iter());
    assert_eq!(stats.objects_freed, 1);
    assert_eq!(roots[0].as_gc_ref().unwrap().as_string(), "kept");
}

#[test]
fn collect_traces_array_elements() {
    let mut heap = Heap::new();
    let inner = heap.alloc_string("inner");
    let outer = heap.alloc_array(vec![inner]);
    let roots = vec![outer];

    let stats = heap.collect(roots.iter());
    assert_eq!(stats.objects_freed, 0);
    let arr = roots[0].as_gc_ref().unwrap();
    assert_eq!(arr.as_array()[0].as_gc_ref().unwrap().as_string(), "inner");
}

#[test]
fn collect_frees_everything_when_no_roots() {
    let mut heap = Heap::new();
    heap.alloc_string("a");
    heap.alloc_string("b");
    heap.alloc_array(vec![]);

    let stats = heap.collect(core::iter::empty());
    assert_eq!(stats.objects_freed, 3);
    assert_eq!(heap.bytes_allocated(), 0);
}

#[test]
fn pause_resume_toggle_should_collect_gate() {
    let mut heap = Heap::new();
    heap.pause();
    assert!(!heap.should_collect());
    heap.resume();
    // threshold not crossed yet regardless of pause state
    assert!(!heap.should_collect());
}

#[test]
fn range_iterator_advances_and_exhausts() {
    let mut heap = Heap::new();
    let v = heap.alloc_range_iterator(0, 2);
    let r = v.as_gc_ref().unwrap();
    assert_eq!(r.range_next(), Some(0));
    assert_eq!(r.range_next(), Some(1));
    assert_eq!(r.range_next(), None);
}

#[test]
fn alloc_error_carries_kind_and_message() {
    let mut heap = Heap::new();
    let v = heap.alloc_error(ErrorType::Type, "bad cast");
    let r = v.as_gc_ref().unwrap();
    assert_eq!(r.error_kind(), ErrorType::Type);
    assert_eq!(r.error_message(), "bad cast");
}

#[test]
fn drop_frees_all_objects_without_collect() {
    let mut heap = Heap::new();
    heap.alloc_string("never collected");
    heap.alloc_array(vec![]);
    drop(heap);
}
