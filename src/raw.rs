//! Ordered raw memory access over mapped index bytes.
//!
//! This is the one place in the crate that performs unsafe pointer casts to implement the
//! publication protocol: the appender release-stores a slot, readers acquire-load it, with a
//! single re-read as a fallback for a value caught mid-publication.

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

/// Reads the 8-byte line base at `offset` with acquire semantics.
///
/// # Safety
///
/// `ptr` must point to at least `offset + 8` readable bytes, 8-byte aligned at `offset`.
pub(crate) unsafe fn load_i64_acquire(ptr: *const u8, offset: u64) -> i64 {
    let atomic = ptr.add(offset as usize) as *const AtomicI64;
    (*atomic).load(Ordering::Acquire)
}

/// Writes the 8-byte line base at `offset` with plain (non-atomic-ordered) semantics.
///
/// Used for the line-base write, which the data model requires to happen-before any slot in that
/// line is published, but which is not itself observed independently by a concurrent reader.
///
/// # Safety
///
/// `ptr` must point to at least `offset + 8` writable bytes, 8-byte aligned at `offset`.
pub(crate) unsafe fn store_i64_plain(ptr: *mut u8, offset: u64, value: i64) {
    let atomic = ptr.add(offset as usize) as *const AtomicI64;
    (*atomic).store(value, Ordering::Relaxed);
}

/// Reads the 4-byte slot at `offset`, acquire-ordered, with a single volatile re-read if the
/// first load observes zero (mirrors the source's "reread on not-yet-visible" fallback).
///
/// # Safety
///
/// `ptr` must point to at least `offset + 4` readable bytes, 4-byte aligned at `offset`.
pub(crate) unsafe fn load_i32_acquire_with_retry(ptr: *const u8, offset: u64) -> i32 {
    let atomic = ptr.add(offset as usize) as *const AtomicI32;
    let first = (*atomic).load(Ordering::Acquire);
    if first != 0 {
        return first;
    }
    (*atomic).load(Ordering::Acquire)
}

/// Publishes a 4-byte slot at `offset` with release semantics.
///
/// # Safety
///
/// `ptr` must point to at least `offset + 4` writable bytes, 4-byte aligned at `offset`.
pub(crate) unsafe fn store_i32_release(ptr: *mut u8, offset: u64, value: i32) {
    let atomic = ptr.add(offset as usize) as *const AtomicI32;
    (*atomic).store(value, Ordering::Release);
}

/// Plain (unordered) read of an 8-byte value, used by recovery which runs before any concurrent
/// reader or writer exists.
///
/// # Safety
///
/// `ptr` must point to at least `offset + 8` readable bytes, 8-byte aligned at `offset`.
pub(crate) unsafe fn load_i64_plain(ptr: *const u8, offset: u64) -> i64 {
    let atomic = ptr.add(offset as usize) as *const AtomicI64;
    (*atomic).load(Ordering::Relaxed)
}

/// Plain (unordered) read of a 4-byte value, used by recovery.
///
/// # Safety
///
/// `ptr` must point to at least `offset + 4` readable bytes, 4-byte aligned at `offset`.
pub(crate) unsafe fn load_i32_plain(ptr: *const u8, offset: u64) -> i32 {
    let atomic = ptr.add(offset as usize) as *const AtomicI32;
    (*atomic).load(Ordering::Relaxed)
}
