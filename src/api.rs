//! Handle-optional entry points
//!
//! Mirrors the `ZoneHeap` methods for callers that may not hold a heap.
//! Without a handle every request goes to [`LibcFallback`], so pointers
//! obtained either way can be released through these functions as long as
//! the same handle (or lack of one) is passed.

use core::ptr::NonNull;

use crate::{AllocResult, FallbackAllocator, LibcFallback, ZoneHeap};

/// Create a heap; see [`ZoneHeap::create`]
pub fn create(
    initial_size: usize,
    max_size: usize,
    delta_size: usize,
    zone_size: usize,
) -> AllocResult<ZoneHeap> {
    ZoneHeap::create(initial_size, max_size, delta_size, zone_size)
}

/// Tear a heap down, unmapping all of its zones
pub fn destroy(heap: ZoneHeap) {
    heap.destroy();
}

pub fn alloc(size: usize, heap: Option<&ZoneHeap>) -> AllocResult<NonNull<u8>> {
    match heap {
        Some(heap) => heap.alloc(size),
        None => LibcFallback.alloc(size),
    }
}

pub fn calloc(count: usize, size: usize, heap: Option<&ZoneHeap>) -> AllocResult<NonNull<u8>> {
    match heap {
        Some(heap) => heap.calloc(count, size),
        None => LibcFallback.calloc(count, size),
    }
}

/// Resize `ptr`; a zero `size` releases it and yields `Ok(None)`.
///
/// # Safety
/// `ptr`, if present, must be live and come from the same `heap` argument.
pub unsafe fn realloc(
    ptr: Option<NonNull<u8>>,
    size: usize,
    heap: Option<&ZoneHeap>,
) -> AllocResult<Option<NonNull<u8>>> {
    if let Some(heap) = heap {
        return unsafe { heap.realloc(ptr, size) };
    }
    match (ptr, size) {
        (None, _) => LibcFallback.alloc(size).map(Some),
        (Some(ptr), 0) => {
            unsafe { LibcFallback.free(ptr) };
            Ok(None)
        }
        (Some(ptr), _) => unsafe { LibcFallback.realloc(ptr, size) }.map(Some),
    }
}

/// # Safety
/// `ptr` must be live and come from the same `heap` argument.
pub unsafe fn free(ptr: NonNull<u8>, heap: Option<&ZoneHeap>) {
    match heap {
        Some(heap) => unsafe { heap.free(ptr) },
        None => unsafe { LibcFallback.free(ptr) },
    }
}
