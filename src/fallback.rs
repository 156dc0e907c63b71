//! libc-backed fallback allocator.

use core::ptr::NonNull;

use crate::{AllocError, AllocResult, FallbackAllocator};

/// Fallback allocator forwarding to the C library heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcFallback;

impl FallbackAllocator for LibcFallback {
    fn alloc(&self, size: usize) -> AllocResult<NonNull<u8>> {
        // malloc(0) may legally return NULL; ask for one byte instead
        let ptr = unsafe { libc::malloc(size.max(1)) } as *mut u8;
        NonNull::new(ptr).ok_or(AllocError::NoMemory)
    }

    fn calloc(&self, count: usize, size: usize) -> AllocResult<NonNull<u8>> {
        let ptr = unsafe { libc::calloc(count.max(1), size.max(1)) } as *mut u8;
        NonNull::new(ptr).ok_or(AllocError::NoMemory)
    }

    unsafe fn realloc(&self, ptr: NonNull<u8>, size: usize) -> AllocResult<NonNull<u8>> {
        let new = unsafe { libc::realloc(ptr.as_ptr().cast(), size.max(1)) } as *mut u8;
        NonNull::new(new).ok_or(AllocError::NoMemory)
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        unsafe { libc::free(ptr.as_ptr().cast()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_libc_fallback_roundtrip() {
        let fallback = LibcFallback;
        let ptr = fallback.alloc(64).unwrap();
        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 64);
            let grown = fallback.realloc(ptr, 256).unwrap();
            assert_eq!(*grown.as_ptr().add(63), 0xAB);
            fallback.free(grown);
        }
    }

    #[test]
    fn test_libc_fallback_calloc_zeroed() {
        let fallback = LibcFallback;
        let ptr = fallback.calloc(16, 8).unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 128) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { fallback.free(ptr) };
    }
}
