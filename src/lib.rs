//! Zone Buddy Allocator
//!
//! A pluggable heap for long-running server processes that want to reclaim
//! large contiguous regions in bulk rather than one object at a time:
//! - Fixed-size, size-aligned virtual-memory zones
//! - Power-of-two buddy blocks with per-order free lists
//! - Per-zone pair bitmaps for O(1) buddy-state queries
//! - Batch-replenished node pool that never recurses into the heap
//! - Graceful growth and fallback to a general-purpose allocator

#![no_std]

extern crate alloc;

use core::ptr::NonNull;

// Logging support - conditionally import log crate
#[cfg(feature = "log")]
extern crate log;

// Stub macros when log is disabled - these become no-ops
#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// Default zone size (512 KiB)
pub const DEFAULT_ZONE_SIZE: usize = 0x8_0000;

/// Default growth step (8 MiB)
pub const DEFAULT_ZONE_DELTA: usize = 0x80_0000;

/// Default number of list nodes obtained per pool replenishment
pub const DEFAULT_POOL_BATCH: usize = 256;

/// The error type used for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Invalid `size` or zone geometry. (e.g. zone size not a power of two)
    InvalidParam,
    /// No enough memory to allocate.
    NoMemory,
    /// The virtual-memory mapping primitive refused to map a zone.
    MapFailed,
}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

/// General-purpose allocator used when zone capacity is exhausted, for
/// pointers not owned by any zone, and for node-pool batch storage.
///
/// Implementations follow C `malloc` semantics: blocks are released without
/// a size, and the returned memory is aligned for any fundamental type.
pub trait FallbackAllocator: Send + Sync {
    /// Allocate `size` bytes.
    fn alloc(&self, size: usize) -> AllocResult<NonNull<u8>>;

    /// Allocate `count * size` zeroed bytes.
    fn calloc(&self, count: usize, size: usize) -> AllocResult<NonNull<u8>>;

    /// Resize a block previously returned by this allocator.
    ///
    /// On failure the original block is left untouched.
    ///
    /// # Safety
    /// `ptr` must have been produced by this allocator and not yet released.
    unsafe fn realloc(&self, ptr: NonNull<u8>, size: usize) -> AllocResult<NonNull<u8>>;

    /// Release a block previously returned by this allocator.
    ///
    /// # Safety
    /// `ptr` must have been produced by this allocator and not yet released.
    unsafe fn free(&self, ptr: NonNull<u8>);
}

/// Virtual-memory primitive that backs zones.
pub trait ZoneMapper: Send + Sync {
    /// Map `size` bytes of zeroed read/write memory aligned to `size`.
    ///
    /// `size` is always a power of two.
    fn map(&self, size: usize) -> AllocResult<NonNull<u8>>;

    /// Unmap a region previously returned by [`ZoneMapper::map`].
    ///
    /// # Safety
    /// `base` and `size` must describe exactly one live mapping.
    unsafe fn unmap(&self, base: NonNull<u8>, size: usize);
}

#[inline]
const fn align_up(pos: usize, align: usize) -> usize {
    (pos + align - 1) & !(align - 1)
}

/// Checks whether the address has the demanded alignment.
///
/// Equivalent to `addr % align == 0`, but the alignment must be a power of two.
#[inline]
const fn is_aligned(base_addr: usize, align: usize) -> bool {
    base_addr & (align - 1) == 0
}

pub mod fallback;
pub use fallback::LibcFallback;

pub mod mapper;
pub use mapper::MmapZoneMapper;

pub mod zone;
pub use zone::{
    BlockHeader, HeapConfig, HeapStats, PoolStats, ZoneHeap, BLOCK_ALIGN, HEADER_SIZE, MIN_ORDER,
};

pub mod api;
