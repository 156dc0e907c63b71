//! Anonymous `mmap` zone mapper.
//!
//! Zones must be aligned to their own size so that `addr >> zone_order`
//! identifies the owning zone. `mmap` only guarantees page alignment, so
//! regions larger than a page are over-mapped by one zone and the unaligned
//! head and tail are trimmed away.

use core::ptr::{self, NonNull};

#[cfg(feature = "log")]
use log::warn;

use crate::{align_up, AllocError, AllocResult, ZoneMapper};

/// Zone mapper using private anonymous mappings.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapZoneMapper;

fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        0x1000
    } else {
        size as usize
    }
}

unsafe fn os_mmap(size: usize) -> *mut u8 {
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        ptr::null_mut()
    } else {
        ptr as *mut u8
    }
}

unsafe fn os_munmap(ptr: *mut u8, size: usize) {
    if unsafe { libc::munmap(ptr.cast(), size) } != 0 {
        warn!("munmap({:p}, {:#x}) failed", ptr, size);
    }
}

impl ZoneMapper for MmapZoneMapper {
    fn map(&self, size: usize) -> AllocResult<NonNull<u8>> {
        if size == 0 || !size.is_power_of_two() {
            return Err(AllocError::InvalidParam);
        }

        let page = page_size();
        if size <= page {
            // Page alignment already covers any smaller power of two
            let raw = unsafe { os_mmap(page) };
            return NonNull::new(raw).ok_or(AllocError::MapFailed);
        }

        let span = size.checked_mul(2).ok_or(AllocError::InvalidParam)?;
        let raw = unsafe { os_mmap(span) };
        if raw.is_null() {
            return Err(AllocError::MapFailed);
        }

        let raw_addr = raw as usize;
        let aligned = align_up(raw_addr, size);
        let head = aligned - raw_addr;
        let tail = span - head - size;
        unsafe {
            if head > 0 {
                os_munmap(raw, head);
            }
            if tail > 0 {
                os_munmap((aligned + size) as *mut u8, tail);
            }
        }

        NonNull::new(aligned as *mut u8).ok_or(AllocError::MapFailed)
    }

    unsafe fn unmap(&self, base: NonNull<u8>, size: usize) {
        unsafe { os_munmap(base.as_ptr(), size.max(page_size())) };
    }
}
