//! Zone block metadata
//!
//! Free-list entries, the in-band allocation header, and the geometry that
//! maps request sizes to block orders.

use core::mem::size_of;

/// In-band header stored immediately before every pointer handed out.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Zone allocation epoch at the time the block was handed out
    pub epoch: usize,
    /// Requested payload size, excluding the header
    pub size: usize,
}

/// Size of [`BlockHeader`] in bytes (two machine words)
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

/// Alignment of every returned payload pointer
pub const BLOCK_ALIGN: usize = 16;

/// Smallest block order: room for the header plus one aligned payload unit
pub const MIN_ORDER: usize =
    (HEADER_SIZE + BLOCK_ALIGN).next_power_of_two().trailing_zeros() as usize;

/// Largest order a zone may have on this target
pub const MAX_ORDER_LIMIT: usize = usize::BITS as usize - 1;

/// Free block record held by a free list
#[derive(Debug, Clone, Copy)]
pub struct FreeBlock {
    pub addr: usize,
    pub zone: usize,
}

impl FreeBlock {
    pub const fn new(addr: usize, zone: usize) -> Self {
        Self { addr, zone }
    }

    /// Address of the buddy of this block at `order` within the zone at `zone_base`
    pub fn buddy_addr(&self, zone_base: usize, order: usize) -> usize {
        zone_base + ((self.addr - zone_base) ^ (1 << order))
    }
}

impl PartialOrd for FreeBlock {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        self.addr.partial_cmp(&other.addr)
    }
}

impl PartialEq for FreeBlock {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr && self.zone == other.zone
    }
}

impl Eq for FreeBlock {}

/// Order range of a heap whose zones are `1 << max_order` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneGeometry {
    pub max_order: usize,
    pub min_order: usize,
}

impl ZoneGeometry {
    pub const fn new(zone_size: usize) -> Self {
        Self {
            max_order: zone_size.trailing_zeros() as usize,
            min_order: MIN_ORDER,
        }
    }

    pub const fn zone_size(&self) -> usize {
        1 << self.max_order
    }

    /// Order of the block needed to hold `size` payload bytes plus the header.
    ///
    /// Returns `None` when the request cannot fit in a single zone.
    pub fn order_for(&self, size: usize) -> Option<usize> {
        let total = size.checked_add(HEADER_SIZE + BLOCK_ALIGN - 1)? & !(BLOCK_ALIGN - 1);
        let order = total.checked_next_power_of_two()?.trailing_zeros() as usize;
        let order = order.max(self.min_order);
        (order <= self.max_order).then_some(order)
    }
}
