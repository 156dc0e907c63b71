//! Zone heap: multi-zone buddy allocator with fallback
//!
//! Owns the zones, the order-indexed free lists, the per-zone pair bitmaps,
//! the zone index and the node pool, all behind one lock. Zone growth (and
//! the mapping call it makes) also runs under that lock.
//!
//! Every pointer handed out is preceded by a [`BlockHeader`]. Pointers that
//! the zone index does not recognise belong to the fallback allocator, so
//! every free and resize pays one index lookup to classify its argument.

use alloc::vec;
use alloc::vec::Vec;
use core::ptr::{self, NonNull};

use kspin::SpinNoIrq;

#[cfg(feature = "log")]
use log::{debug, error, info, trace, warn};

#[cfg(feature = "log")]
use super::stats::MemoryStatsReporter;

use super::{
    object_pool::ObjectPool,
    order_lists::OrderFreeLists,
    stats::HeapStats,
    zone_bitmap::ZoneBitmaps,
    zone_block::{BlockHeader, FreeBlock, ZoneGeometry, HEADER_SIZE, MIN_ORDER},
    zone_index::ZoneIndex,
};
use crate::{
    is_aligned, AllocError, AllocResult, FallbackAllocator, LibcFallback, MmapZoneMapper,
    ZoneMapper, DEFAULT_POOL_BATCH, DEFAULT_ZONE_DELTA, DEFAULT_ZONE_SIZE,
};

/// Zone heap configuration
///
/// Zero fields select the defaults: [`DEFAULT_ZONE_SIZE`],
/// [`DEFAULT_ZONE_DELTA`] and [`DEFAULT_POOL_BATCH`]. A zero (or smaller than
/// `initial_size`) `max_size` disables growth beyond the initial zones.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    pub initial_size: usize,
    pub max_size: usize,
    pub delta_size: usize,
    pub zone_size: usize,
    pub pool_batch: usize,
}

impl HeapConfig {
    pub const fn new(
        initial_size: usize,
        max_size: usize,
        delta_size: usize,
        zone_size: usize,
    ) -> Self {
        Self {
            initial_size,
            max_size,
            delta_size,
            zone_size,
            pool_batch: 0,
        }
    }

    /// Set the number of list nodes obtained per pool replenishment
    pub const fn with_pool_batch(mut self, pool_batch: usize) -> Self {
        self.pool_batch = pool_batch;
        self
    }
}

/// A single mapped zone
struct Zone {
    base: usize,
    bitmaps: ZoneBitmaps,
    /// Allocation epoch, recorded in every header handed out from this zone
    epoch: usize,
}

/// State guarded by the heap lock
struct HeapInner {
    zones: Vec<Zone>,
    free_lists: OrderFreeLists,
    index: ZoneIndex,
    pool: ObjectPool,
}

/// Zone-based buddy heap
pub struct ZoneHeap<F: FallbackAllocator = LibcFallback, M: ZoneMapper = MmapZoneMapper> {
    geometry: ZoneGeometry,
    max_zones: usize,
    delta_zones: usize,
    inner: SpinNoIrq<HeapInner>,
    fallback: F,
    mapper: M,
}

impl ZoneHeap {
    /// Create a heap backed by `mmap` zones and the libc heap.
    ///
    /// Sizes are rounded up to whole zones; zero parameters take defaults.
    pub fn create(
        initial_size: usize,
        max_size: usize,
        delta_size: usize,
        zone_size: usize,
    ) -> AllocResult<Self> {
        Self::with_config(
            HeapConfig::new(initial_size, max_size, delta_size, zone_size),
            LibcFallback,
            MmapZoneMapper,
        )
    }
}

impl<F: FallbackAllocator, M: ZoneMapper> ZoneHeap<F, M> {
    /// Create a heap with explicit collaborators and map its initial zones
    pub fn with_config(config: HeapConfig, fallback: F, mapper: M) -> AllocResult<Self> {
        let zone_size = match config.zone_size {
            0 => DEFAULT_ZONE_SIZE,
            size => size,
        };
        if !zone_size.is_power_of_two() || zone_size < (1 << MIN_ORDER) {
            error!(
                "zone heap: zone size {:#x} must be a power of two of at least {:#x}",
                zone_size,
                1usize << MIN_ORDER
            );
            return Err(AllocError::InvalidParam);
        }

        let geometry = ZoneGeometry::new(zone_size);
        let initial_zones = config.initial_size.div_ceil(zone_size);
        let max_zones = if config.max_size != 0 && config.max_size >= config.initial_size {
            config.max_size.div_ceil(zone_size)
        } else {
            initial_zones
        };
        let delta_zones = match config.delta_size {
            0 => DEFAULT_ZONE_DELTA,
            size => size,
        }
        .div_ceil(zone_size);
        let pool_batch = match config.pool_batch {
            0 => DEFAULT_POOL_BATCH,
            batch => batch,
        };

        let heap = Self {
            geometry,
            max_zones,
            delta_zones,
            inner: SpinNoIrq::new(HeapInner {
                zones: Vec::new(),
                free_lists: OrderFreeLists::new(geometry.min_order, geometry.max_order),
                index: ZoneIndex::new(geometry.max_order),
                pool: ObjectPool::new(pool_batch),
            }),
            fallback,
            mapper,
        };

        {
            let mut inner = heap.inner.lock();
            for _ in 0..initial_zones {
                heap.add_zone(&mut inner)?;
            }
        }

        info!(
            "zone heap: created with {} zones of {:#x} bytes (max {}, delta {})",
            initial_zones, zone_size, max_zones, delta_zones
        );
        Ok(heap)
    }

    /// Tear the heap down, unmapping every zone.
    ///
    /// Equivalent to dropping the heap. Pointers into the zones dangle
    /// afterwards; fallback-served pointers stay valid.
    pub fn destroy(self) {
        drop(self);
    }

    pub fn zone_size(&self) -> usize {
        self.geometry.zone_size()
    }

    pub fn max_zones(&self) -> usize {
        self.max_zones
    }

    pub fn delta_zones(&self) -> usize {
        self.delta_zones
    }

    /// Number of zones currently mapped
    pub fn zone_count(&self) -> usize {
        self.inner.lock().zones.len()
    }

    /// Whether `ptr` lies inside one of this heap's zones
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.inner.lock().index.find(ptr as usize).is_some()
    }

    /// Map one zone and contribute it as a single top-order free block
    fn add_zone(&self, inner: &mut HeapInner) -> AllocResult {
        let zone_size = self.geometry.zone_size();
        let zone_id = inner.zones.len();

        // Reserve before mapping so a failure here leaves nothing to undo
        inner.zones.try_reserve(1).map_err(|_| AllocError::NoMemory)?;
        inner.pool.reserve(1, &self.fallback)?;
        let base = self.mapper.map(zone_size)?.as_ptr() as usize;
        debug_assert!(is_aligned(base, zone_size));

        let node = inner.pool.pop_node(&self.fallback)?;
        inner.zones.push(Zone {
            base,
            bitmaps: ZoneBitmaps::new(self.geometry.min_order, self.geometry.max_order),
            epoch: 0,
        });
        inner.free_lists.push_node(
            &mut inner.pool,
            self.geometry.max_order,
            node,
            FreeBlock::new(base, zone_id),
        );
        inner.index.insert(base, zone_id);

        debug!(
            "zone heap: zone {} mapped at [{:#x}, {:#x})",
            zone_id,
            base,
            base + zone_size
        );
        Ok(())
    }

    /// Map `delta_zones` more zones
    fn grow(&self, inner: &mut HeapInner) -> AllocResult {
        for _ in 0..self.delta_zones {
            self.add_zone(inner)?;
        }
        info!(
            "zone heap: grew to {} of {} zones",
            inner.zones.len(),
            self.max_zones
        );
        Ok(())
    }

    /// Detach a block of `order` from the free lists, splitting a larger one
    /// if needed, and stamp its header.
    ///
    /// Returns `Ok(None)` when no order up to the zone order has a free block.
    fn take_block(
        &self,
        inner: &mut HeapInner,
        order: usize,
        size: usize,
    ) -> AllocResult<Option<NonNull<u8>>> {
        let max_order = self.geometry.max_order;
        let Some(found) = inner.free_lists.first_nonempty(order) else {
            return Ok(None);
        };

        // One node per split level, so splitting never stops halfway
        inner.pool.reserve(found - order, &self.fallback)?;

        let HeapInner {
            zones,
            free_lists,
            pool,
            ..
        } = inner;
        let Some(block) = free_lists.pop(pool, found) else {
            return Ok(None);
        };
        let zone = &mut zones[block.zone];
        if found < max_order {
            zone.bitmaps.toggle(found, block.addr - zone.base);
        }

        let mut current = found;
        while current > order {
            current -= 1;
            let upper = FreeBlock::new(block.addr + (1 << current), block.zone);
            zone.bitmaps.toggle(current, upper.addr - zone.base);
            let node = pool.pop_node(&self.fallback)?;
            free_lists.push_node(pool, current, node, upper);
        }

        let header = BlockHeader {
            epoch: zone.epoch,
            size,
        };
        zone.epoch = zone.epoch.wrapping_add(1);
        unsafe { ptr::write(block.addr as *mut BlockHeader, header) };

        Ok(NonNull::new((block.addr + HEADER_SIZE) as *mut u8))
    }

    /// Return a block to its zone, merging with free buddies on the way up
    fn release_block(
        &self,
        inner: &mut HeapInner,
        zone_id: usize,
        addr: usize,
        order: usize,
    ) -> AllocResult {
        inner.pool.reserve(1, &self.fallback)?;

        let HeapInner {
            zones,
            free_lists,
            pool,
            ..
        } = inner;
        let zone = &mut zones[zone_id];
        let mut block = FreeBlock::new(addr, zone_id);
        let mut order = order;

        while order < self.geometry.max_order {
            let offset = block.addr - zone.base;
            if zone.bitmaps.toggle(order, offset) {
                // Buddy is allocated or split
                break;
            }

            let buddy = block.buddy_addr(zone.base, order);
            if free_lists.remove_addr(pool, order, buddy).is_none() {
                error!(
                    "zone heap: zone {} pair bit at order {} marks {:#x} free, but it is not on the free list",
                    zone_id, order, buddy
                );
                if cfg!(debug_assertions) {
                    panic!("zone heap: corrupted buddy state in zone {}", zone_id);
                }
                zone.bitmaps.set(order, offset, true);
                break;
            }

            block.addr = block.addr.min(buddy);
            order += 1;
        }

        let node = pool.pop_node(&self.fallback)?;
        free_lists.push_node(pool, order, node, block);
        Ok(())
    }

    /// Allocate `size` bytes.
    ///
    /// Served from the zones when possible, growing them while capacity
    /// remains; otherwise the whole request goes to the fallback allocator.
    pub fn alloc(&self, size: usize) -> AllocResult<NonNull<u8>> {
        let Some(order) = self.geometry.order_for(size) else {
            debug!(
                "zone heap: {} bytes cannot fit a zone of {:#x}, using fallback",
                size,
                self.geometry.zone_size()
            );
            return self.fallback.alloc(size);
        };

        loop {
            let mut inner = self.inner.lock();
            if let Some(ptr) = self.take_block(&mut inner, order, size)? {
                return Ok(ptr);
            }

            if inner.zones.len() + self.delta_zones > self.max_zones {
                #[cfg(feature = "log")]
                {
                    if log::log_enabled!(log::Level::Debug) {
                        MemoryStatsReporter::print_fallback_stats(
                            &self.collect_stats(&inner),
                            size,
                            order,
                        );
                    }
                }
                drop(inner);
                return self.fallback.alloc(size);
            }

            let zones_before = inner.zones.len();
            if let Err(_e) = self.grow(&mut inner) {
                warn!(
                    "zone heap: growth stopped at {} zones ({:?})",
                    inner.zones.len(),
                    _e
                );
                // Zones mapped before the failure are still usable
                if inner.zones.len() > zones_before {
                    if let Some(ptr) = self.take_block(&mut inner, order, size)? {
                        return Ok(ptr);
                    }
                }
                debug!("zone heap: using fallback for {} bytes", size);
                drop(inner);
                return self.fallback.alloc(size);
            }
        }
    }

    /// Allocate `count * size` zeroed bytes
    pub fn calloc(&self, count: usize, size: usize) -> AllocResult<NonNull<u8>> {
        let total = count.checked_mul(size).ok_or(AllocError::InvalidParam)?;
        let ptr = self.alloc(total)?;
        unsafe { ptr.as_ptr().write_bytes(0, total) };
        Ok(ptr)
    }

    /// Payload size recorded for a zone pointer, `None` for foreign pointers.
    ///
    /// # Safety
    /// `ptr` must be a live pointer returned by this heap.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.header_of(ptr).map(|header| header.size)
    }

    /// # Safety
    /// `ptr` must be a live pointer returned by this heap.
    unsafe fn header_of(&self, ptr: NonNull<u8>) -> Option<BlockHeader> {
        let addr = ptr.as_ptr() as usize;
        self.inner.lock().index.find(addr)?;
        Some(unsafe { ptr::read((addr - HEADER_SIZE) as *const BlockHeader) })
    }

    /// Release a block returned by [`ZoneHeap::alloc`] (or its siblings).
    ///
    /// # Safety
    /// `ptr` must be a live pointer returned by this heap.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        let addr = ptr.as_ptr() as usize;
        let mut inner = self.inner.lock();

        let Some(zone_id) = inner.index.find(addr) else {
            drop(inner);
            trace!("zone heap: releasing foreign pointer {:#x}", addr);
            unsafe { self.fallback.free(ptr) };
            return;
        };

        let block_addr = addr - HEADER_SIZE;
        let header = unsafe { ptr::read(block_addr as *const BlockHeader) };
        let Some(order) = self.geometry.order_for(header.size) else {
            error!(
                "zone heap: header at {:#x} records impossible size {}",
                block_addr, header.size
            );
            return;
        };

        if let Err(_e) = self.release_block(&mut inner, zone_id, block_addr, order) {
            error!(
                "zone heap: lost block {:#x} (order {}): {:?}",
                block_addr, order, _e
            );
        }
    }

    /// Resize a block, always moving it.
    ///
    /// `None` allocates; a zero `new_size` frees and returns `Ok(None)`.
    /// On failure the original block is left untouched.
    ///
    /// # Safety
    /// `ptr`, if present, must be a live pointer returned by this heap.
    pub unsafe fn realloc(
        &self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
    ) -> AllocResult<Option<NonNull<u8>>> {
        let Some(ptr) = ptr else {
            return self.alloc(new_size).map(Some);
        };

        let Some(old_size) = (unsafe { self.usable_size(ptr) }) else {
            if new_size == 0 {
                unsafe { self.fallback.free(ptr) };
                return Ok(None);
            }
            return match unsafe { self.fallback.realloc(ptr, new_size) } {
                Ok(new) => Ok(Some(new)),
                Err(e) => {
                    error!(
                        "zone heap: fallback realloc of {} bytes failed for {:p}",
                        new_size, ptr
                    );
                    Err(e)
                }
            };
        };

        if new_size == 0 {
            unsafe { self.free(ptr) };
            return Ok(None);
        }

        let new = self.alloc(new_size)?;
        unsafe {
            ptr::copy_nonoverlapping(ptr.as_ptr(), new.as_ptr(), old_size.min(new_size));
            self.free(ptr);
        }
        Ok(Some(new))
    }

    /// Snapshot of zone and pool accounting
    pub fn stats(&self) -> HeapStats {
        let inner = self.inner.lock();
        self.collect_stats(&inner)
    }

    fn collect_stats(&self, inner: &HeapInner) -> HeapStats {
        let mut stats = HeapStats::new();
        stats.zone_size = self.geometry.zone_size();
        stats.zone_count = inner.zones.len();
        stats.max_zones = self.max_zones;
        stats.total_bytes = stats.zone_count * stats.zone_size;
        for order in self.geometry.min_order..=self.geometry.max_order {
            stats.free_blocks_by_order[order] = inner.free_lists.len(order);
        }
        stats.free_bytes = inner.free_lists.free_bytes();
        stats.used_bytes = stats.total_bytes.saturating_sub(stats.free_bytes);
        stats.pool = inner.pool.get_stats();
        stats
    }

    /// Print all zone information and block distribution
    #[allow(unused_variables)]
    pub fn print_zone_info(&self) {
        let inner = self.inner.lock();
        let zone_size = self.geometry.zone_size();

        let mut free_per_zone = vec![0usize; inner.zones.len()];
        for order in self.geometry.min_order..=self.geometry.max_order {
            for block in inner.free_lists.iter(&inner.pool, order) {
                free_per_zone[block.zone] += 1 << order;
            }
        }

        info!("========== Zone Heap Info ==========");
        info!(
            "Zones: {} / {} (delta {})",
            inner.zones.len(),
            self.max_zones,
            self.delta_zones
        );
        info!("Zone size: {:#x} ({})", zone_size, zone_size);
        for (_i, _zone) in inner.zones.iter().enumerate() {
            info!(
                "Zone {}: [{:#x}, {:#x}) free {:#x} epoch {} bitmap {} bytes",
                _i,
                _zone.base,
                _zone.base + zone_size,
                free_per_zone[_i],
                _zone.epoch,
                _zone.bitmaps.len_bytes()
            );
        }

        info!("Free blocks distribution:");
        for order in self.geometry.min_order..=self.geometry.max_order {
            let _count = inner.free_lists.len(order);
            if _count > 0 {
                info!(
                    "  Order {}: {} blocks (size {} bytes each)",
                    order,
                    _count,
                    1usize << order
                );
            }
        }

        let _pool_stats = inner.pool.get_stats();
        info!(
            "Node pool: {} free / {} total, {} batches",
            _pool_stats.free_nodes, _pool_stats.total_nodes, _pool_stats.batches
        );
        info!("====================================");
    }
}

impl<F: FallbackAllocator, M: ZoneMapper> Drop for ZoneHeap<F, M> {
    fn drop(&mut self) {
        let zone_size = self.geometry.zone_size();
        let mut inner = self.inner.lock();
        let HeapInner {
            zones,
            free_lists,
            index,
            pool,
        } = &mut *inner;

        free_lists.clear(pool);
        index.release_all(|_key, _zone| {
            trace!("zone heap: dropped index entry {:#x} -> zone {}", _key, _zone);
        });

        let _unmapped = zones.len();
        for zone in zones.drain(..) {
            if let Some(base) = NonNull::new(zone.base as *mut u8) {
                unsafe { self.mapper.unmap(base, zone_size) };
            }
        }

        unsafe { pool.release_batches(&self.fallback) };
        debug!("zone heap: destroyed, {} zones unmapped", _unmapped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    const TEST_ZONE_SIZE: usize = 0x1000;

    fn test_heap(zones: usize, max_zones: usize) -> ZoneHeap {
        ZoneHeap::create(
            zones * TEST_ZONE_SIZE,
            max_zones * TEST_ZONE_SIZE,
            TEST_ZONE_SIZE,
            TEST_ZONE_SIZE,
        )
        .unwrap()
    }

    fn bitmaps_clear(heap: &ZoneHeap) -> bool {
        heap.inner.lock().zones.iter().all(|z| z.bitmaps.is_clear())
    }

    #[test]
    fn test_create_geometry() {
        let heap = ZoneHeap::create(3 * 0x1000 - 1, 0, 0, 0x1000).unwrap();
        assert_eq!(heap.zone_count(), 3);
        assert_eq!(heap.max_zones(), 3);
        assert_eq!(heap.delta_zones(), DEFAULT_ZONE_DELTA / 0x1000);

        let stats = heap.stats();
        assert_eq!(stats.free_blocks_by_order[12], 3);
        assert_eq!(stats.free_bytes, 3 * 0x1000);
        assert_eq!(stats.pool.allocated_nodes, 3);
    }

    #[test]
    fn test_create_defaults() {
        let heap = ZoneHeap::create(1, 0, 0, 0).unwrap();
        assert_eq!(heap.zone_size(), DEFAULT_ZONE_SIZE);
        assert_eq!(heap.zone_count(), 1);
        assert_eq!(heap.delta_zones(), DEFAULT_ZONE_DELTA / DEFAULT_ZONE_SIZE);
    }

    #[test]
    fn test_create_rejects_bad_zone_size() {
        assert_eq!(
            ZoneHeap::create(0x3000, 0, 0, 0x3000).err(),
            Some(AllocError::InvalidParam)
        );
        assert_eq!(
            ZoneHeap::create(16, 0, 0, 16).err(),
            Some(AllocError::InvalidParam)
        );
    }

    #[test]
    fn test_split_sets_pair_bits_and_free_clears_them() {
        let heap = test_heap(1, 1);
        let ptr = heap.alloc(10).unwrap();

        {
            let inner = heap.inner.lock();
            let zone = &inner.zones[0];
            assert_eq!(ptr.as_ptr() as usize, zone.base + HEADER_SIZE);
            // Every split level left its upper half free
            for order in MIN_ORDER..12 {
                assert_eq!(inner.free_lists.len(order), 1);
                assert!(zone.bitmaps.get(order, 0));
            }
            assert_eq!(inner.free_lists.len(12), 0);
        }

        unsafe { heap.free(ptr) };
        assert!(bitmaps_clear(&heap));
        assert_eq!(heap.stats().free_blocks_by_order[12], 1);
    }

    #[test]
    fn test_header_records_size_and_epoch() {
        let heap = test_heap(1, 1);
        let a = heap.alloc(40).unwrap();
        let b = heap.alloc(40).unwrap();

        let header_a = unsafe { heap.header_of(a) }.unwrap();
        let header_b = unsafe { heap.header_of(b) }.unwrap();
        assert_eq!(header_a.size, 40);
        assert_eq!(header_b.size, 40);
        assert_eq!(header_b.epoch, header_a.epoch + 1);

        unsafe {
            heap.free(a);
            heap.free(b);
        }
    }

    #[test]
    fn test_buddies_coalesce_in_either_order() {
        for low_first in [true, false] {
            let heap = test_heap(1, 1);
            let blocker = heap.alloc(2048 - HEADER_SIZE).unwrap();
            let a = heap.alloc(10).unwrap();
            let b = heap.alloc(10).unwrap();
            let c = heap.alloc(10).unwrap();

            let (first, second) = if low_first { (a, b) } else { (b, a) };
            unsafe {
                heap.free(first);
                heap.free(second);
            }
            let stats = heap.stats();
            assert_eq!(stats.free_blocks_by_order[MIN_ORDER + 1], 1);
            assert_eq!(stats.free_blocks_by_order[MIN_ORDER], 1);

            unsafe {
                heap.free(c);
                heap.free(blocker);
            }
            assert!(bitmaps_clear(&heap));
            assert_eq!(heap.stats().free_block_count(), 1);
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "corrupted buddy state")]
    fn test_pair_bit_without_list_entry_panics() {
        let heap = test_heap(1, 1);
        let ptr = heap.alloc(10).unwrap();
        {
            // Drop the free buddy's list entry while its pair bit still says free
            let mut inner = heap.inner.lock();
            let HeapInner {
                zones,
                free_lists,
                pool,
                ..
            } = &mut *inner;
            let buddy = zones[0].base + (1 << MIN_ORDER);
            assert!(zones[0].bitmaps.get(MIN_ORDER, 0));
            assert!(free_lists.remove_addr(pool, MIN_ORDER, buddy).is_some());
        }
        unsafe { heap.free(ptr) };
    }

    /// Mapper that refuses every request after the first `limit`
    struct LimitedMapper {
        remaining: AtomicUsize,
    }

    impl LimitedMapper {
        fn new(limit: usize) -> Self {
            Self {
                remaining: AtomicUsize::new(limit),
            }
        }
    }

    impl ZoneMapper for LimitedMapper {
        fn map(&self, size: usize) -> AllocResult<NonNull<u8>> {
            self.remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map_err(|_| AllocError::MapFailed)?;
            MmapZoneMapper.map(size)
        }

        unsafe fn unmap(&self, base: NonNull<u8>, size: usize) {
            unsafe { MmapZoneMapper.unmap(base, size) }
        }
    }

    #[test]
    fn test_failed_growth_uses_fallback() {
        let config = HeapConfig::new(
            TEST_ZONE_SIZE,
            3 * TEST_ZONE_SIZE,
            TEST_ZONE_SIZE,
            TEST_ZONE_SIZE,
        );
        let heap = ZoneHeap::with_config(config, LibcFallback, LimitedMapper::new(1)).unwrap();

        let a = heap.alloc(TEST_ZONE_SIZE - HEADER_SIZE).unwrap();
        let b = heap.alloc(TEST_ZONE_SIZE - HEADER_SIZE).unwrap();
        assert!(heap.owns(a.as_ptr()));
        assert!(!heap.owns(b.as_ptr()));
        assert_eq!(heap.zone_count(), 1);

        unsafe {
            heap.free(b);
            heap.free(a);
        }
        assert_eq!(heap.stats().free_bytes, TEST_ZONE_SIZE);
    }

    #[test]
    fn test_partial_growth_serves_request() {
        let config = HeapConfig::new(
            TEST_ZONE_SIZE,
            3 * TEST_ZONE_SIZE,
            2 * TEST_ZONE_SIZE,
            TEST_ZONE_SIZE,
        );
        let heap = ZoneHeap::with_config(config, LibcFallback, LimitedMapper::new(2)).unwrap();

        let a = heap.alloc(TEST_ZONE_SIZE - HEADER_SIZE).unwrap();
        // Growth maps one of the two requested zones, then fails
        let b = heap.alloc(TEST_ZONE_SIZE - HEADER_SIZE).unwrap();
        assert!(heap.owns(a.as_ptr()));
        assert!(heap.owns(b.as_ptr()));
        assert_eq!(heap.zone_count(), 2);

        unsafe {
            heap.free(a);
            heap.free(b);
        }
        assert_eq!(heap.stats().free_blocks_by_order[12], 2);
    }

    #[test]
    fn test_huge_max_size_reserves_lazily() {
        let heap = ZoneHeap::create(TEST_ZONE_SIZE, usize::MAX / 2, TEST_ZONE_SIZE, TEST_ZONE_SIZE)
            .unwrap();
        assert_eq!(heap.zone_count(), 1);
        assert!(heap.inner.lock().zones.capacity() < 1024);

        let ptr = heap.alloc(100).unwrap();
        assert!(heap.owns(ptr.as_ptr()));
        unsafe { heap.free(ptr) };
    }

    #[test]
    fn test_growth_by_delta() {
        let heap = test_heap(1, 3);
        let a = heap.alloc(TEST_ZONE_SIZE - HEADER_SIZE).unwrap();
        let b = heap.alloc(TEST_ZONE_SIZE - HEADER_SIZE).unwrap();
        assert_eq!(heap.zone_count(), 2);
        assert!(heap.owns(a.as_ptr()) && heap.owns(b.as_ptr()));

        unsafe {
            heap.free(a);
            heap.free(b);
        }
        assert_eq!(heap.stats().free_blocks_by_order[12], 2);
    }

    #[test]
    fn test_oversized_request_uses_fallback() {
        let heap = test_heap(1, 4);
        let ptr = heap.alloc(TEST_ZONE_SIZE).unwrap();
        assert!(!heap.owns(ptr.as_ptr()));
        assert_eq!(heap.zone_count(), 1);
        unsafe { heap.free(ptr) };
    }

    #[test]
    fn test_zero_size_realloc_clears_pair_bits() {
        let heap = test_heap(1, 1);
        let ptr = heap.alloc(100).unwrap();
        assert!(!bitmaps_clear(&heap));

        assert_eq!(unsafe { heap.realloc(Some(ptr), 0) }, Ok(None));
        assert!(bitmaps_clear(&heap));
    }

    #[test]
    fn test_pool_nodes_return_after_free() {
        let heap = test_heap(1, 1);
        let ptrs: Vec<_> = (0..20).map(|_| heap.alloc(24).unwrap()).collect();
        for ptr in ptrs {
            unsafe { heap.free(ptr) };
        }
        let stats = heap.stats();
        assert_eq!(stats.pool.allocated_nodes, 1);
        assert_eq!(stats.free_bytes, TEST_ZONE_SIZE);
    }
}
