//! Node object pool for zone free lists
//!
//! Provides a single pool of list nodes shared across all zones and orders.
//! Nodes are obtained in fixed-size batches straight from the fallback
//! allocator, so replenishing the pool never re-enters the zone heap (whose
//! lock is already held whenever the pool is touched).
//!
//! Every batch starts with a [`BatchHeader`] that chains it to the previously
//! obtained batch. Batches are owned whole and released whole.

use core::mem::{align_of, size_of};
use core::ptr::NonNull;

#[cfg(feature = "log")]
use log::debug;

use super::zone_block::FreeBlock;
use crate::{align_up, AllocError, AllocResult, FallbackAllocator};

/// Simple linked list node used by the object pool
#[derive(Debug, Clone, Copy)]
pub struct ListNode<T> {
    pub data: T,
    pub next: Option<usize>,
}

/// Header placed at the start of every batch
#[repr(C)]
struct BatchHeader {
    next: Option<usize>,
    nodes: usize,
}

/// Object pool - all zones and orders share nodes from this pool
///
/// Nodes are carved from batches provided by the fallback allocator. The pool
/// manages a single free list of nodes using raw pointers (stored as usize
/// indices).
pub struct ObjectPool {
    /// Free list head - points to first available node (node address)
    free_head: Option<usize>,
    /// Most recently obtained batch; older batches chain from its header
    batch_head: Option<usize>,
    /// Nodes per replenishment batch
    batch_nodes: usize,
    batches: usize,
    /// Total number of nodes ever added to the pool
    total_nodes: usize,
    /// Current number of free nodes in the pool
    free_nodes: usize,
    /// Allocation statistics
    total_allocations: usize,
    total_deallocations: usize,
}

impl ObjectPool {
    /// Create an empty pool that grows by `batch_nodes` nodes at a time
    pub const fn new(batch_nodes: usize) -> Self {
        Self {
            free_head: None,
            batch_head: None,
            batch_nodes: if batch_nodes == 0 { 1 } else { batch_nodes },
            batches: 0,
            total_nodes: 0,
            free_nodes: 0,
            total_allocations: 0,
            total_deallocations: 0,
        }
    }

    const fn batch_bytes(&self) -> usize {
        align_up(size_of::<BatchHeader>(), align_of::<ListNode<FreeBlock>>())
            + self.batch_nodes * size_of::<ListNode<FreeBlock>>()
    }

    /// Obtain one more batch of nodes from the fallback allocator
    pub fn replenish<F: FallbackAllocator>(&mut self, fallback: &F) -> AllocResult {
        let bytes = self.batch_bytes();
        let batch = fallback.alloc(bytes)?;
        let batch_addr = batch.as_ptr() as usize;

        unsafe {
            core::ptr::write(
                batch_addr as *mut BatchHeader,
                BatchHeader {
                    next: self.batch_head,
                    nodes: self.batch_nodes,
                },
            );
        }
        self.batch_head = Some(batch_addr);
        self.batches += 1;

        let header = size_of::<BatchHeader>();
        self.add_region(batch_addr + header, bytes - header);

        debug!(
            "object pool: replenished batch {} at {:#x} ({} nodes)",
            self.batches, batch_addr, self.batch_nodes
        );
        Ok(())
    }

    /// Make sure at least `count` nodes can be taken without replenishing
    pub fn reserve<F: FallbackAllocator>(&mut self, count: usize, fallback: &F) -> AllocResult {
        while self.free_nodes < count {
            self.replenish(fallback)?;
        }
        Ok(())
    }

    /// Carve a raw memory region into nodes and add them to the free list
    fn add_region(&mut self, region_start: usize, region_size: usize) {
        let node_size = size_of::<ListNode<FreeBlock>>();
        let align = align_of::<ListNode<FreeBlock>>();
        if region_size < node_size {
            return;
        }

        let mut current = align_up(region_start, align);
        let end = region_start + region_size;

        while current + node_size <= end {
            unsafe {
                core::ptr::write(
                    current as *mut ListNode<FreeBlock>,
                    ListNode {
                        data: FreeBlock::new(0, 0),
                        next: self.free_head,
                    },
                );
            }

            self.free_head = Some(current);
            self.total_nodes += 1;
            self.free_nodes += 1;
            current += node_size;
        }
    }

    /// Take a node, replenishing the pool first if it is empty
    pub fn pop_node<F: FallbackAllocator>(&mut self, fallback: &F) -> AllocResult<usize> {
        if self.free_head.is_none() {
            self.replenish(fallback)?;
        }
        self.alloc_node().ok_or(AllocError::NoMemory)
    }

    /// Allocate a node from the pool
    ///
    /// Returns the index of the allocated node, or None if pool is exhausted
    pub fn alloc_node(&mut self) -> Option<usize> {
        let node_addr = self.free_head?;

        unsafe {
            let node = &mut *(node_addr as *mut ListNode<FreeBlock>);
            self.free_head = node.next;
            node.next = None;
        }

        self.total_allocations += 1;
        self.free_nodes -= 1;

        Some(node_addr)
    }

    /// Return a node to the pool
    ///
    /// The node should not be part of any active list when freed
    pub fn dealloc_node(&mut self, node_idx: usize) {
        unsafe {
            core::ptr::write(
                node_idx as *mut ListNode<FreeBlock>,
                ListNode {
                    data: FreeBlock::new(0, 0),
                    next: self.free_head,
                },
            );
        }

        self.free_head = Some(node_idx);
        self.total_deallocations += 1;
        self.free_nodes += 1;
    }

    /// Get a reference to a node by index
    pub fn get_node(&self, node_idx: usize) -> &ListNode<FreeBlock> {
        unsafe { &*(node_idx as *const ListNode<FreeBlock>) }
    }

    /// Get a mutable reference to a node by index
    pub fn get_node_mut(&mut self, node_idx: usize) -> &mut ListNode<FreeBlock> {
        unsafe { &mut *(node_idx as *mut ListNode<FreeBlock>) }
    }

    /// Release every batch back to the fallback allocator
    ///
    /// # Safety
    /// No list may still reference a node of this pool, and `fallback` must be
    /// the allocator the batches were obtained from.
    pub unsafe fn release_batches<F: FallbackAllocator>(&mut self, fallback: &F) {
        let mut current = self.batch_head.take();
        while let Some(batch_addr) = current {
            let header = unsafe { &*(batch_addr as *const BatchHeader) };
            current = header.next;
            debug_assert_eq!(header.nodes, self.batch_nodes);
            if let Some(batch) = NonNull::new(batch_addr as *mut u8) {
                unsafe { fallback.free(batch) };
            }
        }

        self.free_head = None;
        self.batches = 0;
        self.total_nodes = 0;
        self.free_nodes = 0;
    }

    /// Get the number of free nodes in the pool
    pub fn free_node_count(&self) -> usize {
        self.free_nodes
    }

    /// Get the number of allocated nodes
    pub fn allocated_node_count(&self) -> usize {
        self.total_nodes.saturating_sub(self.free_nodes)
    }

    /// Get pool statistics
    pub fn get_stats(&self) -> PoolStats {
        PoolStats {
            total_nodes: self.total_nodes,
            free_nodes: self.free_nodes,
            allocated_nodes: self.allocated_node_count(),
            batches: self.batches,
            total_allocations: self.total_allocations,
            total_deallocations: self.total_deallocations,
        }
    }
}

/// Object pool statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total_nodes: usize,
    pub free_nodes: usize,
    pub allocated_nodes: usize,
    pub batches: usize,
    pub total_allocations: usize,
    pub total_deallocations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LibcFallback;

    const TEST_BATCH: usize = 16;

    struct NoMemoryFallback;

    impl FallbackAllocator for NoMemoryFallback {
        fn alloc(&self, _size: usize) -> AllocResult<NonNull<u8>> {
            Err(AllocError::NoMemory)
        }

        fn calloc(&self, _count: usize, _size: usize) -> AllocResult<NonNull<u8>> {
            Err(AllocError::NoMemory)
        }

        unsafe fn realloc(&self, _ptr: NonNull<u8>, _size: usize) -> AllocResult<NonNull<u8>> {
            Err(AllocError::NoMemory)
        }

        unsafe fn free(&self, _ptr: NonNull<u8>) {}
    }

    #[test]
    fn test_pool_replenish() {
        let mut pool = ObjectPool::new(TEST_BATCH);
        assert_eq!(pool.free_node_count(), 0);

        pool.replenish(&LibcFallback).unwrap();
        assert_eq!(pool.free_node_count(), TEST_BATCH);
        assert_eq!(pool.allocated_node_count(), 0);
        assert_eq!(pool.get_stats().batches, 1);

        unsafe { pool.release_batches(&LibcFallback) };
        assert_eq!(pool.get_stats(), PoolStats::default());
    }

    #[test]
    fn test_pop_node_replenishes_when_empty() {
        let mut pool = ObjectPool::new(TEST_BATCH);

        let mut nodes = alloc::vec::Vec::new();
        for _ in 0..TEST_BATCH + 1 {
            nodes.push(pool.pop_node(&LibcFallback).unwrap());
        }
        assert_eq!(pool.get_stats().batches, 2);
        assert_eq!(pool.allocated_node_count(), TEST_BATCH + 1);

        for node in nodes {
            pool.dealloc_node(node);
        }
        assert_eq!(pool.free_node_count(), 2 * TEST_BATCH);

        unsafe { pool.release_batches(&LibcFallback) };
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool = ObjectPool::new(TEST_BATCH);
        pool.replenish(&LibcFallback).unwrap();

        let mut indices = alloc::vec::Vec::new();
        for _ in 0..TEST_BATCH {
            indices.push(pool.alloc_node().unwrap());
        }

        assert_eq!(pool.free_node_count(), 0);
        assert!(pool.alloc_node().is_none());
        assert_eq!(pool.pop_node(&NoMemoryFallback), Err(AllocError::NoMemory));

        // Free one and allocate again
        pool.dealloc_node(indices[0]);
        assert_eq!(pool.free_node_count(), 1);
        assert!(pool.alloc_node().is_some());

        unsafe { pool.release_batches(&LibcFallback) };
    }

    #[test]
    fn test_reserve() {
        let mut pool = ObjectPool::new(TEST_BATCH);
        pool.reserve(TEST_BATCH * 2 + 1, &LibcFallback).unwrap();
        assert_eq!(pool.get_stats().batches, 3);
        assert!(pool.free_node_count() >= TEST_BATCH * 2 + 1);

        let mut empty = ObjectPool::new(TEST_BATCH);
        assert_eq!(empty.reserve(1, &NoMemoryFallback), Err(AllocError::NoMemory));

        unsafe { pool.release_batches(&LibcFallback) };
    }

    #[test]
    fn test_node_access() {
        let mut pool = ObjectPool::new(TEST_BATCH);
        let idx = pool.pop_node(&LibcFallback).unwrap();

        pool.get_node_mut(idx).data = FreeBlock::new(0x1000, 3);

        let node = pool.get_node(idx);
        assert_eq!(node.data.addr, 0x1000);
        assert_eq!(node.data.zone, 3);

        pool.dealloc_node(idx);
        let stats = pool.get_stats();
        assert_eq!(stats.total_allocations, 1);
        assert_eq!(stats.total_deallocations, 1);

        unsafe { pool.release_batches(&LibcFallback) };
    }
}
