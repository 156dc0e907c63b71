//! Statistics and debugging for the zone heap
//!
//! Provides a heap-wide snapshot and the report logged when a request has to
//! leave the zones for the fallback allocator.

use super::object_pool::PoolStats;
use super::zone_block::MAX_ORDER_LIMIT;

/// Zone heap statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub zone_size: usize,
    pub zone_count: usize,
    pub max_zones: usize,
    pub total_bytes: usize,
    pub free_bytes: usize,
    pub used_bytes: usize,
    /// Free blocks per order, indexed by the order itself
    pub free_blocks_by_order: [usize; MAX_ORDER_LIMIT + 1],
    pub pool: PoolStats,
}

impl Default for HeapStats {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapStats {
    pub const fn new() -> Self {
        Self {
            zone_size: 0,
            zone_count: 0,
            max_zones: 0,
            total_bytes: 0,
            free_bytes: 0,
            used_bytes: 0,
            free_blocks_by_order: [0; MAX_ORDER_LIMIT + 1],
            pool: PoolStats {
                total_nodes: 0,
                free_nodes: 0,
                allocated_nodes: 0,
                batches: 0,
                total_allocations: 0,
                total_deallocations: 0,
            },
        }
    }

    /// Total number of free blocks across all orders
    pub fn free_block_count(&self) -> usize {
        self.free_blocks_by_order.iter().sum()
    }
}

/// Detailed memory statistics reporter
pub struct MemoryStatsReporter;

impl MemoryStatsReporter {
    /// Log why a request is being served by the fallback allocator
    #[allow(unused_variables)]
    pub fn print_fallback_stats(stats: &HeapStats, request_size: usize, request_order: usize) {
        #[cfg(feature = "log")]
        use log::debug;
        debug!("========================================");
        debug!(
            "Fallback request: {} bytes (order {}), zones {}/{}",
            request_size, request_order, stats.zone_count, stats.max_zones
        );
        debug!(
            "  Zone bytes: total {:#x}, free {:#x}, used {:#x}",
            stats.total_bytes, stats.free_bytes, stats.used_bytes
        );
        debug!("  Free blocks by order:");
        for (order, &count) in stats.free_blocks_by_order.iter().enumerate().rev() {
            if count > 0 {
                debug!(
                    "    Order {}: {} blocks ({} bytes each)",
                    order,
                    count,
                    1usize << order
                );
            }
        }
        debug!(
            "  Node pool: {} free / {} total in {} batches",
            stats.pool.free_nodes, stats.pool.total_nodes, stats.pool.batches
        );
        debug!("========================================");
    }
}
