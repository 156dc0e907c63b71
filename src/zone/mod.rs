//! Zone heap module
//!
//! This module provides the zone-based buddy heap with:
//! - Size-aligned zones located through an ordered index
//! - Order-indexed free lists shared by all zones
//! - Per-zone pair bitmaps driving coalescing
//! - Detailed statistics and debugging

pub mod object_pool;
pub mod order_lists;
pub mod pooled_list;
pub mod stats;
pub mod zone_bitmap;
pub mod zone_block;
pub mod zone_heap;
pub mod zone_index;

pub use object_pool::{ListNode, ObjectPool, PoolStats};
pub use order_lists::OrderFreeLists;
pub use pooled_list::PooledLinkedList;
pub use stats::{HeapStats, MemoryStatsReporter};
pub use zone_bitmap::{PairBitmap, ZoneBitmaps};
pub use zone_block::{
    BlockHeader, FreeBlock, ZoneGeometry, BLOCK_ALIGN, HEADER_SIZE, MAX_ORDER_LIMIT, MIN_ORDER,
};
pub use zone_heap::{HeapConfig, ZoneHeap};
pub use zone_index::ZoneIndex;
