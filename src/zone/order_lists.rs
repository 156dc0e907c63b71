//! Order-indexed free-list table
//!
//! One pooled list per block order from the minimum order up to the zone
//! order. Lists are shared by all zones; every entry remembers its zone.

use alloc::vec::Vec;

use super::{
    object_pool::ObjectPool,
    pooled_list::{PooledLinkedList, PooledListIter},
    zone_block::FreeBlock,
};

pub struct OrderFreeLists {
    min_order: usize,
    max_order: usize,
    lists: Vec<PooledLinkedList>,
}

impl OrderFreeLists {
    pub fn new(min_order: usize, max_order: usize) -> Self {
        Self {
            min_order,
            max_order,
            lists: (min_order..=max_order)
                .map(|_| PooledLinkedList::new())
                .collect(),
        }
    }

    #[inline]
    fn slot(&self, order: usize) -> usize {
        debug_assert!(
            (self.min_order..=self.max_order).contains(&order),
            "order {} outside [{}, {}]",
            order,
            self.min_order,
            self.max_order
        );
        order - self.min_order
    }

    /// Lowest order at or above `order` with a free block
    pub fn first_nonempty(&self, order: usize) -> Option<usize> {
        (order.max(self.min_order)..=self.max_order)
            .find(|&o| !self.lists[self.slot(o)].is_empty())
    }

    pub fn push_node(
        &mut self,
        pool: &mut ObjectPool,
        order: usize,
        node: usize,
        block: FreeBlock,
    ) {
        let slot = self.slot(order);
        self.lists[slot].push_node(pool, node, block);
    }

    pub fn pop(&mut self, pool: &mut ObjectPool, order: usize) -> Option<FreeBlock> {
        let slot = self.slot(order);
        self.lists[slot].pop_front(pool)
    }

    pub fn remove_addr(
        &mut self,
        pool: &mut ObjectPool,
        order: usize,
        addr: usize,
    ) -> Option<FreeBlock> {
        let slot = self.slot(order);
        self.lists[slot].remove_addr(pool, addr)
    }

    /// Number of free blocks at `order`
    pub fn len(&self, order: usize) -> usize {
        if (self.min_order..=self.max_order).contains(&order) {
            self.lists[order - self.min_order].len()
        } else {
            0
        }
    }

    pub fn iter<'a>(&'a self, pool: &'a ObjectPool, order: usize) -> PooledListIter<'a> {
        self.lists[self.slot(order)].iter(pool)
    }

    /// Total bytes held by all free lists
    pub fn free_bytes(&self) -> usize {
        (self.min_order..=self.max_order)
            .map(|order| self.len(order) << order)
            .sum()
    }

    /// Return every node to the pool
    pub fn clear(&mut self, pool: &mut ObjectPool) {
        for list in &mut self.lists {
            list.clear(pool);
        }
    }
}
