//! Pooled linked list implementation using the shared object pool
//!
//! Provides linked lists that draw nodes from a shared pool, allowing
//! efficient use of memory across all zones and orders.

#[cfg(feature = "log")]
use log::{error, warn};

use super::{object_pool::ObjectPool, zone_block::FreeBlock};

/// Pooled linked list - uses nodes from the object pool
///
/// This maintains only the list structure (head/len), while all nodes are
/// allocated from the pool. New entries go to the front so that the most
/// recently freed block is the first one handed out again.
pub struct PooledLinkedList {
    head: Option<usize>,
    len: usize,
}

impl PooledLinkedList {
    /// Create a new empty pooled linked list
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Link an already taken pool node carrying `data` at the front
    pub fn push_node(&mut self, pool: &mut ObjectPool, node_idx: usize, data: FreeBlock) {
        let node = pool.get_node_mut(node_idx);
        node.data = data;
        node.next = self.head;
        self.head = Some(node_idx);
        self.len += 1;
    }

    /// Pop an element from the front of the list
    pub fn pop_front(&mut self, pool: &mut ObjectPool) -> Option<FreeBlock> {
        let head_idx = self.head?;

        let head_node = pool.get_node(head_idx);
        let data = head_node.data;
        self.head = head_node.next;

        // Return node to pool
        pool.dealloc_node(head_idx);
        self.len -= 1;

        Some(data)
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the length of the list
    pub fn len(&self) -> usize {
        self.len
    }

    /// Find a node by address
    ///
    /// Returns (node_idx, prev_idx) where prev_idx is the node before it (or None if head)
    pub fn find_by_addr(&self, pool: &ObjectPool, addr: usize) -> Option<(usize, Option<usize>)> {
        let mut prev_idx = None;
        let mut current_idx = self.head;
        let mut visited = 0;

        while let Some(idx) = current_idx {
            if visited > self.len {
                error!("Potential cycle detected during search");
                return None;
            }

            let node = pool.get_node(idx);
            if node.data.addr == addr {
                return Some((idx, prev_idx));
            }
            prev_idx = current_idx;
            current_idx = node.next;
            visited += 1;
        }

        None
    }

    /// Remove the entry for the block at `addr`, if present
    pub fn remove_addr(&mut self, pool: &mut ObjectPool, addr: usize) -> Option<FreeBlock> {
        let (node_idx, prev_idx) = self.find_by_addr(pool, addr)?;
        let data = pool.get_node(node_idx).data;
        self.remove_with_prev(pool, node_idx, prev_idx).then_some(data)
    }

    /// Remove a node using known prev_idx (O(1) operation)
    ///
    /// This is used when we already know the previous node index from find_by_addr(),
    /// avoiding a second traversal of the list.
    pub fn remove_with_prev(
        &mut self,
        pool: &mut ObjectPool,
        node_idx: usize,
        prev_idx: Option<usize>,
    ) -> bool {
        let next_idx = pool.get_node(node_idx).next;

        match prev_idx {
            Some(prev) => {
                let prev_node = pool.get_node_mut(prev);
                if prev_node.next != Some(node_idx) {
                    warn!("prev_idx {:#x} does not point to node_idx {:#x}", prev, node_idx);
                    return false;
                }
                prev_node.next = next_idx;
            }
            None => {
                if self.head != Some(node_idx) {
                    warn!("prev_idx is None but node_idx {:#x} is not head", node_idx);
                    return false;
                }
                self.head = next_idx;
            }
        }

        // Return node to pool
        pool.dealloc_node(node_idx);
        self.len -= 1;
        true
    }

    /// Get iterator over elements
    pub fn iter<'a>(&'a self, pool: &'a ObjectPool) -> PooledListIter<'a> {
        PooledListIter {
            pool,
            current: self.head,
        }
    }

    /// Clear all nodes from the list
    ///
    /// Returns all nodes to the pool
    pub fn clear(&mut self, pool: &mut ObjectPool) {
        while self.pop_front(pool).is_some() {}
    }
}

impl Default for PooledLinkedList {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator for PooledLinkedList
pub struct PooledListIter<'a> {
    pool: &'a ObjectPool,
    current: Option<usize>,
}

impl<'a> Iterator for PooledListIter<'a> {
    type Item = &'a FreeBlock;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.current?;
        let node = self.pool.get_node(idx);
        self.current = node.next;
        Some(&node.data)
    }
}
