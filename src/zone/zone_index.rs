//! Zone index
//!
//! Maps the zone-aligned prefix of an address (`addr >> zone_order`) to the
//! owning zone. Every free and resize pays one lookup here to tell zone
//! pointers apart from fallback pointers.

use alloc::collections::BTreeMap;

/// Ordered map from zone key to zone id
pub struct ZoneIndex {
    zone_order: usize,
    entries: BTreeMap<usize, usize>,
}

impl ZoneIndex {
    pub const fn new(zone_order: usize) -> Self {
        Self {
            zone_order,
            entries: BTreeMap::new(),
        }
    }

    #[inline]
    pub const fn key_of(&self, addr: usize) -> usize {
        addr >> self.zone_order
    }

    /// Register the zone mapped at `base`.
    ///
    /// # Panics
    /// If a zone with the same key is already registered.
    pub fn insert(&mut self, base: usize, zone: usize) {
        let key = self.key_of(base);
        if let Some(existing) = self.entries.insert(key, zone) {
            panic!(
                "zone index: key {:#x} already owned by zone {} (inserting zone {})",
                key, existing, zone
            );
        }
    }

    /// Owning zone of `addr`, if any
    pub fn find(&self, addr: usize) -> Option<usize> {
        self.entries.get(&self.key_of(addr)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, handing each `(key, zone)` to `release` first
    pub fn release_all<R: FnMut(usize, usize)>(&mut self, mut release: R) {
        for (key, zone) in core::mem::take(&mut self.entries) {
            release(key, zone);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    const ZONE_ORDER: usize = 12;

    #[test]
    fn test_find_any_address_in_zone() {
        let mut index = ZoneIndex::new(ZONE_ORDER);
        index.insert(0x10_0000, 0);
        index.insert(0x20_0000, 1);

        assert_eq!(index.find(0x10_0000), Some(0));
        assert_eq!(index.find(0x10_0fff), Some(0));
        assert_eq!(index.find(0x10_1000), None);
        assert_eq!(index.find(0x20_0010), Some(1));
        assert_eq!(index.find(0x0fff), None);
        assert_eq!(index.len(), 2);
    }

    #[test]
    #[should_panic]
    fn test_duplicate_insert_panics() {
        let mut index = ZoneIndex::new(ZONE_ORDER);
        index.insert(0x10_0000, 0);
        index.insert(0x10_0800, 1);
    }

    #[test]
    fn test_release_all() {
        let mut index = ZoneIndex::new(ZONE_ORDER);
        index.insert(0x30_0000, 2);
        index.insert(0x10_0000, 0);

        let mut released = Vec::new();
        index.release_all(|key, zone| released.push((key, zone)));

        assert_eq!(released, [(0x100, 0), (0x300, 2)]);
        assert!(index.is_empty());
        assert_eq!(index.find(0x10_0000), None);
    }
}
