//! Per-zone buddy pair bitmaps
//!
//! Each order keeps one bit per buddy pair. The bit is the parity of the two
//! halves' "sitting on a free list" state: it flips whenever either half
//! enters or leaves the free list of that order. A block that is about to be
//! freed is by definition not on the list, so after flipping its pair bit a
//! clear bit means the buddy is free and the two must merge.

use alloc::vec;
use alloc::vec::Vec;

/// Bitmap for a single order
pub struct PairBitmap {
    bits: Vec<u8>,
}

impl PairBitmap {
    /// Bitmap covering a zone of `1 << max_order` bytes at `order`
    pub fn new(max_order: usize, order: usize) -> Self {
        let pairs = (1usize << max_order) >> (order + 1);
        Self {
            bits: vec![0; (pairs / 8).max(1)],
        }
    }

    #[inline]
    fn locate(&self, pair: usize) -> (usize, u8) {
        (pair >> 3, 1 << (pair & 0x7))
    }

    pub fn get(&self, pair: usize) -> bool {
        let (byte, mask) = self.locate(pair);
        self.bits[byte] & mask != 0
    }

    /// Flip the bit of `pair` and return its new value
    pub fn toggle(&mut self, pair: usize) -> bool {
        let (byte, mask) = self.locate(pair);
        self.bits[byte] ^= mask;
        self.bits[byte] & mask != 0
    }

    pub fn set(&mut self, pair: usize, value: bool) {
        let (byte, mask) = self.locate(pair);
        if value {
            self.bits[byte] |= mask;
        } else {
            self.bits[byte] &= !mask;
        }
    }

    pub fn is_clear(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    pub fn len_bytes(&self) -> usize {
        self.bits.len()
    }
}

/// All pair bitmaps of one zone, indexed by order
pub struct ZoneBitmaps {
    min_order: usize,
    maps: Vec<PairBitmap>,
}

impl ZoneBitmaps {
    pub fn new(min_order: usize, max_order: usize) -> Self {
        Self {
            min_order,
            maps: (min_order..=max_order)
                .map(|order| PairBitmap::new(max_order, order))
                .collect(),
        }
    }

    #[inline]
    const fn pair_of(offset: usize, order: usize) -> usize {
        offset >> (order + 1)
    }

    /// Flip the pair bit of the block at zone `offset`, returning the new value
    pub fn toggle(&mut self, order: usize, offset: usize) -> bool {
        self.maps[order - self.min_order].toggle(Self::pair_of(offset, order))
    }

    pub fn get(&self, order: usize, offset: usize) -> bool {
        self.maps[order - self.min_order].get(Self::pair_of(offset, order))
    }

    pub fn set(&mut self, order: usize, offset: usize, value: bool) {
        self.maps[order - self.min_order].set(Self::pair_of(offset, order), value);
    }

    /// True when no pair at any order has exactly one free half
    pub fn is_clear(&self) -> bool {
        self.maps.iter().all(PairBitmap::is_clear)
    }

    /// Bytes of bitmap storage held for this zone
    pub fn len_bytes(&self) -> usize {
        self.maps.iter().map(PairBitmap::len_bytes).sum()
    }
}
