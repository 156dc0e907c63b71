//! Concurrency tests for the zone heap
//!
//! Several threads share one heap; every live block must stay disjoint from
//! every other and keep its contents until it is released.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use zone_buddy_allocator::ZoneHeap;

const ZONE_SIZE: usize = 0x1_0000;
const THREADS: usize = 8;
const ROUNDS: usize = 200;

#[test]
fn test_threads_get_disjoint_blocks() {
    let heap = Arc::new(ZoneHeap::create(ZONE_SIZE, 64 * ZONE_SIZE, ZONE_SIZE, ZONE_SIZE).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let heap = Arc::clone(&heap);
            thread::spawn(move || {
                let mut live = Vec::new();
                for round in 0..ROUNDS {
                    let size = 8 + (round * 37 + t * 13) % 700;
                    let ptr = heap.alloc(size).unwrap();
                    unsafe { ptr.as_ptr().write_bytes(t as u8, size) };
                    live.push((ptr.as_ptr() as usize, size));

                    // Release every third block early to mix frees with allocations
                    if round % 3 == 2 {
                        let (addr, len) = live.swap_remove(round % live.len());
                        let bytes = unsafe { std::slice::from_raw_parts(addr as *const u8, len) };
                        assert!(bytes.iter().all(|&b| b == t as u8));
                        unsafe { heap.free(std::ptr::NonNull::new_unchecked(addr as *mut u8)) };
                    }
                }
                for &(addr, len) in &live {
                    let bytes = unsafe { std::slice::from_raw_parts(addr as *const u8, len) };
                    assert!(bytes.iter().all(|&b| b == t as u8));
                }
                live
            })
        })
        .collect();

    let mut all: Vec<(usize, usize)> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let starts: HashSet<usize> = all.iter().map(|&(addr, _)| addr).collect();
    assert_eq!(starts.len(), all.len());

    all.sort_unstable();
    for pair in all.windows(2) {
        let (a, len) = pair[0];
        assert!(a + len <= pair[1].0, "blocks at {:#x} and {:#x} overlap", a, pair[1].0);
    }

    for (addr, _) in all {
        unsafe { heap.free(std::ptr::NonNull::new_unchecked(addr as *mut u8)) };
    }

    let stats = heap.stats();
    assert_eq!(stats.free_bytes, stats.total_bytes);
}
