// src/ring.rs
//
// RawBlockRing: the bounded SPSC ring that couples the blocking source
// thread to the processor thread without the source ever blocking on a
// slow consumer.
//
// The producer/consumer index split is awkward once drop-oldest is in
// play: the producer must occasionally advance the read position itself
// to drop the oldest unprocessed block, which means that position can't
// be consumer-exclusive the way a pure lock-free SPSC ring would want.
// Rather than fight that with raw atomics, the ring is a Mutex-guarded
// queue of indices plus a Condvar the processor waits on - a proper wait
// primitive co-located with the shared state, the same Arc<Mutex<..>>
// shape used elsewhere whenever a slow/blocking resource is shared
// between a producer and a consumer (see io/gvret_tcp.rs's
// SharedTcpWriter).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

pub const BLOCK_CAPACITY: usize = 4096;
pub const RING_SLOTS: usize = 10;

#[derive(Clone)]
pub struct RawBlock {
    pub data: [u8; BLOCK_CAPACITY],
    pub fill: usize,
}

impl RawBlock {
    fn empty() -> Self {
        RawBlock { data: [0u8; BLOCK_CAPACITY], fill: 0 }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.fill]
    }
}

struct RingInner {
    slots: Vec<RawBlock>,
    /// Number of filled-but-unconsumed blocks, in production order, oldest first.
    filled: std::collections::VecDeque<RawBlock>,
    closed: bool,
}

/// Bounded SPSC ring of raw byte blocks.
///
/// Policy on overflow: drop-oldest. The producer never blocks; if the
/// ring already holds `RING_SLOTS` unconsumed blocks, the oldest is
/// discarded and `dropped_blocks` is incremented.
pub struct RawBlockRing {
    inner: Mutex<RingInner>,
    not_empty: Condvar,
    dropped_blocks: AtomicU64,
}

impl RawBlockRing {
    pub fn new() -> Self {
        RawBlockRing {
            inner: Mutex::new(RingInner {
                slots: Vec::new(),
                filled: std::collections::VecDeque::with_capacity(RING_SLOTS),
                closed: false,
            }),
            not_empty: Condvar::new(),
            dropped_blocks: AtomicU64::new(0),
        }
    }

    /// Producer: publish a filled block. Never blocks. Drops the oldest
    /// unconsumed block (incrementing the dropped-block counter) if the
    /// ring is already full.
    pub fn publish(&self, block: RawBlock) {
        let mut inner = self.inner.lock().unwrap();
        if inner.filled.len() >= RING_SLOTS {
            inner.filled.pop_front();
            self.dropped_blocks.fetch_add(1, Ordering::Relaxed);
        }
        inner.filled.push_back(block);
        drop(inner);
        self.not_empty.notify_one();
    }

    /// Consumer: block until a filled block is available, then return it
    /// in production order. Returns None once the ring has been closed and
    /// drained.
    pub fn take(&self) -> Option<RawBlock> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(block) = inner.filled.pop_front() {
                return Some(block);
            }
            if inner.closed {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Signal shutdown: wakes the consumer so it can observe `ending` and
    /// exit instead of blocking forever.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
    }

    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks.load(Ordering::Relaxed)
    }

    pub fn new_block() -> RawBlock {
        RawBlock::empty()
    }
}

impl Default for RawBlockRing {
    fn default() -> Self {
        Self::new()
    }
}
