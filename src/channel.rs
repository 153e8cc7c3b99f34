// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// One direction of the bidirectional link: a single-producer /
// single-consumer latest-value slot guarded by a sequence lock.
//
// This is a slot, not a queue: a writer that outpaces the reader
// overwrites, and a reader that outpaces the writer sees no new data.
// The seqlock guarantees a reader never observes a torn payload; it does
// not guarantee the reader observes every intermediate write.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::layout::MAX_DATA_SIZE;

/// Adaptive backoff for spin sections: busy spin, then a CPU pause hint,
/// then a thread yield, then a 1 ms sleep.
#[inline]
pub(crate) fn adaptive_yield(k: &mut u32) {
    if *k < 4 {
        // busy spin
    } else if *k < 16 {
        std::hint::spin_loop();
    } else if *k < 32 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(std::time::Duration::from_millis(1));
        return;
    }
    *k += 1;
}

/// A unidirectional seqlock-protected slot, padded to a cache-line multiple.
///
/// `sequence` is odd exactly while a write is in progress. `write_count`
/// is incremented after the seqlock is released, so a reader that observes
/// it advance will find the corresponding payload once the sequence reads
/// even again. Exactly one producer and one consumer per slot; two
/// concurrent producers are unsupported.
#[repr(C, align(64))]
pub(crate) struct ChannelSlot {
    sequence: AtomicU32,
    data_size: AtomicU32,
    data: UnsafeCell<[u8; MAX_DATA_SIZE]>,
    write_count: AtomicU64,
    read_count: AtomicU64,
    _pad: [u8; 40],
}

// Safety: the slot is shared across processes by design. The payload cell
// is only touched under the seqlock protocol; everything else is atomic.
unsafe impl Send for ChannelSlot {}
unsafe impl Sync for ChannelSlot {}

impl ChannelSlot {
    /// Producer side: publish `payload` as the slot's latest value.
    ///
    /// Fails with `BufferTooSmall` (slot untouched) when the payload
    /// exceeds [`MAX_DATA_SIZE`]. Never blocks on the reader.
    pub(crate) fn write(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_DATA_SIZE {
            return Err(Error::BufferTooSmall);
        }

        // Single producer: a plain load of our own last store is enough.
        let seq = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release); // store-store: odd sequence before payload

        unsafe {
            let dst = (*self.data.get()).as_mut_ptr();
            ptr::copy_nonoverlapping(payload.as_ptr(), dst, payload.len());
        }
        self.data_size.store(payload.len() as u32, Ordering::Relaxed);

        fence(Ordering::Release); // store-store: payload before even sequence
        self.sequence.store(seq.wrapping_add(2), Ordering::Release);

        self.write_count.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Consumer side: copy the slot's current value into `buf`.
    ///
    /// Spins while a write is in progress and retries on conflict, so the
    /// returned bytes are always one complete `write`. Returns the payload
    /// length; `BufferTooSmall` if `buf` cannot hold the stored value (the
    /// stored value is not truncated).
    pub(crate) fn snapshot_read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut k = 0u32;
            let seq = loop {
                let s = self.sequence.load(Ordering::Acquire);
                if s & 1 == 0 {
                    break s;
                }
                adaptive_yield(&mut k);
            };
            fence(Ordering::Acquire); // load-load: sequence before payload

            let size = self.data_size.load(Ordering::Relaxed) as usize;
            if size > buf.len() {
                fence(Ordering::Acquire);
                if self.sequence.load(Ordering::Relaxed) == seq {
                    // The stored size is consistent; the caller's buffer
                    // really is too small.
                    return Err(Error::BufferTooSmall);
                }
                continue;
            }
            unsafe {
                let src = (*self.data.get()).as_ptr();
                ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), size);
            }

            fence(Ordering::Acquire); // load-load: payload before re-check
            if self.sequence.load(Ordering::Relaxed) == seq {
                self.read_count.fetch_add(1, Ordering::Relaxed);
                return Ok(size);
            }
        }
    }

    /// Number of completed writes. Monotonic, producer-only.
    pub(crate) fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Acquire)
    }

    /// Number of completed reads. Statistics only, no backpressure.
    pub(crate) fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }
}
