// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// In-memory format of the shared region. Native endianness; `magic` and
// `version` guard against mismatched binaries, not architectures.

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};

use crate::channel::ChannelSlot;

/// Format identifier ("ESHM"). Written once by the creator, never mutated.
pub const MAGIC: u32 = 0x4553_484D;

/// Region format version.
pub const VERSION: u32 = 2;

/// Fixed payload capacity of each channel, in bytes.
pub const MAX_DATA_SIZE: usize = 4096;

/// Region header, one cache line.
///
/// Heartbeats and alive flags are written only by the role that owns them;
/// the peer only reads. `stale_threshold` is stamped by the creator and
/// binds both sides.
#[repr(C, align(64))]
pub(crate) struct RegionHeader {
    pub magic: AtomicU32,
    pub version: AtomicU32,
    pub master_heartbeat: AtomicU64,
    pub slave_heartbeat: AtomicU64,
    pub master_pid: AtomicI32,
    pub slave_pid: AtomicI32,
    pub master_alive: AtomicU32,
    pub slave_alive: AtomicU32,
    /// Liveness window in milliseconds of missing heartbeat progress.
    pub stale_threshold: AtomicU32,
    /// Incremented on every master attach; monotonic across restarts.
    pub master_generation: AtomicU32,
    _pad: [u8; 16],
}

/// The complete shared region: header plus one slot per direction.
#[repr(C)]
pub(crate) struct SharedRegion {
    pub header: RegionHeader,
    /// Master writes, slave reads.
    pub master_to_slave: ChannelSlot,
    /// Slave writes, master reads.
    pub slave_to_master: ChannelSlot,
}

/// Total byte size of the mapped region.
pub(crate) const REGION_SIZE: usize = std::mem::size_of::<SharedRegion>();

const _: () = {
    assert!(std::mem::size_of::<RegionHeader>() == 64);
    assert!(std::mem::align_of::<RegionHeader>() == 64);
    assert!(std::mem::size_of::<ChannelSlot>() % 64 == 0);
    assert!(REGION_SIZE % 64 == 0);
};

impl RegionHeader {
    /// Stamp a freshly created region.
    ///
    /// The mapping comes from a newly ftruncate'd object, which POSIX
    /// guarantees is zero-filled, so only the non-zero fields are written.
    pub(crate) fn init(&self, stale_threshold_ms: u32) {
        self.version.store(VERSION, Ordering::Relaxed);
        self.stale_threshold
            .store(stale_threshold_ms, Ordering::Relaxed);
        // Magic last: a concurrent validator must not accept a region
        // whose header is still being stamped.
        self.magic.store(MAGIC, Ordering::Release);
    }

    /// Whether this header carries the expected magic and version.
    pub(crate) fn validate(&self) -> bool {
        self.magic.load(Ordering::Acquire) == MAGIC
            && self.version.load(Ordering::Relaxed) == VERSION
    }
}
