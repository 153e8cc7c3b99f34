// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Public handle: one endpoint of the bidirectional channel.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::channel::ChannelSlot;
use crate::config::{Config, DisconnectBehavior, Role};
use crate::error::{Error, Result};
use crate::layout::SharedRegion;
use crate::platform;
use crate::region::Region;
use crate::{heartbeat, monitor};

/// Poll interval of a blocking [`Eshm::read`], in microseconds.
const READ_POLL_INTERVAL_US: u64 = 100;

/// Default timeout of [`Eshm::read_simple`], in milliseconds.
const READ_SIMPLE_TIMEOUT_MS: u32 = 1000;

/// State shared between the handle and its workers.
///
/// `region_ptr` is the published view of the mapping. The monitor worker
/// is its only writer (nulled during reconnection, republished on adopt);
/// everyone else snapshots it once per operation and works on the
/// snapshot. `region` owns the mapping itself and is only locked on the
/// cold paths (detach, adopt, drop).
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) role: Role,
    pub(crate) posix_name: String,
    pub(crate) is_creator: bool,
    pub(crate) region_ptr: AtomicPtr<SharedRegion>,
    pub(crate) region: Mutex<Option<Region>>,
    pub(crate) running: AtomicBool,
    pub(crate) remote_stale: AtomicBool,
    pub(crate) terminal: AtomicBool,
    /// Read cursor: the incoming write count last delivered to the caller.
    pub(crate) last_seen_write_count: AtomicU64,
    last_master_heartbeat: AtomicU64,
    last_slave_heartbeat: AtomicU64,
}

/// Point-in-time view of the region, plus per-call heartbeat deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub master_heartbeat: u64,
    pub slave_heartbeat: u64,
    pub master_pid: i32,
    pub slave_pid: i32,
    pub master_alive: bool,
    pub slave_alive: bool,
    /// Liveness window stamped by the creator, in ms.
    pub stale_threshold: u32,
    /// Incremented on every master attach; distinguishes a restarted
    /// master from the one before it.
    pub master_generation: u32,
    /// Heartbeat progress since the previous `stats()` call on this handle.
    pub master_heartbeat_delta: u64,
    pub slave_heartbeat_delta: u64,
    pub m2s_write_count: u64,
    pub m2s_read_count: u64,
    pub s2m_write_count: u64,
    pub s2m_read_count: u64,
}

/// One endpoint of a bidirectional shared-memory channel.
///
/// Each direction is a latest-value slot, not a queue: writing faster than
/// the peer reads overwrites, and only the newest value is observable.
///
/// With `use_workers` enabled the handle owns two background threads: a
/// heartbeat worker proving this side alive, and a monitor worker watching
/// the peer's heartbeat (and, for a slave, reconnecting to a restarted
/// master). Dropping the handle stops both, clears this side's alive flag,
/// unmaps, and unlinks the region if this handle created it and
/// `auto_cleanup` is set.
pub struct Eshm {
    shared: Arc<Shared>,
    heartbeat: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Eshm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eshm")
            .field("role", &self.shared.role)
            .field("posix_name", &self.shared.posix_name)
            .finish()
    }
}

impl Eshm {
    /// Resolve the role, create or attach the region, and start the
    /// workers. Every failure releases whatever was already acquired.
    pub fn init(config: Config) -> Result<Self> {
        if config.name.is_empty() {
            return Err(Error::InvalidParam);
        }

        let (region, role) = Region::establish(&config)?;
        let incoming = match role {
            Role::Master => &region.shared().slave_to_master,
            _ => &region.shared().master_to_slave,
        };
        // Deliver only writes made after this endpoint attached; anything
        // already in the slot predates us.
        let cursor = incoming.write_count();

        let use_workers = config.use_workers;
        let shared = Arc::new(Shared {
            role,
            posix_name: region.posix_name().to_string(),
            is_creator: region.is_creator(),
            region_ptr: AtomicPtr::new(region.as_ptr()),
            region: Mutex::new(Some(region)),
            running: AtomicBool::new(false),
            remote_stale: AtomicBool::new(false),
            terminal: AtomicBool::new(false),
            last_seen_write_count: AtomicU64::new(cursor),
            last_master_heartbeat: AtomicU64::new(0),
            last_slave_heartbeat: AtomicU64::new(0),
            config,
        });

        let mut handle = Self {
            shared,
            heartbeat: None,
            monitor: None,
        };

        if use_workers {
            handle.shared.running.store(true, Ordering::Release);

            let hb_shared = Arc::clone(&handle.shared);
            match thread::Builder::new()
                .name("eshm-heartbeat".into())
                .spawn(move || heartbeat::run(hb_shared))
            {
                Ok(h) => handle.heartbeat = Some(h),
                Err(_) => {
                    handle.shutdown();
                    return Err(Error::NotInitialized);
                }
            }

            let mon_shared = Arc::clone(&handle.shared);
            match thread::Builder::new()
                .name("eshm-monitor".into())
                .spawn(move || monitor::run(mon_shared))
            {
                Ok(h) => handle.monitor = Some(h),
                Err(_) => {
                    handle.shutdown();
                    return Err(Error::NotInitialized);
                }
            }
        }

        Ok(handle)
    }

    /// Publish `payload` on this role's outgoing channel.
    ///
    /// Non-blocking; the latest value overwrites the previous one.
    pub fn write(&self, payload: &[u8]) -> Result<()> {
        let ptr = self.shared.region_ptr.load(Ordering::Acquire);
        if ptr.is_null() {
            return Err(self.detached_error());
        }
        let region = unsafe { &*ptr };
        self.outgoing(region).write(payload)
    }

    /// Wait up to `timeout_ms` for a value the caller has not seen yet and
    /// copy it into `buf`, returning its length.
    ///
    /// Polls the incoming write counter every ~100 µs against this
    /// handle's read cursor. `timeout_ms == 0` is a non-blocking probe
    /// returning [`Error::NoData`] when nothing new is available.
    pub fn read(&self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        let start = Instant::now();
        let deadline = Duration::from_millis(timeout_ms as u64);

        loop {
            // Re-snapshot every iteration: the monitor may detach the
            // region mid-wait.
            let ptr = self.shared.region_ptr.load(Ordering::Acquire);
            if ptr.is_null() {
                return Err(self.detached_error());
            }
            let region = unsafe { &*ptr };

            if self.shared.role == Role::Slave
                && self.shared.config.disconnect_behavior == DisconnectBehavior::Immediately
                && self.shared.remote_stale.load(Ordering::Acquire)
            {
                return Err(Error::MasterStale);
            }

            let incoming = self.incoming(region);
            let current = incoming.write_count();
            if current > self.shared.last_seen_write_count.load(Ordering::Acquire) {
                let n = incoming.snapshot_read(buf)?;
                self.shared
                    .last_seen_write_count
                    .store(current, Ordering::Release);
                return Ok(n);
            }

            if timeout_ms == 0 {
                return Err(Error::NoData);
            }
            if start.elapsed() >= deadline {
                return Err(Error::Timeout);
            }
            thread::sleep(Duration::from_micros(READ_POLL_INTERVAL_US));
        }
    }

    /// [`Eshm::read`] with a 1000 ms timeout. The returned length may be
    /// zero: an empty message is a valid event.
    pub fn read_simple(&self, buf: &mut [u8]) -> Result<usize> {
        self.read(buf, READ_SIMPLE_TIMEOUT_MS)
    }

    /// Manually advance this side's heartbeat counter.
    ///
    /// The way to prove liveness when `use_workers` is false and the
    /// caller owns scheduling; harmless (but redundant) otherwise.
    pub fn update_heartbeat(&self) -> Result<()> {
        let ptr = self.shared.region_ptr.load(Ordering::Acquire);
        if ptr.is_null() {
            return Err(Error::NotInitialized);
        }
        let region = unsafe { &*ptr };
        let counter = match self.shared.role {
            Role::Master => &region.header.master_heartbeat,
            _ => &region.header.slave_heartbeat,
        };
        counter.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Snapshot of the region's counters and flags.
    pub fn stats(&self) -> Result<Stats> {
        let ptr = self.shared.region_ptr.load(Ordering::Acquire);
        if ptr.is_null() {
            return Err(Error::NotInitialized);
        }
        let region = unsafe { &*ptr };
        let hdr = &region.header;

        let master_heartbeat = hdr.master_heartbeat.load(Ordering::Acquire);
        let slave_heartbeat = hdr.slave_heartbeat.load(Ordering::Acquire);
        // wrapping: a restarted master legitimately resets its counter.
        let master_heartbeat_delta = master_heartbeat.wrapping_sub(
            self.shared
                .last_master_heartbeat
                .swap(master_heartbeat, Ordering::AcqRel),
        );
        let slave_heartbeat_delta = slave_heartbeat.wrapping_sub(
            self.shared
                .last_slave_heartbeat
                .swap(slave_heartbeat, Ordering::AcqRel),
        );

        Ok(Stats {
            master_heartbeat,
            slave_heartbeat,
            master_pid: hdr.master_pid.load(Ordering::Relaxed),
            slave_pid: hdr.slave_pid.load(Ordering::Relaxed),
            master_alive: hdr.master_alive.load(Ordering::Acquire) != 0,
            slave_alive: hdr.slave_alive.load(Ordering::Acquire) != 0,
            stale_threshold: hdr.stale_threshold.load(Ordering::Relaxed),
            master_generation: hdr.master_generation.load(Ordering::Acquire),
            master_heartbeat_delta,
            slave_heartbeat_delta,
            m2s_write_count: region.master_to_slave.write_count(),
            m2s_read_count: region.master_to_slave.read_count(),
            s2m_write_count: region.slave_to_master.write_count(),
            s2m_read_count: region.slave_to_master.read_count(),
        })
    }

    /// The role resolved at init (never `Auto`).
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Whether this handle created the region (and therefore owns the
    /// unlink decision on drop).
    pub fn is_creator(&self) -> bool {
        self.shared.is_creator
    }

    /// True iff the region is attached and the peer's heartbeat is making
    /// progress. Always false while detached; meaningless without workers.
    pub fn remote_alive(&self) -> bool {
        !self.shared.region_ptr.load(Ordering::Acquire).is_null()
            && !self.shared.remote_stale.load(Ordering::Acquire)
    }

    fn outgoing<'a>(&self, region: &'a SharedRegion) -> &'a ChannelSlot {
        match self.shared.role {
            Role::Master => &region.master_to_slave,
            _ => &region.slave_to_master,
        }
    }

    fn incoming<'a>(&self, region: &'a SharedRegion) -> &'a ChannelSlot {
        match self.shared.role {
            Role::Master => &region.slave_to_master,
            _ => &region.master_to_slave,
        }
    }

    /// Why the region pointer is null right now.
    fn detached_error(&self) -> Error {
        if self.shared.terminal.load(Ordering::Acquire) {
            Error::NotInitialized
        } else if self.shared.remote_stale.load(Ordering::Acquire) {
            // Reconnection is in progress; the caller should retry.
            Error::Timeout
        } else {
            Error::NotInitialized
        }
    }

    /// Stop workers, clear the alive flag, unmap, apply the unlink policy.
    /// Safe to call more than once and on partially-initialized handles.
    fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(h) = self.heartbeat.take() {
            let _ = h.join();
        }
        if let Some(h) = self.monitor.take() {
            let _ = h.join();
        }

        let ptr = self.shared.region_ptr.load(Ordering::Acquire);
        if !ptr.is_null() {
            let region = unsafe { &*ptr };
            let alive = match self.shared.role {
                Role::Master => &region.header.master_alive,
                _ => &region.header.slave_alive,
            };
            alive.store(0, Ordering::Release);
        }

        self.shared.region_ptr.store(ptr::null_mut(), Ordering::SeqCst);
        let mapping = self.shared.region.lock().unwrap().take();
        drop(mapping);

        if self.shared.is_creator && self.shared.config.auto_cleanup {
            if let Err(e) = platform::unlink(&self.shared.posix_name) {
                warn!(name = %self.shared.posix_name, error = %e, "failed to unlink region");
            }
        }
    }
}

impl Drop for Eshm {
    fn drop(&mut self) {
        self.shutdown();
    }
}
