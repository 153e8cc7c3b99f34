// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Monitor worker: stale detection for both roles, and the slave-side
// reconnection state machine for surviving a master restart.

use std::ptr;
use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{DisconnectBehavior, Role};
use crate::handle::Shared;
use crate::region::{stamp_slave, Region};

/// Cadence of the monitor loop, in milliseconds.
pub(crate) const MONITOR_INTERVAL_MS: u64 = 10;

/// How long to wait after nulling the region pointer before unmapping,
/// so the heartbeat worker and any in-flight read/write observe the null
/// and finish with their own snapshot. A quiescence window, not a lock:
/// covers two heartbeat cycles and two monitor cycles.
pub(crate) const DETACH_QUIESCE_MS: u64 = 20;

struct MonitorState {
    /// The remote counter's value when it last made progress; during
    /// reconnection, the pre-detach snapshot used to tell a dead master's
    /// region from a restarted master's.
    last_remote_heartbeat: u64,
    /// Milliseconds of observed no-progress.
    stale_counter_ms: u64,
    reconnecting: bool,
    wait_counter_ms: u64,
    attempt_counter_ms: u64,
    attempts: u32,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            last_remote_heartbeat: 0,
            stale_counter_ms: 0,
            reconnecting: false,
            wait_counter_ms: 0,
            attempt_counter_ms: 0,
            attempts: 0,
        }
    }

    fn begin_reconnect(&mut self, retry_interval_ms: u32) {
        self.reconnecting = true;
        self.wait_counter_ms = 0;
        // Pre-charge the attempt timer so the first attempt fires on the
        // next tick rather than a full retry interval later.
        self.attempt_counter_ms = retry_interval_ms as u64;
        self.attempts = 0;
    }

    fn finish_reconnect(&mut self, fresh_heartbeat: u64) {
        self.reconnecting = false;
        self.stale_counter_ms = 0;
        self.wait_counter_ms = 0;
        self.attempt_counter_ms = 0;
        self.attempts = 0;
        self.last_remote_heartbeat = fresh_heartbeat;
    }
}

/// Worker loop: observe the peer's heartbeat every ~10 ms and drive the
/// stale / reconnect transitions.
pub(crate) fn run(shared: Arc<Shared>) {
    debug!(role = ?shared.role, "monitor worker started");
    let mut state = MonitorState::new();

    while shared.running.load(Ordering::Acquire) {
        if state.reconnecting {
            if !reconnect_tick(&shared, &mut state) {
                break;
            }
        } else {
            normal_tick(&shared, &mut state);
        }
        thread::sleep(Duration::from_millis(MONITOR_INTERVAL_MS));
    }
    debug!("monitor worker stopped");
}

fn normal_tick(shared: &Shared, state: &mut MonitorState) {
    let ptr = shared.region_ptr.load(Ordering::Acquire);
    if ptr.is_null() {
        return;
    }
    let region = unsafe { &*ptr };

    let remote = match shared.role {
        Role::Master => region.header.slave_heartbeat.load(Ordering::Acquire),
        _ => region.header.master_heartbeat.load(Ordering::Acquire),
    };
    // The creator's configured window binds both sides.
    let threshold_ms = region.header.stale_threshold.load(Ordering::Relaxed) as u64;

    if remote == state.last_remote_heartbeat {
        state.stale_counter_ms += MONITOR_INTERVAL_MS;
        if state.stale_counter_ms >= threshold_ms && !shared.remote_stale.load(Ordering::Acquire) {
            warn!(
                stalled_ms = state.stale_counter_ms,
                "remote endpoint went stale"
            );
            shared.remote_stale.store(true, Ordering::Release);

            // The master waits passively for a new slave; only the slave
            // acts on its disconnect policy.
            if shared.role == Role::Slave {
                match shared.config.disconnect_behavior {
                    DisconnectBehavior::Immediately => {
                        info!("stale master: disconnecting immediately per policy");
                        shared.running.store(false, Ordering::Release);
                    }
                    DisconnectBehavior::OnTimeout => {
                        info!("stale master: entering reconnect mode");
                        detach(shared);
                        state.begin_reconnect(shared.config.reconnect_retry_interval_ms);
                    }
                    DisconnectBehavior::Never => {}
                }
            }
        }
    } else {
        if shared.remote_stale.swap(false, Ordering::AcqRel) {
            info!("remote endpoint recovered");
        }
        state.stale_counter_ms = 0;
        state.last_remote_heartbeat = remote;
    }
}

/// Null the published pointer, give every pointer holder a quiescence
/// window to notice, then unmap the dead master's region.
fn detach(shared: &Shared) {
    shared.region_ptr.store(ptr::null_mut(), Ordering::SeqCst);
    fence(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(DETACH_QUIESCE_MS));
    let old = shared.region.lock().unwrap().take();
    drop(old);
}

/// One reconnect-mode tick. Returns false when the handle went terminal.
fn reconnect_tick(shared: &Shared, state: &mut MonitorState) -> bool {
    state.wait_counter_ms += MONITOR_INTERVAL_MS;
    state.attempt_counter_ms += MONITOR_INTERVAL_MS;

    if state.attempt_counter_ms >= shared.config.reconnect_retry_interval_ms as u64 {
        state.attempt_counter_ms = 0;
        state.attempts += 1;
        debug!(attempt = state.attempts, "attempting to reattach");

        match Region::reattach(&shared.posix_name) {
            Ok(region) => {
                let heartbeat = region
                    .shared()
                    .header
                    .master_heartbeat
                    .load(Ordering::Acquire);
                if heartbeat != state.last_remote_heartbeat {
                    adopt(shared, region);
                    state.finish_reconnect(heartbeat);
                    info!("slave reconnected to a new master");
                    return true;
                }
                // Heartbeat unchanged since before detach: the name still
                // resolves to the dead master's region. Drop it and retry
                // without logging.
            }
            Err(e) => {
                debug!(error = %e, "reattach failed, will retry");
            }
        }

        if shared.config.max_reconnect_attempts > 0
            && state.attempts >= shared.config.max_reconnect_attempts
        {
            warn!(
                attempts = state.attempts,
                "maximum reconnect attempts reached, giving up"
            );
            give_up(shared);
            return false;
        }
    }

    if shared.config.reconnect_wait_ms > 0
        && state.wait_counter_ms >= shared.config.reconnect_wait_ms as u64
    {
        warn!(
            waited_ms = state.wait_counter_ms,
            "reconnect wait expired, giving up"
        );
        give_up(shared);
        return false;
    }

    true
}

/// Adopt a restarted master's region: stamp our side, store the mapping,
/// then publish the pointer so the heartbeat worker and callers resume.
fn adopt(shared: &Shared, region: Region) {
    stamp_slave(region.shared());

    // If the region was recreated from scratch its write counter restarted;
    // pull the read cursor back so new data is not mistaken for old.
    let write_count = region.shared().master_to_slave.write_count();
    if write_count < shared.last_seen_write_count.load(Ordering::Acquire) {
        shared
            .last_seen_write_count
            .store(write_count, Ordering::Release);
    }

    let ptr = region.as_ptr();
    *shared.region.lock().unwrap() = Some(region);
    shared.region_ptr.store(ptr, Ordering::SeqCst);
    shared.remote_stale.store(false, Ordering::Release);
}

fn give_up(shared: &Shared) {
    shared.terminal.store(true, Ordering::Release);
    shared.running.store(false, Ordering::Release);
}
