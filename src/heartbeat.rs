// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Heartbeat worker: proves this endpoint is alive by advancing its counter.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::config::Role;
use crate::handle::Shared;

/// Cadence of the heartbeat counter, in milliseconds.
pub(crate) const HEARTBEAT_INTERVAL_MS: u64 = 1;

/// Worker loop: every millisecond, increment the counter owned by the
/// local role. The region pointer is snapshotted once per tick; a null
/// snapshot (slave detached for reconnection) skips that tick.
pub(crate) fn run(shared: Arc<Shared>) {
    debug!(role = ?shared.role, "heartbeat worker started");
    while shared.running.load(Ordering::Acquire) {
        let ptr = shared.region_ptr.load(Ordering::Acquire);
        if !ptr.is_null() {
            let region = unsafe { &*ptr };
            let counter = match shared.role {
                Role::Master => &region.header.master_heartbeat,
                _ => &region.header.slave_heartbeat,
            };
            counter.fetch_add(1, Ordering::AcqRel);
        }
        thread::sleep(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    }
    debug!("heartbeat worker stopped");
}
