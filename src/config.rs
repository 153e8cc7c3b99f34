// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Endpoint configuration: role, liveness window, reconnect budgets.

/// Which side of the channel this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates (or takes over) the region and owns `master_heartbeat`.
    Master,
    /// Attaches to an existing region and owns `slave_heartbeat`.
    Slave,
    /// Become master if no region exists, slave otherwise.
    ///
    /// Two would-be masters racing on a region with an alive slave is
    /// undefined: one may take over while the other unlinks and recreates,
    /// depending on interleaving.
    Auto,
}

/// What a slave does once the master's heartbeat goes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectBehavior {
    /// Stop the workers at once; subsequent reads return `MasterStale`.
    Immediately,
    /// Detach and try to reattach to a restarted master, bounded by the
    /// reconnect budgets.
    OnTimeout,
    /// Flag staleness but stay attached indefinitely.
    Never,
}

/// Configuration supplied to [`crate::Eshm::init`].
#[derive(Debug, Clone)]
pub struct Config {
    /// User-visible region key. Normalized to `/eshm_<name>` with embedded
    /// path separators replaced by `_`.
    pub name: String,
    pub role: Role,
    pub disconnect_behavior: DisconnectBehavior,
    /// Liveness window in milliseconds of missing heartbeat progress.
    pub stale_threshold_ms: u32,
    /// Total wall-clock budget for reconnection, in ms. 0 = unlimited.
    pub reconnect_wait_ms: u32,
    /// Interval between reattach attempts, in ms.
    pub reconnect_retry_interval_ms: u32,
    /// Cap on reattach attempts. 0 = unlimited.
    pub max_reconnect_attempts: u32,
    /// Unlink the region on drop if this handle created it.
    pub auto_cleanup: bool,
    /// Spawn the heartbeat and monitor threads. When false, no heartbeats
    /// are produced and stale detection does not run; the caller owns
    /// scheduling (see [`crate::Eshm::update_heartbeat`]).
    pub use_workers: bool,
}

impl Config {
    /// Configuration with default liveness and reconnect budgets:
    /// auto role, reconnect on timeout, 100 ms stale threshold, 5 s / 100 ms
    /// retry / 50 attempts reconnect budget, auto cleanup, workers on.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role: Role::Auto,
            disconnect_behavior: DisconnectBehavior::OnTimeout,
            stale_threshold_ms: 100,
            reconnect_wait_ms: 5000,
            reconnect_retry_interval_ms: 100,
            max_reconnect_attempts: 50,
            auto_cleanup: true,
            use_workers: true,
        }
    }
}
