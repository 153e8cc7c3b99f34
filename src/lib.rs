// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bidirectional lock-free shared-memory channel between two processes.
//
// Two endpoints, a master and a slave, exchange bounded messages through
// a named POSIX shared memory region. Each direction is a seqlock-guarded
// latest-value slot; no syscall on the data path. Per-side heartbeat
// counters provide liveness: a slave that loses its master detects the
// loss within a configurable window and can reattach to a restarted
// master without external coordination.

pub mod shm_name;

mod platform;

mod layout;
pub use layout::{MAGIC, MAX_DATA_SIZE, VERSION};

mod channel;

mod error;
pub use error::{error_string, Error, Result};

mod config;
pub use config::{Config, DisconnectBehavior, Role};

mod region;
pub use region::remove_region;

mod heartbeat;
mod monitor;

mod handle;
pub use handle::{Eshm, Stats};
