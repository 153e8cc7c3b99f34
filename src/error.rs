// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error type for the eshm crate.
// Every variant carries a stable numeric code so the values can be passed
// across an FFI boundary or logged and matched by external tooling.

use std::io;

use thiserror::Error;

/// Errors surfaced by every public eshm operation.
///
/// Numeric codes are stable (see [`Error::code`]); unassigned values in the
/// range are reserved.
#[derive(Debug, Error)]
pub enum Error {
    /// Null, empty, or malformed argument.
    #[error("invalid parameter")]
    InvalidParam,

    /// The OS refused to create the shared memory region.
    #[error("failed to create shared memory region")]
    ShmCreate(#[source] io::Error),

    /// The OS refused to open or map the region, or the mapped region
    /// failed magic/version validation.
    #[error("failed to attach shared memory region")]
    ShmAttach(#[source] io::Error),

    /// The OS refused to remove the region's backing object.
    #[error("failed to delete shared memory region")]
    ShmDelete(#[source] io::Error),

    /// Non-blocking read found no new message.
    #[error("no data available")]
    NoData,

    /// Read deadline elapsed, or the region is transiently detached while
    /// the slave reconnects (retry later).
    #[error("operation timed out")]
    Timeout,

    /// The slave observed the master going stale under the
    /// immediate-disconnect policy.
    #[error("master is stale")]
    MasterStale,

    /// Payload exceeds the channel buffer, or the caller's buffer is
    /// smaller than the stored payload.
    #[error("buffer too small")]
    BufferTooSmall,

    /// The handle is in its terminal state, or detached outside of
    /// reconnection.
    #[error("not initialized")]
    NotInitialized,

    /// The configured role could not be satisfied (a slave requires an
    /// existing master region).
    #[error("role mismatch")]
    RoleMismatch,
}

impl Error {
    /// Stable numeric code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidParam => -1,
            Error::ShmCreate(_) => -2,
            Error::ShmAttach(_) => -3,
            Error::ShmDelete(_) => -5,
            Error::NoData => -9,
            Error::Timeout => -10,
            Error::MasterStale => -11,
            Error::BufferTooSmall => -13,
            Error::NotInitialized => -14,
            Error::RoleMismatch => -15,
        }
    }
}

/// Static diagnostic text for a numeric error code.
///
/// `0` is success; unknown codes map to `"unknown error"`.
pub fn error_string(code: i32) -> &'static str {
    match code {
        0 => "success",
        -1 => "invalid parameter",
        -2 => "failed to create shared memory region",
        -3 => "failed to attach shared memory region",
        -5 => "failed to delete shared memory region",
        -9 => "no data available",
        -10 => "operation timed out",
        -11 => "master is stale",
        -13 => "buffer too small",
        -14 => "not initialized",
        -15 => "role mismatch",
        _ => "unknown error",
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
