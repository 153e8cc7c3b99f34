// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The region format relies on POSIX shm_open semantics: the backing object
// outlives a crashed owner and is removed only by an explicit shm_unlink.
// This crate is unix-only.

#[cfg(unix)]
pub(crate) mod posix;

#[cfg(unix)]
pub(crate) use posix::{exists, unlink, ShmMapping};
