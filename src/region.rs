// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Region manager: resolves the configured role against the current state
// of the named region, then creates, takes over, or attaches to it.

use std::sync::atomic::Ordering;

use tracing::info;

use crate::config::{Config, Role};
use crate::error::{Error, Result};
use crate::layout::{SharedRegion, REGION_SIZE};
use crate::platform::{self, ShmMapping};
use crate::shm_name::make_region_name;

/// A mapped region together with the facts the unlink policy needs later.
///
/// Dropping a `Region` unmaps it; the backing object is only removed by an
/// explicit [`platform::unlink`] (creator + auto_cleanup, decided by the
/// handle).
pub(crate) struct Region {
    mapping: ShmMapping,
    is_creator: bool,
}

impl Region {
    /// Resolve the configured role and produce an attached region.
    ///
    /// | configured | region present | `slave_alive` | action |
    /// |---|---|---|---|
    /// | Master | no  | —  | create fresh |
    /// | Master | yes | 1  | take over (generation bump, channels kept) |
    /// | Master | yes | 0  | unlink, create fresh |
    /// | Slave  | no  | —  | `RoleMismatch` |
    /// | Slave  | yes | —  | attach |
    /// | Auto   | no  | —  | act as Master |
    /// | Auto   | yes | —  | act as Slave |
    pub(crate) fn establish(config: &Config) -> Result<(Self, Role)> {
        let posix_name = make_region_name(&config.name);
        match config.role {
            Role::Master => {
                Self::establish_master(config, &posix_name).map(|r| (r, Role::Master))
            }
            Role::Slave => Self::establish_slave(&posix_name).map(|r| (r, Role::Slave)),
            Role::Auto => {
                if platform::exists(&posix_name) {
                    match Self::establish_slave(&posix_name) {
                        Ok(r) => {
                            info!(name = %posix_name, "auto role resolved to slave");
                            Ok((r, Role::Slave))
                        }
                        // The region vanished between the probe and the
                        // open; claim the name as master instead.
                        Err(Error::RoleMismatch) => {
                            Self::create_fresh(config, &posix_name).map(|r| (r, Role::Master))
                        }
                        Err(e) => Err(e),
                    }
                } else {
                    info!(name = %posix_name, "auto role resolved to master");
                    Self::create_fresh(config, &posix_name).map(|r| (r, Role::Master))
                }
            }
        }
    }

    fn establish_master(config: &Config, posix_name: &str) -> Result<Self> {
        if !platform::exists(posix_name) {
            return Self::create_fresh(config, posix_name);
        }

        // A region already carries this name. Whether we may replace it
        // depends on whether a slave is still attached to it.
        let mapping = match ShmMapping::open(posix_name, REGION_SIZE) {
            Ok(m) => m,
            Err(_) => {
                // Present but unopenable; reclaim the name.
                platform::unlink(posix_name).map_err(Error::ShmDelete)?;
                return Self::create_fresh(config, posix_name);
            }
        };
        let shared = unsafe { &*(mapping.as_mut_ptr() as *const SharedRegion) };

        if shared.header.slave_alive.load(Ordering::Acquire) != 0 {
            // Slave still present: take over without erasing channel state
            // or the slave's heartbeat.
            if !shared.header.validate() {
                return Err(Error::ShmAttach(magic_mismatch()));
            }
            let region = Self {
                mapping,
                is_creator: false,
            };
            stamp_master(region.shared());
            Ok(region)
        } else {
            info!(name = %posix_name, "removing stale region left by departed endpoints");
            drop(mapping);
            platform::unlink(posix_name).map_err(Error::ShmDelete)?;
            Self::create_fresh(config, posix_name)
        }
    }

    fn establish_slave(posix_name: &str) -> Result<Self> {
        let mapping = match ShmMapping::open(posix_name, REGION_SIZE) {
            Ok(m) => m,
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {
                // A slave cannot conjure a region; that is the master's job.
                return Err(Error::RoleMismatch);
            }
            Err(e) => return Err(Error::ShmAttach(e)),
        };
        let region = Self {
            mapping,
            is_creator: false,
        };
        if !region.shared().header.validate() {
            return Err(Error::ShmAttach(magic_mismatch()));
        }
        stamp_slave(region.shared());
        Ok(region)
    }

    fn create_fresh(config: &Config, posix_name: &str) -> Result<Self> {
        let mapping = ShmMapping::create(posix_name, REGION_SIZE).map_err(Error::ShmCreate)?;
        let region = Self {
            mapping,
            is_creator: true,
        };
        region.shared().header.init(config.stale_threshold_ms);
        info!(name = %posix_name, "created region");
        stamp_master(region.shared());
        Ok(region)
    }

    /// Open an existing region without stamping anything, for the slave's
    /// reattach probe. The caller decides whether to adopt it.
    pub(crate) fn reattach(posix_name: &str) -> Result<Self> {
        let mapping = ShmMapping::open(posix_name, REGION_SIZE).map_err(Error::ShmAttach)?;
        let region = Self {
            mapping,
            is_creator: false,
        };
        if !region.shared().header.validate() {
            return Err(Error::ShmAttach(magic_mismatch()));
        }
        Ok(region)
    }

    pub(crate) fn shared(&self) -> &SharedRegion {
        unsafe { &*(self.mapping.as_mut_ptr() as *const SharedRegion) }
    }

    pub(crate) fn as_ptr(&self) -> *mut SharedRegion {
        self.mapping.as_mut_ptr() as *mut SharedRegion
    }

    pub(crate) fn is_creator(&self) -> bool {
        self.is_creator
    }

    pub(crate) fn posix_name(&self) -> &str {
        self.mapping.name()
    }
}

/// Remove a region's backing object by user key, without attaching.
///
/// For reclaiming a name whose creator died with `auto_cleanup` unset, or
/// for test cleanup. Removing a region that live endpoints still map does
/// not disturb their mappings.
pub fn remove_region(key: &str) -> Result<()> {
    platform::unlink(&make_region_name(key)).map_err(Error::ShmDelete)
}

fn magic_mismatch() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "region magic/version mismatch",
    )
}

/// Mark the master side attached: bump the generation, record our pid,
/// raise the alive flag, restart our heartbeat from zero.
fn stamp_master(shared: &SharedRegion) {
    let hdr = &shared.header;
    let generation = hdr.master_generation.fetch_add(1, Ordering::AcqRel) + 1;
    hdr.master_pid
        .store(std::process::id() as i32, Ordering::Relaxed);
    hdr.master_heartbeat.store(0, Ordering::Relaxed);
    hdr.master_alive.store(1, Ordering::Release);
    info!(generation, "master attached");
}

/// Mark the slave side attached. Also used when the monitor adopts a
/// restarted master's region.
pub(crate) fn stamp_slave(shared: &SharedRegion) {
    let hdr = &shared.header;
    hdr.slave_pid
        .store(std::process::id() as i32, Ordering::Relaxed);
    hdr.slave_heartbeat.store(0, Ordering::Relaxed);
    hdr.slave_alive.store(1, Ordering::Release);
}
