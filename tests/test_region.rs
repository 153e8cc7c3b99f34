// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Region lifecycle tests: role resolution, validation, takeover, cleanup.

use std::sync::atomic::{AtomicUsize, Ordering};

use eshm::{remove_region, shm_name::make_region_name, Config, Error, Eshm, Role};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("region_{tag}_{n}_{}", std::process::id())
}

/// Config without background workers: region tests need deterministic
/// state, not liveness.
fn quiet(name: &str, role: Role) -> Config {
    let mut c = Config::new(name);
    c.role = role;
    c.use_workers = false;
    c
}

#[test]
fn master_creates_fresh_region() {
    let name = unique_name("create");
    let master = Eshm::init(quiet(&name, Role::Master)).expect("master init");
    assert_eq!(master.role(), Role::Master);
    assert!(master.is_creator());

    let stats = master.stats().expect("stats");
    assert_eq!(stats.master_generation, 1);
    assert!(stats.master_alive);
    assert!(!stats.slave_alive);
    assert_eq!(stats.master_pid, std::process::id() as i32);
}

#[test]
fn slave_without_region_is_role_mismatch() {
    let name = unique_name("orphan");
    let err = Eshm::init(quiet(&name, Role::Slave)).unwrap_err();
    assert!(matches!(err, Error::RoleMismatch));
    assert_eq!(err.code(), -15);
}

#[test]
fn slave_attaches_to_existing_region() {
    let name = unique_name("attach");
    let master = Eshm::init(quiet(&name, Role::Master)).expect("master init");

    let slave = Eshm::init(quiet(&name, Role::Slave)).expect("slave init");
    assert_eq!(slave.role(), Role::Slave);
    assert!(!slave.is_creator());

    let stats = master.stats().expect("stats");
    assert!(stats.slave_alive);
    assert_eq!(stats.slave_pid, std::process::id() as i32);
}

#[test]
fn auto_resolves_to_master_then_slave() {
    let name = unique_name("auto");
    let first = Eshm::init(quiet(&name, Role::Auto)).expect("first init");
    assert_eq!(first.role(), Role::Master);
    assert!(first.is_creator());

    let second = Eshm::init(quiet(&name, Role::Auto)).expect("second init");
    assert_eq!(second.role(), Role::Slave);
    assert!(!second.is_creator());
}

#[test]
fn foreign_region_is_rejected_without_mutation() {
    let name = unique_name("foreign");
    let posix = make_region_name(&name);
    let c_name = std::ffi::CString::new(posix).unwrap();

    // Plant a region-sized object that does not carry the format magic.
    const SIZE: usize = 16384;
    unsafe {
        let fd = libc::shm_open(
            c_name.as_ptr(),
            libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
            0o666 as libc::c_uint,
        );
        assert!(fd >= 0, "shm_open failed");
        assert_eq!(libc::ftruncate(fd, SIZE as libc::off_t), 0);
        let mem = libc::mmap(
            std::ptr::null_mut(),
            SIZE,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        );
        assert_ne!(mem, libc::MAP_FAILED);
        std::ptr::copy_nonoverlapping(b"NOPE".as_ptr(), mem as *mut u8, 4);
        libc::munmap(mem, SIZE);
        libc::close(fd);
    }

    let err = Eshm::init(quiet(&name, Role::Slave)).unwrap_err();
    assert!(matches!(err, Error::ShmAttach(_)));
    assert_eq!(err.code(), -3);

    // The rejected region must be untouched.
    unsafe {
        let fd = libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0);
        assert!(fd >= 0);
        let mem = libc::mmap(std::ptr::null_mut(), 4, libc::PROT_READ, libc::MAP_SHARED, fd, 0);
        assert_ne!(mem, libc::MAP_FAILED);
        let bytes = std::slice::from_raw_parts(mem as *const u8, 4);
        assert_eq!(bytes, b"NOPE");
        libc::munmap(mem, 4);
        libc::close(fd);
    }

    remove_region(&name).expect("cleanup");
}

#[test]
fn auto_cleanup_unlinks_on_creator_drop() {
    let name = unique_name("cleanup_on");
    {
        let mut config = quiet(&name, Role::Master);
        config.auto_cleanup = true;
        let _master = Eshm::init(config).expect("master init");
    }
    // Creator dropped cleanly: the region is gone.
    let err = Eshm::init(quiet(&name, Role::Slave)).unwrap_err();
    assert!(matches!(err, Error::RoleMismatch));
}

#[test]
fn without_auto_cleanup_region_persists() {
    let name = unique_name("cleanup_off");
    {
        let mut config = quiet(&name, Role::Master);
        config.auto_cleanup = false;
        let _master = Eshm::init(config).expect("master init");
    }
    // Region outlives its creator and remains attachable.
    let slave = Eshm::init(quiet(&name, Role::Slave)).expect("slave attach");
    drop(slave);
    remove_region(&name).expect("cleanup");
}

#[test]
fn takeover_bumps_generation_and_preserves_channels() {
    let name = unique_name("takeover");
    let mut config = quiet(&name, Role::Master);
    config.auto_cleanup = false;
    let master1 = Eshm::init(config.clone()).expect("first master");
    let slave = Eshm::init(quiet(&name, Role::Slave)).expect("slave");

    master1.write(b"m1").expect("write m1");
    let mut buf = [0u8; 16];
    assert_eq!(slave.read(&mut buf, 1000).expect("read m1"), 2);
    assert_eq!(&buf[..2], b"m1");

    // First master dies without cleanup; the slave is still attached.
    drop(master1);

    let master2 = Eshm::init(config).expect("takeover");
    assert!(!master2.is_creator(), "takeover must not recreate");
    let stats = master2.stats().expect("stats");
    assert_eq!(stats.master_generation, 2);
    // Channel state survived the takeover: the m1 write is still counted
    // and the slave has nothing new to read.
    assert_eq!(stats.m2s_write_count, 1);
    assert!(matches!(slave.read(&mut buf, 0), Err(Error::NoData)));

    drop(slave);
    drop(master2);
    remove_region(&name).expect("cleanup");
}

#[test]
fn master_reclaims_region_when_both_sides_departed() {
    let name = unique_name("reclaim");
    let mut config = quiet(&name, Role::Master);
    config.auto_cleanup = false;
    {
        let _master1 = Eshm::init(config.clone()).expect("first master");
        // No slave ever joined; master departs leaving the region behind.
    }
    let master2 = Eshm::init(config).expect("second master");
    // slave_alive was 0, so the stale region was unlinked and recreated.
    assert!(master2.is_creator());
    assert_eq!(master2.stats().expect("stats").master_generation, 1);

    drop(master2);
    remove_region(&name).expect("cleanup");
}

#[test]
fn failed_init_leaks_nothing() {
    let name = unique_name("partial");
    assert!(Eshm::init(quiet(&name, Role::Slave)).is_err());
    // The failed attach left no object behind that would block a creator.
    let master = Eshm::init(quiet(&name, Role::Master)).expect("master init");
    assert!(master.is_creator());
}

#[test]
fn embedded_separators_are_normalized() {
    assert_eq!(make_region_name("a/b"), "/eshm_a_b");

    let name = format!("dir/sub_{}", std::process::id());
    let master = Eshm::init(quiet(&name, Role::Master)).expect("master init");
    let slave = Eshm::init(quiet(&name, Role::Slave)).expect("slave init");
    drop(slave);
    drop(master);
}

#[test]
fn creator_stale_threshold_binds_both_sides() {
    let name = unique_name("threshold");
    let mut config = quiet(&name, Role::Master);
    config.stale_threshold_ms = 250;
    let master = Eshm::init(config).expect("master init");
    assert_eq!(master.stats().expect("stats").stale_threshold, 250);

    // A later slave observes the creator's window, not its own config.
    let mut slave_config = quiet(&name, Role::Slave);
    slave_config.stale_threshold_ms = 9999;
    let slave = Eshm::init(slave_config).expect("slave init");
    assert_eq!(slave.stats().expect("stats").stale_threshold, 250);
}
