// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Channel hot-path benchmarks.
//
// Run with:
//   cargo bench --bench throughput
//
// Groups:
//   slot_write      — producer side alone (seqlock write + counter bump)
//   slot_round_trip — write followed by the consumer's snapshot read
//
// Workers are disabled: these measure the data path, not liveness.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use eshm::{Config, Error, Eshm, Role};

const SIZES: &[(&str, usize)] = &[
    ("small_64", 64),
    ("medium_1024", 1024),
    ("large_4096", 4096),
];

fn pair(tag: &str) -> (Eshm, Eshm) {
    let name = format!("bench_{tag}_{}", std::process::id());
    let mut mc = Config::new(&name);
    mc.role = Role::Master;
    mc.use_workers = false;
    let master = Eshm::init(mc).expect("master init");

    let mut sc = Config::new(&name);
    sc.role = Role::Slave;
    sc.use_workers = false;
    let slave = Eshm::init(sc).expect("slave init");
    (master, slave)
}

fn bench_slot_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_write");
    let (master, _slave) = pair("write");

    for &(label, size) in SIZES {
        let payload = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &payload, |b, p| {
            b.iter(|| master.write(black_box(p)).unwrap());
        });
    }

    group.finish();
}

fn bench_slot_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_round_trip");
    let (master, slave) = pair("round_trip");

    for &(label, size) in SIZES {
        let payload = vec![0x5Au8; size];
        let mut buf = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &payload, |b, p| {
            b.iter(|| {
                master.write(black_box(p)).unwrap();
                match slave.read(&mut buf, 0) {
                    Ok(n) => black_box(n),
                    Err(Error::NoData) => 0,
                    Err(e) => panic!("read failed: {e}"),
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_slot_write, bench_slot_round_trip);
criterion_main!(benches);
