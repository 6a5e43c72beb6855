use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use lotsim::{CancelToken, CapacityPool, CarRecord, ClockKind, Simulation, SimulationConfig};

fn records(cars: u32) -> Vec<CarRecord> {
    (1..=cars)
        .map(|id| {
            let gate = format!("Gate {}", id % 3 + 1);
            CarRecord::new(gate, id, u64::from(id % 7), u64::from(id % 5 + 1)).unwrap()
        })
        .collect()
}

fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool");

    let pool = CapacityPool::new(4).unwrap();
    group.throughput(Throughput::Elements(1));
    group.bench_function("try_acquire_release_uncontended", |b| {
        b.iter(|| {
            let permit = pool.try_acquire();
            drop(permit);
        });
    });

    group.bench_function("acquire_release_8_threads_capacity_2", |b| {
        b.iter(|| {
            let pool = Arc::new(CapacityPool::new(2).unwrap());
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    thread::spawn(move || {
                        for _ in 0..64 {
                            let permit = pool.acquire(&CancelToken::never()).unwrap();
                            drop(permit);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });

    group.finish();
}

fn bench_virtual_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation_virtual");
    group.sample_size(20);

    for cars in [16u32, 64, 256] {
        let input = records(cars);
        group.throughput(Throughput::Elements(u64::from(cars)));
        group.bench_with_input(BenchmarkId::from_parameter(cars), &input, |b, input| {
            let sim = Simulation::new(SimulationConfig {
                capacity: 4,
                clock: ClockKind::Virtual,
                deadline: None,
            })
            .unwrap();
            b.iter(|| sim.run(input.clone()).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pool, bench_virtual_run);
criterion_main!(benches);
