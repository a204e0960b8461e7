use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use transport::partitioner::partition_for_key;
use transport::{InMemoryBroker, Producer};

fn bench_partition_for_key(c: &mut Criterion) {
    let key = b"7f2c1a9e-5b3d-4c8e-9a61-2d0f4b7e8c13";

    c.bench_function("transport/partition_for_key", |b| {
        b.iter(|| partition_for_key(std::hint::black_box(key), 12));
    });
}

fn bench_memory_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("transport/memory_publish");

    for payload_size in [64usize, 1024, 16 * 1024] {
        let broker = InMemoryBroker::new();
        let producer = broker.producer("order.paid");
        let payload = vec![0u8; payload_size];

        group.bench_with_input(
            BenchmarkId::from_parameter(payload_size),
            &payload,
            |b, payload| {
                b.iter(|| {
                    rt.block_on(async {
                        producer.send(b"order-1", payload).await.unwrap();
                    });
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_partition_for_key, bench_memory_publish);
criterion_main!(benches);
