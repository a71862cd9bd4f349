use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use swstore::{CacheStorage, StoredResponse};
use tempfile::TempDir;

fn asset(size: usize) -> StoredResponse {
    StoredResponse {
        status: 200,
        status_text: "OK".to_string(),
        headers: vec![("content-type".to_string(), "text/css".to_string())],
        body: vec![b'x'; size],
    }
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("put_4kb", |b| {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open(dir.path()).unwrap();
        let bucket = storage.open_bucket("dynamic-v1").unwrap();
        let response = asset(4096);

        let mut counter = 0u64;
        b.iter(|| {
            let key = format!("GET http://localhost/assets/{}.css", counter % 1000);
            bucket.put(&key, black_box(&response)).unwrap();
            counter += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_4kb", |b| {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open(dir.path()).unwrap();
        let bucket = storage.open_bucket("static-v1").unwrap();
        let response = asset(4096);

        let keys: Vec<String> = (0..100)
            .map(|i| format!("GET http://localhost/css/{}.css", i))
            .collect();
        for key in &keys {
            bucket.put(key, &response).unwrap();
        }

        let mut counter = 0;
        b.iter(|| {
            black_box(bucket.get(&keys[counter % 100]).unwrap());
            counter += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_put, bench_get);
criterion_main!(benches);
