use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pkzip_core::{Archive, Method, Modified};
use std::io::Read;
use tempfile::NamedTempFile;

fn generate_compressible_data(size: usize) -> Vec<u8> {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn generate_random_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = 0x12345678u32;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

fn create_test_zip(entries: &[(&str, &[u8])], method: Method) -> NamedTempFile {
    let temp = NamedTempFile::new().unwrap();
    let mut archive = Archive::create(temp.path(), false).unwrap();
    for (name, data) in entries {
        archive.write_bytes(name, data, method, Modified::epoch()).unwrap();
    }
    archive.close().unwrap();
    temp
}

fn read_all_entries(path: &std::path::Path) {
    let mut archive = Archive::open(path).unwrap();
    let names: Vec<String> = archive.entries().unwrap().iter().map(|e| e.name.clone()).collect();
    let mut buf = Vec::new();
    for name in names {
        archive.open_entry(&name).unwrap().read_to_end(black_box(&mut buf)).unwrap();
        buf.clear();
    }
}

fn bench_read_compressible_data(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 1024 * 1024, 10 * 1024 * 1024];

    for size in sizes {
        let mut group = c.benchmark_group(format!("read_compressible_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_compressible_data(size);
        let zip = create_test_zip(&[("test.bin", &data)], Method::Deflated);

        group.bench_function(BenchmarkId::new("deflated", size), |b| {
            b.iter(|| read_all_entries(zip.path()));
        });

        group.finish();
    }
}

fn bench_read_random_data(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 1024 * 1024];

    for size in sizes {
        let mut group = c.benchmark_group(format!("read_random_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_random_data(size);
        let zip = create_test_zip(&[("test.bin", &data)], Method::Deflated);

        group.bench_function(BenchmarkId::new("deflated", size), |b| {
            b.iter(|| read_all_entries(zip.path()));
        });

        group.finish();
    }
}

fn bench_read_multiple_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_multiple_entries");

    let entry_count = 100;
    let entry_size = 10 * 1024;
    group.throughput(Throughput::Bytes((entry_count * entry_size) as u64));

    let data = generate_compressible_data(entry_size);
    let names: Vec<String> = (0..entry_count).map(|i| format!("file_{}.txt", i)).collect();
    let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), data.as_slice())).collect();
    let zip = create_test_zip(&entries, Method::Deflated);

    group.bench_function("deflated_100_entries", |b| {
        b.iter(|| read_all_entries(zip.path()));
    });

    group.finish();
}

fn bench_read_stored_vs_deflated(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_method_comparison");

    let size = 1024 * 1024;
    let data = generate_compressible_data(size);
    group.throughput(Throughput::Bytes(size as u64));

    let deflated = create_test_zip(&[("test.bin", &data)], Method::Deflated);
    let stored = create_test_zip(&[("test.bin", &data)], Method::Stored);

    group.bench_function("deflated", |b| {
        b.iter(|| read_all_entries(deflated.path()));
    });

    group.bench_function("stored", |b| {
        b.iter(|| read_all_entries(stored.path()));
    });

    group.finish();
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}MB", bytes / (1024 * 1024))
    }
}

criterion_group!(
    benches,
    bench_read_compressible_data,
    bench_read_random_data,
    bench_read_multiple_entries,
    bench_read_stored_vs_deflated
);
criterion_main!(benches);
