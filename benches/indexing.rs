use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use logsift::config::IndexConfig;
use logsift::index::{build_index, detect_level, parse_timestamp_prefix};
use logsift::CancelToken;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn create_log_file(size_kb: usize, seed: u64) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    let target_size = size_kb * 1024;
    let mut current_size = 0;
    let mut line_num = 0;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let levels = ["[DEBUG]", "[INFO]", "WARN:", "[ERROR]", "(CRITICAL)"];
    let services = ["auth", "database", "cache", "payment"];

    while current_size < target_size {
        let log_line = if rng.gen_ratio(1, 50) {
            // Continuation lines carry no timestamp or level
            format!("    at com.example.{}.handle(Handler.java:{})\n", services[line_num % 4], line_num % 500)
        } else {
            format!(
                "2024-09-02 {:02}:{:02}:{:02} {} {}: Request {} took {}ms user_{}\n",
                (line_num / 3600) % 24,
                (line_num / 60) % 60,
                line_num % 60,
                levels[rng.gen_range(0..levels.len())],
                services[rng.gen_range(0..services.len())],
                line_num,
                rng.gen_range(1..2000),
                line_num % 1000
            )
        };
        temp_file.write_all(log_line.as_bytes()).unwrap();
        current_size += log_line.len();
        line_num += 1;
    }

    temp_file.flush().unwrap();
    temp_file
}

fn size_label(size_kb: usize) -> String {
    if size_kb < 1024 {
        format!("{}KB", size_kb)
    } else {
        format!("{}MB", size_kb / 1024)
    }
}

fn bench_build_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_index");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    for &size_kb in &[500, 5000, 50000] {
        let temp_file = create_log_file(size_kb, 7);
        let cancel = CancelToken::new();

        for &chunk_size in &[64 * 1024, 8 * 1024 * 1024] {
            let config = IndexConfig {
                chunk_size,
                ..IndexConfig::default()
            };
            group.bench_with_input(
                BenchmarkId::new(format!("chunk_{}KB", chunk_size / 1024), size_label(size_kb)),
                &config,
                |b, config| {
                    b.iter(|| {
                        let outcome =
                            build_index(temp_file.path(), config, &cancel, &mut |_| {}).unwrap();
                        black_box(outcome.into_inner().total_lines());
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_line_metadata(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_metadata");

    let lines = [
        "2024-09-02 10:15:42 [ERROR] payment: Request 1234 took 87ms user_42",
        "2024-09-02T10:15:42.123Z INFO auth: token refreshed",
        "    at com.example.cache.handle(Handler.java:311)",
        "no timestamp but a trailing error: connection refused",
    ];

    for (i, line) in lines.iter().enumerate() {
        group.bench_with_input(BenchmarkId::new("timestamp", i), line, |b, line| {
            b.iter(|| black_box(parse_timestamp_prefix(black_box(line))));
        });
        group.bench_with_input(BenchmarkId::new("level", i), line, |b, line| {
            b.iter(|| black_box(detect_level(black_box(line))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_index, bench_line_metadata);
criterion_main!(benches);
