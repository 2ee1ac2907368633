use std::hint::black_box;
use std::path::Path;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use loglake::config::OutputConfig;
use loglake::normalize::normalize;
use loglake::parsers::{parse, AccessLogParser, LineParser};
use loglake::readers::{LineOrigin, SourceLine};
use loglake::sink;
use loglake::timestamp::parse_access_timestamp;

const LINE: &str = r#"192.168.1.10 - frank [22/Jan/2019:03:56:14 +0330] "GET /image/61474/productModel/200x200 HTTP/1.1" 200 5667 "https://www.example.com/m/filter/b113" "Mozilla/5.0 (Linux; Android 6.0; ALE-L21 Build/HuaweiALE-L21) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/66.0.3359.158 Mobile Safari/537.36""#;

fn source_lines(count: usize) -> Vec<loglake::Result<SourceLine>> {
    let path: Arc<Path> = Arc::from(Path::new("bench.log"));
    (0..count)
        .map(|i| {
            let text = if i % 50 == 49 { "malformed" } else { LINE };
            Ok(SourceLine::new(
                text.as_bytes().to_vec(),
                LineOrigin {
                    path: Arc::clone(&path),
                    line_number: i + 1,
                },
            ))
        })
        .collect()
}

fn bench_parse_line(c: &mut Criterion) {
    let parser = AccessLogParser::new().unwrap();
    c.bench_function("parse_access_line", |b| {
        b.iter(|| black_box(parser.parse(black_box(LINE))));
    });
}

fn bench_parse_timestamp(c: &mut Criterion) {
    c.bench_function("parse_access_timestamp", |b| {
        b.iter(|| black_box(parse_access_timestamp(black_box("22/Jan/2019:03:56:14 +0330"))));
    });
}

fn bench_parse_normalize_stream(c: &mut Criterion) {
    let parser = AccessLogParser::new().unwrap();
    let mut group = c.benchmark_group("stream");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("parse_normalize_10k", |b| {
        b.iter_batched(
            || source_lines(10_000),
            |lines| {
                let mut malformed: Vec<String> = Vec::new();
                let count = normalize(parse(lines, &parser, &mut malformed))
                    .filter(|r| r.is_ok())
                    .count();
                black_box((count, malformed.len()))
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn bench_write_dataset(c: &mut Criterion) {
    let parser = AccessLogParser::new().unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = OutputConfig::new(dir.path().join("lake"));
    config.chunk_size = 2_500;

    let mut group = c.benchmark_group("sink");
    group.sample_size(10);
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("write_10k_snappy", |b| {
        b.iter_batched(
            || source_lines(10_000),
            |lines| {
                let mut malformed: Vec<String> = Vec::new();
                let records = normalize(parse(lines, &parser, &mut malformed));
                black_box(sink::write(records, &config).unwrap().num_rows())
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_parse_line,
    bench_parse_timestamp,
    bench_parse_normalize_stream,
    bench_write_dataset
);
criterion_main!(benches);
