//! Framing layer benchmarks
//!
//! This benchmark suite measures:
//! - Frame header encoding/decoding
//! - Frame payload encoding/decoding across sizes
//! - Settings merge and serialization
//! - Stream table and priority tree operations
//! - HPACK header block coding
//!
//! Run with: cargo bench --bench codec_performance

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use h2wire::priority;
use h2wire::{
    DataFrame, Frame, FrameCodec, FrameFlags, FrameType, HeaderCodec, HeadersFrame, PingFrame,
    PrioritySpec, Settings, SettingsBuilder, SettingsFrame, StreamTable, CONNECTION_PREFACE,
    DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE,
};
use std::time::Duration;

// ========== Frame Header Benchmarks ==========

fn bench_frame_header_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_header_encode");

    group.bench_function("encode_data_header", |b| {
        b.iter(|| {
            let header = FrameCodec::encode_header(
                black_box(FrameType::Data),
                black_box(FrameFlags::from_u8(0x01)),
                black_box(1),
                black_box(1024),
            );
            black_box(header);
        });
    });

    group.bench_function("encode_headers_header", |b| {
        b.iter(|| {
            let header = FrameCodec::encode_header(
                black_box(FrameType::Headers),
                black_box(FrameFlags::from_u8(0x05)),
                black_box(1),
                black_box(4096),
            );
            black_box(header);
        });
    });

    group.finish();
}

fn bench_frame_header_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_header_decode");

    let data_header =
        FrameCodec::encode_header(FrameType::Data, FrameFlags::from_u8(0x01), 1, 1024);
    let settings_header =
        FrameCodec::encode_header(FrameType::Settings, FrameFlags::empty(), 0, 36);

    group.bench_function("decode_data_header", |b| {
        b.iter(|| {
            let result = FrameCodec::decode_header(black_box(&data_header));
            black_box(result);
        });
    });

    group.bench_function("decode_settings_header", |b| {
        b.iter(|| {
            let result = FrameCodec::decode_header(black_box(&settings_header));
            black_box(result);
        });
    });

    group.finish();
}

// ========== Frame Payload Benchmarks ==========

fn bench_data_frame_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("data_frame_sizes");

    for size in [256, 1024, 4096, 16384].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        let data = Bytes::from(vec![0u8; *size]);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let frame = DataFrame::new(black_box(1), black_box(data.clone()), black_box(false));
                let encoded = FrameCodec::encode_data_frame(black_box(&frame));
                black_box(encoded);
            });
        });
    }

    group.finish();
}

fn bench_frame_decode_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    let data_wire = FrameCodec::encode(&Frame::Data(DataFrame::new(
        1,
        Bytes::from(vec![0u8; 1024]),
        true,
    )));
    let headers_wire = FrameCodec::encode(&Frame::Headers(
        HeadersFrame::new(1, Bytes::from(vec![0u8; 256]), false, true)
            .with_priority(PrioritySpec::new(3, true, 200)),
    ));
    let ping_wire = FrameCodec::encode(&Frame::Ping(PingFrame::new([7; 8])));

    for (name, wire) in [
        ("data_1kb", &data_wire),
        ("headers_with_priority", &headers_wire),
        ("ping", &ping_wire),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut header_buf = [0u8; FRAME_HEADER_SIZE];
                header_buf.copy_from_slice(&wire[..FRAME_HEADER_SIZE]);
                let header = FrameCodec::decode_header(black_box(&header_buf));
                let payload = wire.slice(FRAME_HEADER_SIZE..);
                let frame = FrameCodec::decode(&header, black_box(payload)).unwrap();
                black_box(frame);
            });
        });
    }

    group.finish();
}

// ========== Settings Benchmarks ==========

fn bench_settings(c: &mut Criterion) {
    let mut group = c.benchmark_group("settings");

    group.bench_function("encode_full_settings", |b| {
        b.iter(|| {
            let settings = SettingsBuilder::new()
                .header_table_size(4096)
                .enable_push(true)
                .max_concurrent_streams(100)
                .initial_window_size(DEFAULT_INITIAL_WINDOW_SIZE)
                .max_frame_size(DEFAULT_MAX_FRAME_SIZE)
                .max_header_list_size(8192)
                .build()
                .unwrap();
            let encoded = FrameCodec::encode_settings_frame(&SettingsFrame::new(settings));
            black_box(encoded);
        });
    });

    group.bench_function("merge_partial", |b| {
        let partial = SettingsBuilder::new()
            .max_frame_size(32768)
            .build()
            .unwrap();
        b.iter(|| {
            let mut table = Settings::default_settings();
            table.merge(black_box(&partial));
            black_box(table);
        });
    });

    group.bench_function("handshake_bytes", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(CONNECTION_PREFACE.len() + 64);
            buf.extend_from_slice(CONNECTION_PREFACE);
            buf.extend_from_slice(&FrameCodec::encode_settings_frame(&SettingsFrame::new(
                Settings::default_settings(),
            )));
            black_box(buf);
        });
    });

    group.finish();
}

// ========== Stream Table Benchmarks ==========

fn bench_stream_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_table");

    for count in [10, 100].iter() {
        group.bench_with_input(
            BenchmarkId::new("create_streams", count),
            count,
            |b, &count| {
                b.iter(|| {
                    let mut table = StreamTable::new(true);
                    for _ in 0..count {
                        let id = table.create_stream().unwrap();
                        black_box(id);
                    }
                    black_box(table);
                });
            },
        );
    }

    group.bench_function("reprioritize_chain", |b| {
        b.iter(|| {
            let mut table = StreamTable::new(true);
            let ids: Vec<_> = (0..10).map(|_| table.create_stream().unwrap()).collect();
            for window in ids.windows(2) {
                priority::set_dependency(&mut table, window[1], window[0], false).unwrap();
            }
            priority::set_dependency(&mut table, ids[9], ids[0], true).unwrap();
            black_box(table);
        });
    });

    group.finish();
}

// ========== HPACK Benchmarks ==========

fn bench_hpack(c: &mut Criterion) {
    let mut group = c.benchmark_group("hpack");

    let request: Vec<(String, String)> = vec![
        (":method".to_string(), "GET".to_string()),
        (":path".to_string(), "/".to_string()),
        (":scheme".to_string(), "https".to_string()),
        (":authority".to_string(), "example.com".to_string()),
    ];

    group.bench_function("encode_request_headers", |b| {
        b.iter(|| {
            let mut codec = HeaderCodec::new();
            let block = codec.encode_block(black_box(&request)).unwrap();
            black_box(block);
        });
    });

    group.bench_function("decode_request_headers", |b| {
        let block = HeaderCodec::new().encode_block(&request).unwrap();
        b.iter(|| {
            let mut codec = HeaderCodec::new();
            let headers = codec.decode_block(black_box(&block)).unwrap();
            black_box(headers);
        });
    });

    group.finish();
}

// ========== Benchmark Groups ==========

criterion_group! {
    name = frame_coding;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(1000);
    targets =
        bench_frame_header_encode,
        bench_frame_header_decode,
        bench_data_frame_sizes,
        bench_frame_decode_roundtrip
}

criterion_group! {
    name = connection_state;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(1000);
    targets =
        bench_settings,
        bench_stream_table
}

criterion_group! {
    name = hpack_coding;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(500);
    targets = bench_hpack
}

criterion_main!(frame_coding, connection_state, hpack_coding);
