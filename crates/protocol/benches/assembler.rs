//! Benchmarks for the wireless frame codec
//!
//! Measures:
//! - Encoding of typical outbound messages
//! - Assembling clean frame streams
//! - Assembling streams with false sync bytes that force rescans

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use protocol::messages::{BROADCAST_DATA, CHANNEL_EVENT, NETWORK_KEY, set_network_key};
use protocol::{FrameAssembler, SYNC_BYTE, encode_frame};

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let page = [0x10, 0x01, 0xFF, 0x5A, 0x10, 0x27, 0xFA, 0x00];
    group.bench_function("broadcast_page", |b| {
        b.iter(|| {
            let mut payload = vec![0x01];
            payload.extend_from_slice(black_box(&page));
            encode_frame(BROADCAST_DATA, &payload)
        })
    });

    group.bench_function("network_key", |b| {
        b.iter(|| set_network_key(black_box(0), &NETWORK_KEY))
    });

    group.finish();
}

/// `count` frames alternating between channel events and broadcasts
fn frame_stream(count: usize) -> Vec<u8> {
    (0..count)
        .flat_map(|i| {
            let channel = (i % 8) as u8;
            if i % 2 == 0 {
                encode_frame(CHANNEL_EVENT, &[channel, 0x01, 0x03]).unwrap()
            } else {
                encode_frame(BROADCAST_DATA, &[channel, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap()
            }
        })
        .collect()
}

fn benchmark_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");

    for count in [16, 256, 4096] {
        let clean = frame_stream(count);
        group.throughput(Throughput::Bytes(clean.len() as u64));
        group.bench_with_input(BenchmarkId::new("clean", count), &clean, |b, bytes| {
            b.iter(|| {
                let mut assembler = FrameAssembler::new();
                let mut frames = 0usize;
                assembler.feed(black_box(bytes), |_| frames += 1);
                frames
            })
        });

        // A stray sync with a plausible length ahead of every frame
        let noisy: Vec<u8> = frame_stream(count)
            .chunks(1)
            .flat_map(|b| {
                if b[0] == SYNC_BYTE {
                    vec![SYNC_BYTE, 0x05, SYNC_BYTE]
                } else {
                    b.to_vec()
                }
            })
            .collect();
        group.throughput(Throughput::Bytes(noisy.len() as u64));
        group.bench_with_input(BenchmarkId::new("false_sync", count), &noisy, |b, bytes| {
            b.iter(|| {
                let mut assembler = FrameAssembler::new();
                let mut frames = 0usize;
                assembler.feed(black_box(bytes), |_| frames += 1);
                frames
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_encode, benchmark_assemble);
criterion_main!(benches);
