use std::hint::black_box;

use bencher::{TestCase, TestInput};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use micro_h3::codec::FrameDecoder;
use micro_h3::codec::frame::write_frame_header;
use micro_h3::codec::qpack::{FieldLineDecoder, IntegerCodec, Scalar, Simd, Width, encode_field_section};
use micro_h3::protocol::{FrameType, HeaderField};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

/// `:path = /index.html` as a literal with a static name reference.
static PATH_SECTION: [u8; 15] = [0x00, 0x00, 0x51, 0x0b, 0x2f, 0x69, 0x6e, 0x64, 0x65, 0x78, 0x2e, 0x68, 0x74, 0x6d, 0x6c];

fn encoded_integer(value: u64, prefix_bits: u8) -> Vec<u8> {
    let mut buf = [0u8; 16];
    let n = Scalar.encode(value, prefix_bits, 0, &mut buf).expect("16 bytes hold any 62-bit integer");
    buf[..n].to_vec()
}

fn integer_cases() -> Vec<(TestCase, u8)> {
    vec![
        (TestCase::small("one_byte", TestInput::new("10, 5-bit prefix", encoded_integer(10, 5))), 5),
        (TestCase::small("three_bytes", TestInput::new("1337, 7-bit prefix", encoded_integer(1337, 7))), 7),
        (TestCase::normal("near_u31", TestInput::new("2^31 - 1, 5-bit prefix", encoded_integer((1 << 31) - 1, 5))), 5),
        (TestCase::large("max_u62", TestInput::new("2^62 - 1, 1-bit prefix", encoded_integer((1 << 62) - 1, 1))), 1),
    ]
}

fn large_section() -> Vec<u8> {
    let cookie = "session=".to_string() + &"0123456789abcdef".repeat(16);
    let fields = [
        (":method", "GET"),
        (":scheme", "https"),
        (":authority", "api.example.com"),
        (":path", "/api/v1/items?page=2&sort=desc"),
        ("user-agent", "micro-h3-bench/0.1"),
        ("accept", "*/*"),
        ("accept-encoding", "gzip, deflate, br"),
        ("accept-language", "en-US,en;q=0.9"),
        ("cache-control", "no-cache"),
        ("cookie", cookie.as_str()),
        ("x-request-id", "7f1c2b9e-4c55-4a0e-9d2b-0c1f6f9e8a11"),
    ];
    let mut dst = BytesMut::new();
    encode_field_section(fields.iter().map(|(name, value)| (name.as_bytes(), value.as_bytes())), &mut dst);
    dst.to_vec()
}

fn section_cases() -> Vec<TestCase> {
    vec![
        TestCase::small("path_only", TestInput::new(":path = /index.html", PATH_SECTION)),
        TestCase::large("browser_request", TestInput::new("typical browser GET", large_section())),
    ]
}

fn decode_integer<C: IntegerCodec>(codec: &C, src: &[u8], prefix_bits: u8) -> u64 {
    codec
        .decode(src, prefix_bits, Width::U62)
        .expect("input should be a valid integer")
        .map_or(0, |(value, _)| value)
}

fn benchmark_integer_decoder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("qpack_integer");

    for (case, prefix_bits) in integer_cases() {
        group.throughput(Throughput::Bytes(case.input().len() as u64));
        group.bench_with_input(BenchmarkId::new("scalar", case.name()), &case, |b, case| {
            b.iter(|| decode_integer(&Scalar, black_box(case.bytes()), prefix_bits));
        });
        group.bench_with_input(BenchmarkId::new("simd", case.name()), &case, |b, case| {
            b.iter(|| decode_integer(&Simd, black_box(case.bytes()), prefix_bits));
        });
    }

    group.finish();
}

fn benchmark_section_decoder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("qpack_field_section");

    for case in section_cases() {
        group.throughput(Throughput::Bytes(case.input().len() as u64));
        group.bench_with_input(BenchmarkId::new("scalar", case.name()), &case, |b, case| {
            let mut decoder = FieldLineDecoder::with_codec(Scalar);
            let mut fields: Vec<HeaderField> = Vec::with_capacity(16);
            b.iter(|| {
                decoder.reset();
                fields.clear();
                black_box(decoder.decode(case.bytes(), &mut fields).expect("input should be a valid field section"));
            });
        });
        group.bench_with_input(BenchmarkId::new("simd", case.name()), &case, |b, case| {
            let mut decoder = FieldLineDecoder::new();
            let mut fields: Vec<HeaderField> = Vec::with_capacity(16);
            b.iter(|| {
                decoder.reset();
                fields.clear();
                black_box(decoder.decode(case.bytes(), &mut fields).expect("input should be a valid field section"));
            });
        });
    }

    group.finish();
}

fn request_stream(body_len: usize) -> Vec<u8> {
    let section = large_section();
    let body = vec![b'x'; body_len];

    let mut dst = BytesMut::new();
    write_frame_header(FrameType::HEADERS, section.len() as u64, &mut dst).expect("frame header");
    dst.extend_from_slice(&section);
    for chunk in body.chunks(4096) {
        write_frame_header(FrameType::DATA, chunk.len() as u64, &mut dst).expect("frame header");
        dst.extend_from_slice(chunk);
    }
    dst.to_vec()
}

fn benchmark_frame_decoder(criterion: &mut Criterion) {
    let cases = vec![
        TestCase::small("headers_only", TestInput::new("HEADERS frame", request_stream(0))),
        TestCase::large("headers_and_64k_body", TestInput::new("HEADERS and 16 DATA frames", request_stream(64 * 1024))),
    ];
    let mut group = criterion.benchmark_group("frame_decoder");

    for case in cases {
        group.throughput(Throughput::Bytes(case.input().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            b.iter_batched_ref(
                || (FrameDecoder::new(), BytesMut::from(case.bytes())),
                |(decoder, bytes)| {
                    while let Some(frame) = decoder.decode(bytes).expect("input should be a valid request stream") {
                        black_box(frame);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(qpack, benchmark_integer_decoder, benchmark_section_decoder, benchmark_frame_decoder);
criterion_main!(qpack);
