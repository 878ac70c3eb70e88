use std::error::Error;
use std::hint::black_box;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use criterion::{Criterion, criterion_group, criterion_main};
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::{BodyExt, Empty, Full};
use micro_h3::client::H3Client;
use micro_h3::codec::{FrameEncoder, varint};
use micro_h3::config::H3Config;
use micro_h3::connection::H3Connection;
use micro_h3::handler::make_handler;
use micro_h3::protocol::{Frame, RecvBody, Settings, encode_response_head};
use micro_h3::transport::memory::MemoryConnection;
use tokio::runtime::Runtime;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;

async fn hello_world(_request: Request<RecvBody>) -> Result<Response<Full<Bytes>>, Box<dyn Error + Send + Sync>> {
    let response = Response::builder().status(StatusCode::OK).body(Full::new(Bytes::from_static(b"Hello World!")))?;
    Ok(response)
}

fn bench_varint(c: &mut Criterion) {
    let values = [37u64, 15_293, 494_878_333, 151_288_809_941_952_652];
    let encoded: Vec<Vec<u8>> = values
        .iter()
        .map(|value| {
            let mut buf = Vec::new();
            varint::encode(*value, &mut buf).unwrap();
            buf
        })
        .collect();

    c.bench_function("varint_decode_all_forms", |b| {
        b.iter(|| {
            for buf in &encoded {
                black_box(varint::decode(black_box(buf), 0).unwrap());
            }
        });
    });
}

fn bench_frame_encoder(c: &mut Criterion) {
    let settings: Settings = [(0x6, 16 * 1024), (0x21, 0)].into_iter().collect();

    c.bench_function("encode_settings_and_goaway", |b| {
        let mut dst = BytesMut::with_capacity(64);
        b.iter(|| {
            dst.clear();
            FrameEncoder.encode(Frame::Settings(settings.clone()), &mut dst).unwrap();
            FrameEncoder.encode(Frame::GoAway(64), &mut dst).unwrap();
            black_box(&dst);
        });
    });
}

fn bench_response_head(c: &mut Criterion) {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_TYPE, "application/json".parse().unwrap());
    headers.insert(http::header::CACHE_CONTROL, "max-age=604800".parse().unwrap());
    headers.insert("x-request-id", "7f1c2b9e-4c55-4a0e-9d2b-0c1f6f9e8a11".parse().unwrap());

    c.bench_function("encode_response_head", |b| {
        let mut dst = BytesMut::with_capacity(128);
        b.iter(|| {
            dst.clear();
            black_box(encode_response_head(StatusCode::OK, &headers, &mut dst));
        });
    });
}

fn bench_request_round_trip(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();

    let (client, _server) = runtime.block_on(async {
        let (client, server) = MemoryConnection::pair();
        let connection = H3Connection::new(Arc::new(server), H3Config::default());
        let server = tokio::spawn(connection.process(Arc::new(make_handler(hello_world)), CancellationToken::new()));
        let client = H3Client::connect(Arc::new(client), H3Config::default()).await.unwrap();
        (client, server)
    });

    c.bench_function("request_round_trip", |b| {
        b.to_async(&runtime).iter(|| async {
            let request = Request::get("https://example.com/").body(Empty::<Bytes>::new()).unwrap();
            let response = client.send_request(request).await.unwrap();
            black_box(response.into_body().collect().await.unwrap().to_bytes());
        });
    });
}

criterion_group!(benches, bench_varint, bench_frame_encoder, bench_response_head, bench_request_round_trip);
criterion_main!(benches);
