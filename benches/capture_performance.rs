//! Performance benchmarks for the capture path
//!
//! Accumulation and classification run inline with the instrumented request,
//! so these measure what each exchange pays before its event is queued.

use axum::body::Body;
use axum::http::Request;
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion};
use http_body_util::BodyExt;
use ironleap::batcher::BatchHandler;
use ironleap::capture::{BodyCodec, BodySide, BodySource, ByteAccumulator, ContentHints};
use ironleap::event::Event;
use ironleap::{Ironleap, Options, Settings};
use serde_json::json;
use std::hint::black_box;
use tower::ServiceExt;

/// Benchmark chunked accumulation at different body sizes
fn bench_accumulator(c: &mut Criterion) {
    let mut group = c.benchmark_group("accumulator");

    for size in &[1024, 16 * 1024, 64 * 1024] {
        let chunk = Bytes::from(vec![b'x'; 1024]);
        let chunks = size / 1024;
        group.bench_function(format!("append_{}kb", size / 1024), |b| {
            b.iter(|| {
                let mut accumulator = ByteAccumulator::new(100_000);
                for _ in 0..chunks {
                    accumulator.append(&chunk);
                }
                black_box(accumulator.finish())
            });
        });
    }

    group.bench_function("append_past_limit", |b| {
        let chunk = Bytes::from(vec![b'x'; 1024]);
        b.iter(|| {
            let mut accumulator = ByteAccumulator::new(4096);
            for _ in 0..64 {
                accumulator.append(&chunk);
            }
            black_box(accumulator.finish())
        });
    });

    group.finish();
}

/// Benchmark body classification for the common content kinds
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let codec = BodyCodec::new(BodySide::Response, 100_000);
    let json_hints = ContentHints {
        content_type: Some("application/json".to_string()),
        content_encoding: None,
    };

    let document = serde_json::to_vec(&json!({
        "id": 42,
        "items": (0..50).map(|i| json!({"sku": format!("item-{i}"), "qty": i})).collect::<Vec<_>>(),
    }))
    .unwrap();
    let document = Bytes::from(document);
    group.bench_function("json_document", |b| {
        b.iter(|| {
            black_box(codec.encode(Some(BodySource::Bytes(document.clone())), &json_hints))
        });
    });

    let binary = Bytes::from((0..8192).map(|i| (i % 251) as u8).collect::<Vec<u8>>());
    group.bench_function("binary_8kb", |b| {
        b.iter(|| {
            black_box(codec.encode(Some(BodySource::Bytes(binary.clone())), &ContentHints::default()))
        });
    });

    group.finish();
}

struct Discard;

#[async_trait::async_trait]
impl BatchHandler<Event> for Discard {
    async fn handle_batch(&self, batch: Vec<Event>) -> ironleap::Result<()> {
        let _ = black_box(batch);
        Ok(())
    }
}

/// Benchmark a whole instrumented exchange against an uninstrumented one
fn bench_exchange(c: &mut Criterion) {
    let mut group = c.benchmark_group("exchange");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let routes = Router::new().route("/echo", post(|body: Bytes| async move { body }));
    let instrumented = runtime.block_on(async {
        let options = Options::new(Settings::new("bench-key", "http://collector.bench")).unwrap();
        let ironleap = Ironleap::with_handler(options, Discard).unwrap();
        ironleap.apply_to_router(routes.clone())
    });

    let payload = json!({"message": "hello", "tags": ["a", "b", "c"]}).to_string();
    let request = move || {
        Request::builder()
            .method("POST")
            .uri("/echo")
            .header("content-type", "application/json")
            .header("content-length", payload.len())
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    for (name, router) in [("plain", routes), ("instrumented", instrumented)] {
        let request = request.clone();
        group.bench_function(name, |b| {
            b.to_async(&runtime).iter(|| {
                let router = router.clone();
                let request = request();
                async move {
                    let response = router.oneshot(request).await.unwrap();
                    black_box(response.into_body().collect().await.unwrap().to_bytes())
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_accumulator, bench_codec, bench_exchange);
criterion_main!(benches);
