//! Dispatch benchmark suite.
//!
//! Benchmarks bridge fan-out and decoding:
//! - Handler counts: 1, 10, 100
//! - In-process delivery vs. text frame decoding
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use devtools_bridge::{Bridge, LocalTransport, Message, RawFrame};
use serde_json::json;
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const HANDLER_COUNTS: &[usize] = &[1, 10, 100];

// ============================================================================
// Helpers
// ============================================================================

/// Returns a sending bridge whose peer has `handlers` subscribers.
fn wired_pair(handlers: usize, counter: &Arc<AtomicU64>) -> (Bridge, Bridge) {
    let (left, right) = LocalTransport::pair();
    let observer = Bridge::new(Arc::new(left));
    let target = Bridge::new(Arc::new(right));

    for _ in 0..handlers {
        let counter = Arc::clone(counter);
        let _ = observer.subscribe("operations", move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
    }

    (observer, target)
}

// ============================================================================
// Benchmark: Local Fan-out
// ============================================================================

fn bench_local_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_fanout");
    group.measurement_time(Duration::from_secs(5));

    for &count in HANDLER_COUNTS {
        let counter = Arc::new(AtomicU64::new(0));
        let (_observer, target) = wired_pair(count, &counter);
        let payload = json!([1, 2, 3, 4, 5, 6, 7, 8]);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("handlers", count), &count, |b, _| {
            b.iter(|| {
                target
                    .send("operations", black_box(payload.clone()))
                    .expect("send");
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Frame Decoding
// ============================================================================

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    let small = Message::new("inspectElement", json!({ "id": 42, "rendererID": 1 }))
        .and_then(|m| m.encode())
        .expect("encode");
    let large = Message::new("operations", json!((0..1_000).collect::<Vec<u32>>()))
        .and_then(|m| m.encode())
        .expect("encode");

    for (name, text) in [("small", small), ("large", large)] {
        let frame = RawFrame::Text(text);
        group.bench_function(name, |b| {
            b.iter(|| black_box(&frame).decode().expect("decode"));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Cross-task Delivery
// ============================================================================

fn bench_frame_window(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    c.bench_function("frame_window_round_trip", |b| {
        b.to_async(&rt).iter(|| async {
            let window = devtools_bridge::FrameWindow::new();
            let (left, right) = devtools_bridge::FrameTransport::pair(&window, "observer", "target");
            let observer = Bridge::new(Arc::new(left));
            let target = Bridge::new(Arc::new(right));

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let _ = observer.subscribe("ping", move |_| {
                let _ = tx.send(());
                Ok(())
            });

            target.send("ping", json!(null)).expect("send");
            rx.recv().await.expect("delivered");
            window.close();
        });
    });
}

criterion_group!(
    benches,
    bench_local_fanout,
    bench_frame_decode,
    bench_frame_window
);
criterion_main!(benches);
