//! Envelope benchmark suite.
//!
//! Measures the per-frame cost of signing, verifying and parsing:
//! - Page text sizes: 1 KiB, 10 KiB, 50 KiB
//! - Correlation round trip through the registry
//!
//! Run with: cargo bench --bench envelope
//! Results saved to: target/criterion/

use std::time::Duration;

use browser_bridge::protocol::{InboundFrame, ResourceKind, SignedEnvelope};
use browser_bridge::transport::CorrelationRegistry;
use browser_bridge::{
    Command, CommandRequest, CorrelationId, Resource, ResourceMessage, TabContent, TabId,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SECRET: &str = "bench-secret";
const CONTENT_SIZES: &[usize] = &[1024, 10 * 1024, 50 * 1024];

fn tab_content(size: usize) -> ResourceMessage {
    ResourceMessage::new(
        CorrelationId::generate(),
        Resource::TabContent(TabContent {
            tab_id: TabId::new(1),
            full_text: "x".repeat(size),
            is_truncated: false,
            total_length: size,
            links: Vec::new(),
        }),
    )
}

// ============================================================================
// Benchmark: Seal
// ============================================================================

fn bench_seal(c: &mut Criterion) {
    let mut group = c.benchmark_group("seal");

    let command = CommandRequest::new(Command::OpenTab {
        url: "https://example.com".into(),
    });
    group.bench_function("command", |b| {
        b.iter(|| SignedEnvelope::seal(&command, SECRET).expect("seal"));
    });

    for &size in CONTENT_SIZES {
        let message = tab_content(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("tab_content", size), &message, |b, m| {
            b.iter(|| SignedEnvelope::seal(m, SECRET).expect("seal"));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Verify and Parse
// ============================================================================

fn bench_receive(c: &mut Criterion) {
    let mut group = c.benchmark_group("receive");

    for &size in CONTENT_SIZES {
        let frame = SignedEnvelope::seal(&tab_content(size), SECRET)
            .and_then(|e| e.to_frame())
            .expect("frame");

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("parse_verify_open", size), &frame, |b, f| {
            b.iter(|| {
                let InboundFrame::Signed(envelope) = InboundFrame::parse(f).expect("parse") else {
                    panic!("expected signed frame");
                };
                assert!(envelope.verify(SECRET));
                envelope.open(SECRET).expect("open")
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Correlation
// ============================================================================

fn bench_correlation(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let registry = CorrelationRegistry::new();
    let registry = &registry;

    c.bench_function("register_resolve", |b| {
        b.to_async(&rt).iter(|| async move {
            let id = CorrelationId::generate();
            let pending = registry
                .register(id.clone(), ResourceKind::TabsClosed, Duration::from_secs(1))
                .expect("register");
            registry.resolve(ResourceMessage::new(id, Resource::TabsClosed));
            pending.wait().await.expect("resolved")
        });
    });
}

criterion_group!(benches, bench_seal, bench_receive, bench_correlation);
criterion_main!(benches);
