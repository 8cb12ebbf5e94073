use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use serde_json::{json, Value};
use socket_io_metrics::config::Config;
use socket_io_metrics::{PayloadSizer, SocketIoMetrics};
use socket_transport::{EventServer, MemoryServer, Namespace};

// Broadcasts go to namespaces without sockets so nothing accumulates in
// outboxes while criterion iterates.

fn instrumented(name: &str) -> (MemoryServer, SocketIoMetrics) {
    let server = MemoryServer::new();
    server.of(name);
    let mut config = Config::default();
    config.instrumentation.check_for_new_namespaces = false;
    let handle: Arc<dyn EventServer> = Arc::new(server.clone());
    let metrics = SocketIoMetrics::start(handle, &config).unwrap();
    (server, metrics)
}

fn emit_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");
    group.throughput(Throughput::Elements(1));
    let args = [json!("hi")];

    let plain = MemoryServer::new();
    let plain_nsp = plain.of("/");
    group.bench_function("uninstrumented", |b| {
        b.iter(|| plain_nsp.emit("ping", &args))
    });

    let (server, _metrics) = instrumented("/");
    let nsp = server.of("/");
    group.bench_function("instrumented", |b| b.iter(|| nsp.emit("ping", &args)));

    group.bench_function("instrumented_blacklisted", |b| {
        b.iter(|| nsp.emit("disconnect", &args))
    });

    group.finish();
}

fn sizing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sizing");
    let sizer = PayloadSizer::default();
    let payload: Vec<Value> = vec![json!({
        "user": "alice",
        "text": "Hello world",
        "tags": ["a", "b", "c"],
        "seq": 12345,
    })];
    group.throughput(Throughput::Bytes(sizer.size_of_args(&payload)));

    group.bench_function("object_payload", |b| b.iter(|| sizer.size_of_args(&payload)));

    let raw = [json!("x".repeat(1024))];
    group.bench_function("raw_string_1k", |b| b.iter(|| sizer.size_of_args(&raw)));

    group.finish();
}

criterion_group!(benches, emit_benchmark, sizing_benchmark);
criterion_main!(benches);
