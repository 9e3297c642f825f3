// benches/har_bench.rs
//! HAR conversion throughput on synthetic page loads

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use harcap::cdp::{EventKind, ProtocolEvent};
use harcap::recording::HarExporter;
use serde_json::json;

/// A page load with `requests` subresources, each with a full lifecycle
fn synthetic_log(requests: usize) -> Vec<ProtocolEvent> {
    let mut events = vec![ProtocolEvent::new(
        EventKind::FrameStartedLoading,
        json!({"frameId": "F1"}),
    )];

    for i in 0..requests {
        let id = i.to_string();
        let ts = 100.0 + i as f64 * 0.001;
        let url = format!("https://bench.test/assets/{}.js?v={}", i, i % 7);

        events.push(ProtocolEvent::new(
            EventKind::RequestWillBeSent,
            json!({
                "requestId": id, "frameId": "F1", "timestamp": ts, "wallTime": 1760000000.0 + ts,
                "type": if i == 0 { "Document" } else { "Script" },
                "request": {"url": url, "method": "GET", "headers": {"Accept": "*/*", "Cookie": "a=1; b=2"}}
            }),
        ));
        events.push(ProtocolEvent::new(
            EventKind::ResponseReceived,
            json!({
                "requestId": id, "timestamp": ts + 0.02,
                "response": {
                    "url": url, "status": 200, "statusText": "OK", "protocol": "h2",
                    "mimeType": "application/javascript",
                    "headers": {"content-type": "application/javascript", "cache-control": "max-age=60"},
                    "timing": {"requestTime": ts, "dnsStart": 0.1, "dnsEnd": 1.0, "connectStart": 1.0,
                               "connectEnd": 5.0, "sslStart": 2.0, "sslEnd": 5.0, "sendStart": 5.1,
                               "sendEnd": 5.3, "receiveHeadersEnd": 18.0}
                }
            }),
        ));
        events.push(ProtocolEvent::new(
            EventKind::DataReceived,
            json!({"requestId": id, "timestamp": ts + 0.03, "dataLength": 4096}),
        ));
        events.push(ProtocolEvent::new(
            EventKind::LoadingFinished,
            json!({"requestId": id, "timestamp": ts + 0.04, "encodedDataLength": 1500}),
        ));
    }

    events.push(ProtocolEvent::new(EventKind::LoadEventFired, json!({"timestamp": 102.0})));
    events
}

fn conversion_benchmark(c: &mut Criterion) {
    let exporter = HarExporter::new();
    let mut group = c.benchmark_group("har_conversion");

    for requests in [10usize, 100, 1000] {
        let log = synthetic_log(requests);
        group.throughput(Throughput::Elements(log.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(requests), &log, |b, log| {
            b.iter(|| black_box(exporter.convert(black_box(log))));
        });
    }
    group.finish();
}

criterion_group!(benches, conversion_benchmark);
criterion_main!(benches);
