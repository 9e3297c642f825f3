// tests/har_export.rs
//! HAR conversion of a recorded page load

use harcap::cdp::{ChannelSession, ProtocolEvent};
use harcap::recording::har::HarEntry;
use harcap::recording::{DropReason, EventRecorder, HarExporter};
use harcap::runtime::parse_event_log;

const FIXTURE: &[u8] = include_bytes!("fixtures/react_capture.json");

fn fixture() -> Vec<ProtocolEvent> {
    parse_event_log(FIXTURE).unwrap()
}

fn entry<'a>(entries: &'a [HarEntry], url: &str) -> &'a HarEntry {
    entries
        .iter()
        .find(|e| e.request.url == url)
        .unwrap_or_else(|| panic!("no entry for {}", url))
}

#[test]
fn test_page_load_document() {
    let export = HarExporter::new().convert(&fixture());
    let log = &export.document.log;

    assert_eq!(log.version, "1.2");
    assert_eq!(log.creator.name, "harcap");

    let urls: Vec<&str> = log.entries.iter().map(|e| e.request.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "http://react.dev/",
            "https://react.dev/?uwu=1",
            "https://react.dev/main.js",
            "https://react.dev/images/uwu.png",
            "https://analytics.test/collect?v=1&t=pageview",
        ]
    );

    assert_eq!(log.pages.len(), 1);
    let page = &log.pages[0];
    assert_eq!(page.id, "page_1");
    assert_eq!(page.started_date_time, "2025-10-09T08:53:20.000Z");
    assert_eq!(page.page_timings.on_content_load, 500.0);
    assert_eq!(page.page_timings.on_load, 1000.0);
    assert!(log.entries.iter().all(|e| e.pageref.as_deref() == Some("page_1")));
}

#[test]
fn test_redirect_chain() {
    let export = HarExporter::new().convert(&fixture());
    let entries = &export.document.log.entries;

    let hop = entry(entries, "http://react.dev/");
    assert_eq!(hop.response.status, 301);
    assert_eq!(hop.response.redirect_url, "https://react.dev/?uwu=1");
    assert_eq!(hop.response.http_version, "HTTP/1.1");

    let document = entry(entries, "https://react.dev/?uwu=1");
    assert_eq!(document.request_id, "1");
    assert_eq!(document.response.status, 200);
    assert_eq!(document.response.http_version, "HTTP/2.0");
    assert_eq!(document.response.content.size, 6000);
    assert_eq!(document.response.body_size, 2500);
    assert_eq!(document.response.cookies[0].name, "theme");
    assert_eq!(document.server_ip_address.as_deref(), Some("2606:4700::6810:84e5"));
    assert_eq!(document.connection.as_deref(), Some("42"));
}

#[test]
fn test_cache_priority_and_failure() {
    let export = HarExporter::new().convert(&fixture());
    let entries = &export.document.log.entries;

    let script = entry(entries, "https://react.dev/main.js");
    assert!(script.is_cache_served());
    assert_eq!(script.response.body_size, 0);

    let image = entry(entries, "https://react.dev/images/uwu.png");
    assert_eq!(image.priority.as_deref(), Some("High"));
    assert_eq!(image.response.content.mime_type, "image/png");

    let ping = entry(entries, "https://analytics.test/collect?v=1&t=pageview");
    assert_eq!(ping.request.method, "POST");
    assert_eq!(ping.request.query_string.len(), 2);
    assert_eq!(ping.request.post_data.as_ref().map(|p| p.text.as_str()), Some("hit"));
    assert_eq!(ping.response.status, 0);
    assert_eq!(ping.response.error.as_deref(), Some("net::ERR_BLOCKED_BY_CLIENT"));
}

#[test]
fn test_unconvertible_groups_are_reported() {
    let export = HarExporter::new().convert(&fixture());

    assert_eq!(export.dropped.len(), 2);
    assert_eq!(export.dropped_count(DropReason::MissingSeed), 1);
    assert_eq!(export.dropped_count(DropReason::Incomplete), 1);

    let ids: Vec<&str> = export.dropped.iter().map(|d| d.request_id.as_str()).collect();
    assert!(ids.contains(&"ghost"));
    assert!(ids.contains(&"5"));
}

#[tokio::test]
async fn test_recorded_session_matches_offline_conversion() {
    let events = fixture();
    let session = ChannelSession::new();

    let mut capture = EventRecorder::new().attach(&session).await.unwrap();
    session.emit_all(events.clone());

    let recorded = capture.export().await.unwrap();
    let offline = HarExporter::new().convert(&events);

    assert_eq!(recorded.document, offline.document);
    assert_eq!(recorded.dropped, offline.dropped);
    assert!(capture.export().await.is_err());
}

#[test]
fn test_seed_delivered_after_completion() {
    let in_order = fixture();

    // Deliver the seeds of requests 3 and 4 after their completion events
    let mut reordered = in_order.clone();
    let failed_seed = reordered.remove(17);
    reordered.insert(18, failed_seed);
    let image_seed = reordered.remove(12);
    reordered.insert(16, image_seed);
    assert_eq!(reordered[16].request_id(), Some("3"));
    assert_eq!(reordered[18].request_id(), Some("4"));

    let expected = HarExporter::new().convert(&in_order);
    let export = HarExporter::new().convert(&reordered);

    assert_eq!(export.document, expected.document);
    assert_eq!(export.dropped, expected.dropped);

    let image = entry(&export.document.log.entries, "https://react.dev/images/uwu.png");
    assert_eq!(image.priority.as_deref(), Some("High"));
}
