// src/recording/exporter.rs
//! Convert a captured event log into a HAR 1.2 document
//!
//! Network events are grouped by `requestId` and folded into one entry per
//! request hop:
//!
//! - `requestWillBeSent` seeds method, URL, headers, post data and start time
//! - `responseReceived` supplies status, headers, MIME type and phase timing
//! - `dataReceived` accumulates decoded body bytes
//! - `loadingFinished` records the encoded transfer size and closes the entry
//! - `loadingFailed` closes the entry with an error instead of a response
//! - `requestServedFromCache` marks the entry as served from memory cache
//!
//! Page events (`frameStartedLoading`, `frameAttached`,
//! `domContentEventFired`, `loadEventFired`) build the `pages` array.
//!
//! Notifications of different kinds may be delivered out of order. Events
//! that precede their `requestWillBeSent` are held back and replayed once
//! the seed arrives, and updates that follow `loadingFinished` still apply
//! to the closed entry.
//!
//! Groups that cannot form an entry are dropped and reported in
//! [`HarExport::dropped`]; conversion itself never fails.

use crate::cdp::events::{EventKind, ProtocolEvent};
use crate::observability::{HAR_ENTRIES, HAR_ENTRIES_DROPPED};
use crate::recording::har::{
    HarCache, HarContent, HarCookie, HarCreator, HarDocument, HarEntry, HarHeader, HarLog,
    HarPage, HarPageTimings, HarPostData, HarQueryParam, HarRequest, HarResponse, HarTimings,
    HAR_VERSION,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};
use url::Url;

/// Why a request group was left out of the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Events arrived for a request that was never seeded by `requestWillBeSent`
    MissingSeed,

    /// The seed had no usable method or URL
    MalformedSeed,

    /// Neither a response nor a failure was observed before capture ended
    Incomplete,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MissingSeed => "missing_seed",
            DropReason::MalformedSeed => "malformed_seed",
            DropReason::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request group that could not be converted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedGroup {
    pub request_id: String,
    pub reason: DropReason,
}

/// Result of a conversion: the document plus what was left out
#[derive(Debug, Clone)]
pub struct HarExport {
    pub document: HarDocument,
    pub dropped: Vec<DroppedGroup>,
}

impl HarExport {
    /// Number of dropped groups for one reason
    pub fn dropped_count(&self, reason: DropReason) -> usize {
        self.dropped.iter().filter(|d| d.reason == reason).count()
    }
}

/// Event log to HAR converter
#[derive(Debug, Clone, Default)]
pub struct HarExporter {
    creator: HarCreator,
}

impl HarExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the `log.creator` record
    pub fn with_creator(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            creator: HarCreator {
                name: name.into(),
                version: version.into(),
            },
        }
    }

    /// Convert an ordered event log into a best-effort HAR document
    pub fn convert(&self, events: &[ProtocolEvent]) -> HarExport {
        debug!("Converting {} events to HAR", events.len());

        let mut builder = HarBuilder::default();
        for event in events {
            builder.apply(event);
        }
        builder.finish(self.creator.clone())
    }
}

#[derive(Debug, Clone)]
struct DocumentStart {
    timestamp: f64,
    wall_time: f64,
    url: String,
}

#[derive(Debug)]
struct PendingPage {
    frame_id: String,
    start: Option<DocumentStart>,
    dom_content: Option<f64>,
    load: Option<f64>,
}

#[derive(Debug)]
struct PendingEntry {
    request_id: String,
    request: Value,
    timestamp: f64,
    wall_time: f64,
    resource_type: Option<String>,
    priority: Option<String>,
    initiator: Option<Value>,
    response: Option<Value>,
    response_timestamp: Option<f64>,
    data_length: i64,
    encoded_length: Option<i64>,
    end_timestamp: Option<f64>,
    from_memory_cache: bool,
    error: Option<String>,
    redirect_url: Option<String>,
}

#[derive(Default)]
struct HarBuilder {
    live: HashMap<String, PendingEntry>,
    done: Vec<PendingEntry>,
    /// Ids whose seed was malformed; later events are ignored
    closed: HashSet<String>,
    /// Index into `done` of each request closed by finish or failure
    finished: HashMap<String, usize>,
    /// Events received before their seed, keyed by request id
    early: HashMap<String, Vec<ProtocolEvent>>,
    /// First-seen order of the ids in `early`
    orphans: Vec<String>,
    dropped: Vec<DroppedGroup>,
    pages: Vec<PendingPage>,
    child_frames: HashSet<String>,
    pending_documents: HashMap<String, DocumentStart>,
    wall_offset: Option<f64>,
}

impl HarBuilder {
    fn apply(&mut self, event: &ProtocolEvent) {
        let params = &event.params;
        match event.kind {
            EventKind::FrameAttached => {
                let frame = str_field(params, "frameId");
                if let (Some(frame), Some(_)) = (frame, str_field(params, "parentFrameId")) {
                    self.child_frames.insert(frame.to_string());
                }
            }
            EventKind::FrameStartedLoading => self.frame_started(params),
            EventKind::DomContentEventFired => {
                if let Some(page) = self.pages.last_mut() {
                    page.dom_content = page.dom_content.or(event.timestamp());
                }
            }
            EventKind::LoadEventFired => {
                if let Some(page) = self.pages.last_mut() {
                    page.load = page.load.or(event.timestamp());
                }
            }
            EventKind::RequestWillBeSent => self.request_will_be_sent(params),
            _ => self.update_request(event),
        }
    }

    fn frame_started(&mut self, params: &Value) {
        let Some(frame) = str_field(params, "frameId") else {
            return;
        };
        if self.child_frames.contains(frame) {
            return;
        }

        self.pages.push(PendingPage {
            frame_id: frame.to_string(),
            start: self.pending_documents.remove(frame),
            dom_content: None,
            load: None,
        });
    }

    fn document_started(&mut self, frame: &str, start: DocumentStart) {
        if self.child_frames.contains(frame) {
            return;
        }

        match self.pages.last_mut() {
            Some(page) if page.frame_id == frame && page.start.is_none() => page.start = Some(start),
            _ => {
                self.pending_documents.insert(frame.to_string(), start);
            }
        }
    }

    fn request_will_be_sent(&mut self, params: &Value) {
        let Some(id) = str_field(params, "requestId") else {
            debug!("Ignoring requestWillBeSent without requestId");
            return;
        };

        let request = params.get("request").cloned().unwrap_or(Value::Null);
        let url = str_field(&request, "url").map(str::to_string);
        let timestamp = num_field(params, "timestamp").unwrap_or(0.0);
        let redirect = params.get("redirectResponse").filter(|r| r.is_object());

        if let Some(mut previous) = self.live.remove(id) {
            match redirect {
                Some(response) => {
                    previous.response = Some(response.clone());
                    previous.response_timestamp = Some(timestamp);
                    previous.end_timestamp = Some(timestamp);
                    previous.redirect_url = url.clone();
                    self.done.push(previous);
                }
                None if previous.response.is_some() => self.done.push(previous),
                None => self.drop_group(id, DropReason::Incomplete),
            }
        }

        let early = self.early.remove(id);

        if url.is_none() || str_field(&request, "method").is_none() {
            if let Some(events) = early {
                debug!(request_id = id, "Discarding {} events of a malformed request", events.len());
            }
            self.drop_group(id, DropReason::MalformedSeed);
            self.closed.insert(id.to_string());
            return;
        }

        let wall_time = match num_field(params, "wallTime") {
            Some(wall) => {
                self.wall_offset = Some(wall - timestamp);
                wall
            }
            None => self.wall_offset.map(|o| o + timestamp).unwrap_or(0.0),
        };

        let resource_type = str_field(params, "type").map(str::to_string);
        if resource_type.as_deref() == Some("Document") && redirect.is_none() {
            if let (Some(frame), Some(url)) = (str_field(params, "frameId"), url.clone()) {
                self.document_started(
                    frame,
                    DocumentStart {
                        timestamp,
                        wall_time,
                        url,
                    },
                );
            }
        }

        self.closed.remove(id);
        self.live.insert(
            id.to_string(),
            PendingEntry {
                request_id: id.to_string(),
                priority: str_field(&request, "initialPriority").map(str::to_string),
                request,
                timestamp,
                wall_time,
                resource_type,
                initiator: params.get("initiator").cloned(),
                response: None,
                response_timestamp: None,
                data_length: 0,
                encoded_length: None,
                end_timestamp: None,
                from_memory_cache: false,
                error: None,
                redirect_url: None,
            },
        );

        if let Some(events) = early {
            debug!(request_id = id, "Replaying {} events received before the seed", events.len());
            for event in &events {
                self.update_request(event);
            }
        }
    }

    fn update_request(&mut self, event: &ProtocolEvent) {
        let Some(id) = event.request_id() else {
            debug!("Ignoring {} without requestId", event.kind);
            return;
        };

        if let Some(entry) = self.live.get_mut(id) {
            if apply_update(entry, event) {
                if let Some(entry) = self.live.remove(id) {
                    self.finished.insert(id.to_string(), self.done.len());
                    self.done.push(entry);
                }
            }
            return;
        }

        if let Some(&index) = self.finished.get(id) {
            match event.kind {
                EventKind::LoadingFinished | EventKind::LoadingFailed => {
                    debug!(request_id = id, "Ignoring repeated {}", event.kind);
                }
                _ => {
                    apply_update(&mut self.done[index], event);
                }
            }
            return;
        }

        if self.closed.contains(id) {
            debug!(request_id = id, "Ignoring {} for a malformed request", event.kind);
            return;
        }

        if !self.early.contains_key(id) {
            self.orphans.push(id.to_string());
        }
        self.early.entry(id.to_string()).or_default().push(event.clone());
    }

    fn drop_group(&mut self, request_id: &str, reason: DropReason) {
        warn!(request_id, %reason, "Dropping request group from HAR");
        metrics::counter!(HAR_ENTRIES_DROPPED, "reason" => reason.as_str()).increment(1);
        self.dropped.push(DroppedGroup {
            request_id: request_id.to_string(),
            reason,
        });
    }

    fn finish(mut self, creator: HarCreator) -> HarExport {
        let mut remaining: Vec<PendingEntry> = self.live.drain().map(|(_, entry)| entry).collect();
        remaining.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        for entry in remaining {
            if entry.response.is_some() {
                self.done.push(entry);
            } else {
                self.drop_group(&entry.request_id, DropReason::Incomplete);
            }
        }

        let orphans: Vec<String> = std::mem::take(&mut self.orphans)
            .into_iter()
            .filter(|id| self.early.contains_key(id))
            .collect();
        for id in &orphans {
            self.drop_group(id, DropReason::MissingSeed);
        }

        let mut pages: Vec<(f64, HarPage)> = Vec::new();
        for page in &self.pages {
            let Some(start) = &page.start else {
                debug!(frame_id = %page.frame_id, "Skipping page without a document request");
                continue;
            };
            let relative = |ts: Option<f64>| ts.map(|t| round_ms((t - start.timestamp) * 1000.0)).unwrap_or(-1.0);
            pages.push((
                start.timestamp,
                HarPage {
                    started_date_time: format_wall_time(start.wall_time),
                    id: format!("page_{}", pages.len() + 1),
                    title: start.url.clone(),
                    page_timings: HarPageTimings {
                        on_content_load: relative(page.dom_content),
                        on_load: relative(page.load),
                    },
                },
            ));
        }

        self.done.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        let entries: Vec<HarEntry> = self
            .done
            .iter()
            .map(|entry| {
                let pageref = pages
                    .iter()
                    .rev()
                    .find(|(start, _)| *start <= entry.timestamp)
                    .map(|(_, page)| page.id.clone());
                build_entry(entry, pageref)
            })
            .collect();

        metrics::counter!(HAR_ENTRIES).increment(entries.len() as u64);
        debug!(
            "HAR conversion produced {} entries, {} pages, {} dropped groups",
            entries.len(),
            pages.len(),
            self.dropped.len()
        );

        HarExport {
            document: HarDocument {
                log: HarLog {
                    version: HAR_VERSION.to_string(),
                    creator,
                    pages: pages.into_iter().map(|(_, page)| page).collect(),
                    entries,
                },
            },
            dropped: self.dropped,
        }
    }
}

/// Fold one non-seed notification into an entry; true when it closes the entry
fn apply_update(entry: &mut PendingEntry, event: &ProtocolEvent) -> bool {
    let params = &event.params;
    match event.kind {
        EventKind::RequestServedFromCache => entry.from_memory_cache = true,
        EventKind::DataReceived => {
            entry.data_length += num_field(params, "dataLength").unwrap_or(0.0) as i64;
        }
        EventKind::ResponseReceived => {
            entry.response = params.get("response").filter(|r| r.is_object()).cloned();
            entry.response_timestamp = event.timestamp();
            if let Some(kind) = str_field(params, "type") {
                entry.resource_type = Some(kind.to_string());
            }
        }
        EventKind::ResourceChangedPriority => {
            if let Some(priority) = str_field(params, "newPriority") {
                entry.priority = Some(priority.to_string());
            }
        }
        EventKind::LoadingFinished => {
            entry.encoded_length = num_field(params, "encodedDataLength").map(|v| v as i64);
            entry.end_timestamp = event.timestamp();
            return true;
        }
        EventKind::LoadingFailed => {
            let canceled = params.get("canceled").and_then(Value::as_bool).unwrap_or(false);
            let fallback = if canceled { "net::ERR_ABORTED" } else { "net::ERR_FAILED" };
            let text = str_field(params, "errorText")
                .filter(|t| !t.is_empty())
                .unwrap_or(fallback);
            entry.error = Some(text.to_string());
            entry.end_timestamp = event.timestamp();
            return true;
        }
        _ => {}
    }
    false
}

fn build_entry(entry: &PendingEntry, pageref: Option<String>) -> HarEntry {
    let response = entry.response.as_ref();
    let http_version = http_version(response.and_then(|r| str_field(r, "protocol")));
    let timings = build_timings(entry);

    let from_cache = if entry.from_memory_cache {
        Some("memory".to_string())
    } else if response
        .and_then(|r| r.get("fromDiskCache"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        Some("disk".to_string())
    } else {
        None
    };

    HarEntry {
        pageref,
        started_date_time: format_wall_time(entry.wall_time),
        time: round_ms(timings.total()),
        request: build_request(entry, &http_version),
        response: build_response(entry, &http_version, from_cache.is_some()),
        cache: HarCache::default(),
        timings,
        server_ip_address: response
            .and_then(|r| str_field(r, "remoteIPAddress"))
            .map(|ip| ip.trim_start_matches('[').trim_end_matches(']').to_string()),
        connection: response.and_then(|r| r.get("connectionId")).and_then(|c| match c {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }),
        request_id: entry.request_id.clone(),
        initiator: entry.initiator.clone(),
        priority: entry.priority.clone(),
        resource_type: entry.resource_type.clone(),
        from_cache,
    }
}

fn build_request(entry: &PendingEntry, http_version: &str) -> HarRequest {
    let request = &entry.request;
    let mut url = str_field(request, "url").unwrap_or_default().to_string();
    if let Some(fragment) = str_field(request, "urlFragment") {
        url.push_str(fragment);
    }

    let headers = headers_from(request.get("headers"));
    let query_string = Url::parse(&url)
        .map(|parsed| {
            parsed
                .query_pairs()
                .map(|(name, value)| HarQueryParam {
                    name: name.into_owned(),
                    value: value.into_owned(),
                })
                .collect()
        })
        .unwrap_or_default();

    let post_data = str_field(request, "postData").map(|text| HarPostData {
        mime_type: header_value(&headers, "content-type").unwrap_or_default().to_string(),
        text: text.to_string(),
    });
    let body_size = post_data.as_ref().map(|p| p.text.len() as i64).unwrap_or(0);

    HarRequest {
        method: str_field(request, "method").unwrap_or_default().to_string(),
        url,
        http_version: http_version.to_string(),
        cookies: request_cookies(&headers),
        query_string,
        post_data,
        headers,
        headers_size: -1,
        body_size,
    }
}

fn build_response(entry: &PendingEntry, http_version: &str, cached: bool) -> HarResponse {
    let Some(response) = entry.response.as_ref() else {
        return HarResponse {
            status: 0,
            status_text: String::new(),
            http_version: http_version.to_string(),
            cookies: vec![],
            headers: vec![],
            content: HarContent {
                size: entry.data_length,
                mime_type: "x-unknown".to_string(),
            },
            redirect_url: String::new(),
            headers_size: -1,
            body_size: -1,
            transfer_size: entry.encoded_length,
            error: entry.error.clone(),
        };
    };

    let status = num_field(response, "status").unwrap_or(0.0) as u16;
    let headers = headers_from(response.get("headers"));
    let headers_size = str_field(response, "headersText")
        .map(|t| t.len() as i64)
        .unwrap_or(-1);

    let body_size = if cached || status == 304 {
        0
    } else {
        match entry.encoded_length {
            Some(encoded) if headers_size >= 0 => (encoded - headers_size).max(0),
            Some(encoded) => encoded,
            None => -1,
        }
    };

    let redirect_url = entry
        .redirect_url
        .clone()
        .or_else(|| header_value(&headers, "location").map(str::to_string))
        .unwrap_or_default();

    HarResponse {
        status,
        status_text: str_field(response, "statusText").unwrap_or_default().to_string(),
        http_version: http_version.to_string(),
        cookies: response_cookies(&headers),
        content: HarContent {
            size: entry.data_length,
            mime_type: str_field(response, "mimeType")
                .filter(|m| !m.is_empty())
                .unwrap_or("x-unknown")
                .to_string(),
        },
        headers,
        redirect_url,
        headers_size,
        body_size,
        transfer_size: entry.encoded_length,
        error: entry.error.clone(),
    }
}

fn build_timings(entry: &PendingEntry) -> HarTimings {
    let timing = entry
        .response
        .as_ref()
        .and_then(|r| r.get("timing"))
        .filter(|t| t.is_object());

    let Some(timing) = timing else {
        let wait = match (entry.response_timestamp, entry.end_timestamp) {
            (Some(response), _) => ms_between(entry.timestamp, response),
            (None, Some(end)) => ms_between(entry.timestamp, end),
            (None, None) => 0.0,
        };
        let receive = match (entry.response_timestamp, entry.end_timestamp) {
            (Some(response), Some(end)) => ms_between(response, end),
            _ => 0.0,
        };
        return HarTimings {
            blocked: -1.0,
            dns: -1.0,
            connect: -1.0,
            send: 0.0,
            wait,
            receive,
            ssl: -1.0,
        };
    };

    let field = |name: &str| num_field(timing, name).unwrap_or(-1.0);
    let request_time = field("requestTime");
    let dns_start = field("dnsStart");
    let connect_start = field("connectStart");
    let ssl_start = field("sslStart");
    let send_start = field("sendStart");
    let send_end = field("sendEnd");
    let headers_end = field("receiveHeadersEnd");

    let phase = |start: f64, end: f64| {
        if start >= 0.0 {
            round_ms((end - start).max(0.0))
        } else {
            -1.0
        }
    };

    let queued = if request_time > 0.0 {
        ms_between(entry.timestamp, request_time)
    } else {
        0.0
    };
    let first_phase = [dns_start, connect_start, send_start]
        .into_iter()
        .find(|v| *v >= 0.0)
        .unwrap_or(0.0);

    let receive = match entry.end_timestamp {
        Some(end) if request_time > 0.0 && headers_end >= 0.0 => {
            round_ms(((end - request_time) * 1000.0 - headers_end).max(0.0))
        }
        _ => 0.0,
    };

    HarTimings {
        blocked: round_ms(queued + first_phase),
        dns: phase(dns_start, field("dnsEnd")),
        connect: phase(connect_start, field("connectEnd")),
        send: phase(send_start, send_end).max(0.0),
        wait: if headers_end >= 0.0 && send_end >= 0.0 {
            round_ms((headers_end - send_end).max(0.0))
        } else {
            0.0
        },
        receive,
        ssl: phase(ssl_start, field("sslEnd")),
    }
}

fn headers_from(value: Option<&Value>) -> Vec<HarHeader> {
    let Some(Value::Object(map)) = value else {
        return vec![];
    };

    let mut headers = Vec::with_capacity(map.len());
    for (name, value) in map {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        // Repeated headers are joined with newlines by the browser
        for line in text.split('\n') {
            headers.push(HarHeader {
                name: name.clone(),
                value: line.to_string(),
            });
        }
    }
    headers
}

fn header_value<'a>(headers: &'a [HarHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn request_cookies(headers: &[HarHeader]) -> Vec<HarCookie> {
    headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case("cookie"))
        .flat_map(|h| h.value.split(';'))
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            HarCookie {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
                ..Default::default()
            }
        })
        .collect()
}

fn response_cookies(headers: &[HarHeader]) -> Vec<HarCookie> {
    headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case("set-cookie"))
        .filter_map(|h| parse_set_cookie(&h.value))
        .collect()
}

fn parse_set_cookie(line: &str) -> Option<HarCookie> {
    let mut parts = line.split(';').map(str::trim);
    let (name, value) = parts.next()?.split_once('=')?;

    let mut cookie = HarCookie {
        name: name.trim().to_string(),
        value: value.trim().to_string(),
        ..Default::default()
    };

    for attribute in parts {
        let (key, val) = attribute.split_once('=').unwrap_or((attribute, ""));
        match key.trim().to_ascii_lowercase().as_str() {
            "path" => cookie.path = Some(val.trim().to_string()),
            "domain" => cookie.domain = Some(val.trim().to_string()),
            "expires" => cookie.expires = Some(val.trim().to_string()),
            "httponly" => cookie.http_only = Some(true),
            "secure" => cookie.secure = Some(true),
            _ => {}
        }
    }

    Some(cookie)
}

fn http_version(protocol: Option<&str>) -> String {
    let Some(protocol) = protocol else {
        return String::new();
    };
    match protocol.to_ascii_lowercase().as_str() {
        "h2" | "http/2" | "http/2.0" => "HTTP/2.0".to_string(),
        p if p.starts_with("h3") || p == "quic" => "HTTP/3.0".to_string(),
        "http/1.1" => "HTTP/1.1".to_string(),
        "http/1.0" => "HTTP/1.0".to_string(),
        _ => protocol.to_string(),
    }
}

fn str_field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value.get(name).and_then(Value::as_str)
}

fn num_field(value: &Value, name: &str) -> Option<f64> {
    value.get(name).and_then(Value::as_f64)
}

fn ms_between(start: f64, end: f64) -> f64 {
    round_ms(((end - start) * 1000.0).max(0.0))
}

fn round_ms(ms: f64) -> f64 {
    (ms * 1000.0).round() / 1000.0
}

fn format_wall_time(seconds: f64) -> String {
    let secs = seconds.floor() as i64;
    let nsecs = ((seconds - seconds.floor()) * 1_000_000_000.0) as u32;
    let dt = DateTime::<Utc>::from_timestamp(secs, nsecs).unwrap_or_default();
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(kind: EventKind, params: Value) -> ProtocolEvent {
        ProtocolEvent::new(kind, params)
    }

    fn request(id: &str, url: &str, ts: f64) -> ProtocolEvent {
        ev(
            EventKind::RequestWillBeSent,
            json!({
                "requestId": id,
                "loaderId": "L1",
                "timestamp": ts,
                "wallTime": 1_700_000_000.0 + ts,
                "type": "Fetch",
                "frameId": "F1",
                "request": {
                    "url": url,
                    "method": "GET",
                    "headers": {"Accept": "*/*"},
                    "initialPriority": "High"
                }
            }),
        )
    }

    fn response(id: &str, status: u16, ts: f64) -> ProtocolEvent {
        ev(
            EventKind::ResponseReceived,
            json!({
                "requestId": id,
                "timestamp": ts,
                "type": "Fetch",
                "response": {
                    "url": "https://x/a",
                    "status": status,
                    "statusText": "OK",
                    "headers": {"content-type": "text/plain"},
                    "mimeType": "text/plain",
                    "protocol": "h2"
                }
            }),
        )
    }

    fn finished(id: &str, bytes: u64, ts: f64) -> ProtocolEvent {
        ev(
            EventKind::LoadingFinished,
            json!({"requestId": id, "timestamp": ts, "encodedDataLength": bytes}),
        )
    }

    fn data(id: &str, len: u64, ts: f64) -> ProtocolEvent {
        ev(
            EventKind::DataReceived,
            json!({"requestId": id, "timestamp": ts, "dataLength": len, "encodedDataLength": len}),
        )
    }

    #[test]
    fn test_single_request_scenario() {
        let events = vec![
            request("1", "https://x/a", 10.0),
            response("1", 200, 10.1),
            finished("1", 100, 10.2),
        ];

        let export = HarExporter::new().convert(&events);
        let entries = &export.document.log.entries;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request.url, "https://x/a");
        assert_eq!(entries[0].response.status, 200);
        assert_eq!(entries[0].response.transfer_size, Some(100));
        assert_eq!(entries[0].response.http_version, "HTTP/2.0");
        assert_eq!(entries[0].timings.wait, 100.0);
        assert_eq!(entries[0].timings.receive, 100.0);
        assert_eq!(entries[0].time, 200.0);
        assert!(export.dropped.is_empty());
    }

    #[test]
    fn test_data_received_accumulates() {
        let events = vec![
            request("1", "https://x/a", 1.0),
            response("1", 200, 1.1),
            data("1", 300, 1.2),
            data("1", 200, 1.3),
            data("1", 24, 1.4),
            finished("1", 600, 1.5),
        ];

        let export = HarExporter::new().convert(&events);
        assert_eq!(export.document.log.entries[0].response.content.size, 524);
    }

    #[test]
    fn test_missing_seed_is_dropped() {
        let events = vec![
            request("1", "https://x/a", 1.0),
            response("1", 200, 1.1),
            finished("1", 10, 1.2),
            finished("ghost", 10, 1.3),
        ];

        let export = HarExporter::new().convert(&events);
        assert_eq!(export.document.log.entries.len(), 1);
        assert_eq!(export.dropped_count(DropReason::MissingSeed), 1);
        assert_eq!(export.dropped[0].request_id, "ghost");
    }

    #[test]
    fn test_events_before_seed_are_replayed() {
        let events = vec![
            request("1", "https://x/a", 1.0),
            response("2", 200, 1.3),
            data("2", 400, 1.35),
            data("2", 100, 1.36),
            finished("2", 520, 1.4),
            request("2", "https://x/b", 1.2),
            response("1", 200, 1.5),
            finished("1", 10, 1.6),
        ];

        let export = HarExporter::new().convert(&events);
        let entries = &export.document.log.entries;

        assert!(export.dropped.is_empty());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].request.url, "https://x/b");
        assert_eq!(entries[1].response.status, 200);
        assert_eq!(entries[1].response.content.size, 500);
        assert_eq!(entries[1].response.transfer_size, Some(520));
    }

    #[test]
    fn test_updates_after_finish_still_apply() {
        let events = vec![
            request("1", "https://x/a", 1.0),
            data("1", 64, 1.1),
            finished("1", 200, 1.3),
            response("1", 200, 1.05),
            data("1", 36, 1.2),
            finished("1", 999, 1.4),
        ];

        let export = HarExporter::new().convert(&events);
        let entry = &export.document.log.entries[0];

        assert!(export.dropped.is_empty());
        assert_eq!(entry.response.status, 200);
        assert_eq!(entry.response.content.size, 100);
        assert_eq!(entry.response.transfer_size, Some(200));
    }

    #[test]
    fn test_incomplete_request_is_dropped() {
        let events = vec![request("1", "https://x/a", 1.0)];

        let export = HarExporter::new().convert(&events);
        assert!(export.document.log.entries.is_empty());
        assert_eq!(export.dropped_count(DropReason::Incomplete), 1);
    }

    #[test]
    fn test_response_without_finish_is_kept() {
        let events = vec![request("1", "https://x/a", 1.0), response("1", 200, 1.1)];

        let export = HarExporter::new().convert(&events);
        assert_eq!(export.document.log.entries.len(), 1);
        assert_eq!(export.document.log.entries[0].response.body_size, -1);
    }

    #[test]
    fn test_malformed_seed_is_dropped() {
        let events = vec![
            ev(
                EventKind::RequestWillBeSent,
                json!({"requestId": "1", "timestamp": 1.0, "request": {"headers": {}}}),
            ),
            finished("1", 10, 1.1),
        ];

        let export = HarExporter::new().convert(&events);
        assert!(export.document.log.entries.is_empty());
        assert_eq!(export.dropped.len(), 1);
        assert_eq!(export.dropped[0].reason, DropReason::MalformedSeed);
    }

    #[test]
    fn test_served_from_cache() {
        let events = vec![
            request("1", "https://x/logo.png", 1.0),
            ev(EventKind::RequestServedFromCache, json!({"requestId": "1"})),
            response("1", 200, 1.01),
            finished("1", 0, 1.02),
        ];

        let export = HarExporter::new().convert(&events);
        let entry = &export.document.log.entries[0];
        assert!(entry.is_cache_served());
        assert_eq!(entry.from_cache.as_deref(), Some("memory"));
        assert_eq!(entry.response.body_size, 0);
    }

    #[test]
    fn test_loading_failed() {
        let events = vec![
            request("1", "https://x/missing.js", 1.0),
            ev(
                EventKind::LoadingFailed,
                json!({"requestId": "1", "timestamp": 1.5, "errorText": "net::ERR_NAME_NOT_RESOLVED", "canceled": false}),
            ),
        ];

        let export = HarExporter::new().convert(&events);
        let entry = &export.document.log.entries[0];
        assert_eq!(entry.response.status, 0);
        assert_eq!(entry.response.error.as_deref(), Some("net::ERR_NAME_NOT_RESOLVED"));
        assert_eq!(entry.timings.wait, 500.0);
    }

    #[test]
    fn test_redirect_produces_two_entries() {
        let mut hop = request("1", "https://x/b", 2.0);
        hop.params["redirectResponse"] = json!({
            "url": "https://x/a",
            "status": 301,
            "statusText": "Moved Permanently",
            "headers": {"Location": "https://x/b"},
            "mimeType": "text/html"
        });

        let events = vec![
            request("1", "https://x/a", 1.0),
            hop,
            response("1", 200, 2.1),
            finished("1", 50, 2.2),
        ];

        let export = HarExporter::new().convert(&events);
        let entries = &export.document.log.entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].request.url, "https://x/a");
        assert_eq!(entries[0].response.status, 301);
        assert_eq!(entries[0].response.redirect_url, "https://x/b");
        assert_eq!(entries[1].request.url, "https://x/b");
        assert_eq!(entries[1].response.status, 200);
    }

    #[test]
    fn test_entries_sorted_by_start() {
        let events = vec![
            request("late", "https://x/late", 5.0),
            request("early", "https://x/early", 1.0),
            response("late", 200, 5.1),
            finished("late", 1, 5.2),
            response("early", 200, 1.1),
            finished("early", 1, 1.2),
        ];

        let export = HarExporter::new().convert(&events);
        let urls: Vec<_> = export
            .document
            .log
            .entries
            .iter()
            .map(|e| e.request.url.as_str())
            .collect();
        assert_eq!(urls, vec!["https://x/early", "https://x/late"]);
    }

    #[test]
    fn test_priority_change() {
        let events = vec![
            request("1", "https://x/a", 1.0),
            ev(
                EventKind::ResourceChangedPriority,
                json!({"requestId": "1", "newPriority": "VeryHigh", "timestamp": 1.05}),
            ),
            response("1", 200, 1.1),
            finished("1", 1, 1.2),
        ];

        let export = HarExporter::new().convert(&events);
        assert_eq!(export.document.log.entries[0].priority.as_deref(), Some("VeryHigh"));
    }

    #[test]
    fn test_pages_from_frame_events() {
        let mut document = request("doc", "https://x/", 10.0);
        document.params["type"] = json!("Document");

        let events = vec![
            ev(EventKind::FrameStartedLoading, json!({"frameId": "F1"})),
            document,
            ev(EventKind::FrameAttached, json!({"frameId": "F2", "parentFrameId": "F1"})),
            ev(EventKind::FrameStartedLoading, json!({"frameId": "F2"})),
            response("doc", 200, 10.2),
            finished("doc", 10, 10.3),
            ev(EventKind::DomContentEventFired, json!({"timestamp": 10.5})),
            ev(EventKind::LoadEventFired, json!({"timestamp": 11.25})),
        ];

        let export = HarExporter::new().convert(&events);
        let pages = &export.document.log.pages;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id, "page_1");
        assert_eq!(pages[0].title, "https://x/");
        assert_eq!(pages[0].page_timings.on_content_load, 500.0);
        assert_eq!(pages[0].page_timings.on_load, 1250.0);
        assert_eq!(export.document.log.entries[0].pageref.as_deref(), Some("page_1"));
    }

    #[test]
    fn test_document_request_before_frame_event() {
        let mut document = request("doc", "https://x/", 10.0);
        document.params["type"] = json!("Document");

        let events = vec![
            document,
            ev(EventKind::FrameStartedLoading, json!({"frameId": "F1"})),
            response("doc", 200, 10.2),
            finished("doc", 10, 10.3),
        ];

        let export = HarExporter::new().convert(&events);
        assert_eq!(export.document.log.pages.len(), 1);
        assert_eq!(export.document.log.pages[0].page_timings.on_load, -1.0);
    }

    #[test]
    fn test_headers_cookies_and_query() {
        let events = vec![
            ev(
                EventKind::RequestWillBeSent,
                json!({
                    "requestId": "1",
                    "timestamp": 1.0,
                    "wallTime": 1_700_000_000.5,
                    "request": {
                        "url": "https://x/search?q=rust&page=2",
                        "method": "POST",
                        "headers": {"Cookie": "a=1; b=2", "Content-Type": "application/json"},
                        "postData": "{\"k\":1}"
                    }
                }),
            ),
            ev(
                EventKind::ResponseReceived,
                json!({
                    "requestId": "1",
                    "timestamp": 1.1,
                    "response": {
                        "status": 200,
                        "statusText": "OK",
                        "headers": {"Set-Cookie": "sid=abc; Path=/; HttpOnly\ntheme=dark"},
                        "mimeType": "application/json",
                        "remoteIPAddress": "[::1]",
                        "connectionId": 42
                    }
                }),
            ),
            finished("1", 10, 1.2),
        ];

        let export = HarExporter::new().convert(&events);
        let entry = &export.document.log.entries[0];

        assert_eq!(entry.started_date_time, "2023-11-14T22:13:20.500Z");
        assert_eq!(entry.request.query_string.len(), 2);
        assert_eq!(entry.request.query_string[0].name, "q");
        assert_eq!(entry.request.cookies.len(), 2);
        assert_eq!(entry.request.body_size, 7);
        assert_eq!(
            entry.request.post_data.as_ref().map(|p| p.mime_type.as_str()),
            Some("application/json")
        );
        assert_eq!(entry.response.headers.len(), 2);
        assert_eq!(entry.response.cookies.len(), 2);
        assert_eq!(entry.response.cookies[0].path.as_deref(), Some("/"));
        assert_eq!(entry.response.cookies[0].http_only, Some(true));
        assert_eq!(entry.server_ip_address.as_deref(), Some("::1"));
        assert_eq!(entry.connection.as_deref(), Some("42"));
    }

    #[test]
    fn test_detailed_timing() {
        let mut resp = response("1", 200, 1.1);
        resp.params["response"]["timing"] = json!({
            "requestTime": 1.01,
            "dnsStart": 0.0, "dnsEnd": 5.0,
            "connectStart": 5.0, "connectEnd": 25.0,
            "sslStart": 10.0, "sslEnd": 25.0,
            "sendStart": 26.0, "sendEnd": 27.0,
            "receiveHeadersEnd": 80.0
        });

        let events = vec![request("1", "https://x/a", 1.0), resp, finished("1", 10, 1.2)];

        let export = HarExporter::new().convert(&events);
        let t = &export.document.log.entries[0].timings;
        assert_eq!(t.blocked, 10.0);
        assert_eq!(t.dns, 5.0);
        assert_eq!(t.connect, 20.0);
        assert_eq!(t.ssl, 15.0);
        assert_eq!(t.send, 1.0);
        assert_eq!(t.wait, 53.0);
        assert_eq!(t.receive, 110.0);
    }

    #[test]
    fn test_http_version_mapping() {
        assert_eq!(http_version(Some("h2")), "HTTP/2.0");
        assert_eq!(http_version(Some("h3-29")), "HTTP/3.0");
        assert_eq!(http_version(Some("http/1.1")), "HTTP/1.1");
        assert_eq!(http_version(Some("data")), "data");
        assert_eq!(http_version(None), "");
    }
}
