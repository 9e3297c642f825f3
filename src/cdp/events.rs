// src/cdp/events.rs
//! Typed protocol events
//!
//! A [`ProtocolEvent`] pairs an [`EventKind`] tag with the untouched JSON
//! parameters delivered by the browser. On disk an event log is an array of
//! `{"method": "Network.requestWillBeSent", "params": {...}}` records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Page and network notifications captured during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "Page.loadEventFired")]
    LoadEventFired,
    #[serde(rename = "Page.domContentEventFired")]
    DomContentEventFired,
    #[serde(rename = "Page.frameStartedLoading")]
    FrameStartedLoading,
    #[serde(rename = "Page.frameAttached")]
    FrameAttached,
    #[serde(rename = "Network.requestWillBeSent")]
    RequestWillBeSent,
    #[serde(rename = "Network.requestServedFromCache")]
    RequestServedFromCache,
    #[serde(rename = "Network.dataReceived")]
    DataReceived,
    #[serde(rename = "Network.responseReceived")]
    ResponseReceived,
    #[serde(rename = "Network.resourceChangedPriority")]
    ResourceChangedPriority,
    #[serde(rename = "Network.loadingFinished")]
    LoadingFinished,
    #[serde(rename = "Network.loadingFailed")]
    LoadingFailed,
}

impl EventKind {
    /// Every kind the recorder subscribes to
    pub const ALL: [EventKind; 11] = [
        EventKind::LoadEventFired,
        EventKind::DomContentEventFired,
        EventKind::FrameStartedLoading,
        EventKind::FrameAttached,
        EventKind::RequestWillBeSent,
        EventKind::RequestServedFromCache,
        EventKind::DataReceived,
        EventKind::ResponseReceived,
        EventKind::ResourceChangedPriority,
        EventKind::LoadingFinished,
        EventKind::LoadingFailed,
    ];

    /// CDP method name
    pub fn method(&self) -> &'static str {
        match self {
            EventKind::LoadEventFired => "Page.loadEventFired",
            EventKind::DomContentEventFired => "Page.domContentEventFired",
            EventKind::FrameStartedLoading => "Page.frameStartedLoading",
            EventKind::FrameAttached => "Page.frameAttached",
            EventKind::RequestWillBeSent => "Network.requestWillBeSent",
            EventKind::RequestServedFromCache => "Network.requestServedFromCache",
            EventKind::DataReceived => "Network.dataReceived",
            EventKind::ResponseReceived => "Network.responseReceived",
            EventKind::ResourceChangedPriority => "Network.resourceChangedPriority",
            EventKind::LoadingFinished => "Network.loadingFinished",
            EventKind::LoadingFailed => "Network.loadingFailed",
        }
    }

    /// Whether the event belongs to the Network domain and carries a `requestId`
    pub fn is_network(&self) -> bool {
        self.method().starts_with("Network.")
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|k| k.method() == s)
            .ok_or_else(|| format!("Unknown event method: {}", s))
    }
}

/// One notification received from the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEvent {
    #[serde(rename = "method")]
    pub kind: EventKind,

    /// Event parameters exactly as delivered
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ProtocolEvent {
    pub fn new(kind: EventKind, params: serde_json::Value) -> Self {
        Self { kind, params }
    }

    /// `params.requestId` for network events
    pub fn request_id(&self) -> Option<&str> {
        self.params.get("requestId").and_then(|v| v.as_str())
    }

    /// `params.timestamp` (monotonic seconds)
    pub fn timestamp(&self) -> Option<f64> {
        self.params.get("timestamp").and_then(|v| v.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.method().parse::<EventKind>().unwrap(), kind);
        }
        assert!("Network.webSocketCreated".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_network_classification() {
        assert!(EventKind::LoadingFinished.is_network());
        assert!(!EventKind::FrameAttached.is_network());
    }

    #[test]
    fn test_event_wire_format() {
        let event = ProtocolEvent::new(
            EventKind::DataReceived,
            json!({"requestId": "7.1", "timestamp": 12.5, "dataLength": 10}),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["method"], "Network.dataReceived");
        assert_eq!(value["params"]["dataLength"], 10);

        let parsed: ProtocolEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.request_id(), Some("7.1"));
        assert_eq!(parsed.timestamp(), Some(12.5));
    }
}
