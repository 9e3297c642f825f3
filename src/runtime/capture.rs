// src/runtime/capture.rs
//! Capture window control
//!
//! The window opens immediately before navigating to the target and closes
//! once both of these have happened:
//!
//! 1. Navigation finished and the network went idle
//! 2. The configured [`CompletionCondition`] resolved
//!
//! Both branches are joined without cancelling each other. The whole window
//! is bounded by a timeout, so a condition that never resolves is reported
//! as [`CaptureError::ConditionTimeout`] instead of hanging the run.

use crate::cdp::events::{EventKind, ProtocolEvent};
use crate::cdp::session::CdpSession;
use crate::utils::config::CompletionCondition;
use crate::utils::errors::{CaptureError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

/// Interval between selector checks
pub const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Notifications that move the in-flight request count
pub const IDLE_KINDS: [EventKind; 3] = [
    EventKind::RequestWillBeSent,
    EventKind::LoadingFinished,
    EventKind::LoadingFailed,
];

/// Navigation and DOM access on a page
#[async_trait]
pub trait PageControl: Send + Sync {
    /// Navigate and wait for the load event
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Issue a navigation without waiting for any lifecycle event
    async fn start_navigation(&self, url: &str) -> Result<()>;

    /// Whether an element matching `selector` currently exists
    async fn selector_exists(&self, selector: &str) -> Result<bool>;
}

/// When the network counts as idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSettings {
    /// Requests allowed to remain in flight
    pub max_inflight: usize,

    /// How long the count must stay at or below `max_inflight`
    pub quiet_period: Duration,
}

impl IdleSettings {
    /// No requests in flight for 500ms
    pub const NETWORK_IDLE_0: IdleSettings = IdleSettings {
        max_inflight: 0,
        quiet_period: Duration::from_millis(500),
    };

    /// At most two requests in flight for 500ms
    pub const NETWORK_IDLE_2: IdleSettings = IdleSettings {
        max_inflight: 2,
        quiet_period: Duration::from_millis(500),
    };
}

/// Tracks requests that have started but not finished.
///
/// Notifications of different kinds may be delivered out of order, so a
/// request whose completion was seen first is never counted as in flight.
#[derive(Debug, Default)]
pub struct InflightTracker {
    inflight: HashSet<String>,
    finished: HashSet<String>,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &ProtocolEvent) {
        let Some(id) = event.request_id() else {
            return;
        };
        match event.kind {
            EventKind::RequestWillBeSent => {
                if !self.finished.contains(id) {
                    self.inflight.insert(id.to_string());
                }
            }
            EventKind::LoadingFinished | EventKind::LoadingFailed => {
                self.inflight.remove(id);
                self.finished.insert(id.to_string());
            }
            _ => {}
        }
    }

    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }
}

/// Wait until the in-flight count stays within bounds for the quiet period.
/// Returns early if the event stream closes.
pub async fn wait_for_network_idle(
    rx: &mut UnboundedReceiver<ProtocolEvent>,
    tracker: &mut InflightTracker,
    settings: IdleSettings,
) {
    loop {
        if tracker.inflight() <= settings.max_inflight {
            tokio::select! {
                _ = tokio::time::sleep(settings.quiet_period) => {
                    debug!("Network idle ({} requests in flight)", tracker.inflight());
                    return;
                }
                event = rx.recv() => match event {
                    Some(event) => tracker.observe(&event),
                    None => return,
                }
            }
        } else {
            match rx.recv().await {
                Some(event) => tracker.observe(&event),
                None => return,
            }
        }
    }
}

/// Navigate and wait for network idle
pub async fn navigate_until_idle<P>(page: &P, url: &str, settings: IdleSettings) -> Result<()>
where
    P: PageControl + CdpSession + ?Sized,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = page.subscribe(&IDLE_KINDS, tx).await?;

    page.navigate(url).await?;
    wait_for_network_idle(&mut rx, &mut InflightTracker::new(), settings).await;
    Ok(())
}

/// Navigate and wait for the main frame's DOMContentLoaded
pub async fn navigate_until_dom_content<P>(page: &P, url: &str) -> Result<()>
where
    P: PageControl + CdpSession + ?Sized,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = page
        .subscribe(&[EventKind::DomContentEventFired], tx)
        .await?;

    page.start_navigation(url).await?;
    match rx.recv().await {
        Some(_) => {
            debug!("DOMContentLoaded fired for {}", url);
            Ok(())
        }
        None => Err(CaptureError::BrowserFailed(
            "Event stream closed before DOMContentLoaded".to_string(),
        )),
    }
}

/// Bound `future` by `timeout`, reporting expiry as a condition timeout
pub async fn with_deadline<T>(timeout: Duration, future: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(CaptureError::ConditionTimeout(timeout)),
    }
}

/// The bounded recording window around a navigation
#[derive(Debug, Clone)]
pub struct CaptureWindow {
    condition: CompletionCondition,
    timeout: Duration,
    idle: IdleSettings,
}

impl CaptureWindow {
    pub fn new(condition: CompletionCondition, timeout: Duration) -> Self {
        Self {
            condition,
            timeout,
            idle: IdleSettings::NETWORK_IDLE_2,
        }
    }

    pub fn with_idle(mut self, idle: IdleSettings) -> Self {
        self.idle = idle;
        self
    }

    /// Navigate to `url` and return once the window has closed
    pub async fn run<P>(&self, page: &P, url: &str) -> Result<()>
    where
        P: PageControl + CdpSession + ?Sized,
    {
        // Subscribe before navigating so no early notification is missed
        let (idle_tx, mut idle_rx) = mpsc::unbounded_channel();
        let _idle_subscription = page.subscribe(&IDLE_KINDS, idle_tx).await?;

        let (condition_tx, condition_rx) = mpsc::unbounded_channel();
        let _condition_subscription = match &self.condition {
            CompletionCondition::ResponseUrlContains(_) => Some(
                page.subscribe(&[EventKind::ResponseReceived], condition_tx)
                    .await?,
            ),
            _ => None,
        };

        info!("Capture window open: navigating to {}", url);

        let navigation = async {
            page.navigate(url).await?;
            wait_for_network_idle(&mut idle_rx, &mut InflightTracker::new(), self.idle).await;
            Ok::<_, CaptureError>(())
        };
        let condition = self.wait_for_condition(page, condition_rx);

        with_deadline(self.timeout, async {
            let (navigated, resolved) = tokio::join!(navigation, condition);
            navigated?;
            resolved
        })
        .await?;

        info!("Capture window closed");
        Ok(())
    }

    async fn wait_for_condition<P>(
        &self,
        page: &P,
        mut responses: UnboundedReceiver<ProtocolEvent>,
    ) -> Result<()>
    where
        P: PageControl + ?Sized,
    {
        match &self.condition {
            CompletionCondition::NetworkIdle => Ok(()),

            CompletionCondition::ResponseUrlContains(pattern) => {
                while let Some(event) = responses.recv().await {
                    let url = event
                        .params
                        .get("response")
                        .and_then(|r| r.get("url"))
                        .and_then(|u| u.as_str())
                        .unwrap_or_default();
                    if url.contains(pattern.as_str()) {
                        debug!("Completion response observed: {}", url);
                        return Ok(());
                    }
                }
                Err(CaptureError::BrowserFailed(
                    "Event stream closed before the completion response arrived".to_string(),
                ))
            }

            CompletionCondition::SelectorAppears(selector) => loop {
                if page.selector_exists(selector).await? {
                    debug!("Completion selector present: {}", selector);
                    return Ok(());
                }
                tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
            },
        }
    }
}
