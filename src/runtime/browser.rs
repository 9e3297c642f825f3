// src/runtime/browser.rs
//! Chromium driven over the DevTools protocol
//!
//! [`ChromeBrowser`] owns the browser process and its connection handler.
//! [`BrowserPage`] is the live implementation of both [`CdpSession`] and
//! [`PageControl`], plus the page-level operations a run needs: cache
//! control, bring-to-front and performance tracing.

use crate::cdp::events::{EventKind, ProtocolEvent};
use crate::cdp::session::{CdpSession, Subscription};
use crate::runtime::audit::debug_port;
use crate::runtime::capture::PageControl;
use crate::utils::config::CaptureConfig;
use crate::utils::errors::{CaptureError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network;
use chromiumoxide::cdp::browser_protocol::page as cdp_page;
use chromiumoxide::cdp::browser_protocol::tracing as cdp_tracing;
use chromiumoxide::Page;
use futures::stream::{self, BoxStream, Fuse};
use futures::{FutureExt, Stream, StreamExt};
use serde_json::Value;
use std::path::PathBuf;
use std::task::Poll;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Chromium's usual automation flags, minus `--enable-automation` so the
/// page renders without the automation infobar
const LAUNCH_ARGS: &[&str] = &[
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-client-side-phishing-detection",
    "--disable-component-extensions-with-background-pages",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-features=TranslateUI",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-renderer-backgrounding",
    "--disable-sync",
    "--force-color-profile=srgb",
    "--metrics-recording-only",
    "--no-first-run",
    "--password-store=basic",
    "--use-mock-keychain",
];

/// Trace categories, including filmstrip screenshots
pub const TRACE_CATEGORIES: &[&str] = &[
    "devtools.timeline",
    "v8.execute",
    "disabled-by-default-devtools.timeline",
    "disabled-by-default-devtools.timeline.frame",
    "toplevel",
    "blink.console",
    "blink.user_timing",
    "latencyInfo",
    "disabled-by-default-devtools.timeline.stack",
    "disabled-by-default-v8.cpu_profiler",
    "disabled-by-default-devtools.screenshot",
];

/// Candidate binaries tried on PATH when no executable is configured
const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// A launched browser process
pub struct ChromeBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromeBrowser {
    /// Launch Chromium with the default viewport disabled
    pub async fn launch(config: &CaptureConfig) -> Result<Self> {
        let executable = resolve_executable(config.executable_path.clone())?;
        info!("Launching {:?}", executable);

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .viewport(None)
            .disable_default_args()
            .args(LAUNCH_ARGS.iter().copied());
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(CaptureError::BrowserFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| CaptureError::BrowserFailed(format!("Launch failed: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser connection: {}", e);
                }
            }
        });

        Ok(Self { browser, handler })
    }

    /// Open a blank page with the Page and Network domains ready
    pub async fn new_page(&self) -> Result<BrowserPage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| CaptureError::BrowserFailed(format!("Failed to open page: {}", e)))?;
        Ok(BrowserPage { page })
    }

    /// Remote debugging port, for tools that attach to this browser
    pub fn debug_port(&self) -> Result<u16> {
        debug_port(self.browser.websocket_address())
    }

    pub async fn close(mut self) -> Result<()> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!("Waiting for browser exit: {}", e);
        }
        self.handler.abort();
        closed?;
        info!("Browser closed");
        Ok(())
    }
}

fn resolve_executable(configured: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = configured {
        return Ok(path);
    }
    CHROME_COMMANDS
        .iter()
        .find_map(|cmd| which::which(cmd).ok())
        .ok_or_else(|| {
            CaptureError::BrowserFailed(format!(
                "No Chromium executable configured or found in PATH (tried {})",
                CHROME_COMMANDS.join(", ")
            ))
        })
}

/// Forward every notification of type `$event` as a [`ProtocolEvent`]
macro_rules! listen {
    ($page:expr, $kind:expr, $event:ty) => {{
        let kind = $kind;
        $page
            .event_listener::<$event>()
            .await
            .map_err(|e| {
                CaptureError::SessionSetupFailed(format!("Failed to listen for {}: {}", kind, e))
            })?
            .map(move |event| {
                let params = serde_json::to_value(&*event).unwrap_or(Value::Null);
                ProtocolEvent::new(kind, params)
            })
            .boxed()
    }};
}

/// Position of a notification kind in a request or page lifecycle
fn lifecycle_rank(kind: EventKind) -> u8 {
    match kind {
        EventKind::FrameAttached => 0,
        EventKind::FrameStartedLoading => 1,
        EventKind::RequestWillBeSent => 2,
        EventKind::ResponseReceived | EventKind::RequestServedFromCache => 3,
        EventKind::ResourceChangedPriority => 4,
        EventKind::DataReceived => 5,
        EventKind::LoadingFinished | EventKind::LoadingFailed => 6,
        EventKind::DomContentEventFired => 7,
        EventKind::LoadEventFired => 8,
    }
}

/// Merge per-kind listener streams. Each poll takes from the earliest
/// lifecycle kind with a notification ready, so a request's start is
/// delivered ahead of its completion when both are already buffered.
fn merge_by_lifecycle(
    mut streams: Vec<(EventKind, BoxStream<'static, ProtocolEvent>)>,
) -> impl Stream<Item = ProtocolEvent> + Send + Unpin {
    streams.sort_by_key(|(kind, _)| lifecycle_rank(*kind));
    let mut streams: Vec<Fuse<BoxStream<'static, ProtocolEvent>>> =
        streams.into_iter().map(|(_, s)| s.fuse()).collect();

    stream::poll_fn(move |cx| {
        let mut open = false;
        for events in streams.iter_mut() {
            match events.poll_next_unpin(cx) {
                Poll::Ready(Some(event)) => return Poll::Ready(Some(event)),
                Poll::Ready(None) => {}
                Poll::Pending => open = true,
            }
        }
        if open {
            Poll::Pending
        } else {
            Poll::Ready(None)
        }
    })
}

/// A browser tab
pub struct BrowserPage {
    page: Page,
}

impl BrowserPage {
    pub async fn disable_cache(&self) -> Result<()> {
        self.page
            .execute(network::SetCacheDisabledParams::new(true))
            .await
            .map_err(|e| CaptureError::BrowserFailed(format!("Failed to disable cache: {}", e)))?;
        Ok(())
    }

    pub async fn bring_to_front(&self) -> Result<()> {
        self.page
            .execute(cdp_page::BringToFrontParams::default())
            .await?;
        Ok(())
    }

    /// Start a trace; events are reported over the protocol and buffered
    pub async fn start_trace(&self) -> Result<TraceRecording> {
        let mut data = self
            .page
            .event_listener::<cdp_tracing::EventDataCollected>()
            .await
            .map_err(|e| CaptureError::TracingFailed(e.to_string()))?;
        let complete = self
            .page
            .event_listener::<cdp_tracing::EventTracingComplete>()
            .await
            .map_err(|e| CaptureError::TracingFailed(e.to_string()))?;

        let params = cdp_tracing::StartParams {
            transfer_mode: Some(cdp_tracing::StartTransferMode::ReportEvents),
            trace_config: Some(cdp_tracing::TraceConfig {
                included_categories: Some(
                    TRACE_CATEGORIES.iter().map(|c| c.to_string()).collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.page
            .execute(params)
            .await
            .map_err(|e| CaptureError::TracingFailed(format!("Tracing.start: {}", e)))?;

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let collector = tokio::spawn(async move {
            let mut events: Vec<Value> = Vec::new();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    batch = data.next() => match batch {
                        Some(batch) => events.extend(batch.value.iter().cloned()),
                        None => return events,
                    },
                }
            }
            while let Some(Some(batch)) = data.next().now_or_never() {
                events.extend(batch.value.iter().cloned());
            }
            events
        });

        info!("Tracing started");
        Ok(TraceRecording {
            page: self.page.clone(),
            complete: complete.map(|_| ()).boxed(),
            stop_tx,
            collector,
        })
    }
}

/// A running trace
pub struct TraceRecording {
    page: Page,
    complete: BoxStream<'static, ()>,
    stop_tx: oneshot::Sender<()>,
    collector: JoinHandle<Vec<Value>>,
}

impl TraceRecording {
    /// End tracing and return every collected trace event
    pub async fn stop(mut self) -> Result<Vec<Value>> {
        self.page
            .execute(cdp_tracing::EndParams::default())
            .await
            .map_err(|e| CaptureError::TracingFailed(format!("Tracing.end: {}", e)))?;

        if self.complete.next().await.is_none() {
            warn!("Page closed before tracing completed");
        }

        let _ = self.stop_tx.send(());
        let events = self
            .collector
            .await
            .map_err(|e| CaptureError::TracingFailed(format!("Trace collector failed: {}", e)))?;

        info!("Tracing stopped: {} events", events.len());
        Ok(events)
    }
}

#[async_trait]
impl CdpSession for BrowserPage {
    async fn enable_domains(&self) -> Result<()> {
        self.page
            .execute(cdp_page::EnableParams::default())
            .await
            .map_err(|e| CaptureError::SessionSetupFailed(format!("Page.enable: {}", e)))?;
        self.page
            .execute(network::EnableParams::default())
            .await
            .map_err(|e| CaptureError::SessionSetupFailed(format!("Network.enable: {}", e)))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        kinds: &[EventKind],
        sink: UnboundedSender<ProtocolEvent>,
    ) -> Result<Subscription> {
        let mut streams = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let events = match kind {
                EventKind::LoadEventFired => {
                    listen!(self.page, *kind, cdp_page::EventLoadEventFired)
                }
                EventKind::DomContentEventFired => {
                    listen!(self.page, *kind, cdp_page::EventDomContentEventFired)
                }
                EventKind::FrameStartedLoading => {
                    listen!(self.page, *kind, cdp_page::EventFrameStartedLoading)
                }
                EventKind::FrameAttached => {
                    listen!(self.page, *kind, cdp_page::EventFrameAttached)
                }
                EventKind::RequestWillBeSent => {
                    listen!(self.page, *kind, network::EventRequestWillBeSent)
                }
                EventKind::RequestServedFromCache => {
                    listen!(self.page, *kind, network::EventRequestServedFromCache)
                }
                EventKind::DataReceived => {
                    listen!(self.page, *kind, network::EventDataReceived)
                }
                EventKind::ResponseReceived => {
                    listen!(self.page, *kind, network::EventResponseReceived)
                }
                EventKind::ResourceChangedPriority => {
                    listen!(self.page, *kind, network::EventResourceChangedPriority)
                }
                EventKind::LoadingFinished => {
                    listen!(self.page, *kind, network::EventLoadingFinished)
                }
                EventKind::LoadingFailed => {
                    listen!(self.page, *kind, network::EventLoadingFailed)
                }
            };
            streams.push((*kind, events));
        }

        debug!("Subscribed to {} notification kinds", kinds.len());
        Ok(Subscription::forward(merge_by_lifecycle(streams), sink))
    }
}

#[async_trait]
impl PageControl for BrowserPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| CaptureError::NavigationFailed(format!("{}: {}", url, e)))?;
        Ok(())
    }

    async fn start_navigation(&self, url: &str) -> Result<()> {
        let navigated = self
            .page
            .execute(cdp_page::NavigateParams::new(url))
            .await
            .map_err(|e| CaptureError::NavigationFailed(format!("{}: {}", url, e)))?;
        match &navigated.result.error_text {
            Some(error) => Err(CaptureError::NavigationFailed(format!("{}: {}", url, error))),
            None => Ok(()),
        }
    }

    async fn selector_exists(&self, selector: &str) -> Result<bool> {
        Ok(self.page.find_element(selector).await.is_ok())
    }
}
