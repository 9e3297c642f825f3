// src/cdp/session.rs
//! Protocol session abstraction
//!
//! A [`CdpSession`] enables the Page and Network domains on one target and
//! forwards matching notifications into an mpsc channel. The browser-backed
//! implementation lives in `runtime::browser`; [`ChannelSession`] is an
//! in-memory session driven by the caller, used for replays and tests.

use crate::cdp::events::{EventKind, ProtocolEvent};
use crate::utils::errors::{CaptureError, Result};
use async_trait::async_trait;
use futures::{FutureExt, Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Source of protocol notifications for a single page
#[async_trait]
pub trait CdpSession: Send + Sync {
    /// Enable the Page and Network domains
    async fn enable_domains(&self) -> Result<()>;

    /// Forward every notification of the given kinds into `sink`, in the
    /// order the session receives them, until the subscription is detached
    async fn subscribe(
        &self,
        kinds: &[EventKind],
        sink: UnboundedSender<ProtocolEvent>,
    ) -> Result<Subscription>;
}

/// Active forwarding of notifications; detached on drop
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
    forwarder: Option<Forwarder>,
}

struct Forwarder {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Subscription stopped by running `cancel`
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
            forwarder: None,
        }
    }

    /// Forward `events` into `sink` from a spawned task.
    ///
    /// [`close`](Self::close) hands over every notification the stream
    /// already holds before the task exits. Dropping or
    /// [`detach`](Self::detach)ing aborts the task immediately.
    pub fn forward<S>(mut events: S, sink: UnboundedSender<ProtocolEvent>) -> Self
    where
        S: Stream<Item = ProtocolEvent> + Send + Unpin + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    event = events.next() => match event {
                        Some(event) => {
                            if sink.send(event).is_err() {
                                return;
                            }
                        }
                        None => return,
                    },
                }
            }

            let mut drained = 0usize;
            while let Some(Some(event)) = events.next().now_or_never() {
                if sink.send(event).is_err() {
                    break;
                }
                drained += 1;
            }
            debug!("Forwarder drained {} buffered notifications", drained);
        });

        let abort = handle.abort_handle();
        Self {
            cancel: Some(Box::new(move || abort.abort())),
            forwarder: Some(Forwarder { stop_tx, handle }),
        }
    }

    /// Stop forwarding notifications
    pub fn detach(mut self) {
        self.cancel_now();
    }

    /// Stop forwarding once every notification already received has been
    /// delivered to the sink
    pub async fn close(mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            self.cancel = None;
            // The task may already have exited if its stream ended
            let _ = forwarder.stop_tx.send(());
            if let Err(e) = forwarder.handle.await {
                warn!("Notification forwarder failed: {}", e);
            }
            return;
        }
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct Sink {
    id: u64,
    kinds: Vec<EventKind>,
    tx: UnboundedSender<ProtocolEvent>,
}

/// In-memory session fed through [`ChannelSession::emit`]
#[derive(Clone, Default)]
pub struct ChannelSession {
    sinks: Arc<Mutex<Vec<Sink>>>,
    next_id: Arc<AtomicU64>,
    enabled: Arc<AtomicBool>,
    fail_enable: Arc<AtomicBool>,
    fail_subscribe: Arc<AtomicBool>,
}

impl ChannelSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `enable_domains` fail
    pub fn fail_enable(self) -> Self {
        self.fail_enable.store(true, Ordering::SeqCst);
        self
    }

    /// Make `subscribe` fail
    pub fn fail_subscribe(self) -> Self {
        self.fail_subscribe.store(true, Ordering::SeqCst);
        self
    }

    /// Deliver a notification to every subscription interested in its kind
    pub fn emit(&self, event: ProtocolEvent) {
        let sinks = self.sinks.lock();
        for sink in sinks.iter().filter(|s| s.kinds.contains(&event.kind)) {
            let _ = sink.tx.send(event.clone());
        }
    }

    /// Deliver a batch of notifications in order
    pub fn emit_all(&self, events: impl IntoIterator<Item = ProtocolEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Number of subscriptions still attached
    pub fn active_subscriptions(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn domains_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CdpSession for ChannelSession {
    async fn enable_domains(&self) -> Result<()> {
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(CaptureError::SessionSetupFailed(
                "Network.enable rejected".to_string(),
            ));
        }
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(
        &self,
        kinds: &[EventKind],
        sink: UnboundedSender<ProtocolEvent>,
    ) -> Result<Subscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(CaptureError::SessionSetupFailed(
                "event subscription rejected".to_string(),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sinks.lock().push(Sink {
            id,
            kinds: kinds.to_vec(),
            tx: sink,
        });
        debug!("Channel subscription {} attached for {} kinds", id, kinds.len());

        let sinks = Arc::clone(&self.sinks);
        Ok(Subscription::new(move || {
            sinks.lock().retain(|s| s.id != id);
        }))
    }
}
