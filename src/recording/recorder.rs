// src/recording/recorder.rs
//! Protocol event recorder
//!
//! Attaching a recorder enables the Page and Network domains on a session,
//! subscribes to every [`EventKind`] and starts a collector task that appends
//! notifications to the event log in the order they arrive. The collector is
//! the only writer; the log is handed over through its `JoinHandle` once the
//! session is detached, so no lock is held around it.

use crate::cdp::events::{EventKind, ProtocolEvent};
use crate::cdp::session::{CdpSession, Subscription};
use crate::observability::EVENTS_RECORDED;
use crate::recording::exporter::{HarExport, HarExporter};
use crate::utils::errors::{CaptureError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Ordered, append-only sequence of captured notifications
pub type EventLog = Vec<ProtocolEvent>;

/// Attaches capture sessions to protocol sessions
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    exporter: HarExporter,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific exporter for [`CaptureSession::export`]
    pub fn with_exporter(exporter: HarExporter) -> Self {
        Self { exporter }
    }

    /// Enable domains, subscribe to all event kinds and start recording
    pub async fn attach<S>(&self, session: &S) -> Result<CaptureSession>
    where
        S: CdpSession + ?Sized,
    {
        session.enable_domains().await.map_err(setup_error)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = session
            .subscribe(&EventKind::ALL, tx)
            .await
            .map_err(setup_error)?;

        let recorded = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = oneshot::channel();
        let collector = tokio::spawn(collect(rx, stop_rx, Arc::clone(&recorded)));

        info!("Event recorder attached ({} event kinds)", EventKind::ALL.len());

        Ok(CaptureSession {
            active: Some(ActiveCapture {
                subscription,
                stop_tx,
                collector,
            }),
            recorded,
            exporter: self.exporter.clone(),
        })
    }
}

fn setup_error(e: CaptureError) -> CaptureError {
    match e {
        CaptureError::SessionSetupFailed(_) => e,
        other => CaptureError::SessionSetupFailed(other.to_string()),
    }
}

/// Drain notifications into the log until stopped, then take whatever is
/// already buffered and return the frozen log
async fn collect(
    mut rx: mpsc::UnboundedReceiver<ProtocolEvent>,
    mut stop_rx: oneshot::Receiver<()>,
    recorded: Arc<AtomicU64>,
) -> EventLog {
    let mut log = EventLog::new();

    let append = |log: &mut EventLog, event: ProtocolEvent| {
        metrics::counter!(EVENTS_RECORDED, "kind" => event.kind.method()).increment(1);
        recorded.fetch_add(1, Ordering::Relaxed);
        log.push(event);
    };

    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => break,

            event = rx.recv() => match event {
                Some(event) => append(&mut log, event),
                None => break,
            }
        }
    }

    rx.close();
    while let Ok(event) = rx.try_recv() {
        append(&mut log, event);
    }

    debug!("Collector stopped with {} events", log.len());
    log
}

struct ActiveCapture {
    subscription: Subscription,
    stop_tx: oneshot::Sender<()>,
    collector: JoinHandle<EventLog>,
}

/// One recording window; produces exactly one log
pub struct CaptureSession {
    active: Option<ActiveCapture>,
    recorded: Arc<AtomicU64>,
    exporter: HarExporter,
}

impl CaptureSession {
    /// Events appended so far
    pub fn events_recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    pub fn is_attached(&self) -> bool {
        self.active.is_some()
    }

    /// Stop receiving notifications and return the frozen log
    pub async fn detach(&mut self) -> Result<EventLog> {
        let active = self.active.take().ok_or(CaptureError::AlreadyDetached)?;

        // Flush notifications the session already holds into the channel
        active.subscription.close().await;
        // The collector may already have exited if every sender was dropped
        let _ = active.stop_tx.send(());

        let log = active.collector.await.map_err(|e| {
            CaptureError::ExportFailed(format!("Event collector terminated abnormally: {}", e))
        })?;

        info!("Event recorder detached after {} events", log.len());
        Ok(log)
    }

    /// Detach and convert the captured log to HAR; valid once per session
    pub async fn export(&mut self) -> Result<HarExport> {
        let (_, export) = self.finish().await?;
        Ok(export)
    }

    /// Detach and return the frozen log together with its HAR conversion
    pub async fn finish(&mut self) -> Result<(EventLog, HarExport)> {
        let log = self.detach().await?;
        let export = self.exporter.convert(&log);

        if !export.dropped.is_empty() {
            warn!(
                "{} request groups could not be converted to HAR entries",
                export.dropped.len()
            );
        }

        Ok((log, export))
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.collector.abort();
        }
    }
}
