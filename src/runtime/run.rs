// src/runtime/run.rs
//! End-to-end capture run
//!
//! One run profiles a single target: prepare the page, wait for the
//! operator, record HAR and trace inside the capture window, then audit the
//! page with Lighthouse against the same browser. Artifacts land in a fresh
//! [`RunDirectory`].

use crate::cdp::session::CdpSession;
use crate::recording::recorder::EventRecorder;
use crate::recording::storage::RunDirectory;
use crate::runtime::audit::LighthouseAuditor;
use crate::runtime::browser::{BrowserPage, ChromeBrowser};
use crate::runtime::capture::{
    navigate_until_dom_content, navigate_until_idle, with_deadline, CaptureWindow, IdleSettings,
    PageControl,
};
use crate::runtime::gate;
use crate::utils::config::CaptureConfig;
use crate::utils::errors::{CaptureError, Result};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{error, info, warn};
use url::Url;

const BLANK_PAGE: &str = "about:blank";

/// Files written by a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct RunArtifacts {
    pub directory: PathBuf,
    pub trace: PathBuf,
    pub har: PathBuf,
    /// Raw notification log the HAR was built from
    pub events: PathBuf,
    /// Absent when the audit was skipped
    pub lighthouse: Option<PathBuf>,
    pub entries: usize,
    pub dropped: usize,
}

/// Result of a run
#[derive(Debug)]
pub enum RunOutcome {
    Success(RunArtifacts),
    Failure(CaptureError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    /// Process exit code: 0 on success, otherwise the error's code
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success(_) => 0,
            RunOutcome::Failure(e) => e.exit_code(),
        }
    }
}

impl From<Result<RunArtifacts>> for RunOutcome {
    fn from(result: Result<RunArtifacts>) -> Self {
        match result {
            Ok(artifacts) => RunOutcome::Success(artifacts),
            Err(e) => RunOutcome::Failure(e),
        }
    }
}

/// Execute one capture run
pub async fn run(config: &CaptureConfig) -> RunOutcome {
    let outcome = RunOutcome::from(execute(config).await);
    match &outcome {
        RunOutcome::Success(artifacts) => info!(
            "Run complete: {} entries ({} dropped) in {:?}",
            artifacts.entries, artifacts.dropped, artifacts.directory
        ),
        RunOutcome::Failure(e) => error!("Run failed: {}", e),
    }
    outcome
}

async fn execute(config: &CaptureConfig) -> Result<RunArtifacts> {
    let target = config.target()?;

    // Resolve the auditor up front so a missing CLI fails before any capture
    let auditor = if config.skip_audit {
        None
    } else {
        Some(LighthouseAuditor::locate(config.lighthouse_path.as_deref())?)
    };

    let run_dir = RunDirectory::create(&config.output_root, &target, Utc::now()).await?;
    let browser = ChromeBrowser::launch(config).await?;

    let result = profile(&browser, config, &target, &run_dir, auditor.as_ref()).await;

    if let Err(e) = browser.close().await {
        warn!("Failed to close browser: {}", e);
    }
    result
}

async fn profile(
    browser: &ChromeBrowser,
    config: &CaptureConfig,
    target: &Url,
    run_dir: &RunDirectory,
    auditor: Option<&LighthouseAuditor>,
) -> Result<RunArtifacts> {
    let page = browser.new_page().await?;
    page.enable_domains().await?;
    page.disable_cache().await?;

    // Let the operator see the page as soon as its DOM is ready
    with_deadline(
        config.capture_timeout(),
        navigate_until_dom_content(&page, target.as_str()),
    )
    .await?;
    if !config.skip_gate {
        gate::wait_for_enter(gate::DEFAULT_PROMPT).await?;
    }

    reset_page(&page, config).await?;
    page.bring_to_front().await?;

    let mut capture = EventRecorder::new().attach(&page).await?;
    let trace = page.start_trace().await?;

    CaptureWindow::new(config.completion_condition.clone(), config.capture_timeout())
        .run(&page, target.as_str())
        .await?;

    let trace_events = trace.stop().await?;
    let trace_path = run_dir.write_trace(trace_events).await?;

    let (log, export) = capture.finish().await?;
    let events_path = run_dir.write_events(&log).await?;
    let har_path = run_dir.write_har(&export.document).await?;

    page.navigate(BLANK_PAGE).await?;

    let lighthouse_path = match auditor {
        Some(auditor) => {
            let report = auditor.audit(target.as_str(), browser.debug_port()?).await?;
            Some(run_dir.write_lighthouse(&report).await?)
        }
        None => {
            info!("Skipping Lighthouse audit");
            None
        }
    };

    Ok(RunArtifacts {
        directory: run_dir.path().to_path_buf(),
        trace: trace_path,
        har: har_path,
        events: events_path,
        lighthouse: lighthouse_path,
        entries: export.document.log.entries.len(),
        dropped: export.dropped.len(),
    })
}

/// Park the page on a blank document with a quiet network
async fn reset_page(page: &BrowserPage, config: &CaptureConfig) -> Result<()> {
    with_deadline(
        config.capture_timeout(),
        navigate_until_idle(page, BLANK_PAGE, IdleSettings::NETWORK_IDLE_0),
    )
    .await
}
