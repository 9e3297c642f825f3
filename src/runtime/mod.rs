// src/runtime/mod.rs
//! Browser-facing run execution
//!
//! - **Browser**: Chromium launch, pages and tracing over the DevTools protocol
//! - **Capture**: capture window, network idle detection and completion conditions
//! - **Gate**: manual pause before profiling
//! - **Audit**: Lighthouse run against the live browser
//! - **Run**: end-to-end orchestration of a single capture
//! - **Convert**: offline HAR conversion of a saved event log
//!
//! # Architecture
//!
//! ```text
//!  prepare page ──▶ gate ──▶ about:blank (idle 0)
//!                                │
//!        ┌───────────────────────┴──────────────────────┐
//!        │ recorder attached, tracing started            │
//!        │   navigate + idle 2  ║  completion condition  │
//!        │          (joined, bounded by timeout)         │
//!        └───────────────────────┬──────────────────────┘
//!                                ▼
//!      trace.json ──▶ requests.har ──▶ about:blank ──▶ lighthouse.json
//! ```

pub mod audit;
pub mod browser;
pub mod capture;
pub mod convert;
pub mod gate;
pub mod run;

// Re-export commonly used types
pub use audit::LighthouseAuditor;
pub use browser::{BrowserPage, ChromeBrowser, TraceRecording};
pub use capture::{CaptureWindow, IdleSettings, InflightTracker, PageControl};
pub use convert::{convert_file, parse_event_log};
pub use run::{run, RunArtifacts, RunOutcome};
