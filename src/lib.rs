// src/lib.rs
//! HAR capture library
//!
//! Records the page and network notifications of a Chromium page during a
//! bounded capture window and turns them into a HAR 1.2 document, alongside a
//! performance trace and a Lighthouse report of the same page.
//!
//! # Architecture
//!
//! - **cdp**: notification types and the protocol session seam
//! - **recording**: event recorder, HAR model and exporter, run storage
//! - **runtime**: browser control, capture window, audit and run orchestration
//! - **observability**: tracing subscriber and metric names
//! - **utils**: configuration and error types

pub mod cdp;
pub mod observability;
pub mod recording;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub use cdp::{CdpSession, ChannelSession, EventKind, ProtocolEvent};
pub use recording::{CaptureSession, EventRecorder, HarDocument, HarExport, HarExporter};
pub use runtime::{run, RunArtifacts, RunOutcome};
pub use utils::config::CaptureConfig;
pub use utils::errors::{CaptureError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
