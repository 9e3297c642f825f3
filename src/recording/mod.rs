// src/recording/mod.rs
//! Event capture, HAR conversion and artifact storage
//!
//! - **Recorder**: subscribes to page/network events and buffers them in order
//! - **Exporter**: folds the frozen event log into a HAR 1.2 document
//! - **HAR**: the HAR 1.2 document model
//! - **Storage**: per-run output directory and artifact files
//!
//! # Architecture
//!
//! ```text
//! CdpSession ──notify──▶ mpsc channel ──▶ Collector task (single writer)
//!                                              │
//!                              detach ─────────┤ frozen EventLog
//!                                              ▼
//!                                         HarExporter
//!                                              │
//!                                              ▼
//!                                     RunDirectory/requests.har
//! ```

pub mod exporter;
pub mod har;
pub mod recorder;
pub mod storage;

// Re-export commonly used types
pub use exporter::{DropReason, DroppedGroup, HarExport, HarExporter};
pub use har::{HarDocument, HarEntry, HarPage};
pub use recorder::{CaptureSession, EventLog, EventRecorder};
pub use storage::RunDirectory;
