// src/runtime/convert.rs
//! Offline conversion of a saved event log
//!
//! The input is a JSON array of `{"method": ..., "params": ...}` objects, the
//! same shape the recorder captures. Notifications with methods outside the
//! recorded set are skipped.

use crate::cdp::events::{EventKind, ProtocolEvent};
use crate::recording::exporter::{HarExport, HarExporter};
use crate::recording::recorder::EventLog;
use crate::utils::errors::{CaptureError, Result};
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Parse a saved event log, keeping only recorded notification kinds
pub fn parse_event_log(data: &[u8]) -> Result<EventLog> {
    let raw: Vec<Value> = serde_json::from_slice(data)
        .map_err(|e| CaptureError::ExportFailed(format!("Event log is not a JSON array: {}", e)))?;

    let mut log = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        let method = value.get("method").and_then(|m| m.as_str()).unwrap_or_default();
        if method.parse::<EventKind>().is_err() {
            debug!("Skipping event {} with method {:?}", index, method);
            continue;
        }
        let event: ProtocolEvent = serde_json::from_value(value)?;
        log.push(event);
    }
    Ok(log)
}

/// Convert the event log at `input` and write the HAR document to `output`
pub async fn convert_file(input: &Path, output: &Path) -> Result<HarExport> {
    let data = fs::read(input).await.map_err(|e| {
        CaptureError::StorageFailed(format!("Failed to read {}: {}", input.display(), e))
    })?;
    let log = parse_event_log(&data)?;

    let export = HarExporter::new().convert(&log);
    let json = serde_json::to_vec_pretty(&export.document)?;
    fs::write(output, json).await.map_err(|e| {
        CaptureError::StorageFailed(format!("Failed to write {}: {}", output.display(), e))
    })?;

    info!(
        "Converted {} events into {} entries ({} dropped)",
        log.len(),
        export.document.log.entries.len(),
        export.dropped.len()
    );
    Ok(export)
}
