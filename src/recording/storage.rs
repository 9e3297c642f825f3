// src/recording/storage.rs
//! Per-run artifact storage
//!
//! Every run writes into `{output_root}/{hostname}/{path-slug}/{timestamp}/`:
//! `trace.json`, `requests.har`, `events.json` (the raw notification log,
//! convertible again offline) and `lighthouse.json` unless the audit is
//! skipped.

use crate::recording::har::HarDocument;
use crate::recording::recorder::EventLog;
use crate::utils::errors::{CaptureError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use url::Url;

pub const TRACE_FILE: &str = "trace.json";
pub const HAR_FILE: &str = "requests.har";
pub const LIGHTHOUSE_FILE: &str = "lighthouse.json";
pub const EVENTS_FILE: &str = "events.json";

static UNSAFE_PATH_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_/-]+").expect("static regex is valid"));

/// Output directory of a single run
#[derive(Debug, Clone)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Directory a run of `target` started at `started` writes into
    pub fn layout(output_root: &Path, target: &Url, started: DateTime<Utc>) -> PathBuf {
        let host = target.host_str().unwrap_or("unknown-host");
        let slug = path_slug(target.path());
        let timestamp = started
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace(':', "-");

        let mut path = output_root.join(host);
        for segment in slug.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path.join(timestamp)
    }

    /// Create the run directory
    pub async fn create(output_root: &Path, target: &Url, started: DateTime<Utc>) -> Result<Self> {
        let path = Self::layout(output_root, target, started);

        fs::create_dir_all(&path).await.map_err(|e| {
            CaptureError::StorageFailed(format!("Failed to create {}: {}", path.display(), e))
        })?;

        info!("Writing run artifacts to {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn trace_path(&self) -> PathBuf {
        self.path.join(TRACE_FILE)
    }

    pub fn har_path(&self) -> PathBuf {
        self.path.join(HAR_FILE)
    }

    pub fn lighthouse_path(&self) -> PathBuf {
        self.path.join(LIGHTHOUSE_FILE)
    }

    pub fn events_path(&self) -> PathBuf {
        self.path.join(EVENTS_FILE)
    }

    /// Write the frozen notification log as a JSON array
    pub async fn write_events(&self, log: &EventLog) -> Result<PathBuf> {
        let json = serde_json::to_vec(log)?;
        self.write(self.events_path(), &json).await
    }

    /// Write the HAR document
    pub async fn write_har(&self, document: &HarDocument) -> Result<PathBuf> {
        let json = serde_json::to_vec(document)?;
        self.write(self.har_path(), &json).await
    }

    /// Write collected trace events as a `{"traceEvents": [...]}` document
    pub async fn write_trace(&self, events: Vec<Value>) -> Result<PathBuf> {
        let json = serde_json::to_vec(&serde_json::json!({ "traceEvents": events }))?;
        self.write(self.trace_path(), &json).await
    }

    /// Persist the audit report unmodified
    pub async fn write_lighthouse(&self, report: &[u8]) -> Result<PathBuf> {
        self.write(self.lighthouse_path(), report).await
    }

    async fn write(&self, path: PathBuf, data: &[u8]) -> Result<PathBuf> {
        fs::write(&path, data).await.map_err(|e| {
            CaptureError::StorageFailed(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!("Wrote {:?} ({} bytes)", path, data.len());
        Ok(path)
    }
}

/// URL path with every run of characters outside `[A-Za-z0-9_/-]` replaced by `-`
pub fn path_slug(path: &str) -> String {
    UNSAFE_PATH_CHARS.replace_all(path, "-").into_owned()
}
