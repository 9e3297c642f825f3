// src/runtime/audit.rs
//! Lighthouse audit runner
//!
//! Lighthouse is driven as an external CLI pointed at the already running
//! browser through its remote debugging port. The JSON report is read from
//! stdout and kept byte for byte.

use crate::utils::errors::{CaptureError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

/// Executable looked up on PATH when no path is configured
pub const LIGHTHOUSE_COMMAND: &str = "lighthouse";

/// Runs Lighthouse against a browser over its debugging port
#[derive(Debug, Clone)]
pub struct LighthouseAuditor {
    executable: PathBuf,
}

impl LighthouseAuditor {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Use `configured` when set, otherwise find `lighthouse` on PATH
    pub fn locate(configured: Option<&Path>) -> Result<Self> {
        if let Some(path) = configured {
            return Ok(Self::new(path));
        }

        match which::which(LIGHTHOUSE_COMMAND) {
            Ok(path) => {
                info!("Found {} at {:?}", LIGHTHOUSE_COMMAND, path);
                Ok(Self::new(path))
            }
            Err(e) => Err(CaptureError::AuditFailed(format!(
                "Executable '{}' not found in PATH: {}",
                LIGHTHOUSE_COMMAND, e
            ))),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Command-line arguments for a desktop audit of `url`
    pub fn args(&self, url: &str, port: u16) -> Vec<String> {
        vec![
            url.to_string(),
            format!("--port={}", port),
            "--preset=desktop".to_string(),
            "--output=json".to_string(),
            "--output-path=stdout".to_string(),
            "--quiet".to_string(),
        ]
    }

    /// Audit `url` and return the raw JSON report
    pub async fn audit(&self, url: &str, port: u16) -> Result<Vec<u8>> {
        debug!("Running {:?} against port {}", self.executable, port);

        let output = Command::new(&self.executable)
            .args(self.args(url, port))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CaptureError::AuditFailed(format!("Failed to spawn {:?}: {}", self.executable, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::AuditFailed(format!(
                "Lighthouse exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice::<serde::de::IgnoredAny>(&output.stdout).map_err(|e| {
            CaptureError::AuditFailed(format!("Lighthouse produced an invalid report: {}", e))
        })?;

        info!("Lighthouse report received ({} bytes)", output.stdout.len());
        Ok(output.stdout)
    }
}

/// Remote debugging port from a browser websocket address
pub fn debug_port(websocket_url: &str) -> Result<u16> {
    Url::parse(websocket_url)
        .ok()
        .and_then(|url| url.port())
        .ok_or_else(|| {
            CaptureError::BrowserFailed(format!(
                "No debugging port in websocket address {}",
                websocket_url
            ))
        })
}
