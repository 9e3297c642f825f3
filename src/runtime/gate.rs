// src/runtime/gate.rs
//! Manual gate before profiling
//!
//! Gives the operator a chance to log in, dismiss banners or warm caches in
//! the headful browser before the capture window opens.

use crate::utils::errors::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub const DEFAULT_PROMPT: &str = "Press Enter to start profiling";

/// Print `prompt` and wait for one line on `reader`.
/// A closed input proceeds immediately.
pub async fn wait_for_operator<R>(reader: R, prompt: &str) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    println!("{}", prompt);

    let mut lines = reader.lines();
    match lines.next_line().await? {
        Some(_) => info!("Operator confirmed, starting capture"),
        None => warn!("Input closed, starting capture without confirmation"),
    }
    Ok(())
}

/// Wait for Enter on stdin
pub async fn wait_for_enter(prompt: &str) -> Result<()> {
    wait_for_operator(BufReader::new(tokio::io::stdin()), prompt).await
}
