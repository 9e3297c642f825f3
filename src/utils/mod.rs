// src/utils/mod.rs
//! Common utilities: configuration and errors

pub mod config;
pub mod errors;

pub use config::{CaptureConfig, CompletionCondition, ConfigOverrides, LogFormat};
pub use errors::{CaptureError, Result};
