// src/cdp/mod.rs
//! Chrome DevTools Protocol plumbing
//!
//! - **Events**: the fixed set of page/network notifications and their wire form
//! - **Session**: the subscription seam between a browser page and the recorder

pub mod events;
pub mod session;

pub use events::{EventKind, ProtocolEvent};
pub use session::{CdpSession, ChannelSession, Subscription};
