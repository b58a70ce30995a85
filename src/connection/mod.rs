//! Controller connections
//!
//! This module handles:
//! - One supervised link per arm with automatic reconnection
//! - Line decoding of controller output (ACKs and diagnostics)
//! - Stale event filtering across reconnects

mod manager;

pub use manager::{ControllerLink, LinkConfig, LinkSignal};
