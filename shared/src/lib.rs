//! SignArm Shared Types
//!
//! This crate provides the motion-script model, the controller wire codec and the
//! acknowledgment state machine shared by the dispatch engine and its tooling.

pub mod codec;
pub mod rest;
pub mod routing;
pub mod script;
pub mod state_machine;

// Re-export commonly used types at crate root
pub use routing::{classify, classify_keys, Arm, ArmAssignment, ServoGroup};
pub use script::{Keyframe, MotionScript, MotionType, ScriptError};

/// Timing parameters for the controller handshake
pub mod timing {
    /// How long to wait for a controller's ACK before failing open
    pub const ACK_TIMEOUT_MS: u64 = 8000;

    /// Pause after a fingerspelled letter when more work is queued
    pub const FINGERSPELL_POST_DELAY_MS: u64 = 30;

    /// Pause after a full sign when more work is queued
    pub const SIGN_POST_DELAY_MS: u64 = 150;

    /// Serial link speed expected by the arm firmware
    pub const BAUD_RATE: u32 = 115_200;

    /// Bound on a single connection attempt
    pub const CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Time the firmware needs after the port opens (boards reset on open)
    pub const BOOT_SETTLE_MS: u64 = 2000;

    /// Bound on writing one command to a controller
    pub const WRITE_TIMEOUT_MS: u64 = 1000;

    /// Fixed interval between reconnection attempts
    pub const RECONNECT_INTERVAL_MS: u64 = 2000;
}
