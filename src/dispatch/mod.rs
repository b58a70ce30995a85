//! Motion dispatch
//!
//! The queue that sign lookup feeds and the engine that drains it onto the arms.

mod engine;
mod queue;

pub use engine::{DispatchConfig, DispatchEngine};
pub use queue::{motion_queue, MotionQueue};
