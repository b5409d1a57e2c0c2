//! Time utilities and abstractions
//!
//! - **[`clock`]**: wall-clock sources (real, mock and runtime-anchored)
//! - **[`timer`]**: cancellable one-shot and recurring timers

pub mod clock;
pub mod timer;

// Re-export commonly used items
pub use clock::{Clock, MockClock, RuntimeClock, SystemClock};
pub use timer::{recurring, schedule, TimerHandle};
