//! 证据层：转写滑动窗口、静默计时器与可注入时钟

pub mod buffer;
pub mod clock;
pub mod silence;

pub use buffer::{TranscriptBuffer, TranscriptEntry};
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use silence::SilenceTracker;
