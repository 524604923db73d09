mod clock;
mod scheduler;

pub use clock::Timestamp;
pub use scheduler::{CapturedNote, HeldNote, MetronomeConfig, PlaybackScheduler};
