pub mod timer;

pub use timer::{HighPrecisionTimer, PlaybackStats, Timer};
