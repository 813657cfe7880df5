pub mod analysis;
pub mod collector;
pub mod config;
pub mod error;
pub mod sequencer;
pub mod shared;
pub mod state;
pub use analysis::{Audiogram, CAPACITY_THRESHOLD_DB, HearingLevel, Summary, ThresholdPoint};
pub use collector::{
    ChannelSource, CollectorHandle, CollectorStats, InputEvent, InputSource, ResponseCollector,
};
pub use config::{Order, TestConfig};
pub use error::{ConfigError, InputError, RunError};
pub use sequencer::{StimulusSequencer, Sweeps, working_list};
pub use shared::{Correlation, SharedState};
pub use state::{HearingTest, NullObserver, SessionObserver, SessionReport, rng_for};
