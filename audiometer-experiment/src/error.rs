use audiometer_audio::SinkError;
use thiserror::Error;

/// Rejected test configuration. Raised before any tone is played.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("frequency {0} Hz is not a positive finite number")]
    InvalidFrequency(f32),

    #[error("frequency {frequency} Hz is at or above the Nyquist limit of {nyquist} Hz")]
    AboveNyquist { frequency: f32, nyquist: f32 },

    #[error("volume {0} dB is not a finite, non-negative number")]
    InvalidVolume(f32),

    #[error("volumes must be strictly ascending, found {previous} dB before {next} dB")]
    VolumesNotAscending { previous: f32, next: f32 },

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("full scale level {0} dB is not finite")]
    InvalidFullScale(f32),

    #[error("unknown order '{0}', expected sequential or shuffled")]
    UnknownOrder(String),

    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum InputError {
    /// The event source has no more events to deliver.
    #[error("input source closed")]
    Closed,

    #[error("input device error: {0}")]
    Device(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("audio output failed, check your headphones: {0}")]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("test aborted by the listener")]
    Aborted,

    #[error("response collector thread panicked")]
    CollectorPanicked,
}
