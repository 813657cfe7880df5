use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The tone currently presented to the listener during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    /// Index of the sweep in the working frequency list.
    pub sweep: usize,
    pub frequency_hz: f32,
    pub volume_db: f32,
    pub started_at_ns: u64,
}

impl Stimulus {
    pub fn new(sweep: usize, frequency_hz: f32, volume_db: f32, started_at_ns: u64) -> Self {
        Self {
            sweep,
            frequency_hz,
            volume_db,
            started_at_ns,
        }
    }

    pub fn tone(&self, duration: Duration) -> Tone {
        Tone::Pure {
            frequency_hz: self.frequency_hz,
            volume_db: self.volume_db,
            duration,
        }
    }
}

/// Describes a waveform to synthesize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tone {
    /// Test tone whose loudness is given on the dB scale.
    Pure {
        frequency_hz: f32,
        volume_db: f32,
        duration: Duration,
    },
    /// Fixed-amplitude note of the greeting chime.
    Chime {
        frequency_hz: f32,
        amplitude: f32,
        duration: Duration,
    },
}

impl Tone {
    pub fn frequency_hz(&self) -> f32 {
        match self {
            Tone::Pure { frequency_hz, .. } | Tone::Chime { frequency_hz, .. } => *frequency_hz,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Tone::Pure { duration, .. } | Tone::Chime { duration, .. } => *duration,
        }
    }

    pub fn is_pure(&self) -> bool {
        matches!(self, Tone::Pure { .. })
    }
}
