use crate::error::ConfigError;
use audiometer_audio::SAMPLE_RATE;
use audiometer_core::Ear;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Order of the working frequency list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Sequential,
    Shuffled,
}

impl FromStr for Order {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Order::Sequential),
            "shuffled" | "shuffle" | "random" => Ok(Order::Shuffled),
            other => Err(ConfigError::UnknownOrder(other.to_string())),
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Sequential => f.write_str("sequential"),
            Order::Shuffled => f.write_str("shuffled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub frequencies_hz: Vec<f32>,
    /// Ascending; the sweep plays them quietest first.
    pub volumes_db: Vec<f32>,
    pub repeat: usize,
    pub order: Order,
    pub ear: Ear,
    pub tone_duration_ms: u64,
    pub pulses_per_level: usize,
    /// How long a stimulus stays active after its tone ends.
    pub response_window_ms: u64,
    pub inter_frequency_pause_ms: u64,
    pub countdown_ms: u64,
    /// Level that maps to a full-scale sine.
    pub full_scale_db: f32,
    pub sample_rate: u32,
    pub greeting: bool,
    pub seed: Option<u64>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            frequencies_hz: vec![125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0],
            volumes_db: (0..=90).step_by(10).map(|v| v as f32).collect(),
            repeat: 1,
            order: Order::Sequential,
            ear: Ear::Both,
            tone_duration_ms: 500,
            pulses_per_level: 1,
            response_window_ms: 0,
            inter_frequency_pause_ms: 2000,
            countdown_ms: 5000,
            full_scale_db: 90.0,
            sample_rate: SAMPLE_RATE,
            greeting: true,
            seed: None,
        }
    }
}

impl TestConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repeat == 0 {
            return Err(ConfigError::Zero { field: "repeat" });
        }
        if self.pulses_per_level == 0 {
            return Err(ConfigError::Zero {
                field: "pulses_per_level",
            });
        }
        if self.tone_duration_ms == 0 {
            return Err(ConfigError::Zero {
                field: "tone_duration_ms",
            });
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::Zero {
                field: "sample_rate",
            });
        }
        if !self.full_scale_db.is_finite() {
            return Err(ConfigError::InvalidFullScale(self.full_scale_db));
        }

        let nyquist = self.sample_rate as f32 / 2.0;
        for &frequency in &self.frequencies_hz {
            if !frequency.is_finite() || frequency <= 0.0 {
                return Err(ConfigError::InvalidFrequency(frequency));
            }
            if frequency >= nyquist {
                return Err(ConfigError::AboveNyquist { frequency, nyquist });
            }
        }

        for &volume in &self.volumes_db {
            if !volume.is_finite() || volume < 0.0 {
                return Err(ConfigError::InvalidVolume(volume));
            }
        }
        if let Some(pair) = self.volumes_db.windows(2).find(|w| w[0] >= w[1]) {
            return Err(ConfigError::VolumesNotAscending {
                previous: pair[0],
                next: pair[1],
            });
        }
        Ok(())
    }

    pub fn tone_duration(&self) -> Duration {
        Duration::from_millis(self.tone_duration_ms)
    }

    pub fn response_window(&self) -> Duration {
        Duration::from_millis(self.response_window_ms)
    }

    pub fn inter_frequency_pause(&self) -> Duration {
        Duration::from_millis(self.inter_frequency_pause_ms)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.countdown_ms)
    }

    /// Number of sweeps a full run performs.
    pub fn sweep_count(&self) -> usize {
        if self.volumes_db.is_empty() {
            0
        } else {
            self.frequencies_hz.len() * self.repeat
        }
    }
}
