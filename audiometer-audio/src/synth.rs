//! Pure-tone synthesis.
//!
//! Every buffer handed to a sink is float PCM in `[-1, 1]`. Test tones are
//! scaled from their dB level with the exponential law
//! `amplitude = 10^((volume - full_scale) / 20)`, so the loudest level of the
//! test maps to full scale and every 20 dB below it divides the amplitude by ten.

use audiometer_core::{Ear, Tone};
use std::f64::consts::TAU;
use std::time::Duration;

pub const SAMPLE_RATE: u32 = 44_100;

/// Interleaved float samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl PcmBuffer {
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: 1,
            samples,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channels.max(1) as usize)
            .copied()
    }

    /// Spreads a mono buffer over a stereo pair, silencing the untested side.
    /// Buffers that are already multi-channel are returned unchanged.
    pub fn route(self, ear: Ear) -> PcmBuffer {
        if self.channels != 1 {
            return self;
        }
        let (left, right) = ear.gains();
        let mut samples = Vec::with_capacity(self.samples.len() * 2);
        for s in &self.samples {
            samples.push(s * left);
            samples.push(s * right);
        }
        PcmBuffer {
            sample_rate: self.sample_rate,
            channels: 2,
            samples,
        }
    }
}

/// Monotonic dB to linear amplitude mapping, clamped to full scale.
pub fn db_to_amplitude(volume_db: f32, full_scale_db: f32) -> f32 {
    10f32
        .powf((volume_db - full_scale_db) / 20.0)
        .clamp(0.0, 1.0)
}

/// A sine of `duration` at `amplitude`, starting at zero phase.
pub fn sine(frequency_hz: f32, amplitude: f32, duration: Duration, sample_rate: u32) -> Vec<f32> {
    let count = (sample_rate as f64 * duration.as_secs_f64()) as usize;
    let step = TAU * frequency_hz as f64 / sample_rate as f64;
    (0..count)
        .map(|n| (amplitude as f64 * (step * n as f64).sin()) as f32)
        .collect()
}

#[derive(Debug, Clone)]
pub struct Synthesizer {
    pub sample_rate: u32,
    pub full_scale_db: f32,
    pub ear: Ear,
}

impl Synthesizer {
    pub fn new(sample_rate: u32, full_scale_db: f32, ear: Ear) -> Self {
        Self {
            sample_rate,
            full_scale_db,
            ear,
        }
    }

    pub fn amplitude(&self, tone: &Tone) -> f32 {
        match tone {
            Tone::Pure { volume_db, .. } => db_to_amplitude(*volume_db, self.full_scale_db),
            Tone::Chime { amplitude, .. } => amplitude.clamp(0.0, 1.0),
        }
    }

    /// Renders a stereo buffer. Test tones go to the configured ear, chime
    /// notes always play on both sides.
    pub fn render(&self, tone: &Tone) -> PcmBuffer {
        let samples = sine(
            tone.frequency_hz(),
            self.amplitude(tone),
            tone.duration(),
            self.sample_rate,
        );
        let ear = if tone.is_pure() { self.ear } else { Ear::Both };
        PcmBuffer::mono(self.sample_rate, samples).route(ear)
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(SAMPLE_RATE, 90.0, Ear::Both)
    }
}
