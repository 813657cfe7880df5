use crate::stimulus::Stimulus;
use serde::{Deserialize, Serialize};

/// Outcome of one frequency sweep.
///
/// `heard_at_ns` is `None` when the sweep ran through every level without a
/// detection; `volume_db` and `played_at_ns` then describe the loudest tone
/// that was played.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub sweep: usize,
    pub frequency_hz: f32,
    pub volume_db: f32,
    pub played_at_ns: u64,
    pub heard_at_ns: Option<u64>,
}

impl Trial {
    /// A detection of `stimulus` at `heard_at_ns`. Never earlier than the onset.
    pub fn detected(stimulus: &Stimulus, heard_at_ns: u64) -> Self {
        Self {
            sweep: stimulus.sweep,
            frequency_hz: stimulus.frequency_hz,
            volume_db: stimulus.volume_db,
            played_at_ns: stimulus.started_at_ns,
            heard_at_ns: Some(heard_at_ns.max(stimulus.started_at_ns)),
        }
    }

    /// Sentinel for a sweep that was never detected.
    pub fn missed(last_played: &Stimulus) -> Self {
        Self {
            sweep: last_played.sweep,
            frequency_hz: last_played.frequency_hz,
            volume_db: last_played.volume_db,
            played_at_ns: last_played.started_at_ns,
            heard_at_ns: None,
        }
    }

    pub fn is_detected(&self) -> bool {
        self.heard_at_ns.is_some()
    }

    /// Quietest level heard in this sweep.
    pub fn threshold_db(&self) -> Option<f32> {
        self.heard_at_ns.map(|_| self.volume_db)
    }

    pub fn reaction_time_ns(&self) -> Option<u64> {
        self.heard_at_ns
            .map(|heard| heard.saturating_sub(self.played_at_ns))
    }

    pub fn reaction_time_ms(&self) -> Option<f64> {
        self.reaction_time_ns().map(|ns| ns as f64 / 1_000_000.0)
    }
}
