//! Post-test summaries: per-frequency thresholds and a hearing-level category.

use audiometer_core::Trial;
use serde::Serialize;
use std::fmt;

/// Thresholds at or above this level count toward the hearing capacity figure.
pub const CAPACITY_THRESHOLD_DB: f32 = 20.0;

/// Clinical hearing-loss category for a threshold in dB HL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HearingLevel {
    Normal,
    Slight,
    Mild,
    Moderate,
    ModeratelySevere,
    Severe,
    Profound,
}

impl HearingLevel {
    /// Upper bounds are inclusive: 15 dB is still normal, 16 dB is slight.
    pub fn classify(threshold_db: f32) -> Self {
        match threshold_db {
            t if t <= 15.0 => HearingLevel::Normal,
            t if t <= 25.0 => HearingLevel::Slight,
            t if t <= 40.0 => HearingLevel::Mild,
            t if t <= 55.0 => HearingLevel::Moderate,
            t if t <= 70.0 => HearingLevel::ModeratelySevere,
            t if t <= 90.0 => HearingLevel::Severe,
            _ => HearingLevel::Profound,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HearingLevel::Normal => "Normal",
            HearingLevel::Slight => "Slight",
            HearingLevel::Mild => "Mild",
            HearingLevel::Moderate => "Moderate",
            HearingLevel::ModeratelySevere => "Moderately Severe",
            HearingLevel::Severe => "Severe",
            HearingLevel::Profound => "Profound",
        }
    }
}

impl fmt::Display for HearingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdPoint {
    pub frequency_hz: f32,
    /// Mean detected level across repeats; `None` if never heard.
    pub threshold_db: Option<f32>,
    pub level: Option<HearingLevel>,
    pub sweeps: usize,
    pub detections: usize,
    pub mean_reaction_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Audiogram {
    pub points: Vec<ThresholdPoint>,
}

impl Audiogram {
    /// Groups sweep outcomes by frequency, ascending.
    pub fn from_trials(trials: &[Trial]) -> Self {
        let mut frequencies: Vec<f32> = trials.iter().map(|t| t.frequency_hz).collect();
        frequencies.sort_by(f32::total_cmp);
        frequencies.dedup();

        let points = frequencies
            .into_iter()
            .map(|frequency_hz| {
                let group: Vec<&Trial> = trials
                    .iter()
                    .filter(|t| t.frequency_hz == frequency_hz)
                    .collect();
                let thresholds: Vec<f32> = group.iter().filter_map(|t| t.threshold_db()).collect();
                let reactions: Vec<f64> =
                    group.iter().filter_map(|t| t.reaction_time_ms()).collect();

                let threshold_db = mean_f32(&thresholds);
                ThresholdPoint {
                    frequency_hz,
                    threshold_db,
                    level: threshold_db.map(HearingLevel::classify),
                    sweeps: group.len(),
                    detections: thresholds.len(),
                    mean_reaction_ms: mean_f64(&reactions),
                }
            })
            .collect();

        Self { points }
    }

    pub fn point(&self, frequency_hz: f32) -> Option<&ThresholdPoint> {
        self.points.iter().find(|p| p.frequency_hz == frequency_hz)
    }

    /// Mean of the per-frequency thresholds that were measured.
    pub fn average_threshold_db(&self) -> Option<f32> {
        let measured: Vec<f32> = self.points.iter().filter_map(|p| p.threshold_db).collect();
        mean_f32(&measured)
    }

    pub fn overall_level(&self) -> Option<HearingLevel> {
        self.average_threshold_db().map(HearingLevel::classify)
    }

    /// Percentage of tested frequencies whose measured threshold is at least
    /// [`CAPACITY_THRESHOLD_DB`]. Frequencies never heard count as tested.
    pub fn hearing_capacity_pct(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        let counted = self
            .points
            .iter()
            .filter(|p| p.threshold_db.is_some_and(|db| db >= CAPACITY_THRESHOLD_DB))
            .count();
        Some(counted as f64 / self.points.len() as f64 * 100.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub sweeps: usize,
    pub detected: usize,
    pub response_rate: f64,
    pub mean_reaction_ms: Option<f64>,
    pub min_reaction_ms: Option<f64>,
    pub max_reaction_ms: Option<f64>,
}

impl Summary {
    pub fn from_trials(trials: &[Trial]) -> Self {
        let reactions: Vec<f64> = trials.iter().filter_map(|t| t.reaction_time_ms()).collect();
        let detected = reactions.len();
        Self {
            sweeps: trials.len(),
            detected,
            response_rate: if trials.is_empty() {
                0.0
            } else {
                detected as f64 / trials.len() as f64
            },
            mean_reaction_ms: mean_f64(&reactions),
            min_reaction_ms: reactions.iter().copied().reduce(f64::min),
            max_reaction_ms: reactions.iter().copied().reduce(f64::max),
        }
    }
}

fn mean_f32(values: &[f32]) -> Option<f32> {
    (!values.is_empty()).then(|| values.iter().sum::<f32>() / values.len() as f32)
}

fn mean_f64(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
