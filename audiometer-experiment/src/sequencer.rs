//! Ascending-staircase stimulus sequencer.
//!
//! Each entry of the working frequency list gets one sweep: volumes are played
//! quietest first and the sweep stops at the first level the listener reports.
//! A sweep that runs out of levels yields a sentinel trial with no detection.

use crate::config::{Order, TestConfig};
use crate::error::RunError;
use crate::shared::SharedState;
use audiometer_audio::{AudioSink, Synthesizer};
use audiometer_core::{Stimulus, Trial};
use audiometer_timing::Timer;
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;

const DETECTION_POLL: Duration = Duration::from_millis(5);

/// Repeats every candidate `repeat` times in place and optionally shuffles.
pub fn working_list<R: Rng + ?Sized>(
    frequencies: &[f32],
    repeat: usize,
    order: Order,
    rng: &mut R,
) -> Vec<f32> {
    let mut list: Vec<f32> = frequencies
        .iter()
        .flat_map(|&f| std::iter::repeat_n(f, repeat))
        .collect();
    if order == Order::Shuffled {
        list.shuffle(rng);
    }
    list
}

pub struct StimulusSequencer<S, T>
where
    S: AudioSink,
    T: Timer<Timestamp = u64>,
{
    shared: Arc<SharedState>,
    sink: S,
    timer: T,
    synth: Synthesizer,
    tone_duration: Duration,
    pulses_per_level: usize,
    response_window: Duration,
    inter_frequency_pause: Duration,
}

impl<S, T> StimulusSequencer<S, T>
where
    S: AudioSink,
    T: Timer<Timestamp = u64>,
{
    /// Tones are synthesized at the sink's own rate.
    pub fn new(shared: Arc<SharedState>, sink: S, timer: T, config: &TestConfig) -> Self {
        let synth = Synthesizer::new(sink.sample_rate(), config.full_scale_db, config.ear);
        Self {
            shared,
            sink,
            timer,
            synth,
            tone_duration: config.tone_duration(),
            pulses_per_level: config.pulses_per_level.max(1),
            response_window: config.response_window(),
            inter_frequency_pause: config.inter_frequency_pause(),
        }
    }

    /// Widens the per-tone response window, e.g. by the calibrated safety margin.
    pub fn with_extra_window(mut self, extra: Duration) -> Self {
        self.response_window += extra;
        self
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Starts a run. Trials are produced lazily, one per sweep.
    pub fn run<R: Rng + ?Sized>(
        &mut self,
        frequencies: &[f32],
        volumes: &[f32],
        repeat: usize,
        order: Order,
        rng: &mut R,
    ) -> Sweeps<'_, S, T> {
        let working = if volumes.is_empty() {
            Vec::new()
        } else {
            working_list(frequencies, repeat, order, rng)
        };
        log::info!(
            "Sweep plan: {} frequencies x {} levels ({})",
            working.len(),
            volumes.len(),
            order
        );
        Sweeps {
            sequencer: self,
            working,
            volumes: volumes.to_vec(),
            next: 0,
            done: false,
        }
    }

    fn sweep(
        &mut self,
        sweep: usize,
        frequency_hz: f32,
        volumes: &[f32],
    ) -> Result<Option<Trial>, RunError> {
        self.shared.start_sweep();
        let mut last_played: Option<Stimulus> = None;

        for &volume_db in volumes {
            for _ in 0..self.pulses_per_level {
                // A press that landed after the last poll ends the sweep before
                // anything louder is played.
                if let Some(stimulus) = last_played.filter(|_| self.shared.is_detected()) {
                    return Ok(Some(self.finish_detected(&stimulus)));
                }
                if self.shared.is_abort_requested() {
                    self.shared.clear();
                    return Err(RunError::Aborted);
                }

                let stimulus = Stimulus::new(sweep, frequency_hz, volume_db, self.timer.now());
                self.shared.publish(stimulus);
                log::info!("Playing {} Hz at {} dB", frequency_hz, volume_db);

                let buffer = self.synth.render(&stimulus.tone(self.tone_duration));
                if let Err(err) = self.sink.play(&buffer) {
                    self.shared.clear();
                    return Err(err.into());
                }
                last_played = Some(stimulus);

                if self.await_detection() {
                    return Ok(Some(self.finish_detected(&stimulus)));
                }
            }
        }

        self.shared.clear();
        // A press may have landed between the last poll and the clear.
        if self.shared.is_detected() {
            if let Some(stimulus) = last_played {
                return Ok(Some(self.finish_detected(&stimulus)));
            }
        }
        Ok(last_played.map(|stimulus| {
            log::info!(
                "No response at {} Hz up to {} dB",
                frequency_hz,
                stimulus.volume_db
            );
            Trial::missed(&stimulus)
        }))
    }

    fn finish_detected(&self, stimulus: &Stimulus) -> Trial {
        self.shared.clear();
        // The collector appends before it releases the stimulus, so the clear
        // above guarantees the entry is visible.
        self.shared
            .detection_for(stimulus.sweep)
            .unwrap_or_else(|| Trial::detected(stimulus, self.timer.now()))
    }

    /// Polls the detected flag until the response window closes.
    fn await_detection(&self) -> bool {
        let opened = self.timer.now();
        loop {
            if self.shared.is_detected() {
                return true;
            }
            let waited = self.timer.elapsed(opened);
            if waited >= self.response_window {
                return false;
            }
            self.timer.sleep(DETECTION_POLL.min(self.response_window - waited));
        }
    }
}

/// Lazy sequence of sweep outcomes. Ends after the working list is exhausted
/// or after the first error.
pub struct Sweeps<'a, S, T>
where
    S: AudioSink,
    T: Timer<Timestamp = u64>,
{
    sequencer: &'a mut StimulusSequencer<S, T>,
    working: Vec<f32>,
    volumes: Vec<f32>,
    next: usize,
    done: bool,
}

impl<S, T> Iterator for Sweeps<'_, S, T>
where
    S: AudioSink,
    T: Timer<Timestamp = u64>,
{
    type Item = Result<Trial, RunError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some(&frequency_hz) = self.working.get(self.next) else {
                self.done = true;
                self.sequencer.shared.clear();
                break;
            };
            let sweep = self.next;
            self.next += 1;

            if sweep > 0 {
                self.sequencer
                    .timer
                    .sleep(self.sequencer.inter_frequency_pause);
            }

            match self.sequencer.sweep(sweep, frequency_hz, &self.volumes) {
                Ok(Some(trial)) => return Some(Ok(trial)),
                Ok(None) => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

impl<S, T> std::iter::FusedIterator for Sweeps<'_, S, T>
where
    S: AudioSink,
    T: Timer<Timestamp = u64>,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_working_list_repeats_in_place() {
        let mut rng = StdRng::seed_from_u64(1);
        let list = working_list(&[125.0, 250.0, 500.0], 2, Order::Sequential, &mut rng);
        assert_eq!(list, vec![125.0, 125.0, 250.0, 250.0, 500.0, 500.0]);
    }

    #[test]
    fn test_shuffle_keeps_multiset() {
        let mut rng = StdRng::seed_from_u64(7);
        let freqs = [125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0];
        let mut list = working_list(&freqs, 3, Order::Shuffled, &mut rng);
        assert_eq!(list.len(), 21);
        list.sort_by(f32::total_cmp);
        let mut expected = working_list(&freqs, 3, Order::Sequential, &mut rng);
        expected.sort_by(f32::total_cmp);
        assert_eq!(list, expected);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let freqs = [125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0];
        let a = working_list(&freqs, 2, Order::Shuffled, &mut StdRng::seed_from_u64(42));
        let b = working_list(&freqs, 2, Order::Shuffled, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_candidates_give_empty_list() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(working_list(&[], 4, Order::Shuffled, &mut rng).is_empty());
    }
}
