use crate::analysis::{Audiogram, Summary};
use crate::collector::{CollectorStats, InputSource, ResponseCollector};
use crate::config::TestConfig;
use crate::error::{ConfigError, RunError};
use crate::sequencer::StimulusSequencer;
use crate::shared::SharedState;
use audiometer_audio::{AudioSink, Synthesizer, chime};
use audiometer_core::{Ear, Phase, StandardPhase, Trial};
use audiometer_timing::Timer;
use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Hooks for the listener-facing surface. All methods default to no-ops.
pub trait SessionObserver {
    fn on_phase(&mut self, _phase: StandardPhase, _config: &TestConfig) {}

    /// Called once per second with the time left before the sweeps start.
    fn on_countdown(&mut self, _remaining: Duration) {}

    /// `completed` counts this trial; `total` is the planned number of sweeps.
    fn on_trial(&mut self, _trial: &Trial, _completed: usize, _total: usize) {}
}

pub struct NullObserver;

impl SessionObserver for NullObserver {}

/// Everything a finished (or aborted) run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub ear: Ear,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub aborted: bool,
    /// One entry per completed sweep, sentinels included.
    pub trials: Vec<Trial>,
    /// Raw detections in the order the collector recorded them.
    pub detections: Vec<Trial>,
    pub playback_overrun_ms: f64,
    pub playback_jitter_ms: f64,
    pub audiogram: Audiogram,
    pub summary: Summary,
}

impl SessionReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// RNG for the working-list shuffle: seeded when the config asks for it.
pub fn rng_for(config: &TestConfig) -> StdRng {
    match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Drives one ear's session through `StandardPhase`.
pub struct HearingTest<T, R>
where
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    pub phase: StandardPhase,
    pub timer: T,
    pub rng: R,
    pub config: TestConfig,
    pub calibrated: bool,
    pub safe_margin: Duration,
}

impl<T, R> HearingTest<T, R>
where
    T: Timer<Timestamp = u64> + 'static,
    R: Rng,
{
    pub fn new(config: TestConfig, timer: T, rng: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            phase: StandardPhase::default(),
            timer,
            rng,
            config,
            calibrated: false,
            safe_margin: Duration::ZERO,
        })
    }

    pub fn advance_phase(&mut self) -> bool {
        if let Some(next) = self.phase.next() {
            self.phase = next;
            true
        } else {
            false
        }
    }

    /// Turns the greeting's playback overruns into the response-window margin.
    pub fn apply_calibration(&mut self) {
        let stats = self.timer.playback_stats();
        self.safe_margin = stats.safe_margin();
        self.calibrated = true;
        log::info!(
            "Calibration: {} notes, overrun {:.3} ms, jitter {:.3} ms, safe margin {:?}",
            stats.samples,
            stats.average_overrun_ns / 1_000_000.0,
            stats.jitter_ns / 1_000_000.0,
            self.safe_margin,
        );
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Runs every phase from the current one to `Debrief`. The sink is opened
    /// first and closed on every exit path.
    pub fn run<S, I, O>(
        &mut self,
        mut sink: S,
        source: I,
        observer: &mut O,
    ) -> Result<SessionReport, RunError>
    where
        S: AudioSink,
        I: InputSource,
        O: SessionObserver + ?Sized,
    {
        sink.open()?;
        let result = self.run_phases(&mut sink, source, observer);
        if let Err(err) = sink.close() {
            log::warn!("Failed to close audio output: {}", err);
        }
        result
    }

    fn run_phases<S, I, O>(
        &mut self,
        sink: &mut S,
        source: I,
        observer: &mut O,
    ) -> Result<SessionReport, RunError>
    where
        S: AudioSink,
        I: InputSource,
        O: SessionObserver + ?Sized,
    {
        let started_at = Local::now();
        let shared = Arc::new(SharedState::new());
        let mut source = Some(source);
        let mut trials = Vec::new();
        let mut aborted = false;

        loop {
            log::debug!("Entering phase {:?}", self.phase);
            observer.on_phase(self.phase, &self.config);

            match self.phase {
                StandardPhase::Welcome | StandardPhase::Debrief => {}
                StandardPhase::Greeting => {
                    if self.config.greeting {
                        self.play_chime(sink, true)?;
                        self.apply_calibration();
                    }
                }
                StandardPhase::Countdown => self.countdown(&mut *observer),
                StandardPhase::Sweep => {}
                StandardPhase::Farewell => {
                    if self.config.greeting && !aborted {
                        self.play_chime(sink, false)?;
                    }
                }
            }

            if self.phase.allows_input() {
                if let Some(source) = source.take() {
                    aborted = self.sweep(sink, source, &shared, &mut trials, &mut *observer)?;
                }
            }

            if !self.advance_phase() {
                break;
            }
        }

        let stats = self.timer.playback_stats();
        let report = SessionReport {
            ear: self.config.ear,
            started_at,
            finished_at: Local::now(),
            aborted,
            audiogram: Audiogram::from_trials(&trials),
            summary: Summary::from_trials(&trials),
            detections: shared.drain_log(),
            trials,
            playback_overrun_ms: stats.average_overrun_ns / 1_000_000.0,
            playback_jitter_ms: stats.jitter_ns / 1_000_000.0,
        };
        log::info!(
            "Session for {} ear finished in {} s: {}/{} sweeps detected",
            report.ear,
            report.duration().num_seconds(),
            report.summary.detected,
            report.summary.sweeps
        );
        Ok(report)
    }

    /// Plays the chime note by note, recording each note's playback overrun.
    fn play_chime<S: AudioSink>(&mut self, sink: &mut S, opening: bool) -> Result<(), RunError> {
        let synth = Synthesizer::new(sink.sample_rate(), self.config.full_scale_db, Ear::Both);
        for tone in chime(opening) {
            let buffer = synth.render(&tone);
            let started = self.timer.now();
            sink.play(&buffer)?;
            let actual = self.timer.elapsed(started);
            self.timer.record_playback(buffer.duration(), actual);
        }
        Ok(())
    }

    fn countdown<O: SessionObserver + ?Sized>(&self, observer: &mut O) {
        let mut remaining = self.config.countdown();
        while !remaining.is_zero() {
            observer.on_countdown(remaining);
            let step = remaining.min(Duration::from_secs(1));
            self.timer.sleep(step);
            remaining -= step;
        }
    }

    /// Returns whether the listener aborted.
    fn sweep<S, I, O>(
        &mut self,
        sink: &mut S,
        source: I,
        shared: &Arc<SharedState>,
        trials: &mut Vec<Trial>,
        observer: &mut O,
    ) -> Result<bool, RunError>
    where
        S: AudioSink,
        I: InputSource,
        O: SessionObserver + ?Sized,
    {
        let collector = ResponseCollector::start(Arc::clone(shared), source, self.timer.clone())?;
        let mut sequencer =
            StimulusSequencer::new(Arc::clone(shared), &mut *sink, self.timer.clone(), &self.config)
                .with_extra_window(self.safe_margin);

        let total = self.config.sweep_count();
        let mut aborted = false;
        let mut failure = None;
        let sweeps = sequencer.run(
            &self.config.frequencies_hz,
            &self.config.volumes_db,
            self.config.repeat,
            self.config.order,
            &mut self.rng,
        );
        for outcome in sweeps {
            match outcome {
                Ok(trial) => {
                    trials.push(trial);
                    observer.on_trial(&trial, trials.len(), total);
                }
                Err(RunError::Aborted) => aborted = true,
                Err(err) => failure = Some(err),
            }
        }

        let stats: Result<CollectorStats, RunError> = collector.stop();
        if let Some(err) = failure {
            log::error!("Sweep failed: {}", err);
            return Err(err);
        }
        let stats = stats?;
        log::debug!(
            "{} responses recorded, {} discarded",
            stats.recorded,
            stats.discarded
        );
        Ok(aborted)
    }
}
