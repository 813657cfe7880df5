//! State shared between the sequencer and the response collector.
//!
//! Field ownership:
//! - `current`: written by the sequencer only, read by the collector.
//! - `detected`: set by the collector, reset by the sequencer when a sweep starts.
//! - `trial_log`: appended by the collector, read after playback.
//! - `abort_requested`: set by the collector, read by the sequencer.
//!
//! The collector correlates an event while holding the read side of `current`,
//! and the sequencer only changes `current` (or resets `detected`) under the
//! write side. A detection is therefore always attributed to the stimulus that
//! was visible when the event was processed.

use audiometer_core::{Stimulus, Trial};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct SharedState {
    current: RwLock<Option<Stimulus>>,
    detected: AtomicBool,
    abort_requested: AtomicBool,
    trial_log: Mutex<Vec<Trial>>,
}

/// What happened to a detection event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correlation {
    Recorded(Trial),
    /// No tone was active (before the first or after the last stimulus).
    NoStimulus,
    /// The current sweep was already detected.
    AlreadyDetected,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_current(&self) -> RwLockReadGuard<'_, Option<Stimulus>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_current(&self) -> RwLockWriteGuard<'_, Option<Stimulus>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self) -> MutexGuard<'_, Vec<Trial>> {
        self.trial_log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Sequencer side

    /// Clears any active stimulus and the detected flag before a new sweep.
    pub fn start_sweep(&self) {
        let mut current = self.write_current();
        *current = None;
        self.detected.store(false, Ordering::Release);
    }

    pub fn publish(&self, stimulus: Stimulus) {
        *self.write_current() = Some(stimulus);
    }

    /// Deactivates the current stimulus; later events are discarded.
    pub fn clear(&self) {
        *self.write_current() = None;
    }

    pub fn is_detected(&self) -> bool {
        self.detected.load(Ordering::Acquire)
    }

    pub fn is_abort_requested(&self) -> bool {
        self.abort_requested.load(Ordering::Acquire)
    }

    /// The logged detection of `sweep`, if any.
    pub fn detection_for(&self, sweep: usize) -> Option<Trial> {
        self.log().iter().rev().find(|t| t.sweep == sweep).copied()
    }

    // Collector side

    /// Attributes a detection event to the active stimulus. `now` is sampled
    /// while the stimulus is pinned, so the recorded time never precedes its onset.
    pub fn correlate(&self, now: impl FnOnce() -> u64) -> Correlation {
        let current = self.read_current();
        let Some(stimulus) = current.as_ref() else {
            return Correlation::NoStimulus;
        };
        if self
            .detected
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Correlation::AlreadyDetected;
        }
        let trial = Trial::detected(stimulus, now());
        self.log().push(trial);
        Correlation::Recorded(trial)
    }

    pub fn request_abort(&self) {
        self.abort_requested.store(true, Ordering::Release);
    }

    // Readers

    pub fn current_stimulus(&self) -> Option<Stimulus> {
        *self.read_current()
    }

    pub fn trial_log(&self) -> Vec<Trial> {
        self.log().clone()
    }

    pub fn drain_log(&self) -> Vec<Trial> {
        std::mem::take(&mut *self.log())
    }
}
