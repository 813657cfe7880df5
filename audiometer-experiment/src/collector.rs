//! Background response collector.
//!
//! Runs on its own thread for the duration of the sweeps, turning listener
//! input into detections via [`SharedState::correlate`].

use crate::error::{InputError, RunError};
use crate::shared::{Correlation, SharedState};
use audiometer_timing::Timer;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// The listener heard a tone.
    Detect,
    Abort,
}

/// Source of listener events. Implementations block for at most `timeout`.
pub trait InputSource: Send + 'static {
    fn poll(&mut self, timeout: Duration) -> Result<Option<InputEvent>, InputError>;
}

/// Events delivered over a channel. Used by tests and scripted runs.
pub struct ChannelSource {
    rx: Receiver<InputEvent>,
}

impl ChannelSource {
    pub fn new() -> (Sender<InputEvent>, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (tx, Self { rx })
    }
}

impl InputSource for ChannelSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<InputEvent>, InputError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(InputError::Closed),
        }
    }
}

impl<I: InputSource + ?Sized> InputSource for Box<I> {
    fn poll(&mut self, timeout: Duration) -> Result<Option<InputEvent>, InputError> {
        (**self).poll(timeout)
    }
}

/// Event counts gathered over a collector's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub events: usize,
    pub recorded: usize,
    pub discarded: usize,
    pub aborts: usize,
}

pub struct ResponseCollector;

impl ResponseCollector {
    /// Spawns the collector thread. It runs until [`CollectorHandle::stop`]
    /// is called or the handle is dropped.
    pub fn start<I, T>(
        shared: Arc<SharedState>,
        source: I,
        timer: T,
    ) -> Result<CollectorHandle, RunError>
    where
        I: InputSource,
        T: Timer<Timestamp = u64> + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("response-collector".into())
            .spawn(move || collect(shared, source, timer, thread_stop))
            .map_err(InputError::Io)?;
        log::debug!("Response collector started");
        Ok(CollectorHandle {
            stop,
            thread: Some(thread),
        })
    }
}

fn collect<I, T>(
    shared: Arc<SharedState>,
    mut source: I,
    timer: T,
    stop: Arc<AtomicBool>,
) -> Result<CollectorStats, InputError>
where
    I: InputSource,
    T: Timer<Timestamp = u64>,
{
    let mut stats = CollectorStats::default();
    let mut closed = false;

    while !stop.load(Ordering::Acquire) {
        if closed {
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }
        let event = match source.poll(POLL_INTERVAL) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(InputError::Closed) => {
                log::debug!("Input source closed, collector idle");
                closed = true;
                continue;
            }
            Err(err) => {
                // Unblock the sequencer so the run ends with the input error.
                shared.request_abort();
                return Err(err);
            }
        };

        stats.events += 1;
        match event {
            InputEvent::Detect => match shared.correlate(|| timer.now()) {
                Correlation::Recorded(trial) => {
                    stats.recorded += 1;
                    log::info!(
                        "Heard {} Hz at {} dB after {:.1} ms",
                        trial.frequency_hz,
                        trial.volume_db,
                        trial.reaction_time_ms().unwrap_or_default()
                    );
                }
                Correlation::NoStimulus | Correlation::AlreadyDetected => {
                    stats.discarded += 1;
                    log::debug!("Response discarded");
                }
            },
            InputEvent::Abort => {
                stats.aborts += 1;
                log::warn!("Abort requested by listener");
                shared.request_abort();
            }
        }
    }
    Ok(stats)
}

pub struct CollectorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<CollectorStats, InputError>>>,
}

impl CollectorHandle {
    /// Signals the thread and waits for it to finish.
    pub fn stop(mut self) -> Result<CollectorStats, RunError> {
        self.stop.store(true, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return Ok(CollectorStats::default());
        };
        let stats = thread.join().map_err(|_| RunError::CollectorPanicked)??;
        log::debug!("Response collector stopped: {:?}", stats);
        Ok(stats)
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
