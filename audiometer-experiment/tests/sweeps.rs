use audiometer_audio::{AudioSink, MemorySink, PcmBuffer, SinkError};
use audiometer_core::{Stimulus, Trial};
use audiometer_experiment::{
    ChannelSource, InputEvent, Order, ResponseCollector, RunError, SharedState, StimulusSequencer,
    TestConfig,
};
use audiometer_timing::{HighPrecisionTimer, PlaybackStats, Timer};
use crossbeam_channel::Sender;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Plays nothing; answers for the listener by correlating synchronously.
struct ScriptedListener<F: FnMut(&Stimulus) -> bool> {
    shared: Arc<SharedState>,
    timer: HighPrecisionTimer,
    hears: F,
    played: Vec<Stimulus>,
}

impl<F: FnMut(&Stimulus) -> bool> ScriptedListener<F> {
    fn new(shared: &Arc<SharedState>, timer: &HighPrecisionTimer, hears: F) -> Self {
        Self {
            shared: Arc::clone(shared),
            timer: timer.clone(),
            hears,
            played: Vec::new(),
        }
    }
}

impl<F: FnMut(&Stimulus) -> bool> AudioSink for ScriptedListener<F> {
    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn play(&mut self, _buffer: &PcmBuffer) -> Result<(), SinkError> {
        let stimulus = self
            .shared
            .current_stimulus()
            .expect("a stimulus is published before playback");
        self.played.push(stimulus);
        if (self.hears)(&stimulus) {
            self.shared.correlate(|| self.timer.now());
        }
        Ok(())
    }
}

fn config(frequencies: &[f32], volumes: &[f32]) -> TestConfig {
    TestConfig {
        frequencies_hz: frequencies.to_vec(),
        volumes_db: volumes.to_vec(),
        tone_duration_ms: 2,
        inter_frequency_pause_ms: 0,
        countdown_ms: 0,
        ..Default::default()
    }
}

fn run_all<S: AudioSink>(
    sequencer: &mut StimulusSequencer<S, HighPrecisionTimer>,
    config: &TestConfig,
    seed: u64,
) -> Vec<Result<Trial, RunError>> {
    let mut rng = StdRng::seed_from_u64(seed);
    sequencer
        .run(
            &config.frequencies_hz,
            &config.volumes_db,
            config.repeat,
            config.order,
            &mut rng,
        )
        .collect()
}

#[test]
fn detection_at_20_db_ends_each_sweep_early() {
    let config = config(&[125.0, 250.0], &[0.0, 20.0, 40.0]);
    let shared = Arc::new(SharedState::new());
    let timer = HighPrecisionTimer::new();
    let mut listener = ScriptedListener::new(&shared, &timer, |s: &Stimulus| s.volume_db >= 20.0);

    let mut sequencer = StimulusSequencer::new(Arc::clone(&shared), &mut listener, timer, &config);
    let trials: Vec<Trial> = run_all(&mut sequencer, &config, 0)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    drop(sequencer);

    let summary: Vec<(f32, f32)> = trials.iter().map(|t| (t.frequency_hz, t.volume_db)).collect();
    assert_eq!(summary, vec![(125.0, 20.0), (250.0, 20.0)]);
    for trial in &trials {
        assert!(trial.heard_at_ns.unwrap() >= trial.played_at_ns);
        assert!(trial.reaction_time_ns().is_some());
    }
    // 40 dB is never reached.
    assert_eq!(listener.played.len(), 4);
    assert!(listener.played.iter().all(|s| s.volume_db < 40.0));
    assert_eq!(shared.trial_log(), trials);
    assert_eq!(shared.current_stimulus(), None);
}

#[test]
fn undetected_sweep_yields_sentinel_at_loudest_level() {
    let config = config(&[1000.0, 4000.0], &[0.0, 10.0, 20.0, 30.0]);
    let shared = Arc::new(SharedState::new());
    let timer = HighPrecisionTimer::new();
    let mut listener = ScriptedListener::new(&shared, &timer, |s: &Stimulus| {
        s.frequency_hz == 1000.0 && s.volume_db == 20.0
    });

    let mut sequencer = StimulusSequencer::new(Arc::clone(&shared), &mut listener, timer, &config);
    let trials: Vec<Trial> = run_all(&mut sequencer, &config, 0)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(trials.len(), 2);
    assert_eq!(trials[0].frequency_hz, 1000.0);
    assert_eq!(trials[0].threshold_db(), Some(20.0));

    assert_eq!(trials[1].frequency_hz, 4000.0);
    assert_eq!(trials[1].heard_at_ns, None);
    assert_eq!(trials[1].volume_db, 30.0);
    assert_eq!(trials[1].threshold_db(), None);

    // Sentinels are never written to the detection log.
    assert_eq!(shared.trial_log().len(), 1);
}

#[test]
fn repeat_runs_each_frequency_back_to_back() {
    let mut config = config(&[500.0, 2000.0], &[0.0, 10.0]);
    config.repeat = 3;
    let shared = Arc::new(SharedState::new());
    let timer = HighPrecisionTimer::new();
    let mut listener = ScriptedListener::new(&shared, &timer, |s: &Stimulus| s.volume_db == 10.0);

    let mut sequencer = StimulusSequencer::new(Arc::clone(&shared), &mut listener, timer, &config);
    let freqs: Vec<f32> = run_all(&mut sequencer, &config, 0)
        .into_iter()
        .map(|r| r.unwrap().frequency_hz)
        .collect();
    assert_eq!(freqs, vec![500.0, 500.0, 500.0, 2000.0, 2000.0, 2000.0]);
    assert_eq!(config.sweep_count(), 6);
}

#[test]
fn pulses_repeat_each_level_until_heard() {
    let mut config = config(&[1000.0], &[0.0, 10.0]);
    config.pulses_per_level = 3;
    let shared = Arc::new(SharedState::new());
    let timer = HighPrecisionTimer::new();
    let mut presses = 0;
    // Heard on the second pulse of 10 dB.
    let mut listener = ScriptedListener::new(&shared, &timer, |s: &Stimulus| {
        if s.volume_db == 10.0 {
            presses += 1;
        }
        presses == 2
    });

    let mut sequencer = StimulusSequencer::new(Arc::clone(&shared), &mut listener, timer, &config);
    let results = run_all(&mut sequencer, &config, 0);
    drop(sequencer);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap().volume_db, 10.0);
    assert_eq!(listener.played.len(), 5);
}

#[test]
fn empty_candidates_play_nothing() {
    for (frequencies, volumes) in [(vec![], vec![0.0f32, 10.0]), (vec![1000.0f32], vec![])] {
        let config = config(&frequencies, &volumes);
        let shared = Arc::new(SharedState::new());
        let mut sink = MemorySink::new(44_100);
        sink.open().unwrap();

        let timer = HighPrecisionTimer::new();
        let mut sequencer = StimulusSequencer::new(Arc::clone(&shared), &mut sink, timer, &config);
        assert!(run_all(&mut sequencer, &config, 0).is_empty());
        drop(sequencer);
        assert!(sink.played.is_empty());
    }
}

#[test]
fn sink_failure_ends_the_sequence() {
    let config = config(&[250.0, 500.0], &[0.0, 10.0, 20.0]);
    let shared = Arc::new(SharedState::new());
    let mut sink = MemorySink::new(44_100).failing_after(4);
    sink.open().unwrap();

    let timer = HighPrecisionTimer::new();
    let mut sequencer = StimulusSequencer::new(Arc::clone(&shared), &mut sink, timer, &config);
    let mut rng = StdRng::seed_from_u64(0);
    let mut sweeps = sequencer.run(
        &config.frequencies_hz,
        &config.volumes_db,
        1,
        Order::Sequential,
        &mut rng,
    );

    let first = sweeps.next().unwrap().unwrap();
    assert_eq!(first.heard_at_ns, None);
    assert!(matches!(sweeps.next(), Some(Err(RunError::Sink(_)))));
    assert!(sweeps.next().is_none());
    assert!(sweeps.next().is_none());
    drop(sweeps);
    assert_eq!(shared.current_stimulus(), None);
}

#[test]
fn abort_stops_before_the_next_tone() {
    let config = config(&[125.0, 250.0, 500.0], &[0.0, 10.0]);
    let shared = Arc::new(SharedState::new());
    let timer = HighPrecisionTimer::new();
    let abort_handle = Arc::clone(&shared);
    let mut listener = ScriptedListener::new(&shared, &timer, move |s: &Stimulus| {
        if s.frequency_hz == 250.0 {
            abort_handle.request_abort();
            return false;
        }
        true
    });

    let mut sequencer = StimulusSequencer::new(Arc::clone(&shared), &mut listener, timer, &config);
    let results = run_all(&mut sequencer, &config, 0);
    drop(sequencer);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().frequency_hz, 125.0);
    assert!(matches!(results[1], Err(RunError::Aborted)));
    assert_eq!(listener.played.len(), 2);
}

#[test]
fn shuffled_order_keeps_every_frequency() {
    let mut config = config(&[125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0], &[0.0]);
    config.order = Order::Shuffled;
    config.repeat = 2;
    let shared = Arc::new(SharedState::new());
    let timer = HighPrecisionTimer::new();
    let mut listener = ScriptedListener::new(&shared, &timer, |_: &Stimulus| true);

    let mut sequencer = StimulusSequencer::new(Arc::clone(&shared), &mut listener, timer, &config);
    let mut freqs: Vec<f32> = run_all(&mut sequencer, &config, 99)
        .into_iter()
        .map(|r| r.unwrap().frequency_hz)
        .collect();
    freqs.sort_by(f32::total_cmp);
    let mut expected: Vec<f32> = config
        .frequencies_hz
        .iter()
        .flat_map(|&f| [f, f])
        .collect();
    expected.sort_by(f32::total_cmp);
    assert_eq!(freqs, expected);
}

/// Sends a key press on the listener's behalf and waits for the collector
/// thread to register it before the tone "ends".
struct ThreadedListener {
    shared: Arc<SharedState>,
    tx: Sender<InputEvent>,
    threshold_db: f32,
}

impl AudioSink for ThreadedListener {
    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn play(&mut self, _buffer: &PcmBuffer) -> Result<(), SinkError> {
        let Some(stimulus) = self.shared.current_stimulus() else {
            return Ok(());
        };
        if stimulus.volume_db >= self.threshold_db {
            self.tx.send(InputEvent::Detect).expect("collector is running");
            let deadline = Instant::now() + Duration::from_secs(2);
            while !self.shared.is_detected() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(())
    }
}

#[test]
fn collector_thread_records_detections() {
    let config = config(&[500.0, 1000.0, 2000.0], &[0.0, 10.0, 20.0, 30.0]);
    let shared = Arc::new(SharedState::new());
    let timer = HighPrecisionTimer::new();
    let (tx, source) = ChannelSource::new();
    let collector = ResponseCollector::start(Arc::clone(&shared), source, timer.clone()).unwrap();

    // A stray press before any tone is discarded.
    tx.send(InputEvent::Detect).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let listener = ThreadedListener {
        shared: Arc::clone(&shared),
        tx: tx.clone(),
        threshold_db: 20.0,
    };
    let mut sequencer = StimulusSequencer::new(Arc::clone(&shared), listener, timer, &config);
    let trials: Vec<Trial> = run_all(&mut sequencer, &config, 0)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    let stats = collector.stop().unwrap();
    assert_eq!(trials.len(), 3);
    assert!(trials.iter().all(|t| t.threshold_db() == Some(20.0)));
    assert!(trials.iter().all(|t| t.heard_at_ns >= Some(t.played_at_ns)));
    assert_eq!(stats.recorded, 3);
    assert_eq!(stats.discarded, 1);
    assert_eq!(shared.trial_log().len(), 3);
}

/// Presses once for the tone at `press_at_db`, from inside the sequencer's
/// own window check, after the detected flag was last polled.
#[derive(Clone)]
struct LatePressTimer {
    inner: HighPrecisionTimer,
    shared: Arc<SharedState>,
    press_at_db: f32,
    pressed: Arc<AtomicBool>,
}

impl LatePressTimer {
    fn new(shared: &Arc<SharedState>, press_at_db: f32) -> Self {
        Self {
            inner: HighPrecisionTimer::new(),
            shared: Arc::clone(shared),
            press_at_db,
            pressed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Timer for LatePressTimer {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.inner.now()
    }

    fn elapsed(&self, ts: u64) -> Duration {
        let due = self
            .shared
            .current_stimulus()
            .is_some_and(|s| s.volume_db == self.press_at_db);
        if due && !self.pressed.swap(true, Ordering::AcqRel) {
            self.shared.correlate(|| self.inner.now());
        }
        self.inner.elapsed(ts)
    }

    fn sleep(&self, d: Duration) {
        self.inner.sleep(d)
    }

    fn record_playback(&mut self, nominal: Duration, actual: Duration) {
        self.inner.record_playback(nominal, actual)
    }

    fn playback_stats(&self) -> PlaybackStats {
        self.inner.playback_stats()
    }
}

fn run_with_late_press(press_at_db: f32) -> (Vec<Trial>, Vec<f32>, Arc<SharedState>) {
    let config = config(&[1000.0], &[0.0, 10.0, 20.0]);
    let shared = Arc::new(SharedState::new());
    let timer = LatePressTimer::new(&shared, press_at_db);
    let mut listener = ScriptedListener::new(&shared, &timer.inner, |_: &Stimulus| false);

    let mut sequencer = StimulusSequencer::new(Arc::clone(&shared), &mut listener, timer, &config);
    let mut rng = StdRng::seed_from_u64(0);
    let trials: Vec<Trial> = sequencer
        .run(&config.frequencies_hz, &config.volumes_db, 1, config.order, &mut rng)
        .collect::<Result<_, _>>()
        .unwrap();
    drop(sequencer);
    let played = listener.played.iter().map(|s| s.volume_db).collect();
    (trials, played, shared)
}

#[test]
fn press_after_window_closes_stops_before_louder_tone() {
    let (trials, played, shared) = run_with_late_press(0.0);
    assert_eq!(played, vec![0.0]);
    assert_eq!(trials.len(), 1);
    assert_eq!(trials[0].threshold_db(), Some(0.0));
    assert_eq!(shared.trial_log(), trials);
}

#[test]
fn press_after_loudest_tone_is_a_detection() {
    let (trials, played, shared) = run_with_late_press(20.0);
    assert_eq!(played, vec![0.0, 10.0, 20.0]);
    assert_eq!(trials.len(), 1);
    assert_eq!(trials[0].volume_db, 20.0);
    assert!(trials[0].heard_at_ns.is_some());
    assert_eq!(shared.trial_log(), trials);
}

/// Presses `delay` after the tone at `press_at_db` returns from playback.
struct DelayedPress {
    shared: Arc<SharedState>,
    tx: Sender<InputEvent>,
    press_at_db: f32,
    delay: Duration,
    played: Vec<f32>,
}

impl AudioSink for DelayedPress {
    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn play(&mut self, _buffer: &PcmBuffer) -> Result<(), SinkError> {
        let Some(stimulus) = self.shared.current_stimulus() else {
            return Ok(());
        };
        self.played.push(stimulus.volume_db);
        if stimulus.volume_db == self.press_at_db {
            let tx = self.tx.clone();
            let delay = self.delay;
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                tx.send(InputEvent::Detect).ok();
            });
        }
        Ok(())
    }
}

#[test]
fn press_inside_widened_window_is_attributed_to_that_tone() {
    let mut config = config(&[1000.0], &[0.0, 10.0, 20.0]);
    config.response_window_ms = 30;
    let shared = Arc::new(SharedState::new());
    let timer = HighPrecisionTimer::new();
    let (tx, source) = ChannelSource::new();
    let collector = ResponseCollector::start(Arc::clone(&shared), source, timer.clone()).unwrap();

    // Lands after the configured 30 ms but inside the widened window.
    let mut listener = DelayedPress {
        shared: Arc::clone(&shared),
        tx,
        press_at_db: 10.0,
        delay: Duration::from_millis(60),
        played: Vec::new(),
    };
    let mut sequencer = StimulusSequencer::new(Arc::clone(&shared), &mut listener, timer, &config)
        .with_extra_window(Duration::from_millis(170));
    let trials: Vec<Trial> = run_all(&mut sequencer, &config, 0)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    drop(sequencer);

    let stats = collector.stop().unwrap();
    assert_eq!(trials.len(), 1);
    assert_eq!(trials[0].threshold_db(), Some(10.0));
    assert_eq!(listener.played, vec![0.0, 10.0]);
    assert_eq!(stats.recorded, 1);
}
