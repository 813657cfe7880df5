use crate::cli::Settings;
use crate::export;
use crate::input::KeyboardSource;
use anyhow::Result;
use audiometer_audio::{AudioSink, WavSink};
use audiometer_core::{Ear, StandardPhase, Trial};
use audiometer_experiment::{
    ChannelSource, HearingTest, InputSource, SessionObserver, SessionReport, TestConfig, rng_for,
};
use audiometer_timing::HighPrecisionTimer;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct App {
    settings: Settings,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn run(self) -> Result<()> {
        println!("=== AUDIOMETER ===");
        println!("Platform: {}", std::env::consts::OS);
        println!("Architecture: {}", std::env::consts::ARCH);
        println!(
            "Testing: {}",
            self.settings
                .ears
                .iter()
                .map(Ear::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!("Wear headphones and keep the volume at a comfortable, fixed level.\n");

        let interactive = self.settings.bounce.is_none();
        for &ear in &self.settings.ears {
            let mut config = self.settings.config.clone();
            config.ear = ear;

            let report = self.run_ear(config, interactive)?;
            print_debrief(&report);
            export::export(&report, &self.settings.output_dir, self.settings.format)?;

            if report.aborted {
                println!("Test stopped early, skipping remaining ears.");
                break;
            }
        }

        println!("Thank you!");
        Ok(())
    }

    fn run_ear(&self, config: TestConfig, interactive: bool) -> Result<SessionReport> {
        let ear = config.ear;
        let rng = rng_for(&config);
        let sink = self.open_sink(&config)?;
        let mut test = HearingTest::new(config, HighPrecisionTimer::new(), rng)?;
        let mut observer = ConsoleObserver { interactive };

        let source: Box<dyn InputSource> = if interactive {
            Box::new(KeyboardSource::new())
        } else {
            // Headless: nobody is listening, every sweep runs to the loudest level.
            let (_, source) = ChannelSource::new();
            Box::new(source)
        };

        log::info!("Starting session for {} ear", ear);
        Ok(test.run(sink, source, &mut observer)?)
    }

    fn open_sink(&self, config: &TestConfig) -> Result<Box<dyn AudioSink>> {
        if let Some(path) = &self.settings.bounce {
            let path = bounce_path(path, config.ear, self.settings.ears.len() > 1);
            return Ok(Box::new(WavSink::new(path, config.sample_rate)));
        }
        device_sink()
    }
}

#[cfg(feature = "native")]
fn device_sink() -> Result<Box<dyn AudioSink>> {
    Ok(Box::new(audiometer_audio::CpalSink::new()?))
}

#[cfg(not(feature = "native"))]
fn device_sink() -> Result<Box<dyn AudioSink>> {
    anyhow::bail!("built without audio device support, use --bounce <wav>")
}

/// With several ears each one gets its own file: `out.wav` becomes `out_left.wav`.
fn bounce_path(path: &Path, ear: Ear, per_ear: bool) -> PathBuf {
    if !per_ear {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bounce".into());
    path.with_file_name(format!("{}_{}.wav", stem, ear))
}

/// Banners and progress on stdout. Lines start with `\r` because the
/// terminal is in raw mode while the sweeps run.
struct ConsoleObserver {
    interactive: bool,
}

impl SessionObserver for ConsoleObserver {
    fn on_phase(&mut self, phase: StandardPhase, config: &TestConfig) {
        match phase {
            StandardPhase::Welcome => {
                println!("--- {} ear ---", config.ear);
                println!(
                    "{} frequencies x {} levels, {} sweep(s) each.",
                    config.frequencies_hz.len(),
                    config.volumes_db.len(),
                    config.repeat
                );
                if self.interactive {
                    println!("Press ENTER to begin.");
                    let mut line = String::new();
                    if let Err(err) = std::io::stdin().read_line(&mut line) {
                        log::warn!("Could not read from stdin: {}", err);
                    }
                }
            }
            StandardPhase::Sweep => {
                println!(
                    "Press SPACE or ENTER as soon as you hear a tone. ESC or q stops the test."
                );
            }
            StandardPhase::Farewell => println!("\rAll tones played."),
            StandardPhase::Greeting | StandardPhase::Countdown | StandardPhase::Debrief => {}
        }
    }

    fn on_countdown(&mut self, remaining: Duration) {
        println!("Starting in {}...", remaining.as_secs_f32().ceil() as u64);
    }

    fn on_trial(&mut self, trial: &Trial, completed: usize, total: usize) {
        match trial.threshold_db() {
            Some(db) => println!(
                "\r[{}/{}] {} Hz: heard at {} dB",
                completed, total, trial.frequency_hz, db
            ),
            None => println!(
                "\r[{}/{}] {} Hz: not heard up to {} dB",
                completed, total, trial.frequency_hz, trial.volume_db
            ),
        }
    }
}

fn print_debrief(report: &SessionReport) {
    println!("\nResults ({} ear):", report.ear);
    println!("{:>10}  {:>10}  {}", "Frequency", "Threshold", "Hearing");
    for point in &report.audiogram.points {
        match (point.threshold_db, point.level) {
            (Some(db), Some(level)) => {
                println!("{:>7} Hz  {:>7.1} dB  {}", point.frequency_hz, db, level)
            }
            _ => println!("{:>7} Hz  {:>10}  Not detected", point.frequency_hz, "-"),
        }
    }

    let summary = &report.summary;
    println!(
        "Sweeps: {}, Response rate: {:.1}%",
        summary.sweeps,
        summary.response_rate * 100.0
    );
    if let (Some(mean), Some(min), Some(max)) = (
        summary.mean_reaction_ms,
        summary.min_reaction_ms,
        summary.max_reaction_ms,
    ) {
        println!(
            "Reaction times: mean {:.3} ms, min {:.3} ms, max {:.3} ms",
            mean, min, max
        );
    }
    if let Some(level) = report.audiogram.overall_level() {
        println!("Overall: {}", level);
    }
    if let Some(capacity) = report.audiogram.hearing_capacity_pct() {
        println!("Overall hearing capacity: {:.2}%", capacity);
    }
    println!("Test duration: {} s", report.duration().num_seconds());
}
