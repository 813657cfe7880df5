use crate::export::ExportFormat;
use anyhow::{Context, Result};
use audiometer_core::Ear;
use audiometer_experiment::{Order, TestConfig};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use std::path::PathBuf;

/// Everything `main` needs: the test itself plus where the results go.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: TestConfig,
    /// One session per entry, in order.
    pub ears: Vec<Ear>,
    pub format: ExportFormat,
    pub output_dir: PathBuf,
    /// Render to this WAV file instead of the audio device.
    pub bounce: Option<PathBuf>,
}

pub fn command() -> Command {
    Command::new("audiometer")
        .about("Self-administered pure-tone hearing test")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("JSON file with test settings; flags below override it"),
        )
        .arg(
            Arg::new("repeat")
                .short('r')
                .long("repeat")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Number of sweeps per frequency"),
        )
        .arg(
            Arg::new("order")
                .long("order")
                .value_name("ORDER")
                .value_parser(["sequential", "shuffled"])
                .help("Frequency order"),
        )
        .arg(
            Arg::new("ear")
                .long("ear")
                .value_name("EAR")
                .value_parser(["left", "right", "both"])
                .action(ArgAction::Append)
                .help("Ear to test; repeat the flag to test several in turn"),
        )
        .arg(
            Arg::new("frequencies")
                .long("frequencies")
                .value_name("HZ,...")
                .value_delimiter(',')
                .value_parser(value_parser!(f32))
                .help("Comma-separated test frequencies in Hz"),
        )
        .arg(
            Arg::new("volumes")
                .long("volumes")
                .value_name("DB,...")
                .value_delimiter(',')
                .value_parser(value_parser!(f32))
                .help("Comma-separated ascending levels in dB"),
        )
        .arg(
            Arg::new("pulses")
                .long("pulses")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Tones played per level before moving up"),
        )
        .arg(
            Arg::new("response-window-ms")
                .long("response-window-ms")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .help("Extra time to answer after each tone"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .value_parser(value_parser!(u64))
                .help("Seed for the shuffled order"),
        )
        .arg(
            Arg::new("no-greeting")
                .long("no-greeting")
                .action(ArgAction::SetTrue)
                .help("Skip the opening and closing chimes"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("FORMAT")
                .value_parser(["json", "csv"])
                .default_value("json")
                .help("Result file format"),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .default_value(".")
                .help("Directory for result files"),
        )
        .arg(
            Arg::new("bounce")
                .long("bounce")
                .value_name("WAV")
                .value_parser(value_parser!(PathBuf))
                .help("Write the audio to a WAV file instead of playing it"),
        )
}

impl Settings {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let mut config = match matches.get_one::<PathBuf>("config") {
            Some(path) => TestConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => TestConfig::default(),
        };

        if let Some(&repeat) = matches.get_one::<usize>("repeat") {
            config.repeat = repeat;
        }
        if let Some(order) = matches.get_one::<String>("order") {
            config.order = order.parse::<Order>()?;
        }
        if let Some(frequencies) = matches.get_many::<f32>("frequencies") {
            config.frequencies_hz = frequencies.copied().collect();
        }
        if let Some(volumes) = matches.get_many::<f32>("volumes") {
            config.volumes_db = volumes.copied().collect();
        }
        if let Some(&pulses) = matches.get_one::<usize>("pulses") {
            config.pulses_per_level = pulses;
        }
        if let Some(&window) = matches.get_one::<u64>("response-window-ms") {
            config.response_window_ms = window;
        }
        if let Some(&seed) = matches.get_one::<u64>("seed") {
            config.seed = Some(seed);
        }
        if matches.get_flag("no-greeting") {
            config.greeting = false;
        }
        config.validate()?;

        let ears = match matches.get_many::<String>("ear") {
            Some(values) => values
                .map(|v| v.parse::<Ear>())
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![config.ear],
        };

        let format = matches
            .get_one::<String>("format")
            .map(|f| f.parse::<ExportFormat>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            config,
            ears,
            format,
            output_dir: matches
                .get_one::<PathBuf>("output-dir")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(".")),
            bounce: matches.get_one::<PathBuf>("bounce").cloned(),
        })
    }
}
