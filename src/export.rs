use anyhow::{Context, Result, bail};
use audiometer_core::{Ear, Trial};
use audiometer_experiment::SessionReport;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn sink(&self) -> Box<dyn ResultSink> {
        match self {
            ExportFormat::Json => Box::new(JsonSink),
            ExportFormat::Csv => Box::new(CsvSink),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("unknown format '{}', expected json or csv", other),
        }
    }
}

/// Writes a finished session somewhere.
pub trait ResultSink {
    fn write(&self, report: &SessionReport, path: &Path) -> Result<()>;
}

/// The whole report, pretty-printed.
pub struct JsonSink;

impl ResultSink for JsonSink {
    fn write(&self, report: &SessionReport, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), report)?;
        Ok(())
    }
}

/// One row per sweep outcome. Undetected sweeps leave `heard_at_ns` empty.
pub struct CsvSink;

#[derive(Serialize)]
struct TrialRow {
    ear: Ear,
    sweep: usize,
    frequency_hz: f32,
    volume_db: f32,
    played_at_ns: u64,
    heard_at_ns: Option<u64>,
    reaction_ms: Option<f64>,
}

impl TrialRow {
    fn new(ear: Ear, trial: &Trial) -> Self {
        Self {
            ear,
            sweep: trial.sweep,
            frequency_hz: trial.frequency_hz,
            volume_db: trial.volume_db,
            played_at_ns: trial.played_at_ns,
            heard_at_ns: trial.heard_at_ns,
            reaction_ms: trial.reaction_time_ms(),
        }
    }
}

impl ResultSink for CsvSink {
    fn write(&self, report: &SessionReport, path: &Path) -> Result<()> {
        let mut writer =
            csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
        for trial in &report.trials {
            writer.serialize(TrialRow::new(report.ear, trial))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// `results_{ear}_{YYYYmmddHHMMSS}.{ext}` under `dir`.
pub fn results_path(dir: &Path, report: &SessionReport, format: ExportFormat) -> PathBuf {
    dir.join(format!(
        "results_{}_{}.{}",
        report.ear,
        report.started_at.format("%Y%m%d%H%M%S"),
        format.extension()
    ))
}

pub fn export(report: &SessionReport, dir: &Path, format: ExportFormat) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = results_path(dir, report, format);
    format.sink().write(report, &path)?;
    log::info!("Results written to {}", path.display());
    Ok(path)
}
