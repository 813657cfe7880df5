use crate::sink::{AudioSink, SinkError};
use crate::synth::PcmBuffer;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Bounces every tone into a stereo float WAV file instead of a device.
pub struct WavSink {
    path: PathBuf,
    sample_rate: u32,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames_written: usize,
}

impl WavSink {
    pub fn new(path: impl AsRef<Path>, sample_rate: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sample_rate,
            writer: None,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }
}

impl AudioSink for WavSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&mut self) -> Result<(), SinkError> {
        if self.writer.is_some() {
            return Ok(());
        }
        let spec = WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        self.writer = Some(WavWriter::create(&self.path, spec)?);
        log::info!("Bouncing audio to {}", self.path.display());
        Ok(())
    }

    fn play(&mut self, buffer: &PcmBuffer) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::NotOpen)?;
        if buffer.sample_rate != self.sample_rate {
            return Err(SinkError::SampleRate {
                expected: self.sample_rate,
                actual: buffer.sample_rate,
            });
        }
        let channels = buffer.channels.max(1) as usize;
        for frame in buffer.samples.chunks(channels) {
            let left = frame[0];
            let right = if channels == 1 { left } else { frame[1] };
            writer.write_sample(left)?;
            writer.write_sample(right)?;
        }
        self.frames_written += buffer.frames();
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}
