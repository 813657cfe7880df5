//! Blocking playback on the default output device.
//!
//! The cpal callback pulls interleaved samples from a shared queue. `play`
//! pushes a whole tone into the queue and waits on a condition variable until
//! the callback has drained it, which gives the caller the synchronous write
//! semantics the sequencer expects.

use crate::sink::{AudioSink, SinkError};
use crate::synth::{PcmBuffer, SAMPLE_RATE};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig,
    SupportedStreamConfigRange,
};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Grace period on top of the tone length before a write counts as stalled.
const STALL_GRACE: Duration = Duration::from_secs(2);

#[derive(Default)]
struct PlaybackQueue {
    samples: VecDeque<f32>,
    error: Option<String>,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<PlaybackQueue>,
    drained: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PlaybackQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct CpalSink {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    shared: Arc<Shared>,
}

impl CpalSink {
    /// Selects the default output device, preferring a 44.1 kHz float config.
    pub fn new() -> Result<Self, SinkError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SinkError::DeviceUnavailable("no default output device".into()))?;

        let name = device.name().unwrap_or_else(|_| "unknown".into());
        log::info!("Using audio output device: {}", name);

        let supported = device
            .supported_output_configs()
            .map(|configs| configs.collect::<Vec<_>>())
            .unwrap_or_default();

        let (config, sample_format) = match find_supported_config(supported, SAMPLE_RATE) {
            Some(range) => {
                let config = range.with_sample_rate(cpal::SampleRate(SAMPLE_RATE));
                (config.config(), config.sample_format())
            }
            None => {
                let config = device
                    .default_output_config()
                    .map_err(|e| SinkError::DeviceUnavailable(e.to_string()))?;
                log::warn!(
                    "No {} Hz float output config; falling back to {:?}",
                    SAMPLE_RATE,
                    config
                );
                (config.config(), config.sample_format())
            }
        };

        log::info!(
            "Output config: {} Hz, {} channel(s), {:?}",
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            shared: Arc::new(Shared::default()),
        })
    }

    fn make_stream<T>(&self) -> Result<Stream, SinkError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let data_shared = Arc::clone(&self.shared);
        let err_shared = Arc::clone(&self.shared);

        self.device
            .build_output_stream(
                &self.config,
                move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut queue = data_shared.lock();
                    for sample in output.iter_mut() {
                        *sample = T::from_sample(queue.samples.pop_front().unwrap_or(0.0));
                    }
                    if queue.samples.is_empty() {
                        data_shared.drained.notify_all();
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                    err_shared.lock().error = Some(err.to_string());
                    err_shared.drained.notify_all();
                },
                None,
            )
            .map_err(|e| SinkError::Stream(e.to_string()))
    }

    /// Converts a buffer to the device channel layout.
    fn interleave(&self, buffer: &PcmBuffer) -> Vec<f32> {
        let out_channels = self.config.channels.max(1) as usize;
        let in_channels = buffer.channels.max(1) as usize;
        let mut out = Vec::with_capacity(buffer.frames() * out_channels);
        for frame in buffer.samples.chunks(in_channels) {
            match (in_channels, out_channels) {
                (_, 1) => out.push(frame.iter().sum::<f32>() / in_channels as f32),
                (1, n) => out.extend(std::iter::repeat_n(frame[0], n)),
                (_, n) => out.extend((0..n).map(|c| frame.get(c).copied().unwrap_or(0.0))),
            }
        }
        out
    }
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn open(&mut self) -> Result<(), SinkError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = match self.sample_format {
            SampleFormat::I8 => self.make_stream::<i8>()?,
            SampleFormat::I16 => self.make_stream::<i16>()?,
            SampleFormat::I32 => self.make_stream::<i32>()?,
            SampleFormat::I64 => self.make_stream::<i64>()?,
            SampleFormat::U8 => self.make_stream::<u8>()?,
            SampleFormat::U16 => self.make_stream::<u16>()?,
            SampleFormat::U32 => self.make_stream::<u32>()?,
            SampleFormat::U64 => self.make_stream::<u64>()?,
            SampleFormat::F32 => self.make_stream::<f32>()?,
            SampleFormat::F64 => self.make_stream::<f64>()?,
            other => {
                return Err(SinkError::Stream(format!(
                    "unsupported sample format '{}'",
                    other
                )));
            }
        };
        stream
            .play()
            .map_err(|e| SinkError::Stream(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn play(&mut self, buffer: &PcmBuffer) -> Result<(), SinkError> {
        if self.stream.is_none() {
            return Err(SinkError::NotOpen);
        }
        if buffer.sample_rate != self.sample_rate() {
            return Err(SinkError::SampleRate {
                expected: self.sample_rate(),
                actual: buffer.sample_rate,
            });
        }

        let samples = self.interleave(buffer);
        let deadline = buffer.duration() + STALL_GRACE;

        let mut queue = self.shared.lock();
        if let Some(err) = queue.error.take() {
            return Err(SinkError::Stream(err));
        }
        queue.samples.extend(samples);

        let (mut queue, timeout) = self
            .shared
            .drained
            .wait_timeout_while(queue, deadline, |q| {
                !q.samples.is_empty() && q.error.is_none()
            })
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(err) = queue.error.take() {
            queue.samples.clear();
            return Err(SinkError::Stream(err));
        }
        if timeout.timed_out() {
            queue.samples.clear();
            return Err(SinkError::Stream("playback stalled".into()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| SinkError::Stream(e.to_string()))?;
        }
        self.shared.lock().samples.clear();
        Ok(())
    }
}

/// Finds a float output config whose rate range contains `target_rate`,
/// preferring stereo so ear routing survives.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| (c.channels() as i32 - 2).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{ChannelCount, SampleRate, SupportedBufferSize};

    fn range(
        channels: ChannelCount,
        min: u32,
        max: u32,
        format: SampleFormat,
    ) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn test_prefers_stereo_float_at_target_rate() {
        let configs = vec![
            range(1, 8_000, 96_000, SampleFormat::F32),
            range(2, 8_000, 96_000, SampleFormat::I16),
            range(2, 48_000, 48_000, SampleFormat::F32),
            range(2, 44_100, 48_000, SampleFormat::F32),
            range(6, 8_000, 96_000, SampleFormat::F32),
        ];
        let chosen = find_supported_config(configs, 44_100).unwrap();
        assert_eq!(chosen.channels(), 2);
        assert_eq!(chosen.sample_format(), SampleFormat::F32);
        assert_eq!(chosen.min_sample_rate(), SampleRate(44_100));
    }

    #[test]
    fn test_falls_back_to_nearest_channel_count() {
        let configs = vec![
            range(8, 8_000, 96_000, SampleFormat::F32),
            range(1, 8_000, 96_000, SampleFormat::F32),
        ];
        let chosen = find_supported_config(configs, 44_100).unwrap();
        assert_eq!(chosen.channels(), 1);
    }

    #[test]
    fn test_no_float_config_at_rate() {
        let configs = vec![
            range(2, 8_000, 96_000, SampleFormat::I16),
            range(2, 48_000, 96_000, SampleFormat::F32),
        ];
        assert!(find_supported_config(configs, 44_100).is_none());
        assert!(find_supported_config(Vec::new(), 44_100).is_none());
    }
}
