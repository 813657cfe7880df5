use crate::synth::PcmBuffer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("audio sink is not open")]
    NotOpen,

    #[error("buffer is {actual} Hz but the sink runs at {expected} Hz")]
    SampleRate { expected: u32, actual: u32 },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// Destination for synthesized tones.
///
/// `play` blocks until the buffer has been handed to the output in full, so the
/// caller can treat its return as the end of the tone.
pub trait AudioSink {
    fn sample_rate(&self) -> u32;

    fn open(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn play(&mut self, buffer: &PcmBuffer) -> Result<(), SinkError>;

    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
    fn open(&mut self) -> Result<(), SinkError> {
        (**self).open()
    }
    fn play(&mut self, buffer: &PcmBuffer) -> Result<(), SinkError> {
        (**self).play(buffer)
    }
    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}

impl<S: AudioSink + ?Sized> AudioSink for &mut S {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
    fn open(&mut self) -> Result<(), SinkError> {
        (**self).open()
    }
    fn play(&mut self, buffer: &PcmBuffer) -> Result<(), SinkError> {
        (**self).play(buffer)
    }
    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}

/// Keeps every played buffer. Returns immediately from `play`.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub sample_rate: u32,
    pub played: Vec<PcmBuffer>,
    is_open: bool,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
    }

    /// Makes every `play` after the first `count` fail as if the device vanished.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }
}

impl AudioSink for MemorySink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&mut self) -> Result<(), SinkError> {
        self.is_open = true;
        Ok(())
    }

    fn play(&mut self, buffer: &PcmBuffer) -> Result<(), SinkError> {
        if !self.is_open {
            return Err(SinkError::NotOpen);
        }
        if buffer.sample_rate != self.sample_rate {
            return Err(SinkError::SampleRate {
                expected: self.sample_rate,
                actual: buffer.sample_rate,
            });
        }
        if self.fail_after.is_some_and(|n| self.played.len() >= n) {
            return Err(SinkError::DeviceUnavailable("device disconnected".into()));
        }
        self.played.push(buffer.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.is_open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::SAMPLE_RATE;

    fn buffer() -> PcmBuffer {
        PcmBuffer::mono(SAMPLE_RATE, vec![0.0; 16])
    }

    #[test]
    fn test_memory_sink_requires_open() {
        let mut sink = MemorySink::new(SAMPLE_RATE);
        assert!(matches!(sink.play(&buffer()), Err(SinkError::NotOpen)));
        sink.open().unwrap();
        sink.play(&buffer()).unwrap();
        sink.close().unwrap();
        assert!(!sink.is_open());
        assert_eq!(sink.played.len(), 1);
    }

    #[test]
    fn test_memory_sink_rejects_wrong_rate() {
        let mut sink = MemorySink::new(48_000);
        sink.open().unwrap();
        let err = sink.play(&buffer()).unwrap_err();
        assert!(matches!(
            err,
            SinkError::SampleRate {
                expected: 48_000,
                actual: SAMPLE_RATE
            }
        ));
    }

    #[test]
    fn test_memory_sink_simulated_failure() {
        let mut sink = MemorySink::new(SAMPLE_RATE).failing_after(2);
        sink.open().unwrap();
        sink.play(&buffer()).unwrap();
        sink.play(&buffer()).unwrap();
        assert!(matches!(
            sink.play(&buffer()),
            Err(SinkError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_boxed_sink_forwards() {
        let mut sink: Box<dyn AudioSink> = Box::new(MemorySink::new(SAMPLE_RATE));
        assert_eq!(sink.sample_rate(), SAMPLE_RATE);
        sink.open().unwrap();
        sink.play(&buffer()).unwrap();
    }
}
