pub mod chime;
#[cfg(feature = "native")]
pub mod cpal_sink;
pub mod sink;
pub mod synth;
pub mod wav_sink;

pub use chime::{CHIME_AMPLITUDE, chime};
#[cfg(feature = "native")]
pub use cpal_sink::CpalSink;
pub use sink::{AudioSink, MemorySink, SinkError};
pub use synth::{PcmBuffer, SAMPLE_RATE, Synthesizer, db_to_amplitude, sine};
pub use wav_sink::WavSink;
