use audiometer_core::Tone;
use std::time::Duration;

/// C4, E4, G4.
const NOTES_HZ: [f32; 3] = [261.0, 329.0, 391.0];
const NOTE_MS: [u64; 3] = [200, 200, 500];

pub const CHIME_AMPLITUDE: f32 = 0.5;

/// The three-note greeting. Opening climbs, closing descends; the last note is
/// held longer either way.
pub fn chime(opening: bool) -> Vec<Tone> {
    let notes: Vec<f32> = if opening {
        NOTES_HZ.to_vec()
    } else {
        NOTES_HZ.iter().rev().copied().collect()
    };
    notes
        .into_iter()
        .zip(NOTE_MS)
        .map(|(frequency_hz, ms)| Tone::Chime {
            frequency_hz,
            amplitude: CHIME_AMPLITUDE,
            duration: Duration::from_millis(ms),
        })
        .collect()
}
