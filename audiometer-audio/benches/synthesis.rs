use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pprof::criterion::{Output, PProfProfiler};
use std::time::Duration;

use audiometer_audio::{SAMPLE_RATE, Synthesizer};
use audiometer_core::{Ear, Tone};

/// Benchmarks rendering of a 500 ms test tone across the audiometric frequencies.
pub fn bench_render_pure(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_pure");

    group
        .sample_size(50)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(2));

    let synth = Synthesizer::new(SAMPLE_RATE, 90.0, Ear::Left);
    for frequency_hz in [125.0f32, 1000.0, 8000.0] {
        let tone = Tone::Pure {
            frequency_hz,
            volume_db: 40.0,
            duration: Duration::from_millis(500),
        };
        group.bench_with_input(
            BenchmarkId::from_parameter(frequency_hz as u32),
            &tone,
            |b, tone| b.iter(|| black_box(synth.render(black_box(tone)))),
        );
    }

    group.finish();
}

/// Benchmarks the full opening chime.
pub fn bench_render_chime(c: &mut Criterion) {
    let synth = Synthesizer::default();
    let tones = audiometer_audio::chime(true);
    c.bench_function("render_chime", |b| {
        b.iter(|| {
            for tone in &tones {
                black_box(synth.render(black_box(tone)));
            }
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
        .confidence_level(0.95)
        .noise_threshold(0.02)
        .significance_level(0.05);
    targets = bench_render_pure, bench_render_chime
}

criterion_main!(benches);
