//! # Drum Patterns
//!
//! Schedule sixteen-step drum rows across two measures and render them
//! to a WAV file. Each row targets one of the built-in drum voices.
//!
//! **Concepts:** Step patterns, the drum machine, transport timing
//!
//! ```bash
//! cargo run --example drum_patterns
//! ```

use bloco::prelude::*;
use std::path::Path;

const MEASURES: usize = 2;

fn main() -> bloco::Result<()> {
    tracing_subscriber::fmt::init();

    let engine = BlocoEngine::builder()
        .sample_rate(44_100.0)
        .tempo(110.0)
        .build()?;

    // One row per drum voice, one character per sixteenth note.
    let rows = [
        ("kick", "x---x---x---x---"),
        ("snare", "----x-------x---"),
        ("closed_hat", "x-x-x-x-x-x-x-x-"),
    ];

    println!("Pattern ({} BPM):", 110);
    for (source, row) in rows {
        println!("  {:<10} {}", source, row);
    }

    let sequencer = engine.system().sequencer();
    let measure = engine.system().transport().measure_seconds();
    let mut scheduled = 0;
    for index in 0..MEASURES {
        let start = index as f64 * measure;
        for (source, row) in rows {
            let tokens: Vec<String> = row.chars().map(|c| c.to_string()).collect();
            scheduled += sequencer.play_rhythm_step(source, &tokens, start, index, false);
        }
    }
    println!("\nScheduled {} hits over {} measures", scheduled, MEASURES);

    let length = MEASURES as f64 * measure + 0.5;
    println!("Rendering {:.2} seconds...", length);
    let wave = engine.render_offline(length);
    save_wav(&wave, Path::new("drum_patterns.wav"));
    println!("Wrote drum_patterns.wav, peak {:.3}", wave.amplitude());

    Ok(())
}

fn save_wav(wave: &Wave, path: &Path) {
    let spec = hound::WavSpec {
        channels: wave.channels() as u16,
        sample_rate: wave.sample_rate() as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create WAV");
    for index in 0..wave.len() {
        for channel in 0..wave.channels() {
            let sample = wave.at(channel, index).clamp(-1.0, 1.0);
            writer
                .write_sample((sample * 32767.0).round() as i16)
                .expect("write sample");
        }
    }
    writer.finalize().expect("finalize WAV");
}
