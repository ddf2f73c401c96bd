//! # First Sounds
//!
//! Compile a block workspace, schedule an arpeggio, and render the
//! result to a WAV file. Fully headless: no audio device required.
//!
//! **Concepts:** Engine setup, workspace JSON, offline rendering
//!
//! ```bash
//! cargo run --example first_sounds
//! ```

use bloco::prelude::*;
use std::path::Path;

fn main() -> bloco::Result<()> {
    tracing_subscriber::fmt::init();

    let engine = BlocoEngine::builder().sample_rate(44_100.0).build()?;

    // A chime instrument with a soft envelope and a master reverb, the
    // way the editor would serialize them.
    let workspace = serde_json::json!({
        "blocks": [
            {
                "id": "d1",
                "type": "define_instrument",
                "name": "chime",
                "instrument": { "kind": "oscillator", "wave": "sine" },
                "envelope": { "attack": 0.01, "decay": 0.3, "sustain": 0.4, "release": 0.8 }
            },
            {
                "id": "s1",
                "type": "master_setup",
                "volume": 0.8,
                "effects": [{
                    "kind": { "effect": "reverb", "room_size": 20.0, "time": 3.0 },
                    "target": "master",
                    "wet": 0.3
                }]
            }
        ]
    })
    .to_string();

    let program = engine.load_program(&workspace)?;
    println!("Compiled program:\n{}\n", program.code);

    let run = engine.run(&program);
    while run.is_running() && !engine.system().instruments().has_instrument("chime") {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    // Schedule a rising arpeggio into the render timeline.
    let instruments = engine.system().instruments();
    for (index, midi) in [60u8, 64, 67, 72].into_iter().enumerate() {
        instruments.trigger("chime", midi, 0.8, index as f64 * 0.4, Some(0.8))?;
    }

    println!("Rendering 3 seconds...");
    let wave = engine.render_offline(3.0);
    save_wav(&wave, Path::new("first_sounds.wav"));
    println!(
        "Wrote first_sounds.wav: {:.1}s at {} Hz, peak {:.3}",
        wave.duration(),
        wave.sample_rate(),
        wave.amplitude()
    );

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
