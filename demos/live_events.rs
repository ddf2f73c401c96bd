//! # Live Events
//!
//! Register event handlers from a workspace and drive them from the
//! terminal: keystrokes become key events, note names become serial
//! lines. With the `audio-io` feature the engine also streams to the
//! default output device.
//!
//! **Concepts:** Event handlers, key and serial dispatch, reset
//!
//! ```bash
//! cargo run --example live_events --features audio-io
//! ```

use bloco::prelude::*;
use std::io::{self, Write};

const PROGRAM: &str = r#"{
    "blocks": [
        {
            "id": "setup",
            "type": "define_instrument",
            "name": "lead",
            "instrument": { "kind": "oscillator", "wave": "triangle" },
            "envelope": { "attack": 0.01, "decay": 0.2, "sustain": 0.5, "release": 0.4 }
        }
    ]
}"#;

const HANDLERS: &str = r#"{
    "blocks": [
        {
            "id": "h_key",
            "type": "on_key",
            "key": "Space",
            "trigger": "press",
            "body": [{
                "id": "h_key_body",
                "type": "play_note",
                "note": "c4",
                "beats": 1.0,
                "instrument": "lead"
            }]
        },
        {
            "id": "h_serial",
            "type": "on_serial",
            "body": [{
                "id": "h_serial_body",
                "type": "play_note",
                "note": { "var": "line" },
                "beats": 1.0,
                "instrument": "lead"
            }]
        }
    ]
}"#;

fn main() -> bloco::Result<()> {
    tracing_subscriber::fmt::init();

    let engine = BlocoEngine::builder().build()?;

    #[cfg(feature = "audio-io")]
    engine.start_output()?;

    let program = engine.load_program(PROGRAM)?;
    engine.run(&program);

    let hats = BlockForest::from_json(HANDLERS)?;
    let registered = engine.register_handlers(&hats);
    println!("Registered {} handlers", registered);
    println!("k=space key, note name (c4, f#3, ...)=serial line, r=reset, q=quit");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        match input.trim() {
            "" => continue,
            "q" => break,
            "k" => engine.registry().dispatch_key("Space", KeyTrigger::Press),
            "r" => {
                engine.reset();
                engine.run(&program);
                println!("reset (handlers kept)");
            }
            line => engine.registry().dispatch_serial(line),
        }

        std::thread::sleep(std::time::Duration::from_millis(50));
        println!(
            "lead voices: {}",
            engine.system().instruments().active_voice_count("lead")
        );
    }

    Ok(())
}
