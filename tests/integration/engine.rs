//! Engine lifecycle integration tests.
//!
//! Engine creation, run/stop/reset cycles, and isolation between engine
//! instances, all through the public [`bloco::BlocoEngine`] surface.

use crate::helpers::{settle, test_engine, wait_until};
use bloco::prelude::*;
use std::time::Instant;

/// One sine instrument playing a long note, as the editor would send it.
fn lead_workspace() -> String {
    serde_json::json!({
        "blocks": [{
            "id": "d1",
            "type": "define_instrument",
            "name": "lead",
            "instrument": { "kind": "oscillator", "wave": "sine" },
            "next": {
                "id": "e1",
                "type": "play_note",
                "note": "c4",
                "beats": 4.0,
                "velocity": 0.8
            }
        }]
    })
    .to_string()
}

/// Builder settings land on the assembled system.
#[test]
fn test_builder_configures_the_system() {
    let engine = BlocoEngine::builder()
        .sample_rate(48_000.0)
        .tempo(100.0)
        .worker_threads(2)
        .build()
        .unwrap();

    assert_eq!(engine.system().sample_rate(), 48_000.0);
    assert_eq!(engine.system().transport().tempo(), 100.0);
}

/// Running a program returns immediately; the program plays on the
/// engine's own runtime.
#[test]
fn test_run_does_not_block_the_caller() {
    let engine = test_engine();
    let started = Instant::now();
    let run = engine.run_json(&lead_workspace()).unwrap();

    assert!(started.elapsed().as_millis() < 500);
    assert!(run.is_running());
    assert!(wait_until(2000, || {
        engine.system().instruments().has_instrument("lead")
    }));
}

/// Stop cancels the current run; a later run starts fresh.
#[test]
fn test_stop_then_rerun() {
    let engine = test_engine();
    let first = engine.run_json(&lead_workspace()).unwrap();

    engine.stop();
    assert!(first.is_cancelled());
    assert!(!engine.system().transport().is_playing());

    let second = engine.run_json(&lead_workspace()).unwrap();
    assert!(second.is_running());
    assert!(first.is_cancelled());
    assert!(engine.system().transport().is_playing());
}

/// Reset disposes everything a program built, including variables, and
/// the engine accepts a new run afterwards.
#[test]
fn test_reset_clears_program_state_between_runs() {
    let engine = test_engine();
    engine.run_json(&lead_workspace()).unwrap();
    assert!(wait_until(2000, || {
        engine.system().instruments().has_instrument("lead")
    }));
    engine.executor().set_variable("tune", "c4");

    engine.reset();
    assert!(engine.system().instruments().instrument_names().is_empty());
    assert_eq!(engine.system().transport().position_beats(), 0.0);
    assert!(engine.executor().variable("tune").is_none());

    engine.run_json(&lead_workspace()).unwrap();
    assert!(wait_until(2000, || {
        engine.system().instruments().has_instrument("lead")
    }));
}

/// Two engines in one process share nothing.
#[test]
fn test_engines_are_isolated() {
    let first = test_engine();
    let second = test_engine();

    first.run_json(&lead_workspace()).unwrap();
    assert!(wait_until(2000, || {
        first.system().instruments().has_instrument("lead")
    }));

    assert!(second.system().instruments().instrument_names().is_empty());
    assert!(!second.system().transport().is_playing());
}

/// Engines shut down cleanly while a program is still running.
#[test]
fn test_sequential_engines_build_and_drop() {
    for _ in 0..3 {
        let engine = test_engine();
        engine.run_json(&lead_workspace()).unwrap();
        settle(50);
        // Dropped here with the program mid-flight.
    }
}
