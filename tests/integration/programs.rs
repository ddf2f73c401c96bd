//! Program execution integration tests.
//!
//! Whole workspaces go in as editor JSON and come out as observable
//! engine state: instruments, effect chains, tempo, loops, variables.

use crate::helpers::{test_engine, wait_until};
use bloco::prelude::*;

/// Definitions, effect directives, setup, and execution all land, in
/// phase order, from one workspace.
#[test]
fn test_programs_wire_definitions_effects_and_setup() {
    let workspace = serde_json::json!({
        "blocks": [
            {
                "id": "d1",
                "type": "define_instrument",
                "name": "lead",
                "instrument": { "kind": "oscillator", "wave": "saw" },
                "polyphony": { "mode": "mono" }
            },
            {
                "id": "s1",
                "type": "master_setup",
                "volume": 0.5,
                "effects": [{
                    "kind": { "effect": "reverb", "room_size": 10.0, "time": 2.0 },
                    "target": "master",
                    "wet": 0.4
                }]
            },
            {
                "id": "s2",
                "type": "add_effect",
                "kind": { "effect": "delay", "time": 0.25, "feedback": 0.5 },
                "target": { "instrument": "lead" },
                "wet": 0.5
            },
            {
                "id": "e1",
                "type": "set_tempo",
                "bpm": 100.0,
                "next": { "id": "e2", "type": "set_transposition", "semitones": 2 }
            }
        ]
    })
    .to_string();

    let engine = test_engine();
    let program = engine.load_program(&workspace).unwrap();
    assert_eq!(program.effects.len(), 2);

    engine.run(&program);
    assert!(wait_until(2000, || {
        engine.system().sequencer().transposition() == 2
    }));

    let system = engine.system();
    assert_eq!(
        system.instruments().kind_of("lead"),
        Some(InstrumentKind::Oscillator {
            wave: Waveform::Saw
        })
    );
    assert_eq!(system.transport().tempo(), 100.0);
    assert_eq!(system.graph_manager().master_volume(), 0.5);
    assert_eq!(
        system.graph_manager().chain_kinds(&EffectTarget::Master),
        vec!["reverb"]
    );
    assert_eq!(
        system
            .graph_manager()
            .chain_kinds(&EffectTarget::Instrument("lead".to_string())),
        vec!["delay"]
    );
}

/// Procedures compile to named scripts and run on call; variables set
/// during the run are visible afterwards.
#[test]
fn test_procedures_and_variables_flow_through_a_run() {
    let workspace = serde_json::json!({
        "blocks": [
            {
                "id": "d1",
                "type": "define_instrument",
                "name": "lead",
                "instrument": { "kind": "oscillator", "wave": "sine" }
            },
            {
                "id": "p1",
                "type": "define_procedure",
                "name": "riff",
                "body": [
                    {
                        "id": "p2",
                        "type": "play_note",
                        "note": "e4",
                        "beats": 0.1,
                        "velocity": 0.9,
                        "instrument": "lead"
                    },
                    {
                        "id": "p3",
                        "type": "set_variable",
                        "name": "done",
                        "value": "yes"
                    }
                ]
            },
            { "id": "e1", "type": "call_procedure", "name": "riff" }
        ]
    })
    .to_string();

    let engine = test_engine();
    let program = engine.load_program(&workspace).unwrap();
    assert!(program.procedures.contains_key("riff"));
    assert_eq!(program.variables, ["done"]);

    engine.run(&program);
    assert!(wait_until(2000, || {
        engine.executor().variable("done").as_deref() == Some("yes")
    }));
}

/// Melody strings play event by event and the chain continues afterwards.
#[test]
fn test_melodies_advance_sequentially() {
    let workspace = serde_json::json!({
        "blocks": [{
            "id": "d1",
            "type": "define_instrument",
            "name": "lead",
            "instrument": { "kind": "oscillator", "wave": "sine" },
            "next": {
                "id": "m1",
                "type": "play_melody",
                "melody": "c4s e4s g4s",
                "next": {
                    "id": "m2",
                    "type": "set_variable",
                    "name": "after_melody",
                    "value": "done"
                }
            }
        }]
    })
    .to_string();

    let engine = test_engine();
    engine.run_json(&workspace).unwrap();

    assert!(wait_until(3000, || {
        engine.executor().variable("after_melody").is_some()
    }));
    assert!(engine.system().instruments().active_voice_count("lead") >= 1);
}

/// Loop blocks install transport loops that stop with the run.
#[test]
fn test_loops_fire_until_the_run_stops() {
    let workspace = serde_json::json!({
        "blocks": [
            {
                "id": "d1",
                "type": "define_instrument",
                "name": "lead",
                "instrument": { "kind": "oscillator", "wave": "sine" }
            },
            {
                "id": "l1",
                "type": "loop",
                "interval": "measure",
                "body": [{ "id": "l2", "type": "play_drum", "drum": "kick", "velocity": 1.0 }]
            }
        ]
    })
    .to_string();

    let engine = test_engine();
    engine.run_json(&workspace).unwrap();

    assert!(wait_until(2000, || engine.system().loops().has_loop("l1")));
    assert_eq!(engine.system().loops().active_count(), 1);

    engine.stop();
    assert_eq!(engine.system().loops().active_count(), 0);
}

/// Step sequences install measure-synced loops keyed by their block.
#[test]
fn test_step_sequences_install_measure_loops() {
    let row: Vec<String> = "x---x---x---x---".chars().map(|c| c.to_string()).collect();
    let workspace = serde_json::json!({
        "blocks": [{
            "id": "s1",
            "type": "step_sequence",
            "source": "kick",
            "rows": [row]
        }]
    })
    .to_string();

    let engine = test_engine();
    engine.run_json(&workspace).unwrap();

    assert!(wait_until(2000, || engine.system().loops().has_loop("s1")));
    engine.stop();
    assert!(!engine.system().loops().has_loop("s1"));
}

/// The compiled listing reflects the workspace in assembly order.
#[test]
fn test_compiled_listings_read_like_the_workspace() {
    let workspace = serde_json::json!({
        "blocks": [
            {
                "id": "d1",
                "type": "define_instrument",
                "name": "lead",
                "instrument": { "kind": "oscillator", "wave": "sine" },
                "next": { "id": "e1", "type": "play_note", "note": "c4", "beats": 1.0 }
            }
        ]
    })
    .to_string();

    let engine = test_engine();
    let program = engine.load_program(&workspace).unwrap();

    assert!(!program.is_empty());
    assert!(program.code.contains("instrument \"lead\""));
    assert!(program.code.contains("play_note \"c4\""));
}
