//! Event dispatch integration tests.
//!
//! Handlers registered from workspace hats, dispatched through the
//! engine's registry, with live updates flowing through the debounced
//! watcher.

use crate::helpers::{settle, test_engine, wait_until};
use bloco::prelude::*;
use bloco::{HandlerKey, SerialSource};
use std::io::Cursor;
use std::sync::Arc;

fn forest(json: serde_json::Value) -> BlockForest {
    BlockForest::from_json(&json.to_string()).unwrap()
}

/// A key hat whose body leaves a variable mark.
fn key_hat(id: &str, key: &str, mark: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "type": "on_key",
        "key": key,
        "trigger": "press",
        "body": [{
            "id": format!("{id}-body"),
            "type": "set_variable",
            "name": mark,
            "value": "hit"
        }]
    })
}

/// Only hat blocks become handlers; plain chains stay with the program.
#[test]
fn test_hats_register_from_the_workspace() {
    let engine = test_engine();
    let forest = forest(serde_json::json!({
        "blocks": [
            key_hat("h1", "KeyA", "mark_a"),
            {
                "id": "h2",
                "type": "on_note",
                "body": [{ "id": "h3", "type": "play_drum", "drum": "snare", "velocity": 0.8 }]
            },
            { "id": "e1", "type": "rest", "beats": 1.0 }
        ]
    }));

    assert_eq!(engine.register_handlers(&forest), 2);
    assert_eq!(engine.registry().handler_count(), 2);
}

/// Key events run the matching handler body on the engine runtime.
#[test]
fn test_key_dispatch_runs_handler_bodies() {
    let engine = test_engine();
    engine.register_handlers(&forest(serde_json::json!({
        "blocks": [key_hat("h1", "KeyA", "mark_a")]
    })));

    engine.registry().dispatch_key("KeyA", KeyTrigger::Press);
    assert!(wait_until(2000, || {
        engine.executor().variable("mark_a").as_deref() == Some("hit")
    }));
}

/// Note events bind the note name and normalized velocity before the
/// body runs.
#[test]
fn test_note_dispatch_binds_note_and_velocity() {
    let engine = test_engine();
    engine.register_handlers(&forest(serde_json::json!({
        "blocks": [{
            "id": "h1",
            "type": "on_note",
            "body": [
                {
                    "id": "h2",
                    "type": "set_variable",
                    "name": "got_note",
                    "value": { "var": "note" }
                },
                {
                    "id": "h3",
                    "type": "set_variable",
                    "name": "got_velocity",
                    "value": { "var": "velocity" }
                }
            ]
        }]
    })));

    engine.registry().dispatch_note(64, 127, 0);
    assert!(wait_until(2000, || {
        engine.executor().variable("got_note").as_deref() == Some("e4")
    }));
    assert_eq!(engine.executor().variable("got_velocity").as_deref(), Some("1"));
}

/// Velocity zero is a note-off: held handler voices are released instead
/// of dispatching the handler again.
#[test]
fn test_zero_velocity_releases_handler_voices() {
    let engine = test_engine();
    engine
        .run_json(
            &serde_json::json!({
                "blocks": [{
                    "id": "d1",
                    "type": "define_instrument",
                    "name": "lead",
                    "instrument": { "kind": "oscillator", "wave": "sine" }
                }]
            })
            .to_string(),
        )
        .unwrap();
    assert!(wait_until(2000, || {
        engine.system().instruments().has_instrument("lead")
    }));

    engine.register_handlers(&forest(serde_json::json!({
        "blocks": [{
            "id": "h1",
            "type": "on_note",
            "body": [{
                "id": "h2",
                "type": "play_note",
                "note": { "var": "note" },
                "beats": 8.0,
                "velocity": { "var": "velocity" }
            }]
        }]
    })));

    engine.registry().dispatch_note(60, 100, 0);
    assert!(wait_until(2000, || {
        engine.system().instruments().active_voice_count("lead") == 1
    }));

    engine.registry().dispatch_note(60, 0, 0);
    assert!(wait_until(2000, || {
        engine.system().instruments().active_voice_count("lead") == 0
    }));
}

/// Rapid workspace edits coalesce; only the final snapshot is registered.
#[test]
fn test_update_handlers_coalesces_bursts() {
    let engine = test_engine();
    engine.update_handlers(forest(serde_json::json!({
        "blocks": [key_hat("h1", "KeyA", "mark_a")]
    })));
    engine.update_handlers(forest(serde_json::json!({
        "blocks": [key_hat("h2", "KeyB", "mark_b")]
    })));

    assert!(wait_until(2000, || {
        engine.registry().has_handler(&HandlerKey::new("h2"))
    }));
    assert_eq!(engine.registry().handler_count(), 1);
    assert!(!engine.registry().has_handler(&HandlerKey::new("h1")));
}

/// Reset interrupts handler bodies mid-wait but leaves the handlers
/// registered for the next event.
#[test]
fn test_reset_interrupts_bodies_but_keeps_handlers() {
    let engine = test_engine();
    engine.register_handlers(&forest(serde_json::json!({
        "blocks": [
            {
                "id": "h1",
                "type": "on_key",
                "key": "KeyA",
                "trigger": "press",
                "body": [{
                    "id": "h2",
                    "type": "wait_seconds",
                    "seconds": 10.0,
                    "next": {
                        "id": "h3",
                        "type": "set_variable",
                        "name": "slow_mark",
                        "value": "hit"
                    }
                }]
            },
            key_hat("h4", "KeyB", "fast_mark")
        ]
    })));

    engine.registry().dispatch_key("KeyA", KeyTrigger::Press);
    settle(100);
    engine.reset();
    settle(300);

    assert!(engine.executor().variable("slow_mark").is_none());
    assert_eq!(engine.registry().handler_count(), 2);

    engine.registry().dispatch_key("KeyB", KeyTrigger::Press);
    assert!(wait_until(2000, || {
        engine.executor().variable("fast_mark").as_deref() == Some("hit")
    }));
}

/// Serial lines pump into serial handlers with the line bound.
#[test]
fn test_serial_lines_reach_handlers() {
    let engine = test_engine();
    engine.register_handlers(&forest(serde_json::json!({
        "blocks": [{
            "id": "h1",
            "type": "on_serial",
            "body": [{
                "id": "h2",
                "type": "set_variable",
                "name": "seen",
                "value": { "var": "line" }
            }]
        }]
    })));

    let _source = SerialSource::spawn(Cursor::new(&b"c4\n"[..]), Arc::clone(engine.registry()));
    assert!(wait_until(2000, || {
        engine.executor().variable("seen").as_deref() == Some("c4")
    }));
}
