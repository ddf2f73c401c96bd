//! The compiled statement IR.
//!
//! Compilation flattens block chains into statement lists; the executor
//! interprets those against a live [`bloco_core::BlocoSystem`]. Every
//! statement also renders to one line of canonical program text. That text
//! is what the assembled program listing is concatenated from, and what
//! handler re-registration diffs against, so rendering must be
//! deterministic: same statements, same text.

use crate::blocks::{Expr, KeyTrigger, NumExpr};
use bloco_core::{
    DrumKind, EffectConfig, EffectTarget, EnvelopeConfig, InstrumentKind, Polyphony,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type Script = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    DefineInstrument {
        name: String,
        kind: InstrumentKind,
        envelope: Option<EnvelopeConfig>,
        polyphony: Option<Polyphony>,
    },
    DefineChord {
        name: String,
        notes: Vec<String>,
    },
    StartStepSequence {
        key: String,
        source: String,
        rows: Vec<Vec<String>>,
        is_chord: bool,
    },
    PlayNote {
        instrument: Option<String>,
        note: Expr,
        beats: f64,
        velocity: NumExpr,
    },
    PlayDrum {
        drum: DrumKind,
        velocity: NumExpr,
    },
    PlayMelody {
        melody: Expr,
        instrument: Option<String>,
    },
    Rest {
        beats: f64,
    },
    WaitSeconds {
        seconds: f64,
    },
    CountIn {
        measures: u32,
    },
    SetTempo {
        bpm: f32,
    },
    SetTransposition {
        semitones: i32,
    },
    SwitchInstrument {
        name: String,
    },
    SetEnvelope {
        instrument: String,
        envelope: EnvelopeConfig,
    },
    UpdateEffectParam {
        target: EffectTarget,
        effect: String,
        param: String,
        value: f32,
        index: usize,
    },
    ClearEffects {
        target: EffectTarget,
    },
    SetChannelGain {
        channel: String,
        gain: f32,
    },
    SetChannelMuted {
        channel: String,
        muted: bool,
    },
    SetChannelSoloed {
        channel: String,
        soloed: bool,
    },
    SetMasterVolume {
        volume: f32,
    },
    Repeat {
        times: u32,
        body: Script,
    },
    StartLoop {
        key: String,
        interval_beats: f64,
        body: Script,
    },
    AtOffset {
        offset_beats: f64,
        body: Script,
    },
    SetVariable {
        name: String,
        value: Expr,
    },
    CallProcedure {
        name: String,
    },
}

pub(crate) fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn write_expr(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Text(text) => write!(f, "{:?}", text),
        Expr::Var { var } => write!(f, "${}", var),
    }
}

fn write_num(f: &mut fmt::Formatter<'_>, expr: &NumExpr) -> fmt::Result {
    match expr {
        NumExpr::Value(value) => write!(f, "{}", value),
        NumExpr::Var { var } => write!(f, "${}", var),
    }
}

fn pad(f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("  ")?;
    }
    Ok(())
}

impl Stmt {
    fn render(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        pad(f, indent)?;
        match self {
            Stmt::DefineInstrument {
                name,
                kind,
                envelope,
                polyphony,
            } => {
                write!(f, "instrument {:?} = {}", name, json(kind))?;
                if let Some(envelope) = envelope {
                    write!(f, " envelope={}", json(envelope))?;
                }
                if let Some(polyphony) = polyphony {
                    write!(f, " polyphony={}", json(polyphony))?;
                }
                Ok(())
            }
            Stmt::DefineChord { name, notes } => {
                write!(f, "chord {:?} = [{}]", name, notes.join(", "))
            }
            Stmt::StartStepSequence {
                key,
                source,
                rows,
                is_chord,
            } => {
                write!(f, "step_sequence {:?} rows=[", source)?;
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    f.write_str(&row.join(" "))?;
                }
                write!(f, "] chord={} @{}", is_chord, key)
            }
            Stmt::PlayNote {
                instrument,
                note,
                beats,
                velocity,
            } => {
                f.write_str("play_note ")?;
                write_expr(f, note)?;
                write!(f, " beats={} velocity=", beats)?;
                write_num(f, velocity)?;
                if let Some(name) = instrument {
                    write!(f, " on={:?}", name)?;
                }
                Ok(())
            }
            Stmt::PlayDrum { drum, velocity } => {
                write!(f, "play_drum {} velocity=", drum.name())?;
                write_num(f, velocity)
            }
            Stmt::PlayMelody { melody, instrument } => {
                f.write_str("play_melody ")?;
                write_expr(f, melody)?;
                if let Some(name) = instrument {
                    write!(f, " on={:?}", name)?;
                }
                Ok(())
            }
            Stmt::Rest { beats } => write!(f, "rest {}", beats),
            Stmt::WaitSeconds { seconds } => write!(f, "wait_seconds {}", seconds),
            Stmt::CountIn { measures } => write!(f, "count_in {}", measures),
            Stmt::SetTempo { bpm } => write!(f, "set_tempo {}", bpm),
            Stmt::SetTransposition { semitones } => {
                write!(f, "set_transposition {}", semitones)
            }
            Stmt::SwitchInstrument { name } => write!(f, "switch_instrument {:?}", name),
            Stmt::SetEnvelope {
                instrument,
                envelope,
            } => write!(f, "set_envelope {:?} {}", instrument, json(envelope)),
            Stmt::UpdateEffectParam {
                target,
                effect,
                param,
                value,
                index,
            } => write!(
                f,
                "update_effect_param {} {}[{}].{} = {}",
                target.describe(),
                effect,
                index,
                param,
                value
            ),
            Stmt::ClearEffects { target } => {
                write!(f, "clear_effects {}", target.describe())
            }
            Stmt::SetChannelGain { channel, gain } => {
                write!(f, "set_channel_gain {:?} {}", channel, gain)
            }
            Stmt::SetChannelMuted { channel, muted } => {
                write!(f, "set_channel_muted {:?} {}", channel, muted)
            }
            Stmt::SetChannelSoloed { channel, soloed } => {
                write!(f, "set_channel_soloed {:?} {}", channel, soloed)
            }
            Stmt::SetMasterVolume { volume } => write!(f, "set_master_volume {}", volume),
            Stmt::Repeat { times, body } => {
                write!(f, "repeat {}:", times)?;
                render_body(f, body, indent + 1)
            }
            Stmt::StartLoop {
                key,
                interval_beats,
                body,
            } => {
                write!(f, "loop every {} beats @{}:", interval_beats, key)?;
                render_body(f, body, indent + 1)
            }
            Stmt::AtOffset { offset_beats, body } => {
                write!(f, "at_offset {} beats:", offset_beats)?;
                render_body(f, body, indent + 1)
            }
            Stmt::SetVariable { name, value } => {
                write!(f, "set ${} = ", name)?;
                write_expr(f, value)
            }
            Stmt::CallProcedure { name } => write!(f, "call {:?}", name),
        }
    }
}

fn render_body(f: &mut fmt::Formatter<'_>, body: &[Stmt], indent: usize) -> fmt::Result {
    for stmt in body {
        f.write_str("\n")?;
        stmt.render(f, indent)?;
    }
    Ok(())
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

/// Render a script as canonical text, one statement per line.
pub fn render_script(script: &[Stmt]) -> String {
    script
        .iter()
        .map(|stmt| stmt.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Output of compiling a whole workspace.
///
/// The phase scripts remain separate so callers can run setup without the
/// performance, while `code` carries the full listing in the fixed
/// assembly order: variables, procedures, definitions, setup, execution.
#[derive(Debug, Clone, Default)]
pub struct CompiledProgram {
    /// Canonical listing of the whole program.
    pub code: String,
    /// Declared variable names in workspace order, deduplicated.
    pub variables: Vec<String>,
    pub procedures: HashMap<String, Arc<Script>>,
    pub definition: Script,
    pub setup: Script,
    pub execution: Script,
    /// Effect declarations in creation order, applied before setup runs.
    pub effects: Vec<EffectConfig>,
}

impl CompiledProgram {
    /// An empty workspace compiles successfully to an empty program.
    pub fn is_empty(&self) -> bool {
        self.code.trim().is_empty()
    }
}

/// One compiled event handler: a hat block's bound names plus its body.
#[derive(Debug, Clone)]
pub enum CompiledHandler {
    Note {
        note_var: String,
        velocity_var: String,
        body: Arc<Script>,
    },
    Serial {
        line_var: String,
        body: Arc<Script>,
    },
    Key {
        key: String,
        trigger: KeyTrigger,
        body: Arc<Script>,
    },
}

impl CompiledHandler {
    /// Canonical text for re-registration diffing: header line plus body.
    pub fn signature(&self) -> String {
        match self {
            CompiledHandler::Note {
                note_var,
                velocity_var,
                body,
            } => format!(
                "on_note ${} ${}:\n{}",
                note_var,
                velocity_var,
                render_script(body)
            ),
            CompiledHandler::Serial { line_var, body } => {
                format!("on_serial ${}:\n{}", line_var, render_script(body))
            }
            CompiledHandler::Key { key, trigger, body } => format!(
                "on_key {:?} {:?}:\n{}",
                key,
                trigger,
                render_script(body)
            ),
        }
    }

    pub fn body(&self) -> &Arc<Script> {
        match self {
            CompiledHandler::Note { body, .. } => body,
            CompiledHandler::Serial { body, .. } => body,
            CompiledHandler::Key { body, .. } => body,
        }
    }
}
