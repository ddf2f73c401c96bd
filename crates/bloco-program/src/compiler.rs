//! Workspace compilation: block chains to phase scripts.
//!
//! Top-level chains are classified by their first block: instrument and
//! chord definitions, setup (mixer, effects, step sequences), and
//! execution. Procedure definitions become named scripts, hat blocks are
//! compiled separately into event handlers, and effect blocks are
//! directives collected in creation order rather than statements. The
//! assembled listing always concatenates in the same order: variables,
//! procedures, definitions, setup, execution.

use crate::blocks::{Block, BlockForest, BlockKind};
use crate::script::{json, render_script, CompiledHandler, CompiledProgram, Script, Stmt};
use bloco_core::{duration_to_beats, EffectConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Which phase a top-level chain joins, decided by its first block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Definition,
    Setup,
    Execution,
}

fn phase_of(kind: &BlockKind) -> Phase {
    match kind {
        BlockKind::DefineInstrument { .. } | BlockKind::DefineChord { .. } => Phase::Definition,
        BlockKind::MasterSetup { .. }
        | BlockKind::AddEffect { .. }
        | BlockKind::StepSequence { .. } => Phase::Setup,
        _ => Phase::Execution,
    }
}

/// A beat count written either as a number or a duration symbol.
fn parse_beats(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .or_else(|| duration_to_beats(text))
}

/// One compiled hat block, keyed by the block's workspace identity.
#[derive(Debug, Clone)]
pub struct HandlerSpec {
    pub key: String,
    pub handler: CompiledHandler,
    /// Effect declarations found in the hat body, in creation order. They
    /// configure the graph once at registration, not per event.
    pub effects: Vec<EffectConfig>,
}

#[derive(Default)]
struct Compiler {
    effects: Vec<EffectConfig>,
    variables: Vec<String>,
}

impl Compiler {
    fn compile_chain(&mut self, block: &Block) -> Script {
        let mut script = Script::new();
        for block in block.chain() {
            self.compile_block(block, &mut script);
        }
        script
    }

    /// A body slot holds a list of blocks, each possibly chained.
    fn compile_body(&mut self, body: &[Block]) -> Script {
        let mut script = Script::new();
        for block in body {
            for block in block.chain() {
                self.compile_block(block, &mut script);
            }
        }
        script
    }

    fn compile_block(&mut self, block: &Block, script: &mut Script) {
        match &block.kind {
            BlockKind::DefineInstrument {
                name,
                instrument,
                envelope,
                polyphony,
            } => script.push(Stmt::DefineInstrument {
                name: name.clone(),
                kind: instrument.clone(),
                envelope: *envelope,
                polyphony: *polyphony,
            }),
            BlockKind::DefineChord { name, notes } => script.push(Stmt::DefineChord {
                name: name.clone(),
                notes: notes.clone(),
            }),
            BlockKind::DefineProcedure { name, .. } => {
                warn!(
                    "Procedure '{}' defined inside a statement chain, ignoring",
                    name
                );
            }
            BlockKind::MasterSetup { volume, effects } => {
                self.effects.extend(effects.iter().cloned());
                if let Some(volume) = volume {
                    script.push(Stmt::SetMasterVolume { volume: *volume });
                }
            }
            BlockKind::AddEffect { config } => self.effects.push(config.clone()),
            BlockKind::StepSequence {
                source,
                rows,
                is_chord,
            } => script.push(Stmt::StartStepSequence {
                key: block.id.clone(),
                source: source.clone(),
                rows: rows.clone(),
                is_chord: *is_chord,
            }),
            BlockKind::PlayNote {
                instrument,
                note,
                beats,
                velocity,
            } => script.push(Stmt::PlayNote {
                instrument: instrument.clone(),
                note: note.clone(),
                beats: *beats,
                velocity: velocity.clone(),
            }),
            BlockKind::PlayDrum { drum, velocity } => script.push(Stmt::PlayDrum {
                drum: *drum,
                velocity: velocity.clone(),
            }),
            BlockKind::PlayMelody { melody, instrument } => script.push(Stmt::PlayMelody {
                melody: melody.clone(),
                instrument: instrument.clone(),
            }),
            BlockKind::Rest { beats } => script.push(Stmt::Rest { beats: *beats }),
            BlockKind::WaitSeconds { seconds } => {
                script.push(Stmt::WaitSeconds { seconds: *seconds })
            }
            BlockKind::CountIn { measures } => script.push(Stmt::CountIn {
                measures: *measures,
            }),
            BlockKind::SetTempo { bpm } => script.push(Stmt::SetTempo { bpm: *bpm }),
            BlockKind::SetTransposition { semitones } => script.push(Stmt::SetTransposition {
                semitones: *semitones,
            }),
            BlockKind::SwitchInstrument { name } => {
                script.push(Stmt::SwitchInstrument { name: name.clone() })
            }
            BlockKind::SetEnvelope {
                instrument,
                envelope,
            } => script.push(Stmt::SetEnvelope {
                instrument: instrument.clone(),
                envelope: *envelope,
            }),
            BlockKind::UpdateEffectParam {
                target,
                effect,
                param,
                value,
                index,
            } => script.push(Stmt::UpdateEffectParam {
                target: target.clone(),
                effect: effect.clone(),
                param: param.clone(),
                value: *value,
                index: *index,
            }),
            BlockKind::ClearEffects { target } => script.push(Stmt::ClearEffects {
                target: target.clone(),
            }),
            BlockKind::SetChannelGain { channel, gain } => script.push(Stmt::SetChannelGain {
                channel: channel.clone(),
                gain: *gain,
            }),
            BlockKind::SetChannelMuted { channel, muted } => {
                script.push(Stmt::SetChannelMuted {
                    channel: channel.clone(),
                    muted: *muted,
                })
            }
            BlockKind::SetChannelSoloed { channel, soloed } => {
                script.push(Stmt::SetChannelSoloed {
                    channel: channel.clone(),
                    soloed: *soloed,
                })
            }
            BlockKind::SetMasterVolume { volume } => {
                script.push(Stmt::SetMasterVolume { volume: *volume })
            }
            BlockKind::Repeat { times, body } => {
                let body = self.compile_body(body);
                script.push(Stmt::Repeat {
                    times: *times,
                    body,
                });
            }
            BlockKind::Loop { interval, body } => match parse_beats(interval) {
                Some(interval_beats) if interval_beats > 0.0 => {
                    let body = self.compile_body(body);
                    script.push(Stmt::StartLoop {
                        key: block.id.clone(),
                        interval_beats,
                        body,
                    });
                }
                _ => warn!(
                    "Unknown loop interval '{}', skipping block '{}'",
                    interval, block.id
                ),
            },
            BlockKind::AtOffset { offset, body } => match parse_beats(offset) {
                Some(offset_beats) if offset_beats >= 0.0 => {
                    let body = self.compile_body(body);
                    script.push(Stmt::AtOffset { offset_beats, body });
                }
                _ => warn!(
                    "Unknown offset '{}', skipping block '{}'",
                    offset, block.id
                ),
            },
            BlockKind::SetVariable { name, value } => {
                if !self.variables.contains(name) {
                    self.variables.push(name.clone());
                }
                script.push(Stmt::SetVariable {
                    name: name.clone(),
                    value: value.clone(),
                });
            }
            BlockKind::CallProcedure { name } => {
                script.push(Stmt::CallProcedure { name: name.clone() })
            }
            BlockKind::OnNote { .. } | BlockKind::OnSerial { .. } | BlockKind::OnKey { .. } => {
                warn!("Hat block '{}' inside a statement chain, ignoring", block.id);
            }
        }
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compile a workspace into a runnable program.
///
/// Hat blocks are skipped here; [`compile_handlers`] owns them. An empty
/// forest compiles to an empty program, which is not an error.
pub fn compile(forest: &BlockForest) -> CompiledProgram {
    let mut compiler = Compiler::default();
    let mut procedures: HashMap<String, Arc<Script>> = HashMap::new();
    let mut procedure_order: Vec<String> = Vec::new();
    let mut definition = Script::new();
    let mut setup = Script::new();
    let mut execution = Script::new();

    for block in &forest.blocks {
        if block.kind.is_hat() {
            continue;
        }
        if let BlockKind::DefineProcedure { name, body } = &block.kind {
            let script = compiler.compile_body(body);
            if procedures.insert(name.clone(), Arc::new(script)).is_some() {
                warn!("Procedure '{}' defined more than once, last wins", name);
            } else {
                procedure_order.push(name.clone());
            }
            if let Some(next) = block.next.as_deref() {
                let tail = compiler.compile_chain(next);
                match phase_of(&next.kind) {
                    Phase::Definition => definition.extend(tail),
                    Phase::Setup => setup.extend(tail),
                    Phase::Execution => execution.extend(tail),
                }
            }
            continue;
        }
        let script = compiler.compile_chain(block);
        match phase_of(&block.kind) {
            Phase::Definition => definition.extend(script),
            Phase::Setup => setup.extend(script),
            Phase::Execution => execution.extend(script),
        }
    }

    let mut sections: Vec<String> = Vec::new();
    if !compiler.variables.is_empty() {
        sections.push(
            compiler
                .variables
                .iter()
                .map(|name| format!("var ${}", name))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }
    for name in &procedure_order {
        if let Some(body) = procedures.get(name) {
            sections.push(format!(
                "procedure {:?}:\n{}",
                name,
                indent(&render_script(body))
            ));
        }
    }
    if !definition.is_empty() {
        sections.push(render_script(&definition));
    }
    if !compiler.effects.is_empty() {
        sections.push(
            compiler
                .effects
                .iter()
                .map(|config| format!("effect {}", json(config)))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }
    if !setup.is_empty() {
        sections.push(render_script(&setup));
    }
    if !execution.is_empty() {
        sections.push(render_script(&execution));
    }

    CompiledProgram {
        code: sections.join("\n\n"),
        variables: compiler.variables,
        procedures,
        definition,
        setup,
        execution,
        effects: compiler.effects,
    }
}

/// Compile every hat block into an event handler spec.
///
/// Hats with empty bodies produce no spec. Each hat compiles with its own
/// directive collector, so effects declared in its body come back on the
/// spec instead of in the body script.
pub fn compile_handlers(forest: &BlockForest) -> Vec<HandlerSpec> {
    forest
        .hats()
        .filter_map(|block| {
            let body_blocks = match &block.kind {
                BlockKind::OnNote { body, .. }
                | BlockKind::OnSerial { body, .. }
                | BlockKind::OnKey { body, .. } => body,
                _ => return None,
            };
            if body_blocks.is_empty() {
                return None;
            }
            let mut compiler = Compiler::default();
            let handler = match &block.kind {
                BlockKind::OnNote {
                    note_var,
                    velocity_var,
                    body,
                } => CompiledHandler::Note {
                    note_var: note_var.clone(),
                    velocity_var: velocity_var.clone(),
                    body: Arc::new(compiler.compile_body(body)),
                },
                BlockKind::OnSerial { line_var, body } => CompiledHandler::Serial {
                    line_var: line_var.clone(),
                    body: Arc::new(compiler.compile_body(body)),
                },
                BlockKind::OnKey { key, trigger, body } => CompiledHandler::Key {
                    key: key.clone(),
                    trigger: *trigger,
                    body: Arc::new(compiler.compile_body(body)),
                },
                _ => return None,
            };
            Some(HandlerSpec {
                key: block.id.clone(),
                handler,
                effects: compiler.effects,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Expr, KeyTrigger, NumExpr};
    use bloco_core::{
        DrumKind, EffectKind, EffectTarget, InstrumentKind, Waveform,
    };

    fn lead() -> BlockKind {
        BlockKind::DefineInstrument {
            name: "Lead".to_string(),
            instrument: InstrumentKind::Oscillator {
                wave: Waveform::Sine,
            },
            envelope: None,
            polyphony: None,
        }
    }

    fn reverb() -> EffectConfig {
        EffectConfig {
            kind: EffectKind::Reverb {
                room_size: 10.0,
                time: 2.0,
            },
            target: EffectTarget::Master,
            wet: 0.4,
        }
    }

    #[test]
    fn chains_classify_by_their_top_block() {
        let forest = BlockForest {
            blocks: vec![
                Block::new("d1", lead()).with_next(Block::new(
                    "d2",
                    BlockKind::PlayNote {
                        instrument: None,
                        note: Expr::text("c4"),
                        beats: 1.0,
                        velocity: NumExpr::value(0.8),
                    },
                )),
                Block::new(
                    "s1",
                    BlockKind::MasterSetup {
                        volume: Some(0.8),
                        effects: Vec::new(),
                    },
                ),
                Block::new(
                    "e1",
                    BlockKind::PlayDrum {
                        drum: DrumKind::Kick,
                        velocity: NumExpr::value(0.8),
                    },
                ),
            ],
        };
        let program = compile(&forest);
        assert_eq!(program.definition.len(), 2);
        assert_eq!(program.setup, vec![Stmt::SetMasterVolume { volume: 0.8 }]);
        assert_eq!(
            program.execution,
            vec![Stmt::PlayDrum {
                drum: DrumKind::Kick,
                velocity: NumExpr::value(0.8),
            }]
        );
    }

    #[test]
    fn listing_keeps_the_assembly_order() {
        let forest = BlockForest {
            blocks: vec![
                Block::new(
                    "e1",
                    BlockKind::SetVariable {
                        name: "tune".to_string(),
                        value: Expr::text("c4q e4q"),
                    },
                ),
                Block::new(
                    "p1",
                    BlockKind::DefineProcedure {
                        name: "intro".to_string(),
                        body: vec![Block::new("p2", BlockKind::Rest { beats: 1.0 })],
                    },
                ),
                Block::new("d1", lead()),
                Block::new(
                    "s1",
                    BlockKind::AddEffect { config: reverb() },
                ),
            ],
        };
        let program = compile(&forest);
        let code = &program.code;
        let var_at = code.find("var $tune").unwrap();
        let proc_at = code.find("procedure \"intro\"").unwrap();
        let def_at = code.find("instrument \"Lead\"").unwrap();
        let fx_at = code.find("effect {").unwrap();
        assert!(var_at < proc_at && proc_at < def_at && def_at < fx_at);
        assert_eq!(program.variables, ["tune"]);
    }

    #[test]
    fn empty_forest_compiles_to_an_empty_program() {
        let program = compile(&BlockForest::default());
        assert!(program.is_empty());
        assert!(program.effects.is_empty());
        assert!(program.procedures.is_empty());
    }

    #[test]
    fn effect_blocks_become_directives() {
        let mut second = reverb();
        second.kind = EffectKind::Delay {
            time: 0.25,
            feedback: 0.5,
        };
        let forest = BlockForest {
            blocks: vec![
                Block::new("s1", BlockKind::AddEffect { config: reverb() }),
                Block::new(
                    "s2",
                    BlockKind::MasterSetup {
                        volume: None,
                        effects: vec![second],
                    },
                ),
            ],
        };
        let program = compile(&forest);
        assert!(program.setup.is_empty());
        assert_eq!(program.effects.len(), 2);
        assert_eq!(program.effects[0].kind.name(), "reverb");
        assert_eq!(program.effects[1].kind.name(), "delay");
    }

    #[test]
    fn hats_stay_out_of_the_program() {
        let forest = BlockForest {
            blocks: vec![Block::new(
                "h1",
                BlockKind::OnKey {
                    key: "KeyA".to_string(),
                    trigger: KeyTrigger::Press,
                    body: vec![Block::new(
                        "h2",
                        BlockKind::PlayDrum {
                            drum: DrumKind::Snare,
                            velocity: NumExpr::value(0.8),
                        },
                    )],
                },
            )],
        };
        let program = compile(&forest);
        assert!(program.is_empty());

        let handlers = compile_handlers(&forest);
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].key, "h1");
        assert_eq!(handlers[0].handler.body().len(), 1);
    }

    #[test]
    fn handler_bodies_surrender_their_effects() {
        let forest = BlockForest {
            blocks: vec![Block::new(
                "h1",
                BlockKind::OnNote {
                    note_var: "note".to_string(),
                    velocity_var: "velocity".to_string(),
                    body: vec![
                        Block::new("h2", BlockKind::AddEffect { config: reverb() }),
                        Block::new(
                            "h3",
                            BlockKind::PlayNote {
                                instrument: None,
                                note: Expr::var("note"),
                                beats: 1.0,
                                velocity: NumExpr::value(0.8),
                            },
                        ),
                    ],
                },
            )],
        };
        let handlers = compile_handlers(&forest);
        assert_eq!(handlers[0].effects.len(), 1);
        assert_eq!(handlers[0].handler.body().len(), 1);
    }

    #[test]
    fn hats_with_empty_bodies_are_not_handlers() {
        let forest = BlockForest {
            blocks: vec![Block::new(
                "h1",
                BlockKind::OnKey {
                    key: "KeyA".to_string(),
                    trigger: KeyTrigger::Press,
                    body: vec![],
                },
            )],
        };
        assert!(compile_handlers(&forest).is_empty());
    }

    #[test]
    fn loop_intervals_resolve_or_skip() {
        let body = vec![Block::new(
            "l2",
            BlockKind::PlayDrum {
                drum: DrumKind::Kick,
                velocity: NumExpr::value(0.8),
            },
        )];
        let forest = BlockForest {
            blocks: vec![
                Block::new(
                    "l1",
                    BlockKind::Loop {
                        interval: "measure".to_string(),
                        body: body.clone(),
                    },
                ),
                Block::new(
                    "l3",
                    BlockKind::Loop {
                        interval: "5z".to_string(),
                        body,
                    },
                ),
                Block::new(
                    "l4",
                    BlockKind::AtOffset {
                        offset: "1.5".to_string(),
                        body: Vec::new(),
                    },
                ),
            ],
        };
        let program = compile(&forest);
        assert_eq!(program.execution.len(), 2);
        match &program.execution[0] {
            Stmt::StartLoop {
                key,
                interval_beats,
                ..
            } => {
                assert_eq!(key, "l1");
                assert_eq!(*interval_beats, 4.0);
            }
            other => panic!("unexpected statement {:?}", other),
        }
        assert!(matches!(
            program.execution[1],
            Stmt::AtOffset {
                offset_beats,
                ..
            } if offset_beats == 1.5
        ));
    }

    #[test]
    fn duplicate_procedures_keep_the_last_definition() {
        let forest = BlockForest {
            blocks: vec![
                Block::new(
                    "p1",
                    BlockKind::DefineProcedure {
                        name: "riff".to_string(),
                        body: vec![Block::new("p2", BlockKind::Rest { beats: 1.0 })],
                    },
                ),
                Block::new(
                    "p3",
                    BlockKind::DefineProcedure {
                        name: "riff".to_string(),
                        body: vec![Block::new("p4", BlockKind::Rest { beats: 2.0 })],
                    },
                ),
            ],
        };
        let program = compile(&forest);
        assert_eq!(program.procedures.len(), 1);
        assert_eq!(
            program.procedures["riff"].as_slice(),
            [Stmt::Rest { beats: 2.0 }]
        );
    }
}
