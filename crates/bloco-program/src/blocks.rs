//! The serialized block forest.
//!
//! The visual editor owns the exact on-disk format; this is the walkable
//! tree the runtime needs: typed blocks with named fields, child-statement
//! slots, and top-level sibling chains. Block kinds are a tagged enum, so
//! dispatch past the parse boundary is an exhaustive match, never a
//! type-string comparison.

use crate::error::Result;
use bloco_core::{
    DrumKind, EffectConfig, EffectTarget, EnvelopeConfig, InstrumentKind, Polyphony,
};
use serde::{Deserialize, Serialize};

/// A whole workspace: every top-level block with its `next` chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockForest {
    pub blocks: Vec<Block>,
}

impl BlockForest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Top-level hat blocks, in workspace order.
    pub fn hats(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|block| block.kind.is_hat())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(flatten)]
    pub kind: BlockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<Block>>,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            kind,
            next: None,
        }
    }

    pub fn with_next(mut self, next: Block) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    /// This block followed by its `next` chain.
    pub fn chain(&self) -> impl Iterator<Item = &Block> {
        std::iter::successors(Some(self), |block| block.next.as_deref())
    }
}

/// A field value that is either a literal or a variable reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expr {
    Var { var: String },
    Text(String),
}

impl Expr {
    pub fn text(value: impl Into<String>) -> Self {
        Expr::Text(value.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var { var: name.into() }
    }
}

/// A numeric field value that is either a literal or a variable reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumExpr {
    Var { var: String },
    Value(f64),
}

impl NumExpr {
    pub fn value(value: f64) -> Self {
        NumExpr::Value(value)
    }

    pub fn var(name: impl Into<String>) -> Self {
        NumExpr::Var { var: name.into() }
    }
}

/// Key transition a key-action hat listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTrigger {
    Press,
    Release,
}

fn default_velocity() -> NumExpr {
    NumExpr::Value(0.8)
}

fn default_beats() -> f64 {
    1.0
}

fn default_measures() -> u32 {
    1
}

fn default_note_var() -> String {
    "note".to_string()
}

fn default_velocity_var() -> String {
    "velocity".to_string()
}

fn default_line_var() -> String {
    "line".to_string()
}

fn default_trigger() -> KeyTrigger {
    KeyTrigger::Press
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    // Definition-phase blocks
    DefineInstrument {
        name: String,
        instrument: InstrumentKind,
        #[serde(default)]
        envelope: Option<EnvelopeConfig>,
        #[serde(default)]
        polyphony: Option<Polyphony>,
    },
    DefineChord {
        name: String,
        notes: Vec<String>,
    },
    DefineProcedure {
        name: String,
        #[serde(default)]
        body: Vec<Block>,
    },

    // Setup-phase blocks
    MasterSetup {
        #[serde(default)]
        volume: Option<f32>,
        #[serde(default)]
        effects: Vec<EffectConfig>,
    },
    AddEffect {
        #[serde(flatten)]
        config: EffectConfig,
    },
    StepSequence {
        source: String,
        /// One row per measure, sixteen slot tokens per row.
        rows: Vec<Vec<String>>,
        #[serde(default)]
        is_chord: bool,
    },

    // Execution-phase blocks
    PlayNote {
        #[serde(default)]
        instrument: Option<String>,
        note: Expr,
        #[serde(default = "default_beats")]
        beats: f64,
        #[serde(default = "default_velocity")]
        velocity: NumExpr,
    },
    PlayDrum {
        drum: DrumKind,
        #[serde(default = "default_velocity")]
        velocity: NumExpr,
    },
    PlayMelody {
        melody: Expr,
        #[serde(default)]
        instrument: Option<String>,
    },
    Rest {
        #[serde(default = "default_beats")]
        beats: f64,
    },
    WaitSeconds {
        seconds: f64,
    },
    CountIn {
        #[serde(default = "default_measures")]
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
        #[serde(default)]
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
        #[serde(default)]
        body: Vec<Block>,
    },
    Loop {
        /// Symbolic interval, e.g. `"measure"` or `"4n"`.
        interval: String,
        #[serde(default)]
        body: Vec<Block>,
    },
    AtOffset {
        /// Symbolic offset into the surrounding loop.
        offset: String,
        #[serde(default)]
        body: Vec<Block>,
    },
    SetVariable {
        name: String,
        value: Expr,
    },
    CallProcedure {
        name: String,
    },

    // Hat blocks, compiled by the event registry rather than the phases
    OnNote {
        #[serde(default = "default_note_var")]
        note_var: String,
        #[serde(default = "default_velocity_var")]
        velocity_var: String,
        #[serde(default)]
        body: Vec<Block>,
    },
    OnSerial {
        #[serde(default = "default_line_var")]
        line_var: String,
        #[serde(default)]
        body: Vec<Block>,
    },
    OnKey {
        key: String,
        #[serde(default = "default_trigger")]
        trigger: KeyTrigger,
        #[serde(default)]
        body: Vec<Block>,
    },
}

impl BlockKind {
    pub fn is_hat(&self) -> bool {
        matches!(
            self,
            BlockKind::OnNote { .. } | BlockKind::OnSerial { .. } | BlockKind::OnKey { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloco_core::EffectKind;

    #[test]
    fn forest_round_trips_through_json() {
        let forest = BlockForest {
            blocks: vec![Block::new(
                "b1",
                BlockKind::PlayNote {
                    instrument: None,
                    note: Expr::text("c4"),
                    beats: 0.5,
                    velocity: NumExpr::value(0.8),
                },
            )
            .with_next(Block::new(
                "b2",
                BlockKind::PlayDrum {
                    drum: DrumKind::Kick,
                    velocity: NumExpr::var("velocity"),
                },
            ))],
        };
        let json = serde_json::to_string(&forest).unwrap();
        let back = BlockForest::from_json(&json).unwrap();
        assert_eq!(back, forest);
    }

    #[test]
    fn field_defaults_fill_in() {
        let block: Block = serde_json::from_str(
            r#"{"id":"b1","type":"play_note","note":"e4"}"#,
        )
        .unwrap();
        match block.kind {
            BlockKind::PlayNote {
                beats, velocity, ..
            } => {
                assert_eq!(beats, 1.0);
                assert_eq!(velocity, NumExpr::value(0.8));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn expr_parses_literals_and_variables() {
        let literal: Expr = serde_json::from_str(r#""c4""#).unwrap();
        assert_eq!(literal, Expr::text("c4"));

        let variable: Expr = serde_json::from_str(r#"{"var":"melody1"}"#).unwrap();
        assert_eq!(variable, Expr::var("melody1"));
    }

    #[test]
    fn add_effect_flattens_its_config() {
        let block: Block = serde_json::from_str(
            r#"{
                "id": "fx1",
                "type": "add_effect",
                "kind": {"effect": "reverb", "room_size": 20.0, "time": 3.0},
                "target": "master",
                "wet": 0.4
            }"#,
        )
        .unwrap();
        match block.kind {
            BlockKind::AddEffect { config } => {
                assert!(matches!(config.kind, EffectKind::Reverb { .. }));
                assert_eq!(config.target, EffectTarget::Master);
                assert_eq!(config.wet, 0.4);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn chain_walks_next_links() {
        let chain = Block::new("a", BlockKind::Rest { beats: 1.0 }).with_next(
            Block::new("b", BlockKind::Rest { beats: 2.0 })
                .with_next(Block::new("c", BlockKind::Rest { beats: 4.0 })),
        );
        let ids: Vec<&str> = chain.chain().map(|block| block.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn hats_are_recognized() {
        let forest = BlockForest {
            blocks: vec![
                Block::new("h1", BlockKind::OnKey {
                    key: "KeyA".to_string(),
                    trigger: KeyTrigger::Press,
                    body: Vec::new(),
                }),
                Block::new("p1", BlockKind::Rest { beats: 1.0 }),
            ],
        };
        let hats: Vec<&str> = forest.hats().map(|block| block.id.as_str()).collect();
        assert_eq!(hats, ["h1"]);
    }
}
