//! Async script execution against a live audio system.
//!
//! Execution is cooperative: the run token is re-checked after every await,
//! so stopping a run takes effect at the next wait point rather than
//! mid-statement. Configuration mistakes (bad tempo, unknown instruments,
//! unknown procedures) log and skip; nothing a script does can take the
//! engine down.

use crate::blocks::{Expr, NumExpr};
use crate::script::{CompiledProgram, Script, Stmt};
use bloco_core::{
    BlocoSystem, LoopCallback, LoopTick, RunToken, BEATS_PER_MEASURE,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Interprets compiled scripts against one [`BlocoSystem`].
///
/// The executor is shared between the main program and event handlers, so
/// the variable table and procedure library live behind shared maps.
/// Cloning is cheap; clones act on the same state.
#[derive(Clone)]
pub struct Executor {
    system: Arc<BlocoSystem>,
    variables: Arc<DashMap<String, String>>,
    procedures: Arc<RwLock<HashMap<String, Arc<Script>>>>,
}

impl Executor {
    pub fn new(system: Arc<BlocoSystem>) -> Self {
        Self {
            system,
            variables: Arc::new(DashMap::new()),
            procedures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn system(&self) -> &Arc<BlocoSystem> {
        &self.system
    }

    pub fn set_variable(&self, name: &str, value: impl Into<String>) {
        self.variables.insert(name.to_string(), value.into());
    }

    pub fn variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).map(|value| value.clone())
    }

    /// Replace the procedure library, usually from a freshly compiled
    /// program.
    pub fn install_procedures(&self, procedures: HashMap<String, Arc<Script>>) {
        *self.procedures.write() = procedures;
    }

    /// Drop all variables and procedures.
    pub fn clear(&self) {
        self.variables.clear();
        self.procedures.write().clear();
    }

    /// Run a whole program: supersede the previous run, then definitions,
    /// effect chains, setup, and execution in order. Returns the run's
    /// token so callers can watch for completion or cancel.
    pub async fn run_program(&self, program: &CompiledProgram) -> RunToken {
        let run = self.system.begin_run();
        self.run_program_with(program, &run).await;
        run
    }

    /// Run a compiled program under an already-issued token. Used when the
    /// caller needs the token before execution starts, e.g. to hand it out
    /// while the program runs on another task.
    pub async fn run_program_with(&self, program: &CompiledProgram, run: &RunToken) {
        self.install_procedures(program.procedures.clone());

        self.run_script(&program.definition, run).await;
        if run.is_cancelled() {
            return;
        }
        self.system
            .graph_manager()
            .rebuild_effect_chain(&program.effects);
        self.run_script(&program.setup, run).await;
        if run.is_cancelled() {
            return;
        }
        self.run_script(&program.execution, run).await;
    }

    /// Run one script under `run`, returning early once the token cancels.
    pub fn run_script<'a>(
        &'a self,
        script: &'a [Stmt],
        run: &'a RunToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            for stmt in script {
                if run.is_cancelled() {
                    return;
                }
                self.exec_stmt(stmt, run).await;
            }
        })
    }

    async fn exec_stmt(&self, stmt: &Stmt, run: &RunToken) {
        match stmt {
            Stmt::DefineInstrument {
                name,
                kind,
                envelope,
                polyphony,
            } => {
                self.system.instruments().create_instrument(
                    name,
                    kind.clone(),
                    *envelope,
                    polyphony.unwrap_or_default(),
                );
            }
            Stmt::DefineChord { name, notes } => {
                if let Err(err) = self.system.sequencer().chords().define(name, notes) {
                    warn!("Skipping chord '{}': {}", name, err);
                }
            }
            Stmt::StartStepSequence {
                key,
                source,
                rows,
                is_chord,
            } => self.start_step_sequence(key, source, rows, *is_chord, run),
            Stmt::PlayNote {
                instrument,
                note,
                beats,
                velocity,
            } => {
                let token = self.resolve(note);
                let velocity = self.resolve_number(velocity, 0.8);
                self.system
                    .sequencer()
                    .play_note(instrument.as_deref(), &token, *beats, velocity);
                self.system.sequencer().wait_musical(*beats, run).await;
            }
            Stmt::PlayDrum { drum, velocity } => {
                let velocity = self.resolve_number(velocity, 0.8);
                self.system.sequencer().play_drum(*drum, velocity, 0.0);
            }
            Stmt::PlayMelody { melody, instrument } => {
                let text = self.resolve(melody);
                self.system
                    .sequencer()
                    .play_melody(&text, instrument.as_deref(), None, run)
                    .await;
            }
            Stmt::Rest { beats } => self.system.sequencer().wait_musical(*beats, run).await,
            Stmt::WaitSeconds { seconds } => {
                self.system.sequencer().wait_seconds(*seconds, run).await
            }
            Stmt::CountIn { measures } => self.system.sequencer().count_in(*measures, run).await,
            Stmt::SetTempo { bpm } => {
                if let Err(err) = self.system.transport().set_tempo(*bpm) {
                    warn!("Skipping tempo change: {}", err);
                }
            }
            Stmt::SetTransposition { semitones } => {
                self.system.sequencer().set_transposition(*semitones)
            }
            Stmt::SwitchInstrument { name } => {
                if let Err(err) = self.system.instruments().transition_to(name) {
                    warn!("Skipping instrument switch: {}", err);
                }
            }
            Stmt::SetEnvelope {
                instrument,
                envelope,
            } => {
                if let Err(err) = self.system.instruments().set_envelope(instrument, *envelope) {
                    warn!("Skipping envelope change for '{}': {}", instrument, err);
                }
            }
            Stmt::UpdateEffectParam {
                target,
                effect,
                param,
                value,
                index,
            } => {
                self.system
                    .graph_manager()
                    .update_effect_param(target, effect, param, *value, *index);
            }
            Stmt::ClearEffects { target } => self.system.graph_manager().clear_effects(target),
            Stmt::SetChannelGain { channel, gain } => {
                self.system.graph_manager().set_channel_gain(channel, *gain)
            }
            Stmt::SetChannelMuted { channel, muted } => self
                .system
                .graph_manager()
                .set_channel_muted(channel, *muted),
            Stmt::SetChannelSoloed { channel, soloed } => self
                .system
                .graph_manager()
                .set_channel_soloed(channel, *soloed),
            Stmt::SetMasterVolume { volume } => {
                self.system.graph_manager().set_master_volume(*volume)
            }
            Stmt::Repeat { times, body } => {
                for _ in 0..*times {
                    if run.is_cancelled() {
                        return;
                    }
                    self.run_script(body, run).await;
                }
            }
            Stmt::StartLoop {
                key,
                interval_beats,
                body,
            } => self.start_loop(key, *interval_beats, body, run),
            Stmt::AtOffset { offset_beats, body } => {
                let seconds = self.system.transport().beats_to_seconds(*offset_beats);
                let executor = self.clone();
                let body = body.clone();
                let run = run.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
                    if run.is_cancelled() {
                        return;
                    }
                    executor.run_script(&body, &run).await;
                });
            }
            Stmt::SetVariable { name, value } => {
                let value = self.resolve(value);
                self.variables.insert(name.clone(), value);
            }
            Stmt::CallProcedure { name } => {
                let body = self.procedures.read().get(name).cloned();
                match body {
                    Some(body) => self.run_script(&body, run).await,
                    None => warn!("Unknown procedure '{}'", name),
                }
            }
        }
    }

    /// Text value of an expression; unset variables resolve to empty text.
    fn resolve(&self, expr: &Expr) -> String {
        match expr {
            Expr::Text(text) => text.clone(),
            Expr::Var { var } => match self.variables.get(var) {
                Some(value) => value.clone(),
                None => {
                    warn!("Variable '{}' is not set", var);
                    String::new()
                }
            },
        }
    }

    /// Numeric value of an expression; unset or non-numeric variables fall
    /// back to `default`.
    fn resolve_number(&self, expr: &NumExpr, default: f32) -> f32 {
        match expr {
            NumExpr::Value(value) => *value as f32,
            NumExpr::Var { var } => match self.variables.get(var) {
                Some(value) => value.parse().unwrap_or_else(|_| {
                    warn!("Variable '{}' is not a number: '{}'", var, *value);
                    default
                }),
                None => {
                    warn!("Variable '{}' is not set", var);
                    default
                }
            },
        }
    }

    /// Install a transport loop whose body is a script.
    ///
    /// The loop thread only flags the tick; the body itself runs on the
    /// async runtime so its waits never stall other loops.
    fn start_loop(&self, key: &str, interval_beats: f64, body: &Script, run: &RunToken) {
        let executor = self.clone();
        let body = Arc::new(body.clone());
        let run = run.clone();
        let handle = tokio::runtime::Handle::current();
        let callback: LoopCallback = Arc::new(move |tick: LoopTick| {
            if run.is_cancelled() {
                return;
            }
            debug!("Loop tick {} at beat {:.2}", tick.iteration, tick.beat);
            let executor = executor.clone();
            let body = Arc::clone(&body);
            let run = run.clone();
            handle.spawn(async move {
                executor.run_script(&body, &run).await;
            });
        });
        self.system
            .loops()
            .start_loop(key, interval_beats, 0.0, callback);
    }

    /// Install the measure-synced loop behind a step-sequence block. Each
    /// fire schedules one measure row; rows cycle by iteration.
    fn start_step_sequence(
        &self,
        key: &str,
        source: &str,
        rows: &[Vec<String>],
        is_chord: bool,
        run: &RunToken,
    ) {
        if rows.is_empty() {
            warn!("Step sequence for '{}' has no rows", source);
            return;
        }
        let sequencer = Arc::clone(self.system.sequencer());
        let source = source.to_string();
        let rows = Arc::new(rows.to_vec());
        let run = run.clone();
        let callback: LoopCallback = Arc::new(move |tick: LoopTick| {
            if run.is_cancelled() {
                return;
            }
            let measure = tick.iteration as usize % rows.len();
            sequencer.play_rhythm_step(&source, &rows[measure], 0.0, measure, is_chord);
        });
        self.system
            .loops()
            .start_loop(key, BEATS_PER_MEASURE, 0.0, callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloco_core::{BlocoSystemBuilder, InstrumentKind, Waveform};
    use std::time::Instant;

    fn rig() -> (Arc<BlocoSystem>, Executor) {
        let system = Arc::new(BlocoSystemBuilder::default().build().unwrap());
        let executor = Executor::new(Arc::clone(&system));
        (system, executor)
    }

    fn define_lead() -> Stmt {
        Stmt::DefineInstrument {
            name: "lead".to_string(),
            kind: InstrumentKind::Oscillator {
                wave: Waveform::Sine,
            },
            envelope: None,
            polyphony: None,
        }
    }

    #[tokio::test]
    async fn definition_statements_create_instruments_and_chords() {
        let (system, executor) = rig();
        let run = system.begin_run();
        executor
            .run_script(
                &[
                    define_lead(),
                    Stmt::DefineChord {
                        name: "Stack".to_string(),
                        notes: vec!["c4".to_string(), "g4".to_string()],
                    },
                ],
                &run,
            )
            .await;

        assert!(system.instruments().has_instrument("lead"));
        assert_eq!(
            system.sequencer().chords().resolve("Stack"),
            Some(vec![60, 67])
        );
    }

    #[tokio::test]
    async fn variables_flow_into_play_statements() {
        let (system, executor) = rig();
        let run = system.begin_run();
        executor
            .run_script(
                &[
                    define_lead(),
                    Stmt::SetVariable {
                        name: "tune".to_string(),
                        value: Expr::text("c4"),
                    },
                    Stmt::PlayNote {
                        instrument: None,
                        note: Expr::var("tune"),
                        beats: 0.05,
                        velocity: NumExpr::value(0.8),
                    },
                ],
                &run,
            )
            .await;
        assert_eq!(system.instruments().active_voice_count("lead"), 1);
    }

    #[tokio::test]
    async fn repeat_runs_its_body_each_time() {
        let (system, executor) = rig();
        let run = system.begin_run();
        executor
            .run_script(
                &[
                    define_lead(),
                    Stmt::Repeat {
                        times: 3,
                        body: vec![Stmt::PlayNote {
                            instrument: None,
                            note: Expr::text("c4"),
                            beats: 0.02,
                            velocity: NumExpr::value(0.8),
                        }],
                    },
                ],
                &run,
            )
            .await;
        assert_eq!(system.instruments().active_voice_count("lead"), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_cuts_a_run_short() {
        let (system, executor) = rig();
        let run = system.begin_run();
        let script = vec![
            define_lead(),
            Stmt::WaitSeconds { seconds: 10.0 },
            Stmt::PlayNote {
                instrument: None,
                note: Expr::text("c4"),
                beats: 1.0,
                velocity: NumExpr::value(0.8),
            },
        ];

        let task = {
            let executor = executor.clone();
            let run = run.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                executor.run_script(&script, &run).await;
                started.elapsed()
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        system.run_state().cancel();
        let elapsed = task.await.unwrap();

        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(system.instruments().active_voice_count("lead"), 0);
    }

    #[tokio::test]
    async fn loops_replace_by_block_identity() {
        let (system, executor) = rig();
        let run = system.begin_run();
        let make = |beats: f64| Stmt::StartLoop {
            key: "block-7".to_string(),
            interval_beats: beats,
            body: vec![Stmt::PlayDrum {
                drum: bloco_core::DrumKind::Kick,
                velocity: NumExpr::value(0.8),
            }],
        };
        executor.run_script(&[make(4.0), make(2.0)], &run).await;
        assert_eq!(system.loops().active_count(), 1);
        assert!(system.loops().has_loop("block-7"));
    }

    #[tokio::test]
    async fn step_sequences_install_measure_loops() {
        let (system, executor) = rig();
        let run = system.begin_run();
        let row: Vec<String> = "x---x---x---x---"
            .chars()
            .map(|c| c.to_string())
            .collect();
        executor
            .run_script(
                &[Stmt::StartStepSequence {
                    key: "seq-1".to_string(),
                    source: "kick".to_string(),
                    rows: vec![row],
                    is_chord: false,
                }],
                &run,
            )
            .await;
        assert!(system.loops().has_loop("seq-1"));
    }

    #[tokio::test]
    async fn unknown_procedures_skip_without_stopping_the_run() {
        let (system, executor) = rig();
        let run = system.begin_run();
        executor
            .run_script(
                &[
                    define_lead(),
                    Stmt::CallProcedure {
                        name: "nope".to_string(),
                    },
                    Stmt::PlayNote {
                        instrument: None,
                        note: Expr::text("c4"),
                        beats: 0.02,
                        velocity: NumExpr::value(0.8),
                    },
                ],
                &run,
            )
            .await;
        assert_eq!(system.instruments().active_voice_count("lead"), 1);
    }

    #[tokio::test]
    async fn run_program_wires_procedures_and_effects() {
        let (system, executor) = rig();
        let mut program = CompiledProgram::default();
        program.definition = vec![define_lead()];
        program.procedures.insert(
            "riff".to_string(),
            Arc::new(vec![Stmt::PlayNote {
                instrument: None,
                note: Expr::text("e4"),
                beats: 0.02,
                velocity: NumExpr::value(0.8),
            }]),
        );
        program.execution = vec![Stmt::CallProcedure {
            name: "riff".to_string(),
        }];
        program.code = "x".to_string();

        let run = executor.run_program(&program).await;
        assert!(run.is_running());
        assert_eq!(system.instruments().active_voice_count("lead"), 1);
    }
}
