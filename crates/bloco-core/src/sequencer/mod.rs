//! Musical scheduling: drum hits, step patterns, and melody strings.
//!
//! [`SequencerManager`] is the playing surface compiled programs talk to.
//! It resolves note and chord tokens against the chord table, applies the
//! global transposition, converts beats to seconds through the transport,
//! and hands triggers to the instrument and drum layers. Per the error
//! policy, nothing here throws into a running script: bad tokens, unknown
//! sources, and not-yet-loaded samples degrade to a warning and a skipped
//! trigger, and each `play_*` call reports how many triggers it scheduled.

pub(crate) mod drums;
pub(crate) mod melody;
pub(crate) mod notes;
pub(crate) mod steps;

// Re-export essential types
pub use drums::{DrumKind, DrumMachine, DRUM_CHANNEL};
pub use melody::{parse_melody, MelodyEvent, MelodyPitch};
pub use notes::{midi_to_hz, midi_to_note, note_to_midi, transpose, ChordTable};
pub use steps::{StepPattern, StepSlot, STEPS_PER_MEASURE};

use crate::instrument::InstrumentManager;
use crate::run_state::RunToken;
use crate::transport::{Transport, BEATS_PER_MEASURE};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Velocity used when a block does not specify one.
const DEFAULT_VELOCITY: f32 = 0.8;
/// Pitch for a plain `x` hit on a pitched source, before transposition.
const DEFAULT_STEP_NOTE: u8 = 60;
/// Longest uninterrupted sleep inside a blocking wait. Cancellation takes
/// effect within one slice instead of at the end of the whole wait.
const WAIT_SLICE_SECS: f64 = 0.05;

/// Sleep for `seconds`, re-checking `run` once per slice.
async fn sleep_cancellable(seconds: f64, run: &RunToken) {
    let mut remaining = seconds.max(0.0);
    while remaining > 0.0 && !run.is_cancelled() {
        let slice = remaining.min(WAIT_SLICE_SECS);
        tokio::time::sleep(Duration::from_secs_f64(slice)).await;
        remaining -= slice;
    }
}

pub struct SequencerManager {
    instruments: Arc<InstrumentManager>,
    drums: Arc<DrumMachine>,
    transport: Transport,
    chords: ChordTable,
    transposition: AtomicI32,
}

impl SequencerManager {
    pub fn new(
        instruments: Arc<InstrumentManager>,
        drums: Arc<DrumMachine>,
        transport: Transport,
    ) -> Self {
        Self {
            instruments,
            drums,
            transport,
            chords: ChordTable::new(),
            transposition: AtomicI32::new(0),
        }
    }

    /// Shift every subsequent pitched trigger by `semitones`.
    pub fn set_transposition(&self, semitones: i32) {
        self.transposition.store(semitones, Ordering::Relaxed);
    }

    pub fn transposition(&self) -> i32 {
        self.transposition.load(Ordering::Relaxed)
    }

    pub fn chords(&self) -> &ChordTable {
        &self.chords
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Schedule one drum hit `time_secs` from now. Drums ignore the
    /// transposition.
    pub fn play_drum(&self, kind: DrumKind, velocity: f32, time_secs: f64) {
        self.drums.trigger(kind, velocity, time_secs);
    }

    /// Trigger a note or chord token on an instrument for `beats`.
    ///
    /// A `None` instrument targets the current one. Returns the number of
    /// triggers scheduled; unknown tokens and missing instruments warn and
    /// schedule nothing.
    pub fn play_note(
        &self,
        instrument: Option<&str>,
        token: &str,
        beats: f64,
        velocity: f32,
    ) -> usize {
        let Some(name) = self.target_instrument(instrument) else {
            return 0;
        };
        let Some(midis) = self.resolve_token(token, false) else {
            warn!("Unknown note or chord '{}'", token);
            return 0;
        };
        let duration = self.transport.beats_to_seconds(beats.max(0.0));
        self.trigger_all(&name, &midis, velocity, 0.0, duration)
    }

    /// Schedule one measure of a sixteen-slot step pattern starting at
    /// `time_secs` from now.
    ///
    /// `source` is a drum kind (`KICK`, `SNARE`, ...) or an instrument
    /// name. Slot tokens pin a hit to a pitch; `is_chord_pattern` makes
    /// ambiguous tokens resolve as chords before notes. Returns the number
    /// of triggers scheduled.
    pub fn play_rhythm_step(
        &self,
        source: &str,
        pattern: &[String],
        time_secs: f64,
        measure_index: usize,
        is_chord_pattern: bool,
    ) -> usize {
        let pattern = match StepPattern::parse_tokens(pattern) {
            Ok(pattern) => pattern,
            Err(err) => {
                warn!("Skipping rhythm step for '{}': {}", source, err);
                return 0;
            }
        };
        let step = self.transport.step_seconds();

        let scheduled = if let Some(kind) = DrumKind::from_name(source) {
            self.schedule_drum_hits(kind, &pattern, time_secs, step)
        } else if self.instruments.has_instrument(source) {
            self.schedule_pitched_hits(source, &pattern, time_secs, step, is_chord_pattern)
        } else {
            warn!("Rhythm step targets unknown source '{}'", source);
            0
        };
        debug!(
            "Measure {}: scheduled {} triggers for '{}'",
            measure_index, scheduled, source
        );
        scheduled
    }

    /// Play a melody string on an instrument.
    ///
    /// With a `start_time` the whole string is converted to scheduled
    /// triggers at accumulating offsets and the call returns immediately.
    /// Without one, playback is blocking: each note is triggered, then the
    /// call sleeps for the note's length, re-checking `run` after every
    /// sleep and returning early once cancelled. Returns the number of
    /// notes triggered.
    pub async fn play_melody(
        &self,
        text: &str,
        target: Option<&str>,
        start_time: Option<f64>,
        run: &RunToken,
    ) -> usize {
        let Some(name) = self.target_instrument(target) else {
            return 0;
        };
        let events = parse_melody(text);
        if events.is_empty() {
            return 0;
        }
        let shift = self.transposition();

        if let Some(base) = start_time {
            let mut offset = base.max(0.0);
            let mut played = 0;
            for event in &events {
                let seconds = self.transport.beats_to_seconds(event.beats);
                if let MelodyPitch::Note(midi) = event.pitch {
                    let midi = transpose(midi, shift);
                    played +=
                        self.trigger_all(&name, &[midi], DEFAULT_VELOCITY, offset, seconds);
                }
                offset += seconds;
            }
            return played;
        }

        let mut played = 0;
        for event in &events {
            if run.is_cancelled() {
                return played;
            }
            let seconds = self.transport.beats_to_seconds(event.beats);
            if let MelodyPitch::Note(midi) = event.pitch {
                let midi = transpose(midi, shift);
                played += self.trigger_all(&name, &[midi], DEFAULT_VELOCITY, 0.0, seconds);
            }
            sleep_cancellable(seconds, run).await;
        }
        played
    }

    /// Click one measure's worth of hats per `measures`, blocking a beat
    /// per click. Cancellation stops the clicks early.
    pub async fn count_in(&self, measures: u32, run: &RunToken) {
        let clicks = measures.saturating_mul(BEATS_PER_MEASURE as u32);
        let beat = self.transport.beats_to_seconds(1.0);
        for _ in 0..clicks {
            if run.is_cancelled() {
                return;
            }
            self.drums.trigger(DrumKind::ClosedHat, 0.6, 0.0);
            sleep_cancellable(beat, run).await;
        }
    }

    /// Block for a musical duration at the current tempo.
    pub async fn wait_musical(&self, beats: f64, run: &RunToken) {
        let seconds = self.transport.beats_to_seconds(beats.max(0.0));
        sleep_cancellable(seconds, run).await;
    }

    /// Block for a wall-clock duration.
    pub async fn wait_seconds(&self, seconds: f64, run: &RunToken) {
        sleep_cancellable(seconds, run).await;
    }

    /// Clear transposition and restore the seeded chord table.
    pub fn reset(&self) {
        self.transposition.store(0, Ordering::Relaxed);
        self.chords.reset();
    }

    fn target_instrument(&self, explicit: Option<&str>) -> Option<String> {
        match explicit {
            Some(name) if self.instruments.has_instrument(name) => Some(name.to_string()),
            Some(name) => {
                warn!("Unknown instrument '{}'", name);
                None
            }
            None => {
                let current = self.instruments.current_instrument();
                if current.is_none() {
                    warn!("No current instrument to play on");
                }
                current
            }
        }
    }

    /// Resolve a token to transposed MIDI notes. `chord_first` decides how
    /// a token that parses both ways (a chord named like a note) lands.
    fn resolve_token(&self, token: &str, chord_first: bool) -> Option<Vec<u8>> {
        let shift = self.transposition();
        let as_note = || note_to_midi(token).ok().map(|midi| vec![midi]);
        let as_chord = || self.chords.resolve(token);
        let midis = if chord_first {
            as_chord().or_else(as_note)
        } else {
            as_note().or_else(as_chord)
        }?;
        Some(midis.into_iter().map(|midi| transpose(midi, shift)).collect())
    }

    fn trigger_all(
        &self,
        name: &str,
        midis: &[u8],
        velocity: f32,
        start: f64,
        duration: f64,
    ) -> usize {
        let mut scheduled = 0;
        for &midi in midis {
            match self
                .instruments
                .trigger(name, midi, velocity, start, Some(duration))
            {
                Ok(()) => scheduled += 1,
                Err(err) => warn!("Dropping trigger on '{}': {}", name, err),
            }
        }
        scheduled
    }

    fn schedule_drum_hits(
        &self,
        default_kind: DrumKind,
        pattern: &StepPattern,
        base: f64,
        step: f64,
    ) -> usize {
        let mut scheduled = 0;
        for (slot_index, slot) in pattern.hits() {
            let kind = match slot {
                StepSlot::Hit => default_kind,
                StepSlot::Token(token) => match DrumKind::from_name(token) {
                    Some(kind) => kind,
                    None => {
                        warn!("Unknown drum '{}' in slot {}", token, slot_index);
                        continue;
                    }
                },
                StepSlot::Rest => continue,
            };
            self.drums
                .trigger(kind, DEFAULT_VELOCITY, base + slot_index as f64 * step);
            scheduled += 1;
        }
        scheduled
    }

    fn schedule_pitched_hits(
        &self,
        source: &str,
        pattern: &StepPattern,
        base: f64,
        step: f64,
        chord_first: bool,
    ) -> usize {
        let shift = self.transposition();
        // A hit holds for its slot, leaving a small gap before the next.
        let gate = step * 0.9;
        let mut scheduled = 0;
        for (slot_index, slot) in pattern.hits() {
            let midis = match slot {
                StepSlot::Hit => vec![transpose(DEFAULT_STEP_NOTE, shift)],
                StepSlot::Token(token) => match self.resolve_token(token, chord_first) {
                    Some(midis) => midis,
                    None => {
                        warn!("Unknown token '{}' in slot {}", token, slot_index);
                        continue;
                    }
                },
                StepSlot::Rest => continue,
            };
            let at = base + slot_index as f64 * step;
            scheduled += self.trigger_all(source, &midis, DEFAULT_VELOCITY, at, gate);
        }
        scheduled
    }
}
