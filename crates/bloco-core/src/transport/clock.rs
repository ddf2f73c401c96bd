//! Musical clock shared by the sequencer, loop scheduler, and engine.
//!
//! All fields are lock-free atomics behind `Arc`, so clones of [`Transport`]
//! observe the same clock. The loop scheduler thread advances the beat
//! position while the transport is playing.

use crate::error::{Error, Result};
use crate::lockfree::{AtomicDouble, AtomicFlag, AtomicFloat};
use std::sync::Arc;

pub const DEFAULT_TEMPO: f32 = 120.0;
pub const MIN_TEMPO: f32 = 20.0;
pub const MAX_TEMPO: f32 = 400.0;

/// Beats per measure; patterns are one measure of sixteen sixteenth steps.
pub const BEATS_PER_MEASURE: f64 = 4.0;

#[derive(Clone)]
pub struct Transport {
    tempo: Arc<AtomicFloat>,
    playing: Arc<AtomicFlag>,
    position_beats: Arc<AtomicDouble>,
}

impl Transport {
    pub fn new(tempo: f32) -> Self {
        Self {
            tempo: Arc::new(AtomicFloat::new(tempo.clamp(MIN_TEMPO, MAX_TEMPO))),
            playing: Arc::new(AtomicFlag::new(false)),
            position_beats: Arc::new(AtomicDouble::new(0.0)),
        }
    }

    pub fn tempo(&self) -> f32 {
        self.tempo.get()
    }

    /// Set the tempo in beats per minute. Out-of-range values are rejected
    /// so a bad setup block cannot stall or runaway the clock.
    pub fn set_tempo(&self, bpm: f32) -> Result<()> {
        if !bpm.is_finite() || !(MIN_TEMPO..=MAX_TEMPO).contains(&bpm) {
            return Err(Error::InvalidTempo(bpm));
        }
        self.tempo.set(bpm);
        Ok(())
    }

    pub fn start(&self) {
        self.playing.set(true);
    }

    pub fn stop(&self) {
        self.playing.set(false);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.get()
    }

    pub fn position_beats(&self) -> f64 {
        self.position_beats.get()
    }

    pub fn set_position_beats(&self, beats: f64) {
        self.position_beats.set(beats);
    }

    /// Stop and rewind to beat zero.
    pub fn zero(&self) {
        self.playing.set(false);
        self.position_beats.set(0.0);
    }

    /// Advance the clock by wall time. Returns the new position.
    pub fn advance_seconds(&self, seconds: f64) -> f64 {
        self.position_beats.add(seconds * self.beats_per_second())
    }

    pub fn beats_per_second(&self) -> f64 {
        f64::from(self.tempo.get()) / 60.0
    }

    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * 60.0 / f64::from(self.tempo.get())
    }

    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        seconds * self.beats_per_second()
    }

    /// Seconds spanned by one sixteen-step pattern measure.
    pub fn measure_seconds(&self) -> f64 {
        self.beats_to_seconds(BEATS_PER_MEASURE)
    }

    /// Seconds spanned by one sixteenth-note pattern step.
    pub fn step_seconds(&self) -> f64 {
        self.beats_to_seconds(BEATS_PER_MEASURE / 16.0)
    }
}

/// Beats named by a symbolic duration, in plain words (`"quarter"`) or
/// staff notation (`"4n"`, `"1m"`). `None` for anything unrecognized.
pub fn duration_to_beats(symbol: &str) -> Option<f64> {
    let normalized: String = symbol
        .chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "measure" | "1m" => Some(BEATS_PER_MEASURE),
        "whole" | "1n" => Some(4.0),
        "half" | "2n" => Some(2.0),
        "quarter" | "4n" => Some(1.0),
        "eighth" | "8n" => Some(0.5),
        "sixteenth" | "16n" => Some(0.25),
        "thirtysecond" | "32n" => Some(0.125),
        _ => None,
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_conversions() {
        let transport = Transport::new(120.0);
        assert_eq!(transport.beats_per_second(), 2.0);
        assert_eq!(transport.beats_to_seconds(2.0), 1.0);
        assert_eq!(transport.seconds_to_beats(0.5), 1.0);
        assert_eq!(transport.measure_seconds(), 2.0);
        assert_eq!(transport.step_seconds(), 0.125);
    }

    #[test]
    fn set_tempo_rejects_out_of_range() {
        let transport = Transport::default();
        assert!(transport.set_tempo(90.0).is_ok());
        assert!(transport.set_tempo(0.0).is_err());
        assert!(transport.set_tempo(-10.0).is_err());
        assert!(transport.set_tempo(f32::NAN).is_err());
        assert!(transport.set_tempo(10_000.0).is_err());
        assert_eq!(transport.tempo(), 90.0);
    }

    #[test]
    fn zero_stops_and_rewinds() {
        let transport = Transport::default();
        transport.start();
        transport.advance_seconds(1.5);
        assert!(transport.is_playing());
        assert!(transport.position_beats() > 0.0);

        transport.zero();
        assert!(!transport.is_playing());
        assert_eq!(transport.position_beats(), 0.0);
    }

    #[test]
    fn clones_share_the_clock() {
        let transport = Transport::default();
        let other = transport.clone();
        transport.advance_seconds(1.0);
        assert_eq!(other.position_beats(), transport.position_beats());
    }

    #[test]
    fn symbolic_durations_resolve() {
        assert_eq!(duration_to_beats("measure"), Some(4.0));
        assert_eq!(duration_to_beats("1m"), Some(4.0));
        assert_eq!(duration_to_beats("quarter"), Some(1.0));
        assert_eq!(duration_to_beats("8n"), Some(0.5));
        assert_eq!(duration_to_beats("Thirty_Second"), Some(0.125));
        assert_eq!(duration_to_beats("5n"), None);
    }
}
