//! Note name parsing and the chord table.
//!
//! Note names follow scientific pitch notation with lowercase or uppercase
//! letters: `c4`, `f#3`, `bb5`. Octave 4 holds middle C (MIDI 60).

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Parse a note name into its MIDI number.
pub fn note_to_midi(name: &str) -> Result<u8> {
    let mut chars = name.chars();
    let letter = chars
        .next()
        .ok_or_else(|| Error::UnknownNote(name.to_string()))?;
    let semitone: i32 = match letter.to_ascii_lowercase() {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return Err(Error::UnknownNote(name.to_string())),
    };

    let mut accidental = 0;
    let mut next = chars.next();
    match next {
        Some('#') => {
            accidental = 1;
            next = chars.next();
        }
        Some('b') => {
            accidental = -1;
            next = chars.next();
        }
        _ => {}
    }

    let octave = match next {
        Some(digit) if digit.is_ascii_digit() => digit as i32 - '0' as i32,
        _ => return Err(Error::UnknownNote(name.to_string())),
    };
    if chars.next().is_some() {
        return Err(Error::UnknownNote(name.to_string()));
    }

    let midi = (octave + 1) * 12 + semitone + accidental;
    if !(0..=127).contains(&midi) {
        return Err(Error::UnknownNote(name.to_string()));
    }
    Ok(midi as u8)
}

/// Equal-tempered frequency of a MIDI note, A4 = 440 Hz.
pub fn midi_to_hz(midi: u8) -> f32 {
    440.0 * 2.0_f32.powf((f32::from(midi) - 69.0) / 12.0)
}

/// Note name of a MIDI number, spelled with sharps: 60 is `c4`, 61 is `c#4`.
pub fn midi_to_note(midi: u8) -> String {
    const NAMES: [&str; 12] = [
        "c", "c#", "d", "d#", "e", "f", "f#", "g", "g#", "a", "a#", "b",
    ];
    let octave = i32::from(midi) / 12 - 1;
    format!("{}{}", NAMES[midi as usize % 12], octave)
}

/// Shift a MIDI note by semitones, clamped to the MIDI range.
pub fn transpose(midi: u8, semitones: i32) -> u8 {
    (i32::from(midi) + semitones).clamp(0, 127) as u8
}

/// Named chords resolving to MIDI note sets.
///
/// Seeded with major, minor, and seventh chords on every root in octave 4;
/// programs can define or override entries, and a reset restores the seeds.
pub struct ChordTable {
    chords: Mutex<HashMap<String, Vec<u8>>>,
}

const ROOTS: [(&str, u8); 12] = [
    ("C", 60),
    ("C#", 61),
    ("D", 62),
    ("D#", 63),
    ("E", 64),
    ("F", 65),
    ("F#", 66),
    ("G", 67),
    ("G#", 68),
    ("A", 69),
    ("A#", 70),
    ("B", 71),
];

const QUALITIES: [(&str, &[i32]); 5] = [
    ("", &[0, 4, 7]),
    ("m", &[0, 3, 7]),
    ("7", &[0, 4, 7, 10]),
    ("maj7", &[0, 4, 7, 11]),
    ("m7", &[0, 3, 7, 10]),
];

fn standard_chords() -> HashMap<String, Vec<u8>> {
    let mut chords = HashMap::new();
    for (root_name, root_midi) in ROOTS {
        for (suffix, intervals) in QUALITIES {
            let notes: Vec<u8> = intervals
                .iter()
                .map(|interval| transpose(root_midi, *interval))
                .collect();
            chords.insert(format!("{root_name}{suffix}"), notes);
        }
    }
    chords
}

impl ChordTable {
    pub fn new() -> Self {
        Self {
            chords: Mutex::new(standard_chords()),
        }
    }

    /// Define or override a chord from note names. Unparseable notes fail
    /// the whole definition so a chord is never installed half-formed.
    pub fn define(&self, name: &str, notes: &[String]) -> Result<()> {
        let midi: Result<Vec<u8>> = notes.iter().map(|note| note_to_midi(note)).collect();
        self.chords.lock().insert(name.to_string(), midi?);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Vec<u8>> {
        self.chords.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.chords.lock().contains_key(name)
    }

    /// Drop user definitions and restore the seeded table.
    pub fn reset(&self) {
        *self.chords.lock() = standard_chords();
    }
}

impl Default for ChordTable {
    fn default() -> Self {
        Self::new()
    }
}
