//! Compact melody string parsing.
//!
//! A melody is a list of tokens separated by whitespace or commas. Each
//! token is a pitch (`c4`, `f#3`) or a rest (`r`), followed by an optional
//! duration letter and modifiers:
//!
//! | letter | length        | beats |
//! |--------|---------------|-------|
//! | `w`    | whole         | 4     |
//! | `h`    | half          | 2     |
//! | `q`    | quarter       | 1     |
//! | `e`    | eighth        | 0.5   |
//! | `s`    | sixteenth     | 0.25  |
//! | `t`    | thirty-second | 0.125 |
//!
//! A missing letter means a quarter. `.` after the letter lengthens by half
//! (`q.` is 1.5 beats) and `3` makes a triplet member (two thirds), and the
//! two combine. Tokens that fail to parse are skipped with a warning so one
//! typo does not silence the rest of the line.

use super::notes::note_to_midi;
use crate::error::{Error, Result};
use tracing::warn;

/// One parsed melody token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MelodyEvent {
    pub pitch: MelodyPitch,
    pub beats: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MelodyPitch {
    Note(u8),
    Rest,
}

/// Parse a whole melody string, dropping malformed tokens.
pub fn parse_melody(input: &str) -> Vec<MelodyEvent> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .filter_map(|token| match parse_token(token) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!("Skipping melody token '{}': {}", token, err);
                None
            }
        })
        .collect()
}

/// Parse one melody token.
pub fn parse_token(token: &str) -> Result<MelodyEvent> {
    if let Some(rest) = token.strip_prefix(['r', 'R']) {
        // 'r' alone could also start no known pitch, so rests are unambiguous.
        return Ok(MelodyEvent {
            pitch: MelodyPitch::Rest,
            beats: parse_duration(token, rest)?,
        });
    }

    let pitch_len = pitch_length(token)?;
    let midi = note_to_midi(&token[..pitch_len])?;
    Ok(MelodyEvent {
        pitch: MelodyPitch::Note(midi),
        beats: parse_duration(token, &token[pitch_len..])?,
    })
}

/// Length in bytes of the pitch part: letter, optional accidental, octave.
fn pitch_length(token: &str) -> Result<usize> {
    let bytes = token.as_bytes();
    match bytes.first() {
        Some(letter) if letter.is_ascii_alphabetic() => {}
        _ => return Err(Error::UnknownNote(token.to_string())),
    }
    let mut len = 1;
    if matches!(bytes.get(len), Some(b'#') | Some(b'b')) {
        len += 1;
    }
    match bytes.get(len) {
        Some(digit) if digit.is_ascii_digit() => Ok(len + 1),
        _ => Err(Error::UnknownNote(token.to_string())),
    }
}

/// Parse the duration letter and modifiers that follow a pitch.
fn parse_duration(token: &str, suffix: &str) -> Result<f64> {
    let mut chars = suffix.chars().peekable();
    let mut beats = match chars.peek() {
        Some('w') => 4.0,
        Some('h') => 2.0,
        Some('q') => 1.0,
        Some('e') => 0.5,
        Some('s') => 0.25,
        Some('t') => 0.125,
        _ => 1.0,
    };
    if matches!(chars.peek(), Some('w' | 'h' | 'q' | 'e' | 's' | 't')) {
        chars.next();
    }
    for modifier in chars {
        match modifier {
            '.' => beats *= 1.5,
            '3' => beats *= 2.0 / 3.0,
            _ => return Err(Error::UnknownNote(token.to_string())),
        }
    }
    Ok(beats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(token: &str) -> MelodyEvent {
        parse_token(token).unwrap()
    }

    #[test]
    fn default_duration_is_a_quarter() {
        assert_eq!(
            note("c4"),
            MelodyEvent {
                pitch: MelodyPitch::Note(60),
                beats: 1.0
            }
        );
    }

    #[test]
    fn duration_letters_scale_beats() {
        assert_eq!(note("c4w").beats, 4.0);
        assert_eq!(note("c4h").beats, 2.0);
        assert_eq!(note("c4e").beats, 0.5);
        assert_eq!(note("c4s").beats, 0.25);
        assert_eq!(note("c4t").beats, 0.125);
    }

    #[test]
    fn modifiers_combine() {
        assert_eq!(note("c4q.").beats, 1.5);
        assert!((note("c4q3").beats - 2.0 / 3.0).abs() < 1e-9);
        assert!((note("c4h.3").beats - 2.0).abs() < 1e-9);
        assert_eq!(note("c4.").beats, 1.5);
    }

    #[test]
    fn rests_carry_durations() {
        assert_eq!(note("r").pitch, MelodyPitch::Rest);
        assert_eq!(note("rh").beats, 2.0);
        assert_eq!(note("re.").beats, 0.75);
    }

    #[test]
    fn sharp_and_flat_pitches() {
        assert_eq!(note("f#3q").pitch, MelodyPitch::Note(54));
        assert_eq!(note("bb3").pitch, MelodyPitch::Note(58));
    }

    #[test]
    fn melody_splits_on_whitespace_and_commas() {
        let events = parse_melody("c4e d4e, e4q  r f4h");
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].beats, 0.5);
        assert_eq!(events[3].pitch, MelodyPitch::Rest);
        assert_eq!(events[4].beats, 2.0);
    }

    #[test]
    fn malformed_tokens_are_skipped() {
        let events = parse_melody("c4 zz9 d4x e4");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].pitch, MelodyPitch::Note(60));
        assert_eq!(events[1].pitch, MelodyPitch::Note(64));
    }
}
