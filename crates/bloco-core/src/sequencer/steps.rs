//! Sixteen-step rhythm patterns.
//!
//! One pattern covers one measure: sixteen sixteenth-note slots. A slot is
//! `.` or `-` for a rest, `x` for a plain hit, or a note/chord token that
//! pins the hit to a pitch. Token validity is resolved at trigger time
//! against the chord table and the active instrument.

use crate::error::{Error, Result};

pub const STEPS_PER_MEASURE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSlot {
    Rest,
    /// Plain hit at the source's default pitch.
    Hit,
    /// Hit pinned to a note name or chord name.
    Token(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPattern {
    slots: Vec<StepSlot>,
}

impl StepPattern {
    /// Parse a sixteen-token pattern. Any other length is rejected so a
    /// half-filled block does not silently shift the groove.
    pub fn parse_tokens(tokens: &[String]) -> Result<Self> {
        if tokens.len() != STEPS_PER_MEASURE {
            return Err(Error::InvalidPattern(tokens.len()));
        }
        let slots = tokens.iter().map(|token| parse_slot(token)).collect();
        Ok(Self { slots })
    }

    /// Parse a compact pattern string, one character per slot.
    pub fn parse_str(pattern: &str) -> Result<Self> {
        let tokens: Vec<String> = pattern.chars().map(|c| c.to_string()).collect();
        Self::parse_tokens(&tokens)
    }

    pub fn slots(&self) -> &[StepSlot] {
        &self.slots
    }

    /// Indices of slots that trigger, with their tokens.
    pub fn hits(&self) -> impl Iterator<Item = (usize, &StepSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !matches!(slot, StepSlot::Rest))
    }
}

fn parse_slot(token: &str) -> StepSlot {
    match token.trim() {
        "" | "." | "-" => StepSlot::Rest,
        "x" | "X" => StepSlot::Hit,
        other => StepSlot::Token(other.to_string()),
    }
}
