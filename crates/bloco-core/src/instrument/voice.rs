//! Instrument definitions and per-trigger voice construction.
//!
//! Every trigger builds a fresh stereo unit that the instrument's event
//! sequencer schedules and fades out. The envelope gate is held high for
//! the unit's whole life; release shaping comes from the scheduled fade.

use fundsp::net::Net;
use fundsp::prelude::*;
use fundsp::wave::Wave;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Middle C, the reference pitch for sample playback speed.
pub(crate) const SAMPLER_ROOT_HZ: f32 = 261.626;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Sine,
    Saw,
    Square,
    Triangle,
}

/// One partial of an additive instrument: a frequency ratio against the
/// fundamental and its amplitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Partial {
    pub ratio: f32,
    pub amp: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrumentKind {
    Oscillator {
        wave: Waveform,
    },
    /// Explicit partial list. Amplitudes summing above one are normalized
    /// by the sum so stacked partials cannot clip.
    Additive {
        partials: Vec<Partial>,
    },
    /// Integer harmonic series with geometric rolloff.
    Harmonics {
        count: usize,
        rolloff: f32,
    },
    /// Pitched playback of a loaded sample, rooted at middle C.
    Sampler {
        path: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Polyphony {
    Poly { max_voices: usize },
    Mono,
}

impl Default for Polyphony {
    fn default() -> Self {
        Polyphony::Poly { max_voices: 8 }
    }
}

/// Attack/decay/sustain section with the gate held high.
fn envelope_unit(
    envelope: &EnvelopeConfig,
) -> An<impl AudioNode<Inputs = U0, Outputs = U1> + Send + Sync> {
    dc(1.0)
        >> adsr_live(
            envelope.attack.max(0.0),
            envelope.decay.max(0.0),
            envelope.sustain.clamp(0.0, 1.0),
            envelope.release.max(0.001),
        )
}

/// Build one stereo voice for a trigger.
///
/// `sample` is only consulted for sampler instruments; a missing sample
/// yields a silent unit rather than a panic.
pub(crate) fn build_voice(
    kind: &InstrumentKind,
    envelope: &EnvelopeConfig,
    freq: f32,
    velocity: f32,
    sample: Option<&Arc<Wave>>,
) -> Box<dyn AudioUnit> {
    let velocity = velocity.clamp(0.0, 1.0);
    match kind {
        InstrumentKind::Oscillator { wave } => match wave {
            Waveform::Sine => {
                Box::new(sine_hz::<f32>(freq) * envelope_unit(envelope) * velocity >> pan(0.0))
            }
            Waveform::Saw => {
                Box::new(saw_hz(freq) * envelope_unit(envelope) * velocity >> pan(0.0))
            }
            Waveform::Square => {
                Box::new(square_hz(freq) * envelope_unit(envelope) * velocity >> pan(0.0))
            }
            Waveform::Triangle => {
                Box::new(triangle_hz(freq) * envelope_unit(envelope) * velocity >> pan(0.0))
            }
        },
        InstrumentKind::Additive { partials } => {
            additive_voice(partials, envelope, freq, velocity)
        }
        InstrumentKind::Harmonics { count, rolloff } => {
            let count = (*count).clamp(1, 32);
            let partials: Vec<Partial> = (0..count)
                .map(|index| Partial {
                    ratio: (index + 1) as f32,
                    amp: rolloff.clamp(0.0, 1.0).powi(index as i32),
                })
                .collect();
            additive_voice(&partials, envelope, freq, velocity)
        }
        InstrumentKind::Sampler { .. } => match sample {
            Some(wave) => {
                let speed = freq / SAMPLER_ROOT_HZ;
                Box::new(
                    (constant(speed) >> resample(wavech(wave, 0, None)))
                        * envelope_unit(envelope)
                        * velocity
                        >> pan(0.0),
                )
            }
            None => Box::new(zero() | zero()),
        },
    }
}

/// Assemble a partial bank as a small net: oscillators into an adder tree,
/// through a shared envelope VCA, out through a center pan.
fn additive_voice(
    partials: &[Partial],
    envelope: &EnvelopeConfig,
    freq: f32,
    velocity: f32,
) -> Box<dyn AudioUnit> {
    let amp_sum: f32 = partials.iter().map(|p| p.amp.max(0.0)).sum();
    let scale = if amp_sum > 1.0 { 1.0 / amp_sum } else { 1.0 };

    let mut net = Net::new(0, 2);
    let mut level: Vec<_> = partials
        .iter()
        .filter(|p| p.amp > 0.0 && p.ratio > 0.0)
        .map(|p| net.push(Box::new(sine_hz::<f32>(freq * p.ratio) * (p.amp * scale))))
        .collect();
    if level.is_empty() {
        level.push(net.push(Box::new(zero())));
    }
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            if pair.len() == 1 {
                next.push(pair[0]);
                continue;
            }
            let adder = net.push(Box::new(pass() + pass()));
            net.connect(pair[0], 0, adder, 0);
            net.connect(pair[1], 0, adder, 1);
            next.push(adder);
        }
        level = next;
    }

    let vca = net.push(Box::new(pass() * pass()));
    let env_node = net.push(Box::new(envelope_unit(envelope) * velocity));
    net.connect(level[0], 0, vca, 0);
    net.connect(env_node, 0, vca, 1);
    let pan_node = net.push(Box::new(pan(0.0)));
    net.connect(vca, 0, pan_node, 0);
    net.pipe_output(pan_node);
    Box::new(net)
}
