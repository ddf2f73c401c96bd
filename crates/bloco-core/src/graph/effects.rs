//! Effect kinds, chain configuration, and fundsp unit construction.
//!
//! Every effect is a stereo (2-in 2-out) unit wrapped in a wet/dry mix.
//! Parameters fall into two groups:
//! - live parameters are backed by [`Shared`] values and can be written from
//!   any thread while the node plays (wet mix, filter cutoff, drive, rates);
//! - structural parameters are baked into the unit at construction and only
//!   change on a chain rebuild (delay time, reverb size, crush levels).

use fundsp::net::NodeId;
use fundsp::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Where an effect chain hangs: the master bus or one instrument's channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectTarget {
    Master,
    Instrument(String),
}

impl EffectTarget {
    pub fn describe(&self) -> String {
        match self {
            EffectTarget::Master => "master".to_string(),
            EffectTarget::Instrument(name) => name.clone(),
        }
    }
}

/// Filter response shape for the filter effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterShape {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
}

/// Tagged effect variants with their construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum EffectKind {
    Distortion {
        drive: f32,
    },
    Reverb {
        room_size: f32,
        time: f32,
    },
    Delay {
        time: f32,
        feedback: f32,
    },
    Filter {
        shape: FilterShape,
        cutoff: f32,
        q: f32,
    },
    Compressor {
        attack: f32,
        release: f32,
    },
    Limiter {
        attack: f32,
        release: f32,
    },
    BitCrush {
        levels: f32,
    },
    Chorus {
        separation: f32,
        variation: f32,
        mod_frequency: f32,
    },
    Phaser {
        rate: f32,
        depth: f32,
    },
    AutoPan {
        rate: f32,
        depth: f32,
    },
    Tremolo {
        rate: f32,
        depth: f32,
    },
}

impl EffectKind {
    /// Canonical lowercase name, used for chain lookups and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Distortion { .. } => "distortion",
            EffectKind::Reverb { .. } => "reverb",
            EffectKind::Delay { .. } => "delay",
            EffectKind::Filter { .. } => "filter",
            EffectKind::Compressor { .. } => "compressor",
            EffectKind::Limiter { .. } => "limiter",
            EffectKind::BitCrush { .. } => "bitcrush",
            EffectKind::Chorus { .. } => "chorus",
            EffectKind::Phaser { .. } => "phaser",
            EffectKind::AutoPan { .. } => "autopan",
            EffectKind::Tremolo { .. } => "tremolo",
        }
    }

    /// Construct a kind with default parameters from its canonical name.
    ///
    /// Returns `None` for unknown names; callers skip the config (no instance
    /// is created) per the configuration-error policy.
    pub fn from_name(name: &str) -> Option<EffectKind> {
        let kind = match name {
            "distortion" => EffectKind::Distortion { drive: 2.0 },
            "reverb" => EffectKind::Reverb {
                room_size: 10.0,
                time: 2.0,
            },
            "delay" => EffectKind::Delay {
                time: 0.25,
                feedback: 0.35,
            },
            "filter" => EffectKind::Filter {
                shape: FilterShape::Lowpass,
                cutoff: 1200.0,
                q: 0.7,
            },
            "compressor" => EffectKind::Compressor {
                attack: 0.05,
                release: 0.2,
            },
            "limiter" => EffectKind::Limiter {
                attack: 0.005,
                release: 0.05,
            },
            "bitcrush" => EffectKind::BitCrush { levels: 16.0 },
            "chorus" => EffectKind::Chorus {
                separation: 0.015,
                variation: 0.005,
                mod_frequency: 0.5,
            },
            "phaser" => EffectKind::Phaser {
                rate: 0.5,
                depth: 0.5,
            },
            "autopan" => EffectKind::AutoPan {
                rate: 1.0,
                depth: 1.0,
            },
            "tremolo" => EffectKind::Tremolo {
                rate: 4.0,
                depth: 0.5,
            },
            _ => return None,
        };
        Some(kind)
    }

    /// Override one named construction parameter. Returns false when the kind
    /// has no such parameter.
    pub fn set_param(&mut self, param: &str, value: f32) -> bool {
        match (self, param) {
            (EffectKind::Distortion { drive }, "drive") => *drive = value,
            (EffectKind::Reverb { room_size, .. }, "room_size") => *room_size = value,
            (EffectKind::Reverb { time, .. }, "time") => *time = value,
            (EffectKind::Delay { time, .. }, "time") => *time = value,
            (EffectKind::Delay { feedback, .. }, "feedback") => *feedback = value,
            (EffectKind::Filter { cutoff, .. }, "cutoff") => *cutoff = value,
            (EffectKind::Filter { q, .. }, "q") => *q = value,
            (EffectKind::Filter { shape, .. }, "shape") => {
                *shape = match value as i32 {
                    1 => FilterShape::Highpass,
                    2 => FilterShape::Bandpass,
                    _ => FilterShape::Lowpass,
                }
            }
            (EffectKind::Compressor { attack, .. }, "attack") => *attack = value,
            (EffectKind::Compressor { release, .. }, "release") => *release = value,
            (EffectKind::Limiter { attack, .. }, "attack") => *attack = value,
            (EffectKind::Limiter { release, .. }, "release") => *release = value,
            (EffectKind::BitCrush { levels }, "levels") => *levels = value,
            (EffectKind::Chorus { separation, .. }, "separation") => *separation = value,
            (EffectKind::Chorus { variation, .. }, "variation") => *variation = value,
            (EffectKind::Chorus { mod_frequency, .. }, "mod_frequency") => *mod_frequency = value,
            (EffectKind::Phaser { rate, .. }, "rate") => *rate = value,
            (EffectKind::Phaser { depth, .. }, "depth") => *depth = value,
            (EffectKind::AutoPan { rate, .. }, "rate") => *rate = value,
            (EffectKind::AutoPan { depth, .. }, "depth") => *depth = value,
            (EffectKind::Tremolo { rate, .. }, "rate") => *rate = value,
            (EffectKind::Tremolo { depth, .. }, "depth") => *depth = value,
            _ => return false,
        }
        true
    }
}

/// One entry of an effect-chain configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    pub kind: EffectKind,
    pub target: EffectTarget,
    /// Wet mix in 0..=1; 1.0 is a full insert.
    #[serde(default = "default_wet")]
    pub wet: f32,
}

fn default_wet() -> f32 {
    1.0
}

impl EffectConfig {
    pub fn new(kind: EffectKind, target: EffectTarget) -> Self {
        Self {
            kind,
            target,
            wet: 1.0,
        }
    }

    pub fn with_wet(mut self, wet: f32) -> Self {
        self.wet = wet.clamp(0.0, 1.0);
        self
    }
}

/// Shared handles for parameters that stay writable while the node plays.
pub(crate) enum LiveParams {
    Fixed,
    Drive { drive: Shared },
    Filter { cutoff: Shared, q: Shared },
    Delay { feedback: Shared },
    Modulated { rate: Shared, depth: Shared },
}

/// A constructed effect living in the net.
pub(crate) struct EffectInstance {
    pub config: EffectConfig,
    pub node: NodeId,
    pub wet: Shared,
    pub dry: Shared,
    pub live: LiveParams,
}

impl EffectInstance {
    /// Write one live parameter. Returns false when the parameter is unknown
    /// or fixed at construction time for this kind.
    pub fn set_live_param(&self, param: &str, value: f32) -> bool {
        if param == "wet" {
            let wet = value.clamp(0.0, 1.0);
            self.wet.set_value(wet);
            self.dry.set_value(1.0 - wet);
            return true;
        }
        match (&self.live, param) {
            (LiveParams::Drive { drive }, "drive") => drive.set_value(value),
            (LiveParams::Filter { cutoff, .. }, "cutoff") => cutoff.set_value(value.max(10.0)),
            (LiveParams::Filter { q, .. }, "q") => q.set_value(value.max(0.1)),
            (LiveParams::Delay { feedback }, "feedback") => {
                feedback.set_value(value.clamp(0.0, 0.95))
            }
            (LiveParams::Modulated { rate, .. }, "rate") => rate.set_value(value.max(0.0)),
            (LiveParams::Modulated { depth, .. }, "depth") => {
                depth.set_value(value.clamp(0.0, 1.0))
            }
            _ => return false,
        }
        true
    }
}

/// Built unit plus its live handles, ready to be pushed into the net.
pub(crate) struct BuiltEffect {
    pub unit: Box<dyn AudioUnit>,
    pub wet: Shared,
    pub dry: Shared,
    pub live: LiveParams,
}

/// Wrap a stereo effect expression in a live wet/dry mix.
fn wet_dry<X>(fx: An<X>, wet: &Shared, dry: &Shared) -> Box<dyn AudioUnit>
where
    X: AudioNode<Inputs = U2, Outputs = U2> + Send + Sync + 'static,
{
    Box::new(fx * (var(wet) | var(wet)) & multipass::<U2>() * (var(dry) | var(dry)))
}

/// Construct the fundsp unit for a config.
pub(crate) fn build_effect(config: &EffectConfig) -> BuiltEffect {
    let wet = shared(config.wet.clamp(0.0, 1.0));
    let dry = shared(1.0 - config.wet.clamp(0.0, 1.0));

    let (unit, live) = match &config.kind {
        EffectKind::Distortion { drive } => {
            let drive_s = shared(*drive);
            let unit = wet_dry(
                multipass::<U2>() * (var(&drive_s) | var(&drive_s))
                    >> (shape(Tanh(1.0)) | shape(Tanh(1.0))),
                &wet,
                &dry,
            );
            (unit, LiveParams::Drive { drive: drive_s })
        }
        EffectKind::Reverb { room_size, time } => {
            let unit = wet_dry(
                reverb_stereo(*room_size as f64, *time as f64, 0.5),
                &wet,
                &dry,
            );
            (unit, LiveParams::Fixed)
        }
        EffectKind::Delay { time, feedback } => {
            let fb = shared(feedback.clamp(0.0, 0.95));
            let time = time.max(0.001);
            let unit = wet_dry(
                feedback_unit(time, &fb) | feedback_unit(time, &fb),
                &wet,
                &dry,
            );
            (unit, LiveParams::Delay { feedback: fb })
        }
        EffectKind::Filter { shape, cutoff, q } => {
            let cutoff_s = shared(cutoff.max(10.0));
            let q_s = shared(q.max(0.1));
            let unit = match shape {
                FilterShape::Lowpass => wet_dry(
                    (filter_input(&cutoff_s, &q_s) >> lowpass::<f32>())
                        | (filter_input(&cutoff_s, &q_s) >> lowpass::<f32>()),
                    &wet,
                    &dry,
                ),
                FilterShape::Highpass => wet_dry(
                    (filter_input(&cutoff_s, &q_s) >> highpass::<f32>())
                        | (filter_input(&cutoff_s, &q_s) >> highpass::<f32>()),
                    &wet,
                    &dry,
                ),
                FilterShape::Bandpass => wet_dry(
                    (filter_input(&cutoff_s, &q_s) >> bandpass::<f32>())
                        | (filter_input(&cutoff_s, &q_s) >> bandpass::<f32>()),
                    &wet,
                    &dry,
                ),
            };
            (
                unit,
                LiveParams::Filter {
                    cutoff: cutoff_s,
                    q: q_s,
                },
            )
        }
        EffectKind::Compressor { attack, release } | EffectKind::Limiter { attack, release } => {
            let unit = wet_dry(
                limiter_stereo(attack.max(0.001), release.max(0.005)),
                &wet,
                &dry,
            );
            (unit, LiveParams::Fixed)
        }
        EffectKind::BitCrush { levels } => {
            let levels = levels.max(1.0);
            let unit = wet_dry(
                shape(Crush(levels)) | shape(Crush(levels)),
                &wet,
                &dry,
            );
            (unit, LiveParams::Fixed)
        }
        EffectKind::Chorus {
            separation,
            variation,
            mod_frequency,
        } => {
            let unit = wet_dry(
                chorus(0, *separation, *variation, *mod_frequency)
                    | chorus(1, *separation, *variation, *mod_frequency),
                &wet,
                &dry,
            );
            (unit, LiveParams::Fixed)
        }
        EffectKind::Phaser { rate, depth } => {
            let rate_s = shared(*rate);
            let depth_s = shared(depth.clamp(0.0, 1.0));
            let unit = wet_dry(
                swept_notch(&rate_s, &depth_s, 0.0) | swept_notch(&rate_s, &depth_s, 0.25),
                &wet,
                &dry,
            );
            (
                unit,
                LiveParams::Modulated {
                    rate: rate_s,
                    depth: depth_s,
                },
            )
        }
        EffectKind::AutoPan { rate, depth } => {
            let rate_s = shared(*rate);
            let depth_s = shared(depth.clamp(0.0, 1.0));
            let (rl, dl) = (rate_s.clone(), depth_s.clone());
            let (rr, dr) = (rate_s.clone(), depth_s.clone());
            let unit = wet_dry(
                multipass::<U2>()
                    * (lfo(move |t: f32| {
                        let s = (TAU * rl.value() * t).sin();
                        1.0 - dl.value() * (s + 1.0) * 0.5
                    }) | lfo(move |t: f32| {
                        let s = (TAU * rr.value() * t).sin();
                        1.0 - dr.value() * (1.0 - s) * 0.5
                    })),
                &wet,
                &dry,
            );
            (
                unit,
                LiveParams::Modulated {
                    rate: rate_s,
                    depth: depth_s,
                },
            )
        }
        EffectKind::Tremolo { rate, depth } => {
            let rate_s = shared(*rate);
            let depth_s = shared(depth.clamp(0.0, 1.0));
            let (rl, dl) = (rate_s.clone(), depth_s.clone());
            let (rr, dr) = (rate_s.clone(), depth_s.clone());
            let unit = wet_dry(
                multipass::<U2>()
                    * (lfo(move |t: f32| {
                        1.0 - dl.value() * (0.5 + 0.5 * (TAU * rl.value() * t).sin())
                    }) | lfo(move |t: f32| {
                        1.0 - dr.value() * (0.5 + 0.5 * (TAU * rr.value() * t).sin())
                    })),
                &wet,
                &dry,
            );
            (
                unit,
                LiveParams::Modulated {
                    rate: rate_s,
                    depth: depth_s,
                },
            )
        }
    };

    BuiltEffect {
        unit,
        wet,
        dry,
        live,
    }
}

/// Mono feedback delay with a live feedback amount.
fn feedback_unit(
    time: f32,
    fb: &Shared,
) -> An<impl AudioNode<Inputs = U1, Outputs = U1> + Send + Sync> {
    feedback(delay(time as f64) * var(fb))
}

/// Audio plus live cutoff/q control inputs for a 3-input filter opcode.
fn filter_input(
    cutoff: &Shared,
    q: &Shared,
) -> An<impl AudioNode<Inputs = U1, Outputs = U3> + Send + Sync> {
    pass() | var(cutoff) | var(q)
}

/// One notch filter swept by a sine LFO; the phaser stacks two with offset
/// phases for stereo movement.
fn swept_notch(
    rate: &Shared,
    depth: &Shared,
    phase: f32,
) -> An<impl AudioNode<Inputs = U1, Outputs = U1> + Send + Sync> {
    let (rate, depth) = (rate.clone(), depth.clone());
    (pass()
        | lfo(move |t: f32| {
            let sweep = (TAU * (rate.value() * t + phase)).sin();
            800.0 + 600.0 * depth.value() * sweep
        })
        | dc(2.0))
        >> notch::<f32>()
}
