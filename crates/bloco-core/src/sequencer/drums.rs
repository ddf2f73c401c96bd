//! Built-in drum voices and the hidden drum bus.
//!
//! Drums are synthesized, not sampled: a kick is a pitch-swept sine, snare
//! and hats are enveloped noise, a clap is a cluster of noise bursts. Every
//! hit builds a fresh one-shot unit and schedules it on a dedicated event
//! sequencer whose backend feeds the reserved [`DRUM_CHANNEL`] strip, so
//! drums mix, mute, and take effects like any other channel.

use crate::graph::{BlocoNet, GraphManager};
use fundsp::net::NodeId;
use fundsp::prelude::*;
use fundsp::sequencer::{Fade, Sequencer};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reserved mixer channel the drum machine plays through.
pub const DRUM_CHANNEL: &str = "drums";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrumKind {
    Kick,
    Snare,
    ClosedHat,
    OpenHat,
    Clap,
}

impl DrumKind {
    pub fn name(&self) -> &'static str {
        match self {
            DrumKind::Kick => "kick",
            DrumKind::Snare => "snare",
            DrumKind::ClosedHat => "closed_hat",
            DrumKind::OpenHat => "open_hat",
            DrumKind::Clap => "clap",
        }
    }

    /// Resolve a user-facing source name. Case, underscores, and hyphens
    /// are ignored, so `KICK`, `kick`, and `closed_hat` all land.
    pub fn from_name(name: &str) -> Option<DrumKind> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "kick" => Some(DrumKind::Kick),
            "snare" => Some(DrumKind::Snare),
            "closedhat" | "hihat" | "hat" => Some(DrumKind::ClosedHat),
            "openhat" => Some(DrumKind::OpenHat),
            "clap" => Some(DrumKind::Clap),
            _ => None,
        }
    }

    /// How long one hit rings before the scheduler fades it out.
    pub fn duration_secs(&self) -> f64 {
        match self {
            DrumKind::Kick => 0.35,
            DrumKind::Snare => 0.3,
            DrumKind::ClosedHat => 0.15,
            DrumKind::OpenHat => 0.8,
            DrumKind::Clap => 0.4,
        }
    }
}

/// Clap envelope: three tight pre-echoes, then a longer main decay.
fn clap_envelope(t: f32) -> f32 {
    let mut level: f32 = 0.0;
    for (burst, start) in [0.0f32, 0.01, 0.02, 0.03].into_iter().enumerate() {
        if t >= start {
            let decay = if burst == 3 { 18.0 } else { 80.0 };
            level = level.max(((start - t) * decay).exp());
        }
    }
    level
}

/// Build one stereo one-shot for a drum hit.
pub(crate) fn build_drum_voice(kind: DrumKind, velocity: f32) -> Box<dyn AudioUnit> {
    let velocity = velocity.clamp(0.0, 1.0);
    match kind {
        DrumKind::Kick => {
            // 60 Hz fundamental swept down from 4x by a fast pitch envelope.
            let sweep = lfo(|t: f32| 60.0 * (1.0 + 3.0 * (-t * 150.0).exp()));
            Box::new(
                (sweep >> sine::<f32>()) * lfo(|t: f32| (-t * 35.0).exp()) * velocity >> pan(0.0),
            )
        }
        DrumKind::Snare => {
            let body = sine_hz::<f32>(200.0) * 0.5 + noise() * 0.5;
            Box::new(body * lfo(|t: f32| (-t * 20.0).exp()) * velocity >> pan(0.0))
        }
        DrumKind::ClosedHat => Box::new(
            (noise() >> highpass_hz(6000.0, 0.7))
                * lfo(|t: f32| (-t * 50.0).exp())
                * (velocity * 0.5)
                >> pan(0.0),
        ),
        DrumKind::OpenHat => Box::new(
            (noise() >> highpass_hz(6000.0, 0.7))
                * lfo(|t: f32| (-t * 6.0).exp())
                * (velocity * 0.5)
                >> pan(0.0),
        ),
        DrumKind::Clap => Box::new(
            (noise() >> bandpass_hz(1100.0, 2.0)) * lfo(clap_envelope) * velocity >> pan(0.0),
        ),
    }
}

struct DrumInner {
    seq: Sequencer,
    node: NodeId,
}

/// One-shot scheduler behind the reserved drum channel.
pub struct DrumMachine {
    inner: Mutex<DrumInner>,
}

impl DrumMachine {
    /// Install the drum sequencer in the net and wire it to the
    /// [`DRUM_CHANNEL`] strip, creating the strip if needed.
    pub fn new(net: &Arc<Mutex<BlocoNet>>, graph: &GraphManager) -> Self {
        Self {
            inner: Mutex::new(install(net, graph)),
        }
    }

    pub fn node(&self) -> NodeId {
        self.inner.lock().node
    }

    /// Schedule one hit. `start_secs` is relative to now.
    pub fn trigger(&self, kind: DrumKind, velocity: f32, start_secs: f64) {
        let unit = build_drum_voice(kind, velocity);
        let start = start_secs.max(0.0);
        let end = start + kind.duration_secs();
        self.inner
            .lock()
            .seq
            .push_relative(start, end, Fade::Smooth, 0.0, 0.02, unit);
    }

    /// Remove the drum node and its channel from the graph.
    pub fn dispose(&self, net: &Arc<Mutex<BlocoNet>>, graph: &GraphManager) {
        let inner = self.inner.lock();
        graph.disconnect_instrument(DRUM_CHANNEL);
        graph.remove_channel(DRUM_CHANNEL);
        let mut net = net.lock();
        if net.contains(inner.node) {
            let _ = net.remove(inner.node);
            net.commit();
        }
    }

    /// Throw away the machine's node and pending hits and reinstall a
    /// fresh one. Used by the engine reset after the graph is cleared.
    pub fn rebuild(&self, net: &Arc<Mutex<BlocoNet>>, graph: &GraphManager) {
        let mut inner = self.inner.lock();
        {
            let mut net = net.lock();
            if net.contains(inner.node) {
                let _ = net.remove(inner.node);
                net.commit();
            }
        }
        *inner = install(net, graph);
    }
}

fn install(net: &Arc<Mutex<BlocoNet>>, graph: &GraphManager) -> DrumInner {
    let mut seq = Sequencer::new(false, 2);
    let backend = seq.backend();
    let node = {
        let mut net = net.lock();
        let node = net.add(Box::new(backend));
        net.commit();
        node
    };
    graph.connect_instrument(DRUM_CHANNEL, node);
    DrumInner { seq, node }
}
