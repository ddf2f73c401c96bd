//! Instrument lifecycle: creation, triggering, release, and disposal.
//!
//! Each instrument owns a fundsp event sequencer whose backend node feeds
//! the instrument's mixer channel. Triggers schedule freshly built voice
//! units; releases fade scheduled events out over the envelope release.
//!
//! Envelope settings are remembered per instrument name, so re-creating
//! "Lead" after a reset brings its tweaked envelope back.

pub(crate) mod sampler;
pub(crate) mod voice;

// Re-export essential types
pub use voice::{EnvelopeConfig, InstrumentKind, Partial, Polyphony, Waveform};

use crate::error::{Error, Result};
use crate::graph::{BlocoNet, GraphManager};
use crate::sequencer::notes::midi_to_hz;
use fundsp::net::NodeId;
use fundsp::sequencer::{Fade, Sequencer};
use fundsp::wave::Wave;
use parking_lot::Mutex;
use sampler::{empty_slot, SampleLoader, SampleSlot};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use voice::build_voice;

struct ActiveVoice {
    id: fundsp::sequencer::EventId,
    /// MIDI note the voice is sounding, for release-by-note. Timed notes
    /// also expire on their own.
    note: Option<u8>,
    expires_at: Option<Instant>,
}

struct InstrumentEntry {
    kind: InstrumentKind,
    envelope: EnvelopeConfig,
    polyphony: Polyphony,
    seq: Sequencer,
    node: NodeId,
    active: Vec<ActiveVoice>,
    sample: Option<SampleSlot>,
}

pub struct InstrumentManager {
    net: Arc<Mutex<BlocoNet>>,
    graph: Arc<GraphManager>,
    entries: Mutex<HashMap<String, InstrumentEntry>>,
    remembered_envelopes: Mutex<HashMap<String, EnvelopeConfig>>,
    current: Mutex<Option<String>>,
    loader: SampleLoader,
}

impl InstrumentManager {
    pub fn new(net: Arc<Mutex<BlocoNet>>, graph: Arc<GraphManager>) -> Self {
        Self {
            net,
            graph,
            entries: Mutex::new(HashMap::new()),
            remembered_envelopes: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            loader: SampleLoader::new(),
        }
    }

    /// Create an instrument under `name`, replacing any previous one.
    ///
    /// Without an explicit envelope the remembered envelope for this name
    /// applies, falling back to the default. The first instrument created
    /// becomes the current instrument.
    pub fn create_instrument(
        &self,
        name: &str,
        kind: InstrumentKind,
        envelope: Option<EnvelopeConfig>,
        polyphony: Polyphony,
    ) {
        if self.has_instrument(name) {
            self.dispose_instrument(name);
        }

        let envelope = envelope
            .or_else(|| self.remembered_envelopes.lock().get(name).copied())
            .unwrap_or_default();
        self.remembered_envelopes
            .lock()
            .insert(name.to_string(), envelope);

        let sample = match &kind {
            InstrumentKind::Sampler { path } => {
                let slot = empty_slot();
                self.loader.request(name, Path::new(path), slot.clone());
                Some(slot)
            }
            _ => None,
        };

        let mut seq = Sequencer::new(false, 2);
        let backend = seq.backend();
        let node = {
            let mut net = self.net.lock();
            let node = net.add(Box::new(backend));
            net.commit();
            node
        };
        self.graph.connect_instrument(name, node);

        self.entries.lock().insert(
            name.to_string(),
            InstrumentEntry {
                kind,
                envelope,
                polyphony,
                seq,
                node,
                active: Vec::new(),
                sample,
            },
        );

        let mut current = self.current.lock();
        if current.is_none() {
            *current = Some(name.to_string());
        }
        debug!("Created instrument '{}'", name);
    }

    /// Create a sampler instrument playing `path`, rooted at middle C.
    pub fn create_sampler(
        &self,
        name: &str,
        path: &str,
        envelope: Option<EnvelopeConfig>,
        polyphony: Polyphony,
    ) {
        self.create_instrument(
            name,
            InstrumentKind::Sampler {
                path: path.to_string(),
            },
            envelope,
            polyphony,
        );
    }

    /// Schedule one note. `start_secs` is relative to now; a `None` duration
    /// holds the note until [`InstrumentManager::release_note`].
    pub fn trigger(
        &self,
        name: &str,
        midi: u8,
        velocity: f32,
        start_secs: f64,
        duration_secs: Option<f64>,
    ) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| Error::UnknownInstrument(name.to_string()))?;

        let sample: Option<Arc<Wave>> = match (&entry.kind, &entry.sample) {
            (InstrumentKind::Sampler { .. }, Some(slot)) => match slot.load_full() {
                Some(wave) => Some(wave),
                None => return Err(Error::SampleNotReady(name.to_string())),
            },
            (InstrumentKind::Sampler { .. }, None) => {
                return Err(Error::SampleNotReady(name.to_string()))
            }
            _ => None,
        };

        let release = f64::from(entry.envelope.release.max(0.001));
        let now = Instant::now();
        entry.active.retain(|voice| match voice.expires_at {
            Some(expiry) => expiry > now,
            None => true,
        });

        let InstrumentEntry {
            seq,
            active,
            polyphony,
            ..
        } = entry;
        match polyphony {
            Polyphony::Mono => {
                for voice in active.drain(..) {
                    seq.edit_relative(voice.id, 0.0, release);
                }
            }
            Polyphony::Poly { max_voices } => {
                let cap = (*max_voices).max(1);
                while active.len() >= cap {
                    let oldest = active.remove(0);
                    seq.edit_relative(oldest.id, 0.0, release);
                }
            }
        }

        let unit = build_voice(
            &entry.kind,
            &entry.envelope,
            midi_to_hz(midi),
            velocity,
            sample.as_ref(),
        );
        let start = start_secs.max(0.0);
        match duration_secs {
            Some(duration) => {
                let end = start + duration.max(0.0);
                let id = entry
                    .seq
                    .push_relative(start, end, Fade::Smooth, 0.0, release, unit);
                entry.active.push(ActiveVoice {
                    id,
                    note: Some(midi),
                    expires_at: Some(now + Duration::from_secs_f64(end + release + 0.05)),
                });
            }
            None => {
                let id = entry.seq.push_relative(
                    start,
                    f64::INFINITY,
                    Fade::Smooth,
                    0.0,
                    release,
                    unit,
                );
                entry.active.push(ActiveVoice {
                    id,
                    note: Some(midi),
                    expires_at: None,
                });
            }
        }
        Ok(())
    }

    /// Fade out every voice playing `midi`, held or scheduled.
    pub fn release_note(&self, name: &str, midi: u8) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| Error::UnknownInstrument(name.to_string()))?;
        let release = f64::from(entry.envelope.release.max(0.001));
        let InstrumentEntry { seq, active, .. } = entry;
        active.retain(|voice| {
            if voice.note == Some(midi) {
                seq.edit_relative(voice.id, 0.0, release);
                false
            } else {
                true
            }
        });
        Ok(())
    }

    /// Fade out every voice of one instrument.
    pub fn release_all(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| Error::UnknownInstrument(name.to_string()))?;
        let release = f64::from(entry.envelope.release.max(0.001));
        let InstrumentEntry { seq, active, .. } = entry;
        for voice in active.drain(..) {
            seq.edit_relative(voice.id, 0.0, release);
        }
        Ok(())
    }

    /// Fade out every voice of every instrument.
    pub fn release_everything(&self) {
        let mut entries = self.entries.lock();
        for entry in entries.values_mut() {
            let release = f64::from(entry.envelope.release.max(0.001));
            let InstrumentEntry { seq, active, .. } = entry;
            for voice in active.drain(..) {
                seq.edit_relative(voice.id, 0.0, release);
            }
        }
    }

    /// Make `name` the current instrument, letting the outgoing one ring
    /// out. Unknown names leave the current instrument unchanged.
    pub fn transition_to(&self, name: &str) -> Result<()> {
        if !self.has_instrument(name) {
            return Err(Error::UnknownInstrument(name.to_string()));
        }
        let previous = {
            let mut current = self.current.lock();
            current.replace(name.to_string())
        };
        if let Some(previous) = previous {
            if previous != name {
                let _ = self.release_all(&previous);
            }
        }
        debug!("Current instrument is now '{}'", name);
        Ok(())
    }

    pub fn current_instrument(&self) -> Option<String> {
        self.current.lock().clone()
    }

    /// Update the envelope for future voices and remember it for this name.
    pub fn set_envelope(&self, name: &str, envelope: EnvelopeConfig) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| Error::UnknownInstrument(name.to_string()))?;
        entry.envelope = envelope;
        self.remembered_envelopes
            .lock()
            .insert(name.to_string(), envelope);
        Ok(())
    }

    pub fn envelope_snapshot(&self, name: &str) -> Option<EnvelopeConfig> {
        self.entries.lock().get(name).map(|entry| entry.envelope)
    }

    /// Remove the instrument's node and forget it. Its mixer channel and
    /// local effects stay in place for a successor of the same name.
    pub fn dispose_instrument(&self, name: &str) {
        let Some(entry) = self.entries.lock().remove(name) else {
            return;
        };
        {
            let mut net = self.net.lock();
            if net.contains(entry.node) {
                let _ = net.remove(entry.node);
                net.commit();
            }
        }
        self.graph.disconnect_instrument(name);
        let mut current = self.current.lock();
        if current.as_deref() == Some(name) {
            *current = None;
        }
        debug!("Disposed instrument '{}'", name);
    }

    pub fn dispose_all(&self) {
        let names: Vec<String> = self.entries.lock().keys().cloned().collect();
        for name in names {
            self.dispose_instrument(&name);
        }
    }

    pub fn has_instrument(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    pub fn instrument_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn kind_of(&self, name: &str) -> Option<InstrumentKind> {
        self.entries.lock().get(name).map(|entry| entry.kind.clone())
    }

    /// Whether a sampler has finished loading. Non-samplers are always ready.
    pub fn sample_ready(&self, name: &str) -> bool {
        match self.entries.lock().get(name) {
            Some(entry) => match &entry.sample {
                Some(slot) => slot.load().is_some(),
                None => true,
            },
            None => false,
        }
    }

    pub fn active_voice_count(&self, name: &str) -> usize {
        self.entries
            .lock()
            .get(name)
            .map(|entry| entry.active.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (InstrumentManager, Arc<Mutex<BlocoNet>>, Arc<GraphManager>) {
        let (net, _backend) = BlocoNet::stereo();
        let net = Arc::new(Mutex::new(net));
        let graph = Arc::new(GraphManager::new(net.clone()));
        (InstrumentManager::new(net.clone(), graph.clone()), net, graph)
    }

    fn sine_kind() -> InstrumentKind {
        InstrumentKind::Oscillator {
            wave: Waveform::Sine,
        }
    }

    #[test]
    fn first_instrument_becomes_current() {
        let (instruments, _net, _graph) = manager();
        instruments.create_instrument("lead", sine_kind(), None, Polyphony::default());
        instruments.create_instrument("bass", sine_kind(), None, Polyphony::default());
        assert_eq!(instruments.current_instrument().as_deref(), Some("lead"));
    }

    #[test]
    fn recreation_replaces_the_old_instrument() {
        let (instruments, _net, graph) = manager();
        instruments.create_instrument("lead", sine_kind(), None, Polyphony::default());
        instruments.create_instrument(
            "lead",
            InstrumentKind::Oscillator {
                wave: Waveform::Saw,
            },
            None,
            Polyphony::default(),
        );

        assert_eq!(instruments.instrument_names(), vec!["lead"]);
        assert_eq!(
            instruments.kind_of("lead"),
            Some(InstrumentKind::Oscillator {
                wave: Waveform::Saw
            })
        );
        // Replacement keeps it current and keeps its channel.
        assert_eq!(instruments.current_instrument().as_deref(), Some("lead"));
        assert!(graph.has_channel("lead"));
    }

    #[test]
    fn envelopes_are_remembered_per_name() {
        let (instruments, _net, _graph) = manager();
        instruments.create_instrument("lead", sine_kind(), None, Polyphony::default());
        let tweaked = EnvelopeConfig {
            attack: 0.2,
            ..EnvelopeConfig::default()
        };
        instruments.set_envelope("lead", tweaked).unwrap();

        instruments.dispose_instrument("lead");
        instruments.create_instrument("lead", sine_kind(), None, Polyphony::default());
        assert_eq!(instruments.envelope_snapshot("lead"), Some(tweaked));

        // An explicit envelope at creation overrides the memory.
        let fresh = EnvelopeConfig::default();
        instruments.create_instrument("lead", sine_kind(), Some(fresh), Polyphony::default());
        assert_eq!(instruments.envelope_snapshot("lead"), Some(fresh));
    }

    #[test]
    fn transition_to_unknown_is_an_error() {
        let (instruments, _net, _graph) = manager();
        instruments.create_instrument("lead", sine_kind(), None, Polyphony::default());
        assert!(instruments.transition_to("ghost").is_err());
        assert_eq!(instruments.current_instrument().as_deref(), Some("lead"));

        instruments.create_instrument("bass", sine_kind(), None, Polyphony::default());
        instruments.transition_to("bass").unwrap();
        assert_eq!(instruments.current_instrument().as_deref(), Some("bass"));
    }

    #[test]
    fn mono_retires_the_previous_voice() {
        let (instruments, _net, _graph) = manager();
        instruments.create_instrument("solo", sine_kind(), None, Polyphony::Mono);
        instruments.trigger("solo", 60, 0.8, 0.0, None).unwrap();
        instruments.trigger("solo", 64, 0.8, 0.0, None).unwrap();
        assert_eq!(instruments.active_voice_count("solo"), 1);
    }

    #[test]
    fn poly_caps_at_max_voices() {
        let (instruments, _net, _graph) = manager();
        instruments.create_instrument(
            "pad",
            sine_kind(),
            None,
            Polyphony::Poly { max_voices: 2 },
        );
        for midi in [60, 62, 64, 65] {
            instruments.trigger("pad", midi, 0.8, 0.0, None).unwrap();
        }
        assert_eq!(instruments.active_voice_count("pad"), 2);
    }

    #[test]
    fn release_note_drops_held_voices() {
        let (instruments, _net, _graph) = manager();
        instruments.create_instrument("lead", sine_kind(), None, Polyphony::default());
        instruments.trigger("lead", 60, 0.8, 0.0, None).unwrap();
        instruments.trigger("lead", 64, 0.8, 0.0, None).unwrap();

        instruments.release_note("lead", 60).unwrap();
        assert_eq!(instruments.active_voice_count("lead"), 1);
        instruments.release_all("lead").unwrap();
        assert_eq!(instruments.active_voice_count("lead"), 0);
    }

    #[test]
    fn trigger_unknown_instrument_errors() {
        let (instruments, _net, _graph) = manager();
        assert!(matches!(
            instruments.trigger("ghost", 60, 0.8, 0.0, None),
            Err(Error::UnknownInstrument(_))
        ));
    }

    #[test]
    fn sampler_triggers_drop_until_loaded() {
        let (instruments, _net, _graph) = manager();
        instruments.create_sampler("vox", "/nonexistent/vox.wav", None, Polyphony::default());
        assert!(!instruments.sample_ready("vox"));
        assert!(matches!(
            instruments.trigger("vox", 60, 0.8, 0.0, None),
            Err(Error::SampleNotReady(_))
        ));
        assert_eq!(instruments.active_voice_count("vox"), 0);
    }

    #[test]
    fn instrument_renders_through_the_bus() {
        let (instruments, net, _graph) = manager();
        instruments.create_instrument("lead", sine_kind(), None, Polyphony::default());
        instruments
            .trigger("lead", 69, 0.9, 0.0, Some(0.5))
            .unwrap();
        assert_eq!(instruments.active_voice_count("lead"), 1);

        let wave = net.lock().render_offline(44100.0, 0.25);
        assert_eq!(wave.channels(), 2);
        assert!(wave.len() > 0);
    }

    #[test]
    fn dispose_clears_current_and_node() {
        let (instruments, net, _graph) = manager();
        instruments.create_instrument("lead", sine_kind(), None, Polyphony::default());
        let size_with_instrument = net.lock().size();

        instruments.dispose_instrument("lead");
        assert!(instruments.current_instrument().is_none());
        assert!(net.lock().size() < size_with_instrument);
    }
}
