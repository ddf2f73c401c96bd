//! Mixer topology and effect chain management.
//!
//! Signal layout:
//!
//! ```text
//! instrument -> local effects -> channel strip (gain * mute gate)
//!                                      |
//!          channel strips --> adder tree --> master effects
//!                                                  |
//!                              master volume -> limiter -> net output
//! ```
//!
//! The adder tree is torn down and rebuilt on every topology change. A
//! permanent silence node stands in for the bus when no channel exists, so
//! the master chain stays wired at all times.

use super::effects::{build_effect, EffectConfig, EffectInstance, EffectTarget};
use super::net::BlocoNet;
use fundsp::net::NodeId;
use fundsp::prelude::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One named mixer channel.
///
/// `strip` is the gain-times-gate node that always lives in the net; the
/// instrument source and local effects in front of it come and go.
pub(crate) struct ChannelStrip {
    gain: Shared,
    mute_gate: Shared,
    strip: NodeId,
    source: Option<NodeId>,
    effects: Vec<EffectInstance>,
    muted: bool,
    soloed: bool,
}

struct GraphState {
    channels: HashMap<String, ChannelStrip>,
    master_effects: Vec<EffectInstance>,
    /// Adder tree nodes, rebuilt on every rewire.
    adders: Vec<NodeId>,
    silence: NodeId,
    master_strip: NodeId,
    limiter: NodeId,
}

/// Owns the mixer topology inside the shared net.
///
/// Structural operations (channel creation, chain rebuilds) lock the net and
/// commit; [`GraphManager::update_effect_param`] and the gain/mute/solo
/// setters only write [`Shared`] values and are safe while audio runs.
pub struct GraphManager {
    net: Arc<Mutex<BlocoNet>>,
    state: Mutex<GraphState>,
    master_volume: Shared,
}

impl GraphManager {
    /// Build the base topology: silence -> master volume -> limiter -> output.
    pub fn new(net: Arc<Mutex<BlocoNet>>) -> Self {
        let master_volume = shared(1.0);
        let mut state = {
            let mut net = net.lock();
            let silence = net.add(Box::new(zero() | zero()));
            let master_strip = net.add(Box::new(
                multipass::<U2>() * (var(&master_volume) | var(&master_volume)),
            ));
            let limiter = net.add(Box::new(limiter_stereo(0.01, 0.1)));
            GraphState {
                channels: HashMap::new(),
                master_effects: Vec::new(),
                adders: Vec::new(),
                silence,
                master_strip,
                limiter,
            }
        };
        {
            let mut net = net.lock();
            rewire(&mut state, &mut net);
            net.commit();
        }
        Self {
            net: net.clone(),
            state: Mutex::new(state),
            master_volume,
        }
    }

    /// Create the channel if it does not exist yet and return whether it was
    /// created by this call.
    pub fn get_or_create_channel(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        if state.channels.contains_key(name) {
            return false;
        }
        let mut net = self.net.lock();
        let gain = shared(1.0);
        let mute_gate = shared(1.0);
        let strip = net.add(Box::new(
            multipass::<U2>() * (var(&gain) | var(&gain)) * (var(&mute_gate) | var(&mute_gate)),
        ));
        state.channels.insert(
            name.to_string(),
            ChannelStrip {
                gain,
                mute_gate,
                strip,
                source: None,
                effects: Vec::new(),
                muted: false,
                soloed: false,
            },
        );
        debug!("Created mixer channel '{}'", name);
        rewire(&mut state, &mut net);
        net.commit();
        true
    }

    /// Attach an instrument output node to its channel, creating the channel
    /// on first use.
    pub fn connect_instrument(&self, channel: &str, node: NodeId) {
        {
            let mut state = self.state.lock();
            if !state.channels.contains_key(channel) {
                drop(state);
                self.get_or_create_channel(channel);
                state = self.state.lock();
            }
            let mut net = self.net.lock();
            if let Some(strip) = state.channels.get_mut(channel) {
                strip.source = Some(node);
            }
            rewire(&mut state, &mut net);
            net.commit();
        }
        debug!("Connected instrument node to channel '{}'", channel);
    }

    /// Detach the channel's instrument source. The caller removes the source
    /// node itself; this only forgets it and rewires.
    pub fn disconnect_instrument(&self, channel: &str) {
        let mut state = self.state.lock();
        let Some(strip) = state.channels.get_mut(channel) else {
            return;
        };
        strip.source = None;
        let mut net = self.net.lock();
        rewire(&mut state, &mut net);
        net.commit();
    }

    /// Remove a channel with its strip and local effects.
    pub fn remove_channel(&self, name: &str) {
        let mut state = self.state.lock();
        let Some(strip) = state.channels.remove(name) else {
            return;
        };
        let mut net = self.net.lock();
        for fx in strip.effects {
            if net.contains(fx.node) {
                let _ = net.remove(fx.node);
            }
        }
        if net.contains(strip.strip) {
            let _ = net.remove(strip.strip);
        }
        rewire(&mut state, &mut net);
        net.commit();
    }

    /// Tear down every effect everywhere, then instantiate `configs` in
    /// order, partitioned by target. Configs naming a channel that does not
    /// exist are skipped with a warning.
    pub fn rebuild_effect_chain(&self, configs: &[EffectConfig]) {
        let mut state = self.state.lock();
        let mut net = self.net.lock();

        for fx in state.master_effects.drain(..) {
            if net.contains(fx.node) {
                let _ = net.remove(fx.node);
            }
        }
        for strip in state.channels.values_mut() {
            for fx in strip.effects.drain(..) {
                if net.contains(fx.node) {
                    let _ = net.remove(fx.node);
                }
            }
        }

        for config in configs {
            install_effect(&mut state, &mut net, config.clone());
        }

        rewire(&mut state, &mut net);
        net.commit();
        debug!("Rebuilt effect chains from {} configs", configs.len());
    }

    /// Append one effect to its target chain without touching the others.
    pub fn add_effect_to_chain(&self, config: EffectConfig) -> bool {
        let mut state = self.state.lock();
        let mut net = self.net.lock();
        let added = install_effect(&mut state, &mut net, config);
        if added {
            rewire(&mut state, &mut net);
            net.commit();
        }
        added
    }

    /// Drop every effect on one target.
    pub fn clear_effects(&self, target: &EffectTarget) {
        let mut state = self.state.lock();
        let mut net = self.net.lock();
        let drained: Vec<EffectInstance> = match target {
            EffectTarget::Master => state.master_effects.drain(..).collect(),
            EffectTarget::Instrument(name) => match state.channels.get_mut(name) {
                Some(strip) => strip.effects.drain(..).collect(),
                None => {
                    warn!("No channel '{}' to clear effects on", name);
                    return;
                }
            },
        };
        for fx in drained {
            if net.contains(fx.node) {
                let _ = net.remove(fx.node);
            }
        }
        rewire(&mut state, &mut net);
        net.commit();
    }

    /// Write one live parameter on the `index`-th instance of `kind_name` in
    /// the target chain. Takes no graph lock and never edits topology, so it
    /// is safe from timing-critical paths.
    pub fn update_effect_param(
        &self,
        target: &EffectTarget,
        kind_name: &str,
        param: &str,
        value: f32,
        index: usize,
    ) {
        let state = self.state.lock();
        let chain: &[EffectInstance] = match target {
            EffectTarget::Master => &state.master_effects,
            EffectTarget::Instrument(name) => match state.channels.get(name) {
                Some(strip) => &strip.effects,
                None => {
                    warn!("No channel '{}' for effect parameter update", name);
                    return;
                }
            },
        };
        let instance = chain
            .iter()
            .filter(|fx| fx.config.kind.name() == kind_name)
            .nth(index);
        match instance {
            Some(fx) => {
                if !fx.set_live_param(param, value) {
                    warn!(
                        "Parameter '{}' of {} on {} is fixed until the chain is rebuilt",
                        param,
                        kind_name,
                        target.describe()
                    );
                }
            }
            None => warn!(
                "No {} instance #{} on {} to update",
                kind_name,
                index,
                target.describe()
            ),
        }
    }

    /// Rewire every edge from the current state. Safe to call at any time;
    /// instruments keep playing through the rebuilt bus.
    pub fn reconnect_all(&self) {
        let mut state = self.state.lock();
        let mut net = self.net.lock();
        rewire(&mut state, &mut net);
        net.commit();
    }

    pub fn set_channel_gain(&self, name: &str, gain: f32) {
        let state = self.state.lock();
        match state.channels.get(name) {
            Some(strip) => strip.gain.set_value(gain.max(0.0)),
            None => warn!("No channel '{}' to set gain on", name),
        }
    }

    pub fn set_channel_muted(&self, name: &str, muted: bool) {
        let mut state = self.state.lock();
        match state.channels.get_mut(name) {
            Some(strip) => strip.muted = muted,
            None => {
                warn!("No channel '{}' to mute", name);
                return;
            }
        }
        refresh_mutes(&state);
    }

    /// Soloing any channel gates every non-soloed channel to silence.
    pub fn set_channel_soloed(&self, name: &str, soloed: bool) {
        let mut state = self.state.lock();
        match state.channels.get_mut(name) {
            Some(strip) => strip.soloed = soloed,
            None => {
                warn!("No channel '{}' to solo", name);
                return;
            }
        }
        refresh_mutes(&state);
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.master_volume.set_value(volume.max(0.0));
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume.value()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.state.lock().channels.contains_key(name)
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn channel_gain(&self, name: &str) -> Option<f32> {
        self.state
            .lock()
            .channels
            .get(name)
            .map(|strip| strip.gain.value())
    }

    /// Effect kind names on one target, in chain order.
    pub fn chain_kinds(&self, target: &EffectTarget) -> Vec<&'static str> {
        let state = self.state.lock();
        let chain: &[EffectInstance] = match target {
            EffectTarget::Master => &state.master_effects,
            EffectTarget::Instrument(name) => match state.channels.get(name) {
                Some(strip) => &strip.effects,
                None => return Vec::new(),
            },
        };
        chain.iter().map(|fx| fx.config.kind.name()).collect()
    }

    /// Drop all channels and effects, keeping the silence/volume/limiter
    /// spine wired.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let mut net = self.net.lock();
        for fx in state.master_effects.drain(..) {
            if net.contains(fx.node) {
                let _ = net.remove(fx.node);
            }
        }
        let channels: Vec<ChannelStrip> = state.channels.drain().map(|(_, strip)| strip).collect();
        for strip in channels {
            for fx in strip.effects {
                if net.contains(fx.node) {
                    let _ = net.remove(fx.node);
                }
            }
            if net.contains(strip.strip) {
                let _ = net.remove(strip.strip);
            }
        }
        rewire(&mut state, &mut net);
        net.commit();
        debug!("Graph reset to base topology");
    }
}

/// Instantiate one config into its target chain. Returns false when the
/// target channel is missing.
fn install_effect(state: &mut GraphState, net: &mut BlocoNet, config: EffectConfig) -> bool {
    match &config.target {
        EffectTarget::Master => {
            let built = build_effect(&config);
            let node = net.add(built.unit);
            state.master_effects.push(EffectInstance {
                config,
                node,
                wet: built.wet,
                dry: built.dry,
                live: built.live,
            });
            true
        }
        EffectTarget::Instrument(name) => {
            if !state.channels.contains_key(name) {
                warn!("Effect target '{}' has no channel, skipping", name);
                return false;
            }
            let built = build_effect(&config);
            let node = net.add(built.unit);
            let name = name.clone();
            if let Some(strip) = state.channels.get_mut(&name) {
                strip.effects.push(EffectInstance {
                    config,
                    node,
                    wet: built.wet,
                    dry: built.dry,
                    live: built.live,
                });
            }
            true
        }
    }
}

/// Recompute every mute gate from the mute/solo flags.
fn refresh_mutes(state: &GraphState) {
    let solo_active = state.channels.values().any(|strip| strip.soloed);
    for strip in state.channels.values() {
        let audible = !strip.muted && (!solo_active || strip.soloed);
        strip.mute_gate.set_value(if audible { 1.0 } else { 0.0 });
    }
}

/// Rebuild every edge: channel chains, the adder tree, and the master chain.
///
/// Adders are removed and re-pushed wholesale. Input edges of surviving
/// nodes are overwritten by the fresh connects, and edges of removed nodes
/// die with them, so no stale routing outlives this pass.
fn rewire(state: &mut GraphState, net: &mut BlocoNet) {
    for node in state.adders.drain(..) {
        if net.contains(node) {
            let _ = net.remove(node);
        }
    }

    let mut names: Vec<String> = state.channels.keys().cloned().collect();
    names.sort();

    for name in &names {
        let strip = &state.channels[name];
        let head = strip
            .effects
            .first()
            .map(|fx| fx.node)
            .unwrap_or(strip.strip);
        match strip.source {
            Some(source) => net.pipe_all(source, head),
            None => {
                net.disconnect(head, 0);
                net.disconnect(head, 1);
            }
        }
        let mut upstream: Option<NodeId> = None;
        for fx in &strip.effects {
            if let Some(from) = upstream {
                net.pipe_all(from, fx.node);
            }
            upstream = Some(fx.node);
        }
        if let Some(from) = upstream {
            net.pipe_all(from, strip.strip);
        }
    }

    let mut level: Vec<NodeId> = names
        .iter()
        .map(|name| state.channels[name].strip)
        .collect();
    let bus_root = if level.is_empty() {
        state.silence
    } else {
        while level.len() > 1 {
            let mut next: Vec<NodeId> = Vec::with_capacity((level.len() + 1) / 2);
            for pair in level.chunks(2) {
                if pair.len() == 1 {
                    next.push(pair[0]);
                    continue;
                }
                let adder = net.add(Box::new(multipass::<U2>() + multipass::<U2>()));
                net.connect(pair[0], 0, adder, 0);
                net.connect(pair[0], 1, adder, 1);
                net.connect(pair[1], 0, adder, 2);
                net.connect(pair[1], 1, adder, 3);
                state.adders.push(adder);
                next.push(adder);
            }
            level = next;
        }
        level[0]
    };

    let mut upstream = bus_root;
    for fx in &state.master_effects {
        net.pipe_all(upstream, fx.node);
        upstream = fx.node;
    }
    net.pipe_all(upstream, state.master_strip);
    net.pipe_all(state.master_strip, state.limiter);
    net.pipe_output(state.limiter);
}
