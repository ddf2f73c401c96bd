//! Thin frontend over the fundsp [`Net`] used by every graph operation.
//!
//! Structural edits happen here on control threads; [`BlocoNet::commit`]
//! publishes them to the backend pulled by the output stream. Tests render
//! the net offline instead of opening a device.

use fundsp::net::{Net, NodeId};
use fundsp::prelude::AudioUnit;
use fundsp::realnet::NetBackend;
use fundsp::wave::Wave;

pub struct BlocoNet {
    net: Net,
}

impl BlocoNet {
    /// Create a stereo-out net and detach its backend for the audio thread.
    pub(crate) fn stereo() -> (Self, NetBackend) {
        let mut net = Net::new(0, 2);
        let backend = net.backend();
        (Self { net }, backend)
    }

    pub fn add(&mut self, unit: Box<dyn AudioUnit>) -> NodeId {
        self.net.push(unit)
    }

    pub fn connect(&mut self, from: NodeId, from_port: usize, to: NodeId, to_port: usize) {
        self.net.connect(from, from_port, to, to_port);
    }

    /// Connect all outputs of `source` to the matching inputs of `target`.
    pub fn pipe_all(&mut self, source: NodeId, target: NodeId) {
        self.net.pipe_all(source, target);
    }

    /// Connect all outputs of `source` to the net outputs.
    pub fn pipe_output(&mut self, source: NodeId) {
        self.net.pipe_output(source);
    }

    pub fn disconnect(&mut self, node: NodeId, port: usize) {
        self.net.disconnect(node, port);
    }

    pub fn remove(&mut self, node: NodeId) -> Box<dyn AudioUnit> {
        self.net.remove(node)
    }

    pub fn replace(&mut self, node: NodeId, unit: Box<dyn AudioUnit>) -> Box<dyn AudioUnit> {
        self.net.replace(node, unit)
    }

    /// Publish pending edits to the audio thread.
    pub fn commit(&mut self) {
        if self.net.has_backend() {
            self.net.commit();
        }
    }

    pub fn size(&self) -> usize {
        self.net.size()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.net.contains(node)
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.net.set_sample_rate(sample_rate);
    }

    /// Render the current graph offline. Used by tests and demos; the live
    /// path goes through the committed backend instead.
    pub fn render_offline(&self, sample_rate: f64, duration: f64) -> Wave {
        let mut render_net = self.net.clone();
        render_net.set_sample_rate(sample_rate);
        Wave::render(sample_rate, duration, &mut render_net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundsp::prelude::*;

    #[test]
    fn stereo_net_shape() {
        let (net, _backend) = BlocoNet::stereo();
        assert_eq!(net.size(), 0);
    }

    #[test]
    fn add_connect_remove() {
        let (mut net, _backend) = BlocoNet::stereo();

        let osc = net.add(Box::new(sine_hz(440.0) >> pan(0.0)));
        let gain = net.add(Box::new(multipass::<U2>()));
        net.pipe_all(osc, gain);
        net.pipe_output(gain);
        assert_eq!(net.size(), 2);
        assert!(net.contains(osc));

        let _removed = net.remove(osc);
        assert_eq!(net.size(), 1);
        assert!(!net.contains(osc));
    }

    #[test]
    fn offline_render_produces_audio() {
        let (mut net, _backend) = BlocoNet::stereo();

        let osc = net.add(Box::new(sine_hz(440.0) * 0.5 >> pan(0.0)));
        net.pipe_output(osc);

        let wave = net.render_offline(44100.0, 0.1);
        assert_eq!(wave.channels(), 2);
        assert!(wave.amplitude() > 0.3);
    }
}
