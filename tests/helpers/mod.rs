//! Shared fixtures for bloco integration tests.
//!
//! Everything runs headless: engines are built without the hardware
//! features and audio assertions go through offline rendering.

pub mod tolerances;

use bloco::prelude::*;
use bloco::Wave;
use std::path::Path;
use std::time::{Duration, Instant};

/// Sample rate every test engine uses.
pub const TEST_SAMPLE_RATE: f64 = 44_100.0;

/// Build a headless engine.
pub fn test_engine() -> BlocoEngine {
    BlocoEngine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .build()
        .expect("Failed to create test engine")
}

/// Block for `ms` milliseconds while spawned work settles.
pub fn settle(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}

/// Poll `predicate` every 10ms until it holds or `timeout_ms` passes.
pub fn wait_until(timeout_ms: u64, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    predicate()
}

/// RMS of one channel of a rendered wave.
pub fn channel_rms(wave: &Wave, channel: usize) -> f32 {
    if wave.len() == 0 {
        return 0.0;
    }
    let sum_sq: f32 = (0..wave.len())
        .map(|index| {
            let sample = wave.at(channel, index);
            sample * sample
        })
        .sum();
    (sum_sq / wave.len() as f32).sqrt()
}

/// Whether a rendered wave is silent on every channel.
pub fn is_silent(wave: &Wave) -> bool {
    wave.amplitude() < tolerances::SILENCE_THRESHOLD
}

/// Write a rendered wave as 16-bit PCM, interleaved.
pub fn save_wav16(wave: &Wave, path: &Path) {
    let spec = hound::WavSpec {
        channels: wave.channels() as u16,
        sample_rate: wave.sample_rate() as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV file");
    for index in 0..wave.len() {
        for channel in 0..wave.channels() {
            let sample = wave.at(channel, index).clamp(-1.0, 1.0);
            writer
                .write_sample((sample * 32767.0).round() as i16)
                .expect("Failed to write sample");
        }
    }
    writer.finalize().expect("Failed to finalize WAV file");
}

/// Read a 16-bit PCM WAV back as interleaved f32 samples.
pub fn load_wav16(path: &Path) -> (Vec<f32>, u32) {
    let mut reader = hound::WavReader::open(path).expect("Failed to open WAV file");
    let sample_rate = reader.spec().sample_rate;
    let samples: Vec<f32> = reader
        .samples::<i16>()
        .map(|sample| f32::from(sample.expect("Failed to read sample")) / 32767.0)
        .collect();
    (samples, sample_rate)
}
