//! Tolerance constants for audio assertions.

/// DSP processing tolerance. Oscillators and filters vary slightly
/// between scalar and SIMD paths.
pub const DSP_EPSILON: f32 = 1e-4;

/// Silence threshold (~-80dB). Values below this are considered silent.
pub const SILENCE_THRESHOLD: f32 = 0.0001;

/// 16-bit quantization step size, for WAV round trips.
pub const INT16_EPSILON: f32 = 1.0 / 32768.0;
