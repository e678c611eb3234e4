//! Synthesis building blocks: the oscillator bank and the envelope generator.

pub mod envelope;
pub mod oscillator;

pub use envelope::{envelope, Envelope};
pub use oscillator::{OscState, ParseWaveformError, Waveform};

/// Shift `base` by `n` equal-tempered semitones.
pub fn transpose_freq(base: f32, n: i32) -> f32 {
    const STEP: f64 = 1.059_463_094_359_295_3; // 2^(1/12)
    (base as f64 * STEP.powi(n)) as f32
}

/// Playback-rate multiplier for a detune of `semitones`.
pub fn detune_rate(semitones: f32) -> f64 {
    2.0f64.powf(semitones as f64 / 12.0)
}
