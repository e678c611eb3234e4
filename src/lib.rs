//! chiptrack: a fixed pool of playback tracks mixed into one 16-bit stereo stream.
//!
//! Tracks play procedural tones, uploaded samples, one-shot buffers,
//! streamed chunks, or melodies sequenced from a compact text notation.

pub mod audio;
pub mod config;
pub mod error;
pub mod melody;
pub mod synth;

pub use audio::{AudioDevice, AudioError, Engine, SampleHandle, TrackId};
pub use config::EngineConfig;
pub use error::EngineError;
