//! WAV decoding for sample upload: interleaved f32 PCM plus the leading-silence offset.

use std::io::{Read, Seek};

use crate::error::EngineError;

/// Frames quieter than this on every channel count as leading silence.
const SILENCE_THRESHOLD: f32 = 1.0 / 1024.0;

/// Errors that can occur when decoding or uploading a WAV file.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("WAV file contains no samples")]
    Empty,
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Resampling is not done here; the file must match the engine rate.
    #[error("sample rate {found} Hz does not match engine rate {expected} Hz")]
    SampleRateMismatch { expected: u32, found: u32 },
    #[error(transparent)]
    Rejected(#[from] EngineError),
}

/// Decoded audio ready for [`Engine::upload`](super::Engine::upload).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPcm {
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub data: Vec<f32>,
    pub channels: usize,
    pub frames: usize,
    /// First frame above the silence threshold.
    pub skip: usize,
}

/// Decode a mono or stereo WAV stream recorded at `sample_rate`.
///
/// Supports integer PCM of any bit depth hound reads and 32-bit float.
pub fn decode_wav<R: Read + Seek>(reader: R, sample_rate: u32) -> Result<DecodedPcm, SampleError> {
    let wav = hound::WavReader::new(reader)?;
    let spec = wav.spec();
    let channels = spec.channels as usize;

    if !(1..=2).contains(&channels) {
        return Err(SampleError::UnsupportedFormat(format!(
            "{channels} channels"
        )));
    }
    if spec.sample_rate != sample_rate {
        return Err(SampleError::SampleRateMismatch {
            expected: sample_rate,
            found: spec.sample_rate,
        });
    }

    let data: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            if bits == 0 || bits > 32 {
                return Err(SampleError::UnsupportedFormat(format!("{bits}-bit integer")));
            }
            let max_val = (1u64 << (bits - 1)) as f32;
            wav.into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<f32>, _>>()?
        }
        hound::SampleFormat::Float => wav.into_samples::<f32>().collect::<Result<Vec<f32>, _>>()?,
    };

    let frames = data.len() / channels;
    if frames == 0 {
        return Err(SampleError::Empty);
    }

    let skip = data
        .chunks_exact(channels)
        .position(|frame| frame.iter().any(|s| s.abs() > SILENCE_THRESHOLD))
        .unwrap_or(0);

    Ok(DecodedPcm {
        data,
        channels,
        frames,
        skip,
    })
}
