//! Audio engine: track pool, sample registry, streaming queues and the mixer,
//! plus the cpal output device that drives them.
//!
//! [`Engine`] is the control surface and can run headless. [`AudioDevice`]
//! owns the cpal output stream and calls [`Engine::render`] from the
//! audio thread once per device buffer.

pub mod engine;
pub mod mixer;
pub mod registry;
pub mod retire;
pub mod stream;
pub mod track;
pub mod wav;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};

use crate::config::EngineConfig;
use crate::error::EngineError;

pub use engine::Engine;
pub use mixer::CHANNELS;
pub use registry::SampleHandle;
pub use track::{Repeat, TrackId, TrackInfo};
pub use wav::{decode_wav, DecodedPcm, SampleError};

/// Audio device errors.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output device found")]
    NoOutputDevice,
    #[error("device config error: {0}")]
    DeviceConfig(String),
    #[error("stream build error: {0}")]
    StreamBuild(String),
    #[error("stream play error: {0}")]
    StreamPlay(String),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// An open output device playing one engine.
///
/// Dropping it (or calling [`AudioDevice::close`]) stops the stream. Engine
/// handles obtained from [`AudioDevice::engine`] stay usable headless.
pub struct AudioDevice {
    stream: cpal::Stream,
    engine: Engine,
}

impl AudioDevice {
    /// Open the default output device as a stereo stream at the configured rate.
    pub fn open(config: &EngineConfig) -> Result<Self, AudioError> {
        let engine = Engine::new(config)?;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;
        let format = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceConfig(e.to_string()))?
            .sample_format();

        let stream = match Self::build_stream(&device, format, &engine, fixed_buffer(config)) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!(
                    "fixed buffer of {} frames refused ({e}), using device default",
                    config.chunk_size
                );
                let stream_config = cpal::StreamConfig {
                    buffer_size: cpal::BufferSize::Default,
                    ..fixed_buffer(config)
                };
                Self::build_stream(&device, format, &engine, stream_config)?
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;

        log::info!(
            "audio device open: {} Hz, {:?} samples, {} tracks",
            config.sample_rate,
            format,
            config.tracks
        );
        Ok(Self { stream, engine })
    }

    fn build_stream(
        device: &cpal::Device,
        format: SampleFormat,
        engine: &Engine,
        config: cpal::StreamConfig,
    ) -> Result<cpal::Stream, AudioError> {
        match format {
            SampleFormat::I16 => build_typed::<i16>(device, engine, &config),
            SampleFormat::U16 => build_typed::<u16>(device, engine, &config),
            SampleFormat::I32 => build_typed::<i32>(device, engine, &config),
            SampleFormat::F32 => build_typed::<f32>(device, engine, &config),
            SampleFormat::F64 => build_typed::<f64>(device, engine, &config),
            other => Err(AudioError::DeviceConfig(format!(
                "unsupported sample format {other:?}"
            ))),
        }
    }

    /// Control handle for the engine this device plays.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Pause the output stream. Track state is kept.
    pub fn suspend(&self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))
    }

    /// Resume a suspended stream.
    pub fn resume(&self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))
    }

    /// Stop the stream and release the device.
    pub fn close(self) {
        drop(self.stream);
        self.engine.reclaim();
        log::info!("audio device closed");
    }
}

fn fixed_buffer(config: &EngineConfig) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: CHANNELS as u16,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.chunk_size as u32),
    }
}

/// Build an output stream that renders 16-bit PCM and converts it to `T`.
fn build_typed<T>(
    device: &cpal::Device,
    engine: &Engine,
    config: &cpal::StreamConfig,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<i16> + Send + 'static,
{
    let engine = engine.clone();
    let mut scratch = vec![0i16; engine.chunk_size() * CHANNELS];

    let err_fn = |err: cpal::StreamError| {
        log::error!("audio stream error: {err}");
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0);
                }
                let pcm = &mut scratch[..data.len()];
                engine.render(pcm);
                for (out, &s) in data.iter_mut().zip(pcm.iter()) {
                    *out = T::from_sample(s);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamBuild(e.to_string()))
}
