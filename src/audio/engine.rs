//! Engine: the control surface over the shared mixer.
//!
//! Every call takes the device lock for the duration of one state change,
//! releases it, and then frees whatever the mixer has retired since the
//! last call. Buffers detached by a call are dropped after the lock is gone.

use std::io::{Read, Seek};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::melody::Melody;
use crate::synth::{detune_rate, Waveform};

use super::mixer::Mixer;
use super::registry::{pcm_frames, SampleEntry, SampleHandle};
use super::retire::{retire_queue, Reclaimer};
use super::stream::{AudioChunk, StreamQueue};
use super::track::{channel_gains, Binding, MelodyVoice, Repeat, Source, TrackId, TrackInfo};
use super::wav::{decode_wav, SampleError};

struct Shared {
    mixer: Mutex<Mixer>,
    reclaimer: Mutex<Reclaimer>,
    sample_rate: u32,
    tracks: usize,
    chunk_size: usize,
}

/// Cloneable handle to one engine instance.
///
/// Control calls may come from any thread; [`Engine::render`] is what the
/// audio thread calls once per output buffer.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    /// Build a headless engine. Nothing plays until something calls [`Engine::render`].
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let (retire, reclaimer) = retire_queue(config.retire_capacity);
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut mixer = Mixer::new(
            config.sample_rate,
            config.tracks,
            config.chunk_size,
            config.max_samples,
            seed,
            retire,
        );
        mixer.set_master_volume(config.master_volume);
        log::debug!(
            "engine ready: {} Hz, {} tracks, {} frame chunks",
            config.sample_rate,
            config.tracks,
            config.chunk_size
        );
        Ok(Self {
            shared: Arc::new(Shared {
                mixer: Mutex::new(mixer),
                reclaimer: Mutex::new(reclaimer),
                sample_rate: config.sample_rate,
                tracks: config.tracks,
                chunk_size: config.chunk_size,
            }),
        })
    }

    /// Mix the next `out.len() / 2` stereo frames into `out`.
    pub fn render(&self, out: &mut [i16]) {
        self.shared.mixer.lock().process(out);
    }

    /// Free buffers the mixer has finished with. Returns how many were freed.
    ///
    /// Control calls do this on their own; hosts that go quiet for long
    /// stretches can call it periodically.
    pub fn reclaim(&self) -> usize {
        self.shared.reclaimer.lock().reclaim()
    }

    fn with_mixer<R>(&self, f: impl FnOnce(&mut Mixer) -> R) -> R {
        let result = {
            let mut mixer = self.shared.mixer.lock();
            f(&mut mixer)
        };
        self.reclaim();
        result
    }

    /// Allocate a track and bind what `build` returns to it.
    fn start(
        &self,
        build: impl FnOnce(&mut Mixer) -> Result<Binding, EngineError>,
    ) -> Result<TrackId, EngineError> {
        let (id, previous) = self.with_mixer(|mixer| {
            let id = mixer.pool.allocate().ok_or(EngineError::NoFreeTrack)?;
            let binding = build(mixer)?;
            let seed = mixer.next_seed();
            let track = mixer
                .pool
                .get_mut(id)
                .ok_or(EngineError::UnknownTrack(id.index()))?;
            Ok::<_, EngineError>((id, track.bind(Binding { seed, ..binding })))
        })?;
        drop(previous);
        log::debug!("allocated track {}", id.0);
        Ok(id)
    }

    /// Play a procedural tone for `duration` seconds with the waveform's default timbre.
    pub fn sound(
        &self,
        waveform: Waveform,
        freq: f32,
        duration: f32,
        volume: f32,
        balance: f32,
    ) -> Result<TrackId, EngineError> {
        self.sound_with_timbre(waveform, freq, duration, waveform.default_timbre(), volume, balance)
    }

    pub fn sound_with_timbre(
        &self,
        waveform: Waveform,
        freq: f32,
        duration: f32,
        timbre: f32,
        volume: f32,
        balance: f32,
    ) -> Result<TrackId, EngineError> {
        if !freq.is_finite() || !timbre.is_finite() {
            return Err(EngineError::InvalidArgument("frequency and timbre must be finite"));
        }
        let frames = (duration as f64 * self.shared.sample_rate as f64).round();
        if frames.is_nan() || frames < 1.0 {
            return Err(EngineError::InvalidArgument("tone shorter than one frame"));
        }
        self.start(|_| {
            Ok(Binding {
                source: Source::Tone {
                    waveform,
                    freq,
                    timbre,
                },
                frame_count: frames as usize,
                channels: 1,
                position: 0.0,
                volume: channel_gains(volume, balance),
                rate: 1.0,
                repeat: Repeat::NONE,
                seed: 0,
            })
        })
    }

    /// Play a one-shot buffer of interleaved PCM. The engine takes ownership.
    pub fn play(
        &self,
        pcm: Vec<f32>,
        channels: usize,
        volume: f32,
        balance: f32,
        detune: f32,
    ) -> Result<TrackId, EngineError> {
        let frames = pcm_frames(&pcm, channels)?;
        let rate = playback_rate(channels, detune)?;
        self.start(|_| {
            Ok(Binding {
                source: Source::Buffer(pcm),
                frame_count: frames,
                channels,
                position: 0.0,
                volume: channel_gains(volume, balance),
                rate,
                repeat: Repeat::NONE,
                seed: 0,
            })
        })
    }

    /// Start sequencing `text` on a new track.
    pub fn melody(&self, text: &str, volume: f32, balance: f32) -> Result<TrackId, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidArgument("empty melody"));
        }
        let scratch = vec![0.0; self.shared.chunk_size];
        self.start(|mixer| {
            Ok(Binding {
                source: Source::Melody(Box::new(MelodyVoice {
                    melody: Melody::new(text, mixer.next_seed()),
                    scratch,
                })),
                frame_count: 0,
                channels: 1,
                position: 0.0,
                volume: channel_gains(volume, balance),
                rate: 1.0,
                repeat: Repeat::NONE,
                seed: 0,
            })
        })
    }

    /// Register a PCM buffer for repeated playback. `skip` leading frames are
    /// jumped over on every replay.
    pub fn upload(
        &self,
        pcm: Vec<f32>,
        channels: usize,
        skip: usize,
    ) -> Result<SampleHandle, EngineError> {
        let entry = SampleEntry::new(pcm, channels, skip)?;
        let handle = self.with_mixer(|mixer| mixer.registry.insert(entry))?;
        log::debug!("uploaded sample {}", handle.to_raw());
        Ok(handle)
    }

    /// Decode a WAV stream at the engine's sample rate and upload it.
    pub fn upload_wav<R: Read + Seek>(&self, reader: R) -> Result<SampleHandle, SampleError> {
        let pcm = decode_wav(reader, self.shared.sample_rate)?;
        Ok(self.upload(pcm.data, pcm.channels, pcm.skip)?)
    }

    /// Free an uploaded sample. Tracks still playing it stop at once.
    pub fn release(&self, handle: SampleHandle) -> Result<(), EngineError> {
        let (entry, stopped) = self.with_mixer(|mixer| {
            let entry = mixer
                .registry
                .remove(handle)
                .ok_or(EngineError::UnknownSample)?;
            let mut stopped = 0;
            for track in mixer.pool.iter_mut().filter(|t| t.plays_sample(handle)) {
                track.stop();
                track.source = Source::Silent;
                stopped += 1;
            }
            Ok::<_, EngineError>((entry, stopped))
        })?;
        drop(entry);
        log::debug!("released sample {} ({stopped} tracks stopped)", handle.to_raw());
        Ok(())
    }

    /// Play an uploaded sample once, starting after its skip offset.
    pub fn replay(
        &self,
        handle: SampleHandle,
        volume: f32,
        balance: f32,
        detune: f32,
    ) -> Result<TrackId, EngineError> {
        self.start_sample(handle, volume, balance, detune, Repeat::NONE)
    }

    /// Play an uploaded sample until stopped.
    pub fn loop_sample(
        &self,
        handle: SampleHandle,
        volume: f32,
        balance: f32,
        detune: f32,
    ) -> Result<TrackId, EngineError> {
        self.start_sample(handle, volume, balance, detune, Repeat::Forever)
    }

    fn start_sample(
        &self,
        handle: SampleHandle,
        volume: f32,
        balance: f32,
        detune: f32,
        repeat: Repeat,
    ) -> Result<TrackId, EngineError> {
        self.start(|mixer| {
            let entry = mixer
                .registry
                .get(handle)
                .ok_or(EngineError::UnknownSample)?;
            Ok(Binding {
                source: Source::Sample(handle),
                frame_count: entry.frames(),
                channels: entry.channels(),
                position: entry.skip() as f64,
                volume: channel_gains(volume, balance),
                rate: playback_rate(entry.channels(), detune)?,
                repeat,
                seed: 0,
            })
        })
    }

    /// Open a streaming track. Feed it with [`Engine::push`]; it stays bound until stopped.
    pub fn queue(
        &self,
        channels: usize,
        volume: f32,
        balance: f32,
        detune: f32,
    ) -> Result<TrackId, EngineError> {
        if !(1..=2).contains(&channels) {
            return Err(EngineError::InvalidArgument("audio must be mono or stereo"));
        }
        let rate = playback_rate(channels, detune)?;
        self.start(|_| {
            Ok(Binding {
                source: Source::Stream(StreamQueue::new()),
                frame_count: 0,
                channels,
                position: 0.0,
                volume: channel_gains(volume, balance),
                rate,
                repeat: Repeat::NONE,
                seed: 0,
            })
        })
    }

    /// Append PCM to a streaming track. Returns the frames still waiting to be played.
    pub fn push(&self, track: TrackId, pcm: Vec<f32>) -> Result<usize, EngineError> {
        self.with_mixer(|mixer| {
            let t = mixer
                .pool
                .get_mut(track)
                .ok_or(EngineError::UnknownTrack(track.index()))?;
            let Source::Stream(queue) = &mut t.source else {
                return Err(EngineError::NotStreaming(track.index()));
            };
            if !pcm.is_empty() {
                pcm_frames(&pcm, t.channels)?;
                queue.push(AudioChunk::new(pcm, t.channels));
                t.frame_count = queue.total_frames();
            }
            let played = t.position.max(0.0) as usize;
            Ok(queue.total_frames().saturating_sub(played))
        })
    }

    /// Stop a track now. Stopping a free track is a no-op.
    pub fn stop(&self, track: TrackId) -> Result<(), EngineError> {
        let detached = self.with_mixer(|mixer| {
            let t = mixer
                .pool
                .get_mut(track)
                .ok_or(EngineError::UnknownTrack(track.index()))?;
            Ok::<_, EngineError>(t.stop())
        })?;
        drop(detached);
        Ok(())
    }

    /// Ramp the track's volume down to zero over `seconds`, then stop it.
    pub fn fade_out(&self, track: TrackId, seconds: f32) -> Result<(), EngineError> {
        if !seconds.is_finite() {
            return Err(EngineError::InvalidArgument("fade length must be finite"));
        }
        let frames = (seconds as f64 * self.shared.sample_rate as f64).round();
        let detached = self.with_mixer(|mixer| {
            let t = mixer
                .pool
                .get_mut(track)
                .ok_or(EngineError::UnknownTrack(track.index()))?;
            if frames < 1.0 {
                return Ok(t.stop());
            }
            let frames = frames as f32;
            t.volume_delta = [-t.volume[0] / frames, -t.volume[1] / frames];
            Ok::<_, EngineError>(None)
        })?;
        drop(detached);
        Ok(())
    }

    /// Set the overall volume, keeping the stereo balance. Cancels any fade.
    pub fn adjust_volume(&self, track: TrackId, volume: f32) -> Result<(), EngineError> {
        self.with_mixer(|mixer| {
            let t = mixer
                .pool
                .get_mut(track)
                .ok_or(EngineError::UnknownTrack(track.index()))?;
            let current = (t.volume[0] + t.volume[1]) / 1.2;
            if current == 0.0 {
                t.volume = channel_gains(volume, 0.0);
            } else {
                let scale = volume / current;
                t.volume = [t.volume[0] * scale, t.volume[1] * scale];
            }
            t.volume_delta = [0.0; 2];
            Ok(())
        })
    }

    /// Whether the track is still busy. Unknown tracks are not playing.
    pub fn is_playing(&self, track: TrackId) -> bool {
        let mixer = self.shared.mixer.lock();
        mixer.pool.get(track).is_some_and(|t| !t.is_free())
    }

    pub fn track_info(&self, track: TrackId) -> Result<TrackInfo, EngineError> {
        let mixer = self.shared.mixer.lock();
        mixer
            .pool
            .get(track)
            .map(|t| t.info())
            .ok_or(EngineError::UnknownTrack(track.index()))
    }

    /// Set the gain applied to the whole mix. Negative values clamp to zero.
    pub fn set_master_volume(&self, volume: f32) {
        self.shared.mixer.lock().set_master_volume(volume);
    }

    pub fn master_volume(&self) -> f32 {
        self.shared.mixer.lock().master_volume()
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    pub fn track_count(&self) -> usize {
        self.shared.tracks
    }

    pub fn chunk_size(&self) -> usize {
        self.shared.chunk_size
    }
}

/// Rate multiplier for `detune` semitones. Stereo sources cannot be detuned.
fn playback_rate(channels: usize, detune: f32) -> Result<f64, EngineError> {
    if !detune.is_finite() {
        return Err(EngineError::InvalidArgument("detune must be finite"));
    }
    if channels == 2 && detune != 0.0 {
        return Err(EngineError::InvalidArgument("stereo audio cannot be detuned"));
    }
    Ok(detune_rate(detune))
}
