//! Mixer: runs on the audio thread once per output buffer.
//!
//! Regenerates melody chunks, advances every active track frame by frame,
//! sums the per-channel contributions and writes clamped 16-bit stereo.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::registry::SampleRegistry;
use super::retire::{RetireSender, Retired};
use super::track::{Source, Track, TrackPool};

/// Interleaved output channels.
pub const CHANNELS: usize = 2;

/// Full-scale 16-bit amplitude.
const FULL_SCALE: f32 = 32767.0;

/// Device-wide state shared by the audio thread and control calls.
///
/// Every access goes through the engine's device lock.
pub struct Mixer {
    pub(crate) pool: TrackPool,
    pub(crate) registry: SampleRegistry,
    retire: RetireSender,
    accum: Vec<f32>,
    master_volume: f32,
    sample_rate: u32,
    chunk_size: usize,
    seeds: ChaCha8Rng,
}

impl Mixer {
    pub fn new(
        sample_rate: u32,
        tracks: usize,
        chunk_size: usize,
        max_samples: usize,
        seed: u64,
        retire: RetireSender,
    ) -> Self {
        Self {
            pool: TrackPool::new(tracks),
            registry: SampleRegistry::new(max_samples),
            retire,
            accum: vec![0.0; chunk_size * CHANNELS],
            master_volume: 1.0,
            sample_rate,
            chunk_size,
            seeds: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Fill `output` with interleaved stereo, one chunk of at most `chunk_size` frames at a time.
    pub fn process(&mut self, output: &mut [i16]) {
        let step = self.chunk_size * CHANNELS;
        for chunk in output.chunks_mut(step) {
            self.process_chunk(chunk);
        }
    }

    fn process_chunk(&mut self, output: &mut [i16]) {
        let frames = output.len() / CHANNELS;
        let Mixer {
            pool,
            registry,
            retire,
            accum,
            master_volume,
            sample_rate,
            ..
        } = self;

        // 1. Render the next chunk of every melody.
        for track in pool.iter_mut() {
            let playing = match &mut track.source {
                Source::Melody(voice) => {
                    if voice.melody.is_playing() {
                        let n = frames.min(voice.scratch.len());
                        voice.melody.render_chunk(*sample_rate, &mut voice.scratch[..n]);
                        true
                    } else {
                        false
                    }
                }
                _ => continue,
            };
            if playing {
                track.position = 0.0;
                track.frame_count = frames;
            } else if let Some(item) = track.stop().and_then(Retired::from_source) {
                retire.retire(item);
            }
        }

        // 2. Accumulate every track.
        let acc = &mut accum[..frames * CHANNELS];
        acc.fill(0.0);
        for track in pool.iter_mut() {
            mix_track(track, registry, retire, *sample_rate, acc);
        }

        // 3. Scale, clamp and write.
        let gain = *master_volume * FULL_SCALE;
        for (out, &sum) in output.iter_mut().zip(acc.iter()) {
            *out = clamp16(sum * gain);
        }
        for out in output[frames * CHANNELS..].iter_mut() {
            *out = 0;
        }
    }

    /// Seed for the oscillator state of a newly bound track.
    pub fn next_seed(&mut self) -> u64 {
        self.seeds.gen()
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.max(0.0);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Add one track's contribution to `acc` (interleaved stereo), advancing its position.
///
/// A track that ends during this pass has its buffer detached and retired.
fn mix_track(
    track: &mut Track,
    registry: &SampleRegistry,
    retire: &mut RetireSender,
    sample_rate: u32,
    acc: &mut [f32],
) {
    if track.is_free() {
        return;
    }

    for frame in acc.chunks_exact_mut(CHANNELS) {
        advance_stream(track, retire);
        if track.position >= track.frame_count as f64 && !track.rewind() {
            break;
        }

        let amp = match &mut track.source {
            Source::Silent => break,
            Source::Tone {
                waveform,
                freq,
                timbre,
            } => {
                let t = track.position / sample_rate as f64;
                let s = waveform.sample(*freq as f64 * t, *timbre, &mut track.osc, sample_rate);
                [s, s]
            }
            Source::Sample(handle) => match registry.get(*handle) {
                Some(entry) => {
                    frame_at(entry.data(), entry.channels(), track.position, track.rate, None)
                }
                None => break,
            },
            Source::Buffer(data) => frame_at(data, track.channels, track.position, track.rate, None),
            Source::Melody(voice) => frame_at(&voice.scratch, 1, track.position, 1.0, None),
            Source::Stream(queue) => match queue.front() {
                Some(front) => {
                    let next = queue.get(1).and_then(|c| c.data().first().copied());
                    frame_at(front.data(), track.channels, track.position, track.rate, next)
                }
                None => break,
            },
        };

        let fading = track.volume_delta != [0.0; CHANNELS];
        if fading {
            for (v, d) in track.volume.iter_mut().zip(track.volume_delta) {
                *v = (*v + d).max(0.0);
            }
        }
        frame[0] += track.volume[0] * amp[0];
        frame[1] += track.volume[1] * amp[1];
        track.position += track.rate;

        if fading && track.volume.iter().all(|&v| v <= 0.0) {
            if let Some(item) = track.stop().and_then(Retired::from_source) {
                retire.retire(item);
            }
            return;
        }
    }

    advance_stream(track, retire);
    if track.is_free() {
        if let Some(item) = track.stop().and_then(Retired::from_source) {
            retire.retire(item);
        }
    }
}

/// Retire every stream chunk the position has moved past, rebasing onto the next.
fn advance_stream(track: &mut Track, retire: &mut RetireSender) {
    if let Source::Stream(queue) = &mut track.source {
        while let Some((chunk, rebased)) = queue.pop_consumed(track.position) {
            track.position = rebased;
            retire.retire(Retired::Chunk(chunk));
        }
        track.frame_count = queue.total_frames();
    }
}

/// Look up the frame at `position`. Mono sources are linearly interpolated
/// when `rate` is not 1, towards `next` past the last frame of `data`;
/// stereo sources are always read at the integer frame.
#[inline]
fn frame_at(
    data: &[f32],
    channels: usize,
    position: f64,
    rate: f64,
    next: Option<f32>,
) -> [f32; CHANNELS] {
    let index = position as usize;
    if channels == 2 {
        let i = index * 2;
        return [
            data.get(i).copied().unwrap_or(0.0),
            data.get(i + 1).copied().unwrap_or(0.0),
        ];
    }
    let a = data.get(index).copied().unwrap_or(0.0);
    if rate == 1.0 {
        return [a, a];
    }
    let b = match data.get(index + 1) {
        Some(&b) => b,
        None if index + 1 == data.len() => next.unwrap_or(a),
        None => a,
    };
    let frac = (position - index as f64) as f32;
    let s = a + (b - a) * frac;
    [s, s]
}

/// Saturate to the signed 16-bit range.
#[inline]
pub fn clamp16(v: f32) -> i16 {
    v.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
