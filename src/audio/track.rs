//! Track pool: the fixed set of playback slots the mixer walks every callback.

use crate::melody::Melody;
use crate::synth::{OscState, Waveform};

use super::registry::SampleHandle;
use super::stream::StreamQueue;

/// Identifies a slot in the track pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u32);

impl TrackId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How many more times a track restarts after reaching its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Remaining(u8),
    Forever,
}

impl Repeat {
    pub const NONE: Repeat = Repeat::Remaining(0);
}

/// A melody in progress together with the buffer its chunks are rendered into.
#[derive(Debug)]
pub struct MelodyVoice {
    pub melody: Melody,
    pub scratch: Vec<f32>,
}

/// What a track plays.
#[derive(Debug)]
pub enum Source {
    Silent,
    Tone {
        waveform: Waveform,
        freq: f32,
        timbre: f32,
    },
    Sample(SampleHandle),
    Buffer(Vec<f32>),
    Melody(Box<MelodyVoice>),
    Stream(StreamQueue),
}

impl Source {
    /// Sources owning buffers that are detached when the track stops.
    fn owns_buffer(&self) -> bool {
        matches!(self, Source::Buffer(_) | Source::Melody(_) | Source::Stream(_))
    }
}

/// Everything needed to start playback on a free track.
#[derive(Debug)]
pub struct Binding {
    pub source: Source,
    pub frame_count: usize,
    pub channels: usize,
    pub position: f64,
    pub volume: [f32; 2],
    pub rate: f64,
    pub repeat: Repeat,
    pub seed: u64,
}

/// One playback slot.
#[derive(Debug)]
pub struct Track {
    pub(crate) source: Source,
    pub(crate) osc: OscState,
    pub(crate) frame_count: usize,
    pub(crate) channels: usize,
    pub(crate) repeat: Repeat,
    pub(crate) position: f64,
    pub(crate) start: f64,
    pub(crate) volume: [f32; 2],
    pub(crate) volume_delta: [f32; 2],
    pub(crate) rate: f64,
}

impl Track {
    fn idle() -> Self {
        Self {
            source: Source::Silent,
            osc: OscState::default(),
            frame_count: 0,
            channels: 1,
            repeat: Repeat::NONE,
            position: 0.0,
            start: 0.0,
            volume: [0.0; 2],
            volume_delta: [0.0; 2],
            rate: 1.0,
        }
    }

    /// A track is free once nothing is left to play. Streams hold their track
    /// until stopped; melodies hold it until the last note has been mixed.
    pub fn is_free(&self) -> bool {
        let held = match &self.source {
            Source::Stream(_) => true,
            Source::Melody(voice) => voice.melody.is_playing(),
            _ => false,
        };
        !held
            && self.position >= self.frame_count as f64
            && self.repeat == Repeat::NONE
    }

    /// Start playback. Returns the previous source so the caller decides where it is dropped.
    pub fn bind(&mut self, binding: Binding) -> Source {
        let previous = std::mem::replace(&mut self.source, binding.source);
        self.osc.reset(binding.seed);
        self.frame_count = binding.frame_count;
        self.channels = binding.channels;
        self.position = binding.position;
        self.start = binding.position;
        self.volume = binding.volume;
        self.volume_delta = [0.0; 2];
        self.rate = binding.rate;
        self.repeat = binding.repeat;
        previous
    }

    /// Jump back to the starting position if repeats remain. Returns `false` when playback is over.
    pub fn rewind(&mut self) -> bool {
        if self.frame_count == 0 {
            return false;
        }
        match self.repeat {
            Repeat::Forever => {}
            Repeat::Remaining(0) => return false,
            Repeat::Remaining(n) => self.repeat = Repeat::Remaining(n - 1),
        }
        self.position = self.start;
        true
    }

    /// Mark the track finished. Buffers, melodies and streams are detached and
    /// returned so the caller can drop them off the audio thread.
    pub fn stop(&mut self) -> Option<Source> {
        self.repeat = Repeat::NONE;
        self.volume_delta = [0.0; 2];
        let detached = if self.source.owns_buffer() {
            self.frame_count = 0;
            Some(std::mem::replace(&mut self.source, Source::Silent))
        } else {
            None
        };
        self.position = self.frame_count as f64;
        detached
    }

    /// Whether this track plays frames of the given sample.
    pub fn plays_sample(&self, handle: SampleHandle) -> bool {
        matches!(self.source, Source::Sample(h) if h == handle)
    }

    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            frame_count: self.frame_count,
            channels: self.channels,
            position: self.position,
            volume: self.volume,
            volume_delta: self.volume_delta,
            rate: self.rate,
            repeat: self.repeat,
            free: self.is_free(),
        }
    }
}

/// Point-in-time view of a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackInfo {
    pub frame_count: usize,
    pub channels: usize,
    pub position: f64,
    pub volume: [f32; 2],
    pub volume_delta: [f32; 2],
    pub rate: f64,
    pub repeat: Repeat,
    pub free: bool,
}

/// Fixed-size array of tracks.
#[derive(Debug)]
pub struct TrackPool {
    tracks: Vec<Track>,
}

impl TrackPool {
    pub fn new(count: usize) -> Self {
        Self {
            tracks: (0..count).map(|_| Track::idle()).collect(),
        }
    }

    /// First free track in index order.
    pub fn allocate(&self) -> Option<TrackId> {
        self.tracks
            .iter()
            .position(Track::is_free)
            .map(|i| TrackId(i as u32))
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(id.index())
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Left/right gains for `volume` panned by `balance` (-1 left, 0 center, +1 right).
pub fn channel_gains(volume: f32, balance: f32) -> [f32; 2] {
    let balance = balance.clamp(-1.0, 1.0);
    [
        volume * (-0.4 * balance + 0.6),
        volume * (0.4 * balance + 0.6),
    ]
}
