//! Streaming queue: PCM chunks pushed by the application, consumed by the mixer.

use std::collections::VecDeque;

/// One pushed buffer of interleaved PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    data: Vec<f32>,
    frames: usize,
}

impl AudioChunk {
    pub fn new(data: Vec<f32>, channels: usize) -> Self {
        let frames = data.len() / channels.max(1);
        Self { data, frames }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

/// Ordered chunks awaiting playback on one track.
///
/// The track's position is relative to the front chunk; `total_frames`
/// counts every frame still held, including the played part of the front.
#[derive(Debug, Clone, Default)]
pub struct StreamQueue {
    chunks: VecDeque<AudioChunk>,
    total_frames: usize,
}

impl StreamQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. May allocate; call from the control side only.
    pub fn push(&mut self, chunk: AudioChunk) {
        self.total_frames += chunk.frames;
        self.chunks.push_back(chunk);
    }

    /// Pop the front chunk once `position` has moved past it. Returns the
    /// finished chunk and the position rebased onto the next one.
    pub fn pop_consumed(&mut self, position: f64) -> Option<(AudioChunk, f64)> {
        let front = self.chunks.front()?;
        if position < front.frames as f64 {
            return None;
        }
        let chunk = self.chunks.pop_front()?;
        self.total_frames -= chunk.frames;
        let rebased = position - chunk.frames as f64;
        Some((chunk, rebased))
    }

    pub fn front(&self) -> Option<&AudioChunk> {
        self.chunks.front()
    }

    /// The chunk `index` places behind the front.
    pub fn get(&self, index: usize) -> Option<&AudioChunk> {
        self.chunks.get(index)
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }
}
