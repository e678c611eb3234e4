//! Sample registry: uploaded PCM buffers addressed by generational handles.

use std::num::NonZeroU64;

use crate::error::EngineError;

/// Handle to an uploaded sample.
///
/// The raw form is never 0, so 0 stays free as the "invalid" value for
/// callers that pass handles through plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleHandle {
    slot: u32,
    generation: u32,
}

impl SampleHandle {
    /// Pack into a non-zero integer: generation in the high half, 1-based slot in the low half.
    pub fn to_raw(self) -> NonZeroU64 {
        let raw = ((self.generation as u64) << 32) | (self.slot as u64 + 1);
        NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN)
    }

    pub fn from_raw(raw: u64) -> Option<Self> {
        let slot = (raw & 0xffff_ffff) as u32;
        if slot == 0 {
            return None;
        }
        Some(Self {
            slot: slot - 1,
            generation: (raw >> 32) as u32,
        })
    }
}

/// One uploaded buffer of interleaved 32-bit float PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleEntry {
    data: Vec<f32>,
    frames: usize,
    channels: usize,
    skip: usize,
}

impl SampleEntry {
    /// Validate and wrap a buffer. `skip` is the number of leading silent frames.
    pub fn new(data: Vec<f32>, channels: usize, skip: usize) -> Result<Self, EngineError> {
        let frames = pcm_frames(&data, channels)?;
        if skip >= frames {
            return Err(EngineError::InvalidArgument("skip offset past end of sample"));
        }
        Ok(Self {
            data,
            frames,
            channels,
            skip,
        })
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn skip(&self) -> usize {
        self.skip
    }
}

/// Frame count of an interleaved buffer, rejecting anything but non-empty mono or stereo.
pub(crate) fn pcm_frames(data: &[f32], channels: usize) -> Result<usize, EngineError> {
    if !(1..=2).contains(&channels) {
        return Err(EngineError::InvalidArgument("audio must be mono or stereo"));
    }
    if data.is_empty() || data.len() % channels != 0 {
        return Err(EngineError::InvalidArgument(
            "audio length must be a non-zero multiple of the channel count",
        ));
    }
    Ok(data.len() / channels)
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<SampleEntry>,
}

/// Arena of sample buffers with a free list.
#[derive(Debug)]
pub struct SampleRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    capacity: usize,
    live: usize,
}

impl SampleRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
            live: 0,
        }
    }

    /// Take ownership of `entry` and return its handle.
    pub fn insert(&mut self, entry: SampleEntry) -> Result<SampleHandle, EngineError> {
        if self.live >= self.capacity {
            return Err(EngineError::RegistryFull);
        }
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let cell = &mut self.slots[slot as usize];
        cell.entry = Some(entry);
        self.live += 1;
        Ok(SampleHandle {
            slot,
            generation: cell.generation,
        })
    }

    pub fn get(&self, handle: SampleHandle) -> Option<&SampleEntry> {
        self.slots
            .get(handle.slot as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entry.as_ref())
    }

    /// Remove a sample. The slot's generation moves on so stale handles stop resolving.
    pub fn remove(&mut self, handle: SampleHandle) -> Option<SampleEntry> {
        let cell = self
            .slots
            .get_mut(handle.slot as usize)
            .filter(|s| s.generation == handle.generation)?;
        let entry = cell.entry.take()?;
        cell.generation = cell.generation.wrapping_add(1);
        self.free.push(handle.slot);
        self.live -= 1;
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
