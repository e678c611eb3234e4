//! Retire queue: buffers the mixer is done with, handed back for dropping off the audio thread.
//!
//! The mixer pushes finished buffers, melodies and consumed stream chunks into a
//! lock-free ring; control calls drain it and drop the contents once the
//! device lock is released.

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::stream::{AudioChunk, StreamQueue};
use super::track::{MelodyVoice, Source};

/// Something the mixer no longer needs.
#[derive(Debug)]
pub enum Retired {
    /// A one-shot buffer that has played to its end.
    Buffer(Vec<f32>),
    /// A melody that has played to the end, with its scratch buffer.
    Melody(Box<MelodyVoice>),
    /// A stream chunk playback has moved past.
    Chunk(AudioChunk),
    /// The pending chunks of a stream stopped mid-playback.
    Queue(StreamQueue),
}

impl Retired {
    /// Wrap a source detached from a track. Sources without owned buffers yield `None`.
    pub fn from_source(source: Source) -> Option<Self> {
        match source {
            Source::Buffer(data) => Some(Retired::Buffer(data)),
            Source::Melody(voice) => Some(Retired::Melody(voice)),
            Source::Stream(queue) => Some(Retired::Queue(queue)),
            _ => None,
        }
    }
}

/// Mixer-side end of the retire queue.
pub struct RetireSender {
    producer: HeapProd<Retired>,
}

impl RetireSender {
    /// Hand `item` over for reclamation. Drops it in place if the queue is full.
    pub fn retire(&mut self, item: Retired) {
        if let Err(item) = self.producer.try_push(item) {
            drop(item);
        }
    }
}

/// Control-side end of the retire queue.
pub struct Reclaimer {
    consumer: HeapCons<Retired>,
}

impl Reclaimer {
    /// Drop everything retired so far. Returns how many items were freed.
    pub fn reclaim(&mut self) -> usize {
        let mut freed = 0;
        while let Some(item) = self.consumer.try_pop() {
            drop(item);
            freed += 1;
        }
        freed
    }
}

/// Create a retire queue holding up to `capacity` items.
pub fn retire_queue(capacity: usize) -> (RetireSender, Reclaimer) {
    let rb = HeapRb::<Retired>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (RetireSender { producer }, Reclaimer { consumer })
}
