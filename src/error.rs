//! Error types for the engine control surface.

/// Why a control call did not start or change playback.
///
/// None of these are fatal: the worst outcome is that no sound plays.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Every track in the pool is busy.
    #[error("no free track available")]
    NoFreeTrack,
    /// The sample registry holds its maximum number of samples.
    #[error("sample registry is full")]
    RegistryFull,
    /// Arguments the engine cannot play, such as stereo with detune or an empty buffer.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Track index outside the pool.
    #[error("unknown track {0}")]
    UnknownTrack(usize),
    /// Handle of a sample that was never uploaded or has been released.
    #[error("unknown sample handle")]
    UnknownSample,
    /// The track is not bound to a stream queue.
    #[error("track {0} is not streaming")]
    NotStreaming(usize),
}
