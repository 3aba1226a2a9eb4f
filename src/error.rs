// Error types shared by the timeline, the engine and the backends

/// Failure reported by a synthesis backend or an audio sink.
///
/// Any of these aborts the current playback session: audio that could not be
/// produced in time cannot be retried later.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Synthesis backend error: {0}")]
    Synthesis(String),

    #[error("Audio sink error: {0}")]
    Sink(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// Errors surfaced by the sequencer
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error("Malformed timeline: {0}")]
    MalformedTimeline(String),

    #[error("No timeline loaded")]
    EmptyTimeline,

    #[error("Transport query before any timeline was loaded")]
    EmptySession,

    #[error("Backend failure: {0}")]
    Backend(#[from] BackendError),

    #[error("Render thread is already running")]
    AlreadyRunning,

    #[error("Engine has been stopped")]
    EngineStopped,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SequencerError>;
