// cueplay - Library exports

pub mod audio;
pub mod config;
pub mod error;
pub mod messaging;
pub mod sequencer;
pub mod synth;

// Re-export commonly used types for convenience
pub use audio::{AudioSink, CpalOutput, NullSink, RingSink, WavSink};
pub use config::EngineConfig;
pub use error::{BackendError, Result, SequencerError};
pub use messaging::channels::{create_notification_channel, create_position_channel};
pub use messaging::notification::{Notification, NotificationCategory, NotificationLevel};
pub use sequencer::{
    ClockMapper, CueRegistry, Event, EventKind, EventTimeline, LatestPosition, NullNotifier, PlaybackState,
    PositionUpdate, Renderer, RingNotifier, SequencerEngine, StepOutcome, Tempo, TimeSignature,
    TransportNotifier, TransportState,
};
pub use synth::{SilentSynth, SynthesisPort};
