// Sequencer module
// Timeline, musical time, tick clock and the playback engine

pub mod clock;
pub mod cues;
pub mod engine;
pub mod event;
pub mod notifier;
pub mod timeline;
pub mod transport;

pub use clock::ClockMapper;
pub use cues::CueRegistry;
pub use engine::{Renderer, SequencerEngine, StepOutcome};
pub use event::{Event, EventKind};
pub use notifier::{LatestPosition, NullNotifier, PositionUpdate, RingNotifier, TransportNotifier};
pub use timeline::{EventTimeline, Tempo, TimeSignature};
pub use transport::{PlaybackState, TransportState};
