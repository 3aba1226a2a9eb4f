// Transport - playback position and engine lifecycle
// `PlaybackState` is the only mutable playback state; the engine keeps it
// behind its core lock so tempo and position always change together.

use super::event::{Event, EventKind};
use super::notifier::PositionUpdate;
use super::timeline::{Tempo, TimeSignature, metronome_unit_ticks};

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No timeline loaded
    #[default]
    Idle,
    Paused,
    Playing,
    /// Terminal, after `stop()`
    Stopped,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    /// A timeline is loaded (playing or paused)
    pub fn has_session(&self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Paused)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped)
    }
}

/// Playhead and musical context of the loaded timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub current_tick: u64,
    /// Index of the next event to dispatch
    pub next_event_index: usize,
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    /// Ticks per metronome click
    pub metronome_unit: u64,
    pub is_playing: bool,
}

impl PlaybackState {
    /// Paused at tick 0 in 4/4
    pub fn new(tempo: Tempo, resolution: u32) -> Self {
        Self {
            current_tick: 0,
            next_event_index: 0,
            tempo,
            time_signature: TimeSignature::four_four(),
            metronome_unit: resolution.max(1) as u64,
            is_playing: false,
        }
    }

    /// Move the playhead without touching the musical context
    pub fn relocate(&mut self, tick: u64, next_event_index: usize) {
        self.current_tick = tick;
        self.next_event_index = next_event_index;
    }

    /// Apply the transport effect of `event`
    ///
    /// Only SetTempo and TimeSignature change playback state; returns whether
    /// anything changed.
    pub fn apply(&mut self, event: &Event, resolution: u32) -> bool {
        match event.kind {
            EventKind::SetTempo { micros_per_quarter } => {
                match Tempo::from_micros_per_quarter(micros_per_quarter) {
                    Some(tempo) => {
                        self.tempo = tempo;
                        true
                    }
                    None => false,
                }
            }
            EventKind::TimeSignature {
                numerator,
                denominator_pow2,
                metronome_clocks,
            } => match TimeSignature::from_midi(numerator, denominator_pow2) {
                Some(signature) => {
                    self.time_signature = signature;
                    self.metronome_unit = metronome_unit_ticks(metronome_clocks, resolution);
                    true
                }
                None => false,
            },
            EventKind::NoteOn { .. }
            | EventKind::NoteOff { .. }
            | EventKind::ProgramChange { .. }
            | EventKind::ControlChange { .. }
            | EventKind::CueMarker => false,
        }
    }

    /// Musical position of the playhead
    pub fn position(&self, resolution: u32) -> PositionUpdate {
        PositionUpdate::at(
            self.current_tick,
            resolution,
            self.time_signature,
            self.metronome_unit,
        )
    }
}
