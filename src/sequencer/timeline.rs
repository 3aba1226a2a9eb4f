// Timeline - Musical time representation
// Tempo, time signature and the ordered event sequence played by the engine

use super::event::{Event, EventKind};
use crate::error::{Result, SequencerError};
use std::fmt;

/// MIDI clocks per quarter note, fixed by the MIDI standard
pub const MIDI_CLOCKS_PER_QUARTER: u64 = 24;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature, `None` unless numerator > 0 and the
    /// denominator is a power of two
    pub fn new(numerator: u8, denominator: u8) -> Option<Self> {
        if numerator == 0 || !denominator.is_power_of_two() {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
        })
    }

    /// Build from the MIDI encoding where the denominator is a power of two
    pub fn from_midi(numerator: u8, denominator_pow2: u8) -> Option<Self> {
        let denominator = 1u8.checked_shl(denominator_pow2 as u32)?;
        Self::new(numerator, denominator)
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }

    /// Quarter notes in one measure
    /// Example: 4/4 = 4.0, 6/8 = 3.0
    pub fn quarter_notes_per_measure(&self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo in BPM (quarter notes per minute)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo, `None` for non-positive or non-finite values
    pub fn from_bpm(bpm: f64) -> Option<Self> {
        if bpm.is_finite() && bpm > 0.0 {
            Some(Self { bpm })
        } else {
            None
        }
    }

    /// Tempo from a SetTempo payload
    pub fn from_micros_per_quarter(micros: u32) -> Option<Self> {
        if micros == 0 {
            return None;
        }
        Self::from_bpm(60_000_000.0 / micros as f64)
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Microseconds per quarter note (the MIDI encoding)
    pub fn micros_per_quarter(&self) -> f64 {
        60_000_000.0 / self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one beat in samples at given sample rate
    pub fn beat_duration_samples(&self, sample_rate: f64) -> f64 {
        self.beat_duration_seconds() * sample_rate
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Metronome unit in ticks for a TimeSignature event's clocks-per-click value
/// Falls back to one quarter note when the event carries 0
pub fn metronome_unit_ticks(metronome_clocks: u8, resolution: u32) -> u64 {
    let unit = metronome_clocks as u64 * resolution as u64 / MIDI_CLOCKS_PER_QUARTER;
    if unit == 0 { resolution as u64 } else { unit }
}

/// Ordered, immutable sequence of events with its tick resolution
#[derive(Debug, Clone, PartialEq)]
pub struct EventTimeline {
    events: Vec<Event>,
    resolution: u32,
}

impl EventTimeline {
    /// Sort (stable) and validate an event sequence
    ///
    /// Events sharing a tick keep the order in which they were supplied.
    pub fn load(mut events: Vec<Event>, resolution: u32) -> Result<Self> {
        if resolution == 0 {
            return Err(SequencerError::MalformedTimeline(
                "resolution must be > 0".to_string(),
            ));
        }

        if events.is_empty() {
            return Err(SequencerError::MalformedTimeline(
                "timeline contains no events".to_string(),
            ));
        }

        for event in &events {
            event.validate().map_err(SequencerError::MalformedTimeline)?;
        }

        events.sort_by_key(|event| event.tick);

        Ok(Self { events, resolution })
    }

    /// Merge several tracks of absolute-tick events
    /// Ties across tracks dispatch in track order
    pub fn from_tracks(tracks: Vec<Vec<Event>>, resolution: u32) -> Result<Self> {
        let events = tracks.into_iter().flatten().collect();
        Self::load(events, resolution)
    }

    /// Ticks per quarter note
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Index of the first event with `tick >= tick`, `len()` if none
    pub fn events_from(&self, tick: u64) -> usize {
        self.events.partition_point(|event| event.tick < tick)
    }

    /// (first tick, last tick)
    pub fn time_range(&self) -> (u64, u64) {
        let first = self.events.first().map_or(0, |event| event.tick);
        let last = self.events.last().map_or(0, |event| event.tick);
        (first, last)
    }

    /// Ticks of the cue markers embedded in the timeline
    pub fn cue_ticks(&self) -> impl Iterator<Item = u64> + '_ {
        self.events
            .iter()
            .filter(|event| matches!(event.kind, EventKind::CueMarker))
            .map(|event| event.tick)
    }
}
