// Timed sequencer events
// Channel voice messages plus the meta events that drive the clock

use serde::{Deserialize, Serialize};

/// Payload of a timed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ProgramChange { program: u8 },
    ControlChange { controller: u8, value: u8 },
    SetTempo { micros_per_quarter: u32 },
    TimeSignature {
        numerator: u8,
        denominator_pow2: u8,
        metronome_clocks: u8,
    },
    CueMarker,
}

/// Event at an absolute tick position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub tick: u64,
    pub channel: u8,
    pub kind: EventKind,
}

impl Event {
    pub fn new(tick: u64, channel: u8, kind: EventKind) -> Self {
        Self {
            tick,
            channel,
            kind,
        }
    }

    pub fn note_on(tick: u64, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(tick, channel, EventKind::NoteOn { note, velocity })
    }

    pub fn note_off(tick: u64, channel: u8, note: u8) -> Self {
        Self::new(tick, channel, EventKind::NoteOff { note })
    }

    pub fn program_change(tick: u64, channel: u8, program: u8) -> Self {
        Self::new(tick, channel, EventKind::ProgramChange { program })
    }

    pub fn control_change(tick: u64, channel: u8, controller: u8, value: u8) -> Self {
        Self::new(tick, channel, EventKind::ControlChange { controller, value })
    }

    /// Meta events are channel-less, they are stored on channel 0
    pub fn set_tempo(tick: u64, micros_per_quarter: u32) -> Self {
        Self::new(tick, 0, EventKind::SetTempo { micros_per_quarter })
    }

    pub fn time_signature(tick: u64, numerator: u8, denominator_pow2: u8, metronome_clocks: u8) -> Self {
        Self::new(
            tick,
            0,
            EventKind::TimeSignature {
                numerator,
                denominator_pow2,
                metronome_clocks,
            },
        )
    }

    pub fn cue_marker(tick: u64) -> Self {
        Self::new(tick, 0, EventKind::CueMarker)
    }

    /// Tempo carried by a SetTempo event, in BPM
    pub fn bpm(&self) -> Option<f64> {
        match self.kind {
            EventKind::SetTempo { micros_per_quarter } if micros_per_quarter > 0 => {
                Some(60_000_000.0 / micros_per_quarter as f64)
            }
            _ => None,
        }
    }

    /// Decode a raw track message found at `tick`
    ///
    /// Handles note on/off, control and program changes, and the tempo,
    /// time signature and cue point meta events. Anything else is `None`.
    pub fn from_bytes(tick: u64, bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;

        if status == 0xFF {
            return Self::meta_from_bytes(tick, data);
        }

        let channel = status & 0x0F;
        match status & 0xF0 {
            0x80 => {
                if data.len() >= 2 {
                    Some(Self::note_off(tick, channel, data[0]))
                } else {
                    None
                }
            }
            0x90 => {
                if data.len() >= 2 {
                    // Velocity 0 = Note Off
                    if data[1] == 0 {
                        Some(Self::note_off(tick, channel, data[0]))
                    } else {
                        Some(Self::note_on(tick, channel, data[0], data[1]))
                    }
                } else {
                    None
                }
            }
            0xB0 => {
                if data.len() >= 2 {
                    Some(Self::control_change(tick, channel, data[0], data[1]))
                } else {
                    None
                }
            }
            0xC0 => data
                .first()
                .map(|&program| Self::program_change(tick, channel, program)),
            _ => None,
        }
    }

    fn meta_from_bytes(tick: u64, data: &[u8]) -> Option<Self> {
        let (&meta_type, rest) = data.split_first()?;
        let (&len, payload) = rest.split_first()?;
        let payload = payload.get(..len as usize)?;

        match meta_type {
            0x51 if payload.len() == 3 => {
                let micros = (payload[0] as u32) << 16 | (payload[1] as u32) << 8 | payload[2] as u32;
                Some(Self::set_tempo(tick, micros))
            }
            0x58 if payload.len() == 4 => {
                Some(Self::time_signature(tick, payload[0], payload[1], payload[2]))
            }
            0x07 => Some(Self::cue_marker(tick)),
            _ => None,
        }
    }

    /// Range check of every field, used when a timeline is loaded
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.channel > 15 {
            return Err(format!("channel {} out of range at tick {}", self.channel, self.tick));
        }

        let data_ok = match self.kind {
            EventKind::NoteOn { note, velocity } => note <= 127 && velocity <= 127,
            EventKind::NoteOff { note } => note <= 127,
            EventKind::ProgramChange { program } => program <= 127,
            EventKind::ControlChange { controller, value } => controller <= 127 && value <= 127,
            EventKind::SetTempo { micros_per_quarter } => micros_per_quarter > 0,
            EventKind::TimeSignature {
                numerator,
                denominator_pow2,
                ..
            } => numerator > 0 && denominator_pow2 <= 7,
            EventKind::CueMarker => true,
        };

        if data_ok {
            Ok(())
        } else {
            Err(format!("invalid {:?} at tick {}", self.kind, self.tick))
        }
    }
}
