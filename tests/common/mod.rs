//! Recording backends shared by the integration tests

#![allow(dead_code)]

use cueplay::audio::sink::AudioSink;
use cueplay::error::BackendError;
use cueplay::synth::port::SynthesisPort;
use std::sync::{Arc, Mutex};

/// One call received by a `RecordingSynth`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthCall {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    Program { channel: u8, program: u8 },
    Control { channel: u8, controller: u8, value: u8 },
    SoftReset,
}

/// Calls stamped with the number of frames rendered before them
pub type SynthLog = Arc<Mutex<Vec<(u64, SynthCall)>>>;

/// Synthesizer that logs every call and renders silence
#[derive(Default)]
pub struct RecordingSynth {
    log: SynthLog,
    frames: u64,
    /// Fail the n-th note on (1-based)
    fail_on_note_on: Option<usize>,
    note_ons: usize,
}

impl RecordingSynth {
    pub fn new() -> (Self, SynthLog) {
        let synth = Self::default();
        let log = Arc::clone(&synth.log);
        (synth, log)
    }

    pub fn failing_on_note_on(n: usize) -> (Self, SynthLog) {
        let (mut synth, log) = Self::new();
        synth.fail_on_note_on = Some(n);
        (synth, log)
    }

    fn record(&self, call: SynthCall) {
        self.log.lock().unwrap().push((self.frames, call));
    }
}

impl SynthesisPort for RecordingSynth {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), BackendError> {
        self.note_ons += 1;
        if self.fail_on_note_on == Some(self.note_ons) {
            return Err(BackendError::Synthesis("voice allocation failed".to_string()));
        }
        self.record(SynthCall::NoteOn { channel, note, velocity });
        Ok(())
    }

    fn note_off(&mut self, channel: u8, note: u8) -> Result<(), BackendError> {
        self.record(SynthCall::NoteOff { channel, note });
        Ok(())
    }

    fn select_program(&mut self, channel: u8, program: u8) -> Result<(), BackendError> {
        self.record(SynthCall::Program { channel, program });
        Ok(())
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<(), BackendError> {
        self.record(SynthCall::Control { channel, controller, value });
        Ok(())
    }

    fn render_samples(&mut self, frames: usize, out: &mut [f32]) -> Result<(), BackendError> {
        out.fill(0.0);
        self.frames += frames as u64;
        Ok(())
    }

    fn soft_reset(&mut self) -> Result<(), BackendError> {
        self.record(SynthCall::SoftReset);
        Ok(())
    }
}

pub fn calls(log: &SynthLog) -> Vec<(u64, SynthCall)> {
    log.lock().unwrap().clone()
}

pub fn count(log: &SynthLog, predicate: impl Fn(&SynthCall) -> bool) -> usize {
    log.lock().unwrap().iter().filter(|(_, call)| predicate(call)).count()
}

/// What a `RecordingSink` has seen so far
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkStats {
    pub frames: u64,
    pub writes: usize,
    pub discards: usize,
    pub drained: bool,
}

type WriteHook = Box<dyn FnMut(usize) + Send>;

/// Sink counting frames, with an optional hook run after each write
pub struct RecordingSink {
    stats: Arc<Mutex<SinkStats>>,
    on_write: Option<WriteHook>,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<Mutex<SinkStats>>) {
        let stats = Arc::new(Mutex::new(SinkStats::default()));
        (
            Self {
                stats: Arc::clone(&stats),
                on_write: None,
            },
            stats,
        )
    }

    /// Run `hook(write_number)` after every write (1-based)
    pub fn with_hook(hook: impl FnMut(usize) + Send + 'static) -> (Self, Arc<Mutex<SinkStats>>) {
        let (mut sink, stats) = Self::new();
        sink.on_write = Some(Box::new(hook));
        (sink, stats)
    }
}

impl AudioSink for RecordingSink {
    fn write(&mut self, interleaved: &[f32]) -> Result<(), BackendError> {
        let writes = {
            let mut stats = self.stats.lock().unwrap();
            stats.frames += (interleaved.len() / 2) as u64;
            stats.writes += 1;
            stats.writes
        };
        if let Some(hook) = self.on_write.as_mut() {
            hook(writes);
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.stats.lock().unwrap().discards += 1;
    }

    fn drain(&mut self) -> Result<(), BackendError> {
        self.stats.lock().unwrap().drained = true;
        Ok(())
    }
}
