// Synthesis port - contract of the synthesizer driven by the sequencer
//
// The synthesizer itself lives outside this crate. The render thread is the
// only caller of every method.

use crate::error::BackendError;

pub const MIDI_CHANNELS: u8 = 16;
pub const MIDI_NOTES: u8 = 128;

/// Output channels of a rendered buffer (interleaved stereo)
pub const OUTPUT_CHANNELS: usize = 2;

pub trait SynthesisPort: Send {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), BackendError>;

    fn note_off(&mut self, channel: u8, note: u8) -> Result<(), BackendError>;

    fn select_program(&mut self, channel: u8, program: u8) -> Result<(), BackendError>;

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<(), BackendError>;

    /// Render `frames` stereo frames into `out` (`out.len() == frames * 2`)
    fn render_samples(&mut self, frames: usize, out: &mut [f32]) -> Result<(), BackendError>;

    /// Release every sounding note while keeping programs and controllers
    ///
    /// The default sends a note off for each of the 128 notes on all 16 channels.
    fn soft_reset(&mut self) -> Result<(), BackendError> {
        for channel in 0..MIDI_CHANNELS {
            for note in 0..MIDI_NOTES {
                self.note_off(channel, note)?;
            }
        }
        Ok(())
    }
}

impl<T: SynthesisPort + ?Sized> SynthesisPort for Box<T> {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), BackendError> {
        (**self).note_on(channel, note, velocity)
    }

    fn note_off(&mut self, channel: u8, note: u8) -> Result<(), BackendError> {
        (**self).note_off(channel, note)
    }

    fn select_program(&mut self, channel: u8, program: u8) -> Result<(), BackendError> {
        (**self).select_program(channel, program)
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<(), BackendError> {
        (**self).control_change(channel, controller, value)
    }

    fn render_samples(&mut self, frames: usize, out: &mut [f32]) -> Result<(), BackendError> {
        (**self).render_samples(frames, out)
    }

    fn soft_reset(&mut self) -> Result<(), BackendError> {
        (**self).soft_reset()
    }
}

/// Synthesizer that accepts every message and renders silence
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSynth;

impl SynthesisPort for SilentSynth {
    fn note_on(&mut self, _channel: u8, _note: u8, _velocity: u8) -> Result<(), BackendError> {
        Ok(())
    }

    fn note_off(&mut self, _channel: u8, _note: u8) -> Result<(), BackendError> {
        Ok(())
    }

    fn select_program(&mut self, _channel: u8, _program: u8) -> Result<(), BackendError> {
        Ok(())
    }

    fn control_change(&mut self, _channel: u8, _controller: u8, _value: u8) -> Result<(), BackendError> {
        Ok(())
    }

    fn render_samples(&mut self, _frames: usize, out: &mut [f32]) -> Result<(), BackendError> {
        out.fill(0.0);
        Ok(())
    }
}
