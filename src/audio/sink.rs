// Audio sinks - where rendered chunks go
//
// `write` is allowed to block: a real-time sink blocks until the device has
// room, and that blocking is what paces the render loop to wall-clock time.

use crate::audio::format_conversion::f32_to_i16;
use crate::error::BackendError;
use crate::synth::port::OUTPUT_CHANNELS;
use hound::{WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

pub trait AudioSink: Send {
    /// Write interleaved stereo samples
    fn write(&mut self, interleaved: &[f32]) -> Result<(), BackendError>;

    /// Drop audio queued but not yet played (after a load)
    fn discard(&mut self) {}

    /// Block until queued audio has been played or persisted
    fn drain(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}

impl<T: AudioSink + ?Sized> AudioSink for Box<T> {
    fn write(&mut self, interleaved: &[f32]) -> Result<(), BackendError> {
        (**self).write(interleaved)
    }

    fn discard(&mut self) {
        (**self).discard()
    }

    fn drain(&mut self) -> Result<(), BackendError> {
        (**self).drain()
    }
}

/// Sink that throws audio away, optionally sleeping to emulate a device clock
#[derive(Debug, Default)]
pub struct NullSink {
    pacing_sample_rate: Option<u32>,
    frames_written: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for the duration of every written chunk
    pub fn paced(sample_rate: u32) -> Self {
        Self {
            pacing_sample_rate: Some(sample_rate.max(1)),
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl AudioSink for NullSink {
    fn write(&mut self, interleaved: &[f32]) -> Result<(), BackendError> {
        let frames = (interleaved.len() / OUTPUT_CHANNELS) as u64;
        self.frames_written += frames;

        if let Some(sample_rate) = self.pacing_sample_rate {
            std::thread::sleep(Duration::from_secs_f64(frames as f64 / sample_rate as f64));
        }
        Ok(())
    }
}

/// Offline sink writing 16-bit stereo PCM
pub struct WavSink {
    writer: WavWriter<BufWriter<File>>,
    frames_written: u64,
}

impl WavSink {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, BackendError> {
        let spec = WavSpec {
            channels: OUTPUT_CHANNELS as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = WavWriter::create(path.as_ref(), spec)?;
        log::info!("Writing WAV output to {}", path.as_ref().display());

        Ok(Self {
            writer,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Write the header and close the file
    pub fn finalize(self) -> Result<(), BackendError> {
        self.writer.finalize()?;
        Ok(())
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, interleaved: &[f32]) -> Result<(), BackendError> {
        for &sample in interleaved {
            self.writer.write_sample(f32_to_i16(sample))?;
        }
        self.frames_written += (interleaved.len() / OUTPUT_CHANNELS) as u64;
        Ok(())
    }

    fn drain(&mut self) -> Result<(), BackendError> {
        self.writer.flush()?;
        Ok(())
    }
}
