// Real-time output through CPAL
//
// The render thread writes into a bounded ring through `RingSink`; the CPAL
// callback drains it. `RingSink::write` blocks while the ring is full, so the
// device clock paces the sequencer.
//
// On macOS the CPAL `Stream` is not `Send`. `CpalOutput` therefore stays on the
// thread that opened it, and only the `RingSink` half moves to the render thread.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::audio::device::AudioDeviceManager;
use crate::audio::format_conversion::write_stereo_to_interleaved_frame;
use crate::audio::sink::AudioSink;
use crate::audio::status::{AtomicDeviceStatus, DeviceStatus};
use crate::config::EngineConfig;
use crate::error::BackendError;
use crate::messaging::channels::{SampleConsumer, SampleProducer, create_sample_channel};
use crate::synth::port::OUTPUT_CHANNELS;

const WRITE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A write fails when the device has not taken a sample for this long
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Open output stream; keep it alive for as long as audio should play
pub struct CpalOutput {
    _device: Device,
    _stream: Stream,
    sample_rate: u32,
    status: AtomicDeviceStatus,
    underruns: Arc<AtomicU64>,
}

impl CpalOutput {
    /// Open `device_name` (or the default device) at the configured sample rate
    pub fn open(config: &EngineConfig, device_name: Option<&str>) -> Result<(Self, RingSink), BackendError> {
        let manager = AudioDeviceManager::new();
        let device = manager.resolve(device_name)?;

        log::info!(
            "Audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported_config = device
            .default_output_config()
            .map_err(|e| BackendError::Device(format!("Configuration error: {}", e)))?;

        let sample_format = supported_config.sample_format();
        let channels = supported_config.channels() as usize;
        let stream_config = StreamConfig {
            channels: supported_config.channels(),
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, consumer) = create_sample_channel(config.sink_capacity_frames);
        let status = AtomicDeviceStatus::new(DeviceStatus::Connecting);
        let discard = Arc::new(AtomicBool::new(false));
        let underruns = Arc::new(AtomicU64::new(0));

        let callback = CallbackState {
            consumer,
            channels,
            discard: Arc::clone(&discard),
            underruns: Arc::clone(&underruns),
        };

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &stream_config, callback, status.clone()),
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &stream_config, callback, status.clone()),
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &stream_config, callback, status.clone()),
            other => {
                return Err(BackendError::Device(format!(
                    "Unsupported sample format: {:?}. Supported formats: F32, I16, U16",
                    other
                )));
            }
        }?;

        stream
            .play()
            .map_err(|e| BackendError::Device(format!("Failed to start stream: {}", e)))?;
        status.set(DeviceStatus::Connected);

        log::info!(
            "Audio output started: {} Hz, {} channels, {:?}",
            config.sample_rate,
            channels,
            sample_format
        );

        let sink = RingSink {
            producer,
            status: status.clone(),
            discard,
            sample_rate: config.sample_rate,
            stall_timeout: STALL_TIMEOUT,
        };

        Ok((
            Self {
                _device: device,
                _stream: stream,
                sample_rate: config.sample_rate,
                status,
                underruns,
            },
            sink,
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.get()
    }

    /// Device callbacks that found the ring empty
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        mut callback: CallbackState,
        status: AtomicDeviceStatus,
    ) -> Result<Stream, BackendError>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // No allocations, no I/O, no locks
                    callback.fill(data);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                    status.set(DeviceStatus::Error);
                },
                None,
            )
            .map_err(|e| BackendError::Device(format!("Error in stream creation: {}", e)))
    }
}

/// State moved into the device callback
struct CallbackState {
    consumer: SampleConsumer,
    channels: usize,
    discard: Arc<AtomicBool>,
    underruns: Arc<AtomicU64>,
}

impl CallbackState {
    fn fill<T>(&mut self, data: &mut [T])
    where
        T: SizedSample + FromSample<f32>,
    {
        if self.discard.swap(false, Ordering::AcqRel) {
            self.consumer.clear();
        }

        let mut starved = false;
        for frame in data.chunks_mut(self.channels.max(1)) {
            let stereo = if self.consumer.occupied_len() >= OUTPUT_CHANNELS {
                let left = self.consumer.try_pop().unwrap_or(0.0);
                let right = self.consumer.try_pop().unwrap_or(0.0);
                (left, right)
            } else {
                starved = true;
                (0.0, 0.0)
            };
            write_stereo_to_interleaved_frame(stereo, frame);
        }

        if starved {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Render-thread half of a `CpalOutput`
pub struct RingSink {
    producer: SampleProducer,
    status: AtomicDeviceStatus,
    discard: Arc<AtomicBool>,
    sample_rate: u32,
    stall_timeout: Duration,
}

impl RingSink {
    fn check_device(&self) -> Result<(), BackendError> {
        match self.status.get() {
            DeviceStatus::Error => Err(BackendError::Device("Audio stream failed".to_string())),
            _ => Ok(()),
        }
    }
}

impl AudioSink for RingSink {
    fn write(&mut self, interleaved: &[f32]) -> Result<(), BackendError> {
        let mut remaining = interleaved;
        let mut last_progress = Instant::now();

        while !remaining.is_empty() {
            self.check_device()?;

            // Whole frames only, so the callback never sees half a frame
            let vacant = self.producer.vacant_len() / OUTPUT_CHANNELS * OUTPUT_CHANNELS;
            let count = vacant.min(remaining.len());
            if count == 0 {
                if last_progress.elapsed() >= self.stall_timeout {
                    self.status.set(DeviceStatus::Error);
                    return Err(BackendError::Device(format!(
                        "Audio device consumed nothing for {:?}",
                        self.stall_timeout
                    )));
                }
                std::thread::sleep(WRITE_POLL_INTERVAL);
                continue;
            }

            let pushed = self.producer.push_slice(&remaining[..count]);
            remaining = &remaining[pushed..];
            last_progress = Instant::now();
        }

        Ok(())
    }

    fn discard(&mut self) {
        self.discard.store(true, Ordering::Release);
    }

    fn drain(&mut self) -> Result<(), BackendError> {
        let queued_frames = self.producer.occupied_len() / OUTPUT_CHANNELS;
        let budget = Duration::from_secs_f64(queued_frames as f64 / self.sample_rate.max(1) as f64)
            + Duration::from_secs(1);
        let deadline = Instant::now() + budget;

        while self.producer.occupied_len() > 0 {
            self.check_device()?;
            if Instant::now() >= deadline {
                log::warn!("Audio drain timed out with {} samples queued", self.producer.occupied_len());
                break;
            }
            std::thread::sleep(WRITE_POLL_INTERVAL);
        }

        Ok(())
    }
}
