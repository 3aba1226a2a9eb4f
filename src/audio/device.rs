// Output device selection for the real-time sink

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use crate::error::BackendError;

pub struct AudioDeviceManager {
    host: Host,
}

impl AudioDeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// Names of the output devices the host reports
    pub fn output_device_names(&self) -> Vec<String> {
        match self.host.output_devices() {
            Ok(devices) => devices.filter_map(|device| device.name().ok()).collect(),
            Err(e) => {
                log::warn!("Cannot enumerate output devices: {}", e);
                Vec::new()
            }
        }
    }

    /// Device called `name`, or the host default when `None`
    pub fn resolve(&self, name: Option<&str>) -> Result<Device, BackendError> {
        match name {
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| BackendError::Device("No default audio output device".to_string())),
            Some(name) => self
                .host
                .output_devices()
                .map_err(|e| BackendError::Device(format!("Cannot enumerate output devices: {}", e)))?
                .find(|device| device.name().is_ok_and(|found| found == name))
                .ok_or_else(|| {
                    BackendError::Device(format!(
                        "Output device '{}' not found (available: {})",
                        name,
                        self.output_device_names().join(", ")
                    ))
                }),
        }
    }
}

impl Default for AudioDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
