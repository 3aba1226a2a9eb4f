// Engine configuration
// Loaded from RON or JSON, every field has a default so partial files work

use crate::error::{Result, SequencerError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime configuration for the sequencer engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate (Hz)
    pub sample_rate: u32,
    /// Largest tick span rendered between two transport checks
    pub max_chunk_ticks: u64,
    /// Maximum distance for removing the nearest cue
    pub cue_trash_delta: u64,
    /// Events strictly before this tick are dispatched on load, before any audio
    pub priming_ticks: u64,
    /// Tempo used until the first SetTempo event
    pub default_tempo_bpm: f64,
    /// Upper bound of one idle wait of the render loop (ms)
    pub idle_wait_ms: u64,
    /// Frames buffered between the render thread and the audio device
    pub sink_capacity_frames: usize,
    /// Capacity of the status notification channel
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            max_chunk_ticks: 5,
            cue_trash_delta: 240,
            priming_ticks: 2,
            default_tempo_bpm: 120.0,
            idle_wait_ms: 10,
            sink_capacity_frames: 4096,
            notification_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Parse a RON document
    pub fn from_ron_str(data: &str) -> Result<Self> {
        let config: Self = ron::from_str(data).map_err(|e| {
            SequencerError::Config(format!("Failed to deserialize from RON: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json_str(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data).map_err(|e| {
            SequencerError::Config(format!("Failed to deserialize from JSON: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| SequencerError::Config(format!("Failed to serialize to RON: {}", e)))
    }

    /// Load a configuration file, format chosen by extension (`.ron` or `.json`)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            SequencerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&data),
            Some("ron") => Self::from_ron_str(&data),
            other => Err(SequencerError::Config(format!(
                "Unsupported configuration format: {:?}",
                other
            ))),
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(SequencerError::InvalidConfig(
                "Sample rate must be between 8000 and 192000 Hz".to_string(),
            ));
        }

        if self.max_chunk_ticks == 0 {
            return Err(SequencerError::InvalidConfig(
                "max_chunk_ticks must be > 0".to_string(),
            ));
        }

        if !self.default_tempo_bpm.is_finite() || self.default_tempo_bpm <= 0.0 {
            return Err(SequencerError::InvalidConfig(
                "default_tempo_bpm must be a positive number".to_string(),
            ));
        }

        if self.sink_capacity_frames == 0 || self.notification_capacity == 0 {
            return Err(SequencerError::InvalidConfig(
                "Channel capacities must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_chunk_ticks, 5);
        assert_eq!(config.priming_ticks, 2);
        assert_eq!(config.default_tempo_bpm, 120.0);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = EngineConfig::from_ron_str("(sample_rate: 48000, max_chunk_ticks: 10)").unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.max_chunk_ticks, 10);
        assert_eq!(config.cue_trash_delta, 240);
    }

    #[test]
    fn test_json_config() {
        let config = EngineConfig::from_json_str(r#"{"cue_trash_delta": 96}"#).unwrap();
        assert_eq!(config.cue_trash_delta, 96);
        assert_eq!(config.sample_rate, 44100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = EngineConfig::from_ron_str("(max_chunk_ticks: 0)");
        assert!(matches!(result, Err(SequencerError::InvalidConfig(_))));

        let result = EngineConfig::from_json_str(r#"{"default_tempo_bpm": -3.0}"#);
        assert!(matches!(result, Err(SequencerError::InvalidConfig(_))));

        let result = EngineConfig::from_json_str(r#"{"sample_rate": 100}"#);
        assert!(matches!(result, Err(SequencerError::InvalidConfig(_))));
    }

    #[test]
    fn test_garbage_is_config_error() {
        let result = EngineConfig::from_ron_str("not ron at all {");
        assert!(matches!(result, Err(SequencerError::Config(_))));
    }

    #[test]
    fn test_ron_round_trip() {
        let config = EngineConfig {
            sample_rate: 48000,
            ..EngineConfig::default()
        };
        let text = config.to_ron_string().unwrap();
        assert_eq!(EngineConfig::from_ron_str(&text).unwrap(), config);
    }
}
