//! Rendering configuration.

use serde::{Deserialize, Serialize};

use crate::{GmeError, Result};

/// Settings shared by every player.
///
/// Missing fields take their defaults, so a partial JSON document is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Play routine rate multiplier.
    pub tempo: f64,
    /// Output gain applied when converting to float.
    pub gain: f32,
    /// Emulation slice length in milliseconds.
    pub frame_ms: u32,
    /// Sample buffer length in milliseconds; must exceed `frame_ms`.
    pub buffer_ms: u32,
    /// High-pass integrator shift of the sample buffer.
    pub bass_shift: u32,
    /// Initial voice mute mask.
    pub mute_mask: u32,
    /// Length used for tracks that declare none.
    pub default_length_secs: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            tempo: 1.0,
            gain: 1.0,
            frame_ms: 20,
            buffer_ms: 100,
            bass_shift: 9,
            mute_mask: 0,
            default_length_secs: 150.0,
        }
    }
}

impl PlayerConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PlayerConfig =
            serde_json::from_str(json).map_err(|e| GmeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no player can honour.
    pub fn validate(&self) -> Result<()> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(GmeError::Config(format!(
                "sample rate {} outside 8000..=192000",
                self.sample_rate
            )));
        }
        if self.frame_ms == 0 || self.buffer_ms <= self.frame_ms {
            return Err(GmeError::Config(format!(
                "buffer_ms ({}) must exceed frame_ms ({}) and frame_ms must be positive",
                self.buffer_ms, self.frame_ms
            )));
        }
        if self.tempo.is_nan() || self.tempo <= 0.0 {
            return Err(GmeError::Config(format!("tempo {} must be positive", self.tempo)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PlayerConfig::from_json_str(r#"{ "sample_rate": 48000, "tempo": 1.5 }"#)
            .unwrap();
        assert_eq!(config.sample_rate, 48_000);
        assert_relative_eq!(config.tempo, 1.5);
        assert_eq!(config.frame_ms, 20);
        assert_relative_eq!(config.default_length_secs, 150.0);
    }

    #[test]
    fn frame_longer_than_buffer_is_rejected() {
        let err = PlayerConfig::from_json_str(r#"{ "frame_ms": 200 }"#).unwrap_err();
        assert!(matches!(err, GmeError::Config(_)));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            PlayerConfig::from_json_str("{ not json"),
            Err(GmeError::Config(_))
        ));
    }
}
