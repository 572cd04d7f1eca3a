//! Audio source enumeration

use cpal::traits::{DeviceTrait, HostTrait};
use thiserror::Error;

/// Source ID for loopback of the default output device
pub const SYSTEM_AUDIO_ID: &str = "system_audio";

/// Audio source information
#[derive(Debug, Clone)]
pub struct AudioSource {
    /// Identifier accepted by [`AudioCaptureHandle::start`](super::AudioCaptureHandle::start)
    pub id: String,

    /// Display name
    pub name: String,

    /// Source type
    pub source_type: SourceType,
}

/// Type of audio source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceType {
    /// Output device captured through loopback
    SystemAudio,

    /// Input device (microphone, line-in)
    InputDevice,
}

/// Audio source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to enumerate devices: {0}")]
    EnumerationError(String),
}

/// List available audio sources, default output loopback first
pub fn list_sources() -> Result<Vec<AudioSource>, SourceError> {
    let host = cpal::default_host();

    let default_output = host.default_output_device().and_then(|d| d.name().ok());
    let output_names = host
        .output_devices()
        .map_err(|e| SourceError::EnumerationError(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();
    let input_names = match host.input_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            log::warn!("Failed to enumerate input devices: {}", e);
            Vec::new()
        }
    };

    Ok(build_sources(default_output, output_names, input_names))
}

fn build_sources(
    default_output: Option<String>,
    output_names: Vec<String>,
    input_names: Vec<String>,
) -> Vec<AudioSource> {
    let mut sources = Vec::new();

    if let Some(name) = &default_output {
        sources.push(AudioSource {
            id: SYSTEM_AUDIO_ID.to_string(),
            name: format!("System Audio ({})", name),
            source_type: SourceType::SystemAudio,
        });
    }

    for name in output_names {
        // Already listed as "System Audio"
        if default_output.as_deref() == Some(name.as_str()) {
            continue;
        }
        sources.push(AudioSource {
            id: format!("output:{}", name),
            name: format!("Loopback: {}", name),
            source_type: SourceType::SystemAudio,
        });
    }

    for name in input_names {
        sources.push(AudioSource {
            id: format!("input:{}", name),
            name: format!("Input: {}", name),
            source_type: SourceType::InputDevice,
        });
    }

    sources
}
