//! Audio capture implementation using a dedicated thread

use super::AudioFrame;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Callback the capture thread invokes once per delivered buffer
pub type FrameSink = Box<dyn FnMut(AudioFrame) + Send>;

/// Audio capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No output device found")]
    NoOutputDevice,

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamError(String),

    #[error("Failed to start stream: {0}")]
    PlayError(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Stereo input required, device has {0} channel(s)")]
    UnsupportedChannels(u16),

    #[error("Thread error: {0}")]
    ThreadError(String),
}

/// Commands sent to the audio thread
enum AudioCommand {
    Stop,
}

/// Negotiated stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Audio capture handle (Send + Sync safe)
///
/// The cpal stream is not `Send`, so a dedicated thread owns it and this
/// handle only talks to that thread.
pub struct AudioCaptureHandle {
    /// Command sender to control the audio thread
    command_tx: mpsc::Sender<AudioCommand>,

    /// Handle to the audio thread
    thread_handle: Option<JoinHandle<()>>,

    format: CaptureFormat,
}

impl AudioCaptureHandle {
    /// Open `source_id` (see [`list_sources`](super::list_sources)) and feed
    /// every delivered buffer to `sink` on the stream's callback thread.
    ///
    /// Returns once the stream is playing, or with the error that prevented it.
    pub fn start(source_id: Option<String>, sink: FrameSink) -> Result<Self, CaptureError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_audio_thread(source_id, sink, command_rx, ready_tx))
            .map_err(|e| CaptureError::ThreadError(e.to_string()))?;

        let format = match ready_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(CaptureError::ThreadError(
                    "audio thread exited during startup".to_string(),
                ));
            }
        };

        Ok(Self {
            command_tx,
            thread_handle: Some(thread_handle),
            format,
        })
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// Stop the audio capture. Returns after the last callback finished.
    pub fn stop(&mut self) {
        let _ = self.command_tx.send(AudioCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioCaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resolve a source ID to a cpal device; the flag is true for loopback
fn select_device(host: &cpal::Host, source_id: Option<&str>) -> Result<(Device, bool), CaptureError> {
    match source_id {
        Some(id) if id.starts_with("output:") => {
            let device_name = id.trim_start_matches("output:");
            log::info!("Using output device for loopback: {}", device_name);
            let device = host
                .output_devices()
                .map_err(|e| CaptureError::ConfigError(e.to_string()))?
                .find(|d| d.name().map(|n| n == device_name).unwrap_or(false))
                .ok_or_else(|| CaptureError::SourceNotFound(device_name.to_string()))?;
            Ok((device, true))
        }
        Some(id) if id.starts_with("input:") => {
            let device_name = id.trim_start_matches("input:");
            log::info!("Using input device: {}", device_name);
            let device = host
                .input_devices()
                .map_err(|e| CaptureError::ConfigError(e.to_string()))?
                .find(|d| d.name().map(|n| n == device_name).unwrap_or(false))
                .ok_or_else(|| CaptureError::SourceNotFound(device_name.to_string()))?;
            Ok((device, false))
        }
        Some(id) if id != super::SYSTEM_AUDIO_ID => {
            Err(CaptureError::SourceNotFound(id.to_string()))
        }
        _ => {
            // WASAPI allows an input stream on an output device (loopback)
            log::info!("Using default output device for system audio loopback");
            let device = host
                .default_output_device()
                .ok_or(CaptureError::NoOutputDevice)?;
            Ok((device, true))
        }
    }
}

/// Run the audio capture in a dedicated thread
fn run_audio_thread(
    source_id: Option<String>,
    sink: FrameSink,
    command_rx: mpsc::Receiver<AudioCommand>,
    ready_tx: mpsc::Sender<Result<CaptureFormat, CaptureError>>,
) {
    let stream = match open_stream(source_id.as_deref(), sink) {
        Ok((stream, format)) => {
            let _ = ready_tx.send(Ok(format));
            stream
        }
        Err(e) => {
            log::error!("Audio thread error: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    log::info!("Audio capture started");

    // Stop on command or when the handle is gone
    match command_rx.recv() {
        Ok(AudioCommand::Stop) => log::info!("Audio capture stopping"),
        Err(_) => log::info!("Audio capture channel disconnected"),
    }

    drop(stream);
}

fn open_stream(
    source_id: Option<&str>,
    sink: FrameSink,
) -> Result<(cpal::Stream, CaptureFormat), CaptureError> {
    let host = cpal::default_host();
    let (device, is_loopback) = select_device(&host, source_id)?;

    // For loopback, query the output config (what the device is rendering)
    let config = if is_loopback {
        device
            .default_output_config()
            .map_err(|e| CaptureError::ConfigError(format!("Loopback config: {}", e)))?
    } else {
        device
            .default_input_config()
            .map_err(|e| CaptureError::ConfigError(e.to_string()))?
    };

    let format = CaptureFormat {
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    };
    if format.channels < 2 {
        return Err(CaptureError::UnsupportedChannels(format.channels));
    }

    log::info!(
        "Audio capture: {} Hz, {} channels",
        format.sample_rate,
        format.channels
    );

    let stream = match config.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), format, sink),
        SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), format, sink),
        SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), format, sink),
        _ => {
            return Err(CaptureError::ConfigError(
                "Unsupported sample format".to_string(),
            ))
        }
    }
    .map_err(|e| CaptureError::StreamError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::PlayError(e.to_string()))?;

    Ok((stream, format))
}

/// Build audio stream for given sample type
fn build_stream<T: cpal::Sample + cpal::SizedSample>(
    device: &Device,
    config: &StreamConfig,
    format: CaptureFormat,
    mut sink: FrameSink,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    f32: cpal::FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            // Interleaved f32, handed over whole; the sink may block this thread
            let samples: Vec<f32> = data
                .iter()
                .map(|s| cpal::Sample::from_sample(*s))
                .collect();
            sink(AudioFrame::new(samples, format.sample_rate, format.channels));
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    )
}
