//! YYC Audio Library
//!
//! Captures system audio, finds the dominant low-frequency component of each
//! stereo channel and drives the two output channels of a YYC-DJ Bluetooth LE
//! peripheral with matching strength and frequency commands.

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod protocol;
pub mod report;
pub mod state;

use audio::{AudioCaptureHandle, AudioConfig, CaptureError};
use dispatch::{DispatchWorker, Dispatcher};
use protocol::{BleTransport, ConnectionState, DeviceController, DeviceError};
use report::Reporter;
use state::{DispatchStats, SessionState, SessionStatus};

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Failed to spawn dispatch worker: {0}")]
    Worker(#[from] std::io::Error),
}

/// Owner of one peripheral controller and, while running, one capture stream
pub struct ShockSession<T: BleTransport> {
    controller: Arc<DeviceController<T>>,
    audio: AudioConfig,
    reporter: Reporter,
    status: SessionStatus,
    stats: Arc<Mutex<DispatchStats>>,
    capture: Option<AudioCaptureHandle>,
    worker: Option<DispatchWorker>,
}

impl<T: BleTransport> ShockSession<T> {
    pub fn new(controller: Arc<DeviceController<T>>, audio: AudioConfig, reporter: Reporter) -> Self {
        Self {
            controller,
            audio,
            reporter,
            status: SessionStatus::Stopped,
            stats: Arc::new(Mutex::new(DispatchStats::default())),
            capture: None,
            worker: None,
        }
    }

    pub fn controller(&self) -> &Arc<DeviceController<T>> {
        &self.controller
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            status: self.status,
            stats: self.stats.lock().clone(),
        }
    }

    /// Connect to the peripheral (if needed), then start capturing.
    ///
    /// Must be called from inside a tokio runtime; the dispatch path reuses
    /// its handle. On failure the session is left stopped.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.status == SessionStatus::Running {
            return Err(SessionError::AlreadyRunning);
        }
        self.status = SessionStatus::Running;

        if let Err(e) = self.attach().await {
            self.stop();
            return Err(e);
        }
        Ok(())
    }

    async fn attach(&mut self) -> Result<(), SessionError> {
        self.controller.connect().await?;

        *self.stats.lock() = DispatchStats::default();
        let dispatcher = Dispatcher::new(
            self.controller.clone(),
            self.audio.band_limit_hz,
            self.reporter.clone(),
            self.stats.clone(),
        );
        let (sink, worker) =
            dispatch::frame_sink(dispatcher, Handle::current(), self.audio.backpressure)?;
        self.worker = worker;

        let capture = AudioCaptureHandle::start(self.audio.source_id.clone(), sink)?;
        let format = capture.format();
        log::info!(
            "Session running: {} Hz, {} channels, {:?} backpressure",
            format.sample_rate,
            format.channels,
            self.audio.backpressure
        );
        self.capture = Some(capture);
        Ok(())
    }

    /// Stop capturing. The peripheral stays connected.
    ///
    /// Blocks until the capture thread and any dispatch worker have exited.
    pub fn stop(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }

        if self.status == SessionStatus::Running {
            let stats = self.stats.lock().clone();
            log::info!(
                "Session stopped: {} buffers, {} sent, {} skipped, {} failed, {} dropped, {} degenerate",
                stats.buffers,
                stats.sent,
                stats.skipped,
                stats.failed,
                stats.dropped,
                stats.degenerate
            );
        }
        self.status = SessionStatus::Stopped;
    }

    /// Stop capturing and release the peripheral
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.stop();
        self.controller.disconnect().await?;
        Ok(())
    }
}

impl<T: BleTransport> Drop for ShockSession<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
