//! Per-buffer orchestration: deinterleave, analyse, map, shock
//!
//! Under [`Backpressure::Block`] the capture callback runs the whole cycle and
//! only returns once both peripheral writes completed, so commands leave in
//! capture order. [`Backpressure::DropOldest`] moves the cycle to a worker
//! thread fed through a single-slot mailbox.

use crate::audio::{
    freq_transform, strength_transform, AudioFrame, Backpressure, FrameSink, SpectralAnalyzer,
};
use crate::protocol::{BleTransport, Channel, DeviceController, DeviceError, ShockCommand};
use crate::report::Reporter;
use crate::state::DispatchStats;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::runtime::Handle;

/// Turns audio buffers into command pairs and sends them
pub struct Dispatcher<T: BleTransport> {
    controller: Arc<DeviceController<T>>,
    analyzer: SpectralAnalyzer,
    reporter: Reporter,
    stats: Arc<Mutex<DispatchStats>>,
}

impl<T: BleTransport> Dispatcher<T> {
    pub fn new(
        controller: Arc<DeviceController<T>>,
        band_limit_hz: u32,
        reporter: Reporter,
        stats: Arc<Mutex<DispatchStats>>,
    ) -> Self {
        Self {
            controller,
            analyzer: SpectralAnalyzer::new(band_limit_hz),
            reporter,
            stats,
        }
    }

    pub fn analyzer(&self) -> &SpectralAnalyzer {
        &self.analyzer
    }

    /// Command pair for one buffer.
    ///
    /// Fewer than two samples, or fewer than two channels, yields the silence
    /// pair without running the analyzer.
    pub fn commands_for(&mut self, frame: &AudioFrame) -> (ShockCommand, ShockCommand) {
        if frame.samples.len() < 2 || frame.channel_count < 2 {
            if frame.channel_count < 2 && frame.samples.len() >= 2 {
                log::warn!(
                    "Buffer has {} channel(s); stereo required, sending silence",
                    frame.channel_count
                );
            }
            self.stats.lock().degenerate += 1;
            return (
                ShockCommand::silence(Channel::A),
                ShockCommand::silence(Channel::B),
            );
        }

        let a = self.channel_command(Channel::A, &frame.channel(0), frame.sample_rate);
        let b = self.channel_command(Channel::B, &frame.channel(1), frame.sample_rate);

        self.reporter.line(format!(
            "LF: {}, LV: {}, RF: {}, RV: {}",
            a.frequency, a.strength, b.frequency, b.strength
        ));
        (a, b)
    }

    fn channel_command(&mut self, channel: Channel, samples: &[f32], sample_rate: u32) -> ShockCommand {
        let spectrum = self.analyzer.analyze(samples, sample_rate);
        match spectrum.peak() {
            Some(peak) => ShockCommand::new(
                channel,
                strength_transform(peak.magnitude),
                freq_transform(i64::try_from(peak.bin).unwrap_or(i64::MAX)),
            ),
            None => {
                log::debug!("Channel {} has no bins below the band limit", channel);
                ShockCommand::silence(channel)
            }
        }
    }

    /// Run one full cycle and wait for the peripheral writes.
    ///
    /// Returns whether the pair was written (false when not connected).
    pub async fn dispatch(&mut self, frame: &AudioFrame) -> Result<bool, DeviceError> {
        self.stats.lock().buffers += 1;
        let (a, b) = self.commands_for(frame);

        let outcome = self.controller.shock(a, b).await;

        let mut stats = self.stats.lock();
        stats.last = Some((a, b));
        match &outcome {
            Ok(true) => stats.sent += 1,
            Ok(false) => stats.skipped += 1,
            Err(_) => stats.failed += 1,
        }
        drop(stats);

        log::trace!(
            "Buffer dispatched {:?} after capture",
            frame.captured_at.elapsed()
        );
        outcome
    }

    /// Blocking variant for threads outside the runtime. Errors are reported,
    /// not returned; the next buffer proceeds normally.
    pub fn dispatch_blocking(&mut self, runtime: &Handle, frame: &AudioFrame) {
        if let Err(e) = runtime.block_on(self.dispatch(frame)) {
            log::error!("Shock failed: {}", e);
            self.reporter.line(format!("Shock failed: {}", e));
        }
    }
}

/// Single-slot frame handoff that keeps only the newest frame
#[derive(Default)]
struct Mailbox {
    slot: Mutex<MailboxSlot>,
    ready: Condvar,
}

#[derive(Default)]
struct MailboxSlot {
    frame: Option<AudioFrame>,
    closed: bool,
}

impl Mailbox {
    /// Deposit a frame; returns true if an undispatched frame was replaced
    fn put(&self, frame: AudioFrame) -> bool {
        let replaced = self.slot.lock().frame.replace(frame).is_some();
        self.ready.notify_one();
        replaced
    }

    /// Wait for the next frame; `None` once closed
    fn take(&self) -> Option<AudioFrame> {
        let mut slot = self.slot.lock();
        loop {
            if slot.closed {
                return None;
            }
            if let Some(frame) = slot.frame.take() {
                return Some(frame);
            }
            self.ready.wait(&mut slot);
        }
    }

    fn close(&self) {
        self.slot.lock().closed = true;
        self.ready.notify_all();
    }
}

/// Worker thread draining the mailbox under the drop-oldest policy
pub struct DispatchWorker {
    mailbox: Arc<Mailbox>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DispatchWorker {
    /// Stop after the in-flight buffer; a pending buffer is discarded
    pub fn stop(&mut self) {
        self.mailbox.close();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build the capture callback for `policy`.
///
/// `Block` returns a sink that dispatches inline on the calling thread. `DropOldest`
/// also spawns the worker that owns the dispatcher.
pub fn frame_sink<T: BleTransport>(
    mut dispatcher: Dispatcher<T>,
    runtime: Handle,
    policy: Backpressure,
) -> std::io::Result<(FrameSink, Option<DispatchWorker>)> {
    match policy {
        Backpressure::Block => {
            let sink: FrameSink = Box::new(move |frame| {
                dispatcher.dispatch_blocking(&runtime, &frame);
            });
            Ok((sink, None))
        }
        Backpressure::DropOldest => {
            let mailbox = Arc::new(Mailbox::default());
            let stats = dispatcher.stats.clone();

            let worker_mailbox = mailbox.clone();
            let thread_handle = thread::Builder::new()
                .name("shock-dispatch".to_string())
                .spawn(move || {
                    while let Some(frame) = worker_mailbox.take() {
                        dispatcher.dispatch_blocking(&runtime, &frame);
                    }
                    log::info!(
                        "Dispatch worker stopped after {} analysed buffers",
                        dispatcher.analyzer().analyzed()
                    );
                })?;

            let sink_mailbox = mailbox.clone();
            let sink: FrameSink = Box::new(move |frame| {
                if sink_mailbox.put(frame) {
                    stats.lock().dropped += 1;
                }
            });

            Ok((
                sink,
                Some(DispatchWorker {
                    mailbox,
                    thread_handle: Some(thread_handle),
                }),
            ))
        }
    }
}
