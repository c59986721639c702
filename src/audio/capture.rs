//! Microphone capture
//!
//! The input device is opened on a dedicated thread because `cpal` streams
//! are not `Send`. The device callback accumulates samples into fixed-size
//! frames and hands each completed frame to the caller's sink; `stop` signals
//! the thread and joins it so the device is released deterministically.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::audio::AudioFrame;
use crate::{Error, Result};

/// Sample rate for microphone capture (16kHz for speech)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Samples per outbound capture frame (256ms at 16kHz)
pub const FRAME_SAMPLES: usize = 4096;

/// Callback invoked with each completed capture frame
pub type FrameSink = Box<dyn FnMut(AudioFrame) + Send + 'static>;

/// Source of fixed-size microphone frames
pub trait CaptureSource: Send {
    /// Opens the input device and begins delivering frames to `sink`.
    ///
    /// Starting an already-running source is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] or [`Error::PermissionDenied`]
    /// if the device cannot be opened.
    fn start(&mut self, sink: FrameSink) -> Result<()>;

    /// Stops delivery and releases the device. Safe to call repeatedly.
    fn stop(&mut self);

    /// Whether the source is currently delivering frames
    fn is_capturing(&self) -> bool;
}

/// Accumulates device callback slices into fixed-size frames
struct FrameChunker {
    frame_len: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            pending: Vec::with_capacity(frame_len * 2),
        }
    }

    /// Buffers `input` and emits every completed frame. A partial tail frame
    /// stays pending until later input completes it.
    fn push(&mut self, input: &[f32], emit: &mut impl FnMut(Vec<f32>)) {
        self.pending.extend_from_slice(input);
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            let frame = std::mem::replace(&mut self.pending, rest);
            emit(frame);
        }
    }
}

/// Captures 16kHz mono frames from the default input device
pub struct MicCapture {
    worker: Option<CaptureWorker>,
}

struct CaptureWorker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl MicCapture {
    /// Creates a new capture instance, probing the default input device so a
    /// missing or misconfigured microphone fails before any network work.
    ///
    /// # Errors
    ///
    /// Returns error if no usable input device is present.
    pub fn new() -> Result<Self> {
        let (device, config) = input_stream_config()?;
        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = CAPTURE_SAMPLE_RATE,
            channels = config.channels,
            "microphone capture initialized"
        );

        Ok(Self { worker: None })
    }
}

impl CaptureSource for MicCapture {
    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("lumina-capture".to_string())
            .spawn(move || capture_thread(sink, &ready_tx, &stop_rx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker { stop_tx, handle });
                tracing::debug!("microphone capture started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::Audio(
                    "capture thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
            tracing::debug!("microphone capture stopped");
        }
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the input stream for its whole lifetime; parks until `stop_rx` fires
fn capture_thread(
    mut sink: FrameSink,
    ready_tx: &mpsc::Sender<Result<()>>,
    stop_rx: &mpsc::Receiver<()>,
) {
    let (device, config) = match input_stream_config() {
        Ok(found) => found,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let mut chunker = FrameChunker::new(FRAME_SAMPLES);
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            chunker.push(data, &mut |samples| {
                sink(AudioFrame::mono(samples, CAPTURE_SAMPLE_RATE));
            });
        },
        |err| {
            tracing::error!(error = %err, "capture stream error");
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(classify_device_error(&e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(classify_device_error(&e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Blocks until stop is signalled; a dropped sender also releases the stream
    let _ = stop_rx.recv();
    drop(stream);
}

/// Finds a mono input config at the capture sample rate
fn input_stream_config() -> Result<(Device, StreamConfig)> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| classify_device_error(&e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(CAPTURE_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(CAPTURE_SAMPLE_RATE)
        })
        .ok_or_else(|| {
            Error::DeviceUnavailable(format!(
                "no mono {CAPTURE_SAMPLE_RATE} Hz input config available"
            ))
        })?;

    let config = supported_config
        .with_sample_rate(SampleRate(CAPTURE_SAMPLE_RATE))
        .config();

    Ok((device, config))
}

/// Maps a device error message onto the permission/availability split
fn classify_device_error(detail: &str) -> Error {
    let lowered = detail.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("not permitted")
    {
        Error::PermissionDenied(detail.to_string())
    } else {
        Error::DeviceUnavailable(detail.to_string())
    }
}
