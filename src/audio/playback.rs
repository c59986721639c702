//! Gapless audio playback scheduling
//!
//! Model speech arrives as a stream of short PCM buffers. [`PlaybackScheduler`]
//! assigns each one a start time of `max(next_start, now)` and advances
//! `next_start` by the buffer's duration, so consecutive buffers splice into
//! continuous speech with no gaps and no overlap regardless of network jitter.
//! `now` comes from a sample-accurate clock: the number of frames the output
//! device has pulled through [`PlaybackScheduler::render`].
//!
//! A barge-in cancels everything at once: [`PlaybackScheduler::cancel_all`]
//! empties the queue and resets `next_start` to zero, so the next buffer plays
//! immediately.
//!
//! [`SpeakerOutput`] owns the output device on a dedicated thread (as with
//! capture, `cpal` streams are not `Send`) and drives `render` from the device
//! callback.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use uuid::Uuid;

use crate::{Error, Result};

/// Sample rate for model speech playback (24kHz)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Identifier for a scheduled playback buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(Uuid);

impl BufferId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Snapshot of one in-flight buffer
#[derive(Debug, Clone, Copy)]
pub struct BufferInfo {
    /// Buffer identifier assigned at scheduling time
    pub id: BufferId,
    /// Scheduled start on the playback clock, in seconds
    pub start_at: f64,
    /// Buffer duration in seconds
    pub duration: f64,
}

struct ScheduledBuffer {
    id: BufferId,
    samples: Vec<f32>,
    start_at: f64,
    duration: f64,
}

struct SchedulerState {
    /// Earliest start time for the next scheduled buffer
    next_start: f64,
    /// Read offset into the front buffer
    cursor: usize,
    /// In-flight buffers, front is (or will be) audible
    active: VecDeque<ScheduledBuffer>,
}

/// Orders decoded model audio into one gapless output stream
pub struct PlaybackScheduler {
    sample_rate: u32,
    /// Frames handed to the output device so far; drives the clock
    rendered: AtomicU64,
    state: Mutex<SchedulerState>,
}

impl PlaybackScheduler {
    /// Creates a scheduler with an idle clock at zero
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            rendered: AtomicU64::new(0),
            state: Mutex::new(SchedulerState {
                next_start: 0.0,
                cursor: 0,
                active: VecDeque::new(),
            }),
        }
    }

    /// Current playback clock position in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn clock(&self) -> f64 {
        self.rendered.load(Ordering::Relaxed) as f64 / f64::from(self.sample_rate)
    }

    /// Enqueues a buffer at `max(next_start, now)` and advances `next_start`
    /// by its duration. Returns the buffer's cancellation id.
    pub fn schedule(&self, samples: Vec<f32>) -> BufferId {
        let id = BufferId::new();
        #[allow(clippy::cast_precision_loss)]
        let duration = samples.len() as f64 / f64::from(self.sample_rate);

        let mut state = self.lock();
        let start_at = state.next_start.max(self.clock());
        state.next_start = start_at + duration;
        state.active.push_back(ScheduledBuffer {
            id,
            samples,
            start_at,
            duration,
        });

        tracing::trace!(buffer = %id, start_at, duration, "playback buffer scheduled");
        id
    }

    /// Fills a device output block, mono samples fanned out across `channels`.
    ///
    /// Pulls from the front buffer, pops it once exhausted, and emits silence
    /// when the queue is empty. Always advances the clock by the block's
    /// frame count, so scheduling stays aligned with real time even across
    /// silent stretches.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }
        let frames = out.len() / channels;

        {
            let mut state = self.lock();
            let mut written = 0usize;
            while written < frames {
                let cursor = state.cursor;
                let Some(buffer) = state.active.front() else {
                    break;
                };

                let take = (buffer.samples.len() - cursor).min(frames - written);
                for (i, &sample) in buffer.samples[cursor..cursor + take].iter().enumerate() {
                    let frame = (written + i) * channels;
                    out[frame..frame + channels].fill(sample);
                }
                let finished = cursor + take >= buffer.samples.len();
                let finished_id = buffer.id;

                state.cursor += take;
                written += take;
                if finished {
                    state.active.pop_front();
                    state.cursor = 0;
                    tracing::trace!(buffer = %finished_id, "playback buffer complete");
                }
            }
        }

        self.rendered.fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Drops every in-flight buffer and resets `next_start` to zero, so the
    /// next scheduled buffer starts immediately. Returns how many buffers
    /// were flushed.
    pub fn cancel_all(&self) -> usize {
        let mut state = self.lock();
        let flushed = state.active.len();
        state.active.clear();
        state.cursor = 0;
        state.next_start = 0.0;

        if flushed > 0 {
            tracing::debug!(flushed, "playback queue flushed");
        }
        flushed
    }

    /// Number of in-flight buffers
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Earliest start time the next buffer would receive from chaining
    #[must_use]
    pub fn next_start(&self) -> f64 {
        self.lock().next_start
    }

    /// In-flight buffers in scheduled order
    #[must_use]
    pub fn active_buffers(&self) -> Vec<BufferInfo> {
        self.lock()
            .active
            .iter()
            .map(|b| BufferInfo {
                id: b.id,
                start_at: b.start_at,
                duration: b.duration,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Sink that drains a [`PlaybackScheduler`] into an audio device
pub trait OutputSink: Send {
    /// Opens the output device and begins pulling rendered audio.
    ///
    /// Starting an already-running sink is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if the device cannot be opened.
    fn start(&mut self, scheduler: Arc<PlaybackScheduler>) -> Result<()>;

    /// Stops playback and releases the device. Safe to call repeatedly.
    fn stop(&mut self);

    /// Whether the sink is currently running
    fn is_running(&self) -> bool;
}

/// Plays scheduled audio on the default output device
pub struct SpeakerOutput {
    worker: Option<PlaybackWorker>,
}

struct PlaybackWorker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl SpeakerOutput {
    /// Creates a new playback instance, probing the default output device.
    ///
    /// # Errors
    ///
    /// Returns error if no usable output device is present.
    pub fn new() -> Result<Self> {
        let (device, config) = output_stream_config()?;
        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "speaker output initialized"
        );

        Ok(Self { worker: None })
    }
}

impl OutputSink for SpeakerOutput {
    fn start(&mut self, scheduler: Arc<PlaybackScheduler>) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("lumina-playback".to_string())
            .spawn(move || playback_thread(&scheduler, &ready_tx, &stop_rx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(PlaybackWorker { stop_tx, handle });
                tracing::debug!("speaker output started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::Audio(
                    "playback thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
            tracing::debug!("speaker output stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for SpeakerOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the output stream for its whole lifetime; parks until `stop_rx` fires
fn playback_thread(
    scheduler: &Arc<PlaybackScheduler>,
    ready_tx: &mpsc::Sender<Result<()>>,
    stop_rx: &mpsc::Receiver<()>,
) {
    let (device, config) = match output_stream_config() {
        Ok(found) => found,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let channels = config.channels as usize;
    let scheduler = Arc::clone(scheduler);
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            scheduler.render(data, channels);
        },
        |err| {
            tracing::error!(error = %err, "playback stream error");
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(Error::DeviceUnavailable(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(Error::DeviceUnavailable(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    let _ = stop_rx.recv();
    drop(stream);
}

/// Finds a mono output config at the playback sample rate, stereo fallback
fn output_stream_config() -> Result<(Device, StreamConfig)> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        })
        .ok_or_else(|| {
            Error::DeviceUnavailable(format!(
                "no {PLAYBACK_SAMPLE_RATE} Hz output config available"
            ))
        })?;

    let config = supported_config
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config();

    Ok((device, config))
}
