//! Live session lifecycle and control loop
//!
//! A [`LiveSession`] owns every moving part of one conversation: the
//! transport, the microphone source, the playback scheduler, the transcript,
//! and the stats. All of them are mutated from a single control loop that
//! drains the session's ordered event queue, so no session state is shared
//! across tasks and no locking is needed around lifecycle transitions.
//!
//! Lifecycle: `Idle` → `Opening` (start) → `Active` (handshake acknowledged)
//! → `Closing` (stop requested) → `Closed`. Fatal errors pass through
//! `Failed` before landing in `Closed`. A session is never reused.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::audio::{
    self, AudioFrame, CaptureSource, EncodedBlob, FrameSink, MicCapture, OutputSink,
    PLAYBACK_SAMPLE_RATE, PlaybackScheduler, SpeakerOutput,
};
use crate::config::LiveConfig;
use crate::live::events::{InboundEvent, SessionEvent};
use crate::live::transport::{Connector, Transport, WsConnector};
use crate::transcript::{SpeakerRole, TranscriptLog, TranscriptTurn};
use crate::{Error, Result};

/// Lifecycle of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet started
    Idle,
    /// Dialing and awaiting the handshake acknowledgement
    Opening,
    /// Duplex streaming in progress
    Active,
    /// Stop requested, teardown in progress
    Closing,
    /// Torn down; the session cannot be reused
    Closed,
    /// A fatal error occurred; teardown still runs and lands in `Closed`
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Opening => "opening",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Counters accumulated over a session's lifetime
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Session identifier
    pub session_id: Uuid,
    /// When the session was created
    pub started_at: DateTime<Utc>,
    /// Capture frames queued for delivery
    pub frames_sent: u64,
    /// Model audio chunks scheduled for playback
    pub audio_deltas: u64,
    /// Transcription fragments folded into the transcript
    pub transcript_deltas: u64,
    /// Barge-ins that flushed the playback queue
    pub interruptions: u64,
    /// Inbound audio payloads dropped as undecodable
    pub malformed_payloads: u64,
}

impl SessionStats {
    /// Wall-clock time since the session was created
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// Cloneable handle for requesting stop and observing state
#[derive(Debug, Clone)]
pub struct SessionController {
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Receiver<SessionState>,
}

impl SessionController {
    /// Requests an orderly stop. Safe to call from any task, repeatedly;
    /// duplicate requests are ignored by the control loop.
    pub fn stop(&self) {
        let _ = self.events.send(SessionEvent::StopRequested);
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch channel delivering every state transition
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

/// One live voice conversation
pub struct LiveSession {
    id: Uuid,
    config: LiveConfig,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    connector: Box<dyn Connector>,
    capture: Box<dyn CaptureSource>,
    output: Box<dyn OutputSink>,
    playback: Arc<PlaybackScheduler>,
    transcript: TranscriptLog,
    transport: Option<Box<dyn Transport>>,
    stats: SessionStats,
    end_error: Option<Error>,
    torn_down: bool,
}

impl LiveSession {
    /// Creates a session bound to the default microphone and speaker.
    ///
    /// # Errors
    ///
    /// Returns error if either audio device is unavailable.
    pub fn new(config: LiveConfig) -> Result<Self> {
        let capture = MicCapture::new()?;
        let output = SpeakerOutput::new()?;
        Ok(Self::with_backends(
            config,
            Box::new(WsConnector),
            Box::new(capture),
            Box::new(output),
        ))
    }

    /// Creates a session from explicit transport and audio backends
    #[must_use]
    pub fn with_backends(
        config: LiveConfig,
        connector: Box<dyn Connector>,
        capture: Box<dyn CaptureSource>,
        output: Box<dyn OutputSink>,
    ) -> Self {
        let id = Uuid::new_v4();
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            id,
            config,
            state: SessionState::Idle,
            state_tx,
            events_tx,
            events_rx: Some(events_rx),
            connector,
            capture,
            output,
            playback: Arc::new(PlaybackScheduler::new(PLAYBACK_SAMPLE_RATE)),
            transcript: TranscriptLog::new(),
            transport: None,
            stats: SessionStats {
                session_id: id,
                started_at: Utc::now(),
                frames_sent: 0,
                audio_deltas: 0,
                transcript_deltas: 0,
                interruptions: 0,
                malformed_payloads: 0,
            },
            end_error: None,
            torn_down: false,
        }
    }

    /// Opens the transport and begins the handshake.
    ///
    /// Playback starts here so the first model audio is never dropped;
    /// capture waits for the handshake acknowledgement. On failure the
    /// session is torn down and lands in `Closed`.
    ///
    /// # Errors
    ///
    /// Returns error if the session was already started, the output device
    /// cannot be opened, or the connection fails.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(Error::Session(format!(
                "cannot start from state {}",
                self.state
            )));
        }
        self.set_state(SessionState::Opening);
        tracing::info!(session = %self.id, model = %self.config.model, "opening live session");

        if let Err(e) = self.output.start(Arc::clone(&self.playback)) {
            self.set_state(SessionState::Failed);
            self.teardown().await;
            return Err(e);
        }

        match self
            .connector
            .connect(&self.config, self.events_tx.clone())
            .await
        {
            Ok(transport) => {
                self.transport = Some(transport);
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Failed);
                self.teardown().await;
                Err(e)
            }
        }
    }

    /// Drives the session to completion, processing queued events in arrival
    /// order until the session reaches `Closed`.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the session, if any. An orderly
    /// stop returns `Ok`.
    pub async fn run(&mut self) -> Result<()> {
        let Some(mut events_rx) = self.events_rx.take() else {
            return Err(Error::Session("session can only run once".to_string()));
        };
        if self.state == SessionState::Idle {
            return Err(Error::Session("session was not started".to_string()));
        }

        while self.state != SessionState::Closed {
            let Some(event) = events_rx.recv().await else {
                // every sender is gone; nothing more can arrive
                self.teardown().await;
                break;
            };
            self.handle_event(event).await;
        }

        match self.end_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Cloneable stop/observe handle
    #[must_use]
    pub fn controller(&self) -> SessionController {
        SessionController {
            events: self.events_tx.clone(),
            state: self.state_tx.subscribe(),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Session identifier
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Playback scheduler backing this session
    #[must_use]
    pub fn playback(&self) -> Arc<PlaybackScheduler> {
        Arc::clone(&self.playback)
    }

    /// Counters accumulated so far
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats.clone()
    }

    /// Transcript turns accumulated so far
    #[must_use]
    pub fn transcript(&self) -> Vec<TranscriptTurn> {
        self.transcript.snapshot()
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Frame(frame) => self.handle_frame(&frame),
            SessionEvent::Inbound(inbound) => self.handle_inbound(inbound).await,
            SessionEvent::StopRequested => self.handle_stop().await,
        }
    }

    fn handle_frame(&mut self, frame: &AudioFrame) {
        if self.state != SessionState::Active {
            tracing::trace!(state = %self.state, "dropping capture frame outside active state");
            return;
        }
        let Some(transport) = self.transport.as_ref() else {
            return;
        };

        let blob = audio::encode_frame(frame);
        match transport.send_audio(blob) {
            Ok(()) => self.stats.frames_sent += 1,
            Err(e) => {
                // the writer is gone; the reader's error or close event follows
                tracing::warn!(error = %e, "failed to queue capture frame");
            }
        }
    }

    async fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Opened => self.handle_opened().await,
            InboundEvent::AudioDelta(blob) => self.handle_audio_delta(&blob),
            InboundEvent::TranscriptDelta { role, text } => {
                self.handle_transcript_delta(role, &text);
            }
            InboundEvent::Interrupted => self.handle_interrupted(),
            InboundEvent::TurnCompleted => {
                tracing::debug!(session = %self.id, "model turn complete");
            }
            InboundEvent::Closed { reason } => self.handle_remote_closed(reason).await,
            InboundEvent::Error(detail) => self.fail(Error::Transport(detail)).await,
        }
    }

    async fn handle_opened(&mut self) {
        if self.state != SessionState::Opening {
            tracing::debug!(state = %self.state, "ignoring handshake acknowledgement");
            return;
        }

        let sink = self.frame_sink();
        if let Err(e) = self.capture.start(sink) {
            self.fail(e).await;
            return;
        }
        self.set_state(SessionState::Active);
        tracing::info!(session = %self.id, "live session active");
    }

    fn handle_audio_delta(&mut self, blob: &EncodedBlob) {
        if self.state != SessionState::Active {
            tracing::trace!(state = %self.state, "dropping model audio outside active state");
            return;
        }

        let decoded = audio::decode_base64(&blob.data)
            .and_then(|bytes| audio::decode_pcm(&bytes, PLAYBACK_SAMPLE_RATE, 1));
        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.malformed_payloads += 1;
                tracing::warn!(error = %e, "skipping malformed audio payload");
                return;
            }
        };
        if frame.is_empty() {
            return;
        }

        self.playback.schedule(frame.samples);
        self.stats.audio_deltas += 1;
    }

    fn handle_transcript_delta(&mut self, role: SpeakerRole, text: &str) {
        let started_new = self.transcript.append(role, text);
        if started_new {
            let turns = self.transcript.turns();
            if turns.len() >= 2 {
                let sealed = &turns[turns.len() - 2];
                tracing::info!(role = %sealed.role, text = %sealed.text, "transcript turn");
            }
        }
        self.stats.transcript_deltas += 1;
    }

    fn handle_interrupted(&mut self) {
        let flushed = self.playback.cancel_all();
        self.stats.interruptions += 1;
        tracing::debug!(session = %self.id, flushed, "model interrupted, playback flushed");
    }

    async fn handle_remote_closed(&mut self, reason: Option<String>) {
        match self.state {
            SessionState::Closing | SessionState::Closed => {}
            _ => {
                let detail = reason.unwrap_or_else(|| "connection closed by remote".to_string());
                self.fail(Error::Transport(detail)).await;
            }
        }
    }

    async fn handle_stop(&mut self) {
        match self.state {
            SessionState::Opening | SessionState::Active => {
                self.set_state(SessionState::Closing);
                tracing::info!(session = %self.id, "stop requested");
                if let Some(transport) = self.transport.as_ref() {
                    transport.finish_audio();
                }
                self.teardown().await;
            }
            _ => tracing::debug!(state = %self.state, "ignoring duplicate stop request"),
        }
    }

    async fn fail(&mut self, error: Error) {
        tracing::error!(session = %self.id, error = %error, "live session failed");
        if self.end_error.is_none() {
            self.end_error = Some(error);
        }
        if self.state != SessionState::Closed {
            self.set_state(SessionState::Failed);
        }
        self.teardown().await;
    }

    /// Releases every resource exactly once and lands in `Closed`.
    ///
    /// Teardown never waits on the remote: the transport close is bounded
    /// and the audio devices are released synchronously.
    async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.capture.stop();
        let flushed = self.playback.cancel_all();
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.output.stop();

        if let Some(turn) = self.transcript.current() {
            tracing::info!(role = %turn.role, text = %turn.text, "transcript turn");
        }

        self.set_state(SessionState::Closed);
        tracing::info!(
            session = %self.id,
            frames_sent = self.stats.frames_sent,
            audio_deltas = self.stats.audio_deltas,
            transcript_deltas = self.stats.transcript_deltas,
            interruptions = self.stats.interruptions,
            malformed_payloads = self.stats.malformed_payloads,
            flushed,
            "live session closed"
        );
    }

    fn frame_sink(&self) -> FrameSink {
        let events = self.events_tx.clone();
        Box::new(move |frame| {
            let _ = events.send(SessionEvent::Frame(frame));
        })
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        tracing::debug!(session = %self.id, from = %self.state, to = %next, "session state");
        self.state = next;
        self.state_tx.send_replace(next);
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if !self.torn_down {
            self.capture.stop();
            self.playback.cancel_all();
            self.output.stop();
            // transport tasks abort in their own Drop
        }
    }
}
