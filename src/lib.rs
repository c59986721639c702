//! Lumina Live - real-time duplex voice conversation client
//!
//! This library streams microphone audio to a remote generative model and
//! plays the model's spoken replies as they arrive:
//! - Microphone capture in fixed 16kHz mono frames
//! - PCM16/base64 wire codec
//! - Gapless playback scheduling with barge-in cancellation
//! - Incremental conversation transcript
//! - Session lifecycle driven by one ordered event queue
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  frames   ┌───────────────────────────┐
//! │  MicCapture  ├──────────►│                           │
//! └──────────────┘           │        LiveSession        │
//! ┌──────────────┐  events   │       (control loop)      │
//! │  WsTransport ├──────────►│                           │
//! └──────▲───────┘           └──┬─────────────┬──────────┘
//!        │ encoded frames       │ schedule    │ append
//!        │                      ▼             ▼
//!        │              ┌───────────────┐ ┌──────────────┐
//!        └──────────────┤   Playback    │ │  Transcript  │
//!                       │   Scheduler   │ │     Log      │
//!                       └───────┬───────┘ └──────────────┘
//!                               │ render
//!                               ▼
//!                        ┌──────────────┐
//!                        │ SpeakerOutput│
//!                        └──────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod live;
pub mod transcript;

pub use audio::{
    AudioFrame, CAPTURE_SAMPLE_RATE, CaptureSource, EncodedBlob, FRAME_SAMPLES, FrameSink,
    MicCapture, OutputSink, PLAYBACK_SAMPLE_RATE, PlaybackScheduler, SpeakerOutput,
};
pub use config::LiveConfig;
pub use error::{Error, Result};
pub use live::{
    Connector, EventSender, InboundEvent, LiveSession, SessionController, SessionEvent,
    SessionState, SessionStats, Transport, WsConnector,
};
pub use transcript::{SpeakerRole, TranscriptLog, TranscriptTurn};
