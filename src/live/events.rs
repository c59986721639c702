//! Session event model
//!
//! Everything that can change session state is expressed as one of these
//! events and pushed onto a single ordered queue: microphone frames, decoded
//! remote events, and the stop request. The control loop in `session` is the
//! only consumer, so arrival order is processing order.

use crate::audio::{AudioFrame, EncodedBlob};
use crate::transcript::SpeakerRole;

/// Remote-originated occurrence, already lifted out of the wire format
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Handshake acknowledged; duplex streaming may begin
    Opened,
    /// A chunk of encoded model speech
    AudioDelta(EncodedBlob),
    /// A transcription fragment for either speaker
    TranscriptDelta {
        /// Speaker the fragment belongs to
        role: SpeakerRole,
        /// Fragment text, appended to the transcript
        text: String,
    },
    /// The user spoke over the model; queued playback is stale
    Interrupted,
    /// The model finished its reply turn
    TurnCompleted,
    /// Remote closed the stream
    Closed {
        /// Close reason, when the remote supplied one
        reason: Option<String>,
    },
    /// Transport-level failure; the connection is unusable
    Error(String),
}

/// Unit of work on the session's ordered queue
#[derive(Debug)]
pub enum SessionEvent {
    /// A completed microphone frame ready to send
    Frame(AudioFrame),
    /// Something arrived from the remote
    Inbound(InboundEvent),
    /// The user asked to end the session
    StopRequested,
}
