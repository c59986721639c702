//! Wire format for the live endpoint
//!
//! The protocol is JSON over WebSocket. The client opens with a `setup`
//! message describing the model, voice, and transcription options, then
//! streams `realtimeInput` messages carrying base64 PCM. The server answers
//! with `setupComplete` once, then `serverContent` messages carrying model
//! audio, transcription fragments, and control flags. Field names are
//! camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::audio::EncodedBlob;
use crate::config::LiveConfig;
use crate::live::events::InboundEvent;
use crate::transcript::SpeakerRole;

/// Client-to-server message, externally tagged
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session handshake, sent exactly once before any media
    Setup(Setup),
    /// Streaming media or stream control
    RealtimeInput(RealtimeInput),
}

/// Session handshake payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully-qualified model name, e.g. `models/...`
    pub model: String,
    pub generation_config: GenerationConfig,
    /// Present to request user speech transcription
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    /// Present to request model speech transcription
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<TranscriptionConfig>,
}

impl Setup {
    /// Builds the handshake from session configuration
    #[must_use]
    pub fn for_session(config: &LiveConfig) -> Self {
        Self {
            model: qualified_model(&config.model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice.clone(),
                        },
                    },
                }),
            },
            input_audio_transcription: config.input_transcription.then(TranscriptionConfig::default),
            output_audio_transcription: config
                .output_transcription
                .then(TranscriptionConfig::default),
        }
    }
}

/// Empty marker object; its presence alone enables the feature
#[derive(Debug, Default, Serialize)]
pub struct TranscriptionConfig {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Reply modalities, `AUDIO` for spoken conversation
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Streaming media message
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media_chunks: Vec<EncodedBlob>,
    /// Marks the outbound audio stream as finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_end: Option<bool>,
}

impl RealtimeInput {
    /// A message carrying one capture frame
    #[must_use]
    pub fn media(blob: EncodedBlob) -> Self {
        Self {
            media_chunks: vec![blob],
            audio_stream_end: None,
        }
    }

    /// The end-of-stream marker sent when capture stops
    #[must_use]
    pub fn stream_end() -> Self {
        Self {
            media_chunks: Vec::new(),
            audio_stream_end: Some(true),
        }
    }
}

/// Server-to-client message. All fields are optional; unknown fields are
/// ignored so protocol additions do not break parsing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    /// Handshake acknowledgement, an opaque object
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    /// Transcription of what the user said
    pub input_transcription: Option<Transcription>,
    /// Transcription of what the model is saying
    pub output_transcription: Option<Transcription>,
    /// The user barged in; queued playback should be dropped
    pub interrupted: bool,
    /// The model finished its reply turn
    pub turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    /// Encoded model speech when the part carries audio
    pub inline_data: Option<EncodedBlob>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Transcription {
    pub text: String,
}

impl ServerMessage {
    /// Flattens a parsed message into inbound events.
    ///
    /// Order within one message is fixed: transcription fragments first
    /// (model, then user), then audio parts, then control flags. Empty
    /// transcription fragments are dropped here so they never reach the
    /// session queue.
    #[must_use]
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(InboundEvent::Opened);
        }

        let Some(content) = self.server_content else {
            return events;
        };

        if let Some(transcription) = content.output_transcription {
            if !transcription.text.is_empty() {
                events.push(InboundEvent::TranscriptDelta {
                    role: SpeakerRole::Model,
                    text: transcription.text,
                });
            }
        }
        if let Some(transcription) = content.input_transcription {
            if !transcription.text.is_empty() {
                events.push(InboundEvent::TranscriptDelta {
                    role: SpeakerRole::User,
                    text: transcription.text,
                });
            }
        }
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(blob) = part.inline_data {
                    events.push(InboundEvent::AudioDelta(blob));
                }
            }
        }
        if content.interrupted {
            events.push(InboundEvent::Interrupted);
        }
        if content.turn_complete {
            events.push(InboundEvent::TurnCompleted);
        }

        events
    }
}

/// Prefixes bare model names with `models/`
fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}
