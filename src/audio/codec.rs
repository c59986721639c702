//! PCM wire codec
//!
//! The remote session exchanges raw little-endian 16-bit PCM, base64-encoded
//! inside JSON text frames. Outbound microphone audio is f32 in `[-1.0, 1.0]`
//! and is quantized to i16 before encoding; inbound payloads reverse the
//! mapping at the playback sample rate.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::audio::AudioFrame;
use crate::{Error, Result};

/// Base64 PCM payload plus its MIME descriptor, as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedBlob {
    /// Base64-encoded little-endian 16-bit PCM
    pub data: String,
    /// MIME descriptor, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

/// MIME descriptor for raw PCM at the given sample rate
#[must_use]
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Encodes a capture frame for transmission.
///
/// Samples are scaled by 32768 and clamped into i16 range, then serialized
/// little-endian and base64-encoded. An empty frame yields an empty payload.
#[must_use]
pub fn encode_frame(frame: &AudioFrame) -> EncodedBlob {
    let mut bytes = Vec::with_capacity(frame.samples.len() * 2);
    for &sample in &frame.samples {
        // Convert f32 [-1.0, 1.0] to i16
        #[allow(clippy::cast_possible_truncation)]
        let quantized = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }

    EncodedBlob {
        data: BASE64.encode(&bytes),
        mime_type: pcm_mime_type(frame.sample_rate),
    }
}

/// Decodes a base64 payload into raw bytes.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] if the input is not valid base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(data)
        .map_err(|e| Error::MalformedPayload(format!("invalid base64: {e}")))
}

/// Decodes little-endian 16-bit PCM bytes into an audio frame.
///
/// An empty input decodes to an empty frame.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] if `channels` is zero or the byte
/// length is not a whole number of interleaved sample frames.
pub fn decode_pcm(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioFrame> {
    if channels == 0 {
        return Err(Error::MalformedPayload(
            "zero channel count".to_string(),
        ));
    }
    let stride = 2 * usize::from(channels);
    if bytes.len() % stride != 0 {
        return Err(Error::MalformedPayload(format!(
            "PCM byte length {} is not a multiple of the {stride}-byte frame",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(AudioFrame {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};

    #[test]
    fn encode_quantizes_and_clamps() {
        let frame = AudioFrame::mono(vec![0.0, 0.5, -0.5, 1.0, -1.0, 2.0], CAPTURE_SAMPLE_RATE);
        let blob = encode_frame(&frame);
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");

        let bytes = decode_base64(&blob.data).unwrap();
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(values, vec![0, 16384, -16384, 32767, -32768, 32767]);
    }

    #[test]
    fn decode_reverses_encode_within_quantization_error() {
        let original = vec![0.25, -0.75, 0.0, 0.99];
        let blob = encode_frame(&AudioFrame::mono(original.clone(), CAPTURE_SAMPLE_RATE));
        let bytes = decode_base64(&blob.data).unwrap();
        let frame = decode_pcm(&bytes, CAPTURE_SAMPLE_RATE, 1).unwrap();

        assert_eq!(frame.len(), original.len());
        for (decoded, expected) in frame.samples.iter().zip(&original) {
            assert!((decoded - expected).abs() < 1.0 / 32768.0);
        }
    }

    #[test]
    fn empty_frame_round_trips() {
        let blob = encode_frame(&AudioFrame::mono(Vec::new(), CAPTURE_SAMPLE_RATE));
        assert!(blob.data.is_empty());

        let frame = decode_pcm(&[], PLAYBACK_SAMPLE_RATE, 1).unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.sample_rate, PLAYBACK_SAMPLE_RATE);
    }

    #[test]
    fn partial_sample_frames_are_malformed() {
        let err = decode_pcm(&[0x00, 0x01, 0x02], PLAYBACK_SAMPLE_RATE, 1).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));

        // one mono sample is half a stereo frame
        let err = decode_pcm(&[0x00, 0x01], PLAYBACK_SAMPLE_RATE, 2).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }

    #[test]
    fn zero_channels_is_malformed() {
        let err = decode_pcm(&[0x00, 0x01], PLAYBACK_SAMPLE_RATE, 0).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }

    #[test]
    fn invalid_base64_is_malformed() {
        let err = decode_base64("not base64!!!").unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }

    #[test]
    fn blob_serializes_with_camel_case_mime_key() {
        let blob = EncodedBlob {
            data: "AAAA".to_string(),
            mime_type: pcm_mime_type(16000),
        };
        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(json["data"], "AAAA");
    }
}
