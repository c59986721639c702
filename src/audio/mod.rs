//! Audio pipeline
//!
//! Capture pulls fixed-size microphone frames, the codec maps them to and
//! from the base64 PCM carried on the wire, and playback schedules decoded
//! model audio gaplessly against a sample-accurate clock.

mod capture;
mod codec;
mod playback;

pub use capture::{CAPTURE_SAMPLE_RATE, CaptureSource, FRAME_SAMPLES, FrameSink, MicCapture};
pub use codec::{EncodedBlob, decode_base64, decode_pcm, encode_frame, pcm_mime_type};
pub use playback::{
    BufferId, BufferInfo, OutputSink, PLAYBACK_SAMPLE_RATE, PlaybackScheduler, SpeakerOutput,
};

/// A block of linear PCM samples in the range `[-1.0, 1.0]`
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Interleaved samples
    pub samples: Vec<f32>,
    /// Samples per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

impl AudioFrame {
    /// Creates a single-channel frame
    #[must_use]
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Number of samples in the frame
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame carries no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frame duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f64 {
        if self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (f64::from(self.sample_rate) * f64::from(self.channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_frame_duration() {
        let frame = AudioFrame::mono(vec![0.0; 16000], 16000);
        assert!((frame.duration_secs() - 1.0).abs() < f64::EPSILON);
        assert_eq!(frame.len(), 16000);
        assert!(!frame.is_empty());
    }

    #[test]
    fn stereo_frame_duration_counts_sample_pairs() {
        let frame = AudioFrame {
            samples: vec![0.0; 48000],
            sample_rate: 24000,
            channels: 2,
        };
        assert!((frame.duration_secs() - 1.0).abs() < f64::EPSILON);
    }
}
