//! Audio pipeline integration tests
//!
//! Tests codec and playback scheduling without requiring audio hardware

use lumina_live::audio::{decode_base64, decode_pcm, encode_frame, pcm_mime_type};
use lumina_live::{AudioFrame, CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE, PlaybackScheduler};

mod common;
use common::{generate_silence, generate_sine_samples};

const EPSILON: f64 = 1e-9;

#[test]
fn test_codec_roundtrip_preserves_speech() {
    let samples = generate_sine_samples(440.0, 0.1, 0.8, CAPTURE_SAMPLE_RATE);
    let frame = AudioFrame::mono(samples.clone(), CAPTURE_SAMPLE_RATE);

    let blob = encode_frame(&frame);
    assert_eq!(blob.mime_type, pcm_mime_type(CAPTURE_SAMPLE_RATE));

    let bytes = decode_base64(&blob.data).unwrap();
    assert_eq!(bytes.len(), samples.len() * 2);

    let decoded = decode_pcm(&bytes, CAPTURE_SAMPLE_RATE, 1).unwrap();
    assert_eq!(decoded.len(), samples.len());
    assert_eq!(decoded.sample_rate, CAPTURE_SAMPLE_RATE);

    // quantization to 16 bits keeps every sample within one step
    for (original, roundtripped) in samples.iter().zip(&decoded.samples) {
        assert!((original - roundtripped).abs() <= 1.0 / 32768.0);
    }
}

#[test]
fn test_scheduled_deltas_chain_then_interruption_resets() {
    let scheduler = PlaybackScheduler::new(PLAYBACK_SAMPLE_RATE);
    scheduler.schedule(generate_sine_samples(220.0, 0.5, 0.5, PLAYBACK_SAMPLE_RATE));
    scheduler.schedule(generate_silence(0.5, PLAYBACK_SAMPLE_RATE));
    scheduler.schedule(generate_sine_samples(330.0, 0.5, 0.5, PLAYBACK_SAMPLE_RATE));

    let buffers = scheduler.active_buffers();
    assert_eq!(buffers.len(), 3);
    assert!((buffers[0].start_at - 0.0).abs() < EPSILON);
    assert!((buffers[1].start_at - 0.5).abs() < EPSILON);
    assert!((buffers[2].start_at - 1.0).abs() < EPSILON);
    assert!((scheduler.next_start() - 1.5).abs() < EPSILON);

    // barge-in wipes the chain
    assert_eq!(scheduler.cancel_all(), 3);
    assert_eq!(scheduler.active_count(), 0);
    assert!(scheduler.next_start().abs() < EPSILON);
}

#[test]
fn test_render_drains_the_queue_in_order() {
    let scheduler = PlaybackScheduler::new(PLAYBACK_SAMPLE_RATE);
    scheduler.schedule(generate_sine_samples(220.0, 0.05, 0.5, PLAYBACK_SAMPLE_RATE));
    scheduler.schedule(generate_sine_samples(330.0, 0.05, 0.5, PLAYBACK_SAMPLE_RATE));

    // 0.05s at 24kHz is 1200 samples; pull three device blocks of 1000
    let mut out = vec![0.0f32; 1000];
    scheduler.render(&mut out, 1);
    assert_eq!(scheduler.active_count(), 2);

    scheduler.render(&mut out, 1);
    assert_eq!(scheduler.active_count(), 1);

    scheduler.render(&mut out, 1);
    assert_eq!(scheduler.active_count(), 0);
    // tail of the block past the audio is silence
    assert!(out[400..].iter().all(|&s| s.abs() < f32::EPSILON));
    assert!((scheduler.clock() - 0.125).abs() < EPSILON);
}

#[test]
fn test_barge_in_restarts_playback_immediately() {
    let scheduler = PlaybackScheduler::new(PLAYBACK_SAMPLE_RATE);
    scheduler.schedule(generate_sine_samples(220.0, 0.5, 0.5, PLAYBACK_SAMPLE_RATE));
    scheduler.schedule(generate_sine_samples(220.0, 0.5, 0.5, PLAYBACK_SAMPLE_RATE));

    // the device pulls part of the first buffer, then the user barges in
    let mut out = vec![0.0f32; 1000];
    scheduler.render(&mut out, 1);
    assert_eq!(scheduler.cancel_all(), 2);
    assert_eq!(scheduler.active_count(), 0);
    assert!(scheduler.next_start().abs() < EPSILON);

    // the next reply starts at the current clock, not at the stale chain end
    let id = scheduler.schedule(generate_sine_samples(330.0, 0.1, 0.5, PLAYBACK_SAMPLE_RATE));
    let buffers = scheduler.active_buffers();
    assert_eq!(buffers[0].id, id);
    assert!((buffers[0].start_at - scheduler.clock()).abs() < EPSILON);
    assert!((buffers[0].start_at - 1000.0 / f64::from(PLAYBACK_SAMPLE_RATE)).abs() < EPSILON);
}

#[test]
fn test_capture_frame_spans_expected_duration() {
    let frame = AudioFrame::mono(
        generate_silence(0.256, CAPTURE_SAMPLE_RATE),
        CAPTURE_SAMPLE_RATE,
    );
    assert_eq!(frame.len(), 4096);
    assert!((frame.duration_secs() - 0.256).abs() < 1e-6);
}
