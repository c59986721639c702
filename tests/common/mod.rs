//! Shared test utilities

use lumina_live::LiveConfig;
use secrecy::SecretString;

/// Config with a dummy API key, suitable for mock transports
#[must_use]
pub fn test_config() -> LiveConfig {
    LiveConfig {
        api_key: Some(SecretString::from("test-api-key".to_string())),
        ..LiveConfig::default()
    }
}

/// Generate sine wave audio samples
#[must_use]
pub fn generate_sine_samples(
    frequency: f32,
    duration_secs: f32,
    amplitude: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[must_use]
pub fn generate_silence(duration_secs: f32, sample_rate: u32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}
