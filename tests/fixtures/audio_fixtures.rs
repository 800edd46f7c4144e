//! Audio Test Fixtures
//!
//! Generated audio keeps tests reproducible and free of binary assets.
//!
//! Formats:
//! - Microphone input: 16kHz mono
//! - Agent output: 24kHz mono
//! - 16-bit signed PCM throughout

use std::f32::consts::PI;
use std::path::Path;

/// Microphone sample rate
pub const MIC_RATE: u32 = 16000;

/// Agent audio sample rate
pub const AGENT_RATE: u32 = 24000;

/// Number of samples covering `ms` milliseconds at `rate`.
pub fn samples_for(rate: u32, ms: u64) -> usize {
    (rate as u64 * ms / 1000) as usize
}

/// Generate silence (zeros)
pub fn generate_silence(duration_samples: usize) -> Vec<i16> {
    vec![0i16; duration_samples]
}

/// Generate a sine wave tone at `rate`
pub fn generate_sine_wave(
    duration_samples: usize,
    rate: u32,
    frequency: f32,
    amplitude: f32,
) -> Vec<i16> {
    let max_amplitude = amplitude * i16::MAX as f32;
    let angular_freq = 2.0 * PI * frequency / rate as f32;

    (0..duration_samples)
        .map(|i| ((angular_freq * i as f32).sin() * max_amplitude) as i16)
        .collect()
}

/// Agent speech stand-in: a 220Hz tone of `ms` milliseconds at 24kHz
pub fn agent_tone(ms: u64) -> Vec<i16> {
    generate_sine_wave(samples_for(AGENT_RATE, ms), AGENT_RATE, 220.0, 0.4)
}

/// Write mono 16-bit PCM to a WAV file.
pub fn write_wav(path: &Path, samples: &[i16], rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV");
    for sample in samples {
        writer.write_sample(*sample).expect("Failed to write sample");
    }
    writer.finalize().expect("Failed to finalize WAV");
}

/// Write a stereo 44.1kHz tone so capture has to downmix and resample.
pub fn write_stereo_tone(path: &Path, ms: u64) {
    let rate = 44100;
    let mono = generate_sine_wave(samples_for(rate, ms), rate, 440.0, 0.5);
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV");
    for sample in mono {
        writer.write_sample(sample).expect("Failed to write sample");
        writer.write_sample(sample).expect("Failed to write sample");
    }
    writer.finalize().expect("Failed to finalize WAV");
}

/// Root-mean-square level normalized to 0.0 - 1.0
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}
