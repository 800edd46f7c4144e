//! PCM sample helpers: byte packing, level metering, down-mixing and
//! sample-rate conversion.

/// Scale factor from i16 to normalized f32.
const PCM_TO_FLOAT_SCALE: f32 = 1.0 / 32768.0;

/// Decode PCM 16-bit little-endian bytes. A trailing odd byte is ignored.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples as PCM 16-bit little-endian bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Root-mean-square level of PCM16 samples, normalized to `0.0..=1.0`.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let v = s as f32 * PCM_TO_FLOAT_SCALE;
            v * v
        })
        .sum();

    (sum_squares / samples.len() as f32).sqrt().min(1.0)
}

/// Convert a normalized float sample to i16 with clamping.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 * PCM_TO_FLOAT_SCALE
}

/// Average interleaved frames down to mono.
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

// =============================================================================
// Resampling
// =============================================================================

/// Streaming linear-interpolation resampler for mono audio.
///
/// State carries across calls, so feeding a signal in arbitrary pieces
/// produces the same output as feeding it at once.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    /// Input samples advanced per output sample
    step: f64,
    /// Position of the next output sample, relative to `last`
    position: f64,
    /// Last sample of the previous block
    last: Option<f32>,
}

impl LinearResampler {
    /// A zero rate on either side yields a passthrough resampler.
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        let step = if from_rate == 0 || to_rate == 0 {
            1.0
        } else {
            from_rate as f64 / to_rate as f64
        };
        Self {
            from_rate,
            to_rate,
            step,
            position: 0.0,
            last: None,
        }
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    /// Whether the conversion is the identity.
    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate || self.from_rate == 0 || self.to_rate == 0
    }

    /// Drop carried state (e.g. after a stream restart).
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.last = None;
    }

    /// Resample one block of input.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() || input.is_empty() {
            return input.to_vec();
        }

        // Index 0 is the carried sample; the block follows.
        let offset = usize::from(self.last.is_some());
        let sample_at = |i: usize| -> f32 {
            if offset == 1 {
                if i == 0 {
                    self.last.unwrap_or_default()
                } else {
                    input[i - 1]
                }
            } else {
                input[i]
            }
        };
        let available = input.len() + offset;

        let mut output =
            Vec::with_capacity((input.len() as f64 / self.step).ceil() as usize + 1);
        let mut position = self.position;
        while position + 1.0 < available as f64 {
            let index = position.floor() as usize;
            let frac = (position - index as f64) as f32;
            let a = sample_at(index);
            let b = sample_at(index + 1);
            output.push(a + (b - a) * frac);
            position += self.step;
        }

        // Re-base so the last input sample becomes index 0 of the next block.
        self.position = position - (available - 1) as f64;
        self.last = input.last().copied();
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_conversion() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN];
        let bytes = samples_to_bytes(&samples);
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[2..4], &[1, 0]);
        assert_eq!(bytes_to_samples(&bytes), samples);

        // Odd trailing byte is dropped.
        assert_eq!(bytes_to_samples(&[1, 0, 7]), vec![1]);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0; 100]), 0.0);
        let loud = rms(&[i16::MAX; 100]);
        assert!(loud > 0.99 && loud <= 1.0);
        let half = rms(&[16384, -16384, 16384, -16384]);
        assert!((half - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_f32_to_i16_clamps() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), i16::MIN);
        assert_eq!(f32_to_i16(4.0), i16::MAX);
        assert_eq!(f32_to_i16(-4.0), i16::MIN);
        assert!((i16_to_f32(16384) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_downmix() {
        assert_eq!(downmix(&[0.5, 0.25], 1), vec![0.5, 0.25]);
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        // Incomplete trailing frame is dropped.
        assert_eq!(downmix(&[1.0, 1.0, 1.0], 2), vec![1.0]);
    }

    #[test]
    fn test_resampler_passthrough() {
        let mut r = LinearResampler::new(16000, 16000);
        assert!(r.is_passthrough());
        assert_eq!(r.process(&[0.1, 0.2]), vec![0.1, 0.2]);
    }

    #[test]
    fn test_resampler_downsample_ratio() {
        let mut r = LinearResampler::new(48000, 16000);
        let input = vec![0.25f32; 4800];
        let output = r.process(&input);
        assert!((output.len() as i64 - 1600).abs() <= 1);
        assert!(output.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_resampler_streaming_matches_whole() {
        let input: Vec<f32> = (0..960).map(|i| (i as f32 * 0.01).sin()).collect();

        let mut whole = LinearResampler::new(44100, 16000);
        let expected = whole.process(&input);

        let mut pieces = LinearResampler::new(44100, 16000);
        let mut actual = Vec::new();
        for block in input.chunks(97) {
            actual.extend(pieces.process(block));
        }

        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-4);
        }
    }

    #[test]
    fn test_resampler_zero_rate_passes_through() {
        let mut r = LinearResampler::new(0, 24000);
        assert!(r.is_passthrough());
        assert_eq!(r.process(&[0.1, 0.2, 0.3]), vec![0.1, 0.2, 0.3]);

        let mut r = LinearResampler::new(16000, 0);
        assert!(r.is_passthrough());
        assert_eq!(r.process(&[0.5]), vec![0.5]);
    }

    #[test]
    fn test_resampler_upsample_interpolates() {
        let mut r = LinearResampler::new(8000, 16000);
        let output = r.process(&[0.0, 1.0]);
        assert_eq!(output, vec![0.0, 0.5]);
        let output = r.process(&[1.0]);
        assert_eq!(output, vec![1.0, 1.0]);
    }
}
