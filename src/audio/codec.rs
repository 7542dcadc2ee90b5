//! # WAV Decoding and Encoding
//!
//! Converts uploaded WAV bytes into the normalized mono signal the denoiser expects,
//! and turns the denoised signal back into a 16-bit PCM WAV file.
//!
//! ## Decoding steps:
//! 1. **Parse the container** with `hound` (integer PCM of any width, or 32-bit float)
//! 2. **Downmix**: average all channels of each frame into one mono sample
//! 3. **Normalize**: divide by `max(|x|) + ε` so the peak sits just under 1.0
//!
//! Integer samples are kept at their raw integer scale until normalization, so the
//! result does not depend on the bit depth of the upload.

use crate::audio::EPSILON;
use crate::error::{AppError, AppResult};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;

/// Headroom applied before quantizing so that rounding never clips at full scale.
pub const OUTPUT_HEADROOM: f32 = 0.99;

/// Largest magnitude written to a 16-bit sample.
const I16_SCALE: f32 = 32767.0;

/// A mono signal plus its sample rate.
///
/// ## Invariants:
/// - Single channel
/// - Amplitude normalized into approximately [-1, 1]
/// - No NaN/Inf values
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSignal {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Scale a signal by `1 / (max(|x|) + ε)`.
///
/// Silent input stays silent since `0 / ε == 0`. Signs are preserved and the
/// result never exceeds 1.0 in magnitude.
pub fn normalize_audio(samples: &[f32]) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f64, |acc, &s| acc.max((s as f64).abs()));
    let divisor = peak + EPSILON;

    samples
        .iter()
        .map(|&s| (s as f64 / divisor) as f32)
        .collect()
}

/// Average interleaved multi-channel samples into one mono channel.
///
/// `channels == 1` is a copy. Any trailing partial frame is dropped.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| {
            let sum: f64 = frame.iter().map(|&s| s as f64).sum();
            (sum / channels as f64) as f32
        })
        .collect()
}

/// Decode WAV bytes into a normalized mono signal.
///
/// ## Errors:
/// - **DecodeError**: the bytes are not a WAV container, a sample is truncated,
///   or the file holds zero samples.
pub fn read_wav(wav_bytes: &[u8]) -> AppResult<AudioSignal> {
    let reader = WavReader::new(Cursor::new(wav_bytes))
        .map_err(|e| AppError::DecodeError(e.to_string()))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::DecodeError(e.to_string()))?,
        SampleFormat::Int => reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| v as f32))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::DecodeError(e.to_string()))?,
    };

    let mono = downmix_to_mono(&interleaved, channels);
    if mono.is_empty() {
        return Err(AppError::DecodeError("WAV file contains no samples".to_string()));
    }

    if mono.iter().any(|s| !s.is_finite()) {
        return Err(AppError::DecodeError(
            "WAV file contains non-finite samples".to_string(),
        ));
    }

    tracing::debug!(
        sample_rate = spec.sample_rate,
        channels = channels,
        bits_per_sample = spec.bits_per_sample,
        samples = mono.len(),
        "Decoded WAV upload"
    );

    Ok(AudioSignal::new(normalize_audio(&mono), spec.sample_rate))
}

/// Encode a float signal as a mono 16-bit PCM WAV file.
///
/// The signal is re-normalized, scaled by [`OUTPUT_HEADROOM`] and rounded to the
/// nearest integer in `[-32767, 32767]`.
pub fn write_wav_bytes(samples: &[f32], sample_rate: u32) -> AppResult<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| AppError::Internal(format!("WAV writer init failed: {}", e)))?;

        for sample in normalize_audio(samples) {
            let scaled = (sample * OUTPUT_HEADROOM * I16_SCALE).round();
            let quantized = scaled.clamp(-I16_SCALE, I16_SCALE) as i16;
            writer
                .write_sample(quantized)
                .map_err(|e| AppError::Internal(format!("WAV write failed: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| AppError::Internal(format!("WAV finalize failed: {}", e)))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an in-memory 16-bit WAV from interleaved samples.
    pub(crate) fn wav_i16(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn decode_i16(bytes: &[u8]) -> (WavSpec, Vec<i16>) {
        let reader = WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        let samples = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    #[test]
    fn test_normalize_bounds_and_sign() {
        let input = vec![0.5, -2.0, 0.0, 1.25, -0.001, 3.9];
        let normalized = normalize_audio(&input);

        assert!(normalized.iter().all(|s| s.abs() <= 1.0));
        for (before, after) in input.iter().zip(normalized.iter()) {
            if *before != 0.0 {
                assert_eq!(before.is_sign_negative(), after.is_sign_negative());
            }
        }
        // Peak lands just under one
        assert!((normalized[5] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_silence_stays_zero() {
        let normalized = normalize_audio(&[0.0; 16]);
        assert!(normalized.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stereo_with_one_silent_channel_halves_the_tone() {
        // Left silent, right a tone
        let tone: Vec<f32> = (0..64)
            .map(|i| (2.0 * std::f32::consts::PI * i as f32 / 16.0).sin() * 0.8)
            .collect();
        let interleaved: Vec<f32> = tone.iter().flat_map(|&t| [0.0, t]).collect();

        let mono = downmix_to_mono(&interleaved, 2);
        assert_eq!(mono.len(), tone.len());
        for (m, t) in mono.iter().zip(tone.iter()) {
            assert!((m - t / 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_read_wav_downmixes_then_normalizes() {
        let interleaved: Vec<i16> = [1000i16, -4000, 2000, 500]
            .iter()
            .flat_map(|&s| [0i16, s])
            .collect();
        let bytes = wav_i16(&interleaved, 2, 22_050);

        let signal = read_wav(&bytes).unwrap();
        assert_eq!(signal.sample_rate, 22_050);
        assert_eq!(signal.len(), 4);
        // Averaged values are 500, -2000, 1000, 250; peak 2000
        let expected = [0.25f32, -1.0, 0.5, 0.125];
        for (got, want) in signal.samples.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_read_wav_rejects_garbage() {
        let err = read_wav(b"definitely not a riff container").unwrap_err();
        assert!(matches!(err, AppError::DecodeError(_)));
    }

    #[test]
    fn test_read_wav_rejects_empty_file() {
        let bytes = wav_i16(&[], 1, 16_000);
        let err = read_wav(&bytes).unwrap_err();
        assert!(matches!(err, AppError::DecodeError(_)));
    }

    fn wav_int(samples: &[i32], bits_per_sample: u16) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                if bits_per_sample == 8 {
                    writer.write_sample(s as i8).unwrap();
                } else {
                    writer.write_sample(s).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_read_wav_normalizes_every_integer_width() {
        for bits in [8u16, 24, 32] {
            let signal = read_wav(&wav_int(&[10, -20, 5], bits)).unwrap();
            assert_eq!(signal.len(), 3, "{}-bit", bits);

            for (got, want) in signal.samples.iter().zip([0.5f32, -1.0, 0.25].iter()) {
                assert!((got - want).abs() < 1e-6, "{}-bit: {} vs {}", bits, got, want);
            }
        }
    }

    #[test]
    fn test_read_wav_accepts_float_format() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0.1f32, -0.2, 0.05] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        let signal = read_wav(&cursor.into_inner()).unwrap();
        assert_eq!(signal.sample_rate, 8_000);
        assert!((signal.samples[1] + 1.0).abs() < 1e-6);
        assert!((signal.samples[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_write_wav_bytes_quantizes_with_headroom() {
        let bytes = write_wav_bytes(&[0.0, 0.5, -1.0, 0.25], 16_000).unwrap();
        let (spec, samples) = decode_i16(&bytes);

        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[2], -32439); // round(-1 * 0.99 * 32767)
        assert_eq!(samples[1], 16220);  // round(0.5 * 0.99 * 32767)
    }

    #[test]
    fn test_write_wav_bytes_renormalizes_quiet_input() {
        let bytes = write_wav_bytes(&[0.01, -0.005], 44_100).unwrap();
        let (spec, samples) = decode_i16(&bytes);

        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(samples[0], 32439);
        assert_eq!(samples[1], -16220);
    }
}
