//! Frame padding for the fixed-size inference contract.
//!
//! The denoiser only accepts signals whose length is a multiple of the frame length.
//! The tail is filled by mirroring the signal back from its last sample (the edge
//! sample itself is not repeated), so the model sees a continuation shaped like the
//! real waveform instead of a step down to silence.

/// Derived padding parameters for one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingPlan {
    pub frame_len: usize,
    pub original_len: usize,
    pub pad_amount: usize,
}

impl PaddingPlan {
    /// `pad_amount = ceil(T / F) * F - T`. A zero frame length disables padding.
    pub fn new(original_len: usize, frame_len: usize) -> Self {
        let pad_amount = if frame_len == 0 {
            0
        } else {
            original_len.div_ceil(frame_len) * frame_len - original_len
        };

        Self {
            frame_len,
            original_len,
            pad_amount,
        }
    }

    pub fn padded_len(&self) -> usize {
        self.original_len + self.pad_amount
    }

    /// Append the reflected tail.
    pub fn pad(&self, signal: &[f32]) -> Vec<f32> {
        let mut padded = Vec::with_capacity(signal.len() + self.pad_amount);
        padded.extend_from_slice(signal);
        padded.extend((signal.len()..signal.len() + self.pad_amount).map(|j| reflect(signal, j)));
        padded
    }

    /// Keep the first `original_len` samples of the inference output.
    pub fn reconstruct(&self, output: &[f32]) -> Vec<f32> {
        output[..self.original_len.min(output.len())].to_vec()
    }
}

/// Sample at virtual index `j` of the infinitely reflected signal.
///
/// Period is `2(T-1)`: `a b c d` continues as `c b a b c d c …`.
fn reflect(signal: &[f32], j: usize) -> f32 {
    match signal.len() {
        0 => 0.0,
        1 => signal[0],
        len => {
            let period = 2 * (len - 1);
            let m = j % period;
            if m < len {
                signal[m]
            } else {
                signal[period - m]
            }
        }
    }
}
