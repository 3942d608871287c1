//! Channel selection and sample-rate conversion.
//!
//! Capture devices rarely run at exactly 16 kHz mono, and playback devices
//! may refuse 24 kHz.  This module provides the two conversion steps used on
//! both sides of the stream:
//!
//! 1. [`take_channel`]: pick one channel out of interleaved audio.
//! 2. [`resample`]: linear-interpolation rate conversion of a whole buffer.
//! 3. [`StreamResampler`]: the same conversion applied to a stream that
//!    arrives in arbitrary chunks, such as device callbacks.

// ---------------------------------------------------------------------------
// take_channel
// ---------------------------------------------------------------------------

/// Extract channel `index` from interleaved audio.
///
/// * `channels == 1` returns the input unchanged.
/// * `channels == 0` or `index >= channels` returns an empty vector.
///
/// ```rust
/// use live_voice_chat::audio::take_channel;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// assert_eq!(take_channel(&stereo, 2, 0), vec![0.5, 0.2]);
/// ```
pub fn take_channel(samples: &[f32], channels: u16, index: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 if index == 0 => samples.to_vec(),
        n if index < n as usize => samples
            .chunks_exact(n as usize)
            .map(|frame| frame[index])
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `source_rate` to `target_rate` Hz using
/// linear interpolation.
///
/// * Equal rates return a copy.
/// * Empty input or a zero rate returns an empty vector.
///
/// The output length is `ceil(samples.len() * target_rate / source_rate)`.
///
/// ```rust
/// use live_voice_chat::audio::resample;
///
/// let hi = vec![0.5_f32; 480];
/// assert_eq!(resample(&hi, 48_000, 16_000).len(), 160);
/// ```
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Linear-interpolation resampler for audio delivered in pieces.
///
/// The fractional read position and the last input sample carry over from
/// one [`process`](Self::process) call to the next, so feeding a signal in
/// chunks yields the same output as feeding it in one piece.  An output
/// sample is only produced once both of its neighbours have arrived.
///
/// ```rust
/// use live_voice_chat::audio::StreamResampler;
///
/// let mut rs = StreamResampler::new(48_000, 16_000);
/// let a = rs.process(&[0.0, 1.0, 2.0, 3.0, 4.0]);
/// let b = rs.process(&[5.0, 6.0, 7.0]);
/// assert_eq!(a, vec![0.0, 3.0]);
/// assert_eq!(b, vec![6.0]);
/// ```
#[derive(Debug, Clone)]
pub struct StreamResampler {
    source_rate: u32,
    target_rate: u32,
    /// Source samples advanced per output sample.
    step: f64,
    /// Read position of the next output, relative to `prev` when it is set.
    pos: f64,
    prev: Option<f32>,
}

impl StreamResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        let step = if target_rate == 0 {
            0.0
        } else {
            source_rate as f64 / target_rate as f64
        };
        Self {
            source_rate,
            target_rate,
            step,
            pos: 0.0,
            prev: None,
        }
    }

    /// Convert the next chunk of mono samples.
    ///
    /// Equal rates pass the chunk through; a zero rate yields nothing.
    pub fn process(&mut self, chunk: &[f32]) -> Vec<f32> {
        if self.source_rate == self.target_rate {
            return chunk.to_vec();
        }
        if chunk.is_empty() || self.source_rate == 0 || self.target_rate == 0 {
            return Vec::new();
        }

        let head = usize::from(self.prev.is_some());
        let len = chunk.len() + head;
        let at = |i: usize| match self.prev {
            Some(prev) if i == 0 => prev,
            _ => chunk[i - head],
        };

        let mut output = Vec::with_capacity((chunk.len() as f64 / self.step).ceil() as usize + 1);
        let mut pos = self.pos;
        while (pos as usize) + 1 < len {
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            output.push(at(idx) * (1.0 - frac) + at(idx + 1) * frac);
            pos += self.step;
        }

        // The last sample becomes index 0 of the next call.
        self.pos = pos - (len - 1) as f64;
        self.prev = chunk.last().copied();
        output
    }

    /// Forget carried state, e.g. before reusing the resampler on a new stream.
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.prev = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_channel_mono_passthrough() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(take_channel(&input, 1, 0), input);
    }

    #[test]
    fn take_channel_picks_right() {
        let input = vec![1.0_f32, -1.0, 0.5, 0.25];
        assert_eq!(take_channel(&input, 2, 1), vec![-1.0, 0.25]);
    }

    #[test]
    fn take_channel_out_of_range() {
        assert!(take_channel(&[1.0_f32, 2.0], 2, 2).is_empty());
        assert!(take_channel(&[1.0_f32, 2.0], 0, 0).is_empty());
    }

    #[test]
    fn resample_same_rate_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(resample(&input, 16_000, 16_000), input);
    }

    #[test]
    fn resample_empty_input() {
        assert!(resample(&[], 48_000, 16_000).is_empty());
    }

    #[test]
    fn resample_44100_to_16k_output_length() {
        let out = resample(&vec![0.0_f32; 44_100], 44_100, 16_000);
        assert!(out.len().abs_diff(16_000) <= 1, "got {}", out.len());
    }

    #[test]
    fn resample_24k_to_48k_doubles_length() {
        let out = resample(&vec![0.0_f32; 240], 24_000, 48_000);
        assert_eq!(out.len(), 480);
    }

    #[test]
    fn resample_constant_signal_preserves_amplitude() {
        let out = resample(&vec![0.5_f32; 480], 48_000, 16_000);
        for &s in &out {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn chunked_stream_matches_whole_buffer() {
        // 93 callbacks of 512 frames at 48 kHz.
        let input = ramp(93 * 512);

        let whole = StreamResampler::new(48_000, 16_000).process(&input);
        let mut rs = StreamResampler::new(48_000, 16_000);
        let chunked: Vec<f32> = input.chunks(512).flat_map(|c| rs.process(c)).collect();

        assert_eq!(chunked, whole);
        assert_eq!(chunked.len(), resample(&input, 48_000, 16_000).len());
    }

    #[test]
    fn chunk_boundaries_keep_a_constant_step() {
        let input = ramp(4 * 500);
        let mut rs = StreamResampler::new(48_000, 16_000);
        let out: Vec<f32> = input.chunks(500).flat_map(|c| rs.process(c)).collect();

        for pair in out.windows(2) {
            assert_eq!(pair[1] - pair[0], 3.0, "step broken at {pair:?}");
        }
    }

    #[test]
    fn uneven_ratio_chunks_track_whole_buffer() {
        let input: Vec<f32> = (0..44_100).map(|i| (i as f32 * 0.01).sin()).collect();

        let whole = StreamResampler::new(44_100, 16_000).process(&input);
        let mut rs = StreamResampler::new(44_100, 16_000);
        let chunked: Vec<f32> = input.chunks(441).flat_map(|c| rs.process(c)).collect();

        assert!(chunked.len().abs_diff(whole.len()) <= 1);
        for (a, b) in chunked.iter().zip(&whole) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn stream_same_rate_passes_through() {
        let mut rs = StreamResampler::new(16_000, 16_000);
        assert_eq!(rs.process(&[0.1, 0.2]), vec![0.1, 0.2]);
    }

    #[test]
    fn stream_reset_starts_over() {
        let mut rs = StreamResampler::new(48_000, 16_000);
        rs.process(&[1.0, 1.0]);
        rs.reset();
        assert_eq!(rs.process(&[5.0, 6.0]), vec![5.0]);
    }
}
