//! Fixed-window framing for captured samples.
//!
//! The capture device delivers buffers of whatever size the host chooses.
//! [`FrameBuffer`] re-slices that stream into windows of exactly
//! `frame_size` samples, in capture order.  A trailing partial window stays
//! buffered until the next push fills it.
//!
//! # Example
//!
//! ```rust
//! use live_voice_chat::audio::FrameBuffer;
//!
//! let mut buf = FrameBuffer::new(4);
//! let frames = buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);
//! assert_eq!(frames, vec![vec![1.0, 2.0, 3.0, 4.0]]);
//! assert_eq!(buf.len(), 1); // 5.0 waits for the next window
//! ```

// ---------------------------------------------------------------------------
// FrameBuffer
// ---------------------------------------------------------------------------

/// Accumulates samples and emits complete fixed-size windows.
///
/// Generic over `T: Copy` so it can frame any scalar, though the capture
/// pipeline uses `FrameBuffer<f32>` exclusively.
pub struct FrameBuffer<T> {
    pending: Vec<T>,
    frame_size: usize,
    /// Number of complete windows emitted since creation or the last clear.
    emitted: u64,
}

impl<T: Copy> FrameBuffer<T> {
    /// Create a framer producing windows of `frame_size` samples.
    ///
    /// # Panics
    ///
    /// Panics if `frame_size == 0`.
    pub fn new(frame_size: usize) -> Self {
        assert!(frame_size > 0, "FrameBuffer frame size must be > 0");
        Self {
            pending: Vec::with_capacity(frame_size),
            frame_size,
            emitted: 0,
        }
    }

    /// Append `data` and return every window it completes, oldest first.
    pub fn push_slice(&mut self, data: &[T]) -> Vec<Vec<T>> {
        let mut frames = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let room = self.frame_size - self.pending.len();
            let take = room.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_size {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                frames.push(full);
                self.emitted += 1;
            }
        }

        frames
    }

    /// Discard the partial window.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.emitted = 0;
    }

    /// Samples waiting for the current window to fill.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Complete windows emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_push_emits_nothing() {
        let mut buf = FrameBuffer::new(8);
        assert!(buf.push_slice(&[1.0_f32, 2.0, 3.0]).is_empty());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn exact_window_is_emitted() {
        let mut buf = FrameBuffer::new(4);
        let frames = buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0]);
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0, 4.0]]);
        assert!(buf.is_empty());
        assert_eq!(buf.emitted(), 1);
    }

    #[test]
    fn windows_span_multiple_pushes_in_order() {
        let mut buf = FrameBuffer::new(3);
        assert!(buf.push_slice(&[1.0_f32, 2.0]).is_empty());
        let frames = buf.push_slice(&[3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn large_push_yields_many_windows() {
        let mut buf = FrameBuffer::new(4096);
        let data: Vec<f32> = (0..4096 * 3 + 10).map(|i| i as f32).collect();
        let frames = buf.push_slice(&data);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == 4096));
        assert_eq!(frames[2][0], (4096 * 2) as f32);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn clear_drops_partial_window() {
        let mut buf = FrameBuffer::new(4);
        buf.push_slice(&[1.0_f32, 2.0]);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.push_slice(&[9.0, 9.0, 9.0, 9.0]).len(), 1);
    }

    #[test]
    #[should_panic(expected = "FrameBuffer frame size must be > 0")]
    fn zero_frame_size_panics() {
        let _buf: FrameBuffer<f32> = FrameBuffer::new(0);
    }
}
