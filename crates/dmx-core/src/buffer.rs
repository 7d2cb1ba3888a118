//! Planar stereo audio buffer

/// Stereo audio (deinterleaved, one Vec per channel)
///
/// Both channels always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl StereoBuffer {
    /// Silent buffer of `len` frames
    pub fn silence(len: usize) -> Self {
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
        }
    }

    /// Build from two channels; the longer one is truncated
    pub fn from_channels(mut left: Vec<f32>, mut right: Vec<f32>) -> Self {
        let len = left.len().min(right.len());
        left.truncate(len);
        right.truncate(len);
        Self { left, right }
    }

    /// Build from interleaved samples. Mono input is duplicated to both
    /// channels, channels beyond the second are ignored.
    pub fn from_interleaved(samples: &[f32], channels: usize) -> Self {
        let channels = channels.max(1);
        let frames = samples.len() / channels;
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);

        for frame in samples.chunks_exact(channels) {
            left.push(frame[0]);
            right.push(if channels > 1 { frame[1] } else { frame[0] });
        }

        Self { left, right }
    }

    /// Interleaved L/R samples
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len() * 2);
        for (&l, &r) in self.left.iter().zip(&self.right) {
            out.push(l);
            out.push(r);
        }
        out
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    /// Channel by index (0 = left, 1 = right)
    pub fn channel(&self, index: usize) -> &[f32] {
        if index == 0 { &self.left } else { &self.right }
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        if index == 0 {
            &mut self.left
        } else {
            &mut self.right
        }
    }

    /// Mutable access to both channels at once
    pub fn channels_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.left, &mut self.right)
    }

    /// Consume into (left, right)
    pub fn into_channels(self) -> (Vec<f32>, Vec<f32>) {
        (self.left, self.right)
    }

    /// Copy of `len` frames starting at `start`. Returns `None` when the
    /// range does not fit.
    pub fn slice(&self, start: usize, len: usize) -> Option<StereoBuffer> {
        let end = start.checked_add(len)?;
        if end > self.len() {
            return None;
        }
        Some(Self {
            left: self.left[start..end].to_vec(),
            right: self.right[start..end].to_vec(),
        })
    }

    /// Append another buffer at the end
    pub fn append(&mut self, other: &StereoBuffer) {
        self.left.extend_from_slice(&other.left);
        self.right.extend_from_slice(&other.right);
    }

    /// Sample-wise add `other` into `self` over the common length
    pub fn add_assign(&mut self, other: &StereoBuffer) {
        for (a, b) in self.left.iter_mut().zip(&other.left) {
            *a += b;
        }
        for (a, b) in self.right.iter_mut().zip(&other.right) {
            *a += b;
        }
    }

    /// Sum of several buffers over the length of the shortest
    pub fn sum<'a, I>(buffers: I) -> StereoBuffer
    where
        I: IntoIterator<Item = &'a StereoBuffer>,
    {
        let mut iter = buffers.into_iter();
        let Some(first) = iter.next() else {
            return StereoBuffer::default();
        };
        let mut out = first.clone();
        for buffer in iter {
            let len = out.len().min(buffer.len());
            out.truncate(len);
            out.add_assign(buffer);
        }
        out
    }

    /// Shorten to `len` frames
    pub fn truncate(&mut self, len: usize) {
        self.left.truncate(len);
        self.right.truncate(len);
    }

    /// Multiply both channels by `gain`
    pub fn apply_gain(&mut self, gain: f32) {
        for s in self.left.iter_mut().chain(self.right.iter_mut()) {
            *s *= gain;
        }
    }

    /// Exchange left and right channels
    pub fn swap_channels(&mut self) {
        std::mem::swap(&mut self.left, &mut self.right);
    }

    /// Peak absolute sample value
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(&self.right)
            .map(|s| s.abs())
            .fold(0.0f32, f32::max)
    }

    /// RMS over both channels
    pub fn rms(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.left.iter().chain(&self.right).map(|s| s * s).sum();
        (sum_sq / (2 * self.len()) as f32).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_interleave_roundtrip() {
        let interleaved = vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        let buffer = StereoBuffer::from_interleaved(&interleaved, 2);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.left(), &[0.1, 0.2, 0.3]);
        assert_eq!(buffer.to_interleaved(), interleaved);
    }

    #[test]
    fn test_mono_duplicated() {
        let buffer = StereoBuffer::from_interleaved(&[0.5, 0.25], 1);
        assert_eq!(buffer.left(), buffer.right());
    }

    #[test]
    fn test_slice_bounds() {
        let buffer = StereoBuffer::silence(10);
        assert_eq!(buffer.slice(5, 5).map(|b| b.len()), Some(5));
        assert!(buffer.slice(6, 5).is_none());
        assert!(buffer.slice(usize::MAX, 2).is_none());
    }

    #[test]
    fn test_sum_truncates_to_shortest() {
        let a = StereoBuffer::from_channels(vec![1.0; 4], vec![2.0; 4]);
        let b = StereoBuffer::from_channels(vec![0.5; 3], vec![0.5; 3]);
        let sum = StereoBuffer::sum([&a, &b]);
        assert_eq!(sum.len(), 3);
        assert_relative_eq!(sum.left()[0], 1.5);
        assert_relative_eq!(sum.right()[2], 2.5);
    }

    #[test]
    fn test_peak_and_rms() {
        let buffer = StereoBuffer::from_channels(vec![0.5, -1.0], vec![0.0, 0.0]);
        assert_relative_eq!(buffer.peak(), 1.0);
        assert_relative_eq!(buffer.rms(), (1.25f32 / 4.0).sqrt());
    }
}
