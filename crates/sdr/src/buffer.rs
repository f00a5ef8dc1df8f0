// Copyright 2025-2026 CEMAXECUTER LLC

use num_complex::Complex32;

/// Reusable landing area for vendor I/Q reads.
///
/// Sized to exactly the item count of the last request. A different count
/// replaces the allocation; the same count reuses it.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    data: Vec<Complex32>,
    reallocations: u64,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the buffer hold exactly `len` samples. Returns true if it had
    /// to reallocate.
    pub fn ensure_len(&mut self, len: usize) -> bool {
        if self.data.len() == len {
            return false;
        }
        // Fresh allocation: no headroom is kept from a larger request.
        self.data = vec![Complex32::default(); len];
        self.reallocations += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[Complex32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Complex32] {
        &mut self.data
    }

    /// Number of times the backing allocation was replaced.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_only_on_change() {
        let mut buf = SampleBuffer::new();
        assert!(!buf.ensure_len(0));
        assert!(buf.ensure_len(1024));
        assert!(!buf.ensure_len(1024));
        assert!(buf.ensure_len(65536));
        assert!(buf.ensure_len(1));
        assert!(!buf.ensure_len(1));
        assert_eq!(buf.reallocations(), 3);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_shrink_drops_capacity() {
        let mut buf = SampleBuffer::new();
        buf.ensure_len(65536);
        buf.ensure_len(16);
        assert_eq!(buf.len(), 16);
        assert!(buf.data.capacity() < 65536);
    }
}
