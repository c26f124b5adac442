// SPDX-License-Identifier: GPL-3.0-only

//! Ordered buffer of accepted frames

use crate::backends::RawImage;
use std::fmt;

/// `accepted/expected` as shown next to the viewfinder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotCounter {
    pub accepted: usize,
    pub expected: usize,
}

impl fmt::Display for ShotCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.accepted, self.expected)
    }
}

/// Accepted frames in capture order until the batch is complete
///
/// The batch is moved out exactly once with [`take_batch`](Self::take_batch);
/// nothing is kept behind for a later hand-off.
#[derive(Debug)]
pub struct SessionAccumulator {
    frames: Vec<RawImage>,
    target: usize,
}

impl SessionAccumulator {
    pub fn new(target: usize) -> Self {
        Self {
            frames: Vec::with_capacity(target),
            target,
        }
    }

    pub fn push(&mut self, frame: RawImage) {
        self.frames.push(frame);
    }

    /// Lower the batch size after a target was skipped
    pub fn reduce_target(&mut self) {
        self.target = self.target.saturating_sub(1);
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.target
    }

    pub fn counter(&self) -> ShotCounter {
        ShotCounter {
            accepted: self.frames.len(),
            expected: self.target,
        }
    }

    /// Move the whole batch out, leaving the buffer empty
    pub fn take_batch(&mut self) -> Vec<RawImage> {
        std::mem::take(&mut self.frames)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn frame(width: u32) -> RawImage {
        RawImage::from_rgba(RgbaImage::new(width, 1))
    }

    #[test]
    fn test_take_batch_preserves_order_and_empties() {
        let mut acc = SessionAccumulator::new(3);
        for width in 1..=3 {
            acc.push(frame(width));
        }
        assert!(acc.is_full());

        let batch = acc.take_batch();
        let widths: Vec<u32> = batch.iter().map(|f| f.width).collect();
        assert_eq!(widths, vec![1, 2, 3]);
        assert!(acc.is_empty());
        assert!(acc.take_batch().is_empty());
    }

    #[test]
    fn test_reduce_target_completes_earlier() {
        let mut acc = SessionAccumulator::new(3);
        acc.push(frame(1));
        acc.push(frame(1));
        assert!(!acc.is_full());
        acc.reduce_target();
        assert!(acc.is_full());
        assert_eq!(acc.counter().to_string(), "2/2");
    }

    #[test]
    fn test_counter_display() {
        let counter = ShotCounter {
            accepted: 5,
            expected: 24,
        };
        assert_eq!(counter.to_string(), "5/24");
    }
}
