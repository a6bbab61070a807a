//! Frame assembler: reblocks host quanta into kernel-sized frames
//!
//! Linear buffer with compaction rather than a circular buffer. Frame/quantum
//! ratios are small integers, so shifting the remainder to the front after
//! each frame costs far less than the callback deadline.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("Input accumulator overflow: {pending} pending + {incoming} incoming exceeds {capacity}")]
    Overflow {
        pending: usize,
        incoming: usize,
        capacity: usize,
    },
}

/// Accumulates incoming samples and emits complete frames in arrival order
pub struct FrameAssembler {
    buffer: Vec<f32>,
    len: usize,
    frame_size: usize,
}

impl FrameAssembler {
    /// Create an assembler for `frame_size` frames fed by quanta of at most
    /// `max_quantum` samples.
    ///
    /// Capacity is `frame_size + max_quantum - 1`: the accumulator never holds
    /// a full frame between pushes, so one more quantum always fits.
    pub fn new(frame_size: usize, max_quantum: usize) -> Self {
        let capacity = frame_size + max_quantum.max(1) - 1;
        Self {
            buffer: vec![0.0; capacity],
            len: 0,
            frame_size,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Samples waiting for the next frame
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether a quantum of `incoming` samples fits
    pub fn can_accept(&self, incoming: usize) -> bool {
        self.len + incoming <= self.capacity()
    }

    /// Append `samples` and hand every completed frame to `on_frame`.
    ///
    /// Returns the number of frames produced. Overflowing the accumulator is a
    /// scheduling bug upstream: debug builds panic, release builds reject the
    /// quantum untouched.
    pub fn push<F>(&mut self, samples: &[f32], mut on_frame: F) -> Result<usize, AssemblerError>
    where
        F: FnMut(&[f32]),
    {
        if !self.can_accept(samples.len()) {
            debug_assert!(
                false,
                "input accumulator overflow: {} pending + {} incoming > {}",
                self.len,
                samples.len(),
                self.capacity()
            );
            return Err(AssemblerError::Overflow {
                pending: self.len,
                incoming: samples.len(),
                capacity: self.capacity(),
            });
        }

        self.buffer[self.len..self.len + samples.len()].copy_from_slice(samples);
        self.len += samples.len();

        let mut frames = 0;
        while self.len >= self.frame_size {
            on_frame(&self.buffer[..self.frame_size]);
            frames += 1;

            // Shift the remainder to the front
            self.buffer.copy_within(self.frame_size..self.len, 0);
            self.len -= self.frame_size;
        }
        Ok(frames)
    }

    /// Drop all pending samples
    pub fn reset(&mut self) {
        self.len = 0;
        self.buffer.fill(0.0);
    }
}
