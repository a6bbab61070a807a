//! Output drain buffer with startup priming
//!
//! Holds processed frames until the host asks for the next quantum. After
//! (re)enable nothing is released until the buffer has reached the priming
//! threshold once; until then every request is answered with silence. This
//! trades a fixed startup delay for freedom from underruns afterwards.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainError {
    #[error("Output accumulator overflow: {pending} pending + {incoming} incoming exceeds {capacity}")]
    Overflow {
        pending: usize,
        incoming: usize,
        capacity: usize,
    },
}

/// Result of a single drain request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// Still priming; silence was written
    Priming,
    /// `n` samples were released
    Drained,
    /// Primed but fewer than `n` samples were available; silence was written
    Underrun { available: usize },
}

pub struct OutputDrainBuffer {
    buffer: Vec<f32>,
    len: usize,
    prime_threshold: usize,
    primed: bool,
}

impl OutputDrainBuffer {
    /// # Arguments
    /// * `frame_size` - Kernel frame size in samples
    /// * `priming_frames` - Frames to accumulate before releasing output
    /// * `max_quantum` - Largest quantum the host will request
    pub fn new(frame_size: usize, priming_frames: usize, max_quantum: usize) -> Self {
        let prime_threshold = frame_size * priming_frames.max(1);
        // Peak fill is bounded by the threshold plus one quantum
        let capacity = prime_threshold + max_quantum.max(frame_size);
        Self {
            buffer: vec![0.0; capacity],
            len: 0,
            prime_threshold,
            primed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn prime_threshold(&self) -> usize {
        self.prime_threshold
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Append `samples * gain`
    pub fn append_scaled(&mut self, samples: &[f32], gain: f32) -> Result<(), DrainError> {
        if self.len + samples.len() > self.capacity() {
            return Err(DrainError::Overflow {
                pending: self.len,
                incoming: samples.len(),
                capacity: self.capacity(),
            });
        }
        let dst = &mut self.buffer[self.len..self.len + samples.len()];
        if gain == 1.0 {
            dst.copy_from_slice(samples);
        } else {
            for (out, &sample) in dst.iter_mut().zip(samples) {
                *out = sample * gain;
            }
        }
        self.len += samples.len();
        Ok(())
    }

    pub fn append(&mut self, samples: &[f32]) -> Result<(), DrainError> {
        self.append_scaled(samples, 1.0)
    }

    /// Fill `out` with the oldest `out.len()` samples, or silence while
    /// priming / on underrun.
    pub fn drain(&mut self, out: &mut [f32]) -> DrainStatus {
        let n = out.len();

        if !self.primed {
            if self.len >= self.prime_threshold {
                self.primed = true;
            } else {
                out.fill(0.0);
                return DrainStatus::Priming;
            }
        }

        if self.len < n {
            out.fill(0.0);
            return DrainStatus::Underrun {
                available: self.len,
            };
        }

        out.copy_from_slice(&self.buffer[..n]);
        self.buffer.copy_within(n..self.len, 0);
        self.len -= n;
        DrainStatus::Drained
    }

    /// Empty the buffer and re-arm priming
    pub fn reset(&mut self) {
        self.len = 0;
        self.primed = false;
        self.buffer.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_until_primed() {
        let mut drain = OutputDrainBuffer::new(480, 2, 128);
        let mut out = [1.0f32; 128];

        drain.append(&[0.5; 480]).unwrap();
        assert_eq!(drain.drain(&mut out), DrainStatus::Priming);
        assert!(out.iter().all(|&s| s == 0.0));
        // Nothing consumed while priming
        assert_eq!(drain.len(), 480);

        drain.append(&[0.5; 480]).unwrap();
        assert_eq!(drain.drain(&mut out), DrainStatus::Drained);
        assert!(drain.is_primed());
        assert!(out.iter().all(|&s| s == 0.5));
        assert_eq!(drain.len(), 960 - 128);
    }

    #[test]
    fn test_fifo_order_and_gain() {
        let mut drain = OutputDrainBuffer::new(4, 1, 4);
        drain.append_scaled(&[1.0, 2.0, 3.0, 4.0], 2.0).unwrap();
        let mut out = [0.0f32; 2];
        assert_eq!(drain.drain(&mut out), DrainStatus::Drained);
        assert_eq!(out, [2.0, 4.0]);
        assert_eq!(drain.drain(&mut out), DrainStatus::Drained);
        assert_eq!(out, [6.0, 8.0]);
    }

    #[test]
    fn test_underrun_after_priming_writes_silence() {
        let mut drain = OutputDrainBuffer::new(4, 1, 8);
        drain.append(&[1.0; 4]).unwrap();
        let mut out = [9.0f32; 8];
        assert_eq!(drain.drain(&mut out), DrainStatus::Underrun { available: 4 });
        assert!(out.iter().all(|&s| s == 0.0));
        // Still primed, samples kept for the next request
        assert!(drain.is_primed());
        assert_eq!(drain.len(), 4);
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut drain = OutputDrainBuffer::new(4, 1, 4);
        drain.append(&[0.0; 8]).unwrap();
        assert!(matches!(
            drain.append(&[0.0; 4]),
            Err(DrainError::Overflow { pending: 8, .. })
        ));
    }

    #[test]
    fn test_reset_rearms_priming() {
        let mut drain = OutputDrainBuffer::new(4, 1, 4);
        drain.append(&[1.0; 4]).unwrap();
        let mut out = [0.0f32; 4];
        drain.drain(&mut out);
        assert!(drain.is_primed());

        drain.reset();
        assert!(!drain.is_primed());
        assert!(drain.is_empty());
    }
}
