//! Lock-free recorder taps
//!
//! Two ring buffers fed from the audio callback: one with the unprocessed
//! input quantum, one with the final output quantum. A recorder reads them
//! from any other thread. Each tap has a process-unique id so the recorder can
//! verify it was handed two distinct buffers.

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TAP_ID: AtomicU64 = AtomicU64::new(1);

/// Which side of the pipeline a tap observes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapPoint {
    PrePipeline,
    PostPipeline,
}

/// Thread-safe audio ring buffer
pub struct AudioRingBuffer {
    producer: HeapProducer<f32>,
    consumer: HeapConsumer<f32>,
    capacity: usize,
    point: TapPoint,
}

impl AudioRingBuffer {
    /// Create new ring buffer with given capacity
    ///
    /// # Arguments
    /// * `capacity` - Buffer capacity in samples
    /// * `point` - Pipeline position this buffer taps
    pub fn new(capacity: usize, point: TapPoint) -> Self {
        let rb = HeapRb::<f32>::new(capacity.max(1));
        let (producer, consumer) = rb.split();

        Self {
            producer,
            consumer,
            capacity: capacity.max(1),
            point,
        }
    }

    /// Split into writer and reader ends sharing one id and drop counter
    pub fn split(self) -> (TapWriter, TapReader) {
        let id = NEXT_TAP_ID.fetch_add(1, Ordering::Relaxed);
        let dropped_count = Arc::new(AtomicU64::new(0));

        (
            TapWriter {
                producer: self.producer,
                dropped_count: Arc::clone(&dropped_count),
                id,
            },
            TapReader {
                consumer: self.consumer,
                capacity: self.capacity,
                dropped_count,
                id,
                point: self.point,
            },
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Writer end (audio callback)
pub struct TapWriter {
    producer: HeapProducer<f32>,
    dropped_count: Arc<AtomicU64>,
    id: u64,
}

impl TapWriter {
    /// Write samples, dropping whatever does not fit.
    ///
    /// # Returns
    /// Number of samples actually written
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let written = self.producer.push_slice(samples);
        let dropped = samples.len() - written;
        if dropped > 0 {
            self.dropped_count.fetch_add(dropped as u64, Ordering::Relaxed);
        }
        written
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn free_len(&self) -> usize {
        self.producer.free_len()
    }
}

/// Reader end (recorder)
pub struct TapReader {
    consumer: HeapConsumer<f32>,
    capacity: usize,
    dropped_count: Arc<AtomicU64>,
    id: u64,
    point: TapPoint,
}

impl TapReader {
    /// Read samples into `buffer`
    ///
    /// # Returns
    /// Number of samples actually read (may be less than `buffer.len()`)
    pub fn read(&mut self, buffer: &mut [f32]) -> usize {
        self.consumer.pop_slice(buffer)
    }

    /// Drain everything currently buffered into `out`
    pub fn read_all(&mut self, out: &mut Vec<f32>) -> usize {
        let before = out.len();
        out.extend(self.consumer.pop_iter());
        out.len() - before
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn point(&self) -> TapPoint {
        self.point
    }

    /// Samples dropped because the recorder fell behind
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped_count)
    }
}

/// Writer pair held by the audio callback
pub struct TapWriters {
    pub pre: TapWriter,
    pub post: TapWriter,
}

/// Reader pair handed to the recorder collaborator
pub struct RecorderTaps {
    pub pre: TapReader,
    pub post: TapReader,
}

impl RecorderTaps {
    /// Allocate both taps with `capacity` samples each
    pub fn create(capacity: usize) -> (TapWriters, RecorderTaps) {
        let (pre_writer, pre_reader) = AudioRingBuffer::new(capacity, TapPoint::PrePipeline).split();
        let (post_writer, post_reader) =
            AudioRingBuffer::new(capacity, TapPoint::PostPipeline).split();
        (
            TapWriters {
                pre: pre_writer,
                post: post_writer,
            },
            RecorderTaps {
                pre: pre_reader,
                post: post_reader,
            },
        )
    }

    /// Whether the two taps are backed by distinct buffers
    pub fn are_distinct(&self) -> bool {
        self.pre.id() != self.post.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_write_read() {
        let (mut writer, mut reader) = AudioRingBuffer::new(1024, TapPoint::PrePipeline).split();
        assert_eq!(writer.id(), reader.id());

        let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(writer.write(&data), 5);

        let mut output = vec![0.0f32; 5];
        assert_eq!(reader.read(&mut output), 5);
        assert_eq!(output, data);
    }

    #[test]
    fn test_tap_overflow_counts_dropped() {
        let (mut writer, reader) = AudioRingBuffer::new(10, TapPoint::PostPipeline).split();
        let written = writer.write(&[1.0; 20]);
        assert!(written <= 10);
        assert_eq!(reader.dropped_count(), (20 - written) as u64);
    }

    #[test]
    fn test_read_all_drains_everything() {
        let (mut writer, mut reader) = AudioRingBuffer::new(64, TapPoint::PrePipeline).split();
        writer.write(&[0.25; 40]);
        let mut out = Vec::new();
        assert_eq!(reader.read_all(&mut out), 40);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_recorder_taps_are_distinct() {
        let (writers, taps) = RecorderTaps::create(256);
        assert!(taps.are_distinct());
        assert_ne!(writers.pre.id(), writers.post.id());
        assert_eq!(taps.pre.point(), TapPoint::PrePipeline);
        assert_eq!(taps.post.point(), TapPoint::PostPipeline);
    }
}
