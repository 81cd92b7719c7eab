//! Typed media samples and the bounded queues that hold them

use crate::format::VideoResolution;
use crate::tables::{AudioSampleFormat, PixelLayout};
use crate::time::{TimeRange, Timespan};
use bytes::Bytes;
use std::collections::VecDeque;

/// Common accessors of queued samples
pub trait MediaSample {
    /// Presentation timestamp
    fn time(&self) -> Timespan;

    /// Duration
    fn duration(&self) -> Timespan;

    /// Time covered by the sample; zero-length samples cover one tick
    fn time_range(&self) -> TimeRange {
        TimeRange::starting_at(self.time(), self.duration().max(Timespan::from_ticks(1)))
    }
}

/// Video frame ready for the consumer
#[derive(Debug, Clone)]
pub struct VideoSample {
    /// Frame payload
    pub buffer: Bytes,
    /// Buffer dimensions in layout units
    pub dim: VideoResolution,
    /// Dimensions of the decoded image
    pub output_dim: VideoResolution,
    /// Pixel layout of the payload
    pub layout: PixelLayout,
    /// Row stride in bytes
    pub stride: u32,
    /// Presentation timestamp
    pub time: Timespan,
    /// Frame duration
    pub duration: Timespan,
}

/// Audio buffer ready for the consumer
#[derive(Debug, Clone)]
pub struct AudioSample {
    /// PCM payload
    pub buffer: Bytes,
    /// Channel count
    pub channels: u16,
    /// Samples per second
    pub sample_rate: u32,
    /// Sample format of the payload
    pub sample_format: AudioSampleFormat,
    /// Presentation timestamp
    pub time: Timespan,
    /// Buffer duration
    pub duration: Timespan,
}

/// Caption text
#[derive(Debug, Clone)]
pub struct CaptionSample {
    /// Caption text
    pub text: String,
    /// Presentation timestamp
    pub time: Timespan,
    /// Display duration
    pub duration: Timespan,
}

/// Opaque metadata payload
#[derive(Debug, Clone)]
pub struct MetadataSample {
    /// Payload
    pub data: Bytes,
    /// Presentation timestamp
    pub time: Timespan,
    /// Duration
    pub duration: Timespan,
}

macro_rules! impl_media_sample {
    ($($ty:ty),*) => {
        $(
            impl MediaSample for $ty {
                fn time(&self) -> Timespan {
                    self.time
                }

                fn duration(&self) -> Timespan {
                    self.duration
                }
            }
        )*
    };
}

impl_media_sample!(VideoSample, AudioSample, CaptionSample, MetadataSample);

/// Outcome of [`SampleQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The sample was appended
    Queued,
    /// The queue was full; it was flushed and the sample dropped
    Flushed {
        /// Number of samples discarded by the flush
        dropped: usize,
    },
}

/// Bounded FIFO of samples
///
/// A full queue is flushed rather than capped, preferring the newest frame
/// over a backlog.
#[derive(Debug)]
pub struct SampleQueue<T> {
    samples: VecDeque<T>,
    depth: usize,
}

impl<T: MediaSample> SampleQueue<T> {
    /// Create a queue holding at most `depth` samples (at least one)
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            samples: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Configured depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Queued sample count
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append `sample`, or flush and drop it when the queue is at depth
    pub fn enqueue(&mut self, sample: T) -> EnqueueOutcome {
        if self.samples.len() >= self.depth {
            let dropped = self.flush() + 1;
            return EnqueueOutcome::Flushed { dropped };
        }
        self.samples.push_back(sample);
        EnqueueOutcome::Queued
    }

    /// Oldest sample, if any
    pub fn peek(&self) -> Option<&T> {
        self.samples.front()
    }

    /// Remove the oldest sample
    pub fn dequeue(&mut self) -> Option<T> {
        self.samples.pop_front()
    }

    /// Remove the oldest sample if it overlaps `range`
    pub fn fetch(&mut self, range: &TimeRange) -> Option<T> {
        let head = self.samples.front()?;
        if !head.time_range().overlaps(range) {
            return None;
        }
        self.samples.pop_front()
    }

    /// Drop every queued sample, returning how many were dropped
    pub fn flush(&mut self) -> usize {
        let count = self.samples.len();
        self.samples.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caption(time: i64, duration: i64) -> CaptionSample {
        CaptionSample {
            text: format!("t={}", time),
            time: Timespan::from_ticks(time),
            duration: Timespan::from_ticks(duration),
        }
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = SampleQueue::new(4);
        for t in 0..3 {
            assert_eq!(queue.enqueue(caption(t * 10, 10)), EnqueueOutcome::Queued);
        }
        assert_eq!(queue.dequeue().unwrap().time.ticks(), 0);
        assert_eq!(queue.dequeue().unwrap().time.ticks(), 10);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_full_queue_flushes_and_drops() {
        let mut queue = SampleQueue::new(1);
        assert_eq!(queue.enqueue(caption(0, 10)), EnqueueOutcome::Queued);
        assert_eq!(
            queue.enqueue(caption(10, 10)),
            EnqueueOutcome::Flushed { dropped: 2 }
        );
        assert!(queue.is_empty());
        assert_eq!(queue.enqueue(caption(20, 10)), EnqueueOutcome::Queued);
        assert_eq!(queue.peek().unwrap().time.ticks(), 20);
    }

    #[test]
    fn test_zero_depth_is_raised_to_one() {
        let queue: SampleQueue<CaptionSample> = SampleQueue::new(0);
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn test_fetch_requires_overlap() {
        let mut queue = SampleQueue::new(2);
        queue.enqueue(caption(100, 50));

        let before = TimeRange::new(Timespan::from_ticks(0), Timespan::from_ticks(100));
        assert!(queue.fetch(&before).is_none());
        assert_eq!(queue.len(), 1);

        let during = TimeRange::new(Timespan::from_ticks(120), Timespan::from_ticks(130));
        assert_eq!(queue.fetch(&during).unwrap().time.ticks(), 100);
        assert!(queue.is_empty());
    }
}
