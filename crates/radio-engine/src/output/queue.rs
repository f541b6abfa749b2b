//! Bounded sample queue between the decode, resample and output stages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Thread-safe bounded queue of interleaved `f32` samples.
///
/// Producers block when the queue is full; `close()` wakes everybody and makes
/// blocked pushes return. The `done` flag lives under the same mutex as the
/// samples so "closed and drained" can be observed atomically.
pub struct SharedAudio {
    channels: usize,
    inner: Mutex<Inner>,
    cv: Condvar,
    max_buffered_samples: usize,
    low_watermark_ms: AtomicU64,
}

struct Inner {
    queue: VecDeque<f32>,
    done: bool,
}

pub enum PopStrategy {
    /// Block until exactly `frames` are available; `None` if closed first.
    BlockingExact { frames: usize },
    /// Block until something is available, then take up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Take up to `max_frames` without waiting; `None` if empty.
    NonBlocking { max_frames: usize },
}

/// Queue capacity in samples for `buffer_seconds` of audio. Non-positive or
/// non-finite durations fall back to two seconds.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

impl SharedAudio {
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
            low_watermark_ms: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Mark the queue finished. Idempotent.
    pub fn close(&self) {
        self.lock().done = true;
        self.cv.notify_all();
    }

    /// Push samples, blocking while the queue is full. Remaining samples are
    /// dropped once the queue is closed.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.lock();
            while g.queue.len() >= self.max_buffered_samples && !g.done {
                g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
            }
            if g.done {
                return;
            }
            let room = self.max_buffered_samples - g.queue.len();
            let end = samples.len().min(offset + room);
            g.queue.extend(&samples[offset..end]);
            offset = end;
            drop(g);
            self.cv.notify_all();
        }
    }

    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let take_samples = match strategy {
            PopStrategy::BlockingExact { frames } => {
                let want = frames * self.channels;
                while g.queue.len() < want && !g.done {
                    g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
                }
                if g.queue.len() < want {
                    return None;
                }
                want
            }
            PopStrategy::BlockingUpTo { max_frames } => {
                while g.queue.is_empty() && !g.done {
                    g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
                }
                let frames = (g.queue.len() / self.channels).min(max_frames);
                if frames == 0 {
                    return None;
                }
                frames * self.channels
            }
            PopStrategy::NonBlocking { max_frames } => {
                let frames = (g.queue.len() / self.channels).min(max_frames);
                if frames == 0 {
                    return None;
                }
                frames * self.channels
            }
        };
        let out: Vec<f32> = g.queue.drain(..take_samples).collect();
        let remaining = g.queue.len();
        drop(g);
        self.cv.notify_all();
        self.log_low_watermark(remaining);
        Some(out)
    }

    fn log_low_watermark(&self, queued: usize) {
        let threshold = (self.max_buffered_samples / 8).max(self.channels * 16);
        if queued == 0 || queued >= threshold {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;
        let last = self.low_watermark_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) > 1000 {
            self.low_watermark_ms.store(now, Ordering::Relaxed);
            tracing::debug!(
                queued_samples = queued,
                threshold_samples = threshold,
                "audio queue low watermark"
            );
        }
    }
}

/// Block until `q` is closed and drained (`true`) or `cancel` is set (`false`).
pub fn wait_until_done_and_empty_or_cancel(q: &SharedAudio, cancel: &AtomicBool) -> bool {
    let mut g = q.lock();
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        if g.done && g.queue.is_empty() {
            return true;
        }
        let (next, _timeout) = q
            .cv
            .wait_timeout(g, Duration::from_millis(50))
            .unwrap_or_else(PoisonError::into_inner);
        g = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn calc_max_buffered_samples_fallbacks() {
        assert_eq!(calc_max_buffered_samples(48_000, 2, 2.0), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, -1.0), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, f32::NAN), 192_000);
        assert_eq!(calc_max_buffered_samples(44_100, 1, 0.5), 22_050);
    }

    #[test]
    fn nonblocking_pop_returns_whole_frames_only() {
        let q = SharedAudio::new(2, 64);
        assert!(q.pop(PopStrategy::NonBlocking { max_frames: 4 }).is_none());
        q.push_interleaved_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let out = q.pop(PopStrategy::NonBlocking { max_frames: 8 }).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(q.pop(PopStrategy::NonBlocking { max_frames: 8 }).is_none());
    }

    #[test]
    fn blocking_exact_waits_for_producer() {
        let q = Arc::new(SharedAudio::new(2, 64));
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.pop(PopStrategy::BlockingExact { frames: 3 }))
        };
        q.push_interleaved_blocking(&[0.1, 0.2, 0.3, 0.4]);
        q.push_interleaved_blocking(&[0.5, 0.6]);
        assert_eq!(consumer.join().unwrap().map(|v| v.len()), Some(6));
    }

    #[test]
    fn blocking_up_to_drains_tail_then_reports_close() {
        let q = SharedAudio::new(2, 64);
        q.push_interleaved_blocking(&[1.0, 2.0, 3.0, 4.0]);
        q.close();
        assert!(q.pop(PopStrategy::BlockingExact { frames: 4 }).is_none());
        let tail = q.pop(PopStrategy::BlockingUpTo { max_frames: 8 }).unwrap();
        assert_eq!(tail.len(), 4);
        assert!(q.pop(PopStrategy::BlockingUpTo { max_frames: 8 }).is_none());
    }

    #[test]
    fn close_releases_blocked_producer() {
        let q = Arc::new(SharedAudio::new(1, 4));
        let producer = {
            let q = q.clone();
            thread::spawn(move || q.push_interleaved_blocking(&[0.0; 16]))
        };
        thread::sleep(Duration::from_millis(20));
        q.close();
        producer.join().unwrap();
        assert!(q.is_done());
    }

    #[test]
    fn wait_respects_cancel_and_close() {
        let q = SharedAudio::new(2, 64);
        let cancel = AtomicBool::new(true);
        assert!(!wait_until_done_and_empty_or_cancel(&q, &cancel));
        cancel.store(false, Ordering::Relaxed);
        q.close();
        assert!(wait_until_done_and_empty_or_cancel(&q, &cancel));
    }
}
