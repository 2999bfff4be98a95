//! Bounded queue between the audio hardware callback and the send loop.
//!
//! The producer side lives on the device's callback thread and must never
//! block; when the queue is full the incoming frame is dropped. Liveness
//! beats completeness for capture audio.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Capture,
    Playback,
}

/// One block of mono samples. Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    samples: Vec<f32>,
    timestamp: Instant,
    direction: Direction,
}

impl AudioFrame {
    pub fn capture(samples: Vec<f32>) -> Self {
        Self {
            samples,
            timestamp: Instant::now(),
            direction: Direction::Capture,
        }
    }

    pub fn playback(samples: Vec<f32>) -> Self {
        Self {
            samples,
            timestamp: Instant::now(),
            direction: Direction::Playback,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// Producer half, owned by the hardware callback.
#[derive(Clone)]
pub struct CaptureQueue {
    tx: tokio::sync::mpsc::Sender<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

/// Consumer half, owned by the send loop.
pub struct CaptureSource {
    rx: tokio::sync::mpsc::Receiver<AudioFrame>,
}

pub fn capture_queue(capacity: usize) -> (CaptureQueue, CaptureSource) {
    let (tx, rx) = tokio::sync::mpsc::channel(capacity);
    (
        CaptureQueue {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        CaptureSource { rx },
    )
}

impl CaptureQueue {
    /// Enqueue a frame without blocking. Returns false when the frame was
    /// dropped, either because the queue is full or the consumer is gone.
    pub fn push(&self, frame: AudioFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::trace!("capture queue rejected a frame ({}): {}", dropped, e);
                false
            }
        }
    }

    /// Frames dropped so far due to overflow or a closed consumer.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl CaptureSource {
    /// Receive the next frame, waiting at most `timeout`. `Ok(None)` means
    /// every producer handle is gone; `Err` is the periodic liveness tick.
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<AudioFrame>, tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, self.rx.recv()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overflow_drops_incoming_frame_without_blocking() {
        let (queue, mut source) = capture_queue(4);

        let start = Instant::now();
        for i in 0..32 {
            let accepted = queue.push(AudioFrame::capture(vec![i as f32]));
            assert_eq!(accepted, i < 4);
        }
        // The producer side must return promptly even under sustained overflow.
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(queue.dropped(), 28);

        // The frames that survived are the oldest ones, in order.
        for i in 0..4 {
            let frame = source
                .recv_timeout(Duration::from_millis(50))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame.samples(), &[i as f32]);
            assert_eq!(frame.direction(), Direction::Capture);
        }
    }

    #[tokio::test]
    async fn test_recv_times_out_when_empty() {
        let (_queue, mut source) = capture_queue(4);
        let result = source.recv_timeout(Duration::from_millis(10)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_recv_reports_closed_producer() {
        let (queue, mut source) = capture_queue(4);
        queue.push(AudioFrame::capture(vec![0.5]));
        drop(queue);

        let first = source.recv_timeout(Duration::from_millis(50)).await.unwrap();
        assert!(first.is_some());
        let second = source.recv_timeout(Duration::from_millis(50)).await.unwrap();
        assert!(second.is_none());
    }
}
