use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::debug;

use crate::frame::Frame;

/// Bounded frame queue that discards its oldest entry instead of blocking
/// the producer when full.
#[derive(Clone)]
pub struct FrameQueue {
    sender: Sender<Frame>,
    receiver: Receiver<Frame>,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    pub fn capacity(&self) -> usize {
        self.sender.capacity().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Enqueue a frame. Returns the number of frames dropped to make room.
    pub fn push(&self, frame: Frame) -> usize {
        let mut pending = frame;
        let mut dropped = 0;
        loop {
            match self.sender.try_send(pending) {
                Ok(()) => return dropped,
                Err(TrySendError::Full(back)) => {
                    pending = back;
                    // The consumer may win the race and empty the slot first.
                    if let Ok(old) = self.receiver.try_recv() {
                        dropped += 1;
                        debug!(
                            frame = old.metadata.frame_index,
                            "Frame queue full, dropped oldest frame"
                        );
                    }
                }
                // Both ends live in `self`, so the channel cannot disconnect.
                Err(TrySendError::Disconnected(_)) => return dropped,
            }
        }
    }

    /// Wait up to `timeout` for the next frame.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discard every pending frame.
    pub fn clear(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn frame(index: usize) -> Frame {
        Frame::mono(Array2::zeros((2, 2))).with_index(index)
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let queue = FrameQueue::new(2);
        assert_eq!(queue.push(frame(0)), 0);
        assert_eq!(queue.push(frame(1)), 0);
        assert_eq!(queue.push(frame(2)), 1);
        assert_eq!(queue.len(), 2);

        let timeout = Duration::from_millis(10);
        assert_eq!(queue.pop_timeout(timeout).unwrap().metadata.frame_index, 1);
        assert_eq!(queue.pop_timeout(timeout).unwrap().metadata.frame_index, 2);
        assert!(queue.pop_timeout(timeout).is_none());
    }

    #[test]
    fn test_clear() {
        let queue = FrameQueue::new(2);
        queue.push(frame(0));
        queue.push(frame(1));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
