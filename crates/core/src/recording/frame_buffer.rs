use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::shared::frame::Frame;

/// Result of a timed removal from the buffer.
#[derive(Debug)]
pub enum Popped {
    Frame(Frame),
    /// Nothing arrived within the timeout; more frames may still come.
    Empty,
    /// The buffer was closed and every queued frame has been taken.
    Closed,
}

/// Number of frames that cover `seconds` of video at `fps`, at least one.
pub fn capacity_for(fps: f64, seconds: f64) -> usize {
    // `as` saturates NaN and negatives to 0.
    ((fps * seconds).round() as usize).max(1)
}

/// Bounded FIFO of frames with a drop-oldest overload policy.
///
/// Backed by a bounded crossbeam channel. The buffer keeps its own
/// receiver so that a push into a full channel can evict the oldest frame
/// instead of waiting; `push` therefore never blocks. Closing drops the
/// only sender, which wakes any reader blocked in [`FrameBufferReader::pop`].
pub struct FrameBuffer {
    tx: Option<Sender<Frame>>,
    rx: Receiver<Frame>,
    capacity: usize,
    dropped: usize,
}

/// Consumer side of a [`FrameBuffer`], handed to the writer thread.
#[derive(Clone)]
pub struct FrameBufferReader {
    rx: Receiver<Frame>,
}

impl FrameBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            tx: Some(tx),
            rx,
            capacity,
            dropped: 0,
        }
    }

    pub fn reader(&self) -> FrameBufferReader {
        FrameBufferReader {
            rx: self.rx.clone(),
        }
    }

    /// Appends `frame`, evicting the oldest queued frame when full.
    /// Frames pushed after `close` are discarded.
    pub fn push(&mut self, frame: Frame) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };

        let mut pending = frame;
        loop {
            match tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    // A concurrent reader may have freed a slot already, in
                    // which case there is nothing to evict.
                    if self.rx.try_recv().is_ok() {
                        self.dropped += 1;
                    }
                    pending = rejected;
                }
                // Unreachable while `self.rx` is alive.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn pop(&self, timeout: Duration) -> Popped {
        pop_from(&self.rx, timeout)
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames evicted by the overload policy so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Signals that no more frames will be pushed. Queued frames stay
    /// available to readers until drained.
    pub fn close(&mut self) {
        self.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

impl FrameBufferReader {
    pub fn pop(&self, timeout: Duration) -> Popped {
        pop_from(&self.rx, timeout)
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

fn pop_from(rx: &Receiver<Frame>, timeout: Duration) -> Popped {
    match rx.recv_timeout(timeout) {
        Ok(frame) => Popped::Frame(frame),
        Err(RecvTimeoutError::Timeout) => Popped::Empty,
        Err(RecvTimeoutError::Disconnected) => Popped::Closed,
    }
}
