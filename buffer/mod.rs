// Socket buffer module: fixed-capacity byte FIFO modelling a channel's on-chip RX/TX memory
use crossbeam::queue::ArrayQueue;
use std::sync::Arc;

pub struct SocketBuffer {
    // None for a zero-sized buffer, which takes no bytes at all
    queue: Option<Arc<ArrayQueue<u8>>>,
}

impl SocketBuffer {
    pub fn new(capacity: usize) -> Self {
        SocketBuffer {
            queue: (capacity > 0).then(|| Arc::new(ArrayQueue::new(capacity))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.queue.as_ref().map_or(0, |q| q.capacity())
    }

    /// Bytes waiting to be read (the chip's RX_RSR).
    pub fn len(&self) -> usize {
        self.queue.as_ref().map_or(0, |q| q.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free space left (the chip's TX_FSR).
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Append as much of `data` as fits; returns the number of bytes taken.
    pub fn push_slice(&self, data: &[u8]) -> usize {
        let Some(queue) = &self.queue else {
            return 0;
        };
        let mut taken = 0;
        for &byte in data {
            if queue.push(byte).is_err() {
                break;
            }
            taken += 1;
        }
        taken
    }

    /// Move up to `buf.len()` bytes out; returns the number of bytes copied.
    pub fn pop_into(&self, buf: &mut [u8]) -> usize {
        let Some(queue) = &self.queue else {
            return 0;
        };
        let mut copied = 0;
        for slot in buf.iter_mut() {
            match queue.pop() {
                Some(byte) => {
                    *slot = byte;
                    copied += 1;
                }
                None => break,
            }
        }
        copied
    }

    /// Drop all pending bytes, as a socket close does.
    pub fn clear(&self) {
        if let Some(queue) = &self.queue {
            while queue.pop().is_some() {}
        }
    }

    pub fn clone_handle(&self) -> Self {
        SocketBuffer {
            queue: self.queue.clone(),
        }
    }
}

impl Clone for SocketBuffer {
    fn clone(&self) -> Self {
        self.clone_handle()
    }
}
