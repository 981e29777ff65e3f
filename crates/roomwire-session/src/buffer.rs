//! Bounded pool of receive buffers.
//!
//! The receiver leases a buffer before reading each frame and hands the
//! lease to the room along with the decoded event. The buffer returns to the
//! pool when the room drops the delivery, so at most `count` events are ever
//! in flight.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone)]
pub struct BufferPool {
    permits: Arc<Semaphore>,
    free: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl BufferPool {
    pub fn new(count: usize) -> Self {
        let count = count.max(1);
        Self {
            permits: Arc::new(Semaphore::new(count)),
            free: Arc::new(Mutex::new(Vec::with_capacity(count))),
        }
    }

    /// Waits for a free buffer. `None` only if the pool was closed.
    pub async fn acquire(&self) -> Option<BufferLease> {
        let permit = Arc::clone(&self.permits).acquire_owned().await.ok()?;
        let buf = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        Some(BufferLease {
            buf,
            free: Arc::clone(&self.free),
            _permit: permit,
        })
    }

    /// Buffers currently available without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// A leased buffer. Returns to its pool on drop.
#[derive(Debug)]
pub struct BufferLease {
    buf: Vec<u8>,
    free: Arc<Mutex<Vec<Vec<u8>>>>,
    _permit: OwnedSemaphorePermit,
}

impl BufferLease {
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buf);
    }
}
