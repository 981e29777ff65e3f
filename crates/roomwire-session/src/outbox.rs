//! The shared outgoing message queue.
//!
//! Application code posts through [`Outbox::post`] from any thread without
//! awaiting; the connection's sender waits on the paired [`Notify`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use roomwire_protocol::{MsgPool, MsgSigner, ProtocolError};
use tokio::sync::Notify;

/// A [`MsgPool`] behind a mutex, plus a wakeup for the sender.
#[derive(Debug)]
pub struct Outbox {
    pool: Mutex<MsgPool>,
    signer: MsgSigner,
    available: Notify,
}

impl Outbox {
    pub fn new(pool: MsgPool) -> Self {
        let signer = pool.signer().clone();
        Self {
            pool: Mutex::new(pool),
            signer,
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MsgPool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against the pool and wakes the sender if it produced a
    /// message.
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use roomwire_codec::Registry;
    /// # use roomwire_protocol::{MsgPool, MsgSigner};
    /// # use roomwire_session::Outbox;
    /// let signer = MsgSigner::new(b"key").unwrap();
    /// let outbox = Outbox::new(MsgPool::new(8, signer, Arc::new(Registry::new())));
    /// let seq = outbox.post(|pool| pool.post_leave("bye")).unwrap();
    /// assert_eq!(seq, 1);
    /// ```
    pub fn post<F>(&self, f: F) -> Result<u32, ProtocolError>
    where
        F: FnOnce(&mut MsgPool) -> Result<u32, ProtocolError>,
    {
        let seq = {
            let mut pool = self.lock();
            f(&mut *pool)?
        };
        self.available.notify_one();
        Ok(seq)
    }

    /// See [`MsgPool::take`].
    pub fn take(&self, seq: u32) -> Result<Option<Vec<u8>>, ProtocolError> {
        self.lock().take(seq)
    }

    pub fn latest(&self) -> u32 {
        self.lock().latest()
    }

    /// A signed heartbeat frame. Pings bypass the pool.
    pub fn ping(&self, timestamp_ms: u64) -> Vec<u8> {
        self.signer.ping(timestamp_ms)
    }

    /// Resolves once a post happened since the last wakeup was consumed.
    pub(crate) async fn available(&self) {
        self.available.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use roomwire_codec::Registry;

    use super::*;

    fn outbox() -> Outbox {
        let signer = MsgSigner::new(b"key").unwrap();
        Outbox::new(MsgPool::new(4, signer, Arc::new(Registry::new())))
    }

    #[tokio::test]
    async fn test_post_before_wait_is_not_lost() {
        let outbox = outbox();
        outbox.post(|p| p.post_broadcast(1, vec![])).unwrap();
        tokio::time::timeout(Duration::from_secs(1), outbox.available())
            .await
            .expect("stored wakeup");
    }

    #[tokio::test]
    async fn test_failed_post_does_not_wake() {
        let outbox = outbox();
        let err = outbox.post(|_| Err(ProtocolError::SeqOverflow));
        assert!(err.is_err());
        let waited = tokio::time::timeout(Duration::from_millis(50), outbox.available()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_ping_is_signed_with_pool_key() {
        let outbox = outbox();
        let frame = outbox.ping(5);
        assert!(outbox.lock().signer().verify(&frame).is_ok());
    }
}
